//! Scripted backend doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use wandb_run::RunTransport;
use wandb_run::process::ServerProcess;
use wandb_run::proto::{
    HistoryRecord, HistoryResult, RunExitRecord, RunExitResult, RunRecord, RunUpdateResult,
    ServerShutdownResult,
};

/// Everything the doubles observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RunUpdate(RunRecord),
    Log(HistoryRecord),
    RunExit(i32),
    ServerShutdown,
    Close,
    Wait,
    Kill,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

/// Run record the mock backend hands out.
pub fn assigned_run() -> RunRecord {
    RunRecord {
        run_id: "3xk9q2".to_string(),
        display_name: "run1".to_string(),
        entity: "team".to_string(),
        project: "demo".to_string(),
        host: "box".to_string(),
        ..Default::default()
    }
}

pub struct MockTransport {
    log: EventLog,
    /// Handshake refusals left before the backend answers.
    pub refusals: usize,
    /// Scripted failures for upcoming `log` calls; `None` means success.
    pub log_failures: VecDeque<Option<tonic::Status>>,
    pub fail_exit: bool,
    pub fail_shutdown: bool,
    pub fail_close: bool,
    /// Runs inside `run_exit`, before the call is answered.
    pub on_run_exit: Option<Box<dyn FnMut() + Send>>,
}

impl MockTransport {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
            refusals: 0,
            log_failures: VecDeque::new(),
            fail_exit: false,
            fail_shutdown: false,
            fail_close: false,
            on_run_exit: None,
        }
    }

    pub fn refusing(mut self, refusals: usize) -> Self {
        self.refusals = refusals;
        self
    }

    fn record(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }
}

impl RunTransport for MockTransport {
    fn run_update(&mut self, run: RunRecord) -> Result<RunUpdateResult, tonic::Status> {
        self.record(Event::RunUpdate(run));
        if self.refusals > 0 {
            self.refusals -= 1;
            return Err(tonic::Status::unavailable("connection refused"));
        }
        Ok(RunUpdateResult {
            run: Some(assigned_run()),
            error: None,
        })
    }

    fn log(&mut self, history: HistoryRecord) -> Result<HistoryResult, tonic::Status> {
        self.record(Event::Log(history));
        match self.log_failures.pop_front().flatten() {
            Some(status) => Err(status),
            None => Ok(HistoryResult {}),
        }
    }

    fn run_exit(&mut self, exit: RunExitRecord) -> Result<RunExitResult, tonic::Status> {
        self.record(Event::RunExit(exit.exit_code));
        if let Some(hook) = self.on_run_exit.as_mut() {
            hook();
        }
        if self.fail_exit {
            self.fail_exit = false;
            return Err(tonic::Status::unavailable("backend went away"));
        }
        Ok(RunExitResult {})
    }

    fn server_shutdown(&mut self) -> Result<ServerShutdownResult, tonic::Status> {
        self.record(Event::ServerShutdown);
        if self.fail_shutdown {
            self.fail_shutdown = false;
            return Err(tonic::Status::internal("shutdown failed"));
        }
        Ok(ServerShutdownResult {})
    }

    fn close(&mut self) -> io::Result<()> {
        self.record(Event::Close);
        if self.fail_close {
            return Err(io::Error::other("close failed"));
        }
        Ok(())
    }
}

pub struct MockProcess {
    log: EventLog,
    pub exit_code: Option<i32>,
    pub fail_wait: bool,
}

impl MockProcess {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
            exit_code: Some(0),
            fail_wait: false,
        }
    }
}

impl ServerProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        self.log.lock().unwrap().push(Event::Wait);
        if self.fail_wait {
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        Ok(self.exit_code)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.log.lock().unwrap().push(Event::Kill);
        Ok(())
    }
}

/// Value of `key` in a history row, as sent on the wire.
pub fn item<'a>(history: &'a HistoryRecord, key: &str) -> Option<&'a str> {
    history
        .item
        .iter()
        .find(|i| i.key == key)
        .map(|i| i.value_json.as_str())
}

pub fn logged(events: &[Event]) -> Vec<HistoryRecord> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Log(h) => Some(h.clone()),
            _ => None,
        })
        .collect()
}
