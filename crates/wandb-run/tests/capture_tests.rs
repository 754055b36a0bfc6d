//! Run sessions with stdout capture turned on.
//!
//! fd 1 is process-global, so these live in their own test binary and take
//! `FD1` before touching it.

#![cfg(unix)]

mod common;

use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{Event, EventLog, MockProcess, MockTransport, events};
use wandb_run::capture::StdoutCapture;
use wandb_run::{RetryPolicy, RunBuilder, RunError};

static FD1: Mutex<()> = Mutex::new(());

fn capturing_builder() -> RunBuilder {
    RunBuilder::new()
        .capture_output(true)
        .retry_policy(RetryPolicy::fixed(Duration::ZERO))
}

#[test]
fn test_stdout_is_restored_before_run_exit() {
    let _fd1 = FD1.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let log = EventLog::default();

    let free_at_exit = Arc::new(AtomicBool::new(false));
    let mut transport = MockTransport::new(&log);
    let seen = Arc::clone(&free_at_exit);
    transport.on_run_exit = Some(Box::new(move || {
        // Only succeeds once the session has given fd 1 back.
        if let Ok(capture) = StdoutCapture::install_into(Box::new(io::sink())) {
            seen.store(capture.restore().is_ok(), Ordering::SeqCst);
        }
    }));

    let mut run = capturing_builder()
        .build_with(MockProcess::new(&log), transport)
        .unwrap();
    assert!(run.is_capturing());
    assert!(matches!(
        StdoutCapture::install_into(Box::new(io::sink())),
        Err(RunError::CaptureBusy)
    ));

    let report = run.finish(0).unwrap();

    assert!(report.is_clean());
    assert!(!run.is_capturing());
    assert!(free_at_exit.load(Ordering::SeqCst));
    let tail: Vec<_> = events(&log).into_iter().skip(1).collect();
    assert_eq!(
        tail,
        vec![Event::RunExit(0), Event::ServerShutdown, Event::Close, Event::Wait]
    );
}

#[test]
fn test_finish_does_not_wait_for_children_holding_stdout() {
    let _fd1 = FD1.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let log = EventLog::default();
    let mut run = capturing_builder()
        .build_with(MockProcess::new(&log), MockTransport::new(&log))
        .unwrap();

    // Started while captured, so its stdout is the capture pipe.
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();

    let started = Instant::now();
    let finished = run.finish(0);
    let took = started.elapsed();
    child.kill().unwrap();
    child.wait().unwrap();

    assert!(finished.unwrap().is_clean());
    assert!(took < Duration::from_secs(5), "finish took {took:?}");
    assert!(events(&log).contains(&Event::ServerShutdown));
}
