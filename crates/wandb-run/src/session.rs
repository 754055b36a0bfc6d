//! Run session: the lifecycle around one tracked run.
//!
//! ```text
//! RunBuilder::build()
//!   spawn `wandb grpc-server --port N`   (stdio inherited)
//!   open channel (lazy)
//!   RunUpdate, retried until the backend answers  -> RunIdentity
//!   install stdout capture (optional)
//! RunSession::log() *                            -> Log, one per call, in order
//! RunSession::finish(code)
//!   final flush + restore stdout
//!   RunExit(code) -> ServerShutdown -> close channel -> wait for backend
//! ```
//!
//! Stdout is restored before the final RPCs so anything printed while shutting
//! down reaches the console directly.

use std::io;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wandb_proto::{HistoryResult, RunExitRecord, RunExitResult, RunRecord, ServerShutdownResult};

use crate::capture::StdoutCapture;
use crate::error::{RunError, RunResult};
use crate::process::{BackendCommand, BackendProcess, ServerProcess};
use crate::records::{build_config_batch, build_log_batch, with_step};
use crate::rpc::{GrpcTransport, RetryPolicy, RunTransport, handshake};
use crate::settings::ClientSettings;

/// Server-assigned identity of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    pub run_id: String,
    pub display_name: String,
    pub entity: String,
    pub project: String,
    pub host: String,
}

impl RunIdentity {
    /// Dashboard link: `<base>/<entity>/<project>/runs/<run_id>`.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}/runs/{}",
            base_url.trim_end_matches('/'),
            self.entity,
            self.project,
            self.run_id
        )
    }
}

impl From<&RunRecord> for RunIdentity {
    fn from(run: &RunRecord) -> Self {
        Self {
            run_id: run.run_id.clone(),
            display_name: run.display_name.clone(),
            entity: run.entity.clone(),
            project: run.project.clone(),
            host: run.host.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Finished,
}

/// Teardown sub-step that failed without aborting `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    RestoreOutput,
    CloseChannel,
    WaitBackend,
}

#[derive(Debug)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub error: io::Error,
}

/// What `finish` did.
#[derive(Debug)]
pub struct FinishReport {
    pub exit: RunExitResult,
    pub shutdown: ServerShutdownResult,
    /// Exit code of the backend process, `None` if unknown or signalled.
    pub backend_exit_code: Option<i32>,
    /// Best-effort steps that failed. Logged, never propagated.
    pub failures: Vec<TeardownFailure>,
}

impl FinishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Configures and starts a [`RunSession`].
#[derive(Debug, Clone)]
pub struct RunBuilder {
    run: RunRecord,
    config: Option<Value>,
    binary: String,
    address: String,
    port: u16,
    base_url: String,
    capture_output: bool,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Default for RunBuilder {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

impl RunBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            run: RunRecord::default(),
            config: None,
            binary: settings.binary.clone(),
            address: settings.address.clone(),
            port: settings.port,
            base_url: settings.base_url.clone(),
            capture_output: settings.capture_output,
            retry: settings.retry.policy(),
            cancel: CancellationToken::new(),
        }
    }

    /// Display name shown in the UI. Does not have to be unique.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.run.display_name = name.into();
        self
    }

    /// Initial hyperparameters, as a JSON object of scalars.
    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.run.project = project.into();
        self
    }

    /// Free-form description of the run.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.run.notes = notes.into();
        self
    }

    /// Kind of job, e.g. `eval` or `worker`.
    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.run.job_type = job_type.into();
        self
    }

    /// Group this run with others sharing the same value.
    pub fn run_group(mut self, group: impl Into<String>) -> Self {
        self.run.run_group = group.into();
        self
    }

    pub fn sweep_id(mut self, sweep_id: impl Into<String>) -> Self {
        self.run.sweep_id = sweep_id.into();
        self
    }

    /// Add tags to the run.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn clear_tags(mut self) -> Self {
        self.run.tags.clear();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.run.host = host.into();
        self
    }

    /// Address of the backend's gRPC server.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Port the backend listens on.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Backend executable.
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Token that aborts the startup handshake when cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The initial run update this builder would send.
    pub fn run_request(&self) -> RunResult<RunRecord> {
        let mut run = self.run.clone();
        if let Some(config) = &self.config {
            run.config = Some(build_config_batch(config)?);
        }
        Ok(run)
    }

    /// Launch the backend and open the run.
    pub fn build(self) -> RunResult<RunSession> {
        let request = self.run_request()?;
        let mut process = BackendCommand::new(&self.binary, Some(self.port)).spawn()?;
        let transport = match GrpcTransport::connect(&self.address, self.port) {
            Ok(transport) => transport,
            Err(e) => {
                if let Err(kill) = process.kill() {
                    warn!("failed to stop backend after connect error: {kill}");
                }
                return Err(e);
            }
        };
        self.start(request, process, transport)
    }

    /// Open the run against an already running backend and channel.
    pub fn build_with<T, P>(self, process: P, transport: T) -> RunResult<RunSession<T, P>>
    where
        T: RunTransport,
        P: ServerProcess,
    {
        let request = self.run_request()?;
        self.start(request, process, transport)
    }

    fn start<T, P>(
        self,
        request: RunRecord,
        mut process: P,
        mut transport: T,
    ) -> RunResult<RunSession<T, P>>
    where
        T: RunTransport,
        P: ServerProcess,
    {
        let handshake = match handshake(&mut transport, &request, &self.retry, &self.cancel) {
            Ok(handshake) => handshake,
            Err(e) => {
                abandon(&mut transport, &mut process);
                return Err(e);
            }
        };

        let capture = if self.capture_output {
            match StdoutCapture::install() {
                Ok(capture) => Some(capture),
                Err(e) => {
                    abandon(&mut transport, &mut process);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let identity = RunIdentity::from(&handshake.run);
        info!(
            "Run {} ({}) started in {}/{}",
            identity.run_id, identity.display_name, identity.entity, identity.project
        );

        Ok(RunSession {
            transport,
            process,
            capture,
            run: handshake.run,
            identity,
            base_url: self.base_url,
            step: 0,
            attempts: handshake.attempts,
            state: SessionState::Active,
            exit_ack: None,
        })
    }
}

/// Give up on a backend that never produced a run.
fn abandon<T: RunTransport, P: ServerProcess>(transport: &mut T, process: &mut P) {
    if let Err(e) = transport.close() {
        warn!("failed to close channel: {e}");
    }
    if let Err(e) = process.kill() {
        warn!("failed to stop backend: {e}");
    }
}

/// One active run.
///
/// All calls block until the backend has acknowledged them. Dropping a session
/// that was not finished restores stdout and kills the backend.
pub struct RunSession<T: RunTransport = GrpcTransport, P: ServerProcess = BackendProcess> {
    transport: T,
    process: P,
    capture: Option<StdoutCapture>,
    run: RunRecord,
    identity: RunIdentity,
    base_url: String,
    step: u64,
    attempts: u32,
    state: SessionState,
    exit_ack: Option<RunExitResult>,
}

impl RunSession {
    pub fn builder() -> RunBuilder {
        RunBuilder::new()
    }
}

impl<T: RunTransport, P: ServerProcess> RunSession<T, P> {
    /// Raw run record returned by the backend.
    pub fn data(&self) -> &RunRecord {
        &self.run
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last step assigned by [`log`](Self::log).
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Handshake attempts needed to reach the backend.
    pub fn handshake_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(StdoutCapture::is_installed)
    }

    /// Web link of the run under the configured base URL.
    ///
    /// The record's `host` names the machine the run executes on, so it is never
    /// used as the link's base.
    pub fn run_url(&self) -> String {
        self.identity.url(&self.base_url)
    }

    pub fn monitor_message(&self) -> String {
        format!(
            "Monitor your run ({}) at: {}",
            self.identity.display_name,
            self.run_url()
        )
    }

    /// Print the run link ([`run_url`](Self::run_url)) to stdout.
    pub fn print_run_info(&self) {
        println!("{}", self.monitor_message());
    }

    /// Log one history row at the next step.
    ///
    /// The step advances even when the call fails.
    pub fn log(&mut self, entry: &Value) -> RunResult<HistoryResult> {
        self.ensure_active()?;
        self.step += 1;
        self.log_at_step(entry, self.step)
    }

    /// Log one history row at an explicit step. The automatic counter is not
    /// touched, so later [`log`](Self::log) calls continue from where it was.
    pub fn log_at_step(&mut self, entry: &Value, step: u64) -> RunResult<HistoryResult> {
        self.ensure_active()?;
        let record = build_log_batch(&with_step(entry, step)?)?;
        debug!("logging step {step} ({} items)", record.item.len());
        Ok(self.transport.log(record)?)
    }

    /// Finish with exit code 0.
    pub fn done(&mut self) -> RunResult<FinishReport> {
        self.finish(0)
    }

    /// Drain and restore stdout, report the exit code, then shut the backend down.
    ///
    /// Output and process teardown failures are collected in the report. Failed
    /// exit or shutdown RPCs are returned and leave the session active, so
    /// `finish` can be called again.
    pub fn finish(&mut self, exit_code: i32) -> RunResult<FinishReport> {
        self.ensure_active()?;
        let mut failures = Vec::new();

        if let Some(capture) = self.capture.take() {
            if let Err(error) = capture.restore() {
                warn!("failed to flush captured output: {error}");
                failures.push(TeardownFailure {
                    step: TeardownStep::RestoreOutput,
                    error,
                });
            }
        }

        let exit = match &self.exit_ack {
            Some(ack) => ack.clone(),
            None => {
                let ack = self.transport.run_exit(RunExitRecord { exit_code })?;
                self.exit_ack = Some(ack.clone());
                ack
            }
        };
        let shutdown = self.transport.server_shutdown()?;

        if let Err(error) = self.transport.close() {
            warn!("failed to close channel: {error}");
            failures.push(TeardownFailure {
                step: TeardownStep::CloseChannel,
                error,
            });
        }

        let backend_exit_code = match self.process.wait() {
            Ok(code) => code,
            Err(error) => {
                warn!("failed to wait for backend: {error}");
                failures.push(TeardownFailure {
                    step: TeardownStep::WaitBackend,
                    error,
                });
                None
            }
        };

        self.state = SessionState::Finished;
        info!(
            "Run {} finished with exit code {exit_code}",
            self.identity.run_id
        );

        Ok(FinishReport {
            exit,
            shutdown,
            backend_exit_code,
            failures,
        })
    }

    fn ensure_active(&self) -> RunResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Finished => Err(RunError::Finished),
        }
    }
}

impl<T: RunTransport, P: ServerProcess> Drop for RunSession<T, P> {
    fn drop(&mut self) {
        if self.state == SessionState::Finished {
            return;
        }
        warn!(
            "Run {} dropped without finish; stopping backend",
            self.identity.run_id
        );
        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.restore() {
                warn!("failed to restore stdout: {e}");
            }
        }
        abandon(&mut self.transport, &mut self.process);
    }
}
