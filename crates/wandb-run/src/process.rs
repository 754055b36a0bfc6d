//! Backend server process.
//!
//! The backend is started as `<binary> grpc-server --port <N>` with stdout and
//! stderr inherited, so its own diagnostics reach the console directly.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{info, warn};

use crate::error::{RunError, RunResult};

/// Subcommand that makes the tool serve the internal gRPC service.
pub const SERVER_SUBCOMMAND: &str = "grpc-server";

/// Handle the run session keeps on the backend process.
pub trait ServerProcess {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Block until the process exits. Returns the exit code, or `None` when it
    /// was terminated by a signal.
    fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Kill the process and reap it.
    fn kill(&mut self) -> io::Result<()>;
}

/// How to launch the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub binary: String,
    pub port: Option<u16>,
}

impl BackendCommand {
    pub fn new(binary: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            binary: binary.into(),
            port,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![SERVER_SUBCOMMAND.to_string()];
        if let Some(port) = self.port {
            args.push("--port".to_string());
            args.push(port.to_string());
        }
        args
    }

    /// Spawn the backend with inherited stdio.
    pub fn spawn(&self) -> RunResult<BackendProcess> {
        let args = self.args();
        info!("Starting backend: {} {}", self.binary, args.join(" "));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RunError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        info!("Backend started with pid {}", child.id());
        Ok(BackendProcess { child })
    }
}

/// A spawned backend process.
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
}

impl BackendProcess {
    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl ServerProcess for BackendProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait()?;
        info!(
            "Backend {} {}",
            self.child.id(),
            describe_exit_status(&status)
        );
        Ok(status.code())
    }

    fn kill(&mut self) -> io::Result<()> {
        if let Err(e) = self.child.kill() {
            // Already exited is fine; anything else is worth reporting.
            if self.is_running() {
                return Err(e);
            }
        }
        match self.child.wait() {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Error waiting for backend {}: {:?}", self.child.id(), e);
                Ok(())
            }
        }
    }
}

/// Describe how the backend ended, for the shutdown log line.
///
/// A backend killed by [`ServerProcess::kill`] shows up as terminated by signal 9.
pub fn describe_exit_status(status: &ExitStatus) -> String {
    if status.success() {
        return "shut down cleanly".to_string();
    }
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let core = if status.core_dumped() {
                ", core dumped"
            } else {
                ""
            };
            return format!("terminated by signal {signal}{core}");
        }
    }
    format!("ended with {status}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_with_and_without_port() {
        assert_eq!(
            BackendCommand::new("wandb", Some(50051)).args(),
            vec!["grpc-server", "--port", "50051"]
        );
        assert_eq!(BackendCommand::new("wandb", None).args(), vec!["grpc-server"]);
    }

    #[test]
    fn test_missing_binary_is_a_launch_error() {
        let err = BackendCommand::new("definitely-not-a-real-backend-binary", Some(1))
            .spawn()
            .unwrap_err();
        match err {
            RunError::Launch { binary, source } => {
                assert_eq!(binary, "definitely-not-a-real-backend-binary");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_describe_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait statuses: code in the high byte, signal in the low bits.
        assert_eq!(
            describe_exit_status(&ExitStatus::from_raw(0)),
            "shut down cleanly"
        );
        assert_eq!(
            describe_exit_status(&ExitStatus::from_raw(3 << 8)),
            "exited with code 3"
        );
        assert_eq!(
            describe_exit_status(&ExitStatus::from_raw(9)),
            "terminated by signal 9"
        );
        assert_eq!(
            describe_exit_status(&ExitStatus::from_raw(0x80 | 11)),
            "terminated by signal 11, core dumped"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_reports_exit_code() {
        let mut process = BackendProcess {
            child: Command::new("sh")
                .args(["-c", "exit 3"])
                .spawn()
                .unwrap(),
        };
        assert!(process.id().is_some());
        assert_eq!(process.wait().unwrap(), Some(3));
    }
}
