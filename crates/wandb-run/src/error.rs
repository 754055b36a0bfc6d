//! Run session error types.

use thiserror::Error;

/// Result type for run session operations.
pub type RunResult<T> = Result<T, RunError>;

/// Errors that can occur while driving a run session.
#[derive(Debug, Error)]
pub enum RunError {
    /// The backend process could not be spawned.
    #[error("failed to launch backend `{binary}`: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend address could not be turned into a channel endpoint.
    #[error("invalid backend endpoint {0}")]
    InvalidEndpoint(String),

    /// A mid-session RPC failed.
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// A record could not be built from the caller's data.
    #[error("invalid record data: {0}")]
    DataFormat(String),

    /// The handshake retry policy gave up before the backend answered.
    #[error("backend did not answer after {attempts} attempt(s): {last}")]
    HandshakeExhausted { attempts: u32, last: tonic::Status },

    /// The backend answered the handshake but did not return a run.
    #[error("backend rejected the run: {0}")]
    RunRejected(String),

    /// The handshake was cancelled by the caller.
    #[error("handshake cancelled")]
    Cancelled,

    /// The session has already finished.
    #[error("run session already finished")]
    Finished,

    /// Another output capture currently owns stdout.
    #[error("stdout is already captured by another run session")]
    CaptureBusy,

    /// Stdout capture is not available on this platform.
    #[error("stdout capture is not supported on this platform")]
    CaptureUnsupported,

    /// Settings could not be loaded.
    #[error("invalid settings: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
