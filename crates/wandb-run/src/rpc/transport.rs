//! Blocking request/response seam between the run session and the backend.

use wandb_proto::{
    HistoryRecord, HistoryResult, RunExitRecord, RunExitResult, RunRecord, RunUpdateResult,
    ServerShutdownResult,
};

/// One synchronous call per backend method.
///
/// Every call blocks until the backend has answered. Errors are returned as
/// `tonic::Status` so the handshake can treat them uniformly as "not ready".
pub trait RunTransport {
    fn run_update(&mut self, run: RunRecord) -> Result<RunUpdateResult, tonic::Status>;

    fn log(&mut self, history: HistoryRecord) -> Result<HistoryResult, tonic::Status>;

    fn run_exit(&mut self, exit: RunExitRecord) -> Result<RunExitResult, tonic::Status>;

    fn server_shutdown(&mut self) -> Result<ServerShutdownResult, tonic::Status>;

    /// Close the channel. Later calls fail.
    fn close(&mut self) -> std::io::Result<()>;
}
