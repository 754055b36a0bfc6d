//! Blocking gRPC transport.
//!
//! Owns a single-threaded tokio runtime and drives the async tonic client on it,
//! so every call returns only after the backend has answered. Must not be used
//! from inside another tokio runtime.

use tokio::runtime::Runtime;
use tonic::Status;
use tonic::transport::Endpoint;
use tracing::debug;
use wandb_proto::{
    HistoryRecord, HistoryResult, InternalServiceClient, RunExitRecord, RunExitResult, RunRecord,
    RunUpdateResult, ServerShutdownRequest, ServerShutdownResult,
};

use super::transport::RunTransport;
use crate::error::{RunError, RunResult};

/// Plaintext channel to a backend at `address:port`.
pub struct GrpcTransport {
    runtime: Runtime,
    client: Option<InternalServiceClient>,
    endpoint: String,
}

impl GrpcTransport {
    /// Open the channel. Nothing is dialed until the first call, so a backend
    /// that is still starting shows up as a failed call rather than here.
    pub fn connect(address: &str, port: u16) -> RunResult<Self> {
        let uri = format!("http://{address}:{port}");
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| RunError::InvalidEndpoint(format!("{uri}: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let channel = {
            let _guard = runtime.enter();
            endpoint.connect_lazy()
        };

        debug!("opened gRPC channel to {uri}");
        Ok(Self {
            runtime,
            client: Some(InternalServiceClient::new(channel)),
            endpoint: uri,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

fn closed() -> Status {
    Status::unavailable("rpc channel is closed")
}

impl RunTransport for GrpcTransport {
    fn run_update(&mut self, run: RunRecord) -> Result<RunUpdateResult, Status> {
        let client = self.client.as_mut().ok_or_else(closed)?;
        let response = self.runtime.block_on(client.run_update(run))?;
        Ok(response.into_inner())
    }

    fn log(&mut self, history: HistoryRecord) -> Result<HistoryResult, Status> {
        let client = self.client.as_mut().ok_or_else(closed)?;
        let response = self.runtime.block_on(client.log(history))?;
        Ok(response.into_inner())
    }

    fn run_exit(&mut self, exit: RunExitRecord) -> Result<RunExitResult, Status> {
        let client = self.client.as_mut().ok_or_else(closed)?;
        let response = self.runtime.block_on(client.run_exit(exit))?;
        Ok(response.into_inner())
    }

    fn server_shutdown(&mut self) -> Result<ServerShutdownResult, Status> {
        let client = self.client.as_mut().ok_or_else(closed)?;
        let response = self
            .runtime
            .block_on(client.server_shutdown(ServerShutdownRequest {}))?;
        Ok(response.into_inner())
    }

    fn close(&mut self) -> std::io::Result<()> {
        if self.client.take().is_some() {
            debug!("closed gRPC channel to {}", self.endpoint);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_address() {
        let result = GrpcTransport::connect("not a host", 50051);
        assert!(matches!(result, Err(RunError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_closed_transport_refuses_calls() {
        let mut transport = GrpcTransport::connect("127.0.0.1", 1).unwrap();
        assert!(transport.is_open());
        assert_eq!(transport.endpoint(), "http://127.0.0.1:1");

        transport.close().unwrap();
        assert!(!transport.is_open());

        let status = transport.log(HistoryRecord::default()).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        // Closing twice is harmless.
        transport.close().unwrap();
    }
}
