//! Unary gRPC client for `wandb_internal.InternalService`.

use http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{IntoRequest, Response, Status};

use crate::records::{
    HistoryRecord, HistoryResult, RunExitRecord, RunExitResult, RunRecord, RunUpdateResult,
    ServerShutdownRequest, ServerShutdownResult,
};

/// Fully qualified gRPC service name.
pub const SERVICE_NAME: &str = "wandb_internal.InternalService";

const RUN_UPDATE: &str = "/wandb_internal.InternalService/RunUpdate";
const LOG: &str = "/wandb_internal.InternalService/Log";
const RUN_EXIT: &str = "/wandb_internal.InternalService/RunExit";
const SERVER_SHUTDOWN: &str = "/wandb_internal.InternalService/ServerShutdown";

/// Client for the backend's internal service.
#[derive(Debug, Clone)]
pub struct InternalServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl InternalServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Open or update a run. The response carries the authoritative run record.
    pub async fn run_update(
        &mut self,
        request: impl IntoRequest<RunRecord>,
    ) -> Result<Response<RunUpdateResult>, Status> {
        self.unary(request, RUN_UPDATE).await
    }

    /// Append one history row.
    pub async fn log(
        &mut self,
        request: impl IntoRequest<HistoryRecord>,
    ) -> Result<Response<HistoryResult>, Status> {
        self.unary(request, LOG).await
    }

    /// Mark the run as exited with the given code.
    pub async fn run_exit(
        &mut self,
        request: impl IntoRequest<RunExitRecord>,
    ) -> Result<Response<RunExitResult>, Status> {
        self.unary(request, RUN_EXIT).await
    }

    /// Ask the backend process to stop serving and exit.
    pub async fn server_shutdown(
        &mut self,
        request: impl IntoRequest<ServerShutdownRequest>,
    ) -> Result<Response<ServerShutdownResult>, Status> {
        self.unary(request, SERVER_SHUTDOWN).await
    }

    async fn unary<Req, Resp>(
        &mut self,
        request: impl IntoRequest<Req>,
        path: &'static str,
    ) -> Result<Response<Resp>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("service was not ready: {e}")))?;
        let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
        self.inner
            .unary(
                request.into_request(),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
    }
}
