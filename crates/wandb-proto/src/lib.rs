//! Wire types for talking to the wandb internal service.
//!
//! The tracking backend runs as a local `wandb grpc-server` process and exposes a
//! small unary gRPC contract:
//!
//! ```text
//! client --RunUpdate(RunRecord)-------------> RunUpdateResult { run }
//!        --Log(HistoryRecord)---------------> HistoryResult
//!        --RunExit(RunExitRecord)-----------> RunExitResult
//!        --ServerShutdown(ServerShutdownRequest)-> ServerShutdownResult
//! ```
//!
//! Messages are plain `prost` structs so no protoc step is needed at build time.
//! Every config and history value travels as a JSON literal string (`value_json`).

pub mod client;
pub mod records;

pub use client::{InternalServiceClient, SERVICE_NAME};
pub use records::{
    ConfigItem, ConfigRecord, ErrorInfo, HistoryItem, HistoryRecord, HistoryResult,
    RunExitRecord, RunExitResult, RunRecord, RunUpdateResult, ServerShutdownRequest,
    ServerShutdownResult,
};
