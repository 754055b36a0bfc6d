//! RPC channel to the backend.
//!
//! ```text
//! RunSession --RunTransport--> GrpcTransport --tonic/h2--> wandb grpc-server
//! ```
//!
//! The channel is opened lazily; the first `RunUpdate` doubles as the readiness
//! probe and is retried according to a [`RetryPolicy`].

mod grpc;
mod handshake;
mod retry;
mod transport;

pub use grpc::GrpcTransport;
pub use handshake::{Handshake, handshake, handshake_with_sleep};
pub use retry::{Backoff, DEFAULT_RETRY_DELAY, RetryPolicy};
pub use transport::RunTransport;
