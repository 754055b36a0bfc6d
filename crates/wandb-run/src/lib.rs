//! Client-side run sessions for the wandb tracking backend.
//!
//! A [`RunSession`] starts a local `wandb grpc-server` process, opens a gRPC
//! channel to it and streams run metadata over the session's lifetime:
//!
//! ```no_run
//! use serde_json::json;
//! use wandb_run::RunSession;
//!
//! # fn main() -> wandb_run::RunResult<()> {
//! let mut run = RunSession::builder()
//!     .project("demo")
//!     .config(json!({"lr": 0.01, "epochs": 10}))
//!     .build()?;
//! run.print_run_info();
//! for epoch in 0..10 {
//!     run.log(&json!({"loss": 1.0 / f64::from(epoch + 1)}))?;
//! }
//! run.finish(0)?;
//! # Ok(())
//! # }
//! ```
//!
//! Every call blocks until the backend has acknowledged it, and history rows
//! reach the backend in call order.

pub mod capture;
pub mod error;
pub mod process;
pub mod records;
pub mod rpc;
pub mod session;
pub mod settings;

pub use error::{RunError, RunResult};
pub use rpc::{Backoff, RetryPolicy, RunTransport};
pub use session::{
    FinishReport, RunBuilder, RunIdentity, RunSession, SessionState, TeardownFailure,
    TeardownStep,
};
pub use settings::ClientSettings;
pub use wandb_proto as proto;
