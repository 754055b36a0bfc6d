//! Captured-output buffering.
//!
//! While a run is active its stdout is intercepted and mirrored back to the console
//! in chunks, each followed by a marker line:
//!
//! ```text
//! print!() --> fd 1 --pipe--> pump thread --> CaptureBuffer --chunk + marker--> console
//! ```
//!
//! A chunk is emitted when more than [`AUTO_FLUSH_THRESHOLD`] bytes are buffered
//! (automatic flush) and once more when the run finishes (final flush).
//!
//! [`CaptureBuffer`] flushes inside the `push` that crosses the threshold. Behind
//! [`StdoutCapture`] the pump feeds the buffer one pipe read (up to 4 KiB) at a
//! time on its own thread, so automatic flushes happen asynchronously, after the
//! triggering `print!` has returned, and one chunk may cover several writes.

mod buffer;
#[cfg(unix)]
mod redirect;

pub use buffer::{
    AUTO_FLUSH_MARKER, AUTO_FLUSH_THRESHOLD, CaptureBuffer, FINAL_FLUSH_MARKER, FlushKind,
};
#[cfg(unix)]
pub use redirect::StdoutCapture;

#[cfg(not(unix))]
pub use unsupported::StdoutCapture;

#[cfg(not(unix))]
mod unsupported {
    use std::io::{self, Write};

    use crate::error::{RunError, RunResult};

    /// Stdout capture is only implemented on unix targets.
    #[derive(Debug)]
    pub struct StdoutCapture {
        _private: (),
    }

    impl StdoutCapture {
        pub fn install() -> RunResult<Self> {
            Err(RunError::CaptureUnsupported)
        }

        pub fn install_into(_sink: Box<dyn Write + Send>) -> RunResult<Self> {
            Err(RunError::CaptureUnsupported)
        }

        pub fn is_installed(&self) -> bool {
            false
        }

        pub fn restore(self) -> io::Result<()> {
            Ok(())
        }
    }
}
