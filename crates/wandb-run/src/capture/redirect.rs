//! Process-wide stdout redirection (unix).
//!
//! File descriptor 1 is pointed at a pipe whose read end is drained by a pump
//! thread into a [`CaptureBuffer`]. The buffer mirrors chunks to a duplicate of the
//! real stdout, so the console keeps showing output while it is being captured.
//!
//! Children spawned during a capture inherit the pipe as their stdout. Restoring
//! therefore does not wait for EOF: once fd 1 is re-bound the pump drains what is
//! already in the pipe and stops. Output a child writes after that is dropped.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use rustix::event::{PollFd, PollFlags, Timespec};

use tracing::{debug, warn};

use super::buffer::CaptureBuffer;
use crate::error::{RunError, RunResult};

/// Set while some capture owns fd 1.
static CAPTURE_ACTIVE: AtomicBool = AtomicBool::new(false);

type SharedBuffer = Arc<Mutex<CaptureBuffer<Box<dyn Write + Send>>>>;

/// Scoped ownership of the process's stdout.
///
/// Only one capture can be installed at a time. [`restore`](Self::restore) gives
/// stdout back; dropping an installed capture restores it as well.
pub struct StdoutCapture {
    active: Option<Active>,
}

struct Active {
    saved: OwnedFd,
    buffer: SharedBuffer,
    stop: Arc<AtomicBool>,
    pump: JoinHandle<io::Result<()>>,
}

/// How long the pump waits for data before checking whether it should stop.
const PUMP_POLL_TIMEOUT: Timespec = Timespec {
    tv_sec: 0,
    tv_nsec: 50_000_000,
};

impl StdoutCapture {
    /// Redirect stdout, mirroring captured chunks to the current console.
    pub fn install() -> RunResult<Self> {
        Self::acquire(None)
    }

    /// Redirect stdout, mirroring captured chunks to `sink` instead of the console.
    pub fn install_into(sink: Box<dyn Write + Send>) -> RunResult<Self> {
        Self::acquire(Some(sink))
    }

    fn acquire(sink: Option<Box<dyn Write + Send>>) -> RunResult<Self> {
        if CAPTURE_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunError::CaptureBusy);
        }

        match redirect(sink) {
            Ok(active) => {
                debug!("stdout capture installed");
                Ok(Self {
                    active: Some(active),
                })
            }
            Err(e) => {
                CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
                Err(RunError::Io(e))
            }
        }
    }

    /// Whether this capture still owns stdout.
    pub fn is_installed(&self) -> bool {
        self.active.is_some()
    }

    /// Give stdout back and drain everything captured so far.
    ///
    /// The console is re-bound first, then whatever is left in the pipe is read and
    /// emitted as the final flush. Returns without waiting for child processes
    /// that still hold the pipe open.
    pub fn restore(mut self) -> io::Result<()> {
        self.release()
    }

    fn release(&mut self) -> io::Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        let flushed = io::stdout().flush();

        if let Err(e) = rustix::stdio::dup2_stdout(&active.saved) {
            // fd 1 still feeds the pipe; leave the pump running so writers never block.
            CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        // Nothing in this process writes to the pipe any more.
        active.stop.store(true, Ordering::SeqCst);

        let pumped = match active.pump.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("stdout capture pump panicked")),
        };
        let drained = lock(&active.buffer).flush_final();

        CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
        debug!("stdout capture restored");

        flushed.and(pumped).and(drained)
    }
}

impl std::fmt::Debug for StdoutCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutCapture")
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl Drop for StdoutCapture {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to restore stdout: {e}");
        }
    }
}

fn redirect(sink: Option<Box<dyn Write + Send>>) -> io::Result<Active> {
    io::stdout().flush()?;

    let saved = rustix::io::dup(io::stdout().as_fd())?;
    let sink = match sink {
        Some(sink) => sink,
        None => Box::new(File::from(saved.try_clone()?)) as Box<dyn Write + Send>,
    };

    let (reader, writer) = rustix::pipe::pipe()?;
    rustix::io::ioctl_fionbio(&reader, true)?;
    rustix::stdio::dup2_stdout(&writer)?;
    drop(writer);

    let buffer: SharedBuffer = Arc::new(Mutex::new(CaptureBuffer::new(sink)));
    let stop = Arc::new(AtomicBool::new(false));
    let pump_buffer = Arc::clone(&buffer);
    let pump_stop = Arc::clone(&stop);
    let pump = thread::Builder::new()
        .name("stdout-capture".to_string())
        .spawn(move || drain_pipe(File::from(reader), pump_buffer, &pump_stop));

    match pump {
        Ok(pump) => Ok(Active {
            saved,
            buffer,
            stop,
            pump,
        }),
        Err(e) => {
            // Nobody would drain the pipe; put the console back before failing.
            rustix::stdio::dup2_stdout(&saved)?;
            Err(e)
        }
    }
}

/// Drain the non-blocking pipe until every write end is closed, or until `stop`
/// is set and the pipe is empty.
///
/// Keeps reading after a sink error so writers never block on a full pipe.
fn drain_pipe(mut reader: File, buffer: SharedBuffer, stop: &AtomicBool) -> io::Result<()> {
    let mut chunk = [0u8; 4096];
    let mut first_error = None;
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                wait_readable(&reader)?;
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = lock(&buffer).push(&chunk[..n]) {
            if first_error.is_none() {
                warn!("failed to mirror captured output: {e}");
                first_error = Some(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn wait_readable(reader: &File) -> io::Result<()> {
    let mut fds = [PollFd::new(reader, PollFlags::IN)];
    match rustix::event::poll(&mut fds, Some(&PUMP_POLL_TIMEOUT)) {
        Ok(_) | Err(rustix::io::Errno::INTR) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, CaptureBuffer<Box<dyn Write + Send>>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
