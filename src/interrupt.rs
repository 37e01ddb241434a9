//! Keyboard interrupt handling.
//!
//! While a program runs, SIGINT raises a flag. The machine checks it at
//! every fetch boundary, and a `read` blocked on stdin sees it as soon as
//! the signal cuts the system call short. Either way the run stops cleanly
//! and the session goes on. With nothing running, SIGINT ends the process
//! at once.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static RUNNING: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    if RUNNING.load(Ordering::SeqCst) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    } else {
        // SAFETY: write(2) and _exit(2) are async-signal-safe.
        unsafe {
            libc::write(libc::STDOUT_FILENO, b"\n".as_ptr().cast(), 1);
            libc::_exit(0);
        }
    }
}

/// Install the SIGINT handler and return the flag it raises.
///
/// The handler is installed without `SA_RESTART`, so a blocking `read(2)`
/// returns `EINTR` when the signal lands.
pub fn install() -> &'static AtomicBool {
    #[cfg(unix)]
    {
        let handler = on_sigint as extern "C" fn(libc::c_int);
        // SAFETY: an all-zero sigaction is valid; mask and handler are filled
        // in before use, and the handler only touches atomics and
        // async-signal-safe calls.
        let rc = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handler as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut())
        };
        if rc != 0 {
            tracing::warn!(error = %io::Error::last_os_error(), "could not install SIGINT handler");
        }
    }
    &INTERRUPTED
}

/// Marks a program as running until dropped.
pub struct RunGuard {
    _private: (),
}

/// Route SIGINT to the interrupt flag for the lifetime of the guard.
pub fn running() -> RunGuard {
    INTERRUPTED.store(false, Ordering::SeqCst);
    RUNNING.store(true, Ordering::SeqCst);
    RunGuard { _private: () }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::SeqCst);
    }
}

/// Error carried inside the `io::Error` an [`Interruptible`] reader returns.
#[derive(Debug, thiserror::Error)]
#[error("read interrupted")]
pub struct ReadInterrupted;

/// Whether `e` is a read cut short by the interrupt flag.
pub fn is_read_interrupted(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<ReadInterrupted>())
}

/// A reader that gives up on `EINTR` once the interrupt flag is raised.
///
/// `BufRead::read_line` retries `ErrorKind::Interrupted` forever, so the
/// interruption is reported with a different kind that it passes through.
/// Interruptions with the flag down are retried here.
pub struct Interruptible<'f, R> {
    inner: R,
    flag: &'f AtomicBool,
}

impl<'f, R: Read> Interruptible<'f, R> {
    pub fn new(inner: R, flag: &'f AtomicBool) -> Self {
        Interruptible { inner, flag }
    }
}

impl<R: Read> Read for Interruptible<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if self.flag.load(Ordering::SeqCst) {
                        tracing::debug!("read cut short by interrupt");
                        return Err(io::Error::other(ReadInterrupted));
                    }
                }
                result => return result,
            }
        }
    }
}

/// Serializes tests that touch the process-wide flags.
#[cfg(test)]
pub(crate) static TEST_FLAGS: std::sync::Mutex<()> = std::sync::Mutex::new(());
