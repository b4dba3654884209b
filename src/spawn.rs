//! Fork, run a child closure, wait
//!
//! The child never returns into the caller's code: whatever the closure
//! yields (or if it panics) the child ends in `_exit`, skipping destructors
//! and atexit handlers shared with the parent.
//!
//! Forks can happen from several threads at once, so the child must not go
//! through `tracing`: another thread may have held the stderr lock at the
//! moment of `fork`, and that lock is never released in the child. Use
//! [`child_diagnostic`] instead.

use crate::executor::{ExecError, ExecOutcome};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

/// Exit status used when the child closure panics
pub const EXIT_PANIC: i32 = 70;

/// Fork, run `run` in the new process and wait for it to finish.
///
/// `run` returns the status the child process exits with.
pub fn spawn_and_wait<F>(run: F) -> Result<ExecOutcome, ExecError>
where
    F: FnOnce() -> i32,
{
    // SAFETY: the child only runs `run` and then calls `_exit`; it never
    // returns into code shared with the parent.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let code = catch_unwind(AssertUnwindSafe(run)).unwrap_or(EXIT_PANIC);
            unsafe { libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => {
            debug!("forked child {}", child);
            wait_for_child(child)
        }
        Err(e) => {
            error!("fork failed: {}", e);
            Err(ExecError::Fork(e))
        }
    }
}

/// Write one line to stderr from a forked child.
///
/// Goes straight to fd 2 without taking any lock.
pub fn child_diagnostic(message: &str) {
    let line = format!("exec-action[{}]: {}\n", std::process::id(), message);
    let mut bytes = line.as_bytes();

    while !bytes.is_empty() {
        let written =
            unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        match written {
            n if n > 0 => bytes = &bytes[n as usize..],
            -1 if Errno::last() == Errno::EINTR => continue,
            _ => break,
        }
    }
}

/// Wait for the child to terminate, retrying on EINTR
fn wait_for_child(child: Pid) -> Result<ExecOutcome, ExecError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExecOutcome::Exited(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(ExecOutcome::Signaled(signal as i32))
            }
            // Stop/continue notifications; keep waiting for termination
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(source) => {
                return Err(ExecError::Wait {
                    pid: child.as_raw(),
                    source,
                })
            }
        }
    }
}
