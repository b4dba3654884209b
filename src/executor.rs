//! Executor: run a compiled action against a live event

use crate::child::{run_child, SystemChildOps};
use crate::compiler::ActionTemplate;
use crate::event::DeviceEvent;
use crate::spawn::{child_diagnostic, spawn_and_wait};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Executor errors
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("waiting for child {pid} failed: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: nix::Error,
    },
}

/// Runtime toggles, passed explicitly to every execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMode {
    /// Log what would happen instead of doing it
    pub dry_run: bool,

    /// Log the rendered command line before running it
    pub debug: bool,
}

/// How an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecOutcome {
    /// Child exited with a status code
    Exited(i32),

    /// Child was killed by a signal
    Signaled(i32),

    /// Nothing was run
    DryRun,
}

impl ExecOutcome {
    /// Whether the caller should treat this as success
    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Exited(0) | ExecOutcome::DryRun)
    }
}

/// Execute an action template for one event.
///
/// With `dry_run` no process is created and the outcome is always
/// [`ExecOutcome::DryRun`]. Otherwise the call blocks until the child exits;
/// failures inside the child are only visible through its exit status.
///
/// Safe to call from several threads at once: after fork the child writes its
/// diagnostics directly to fd 2 and never logs through `tracing`.
pub fn execute(
    template: &ActionTemplate,
    event: &dyn DeviceEvent,
    mode: RuntimeMode,
) -> Result<ExecOutcome, ExecError> {
    if mode.dry_run {
        if let Err(e) = run_child(template, event, mode, &mut SystemChildOps) {
            warn!("dry run: child would fail with status {}: {}", e.exit_code(), e);
        }
        return Ok(ExecOutcome::DryRun);
    }

    let outcome = spawn_and_wait(|| match run_child(template, event, mode, &mut SystemChildOps) {
        // run_child only returns Ok in dry-run mode
        Ok(()) => 0,
        Err(e) => {
            child_diagnostic(&e.to_string());
            e.exit_code()
        }
    })?;

    debug!(?outcome, "child finished");

    Ok(outcome)
}
