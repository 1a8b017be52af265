//! Guarded process termination.
//!
//! The workbench embeds large subsystems that occasionally decide to end
//! the process on their own. All of that code is handed
//! [`TerminationGuard::request_exit`], which logs and refuses. The one
//! capability that really ends the process stays with the supervisor and
//! is reachable only through [`TerminationGuard::force_exit`].

use std::sync::Arc;

/// The capability that actually ends the process.
pub trait Terminator: Send + Sync + 'static {
    fn exit(&self, code: i32);
}

/// Production terminator.
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Cloneable handle pairing the intercepted exit path with the retained
/// real one.
#[derive(Clone)]
pub struct TerminationGuard {
    terminator: Arc<dyn Terminator>,
}

impl Default for TerminationGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationGuard {
    pub fn new() -> Self {
        Self::with_terminator(Arc::new(ProcessExit))
    }

    pub fn with_terminator(terminator: Arc<dyn Terminator>) -> Self {
        Self { terminator }
    }

    /// The ambient exit path handed to embedded logic. Logged, otherwise
    /// a no-op.
    pub fn request_exit(&self, code: Option<i32>) {
        match code {
            Some(code) => tracing::warn!(code, "process exit prevented"),
            None => tracing::warn!("process exit prevented: unknown code"),
        }
    }

    /// Actually terminate. Supervisor use only: liveness loss, fatal
    /// init/cli outcome, or CLI completion.
    pub fn force_exit(&self, code: i32) {
        tracing::debug!(code, "terminating process");
        self.terminator.exit(code);
    }
}
