//! Parent-process liveness probing.
//!
//! The workbench process must not outlive the gate that spawned it. A
//! background task probes the parent pid on a fixed interval and pulls
//! the guarded exit the moment the probe fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::exit::TerminationGuard;

/// Environment variable carrying the parent process id. Absence is fatal
/// at supervisor startup.
pub const PARENT_PID_ENV: &str = "BENCHGATE_PARENT_PID";

/// Probe interval between liveness checks.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

/// Non-destructive liveness check for a process id.
pub trait ProcessExistence: Send + Sync + 'static {
    fn is_alive(&self, pid: i32) -> bool;
}

/// Signal-0 probe: sends no signal, only checks deliverability.
pub struct SignalProbe;

impl ProcessExistence for SignalProbe {
    fn is_alive(&self, pid: i32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            // The process exists but belongs to someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

/// Read the parent pid the gate exported when spawning us.
pub fn parent_pid_from_env() -> Option<i32> {
    std::env::var(PARENT_PID_ENV).ok()?.trim().parse().ok()
}

/// Spawn the probe task. Independent of the message loop; its only
/// shared state is the termination guard, and exit code 0 distinguishes
/// liveness loss from fatal errors.
pub fn spawn_liveness_probe(
    parent_pid: i32,
    probe: Arc<dyn ProcessExistence>,
    guard: TerminationGuard,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; the probe schedule starts
        // one interval in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !probe.is_alive(parent_pid) {
                tracing::warn!(parent_pid, "parent process is gone, exiting");
                guard.force_exit(0);
                return;
            }
            tracing::trace!(parent_pid, "parent process alive");
        }
    })
}
