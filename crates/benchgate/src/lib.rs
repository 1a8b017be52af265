//! benchgate: password gate and process bridge for the workbench backend.

mod config;
mod exit;
mod liveness;
mod logging;
mod workbench;

pub mod auth;
pub mod bridge;
pub mod supervisor;

pub use config::{AuthConfig, PasswordSource, human_path};
pub use exit::{ProcessExit, TerminationGuard, Terminator};
pub use liveness::{
    LIVENESS_INTERVAL, PARENT_PID_ENV, ProcessExistence, SignalProbe, parent_pid_from_env,
    spawn_liveness_probe,
};
pub use logging::init_logging;
pub use workbench::Workbench;

pub use auth::{AuthGate, BasicLoginPage, LoginError, LoginPage, routes::routes};
pub use supervisor::{BridgeChannel, StdioChannel, SupervisorOptions, run_supervisor};
