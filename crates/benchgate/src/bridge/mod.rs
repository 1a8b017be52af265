//! IPC bridge between the gate and the workbench process.
//!
//! # Architecture
//!
//! - **protocol**: Message types (GateMessage in, WorkbenchMessage out)
//! - **codec**: JSON framing codec for AsyncRead/AsyncWrite
//! - **handoff**: SCM_RIGHTS transfer of accepted network connections

pub mod codec;
pub mod handoff;
pub mod protocol;
