//! Wire protocol types for gate-workbench communication.
//!
//! One control channel per parent/child pair:
//! - **Inbound** (gate to workbench): Init, Cli, Socket
//! - **Outbound** (workbench to gate): Ready, Options
//!
//! Connection handles for `socket` travel out-of-band on the handoff
//! socket (see [`super::handoff`]); the control frame carries only the
//! query parameters and the compression flag.

use serde::{Deserialize, Serialize};

/// Control messages from the gate to the workbench process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateMessage {
    /// Backend configuration with a correlation id. The first accepted
    /// Init boots the workbench; later ones only update options.
    Init {
        id: u64,
        #[serde(default)]
        options: serde_json::Value,
    },

    /// One-shot command-line workflow. Terminal: the process exits when
    /// the run completes, whatever the outcome.
    Cli {
        args: Vec<String>,
    },

    /// An accepted network connection is being handed over. The raw
    /// descriptor arrives separately; frames and descriptors pair FIFO.
    #[serde(rename_all = "camelCase")]
    Socket {
        #[serde(default)]
        query: serde_json::Value,
        permessage_deflate: bool,
    },
}

/// Control messages from the workbench process to the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkbenchMessage {
    /// Emitted exactly once at startup, before any inbound message is
    /// processed. Lets the gate know the child accepts messages.
    Ready,

    /// Resolved workbench options, correlated to the Init that asked.
    Options {
        id: u64,
        options: serde_json::Value,
    },
}
