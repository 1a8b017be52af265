//! Workbench-side supervisor loop.
//!
//! Owns the lifecycle of the backend it runs in front of: waits for
//! `init`, boots the workbench exactly once, forwards handed-off
//! connections, and runs one-shot `cli` workflows. A parallel liveness
//! probe watches the parent process for the whole lifetime of the loop.
//!
//! All exits funnel through the retained [`TerminationGuard`]
//! capability; nothing else in the process can actually terminate it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, Stdin, Stdout, stdin, stdout};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::JsonCodec;
use crate::bridge::handoff::HandoffReceiver;
use crate::bridge::protocol::{GateMessage, WorkbenchMessage};
use crate::exit::TerminationGuard;
use crate::liveness::{
    LIVENESS_INTERVAL, ProcessExistence, parent_pid_from_env, spawn_liveness_probe,
};
use crate::workbench::Workbench;

/// Both directions of the control channel plus the optional descriptor
/// hand-off stream.
pub struct BridgeChannel<R, T> {
    reader: FramedRead<R, JsonCodec<serde_json::Value>>,
    writer: FramedWrite<T, JsonCodec<WorkbenchMessage>>,
    handoff: Option<HandoffReceiver>,
}

/// The production channel: control frames over stdin/stdout.
pub type StdioChannel = BridgeChannel<Stdin, Stdout>;

impl StdioChannel {
    pub fn stdio(handoff: Option<HandoffReceiver>) -> Self {
        Self::new(stdin(), stdout(), handoff)
    }
}

impl<R, T> BridgeChannel<R, T>
where
    R: AsyncRead + Unpin,
    T: AsyncWrite + Unpin,
{
    pub fn new(read: R, write: T, handoff: Option<HandoffReceiver>) -> Self {
        Self {
            reader: FramedRead::new(read, JsonCodec::new()),
            writer: FramedWrite::new(write, JsonCodec::new()),
            handoff,
        }
    }

    async fn send(&mut self, message: WorkbenchMessage) -> io::Result<()> {
        self.writer.send(message).await
    }

    /// Next inbound frame. Frames decode in two stages so a malformed or
    /// unknown payload surfaces as `InvalidData` without desyncing the
    /// stream.
    async fn next_frame(&mut self) -> Option<io::Result<GateMessage>> {
        match self.reader.next().await? {
            Ok(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            ),
            Err(e) => Some(Err(e)),
        }
    }

    async fn recv_connection(&mut self) -> io::Result<TcpStream> {
        match &self.handoff {
            Some(handoff) => handoff.recv_connection().await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no handoff channel",
            )),
        }
    }
}

/// Startup parameters, normally read from the environment the gate set
/// up when spawning this process.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub parent_pid: Option<i32>,
    pub liveness_interval: Duration,
}

impl SupervisorOptions {
    pub fn from_env() -> Self {
        Self {
            parent_pid: parent_pid_from_env(),
            liveness_interval: LIVENESS_INTERVAL,
        }
    }
}

struct SupervisorState {
    initialized: bool,
    last_options: serde_json::Value,
}

/// Shallow per-field merge: fields present in `update` win, fields only
/// in `previous` survive. A null update keeps the previous options.
fn merge_options(previous: &serde_json::Value, update: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match update {
        Value::Object(new) => match previous {
            Value::Object(prev) => {
                let mut merged = prev.clone();
                for (key, value) in new {
                    merged.insert(key, value);
                }
                Value::Object(merged)
            }
            _ => Value::Object(new),
        },
        Value::Null => previous.clone(),
        other => other,
    }
}

fn message_kind(message: &GateMessage) -> &'static str {
    match message {
        GateMessage::Init { .. } => "init",
        GateMessage::Cli { .. } => "cli",
        GateMessage::Socket { .. } => "socket",
    }
}

/// Run the supervisor until a terminal condition, then take the guarded
/// exit. Preconditions (a known parent pid, a usable channel) are fatal
/// before the loop starts; `ready` goes out exactly once, before any
/// inbound message is processed.
pub async fn run_supervisor<W, R, T>(
    workbench: Arc<W>,
    channel: Option<BridgeChannel<R, T>>,
    options: SupervisorOptions,
    guard: TerminationGuard,
    probe: Arc<dyn ProcessExistence>,
) -> io::Result<()>
where
    W: Workbench,
    R: AsyncRead + Unpin,
    T: AsyncWrite + Unpin,
{
    let Some(parent_pid) = options.parent_pid else {
        tracing::error!("no parent process");
        guard.force_exit(1);
        return Ok(());
    };
    let Some(mut channel) = channel else {
        tracing::error!("not spawned with an IPC channel");
        guard.force_exit(1);
        return Ok(());
    };

    let probe_task = spawn_liveness_probe(
        parent_pid,
        probe,
        guard.clone(),
        options.liveness_interval,
    );

    // Lets the parent know the child is ready to receive messages.
    if let Err(e) = channel.send(WorkbenchMessage::Ready).await {
        tracing::error!(error = %e, "failed to announce readiness");
        probe_task.abort();
        guard.force_exit(1);
        return Ok(());
    }

    let code = message_loop(workbench, &mut channel).await;
    probe_task.abort();
    guard.force_exit(code);
    Ok(())
}

async fn message_loop<W, R, T>(workbench: Arc<W>, channel: &mut BridgeChannel<R, T>) -> i32
where
    W: Workbench,
    R: AsyncRead + Unpin,
    T: AsyncWrite + Unpin,
{
    let mut state = SupervisorState {
        initialized: false,
        last_options: serde_json::Value::Null,
    };

    loop {
        let message = match channel.next_frame().await {
            Some(Ok(message)) => message,
            Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(error = %e, "discarding unrecognized bridge message");
                continue;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "IPC channel failed");
                break 0;
            }
            None => {
                tracing::warn!("IPC channel closed by the parent");
                break 0;
            }
        };

        tracing::debug!(message_type = message_kind(&message), "got message from the gate");
        tracing::trace!(message = ?message, "gate message content");

        match message {
            GateMessage::Init { id, options } => {
                let resolved = if state.initialized {
                    // Already serving: merge options, never boot twice.
                    merge_options(&state.last_options, options)
                } else {
                    match workbench.initialize(options).await {
                        Ok(resolved) => {
                            state.initialized = true;
                            resolved
                        }
                        Err(error) => {
                            tracing::error!(error = %error, "workbench initialization failed");
                            tracing::error!(trace = ?error, "initialization failure detail");
                            break 1;
                        }
                    }
                };
                state.last_options = resolved.clone();
                if let Err(e) = channel
                    .send(WorkbenchMessage::Options { id, options: resolved })
                    .await
                {
                    tracing::error!(error = %e, "failed to send resolved options");
                    break 0;
                }
            }

            GateMessage::Cli { args } => match workbench.cli(args).await {
                Ok(()) => break 0,
                Err(error) => {
                    tracing::error!(error = %error, "cli run failed");
                    tracing::error!(trace = ?error, "cli failure detail");
                    break 1;
                }
            },

            GateMessage::Socket {
                query,
                permessage_deflate,
            } => {
                // The descriptor is consumed either way so later
                // hand-offs stay paired with their frames.
                let connection = match channel.recv_connection().await {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to receive handed-off connection");
                        continue;
                    }
                };
                if !state.initialized {
                    tracing::warn!("connection handed off before initialization, dropping");
                    continue;
                }
                let workbench = Arc::clone(&workbench);
                tokio::spawn(async move {
                    workbench
                        .handle_connection(connection, query, permessage_deflate)
                        .await;
                });
            }
        }
    }
}
