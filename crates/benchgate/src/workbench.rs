//! Collaborator seam for the fronted workbench backend.

use tokio::net::TcpStream;

/// The long-lived backend this bridge fronts.
///
/// The supervisor drives exactly one implementation per process:
/// `initialize` runs at most once, `cli` ends the process when it
/// returns, and `handle_connection` takes ownership of upgraded
/// connections.
#[async_trait::async_trait]
pub trait Workbench: Send + Sync + 'static {
    /// Boot the backend with the supplied options and return the
    /// resolved option set the gate should see.
    async fn initialize(&self, options: serde_json::Value) -> anyhow::Result<serde_json::Value>;

    /// Run the one-shot command-line workflow to completion.
    async fn cli(&self, args: Vec<String>) -> anyhow::Result<()>;

    /// Take over a handed-off connection for protocol upgrade. Ownership
    /// transfers here; there is no reply.
    async fn handle_connection(
        &self,
        connection: TcpStream,
        query: serde_json::Value,
        permessage_deflate: bool,
    );
}
