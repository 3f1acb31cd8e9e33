//! # Tally Application
//!
//! Process wiring for the two binaries:
//! - `tally-agent` polls system metrics and reports them to the server
//! - `tally-server` ingests batches and answers queries
//!
//! Each binary resolves its config (defaults, file, `TALLY_*` variables,
//! then flags), installs tracing and runs until Ctrl-C.

pub mod agent;
pub mod cli;
pub mod logging;
pub mod server;

pub use agent::{run_agent, AgentRuntime};
pub use cli::{AgentArgs, CommonArgs, ServerArgs};
pub use logging::init_tracing;
pub use server::{run_server, ServerRuntime};

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
