//! Metric agent entry point.

use clap::Parser;
use tally_app::{init_tracing, run_agent, shutdown_signal, AgentArgs};
use tally_infra::config::load_agent_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AgentArgs::parse();

    let mut config = load_agent_config(args.common.config.clone())?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;
    run_agent(config, shutdown_signal()).await
}
