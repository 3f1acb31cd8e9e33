//! Metric server entry point.

use clap::Parser;
use tally_app::{init_tracing, run_server, shutdown_signal, ServerArgs};
use tally_infra::config::load_server_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    let mut config = load_server_config(args.common.config.clone())?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;
    run_server(config, shutdown_signal()).await
}
