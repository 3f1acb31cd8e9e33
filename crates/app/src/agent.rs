//! Agent wiring: poll into a memory store, report on a timer.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tally_core::{CollectionService, MemoryStore, MetricStore, SampleSource};
use tally_domain::AgentConfig;
use tally_infra::{
    CollectionScheduler, DeliveryClient, DeliveryConfig, SystemSampleSource, WireEncoder,
};
use tracing::{info, warn};

/// Collection and delivery loops sharing one store.
pub struct AgentRuntime {
    store: Arc<MemoryStore>,
    collection: CollectionScheduler,
    delivery: DeliveryClient,
}

impl AgentRuntime {
    /// Build the agent around the system sample source.
    ///
    /// # Errors
    ///
    /// Returns error if a key file cannot be loaded or the server address
    /// is invalid
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        Self::with_source(config, Arc::new(SystemSampleSource::new()))
    }

    /// Build the agent around any sample source.
    ///
    /// # Errors
    ///
    /// Same as [`AgentRuntime::new`]
    pub fn with_source(config: &AgentConfig, source: Arc<dyn SampleSource>) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn MetricStore> = store.clone();

        let collection = CollectionScheduler::new(
            Arc::new(CollectionService::new(source, Arc::clone(&shared))),
            config.poll_interval(),
        );

        let encoder = WireEncoder::from_agent_config(config).context("building wire encoder")?;
        let delivery_config =
            DeliveryConfig::from_agent_config(config).context("reading delivery settings")?;
        let delivery = DeliveryClient::new(delivery_config, shared, encoder)
            .context("building delivery client")?;

        Ok(Self { store, collection, delivery })
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// # Errors
    ///
    /// Returns error if either loop is already running
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.collection.start().await?;
        if let Err(e) = self.delivery.start().await {
            self.collection.stop().await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop polling first, then drain in-flight sends.
    pub async fn stop(&mut self) {
        if let Err(e) = self.collection.stop().await {
            warn!(error = %e, "collection loop did not stop cleanly");
        }
        if let Err(e) = self.delivery.stop().await {
            warn!(error = %e, "delivery loop did not stop cleanly");
        }
    }
}

/// Run the agent until `shutdown` resolves.
///
/// # Errors
///
/// Returns error if the agent cannot be built or started
pub async fn run_agent(
    config: AgentConfig,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let mut runtime = AgentRuntime::new(&config)?;
    runtime.start().await?;
    info!(
        server = %config.base_url(),
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        "agent started"
    );

    shutdown.await;
    info!("shutdown requested");
    runtime.stop().await;
    info!("agent stopped");
    Ok(())
}
