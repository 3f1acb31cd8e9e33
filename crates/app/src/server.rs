//! Server wiring: backend selection, snapshot persistence and the HTTP
//! listener.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tally_core::{IngestionService, MemoryStore, MetricStore};
use tally_domain::ServerConfig;
use tally_infra::{
    create_router, AppState, DurableStore, SnapshotFile, SnapshotOnWrite, SnapshotScheduler,
    TrustedSubnet, WireDecoder,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How the memory backend is persisted.
enum Persistence {
    /// Durable backend; nothing to do at shutdown
    None,
    /// Saved on a timer, with a final save when stopped
    Periodic(SnapshotScheduler),
    /// Saved after every ingestion, plus once at shutdown
    OnWrite { file: SnapshotFile, store: Arc<MemoryStore> },
}

/// Router plus the background work that must be stopped with it.
pub struct ServerRuntime {
    router: Router,
    store: Arc<dyn MetricStore>,
    persistence: Persistence,
}

impl ServerRuntime {
    /// Select the backend, restore the snapshot if asked, and build the
    /// router.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened, the snapshot cannot be
    /// read, a key file cannot be loaded or the trusted subnet is invalid
    pub async fn build(config: &ServerConfig) -> anyhow::Result<Self> {
        let decoder = WireDecoder::from_server_config(config).context("building wire decoder")?;

        let (ingestion, store, persistence) = match &config.database {
            Some(database) => {
                let durable = DurableStore::open(database, config.retry.clone())
                    .with_context(|| format!("opening database {}", database.path.display()))?;
                let store: Arc<dyn MetricStore> = Arc::new(durable);
                info!(path = %database.path.display(), "using durable backend");
                (IngestionService::new(Arc::clone(&store)), store, Persistence::None)
            }
            None => {
                let memory = Arc::new(MemoryStore::new());
                let file = SnapshotFile::new(&config.snapshot_path);
                if config.restore {
                    file.restore_into(&memory).context("restoring snapshot")?;
                }

                let store: Arc<dyn MetricStore> = memory.clone();
                let ingestion = IngestionService::new(Arc::clone(&store));
                if config.store_interval_secs == 0 {
                    let observer = Arc::new(SnapshotOnWrite::new(file.clone(), Arc::clone(&memory)));
                    let persistence = Persistence::OnWrite { file, store: memory };
                    (ingestion.with_observer(observer), store, persistence)
                } else {
                    let mut scheduler =
                        SnapshotScheduler::new(memory, file, config.store_interval());
                    scheduler.start().await?;
                    (ingestion, store, Persistence::Periodic(scheduler))
                }
            }
        };

        let mut state = AppState::new(Arc::new(ingestion), decoder);
        if let Some(subnet) = &config.trusted_subnet {
            let subnet = TrustedSubnet::parse(subnet)?;
            info!(%subnet, "trusted subnet guard enabled");
            state = state.with_trusted_subnet(subnet);
        }

        Ok(Self { router: create_router(state), store, persistence })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Serve until `shutdown` resolves, then stop background work.
    ///
    /// # Errors
    ///
    /// Returns error if the listener fails
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let address = listener.local_addr().context("reading listen address")?;
        info!(%address, backend = self.store.backend_name(), "server listening");

        let served = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown)
            .await
            .context("serving HTTP");

        self.shutdown().await;
        served
    }

    /// Stop the snapshot loop or take the final snapshot.
    pub async fn shutdown(self) {
        match self.persistence {
            Persistence::None => {}
            Persistence::Periodic(mut scheduler) => {
                if let Err(e) = scheduler.stop().await {
                    warn!(error = %e, "snapshot loop did not stop cleanly");
                }
            }
            Persistence::OnWrite { file, store } => {
                match tokio::task::spawn_blocking(move || file.save(&store)).await {
                    Ok(Ok(saved)) => info!(saved, "final snapshot written"),
                    Ok(Err(e)) => warn!(error = %e, "final snapshot failed"),
                    Err(e) => warn!(error = %e, "final snapshot task failed"),
                }
            }
        }
        info!("server stopped");
    }
}

/// Bind the configured address and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns error if the server cannot be built or the address cannot be
/// bound
pub async fn run_server(
    config: ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let runtime = ServerRuntime::build(&config).await?;
    let listener = match TcpListener::bind(&config.address).await {
        Ok(listener) => listener,
        Err(e) => {
            runtime.shutdown().await;
            return Err(e).with_context(|| format!("binding {}", config.address));
        }
    };
    runtime.serve(listener, shutdown).await
}
