use std::sync::Arc;

use tally_core::{IngestionService, MetricStore};

use super::subnet::TrustedSubnet;
use crate::wire::WireDecoder;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub decoder: Arc<WireDecoder>,
    pub trusted_subnet: Option<TrustedSubnet>,
}

impl AppState {
    pub fn new(ingestion: Arc<IngestionService>, decoder: WireDecoder) -> Self {
        Self { ingestion, decoder: Arc::new(decoder), trusted_subnet: None }
    }

    pub fn with_trusted_subnet(mut self, subnet: TrustedSubnet) -> Self {
        self.trusted_subnet = Some(subnet);
        self
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        self.ingestion.store()
    }
}
