//! HTTP ingestion and query server

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod subnet;

pub use handlers::ApiError;
pub use router::create_router;
pub use state::AppState;
pub use subnet::TrustedSubnet;
