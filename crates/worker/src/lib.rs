//! Pipeline workers for the presence engine.
//!
//! - Enrichment (broker batch → status lookups → object store)
//! - Retention (periodic expiry of stale objects)
//! - Callback (inbound trigger → producer)
//! - Coordinator (shared cancellation and ordered shutdown)

pub mod callback;
pub mod coordinator;
pub mod enrichment;
pub mod retention;

pub use callback::Callback;
pub use coordinator::{shutdown_signal, ShutdownCoordinator};
pub use enrichment::{EnrichmentConfig, EnrichmentHandler, StatusClient};
pub use retention::RetentionSweeper;
