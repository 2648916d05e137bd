//! Ancient Store Observability
//!
//! Prometheus metrics for the freezer, its object backend, the RPC surface
//! and the freezing pipeline, plus the router serving them.
//!
//! # Usage
//!
//! ```no_run
//! use ancient_observability::{exporter, metrics};
//!
//! metrics::init();
//! let metrics_router = exporter::create_metrics_router::<()>();
//! ```

pub mod exporter;
pub mod metrics;

pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}
