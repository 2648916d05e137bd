use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Freezer Metrics
    // ============================================================================

    /// Records appended
    pub static ref APPENDS_TOTAL: IntCounter = IntCounter::new(
        "ancient_appends_total",
        "Total records appended to the freezer"
    ).expect("metric can be created");

    /// Current frozen count
    pub static ref FROZEN_ITEMS: IntGauge = IntGauge::new(
        "ancient_frozen_items",
        "Current frozen count (one past the highest stored item)"
    ).expect("metric can be created");

    /// Syncs performed
    pub static ref SYNCS_TOTAL: IntCounter = IntCounter::new(
        "ancient_syncs_total",
        "Total freezer syncs"
    ).expect("metric can be created");

    /// Sync latency
    pub static ref SYNC_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ancient_sync_latency_seconds", "Freezer sync latency in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["family"]
    ).expect("metric can be created");

    /// Truncations performed
    pub static ref TRUNCATIONS_TOTAL: IntCounter = IntCounter::new(
        "ancient_truncations_total",
        "Total freezer truncations"
    ).expect("metric can be created");

    /// Chunk uploads by family
    pub static ref CHUNK_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_chunk_uploads_total", "Total chunks uploaded"),
        &["family"]
    ).expect("metric can be created");

    /// Chunk downloads by family
    pub static ref CHUNK_DOWNLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_chunk_downloads_total", "Total chunks downloaded"),
        &["family"]
    ).expect("metric can be created");

    /// Cache hits by cache (write, read)
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_cache_hits_total", "Total item cache hits"),
        &["cache"]
    ).expect("metric can be created");

    /// Cache misses
    pub static ref CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "ancient_cache_misses_total",
        "Total item cache misses"
    ).expect("metric can be created");

    // ============================================================================
    // Object Backend Metrics
    // ============================================================================

    /// Backend requests by operation type
    pub static ref BACKEND_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_backend_requests_total", "Total object backend requests"),
        &["operation"] // GET, PUT, DELETE, LIST
    ).expect("metric can be created");

    /// Backend errors by type
    pub static ref BACKEND_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_backend_errors_total", "Total object backend errors"),
        &["operation", "error_type"] // retry, failed, not_found
    ).expect("metric can be created");

    /// Backend request latency
    pub static ref BACKEND_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ancient_backend_latency_seconds", "Object backend latency in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");

    // ============================================================================
    // RPC Metrics
    // ============================================================================

    /// RPC requests by method
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_rpc_requests_total", "Total RPC requests"),
        &["method"]
    ).expect("metric can be created");

    /// RPC errors by method and error kind
    pub static ref RPC_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_rpc_errors_total", "Total RPC errors"),
        &["method", "kind"]
    ).expect("metric can be created");

    /// Active local-socket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        "ancient_connections_active",
        "Number of active local-socket connections"
    ).expect("metric can be created");

    // ============================================================================
    // Pipeline Metrics
    // ============================================================================

    /// Items promoted from the hot store into the freezer
    pub static ref PIPELINE_PROMOTED_TOTAL: IntCounter = IntCounter::new(
        "ancient_pipeline_promoted_total",
        "Total items promoted into the freezer"
    ).expect("metric can be created");

    /// Pipeline batches by outcome
    pub static ref PIPELINE_BATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ancient_pipeline_batches_total", "Total freezing pipeline batches"),
        &["outcome"] // complete, aborted, failed
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(APPENDS_TOTAL.clone()))
            .expect("appends_total can be registered");
        REGISTRY
            .register(Box::new(FROZEN_ITEMS.clone()))
            .expect("frozen_items can be registered");
        REGISTRY
            .register(Box::new(SYNCS_TOTAL.clone()))
            .expect("syncs_total can be registered");
        REGISTRY
            .register(Box::new(SYNC_LATENCY.clone()))
            .expect("sync_latency can be registered");
        REGISTRY
            .register(Box::new(TRUNCATIONS_TOTAL.clone()))
            .expect("truncations_total can be registered");
        REGISTRY
            .register(Box::new(CHUNK_UPLOADS_TOTAL.clone()))
            .expect("chunk_uploads_total can be registered");
        REGISTRY
            .register(Box::new(CHUNK_DOWNLOADS_TOTAL.clone()))
            .expect("chunk_downloads_total can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("cache_hits_total can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("cache_misses_total can be registered");

        REGISTRY
            .register(Box::new(BACKEND_REQUESTS_TOTAL.clone()))
            .expect("backend_requests_total can be registered");
        REGISTRY
            .register(Box::new(BACKEND_ERRORS_TOTAL.clone()))
            .expect("backend_errors_total can be registered");
        REGISTRY
            .register(Box::new(BACKEND_LATENCY.clone()))
            .expect("backend_latency can be registered");

        REGISTRY
            .register(Box::new(RPC_REQUESTS_TOTAL.clone()))
            .expect("rpc_requests_total can be registered");
        REGISTRY
            .register(Box::new(RPC_ERRORS_TOTAL.clone()))
            .expect("rpc_errors_total can be registered");
        REGISTRY
            .register(Box::new(CONNECTIONS_ACTIVE.clone()))
            .expect("connections_active can be registered");

        REGISTRY
            .register(Box::new(PIPELINE_PROMOTED_TOTAL.clone()))
            .expect("pipeline_promoted_total can be registered");
        REGISTRY
            .register(Box::new(PIPELINE_BATCHES_TOTAL.clone()))
            .expect("pipeline_batches_total can be registered");
    });
}
