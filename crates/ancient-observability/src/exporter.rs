//! `/metrics` in the Prometheus text format, mounted next to the freezer's
//! JSON-RPC endpoint by the HTTP listener.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// Everything registered in [`REGISTRY`], with its content type.
pub fn render() -> prometheus::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut body)?;
    Ok((encoder.format_type().to_string(), body))
}

async fn scrape() -> Response {
    match render() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot encode freezer metrics: {}", e),
        )
            .into_response(),
    }
}

/// Route for `GET /metrics`. Generic over the state of the router it is
/// merged into, so the RPC router can keep its dispatcher state.
pub fn create_metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(scrape))
}
