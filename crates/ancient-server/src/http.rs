//! HTTP transport: JSON-RPC over `POST /`, plus `/health` and `/metrics`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ancient_observability::exporter::create_metrics_router;
use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::trace::TraceLayer;

use crate::api::FreezerApi;

/// Build the HTTP router around a dispatcher.
pub fn router(api: Arc<FreezerApi>) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(health_handler))
        .merge(create_metrics_router())
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn rpc_handler(State(api): State<Arc<FreezerApi>>, body: Bytes) -> Response {
    let payload = api.handle_bytes(&body).await;
    ([(header::CONTENT_TYPE, "application/json")], payload).into_response()
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// HTTP listener bound to an address.
pub struct HttpServer {
    listener: TcpListener,
    api: Arc<FreezerApi>,
}

impl HttpServer {
    pub async fn bind(addr: impl ToSocketAddrs, api: Arc<FreezerApi>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, api })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "HTTP RPC server listening");
        axum::serve(self.listener, router(self.api))
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!(%addr, "HTTP RPC server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ancient_storage::MemoryAncientStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        ancient_observability::init();
        router(Arc::new(FreezerApi::new(Arc::new(MemoryAncientStore::new()))))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rpc_over_post() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"jsonrpc": "2.0", "id": 1, "method": "freezer_ancients"}).to_string(),
            ))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["result"], 0);
    }

    #[tokio::test]
    async fn test_parse_error_is_rpc_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("{"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_on_rpc_path_is_rejected() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
