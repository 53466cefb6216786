//! Router construction and server host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::Request,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::core::engine::Engine;
use crate::http::handlers::{download_video, fetch_playlist, index, job_progress, serve_file};
use crate::http::AppState;

pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    pub fn new(engine: Engine) -> Self {
        let state = Arc::new(AppState { engine });

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                    tracing::debug!("request completed");
                },
            );

        let router = Self::build_router().layer(trace_layer).with_state(state);
        Self { router }
    }

    fn build_router() -> Router<Arc<AppState>> {
        Router::new()
            .route("/", get(index))
            .route("/fetch_playlist", post(fetch_playlist))
            .route("/download_video", post(download_video))
            .route("/progress/{job_id}", get(job_progress))
            .route("/serve_file/{filename}", get(serve_file))
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Binds and serves until ctrl-c.
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, self.into_router().into_make_service())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested");
            })
            .await?;
        Ok(())
    }
}
