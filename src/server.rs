//! Health and metrics endpoints

use crate::observability::{Metrics, Observer};
use crate::storage::StorageNode;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
struct AppState {
    metrics: Arc<Metrics>,
    node: Arc<dyn StorageNode>,
}

pub fn router(metrics: Arc<Metrics>, node: Arc<dyn StorageNode>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(AppState { metrics, node })
}

/// Serve until `shutdown` flips to `true`
pub async fn run(
    address: SocketAddr,
    metrics: Arc<Metrics>,
    node: Arc<dyn StorageNode>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AnyError> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Metrics server listening");

    axum::serve(listener, router(metrics, node).into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Node gauges are read fresh on every scrape; idle cycles never touch them
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.node.peer_count().await {
        Ok(peers) => state.metrics.node_peers(peers),
        Err(e) => warn!(error = %e, "Metrics could not get peers"),
    }
    match state.node.repo_stats().await {
        Ok(usage) => state.metrics.repo_usage(&usage),
        Err(e) => warn!(error = %e, "Metrics could not get repo stats"),
    }

    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render_prometheus(),
    )
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryNode;
    use crate::worker::JobKind;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn scrape(app: Router) -> String {
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(Arc::new(Metrics::new()), Arc::new(InMemoryNode::new()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let metrics = Arc::new(Metrics::new());
        metrics.job_finished(JobKind::Download, true, Duration::from_secs(3));

        let text = scrape(router(metrics, Arc::new(InMemoryNode::new()))).await;
        assert!(text.contains("pincast_jobs_total{kind=\"download\",result=\"success\"} 1"));
    }

    #[tokio::test]
    async fn test_scrape_refreshes_node_gauges() {
        let node = Arc::new(InMemoryNode::new());
        node.make_reachable("QmDir", "QmFile", 5000);
        let metrics = Arc::new(Metrics::new());

        let text = scrape(router(metrics.clone(), node)).await;

        assert!(text.contains("pincast_repo_used_bytes 5000"));
        assert!(text.contains("pincast_node_peers 8"));
        assert_eq!(metrics.snapshot().repo_objects, 2);
    }

    #[tokio::test]
    async fn test_scrape_survives_node_failure() {
        let node = Arc::new(InMemoryNode::new());
        node.fail("swarm/peers");
        node.fail("repo/stat");
        let metrics = Arc::new(Metrics::new());
        metrics.node_peers(3);

        let text = scrape(router(metrics, node)).await;

        // Last known values are kept
        assert!(text.contains("pincast_node_peers 3"));
        assert!(text.contains("pincast_repo_used_bytes 0"));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let address: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = tokio::spawn(run(
            address,
            Arc::new(Metrics::new()),
            Arc::new(InMemoryNode::new()),
            rx,
        ));

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
