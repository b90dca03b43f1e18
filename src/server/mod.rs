pub mod api;
pub mod dtos;
pub mod error;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, header},
    routing::get,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    normalize_path::NormalizePathLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use api::{
    health_controller::health_endpoint, proxy_controller::ProxyController,
    stream_controller::StreamController,
};
use services::edge_services::EdgeServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// media players hit both relay endpoints cross origin, so every response they produce (errors
/// and preflights included) carries these
fn relay_cors(router: Router) -> Router {
    router
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Range, Content-Type"),
        ))
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// the whole request handler, no socket involved. serverless hosts and tests start here
    pub fn router(services: EdgeServices) -> Router {
        Lazy::force(&START_TIME);

        Router::new()
            .merge(relay_cors(StreamController::app()))
            .merge(relay_cors(ProxyController::app()))
            .route("/health", get(health_endpoint))
            .layer(Extension(services))
            .layer(TraceLayer::new_for_http())
    }

    /// builds the services and binds the port, unless something else owns the socket. serverless
    /// adapters should call `router` themselves
    pub async fn run(config: Arc<AppConfig>) -> anyhow::Result<()> {
        let services = EdgeServices::new(config.clone())?;

        if config.serverless {
            info!("serverless mode, services built but not binding a port");
            return Ok(());
        }

        let mut router = Self::router(services);

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => router = router.merge(Self::metrics_router(handle)),
            Err(e) => warn!("metrics recorder not installed: {}", e),
        }

        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!("kitanime edge relay listening on {}", addr);
        info!("environment: {:?}", config.cargo_env);

        let app = NormalizePathLayer::trim_trailing_slash().layer(router);

        axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        Ok(())
    }

    fn metrics_router(handle: PrometheusHandle) -> Router {
        Router::new().route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        )
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        return;
    }
    info!("shutdown signal received, draining connections");
}
