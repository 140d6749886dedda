use crate::config::Config;
use crate::error::Result;
use crate::handlers::{battlelog, health_check, player, preflight, AppState, SharedState};
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::rate_limiter::{RateLimiter, SweepHandle};
use crate::upstream::UpstreamClient;
use axum::http::{header, HeaderValue};
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Build the router: `/health` plus the rate-limited, CORS-enabled `/api` routes.
pub fn create_app(state: SharedState) -> Router {
    let api = Router::new()
        .route("/api/player", get(player).options(preflight))
        .route("/api/player/", get(player).options(preflight))
        .route("/api/player/*tag", get(player).options(preflight))
        .route("/api/battlelog", get(battlelog).options(preflight))
        .route("/api/battlelog/", get(battlelog).options(preflight))
        .route("/api/battlelog/*tag", get(battlelog).options(preflight))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(
            ServiceBuilder::new()
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
                    HeaderValue::from_static("Content-Type, Authorization"),
                )),
        );

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    addr: SocketAddr,
    sweeper: SweepHandle,
}

impl Server {
    /// Build the limiter, upstream client and router. Must run inside a tokio
    /// runtime since it spawns the limiter's sweep task.
    pub fn new(config: Config) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let (limiter, sweeper) = RateLimiter::start(config.limiter.clone())?;

        tracing::info!(
            upstream = %upstream.base_url(),
            limits = %serde_json::to_string(&config.limiter).unwrap_or_default(),
            "Rate limiter configured"
        );

        let state: SharedState = Arc::new(AppState { limiter, upstream });

        Ok(Self {
            app: create_app(state),
            addr: config.bind_addr(),
            sweeper,
        })
    }

    pub async fn run(self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        tracing::info!("Brawl Stars API proxy listening on {}", listener.local_addr()?);
        tracing::info!("Health check available at /health");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.sweeper.stop().await;
        tracing::info!("Server stopped");

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
