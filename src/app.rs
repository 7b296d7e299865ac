use crate::bridge::BridgeController;
use crate::config::Config;
use crate::provider::{HttpProviderClient, ProviderClient};
use crate::registry::{CallRegistry, Clock, SystemClock};
use anyhow::Result;
use axum::Router;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

const SHUTDOWN_POLL_MS: u64 = 500;

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub registry: Arc<CallRegistry>,
    pub bridge: Arc<BridgeController>,
    pub token: CancellationToken,
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateBuilder {
    config: Option<Config>,
    provider: Option<Arc<dyn ProviderClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            provider: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Swap in a fake provider; tests use this to avoid a real telephony
    /// backend.
    pub fn provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<AppState> {
        let config = Arc::new(self.config.unwrap_or_default());
        let token = CancellationToken::new();

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let registry = Arc::new(CallRegistry::new(clock));
        registry.spawn_evictor(token.child_token());

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(HttpProviderClient::new(&config.provider)));
        let bridge = Arc::new(BridgeController::new(
            registry.clone(),
            provider,
            config.provider.source_number.clone(),
            config.target_number_override.clone(),
        ));

        Ok(Arc::new(AppStateInner {
            config,
            registry,
            bridge,
            token,
        }))
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    crate::handler::router().with_state(state).layer(cors)
}

pub async fn run(state: AppState) -> Result<()> {
    let token = state.token.clone();
    let app = create_router(state.clone());
    let addr: SocketAddr = state.config.http_addr.parse()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(anyhow::anyhow!("Failed to bind to {}: {}", addr, e));
        }
    };

    let http_task = axum::serve(listener, app).into_future();
    select! {
        http_result = http_task => {
            match http_result {
                Ok(_) => info!("Server shut down gracefully"),
                Err(e) => {
                    tracing::error!("Server error: {}", e);
                    return Err(anyhow::anyhow!("Server error: {}", e));
                }
            }
        }
        _ = token.cancelled() => {
            info!("Application shutting down due to cancellation");
        }
    }
    Ok(())
}

/// Delays process exit while any call is still mid-bridge, so termination
/// never cuts a live conference. Bounded by in-flight calls, not by a
/// timer.
pub async fn wait_for_live_calls(state: &AppState) {
    while state.bridge.is_in_progress().await {
        info!("waiting for in-progress calls before exit");
        tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
    }
}
