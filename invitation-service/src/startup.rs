//! Application startup and lifecycle management.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::InvitationConfig;
use crate::services::{
    AuthorizationGate, InvitationNotifier, InvitationService, InvitationStore, JwtService,
    MockNotifier, MongoStore, SmtpNotifier,
};
use crate::{build_router, AppState};

/// Health check endpoint for liveness probes.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "invitation-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "invitation-service",
                "error": e.to_string()
            })),
        ),
    }
}

/// Readiness check endpoint for readiness probes.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build against MongoDB and the configured SMTP transport.
    pub async fn build(config: InvitationConfig) -> Result<Self, AppError> {
        let store = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database).await?;
        store.initialize_indexes().await?;

        let notifier: Arc<dyn InvitationNotifier> = if config.smtp.enabled {
            match SmtpNotifier::new(config.smtp.clone()) {
                Ok(notifier) => {
                    tracing::info!("SMTP notifier initialized");
                    Arc::new(notifier)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}. Using mock.", e);
                    Arc::new(MockNotifier::new())
                }
            }
        } else {
            tracing::info!("SMTP disabled, using mock notifier");
            Arc::new(MockNotifier::new())
        };

        Self::with_store(config, Arc::new(store), notifier).await
    }

    /// Build with explicit store and notifier implementations. Tests use
    /// this with the in-memory store and the mock notifier.
    pub async fn with_store(
        config: InvitationConfig,
        store: Arc<dyn InvitationStore>,
        notifier: Arc<dyn InvitationNotifier>,
    ) -> Result<Self, AppError> {
        let jwt = JwtService::new(&config.jwt);
        let gate = AuthorizationGate::new(config.invitations.allow_member_invites);

        let invitations = InvitationService::new(
            store.clone(),
            notifier,
            gate,
            jwt.clone(),
            config.invitations.base_url.clone(),
        );

        let state = AppState {
            config: config.clone(),
            store,
            invitations,
            jwt,
        };

        // Port 0 binds a random free port, which is what tests want.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("invitation-service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the HTTP server until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
