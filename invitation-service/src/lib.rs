pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::InvitationConfig;
use crate::services::{InvitationService, InvitationStore, JwtService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvitationConfig,
    pub store: Arc<dyn InvitationStore>,
    pub invitations: InvitationService,
    pub jwt: JwtService,
}

pub fn build_router(state: AppState) -> Router {
    // Acceptance is the only public business route: the invitee does not
    // have an account yet, the token is the credential.
    let protected = Router::new()
        .route(
            "/invitations",
            post(handlers::invitation::create_invitation)
                .get(handlers::invitation::list_invitations),
        )
        .route(
            "/invitations/:id",
            get(handlers::invitation::get_invitation)
                .put(handlers::invitation::update_invitation)
                .delete(handlers::invitation::delete_invitation),
        )
        .route(
            "/invitations/:id/resend",
            post(handlers::invitation::resend_invitation),
        )
        .route(
            "/invitations/:id/cancel",
            post(handlers::invitation::cancel_invitation),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(startup::health_check))
        .route("/ready", get(startup::readiness_check))
        .route(
            "/invitations/accept",
            post(handlers::invitation::accept_invitation),
        )
        .merge(protected)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(CorsLayer::permissive())
}
