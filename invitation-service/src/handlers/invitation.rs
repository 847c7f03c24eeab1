//! Invitation HTTP handlers.
//!
//! Thin layer: extract, delegate to the lifecycle controller, shape the
//! response. All preconditions and transition rules live in the service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    AcceptInvitationRequest, AcceptInvitationResponse, CreateInvitationRequest,
    InvitationListParams, InvitationListResponse, InvitationResponse, UpdateInvitationRequest,
    UserResponse,
};
use crate::middleware::AuthUser;
use crate::utils::validation::ValidatedJson;
use crate::AppState;

/// POST /invitations
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn create_invitation(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.create(&claims, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse::from(invitation)),
    ))
}

/// GET /invitations?organization_id=
#[tracing::instrument(skip_all)]
pub async fn list_invitations(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(params): Query<InvitationListParams>,
) -> Result<impl IntoResponse, AppError> {
    let invitations = state
        .invitations
        .list(&claims, params.organization_id)
        .await?;

    let invitations: Vec<InvitationResponse> =
        invitations.into_iter().map(InvitationResponse::from).collect();
    let total = invitations.len();

    Ok(Json(InvitationListResponse { invitations, total }))
}

/// GET /invitations/:id
#[tracing::instrument(skip(state, claims))]
pub async fn get_invitation(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.get(&claims, &invitation_id).await?;
    Ok(Json(InvitationResponse::from(invitation)))
}

/// POST /invitations/:id/resend
#[tracing::instrument(skip(state, claims))]
pub async fn resend_invitation(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.resend(&claims, &invitation_id).await?;
    Ok(Json(InvitationResponse::from(invitation)))
}

/// PUT /invitations/:id
#[tracing::instrument(skip(state, claims, req))]
pub async fn update_invitation(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(invitation_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state
        .invitations
        .update(&claims, &invitation_id, req)
        .await?;
    Ok(Json(InvitationResponse::from(invitation)))
}

/// POST /invitations/:id/cancel
#[tracing::instrument(skip(state, claims))]
pub async fn cancel_invitation(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.cancel(&claims, &invitation_id).await?;
    Ok(Json(InvitationResponse::from(invitation)))
}

/// DELETE /invitations/:id
#[tracing::instrument(skip(state, claims))]
pub async fn delete_invitation(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(invitation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.invitations.delete(&claims, &invitation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /invitations/accept (public)
#[tracing::instrument(skip_all)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AcceptInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let accepted = state.invitations.accept(req).await?;
    Ok(Json(AcceptInvitationResponse {
        user: UserResponse::from(accepted.user),
        tokens: accepted.tokens,
    }))
}
