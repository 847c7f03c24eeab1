//! Request/response DTOs for the invitation API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Invitation, InvitationStatus, User};
use crate::services::TokenResponse;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    /// Defaults to the acting principal's organization.
    pub organization_id: Option<String>,
    pub role_id: Option<String>,
    pub department: Option<String>,
    pub message: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvitationRequest {
    pub role_id: Option<String>,
    pub department: Option<String>,
    pub message: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Present only to be rejected: status is not directly writable.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[validate(length(min = 1, message = "full name is required"))]
    pub full_name: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 3, message = "username must be at least 3 characters"))]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvitationListParams {
    pub organization_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub invitation_id: String,
    pub email: String,
    pub organization_id: String,
    pub invited_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub token: String,
    /// Derived status: pending records past expiry read as expired.
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_utc: Option<DateTime<Utc>>,
}

impl From<Invitation> for InvitationResponse {
    fn from(invitation: Invitation) -> Self {
        let status = invitation.effective_status(Utc::now());
        Self {
            invitation_id: invitation.invitation_id,
            email: invitation.email,
            organization_id: invitation.organization_id,
            invited_by: invitation.invited_by,
            role_id: invitation.role_id,
            department: invitation.department,
            token: invitation.token,
            status,
            expires_at: invitation.expires_at,
            message: invitation.message,
            created_utc: invitation.created_utc,
            updated_utc: invitation.updated_utc,
            accepted_utc: invitation.accepted_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationListResponse {
    pub invitations: Vec<InvitationResponse>,
    pub total: usize,
}

/// User shape safe to return to callers (no password hash).
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub full_name: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub status: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            organization_id: user.organization_id,
            role_id: user.role_id,
            department: user.department,
            status: user.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AcceptInvitationResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}
