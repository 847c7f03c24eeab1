//! Invitation lifecycle controller.
//!
//! Owns every state transition: create, resend, cancel, accept, generic
//! field updates, and hard delete. Handlers stay thin; all preconditions
//! and invariants live here, and the guarded store operations make the
//! terminal transitions race-safe.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;

use super::authorization::AuthorizationGate;
use super::email::InvitationNotifier;
use super::jwt::{AccessTokenClaims, JwtService};
use super::store::InvitationStore;
use super::token::generate_token;
use crate::dtos::{
    AcceptInvitationRequest, CreateInvitationRequest, UpdateInvitationRequest,
};
use crate::models::{Invitation, InvitationChanges, InvitationStatus, User};
use crate::utils::password::hash_password;

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn InvitationStore>,
    notifier: Arc<dyn InvitationNotifier>,
    gate: AuthorizationGate,
    jwt: JwtService,
    base_url: String,
}

/// Result of a successful acceptance: the provisioned user, their session
/// credential, and the retired invitation.
pub struct AcceptedInvitation {
    pub user: User,
    pub tokens: super::jwt::TokenResponse,
    pub invitation: Invitation,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn InvitationStore>,
        notifier: Arc<dyn InvitationNotifier>,
        gate: AuthorizationGate,
        jwt: JwtService,
        base_url: String,
    ) -> Self {
        Self {
            store,
            notifier,
            gate,
            jwt,
            base_url,
        }
    }

    pub async fn create(
        &self,
        claims: &AccessTokenClaims,
        req: CreateInvitationRequest,
    ) -> Result<Invitation, AppError> {
        let email = normalize_email(&req.email);

        let organization_id = req
            .organization_id
            .or_else(|| claims.org.clone())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "organization_id is required for principals without an organization"
                ))
            })?;

        let actor = self.gate.resolve_actor(self.store.as_ref(), claims).await?;
        self.gate.authorize(&actor, claims, &organization_id, None)?;

        self.store
            .find_organization(&organization_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))?;

        if let Some(role_id) = req.role_id.as_deref() {
            let role = self
                .store
                .find_role(role_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;
            if role
                .organization_id
                .as_deref()
                .is_some_and(|org| org != organization_id)
            {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Role does not belong to the specified organization"
                )));
            }
        }

        if self
            .store
            .find_user_by_email(&organization_id, &email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "A user with this email already exists in the organization"
            )));
        }

        let now = Utc::now();
        let expires_at = match req.expires_at {
            Some(expires_at) => validated_expiry(expires_at, now)?,
            None => Invitation::default_expiry(now),
        };

        let invitation = Invitation::new(
            email,
            organization_id,
            claims.sub.clone(),
            req.role_id,
            req.department,
            req.message,
            generate_token(),
            expires_at,
        );

        // The unique partial index decides create/create races; a loser
        // surfaces here as Conflict without any check-then-act window.
        self.store.insert_invitation(&invitation).await?;

        tracing::info!(
            invitation_id = %invitation.invitation_id,
            organization_id = %invitation.organization_id,
            "Invitation created"
        );

        self.dispatch_email(&invitation).await;

        Ok(invitation)
    }

    pub async fn list(
        &self,
        claims: &AccessTokenClaims,
        organization_id: Option<String>,
    ) -> Result<Vec<Invitation>, AppError> {
        let actor = self.gate.resolve_actor(self.store.as_ref(), claims).await?;

        match organization_id.or_else(|| claims.org.clone()) {
            Some(org) => {
                self.gate.authorize(&actor, claims, &org, None)?;
                self.store.list_invitations(Some(&org)).await
            }
            // Only a platform admin may list across organizations.
            None if actor == super::authorization::Actor::SuperAdmin => {
                self.store.list_invitations(None).await
            }
            None => Err(AppError::Forbidden(anyhow::anyhow!(
                "You are not allowed to list invitations across organizations"
            ))),
        }
    }

    pub async fn get(
        &self,
        claims: &AccessTokenClaims,
        invitation_id: &str,
    ) -> Result<Invitation, AppError> {
        let invitation = self.fetch(invitation_id).await?;
        self.authorize_existing(claims, &invitation).await?;
        Ok(invitation)
    }

    pub async fn resend(
        &self,
        claims: &AccessTokenClaims,
        invitation_id: &str,
    ) -> Result<Invitation, AppError> {
        let invitation = self.fetch(invitation_id).await?;
        self.authorize_existing(claims, &invitation).await?;

        if invitation.status == InvitationStatus::Accepted {
            return Err(already_accepted());
        }

        let expires_at = Invitation::default_expiry(Utc::now());
        let reissued = self
            .store
            .reissue_invitation(invitation_id, &generate_token(), expires_at)
            .await?
            // The record was just fetched, so a non-matching guard means a
            // concurrent accept got there first.
            .ok_or_else(already_accepted)?;

        tracing::info!(invitation_id = %invitation_id, "Invitation reissued");

        self.dispatch_email(&reissued).await;

        Ok(reissued)
    }

    pub async fn cancel(
        &self,
        claims: &AccessTokenClaims,
        invitation_id: &str,
    ) -> Result<Invitation, AppError> {
        let invitation = self.fetch(invitation_id).await?;
        self.authorize_existing(claims, &invitation).await?;

        if invitation.status == InvitationStatus::Accepted {
            return Err(already_accepted());
        }

        let cancelled = self
            .store
            .cancel_invitation(invitation_id)
            .await?
            .ok_or_else(already_accepted)?;

        tracing::info!(invitation_id = %invitation_id, "Invitation cancelled");

        Ok(cancelled)
    }

    pub async fn update(
        &self,
        claims: &AccessTokenClaims,
        invitation_id: &str,
        req: UpdateInvitationRequest,
    ) -> Result<Invitation, AppError> {
        let invitation = self.fetch(invitation_id).await?;
        self.authorize_existing(claims, &invitation).await?;

        if req.status.is_some() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "status cannot be set directly; use resend, cancel, or accept"
            )));
        }

        let now = Utc::now();
        let changes = InvitationChanges {
            role_id: req.role_id,
            department: req.department,
            message: req.message,
            expires_at: req
                .expires_at
                .map(|expires_at| validated_expiry(expires_at, now))
                .transpose()?,
        };

        if changes.is_empty() {
            return Ok(invitation);
        }

        if let Some(role_id) = changes.role_id.as_deref() {
            self.store
                .find_role(role_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;
        }

        self.store
            .apply_invitation_changes(invitation_id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invitation not found")))
    }

    pub async fn delete(
        &self,
        claims: &AccessTokenClaims,
        invitation_id: &str,
    ) -> Result<(), AppError> {
        let invitation = self.fetch(invitation_id).await?;
        self.authorize_existing(claims, &invitation).await?;

        if !self.store.delete_invitation(invitation_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!("Invitation not found")));
        }

        tracing::info!(invitation_id = %invitation_id, "Invitation deleted");
        Ok(())
    }

    /// Accept an invitation by token: the public, unauthenticated entry
    /// point. Provisions the user and hands back a session credential.
    pub async fn accept(
        &self,
        req: AcceptInvitationRequest,
    ) -> Result<AcceptedInvitation, AppError> {
        let now = Utc::now();
        let token = req.token.trim();

        let invitation = self
            .store
            .find_invitation_by_token(token)
            .await?
            .filter(|invitation| invitation.is_acceptable(now))
            .ok_or_else(stale_token)?;

        if self
            .store
            .find_user_by_email(&invitation.organization_id, &invitation.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "A user with this email already exists"
            )));
        }

        if let Some(username) = req.username.as_deref() {
            if self.store.find_user_by_username(username).await?.is_some() {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Username is already taken"
                )));
            }
        }

        // Atomic claim: exactly one accept wins, and a resend that changed
        // the token in the meantime makes this token stale.
        let invitation = self
            .store
            .claim_invitation(token, now)
            .await?
            .ok_or_else(stale_token)?;

        let password_hash = hash_password(&req.password)?;
        let user = User::provisioned(
            invitation.email.clone(),
            req.username,
            req.full_name,
            password_hash,
            invitation.organization_id.clone(),
            invitation.role_id.clone(),
            invitation.department.clone(),
        );

        self.store.insert_user(&user).await?;

        let tokens = self.jwt.generate_token_pair(
            &user.user_id,
            &user.email,
            Some(&user.organization_id),
            user.role_id.as_deref(),
        )?;

        tracing::info!(
            user_id = %user.user_id,
            invitation_id = %invitation.invitation_id,
            "Invitation accepted, user provisioned"
        );

        Ok(AcceptedInvitation {
            user,
            tokens,
            invitation,
        })
    }

    async fn fetch(&self, invitation_id: &str) -> Result<Invitation, AppError> {
        self.store
            .find_invitation(invitation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invitation not found")))
    }

    async fn authorize_existing(
        &self,
        claims: &AccessTokenClaims,
        invitation: &Invitation,
    ) -> Result<(), AppError> {
        let actor = self.gate.resolve_actor(self.store.as_ref(), claims).await?;
        self.gate.authorize(
            &actor,
            claims,
            &invitation.organization_id,
            Some(&invitation.invited_by),
        )
    }

    /// Fire-and-forget delivery: a failed email never rolls back the
    /// invitation write, it is only audit-logged.
    async fn dispatch_email(&self, invitation: &Invitation) {
        let invite_url = format!(
            "{}/invitations/accept?token={}",
            self.base_url.trim_end_matches('/'),
            invitation.token
        );

        if let Err(e) = self.notifier.send_invitation(invitation, &invite_url).await {
            tracing::warn!(
                invitation_id = %invitation.invitation_id,
                email = %invitation.email,
                error = %e,
                "Invitation email delivery failed"
            );
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validated_expiry(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, AppError> {
    if expires_at <= now {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "expires_at must be in the future"
        )));
    }
    Ok(expires_at)
}

fn already_accepted() -> AppError {
    AppError::Conflict(anyhow::anyhow!("Invitation has already been accepted"))
}

fn stale_token() -> AppError {
    AppError::NotFound(anyhow::anyhow!(
        "Invitation not found, expired, or already used"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_lowercased_and_trimmed() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn past_expiry_override_is_rejected() {
        let now = Utc::now();
        assert!(validated_expiry(now - chrono::Duration::hours(1), now).is_err());
        assert!(validated_expiry(now + chrono::Duration::hours(1), now).is_ok());
    }
}
