//! Invitation record store abstraction.
//!
//! The lifecycle controller only talks to this trait. Transitions that race
//! (resend vs accept, double accept) are expressed as single atomic guarded
//! updates so that concurrent callers cannot both succeed; implementations
//! must preserve that.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{
    Invitation, InvitationChanges, InvitationStatus, Organization, Role, User,
};

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Insert a new invitation. Fails with Conflict when a pending
    /// invitation for the same (email, organization) already exists.
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), AppError>;

    async fn find_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, AppError>;

    async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError>;

    /// List invitations, newest first, optionally scoped to an organization.
    async fn list_invitations(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<Invitation>, AppError>;

    /// Regenerate token and expiry and force the record back to pending.
    /// Guarded on `status != accepted`; returns None when the guard does not
    /// match (missing record or already accepted).
    async fn reissue_invitation(
        &self,
        invitation_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError>;

    /// Soft-terminate the invitation. Guarded on `status != accepted`;
    /// cancelling an already-cancelled record is a no-op that still matches.
    async fn cancel_invitation(&self, invitation_id: &str)
        -> Result<Option<Invitation>, AppError>;

    /// Atomically claim a token for acceptance: the record must be pending
    /// and unexpired at claim time. Returns the accepted record, or None if
    /// the token is unknown, stale, expired, or lost a concurrent race.
    async fn claim_invitation(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError>;

    /// Apply non-status field changes to an existing record.
    async fn apply_invitation_changes(
        &self,
        invitation_id: &str,
        changes: &InvitationChanges,
    ) -> Result<Option<Invitation>, AppError>;

    /// Hard delete. Returns whether a record was removed.
    async fn delete_invitation(&self, invitation_id: &str) -> Result<bool, AppError>;

    /// Insert a provisioned user. Fails with Conflict when the email is
    /// taken within the organization or the username is taken anywhere.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    async fn find_user_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> Result<Option<User>, AppError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_organization(
        &self,
        organization_id: &str,
    ) -> Result<Option<Organization>, AppError>;

    async fn find_role(&self, role_id: &str) -> Result<Option<Role>, AppError>;
}

/// In-memory store with the same guard semantics as the MongoDB
/// implementation. Serves the integration tests the way the mock providers
/// serve the notifier: no external dependency, identical contract.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    invitations: HashMap<String, Invitation>,
    users: HashMap<String, User>,
    organizations: HashMap<String, Organization>,
    roles: HashMap<String, Role>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_organization(&self, organization: Organization) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .organizations
            .insert(organization.organization_id.clone(), organization);
    }

    pub fn seed_role(&self, role: Role) {
        let mut inner = self.inner.lock().unwrap();
        inner.roles.insert(role.role_id.clone(), role);
    }

    pub fn seed_user(&self, user: User) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.user_id.clone(), user);
    }
}

#[async_trait]
impl InvitationStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate_pending = inner.invitations.values().any(|existing| {
            existing.status == InvitationStatus::Pending
                && existing.email == invitation.email
                && existing.organization_id == invitation.organization_id
        });
        if duplicate_pending {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "A pending invitation already exists for this email"
            )));
        }
        inner
            .invitations
            .insert(invitation.invitation_id.clone(), invitation.clone());
        Ok(())
    }

    async fn find_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.invitations.get(invitation_id).cloned())
    }

    async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .invitations
            .values()
            .find(|inv| inv.token == token)
            .cloned())
    }

    async fn list_invitations(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<Invitation>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut invitations: Vec<Invitation> = inner
            .invitations
            .values()
            .filter(|inv| organization_id.is_none_or(|org| inv.organization_id == org))
            .cloned()
            .collect();
        invitations.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(invitations)
    }

    async fn reissue_invitation(
        &self,
        invitation_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.invitations.get_mut(invitation_id) {
            Some(invitation) if invitation.status != InvitationStatus::Accepted => {
                invitation.token = token.to_string();
                invitation.expires_at = expires_at;
                invitation.status = InvitationStatus::Pending;
                invitation.updated_utc = Utc::now();
                Ok(Some(invitation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<Option<Invitation>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.invitations.get_mut(invitation_id) {
            Some(invitation) if invitation.status != InvitationStatus::Accepted => {
                invitation.status = InvitationStatus::Cancelled;
                invitation.updated_utc = Utc::now();
                Ok(Some(invitation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn claim_invitation(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let claimed = inner
            .invitations
            .values_mut()
            .find(|inv| inv.token == token && inv.is_acceptable(now));
        match claimed {
            Some(invitation) => {
                invitation.status = InvitationStatus::Accepted;
                invitation.accepted_utc = Some(now);
                invitation.updated_utc = now;
                Ok(Some(invitation.clone()))
            }
            None => Ok(None),
        }
    }

    async fn apply_invitation_changes(
        &self,
        invitation_id: &str,
        changes: &InvitationChanges,
    ) -> Result<Option<Invitation>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.invitations.get_mut(invitation_id) {
            Some(invitation) => {
                if let Some(role_id) = &changes.role_id {
                    invitation.role_id = Some(role_id.clone());
                }
                if let Some(department) = &changes.department {
                    invitation.department = Some(department.clone());
                }
                if let Some(message) = &changes.message {
                    invitation.message = Some(message.clone());
                }
                if let Some(expires_at) = changes.expires_at {
                    invitation.expires_at = expires_at;
                }
                invitation.updated_utc = Utc::now();
                Ok(Some(invitation.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_invitation(&self, invitation_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.invitations.remove(invitation_id).is_some())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let email_taken = inner.users.values().any(|existing| {
            existing.organization_id == user.organization_id && existing.email == user.email
        });
        let username_taken = user.username.as_ref().is_some_and(|name| {
            inner
                .users
                .values()
                .any(|existing| existing.username.as_deref() == Some(name))
        });
        if email_taken || username_taken {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Email or username already in use"
            )));
        }
        inner.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .find(|user| user.organization_id == organization_id && user.email == email)
            .cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .find(|user| user.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_organization(
        &self,
        organization_id: &str,
    ) -> Result<Option<Organization>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.organizations.get(organization_id).cloned())
    }

    async fn find_role(&self, role_id: &str) -> Result<Option<Role>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.roles.get(role_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Invitation;
    use chrono::Duration;

    fn pending_invitation(email: &str, org: &str, token: &str) -> Invitation {
        Invitation::new(
            email.to_string(),
            org.to_string(),
            "inviter-1".to_string(),
            None,
            None,
            None,
            token.to_string(),
            Utc::now() + Duration::days(7),
        )
    }

    #[tokio::test]
    async fn duplicate_pending_invitation_conflicts() {
        let store = InMemoryStore::new();
        store
            .insert_invitation(&pending_invitation("a@x.com", "org-1", &"a".repeat(64)))
            .await
            .unwrap();

        let err = store
            .insert_invitation(&pending_invitation("a@x.com", "org-1", &"b".repeat(64)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Same email in a different organization is fine.
        store
            .insert_invitation(&pending_invitation("a@x.com", "org-2", &"c".repeat(64)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn claim_is_single_use() {
        let store = InMemoryStore::new();
        let invitation = pending_invitation("a@x.com", "org-1", &"d".repeat(64));
        store.insert_invitation(&invitation).await.unwrap();

        let now = Utc::now();
        let claimed = store.claim_invitation(&invitation.token, now).await.unwrap();
        assert_eq!(
            claimed.unwrap().status,
            InvitationStatus::Accepted
        );

        let second = store.claim_invitation(&invitation.token, now).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn reissue_guard_rejects_accepted() {
        let store = InMemoryStore::new();
        let invitation = pending_invitation("a@x.com", "org-1", &"e".repeat(64));
        store.insert_invitation(&invitation).await.unwrap();
        store
            .claim_invitation(&invitation.token, Utc::now())
            .await
            .unwrap()
            .unwrap();

        let reissued = store
            .reissue_invitation(
                &invitation.invitation_id,
                &"f".repeat(64),
                Utc::now() + Duration::days(7),
            )
            .await
            .unwrap();
        assert!(reissued.is_none());
    }

    #[tokio::test]
    async fn cancel_is_idempotent_but_never_reverts_accepted() {
        let store = InMemoryStore::new();
        let invitation = pending_invitation("a@x.com", "org-1", &"1".repeat(64));
        store.insert_invitation(&invitation).await.unwrap();

        let first = store
            .cancel_invitation(&invitation.invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, InvitationStatus::Cancelled);

        let again = store
            .cancel_invitation(&invitation.invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.status, InvitationStatus::Cancelled);

        let accepted = pending_invitation("b@x.com", "org-1", &"2".repeat(64));
        store.insert_invitation(&accepted).await.unwrap();
        store
            .claim_invitation(&accepted.token, Utc::now())
            .await
            .unwrap()
            .unwrap();
        let blocked = store
            .cancel_invitation(&accepted.invitation_id)
            .await
            .unwrap();
        assert!(blocked.is_none());
    }
}
