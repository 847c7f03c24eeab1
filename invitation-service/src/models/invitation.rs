//! Invitation model - single-use, time-boxed offers to join an organization.

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default invitation lifetime.
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;

/// Invitation states.
///
/// `Expired` is derived, never stored: a pending record past its expiry
/// reads as expired, but no sweep job rewrites the document. The stored
/// value is always one of pending, accepted, or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Cancelled,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Cancelled => "cancelled",
            InvitationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invitation entity (collection `invitations`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub invitation_id: String,
    pub email: String,
    pub organization_id: String,
    pub invited_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Hex-encoded 32-byte acceptance secret, unique among all invitations.
    pub token: String,
    pub status: InvitationStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_utc: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::opt_chrono_datetime_as_bson_datetime"
    )]
    pub accepted_utc: Option<DateTime<Utc>>,
}

impl Invitation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        email: String,
        organization_id: String,
        invited_by: String,
        role_id: Option<String>,
        department: Option<String>,
        message: Option<String>,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            invitation_id: Uuid::new_v4().to_string(),
            email,
            organization_id,
            invited_by,
            role_id,
            department,
            token,
            status: InvitationStatus::Pending,
            expires_at,
            message,
            created_utc: now,
            updated_utc: now,
            accepted_utc: None,
        }
    }

    pub fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(DEFAULT_EXPIRY_DAYS)
    }

    /// The status as observed by callers: a pending record past its expiry
    /// is reported as expired even though the stored value stays pending.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && now >= self.expires_at {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// A token is valid for acceptance iff the invitation is pending and
    /// not yet past its expiry.
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && now < self.expires_at
    }
}

/// Field changes a generic update may apply. `status` is deliberately not
/// representable here: state transitions go through resend/cancel/accept.
#[derive(Debug, Clone, Default)]
pub struct InvitationChanges {
    pub role_id: Option<String>,
    pub department: Option<String>,
    pub message: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl InvitationChanges {
    pub fn is_empty(&self) -> bool {
        self.role_id.is_none()
            && self.department.is_none()
            && self.message.is_none()
            && self.expires_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(expires_at: DateTime<Utc>) -> Invitation {
        Invitation::new(
            "a@x.com".to_string(),
            "org-1".to_string(),
            "user-1".to_string(),
            None,
            None,
            None,
            "ab".repeat(32),
            expires_at,
        )
    }

    #[test]
    fn pending_before_expiry_is_acceptable() {
        let now = Utc::now();
        let invitation = sample(now + Duration::days(7));
        assert!(invitation.is_acceptable(now));
        assert_eq!(invitation.effective_status(now), InvitationStatus::Pending);
    }

    #[test]
    fn pending_past_expiry_reads_as_expired() {
        let now = Utc::now();
        let invitation = sample(now - Duration::minutes(1));
        assert!(!invitation.is_acceptable(now));
        assert_eq!(invitation.effective_status(now), InvitationStatus::Expired);
    }

    #[test]
    fn terminal_states_are_not_acceptable() {
        let now = Utc::now();
        for status in [InvitationStatus::Accepted, InvitationStatus::Cancelled] {
            let mut invitation = sample(now + Duration::days(7));
            invitation.status = status;
            assert!(!invitation.is_acceptable(now));
            assert_eq!(invitation.effective_status(now), status);
        }
    }
}
