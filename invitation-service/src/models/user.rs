//! User model - accounts provisioned from accepted invitations.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Deactivated,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Deactivated => "deactivated",
        }
    }
}

/// User entity (collection `users`). Email is unique within an
/// organization; username, when present, is unique across the deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub full_name: String,
    pub password_hash: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub status: UserStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Provision a user from an accepted invitation. The account is
    /// immediately usable; no separate email-verification step applies here.
    #[allow(clippy::too_many_arguments)]
    pub fn provisioned(
        email: String,
        username: Option<String>,
        full_name: String,
        password_hash: String,
        organization_id: String,
        role_id: Option<String>,
        department: Option<String>,
    ) -> Self {
        Self {
            id: None,
            user_id: Uuid::new_v4().to_string(),
            email,
            username,
            full_name,
            password_hash,
            organization_id,
            role_id,
            department,
            status: UserStatus::Active,
            created_utc: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}
