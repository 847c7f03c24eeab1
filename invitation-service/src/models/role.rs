//! Role model - org-scoped roles with capability grants.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label of the platform-wide administrator role (not org-scoped).
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Label of the per-organization administrator role.
pub const ORG_ADMIN_ROLE: &str = "org_admin";

/// Role entity (collection `roles`). `organization_id` is absent for
/// platform-level roles such as super_admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub role_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub label: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
}

impl Role {
    pub fn new(organization_id: Option<String>, label: String, capabilities: Vec<String>) -> Self {
        Self {
            id: None,
            role_id: Uuid::new_v4().to_string(),
            organization_id,
            label,
            capabilities,
            created_utc: Utc::now(),
        }
    }
}
