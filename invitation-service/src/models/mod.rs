mod invitation;
mod organization;
mod role;
mod user;

pub use invitation::{Invitation, InvitationChanges, InvitationStatus, DEFAULT_EXPIRY_DAYS};
pub use organization::Organization;
pub use role::{Role, ORG_ADMIN_ROLE, SUPER_ADMIN_ROLE};
pub use user::{User, UserStatus};

/// Serde helper for optional `DateTime<Utc>` fields stored as BSON dates.
pub(crate) mod opt_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt.map(|dt| dt.to_chrono()))
    }
}
