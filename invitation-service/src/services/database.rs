//! MongoDB-backed invitation store.
//!
//! Index layout enforces the invariants the application used to check by
//! hand: a unique partial index guarantees at most one pending invitation
//! per (email, organization), and unique token/id indexes back the
//! single-use token contract. Transitions use `find_one_and_update` with a
//! status guard in the filter so concurrent resend/accept cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

use super::store::InvitationStore;
use crate::models::{
    Invitation, InvitationChanges, InvitationStatus, Organization, Role, User,
};

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for invitation-service");

        let invitations = self.invitations();

        // Unique lookup key.
        let invitation_id_index = IndexModel::builder()
            .keys(doc! { "invitation_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("invitation_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        invitations
            .create_index(invitation_id_index, None)
            .await
            .map_err(index_error)?;

        // Tokens are single-use secrets; no two invitations may share one.
        let token_index = IndexModel::builder()
            .keys(doc! { "token": 1 })
            .options(
                IndexOptions::builder()
                    .name("token_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        invitations
            .create_index(token_index, None)
            .await
            .map_err(index_error)?;

        // At most one pending invitation per (email, organization). The
        // partial filter keeps accepted/cancelled history out of the
        // uniqueness scope, and the store (not the application) decides
        // races deterministically.
        let pending_index = IndexModel::builder()
            .keys(doc! { "email": 1, "organization_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("pending_email_org_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! {
                        "status": InvitationStatus::Pending.as_str()
                    })
                    .build(),
            )
            .build();
        invitations
            .create_index(pending_index, None)
            .await
            .map_err(index_error)?;

        let created_index = IndexModel::builder()
            .keys(doc! { "created_utc": -1 })
            .options(
                IndexOptions::builder()
                    .name("created_utc_idx".to_string())
                    .build(),
            )
            .build();
        invitations
            .create_index(created_index, None)
            .await
            .map_err(index_error)?;

        let users = self.users();

        let user_email_index = IndexModel::builder()
            .keys(doc! { "organization_id": 1, "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_org_email_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        users
            .create_index(user_email_index, None)
            .await
            .map_err(index_error)?;

        let username_index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(
                IndexOptions::builder()
                    .name("username_idx".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();
        users
            .create_index(username_index, None)
            .await
            .map_err(index_error)?;

        tracing::info!("MongoDB indexes ready");
        Ok(())
    }

    pub fn invitations(&self) -> Collection<Invitation> {
        self.db.collection("invitations")
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn organizations(&self) -> Collection<Organization> {
        self.db.collection("organizations")
    }

    pub fn roles(&self) -> Collection<Role> {
        self.db.collection("roles")
    }

    fn changes_document(changes: &InvitationChanges) -> Document {
        let mut set = doc! { "updated_utc": BsonDateTime::now() };
        if let Some(role_id) = &changes.role_id {
            set.insert("role_id", role_id);
        }
        if let Some(department) = &changes.department {
            set.insert("department", department);
        }
        if let Some(message) = &changes.message {
            set.insert("message", message);
        }
        if let Some(expires_at) = changes.expires_at {
            set.insert("expires_at", BsonDateTime::from_chrono(expires_at));
        }
        set
    }
}

fn index_error(e: mongodb::error::Error) -> AppError {
    tracing::error!("Failed to create index: {}", e);
    AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
}

#[async_trait]
impl InvitationStore for MongoStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), AppError> {
        self.invitations()
            .insert_one(invitation, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::Conflict(anyhow::anyhow!(
                        "A pending invitation already exists for this email"
                    ))
                } else {
                    tracing::error!("Failed to insert invitation: {}", e);
                    AppError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, AppError> {
        self.invitations()
            .find_one(doc! { "invitation_id": invitation_id }, None)
            .await
            .map_err(AppError::from)
    }

    async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError> {
        self.invitations()
            .find_one(doc! { "token": token }, None)
            .await
            .map_err(AppError::from)
    }

    async fn list_invitations(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<Invitation>, AppError> {
        let mut filter = doc! {};
        if let Some(org) = organization_id {
            filter.insert("organization_id", org);
        }

        let find_options = FindOptions::builder()
            .sort(doc! { "created_utc": -1 })
            .build();

        let cursor = self
            .invitations()
            .find(filter, find_options)
            .await
            .map_err(AppError::from)?;

        cursor.try_collect().await.map_err(AppError::from)
    }

    async fn reissue_invitation(
        &self,
        invitation_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.invitations()
            .find_one_and_update(
                doc! {
                    "invitation_id": invitation_id,
                    "status": { "$ne": InvitationStatus::Accepted.as_str() },
                },
                doc! {
                    "$set": {
                        "token": token,
                        "expires_at": BsonDateTime::from_chrono(expires_at),
                        "status": InvitationStatus::Pending.as_str(),
                        "updated_utc": BsonDateTime::now(),
                    }
                },
                options,
            )
            .await
            .map_err(AppError::from)
    }

    async fn cancel_invitation(
        &self,
        invitation_id: &str,
    ) -> Result<Option<Invitation>, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.invitations()
            .find_one_and_update(
                doc! {
                    "invitation_id": invitation_id,
                    "status": { "$ne": InvitationStatus::Accepted.as_str() },
                },
                doc! {
                    "$set": {
                        "status": InvitationStatus::Cancelled.as_str(),
                        "updated_utc": BsonDateTime::now(),
                    }
                },
                options,
            )
            .await
            .map_err(AppError::from)
    }

    async fn claim_invitation(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError> {
        let now_bson = BsonDateTime::from_chrono(now);
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.invitations()
            .find_one_and_update(
                doc! {
                    "token": token,
                    "status": InvitationStatus::Pending.as_str(),
                    "expires_at": { "$gt": now_bson },
                },
                doc! {
                    "$set": {
                        "status": InvitationStatus::Accepted.as_str(),
                        "accepted_utc": now_bson,
                        "updated_utc": now_bson,
                    }
                },
                options,
            )
            .await
            .map_err(AppError::from)
    }

    async fn apply_invitation_changes(
        &self,
        invitation_id: &str,
        changes: &InvitationChanges,
    ) -> Result<Option<Invitation>, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.invitations()
            .find_one_and_update(
                doc! { "invitation_id": invitation_id },
                doc! { "$set": Self::changes_document(changes) },
                options,
            )
            .await
            .map_err(AppError::from)
    }

    async fn delete_invitation(&self, invitation_id: &str) -> Result<bool, AppError> {
        let result = self
            .invitations()
            .delete_one(doc! { "invitation_id": invitation_id }, None)
            .await
            .map_err(AppError::from)?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        self.users().insert_one(user, None).await.map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::Conflict(anyhow::anyhow!("Email or username already in use"))
            } else {
                tracing::error!("Failed to insert user: {}", e);
                AppError::from(e)
            }
        })?;
        Ok(())
    }

    async fn find_user_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        self.users()
            .find_one(
                doc! { "organization_id": organization_id, "email": email },
                None,
            )
            .await
            .map_err(AppError::from)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.users()
            .find_one(doc! { "username": username }, None)
            .await
            .map_err(AppError::from)
    }

    async fn find_organization(
        &self,
        organization_id: &str,
    ) -> Result<Option<Organization>, AppError> {
        self.organizations()
            .find_one(doc! { "organization_id": organization_id }, None)
            .await
            .map_err(AppError::from)
    }

    async fn find_role(&self, role_id: &str) -> Result<Option<Role>, AppError> {
        self.roles()
            .find_one(doc! { "role_id": role_id }, None)
            .await
            .map_err(AppError::from)
    }
}
