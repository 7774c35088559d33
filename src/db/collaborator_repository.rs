use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::collaborator::{Collaborator, PrimarySwap, RoleChange};

/// Repository trait for document membership.
///
/// Implementations enforce, at the storage boundary, that a document has at
/// most one active PRIMARY_STUDENT and one active PRIMARY_ADVISOR, and at
/// most one active record per user.
#[async_trait]
pub trait CollaboratorRepository: Send + Sync {
    /// Insert a new active collaborator.
    ///
    /// Fails with `InvariantViolation` when it would create a second active
    /// primary of its role, and with `Conflict` when the user is already an
    /// active collaborator on the document.
    async fn insert(&self, collaborator: Collaborator) -> Result<(), AppError>;

    /// Find a collaborator record by id, active or not.
    async fn find_by_id(&self, id: &str) -> Result<Option<Collaborator>, AppError>;

    /// The active membership of a user on a document.
    async fn find_active(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<Collaborator>, AppError>;

    /// All records of a document, including removed ones, oldest first.
    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Collaborator>, AppError>;

    /// Active memberships of a user across documents.
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Collaborator>, AppError>;

    /// Compare-and-swap a role/permission change. Returns `None` when the
    /// record no longer has the expected standing.
    async fn update(&self, change: RoleChange) -> Result<Option<Collaborator>, AppError>;

    /// Compare-and-swap deactivation, expecting the same standing as `update`.
    async fn deactivate(&self, expected: RoleChange) -> Result<Option<Collaborator>, AppError>;

    /// Apply a primary handover atomically: both writes or neither.
    ///
    /// Returns the promoted record. Fails with `Conflict` when either record
    /// changed since the swap was planned.
    async fn swap_primary(&self, swap: PrimarySwap) -> Result<Collaborator, AppError>;

    /// Record an access by the collaborator.
    async fn touch_access(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;
}

/// MongoDB implementation of the CollaboratorRepository.
///
/// Primary uniqueness is backed by partial unique indexes, and the handover
/// runs in a multi-document transaction (requires a replica set).
#[cfg(feature = "server")]
pub struct MongoCollaboratorRepository {
    client: mongodb::Client,
    collection: mongodb::Collection<Collaborator>,
}

#[cfg(feature = "server")]
impl MongoCollaboratorRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            client: db.client().clone(),
            collection: db.collection(crate::db::mongo::COLLABORATORS),
        }
    }

    fn cas_filter(change: &RoleChange) -> mongodb::bson::Document {
        mongodb::bson::doc! {
            "id": change.collaborator_id.as_str(),
            "active": true,
            "role": change.expected_role.as_str(),
            "permission": change.expected_permission.as_str(),
        }
    }

    fn set_standing(change: &RoleChange) -> mongodb::bson::Document {
        mongodb::bson::doc! {
            "$set": {
                "role": change.role.as_str(),
                "permission": change.permission.as_str(),
            }
        }
    }

    fn after() -> mongodb::options::FindOneAndUpdateOptions {
        mongodb::options::FindOneAndUpdateOptions::builder()
            .return_document(mongodb::options::ReturnDocument::After)
            .build()
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl CollaboratorRepository for MongoCollaboratorRepository {
    async fn insert(&self, collaborator: Collaborator) -> Result<(), AppError> {
        use crate::db::mongo::{duplicate_key_message, PRIMARY_ADVISOR_INDEX, PRIMARY_STUDENT_INDEX};

        match self.collection.insert_one(&collaborator).await {
            Ok(_) => Ok(()),
            Err(e) => match duplicate_key_message(&e) {
                Some(msg)
                    if msg.contains(PRIMARY_STUDENT_INDEX) || msg.contains(PRIMARY_ADVISOR_INDEX) =>
                {
                    Err(AppError::InvariantViolation(format!(
                        "Document '{}' already has an active {}",
                        collaborator.document_id, collaborator.role
                    )))
                }
                Some(_) => Err(AppError::Conflict(format!(
                    "User '{}' is already a collaborator on document '{}'",
                    collaborator.user_id, collaborator.document_id
                ))),
                None => Err(AppError::Database(e.to_string())),
            },
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Collaborator>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_active(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<Collaborator>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "document_id": document_id, "user_id": user_id, "active": true })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Collaborator>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(doc! { "added_at": 1, "id": 1 })
            .build();

        let cursor = self
            .collection
            .find(doc! { "document_id": document_id })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        crate::db::mongo::collect(cursor).await
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Collaborator>, AppError> {
        use mongodb::bson::doc;

        let cursor = self
            .collection
            .find(doc! { "user_id": user_id, "active": true })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        crate::db::mongo::collect(cursor).await
    }

    async fn update(&self, change: RoleChange) -> Result<Option<Collaborator>, AppError> {
        self.collection
            .find_one_and_update(Self::cas_filter(&change), Self::set_standing(&change))
            .with_options(Self::after())
            .await
            .map_err(|e| {
                if crate::db::mongo::duplicate_key_message(&e).is_some() {
                    AppError::InvariantViolation(format!(
                        "Changing collaborator '{}' to {} would duplicate a primary",
                        change.collaborator_id, change.role
                    ))
                } else {
                    AppError::Database(e.to_string())
                }
            })
    }

    async fn deactivate(&self, expected: RoleChange) -> Result<Option<Collaborator>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one_and_update(Self::cas_filter(&expected), doc! { "$set": { "active": false } })
            .with_options(Self::after())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn swap_primary(&self, swap: PrimarySwap) -> Result<Collaborator, AppError> {
        use crate::db::mongo::transaction_error;

        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        session
            .start_transaction()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Demote first so the partial unique index never sees two primaries.
        if let Some(demote) = &swap.demote {
            let result = self
                .collection
                .update_one(Self::cas_filter(demote), Self::set_standing(demote))
                .session(&mut session)
                .await
                .map_err(transaction_error)?;

            if result.matched_count == 0 {
                session
                    .abort_transaction()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                return Err(AppError::Conflict(format!(
                    "Current primary '{}' of document '{}' changed concurrently",
                    demote.collaborator_id, swap.document_id
                )));
            }
        }

        let promoted = self
            .collection
            .find_one_and_update(Self::cas_filter(&swap.promote), Self::set_standing(&swap.promote))
            .with_options(Self::after())
            .session(&mut session)
            .await
            .map_err(transaction_error)?;

        let Some(promoted) = promoted else {
            session
                .abort_transaction()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::Conflict(format!(
                "Collaborator '{}' changed concurrently",
                swap.promote.collaborator_id
            )));
        };

        session
            .commit_transaction()
            .await
            .map_err(transaction_error)?;

        Ok(promoted)
    }

    async fn touch_access(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        use mongodb::bson::doc;

        self.collection
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "last_access_at": crate::models::timestamp::to_bson(at) } },
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
