use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::document::{Document, DocumentStatus, NewDocument, StatusChange};

/// Repository trait for document operations.
///
/// This trait allows swapping the database layer in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a bare document record.
    async fn insert(&self, doc: Document) -> Result<(), AppError>;

    /// Store a new document together with its owner and optional first
    /// version. Either all records are written or none are.
    async fn create(&self, new: NewDocument) -> Result<(), AppError>;

    /// Find a document by its id.
    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError>;

    /// Find the documents with the given ids, most recently updated first.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Document>, AppError>;

    /// Compare-and-swap the status.
    ///
    /// Applies `change` only if the stored document still has the status and
    /// generation of `current`. Returns the updated document, or `None` when
    /// the document is missing or was written underneath the caller.
    async fn transition(
        &self,
        current: &Document,
        change: StatusChange,
    ) -> Result<Option<Document>, AppError>;

    /// Bump `updated_at` and the generation.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;
}

/// MongoDB implementation of the DocumentRepository.
///
/// Creation writes to the collaborator and version collections as well,
/// inside one transaction (requires a replica set).
#[cfg(feature = "server")]
pub struct MongoDocumentRepository {
    client: mongodb::Client,
    collection: mongodb::Collection<Document>,
    collaborators: mongodb::Collection<crate::models::collaborator::Collaborator>,
    versions: mongodb::Collection<crate::models::version::Version>,
}

#[cfg(feature = "server")]
impl MongoDocumentRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            client: db.client().clone(),
            collection: db.collection(crate::db::mongo::DOCUMENTS),
            collaborators: db.collection(crate::db::mongo::COLLABORATORS),
            versions: db.collection(crate::db::mongo::VERSIONS),
        }
    }

    async fn insert_all(
        &self,
        new: &NewDocument,
        session: &mut mongodb::ClientSession,
    ) -> Result<(), AppError> {
        use crate::db::mongo::transaction_error;

        self.collection
            .insert_one(&new.document)
            .session(&mut *session)
            .await
            .map_err(transaction_error)?;
        self.collaborators
            .insert_one(&new.owner)
            .session(&mut *session)
            .await
            .map_err(transaction_error)?;
        if let Some(version) = &new.initial_version {
            self.versions
                .insert_one(version)
                .session(&mut *session)
                .await
                .map_err(transaction_error)?;
        }
        Ok(())
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl DocumentRepository for MongoDocumentRepository {
    async fn insert(&self, doc: Document) -> Result<(), AppError> {
        self.collection.insert_one(&doc).await.map_err(|e| {
            if crate::db::mongo::duplicate_key_message(&e).is_some() {
                AppError::Conflict(format!("Document '{}' already exists", doc.id))
            } else {
                AppError::Database(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn create(&self, new: NewDocument) -> Result<(), AppError> {
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

        // Dropping the session before commit aborts the transaction.
        if let Err(e) = self.insert_all(&new, &mut session).await {
            session
                .abort_transaction()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(e);
        }

        session
            .commit_transaction()
            .await
            .map_err(transaction_error)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Document>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(doc! { "updated_at": -1, "id": 1 })
            .build();

        let cursor = self
            .collection
            .find(doc! { "id": { "$in": ids.to_vec() } })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        crate::db::mongo::collect(cursor).await
    }

    async fn transition(
        &self,
        current: &Document,
        change: StatusChange,
    ) -> Result<Option<Document>, AppError> {
        use crate::models::timestamp::to_bson;
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let at = to_bson(change.at);
        let mut set = doc! {
            "status": change.to.as_str(),
            "updated_at": at.clone(),
        };
        match change.to {
            DocumentStatus::Submitted => {
                set.insert("submitted_at", at);
            }
            DocumentStatus::Revision => {
                set.insert("rejection_reason", change.rejection_reason.clone());
                set.insert("revision_requested_at", at);
            }
            DocumentStatus::Approved => {
                set.insert("approved_at", at);
            }
            DocumentStatus::Finalized => {
                set.insert("finalized_at", at);
            }
            DocumentStatus::Draft => {}
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        // Status and generation in the filter are the compare half of the swap.
        self.collection
            .find_one_and_update(
                doc! {
                    "id": current.id.as_str(),
                    "status": current.status.as_str(),
                    "generation": current.generation,
                },
                doc! { "$set": set, "$inc": { "generation": 1_i64 } },
            )
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        use mongodb::bson::doc;

        self.collection
            .update_one(
                doc! { "id": id },
                doc! {
                    "$set": { "updated_at": crate::models::timestamp::to_bson(at) },
                    "$inc": { "generation": 1_i64 },
                },
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
