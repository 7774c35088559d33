use async_trait::async_trait;

use crate::error::AppError;
use crate::models::version::{NewVersion, Version};

/// Append-only store of version snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Append a version, assigning `current max + 1` as its number.
    ///
    /// Implementations must never hand out the same number twice for one
    /// document. Losing a numbering race returns `Conflict`; nothing is
    /// written in that case.
    async fn append(&self, version: NewVersion) -> Result<Version, AppError>;

    /// Find a version by its id.
    async fn find_by_id(&self, id: &str) -> Result<Option<Version>, AppError>;

    /// All versions of a document, newest first.
    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Version>, AppError>;

    /// The highest-numbered version of a document.
    async fn latest(&self, document_id: &str) -> Result<Option<Version>, AppError>;

    /// Number of versions of a document.
    async fn count(&self, document_id: &str) -> Result<u64, AppError>;
}

/// MongoDB implementation of the VersionRepository.
///
/// Numbering relies on the unique `(document_id, version_number)` index:
/// two writers reading the same max cannot both insert.
#[cfg(feature = "server")]
pub struct MongoVersionRepository {
    collection: mongodb::Collection<Version>,
}

#[cfg(feature = "server")]
impl MongoVersionRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(crate::db::mongo::VERSIONS),
        }
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl VersionRepository for MongoVersionRepository {
    async fn append(&self, version: NewVersion) -> Result<Version, AppError> {
        let next = self
            .latest(&version.document_id)
            .await?
            .map(|v| v.version_number + 1)
            .unwrap_or(1);
        let version = version.into_version(next);

        match self.collection.insert_one(&version).await {
            Ok(_) => Ok(version),
            Err(e) if crate::db::mongo::duplicate_key_message(&e).is_some() => {
                Err(AppError::Conflict(format!(
                    "Version number {} of document '{}' was taken concurrently",
                    next, version.document_id
                )))
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Version>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_by_document(&self, document_id: &str) -> Result<Vec<Version>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(doc! { "version_number": -1 })
            .build();

        let cursor = self
            .collection
            .find(doc! { "document_id": document_id })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        crate::db::mongo::collect(cursor).await
    }

    async fn latest(&self, document_id: &str) -> Result<Option<Version>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOneOptions;

        let options = FindOneOptions::builder()
            .sort(doc! { "version_number": -1 })
            .build();

        self.collection
            .find_one(doc! { "document_id": document_id })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn count(&self, document_id: &str) -> Result<u64, AppError> {
        use mongodb::bson::doc;

        self.collection
            .count_documents(doc! { "document_id": document_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
