use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::comment::Comment;

/// Repository trait for version comments.
///
/// There is deliberately no update or delete beyond marking resolved.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn insert(&self, comment: Comment) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Comment>, AppError>;

    /// Comments on a version, oldest first.
    async fn list_by_version(&self, version_id: &str) -> Result<Vec<Comment>, AppError>;

    /// Mark an unresolved comment resolved. Returns `None` when the comment
    /// is missing or already resolved.
    async fn resolve(
        &self,
        id: &str,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>, AppError>;
}

/// MongoDB implementation of the CommentRepository.
#[cfg(feature = "server")]
pub struct MongoCommentRepository {
    collection: mongodb::Collection<Comment>,
}

#[cfg(feature = "server")]
impl MongoCommentRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(crate::db::mongo::COMMENTS),
        }
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl CommentRepository for MongoCommentRepository {
    async fn insert(&self, comment: Comment) -> Result<(), AppError> {
        self.collection
            .insert_one(&comment)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Comment>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_by_version(&self, version_id: &str) -> Result<Vec<Comment>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1, "id": 1 })
            .build();

        let cursor = self
            .collection
            .find(doc! { "version_id": version_id })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        crate::db::mongo::collect(cursor).await
    }

    async fn resolve(
        &self,
        id: &str,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>, AppError> {
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection
            .find_one_and_update(
                doc! { "id": id, "resolved": false },
                doc! { "$set": {
                    "resolved": true,
                    "resolved_by": resolved_by,
                    "resolved_at": crate::models::timestamp::to_bson(at),
                } },
            )
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
