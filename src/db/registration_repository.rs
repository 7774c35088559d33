use async_trait::async_trait;

use crate::error::AppError;
use crate::models::registration::{RegistrationRequest, Resolution};

/// Repository trait for account registration requests.
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn insert(&self, request: RegistrationRequest) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RegistrationRequest>, AppError>;

    /// Pending requests, oldest first.
    async fn list_pending(&self) -> Result<Vec<RegistrationRequest>, AppError>;

    /// Resolve a request that is still PENDING. Returns `None` when it is
    /// missing or was already resolved.
    async fn resolve(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<Option<RegistrationRequest>, AppError>;
}

/// MongoDB implementation of the RegistrationRepository.
#[cfg(feature = "server")]
pub struct MongoRegistrationRepository {
    collection: mongodb::Collection<RegistrationRequest>,
}

#[cfg(feature = "server")]
impl MongoRegistrationRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(crate::db::mongo::REGISTRATIONS),
        }
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl RegistrationRepository for MongoRegistrationRepository {
    async fn insert(&self, request: RegistrationRequest) -> Result<(), AppError> {
        self.collection
            .insert_one(&request)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RegistrationRequest>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_pending(&self) -> Result<Vec<RegistrationRequest>, AppError> {
        use crate::models::registration::RegistrationStatus;
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1, "id": 1 })
            .build();

        let cursor = self
            .collection
            .find(doc! { "status": RegistrationStatus::Pending.as_str() })
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        crate::db::mongo::collect(cursor).await
    }

    async fn resolve(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<Option<RegistrationRequest>, AppError> {
        use crate::models::timestamp::to_bson;
        use crate::models::registration::RegistrationStatus;
        use mongodb::bson::doc;
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection
            .find_one_and_update(
                doc! { "id": id, "status": RegistrationStatus::Pending.as_str() },
                doc! { "$set": {
                    "status": resolution.status.as_str(),
                    "notes": resolution.notes,
                    "rejection_reason": resolution.rejection_reason,
                    "resolved_by": resolution.resolved_by,
                    "resolved_at": to_bson(resolution.resolved_at),
                } },
            )
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
