use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::access::{require_member, require_permission};
use crate::db::collaborator_repository::CollaboratorRepository;
use crate::db::repository::DocumentRepository;
use crate::db::version_repository::VersionRepository;
use crate::error::AppError;
use crate::models::collaborator::Permission;
use crate::models::version::{NewVersion, Version, VersionSummary};

/// Request payload for saving a new snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVersionRequest {
    pub content: String,
    #[serde(default)]
    pub commit_message: String,
}

async fn require_document(docs: &dyn DocumentRepository, document_id: &str) -> Result<(), AppError> {
    match docs.find_by_id(document_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!(
            "Document '{}' not found",
            document_id
        ))),
    }
}

/// Core version creation logic.
///
/// The actor needs edit rights. A lost numbering race is retried exactly
/// once before the conflict is surfaced.
pub async fn process_create_version(
    docs: &dyn DocumentRepository,
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    request: CreateVersionRequest,
) -> Result<Version, AppError> {
    require_document(docs, document_id).await?;

    let member = require_member(collaborators, document_id, actor_id).await?;
    require_permission(&member, Permission::ReadWrite, "createVersion")?;

    if request.content.trim().is_empty() {
        return Err(AppError::Validation("Version content cannot be empty".into()));
    }

    let new_version = NewVersion {
        document_id: document_id.to_string(),
        content: request.content,
        commit_message: request.commit_message.trim().to_string(),
        created_by: actor_id.to_string(),
    };

    let version = match versions.append(new_version.clone()).await {
        Err(AppError::Conflict(reason)) => {
            tracing::warn!(
                document_id = %document_id,
                user_id = %actor_id,
                reason = %reason,
                "Version number race lost, retrying once"
            );
            versions.append(new_version).await?
        }
        other => other?,
    };

    // The version is already stored; a failed bump is logged, not returned.
    if let Err(e) = docs.touch(document_id, Utc::now()).await {
        tracing::warn!(
            document_id = %document_id,
            version_number = version.version_number,
            error = %e,
            "Failed to bump document updated_at after version append"
        );
    }

    tracing::info!(
        document_id = %document_id,
        user_id = %actor_id,
        version_number = version.version_number,
        "Version created"
    );

    Ok(version)
}

/// Core logic to list a document's versions, newest first.
pub async fn process_list_versions(
    docs: &dyn DocumentRepository,
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
) -> Result<Vec<VersionSummary>, AppError> {
    require_document(docs, document_id).await?;
    require_member(collaborators, document_id, actor_id).await?;

    Ok(versions
        .list_by_document(document_id)
        .await?
        .into_iter()
        .map(VersionSummary::from)
        .collect())
}

/// Core logic to fetch a single version with its content.
pub async fn process_get_version(
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    version_id: &str,
    actor_id: &str,
) -> Result<Version, AppError> {
    let version = versions
        .find_by_id(version_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Version '{}' not found", version_id)))?;

    require_member(collaborators, &version.document_id, actor_id).await?;
    Ok(version)
}

/// Axum handler for `POST /api/v1/documents/{id}/versions`.
#[cfg(feature = "server")]
pub async fn create_version_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(document_id): axum::extract::Path<String>,
    crate::api::errors::Json(request): crate::api::errors::Json<CreateVersionRequest>,
) -> Result<(axum::http::StatusCode, axum::Json<Version>), AppError> {
    let version = process_create_version(
        state.document_repo.as_ref(),
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        &document_id,
        &user.user_id,
        request,
    )
    .await?;

    Ok((axum::http::StatusCode::CREATED, axum::Json(version)))
}

/// Axum handler for `GET /api/v1/documents/{id}/versions`.
#[cfg(feature = "server")]
pub async fn list_versions_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(document_id): axum::extract::Path<String>,
) -> Result<axum::Json<Vec<VersionSummary>>, AppError> {
    let versions = process_list_versions(
        state.document_repo.as_ref(),
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        &document_id,
        &user.user_id,
    )
    .await?;

    Ok(axum::Json(versions))
}

/// Axum handler for `GET /api/v1/versions/{id}`.
#[cfg(feature = "server")]
pub async fn get_version_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(version_id): axum::extract::Path<String>,
) -> Result<axum::Json<Version>, AppError> {
    let version = process_get_version(
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        &version_id,
        &user.user_id,
    )
    .await?;

    Ok(axum::Json(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::repository::MockDocumentRepository;
    use crate::db::version_repository::MockVersionRepository;
    use crate::models::collaborator::{Collaborator, CollaboratorRole};
    use crate::models::document::Document;
    use mockall::Sequence;
    use std::sync::Arc;

    async fn setup() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let doc = Document::new_draft("Thesis".into(), String::new(), "alice".into());
        let id = doc.id.clone();
        DocumentRepository::insert(&store, doc).await.unwrap();

        for (user, role, permission) in [
            ("alice", CollaboratorRole::PrimaryStudent, Permission::FullAccess),
            ("carol", CollaboratorRole::CoStudent, Permission::ReadWrite),
            ("rick", CollaboratorRole::Reviewer, Permission::ReadComment),
        ] {
            CollaboratorRepository::insert(
                &store,
                Collaborator::new(id.clone(), user.into(), role, permission, "alice".into()),
            )
            .await
            .unwrap();
        }
        (store, id)
    }

    fn request(content: &str) -> CreateVersionRequest {
        CreateVersionRequest {
            content: content.to_string(),
            commit_message: "update".to_string(),
        }
    }

    #[tokio::test]
    async fn test_versions_number_sequentially() {
        let (store, id) = setup().await;

        let v1 = process_create_version(&store, &store, &store, &id, "alice", request("v1"))
            .await
            .unwrap();
        let v2 = process_create_version(&store, &store, &store, &id, "carol", request("v2"))
            .await
            .unwrap();
        assert_eq!(v1.version_number, 1);
        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.created_by, "carol");

        let listed = process_list_versions(&store, &store, &store, &id, "rick").await.unwrap();
        let numbers: Vec<u32> = listed.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![2, 1]);
        assert_eq!(listed[0].content_length, 2);
    }

    #[tokio::test]
    async fn test_create_version_bumps_document_updated_at() {
        let (store, id) = setup().await;
        let before = DocumentRepository::find_by_id(&store, &id)
            .await
            .unwrap()
            .unwrap()
            .updated_at;

        process_create_version(&store, &store, &store, &id, "alice", request("v1"))
            .await
            .unwrap();

        let after = DocumentRepository::find_by_id(&store, &id)
            .await
            .unwrap()
            .unwrap()
            .updated_at;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_create_version_requires_edit_rights() {
        let (store, id) = setup().await;

        let result = process_create_version(&store, &store, &store, &id, "rick", request("x")).await;
        match result.unwrap_err() {
            AppError::Forbidden(msg) => assert!(msg.contains("READ_WRITE")),
            other => panic!("Expected Forbidden error, got: {:?}", other),
        }

        let result =
            process_create_version(&store, &store, &store, &id, "mallory", request("x")).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(store.count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_version_rejects_empty_content_and_unknown_document() {
        let (store, id) = setup().await;

        let result =
            process_create_version(&store, &store, &store, &id, "alice", request("  \n ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result =
            process_create_version(&store, &store, &store, "missing", "alice", request("x")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_versions_of_missing_document_is_not_found() {
        let (store, id) = setup().await;

        let result = process_list_versions(&store, &store, &store, "no-such-doc", "alice").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        // an existing document still rejects outsiders
        let result = process_list_versions(&store, &store, &store, &id, "mallory").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_failed_touch_still_returns_stored_version() {
        let (store, id) = setup().await;
        let stored = DocumentRepository::find_by_id(&store, &id).await.unwrap();

        let mut docs = MockDocumentRepository::new();
        docs.expect_find_by_id()
            .returning(move |_| Ok(stored.clone()));
        docs.expect_touch()
            .times(1)
            .returning(|_, _| Err(AppError::Database("write failed".into())));

        let version = process_create_version(&docs, &store, &store, &id, "alice", request("v1"))
            .await
            .unwrap();
        assert_eq!(version.version_number, 1);
        assert_eq!(store.count(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_version_checks_owning_document_membership() {
        let (store, id) = setup().await;
        let v1 = process_create_version(&store, &store, &store, &id, "alice", request("body"))
            .await
            .unwrap();

        let fetched = process_get_version(&store, &store, &v1.id, "rick").await.unwrap();
        assert_eq!(fetched.content, "body");

        let result = process_get_version(&store, &store, &v1.id, "mallory").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let result = process_get_version(&store, &store, "missing", "alice").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_numbering_conflict_is_retried_once() {
        let (store, id) = setup().await;
        let mut versions = MockVersionRepository::new();
        let mut seq = Sequence::new();

        versions
            .expect_append()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AppError::Conflict("duplicate version number".into())));
        versions
            .expect_append()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|v| Ok(v.into_version(7)));

        let version = process_create_version(&store, &versions, &store, &id, "alice", request("x"))
            .await
            .unwrap();
        assert_eq!(version.version_number, 7);
    }

    #[tokio::test]
    async fn test_second_numbering_conflict_is_surfaced() {
        let (store, id) = setup().await;
        let mut versions = MockVersionRepository::new();

        versions
            .expect_append()
            .times(2)
            .returning(|_| Err(AppError::Conflict("duplicate version number".into())));

        let result =
            process_create_version(&store, &versions, &store, &id, "alice", request("x")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_other_append_errors_are_not_retried() {
        let (store, id) = setup().await;
        let mut versions = MockVersionRepository::new();

        versions
            .expect_append()
            .times(1)
            .returning(|_| Err(AppError::Database("connection reset".into())));

        let result =
            process_create_version(&store, &versions, &store, &id, "alice", request("x")).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_yield_contiguous_numbers() {
        let (store, id) = setup().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    process_create_version(
                        store.as_ref(),
                        store.as_ref(),
                        store.as_ref(),
                        &id,
                        "alice",
                        request(&format!("snapshot {}", i)),
                    )
                    .await
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().version_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=16).collect::<Vec<u32>>());
    }
}
