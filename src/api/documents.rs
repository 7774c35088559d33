use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::access::require_member;
use crate::auth::models::{AuthenticatedUser, UserRole};
use crate::db::collaborator_repository::CollaboratorRepository;
use crate::db::repository::DocumentRepository;
use crate::db::version_repository::VersionRepository;
use crate::error::AppError;
use crate::models::collaborator::{Collaborator, CollaboratorRole, CollaboratorView, Permission};
use crate::models::document::{Document, NewDocument};
use crate::models::version::{NewVersion, Version};

/// Request payload for creating a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Optional initial content, stored as version 1.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

/// Response from a successful document creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentResponse {
    pub document: Document,
    pub owner: CollaboratorView,
    pub initial_version: Option<Version>,
}

/// A document as seen by one of its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
    pub document: Document,
    pub membership: CollaboratorView,
    pub version_count: u64,
}

const DEFAULT_INITIAL_MESSAGE: &str = "Initial version";

/// Core document creation logic.
///
/// Only students create documents; the creator becomes the PRIMARY_STUDENT
/// with FULL_ACCESS. The document, its owner and the optional version 1 are
/// stored in a single all-or-nothing write.
pub async fn process_create_document(
    docs: &dyn DocumentRepository,
    actor: &AuthenticatedUser,
    request: CreateDocumentRequest,
) -> Result<CreateDocumentResponse, AppError> {
    if actor.role != UserRole::Student {
        return Err(AppError::Forbidden(format!(
            "Only students can create documents (user '{}' is {})",
            actor.user_id, actor.role
        )));
    }

    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title cannot be empty".into()));
    }

    if let Some(content) = &request.content {
        if content.trim().is_empty() {
            return Err(AppError::Validation("Initial content cannot be empty".into()));
        }
    }

    let document = Document::new_draft(
        title.to_string(),
        request.description.trim().to_string(),
        actor.user_id.clone(),
    );

    let owner = Collaborator::new(
        document.id.clone(),
        actor.user_id.clone(),
        CollaboratorRole::PrimaryStudent,
        Permission::FullAccess,
        actor.user_id.clone(),
    );

    let initial_version = request.content.map(|content| {
        NewVersion {
            document_id: document.id.clone(),
            content,
            commit_message: request
                .commit_message
                .unwrap_or_else(|| DEFAULT_INITIAL_MESSAGE.to_string()),
            created_by: actor.user_id.clone(),
        }
        .into_version(1)
    });

    docs.create(NewDocument {
        document: document.clone(),
        owner: owner.clone(),
        initial_version: initial_version.clone(),
    })
    .await?;

    tracing::info!(
        document_id = %document.id,
        user_id = %actor.user_id,
        with_content = initial_version.is_some(),
        "Document created"
    );

    Ok(CreateDocumentResponse {
        document,
        owner: owner.into(),
        initial_version,
    })
}

/// Core logic to fetch a document for one of its collaborators.
pub async fn process_get_document(
    docs: &dyn DocumentRepository,
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
) -> Result<DocumentDetail, AppError> {
    let document = docs
        .find_by_id(document_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document '{}' not found", document_id)))?;

    let mut member = require_member(collaborators, document_id, actor_id).await?;

    let now = Utc::now();
    collaborators.touch_access(&member.id, now).await?;
    member.last_access_at = Some(now);

    let version_count = versions.count(document_id).await?;

    Ok(DocumentDetail {
        document,
        membership: member.into(),
        version_count,
    })
}

/// Core logic to list the documents a user actively collaborates on.
pub async fn process_list_documents(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    actor_id: &str,
) -> Result<Vec<Document>, AppError> {
    let ids: Vec<String> = collaborators
        .list_active_for_user(actor_id)
        .await?
        .into_iter()
        .map(|c| c.document_id)
        .collect();

    docs.find_by_ids(&ids).await
}

/// Axum handler for `POST /api/v1/documents`.
#[cfg(feature = "server")]
pub async fn create_document_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: AuthenticatedUser,
    crate::api::errors::Json(request): crate::api::errors::Json<CreateDocumentRequest>,
) -> Result<(axum::http::StatusCode, axum::Json<CreateDocumentResponse>), AppError> {
    let response = process_create_document(
        state.document_repo.as_ref(),
        &user,
        request,
    )
    .await?;

    Ok((axum::http::StatusCode::CREATED, axum::Json(response)))
}

/// Axum handler for `GET /api/v1/documents`.
#[cfg(feature = "server")]
pub async fn list_documents_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: AuthenticatedUser,
) -> Result<axum::Json<Vec<Document>>, AppError> {
    let documents = process_list_documents(
        state.document_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        &user.user_id,
    )
    .await?;

    Ok(axum::Json(documents))
}

/// Axum handler for `GET /api/v1/documents/{id}`.
#[cfg(feature = "server")]
pub async fn get_document_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: AuthenticatedUser,
    axum::extract::Path(document_id): axum::extract::Path<String>,
) -> Result<axum::Json<DocumentDetail>, AppError> {
    let detail = process_get_document(
        state.document_repo.as_ref(),
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        &document_id,
        &user.user_id,
    )
    .await?;

    Ok(axum::Json(detail))
}
