use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::access::{require_member, require_permission};
use crate::db::collaborator_repository::CollaboratorRepository;
use crate::db::comment_repository::CommentRepository;
use crate::db::version_repository::VersionRepository;
use crate::error::AppError;
use crate::models::collaborator::{Permission, RoleFamily};
use crate::models::comment::Comment;
use crate::models::version::Version;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentRequest {
    pub content: String,
}

async fn load_version(
    versions: &dyn VersionRepository,
    version_id: &str,
) -> Result<Version, AppError> {
    versions
        .find_by_id(version_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Version '{}' not found", version_id)))
}

/// Core logic to comment on a version. Requires READ_COMMENT or higher on
/// the document owning the version.
pub async fn process_add_comment(
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    comments: &dyn CommentRepository,
    version_id: &str,
    actor_id: &str,
    request: AddCommentRequest,
) -> Result<Comment, AppError> {
    let version = load_version(versions, version_id).await?;
    let member = require_member(collaborators, &version.document_id, actor_id).await?;
    require_permission(&member, Permission::ReadComment, "addComment")?;

    let content = request.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Comment content cannot be empty".into()));
    }

    let comment = Comment::new(version.id.clone(), content.to_string(), actor_id.to_string());
    comments.insert(comment.clone()).await?;

    tracing::info!(
        document_id = %version.document_id,
        version_number = version.version_number,
        user_id = %actor_id,
        "Comment added"
    );

    Ok(comment)
}

/// Core logic to mark a comment resolved.
///
/// Advisors and managers may resolve. Resolving twice returns the comment
/// as it already is.
pub async fn process_resolve_comment(
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    comments: &dyn CommentRepository,
    comment_id: &str,
    actor_id: &str,
) -> Result<Comment, AppError> {
    let comment = comments
        .find_by_id(comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Comment '{}' not found", comment_id)))?;
    let version = load_version(versions, &comment.version_id).await?;
    let member = require_member(collaborators, &version.document_id, actor_id).await?;

    if member.family() != RoleFamily::Advisor && !member.can_manage() {
        return Err(AppError::Forbidden(format!(
            "resolveComment requires an ADVISOR-family role or FULL_ACCESS (user '{}' holds {}/{})",
            actor_id, member.role, member.permission
        )));
    }

    if comment.resolved {
        return Ok(comment);
    }

    match comments.resolve(comment_id, actor_id, Utc::now()).await? {
        Some(resolved) => {
            tracing::info!(
                comment_id = %comment_id,
                user_id = %actor_id,
                "Comment resolved"
            );
            Ok(resolved)
        }
        // Someone else resolved it in between.
        None => comments
            .find_by_id(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment '{}' not found", comment_id))),
    }
}

/// Core logic to list the comments of a version, oldest first.
pub async fn process_list_comments(
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    comments: &dyn CommentRepository,
    version_id: &str,
    actor_id: &str,
) -> Result<Vec<Comment>, AppError> {
    let version = load_version(versions, version_id).await?;
    require_member(collaborators, &version.document_id, actor_id).await?;
    comments.list_by_version(&version.id).await
}

/// Axum handler for `POST /api/v1/versions/{id}/comments`.
#[cfg(feature = "server")]
pub async fn add_comment_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(version_id): axum::extract::Path<String>,
    crate::api::errors::Json(request): crate::api::errors::Json<AddCommentRequest>,
) -> Result<(axum::http::StatusCode, axum::Json<Comment>), AppError> {
    let comment = process_add_comment(
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        state.comment_repo.as_ref(),
        &version_id,
        &user.user_id,
        request,
    )
    .await?;

    Ok((axum::http::StatusCode::CREATED, axum::Json(comment)))
}

/// Axum handler for `GET /api/v1/versions/{id}/comments`.
#[cfg(feature = "server")]
pub async fn list_comments_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(version_id): axum::extract::Path<String>,
) -> Result<axum::Json<Vec<Comment>>, AppError> {
    let comments = process_list_comments(
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        state.comment_repo.as_ref(),
        &version_id,
        &user.user_id,
    )
    .await?;

    Ok(axum::Json(comments))
}

/// Axum handler for `POST /api/v1/comments/{id}/resolve`.
#[cfg(feature = "server")]
pub async fn resolve_comment_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(comment_id): axum::extract::Path<String>,
) -> Result<axum::Json<Comment>, AppError> {
    let comment = process_resolve_comment(
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        state.comment_repo.as_ref(),
        &comment_id,
        &user.user_id,
    )
    .await?;

    Ok(axum::Json(comment))
}
