use serde::{Deserialize, Serialize};

use crate::auth::access::{forbid_self_target, require_member, require_permission};
use crate::db::collaborator_repository::CollaboratorRepository;
use crate::db::repository::DocumentRepository;
use crate::error::AppError;
use crate::models::collaborator::{
    Collaborator, CollaboratorRole, CollaboratorView, Permission, PrimarySwap, RoleChange,
};

/// Request payload for adding a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCollaboratorRequest {
    pub user_id: String,
    pub role: CollaboratorRole,
    pub permission: Permission,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: CollaboratorRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePermissionRequest {
    pub permission: Permission,
}

/// Resolve the acting manager: the document must exist and the actor must
/// hold FULL_ACCESS on it.
async fn require_manager(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    operation: &str,
) -> Result<Collaborator, AppError> {
    if docs.find_by_id(document_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Document '{}' not found",
            document_id
        )));
    }
    let actor = require_member(collaborators, document_id, actor_id).await?;
    require_permission(&actor, Permission::FullAccess, operation)?;
    Ok(actor)
}

/// Load an active collaborator of `document_id` that the actor may modify.
async fn load_target(
    collaborators: &dyn CollaboratorRepository,
    actor: &Collaborator,
    document_id: &str,
    collaborator_id: &str,
) -> Result<Collaborator, AppError> {
    let target = collaborators
        .find_by_id(collaborator_id)
        .await?
        .filter(|c| c.active && c.document_id == document_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Collaborator '{}' not found on document '{}'",
                collaborator_id, document_id
            ))
        })?;
    forbid_self_target(actor, &target)?;
    Ok(target)
}

fn primary_locked(target: &Collaborator, operation: &str) -> AppError {
    tracing::warn!(
        collaborator_id = %target.id,
        document_id = %target.document_id,
        operation = operation,
        "Rejected change to a primary collaborator"
    );
    AppError::InvariantViolation(format!(
        "Cannot {} collaborator '{}': they are the {}; promote a replacement first",
        operation, target.user_id, target.role
    ))
}

fn changed_concurrently(target: &Collaborator) -> AppError {
    AppError::Conflict(format!(
        "Collaborator '{}' changed concurrently; reload and retry",
        target.id
    ))
}

/// Core logic to add a collaborator.
///
/// Primary roles always carry FULL_ACCESS; a second active primary of the
/// same role is rejected by storage.
pub async fn process_add_collaborator(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    request: AddCollaboratorRequest,
) -> Result<CollaboratorView, AppError> {
    let actor = require_manager(docs, collaborators, document_id, actor_id, "addCollaborator").await?;

    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".into()));
    }
    if user_id == actor.user_id {
        return Err(AppError::Forbidden(format!(
            "User '{}' cannot modify their own collaborator record",
            actor.user_id
        )));
    }

    let permission = if request.role.is_primary() {
        Permission::FullAccess
    } else {
        request.permission
    };

    let collaborator = Collaborator::new(
        document_id.to_string(),
        user_id.to_string(),
        request.role,
        permission,
        actor.user_id.clone(),
    );
    collaborators.insert(collaborator.clone()).await?;

    tracing::info!(
        document_id = %document_id,
        user_id = %actor_id,
        target_user = %collaborator.user_id,
        role = %collaborator.role,
        permission = %collaborator.permission,
        "Collaborator added"
    );

    Ok(collaborator.into())
}

/// Core logic to change a non-primary collaborator's role.
///
/// Primary standing changes only through [`process_promote_to_primary`].
pub async fn process_update_role(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    collaborator_id: &str,
    request: UpdateRoleRequest,
) -> Result<CollaboratorView, AppError> {
    let actor = require_manager(docs, collaborators, document_id, actor_id, "updateRole").await?;
    let target = load_target(collaborators, &actor, document_id, collaborator_id).await?;

    if target.is_primary() {
        return Err(primary_locked(&target, "change the role of"));
    }
    if request.role.is_primary() {
        return Err(AppError::InvariantViolation(format!(
            "{} can only be assigned through promoteToPrimary",
            request.role
        )));
    }

    let change = RoleChange::from_current(&target, request.role, target.permission);
    let updated = collaborators
        .update(change)
        .await?
        .ok_or_else(|| changed_concurrently(&target))?;

    tracing::info!(
        document_id = %document_id,
        user_id = %actor_id,
        collaborator_id = %updated.id,
        from = %target.role,
        to = %updated.role,
        "Collaborator role updated"
    );

    Ok(updated.into())
}

/// Core logic to change a non-primary collaborator's permission.
pub async fn process_update_permission(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    collaborator_id: &str,
    request: UpdatePermissionRequest,
) -> Result<CollaboratorView, AppError> {
    let actor =
        require_manager(docs, collaborators, document_id, actor_id, "updatePermission").await?;
    let target = load_target(collaborators, &actor, document_id, collaborator_id).await?;

    if target.is_primary() {
        return Err(primary_locked(&target, "change the permission of"));
    }

    let change = RoleChange::from_current(&target, target.role, request.permission);
    let updated = collaborators
        .update(change)
        .await?
        .ok_or_else(|| changed_concurrently(&target))?;

    tracing::info!(
        document_id = %document_id,
        user_id = %actor_id,
        collaborator_id = %updated.id,
        from = %target.permission,
        to = %updated.permission,
        "Collaborator permission updated"
    );

    Ok(updated.into())
}

/// Core logic to remove a collaborator. The record is kept, inactive.
pub async fn process_remove_collaborator(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    collaborator_id: &str,
) -> Result<CollaboratorView, AppError> {
    let actor =
        require_manager(docs, collaborators, document_id, actor_id, "removeCollaborator").await?;
    let target = load_target(collaborators, &actor, document_id, collaborator_id).await?;

    if target.is_primary() {
        return Err(primary_locked(&target, "remove"));
    }

    let expected = RoleChange::from_current(&target, target.role, target.permission);
    let removed = collaborators
        .deactivate(expected)
        .await?
        .ok_or_else(|| changed_concurrently(&target))?;

    tracing::info!(
        document_id = %document_id,
        user_id = %actor_id,
        collaborator_id = %removed.id,
        "Collaborator removed"
    );

    Ok(removed.into())
}

/// Core logic to hand the primary position of a family to `collaborator_id`.
///
/// The outgoing primary drops to the next role of the family with
/// READ_WRITE; the target becomes primary with FULL_ACCESS. Storage applies
/// both writes or neither.
pub async fn process_promote_to_primary(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
    collaborator_id: &str,
) -> Result<CollaboratorView, AppError> {
    let actor =
        require_manager(docs, collaborators, document_id, actor_id, "promoteToPrimary").await?;
    let target = load_target(collaborators, &actor, document_id, collaborator_id).await?;

    let family = target.family();
    let Some(primary_role) = family.primary_role() else {
        return Err(AppError::Validation(format!(
            "{} belongs to no family with a primary role",
            target.role
        )));
    };

    if target.is_primary() {
        return Ok(target.into());
    }

    let current_primary = collaborators
        .list_by_document(document_id)
        .await?
        .into_iter()
        .find(|c| c.active && c.role == primary_role);

    let swap = PrimarySwap {
        document_id: document_id.to_string(),
        demote: current_primary.as_ref().map(|current| {
            RoleChange::from_current(current, current.role.demoted(), Permission::ReadWrite)
        }),
        promote: RoleChange::from_current(&target, primary_role, Permission::FullAccess),
    };

    let promoted = collaborators.swap_primary(swap).await?;

    tracing::info!(
        document_id = %document_id,
        user_id = %actor_id,
        promoted = %promoted.user_id,
        demoted = current_primary.as_ref().map(|c| c.user_id.as_str()).unwrap_or("-"),
        family = %family,
        "Primary collaborator handed over"
    );

    Ok(promoted.into())
}

/// Core logic to list a document's collaborators, removed ones included.
pub async fn process_list_collaborators(
    docs: &dyn DocumentRepository,
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    actor_id: &str,
) -> Result<Vec<CollaboratorView>, AppError> {
    if docs.find_by_id(document_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Document '{}' not found",
            document_id
        )));
    }
    require_member(collaborators, document_id, actor_id).await?;

    Ok(collaborators
        .list_by_document(document_id)
        .await?
        .into_iter()
        .map(CollaboratorView::from)
        .collect())
}

#[cfg(feature = "server")]
pub use handlers::*;

#[cfg(feature = "server")]
mod handlers {
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use crate::api::errors::Json;

    use super::*;
    use crate::app::AppState;
    use crate::auth::models::AuthenticatedUser;

    /// Axum handler for `GET /api/v1/documents/{id}/collaborators`.
    pub async fn list_collaborators_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path(document_id): Path<String>,
    ) -> Result<Json<Vec<CollaboratorView>>, AppError> {
        let list = process_list_collaborators(
            state.document_repo.as_ref(),
            state.collaborator_repo.as_ref(),
            &document_id,
            &user.user_id,
        )
        .await?;
        Ok(Json(list))
    }

    /// Axum handler for `POST /api/v1/documents/{id}/collaborators`.
    pub async fn add_collaborator_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path(document_id): Path<String>,
        Json(request): Json<AddCollaboratorRequest>,
    ) -> Result<(StatusCode, Json<CollaboratorView>), AppError> {
        let added = process_add_collaborator(
            state.document_repo.as_ref(),
            state.collaborator_repo.as_ref(),
            &document_id,
            &user.user_id,
            request,
        )
        .await?;
        Ok((StatusCode::CREATED, Json(added)))
    }

    /// Axum handler for `PUT /api/v1/documents/{id}/collaborators/{cid}/role`.
    pub async fn update_role_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path((document_id, collaborator_id)): Path<(String, String)>,
        Json(request): Json<UpdateRoleRequest>,
    ) -> Result<Json<CollaboratorView>, AppError> {
        let updated = process_update_role(
            state.document_repo.as_ref(),
            state.collaborator_repo.as_ref(),
            &document_id,
            &user.user_id,
            &collaborator_id,
            request,
        )
        .await?;
        Ok(Json(updated))
    }

    /// Axum handler for `PUT /api/v1/documents/{id}/collaborators/{cid}/permission`.
    pub async fn update_permission_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path((document_id, collaborator_id)): Path<(String, String)>,
        Json(request): Json<UpdatePermissionRequest>,
    ) -> Result<Json<CollaboratorView>, AppError> {
        let updated = process_update_permission(
            state.document_repo.as_ref(),
            state.collaborator_repo.as_ref(),
            &document_id,
            &user.user_id,
            &collaborator_id,
            request,
        )
        .await?;
        Ok(Json(updated))
    }

    /// Axum handler for `POST /api/v1/documents/{id}/collaborators/{cid}/promote`.
    pub async fn promote_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path((document_id, collaborator_id)): Path<(String, String)>,
    ) -> Result<Json<CollaboratorView>, AppError> {
        let promoted = process_promote_to_primary(
            state.document_repo.as_ref(),
            state.collaborator_repo.as_ref(),
            &document_id,
            &user.user_id,
            &collaborator_id,
        )
        .await?;
        Ok(Json(promoted))
    }

    /// Axum handler for `DELETE /api/v1/documents/{id}/collaborators/{cid}`.
    pub async fn remove_collaborator_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path((document_id, collaborator_id)): Path<(String, String)>,
    ) -> Result<Json<CollaboratorView>, AppError> {
        let removed = process_remove_collaborator(
            state.document_repo.as_ref(),
            state.collaborator_repo.as_ref(),
            &document_id,
            &user.user_id,
            &collaborator_id,
        )
        .await?;
        Ok(Json(removed))
    }
}
