//! Document-scoped access guards shared by every operation.

use crate::db::collaborator_repository::CollaboratorRepository;
use crate::error::AppError;
use crate::models::collaborator::{Collaborator, Permission, RoleFamily};

/// Resolve the caller's active membership on a document.
///
/// Non-members are rejected with `Forbidden`, not `NotFound`.
pub async fn require_member(
    collaborators: &dyn CollaboratorRepository,
    document_id: &str,
    user_id: &str,
) -> Result<Collaborator, AppError> {
    collaborators
        .find_active(document_id, user_id)
        .await?
        .ok_or_else(|| {
            AppError::Forbidden(format!(
                "User '{}' is not a collaborator on document '{}'",
                user_id, document_id
            ))
        })
}

/// Require at least `permission`, naming `operation` in the rejection.
pub fn require_permission(
    member: &Collaborator,
    permission: Permission,
    operation: &str,
) -> Result<(), AppError> {
    if member.permission.has_at_least(permission) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "{} requires {} permission or higher (user '{}' holds {})",
        operation, permission, member.user_id, member.permission
    )))
}

/// Require a role in `family` and at least `permission`.
pub fn require_family(
    member: &Collaborator,
    family: RoleFamily,
    permission: Permission,
    operation: &str,
) -> Result<(), AppError> {
    if member.family() == family && member.permission.has_at_least(permission) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "{} requires a {}-family collaborator with {} permission or higher \
         (user '{}' holds {}/{})",
        operation, family, permission, member.user_id, member.role, member.permission
    )))
}

/// Reject operations where the actor targets their own membership record.
pub fn forbid_self_target(actor: &Collaborator, target: &Collaborator) -> Result<(), AppError> {
    if actor.id == target.id || actor.user_id == target.user_id {
        return Err(AppError::Forbidden(format!(
            "User '{}' cannot modify their own collaborator record",
            actor.user_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collaborator::CollaboratorRole;

    fn member(role: CollaboratorRole, permission: Permission) -> Collaborator {
        Collaborator::new("doc".into(), "user".into(), role, permission, "owner".into())
    }

    #[test]
    fn test_require_permission() {
        let writer = member(CollaboratorRole::CoStudent, Permission::ReadWrite);
        assert!(require_permission(&writer, Permission::ReadComment, "comment").is_ok());
        let err = require_permission(&writer, Permission::FullAccess, "manage").unwrap_err();
        match err {
            AppError::Forbidden(msg) => {
                assert!(msg.contains("FULL_ACCESS"));
                assert!(msg.contains("READ_WRITE"));
            }
            other => panic!("Expected Forbidden error, got: {:?}", other),
        }
    }

    #[test]
    fn test_require_family_checks_both_axes() {
        let student_manager = member(CollaboratorRole::PrimaryStudent, Permission::FullAccess);
        assert!(require_family(
            &student_manager,
            RoleFamily::Advisor,
            Permission::ReadOnly,
            "approve"
        )
        .is_err());

        let weak_advisor = member(CollaboratorRole::CoAdvisor, Permission::ReadOnly);
        assert!(require_family(
            &weak_advisor,
            RoleFamily::Advisor,
            Permission::ReadComment,
            "approve"
        )
        .is_err());

        let advisor = member(CollaboratorRole::CoAdvisor, Permission::ReadComment);
        assert!(require_family(&advisor, RoleFamily::Advisor, Permission::ReadComment, "approve")
            .is_ok());
    }

    #[test]
    fn test_forbid_self_target() {
        let actor = member(CollaboratorRole::PrimaryStudent, Permission::FullAccess);
        assert!(forbid_self_target(&actor, &actor).is_err());

        let mut other = member(CollaboratorRole::CoStudent, Permission::ReadWrite);
        other.user_id = "someone-else".into();
        assert!(forbid_self_target(&actor, &other).is_ok());
    }
}
