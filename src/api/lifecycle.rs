use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::access::{require_family, require_member};
use crate::config::WorkflowPolicy;
use crate::db::collaborator_repository::CollaboratorRepository;
use crate::db::repository::DocumentRepository;
use crate::db::version_repository::VersionRepository;
use crate::error::AppError;
use crate::models::document::{Document, DocumentStatus, StatusChange, TransitionAction};

/// Request payload for a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub action: TransitionAction,
    /// Mandatory for `request_revision`, ignored otherwise.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Core state-machine logic.
///
/// Checks run in a fixed order: the edge must exist, the actor must be
/// authorized for it, then action-specific validation. Nothing is written
/// until all checks pass, and the write itself is a compare-and-swap on the
/// status and generation that were checked, so any write in between (a
/// round trip through REVISION, a new version) makes the action fail.
pub async fn process_transition(
    docs: &dyn DocumentRepository,
    versions: &dyn VersionRepository,
    collaborators: &dyn CollaboratorRepository,
    policy: &WorkflowPolicy,
    document_id: &str,
    actor_id: &str,
    request: TransitionRequest,
) -> Result<Document, AppError> {
    let document = docs
        .find_by_id(document_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document '{}' not found", document_id)))?;

    let action = request.action;
    let target = action.target_from(document.status).ok_or_else(|| {
        AppError::TransitionInvalid(format!(
            "Cannot {} document '{}' in status {}",
            action, document_id, document.status
        ))
    })?;

    let member = require_member(collaborators, document_id, actor_id).await?;
    require_family(
        &member,
        action.required_family(),
        action.required_permission(),
        action.as_str(),
    )?;

    let rejection_reason = match action {
        TransitionAction::Submit => {
            check_submittable(versions, policy, &document).await?;
            None
        }
        TransitionAction::RequestRevision => {
            let reason = request
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    AppError::Validation("A reason is required to request a revision".into())
                })?;
            Some(reason.to_string())
        }
        TransitionAction::Approve | TransitionAction::Finalize => None,
    };

    let change = StatusChange {
        to: target,
        at: Utc::now(),
        rejection_reason,
    };

    match docs.transition(&document, change).await? {
        Some(updated) => {
            tracing::info!(
                document_id = %document_id,
                user_id = %actor_id,
                from = %document.status,
                to = %updated.status,
                "Document transitioned"
            );
            Ok(updated)
        }
        None => {
            let current = docs
                .find_by_id(document_id)
                .await?
                .map(|d| d.status.to_string())
                .unwrap_or_else(|| "deleted".to_string());
            tracing::warn!(
                document_id = %document_id,
                user_id = %actor_id,
                expected = %document.status,
                current = %current,
                "Lost status race"
            );
            Err(AppError::TransitionInvalid(format!(
                "Document '{}' was modified concurrently (was {}, now {}); cannot {}",
                document_id, document.status, current, action
            )))
        }
    }
}

/// A document can be submitted once it has content; with the resubmission
/// policy on, a REVISION document needs content newer than the request.
async fn check_submittable(
    versions: &dyn VersionRepository,
    policy: &WorkflowPolicy,
    document: &Document,
) -> Result<(), AppError> {
    let Some(latest) = versions.latest(&document.id).await? else {
        return Err(AppError::Validation(format!(
            "Document '{}' has no versions to submit",
            document.id
        )));
    };

    if document.status == DocumentStatus::Revision && policy.require_new_version_on_resubmit {
        let requested_at = document.revision_requested_at.unwrap_or(document.updated_at);
        if latest.created_at <= requested_at {
            return Err(AppError::Validation(format!(
                "Resubmitting document '{}' requires a new version after the revision request \
                 (latest is version {})",
                document.id, latest.version_number
            )));
        }
    }

    Ok(())
}

/// Axum handler for `POST /api/v1/documents/{id}/transitions`.
#[cfg(feature = "server")]
pub async fn transition_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    user: crate::auth::models::AuthenticatedUser,
    axum::extract::Path(document_id): axum::extract::Path<String>,
    crate::api::errors::Json(request): crate::api::errors::Json<TransitionRequest>,
) -> Result<axum::Json<Document>, AppError> {
    let document = process_transition(
        state.document_repo.as_ref(),
        state.version_repo.as_ref(),
        state.collaborator_repo.as_ref(),
        &state.policy,
        &document_id,
        &user.user_id,
        request,
    )
    .await?;

    Ok(axum::Json(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::collaborator::{Collaborator, CollaboratorRole, Permission};
    use crate::models::version::NewVersion;
    use std::sync::Arc;

    struct Fixture {
        store: MemoryStore,
        document_id: String,
    }

    /// Draft with alice as primary student, bob as primary advisor.
    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let doc = Document::new_draft("Thesis".into(), String::new(), "alice".into());
        let document_id = doc.id.clone();
        DocumentRepository::insert(&store, doc).await.unwrap();

        for (user, role) in [
            ("alice", CollaboratorRole::PrimaryStudent),
            ("bob", CollaboratorRole::PrimaryAdvisor),
        ] {
            CollaboratorRepository::insert(
                &store,
                Collaborator::new(
                    document_id.clone(),
                    user.into(),
                    role,
                    Permission::FullAccess,
                    "alice".into(),
                ),
            )
            .await
            .unwrap();
        }

        Fixture { store, document_id }
    }

    impl Fixture {
        async fn add(&self, user: &str, role: CollaboratorRole, permission: Permission) {
            CollaboratorRepository::insert(
                &self.store,
                Collaborator::new(
                    self.document_id.clone(),
                    user.into(),
                    role,
                    permission,
                    "alice".into(),
                ),
            )
            .await
            .unwrap();
        }

        async fn version(&self, content: &str) {
            self.store
                .append(NewVersion {
                    document_id: self.document_id.clone(),
                    content: content.into(),
                    commit_message: "m".into(),
                    created_by: "alice".into(),
                })
                .await
                .unwrap();
        }

        async fn act(
            &self,
            actor: &str,
            action: TransitionAction,
            reason: Option<&str>,
        ) -> Result<Document, AppError> {
            self.act_with(&WorkflowPolicy::default(), actor, action, reason)
                .await
        }

        async fn act_with(
            &self,
            policy: &WorkflowPolicy,
            actor: &str,
            action: TransitionAction,
            reason: Option<&str>,
        ) -> Result<Document, AppError> {
            process_transition(
                &self.store,
                &self.store,
                &self.store,
                policy,
                &self.document_id,
                actor,
                TransitionRequest {
                    action,
                    reason: reason.map(str::to_string),
                },
            )
            .await
        }

        async fn status(&self) -> DocumentStatus {
            DocumentRepository::find_by_id(&self.store, &self.document_id)
                .await
                .unwrap()
                .unwrap()
                .status
        }
    }

    #[tokio::test]
    async fn test_full_review_cycle() {
        let f = fixture().await;
        f.version("v1").await;

        let doc = f.act("alice", TransitionAction::Submit, None).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Submitted);
        assert!(doc.submitted_at.is_some());

        let result = f.act("bob", TransitionAction::RequestRevision, Some("")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(f.status().await, DocumentStatus::Submitted);

        let doc = f
            .act("bob", TransitionAction::RequestRevision, Some("needs more analysis"))
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Revision);
        assert_eq!(doc.rejection_reason.as_deref(), Some("needs more analysis"));

        let doc = f.act("alice", TransitionAction::Submit, None).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Submitted);

        let doc = f.act("bob", TransitionAction::Approve, None).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Approved);
        assert!(doc.approved_at.is_some());

        let doc = f.act("bob", TransitionAction::Finalize, None).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Finalized);
        assert!(doc.finalized_at.is_some());

        let result = f.act("alice", TransitionAction::Submit, None).await;
        assert!(matches!(result, Err(AppError::TransitionInvalid(_))));
        assert_eq!(f.status().await, DocumentStatus::Finalized);
    }

    #[tokio::test]
    async fn test_submit_requires_a_version() {
        let f = fixture().await;
        let result = f.act("alice", TransitionAction::Submit, None).await;
        match result.unwrap_err() {
            AppError::Validation(msg) => assert!(msg.contains("no versions")),
            other => panic!("Expected Validation error, got: {:?}", other),
        }
        assert_eq!(f.status().await, DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn test_illegal_edges_leave_state_unchanged() {
        let f = fixture().await;
        f.version("v1").await;

        for action in [
            TransitionAction::Approve,
            TransitionAction::Finalize,
            TransitionAction::RequestRevision,
        ] {
            let result = f.act("bob", action, Some("reason")).await;
            match result.unwrap_err() {
                AppError::TransitionInvalid(msg) => assert!(msg.contains("DRAFT")),
                other => panic!("Expected TransitionInvalid error, got: {:?}", other),
            }
        }
        assert_eq!(f.status().await, DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn test_role_families_gate_actions() {
        let f = fixture().await;
        f.version("v1").await;

        // advisors cannot submit, even with full access
        let result = f.act("bob", TransitionAction::Submit, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        f.act("alice", TransitionAction::Submit, None).await.unwrap();

        // students cannot approve their own work
        let result = f.act("alice", TransitionAction::Approve, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        // non-members are rejected
        let result = f.act("mallory", TransitionAction::Approve, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        assert_eq!(f.status().await, DocumentStatus::Submitted);
    }

    #[tokio::test]
    async fn test_permission_levels_gate_actions() {
        let f = fixture().await;
        f.add("carol", CollaboratorRole::SecondaryStudent, Permission::ReadComment)
            .await;
        f.add("dave", CollaboratorRole::CoAdvisor, Permission::ReadOnly).await;
        f.add("erin", CollaboratorRole::ExternalAdvisor, Permission::ReadComment)
            .await;
        f.version("v1").await;

        // a student without edit rights cannot submit
        let result = f.act("carol", TransitionAction::Submit, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        f.act("alice", TransitionAction::Submit, None).await.unwrap();

        // read-only advisor has no review authority
        let result = f.act("dave", TransitionAction::Approve, None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        // commenting advisor may approve but not finalize
        f.act("erin", TransitionAction::Approve, None).await.unwrap();
        let result = f.act("erin", TransitionAction::Finalize, None).await;
        match result.unwrap_err() {
            AppError::Forbidden(msg) => assert!(msg.contains("FULL_ACCESS")),
            other => panic!("Expected Forbidden error, got: {:?}", other),
        }
        assert_eq!(f.status().await, DocumentStatus::Approved);
    }

    #[tokio::test]
    async fn test_reason_is_trimmed_and_ignored_elsewhere() {
        let f = fixture().await;
        f.version("v1").await;

        let doc = f
            .act("alice", TransitionAction::Submit, Some("ignored"))
            .await
            .unwrap();
        assert_eq!(doc.rejection_reason, None);

        let result = f.act("bob", TransitionAction::RequestRevision, Some("   ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        let result = f.act("bob", TransitionAction::RequestRevision, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let doc = f
            .act("bob", TransitionAction::RequestRevision, Some("  fix chapter 2 "))
            .await
            .unwrap();
        assert_eq!(doc.rejection_reason.as_deref(), Some("fix chapter 2"));
    }

    #[tokio::test]
    async fn test_resubmission_policy() {
        let f = fixture().await;
        let strict = WorkflowPolicy {
            require_new_version_on_resubmit: true,
        };
        f.version("v1").await;
        f.act("alice", TransitionAction::Submit, None).await.unwrap();
        f.act("bob", TransitionAction::RequestRevision, Some("more data"))
            .await
            .unwrap();

        let result = f
            .act_with(&strict, "alice", TransitionAction::Submit, None)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(f.status().await, DocumentStatus::Revision);

        f.version("v2").await;
        let doc = f
            .act_with(&strict, "alice", TransitionAction::Submit, None)
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Submitted);
    }

    #[tokio::test]
    async fn test_lenient_resubmission_without_new_version() {
        let f = fixture().await;
        f.version("v1").await;
        f.act("alice", TransitionAction::Submit, None).await.unwrap();
        f.act("bob", TransitionAction::RequestRevision, Some("again"))
            .await
            .unwrap();
        let doc = f.act("alice", TransitionAction::Submit, None).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Submitted);
    }

    #[tokio::test]
    async fn test_stale_read_cannot_approve_after_resubmission() {
        let f = fixture().await;
        f.version("v1").await;
        let seen = f.act("alice", TransitionAction::Submit, None).await.unwrap();

        f.act("bob", TransitionAction::RequestRevision, Some("redo chapter 3"))
            .await
            .unwrap();
        f.version("v2").await;
        f.act("alice", TransitionAction::Submit, None).await.unwrap();

        // Same status as the advisor saw, different content.
        let change = StatusChange {
            to: DocumentStatus::Approved,
            at: Utc::now(),
            rejection_reason: None,
        };
        let result = f.store.transition(&seen, change).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.status().await, DocumentStatus::Submitted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reviews_single_winner() {
        let f = fixture().await;
        f.add("erin", CollaboratorRole::SecondaryAdvisor, Permission::ReadComment)
            .await;
        f.version("v1").await;
        f.act("alice", TransitionAction::Submit, None).await.unwrap();

        let f = Arc::new(f);
        let approve = {
            let f = f.clone();
            tokio::spawn(async move { f.act("bob", TransitionAction::Approve, None).await })
        };
        let revise = {
            let f = f.clone();
            tokio::spawn(async move {
                f.act("erin", TransitionAction::RequestRevision, Some("wait"))
                    .await
            })
        };

        let results = [approve.await.unwrap(), revise.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::TransitionInvalid(_)))));

        let status = f.status().await;
        assert!(status == DocumentStatus::Approved || status == DocumentStatus::Revision);
    }
}
