use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::WorkflowPolicy;
use crate::db::collaborator_repository::{CollaboratorRepository, MongoCollaboratorRepository};
use crate::db::comment_repository::{CommentRepository, MongoCommentRepository};
use crate::db::memory::MemoryStore;
use crate::db::registration_repository::{MongoRegistrationRepository, RegistrationRepository};
use crate::db::repository::{DocumentRepository, MongoDocumentRepository};
use crate::db::version_repository::{MongoVersionRepository, VersionRepository};

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub document_repo: Arc<dyn DocumentRepository>,
    pub version_repo: Arc<dyn VersionRepository>,
    pub collaborator_repo: Arc<dyn CollaboratorRepository>,
    pub comment_repo: Arc<dyn CommentRepository>,
    pub registration_repo: Arc<dyn RegistrationRepository>,
    pub policy: WorkflowPolicy,
}

impl AppState {
    /// All repositories backed by one [`MemoryStore`].
    pub fn in_memory(policy: WorkflowPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            document_repo: store.clone(),
            version_repo: store.clone(),
            collaborator_repo: store.clone(),
            comment_repo: store.clone(),
            registration_repo: store,
            policy,
        }
    }

    /// All repositories backed by MongoDB collections of `db`.
    pub fn mongo(db: &mongodb::Database, policy: WorkflowPolicy) -> Self {
        Self {
            document_repo: Arc::new(MongoDocumentRepository::new(db)),
            version_repo: Arc::new(MongoVersionRepository::new(db)),
            collaborator_repo: Arc::new(MongoCollaboratorRepository::new(db)),
            comment_repo: Arc::new(MongoCommentRepository::new(db)),
            registration_repo: Arc::new(MongoRegistrationRepository::new(db)),
            policy,
        }
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    use api::{collaborators, comments, documents, lifecycle, registrations, versions};

    Router::new()
        .route(
            "/api/v1/documents",
            post(documents::create_document_handler).get(documents::list_documents_handler),
        )
        .route("/api/v1/documents/{id}", get(documents::get_document_handler))
        .route(
            "/api/v1/documents/{id}/transitions",
            post(lifecycle::transition_handler),
        )
        .route(
            "/api/v1/documents/{id}/versions",
            get(versions::list_versions_handler).post(versions::create_version_handler),
        )
        .route(
            "/api/v1/documents/{id}/collaborators",
            get(collaborators::list_collaborators_handler)
                .post(collaborators::add_collaborator_handler),
        )
        .route(
            "/api/v1/documents/{id}/collaborators/{cid}",
            delete(collaborators::remove_collaborator_handler),
        )
        .route(
            "/api/v1/documents/{id}/collaborators/{cid}/role",
            put(collaborators::update_role_handler),
        )
        .route(
            "/api/v1/documents/{id}/collaborators/{cid}/permission",
            put(collaborators::update_permission_handler),
        )
        .route(
            "/api/v1/documents/{id}/collaborators/{cid}/promote",
            post(collaborators::promote_handler),
        )
        .route("/api/v1/versions/{id}", get(versions::get_version_handler))
        .route(
            "/api/v1/versions/{id}/comments",
            get(comments::list_comments_handler).post(comments::add_comment_handler),
        )
        .route(
            "/api/v1/comments/{id}/resolve",
            post(comments::resolve_comment_handler),
        )
        .route(
            "/api/v1/registrations",
            post(registrations::submit_registration_handler),
        )
        .route(
            "/api/v1/registrations/pending",
            get(registrations::list_pending_handler),
        )
        .route(
            "/api/v1/registrations/{id}/approve",
            post(registrations::approve_handler),
        )
        .route(
            "/api/v1/registrations/{id}/reject",
            post(registrations::reject_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
