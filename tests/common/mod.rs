#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use serde_json::Value;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

use monograph::app::{router, AppState};
use monograph::config::WorkflowPolicy;

/// Holds the running MongoDB container (if any) and the router under test.
///
/// The container is kept alive for as long as this struct lives. When
/// dropped, it is stopped and cleaned up automatically.
pub struct TestEnv {
    _mongo: Option<ContainerAsync<Mongo>>,
    pub db: Option<mongodb::Database>,
    pub state: AppState,
    pub router: Router,
}

impl TestEnv {
    /// Start a single-node MongoDB replica set (transactions need one) and
    /// build the router on top of it.
    pub async fn start() -> Self {
        Self::start_with_policy(WorkflowPolicy::default()).await
    }

    pub async fn start_with_policy(policy: WorkflowPolicy) -> Self {
        let mongo_container = Mongo::repl_set()
            .start()
            .await
            .expect("Failed to start MongoDB container");

        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let mongo_uri = format!("mongodb://127.0.0.1:{}/?directConnection=true", mongo_port);

        let db_name = format!("monograph_test_{}", uuid::Uuid::new_v4().simple());
        let db = monograph::db::mongo::connect(&mongo_uri, &db_name)
            .await
            .expect("Failed to connect to MongoDB");
        monograph::db::mongo::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let state = AppState::mongo(&db, policy);
        Self {
            _mongo: Some(mongo_container),
            db: Some(db),
            router: router(state.clone()),
            state,
        }
    }

    /// Same router over the in-memory store; no container needed.
    pub fn in_memory() -> Self {
        let state = AppState::in_memory(WorkflowPolicy::default());
        Self {
            _mongo: None,
            db: None,
            router: router(state.clone()),
            state,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .build(self.router.clone())
    }
}

/// Attach caller identity headers to a request.
pub fn as_user(
    request: axum_test::TestRequest,
    user_id: &str,
    role: &str,
) -> axum_test::TestRequest {
    request
        .add_header(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_str(user_id).expect("valid header value"),
        )
        .add_header(
            HeaderName::from_static("x-user-role"),
            HeaderValue::from_str(role).expect("valid header value"),
        )
}

/// Helper: create a document as `student` and return its id.
pub async fn create_document(
    server: &axum_test::TestServer,
    student: &str,
    content: Option<&str>,
) -> String {
    let response = as_user(server.post("/api/v1/documents"), student, "student")
        .json(&serde_json::json!({
            "title": "Consensus under partial synchrony",
            "description": "Master's monograph",
            "content": content,
        }))
        .await;
    let body: Value = response.json();
    body["document"]["id"]
        .as_str()
        .expect("document id")
        .to_string()
}

/// Helper: add a collaborator and return the new record's id.
pub async fn add_collaborator(
    server: &axum_test::TestServer,
    document_id: &str,
    actor: &str,
    user_id: &str,
    role: &str,
    permission: &str,
) -> String {
    let response = as_user(
        server.post(&format!("/api/v1/documents/{}/collaborators", document_id)),
        actor,
        "student",
    )
    .json(&serde_json::json!({
        "user_id": user_id,
        "role": role,
        "permission": permission,
    }))
    .await;
    let body: Value = response.json();
    body["id"].as_str().expect("collaborator id").to_string()
}

/// Helper: request a transition and return the response.
pub async fn transition(
    server: &axum_test::TestServer,
    document_id: &str,
    actor: &str,
    role: &str,
    action: &str,
    reason: Option<&str>,
) -> axum_test::TestResponse {
    as_user(
        server.post(&format!("/api/v1/documents/{}/transitions", document_id)),
        actor,
        role,
    )
    .json(&serde_json::json!({ "action": action, "reason": reason }))
    .await
}
