use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::models::{AuthenticatedUser, UserRole};
use crate::db::registration_repository::RegistrationRepository;
use crate::error::AppError;
use crate::models::registration::{RegistrationRequest, RegistrationStatus, Resolution};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRegistrationRequest {
    pub email: String,
    pub full_name: String,
    pub requested_role: UserRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

fn require_admin(actor: &AuthenticatedUser, operation: &str) -> Result<(), AppError> {
    if actor.is_admin() {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "{} requires the admin role (user '{}' is {})",
        operation, actor.user_id, actor.role
    )))
}

/// Core logic to file a registration request. Anyone may submit.
pub async fn process_submit_registration(
    registrations: &dyn RegistrationRepository,
    request: SubmitRegistrationRequest,
) -> Result<RegistrationRequest, AppError> {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(format!(
            "'{}' is not a valid email address",
            request.email
        )));
    }
    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".into()));
    }
    if request.requested_role == UserRole::Admin {
        return Err(AppError::Validation(
            "Admin accounts cannot be requested through registration".into(),
        ));
    }

    let registration = RegistrationRequest::new(
        email.to_lowercase(),
        full_name.to_string(),
        request.requested_role,
    );
    registrations.insert(registration.clone()).await?;

    tracing::info!(
        registration_id = %registration.id,
        requested_role = %registration.requested_role,
        "Registration submitted"
    );

    Ok(registration)
}

/// Core logic to list PENDING requests. Admin only.
pub async fn process_list_pending(
    registrations: &dyn RegistrationRepository,
    actor: &AuthenticatedUser,
) -> Result<Vec<RegistrationRequest>, AppError> {
    require_admin(actor, "listPendingRegistrations")?;
    registrations.list_pending().await
}

/// Write a resolution onto a PENDING request. A request resolved earlier,
/// or concurrently, yields `Conflict`.
async fn resolve(
    registrations: &dyn RegistrationRepository,
    actor: &AuthenticatedUser,
    request_id: &str,
    resolution: Resolution,
) -> Result<RegistrationRequest, AppError> {
    let existing = registrations
        .find_by_id(request_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Registration request '{}' not found", request_id))
        })?;

    let already_resolved = || {
        AppError::Conflict(format!(
            "Registration request '{}' was already resolved",
            request_id
        ))
    };

    if existing.status != RegistrationStatus::Pending {
        tracing::warn!(
            registration_id = %request_id,
            status = existing.status.as_str(),
            "Rejected second resolution"
        );
        return Err(already_resolved());
    }

    let status = resolution.status;
    let resolved = registrations
        .resolve(request_id, resolution)
        .await?
        .ok_or_else(already_resolved)?;

    tracing::info!(
        registration_id = %request_id,
        user_id = %actor.user_id,
        status = status.as_str(),
        "Registration resolved"
    );

    Ok(resolved)
}

/// Core logic to approve a PENDING request. Admin only.
pub async fn process_approve_registration(
    registrations: &dyn RegistrationRepository,
    actor: &AuthenticatedUser,
    request_id: &str,
    request: ApproveRequest,
) -> Result<RegistrationRequest, AppError> {
    require_admin(actor, "approveRegistration")?;

    let notes = request
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let resolution = Resolution {
        status: RegistrationStatus::Approved,
        notes,
        rejection_reason: None,
        resolved_by: actor.user_id.clone(),
        resolved_at: Utc::now(),
    };
    resolve(registrations, actor, request_id, resolution).await
}

/// Core logic to reject a PENDING request. Admin only; the reason is
/// mandatory.
pub async fn process_reject_registration(
    registrations: &dyn RegistrationRepository,
    actor: &AuthenticatedUser,
    request_id: &str,
    request: RejectRequest,
) -> Result<RegistrationRequest, AppError> {
    require_admin(actor, "rejectRegistration")?;

    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation(
            "A reason is required to reject a registration".into(),
        ));
    }

    let resolution = Resolution {
        status: RegistrationStatus::Rejected,
        notes: None,
        rejection_reason: Some(reason.to_string()),
        resolved_by: actor.user_id.clone(),
        resolved_at: Utc::now(),
    };
    resolve(registrations, actor, request_id, resolution).await
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

    /// Axum handler for `POST /api/v1/registrations`. No identity required.
    pub async fn submit_registration_handler(
        State(state): State<AppState>,
        Json(request): Json<SubmitRegistrationRequest>,
    ) -> Result<(StatusCode, Json<RegistrationRequest>), AppError> {
        let registration =
            process_submit_registration(state.registration_repo.as_ref(), request).await?;
        Ok((StatusCode::CREATED, Json(registration)))
    }

    /// Axum handler for `GET /api/v1/registrations/pending`.
    pub async fn list_pending_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
    ) -> Result<Json<Vec<RegistrationRequest>>, AppError> {
        let pending = process_list_pending(state.registration_repo.as_ref(), &user).await?;
        Ok(Json(pending))
    }

    /// Axum handler for `POST /api/v1/registrations/{id}/approve`.
    pub async fn approve_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path(request_id): Path<String>,
        body: Option<Json<ApproveRequest>>,
    ) -> Result<Json<RegistrationRequest>, AppError> {
        let request = body.map(|Json(b)| b).unwrap_or_default();
        let resolved = process_approve_registration(
            state.registration_repo.as_ref(),
            &user,
            &request_id,
            request,
        )
        .await?;
        Ok(Json(resolved))
    }

    /// Axum handler for `POST /api/v1/registrations/{id}/reject`.
    pub async fn reject_handler(
        State(state): State<AppState>,
        user: AuthenticatedUser,
        Path(request_id): Path<String>,
        Json(request): Json<RejectRequest>,
    ) -> Result<Json<RegistrationRequest>, AppError> {
        let resolved = process_reject_registration(
            state.registration_repo.as_ref(),
            &user,
            &request_id,
            request,
        )
        .await?;
        Ok(Json(resolved))
    }
}
