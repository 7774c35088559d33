use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::models::UserRole;

/// Account registration state. Only PENDING requests can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "PENDING",
            RegistrationStatus::Approved => "APPROVED",
            RegistrationStatus::Rejected => "REJECTED",
        }
    }
}

/// A request for a platform account, gated by an administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub requested_role: UserRole,
    pub status: RegistrationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

/// The outcome written when a PENDING request is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: RegistrationStatus,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
}

impl RegistrationRequest {
    pub fn new(email: String, full_name: String, requested_role: UserRole) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            full_name,
            requested_role,
            status: RegistrationStatus::Pending,
            notes: None,
            rejection_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn apply(&mut self, resolution: &Resolution) {
        self.status = resolution.status;
        self.notes = resolution.notes.clone();
        self.rejection_reason = resolution.rejection_reason.clone();
        self.resolved_by = Some(resolution.resolved_by.clone());
        self.resolved_at = Some(resolution.resolved_at);
    }
}
