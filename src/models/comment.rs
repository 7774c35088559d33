use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feedback anchored to one exact version. Never edited, never reparented;
/// it can only be marked resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub version_id: String,
    pub content: String,
    pub resolved: bool,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(version_id: String, content: String, created_by: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            version_id,
            content,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_by,
            created_at: Utc::now(),
        }
    }
}
