use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable content snapshot of a document.
///
/// Version numbers start at 1 and grow by one per document with no gaps.
/// Once written a version is never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub document_id: String,
    pub version_number: u32,
    /// Full snapshot, stored as-is.
    pub content: String,
    pub commit_message: String,
    pub created_by: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A version waiting for its number. The store assigns `version_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub document_id: String,
    pub content: String,
    pub commit_message: String,
    pub created_by: String,
}

impl NewVersion {
    /// Materialize with the number the store assigned.
    pub fn into_version(self, version_number: u32) -> Version {
        Version {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: self.document_id,
            version_number,
            content: self.content,
            commit_message: self.commit_message,
            created_by: self.created_by,
            created_at: Utc::now(),
        }
    }
}

/// Version listing entry without the content snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: String,
    pub version_number: u32,
    pub commit_message: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub content_length: usize,
}

impl From<Version> for VersionSummary {
    fn from(v: Version) -> Self {
        Self {
            content_length: v.content.len(),
            id: v.id,
            version_number: v.version_number,
            commit_message: v.commit_message,
            created_by: v.created_by,
            created_at: v.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_version_keeps_snapshot() {
        let draft = NewVersion {
            document_id: "doc-1".into(),
            content: "# Chapter 1".into(),
            commit_message: "initial".into(),
            created_by: "alice".into(),
        };
        let version = draft.into_version(1);
        assert_eq!(version.version_number, 1);
        assert_eq!(version.content, "# Chapter 1");
        assert_eq!(version.document_id, "doc-1");
        assert!(!version.id.is_empty());
    }

    #[test]
    fn test_summary_drops_content() {
        let version = NewVersion {
            document_id: "doc-1".into(),
            content: "abc".into(),
            commit_message: "m".into(),
            created_by: "alice".into(),
        }
        .into_version(3);
        let summary = VersionSummary::from(version);
        assert_eq!(summary.version_number, 3);
        assert_eq!(summary.content_length, 3);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("content").is_none());
    }
}
