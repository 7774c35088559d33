use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::collaborator::{Collaborator, Permission, RoleFamily};
use crate::models::version::Version;

/// Lifecycle status of a document.
///
/// Legal edges:
///
/// ```text
/// DRAFT --submit--> SUBMITTED --approve--> APPROVED --finalize--> FINALIZED
///                     |    ^
///    request_revision |    | submit
///                     v    |
///                    REVISION
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    Revision,
    Approved,
    Finalized,
}

impl DocumentStatus {
    /// The stored representation, matching the serde encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::Submitted => "SUBMITTED",
            DocumentStatus::Revision => "REVISION",
            DocumentStatus::Approved => "APPROVED",
            DocumentStatus::Finalized => "FINALIZED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Finalized)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verbs a client may request. Callers never name a target status
/// directly; the target is derived from the verb and the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Submit,
    RequestRevision,
    Approve,
    Finalize,
}

impl TransitionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionAction::Submit => "submit",
            TransitionAction::RequestRevision => "request_revision",
            TransitionAction::Approve => "approve",
            TransitionAction::Finalize => "finalize",
        }
    }

    /// Target status of this action from `from`, or `None` when the edge
    /// is not part of the graph.
    pub fn target_from(&self, from: DocumentStatus) -> Option<DocumentStatus> {
        use DocumentStatus::*;
        match (self, from) {
            (TransitionAction::Submit, Draft) | (TransitionAction::Submit, Revision) => {
                Some(Submitted)
            }
            (TransitionAction::RequestRevision, Submitted) => Some(Revision),
            (TransitionAction::Approve, Submitted) => Some(Approved),
            (TransitionAction::Finalize, Approved) => Some(Finalized),
            _ => None,
        }
    }

    /// Role family the actor must belong to.
    pub fn required_family(&self) -> RoleFamily {
        match self {
            TransitionAction::Submit => RoleFamily::Student,
            TransitionAction::RequestRevision
            | TransitionAction::Approve
            | TransitionAction::Finalize => RoleFamily::Advisor,
        }
    }

    /// Minimum permission level the actor must hold.
    pub fn required_permission(&self) -> Permission {
        match self {
            TransitionAction::Submit => Permission::ReadWrite,
            TransitionAction::RequestRevision | TransitionAction::Approve => {
                Permission::ReadComment
            }
            TransitionAction::Finalize => Permission::FullAccess,
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authored monograph and its lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: DocumentStatus,
    /// Set by a revision request; kept afterwards as history.
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_by: String,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub revision_requested_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub finalized_at: Option<DateTime<Utc>>,
    /// Bumped by every write to the document; status changes compare it.
    #[serde(default)]
    pub generation: i64,
}

impl Document {
    /// A fresh DRAFT document.
    pub fn new_draft(title: String, description: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description,
            status: DocumentStatus::Draft,
            rejection_reason: None,
            created_by,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            revision_requested_at: None,
            finalized_at: None,
            generation: 0,
        }
    }

    /// Apply a status change together with its side-effect fields.
    pub fn apply(&mut self, change: &StatusChange) {
        self.status = change.to;
        self.updated_at = change.at;
        self.generation += 1;
        match change.to {
            DocumentStatus::Submitted => self.submitted_at = Some(change.at),
            DocumentStatus::Revision => {
                self.rejection_reason = change.rejection_reason.clone();
                self.revision_requested_at = Some(change.at);
            }
            DocumentStatus::Approved => self.approved_at = Some(change.at),
            DocumentStatus::Finalized => self.finalized_at = Some(change.at),
            DocumentStatus::Draft => {}
        }
    }
}

/// Everything written when a document is created: the draft, its
/// PRIMARY_STUDENT owner and, optionally, version 1.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document: Document,
    pub owner: Collaborator,
    pub initial_version: Option<Version>,
}

/// A single status write, applied atomically with its side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub to: DocumentStatus,
    pub at: DateTime<Utc>,
    /// Only meaningful when `to` is REVISION.
    pub rejection_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [DocumentStatus; 5] = [
        DocumentStatus::Draft,
        DocumentStatus::Submitted,
        DocumentStatus::Revision,
        DocumentStatus::Approved,
        DocumentStatus::Finalized,
    ];

    const ALL_ACTIONS: [TransitionAction; 4] = [
        TransitionAction::Submit,
        TransitionAction::RequestRevision,
        TransitionAction::Approve,
        TransitionAction::Finalize,
    ];

    #[test]
    fn test_legal_edges() {
        use DocumentStatus::*;
        let mut edges = Vec::new();
        for from in ALL_STATUSES {
            for action in ALL_ACTIONS {
                if let Some(to) = action.target_from(from) {
                    edges.push((from, to));
                }
            }
        }
        edges.sort_by_key(|(a, b)| (a.as_str(), b.as_str()));

        let mut expected = vec![
            (Draft, Submitted),
            (Submitted, Revision),
            (Submitted, Approved),
            (Revision, Submitted),
            (Approved, Finalized),
        ];
        expected.sort_by_key(|(a, b)| (a.as_str(), b.as_str()));

        assert_eq!(edges, expected);
    }

    #[test]
    fn test_finalized_is_absorbing() {
        assert!(DocumentStatus::Finalized.is_terminal());
        for action in ALL_ACTIONS {
            assert_eq!(action.target_from(DocumentStatus::Finalized), None);
        }
    }

    #[test]
    fn test_draft_cannot_jump_to_approved() {
        assert_eq!(TransitionAction::Approve.target_from(DocumentStatus::Draft), None);
        assert_eq!(TransitionAction::Finalize.target_from(DocumentStatus::Draft), None);
    }

    #[test]
    fn test_apply_sets_side_effect_fields() {
        let mut doc = Document::new_draft("T".into(), String::new(), "alice".into());
        let at = Utc::now();

        doc.apply(&StatusChange {
            to: DocumentStatus::Submitted,
            at,
            rejection_reason: None,
        });
        assert_eq!(doc.submitted_at, Some(at));

        doc.apply(&StatusChange {
            to: DocumentStatus::Revision,
            at,
            rejection_reason: Some("needs more analysis".into()),
        });
        assert_eq!(doc.status, DocumentStatus::Revision);
        assert_eq!(doc.rejection_reason.as_deref(), Some("needs more analysis"));
        assert_eq!(doc.revision_requested_at, Some(at));

        doc.apply(&StatusChange {
            to: DocumentStatus::Approved,
            at,
            rejection_reason: None,
        });
        assert_eq!(doc.approved_at, Some(at));
        assert_eq!(doc.generation, 3);
        // history is kept once approved
        assert_eq!(doc.rejection_reason.as_deref(), Some("needs more analysis"));
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Submitted).unwrap(),
            "\"SUBMITTED\""
        );
        let action: TransitionAction = serde_json::from_str("\"request_revision\"").unwrap();
        assert_eq!(action, TransitionAction::RequestRevision);
        assert!(serde_json::from_str::<TransitionAction>("\"APPROVED\"").is_err());
    }

    #[test]
    fn test_document_defaults_on_old_records() {
        let json = r###"{
            "id": "d1",
            "title": "Thesis",
            "status": "DRAFT",
            "created_by": "alice",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"###;

        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.description, "");
        assert_eq!(doc.rejection_reason, None);
        assert_eq!(doc.finalized_at, None);
        assert_eq!(doc.generation, 0);
    }
}
