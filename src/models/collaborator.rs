use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic position of a collaborator on a document.
///
/// Role and [`Permission`] are independent axes; capabilities are derived
/// from the permission only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaboratorRole {
    PrimaryStudent,
    SecondaryStudent,
    CoStudent,
    PrimaryAdvisor,
    SecondaryAdvisor,
    CoAdvisor,
    ExternalAdvisor,
    Examiner,
    Reviewer,
    Observer,
}

/// Grouping of roles. Only the student and advisor families have a primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleFamily {
    Student,
    Advisor,
    Other,
}

impl RoleFamily {
    /// The primary role of this family, if it has one.
    pub fn primary_role(&self) -> Option<CollaboratorRole> {
        match self {
            RoleFamily::Student => Some(CollaboratorRole::PrimaryStudent),
            RoleFamily::Advisor => Some(CollaboratorRole::PrimaryAdvisor),
            RoleFamily::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleFamily::Student => "STUDENT",
            RoleFamily::Advisor => "ADVISOR",
            RoleFamily::Other => "OTHER",
        }
    }
}

impl fmt::Display for RoleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CollaboratorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorRole::PrimaryStudent => "PRIMARY_STUDENT",
            CollaboratorRole::SecondaryStudent => "SECONDARY_STUDENT",
            CollaboratorRole::CoStudent => "CO_STUDENT",
            CollaboratorRole::PrimaryAdvisor => "PRIMARY_ADVISOR",
            CollaboratorRole::SecondaryAdvisor => "SECONDARY_ADVISOR",
            CollaboratorRole::CoAdvisor => "CO_ADVISOR",
            CollaboratorRole::ExternalAdvisor => "EXTERNAL_ADVISOR",
            CollaboratorRole::Examiner => "EXAMINER",
            CollaboratorRole::Reviewer => "REVIEWER",
            CollaboratorRole::Observer => "OBSERVER",
        }
    }

    pub fn family(&self) -> RoleFamily {
        match self {
            CollaboratorRole::PrimaryStudent
            | CollaboratorRole::SecondaryStudent
            | CollaboratorRole::CoStudent => RoleFamily::Student,
            CollaboratorRole::PrimaryAdvisor
            | CollaboratorRole::SecondaryAdvisor
            | CollaboratorRole::CoAdvisor
            | CollaboratorRole::ExternalAdvisor => RoleFamily::Advisor,
            CollaboratorRole::Examiner | CollaboratorRole::Reviewer | CollaboratorRole::Observer => {
                RoleFamily::Other
            }
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            CollaboratorRole::PrimaryStudent | CollaboratorRole::PrimaryAdvisor
        )
    }

    /// Role a primary falls back to when another collaborator is promoted
    /// over it: the next most senior role of the same family.
    pub fn demoted(&self) -> CollaboratorRole {
        match self {
            CollaboratorRole::PrimaryStudent => CollaboratorRole::SecondaryStudent,
            CollaboratorRole::PrimaryAdvisor => CollaboratorRole::SecondaryAdvisor,
            other => *other,
        }
    }
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tier. The order of variants matters: it defines the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ReadOnly = 0,
    ReadComment = 1,
    ReadWrite = 2,
    FullAccess = 3,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadOnly => "READ_ONLY",
            Permission::ReadComment => "READ_COMMENT",
            Permission::ReadWrite => "READ_WRITE",
            Permission::FullAccess => "FULL_ACCESS",
        }
    }

    /// Returns `true` if `self` is at least the required level.
    pub fn has_at_least(&self, required: Permission) -> bool {
        *self >= required
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership of one user on one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub role: CollaboratorRole,
    pub permission: Permission,
    pub active: bool,
    pub added_by: String,
    #[serde(with = "crate::models::timestamp")]
    pub added_at: DateTime<Utc>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub last_access_at: Option<DateTime<Utc>>,
}

impl Collaborator {
    pub fn new(
        document_id: String,
        user_id: String,
        role: CollaboratorRole,
        permission: Permission,
        added_by: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id,
            user_id,
            role,
            permission,
            active: true,
            added_by,
            added_at: Utc::now(),
            last_access_at: None,
        }
    }

    pub fn can_edit(&self) -> bool {
        self.permission.has_at_least(Permission::ReadWrite)
    }

    pub fn can_comment(&self) -> bool {
        self.permission.has_at_least(Permission::ReadComment)
    }

    pub fn can_manage(&self) -> bool {
        self.permission == Permission::FullAccess
    }

    pub fn is_primary(&self) -> bool {
        self.role.is_primary()
    }

    pub fn family(&self) -> RoleFamily {
        self.role.family()
    }
}

/// A collaborator record together with its derived capabilities, as exposed
/// to API consumers. Capabilities are computed on read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorView {
    #[serde(flatten)]
    pub collaborator: Collaborator,
    pub can_edit: bool,
    pub can_comment: bool,
    pub can_manage: bool,
    pub is_primary: bool,
}

impl From<Collaborator> for CollaboratorView {
    fn from(collaborator: Collaborator) -> Self {
        Self {
            can_edit: collaborator.can_edit(),
            can_comment: collaborator.can_comment(),
            can_manage: collaborator.can_manage(),
            is_primary: collaborator.is_primary(),
            collaborator,
        }
    }
}

/// Compare-and-swap update of a collaborator's standing. Applied only if
/// the stored record is still active with the expected role and permission.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleChange {
    pub collaborator_id: String,
    pub expected_role: CollaboratorRole,
    pub expected_permission: Permission,
    pub role: CollaboratorRole,
    pub permission: Permission,
}

impl RoleChange {
    /// A change expecting `current`'s present standing.
    pub fn from_current(
        current: &Collaborator,
        role: CollaboratorRole,
        permission: Permission,
    ) -> Self {
        Self {
            collaborator_id: current.id.clone(),
            expected_role: current.role,
            expected_permission: current.permission,
            role,
            permission,
        }
    }

    pub fn matches(&self, collaborator: &Collaborator) -> bool {
        collaborator.active
            && collaborator.id == self.collaborator_id
            && collaborator.role == self.expected_role
            && collaborator.permission == self.expected_permission
    }
}

/// The two writes of a primary handover. Storage applies both or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimarySwap {
    pub document_id: String,
    /// The outgoing primary, if the family currently has one.
    pub demote: Option<RoleChange>,
    pub promote: RoleChange,
}
