use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform-wide role of an account.
///
/// This is separate from the per-document [`CollaboratorRole`]: it decides
/// who may create documents and who may resolve registration requests.
///
/// [`CollaboratorRole`]: crate::models::collaborator::CollaboratorRole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Student,
    Advisor,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Student => write!(f, "student"),
            UserRole::Advisor => write!(f, "advisor"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse a role from a string (case-insensitive).
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "student" => Some(UserRole::Student),
            "advisor" => Some(UserRole::Advisor),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Unique user identifier.
    pub user_id: String,
    /// The user's platform role.
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_ci() {
        assert_eq!(UserRole::from_str_ci("Student"), Some(UserRole::Student));
        assert_eq!(UserRole::from_str_ci("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str_ci(" advisor "), Some(UserRole::Advisor));
        assert_eq!(UserRole::from_str_ci("examiner"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(UserRole::Student.to_string(), "student");
        assert_eq!(UserRole::Advisor.to_string(), "advisor");
        assert_eq!(UserRole::Admin.to_string(), "admin");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let user = AuthenticatedUser::new("user-123", UserRole::Advisor);
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"ADVISOR\""));
        let deserialized: AuthenticatedUser = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, user);
        assert!(!deserialized.is_admin());
    }
}
