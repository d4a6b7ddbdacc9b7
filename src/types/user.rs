//! Users, roles and the resolved caller identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::UserId;

/// Role of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Student account.
    Student,
    /// Teacher account.
    Teacher,
    /// Visitor account (read, vote and follow only).
    Visitor,
    /// Administrator; bypasses ownership and dependency checks.
    Admin,
}

impl Role {
    /// Parse a role from its one-letter code or its name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s" | "student" => Some(Self::Student),
            "t" | "teacher" => Some(Self::Teacher),
            "v" | "visitor" => Some(Self::Visitor),
            "a" | "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// One-letter storage code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Student => "S",
            Self::Teacher => "T",
            Self::Visitor => "V",
            Self::Admin => "A",
        }
    }

    /// Whether this role may author questions, comments and handbook items.
    pub fn can_author(&self) -> bool {
        !matches!(self, Self::Visitor)
    }

    /// Whether this role carries elevated privilege.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Visitor
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Teacher => write!(f, "teacher"),
            Self::Visitor => write!(f, "visitor"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name.
    pub id: UserId,
    /// Contact address.
    pub email: Option<String>,
    /// Avatar image URL.
    pub avatar: Option<String>,
    /// Account role.
    pub role: Role,
}

impl User {
    /// Create a user with no email or avatar.
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: None,
            avatar: None,
            role,
        }
    }

    /// Set the avatar URL.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// An interest tag attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserTag {
    /// Tagged user.
    pub user: UserId,
    /// Tag text.
    pub tag: String,
}

/// Identity and role of the party invoking an operation.
///
/// Resolved by the authentication layer before any core operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// The authenticated user.
    pub user: UserId,
    /// The user's role.
    pub role: Role,
}

impl Caller {
    /// Create a caller.
    pub fn new(user: impl Into<UserId>, role: Role) -> Self {
        Self {
            user: user.into(),
            role,
        }
    }

    /// Caller identity for a stored user.
    pub fn of(user: &User) -> Self {
        Self {
            user: user.id.clone(),
            role: user.role,
        }
    }

    /// True when the caller owns `owner` or is an admin.
    pub fn owns_or_admin(&self, owner: Option<&UserId>) -> bool {
        self.role.is_admin() || owner == Some(&self.user)
    }
}
