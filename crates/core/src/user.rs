//! Authenticated users and their permissions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which team a user belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// Full access: any candidate, context resets.
    CompTeam,
    /// Only candidates that already have a recommendation.
    RecruitmentTeam,
}

impl UserType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CompTeam => "Comp Team",
            Self::RecruitmentTeam => "Recruitment Team",
        }
    }

    pub fn can_reset(&self) -> bool {
        matches!(self, Self::CompTeam)
    }

    /// Whether this user may only open candidates with existing history.
    pub fn requires_history(&self) -> bool {
        matches!(self, Self::RecruitmentTeam)
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub user_type: UserType,
}

impl User {
    pub fn new(email: impl Into<String>, user_type: UserType) -> Self {
        Self {
            email: email.into(),
            user_type,
        }
    }

    pub fn comp_team(email: impl Into<String>) -> Self {
        Self::new(email, UserType::CompTeam)
    }

    pub fn recruiter(email: impl Into<String>) -> Self {
        Self::new(email, UserType::RecruitmentTeam)
    }
}
