//! Caller identity and the profile fields direct messaging evaluates.
//!
//! Roles have a natural ordering: User < Moderator < Admin

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User = 0,
    /// Can work the report queue
    Moderator = 1,
    /// Can additionally read reported conversations
    Admin = 2,
}

impl UserRole {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Moderator or above.
    pub fn is_privileged(&self) -> bool {
        *self >= UserRole::Moderator
    }

    /// Highest tier only.
    pub fn is_admin(&self) -> bool {
        *self == UserRole::Admin
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
    Deleted,
}

impl AccountStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "banned" => Some(Self::Banned),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
            Self::Deleted => "deleted",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Who may open a new conversation with this user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmPrivacy {
    Everyone,
    VerifiedOnly,
    Nobody,
}

impl DmPrivacy {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "everyone" => Some(Self::Everyone),
            "verified_only" => Some(Self::VerifiedOnly),
            "nobody" => Some(Self::Nobody),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::VerifiedOnly => "verified_only",
            Self::Nobody => "nobody",
        }
    }

    pub fn admits(&self, sender_verified: bool) -> bool {
        match self {
            Self::Everyone => true,
            Self::VerifiedOnly => sender_verified,
            Self::Nobody => false,
        }
    }
}

impl fmt::Display for DmPrivacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub account_status: AccountStatus,
    pub is_verified: bool,
    pub dm_privacy: DmPrivacy,
}

/// Public view of another user, embedded in conversation listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
}

impl From<&UserProfile> for ProfileSummary {
    fn from(p: &UserProfile) -> Self {
        Self {
            id: p.id,
            username: p.username.clone(),
            display_name: p.display_name.clone(),
            avatar_url: p.avatar_url.clone(),
            is_verified: p.is_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedUser {
    pub user_id: Uuid,
    pub blocked_at: chrono::DateTime<chrono::Utc>,
}
