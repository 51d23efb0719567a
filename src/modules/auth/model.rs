use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Account lifecycle state.
///
/// `Pending -> Active -> {InActive, Deleted}`, `InActive -> {Active, Deleted}`.
/// A pending signup may also be discarded straight to `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    Pending,
    Active,
    InActive,
    Deleted,
}

impl AccountStatus {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::InActive => 2,
            Self::Deleted => 3,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Active),
            2 => Some(Self::InActive),
            3 => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Deleted)
                | (Active, InActive)
                | (Active, Deleted)
                | (InActive, Active)
                | (InActive, Deleted)
        )
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::InActive => "inactive",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::User => "User",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Admin" => Some(Self::Admin),
            "User" => Some(Self::User),
            _ => None,
        }
    }
}

/// Application permission claim carried inside access tokens, e.g. `Permission=CanView`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim {
    pub claim_type: String,
    pub value: String,
}

impl UserClaim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub password_hash: String,
    pub status: AccountStatus,
    pub roles: Vec<Role>,
    pub claims: Vec<UserClaim>,
    pub failed_login_count: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| until > now)
    }
}

/// Row shape of the `accounts` table; roles and claims live in side tables.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub password_hash: String,
    pub status: i8,
    pub failed_login_count: i32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
