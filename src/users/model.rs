use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::repository::{Entity, Fields, Value};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for Value {
    fn from(role: Role) -> Self {
        Value::Text(role.as_str().to_string())
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: Option<String>, // Argon2 PHC string, absent for external accounts
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub is_deleted: bool,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Column values for a new row. Carries the hash, never a raw password.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub role: Role,
}

impl Fields for NewUser {
    fn into_fields(self) -> Vec<(&'static str, Value)> {
        vec![
            ("email", self.email.into()),
            ("hashed_password", self.hashed_password.into()),
            ("first_name", self.first_name.into()),
            ("last_name", self.last_name.into()),
            ("is_active", self.is_active.into()),
            ("is_superuser", self.is_superuser.into()),
            ("is_verified", self.is_verified.into()),
            ("role", self.role.into()),
        ]
    }
}

/// Column-level partial update. `None` leaves a column alone; for nullable
/// columns `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub hashed_password: Option<Option<String>>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_deleted: Option<bool>,
    pub role: Option<Role>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Fields for UserPatch {
    fn into_fields(self) -> Vec<(&'static str, Value)> {
        let mut out = Vec::new();
        if let Some(v) = self.email {
            out.push(("email", v.into()));
        }
        if let Some(v) = self.hashed_password {
            out.push(("hashed_password", v.into()));
        }
        if let Some(v) = self.first_name {
            out.push(("first_name", v.into()));
        }
        if let Some(v) = self.last_name {
            out.push(("last_name", v.into()));
        }
        if let Some(v) = self.is_active {
            out.push(("is_active", v.into()));
        }
        if let Some(v) = self.is_superuser {
            out.push(("is_superuser", v.into()));
        }
        if let Some(v) = self.is_verified {
            out.push(("is_verified", v.into()));
        }
        if let Some(v) = self.is_deleted {
            out.push(("is_deleted", v.into()));
        }
        if let Some(v) = self.role {
            out.push(("role", v.into()));
        }
        out
    }
}

impl Entity for User {
    type Id = i64;
    type New = NewUser;
    type Patch = UserPatch;

    const TABLE: &'static str = "users";
    const COLUMNS: &'static str = "id, email, hashed_password, first_name, last_name, \
        is_active, is_superuser, is_verified, is_deleted, role, created_at, updated_at";
    const UPDATED_AT: Option<&'static str> = Some("updated_at");

    fn column(field: &str) -> Option<&'static str> {
        match field {
            "id" => Some("id"),
            "email" => Some("email"),
            "first_name" => Some("first_name"),
            "last_name" => Some("last_name"),
            "is_active" => Some("is_active"),
            "is_superuser" => Some("is_superuser"),
            "is_verified" => Some("is_verified"),
            "is_deleted" => Some("is_deleted"),
            "role" => Some("role"),
            _ => None,
        }
    }

    fn id(&self) -> i64 {
        self.id
    }
}
