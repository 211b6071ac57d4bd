//! In-memory [`UserRepository`] used by unit and handler tests.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    model::{NewUser, User, UserPatch},
    repo::UserRepository,
};
use crate::repository::{resolve_filter, Filters, Page, Predicate, Repository, Value};

#[derive(Default)]
pub struct MemoryUserRepository {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<User> {
        self.rows.lock().unwrap().clone()
    }
}

fn column_value(user: &User, column: &str) -> Value {
    match column {
        "id" => user.id.into(),
        "email" => user.email.as_str().into(),
        "first_name" => user.first_name.clone().into(),
        "last_name" => user.last_name.clone().into(),
        "is_active" => user.is_active.into(),
        "is_superuser" => user.is_superuser.into(),
        "is_verified" => user.is_verified.into(),
        "is_deleted" => user.is_deleted.into(),
        "role" => user.role.into(),
        _ => Value::Null,
    }
}

/// Writes the present fields of `patch` onto a stored row.
fn apply_patch(user: &mut User, patch: UserPatch) {
    if let Some(email) = patch.email {
        user.email = email;
    }
    if let Some(hash) = patch.hashed_password {
        user.hashed_password = hash;
    }
    if let Some(first_name) = patch.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = patch.last_name {
        user.last_name = last_name;
    }
    if let Some(v) = patch.is_active {
        user.is_active = v;
    }
    if let Some(v) = patch.is_superuser {
        user.is_superuser = v;
    }
    if let Some(v) = patch.is_verified {
        user.is_verified = v;
    }
    if let Some(v) = patch.is_deleted {
        user.is_deleted = v;
    }
    if let Some(role) = patch.role {
        user.role = role;
    }
}

fn row_matches(user: &User, filters: &Filters) -> bool {
    filters.iter().all(|(key, value)| {
        if matches!(value, Value::Null) {
            return true;
        }
        match resolve_filter::<User>(key) {
            None => true,
            Some(Predicate::Contains(column)) => match (column_value(user, column), value) {
                (_, Value::Text(needle)) if needle.is_empty() => true,
                (Value::Text(hay), Value::Text(needle)) => {
                    hay.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            Some(Predicate::Column(column)) => {
                let actual = column_value(user, column);
                match value {
                    Value::List(items) => items.contains(&actual),
                    other => *other == actual,
                }
            }
        }
    })
}

#[async_trait]
impl Repository<User> for MemoryUserRepository {
    async fn get(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn list(&self, page: Page, filters: &Filters) -> anyhow::Result<(Vec<User>, i64)> {
        let rows = self.rows.lock().unwrap();
        let matched: Vec<User> = rows.iter().filter(|u| row_matches(u, filters)).cloned().collect();
        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(page.skip as usize)
            .take(page.limit as usize)
            .collect();
        Ok((items, total))
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut rows = self.rows.lock().unwrap();
        let lowered = new.email.to_lowercase();
        if rows.iter().any(|u| u.email.to_lowercase() == lowered) {
            anyhow::bail!("duplicate key value violates unique constraint \"users_email_lower_key\"");
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: rows.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            email: new.email,
            hashed_password: new.hashed_password,
            first_name: new.first_name,
            last_name: new.last_name,
            is_active: new.is_active,
            is_superuser: new.is_superuser,
            is_verified: new.is_verified,
            is_deleted: false,
            role: new.role,
            created_at: now,
            updated_at: now,
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let mut rows = self.rows.lock().unwrap();
        let Some(user) = rows.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        apply_patch(user, patch);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<Option<User>> {
        let mut rows = self.rows.lock().unwrap();
        let idx = rows.iter().position(|u| u.id == id);
        Ok(idx.map(|i| rows.remove(i)))
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let lowered = email.to_lowercase();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.to_lowercase() == lowered)
            .cloned())
    }
}
