use anyhow::Context;
use async_trait::async_trait;

use super::model::User;
use crate::repository::{Entity, PgRepository, Repository};

/// User persistence: the generic CRUD plus lookup by email.
#[async_trait]
pub trait UserRepository: Repository<User> {
    /// Case-insensitive email lookup.
    async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
}

#[async_trait]
impl UserRepository for PgRepository<User> {
    async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE lower(email) = lower($1)",
            User::COLUMNS,
            User::TABLE
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .context("select user by email")?;
        Ok(user)
    }
}
