use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, instrument};

use super::{
    dto::{UserCreate, UserUpdate},
    model::{NewUser, User, UserPatch},
    repo::UserRepository,
};
use crate::{
    auth::password::{hash_password, verify_password},
    repository::{Filters, Page},
};

/// Hashing is CPU bound, so it runs off the async workers.
async fn hash_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task")?
}

async fn verify_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task")
}

/// User use cases on top of a [`UserRepository`].
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<User>> {
        self.repo.get(id).await
    }

    pub async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.repo.get_by_email(email).await
    }

    /// First page of users with the default page size.
    pub async fn list_all(&self) -> anyhow::Result<Vec<User>> {
        let (users, _) = self.repo.list(Page::default(), &Filters::new()).await?;
        Ok(users)
    }

    pub async fn list(&self, page: Page, filters: &Filters) -> anyhow::Result<(Vec<User>, i64)> {
        self.repo.list(page, filters).await
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: UserCreate) -> anyhow::Result<User> {
        let UserCreate {
            email,
            password,
            first_name,
            last_name,
            role,
        } = input;
        let hashed_password = hash_blocking(password).await?;

        let user = self
            .repo
            .create(NewUser {
                email,
                hashed_password: Some(hashed_password),
                first_name,
                last_name,
                is_active: true,
                is_superuser: false,
                is_verified: false,
                role,
            })
            .await?;
        info!(user_id = user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Applies every present field of `input`. A non-empty password is
    /// re-hashed; an empty one is ignored.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: i64, input: UserUpdate) -> anyhow::Result<Option<User>> {
        let Some(current) = self.repo.get(id).await? else {
            debug!(user_id = id, "update on missing user");
            return Ok(None);
        };

        let mut patch = UserPatch {
            email: input.email,
            first_name: input.first_name.map(Some),
            last_name: input.last_name.map(Some),
            is_active: input.is_active,
            is_superuser: input.is_superuser,
            is_verified: input.is_verified,
            role: input.role,
            ..Default::default()
        };
        if let Some(password) = input.password.filter(|p| !p.is_empty()) {
            patch.hashed_password = Some(Some(hash_blocking(password).await?));
        }
        if patch.is_empty() {
            debug!(user_id = id, "nothing to update");
            return Ok(Some(current));
        }

        let updated = self.repo.update(id, patch).await?;
        if updated.is_some() {
            info!(user_id = id, "user updated");
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> anyhow::Result<Option<User>> {
        if self.repo.get(id).await?.is_none() {
            return Ok(None);
        }
        let deleted = self.repo.delete(id).await?;
        if deleted.is_some() {
            info!(user_id = id, "user deleted");
        }
        Ok(deleted)
    }

    /// Returns the user when the credentials match an active account.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> anyhow::Result<Option<User>> {
        let Some(user) = self.repo.get_by_email(email).await? else {
            debug!("unknown email");
            return Ok(None);
        };
        let Some(hash) = user.hashed_password.clone() else {
            debug!(user_id = user.id, "account has no password");
            return Ok(None);
        };
        if !verify_blocking(password.to_string(), hash).await? {
            debug!(user_id = user.id, "password mismatch");
            return Ok(None);
        }
        if !user.is_active {
            debug!(user_id = user.id, "inactive account");
            return Ok(None);
        }
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{memory::MemoryUserRepository, model::Role};

    fn service() -> (UserService, Arc<MemoryUserRepository>) {
        let repo = Arc::new(MemoryUserRepository::new());
        (UserService::new(repo.clone()), repo)
    }

    fn new_user(email: &str) -> UserCreate {
        UserCreate {
            email: email.into(),
            password: "TestPassword123".into(),
            first_name: Some("Test".into()),
            last_name: Some("User".into()),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_stores_hash_not_password() {
        let (svc, repo) = service();
        let user = svc.create(new_user("test@example.com")).await.unwrap();

        let stored = repo.snapshot().pop().unwrap();
        assert_eq!(stored.id, user.id);
        let hash = stored.hashed_password.unwrap();
        assert_ne!(hash, "TestPassword123");
        assert!(verify_password("TestPassword123", &hash));
        assert_eq!(stored.role, Role::User);
        assert!(stored.is_active);
        assert!(!stored.is_superuser);
    }

    #[tokio::test]
    async fn create_then_get_roundtrips_fields() {
        let (svc, _) = service();
        let created = svc.create(new_user("round@example.com")).await.unwrap();
        let fetched = svc.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.first_name.as_deref(), Some("Test"));
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_by_store() {
        let (svc, _) = service();
        svc.create(new_user("dup@example.com")).await.unwrap();
        assert!(svc.create(new_user("DUP@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn get_by_email_ignores_case() {
        let (svc, _) = service();
        let user = svc.create(new_user("Alice@Tech.com")).await.unwrap();
        let found = svc.get_by_email("alice@tech.COM").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(svc.get_by_email("bob@tech.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let (svc, _) = service();
        let user = svc.create(new_user("patch@example.com")).await.unwrap();

        let updated = svc
            .update(
                user.id,
                UserUpdate {
                    first_name: Some("Updated".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.first_name.as_deref(), Some("Updated"));
        assert_eq!(updated.last_name, user.last_name);
        assert_eq!(updated.email, user.email);
        assert_eq!(updated.hashed_password, user.hashed_password);
        assert!(updated.updated_at >= user.updated_at);
    }

    #[tokio::test]
    async fn update_without_changes_leaves_row_untouched() {
        let (svc, repo) = service();
        let user = svc.create(new_user("same@example.com")).await.unwrap();

        let unchanged = svc
            .update(
                user.id,
                UserUpdate {
                    password: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(unchanged, user);
        assert_eq!(repo.snapshot()[0].updated_at, user.updated_at);
    }

    #[tokio::test]
    async fn update_applies_empty_strings_but_skips_empty_password() {
        let (svc, _) = service();
        let user = svc.create(new_user("empty@example.com")).await.unwrap();

        let updated = svc
            .update(
                user.id,
                UserUpdate {
                    last_name: Some(String::new()),
                    password: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.last_name.as_deref(), Some(""));
        assert_eq!(updated.hashed_password, user.hashed_password);
    }

    #[tokio::test]
    async fn update_password_is_hashed() {
        let (svc, _) = service();
        let user = svc.create(new_user("pw@example.com")).await.unwrap();

        let updated = svc
            .update(
                user.id,
                UserUpdate {
                    password: Some("NewPass123".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        let hash = updated.hashed_password.unwrap();
        assert_ne!(hash, "NewPass123");
        assert!(verify_password("NewPass123", &hash));
        assert!(!verify_password("TestPassword123", &hash));
    }

    #[tokio::test]
    async fn update_missing_user_returns_none() {
        let (svc, _) = service();
        let result = svc
            .update(
                99_999,
                UserUpdate {
                    first_name: Some("Ghost".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_then_get_is_none() {
        let (svc, _) = service();
        let user = svc.create(new_user("bye@example.com")).await.unwrap();

        let deleted = svc.delete(user.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, user.id);
        assert!(svc.get(user.id).await.unwrap().is_none());
        assert!(svc.delete(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_all_returns_every_user() {
        let (svc, _) = service();
        for i in 0..3 {
            svc.create(new_user(&format!("u{i}@example.com"))).await.unwrap();
        }
        assert_eq!(svc.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn list_pages_partition_the_filtered_set() {
        let (svc, _) = service();
        for i in 0..4 {
            svc.create(new_user(&format!("p{i}@tech.com"))).await.unwrap();
        }
        svc.create(new_user("other@example.com")).await.unwrap();

        let filters = Filters::new().with("email_contains", "TECH");
        let (first, total_a) = svc.list(Page::new(0, 2), &filters).await.unwrap();
        let (second, total_b) = svc.list(Page::new(2, 2), &filters).await.unwrap();

        assert_eq!(total_a, 4);
        assert_eq!(total_b, 4);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|a| second.iter().all(|b| a.id != b.id)));
    }

    #[tokio::test]
    async fn authenticate_checks_password_and_activity() {
        let (svc, _) = service();
        let user = svc.create(new_user("login@example.com")).await.unwrap();

        let ok = svc
            .authenticate("login@example.com", "TestPassword123")
            .await
            .unwrap();
        assert_eq!(ok.map(|u| u.id), Some(user.id));
        assert!(svc
            .authenticate("login@example.com", "WrongPassword123")
            .await
            .unwrap()
            .is_none());
        assert!(svc
            .authenticate("nobody@example.com", "TestPassword123")
            .await
            .unwrap()
            .is_none());

        svc.update(
            user.id,
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(svc
            .authenticate("login@example.com", "TestPassword123")
            .await
            .unwrap()
            .is_none());
    }
}
