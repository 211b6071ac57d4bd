use std::marker::PhantomData;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;

use super::{resolve_filter, Entity, Fields, Filters, Page, Predicate, Repository, Value};

/// [`Repository`] backed by a PostgreSQL table.
///
/// The trait methods autocommit on a pooled connection. The `*_in` variants
/// run inside a caller-owned transaction and leave commit or rollback to the
/// caller, so several calls can be made atomic together.
pub struct PgRepository<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for PgRepository<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> PgRepository<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        new: E::New,
    ) -> anyhow::Result<E> {
        insert::<E>(&mut **tx, new).await
    }

    pub async fn update_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: E::Id,
        patch: E::Patch,
    ) -> anyhow::Result<Option<E>> {
        update::<E>(&mut **tx, id, patch).await
    }

    pub async fn delete_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: E::Id,
    ) -> anyhow::Result<Option<E>> {
        delete::<E>(&mut **tx, id).await
    }

    pub async fn get_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: E::Id,
    ) -> anyhow::Result<Option<E>> {
        select_by_id::<E>(id)
            .build_query_as::<E>()
            .fetch_optional(&mut **tx)
            .await
            .with_context(|| format!("select {} {}", E::TABLE, id))
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for PgRepository<E> {
    async fn get(&self, id: E::Id) -> anyhow::Result<Option<E>> {
        select_by_id::<E>(id)
            .build_query_as::<E>()
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("select {} {}", E::TABLE, id))
    }

    async fn list(&self, page: Page, filters: &Filters) -> anyhow::Result<(Vec<E>, i64)> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;

        let total: i64 = count_query::<E>(filters)
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("count {}", E::TABLE))?;

        let rows = list_query::<E>(filters, page)
            .build_query_as::<E>()
            .fetch_all(&mut *conn)
            .await
            .with_context(|| format!("list {}", E::TABLE))?;

        Ok((rows, total))
    }

    async fn create(&self, new: E::New) -> anyhow::Result<E> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        insert::<E>(&mut conn, new).await
    }

    async fn update(&self, id: E::Id, patch: E::Patch) -> anyhow::Result<Option<E>> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        update::<E>(&mut conn, id, patch).await
    }

    async fn delete(&self, id: E::Id) -> anyhow::Result<Option<E>> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        delete::<E>(&mut conn, id).await
    }
}

// ---- Statements ----

async fn insert<E: Entity>(conn: &mut PgConnection, new: E::New) -> anyhow::Result<E> {
    let row = insert_query::<E>(new)
        .build_query_as::<E>()
        .fetch_one(conn)
        .await
        // Unique violations stay reachable through `downcast_ref::<sqlx::Error>`.
        .with_context(|| format!("insert {}", E::TABLE))?;
    debug!(table = E::TABLE, id = %row.id(), "row inserted");
    Ok(row)
}

async fn update<E: Entity>(
    conn: &mut PgConnection,
    id: E::Id,
    patch: E::Patch,
) -> anyhow::Result<Option<E>> {
    let row = update_query::<E>(id, patch)
        .build_query_as::<E>()
        .fetch_optional(conn)
        .await
        .with_context(|| format!("update {} {}", E::TABLE, id))?;
    debug!(table = E::TABLE, %id, found = row.is_some(), "row updated");
    Ok(row)
}

async fn delete<E: Entity>(conn: &mut PgConnection, id: E::Id) -> anyhow::Result<Option<E>> {
    let row = delete_query::<E>(id)
        .build_query_as::<E>()
        .fetch_optional(conn)
        .await
        .with_context(|| format!("delete {} {}", E::TABLE, id))?;
    debug!(table = E::TABLE, %id, found = row.is_some(), "row deleted");
    Ok(row)
}

// ---- Query building ----

pub(crate) fn select_by_id<E: Entity>(id: E::Id) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE {} = ",
        E::COLUMNS,
        E::TABLE,
        E::ID_COLUMN
    ));
    bind_value(&mut qb, id.into());
    qb
}

pub(crate) fn count_query<E: Entity>(filters: &Filters) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_filters::<E>(&mut qb, filters);
    qb
}

pub(crate) fn list_query<E: Entity>(filters: &Filters, page: Page) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM {}", E::COLUMNS, E::TABLE));
    push_filters::<E>(&mut qb, filters);
    qb.push(format!(" ORDER BY {} LIMIT ", E::ID_COLUMN));
    qb.push_bind(page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(page.skip);
    qb
}

pub(crate) fn insert_query<E: Entity>(new: E::New) -> QueryBuilder<'static, Postgres> {
    let fields = new.into_fields();
    let mut qb = QueryBuilder::new(format!("INSERT INTO {}", E::TABLE));
    if fields.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        qb.push(" (");
        let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
        qb.push(columns.join(", "));
        qb.push(") VALUES (");
        for (i, (_, value)) in fields.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            bind_value(&mut qb, value);
        }
        qb.push(")");
    }
    qb.push(format!(" RETURNING {}", E::COLUMNS));
    qb
}

pub(crate) fn update_query<E: Entity>(id: E::Id, patch: E::Patch) -> QueryBuilder<'static, Postgres> {
    let fields = patch.into_fields();
    if fields.is_empty() && E::UPDATED_AT.is_none() {
        return select_by_id::<E>(id);
    }

    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
    let mut first = true;
    for (column, value) in fields {
        if !first {
            qb.push(", ");
        }
        first = false;
        qb.push(column);
        qb.push(" = ");
        bind_value(&mut qb, value);
    }
    if let Some(column) = E::UPDATED_AT {
        if !first {
            qb.push(", ");
        }
        qb.push(column);
        qb.push(" = now()");
    }
    qb.push(format!(" WHERE {} = ", E::ID_COLUMN));
    bind_value(&mut qb, id.into());
    qb.push(format!(" RETURNING {}", E::COLUMNS));
    qb
}

pub(crate) fn delete_query<E: Entity>(id: E::Id) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE {} = ", E::TABLE, E::ID_COLUMN));
    bind_value(&mut qb, id.into());
    qb.push(format!(" RETURNING {}", E::COLUMNS));
    qb
}

enum Clause<'a> {
    Contains(&'static str, String),
    In(&'static str, &'a [Value]),
    Eq(&'static str, &'a Value),
}

fn clause_for<'a, E: Entity>(key: &str, value: &'a Value) -> Option<Clause<'a>> {
    if matches!(value, Value::Null) {
        return None;
    }
    let Some(predicate) = resolve_filter::<E>(key) else {
        debug!(table = E::TABLE, key, "ignoring filter on unknown field");
        return None;
    };
    match (predicate, value) {
        (Predicate::Contains(column), value) => {
            let needle = match value {
                Value::Text(s) => s.clone(),
                Value::Int(i) => i.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::List(_) => return None,
            };
            if needle.is_empty() {
                return None;
            }
            Some(Clause::Contains(column, needle))
        }
        (Predicate::Column(column), Value::List(items)) => Some(Clause::In(column, items)),
        (Predicate::Column(column), value) => Some(Clause::Eq(column, value)),
    }
}

fn push_filters<E: Entity>(qb: &mut QueryBuilder<'static, Postgres>, filters: &Filters) {
    let mut first = true;
    for (key, value) in filters.iter() {
        let Some(clause) = clause_for::<E>(key, value) else {
            continue;
        };
        qb.push(if first { " WHERE " } else { " AND " });
        first = false;

        match clause {
            Clause::Contains(column, needle) => {
                qb.push(format!("CAST({column} AS TEXT) ILIKE "));
                qb.push_bind(format!("%{}%", escape_like(&needle)));
            }
            Clause::In(column, items) => {
                let items: Vec<&Value> = items
                    .iter()
                    .filter(|v| !matches!(v, Value::Null | Value::List(_)))
                    .collect();
                if items.is_empty() {
                    qb.push("FALSE");
                    continue;
                }
                qb.push(column);
                qb.push(" IN (");
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    bind_value(qb, item.clone());
                }
                qb.push(")");
            }
            Clause::Eq(column, value) => {
                qb.push(column);
                qb.push(" = ");
                bind_value(qb, value.clone());
            }
        }
    }
}

/// Binds a scalar. `Null` is typed as text, which only suits nullable text columns.
fn bind_value(qb: &mut QueryBuilder<'static, Postgres>, value: Value) {
    match value {
        Value::Null => {
            qb.push_bind(None::<String>);
        }
        Value::Bool(b) => {
            qb.push_bind(b);
        }
        Value::Int(i) => {
            qb.push_bind(i);
        }
        Value::Text(s) => {
            qb.push_bind(s);
        }
        Value::List(_) => {
            qb.push("NULL");
        }
    }
}

/// Escapes `ILIKE` wildcards so the needle matches literally.
fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
