//! Generic persistence over one table per entity.
//!
//! An [`Entity`] describes its table through an explicit column mapping; the
//! [`Repository`] trait is the seam services depend on, and
//! [`postgres::PgRepository`] is the store-backed implementation.

pub mod postgres;

use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow};

pub use postgres::PgRepository;

/// Suffix that turns a filter key into a case-insensitive substring match.
pub const CONTAINS_SUFFIX: &str = "_contains";

pub const DEFAULT_LIMIT: i64 = 100;

/// A value bound into a query, either as a column value or a filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Value>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Ordered filter predicates keyed by field name, ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(Vec<(String, Value)>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Offset pagination applied after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip: skip.max(0),
            limit: limit.max(0),
        }
    }
}

/// A filter key resolved against an entity's column table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Contains(&'static str),
    Column(&'static str),
}

/// Resolves `key` to a predicate, or `None` when the field is unknown.
pub fn resolve_filter<E: Entity>(key: &str) -> Option<Predicate> {
    if let Some(field) = key.strip_suffix(CONTAINS_SUFFIX) {
        if let Some(column) = E::column(field) {
            return Some(Predicate::Contains(column));
        }
    }
    E::column(key).map(Predicate::Column)
}

/// Something that flattens into explicit `(column, value)` pairs.
pub trait Fields {
    fn into_fields(self) -> Vec<(&'static str, Value)>;
}

/// A record type stored in one table with an integer-like identity column.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    type Id: Copy + Into<Value> + Send + Sync + std::fmt::Display + 'static;
    type New: Fields + Send + 'static;
    type Patch: Fields + Send + 'static;

    const TABLE: &'static str;
    /// Select list used by every read and `RETURNING` clause.
    const COLUMNS: &'static str;
    const ID_COLUMN: &'static str = "id";
    /// Column refreshed to `now()` on every update, if any.
    const UPDATED_AT: Option<&'static str> = None;

    /// Field name to column name; `None` for fields that cannot be filtered on.
    fn column(field: &str) -> Option<&'static str>;

    fn id(&self) -> Self::Id;
}

/// CRUD and filtered listing over one entity type.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn get(&self, id: E::Id) -> anyhow::Result<Option<E>>;

    /// Returns one page of matches and the total number of matches.
    async fn list(&self, page: Page, filters: &Filters) -> anyhow::Result<(Vec<E>, i64)>;

    async fn create(&self, new: E::New) -> anyhow::Result<E>;

    async fn update(&self, id: E::Id, patch: E::Patch) -> anyhow::Result<Option<E>>;

    async fn delete(&self, id: E::Id) -> anyhow::Result<Option<E>>;
}
