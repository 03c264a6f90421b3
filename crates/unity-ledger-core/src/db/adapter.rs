// Storage adapter trait — the abstraction every storage backend implements.
//
// The adapter is schema-agnostic: rows travel as `serde_json::Value` and the
// engine's store layer converts between typed models and JSON. The one
// concurrency primitive the ledger relies on is that `update` applies its
// WHERE clauses and the write as a single atomic step: a conditional update
// whose clauses include the row `version` either sees the expected version
// and writes, or returns `None`. That is the entire optimistic-concurrency
// contract; there is no row locking anywhere above this trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::schema::LedgerSchema;
use crate::error::LedgerError;

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, LedgerError>;

// ─── Where Clause ────────────────────────────────────────────────

/// Comparison operators for WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal (default).
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Value is in the given list.
    In,
}

impl Default for Operator {
    fn default() -> Self {
        Self::Eq
    }
}

/// A single WHERE condition. Clauses in a slice combine with AND unless a
/// clause carries an `Or` connector to the next one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
}

/// Logical connector between WHERE clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

impl WhereClause {
    /// Simple equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator: Operator::Eq,
            connector: None,
        }
    }

    /// Filter with an explicit operator.
    pub fn with_op(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator,
            connector: None,
        }
    }

    pub fn or(mut self) -> Self {
        self.connector = Some(Connector::Or);
        self
    }
}

// ─── Sort / Pagination ───────────────────────────────────────────

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification (field + direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Query parameters for `find_many`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindManyQuery {
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
}

// ─── Adapter Trait ───────────────────────────────────────────────

/// The storage adapter trait.
///
/// Backends must honor the schema's unique-field declarations on `create`
/// (returning `LedgerError::Duplicate`) — the ledger's idempotency guard for
/// `external_ref` depends on it — and must apply `update` atomically with
/// respect to its WHERE clauses.
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Insert a new row into the given model/table and return it.
    /// Fails with `LedgerError::Duplicate` on a unique-field violation.
    async fn create(&self, model: &str, data: serde_json::Value)
        -> AdapterResult<serde_json::Value>;

    /// Find a single row matching the WHERE clauses.
    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Find multiple rows matching the query parameters.
    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>>;

    /// Count rows matching the WHERE clauses.
    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64>;

    /// Update a single row matching the WHERE clauses, atomically.
    /// Returns the updated row, or `None` if no row matched — which is how a
    /// stale `version` clause reports a write conflict.
    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Update all rows matching the WHERE clauses; returns the affected count.
    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64>;

    /// Delete all rows matching the WHERE clauses; returns the deleted count.
    async fn delete_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64>;

    /// Register the ledger schema with the backend (tables, unique fields).
    async fn create_schema(&self, schema: &LedgerSchema) -> AdapterResult<()>;

    /// Begin a storage transaction. The two legs of a token transfer run on
    /// the returned transactional adapter so neither is visible alone.
    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>>;
}

/// Extension of [`Adapter`] for transaction contexts.
#[async_trait]
pub trait TransactionAdapter: Adapter {
    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> AdapterResult<()>;

    /// Roll the transaction back, discarding its writes.
    async fn rollback(self: Box<Self>) -> AdapterResult<()>;
}
