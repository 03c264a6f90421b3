// In-memory storage adapter.
//
// Rows are `serde_json::Value` objects in a `HashMap<model, Vec<row>>`
// behind a `tokio::sync::RwLock`. Holding the write lock across the
// match-and-mutate of `update` is what makes the ledger's
// version-conditioned balance write atomic. Unique fields registered via
// `create_schema` are checked under the same lock on `create`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use unity_ledger_core::db::adapter::{
    Adapter, AdapterResult, Connector, FindManyQuery, Operator, SortDirection,
    TransactionAdapter, WhereClause,
};
use unity_ledger_core::db::schema::LedgerSchema;
use unity_ledger_core::error::LedgerError;

/// The shared mutable state: rows per model plus the unique-field registry.
#[derive(Debug, Clone, Default)]
struct Store {
    rows: HashMap<String, Vec<serde_json::Value>>,
    /// model -> unique field names, filled in by `create_schema`.
    uniques: HashMap<String, Vec<String>>,
}

/// In-memory storage adapter.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    store: Arc<RwLock<Store>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// Create a new empty in-memory adapter.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
        }
    }

    /// Row count for a specific model (for tests).
    pub async fn model_count(&self, model: &str) -> usize {
        self.store
            .read()
            .await
            .rows
            .get(model)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.store.write().await.rows.clear();
    }
}

/// Check if a row matches a set of WHERE clauses.
fn matches_where(row: &serde_json::Value, clauses: &[WhereClause]) -> bool {
    if clauses.is_empty() {
        return true;
    }

    let mut result = true;
    let mut pending_or = false;

    for clause in clauses {
        let field_val = row
            .get(&clause.field)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let clause_match = match_operator(&field_val, &clause.value, clause.operator);

        if pending_or {
            result = result || clause_match;
        } else {
            result = result && clause_match;
        }

        pending_or = matches!(clause.connector, Some(Connector::Or));
    }

    result
}

/// Match a single operator condition.
fn match_operator(field_val: &serde_json::Value, target: &serde_json::Value, op: Operator) -> bool {
    match op {
        Operator::Eq => field_val == target,
        Operator::Ne => field_val != target,
        Operator::Lt => compare_json(field_val, target).is_some_and(|c| c < 0),
        Operator::Lte => compare_json(field_val, target).is_some_and(|c| c <= 0),
        Operator::Gt => compare_json(field_val, target).is_some_and(|c| c > 0),
        Operator::Gte => compare_json(field_val, target).is_some_and(|c| c >= 0),
        Operator::In => match target {
            serde_json::Value::Array(arr) => arr.contains(field_val),
            _ => false,
        },
    }
}

/// Compare two JSON values numerically or lexicographically.
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<i8> {
    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => {
            let af = an.as_f64()?;
            let bf = bn.as_f64()?;
            af.partial_cmp(&bf).map(|o| o as i8)
        }
        (serde_json::Value::String(a_s), serde_json::Value::String(b_s)) => {
            Some(a_s.cmp(b_s) as i8)
        }
        _ => None,
    }
}

/// Apply sorting, offset, and limit to a filtered result set.
fn apply_query(mut rows: Vec<serde_json::Value>, query: &FindManyQuery) -> Vec<serde_json::Value> {
    if let Some(ref sort) = query.sort_by {
        rows.sort_by(|a, b| {
            let cmp = match (a.get(&sort.field), b.get(&sort.field)) {
                (Some(av), Some(bv)) => compare_json(av, bv).unwrap_or(0),
                (Some(_), None) => 1,
                (None, Some(_)) => -1,
                (None, None) => 0,
            };
            match sort.direction {
                SortDirection::Asc => cmp.cmp(&0),
                SortDirection::Desc => cmp.cmp(&0).reverse(),
            }
        });
    }

    if let Some(offset) = query.offset {
        if (offset as usize) < rows.len() {
            rows = rows.split_off(offset as usize);
        } else {
            rows.clear();
        }
    }

    if let Some(limit) = query.limit {
        rows.truncate(limit as usize);
    }

    rows
}

/// Merge update data into an existing row.
fn merge_update(row: &mut serde_json::Value, data: &serde_json::Value) {
    if let (Some(row_obj), Some(data_obj)) = (row.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            row_obj.insert(k.clone(), v.clone());
        }
    }
}

/// Insert a row into the store, enforcing unique constraints and
/// backfilling a missing `id`. Caller holds the write lock.
fn insert_row(store: &mut Store, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
    let mut row = data;

    if row.get("id").is_none() || row.get("id") == Some(&serde_json::Value::Null) {
        if let Some(obj) = row.as_object_mut() {
            obj.insert(
                "id".to_string(),
                serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
    }

    if let Some(unique_fields) = store.uniques.get(model) {
        let existing = store.rows.get(model).map(|v| v.as_slice()).unwrap_or(&[]);
        for field in unique_fields {
            let value = row.get(field).cloned().unwrap_or(serde_json::Value::Null);
            if value.is_null() {
                continue;
            }
            if existing.iter().any(|r| r.get(field) == Some(&value)) {
                return Err(LedgerError::Duplicate(format!("{model}.{field}")));
            }
        }
    }

    store
        .rows
        .entry(model.to_string())
        .or_default()
        .push(row.clone());

    Ok(row)
}

/// Update the first matching row in place. Caller holds the write lock.
fn apply_update(
    store: &mut Store,
    model: &str,
    where_clauses: &[WhereClause],
    data: &serde_json::Value,
) -> Option<serde_json::Value> {
    let rows = store.rows.get_mut(model)?;
    let row = rows.iter_mut().find(|r| matches_where(r, where_clauses))?;
    merge_update(row, data);
    Some(row.clone())
}

/// Update all matching rows in place; returns the count.
fn apply_update_many(
    store: &mut Store,
    model: &str,
    where_clauses: &[WhereClause],
    data: &serde_json::Value,
) -> i64 {
    let mut count = 0i64;
    if let Some(rows) = store.rows.get_mut(model) {
        for row in rows.iter_mut() {
            if matches_where(row, where_clauses) {
                merge_update(row, data);
                count += 1;
            }
        }
    }
    count
}

/// Delete all matching rows; returns the count.
fn apply_delete_many(store: &mut Store, model: &str, where_clauses: &[WhereClause]) -> i64 {
    if let Some(rows) = store.rows.get_mut(model) {
        let before = rows.len();
        rows.retain(|r| !matches_where(r, where_clauses));
        (before - rows.len()) as i64
    } else {
        0
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let mut store = self.store.write().await;
        insert_row(&mut store, model, data)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let store = self.store.read().await;
        Ok(store
            .rows
            .get(model)
            .and_then(|rows| rows.iter().find(|r| matches_where(r, where_clauses)).cloned()))
    }

    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let store = self.store.read().await;
        let empty = Vec::new();
        let rows = store.rows.get(model).unwrap_or(&empty);
        let filtered: Vec<serde_json::Value> = rows
            .iter()
            .filter(|r| matches_where(r, &query.where_clauses))
            .cloned()
            .collect();
        Ok(apply_query(filtered, &query))
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let store = self.store.read().await;
        let count = store
            .rows
            .get(model)
            .map(|rows| rows.iter().filter(|r| matches_where(r, where_clauses)).count())
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let mut store = self.store.write().await;
        Ok(apply_update(&mut store, model, where_clauses, &data))
    }

    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64> {
        let mut store = self.store.write().await;
        Ok(apply_update_many(&mut store, model, where_clauses, &data))
    }

    async fn delete_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64> {
        let mut store = self.store.write().await;
        Ok(apply_delete_many(&mut store, model, where_clauses))
    }

    async fn create_schema(&self, schema: &LedgerSchema) -> AdapterResult<()> {
        let mut store = self.store.write().await;
        for (name, table) in &schema.tables {
            let uniques: Vec<String> = table
                .unique_fields()
                .into_iter()
                .map(str::to_string)
                .collect();
            store.uniques.insert(name.clone(), uniques);
            store.rows.entry(name.clone()).or_default();
        }
        Ok(())
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        let snapshot = self.store.read().await.clone();
        Ok(Box::new(MemoryTransactionAdapter {
            parent: self.store.clone(),
            snapshot: Arc::new(RwLock::new(snapshot)),
            ops: Arc::new(RwLock::new(Vec::new())),
        }))
    }
}

// ─── Transaction Adapter ─────────────────────────────────────────

/// One recorded write, replayed against the live store at commit.
#[derive(Debug, Clone)]
enum TxOp {
    Create {
        model: String,
        row: serde_json::Value,
    },
    Update {
        model: String,
        where_clauses: Vec<WhereClause>,
        data: serde_json::Value,
        /// Whether the update matched a row in the snapshot. A conditional
        /// update that matched here but misses the live store at commit is a
        /// write conflict.
        matched: bool,
    },
    UpdateMany {
        model: String,
        where_clauses: Vec<WhereClause>,
        data: serde_json::Value,
    },
    DeleteMany {
        model: String,
        where_clauses: Vec<WhereClause>,
    },
}

/// Snapshot transaction: reads and writes run against a copy of the store
/// taken at `begin_transaction`, and every write is also recorded. Commit
/// replays the record onto the live store under its write lock, so writes
/// committed by others in the meantime survive; a version-conditioned
/// update whose row moved underneath fails the commit with `Contention`
/// and the caller retries the whole unit. Rollback discards everything.
#[derive(Debug)]
struct MemoryTransactionAdapter {
    parent: Arc<RwLock<Store>>,
    snapshot: Arc<RwLock<Store>>,
    ops: Arc<RwLock<Vec<TxOp>>>,
}

#[async_trait]
impl Adapter for MemoryTransactionAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let mut store = self.snapshot.write().await;
        let row = insert_row(&mut store, model, data)?;
        self.ops.write().await.push(TxOp::Create {
            model: model.to_string(),
            row: row.clone(),
        });
        Ok(row)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let store = self.snapshot.read().await;
        Ok(store
            .rows
            .get(model)
            .and_then(|rows| rows.iter().find(|r| matches_where(r, where_clauses)).cloned()))
    }

    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let store = self.snapshot.read().await;
        let empty = Vec::new();
        let rows = store.rows.get(model).unwrap_or(&empty);
        let filtered: Vec<serde_json::Value> = rows
            .iter()
            .filter(|r| matches_where(r, &query.where_clauses))
            .cloned()
            .collect();
        Ok(apply_query(filtered, &query))
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let store = self.snapshot.read().await;
        let count = store
            .rows
            .get(model)
            .map(|rows| rows.iter().filter(|r| matches_where(r, where_clauses)).count())
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let mut store = self.snapshot.write().await;
        let updated = apply_update(&mut store, model, where_clauses, &data);
        self.ops.write().await.push(TxOp::Update {
            model: model.to_string(),
            where_clauses: where_clauses.to_vec(),
            data,
            matched: updated.is_some(),
        });
        Ok(updated)
    }

    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64> {
        let mut store = self.snapshot.write().await;
        let count = apply_update_many(&mut store, model, where_clauses, &data);
        self.ops.write().await.push(TxOp::UpdateMany {
            model: model.to_string(),
            where_clauses: where_clauses.to_vec(),
            data,
        });
        Ok(count)
    }

    async fn delete_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64> {
        let mut store = self.snapshot.write().await;
        let count = apply_delete_many(&mut store, model, where_clauses);
        self.ops.write().await.push(TxOp::DeleteMany {
            model: model.to_string(),
            where_clauses: where_clauses.to_vec(),
        });
        Ok(count)
    }

    async fn create_schema(&self, _schema: &LedgerSchema) -> AdapterResult<()> {
        Err(LedgerError::Storage(
            "cannot create schema inside a transaction".into(),
        ))
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(LedgerError::Storage(
            "nested transactions are not supported by the memory adapter".into(),
        ))
    }
}

#[async_trait]
impl TransactionAdapter for MemoryTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        let ops = std::mem::take(&mut *self.ops.write().await);
        let mut parent = self.parent.write().await;

        // Replay against a copy first: a failed commit leaves the live store
        // untouched.
        let mut merged = parent.clone();
        for op in ops {
            match op {
                TxOp::Create { model, row } => {
                    insert_row(&mut merged, &model, row)?;
                }
                TxOp::Update {
                    model,
                    where_clauses,
                    data,
                    matched,
                } => {
                    let applied = apply_update(&mut merged, &model, &where_clauses, &data);
                    if matched && applied.is_none() {
                        return Err(LedgerError::Contention);
                    }
                }
                TxOp::UpdateMany {
                    model,
                    where_clauses,
                    data,
                } => {
                    apply_update_many(&mut merged, &model, &where_clauses, &data);
                }
                TxOp::DeleteMany {
                    model,
                    where_clauses,
                } => {
                    apply_delete_many(&mut merged, &model, &where_clauses);
                }
            }
        }

        *parent = merged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        // Snapshot and op record are simply discarded.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unity_ledger_core::db::adapter::SortBy;

    async fn adapter_with_schema() -> MemoryAdapter {
        let adapter = MemoryAdapter::new();
        adapter
            .create_schema(&LedgerSchema::core_schema())
            .await
            .unwrap();
        adapter
    }

    #[tokio::test]
    async fn create_and_find_one() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("balance", serde_json::json!({"user_id": "u1", "balance": 100}))
            .await
            .unwrap();

        let found = adapter
            .find_one("balance", &[WhereClause::eq("user_id", "u1")])
            .await
            .unwrap();
        assert_eq!(found.unwrap()["balance"], 100);
    }

    #[tokio::test]
    async fn create_backfills_id() {
        let adapter = MemoryAdapter::new();
        let row = adapter
            .create("balance", serde_json::json!({"user_id": "u1"}))
            .await
            .unwrap();
        assert!(row["id"].is_string());
    }

    #[tokio::test]
    async fn unique_constraint_rejects_duplicate() {
        let adapter = adapter_with_schema().await;
        adapter
            .create(
                "ledger_transaction",
                serde_json::json!({"id": "t1", "external_ref": "pay_123", "status": "completed"}),
            )
            .await
            .unwrap();

        let err = adapter
            .create(
                "ledger_transaction",
                serde_json::json!({"id": "t2", "external_ref": "pay_123", "status": "pending"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
    }

    #[tokio::test]
    async fn unique_constraint_ignores_null() {
        let adapter = adapter_with_schema().await;
        for id in ["t1", "t2"] {
            adapter
                .create(
                    "ledger_transaction",
                    serde_json::json!({"id": id, "external_ref": null}),
                )
                .await
                .unwrap();
        }
        assert_eq!(adapter.model_count("ledger_transaction").await, 2);
    }

    #[tokio::test]
    async fn version_conditioned_update_detects_conflict() {
        let adapter = MemoryAdapter::new();
        adapter
            .create(
                "balance",
                serde_json::json!({"user_id": "u1", "balance": 100, "version": 3}),
            )
            .await
            .unwrap();

        // Matching version succeeds and bumps it
        let updated = adapter
            .update(
                "balance",
                &[WhereClause::eq("user_id", "u1"), WhereClause::eq("version", 3)],
                serde_json::json!({"balance": 60, "version": 4}),
            )
            .await
            .unwrap();
        assert_eq!(updated.unwrap()["balance"], 60);

        // Stale version does not match anything
        let stale = adapter
            .update(
                "balance",
                &[WhereClause::eq("user_id", "u1"), WhereClause::eq("version", 3)],
                serde_json::json!({"balance": 0, "version": 4}),
            )
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn find_many_sorted_and_limited() {
        let adapter = MemoryAdapter::new();
        for (id, amount) in [("t1", 30), ("t2", 10), ("t3", 20)] {
            adapter
                .create(
                    "ledger_transaction",
                    serde_json::json!({"id": id, "amount": amount}),
                )
                .await
                .unwrap();
        }

        let query = FindManyQuery {
            sort_by: Some(SortBy {
                field: "amount".into(),
                direction: SortDirection::Desc,
            }),
            limit: Some(2),
            ..Default::default()
        };
        let rows = adapter.find_many("ledger_transaction", query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["amount"], 30);
        assert_eq!(rows[1]["amount"], 20);
    }

    #[tokio::test]
    async fn operator_lt_on_dates() {
        let adapter = MemoryAdapter::new();
        adapter
            .create(
                "payment_session",
                serde_json::json!({"id": "s1", "expires_at": "2026-01-01T00:00:00Z"}),
            )
            .await
            .unwrap();
        adapter
            .create(
                "payment_session",
                serde_json::json!({"id": "s2", "expires_at": "2026-06-01T00:00:00Z"}),
            )
            .await
            .unwrap();

        // RFC 3339 strings compare lexicographically in timestamp order
        let rows = adapter
            .find_many(
                "payment_session",
                FindManyQuery {
                    where_clauses: vec![WhereClause::with_op(
                        "expires_at",
                        Operator::Lt,
                        "2026-03-01T00:00:00Z",
                    )],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "s1");
    }

    #[tokio::test]
    async fn operator_in() {
        let adapter = MemoryAdapter::new();
        for (id, status) in [("s1", "pending"), ("s2", "confirming"), ("s3", "completed")] {
            adapter
                .create(
                    "payment_session",
                    serde_json::json!({"id": id, "status": status}),
                )
                .await
                .unwrap();
        }

        let rows = adapter
            .find_many(
                "payment_session",
                FindManyQuery {
                    where_clauses: vec![WhereClause::with_op(
                        "status",
                        Operator::In,
                        serde_json::json!(["pending", "confirming"]),
                    )],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn update_many_counts() {
        let adapter = MemoryAdapter::new();
        for id in ["s1", "s2"] {
            adapter
                .create(
                    "subscription",
                    serde_json::json!({"id": id, "user_id": "u1", "status": "active"}),
                )
                .await
                .unwrap();
        }

        let count = adapter
            .update_many(
                "subscription",
                &[WhereClause::eq("user_id", "u1")],
                serde_json::json!({"status": "inactive"}),
            )
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn transaction_commit_publishes_writes() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("balance", serde_json::json!({"user_id": "u1", "balance": 100}))
            .await
            .unwrap();

        let tx = adapter.begin_transaction().await.unwrap();
        tx.update(
            "balance",
            &[WhereClause::eq("user_id", "u1")],
            serde_json::json!({"balance": 60}),
        )
        .await
        .unwrap();

        // Not visible before commit
        let parent_row = adapter
            .find_one("balance", &[WhereClause::eq("user_id", "u1")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent_row["balance"], 100);

        tx.commit().await.unwrap();
        let parent_row = adapter
            .find_one("balance", &[WhereClause::eq("user_id", "u1")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent_row["balance"], 60);
    }

    #[tokio::test]
    async fn transaction_rollback_discards_writes() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("balance", serde_json::json!({"user_id": "u1", "balance": 100}))
            .await
            .unwrap();

        let tx = adapter.begin_transaction().await.unwrap();
        tx.create("balance", serde_json::json!({"user_id": "u2", "balance": 5}))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(adapter.model_count("balance").await, 1);
    }

    #[tokio::test]
    async fn commit_preserves_concurrent_writes() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("balance", serde_json::json!({"user_id": "u1", "balance": 100}))
            .await
            .unwrap();

        let tx = adapter.begin_transaction().await.unwrap();
        tx.update(
            "balance",
            &[WhereClause::eq("user_id", "u1")],
            serde_json::json!({"balance": 60}),
        )
        .await
        .unwrap();

        // An unrelated row lands while the transaction is open
        adapter
            .create("balance", serde_json::json!({"user_id": "u2", "balance": 7}))
            .await
            .unwrap();

        tx.commit().await.unwrap();

        let u1 = adapter
            .find_one("balance", &[WhereClause::eq("user_id", "u1")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(u1["balance"], 60);
        let u2 = adapter
            .find_one("balance", &[WhereClause::eq("user_id", "u2")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(u2["balance"], 7);
    }

    #[tokio::test]
    async fn commit_fails_when_conditioned_update_lost_the_race() {
        let adapter = MemoryAdapter::new();
        adapter
            .create(
                "balance",
                serde_json::json!({"user_id": "u1", "balance": 100, "version": 0}),
            )
            .await
            .unwrap();

        let tx = adapter.begin_transaction().await.unwrap();
        let in_tx = tx
            .update(
                "balance",
                &[WhereClause::eq("user_id", "u1"), WhereClause::eq("version", 0)],
                serde_json::json!({"balance": 60, "version": 1}),
            )
            .await
            .unwrap();
        assert!(in_tx.is_some());

        // A concurrent writer bumps the version before the commit
        adapter
            .update(
                "balance",
                &[WhereClause::eq("user_id", "u1"), WhereClause::eq("version", 0)],
                serde_json::json!({"balance": 110, "version": 1}),
            )
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, LedgerError::Contention));

        // The concurrent write survived untouched
        let row = adapter
            .find_one("balance", &[WhereClause::eq("user_id", "u1")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["balance"], 110);
    }

    #[tokio::test]
    async fn transaction_enforces_uniques_from_snapshot() {
        let adapter = adapter_with_schema().await;
        adapter
            .create(
                "ledger_transaction",
                serde_json::json!({"id": "t1", "external_ref": "pay_1"}),
            )
            .await
            .unwrap();

        let tx = adapter.begin_transaction().await.unwrap();
        let err = tx
            .create(
                "ledger_transaction",
                serde_json::json!({"id": "t2", "external_ref": "pay_1"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
    }
}
