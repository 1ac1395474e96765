//! SQLite-backed [`LabeledStore`].

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, TransactionBehavior, params};
use std::fmt::Write as _;
use std::path::Path;

use super::{
    DuplicatePolicy, LabelTarget, LabeledStore, ProductId, ProductRow, RowFailure, StagingSource,
    StagingSummary, StagingTarget, StoreError, TrainingRow, UnlabeledPredicate,
};
use crate::labeling::BinaryLabel;

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    /// Open an existing database file and apply the workload pragmas.
    ///
    /// A missing file is an error; the database is never created here.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection =
            Connection::open_with_flags(path, flags).map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let store = Self { connection };
        store.apply_pragmas()?;
        Ok(store)
    }

    /// Wrap an already configured connection (in-memory databases in tests).
    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn apply_pragmas(&self) -> Result<(), StoreError> {
        self.connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
        )?;
        Ok(())
    }

    /// Copy rows of `source` whose id is not yet in `target`, leaving label columns null.
    ///
    /// Rows are inserted one by one inside a single transaction; failures are collected and,
    /// if any occurred, the transaction is rolled back and all of them are reported.
    pub fn stage_products(
        &mut self,
        source: &StagingSource,
        target: &StagingTarget,
        policy: DuplicatePolicy,
    ) -> Result<StagingSummary, StoreError> {
        let store_select = source
            .store_column
            .as_ref()
            .map(|column| format!("s.{column}"))
            .unwrap_or_else(|| "NULL".to_string());
        let select = format!(
            "SELECT s.{sid}, s.{sname}, {store_select}
             FROM {stable} s
             WHERE s.{sid} IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM {ttable} t WHERE t.{tid} = s.{sid})
             ORDER BY s.{sid}",
            sid = source.id_column,
            sname = source.name_column,
            stable = source.table,
            ttable = target.table,
            tid = target.id_column,
        );
        let verb = match policy {
            DuplicatePolicy::Reject => "INSERT",
            DuplicatePolicy::Ignore => "INSERT OR IGNORE",
        };
        let insert = match &target.store_column {
            Some(store) => format!(
                "{verb} INTO {} ({}, {}, {store}) VALUES (?1, ?2, ?3)",
                target.table, target.id_column, target.name_column
            ),
            None => format!(
                "{verb} INTO {} ({}, {}) VALUES (?1, ?2)",
                target.table, target.id_column, target.name_column
            ),
        };

        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidates: Vec<(ProductId, Option<String>, Option<String>)> = {
            let mut stmt = tx.prepare(&select)?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut summary = StagingSummary {
            candidates: candidates.len(),
            ..StagingSummary::default()
        };
        let mut failures = Vec::new();
        {
            let mut stmt = tx.prepare(&insert)?;
            for (id, name, store) in &candidates {
                let result = if target.store_column.is_some() {
                    stmt.execute(params![id, name, store])
                } else {
                    stmt.execute(params![id, name])
                };
                match result {
                    Ok(0) => summary.ignored_duplicates += 1,
                    Ok(_) => summary.inserted += 1,
                    Err(err) => failures.push(RowFailure {
                        id: *id,
                        message: err.to_string(),
                    }),
                }
            }
        }
        if !failures.is_empty() {
            tx.rollback()?;
            tracing::warn!(
                "Staging into {} rolled back: {} of {} rows failed",
                target.table,
                failures.len(),
                candidates.len()
            );
            return Err(StoreError::Staging {
                attempted: candidates.len(),
                failures,
            });
        }
        tx.commit()?;
        tracing::info!(
            "Staged {} new rows into {} ({} duplicates ignored)",
            summary.inserted,
            target.table,
            summary.ignored_duplicates
        );
        Ok(summary)
    }
}

fn gate_clause(target: &LabelTarget) -> String {
    target
        .prerequisite
        .as_ref()
        .map(|column| format!(" AND {column} = 1"))
        .unwrap_or_default()
}

/// Product names are read as text whatever the column's storage class.
fn decode_name(value: Value) -> String {
    match value {
        Value::Text(text) => text,
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Value::Null => String::new(),
    }
}

/// Decode a stored label cell; integers, reals, and legacy text values are accepted.
fn decode_label(value: Value) -> Option<BinaryLabel> {
    match value {
        Value::Integer(0) => Some(BinaryLabel::Negative),
        Value::Integer(1) => Some(BinaryLabel::Positive),
        Value::Real(v) if v == 0.0 => Some(BinaryLabel::Negative),
        Value::Real(v) if v == 1.0 => Some(BinaryLabel::Positive),
        Value::Text(text) => BinaryLabel::parse_manual(&text),
        _ => None,
    }
}

impl LabeledStore for SqliteStore {
    fn fetch_unlabeled(
        &mut self,
        predicate: UnlabeledPredicate<'_>,
        limit: usize,
    ) -> Result<Vec<ProductRow>, StoreError> {
        let target = predicate.target;
        let sql = format!(
            "SELECT {id}, {name} FROM {table}
             WHERE {label} IS NULL AND {name} IS NOT NULL{gate} AND {id} > ?1
             ORDER BY {id} ASC
             LIMIT ?2",
            id = target.id_column,
            name = target.name_column,
            table = target.table,
            label = target.label_column,
            gate = gate_clause(target),
        );
        let after = predicate.after_id.unwrap_or(ProductId::MIN);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.connection.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![after, limit], |row| {
            Ok(ProductRow {
                id: row.get(0)?,
                name: decode_name(row.get(1)?),
            })
        })?;
        let rows = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_labels(
        &mut self,
        target: &LabelTarget,
        pairs: &[(BinaryLabel, ProductId)],
    ) -> Result<usize, StoreError> {
        if pairs.is_empty() {
            return Ok(0);
        }
        // Integers only; a batch can exceed SQLite's bound-parameter limit.
        let mut cases = String::with_capacity(pairs.len() * 24);
        let mut ids = String::with_capacity(pairs.len() * 8);
        for (i, (label, id)) in pairs.iter().enumerate() {
            let _ = write!(cases, " WHEN {id} THEN {}", label.as_i64());
            if i > 0 {
                ids.push(',');
            }
            let _ = write!(ids, "{id}");
        }
        let sql = format!(
            "UPDATE {table} SET {label} = CASE {idc}{cases} END
             WHERE {idc} IN ({ids}) AND {label} IS NULL{gate}",
            table = target.table,
            label = target.label_column,
            idc = target.id_column,
            gate = gate_clause(target),
        );
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(&sql, [])?;
        tx.commit()?;
        Ok(updated)
    }

    fn fetch_training_rows(&mut self, target: &LabelTarget) -> Result<Vec<TrainingRow>, StoreError> {
        let sql = format!(
            "SELECT {id}, {name}, {label} FROM {table}
             WHERE {name} IS NOT NULL{gate}
             ORDER BY {id} ASC",
            id = target.id_column,
            name = target.name_column,
            label = target.label_column,
            table = target.table,
            gate = gate_clause(target),
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let label: Value = row.get(2)?;
            Ok(TrainingRow {
                id: row.get(0)?,
                name: decode_name(row.get(1)?),
                manual_label: decode_label(label),
            })
        })?;
        let rows = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
