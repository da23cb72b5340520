//! Soft-deletable records and the idempotent create-or-revive write path.
//!
//! A soft-deleted row keeps its storage but carries a non-NULL deleted
//! marker. Re-creating the "same" record must clear that marker on the
//! existing row instead of inserting a duplicate, so unique constraints on
//! the natural key keep holding.

use chrono::Utc;
use sqlx::{Connection, Row};

use crate::connection::{EngineConnection, Session, bind_values};
use crate::core::{Engine, Error, Result, Value};

/// A persisted record with a nullable deleted marker.
///
/// Invariant: at most one live record (marker NULL) exists per natural key.
/// The primary-key column must hold a 64-bit integer surrogate id.
pub trait SoftDeletable {
    /// Table the record persists to.
    const TABLE: &'static str;

    /// Surrogate primary-key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Deleted-marker column; NULL means live.
    const DELETED_AT: &'static str = "deleted_at";

    /// Business-key columns and values identifying this record. Must not be
    /// empty.
    fn natural_key(&self) -> Vec<(&'static str, Value)>;

    /// Full column set for a fresh insert. Columns that should stay NULL or
    /// take a database default are omitted, not bound.
    fn insert_values(&self) -> Vec<(&'static str, Value)>;
}

fn where_clause(engine: Engine, columns: &[&str], first_index: usize) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(offset, column)| {
            format!(
                "{} = {}",
                engine.quote_ident(column),
                engine.placeholder(first_index + offset)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Natural-key lookup. No deleted filter: the lookup must see live and
/// soft-deleted matches alike.
fn select_sql(engine: Engine, table: &str, primary_key: &str, key_columns: &[&str]) -> String {
    format!(
        "SELECT {} FROM {} WHERE {}",
        engine.quote_ident(primary_key),
        engine.quote_ident(table),
        where_clause(engine, key_columns, 1)
    )
}

fn insert_sql(engine: Engine, table: &str, columns: &[&str]) -> String {
    let column_list = columns
        .iter()
        .map(|column| engine.quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|n| engine.placeholder(n))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        engine.quote_ident(table),
        column_list,
        placeholders
    )
}

fn revive_sql(engine: Engine, table: &str, deleted_column: &str, primary_key: &str) -> String {
    format!(
        "UPDATE {} SET {} = NULL WHERE {} = {}",
        engine.quote_ident(table),
        engine.quote_ident(deleted_column),
        engine.quote_ident(primary_key),
        engine.placeholder(1)
    )
}

fn soft_delete_sql(
    engine: Engine,
    table: &str,
    deleted_column: &str,
    key_columns: &[&str],
) -> String {
    format!(
        "UPDATE {} SET {} = {} WHERE {} AND {} IS NULL",
        engine.quote_ident(table),
        engine.quote_ident(deleted_column),
        engine.placeholder(1),
        where_clause(engine, key_columns, 2),
        engine.quote_ident(deleted_column)
    )
}

impl Session {
    /// Create `record`, or revive it if a soft-deleted row with the same
    /// natural key already exists.
    ///
    /// One transaction: an unscoped natural-key lookup, then either an
    /// insert (no match) or an update clearing the deleted marker on the
    /// matched row's primary key. A live match is revived too, which makes
    /// the operation idempotent. Any error rolls the transaction back and
    /// surfaces unchanged.
    pub async fn create_or_revive<R: SoftDeletable>(&mut self, record: &R) -> Result<()> {
        let engine = self.engine();
        let key = record.natural_key();
        if key.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "{}: natural key is empty",
                R::TABLE
            )));
        }
        let columns = record.insert_values();
        if columns.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "{}: no columns to insert",
                R::TABLE
            )));
        }
        let key_columns: Vec<&str> = key.iter().map(|(column, _)| *column).collect();
        let key_values: Vec<Value> = key.into_iter().map(|(_, value)| value).collect();
        let insert_columns: Vec<&str> = columns.iter().map(|(column, _)| *column).collect();
        let insert_values: Vec<Value> = columns.into_iter().map(|(_, value)| value).collect();

        let select = select_sql(engine, R::TABLE, R::PRIMARY_KEY, &key_columns);
        let insert = insert_sql(engine, R::TABLE, &insert_columns);
        let revive = revive_sql(engine, R::TABLE, R::DELETED_AT, R::PRIMARY_KEY);

        macro_rules! run {
            ($conn:expr) => {{
                let mut tx = $conn.begin().await?;
                match bind_values(sqlx::query(&select), &key_values)
                    .fetch_optional(&mut *tx)
                    .await?
                {
                    None => {
                        bind_values(sqlx::query(&insert), &insert_values)
                            .execute(&mut *tx)
                            .await?;
                        tracing::debug!(table = R::TABLE, "record created");
                    }
                    Some(row) => {
                        let id = row.try_get::<i64, _>(0)?;
                        sqlx::query(&revive).bind(id).execute(&mut *tx).await?;
                        tracing::debug!(table = R::TABLE, id, "record revived");
                    }
                }
                tx.commit().await?;
            }};
        }

        match &mut self.conn {
            EngineConnection::MySql(conn) => run!(conn),
            EngineConnection::Postgres(conn) => run!(conn),
            EngineConnection::Sqlite(conn) => run!(conn),
        }
        Ok(())
    }

    /// Set the deleted marker to now on live rows matching `record`'s
    /// natural key. Returns how many rows were marked; already-deleted rows
    /// are left untouched.
    pub async fn soft_delete<R: SoftDeletable>(&mut self, record: &R) -> Result<u64> {
        let key = record.natural_key();
        if key.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "{}: natural key is empty",
                R::TABLE
            )));
        }
        let key_columns: Vec<&str> = key.iter().map(|(column, _)| *column).collect();
        let sql = soft_delete_sql(self.engine(), R::TABLE, R::DELETED_AT, &key_columns);
        let mut params = Vec::with_capacity(key.len() + 1);
        params.push(Value::Timestamp(Utc::now()));
        params.extend(key.into_iter().map(|(_, value)| value));
        let affected = self.execute(&sql, &params).await?;
        tracing::debug!(table = R::TABLE, affected, "records soft deleted");
        Ok(affected)
    }
}
