pub mod config;
pub mod database;

pub use config::ConnectionConfig;
pub use database::Database;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Encode, Row, Type};

use crate::core::{Engine, Result, Value};
use crate::lock::LockKey;

/// A dedicated connection checked out of the pool.
///
/// Advisory locks are scoped to the underlying database session, so a
/// `Session` is the unit of lock ownership: locks taken through it are held
/// until released through it or until it drops and the server reclaims the
/// connection. Do not return a lock-holding session to shared use.
pub struct Session {
    pub(crate) conn: EngineConnection,
    pub(crate) held: Vec<LockKey>,
}

pub(crate) enum EngineConnection {
    MySql(PoolConnection<sqlx::MySql>),
    Postgres(PoolConnection<sqlx::Postgres>),
    Sqlite(PoolConnection<sqlx::Sqlite>),
}

impl Session {
    pub(crate) fn new(conn: EngineConnection) -> Self {
        Session {
            conn,
            held: Vec::new(),
        }
    }

    pub fn engine(&self) -> Engine {
        match &self.conn {
            EngineConnection::MySql(_) => Engine::MySql,
            EngineConnection::Postgres(_) => Engine::Postgres,
            EngineConnection::Sqlite(_) => Engine::Sqlite,
        }
    }

    /// Locks currently held through this session, oldest first.
    pub fn held_locks(&self) -> &[LockKey] {
        &self.held
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let affected = match &mut self.conn {
            EngineConnection::MySql(conn) => {
                bind_values(sqlx::query(sql), params)
                    .execute(&mut **conn)
                    .await?
                    .rows_affected()
            }
            EngineConnection::Postgres(conn) => {
                bind_values(sqlx::query(sql), params)
                    .execute(&mut **conn)
                    .await?
                    .rows_affected()
            }
            EngineConnection::Sqlite(conn) => {
                bind_values(sqlx::query(sql), params)
                    .execute(&mut **conn)
                    .await?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    /// Run a query expected to yield at most one row with one integer column.
    pub async fn query_scalar(&mut self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        let row = match &mut self.conn {
            EngineConnection::MySql(conn) => bind_values(sqlx::query(sql), params)
                .fetch_optional(&mut **conn)
                .await?
                .map(|r| r.try_get::<i64, _>(0))
                .transpose()?,
            EngineConnection::Postgres(conn) => bind_values(sqlx::query(sql), params)
                .fetch_optional(&mut **conn)
                .await?
                .map(|r| r.try_get::<i64, _>(0))
                .transpose()?,
            EngineConnection::Sqlite(conn) => bind_values(sqlx::query(sql), params)
                .fetch_optional(&mut **conn)
                .await?
                .map(|r| r.try_get::<i64, _>(0))
                .transpose()?,
        };
        Ok(row)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            tracing::warn!(
                locks = ?self.held,
                "session dropped while holding advisory locks; the server will reclaim them"
            );
        }
    }
}

pub(crate) fn bind_values<'q, DB>(
    query: Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>,
    params: &[Value],
) -> Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>
where
    DB: sqlx::Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    DateTime<Utc>: Encode<'q, DB> + Type<DB>,
{
    let mut query = query;
    for value in params {
        query = match value {
            Value::Boolean(b) => query.bind(*b),
            Value::Integer(i) => query.bind(*i),
            Value::Float(x) => query.bind(*x),
            Value::Text(s) => query.bind(s.clone()),
            Value::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}
