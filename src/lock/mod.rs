//! Cross-process advisory locks keyed by `(table, key)`.
//!
//! Locks are session-scoped: they belong to the database connection that
//! acquired them and survive until released on that connection or until the
//! connection ends. Acquire is non-blocking; a contended lock fails
//! immediately with [`Error::AlreadyLocked`] instead of waiting.

use std::fmt;

use md5::{Digest, Md5};
use sqlx::Row;

use crate::connection::{EngineConnection, Session};
use crate::core::{Engine, Error, Result};

/// How many leading hex digits of the MD5 digest become the numeric key.
///
/// Widening lowers the collision odds between distinct `(table, key)` pairs.
/// A collision causes spurious contention, never missed contention. The
/// ceiling is 15 digits so the parsed value stays inside the signed 64-bit
/// range PostgreSQL expects.
pub const LOCK_KEY_HEX_DIGITS: usize = 6;

const _: () = assert!(
    LOCK_KEY_HEX_DIGITS <= 15,
    "numeric lock keys must stay within 63 bits"
);

/// An engine-appropriate advisory-lock identifier.
///
/// MySQL locks are keyed by arbitrary strings, PostgreSQL locks by 64-bit
/// integers. `Display` gives the form quoted in error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Name(String),
    Numeric(i64),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Name(name) => f.write_str(name),
            LockKey::Numeric(key) => write!(f, "{key}"),
        }
    }
}

fn lock_name(table: &str, key: i64) -> String {
    format!("{table}-{key}")
}

/// Fold the first [`LOCK_KEY_HEX_DIGITS`] hex digits of md5(`name`) into a
/// non-negative `i64`.
fn numeric_lock_key(name: &str) -> i64 {
    let digest = Md5::digest(name.as_bytes());
    let mut key: i64 = 0;
    for position in 0..LOCK_KEY_HEX_DIGITS {
        let byte = digest[position / 2];
        let nibble = if position % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        };
        key = (key << 4) | i64::from(nibble);
    }
    key
}

/// Derive the lock identifier for `(table, key)` on the given engine.
///
/// Deterministic: identical inputs always yield the identical identifier,
/// across processes. SQLite has no advisory-lock primitive, so no key is
/// derived for it.
pub fn derive_lock_key(engine: Engine, table: &str, key: i64) -> Result<LockKey> {
    let name = lock_name(table, key);
    match engine {
        Engine::MySql => Ok(LockKey::Name(name)),
        Engine::Postgres => Ok(LockKey::Numeric(numeric_lock_key(&name))),
        Engine::Sqlite => Err(Error::UnsupportedBackend(Engine::Sqlite)),
    }
}

// The free-check and the zero-wait acquire travel in one request so there is
// no window for a blocking wait between them.
const MYSQL_TRY_LOCK: &str = "SELECT GET_LOCK(?, 0) FROM DUAL WHERE (SELECT IS_FREE_LOCK(?)) = 1";
const MYSQL_RELEASE_LOCK: &str = "SELECT RELEASE_LOCK(?)";
const PG_TRY_LOCK: &str = "SELECT pg_try_advisory_lock($1)";
const PG_RELEASE_LOCK: &str = "SELECT pg_advisory_unlock($1)";

impl Session {
    /// Try to acquire the advisory lock for `(table, key)` without waiting.
    ///
    /// Returns the derived [`LockKey`] on success. A lock held by another
    /// session fails with [`Error::AlreadyLocked`]. Re-acquiring a lock this
    /// session already holds diverges per engine: the MySQL free-check guard
    /// refuses it with [`Error::AlreadyLocked`], while PostgreSQL stacks the
    /// acquire and expects one [`Session::unlock`] per success. SQLite fails
    /// with [`Error::UnsupportedBackend`] before any SQL is issued.
    pub async fn try_lock(&mut self, table: &str, key: i64) -> Result<LockKey> {
        let engine = self.engine();
        let lock_key = derive_lock_key(engine, table, key)?;
        let granted = match (&mut self.conn, &lock_key) {
            (EngineConnection::MySql(conn), LockKey::Name(name)) => {
                let name = name.clone();
                // Zero rows means the free-check failed; 0 or NULL means
                // GET_LOCK itself refused. Only an explicit 1 grants.
                sqlx::query(MYSQL_TRY_LOCK)
                    .bind(name.clone())
                    .bind(name)
                    .fetch_optional(&mut **conn)
                    .await?
                    .map(|row| row.try_get::<Option<i64>, _>(0))
                    .transpose()?
                    .flatten()
                    == Some(1)
            }
            (EngineConnection::Postgres(conn), LockKey::Numeric(numeric)) => {
                sqlx::query_scalar::<_, bool>(PG_TRY_LOCK)
                    .bind(*numeric)
                    .fetch_one(&mut **conn)
                    .await?
            }
            _ => return Err(Error::UnsupportedBackend(engine)),
        };
        if !granted {
            return Err(Error::AlreadyLocked(lock_key));
        }
        tracing::debug!(%lock_key, "advisory lock acquired");
        self.held.push(lock_key.clone());
        Ok(lock_key)
    }

    /// Release the advisory lock for `(table, key)`.
    ///
    /// The engine-native unlock is issued and its scalar result discarded;
    /// releasing a lock this session does not hold is a server-side no-op.
    /// Driver errors propagate unchanged.
    pub async fn unlock(&mut self, table: &str, key: i64) -> Result<()> {
        let engine = self.engine();
        let lock_key = derive_lock_key(engine, table, key)?;
        match (&mut self.conn, &lock_key) {
            (EngineConnection::MySql(conn), LockKey::Name(name)) => {
                sqlx::query(MYSQL_RELEASE_LOCK)
                    .bind(name.clone())
                    .fetch_optional(&mut **conn)
                    .await?;
            }
            (EngineConnection::Postgres(conn), LockKey::Numeric(numeric)) => {
                sqlx::query(PG_RELEASE_LOCK)
                    .bind(*numeric)
                    .fetch_optional(&mut **conn)
                    .await?;
            }
            _ => return Err(Error::UnsupportedBackend(engine)),
        }
        // One acquire is paired with one release; PostgreSQL locks stack per
        // session, so only the first matching bookkeeping entry goes.
        if let Some(position) = self.held.iter().position(|held| *held == lock_key) {
            self.held.remove(position);
        }
        tracing::debug!(%lock_key, "advisory lock released");
        Ok(())
    }
}
