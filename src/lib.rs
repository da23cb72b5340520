//! Cross-process advisory row locks and soft-delete-aware upserts over a
//! shared relational database.
//!
//! Several service instances that share one MySQL or PostgreSQL database can
//! serialize access to a logical resource, named by a table and a row key,
//! without any separate lock service. The lock never waits: a contended
//! acquire fails immediately with [`Error::AlreadyLocked`] so the caller can
//! retry or move on. SQLite connections are fully usable for reads, writes,
//! and [`Session::create_or_revive`], but the lock calls reject SQLite with
//! [`Error::UnsupportedBackend`] since it has no advisory-lock primitive.
//!
//! # Examples
//!
//! ```no_run
//! use rowlock::{ConnectionConfig, Database, Engine};
//!
//! # async fn demo() -> rowlock::Result<()> {
//! let config = ConnectionConfig::new(Engine::Postgres, "postgres://app@db/app");
//! let db = Database::connect(config).await?;
//!
//! // One session = one database connection = one lock owner.
//! let mut session = db.session().await?;
//! session.try_lock("orders", 42).await?;
//! // ... protected work ...
//! session.unlock("orders", 42).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod core;
pub mod lock;
pub mod record;

pub use connection::{ConnectionConfig, Database, Session};
pub use core::{Engine, Error, Result, Value};
pub use lock::{LOCK_KEY_HEX_DIGITS, LockKey, derive_lock_key};
pub use record::SoftDeletable;
