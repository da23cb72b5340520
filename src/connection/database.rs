use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, MySqlPool, PgPool, SqlitePool};

use crate::connection::{ConnectionConfig, EngineConnection, Session};
use crate::core::{Engine, Result};

/// A connection pool over one of the supported engines.
#[derive(Debug)]
pub struct Database {
    pool: EnginePool,
    config: ConnectionConfig,
}

#[derive(Debug)]
enum EnginePool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Database {
    /// Validate the configuration and open a pool against the DSN.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let level = statement_level(config.debug);
        let pool = match config.engine {
            Engine::MySql => {
                let options = MySqlConnectOptions::from_str(&config.dsn)?.log_statements(level);
                EnginePool::MySql(
                    MySqlPoolOptions::new()
                        .max_connections(config.max_connections)
                        .connect_with(options)
                        .await?,
                )
            }
            Engine::Postgres => {
                let options = PgConnectOptions::from_str(&config.dsn)?.log_statements(level);
                EnginePool::Postgres(
                    PgPoolOptions::new()
                        .max_connections(config.max_connections)
                        .connect_with(options)
                        .await?,
                )
            }
            Engine::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.dsn)?
                    .create_if_missing(true)
                    .log_statements(level);
                EnginePool::Sqlite(
                    SqlitePoolOptions::new()
                        .max_connections(config.max_connections)
                        .connect_with(options)
                        .await?,
                )
            }
        };
        tracing::debug!(engine = %config.engine, "database pool ready");
        Ok(Database { pool, config })
    }

    pub fn engine(&self) -> Engine {
        self.config.engine
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Check a dedicated connection out of the pool.
    ///
    /// Waits for a free connection if the pool is exhausted, so a deployment
    /// holding many concurrent locks needs `max_connections` sized to match.
    pub async fn session(&self) -> Result<Session> {
        let conn = match &self.pool {
            EnginePool::MySql(pool) => EngineConnection::MySql(pool.acquire().await?),
            EnginePool::Postgres(pool) => EngineConnection::Postgres(pool.acquire().await?),
            EnginePool::Sqlite(pool) => EngineConnection::Sqlite(pool.acquire().await?),
        };
        Ok(Session::new(conn))
    }

    /// Close the pool and all idle connections.
    pub async fn close(&self) {
        match &self.pool {
            EnginePool::MySql(pool) => pool.close().await,
            EnginePool::Postgres(pool) => pool.close().await,
            EnginePool::Sqlite(pool) => pool.close().await,
        }
    }
}

fn statement_level(debug: bool) -> log::LevelFilter {
    if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Off
    }
}
