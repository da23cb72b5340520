use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// The closed set of database engines this crate speaks to.
///
/// `Sqlite` is accepted for general use (upserts, raw queries) but offers no
/// cross-process advisory-lock primitive, so the lock operations reject it
/// with [`Error::UnsupportedBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    MySql,
    Postgres,
    Sqlite,
}

impl Engine {
    /// Configuration tag for this engine, e.g. `"mysql"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::MySql => "mysql",
            Engine::Postgres => "postgres",
            Engine::Sqlite => "sqlite",
        }
    }

    /// Whether the engine has a session-scoped advisory-lock primitive.
    ///
    /// Deployments that depend on locking should check this at startup
    /// instead of discovering an unsupported backend on the first acquire.
    pub fn supports_locking(&self) -> bool {
        matches!(self, Engine::MySql | Engine::Postgres)
    }

    /// Positional bind placeholder for this engine's SQL dialect.
    ///
    /// MySQL and SQLite use anonymous `?` markers; PostgreSQL numbers them
    /// `$1`, `$2`, ... `n` is 1-based.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Engine::Postgres => format!("${n}"),
            Engine::MySql | Engine::Sqlite => "?".to_string(),
        }
    }

    /// Quote an identifier (table or column name) for this engine.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Engine::MySql => format!("`{}`", ident.replace('`', "``")),
            Engine::Postgres | Engine::Sqlite => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql" => Ok(Engine::MySql),
            "postgres" => Ok(Engine::Postgres),
            "sqlite" => Ok(Engine::Sqlite),
            other => Err(Error::Config(format!("unknown engine tag: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for engine in [Engine::MySql, Engine::Postgres, Engine::Sqlite] {
            assert_eq!(engine.as_str().parse::<Engine>().unwrap(), engine);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!("mssql".parse::<Engine>().is_err());
        assert!("".parse::<Engine>().is_err());
    }

    #[test]
    fn test_serde_tags_match_config_format() {
        assert_eq!(serde_json::to_string(&Engine::MySql).unwrap(), "\"mysql\"");
        assert_eq!(
            serde_json::from_str::<Engine>("\"postgres\"").unwrap(),
            Engine::Postgres
        );
    }

    #[test]
    fn test_locking_support() {
        assert!(Engine::MySql.supports_locking());
        assert!(Engine::Postgres.supports_locking());
        assert!(!Engine::Sqlite.supports_locking());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Engine::MySql.placeholder(1), "?");
        assert_eq!(Engine::Sqlite.placeholder(3), "?");
        assert_eq!(Engine::Postgres.placeholder(2), "$2");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(Engine::MySql.quote_ident("group"), "`group`");
        assert_eq!(Engine::Postgres.quote_ident("group"), "\"group\"");
        assert_eq!(Engine::Sqlite.quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
