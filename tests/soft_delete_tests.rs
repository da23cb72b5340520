/// Soft-delete lifecycle tests
///
/// create_or_revive and soft_delete against in-memory SQLite, including the
/// partial-unique-index second line of defense.
/// Run with: cargo test --test soft_delete_tests

use rowlock::{ConnectionConfig, Database, Engine, Error, Session, SoftDeletable, Value};

const CREATE_TABLE: &str = "CREATE TABLE backends (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    method TEXT NOT NULL,
    upstream TEXT,
    deleted_at TEXT
)";

// Uniqueness applies to live rows only; soft-deleted history may pile up.
const CREATE_LIVE_INDEX: &str =
    "CREATE UNIQUE INDEX idx_backends_live ON backends (path, method) WHERE deleted_at IS NULL";

struct Backend {
    path: String,
    method: String,
    upstream: String,
}

impl Backend {
    fn new(path: &str, method: &str) -> Self {
        Backend {
            path: path.to_string(),
            method: method.to_string(),
            upstream: "http://127.0.0.1:9000".to_string(),
        }
    }
}

impl SoftDeletable for Backend {
    const TABLE: &'static str = "backends";

    fn natural_key(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("path", Value::from(self.path.as_str())),
            ("method", Value::from(self.method.as_str())),
        ]
    }

    fn insert_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("path", Value::from(self.path.as_str())),
            ("method", Value::from(self.method.as_str())),
            ("upstream", Value::from(self.upstream.as_str())),
        ]
    }
}

// One pooled connection keeps the in-memory database alive for the whole
// test; every statement runs on the one session.
async fn setup() -> (Database, Session) {
    let config = ConnectionConfig::new(Engine::Sqlite, "sqlite::memory:").max_connections(1);
    let db = Database::connect(config).await.unwrap();
    let mut session = db.session().await.unwrap();
    session.execute(CREATE_TABLE, &[]).await.unwrap();
    session.execute(CREATE_LIVE_INDEX, &[]).await.unwrap();
    (db, session)
}

async fn live_count(session: &mut Session) -> i64 {
    session
        .query_scalar(
            "SELECT COUNT(*) FROM backends WHERE deleted_at IS NULL",
            &[],
        )
        .await
        .unwrap()
        .unwrap()
}

async fn total_count(session: &mut Session) -> i64 {
    session
        .query_scalar("SELECT COUNT(*) FROM backends", &[])
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_create_inserts_new_record() {
    let (_db, mut session) = setup().await;

    session
        .create_or_revive(&Backend::new("/api/orders", "GET"))
        .await
        .unwrap();

    assert_eq!(live_count(&mut session).await, 1);
    assert_eq!(total_count(&mut session).await, 1);
}

#[tokio::test]
async fn test_create_twice_leaves_one_live_record() {
    let (_db, mut session) = setup().await;
    let backend = Backend::new("/api/orders", "GET");

    session.create_or_revive(&backend).await.unwrap();
    session.create_or_revive(&backend).await.unwrap();

    assert_eq!(live_count(&mut session).await, 1);
    assert_eq!(total_count(&mut session).await, 1);
}

#[tokio::test]
async fn test_revive_after_soft_delete() {
    let (_db, mut session) = setup().await;
    let backend = Backend::new("/api/orders", "GET");

    session.create_or_revive(&backend).await.unwrap();
    let marked = session.soft_delete(&backend).await.unwrap();
    assert_eq!(marked, 1);
    assert_eq!(live_count(&mut session).await, 0);
    assert_eq!(total_count(&mut session).await, 1);

    // Recreation revives the soft-deleted row instead of inserting.
    session.create_or_revive(&backend).await.unwrap();
    assert_eq!(live_count(&mut session).await, 1);
    assert_eq!(total_count(&mut session).await, 1);
}

#[tokio::test]
async fn test_revive_preserves_surrogate_id() {
    let (_db, mut session) = setup().await;
    let backend = Backend::new("/api/orders", "GET");
    let id_sql = "SELECT id FROM backends WHERE path = ? AND method = ?";
    let params = [Value::from("/api/orders"), Value::from("GET")];

    session.create_or_revive(&backend).await.unwrap();
    let original = session.query_scalar(id_sql, &params).await.unwrap().unwrap();

    session.soft_delete(&backend).await.unwrap();
    session.create_or_revive(&backend).await.unwrap();
    let revived = session.query_scalar(id_sql, &params).await.unwrap().unwrap();

    assert_eq!(original, revived);
}

#[tokio::test]
async fn test_soft_delete_skips_already_deleted_rows() {
    let (_db, mut session) = setup().await;
    let backend = Backend::new("/api/orders", "GET");

    session.create_or_revive(&backend).await.unwrap();
    assert_eq!(session.soft_delete(&backend).await.unwrap(), 1);
    assert_eq!(session.soft_delete(&backend).await.unwrap(), 0);
}

#[tokio::test]
async fn test_soft_delete_without_match_reports_zero() {
    let (_db, mut session) = setup().await;

    let marked = session
        .soft_delete(&Backend::new("/api/missing", "GET"))
        .await
        .unwrap();
    assert_eq!(marked, 0);
}

#[tokio::test]
async fn test_distinct_natural_keys_coexist() {
    let (_db, mut session) = setup().await;

    session
        .create_or_revive(&Backend::new("/api/orders", "GET"))
        .await
        .unwrap();
    session
        .create_or_revive(&Backend::new("/api/orders", "POST"))
        .await
        .unwrap();
    session
        .create_or_revive(&Backend::new("/api/users", "GET"))
        .await
        .unwrap();

    assert_eq!(live_count(&mut session).await, 3);
}

#[tokio::test]
async fn test_empty_natural_key_rejected() {
    struct Unkeyed;

    impl SoftDeletable for Unkeyed {
        const TABLE: &'static str = "backends";

        fn natural_key(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }

        fn insert_values(&self) -> Vec<(&'static str, Value)> {
            vec![("path", Value::from("/x"))]
        }
    }

    let (_db, mut session) = setup().await;

    let create_err = session.create_or_revive(&Unkeyed).await.unwrap_err();
    assert!(matches!(create_err, Error::InvalidRecord(_)));

    let delete_err = session.soft_delete(&Unkeyed).await.unwrap_err();
    assert!(matches!(delete_err, Error::InvalidRecord(_)));

    assert_eq!(total_count(&mut session).await, 0);
}

#[tokio::test]
async fn test_live_index_blocks_raw_duplicate_insert() {
    let (_db, mut session) = setup().await;
    let backend = Backend::new("/api/orders", "GET");

    session.create_or_revive(&backend).await.unwrap();

    // Bypassing create_or_revive trips the partial unique index.
    let raw_insert = session
        .execute(
            "INSERT INTO backends (path, method, upstream) VALUES (?, ?, ?)",
            &[
                Value::from("/api/orders"),
                Value::from("GET"),
                Value::from("http://127.0.0.1:9001"),
            ],
        )
        .await;
    assert!(matches!(raw_insert, Err(Error::Database(_))));
    assert_eq!(live_count(&mut session).await, 1);
}
