//! Connection, statement, cache, transaction and lock behavior against an
//! in-memory SQLite database.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use indexmap::IndexMap;
use oxide_dbal::{Connection, ConnectionConfig, DbalError, QueryErrorKind, TransactionState};
use oxide_dbal_core::cache::MemoryCache;
use oxide_dbal_core::condition::{col, BindMode};
use oxide_dbal_core::result::{QueryResult, ReturnType};
use oxide_dbal_core::SqlValue;

const CLUBS: &str = "CREATE TABLE clubs (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    name VARCHAR(200) NOT NULL UNIQUE,
    city VARCHAR(100)
)";

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

async fn memory() -> Connection {
    let config = ConnectionConfig::new("sqlite::memory:")
        .lock_poll_interval(Duration::from_millis(10));
    Connection::connect(config).await.unwrap()
}

async fn with_clubs() -> Connection {
    let conn = memory().await;
    conn.execute_raw(CLUBS).await.unwrap();
    for (name, city) in [("Ajax", "Amsterdam"), ("PSV", "Eindhoven"), ("Feyenoord", "Rotterdam")] {
        let mut data = IndexMap::new();
        data.insert(String::from("name"), text(name));
        data.insert(String::from("city"), text(city));
        conn.insert("clubs", &data).await.unwrap();
    }
    conn
}

#[tokio::test]
async fn connects_and_reports_dialect() {
    let conn = memory().await;
    assert_eq!(conn.kind(), oxide_dbal_core::dialect::DialectKind::Sqlite);
    assert_eq!(conn.prefix(), "");
}

#[tokio::test]
async fn unreachable_database_is_a_connection_error() {
    let err = Connection::open("sqlite:///nonexistent-dir/for/sure/db.sqlite")
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::Connection { .. }));
}

#[tokio::test]
async fn return_types_shape_results() {
    let conn = with_clubs().await;

    let QueryResult::Rows(rows) = conn
        .query("SELECT id, name FROM clubs ORDER BY id", &[], ReturnType::Arr)
        .await
        .unwrap()
    else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["id"], SqlValue::Int(1));
    assert_eq!(rows[1]["name"], text("PSV"));

    let value = conn
        .query(
            "SELECT city FROM clubs WHERE name = ?",
            &[text("Feyenoord")],
            ReturnType::Val,
        )
        .await
        .unwrap();
    assert_eq!(value, QueryResult::Value(Some(text("Rotterdam"))));

    let column = conn
        .query("SELECT name FROM clubs ORDER BY name", &[], ReturnType::Col)
        .await
        .unwrap();
    assert_eq!(
        column,
        QueryResult::Column(vec![text("Ajax"), text("Feyenoord"), text("PSV")])
    );

    let QueryResult::Map(map) = conn
        .query("SELECT name, city FROM clubs", &[], ReturnType::Map)
        .await
        .unwrap()
    else {
        panic!("expected a map");
    };
    assert_eq!(map["PSV"], text("Eindhoven"));

    let updated = conn
        .query(
            "UPDATE clubs SET city = ? WHERE city <> ?",
            &[text("Elsewhere"), text("Amsterdam")],
            ReturnType::Count,
        )
        .await
        .unwrap();
    assert_eq!(updated, QueryResult::Count(2));
}

#[tokio::test]
async fn null_values_round_trip() {
    let conn = with_clubs().await;
    conn.query(
        "UPDATE clubs SET city = ? WHERE name = ?",
        &[SqlValue::Null, text("Ajax")],
        ReturnType::Null,
    )
    .await
    .unwrap();
    let city = conn
        .query(
            "SELECT city FROM clubs WHERE name = ?",
            &[text("Ajax")],
            ReturnType::ValOrNull,
        )
        .await
        .unwrap();
    assert_eq!(city, QueryResult::Value(Some(SqlValue::Null)));
}

#[tokio::test]
async fn empty_results_raise_row_missing() {
    let conn = with_clubs().await;
    let err = conn
        .query(
            "SELECT * FROM clubs WHERE name = ?",
            &[text("Nobody")],
            ReturnType::Row,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::RowMissing));

    let none = conn
        .query(
            "SELECT * FROM clubs WHERE name = ?",
            &[text("Nobody")],
            ReturnType::RowOrNull,
        )
        .await
        .unwrap();
    assert_eq!(none, QueryResult::Row(None));
}

#[tokio::test]
async fn unique_violations_are_classified() {
    let conn = with_clubs().await;
    let mut data = IndexMap::new();
    data.insert(String::from("name"), text("Ajax"));
    let err = conn.insert("clubs", &data).await.unwrap_err();
    let query = err.as_query().expect("a query error");
    assert_eq!(
        query.kind,
        QueryErrorKind::Constraint {
            key: Some(String::from("clubs.name")),
            value: None,
        }
    );
    assert!(query.sql.starts_with("INSERT INTO \"clubs\""));
    assert_eq!(query.params, "['Ajax']");
}

#[tokio::test]
async fn syntax_errors_keep_the_statement() {
    let conn = memory().await;
    let err = conn
        .query("SELEC 1", &[], ReturnType::Val)
        .await
        .unwrap_err();
    let query = err.as_query().expect("a query error");
    assert_eq!(query.kind, QueryErrorKind::Other);
    assert_eq!(query.sql, "SELEC 1");
}

#[tokio::test]
async fn writes_through_builders() {
    let conn = with_clubs().await;

    let mut data = IndexMap::new();
    data.insert(String::from("name"), text("AZ"));
    assert_eq!(conn.insert("clubs", &data).await.unwrap(), Some(4));

    let mut change = IndexMap::new();
    change.insert(String::from("city"), text("Alkmaar"));
    assert_eq!(
        conn.update("clubs", &change, col("name").eq("AZ")).await.unwrap(),
        1
    );
    assert_eq!(
        conn.delete("clubs", col("city").eq("Alkmaar")).await.unwrap(),
        1
    );

    // an unconditional delete must be asked for explicitly
    let err = conn
        .delete("clubs", oxide_dbal_core::condition::Condition::all(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::InvalidArgument(_)));
}

#[tokio::test]
async fn quoting_follows_the_dialect() {
    let conn = memory().await;
    assert_eq!(conn.quote_field("clubs.name").unwrap(), "\"clubs\".\"name\"");
    assert!(matches!(
        conn.quote_field("name; DROP TABLE clubs"),
        Err(DbalError::InvalidArgument(_))
    ));
    assert_eq!(conn.quote(&text("it's"), BindMode::Value).unwrap(), "'it''s'");
    assert_eq!(conn.quote(&text("city"), BindMode::Field).unwrap(), "\"city\"");
    assert!(conn.quote(&SqlValue::Int(1), BindMode::Field).is_err());
}

#[tokio::test]
async fn prepared_statements_and_cursors() {
    let conn = with_clubs().await;
    let statement = conn
        .prepare("SELECT id, name FROM clubs WHERE id > ? ORDER BY id")
        .await
        .unwrap();
    assert_eq!(statement.columns(), ["id", "name"]);

    let first = statement
        .execute(&conn, &[SqlValue::Int(0)], ReturnType::Val)
        .await
        .unwrap();
    assert_eq!(first, QueryResult::Value(Some(SqlValue::Int(1))));

    let cursor = statement.cursor(&conn, &[SqlValue::Int(1)]).await.unwrap();
    assert_eq!(cursor.columns(), ["id", "name"]);
    let names: Vec<SqlValue> = cursor.map(|row| row["name"].clone()).collect();
    assert_eq!(names, vec![text("PSV"), text("Feyenoord")]);

    let err = conn.prepare("SELECT * FROM missing").await.unwrap_err();
    assert!(err.as_query().is_some());
}

#[tokio::test]
async fn cache_serves_reads_until_cleared() {
    let cache = Arc::new(MemoryCache::new());
    let conn = with_clubs().await.with_cache(cache.clone());
    let count = || conn.query("SELECT COUNT(*) FROM clubs", &[], ReturnType::Val);

    assert_eq!(count().await.unwrap(), QueryResult::Value(Some(SqlValue::Int(3))));
    conn.execute_raw("DELETE FROM clubs").await.unwrap();
    assert_eq!(count().await.unwrap(), QueryResult::Value(Some(SqlValue::Int(3))));
    assert_eq!(cache.len(), 1);

    conn.clear_cache(None);
    assert_eq!(count().await.unwrap(), QueryResult::Value(Some(SqlValue::Int(0))));
}

#[tokio::test]
async fn transactions_are_flat() {
    let conn = with_clubs().await;
    assert_eq!(conn.transaction_state().await, TransactionState::None);

    let mut tx = conn.begin().await.unwrap();
    assert_eq!(conn.transaction_state().await, TransactionState::Root);
    let err = conn.begin().await.unwrap_err();
    assert_eq!(
        err.as_query().map(|q| &q.kind),
        Some(&QueryErrorKind::Transaction)
    );

    conn.execute_raw("DELETE FROM clubs").await.unwrap();
    assert!(tx.rollback().await.unwrap());
    assert!(!tx.rollback().await.unwrap());
    assert!(!tx.commit().await.unwrap());
    assert_eq!(conn.transaction_state().await, TransactionState::None);

    let remaining = conn
        .query("SELECT COUNT(*) FROM clubs", &[], ReturnType::Val)
        .await
        .unwrap();
    assert_eq!(remaining, QueryResult::Value(Some(SqlValue::Int(3))));
}

#[tokio::test]
async fn savepoints_leave_their_parent_open() {
    let conn = with_clubs().await;
    assert!(conn.savepoint().await.is_err());

    let mut tx = conn.begin().await.unwrap();
    conn.execute_raw("DELETE FROM clubs WHERE name = 'Ajax'").await.unwrap();

    let mut sp = conn.savepoint().await.unwrap();
    assert!(sp.is_savepoint());
    assert_eq!(sp.parent(), Some("root"));
    assert_eq!(
        conn.transaction_state().await,
        TransactionState::Savepoint {
            parent: String::from("root")
        }
    );
    conn.execute_raw("DELETE FROM clubs").await.unwrap();
    assert!(sp.rollback().await.unwrap());
    assert!(!sp.commit().await.unwrap());
    assert_eq!(conn.transaction_state().await, TransactionState::Root);

    assert!(tx.commit().await.unwrap());
    let names = conn
        .query("SELECT name FROM clubs ORDER BY id", &[], ReturnType::Col)
        .await
        .unwrap();
    assert_eq!(names, QueryResult::Column(vec![text("PSV"), text("Feyenoord")]));
}

#[tokio::test]
async fn committing_a_parent_closes_its_savepoints() {
    let conn = with_clubs().await;
    let mut tx = conn.begin().await.unwrap();
    let mut sp = conn.savepoint().await.unwrap();
    assert!(tx.commit().await.unwrap());
    assert!(!sp.commit().await.unwrap());
    assert_eq!(conn.transaction_state().await, TransactionState::None);
}

async fn club_count(conn: &Connection) -> QueryResult {
    conn.query("SELECT COUNT(*) FROM clubs", &[], ReturnType::Val)
        .await
        .unwrap()
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let conn = with_clubs().await;
    {
        let _tx = conn.begin().await.unwrap();
        conn.execute_raw("DELETE FROM clubs").await.unwrap();
    }
    assert_eq!(conn.transaction_state().await, TransactionState::None);
    assert_eq!(club_count(&conn).await, QueryResult::Value(Some(SqlValue::Int(3))));

    let mut tx = conn.begin().await.unwrap();
    assert!(tx.commit().await.unwrap());
}

#[tokio::test]
async fn dropped_savepoint_rolls_back_to_its_parent() {
    let conn = with_clubs().await;
    let mut tx = conn.begin().await.unwrap();
    conn.execute_raw("DELETE FROM clubs WHERE name = 'Ajax'").await.unwrap();
    {
        let _sp = conn.savepoint().await.unwrap();
        conn.execute_raw("DELETE FROM clubs").await.unwrap();
    }
    assert_eq!(conn.transaction_state().await, TransactionState::Root);
    assert!(tx.commit().await.unwrap());
    assert_eq!(club_count(&conn).await, QueryResult::Value(Some(SqlValue::Int(2))));
}

#[tokio::test]
async fn failed_finish_keeps_the_scope_open() {
    let conn = with_clubs().await;
    let mut tx = conn.begin().await.unwrap();
    let mut sp = conn.savepoint().await.unwrap();
    // released behind the handle's back, so rolling back to it fails
    conn.execute_raw(&format!("RELEASE SAVEPOINT {}", sp.key()))
        .await
        .unwrap();

    assert!(sp.rollback().await.is_err());
    assert!(!sp.is_closed());
    assert_eq!(
        conn.transaction_state().await,
        TransactionState::Savepoint {
            parent: String::from("root")
        }
    );

    assert!(tx.rollback().await.unwrap());
    assert!(!sp.rollback().await.unwrap());
    assert_eq!(conn.transaction_state().await, TransactionState::None);
}

#[tokio::test]
async fn locks_exclude_and_release() {
    let conn = memory().await;
    assert!(conn.create_lock("sync", Duration::from_secs(1)).await.unwrap());
    assert!(!conn.create_lock("sync", Duration::from_millis(30)).await.unwrap());
    assert!(conn.create_lock("other", Duration::from_millis(30)).await.unwrap());
    assert!(conn.delete_lock("sync").await.unwrap());
    assert!(!conn.delete_lock("sync").await.unwrap());

    let err = conn
        .with_lock("other", Duration::from_millis(30), || async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::Lock { .. }));

    // the bookkeeping table is not part of the schema
    assert!(conn.table_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn with_lock_releases_on_error_and_panic() {
    let conn = memory().await;
    let timeout = Duration::from_millis(50);

    let value = conn.with_lock("job", timeout, || async { Ok(7) }).await.unwrap();
    assert_eq!(value, 7);

    let err = conn
        .with_lock("job", timeout, || async {
            Err::<(), _>(DbalError::RowMissing)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::RowMissing));
    assert!(conn.create_lock("job", timeout).await.unwrap());
    assert!(conn.delete_lock("job").await.unwrap());

    let explode = true;
    let outcome = AssertUnwindSafe(conn.with_lock("job", timeout, || async move {
        assert!(!explode, "boom");
        Ok::<(), DbalError>(())
    }))
    .catch_unwind()
    .await;
    assert!(outcome.is_err());
    assert!(conn.create_lock("job", timeout).await.unwrap());
}

#[tokio::test]
async fn cancelled_with_lock_releases_on_next_use() {
    let conn = memory().await;
    let held = tokio::time::timeout(
        Duration::from_millis(100),
        conn.with_lock("job", Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), DbalError>(())
        }),
    )
    .await;
    assert!(held.is_err());

    assert!(conn.create_lock("job", Duration::from_millis(50)).await.unwrap());
    assert!(conn.delete_lock("job").await.unwrap());
}

#[tokio::test]
async fn prefixed_connection_scopes_tables() {
    let conn = Connection::connect(ConnectionConfig::new("sqlite::memory:").table_prefix("app_"))
        .await
        .unwrap();
    conn.execute_raw("CREATE TABLE app_clubs (id INTEGER PRIMARY KEY)")
        .await
        .unwrap();
    conn.execute_raw("CREATE TABLE legacy (id INTEGER PRIMARY KEY)")
        .await
        .unwrap();
    assert_eq!(conn.table_names().await.unwrap(), ["clubs"]);
    assert!(conn.table_exists("clubs").await.unwrap());
    assert!(!conn.table_exists("legacy").await.unwrap());
}
