//! Query builders run through [`Fetch`].

use oxide_dbal::{Connection, DbalError, Fetch};
use oxide_dbal_core::condition::col;
use oxide_dbal_core::query::Query;
use oxide_dbal_core::SqlValue;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Player {
    id: i64,
    name: String,
    goals: i64,
    club: Option<String>,
}

async fn league() -> Connection {
    let conn = Connection::open("sqlite::memory:").await.unwrap();
    conn.execute_raw(
        "CREATE TABLE players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            goals INTEGER NOT NULL DEFAULT 0,
            club TEXT
        )",
    )
    .await
    .unwrap();
    conn.execute_raw(
        "INSERT INTO players (id, name, goals, club) VALUES
            (1, 'Cruijff', 33, 'Ajax'),
            (2, 'Van Basten', 28, 'Ajax'),
            (3, 'Gullit', 14, 'PSV'),
            (4, 'Koeman', 21, NULL)",
    )
    .await
    .unwrap();
    conn
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

#[tokio::test]
async fn all_and_one() {
    let conn = league().await;
    let rows = Query::from("players")
        .select(["name", "goals"])
        .where_(col("club").eq("Ajax"))
        .order_by("goals DESC")
        .all(&conn)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], text("Cruijff"));

    let row = Query::from("players")
        .where_(col("id").eq(3))
        .one(&conn)
        .await
        .unwrap();
    assert_eq!(row["club"], text("PSV"));

    let missing = Query::from("players").where_(col("id").eq(99)).one(&conn).await;
    assert!(matches!(missing, Err(DbalError::RowMissing)));
    let none = Query::from("players")
        .where_(col("id").eq(99))
        .one_or_none(&conn)
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn scalar_shapes() {
    let conn = league().await;
    let top = Query::from("players")
        .select(["name"])
        .order_by("goals DESC")
        .limit(1)
        .value(&conn)
        .await
        .unwrap();
    assert_eq!(top, text("Cruijff"));

    let names = Query::from("players")
        .select(["name"])
        .where_(col("club").is_null())
        .column(&conn)
        .await
        .unwrap();
    assert_eq!(names, vec![text("Koeman")]);

    let goals = Query::from("players")
        .select(["name", "goals"])
        .map(&conn)
        .await
        .unwrap();
    assert_eq!(goals["Gullit"], SqlValue::Int(14));

    let keyed = Query::from("players").keyed(&conn).await.unwrap();
    assert_eq!(keyed["2"]["name"], text("Van Basten"));
}

#[tokio::test]
async fn count_ignores_paging() {
    let conn = league().await;
    let query = Query::from("players")
        .where_(col("goals").gt(15))
        .order_by("name")
        .limit(1)
        .offset(1);
    assert_eq!(query.count(&conn).await.unwrap(), 3);
    assert_eq!(query.all(&conn).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rows_deserialize_into_structs() {
    let conn = league().await;
    let players: Vec<Player> = Query::from("players")
        .where_(col("club").ne("Ajax").or(col("club").is_null()))
        .order_by("id")
        .all_as(&conn)
        .await
        .unwrap();
    assert_eq!(
        players,
        vec![
            Player {
                id: 3,
                name: String::from("Gullit"),
                goals: 14,
                club: Some(String::from("PSV")),
            },
            Player {
                id: 4,
                name: String::from("Koeman"),
                goals: 21,
                club: None,
            },
        ]
    );

    let wrong: Result<Vec<Player>, _> = Query::from("players")
        .select(["name"])
        .all_as(&conn)
        .await;
    assert!(matches!(wrong, Err(DbalError::Decode(_))));
}

#[tokio::test]
async fn cursors_iterate_rows() {
    let conn = league().await;
    let cursor = Query::from("players")
        .select(["id", "name"])
        .where_(col("goals").ge(20))
        .order_by("id")
        .cursor(&conn)
        .await
        .unwrap();
    assert_eq!(cursor.len(), 3);
    let ids: Vec<SqlValue> = cursor.map(|row| row["id"].clone()).collect();
    assert_eq!(ids, vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(4)]);
}

#[tokio::test]
async fn invalid_identifiers_never_reach_the_server() {
    let conn = league().await;
    let err = Query::from("players; DROP TABLE players")
        .all(&conn)
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::InvalidArgument(_)));
}
