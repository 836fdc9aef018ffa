//! Connection, cursor and query builder tests against SQLite files

mod common;

use chrono::{NaiveDate, NaiveDateTime};
use common::{count_users, temp_db, User};
use llamadb::{Connection, Error, Query, Value};

// ============ Execution & Cursors ============

#[tokio::test]
async fn test_execute_and_fetch() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;

    let inserted = conn
        .execute(
            "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
            ("ada", "ada@example.com", 36),
        )
        .await?;
    assert_eq!(inserted.rows_affected(), 1);
    assert_eq!(inserted.last_insert_id(), Some(1));
    conn.execute(
        "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
        ("bob", None::<String>, 25),
    )
    .await?;
    conn.commit().await?;

    let mut cursor = conn
        .execute("SELECT id, name, email FROM users WHERE age > ?", 30)
        .await?;
    assert_eq!(cursor.columns(), ["id", "name", "email"]);
    let row = cursor.fetch_one()?.expect("one matching row");
    assert_eq!(row.get::<String>("name")?, "ada");
    assert_eq!(row.get_value("email")?, &Value::String("ada@example.com".into()));
    assert!(cursor.fetch_one()?.is_none());

    let users: Vec<User> = conn
        .execute("SELECT * FROM users ORDER BY name", ())
        .await?
        .fetch_all_as()?;
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].email, None);
    assert_eq!(users[1].age, Some(25));

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_fetch_many_in_batches() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    let names: Vec<(String,)> = (0..7).map(|i| (format!("user{}", i),)).collect();
    conn.execute_many("INSERT INTO users (name) VALUES (?)", names)
        .await?;

    let mut cursor = conn.execute("SELECT name FROM users ORDER BY id", ()).await?;
    assert_eq!(cursor.fetch_many(3)?.len(), 3);
    assert_eq!(cursor.fetch_many(3)?.len(), 3);
    let last = cursor.fetch_many(3)?;
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].get::<String>("name")?, "user6");
    Ok(())
}

#[tokio::test]
async fn test_execute_many_counts_every_row() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;

    let cursor = conn
        .execute_many(
            "INSERT INTO users (name, age) VALUES (?, ?)",
            vec![("a", 1), ("b", 2), ("c", 3)],
        )
        .await?;
    assert_eq!(cursor.rows_affected(), 3);
    assert_eq!(cursor.last_insert_id(), Some(3));

    let updated = conn
        .execute("UPDATE users SET age = age + 1 WHERE age >= ?", 2)
        .await?;
    assert_eq!(updated.rows_affected(), 2);
    conn.commit().await?;

    assert_eq!(count_users(&db.params).await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_query_helpers() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    Query::new("INSERT INTO users (name, age) VALUES (?, ?)")
        .bind("grace")
        .bind(45)
        .execute(&mut conn)
        .await?;

    let found: Option<User> = Query::new("SELECT * FROM users WHERE name = ?")
        .bind("grace")
        .fetch_optional(&mut conn)
        .await?;
    assert_eq!(found.map(|u| u.age), Some(Some(45)));

    let missing: Option<User> = Query::new("SELECT * FROM users WHERE name = ?")
        .bind("nobody")
        .fetch_optional(&mut conn)
        .await?;
    assert!(missing.is_none());

    let max_age: i64 = Query::new("SELECT MAX(age) FROM users")
        .fetch_scalar(&mut conn)
        .await?;
    assert_eq!(max_age, 45);
    Ok(())
}

#[tokio::test]
async fn test_temporal_values_round_trip() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    let created = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_milli_opt(12, 30, 5, 125))
        .expect("valid timestamp");

    conn.execute(
        "INSERT INTO users (name, created_at) VALUES (?, ?)",
        ("ts", created),
    )
    .await?;
    let mut cursor = conn
        .execute("SELECT created_at FROM users WHERE name = ?", "ts")
        .await?;
    let row = cursor.fetch_one()?.expect("row");
    assert_eq!(row.get::<NaiveDateTime>("created_at")?, created);
    assert_eq!(row.get::<NaiveDate>("created_at")?, created.date());
    Ok(())
}

// ============ Errors ============

#[tokio::test]
async fn test_constraint_violation_keeps_driver_message() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    conn.execute("INSERT INTO users (name) VALUES (?)", "dup").await?;

    let err = conn
        .execute("INSERT INTO users (name) VALUES (?)", "dup")
        .await
        .unwrap_err();
    match err {
        Error::Execution(msg) => assert!(msg.contains("UNIQUE constraint failed"), "{}", msg),
        other => panic!("expected execution error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_malformed_sql() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    let err = conn.execute("SELEC nonsense", ()).await.unwrap_err();
    assert!(matches!(err, Error::Execution(msg) if msg.contains("syntax error")));
    Ok(())
}

#[tokio::test]
async fn test_closed_connection_and_cursor() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    conn.ping().await?;
    conn.execute("INSERT INTO users (name) VALUES (?)", "x").await?;
    let mut cursor = conn.execute("SELECT * FROM users", ()).await?;

    conn.close().await?;
    conn.close().await?;

    assert!(conn.is_closed());
    assert!(matches!(cursor.fetch_all(), Err(Error::ConnectionClosed)));
    assert!(matches!(
        conn.execute("SELECT 1", ()).await,
        Err(Error::ConnectionClosed)
    ));
    assert!(matches!(conn.ping().await, Err(Error::ConnectionClosed)));
    Ok(())
}

#[tokio::test]
async fn test_open_failure_is_connection_error() {
    let params = llamadb::ConnectionParams::sqlite("/nonexistent-dir/deeper/app.db");
    let err = Connection::open(params).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

// ============ Transactions ============

#[tokio::test]
async fn test_rollback_discards_uncommitted_work() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;

    conn.execute("INSERT INTO users (name) VALUES (?)", "kept").await?;
    conn.commit().await?;
    conn.execute("INSERT INTO users (name) VALUES (?)", "dropped").await?;
    assert!(conn.in_transaction());
    assert_eq!(count_users(&db.params).await?, 1);

    conn.rollback().await?;
    assert!(!conn.in_transaction());
    assert_eq!(count_users(&db.params).await?, 1);

    // no-ops without an active transaction
    conn.commit().await?;
    conn.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn test_autocommit_persists_each_statement() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone().with_autocommit(true)).await?;

    conn.execute("INSERT INTO users (name) VALUES (?)", "auto").await?;
    assert!(!conn.in_transaction());
    assert_eq!(count_users(&db.params).await?, 1);

    conn.begin().await?;
    conn.execute("INSERT INTO users (name) VALUES (?)", "explicit").await?;
    conn.rollback().await?;
    assert_eq!(count_users(&db.params).await?, 1);
    Ok(())
}

// ============ Query Builder ============

#[tokio::test]
async fn test_builder_statements_execute() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;

    let insert = conn
        .query_builder()
        .insert("users")
        .columns(["name", "email", "age"])
        .values(("ada", "ada@example.com", 36))
        .values(("bob", "bob@example.com", 25))
        .values(("cyd", "cyd@example.com", 41))
        .build()?;
    assert_eq!(conn.execute_query(&insert).await?.rows_affected(), 3);

    let select = conn
        .query_builder()
        .select(["name", "age"])
        .from_table("users")
        .where_clause("age > ?", 30)
        .order_by_desc("age")
        .limit(10)
        .build()?;
    assert_eq!(
        select.sql(),
        "SELECT name, age FROM users WHERE age > ? ORDER BY age DESC LIMIT 10"
    );
    let names: Vec<String> = conn
        .execute_query(&select)
        .await?
        .fetch_all()?
        .iter()
        .map(|row| row.get("name"))
        .collect::<llamadb::Result<_>>()?;
    assert_eq!(names, ["cyd", "ada"]);

    let update = conn
        .query_builder()
        .update("users")
        .set("email", Value::Null)
        .where_in("name", ["ada", "bob"])
        .build()?;
    assert_eq!(conn.execute_query(&update).await?.rows_affected(), 2);

    let delete = conn
        .query_builder()
        .delete("users")
        .where_clause("email IS NULL", ())
        .build()?;
    assert_eq!(conn.execute_query(&delete).await?.rows_affected(), 2);
    conn.commit().await?;

    let remaining: Vec<User> = conn
        .execute("SELECT * FROM users", ())
        .await?
        .fetch_all_as()?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "cyd");
    Ok(())
}

#[tokio::test]
async fn test_builder_grouping_and_paging() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    let rows: Vec<(String, i64)> = (0..10).map(|i| (format!("u{}", i), i % 3)).collect();
    conn.execute_many("INSERT INTO users (name, age) VALUES (?, ?)", rows)
        .await?;

    let grouped = conn
        .query_builder()
        .select(["age", "COUNT(*) AS n"])
        .from_table("users")
        .group_by("age")
        .having("COUNT(*) > ?", 3)
        .build()?;
    let mut cursor = conn.execute_query(&grouped).await?;
    let row = cursor.fetch_one()?.expect("one group");
    assert_eq!(row.get::<i64>("age")?, 0);
    assert_eq!(row.get::<i64>("n")?, 4);
    assert!(cursor.fetch_one()?.is_none());

    let page = conn
        .query_builder()
        .select("name")
        .from_table("users")
        .order_by("id")
        .offset(8)
        .build()?;
    let names = conn.execute_query(&page).await?.fetch_all()?;
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].get::<String>("name")?, "u8");
    Ok(())
}

#[tokio::test]
async fn test_builder_aliased_left_join() -> anyhow::Result<()> {
    let db = temp_db().await?;
    let mut conn = Connection::open(db.params.clone()).await?;
    conn.execute(
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            amount REAL NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )",
        (),
    )
    .await?;
    conn.execute_many(
        "INSERT INTO users (name, age) VALUES (?, ?)",
        vec![("ada", 36), ("bob", 25), ("cyd", 41)],
    )
    .await?;
    conn.execute_many(
        "INSERT INTO orders (user_id, amount, status) VALUES (?, ?, ?)",
        vec![
            (1, 10.5, "paid"),
            (1, 4.5, "pending"),
            (3, 99.0, "paid"),
        ],
    )
    .await?;

    let query = conn
        .query_builder()
        .select([
            "u.id",
            "u.name",
            "COUNT(o.id) as order_count",
            "SUM(o.amount) as total_spent",
        ])
        .from_table("users u")
        .left_join("orders o", "u.id = o.user_id")
        .group_by(["u.id", "u.name"])
        .having("COUNT(o.id) > ?", 0)
        .order_by_desc("total_spent")
        .build()?;
    let spenders: Vec<(i64, String, i64, f64)> =
        conn.execute_query(&query).await?.fetch_all_as()?;
    assert_eq!(
        spenders,
        vec![(3, "cyd".to_string(), 1, 99.0), (1, "ada".to_string(), 2, 15.0)]
    );
    Ok(())
}

#[tokio::test]
async fn test_builder_misuse_never_reaches_database()-> anyhow::Result<()> {
    let db = temp_db().await?;
    let conn = Connection::open(db.params.clone()).await?;
    let err = conn
        .query_builder()
        .insert("users")
        .columns(["name", "age"])
        .values(("only-name",))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::BuildValidation(_)));
    assert_eq!(count_users(&db.params).await?, 0);
    Ok(())
}
