//! Write-path behavior: transform round trips through storage, the
//! find-then-write chains, conflict suppression, and statement events.

mod common;

use std::sync::{Arc, Mutex};

use common::{card_table, entry, ids, memory_pool, seed_cards, REVIEW_EARLY};
use quarry_core::{date_from_millis, Arg, Cond};
use quarry_orm::{CreateOptions, Db, SetSpec, SqlEvent};
use serde_json::json;

#[tokio::test]
async fn test_values_round_trip_through_storage() {
    let pool = memory_pool().await;
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;

    let row = db
        .query(&card)
        .filter(Cond::eq("_id", "c1"))
        .first()
        .await
        .expect("find")
        .expect("c1 present");

    assert_eq!(
        row.get("nextReview"),
        Some(&Arg::Date(date_from_millis(REVIEW_EARLY)))
    );
    assert_eq!(row.get("stat"), Some(&Arg::Json(json!({"streak": 3}))));
    assert_eq!(
        row.get("tags"),
        Some(&Arg::StrArray(vec![
            String::from("hanzi"),
            String::from("vocab")
        ]))
    );
}

#[tokio::test]
async fn test_empty_str_array_reads_back_empty() {
    let pool = memory_pool().await;
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;

    let row = db
        .query(&card)
        .filter(Cond::eq("_id", "c3"))
        .first()
        .await
        .expect("find")
        .expect("c3 present");
    assert_eq!(row.get("tags"), Some(&Arg::StrArray(Vec::new())));
    assert_eq!(row.get("nextReview"), Some(&Arg::Null));
}

#[tokio::test]
async fn test_count_first_each() {
    let pool = memory_pool().await;
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;

    assert_eq!(db.query(&card).count().await.expect("count"), 3);

    let first = db
        .query(&card)
        .sort("_id", true)
        .first()
        .await
        .expect("first")
        .expect("non-empty");
    assert_eq!(first.get("_id"), Some(&Arg::Text(String::from("c3"))));

    let mut seen = Vec::new();
    let visited = db
        .query(&card)
        .sort("_id", false)
        .each(|row| {
            if let Some(Arg::Text(id)) = row.get("_id") {
                seen.push(id.clone());
            }
        })
        .await
        .expect("each");
    assert_eq!(visited, 3);
    assert_eq!(seen, ["c1", "c2", "c3"]);
}

#[tokio::test]
async fn test_update_then_refind() {
    let pool = memory_pool().await;
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;

    let changed = db
        .query(&card)
        .filter(Cond::eq("tags", "hanzi"))
        .update(&SetSpec::All(entry(&[
            ("srsLevel", Arg::Int(2)),
            (
                "tags",
                Arg::StrArray(vec![String::from("hanzi"), String::from("learned")]),
            ),
        ])))
        .await
        .expect("update");
    assert_eq!(changed, 1);

    let rows = db
        .query(&card)
        .filter(Cond::eq("tags", "learned"))
        .all()
        .await
        .expect("refind");
    assert_eq!(ids(&rows), ["c1"]);
    assert_eq!(rows[0].get("srsLevel"), Some(&Arg::Int(2)));
}

#[tokio::test]
async fn test_delete_narrows_count() {
    let pool = memory_pool().await;
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;

    let removed = db
        .query(&card)
        .filter(Cond::exists("nextReview", false))
        .delete()
        .await
        .expect("delete");
    assert_eq!(removed, 1);
    assert_eq!(db.query(&card).count().await.expect("count"), 2);
}

#[tokio::test]
async fn test_ignore_errors_suppresses_conflicts() {
    let pool = memory_pool().await;
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;

    let duplicate = entry(&[
        ("_id", Arg::Text(String::from("c1"))),
        ("front", Arg::Text(String::from("clone"))),
    ]);

    let err = card
        .create(db.pool(), duplicate.clone(), &CreateOptions::default())
        .await;
    assert!(err.is_err(), "primary key conflict must propagate");

    card.create(
        db.pool(),
        duplicate,
        &CreateOptions {
            ignore_errors: true,
            ..CreateOptions::default()
        },
    )
    .await
    .expect("conflict suppressed");
    assert_eq!(db.query(&card).count().await.expect("count"), 3);
}

#[tokio::test]
async fn test_statement_events_fire_in_order() {
    let pool = memory_pool().await;
    let mut card = card_table();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&log);
    card.on_event(move |event| {
        let label = match event {
            SqlEvent::BuildSql { .. } => "build",
            SqlEvent::PreCreate { .. } => "pre-create",
            SqlEvent::CreateSql { .. } => "create-sql",
            SqlEvent::PreUpdate { .. } => "pre-update",
            SqlEvent::UpdateSql { .. } => "update-sql",
            SqlEvent::PreDelete { .. } => "pre-delete",
            SqlEvent::DeleteSql { .. } => "delete-sql",
            _ => "other",
        };
        sink.lock().unwrap().push(String::from(label));
    });

    let mut db = Db::new(pool);
    let find_log = Arc::clone(&log);
    db.on_event(move |event| {
        if let SqlEvent::FindSql { stmt, params } = event {
            assert!(
                !stmt.contains("Lorem"),
                "literal leaked into statement text: {stmt}"
            );
            assert!(params.iter().any(|(_, v)| matches!(
                v,
                quarry_core::SqlValue::Text(s) if s == "Lorem ipsum"
            )));
            find_log.lock().unwrap().push(String::from("find-sql"));
        }
    });

    db.init(&[&card]).await.expect("init");
    seed_cards(db.pool(), &card).await;
    db.query(&card)
        .filter(Cond::eq("front", "Lorem ipsum"))
        .all()
        .await
        .expect("find");

    let log = log.lock().unwrap();
    assert_eq!(log[0], "build");
    assert!(log.contains(&String::from("pre-create")));
    assert!(log.contains(&String::from("create-sql")));
    assert_eq!(log.last().map(String::as_str), Some("find-sql"));
    let pre = log.iter().position(|l| l == "pre-create").unwrap();
    let sql = log.iter().position(|l| l == "create-sql").unwrap();
    assert!(pre < sql);
}
