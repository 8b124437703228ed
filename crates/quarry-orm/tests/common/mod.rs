//! Shared fixtures: an in-memory pool and a flashcard table exercising
//! every extended column type.

use quarry_core::{date_from_millis, Arg, ColumnType, Entry, PropDef, TableSchema};
use quarry_orm::{CreateOptions, Table};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("in-memory pool")
}

pub fn card_table() -> Table {
    Table::new(
        TableSchema::builder("card")
            .primary("_id", ColumnType::Text)
            .prop("front", PropDef::new(ColumnType::Text))
            .prop("back", PropDef::new(ColumnType::Text).nullable())
            .prop("srsLevel", PropDef::new(ColumnType::Integer).nullable())
            .prop("nextReview", PropDef::new(ColumnType::Date).nullable())
            .prop("stat", PropDef::new(ColumnType::Json).nullable())
            .prop("tags", PropDef::new(ColumnType::StringArray).nullable())
            .build()
            .expect("card schema"),
    )
}

pub fn entry(pairs: &[(&str, Arg)]) -> Entry {
    pairs
        .iter()
        .map(|(k, v)| (String::from(*k), v.clone()))
        .collect()
}

/// Epoch milliseconds for the three fixture review dates.
pub const REVIEW_EARLY: i64 = 1_735_689_600_000;
pub const REVIEW_LATE: i64 = 1_738_368_000_000;

/// Seeds the canonical three-card fixture set.
pub async fn seed_cards(pool: &SqlitePool, card: &Table) {
    let opts = CreateOptions::default();
    card.create(
        pool,
        entry(&[
            ("_id", Arg::Text(String::from("c1"))),
            ("front", Arg::Text(String::from("Lorem ipsum"))),
            ("back", Arg::Text(String::from("dolor"))),
            ("srsLevel", Arg::Int(1)),
            ("nextReview", Arg::Date(date_from_millis(REVIEW_EARLY))),
            ("stat", Arg::Json(serde_json::json!({"streak": 3}))),
            (
                "tags",
                Arg::StrArray(vec![String::from("hanzi"), String::from("vocab")]),
            ),
        ]),
        &opts,
    )
    .await
    .expect("insert c1");

    card.create(
        pool,
        entry(&[
            ("_id", Arg::Text(String::from("c2"))),
            ("front", Arg::Text(String::from("dolor sit amet"))),
            ("srsLevel", Arg::Int(3)),
            ("nextReview", Arg::Date(date_from_millis(REVIEW_LATE))),
            ("tags", Arg::StrArray(vec![String::from("vocab")])),
        ]),
        &opts,
    )
    .await
    .expect("insert c2");

    card.create(
        pool,
        entry(&[
            ("_id", Arg::Text(String::from("c3"))),
            ("front", Arg::Text(String::from("consectetur"))),
            ("tags", Arg::StrArray(Vec::new())),
        ]),
        &opts,
    )
    .await
    .expect("insert c3");
}

/// Collects `_id` values from a result set, in result order.
pub fn ids(rows: &[Entry]) -> Vec<String> {
    rows.iter()
        .map(|row| match row.get("_id") {
            Some(Arg::Text(id)) => id.clone(),
            other => panic!("row without text _id: {other:?}"),
        })
        .collect()
}
