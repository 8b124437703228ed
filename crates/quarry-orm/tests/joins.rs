//! Joined queries: aliased select lists, per-alias transforms, and
//! per-table write dispatch over a join.

mod common;

use common::{entry, memory_pool};
use quarry_core::{Arg, ColumnType, Cond, PropDef, TableSchema};
use quarry_orm::{CreateOptions, Db, SelectExpr, SetSpec, Table};

fn deck_table() -> Table {
    Table::new(
        TableSchema::builder("deck")
            .primary_auto("id")
            .prop("name", PropDef::new(ColumnType::Text).unique("deck_name_unique"))
            .build()
            .expect("deck schema"),
    )
}

fn card_table() -> Table {
    Table::new(
        TableSchema::builder("card")
            .primary_auto("id")
            .prop("front", PropDef::new(ColumnType::Text))
            .prop(
                "deckId",
                PropDef::new(ColumnType::Integer).references("deck(id)"),
            )
            .prop("tags", PropDef::new(ColumnType::StringArray).nullable())
            .build()
            .expect("card schema"),
    )
}

async fn fixture() -> (Db, Table, Table) {
    let pool = memory_pool().await;
    let deck = deck_table();
    let card = card_table();
    let db = Db::new(pool);
    db.init(&[&deck, &card]).await.expect("init");

    let opts = CreateOptions::default();
    let zhongwen = deck
        .create(
            db.pool(),
            entry(&[("name", Arg::Text(String::from("zhongwen")))]),
            &opts,
        )
        .await
        .expect("deck 1");
    let latin = deck
        .create(
            db.pool(),
            entry(&[("name", Arg::Text(String::from("latin")))]),
            &opts,
        )
        .await
        .expect("deck 2");

    card.create(
        db.pool(),
        entry(&[
            ("front", Arg::Text(String::from("你好"))),
            ("deckId", Arg::Int(zhongwen)),
            ("tags", Arg::StrArray(vec![String::from("hanzi")])),
        ]),
        &opts,
    )
    .await
    .expect("card 1");
    card.create(
        db.pool(),
        entry(&[
            ("front", Arg::Text(String::from("Lorem ipsum"))),
            ("deckId", Arg::Int(latin)),
        ]),
        &opts,
    )
    .await
    .expect("card 2");

    (db, deck, card)
}

#[tokio::test]
async fn test_join_select_all_aliases_every_column() {
    let (db, deck, card) = fixture().await;
    let rows = db
        .query(&card)
        .inner_join(&deck, card.col("deckId"), deck.col("id"))
        .filter(Cond::eq("deck__name", "zhongwen"))
        .all()
        .await
        .expect("join");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("card__front"),
        Some(&Arg::Text(String::from("你好")))
    );
    assert_eq!(
        rows[0].get("deck__name"),
        Some(&Arg::Text(String::from("zhongwen")))
    );
    // the joined table's get-transform still applies under the alias
    assert_eq!(
        rows[0].get("card__tags"),
        Some(&Arg::StrArray(vec![String::from("hanzi")]))
    );
}

#[tokio::test]
async fn test_join_explicit_select_and_raw_expr() {
    let (db, deck, card) = fixture().await;
    let rows = db
        .query(&card)
        .inner_join(&deck, card.col("deckId"), deck.col("id"))
        .select_col(card.col("front"))
        .select("deckUpper", SelectExpr::Raw(String::from("UPPER(deck.name)")))
        .sort("card__front", false)
        .all()
        .await
        .expect("join");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("deckUpper"),
        Some(&Arg::Text(String::from("LATIN")))
    );
    assert_eq!(
        rows[1].get("deckUpper"),
        Some(&Arg::Text(String::from("ZHONGWEN")))
    );
}

#[tokio::test]
async fn test_str_array_alias_containment_over_join() {
    let (db, deck, card) = fixture().await;
    let rows = db
        .query(&card)
        .inner_join(&deck, card.col("deckId"), deck.col("id"))
        .filter(Cond::eq("card__tags", "hanzi"))
        .all()
        .await
        .expect("join");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("deck__name"),
        Some(&Arg::Text(String::from("zhongwen")))
    );
}

#[tokio::test]
async fn test_per_table_update_over_join() {
    let (db, deck, card) = fixture().await;
    let mut sets = std::collections::HashMap::new();
    sets.insert(
        String::from("card"),
        entry(&[("front", Arg::Text(String::from("妳好")))]),
    );
    sets.insert(
        String::from("deck"),
        entry(&[("name", Arg::Text(String::from("hanyu")))]),
    );

    let changed = db
        .query(&card)
        .inner_join(&deck, card.col("deckId"), deck.col("id"))
        .filter(Cond::eq("deck__name", "zhongwen"))
        .update(&SetSpec::PerTable(sets))
        .await
        .expect("update");
    assert_eq!(changed, 2);

    let rows = db
        .query(&card)
        .inner_join(&deck, card.col("deckId"), deck.col("id"))
        .filter(Cond::eq("deck__name", "hanyu"))
        .all()
        .await
        .expect("refind");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("card__front"),
        Some(&Arg::Text(String::from("妳好")))
    );
}

#[tokio::test]
async fn test_delete_over_join_touches_both_tables() {
    let (db, deck, card) = fixture().await;
    let removed = db
        .query(&card)
        .inner_join(&deck, card.col("deckId"), deck.col("id"))
        .filter(Cond::eq("deck__name", "latin"))
        .delete()
        .await
        .expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(db.query(&card).count().await.expect("cards"), 1);
    assert_eq!(db.query(&deck).count().await.expect("decks"), 1);
}
