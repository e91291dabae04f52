//! Aggregates, grouping and projections into non-entity shapes.

mod common;

use common::{Wallet, open, seed_users};
use relmodel::prelude::*;

#[derive(FromRecord, Debug, PartialEq)]
struct Total {
    user_id: String,
    total: i64,
    wallets: i64,
}

#[derive(FromRecord, Debug, Default)]
struct Summary {
    n: i64,
    top: i64,
    bottom: i64,
}

fn seed_wallets(db: &Database<SqliteConnection>) {
    seed_users(db, 3);
    for (id, owner, balance) in [
        ("w1", "1", 100),
        ("w2", "1", 250),
        ("w3", "2", 40),
        ("w4", "3", 900),
        ("w5", "3", 1),
    ] {
        db.create(&mut Wallet {
            id: id.into(),
            user_id: owner.into(),
            balance,
            ..Default::default()
        })
        .unwrap();
    }
}

#[test]
fn group_with_having() {
    let db = open();
    seed_wallets(&db);

    let totals: Vec<Total> = db
        .model::<Wallet>()
        .select(["user_id", "SUM(balance) AS total", "COUNT(*) AS wallets"])
        .group("user_id")
        .having(("SUM(balance) > ?", params![100]))
        .order("user_id")
        .find_as()
        .unwrap();
    assert_eq!(
        totals,
        vec![
            Total {
                user_id: "1".into(),
                total: 350,
                wallets: 2
            },
            Total {
                user_id: "3".into(),
                total: 901,
                wallets: 2
            },
        ]
    );
}

#[test]
fn count_of_groups() {
    let db = open();
    seed_wallets(&db);
    let groups = db
        .model::<Wallet>()
        .select(["user_id"])
        .group("user_id")
        .count()
        .unwrap();
    assert_eq!(groups, 3);
}

#[test]
fn single_row_aggregate() {
    let db = open();
    seed_wallets(&db);
    let summary: Summary = db
        .model::<Wallet>()
        .select(["COUNT(*) AS n", "MAX(balance) AS top", "MIN(balance) AS bottom"])
        .filter(("user_id <> ?", params!["2"]))
        .take_as()
        .unwrap();
    assert_eq!(summary.n, 4);
    assert_eq!(summary.top, 900);
    assert_eq!(summary.bottom, 1);
}

#[test]
fn aggregate_over_joined_table() {
    let db = open();
    seed_wallets(&db);
    let rows = db
        .model::<Wallet>()
        .select(["users.first_name AS owner", "SUM(wallets.balance) AS total"])
        .join_raw("INNER JOIN users ON users.id = wallets.user_id", Vec::new())
        .group("users.first_name")
        .order("total desc")
        .rows()
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("owner"), Some(&Value::from("User 3")));
    assert_eq!(rows[0].get("total"), Some(&Value::from(901_i64)));
}

#[test]
fn raw_aggregate_scan() {
    let db = open();
    seed_wallets(&db);
    let summary: Summary = db
        .raw(
            "SELECT COUNT(*) AS n, MAX(balance) AS top, MIN(balance) AS bottom FROM wallets WHERE balance >= ?",
            params![100],
        )
        .scan_one()
        .unwrap();
    assert_eq!(summary.n, 3);
    assert_eq!(summary.top, 900);
    assert_eq!(summary.bottom, 100);
}
