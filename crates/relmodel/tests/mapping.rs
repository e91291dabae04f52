//! Column values that do not fit their fields reach the caller as errors.

mod common;

use common::{User, Wallet, open, seed_users};
use relmodel::prelude::*;

fn seed_wallet(db: &Database<SqliteConnection>) -> User {
    let users = seed_users(db, 1);
    db.create(&mut Wallet {
        id: "w1".into(),
        user_id: "1".into(),
        balance: 10,
        ..Default::default()
    })
    .unwrap();
    users.into_iter().next().unwrap()
}

fn is_mapping(err: &Error) -> bool {
    matches!(err.root(), Error::Mapping(_))
}

#[test]
fn wrong_type_in_column_is_reported() {
    let db = open();
    seed_wallet(&db);
    db.exec("UPDATE wallets SET balance = 'abc' WHERE id = ?", params!["w1"])
        .unwrap();

    let err = db.get::<Wallet>("w1").unwrap_err();
    assert!(is_mapping(&err), "got {err:?}");

    let err = db.model::<Wallet>().find().unwrap_err();
    assert!(is_mapping(&err), "got {err:?}");

    let err = db.model::<User>().preload("wallet").find().unwrap_err();
    assert!(is_mapping(&err), "preloaded rows too, got {err:?}");
}

#[test]
fn null_in_required_column_is_reported() {
    let db = open();
    let owner = seed_wallet(&db);
    assert_eq!(db.association(&owner, "wallet").unwrap().clear().unwrap(), 1);

    let err = db.get::<Wallet>("w1").unwrap_err();
    assert!(is_mapping(&err), "got {err:?}");

    let rows = db
        .raw("SELECT user_id FROM wallets WHERE id = ?", params!["w1"])
        .rows()
        .unwrap();
    assert_eq!(rows[0].get("user_id"), Some(&Value::Null));
}
