//! Create, read, update and delete through the entity surface.

mod common;

use common::{Name, User, UserLog, count_rows, open, open_with, seed_users, user};
use relmodel::prelude::*;

#[derive(FromRecord, Debug, Default, PartialEq)]
struct UserName {
    id: String,
    first_name: String,
}

#[test]
fn create_then_get_round_trips_embedded_columns() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.name.middle_name = "Kurniawan".to_string();
    assert_eq!(db.create(&mut u).unwrap(), 1);
    assert!(u.created_at.timestamp() > 0, "creation time is written back");
    assert!(u.updated_at.timestamp() > 0);

    let found = db.get::<User>("1").unwrap().expect("user 1");
    assert_eq!(found.name, u.name);
    assert_eq!(found.password, "rahasia");
    assert_eq!(found.created_at.timestamp(), u.created_at.timestamp());
}

#[test]
fn get_missing_key_is_none() {
    let db = open();
    assert!(db.get::<User>("404").unwrap().is_none());
}

#[test]
fn ignored_field_is_not_persisted() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.information = "not stored".to_string();
    db.create(&mut u).unwrap();
    let found = db.get::<User>("1").unwrap().unwrap();
    assert!(found.information.is_empty());
}

#[test]
fn duplicate_create_is_a_unique_violation() {
    let db = open();
    db.create(&mut user("1", "Eko", "Khannedy")).unwrap();
    let err = db.create(&mut user("1", "Budi", "Nugraha")).unwrap_err();
    assert!(err.is_unique_violation(), "got {err:?}");
    assert_eq!(count_rows(&db, "users"), 1);
}

#[test]
fn save_with_zero_key_creates_and_populates_generated_id() {
    let db = open();
    let mut log = UserLog {
        user_id: "1".to_string(),
        action: "login".to_string(),
        ..Default::default()
    };
    db.save(&mut log).unwrap();
    assert!(log.id > 0);
    assert!(log.created_at > 1_000_000_000_000, "milliseconds since epoch");
    assert_eq!(log.created_at, log.updated_at);

    let mut second = UserLog {
        user_id: "1".to_string(),
        action: "logout".to_string(),
        ..Default::default()
    };
    db.save(&mut second).unwrap();
    assert!(second.id > log.id);
}

#[test]
fn save_with_existing_key_updates_without_duplicating() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    db.create(&mut u).unwrap();
    let created_at = u.created_at;

    u.password = "baru".to_string();
    u.name.first_name = "Eko Kurniawan".to_string();
    assert_eq!(db.save(&mut u).unwrap(), 1);
    assert_eq!(count_rows(&db, "users"), 1);

    let found = db.get::<User>("1").unwrap().unwrap();
    assert_eq!(found.password, "baru");
    assert_eq!(found.name.first_name, "Eko Kurniawan");
    assert_eq!(found.created_at.timestamp(), created_at.timestamp());
}

#[test]
fn save_does_not_blank_creation_time_when_unset() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    db.create(&mut u).unwrap();

    let mut detached = user("1", "Eko", "Updated");
    db.save(&mut detached).unwrap();
    let found = db.get::<User>("1").unwrap().unwrap();
    assert_eq!(found.created_at.timestamp(), u.created_at.timestamp());
    assert_eq!(found.name.last_name, "Updated");
}

#[test]
fn save_with_unknown_key_creates() {
    let db = open();
    let mut u = user("99", "Nobody", "Yet");
    db.save(&mut u).unwrap();
    assert_eq!(count_rows(&db, "users"), 1);
    assert!(db.get::<User>("99").unwrap().is_some());
}

#[test]
fn create_many_uses_one_insert_per_batch() {
    let db = open_with(common::builder().track_statements());
    db.reset_tracker();
    let mut users: Vec<User> = (1..=10)
        .map(|i| user(&format!("u{i}"), &format!("User {i}"), "Batch"))
        .collect();
    assert_eq!(db.create_many(&mut users).unwrap(), 10);
    assert_eq!(db.tracker().count_starting_with("INSERT"), 1);
    assert_eq!(count_rows(&db, "users"), 10);
    assert!(users.iter().all(|u| u.created_at.timestamp() > 0));
}

#[test]
fn create_many_writes_back_generated_keys() {
    let db = open();
    let mut logs: Vec<UserLog> = (0..3)
        .map(|i| UserLog {
            user_id: "1".to_string(),
            action: format!("action {i}"),
            ..Default::default()
        })
        .collect();
    db.create_many(&mut logs).unwrap();
    let mut ids: Vec<i64> = logs.iter().map(|l| l.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| *id > 0));
}

#[test]
fn first_last_take_and_count() {
    let db = open();
    seed_users(&db, 5);

    assert_eq!(db.model::<User>().first().unwrap().id, "1");
    assert_eq!(db.model::<User>().last().unwrap().id, "5");
    let taken = db
        .model::<User>()
        .filter(("first_name = ?", params!["User 3"]))
        .take()
        .unwrap();
    assert_eq!(taken.id, "3");
    assert_eq!(db.model::<User>().count().unwrap(), 5);

    let err = db
        .model::<User>()
        .filter(("id = ?", params!["missing"]))
        .first()
        .unwrap_err();
    assert!(matches!(err, Error::NotFound));
}

#[test]
fn order_limit_offset() {
    let db = open();
    seed_users(&db, 5);
    let page: Vec<User> = db
        .model::<User>()
        .order("id desc")
        .limit(2)
        .offset(1)
        .find()
        .unwrap();
    let ids: Vec<&str> = page.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, ["4", "3"]);
}

#[test]
fn select_into_projection() {
    let db = open();
    seed_users(&db, 2);
    let names: Vec<UserName> = db
        .model::<User>()
        .select(["id", "first_name"])
        .order("id")
        .find_as()
        .unwrap();
    assert_eq!(
        names,
        vec![
            UserName {
                id: "1".into(),
                first_name: "User 1".into()
            },
            UserName {
                id: "2".into(),
                first_name: "User 2".into()
            },
        ]
    );
}

#[test]
fn update_single_column_and_map() {
    let db = open();
    seed_users(&db, 3);

    let n = db
        .model::<User>()
        .filter(("id = ?", params!["1"]))
        .update("password", "diubah")
        .unwrap();
    assert_eq!(n, 1);

    let n = db
        .model::<User>()
        .filter(("id IN ?", params![Value::list(["2", "3"])]))
        .updates(row! { "middle_name" => "", "last_name" => "Map" })
        .unwrap();
    assert_eq!(n, 2);

    assert_eq!(db.get::<User>("1").unwrap().unwrap().password, "diubah");
    assert_eq!(db.get::<User>("3").unwrap().unwrap().name.last_name, "Map");
}

#[test]
fn updates_from_entity_skips_zero_fields() {
    let db = open();
    seed_users(&db, 1);
    let patch = User {
        id: "1".to_string(),
        name: Name {
            first_name: "Patched".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    assert_eq!(db.model::<User>().updates_from(&patch).unwrap(), 1);
    let found = db.get::<User>("1").unwrap().unwrap();
    assert_eq!(found.name.first_name, "Patched");
    assert_eq!(found.name.last_name, "Test", "zero fields are left alone");
    assert_eq!(found.password, "rahasia");
}

#[test]
fn update_skips_create_only_columns() {
    let db = open();
    seed_users(&db, 1);
    db.model::<User>()
        .filter(("id = ?", params!["1"]))
        .updates(row! { "id" => "changed", "password" => "p" })
        .unwrap();
    assert!(db.get::<User>("1").unwrap().is_some());
    assert!(db.get::<User>("changed").unwrap().is_none());
}

#[test]
fn update_unknown_column_is_rejected() {
    let db = open();
    seed_users(&db, 1);
    let err = db
        .model::<User>()
        .filter(("id = ?", params!["1"]))
        .update("nickname", "x")
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)));
}

#[test]
fn global_update_and_delete_need_opt_in() {
    let db = open();
    seed_users(&db, 3);

    let err = db.model::<User>().update("password", "x").unwrap_err();
    assert!(matches!(err, Error::MissingWhereClause(_)));
    let err = db.model::<User>().delete().unwrap_err();
    assert!(matches!(err, Error::MissingWhereClause(_)));

    assert_eq!(db.model::<User>().allow_global().update("password", "x").unwrap(), 3);
    assert_eq!(db.model::<User>().allow_global().delete().unwrap(), 3);
    assert_eq!(count_rows(&db, "users"), 0);
}

#[test]
fn delete_entity_by_key() {
    let db = open();
    let mut users = seed_users(&db, 2);
    assert_eq!(db.delete(&mut users[0]).unwrap(), 1);
    assert_eq!(count_rows(&db, "users"), 1);

    let err = db.delete(&mut User::default()).unwrap_err();
    assert!(matches!(err, Error::MissingWhereClause(_)));
}

#[test]
fn reload_refreshes_fields() {
    let db = open();
    let mut users = seed_users(&db, 1);
    db.model::<User>()
        .filter(("id = ?", params!["1"]))
        .update("password", "elsewhere")
        .unwrap();
    db.reload(&mut users[0]).unwrap();
    assert_eq!(users[0].password, "elsewhere");
}

#[test]
fn raw_scan_and_exec() {
    let db = open();
    seed_users(&db, 3);
    let n = db
        .exec("UPDATE users SET password = ? WHERE id IN ?", params!["raw", Value::list(["1", "2"])])
        .unwrap();
    assert_eq!(n, 2);

    let users: Vec<User> = db
        .raw("SELECT * FROM users WHERE password = ? ORDER BY id", params!["raw"])
        .scan()
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].id, "2");

    let one: UserName = db
        .raw("SELECT id, first_name FROM users WHERE id = ?", params!["3"])
        .scan_one()
        .unwrap();
    assert_eq!(one.first_name, "User 3");
}
