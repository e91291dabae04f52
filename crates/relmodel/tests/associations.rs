//! Upsert-on-create of related records, association mode, join tables and
//! table handles.

mod common;

use common::{Address, Product, User, Wallet, count_rows, open, seed_users, user};
use relmodel::prelude::*;

fn product(id: &str, name: &str, price: i64) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        price,
        ..Default::default()
    }
}

fn address(text: &str) -> Address {
    Address {
        address: text.to_string(),
        ..Default::default()
    }
}

// ============================================================================
// Upsert on create
// ============================================================================

#[test]
fn create_with_has_one_and_has_many() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.wallet = Some(Wallet {
        id: "w1".into(),
        balance: 1_000_000,
        ..Default::default()
    });
    u.addresses = vec![address("Jalan Belum Ada"), address("Jalan Lagi Dibangun")];
    db.create(&mut u).unwrap();

    let wallet = db.get::<Wallet>("w1").unwrap().unwrap();
    assert_eq!(wallet.user_id, "1", "child foreign key set to the owner key");
    let addresses: Vec<Address> = db.model::<Address>().order("id").find().unwrap();
    assert_eq!(addresses.len(), 2);
    assert!(addresses.iter().all(|a| a.user_id == "1"));

    assert!(u.addresses.iter().all(|a| a.id > 0), "generated keys written back");
    assert_eq!(u.wallet.as_ref().map(|w| w.user_id.as_str()), Some("1"));
}

#[test]
fn create_with_belongs_to_creates_parent_first() {
    let db = open();
    let mut a = Address {
        address: "Jalan Baru".into(),
        user: Some(Box::new(user("50", "Parent", "First"))),
        ..Default::default()
    };
    db.create(&mut a).unwrap();
    assert_eq!(a.user_id, "50");
    assert!(db.get::<User>("50").unwrap().is_some());
}

#[test]
fn create_with_many_to_many_writes_join_rows() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.like_products = vec![product("P001", "Contoh Product", 100_000), product("P002", "Lain", 5)];
    db.create(&mut u).unwrap();

    assert_eq!(count_rows(&db, "products"), 2);
    let pairs = db.join_table::<User>("like_products").unwrap().pairs().unwrap();
    assert_eq!(
        pairs,
        vec![
            (Value::from("1"), Value::from("P001")),
            (Value::from("1"), Value::from("P002")),
        ]
    );
}

#[test]
fn existing_related_rows_are_left_untouched() {
    let db = open();
    db.create(&mut product("P001", "Original", 10)).unwrap();

    let mut u = user("1", "Eko", "Khannedy");
    u.like_products = vec![product("P001", "Overwritten?", 99)];
    db.create(&mut u).unwrap();

    let p = db.get::<Product>("P001").unwrap().unwrap();
    assert_eq!(p.name, "Original");
    assert_eq!(p.price, 10);
    assert_eq!(db.join_table::<User>("like_products").unwrap().pairs().unwrap().len(), 1);
}

#[test]
fn overwrite_associations_updates_related_rows() {
    let db = open();
    db.create(&mut product("P001", "Original", 10)).unwrap();

    let mut u = user("1", "Eko", "Khannedy");
    u.like_products = vec![product("P001", "Overwritten", 99)];
    db.create_with(&mut u, &CreateOptions::new().overwrite_associations())
        .unwrap();

    let p = db.get::<Product>("P001").unwrap().unwrap();
    assert_eq!(p.name, "Overwritten");
    assert_eq!(p.price, 99);
}

#[test]
fn skip_associations_writes_owner_only() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.addresses = vec![address("ignored")];
    db.create_with(&mut u, &CreateOptions::new().skip_associations())
        .unwrap();
    assert_eq!(count_rows(&db, "users"), 1);
    assert_eq!(count_rows(&db, "addresses"), 0);
}

#[test]
fn save_existing_owner_upserts_new_children() {
    let db = open();
    let mut users = seed_users(&db, 1);
    let owner = &mut users[0];
    owner.addresses = vec![address("Jalan Save")];
    db.save(owner).unwrap();
    assert_eq!(count_rows(&db, "addresses"), 1);
    assert!(owner.addresses[0].id > 0);
}

// ============================================================================
// Eager joins
// ============================================================================

#[test]
fn joins_attach_single_relations() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.wallet = Some(Wallet {
        id: "w1".into(),
        balance: 500,
        ..Default::default()
    });
    db.create(&mut u).unwrap();
    db.create(&mut user("2", "Budi", "Nugraha")).unwrap();

    let users: Vec<User> = db.model::<User>().joins("wallet").order("users.id").find().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].wallet.as_ref().map(|w| w.balance), Some(500));
    assert!(users[1].wallet.is_none(), "all-NULL joined keys yield no relation");

    let rich: Vec<User> = db
        .model::<User>()
        .joins("wallet")
        .filter(("wallet.balance > ?", params![100]))
        .find()
        .unwrap();
    assert_eq!(rich.len(), 1);
    assert_eq!(rich[0].id, "1");
}

#[test]
fn nested_joins_follow_belongs_to() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.wallet = Some(Wallet {
        id: "w1".into(),
        balance: 7,
        ..Default::default()
    });
    db.create(&mut u).unwrap();
    db.create(&mut Address {
        user_id: "1".into(),
        address: "Jalan".into(),
        ..Default::default()
    })
    .unwrap();

    let addresses: Vec<Address> = db.model::<Address>().joins("user.wallet").find().unwrap();
    let owner = addresses[0].user.as_ref().expect("joined user");
    assert_eq!(owner.name.first_name, "Eko");
    assert_eq!(owner.wallet.as_ref().map(|w| w.balance), Some(7));
}

#[test]
fn joins_reject_collections() {
    let db = open();
    let err = db.model::<User>().joins("addresses").find().unwrap_err();
    assert!(matches!(err, Error::Query(_)));
}

#[test]
fn raw_join_filters_rows() {
    let db = open();
    seed_users(&db, 2);
    db.create(&mut Wallet {
        id: "w1".into(),
        user_id: "2".into(),
        balance: 10,
        ..Default::default()
    })
    .unwrap();
    let users: Vec<User> = db
        .model::<User>()
        .select(["users.*"])
        .join_raw("INNER JOIN wallets ON wallets.user_id = users.id AND wallets.balance > ?", params![5])
        .find()
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "2");
}

// ============================================================================
// Association mode
// ============================================================================

#[test]
fn association_find_and_count() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.addresses = vec![address("A"), address("B"), address("C")];
    db.create(&mut u).unwrap();

    let assoc = db.association(&u, "addresses").unwrap();
    assert_eq!(assoc.count().unwrap(), 3);
    let found: Vec<Address> = assoc.find().unwrap();
    assert_eq!(found.len(), 3);

    let filtered = db
        .association(&u, "addresses")
        .unwrap()
        .filter(("address <> ?", params!["B"]));
    assert_eq!(filtered.count().unwrap(), 2);
}

#[test]
fn association_rejects_wrong_target_type() {
    let db = open();
    let users = seed_users(&db, 1);
    let assoc = db.association(&users[0], "addresses").unwrap();
    assert!(assoc.find::<Wallet>().is_err());
}

#[test]
fn association_of_unknown_relation_fails() {
    let db = open();
    let users = seed_users(&db, 1);
    let err = db.association(&users[0], "friends").unwrap_err();
    assert!(matches!(err, Error::UnknownRelation { .. }));
}

#[test]
fn association_append_and_replace_has_many() {
    let db = open();
    let users = seed_users(&db, 1);
    let mut assoc = db.association(&users[0], "addresses").unwrap();

    let mut first = vec![address("A"), address("B")];
    assoc.append(&mut first).unwrap();
    assert_eq!(assoc.count().unwrap(), 2);
    assert!(first.iter().all(|a| a.id > 0 && a.user_id == "1"));

    let mut replacement = vec![address("C")];
    assoc.replace(&mut replacement).unwrap();
    assert_eq!(assoc.count().unwrap(), 1);
    assert_eq!(count_rows(&db, "addresses"), 3, "unlinked rows stay with a NULL key");

    let unlinked = db
        .raw("SELECT COUNT(*) AS n FROM addresses WHERE user_id IS NULL", Vec::new())
        .rows()
        .unwrap();
    assert_eq!(unlinked[0].get("n"), Some(&Value::from(2_i64)));
}

#[test]
fn association_delete_and_clear_many_to_many() {
    let db = open();
    let mut u = user("1", "Eko", "Khannedy");
    u.like_products = vec![product("P1", "One", 1), product("P2", "Two", 2), product("P3", "Three", 3)];
    db.create(&mut u).unwrap();

    let mut assoc = db.association(&u, "like_products").unwrap();
    assert_eq!(assoc.count().unwrap(), 3);
    assert_eq!(assoc.delete(&[product("P2", "", 0)]).unwrap(), 1);
    assert_eq!(assoc.count().unwrap(), 2);
    assert_eq!(count_rows(&db, "products"), 3, "targets are not deleted");

    assert_eq!(assoc.clear().unwrap(), 2);
    assert_eq!(assoc.count().unwrap(), 0);
}

#[test]
fn association_append_many_to_many_creates_missing_targets() {
    let db = open();
    let users = seed_users(&db, 1);
    db.create(&mut product("P1", "Existing", 1)).unwrap();
    let mut assoc = db.association(&users[0], "like_products").unwrap();
    assoc
        .append(&mut [product("P1", "ignored", 0), product("P9", "New", 9)])
        .unwrap();
    assert_eq!(assoc.count().unwrap(), 2);
    assert_eq!(db.get::<Product>("P1").unwrap().unwrap().name, "Existing");
    assert!(db.get::<Product>("P9").unwrap().is_some());
}

#[test]
fn association_replace_belongs_to_sets_owner_key() {
    let db = open();
    seed_users(&db, 2);
    let mut wallet = Wallet {
        id: "w1".into(),
        user_id: "1".into(),
        ..Default::default()
    };
    db.create(&mut wallet).unwrap();

    let mut assoc = db.association(&wallet, "user").unwrap();
    let mut new_owner = [db.get::<User>("2").unwrap().unwrap()];
    assoc.replace(&mut new_owner).unwrap();
    assert_eq!(db.get::<Wallet>("w1").unwrap().unwrap().user_id, "2");

    assert_eq!(wallet.user_id, "1", "caller's copy untouched until applied");
    assoc.apply_to_owner(&mut wallet).unwrap();
    assert_eq!(wallet.user_id, "2");
    assert_eq!(wallet.id, "w1");

    let mut stranger = user("3", "Not", "Owner");
    assert!(matches!(assoc.apply_to_owner(&mut stranger), Err(Error::Query(_))));
}

#[test]
fn repeated_association_loads_are_counted() {
    let db = open();
    let users = seed_users(&db, 4);
    for u in &users {
        db.association(u, "addresses").unwrap().find::<Address>().unwrap();
    }
    let tracker = db.tracker();
    assert_eq!(tracker.load_count("User", "addresses"), 4);
    assert_eq!(tracker.stats().repeated, 1);

    // The snapshot does not hold the tracker while the database keeps working.
    db.association(&users[0], "addresses").unwrap().find::<Address>().unwrap();
    assert_eq!(tracker.load_count("User", "addresses"), 4);
    assert_eq!(db.tracker().load_count("User", "addresses"), 5);
    assert!(db.tracker().call_sites().len() <= 5);

    db.reset_tracker();
    assert_eq!(db.tracker().stats().total_loads, 0);
}

// ============================================================================
// Join tables and table handles
// ============================================================================

#[test]
fn join_table_add_remove_clear() {
    let db = open();
    seed_users(&db, 2);
    db.create(&mut product("P1", "One", 1)).unwrap();
    db.create(&mut product("P2", "Two", 2)).unwrap();

    let likes = db.join_table::<Product>("liked_by_users").unwrap();
    assert_eq!(likes.name(), "user_like_product");
    assert_eq!(likes.add("P1", "1").unwrap(), 1);
    assert_eq!(likes.add("P1", "1").unwrap(), 0, "duplicates are ignored");
    likes.add("P1", "2").unwrap();
    likes.add("P2", "1").unwrap();
    assert_eq!(likes.pairs().unwrap().len(), 3);

    assert_eq!(likes.remove("P1", "2").unwrap(), 1);
    assert_eq!(likes.clear("P1").unwrap(), 1);
    assert_eq!(
        likes.pairs().unwrap(),
        vec![(Value::from("P2"), Value::from("1"))]
    );

    let u: User = db
        .model::<User>()
        .preload("like_products")
        .filter(("id = ?", params!["1"]))
        .take()
        .unwrap();
    assert_eq!(u.like_products.len(), 1);
    assert_eq!(u.like_products[0].id, "P2");
}

#[test]
fn join_table_requires_many_to_many() {
    let db = open();
    let err = db.join_table::<User>("addresses").unwrap_err();
    assert!(matches!(err, Error::Query(_)));
}

#[test]
fn table_handle_reads_and_writes_maps() {
    let db = open();
    seed_users(&db, 1);
    db.create(&mut product("P1", "One", 1)).unwrap();

    let table = db.table("user_like_product").unwrap();
    table
        .insert(row! { "user_id" => "1", "product_id" => "P1" })
        .unwrap();
    assert_eq!(table.count(row! { "user_id" => "1" }).unwrap(), 1);
    let rows = table.rows(row! { "product_id" => "P1" }).unwrap();
    assert_eq!(rows[0].get("user_id"), Some(&Value::from("1")));

    assert!(matches!(
        table.delete(Row::new()).unwrap_err(),
        Error::MissingWhereClause(_)
    ));
    assert_eq!(table.delete(row! { "user_id" => "1" }).unwrap(), 1);

    assert!(db.table("bad name; DROP TABLE users").is_err());
}
