//! Builder Scenario Tests
//!
//! End-to-end behavior of the query builder against the in-memory store:
//! - Inserts, finds, counts and deletes
//! - Pattern, membership, null and range predicates
//! - Date part predicates
//! - Computed fields, paging and array mutations

use std::sync::Arc;

use bson::{doc, Bson, Document, Regex};
use chrono::{TimeZone, Utc};
use docbridge::{Connection, InMemoryStore, Row, SortDirection};

// =============================================================================
// Helper Functions
// =============================================================================

fn connection() -> Connection {
    Connection::new("docbridge_test", Arc::new(InMemoryStore::new()))
}

fn names(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|row| row.get_str("name").unwrap_or_default().to_string())
        .collect()
}

fn ages(db: &Connection, people: &[(&str, i32)]) {
    let documents: Vec<Document> = people
        .iter()
        .map(|(name, age)| doc! { "name": *name, "age": *age })
        .collect();
    db.collection("users").insert(documents).unwrap();
}

fn standard_ages(db: &Connection) {
    ages(
        db,
        &[("Jane Doe", 20), ("John Doe", 30), ("Mark Moe", 25), ("Larry Loe", 40)],
    );
}

fn birthday(year: i32, month: u32, day: u32, hour: u32) -> bson::DateTime {
    let at = Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap();
    bson::DateTime::from_chrono(at)
}

// =============================================================================
// Insert and Read Tests
// =============================================================================

#[test]
fn test_insert_then_count() {
    let db = connection();
    assert!(db
        .collection("users")
        .insert_one(doc! { "name": "John Doe" })
        .unwrap());
    assert_eq!(db.collection("users").count().unwrap(), 1);
}

#[test]
fn test_get_returns_documents() {
    let db = connection();
    assert!(db.collection("users").get().unwrap().is_empty());

    db.collection("users")
        .insert(vec![doc! { "name": "John Doe", "tags": ["tag1", "tag2"] }])
        .unwrap();

    let rows = db.collection("users").get().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("name"), Some("John Doe"));
    assert_eq!(
        rows[0].get("tags"),
        Some(&Bson::Array(vec!["tag1".into(), "tag2".into()]))
    );

    let none = db.collection("users").where_eq("foo", "bar").get().unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_insert_get_id_returns_object_id() {
    let db = connection();
    let id = db
        .collection("users")
        .insert_get_id(doc! { "name": "Jane Doe" })
        .unwrap();
    assert!(matches!(id, Bson::ObjectId(_)));
}

#[test]
fn test_batch_insert() {
    let db = connection();
    db.collection("users")
        .insert(vec![doc! { "name": "John Doe" }, doc! { "name": "Jane Doe" }])
        .unwrap();
    assert_eq!(db.collection("users").count().unwrap(), 2);
}

#[test]
fn test_where_equality() {
    let db = connection();
    ages(&db, &[("Jane Doe", 20), ("John Doe", 21), ("Mark Moe", 20)]);

    assert_eq!(db.collection("users").where_eq("age", 20).get().unwrap().len(), 2);
    assert_eq!(db.collection("users").select(["name"]).get().unwrap().len(), 3);
    assert!(db.collection("users").where_eq("age", 22).get().unwrap().is_empty());
}

#[test]
fn test_find_by_id() {
    let db = connection();
    let id = db
        .collection("users")
        .insert_get_id(doc! { "name": "John Doe" })
        .unwrap();

    let row = db.collection("users").find(id).unwrap().unwrap();
    assert_eq!(row.get_str("name"), Some("John Doe"));

    assert!(db.collection("users").find(Bson::Null).unwrap().is_none());
    assert!(db.collection("users").find("missing").unwrap().is_none());
}

#[test]
fn test_count_column_skips_nulls() {
    let db = connection();
    db.collection("users")
        .insert(vec![
            doc! { "name": "Jane Doe", "age": 20 },
            doc! { "name": "John Doe", "age": Bson::Null },
            doc! { "name": "Mark Moe", "age": 20 },
        ])
        .unwrap();

    assert_eq!(db.collection("users").count_column("age").unwrap(), 2);
    assert_eq!(db.collection("users").count().unwrap(), 3);
}

#[test]
fn test_first_in_insertion_order() {
    let db = connection();
    ages(&db, &[("Jane Doe", 20), ("John Doe", 21), ("Mark Moe", 20)]);

    let first = db.collection("users").first().unwrap().unwrap();
    assert_eq!(first.get_str("name"), Some("Jane Doe"));
    assert!(db.collection("users").where_eq("foo", "bar").first().unwrap().is_none());
}

#[test]
fn test_value_and_pluck() {
    let db = connection();
    standard_ages(&db);

    let age = db.collection("users").where_eq("name", "Mark Moe").value("age").unwrap();
    assert_eq!(age, Some(Bson::Int32(25)));

    let names = db
        .collection("users")
        .order_by("age", SortDirection::Asc)
        .pluck("name")
        .unwrap();
    assert_eq!(
        names,
        vec![
            Bson::from("Jane Doe"),
            Bson::from("Mark Moe"),
            Bson::from("John Doe"),
            Bson::from("Larry Loe"),
        ]
    );

    let older = db
        .collection("users")
        .where_op("age", ">", 25)
        .order_by_desc("age")
        .pluck("name")
        .unwrap();
    assert_eq!(older, vec![Bson::from("Larry Loe"), Bson::from("John Doe")]);

    let missing = db.collection("users").where_eq("name", "Nobody").value("age").unwrap();
    assert_eq!(missing, None);
}

#[test]
fn test_numeric_aggregates() {
    let db = connection();
    standard_ages(&db);
    let users = db.collection("users");

    assert_eq!(users.sum("age").unwrap(), Bson::Int32(115));
    assert_eq!(users.min("age").unwrap(), Bson::Int32(20));
    assert_eq!(users.max("age").unwrap(), Bson::Int32(40));
    assert_eq!(users.avg("age").unwrap(), Bson::Double(28.75));
    assert_eq!(users.clone().where_op("age", ">", 25).count().unwrap(), 2);
}

// =============================================================================
// Mutation Tests
// =============================================================================

#[test]
fn test_update_sets_plain_fields() {
    let db = connection();
    ages(&db, &[("Jane Doe", 20), ("John Doe", 21), ("Mark Moe", 20)]);

    let modified = db
        .collection("users")
        .where_eq("name", "Jane Doe")
        .update(doc! { "age": 21 })
        .unwrap();
    assert_eq!(modified, 1);

    let jane = db.collection("users").where_eq("name", "Jane Doe").first().unwrap().unwrap();
    assert_eq!(jane.get_i64("age"), Some(21));
    let mark = db.collection("users").where_eq("name", "Mark Moe").first().unwrap().unwrap();
    assert_eq!(mark.get_i64("age"), Some(20));
}

#[test]
fn test_update_rejects_mixed_document() {
    let db = connection();
    let err = db
        .collection("users")
        .update(doc! { "age": 1, "$inc": { "visits": 1 } })
        .unwrap_err();
    assert_eq!(err.code(), "DOCBRIDGE_INVALID_ARGUMENT");
}

#[test]
fn test_delete_sequence() {
    let db = connection();
    db.collection("users")
        .insert(vec![
            doc! { "name": "Jane Doe" },
            doc! { "name": "John Doe" },
            doc! { "name": "Mark Moe" },
            doc! { "name": "Larry Loe" },
        ])
        .unwrap();
    let users = db.collection("users");

    assert_eq!(users.clone().where_eq("name", "Foo Bar").delete(None).unwrap(), 0);
    assert_eq!(users.count().unwrap(), 4);

    assert_eq!(users.clone().where_eq("name", "John Doe").delete(None).unwrap(), 1);
    assert_eq!(users.count().unwrap(), 3);
    assert!(users.clone().where_eq("name", "John Doe").first().unwrap().is_none());

    let first = users.first().unwrap().unwrap();
    let id = first.id().cloned();
    assert_eq!(users.delete(id).unwrap(), 1);
    assert_eq!(users.count().unwrap(), 2);

    assert_eq!(users.delete(Some(Bson::from("abcd"))).unwrap(), 0);
    assert_eq!(users.count().unwrap(), 2);

    assert_eq!(users.delete(None).unwrap(), 2);
    assert_eq!(users.count().unwrap(), 0);
}

#[test]
fn test_truncate_drops_collection() {
    let db = connection();
    standard_ages(&db);

    db.collection("users").where_eq("age", 20).truncate().unwrap();
    assert_eq!(db.collection("users").count().unwrap(), 0);
}

#[test]
fn test_increment_and_decrement() {
    let db = connection();
    standard_ages(&db);

    let modified = db
        .collection("users")
        .where_eq("name", "Jane Doe")
        .increment("age", 5, doc! { "status": "older" })
        .unwrap();
    assert_eq!(modified, 1);

    let jane = db.collection("users").where_eq("name", "Jane Doe").first().unwrap().unwrap();
    assert_eq!(jane.get_i64("age"), Some(25));
    assert_eq!(jane.get_str("status"), Some("older"));

    db.collection("users").decrement("age", 1, Document::new()).unwrap();
    assert_eq!(db.collection("users").sum("age").unwrap(), Bson::Int32(116));
}

#[test]
fn test_push_and_pull() {
    let db = connection();
    db.collection("users")
        .insert(vec![doc! { "name": "John Doe", "tags": ["one"] }])
        .unwrap();
    let john = db.collection("users").where_eq("name", "John Doe");

    assert_eq!(john.push("tags", "two", false).unwrap(), 1);
    assert_eq!(john.push("tags", "two", true).unwrap(), 0);
    assert_eq!(john.push("tags", vec!["three", "four"], false).unwrap(), 1);

    let row = john.first().unwrap().unwrap();
    assert_eq!(row.get_array("tags").unwrap().len(), 4);

    assert_eq!(john.pull("tags", "one").unwrap(), 1);
    assert_eq!(john.pull("tags", vec!["three", "four"]).unwrap(), 1);

    let row = john.first().unwrap().unwrap();
    assert_eq!(row.get("tags"), Some(&Bson::Array(vec!["two".into()])));
}

// =============================================================================
// Pattern Predicate Tests
// =============================================================================

fn pattern_users(db: &Connection) {
    db.collection("users")
        .insert(vec![
            doc! { "name": "John Doe" },
            doc! { "name": "Jane Doe" },
            doc! { "name": "Robert Roe" },
        ])
        .unwrap();
}

#[test]
fn test_where_regex() {
    let db = connection();
    pattern_users(&db);
    let users = db.collection("users");

    let regex = Regex {
        pattern: ".*doe".to_string(),
        options: "i".to_string(),
    };
    assert_eq!(users.clone().where_regex("name", regex.clone()).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_op("name", "regexp", regex).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_op("name", "regexp", "/.*doe/i").get().unwrap().len(), 2);
    assert_eq!(users.clone().where_not_regex("name", "/.*doe/i").get().unwrap().len(), 1);
}

#[test]
fn test_where_like() {
    let db = connection();
    pattern_users(&db);
    let users = db.collection("users");

    assert_eq!(users.clone().where_like("name", "%doe%").get().unwrap().len(), 2);
    assert_eq!(users.clone().where_like("name", "%oe").get().unwrap().len(), 3);
    assert_eq!(users.clone().where_like("name", "j%").get().unwrap().len(), 2);
    assert_eq!(users.clone().where_like("name", "x").get().unwrap().len(), 0);
    assert_eq!(users.clone().where_not_like("name", "j%").get().unwrap().len(), 1);
}

#[test]
fn test_custom_operators() {
    let db = connection();
    db.collection("users")
        .insert(vec![
            doc! {
                "name": "John Doe",
                "age": 30,
                "addresses": [{ "city": "Ghent" }, { "city": "Paris" }],
                "tags": ["one", "two"],
            },
            doc! {
                "name": "Jane Doe",
                "addresses": [{ "city": "Brussels" }, { "city": "Paris" }],
                "tags": ["one", "two", "three", "four"],
            },
            doc! {
                "name": "Robert Roe",
                "age": "thirty-one",
                "tags": ["three", "four"],
            },
        ])
        .unwrap();
    let users = db.collection("users");

    let rows = users.clone().where_op("age", "exists", true).get().unwrap();
    assert_eq!(names(&rows), vec!["John Doe", "Robert Roe"]);

    let rows = users.clone().where_op("age", "exists", false).get().unwrap();
    assert_eq!(names(&rows), vec!["Jane Doe"]);

    let rows = users.clone().where_op("age", "type", 2).get().unwrap();
    assert_eq!(names(&rows), vec!["Robert Roe"]);

    let rows = users.clone().where_op("age", "mod", vec![15, 0]).get().unwrap();
    assert_eq!(names(&rows), vec!["John Doe"]);
    let rows = users.clone().where_op("age", "mod", vec![29, 1]).get().unwrap();
    assert_eq!(names(&rows), vec!["John Doe"]);
    assert!(users.clone().where_op("age", "mod", vec![14, 0]).get().unwrap().is_empty());

    assert_eq!(users.clone().where_op("tags", "all", vec!["one", "two"]).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_op("tags", "all", vec!["one", "three"]).get().unwrap().len(), 1);

    assert_eq!(users.clone().where_op("tags", "size", 2).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_op("tags", "size", 3).get().unwrap().len(), 0);
    assert_eq!(users.clone().where_op("tags", "size", 4).get().unwrap().len(), 1);

    let rows = users
        .clone()
        .where_op("addresses", "elemMatch", doc! { "city": "Brussels" })
        .get()
        .unwrap();
    assert_eq!(names(&rows), vec!["Jane Doe"]);
}

// =============================================================================
// Membership, Null and Range Tests
// =============================================================================

#[test]
fn test_where_in() {
    let db = connection();
    ages(&db, &[("Jane Doe", 20), ("John Doe", 21), ("Mark Moe", 20)]);
    let users = db.collection("users");

    assert_eq!(users.clone().where_in("age", [20, 21]).get().unwrap().len(), 3);
    assert_eq!(users.clone().where_in("age", [20]).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_in("age", [21]).get().unwrap().len(), 1);
    assert!(users.clone().where_in("age", Vec::<i32>::new()).get().unwrap().is_empty());
}

#[test]
fn test_where_not_in() {
    let db = connection();
    ages(&db, &[("Jane Doe", 20), ("John Doe", 21), ("Mark Moe", 20)]);
    let users = db.collection("users");

    assert!(users.clone().where_not_in("age", [20, 21]).get().unwrap().is_empty());
    assert_eq!(users.clone().where_not_in("age", [20]).get().unwrap().len(), 1);
    assert_eq!(users.clone().where_not_in("age", [21]).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_not_in("age", Vec::<i32>::new()).get().unwrap().len(), 3);
}

fn null_users(db: &Connection) {
    db.collection("users")
        .insert(vec![
            doc! { "name": "Jane Doe", "age": 20 },
            doc! { "name": "John Doe", "age": Bson::Null },
            doc! { "name": "Mark Moe", "age": 20 },
        ])
        .unwrap();
}

#[test]
fn test_where_null_matches_missing_fields() {
    let db = connection();
    null_users(&db);
    let users = db.collection("users");

    assert_eq!(users.clone().where_null("age").get().unwrap().len(), 1);
    assert_eq!(users.clone().where_null("foo").get().unwrap().len(), 3);
    assert!(users.clone().where_null("name").get().unwrap().is_empty());
}

#[test]
fn test_where_not_null() {
    let db = connection();
    null_users(&db);
    let users = db.collection("users");

    assert_eq!(users.clone().where_not_null("age").get().unwrap().len(), 2);
    assert!(users.clone().where_not_null("foo").get().unwrap().is_empty());
    assert_eq!(users.clone().where_not_null("name").get().unwrap().len(), 3);
}

#[test]
fn test_where_between() {
    let db = connection();
    standard_ages(&db);
    let users = db.collection("users");

    assert_eq!(users.clone().where_between("age", [19, 21]).get().unwrap().len(), 1);
    assert_eq!(users.clone().where_between("age", [20, 20]).get().unwrap().len(), 1);
    assert_eq!(users.clone().where_between("age", [20, 30]).get().unwrap().len(), 3);
    assert!(users.clone().where_between("age", [5, 10]).get().unwrap().is_empty());
}

#[test]
fn test_where_not_between() {
    let db = connection();
    standard_ages(&db);
    let users = db.collection("users");

    assert_eq!(users.clone().where_not_between("age", [19, 21]).get().unwrap().len(), 3);
    assert_eq!(users.clone().where_not_between("age", [20, 20]).get().unwrap().len(), 3);
    assert_eq!(users.clone().where_not_between("age", [20, 30]).get().unwrap().len(), 1);
    assert_eq!(users.clone().where_not_between("age", [5, 10]).get().unwrap().len(), 4);
}

#[test]
fn test_or_where_groups() {
    let db = connection();
    standard_ages(&db);

    let rows = db
        .collection("users")
        .where_eq("age", 20)
        .or_where_eq("name", "Larry Loe")
        .get()
        .unwrap();
    assert_eq!(names(&rows), vec!["Jane Doe", "Larry Loe"]);
}

// =============================================================================
// Date Part Tests
// =============================================================================

#[test]
fn test_where_date_parts() {
    let db = connection();
    db.collection("users")
        .insert(vec![
            doc! { "name": "Jane Doe", "birthday": birthday(1990, 1, 1, 10) },
            doc! { "name": "John Doe", "birthday": birthday(1980, 3, 1, 11) },
            doc! { "name": "Mark Moe", "birthday": birthday(1970, 3, 1, 12) },
            doc! { "name": "Larry Loe", "birthday": birthday(1960, 4, 1, 13) },
        ])
        .unwrap();
    let users = db.collection("users");

    assert_eq!(users.clone().where_year("birthday", 1990).get().unwrap().len(), 1);
    assert_eq!(users.clone().where_day("birthday", 1).get().unwrap().len(), 4);
    assert_eq!(users.clone().where_month("birthday", 3).get().unwrap().len(), 2);
    assert_eq!(users.clone().where_date("birthday", "1970-03-01").get().unwrap().len(), 1);
    assert_eq!(users.clone().where_time("birthday", "12:00:00").get().unwrap().len(), 1);
    assert_eq!(users.clone().where_year_op("birthday", "<", 1975).get().unwrap().len(), 2);
}

// =============================================================================
// Raw, Computed Field and Paging Tests
// =============================================================================

#[test]
fn test_where_raw() {
    let db = connection();
    standard_ages(&db);

    let rows = db
        .collection("users")
        .where_raw(doc! { "age": { "$in": [20, 30] } })
        .get()
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_add_fields() {
    let db = connection();
    db.collection("users")
        .insert(vec![
            doc! { "name": "Jane Doe", "foo": 1, "bar": 5 },
            doc! { "name": "John Doe", "foo": 2, "bar": 6 },
            doc! { "name": "Mark Moe", "foo": 3, "bar": 7 },
            doc! { "name": "Larry Loe", "foo": 4, "bar": 8 },
        ])
        .unwrap();

    let rows = db
        .collection("users")
        .add_field("sum", doc! { "$add": ["$foo", "$bar"] })
        .add_field("max", doc! { "$max": ["$foo", "$bar"] })
        .get()
        .unwrap();

    assert_eq!(rows[0].get_i64("sum"), Some(6));
    assert_eq!(rows[0].get_i64("max"), Some(5));
}

#[test]
fn test_filter_and_project_on_computed_field() {
    let db = connection();
    db.collection("items")
        .insert(vec![
            doc! { "foo": 1, "bar": 5 },
            doc! { "foo": 2, "bar": 6 },
            doc! { "foo": 3, "bar": 7 },
        ])
        .unwrap();

    let total = db
        .collection("items")
        .add_field("sum", doc! { "$add": ["$foo", "$bar"] })
        .where_op("sum", ">", 8);
    assert_eq!(total.count().unwrap(), 1);

    let rows = total.project("sum", 1).project("_id", 0).get().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].clone().into_document(), doc! { "sum": 10 });
}

#[test]
fn test_project_after_filter() {
    let db = connection();
    standard_ages(&db);

    let rows = db
        .collection("users")
        .where_eq("name", "Jane Doe")
        .project("name", 1)
        .project("_id", 0)
        .get()
        .unwrap();
    assert_eq!(rows[0].clone().into_document(), doc! { "name": "Jane Doe" });
}

#[test]
fn test_limit() {
    let db = connection();
    standard_ages(&db);

    let rows = db.collection("users").limit(1).get().unwrap();
    assert_eq!(names(&rows), vec!["Jane Doe"]);

    let rows = db.collection("users").limit(2).get().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get_str("name"), Some("John Doe"));

    let rows = db
        .collection("users")
        .where_between("age", [21, 100])
        .limit(2)
        .get()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("name"), Some("John Doe"));

    assert_eq!(db.collection("users").limit(0).get().unwrap().len(), 4);
}

#[test]
fn test_offset() {
    let db = connection();
    standard_ages(&db);

    let rows = db.collection("users").offset(1).get().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get_str("name"), Some("John Doe"));

    let rows = db.collection("users").offset(2).get().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("name"), Some("Mark Moe"));

    let rows = db.collection("users").offset(2).limit(1).get().unwrap();
    assert_eq!(names(&rows), vec!["Mark Moe"]);

    let rows = db.collection("users").for_page(2, 3).get().unwrap();
    assert_eq!(names(&rows), vec!["Larry Loe"]);
}

#[test]
fn test_order_by_desc() {
    let db = connection();
    standard_ages(&db);

    let rows = db.collection("users").order_by_desc("age").take(2).get().unwrap();
    assert_eq!(names(&rows), vec!["Larry Loe", "John Doe"]);
}
