use docgraph::{
    Database, DatabaseConfig, DocGraphError, Properties, RecordId, TransactionState, TypeKind,
    Value, properties,
};
use serde_json::json;

fn open() -> Database {
    let db = Database::open_in_memory(&DatabaseConfig::default()).expect("db");
    db.declare_type("User", TypeKind::Document).expect("User");
    db.declare_type("Person", TypeKind::Vertex).expect("Person");
    db.declare_type("Knows", TypeKind::Edge).expect("Knows");
    db
}

fn props(value: serde_json::Value) -> Properties {
    properties(value).expect("properties")
}

#[test]
fn test_committed_record_is_readable_with_latest_properties() {
    let db = open();
    db.begin().expect("begin");
    let id = db
        .create_record("User", props(json!({"name": "Alice", "age": 30})))
        .expect("create");
    db.commit().expect("commit");

    db.begin().expect("begin");
    db.update(id, props(json!({"name": "Alice", "age": 31})))
        .expect("update");
    db.commit().expect("commit");

    let record = db.get(id).expect("get");
    assert_eq!(record.get("age"), Some(&Value::Int(31)));
    assert_eq!(record.version, 2);
    assert_eq!(record.type_name, "User");
}

#[test]
fn test_rolled_back_record_is_not_found() {
    let db = open();
    db.begin().expect("begin");
    let id = db
        .create_record("User", props(json!({"name": "Ghost"})))
        .expect("create");
    db.rollback().expect("rollback");
    assert_eq!(db.transaction_state(), TransactionState::RolledBack);
    assert!(matches!(db.get(id), Err(DocGraphError::NotFound(_))));
}

#[test]
fn test_get_sees_own_staged_writes_only_inside_transaction() {
    let db = open();
    let other = db.session();
    db.begin().expect("begin");
    let id = db
        .create_record("User", props(json!({"name": "Draft"})))
        .expect("create");
    assert_eq!(
        db.get(id).expect("own write").get("name"),
        Some(&Value::from("Draft"))
    );
    assert!(matches!(other.get(id), Err(DocGraphError::NotFound(_))));
    db.commit().expect("commit");
    assert!(other.get(id).is_ok());
}

#[test]
fn test_merge_keeps_untouched_fields() {
    let db = open();
    db.begin().expect("begin");
    let id = db
        .create_record("User", props(json!({"name": "Bob", "city": "Oslo"})))
        .expect("create");
    db.commit().expect("commit");

    db.begin().expect("begin");
    db.merge(id, props(json!({"city": "Bergen", "zip": "5003"})))
        .expect("merge");
    db.commit().expect("commit");

    let record = db.get(id).expect("get");
    assert_eq!(record.get("name"), Some(&Value::from("Bob")));
    assert_eq!(record.get("city"), Some(&Value::from("Bergen")));
    assert_eq!(record.get("zip"), Some(&Value::from("5003")));
}

#[test]
fn test_delete_then_get_is_not_found() {
    let db = open();
    db.begin().expect("begin");
    let id = db.create_record("User", Properties::new()).expect("create");
    db.commit().expect("commit");

    db.begin().expect("begin");
    db.delete(id).expect("delete");
    assert!(matches!(db.get(id), Err(DocGraphError::NotFound(_))));
    assert!(matches!(db.delete(id), Err(DocGraphError::NotFound(_))));
    db.commit().expect("commit");
    assert!(matches!(db.get(id), Err(DocGraphError::NotFound(_))));
}

#[test]
fn test_mutations_require_active_transaction() {
    let db = open();
    assert!(matches!(
        db.create_record("User", Properties::new()),
        Err(DocGraphError::NoActiveTransaction)
    ));
    assert!(matches!(db.commit(), Err(DocGraphError::NoActiveTransaction)));
    assert!(matches!(
        db.rollback(),
        Err(DocGraphError::NoActiveTransaction)
    ));
    assert!(matches!(
        db.update(RecordId::new(1), Properties::new()),
        Err(DocGraphError::NoActiveTransaction)
    ));
}

#[test]
fn test_begin_twice_is_rejected_and_state_machine_advances() {
    let db = open();
    assert_eq!(db.transaction_state(), TransactionState::Idle);
    db.begin().expect("begin");
    assert_eq!(db.transaction_state(), TransactionState::Active);
    assert!(matches!(
        db.begin(),
        Err(DocGraphError::TransactionAlreadyActive)
    ));
    db.commit().expect("commit");
    assert_eq!(db.transaction_state(), TransactionState::Committed);
    db.begin().expect("fresh transaction");
    assert_eq!(db.transaction_state(), TransactionState::Active);
}

#[test]
fn test_ids_are_unique_and_not_reused_after_rollback() {
    let db = open();
    db.begin().expect("begin");
    let first = db.create_record("User", Properties::new()).expect("first");
    db.rollback().expect("rollback");
    db.begin().expect("begin");
    let second = db.create_record("User", Properties::new()).expect("second");
    let third = db.create_record("User", Properties::new()).expect("third");
    db.commit().expect("commit");
    assert!(second > first);
    assert!(third > second);
}

#[test]
fn test_create_requires_declared_non_edge_type() {
    let db = open();
    db.begin().expect("begin");
    assert!(matches!(
        db.create_record("Nope", Properties::new()),
        Err(DocGraphError::NotFound(_))
    ));
    assert!(matches!(
        db.create_record("Knows", Properties::new()),
        Err(DocGraphError::InvalidArgument(_))
    ));
}

#[test]
fn test_declare_type_twice_is_idempotent() {
    let db = open();
    let before = db.types().expect("types");
    assert!(!db.declare_type("User", TypeKind::Document).expect("again"));
    assert_eq!(db.types().expect("types"), before);
    assert!(matches!(
        db.declare_type("User", TypeKind::Vertex),
        Err(DocGraphError::TypeConflict(_))
    ));
    assert!(db.type_exists("User").expect("exists"));
    assert!(!db.type_exists("Missing").expect("exists"));
}

#[test]
fn test_scan_is_pinned_to_its_snapshot() {
    let db = open();
    db.begin().expect("begin");
    for n in 0..3 {
        db.create_record("User", props(json!({ "n": n })))
            .expect("create");
    }
    db.commit().expect("commit");

    let scan = db.scan("User").expect("scan");
    db.begin().expect("begin");
    db.create_record("User", Properties::new()).expect("create");
    db.commit().expect("commit");

    assert_eq!(scan.count(), 3);
    assert_eq!(db.scan("User").expect("rescan").count(), 4);
    assert!(matches!(db.scan("Nope"), Err(DocGraphError::NotFound(_))));
}
