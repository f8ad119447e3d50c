use std::sync::{Arc, Barrier};
use std::thread;

use docgraph::{
    Database, DatabaseConfig, DocGraphError, RecordId, TypeKind, Value, properties,
};
use serde_json::json;

fn open_counter() -> (Database, RecordId) {
    let db = Database::open_in_memory(&DatabaseConfig::default()).expect("db");
    db.declare_type("Counter", TypeKind::Document)
        .expect("Counter");
    db.begin().expect("begin");
    let id = db
        .create_record("Counter", properties(json!({"value": 0})).expect("props"))
        .expect("counter");
    db.commit().expect("commit");
    (db, id)
}

fn read_value(db: &Database, id: RecordId) -> i64 {
    db.get(id)
        .expect("get")
        .get("value")
        .and_then(Value::as_i64)
        .expect("int value")
}

fn increment(db: &Database, id: RecordId) -> Result<(), DocGraphError> {
    db.begin()?;
    let current = read_value(db, id);
    db.update(id, properties(json!({ "value": current + 1 }))?)?;
    db.commit()
}

#[test]
fn test_second_conflicting_commit_fails_without_lost_update() {
    let (db, id) = open_counter();
    let other = db.session();

    db.begin().expect("begin a");
    other.begin().expect("begin b");
    let seen_a = read_value(&db, id);
    let seen_b = read_value(&other, id);
    db.update(id, properties(json!({ "value": seen_a + 1 })).expect("props"))
        .expect("stage a");
    other
        .update(id, properties(json!({ "value": seen_b + 10 })).expect("props"))
        .expect("stage b");

    db.commit().expect("first committer wins");
    let err = other.commit().expect_err("second committer conflicts");
    assert!(matches!(err, DocGraphError::WriteConflict(_)));

    assert_eq!(read_value(&db, id), 1);
    assert_eq!(read_value(&other, id), 1);
}

#[test]
fn test_conflicting_delete_is_detected() {
    let (db, id) = open_counter();
    let other = db.session();
    db.begin().expect("begin a");
    other.begin().expect("begin b");
    db.delete(id).expect("delete");
    other
        .merge(id, properties(json!({"touched": true})).expect("props"))
        .expect("merge");
    db.commit().expect("delete commits");
    assert!(matches!(
        other.commit(),
        Err(DocGraphError::WriteConflict(_))
    ));
}

#[test]
fn test_retried_increments_from_many_threads_are_all_applied() {
    let (db, id) = open_counter();
    let threads = 4;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let session = db.session();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_thread {
                    loop {
                        match increment(&session, id) {
                            Ok(()) => break,
                            Err(DocGraphError::WriteConflict(_)) => continue,
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    assert_eq!(read_value(&db, id), (threads * per_thread) as i64);
}

#[test]
fn test_readers_see_whole_commits_only() {
    let db = Database::open_in_memory(&DatabaseConfig::default()).expect("db");
    db.declare_type("Item", TypeKind::Document).expect("Item");
    let reader = db.session();

    let writer = thread::spawn(move || {
        for batch in 0..20 {
            db.begin().expect("begin");
            for n in 0..10 {
                db.create_record("Item", properties(json!({"batch": batch, "n": n})).expect("props"))
                    .expect("create");
            }
            db.commit().expect("commit");
        }
    });

    for _ in 0..200 {
        let count = reader.scan("Item").expect("scan").count();
        assert_eq!(count % 10, 0, "observed a partial commit: {count}");
    }
    writer.join().expect("writer");
    assert_eq!(reader.scan("Item").expect("scan").count(), 200);
}
