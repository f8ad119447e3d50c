use docgraph::{
    Database, DatabaseConfig, DocGraphError, Properties, Row, TypeKind, Value,
    properties,
};
use serde_json::json;

fn open() -> Database {
    Database::open_in_memory(&DatabaseConfig::default()).expect("db")
}

fn props(value: serde_json::Value) -> Properties {
    properties(value).expect("properties")
}

fn seed_products(db: &Database) {
    db.declare_type("Product", TypeKind::Document)
        .expect("Product");
    db.begin().expect("begin");
    for i in 1..=100 {
        db.create_record(
            "Product",
            props(json!({
                "id": i,
                "name": format!("Product {i}"),
                "price": 10.0 + i as f64,
                "category": format!("Category {}", i % 5),
            })),
        )
        .expect("product");
    }
    db.commit().expect("commit");
}

fn seed_orders(db: &Database) {
    db.declare_type("Customer", TypeKind::Document)
        .expect("Customer");
    db.declare_type("Order", TypeKind::Document).expect("Order");
    db.begin().expect("begin");
    db.create_record(
        "Customer",
        props(json!({"id": "CUST_001", "name": "John Doe", "email": "john@example.com"})),
    )
    .expect("customer");
    db.create_record(
        "Customer",
        props(json!({"id": "CUST_002", "name": "Jane Roe", "email": "jane@example.com"})),
    )
    .expect("customer");
    for (n, amount) in [100, 200, 300, 400, 500].into_iter().enumerate() {
        db.create_record(
            "Order",
            props(json!({
                "id": format!("ORDER_{}", n + 1),
                "customerId": "CUST_001",
                "amount": amount,
            })),
        )
        .expect("order");
    }
    db.create_record(
        "Order",
        props(json!({"id": "ORDER_9", "customerId": "CUST_002", "amount": 50})),
    )
    .expect("order");
    db.commit().expect("commit");
}

fn rows(db: &Database, text: &str, params: &[Value]) -> Vec<Row> {
    db.query(text, params).expect("query").collect()
}

#[test]
fn test_price_filter_over_batch_insert() {
    let db = open();
    seed_products(&db);
    // 10 + i > 50 holds for i in 41..=100
    assert_eq!(
        rows(&db, "SELECT FROM Product WHERE price > ?", &[Value::Float(50.0)]).len(),
        60
    );
    assert_eq!(
        rows(&db, "SELECT FROM Product WHERE price > 60", &[]).len(),
        50
    );
    let limited = rows(
        &db,
        "SELECT FROM Product WHERE price > ? LIMIT 5",
        &[Value::Float(50.0)],
    );
    assert_eq!(limited.len(), 5);
    assert_eq!(limited[0].value("name"), &Value::from("Product 41"));
    assert!(limited[0].record_id().is_some());
}

#[test]
fn test_sum_of_customer_orders() {
    let db = open();
    seed_orders(&db);
    let result = rows(
        &db,
        "SELECT SUM(amount) AS total FROM Order WHERE customerId = 'CUST_001'",
        &[],
    );
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].value("total"), &Value::Int(1500));

    let stats = rows(
        &db,
        "SELECT customerId, COUNT(*) AS orders, AVG(amount) AS avg, MIN(amount) AS low, MAX(amount) AS high \
         FROM Order GROUP BY customerId",
        &[],
    );
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].value("customerId"), &Value::from("CUST_001"));
    assert_eq!(stats[0].value("orders"), &Value::Int(5));
    assert_eq!(stats[0].value("avg"), &Value::Float(300.0));
    assert_eq!(stats[0].value("low"), &Value::Int(100));
    assert_eq!(stats[0].value("high"), &Value::Int(500));
    assert_eq!(stats[1].value("orders"), &Value::Int(1));
}

#[test]
fn test_join_customer_orders() {
    let db = open();
    seed_orders(&db);
    let result = rows(
        &db,
        "SELECT c.name, c.email, o.id AS orderId, o.amount \
         FROM Customer c JOIN Order o ON c.id = o.customerId WHERE c.id = 'CUST_001'",
        &[],
    );
    assert_eq!(result.len(), 5);
    for row in &result {
        assert_eq!(row.value("name"), &Value::from("John Doe"));
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec!["name", "email", "orderId", "amount"]
        );
    }
    let amounts: Vec<_> = result.iter().map(|r| r.value("amount").clone()).collect();
    assert_eq!(
        amounts,
        [100, 200, 300, 400, 500].map(Value::Int).to_vec()
    );
}

#[test]
fn test_expand_in_traversal() {
    let db = open();
    db.declare_type("Person", TypeKind::Vertex).expect("Person");
    db.declare_type("Company", TypeKind::Vertex).expect("Company");
    db.declare_type("WorksAt", TypeKind::Edge).expect("WorksAt");
    db.begin().expect("begin");
    let alice = db
        .create_record("Person", props(json!({"name": "Alice"})))
        .expect("alice");
    let bob = db
        .create_record("Person", props(json!({"name": "Bob"})))
        .expect("bob");
    let techcorp = db
        .create_record("Company", props(json!({"name": "TechCorp"})))
        .expect("company");
    db.create_edge("WorksAt", alice, techcorp, Properties::new())
        .expect("edge");
    db.create_edge("WorksAt", bob, techcorp, Properties::new())
        .expect("edge");
    db.commit().expect("commit");

    let employees = rows(
        &db,
        "SELECT expand(in('WorksAt')) FROM Company WHERE name = 'TechCorp'",
        &[],
    );
    let ids: Vec<_> = employees.iter().filter_map(Row::record_id).collect();
    assert_eq!(ids, vec![alice, bob]);
    assert_eq!(employees[1].value("name"), &Value::from("Bob"));

    let ordered = rows(
        &db,
        "SELECT expand(in('WorksAt')) FROM Company ORDER BY name DESC LIMIT 1",
        &[],
    );
    assert_eq!(ordered[0].value("name"), &Value::from("Bob"));
}

#[test]
fn test_aggregates_over_empty_input() {
    let db = open();
    seed_orders(&db);
    let result = rows(
        &db,
        "SELECT COUNT(*) AS n, SUM(amount) AS total, MAX(amount) AS top FROM Order WHERE amount > 10000",
        &[],
    );
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].value("n"), &Value::Int(0));
    assert_eq!(result[0].value("total"), &Value::Null);
    assert_eq!(result[0].value("top"), &Value::Null);
}

#[test]
fn test_unknown_fields_and_null_comparisons() {
    let db = open();
    seed_orders(&db);
    let result = rows(&db, "SELECT id, nickname FROM Customer", &[]);
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].value("nickname"), &Value::Null);

    assert!(rows(&db, "SELECT FROM Customer WHERE nickname = NULL", &[]).is_empty());
    assert_eq!(
        rows(&db, "SELECT FROM Customer WHERE nickname IS NULL", &[]).len(),
        2
    );
    assert!(rows(&db, "SELECT FROM Order WHERE amount > 'abc'", &[]).is_empty());
}

#[test]
fn test_boolean_conditions_and_ordering() {
    let db = open();
    seed_orders(&db);
    let result = rows(
        &db,
        "SELECT id FROM Order WHERE (amount >= 400 OR amount < 100) AND NOT customerId = 'CUST_002' ORDER BY amount DESC",
        &[],
    );
    let ids: Vec<_> = result.iter().map(|r| r.value("id").clone()).collect();
    assert_eq!(ids, vec![Value::from("ORDER_5"), Value::from("ORDER_4")]);
}

#[test]
fn test_query_errors() {
    let db = open();
    seed_orders(&db);
    assert!(matches!(
        db.query("SELECT FROM Order WHERE amount > ?", &[]),
        Err(DocGraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.query("SELECT FROM Invoice", &[]),
        Err(DocGraphError::NotFound(_))
    ));
    assert!(matches!(
        db.query("SELEC FROM Order", &[]),
        Err(DocGraphError::QuerySyntaxError { position: 0, .. })
    ));
    assert!(matches!(
        db.query("SELECT SUM(id) FROM Order", &[]),
        Err(DocGraphError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.query("DELETE FROM Order", &[]),
        Err(DocGraphError::InvalidArgument(_))
    ));
}

#[test]
fn test_queries_read_committed_state_only() {
    let db = open();
    seed_orders(&db);
    db.begin().expect("begin");
    db.create_record("Order", props(json!({"id": "PENDING", "amount": 1})))
        .expect("staged");
    assert_eq!(rows(&db, "SELECT FROM Order", &[]).len(), 6);
    db.commit().expect("commit");
    assert_eq!(rows(&db, "SELECT FROM Order", &[]).len(), 7);
}

#[test]
fn test_result_set_is_lazy_over_a_pinned_snapshot() {
    let db = open();
    seed_orders(&db);
    let mut result = db.query("SELECT id FROM Order", &[]).expect("query");
    let first = result.next().expect("first row");
    assert_eq!(first.value("id"), &Value::from("ORDER_1"));

    db.begin().expect("begin");
    db.delete(first.record_id().expect("rid"))
        .expect("delete");
    db.commit().expect("commit");

    assert_eq!(result.count(), 5);
    assert_eq!(rows(&db, "SELECT id FROM Order", &[]).len(), 5);
}
