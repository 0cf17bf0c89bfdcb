use std::sync::Arc;

use embedsql::{Column, DataType, Engine, EngineConfig, Expression, PlanNode, RowIter, Schema, Value};
use embedsql_catalog::{MemoryDatabase, MemoryTable};
use embedsql_helpers::Config;

fn seeded_engine() -> (tokio::runtime::Runtime, Engine) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = Engine::new(rt.handle().clone(), EngineConfig::default());

    let db = Arc::new(MemoryDatabase::new("shop"));
    let orders = Arc::new(MemoryTable::new(
        "orders",
        Schema::new(vec![
            Column::new("id", DataType::Int, false),
            Column::new("total", DataType::Int, false),
        ]),
    ));
    orders.insert(vec![Value::Int(1), Value::Int(42)]);
    orders.insert(vec![Value::Int(2), Value::Int(7)]);
    db.add_table(orders);
    engine.add_database(db);

    (rt, engine)
}

fn select_star(database: &str, table: &str) -> PlanNode {
    PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(PlanNode::UnresolvedTable {
            database: Some(database.into()),
            name: table.into(),
        }),
    }
}

#[test]
fn select_star_returns_every_row_with_its_schema() {
    let (_rt, engine) = seeded_engine();
    let session = engine.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = engine.new_context(session, "SELECT * FROM orders");

    let (mut rows, schema) = engine.analyze_and_execute(&ctx, select_star("shop", "orders")).unwrap();
    assert_eq!(schema.len(), 2);

    let mut seen = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        seen.push(row);
    }
    rows.close().unwrap();
    assert_eq!(
        seen,
        vec![
            vec![Value::Int(1), Value::Int(42)],
            vec![Value::Int(2), Value::Int(7)],
        ]
    );
}

#[test]
fn unknown_table_surfaces_as_an_engine_error() {
    let (_rt, engine) = seeded_engine();
    let session = engine.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = engine.new_context(session, "SELECT * FROM missing");

    let err = engine
        .analyze_and_execute(&ctx, select_star("shop", "missing"))
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[test]
fn show_databases_reflects_registered_databases() {
    let (_rt, engine) = seeded_engine();
    let session = engine.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = engine.new_context(session, "SHOW DATABASES");

    let plan = PlanNode::ShowDatabases { catalog: None };
    let (mut rows, _schema) = engine.analyze_and_execute(&ctx, plan).unwrap();
    let mut seen = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        seen.push(row);
    }
    rows.close().unwrap();
    assert_eq!(seen, vec![vec![Value::Text("shop".into())]]);
}

#[test]
fn scanning_a_table_registers_its_progress_on_the_process_list() {
    let (_rt, engine) = seeded_engine();
    let session = engine.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = engine.new_context(session, "SELECT * FROM orders");

    let (mut rows, _schema) = engine.analyze_and_execute(&ctx, select_star("shop", "orders")).unwrap();
    // Pull one row without draining the single underlying partition to
    // exhaustion, so the process is still live and its progress item for
    // "orders" — installed by the analyzer before execution ever starts —
    // is observable before the scan closes it out.
    assert!(rows.next().unwrap().is_some());

    let snapshot = engine.process_list();
    let process = snapshot.iter().find(|p| p.pid == ctx.pid).expect("process still live mid-scan");
    assert_eq!(process.progress, vec![("orders".into(), 0.0)]);

    while rows.next().unwrap().is_some() {}
    rows.close().unwrap();
    assert!(engine.process_list().iter().all(|p| p.pid != ctx.pid));
}

#[test]
fn show_warnings_survives_the_analysis_that_follows_its_statement() {
    let (_rt, engine) = seeded_engine();
    let session = engine.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    session.push_warning("column 'total' truncated");

    let ctx = engine.new_context(session.clone(), "SHOW WARNINGS");
    let (mut rows, _schema) = engine.analyze_and_execute(&ctx, PlanNode::ShowWarnings).unwrap();
    let mut seen = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        seen.push(row);
    }
    rows.close().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0][2], Value::Text("column 'total' truncated".into()));

    // An ordinary statement after SHOW WARNINGS clears the diagnostics area.
    let ctx = engine.new_context(session.clone(), "SELECT * FROM orders");
    engine.analyze_and_execute(&ctx, select_star("shop", "orders")).unwrap();
    assert!(session.warnings().is_empty());
}

#[test]
fn case_insensitive_lookup_is_the_default() {
    let (_rt, engine) = seeded_engine();
    let session = engine.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = engine.new_context(session, "SELECT * FROM ORDERS");

    let (mut rows, _schema) = engine.analyze_and_execute(&ctx, select_star("SHOP", "ORDERS")).unwrap();
    let mut count = 0;
    while rows.next().unwrap().is_some() {
        count += 1;
    }
    rows.close().unwrap();
    assert_eq!(count, 2);
}
