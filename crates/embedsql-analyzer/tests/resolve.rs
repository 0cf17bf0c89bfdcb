use std::sync::Arc;

use embedsql_analyzer::{Analyzer, AnalyzerContext};
use embedsql_catalog::{Catalog, MemoryDatabase, MemoryTable, SessionManager};
use embedsql_core::{Column, DataType, Expression, PlanNode, Schema, Value};

fn setup() -> (tokio::runtime::Runtime, Arc<Catalog>, SessionManager) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let catalog = Arc::new(Catalog::new(rt.handle().clone()));
    let db = Arc::new(MemoryDatabase::new("db"));
    let users = Arc::new(MemoryTable::new(
        "users",
        Schema::new(vec![
            Column::new("id", DataType::Int, false),
            Column::new("name", DataType::Text, true),
        ]),
    ));
    users.insert(vec![Value::Int(1), Value::Text("ada".into())]);
    db.add_table(users);
    catalog.add_database(db);
    (rt, catalog, SessionManager::new(1 << 20))
}

#[test]
fn resolves_select_star_from_table() {
    let (_rt, catalog, sessions) = setup();
    let session = sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = sessions.new_context(session, "SELECT * FROM users");
    let actx = AnalyzerContext::new(ctx, catalog);

    let plan = PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(PlanNode::UnresolvedTable {
            database: Some("db".into()),
            name: "users".into(),
        }),
    };

    let resolved = Analyzer::standard().analyze(plan, &actx).unwrap();
    // The root is wrapped for process tracking.
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper at the root");
    };
    assert!(child.resolved());
    let schema = child.schema().unwrap();
    assert_eq!(schema.len(), 2);
    assert_eq!(schema.0[0].name, "id");
    assert_eq!(schema.0[1].name, "name");
}

#[test]
fn resolves_unqualified_column_filter() {
    let (_rt, catalog, sessions) = setup();
    let session = sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = sessions.new_context(session, "SELECT id FROM users WHERE id = 1");
    let actx = AnalyzerContext::new(ctx, catalog);

    let plan = PlanNode::Project {
        exprs: vec![Expression::UnresolvedColumn { name: "id".into() }],
        child: Box::new(PlanNode::Filter {
            predicate: Expression::UnresolvedColumn { name: "id".into() },
            child: Box::new(PlanNode::UnresolvedTable {
                database: Some("db".into()),
                name: "users".into(),
            }),
        }),
    };

    let resolved = Analyzer::standard().analyze(plan, &actx).unwrap();
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper at the root");
    };
    assert!(child.resolved());
}

#[test]
fn show_databases_behind_a_star_placeholder_is_unwrapped() {
    let (_rt, catalog, sessions) = setup();
    let session = sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = sessions.new_context(session, "SHOW DATABASES");
    let actx = AnalyzerContext::new(ctx, catalog);

    // Parsed the same way a plain `SELECT` is: a `Project { Star }` wrapper
    // the front end hasn't special-cased away yet.
    let plan = PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(PlanNode::ShowDatabases { catalog: None }),
    };

    let resolved = Analyzer::standard().analyze(plan, &actx).unwrap();
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper at the root");
    };
    assert!(matches!(*child, PlanNode::ShowDatabases { .. }));
}

#[test]
fn mixed_case_table_name_resolves_against_the_lowercase_catalog() {
    let (_rt, catalog, sessions) = setup();
    let session = sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = sessions.new_context(session, "SELECT * FROM Users");
    let actx = AnalyzerContext::new(ctx, catalog);

    let plan = PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(PlanNode::UnresolvedTable {
            database: Some("DB".into()),
            name: "Users".into(),
        }),
    };

    let resolved = Analyzer::standard().analyze(plan, &actx).unwrap();
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper at the root");
    };
    assert!(child.resolved());
}

#[test]
fn correlated_column_falls_back_to_an_outer_schema() {
    let (_rt, catalog, sessions) = setup();
    let session = sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = sessions.new_context(session, "SELECT id FROM users WHERE id = outer_id");
    let mut actx = AnalyzerContext::new(ctx, catalog);
    actx.outer_schemas.push(Schema::new(vec![Column::new("outer_id", DataType::Int, false)]));

    let plan = PlanNode::Project {
        exprs: vec![Expression::UnresolvedColumn { name: "id".into() }],
        child: Box::new(PlanNode::Filter {
            predicate: Expression::UnresolvedColumn { name: "outer_id".into() },
            child: Box::new(PlanNode::UnresolvedTable {
                database: Some("db".into()),
                name: "users".into(),
            }),
        }),
    };

    let resolved = Analyzer::standard().analyze(plan, &actx).unwrap();
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper at the root");
    };
    assert!(child.resolved());
}

#[test]
fn unknown_table_errors() {
    let (_rt, catalog, sessions) = setup();
    let session = sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
    let ctx = sessions.new_context(session, "SELECT * FROM missing");
    let actx = AnalyzerContext::new(ctx, catalog);

    let plan = PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(PlanNode::UnresolvedTable {
            database: Some("db".into()),
            name: "missing".into(),
        }),
    };

    assert!(Analyzer::standard().analyze(plan, &actx).is_err());
}
