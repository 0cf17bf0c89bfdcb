use std::sync::Arc;

use embedsql_analyzer::{Analyzer, AnalyzerContext};
use embedsql_catalog::{Catalog, MemoryDatabase, MemoryTable, SessionManager};
use embedsql_core::{
    CatalogHandle, Column, Context, DataType, Expression, JoinKind, PlanNode, Row, RowIter, Schema, SortField,
    Value,
};
use embedsql_exec::execute;

struct Harness {
    _rt: tokio::runtime::Runtime,
    catalog: Arc<Catalog>,
    sessions: SessionManager,
}

impl Harness {
    fn new() -> Self {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let catalog = Arc::new(Catalog::new(rt.handle().clone()));
        Harness {
            _rt: rt,
            catalog,
            sessions: SessionManager::new(1 << 20),
        }
    }

    fn context(&self, query_text: &str) -> Context {
        let session = self.sessions.new_session("127.0.0.1:3306", "10.0.0.1:1", "root");
        self.sessions.new_context(session, query_text)
    }

    fn resolve(&self, plan: PlanNode, query_text: &str) -> PlanNode {
        let actx = AnalyzerContext::new(self.context(query_text), self.catalog.clone());
        Analyzer::standard().analyze(plan, &actx).unwrap()
    }

    fn run(&self, plan: PlanNode) -> Vec<Row> {
        let ctx = self.context("test");
        let mut iter = execute(&plan, &ctx).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = iter.next().unwrap() {
            rows.push(row);
        }
        iter.close().unwrap();
        rows
    }
}

fn users_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Int, false),
        Column::new("name", DataType::Text, true),
        Column::new("age", DataType::Int, true),
    ])
}

fn seed_users(harness: &Harness) {
    let db = Arc::new(MemoryDatabase::new("db"));
    let users = Arc::new(MemoryTable::new("users", users_schema()));
    users.insert(vec![Value::Int(1), Value::Text("ada".into()), Value::Int(30)]);
    users.insert(vec![Value::Int(2), Value::Text("bo".into()), Value::Int(25)]);
    users.insert(vec![Value::Int(3), Value::Text("cy".into()), Value::Int(30)]);
    db.add_table(users);
    harness.catalog.add_database(db);
}

#[test]
fn selects_all_rows_from_a_table() {
    let harness = Harness::new();
    seed_users(&harness);

    let plan = PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(PlanNode::UnresolvedTable {
            database: Some("db".into()),
            name: "users".into(),
        }),
    };
    let PlanNode::QueryProcess { child, .. } = harness.resolve(plan, "SELECT * FROM users") else {
        panic!("expected QueryProcess wrapper");
    };
    let rows = harness.run(*child);
    assert_eq!(rows.len(), 3);
}

#[test]
fn filters_rows_by_predicate() {
    let harness = Harness::new();
    seed_users(&harness);

    let eq_thirty = Expression::Function {
        name: "eq".into(),
        args: vec![
            Expression::GetField {
                index: 2,
                name: "age".into(),
                data_type: DataType::Int,
                nullable: true,
                source_table: "users".into(),
            },
            Expression::Literal {
                value: Value::Int(30),
                data_type: DataType::Int,
            },
        ],
        data_type: DataType::Bool,
        nullable: false,
        eval: Arc::new(|args| Ok(Value::Bool(args[0] == args[1]))),
    };
    let plan = PlanNode::Project {
        exprs: vec![Expression::GetField {
            index: 0,
            name: "id".into(),
            data_type: DataType::Int,
            nullable: false,
            source_table: "users".into(),
        }],
        child: Box::new(PlanNode::Filter {
            predicate: eq_thirty,
            child: Box::new(PlanNode::ResolvedTable {
                table: harness.catalog.database("db").unwrap().table("users").unwrap(),
            }),
        }),
    };
    let rows = harness.run(plan);
    assert_eq!(rows, vec![vec![Value::Int(1)], vec![Value::Int(3)]]);
}

#[test]
fn sorts_rows_descending() {
    let harness = Harness::new();
    seed_users(&harness);

    let plan = PlanNode::Sort {
        fields: vec![SortField {
            expr: Expression::UnresolvedColumn { name: "id".into() },
            descending: true,
        }],
        child: Box::new(PlanNode::Project {
            exprs: vec![Expression::UnresolvedColumn { name: "id".into() }],
            child: Box::new(PlanNode::UnresolvedTable {
                database: Some("db".into()),
                name: "users".into(),
            }),
        }),
    };
    let PlanNode::QueryProcess { child, .. } = harness.resolve(plan, "SELECT id FROM users ORDER BY id DESC")
    else {
        panic!("expected QueryProcess wrapper");
    };
    let rows = harness.run(*child);
    assert_eq!(rows, vec![vec![Value::Int(3)], vec![Value::Int(2)], vec![Value::Int(1)]]);
}

#[test]
fn limit_and_offset_slice_the_result() {
    let harness = Harness::new();
    seed_users(&harness);

    let plan = PlanNode::Limit {
        limit: Expression::Literal {
            value: Value::Int(1),
            data_type: DataType::Int,
        },
        child: Box::new(PlanNode::Offset {
            offset: Expression::Literal {
                value: Value::Int(1),
                data_type: DataType::Int,
            },
            child: Box::new(PlanNode::Sort {
                fields: vec![SortField {
                    expr: Expression::UnresolvedColumn { name: "id".into() },
                    descending: false,
                }],
                child: Box::new(PlanNode::Project {
                    exprs: vec![Expression::UnresolvedColumn { name: "id".into() }],
                    child: Box::new(PlanNode::UnresolvedTable {
                        database: Some("db".into()),
                        name: "users".into(),
                    }),
                }),
            }),
        }),
    };
    let PlanNode::QueryProcess { child, .. } =
        harness.resolve(plan, "SELECT id FROM users ORDER BY id LIMIT 1 OFFSET 1")
    else {
        panic!("expected QueryProcess wrapper");
    };
    let rows = harness.run(*child);
    assert_eq!(rows, vec![vec![Value::Int(2)]]);
}

#[test]
fn inner_join_combines_matching_rows() {
    let harness = Harness::new();
    let db = Arc::new(MemoryDatabase::new("db"));
    let orders = Arc::new(MemoryTable::new(
        "orders",
        Schema::new(vec![
            Column::new("id", DataType::Int, false),
            Column::new("user_id", DataType::Int, false),
        ]),
    ));
    orders.insert(vec![Value::Int(100), Value::Int(1)]);
    orders.insert(vec![Value::Int(101), Value::Int(2)]);
    db.add_table(orders);
    let users = Arc::new(MemoryTable::new("users", users_schema()));
    users.insert(vec![Value::Int(1), Value::Text("ada".into()), Value::Int(30)]);
    users.insert(vec![Value::Int(2), Value::Text("bo".into()), Value::Int(25)]);
    users.insert(vec![Value::Int(3), Value::Text("cy".into()), Value::Int(30)]);
    db.add_table(users);
    harness.catalog.add_database(db);

    let left_width = users_schema().len();
    let plan = PlanNode::Join {
        kind: JoinKind::Inner,
        condition: Some(Expression::Function {
            name: "eq".into(),
            args: vec![
                Expression::GetField {
                    index: 0,
                    name: "id".into(),
                    data_type: DataType::Int,
                    nullable: false,
                    source_table: "users".into(),
                },
                Expression::GetField {
                    index: left_width + 1,
                    name: "user_id".into(),
                    data_type: DataType::Int,
                    nullable: false,
                    source_table: "orders".into(),
                },
            ],
            data_type: DataType::Bool,
            nullable: false,
            eval: Arc::new(|args| Ok(Value::Bool(args[0] == args[1]))),
        }),
        left: Box::new(PlanNode::ResolvedTable {
            table: harness.catalog.database("db").unwrap().table("users").unwrap(),
        }),
        right: Box::new(PlanNode::ResolvedTable {
            table: harness.catalog.database("db").unwrap().table("orders").unwrap(),
        }),
    };
    let rows = harness.run(plan);
    assert_eq!(rows.len(), 2);
}

#[test]
fn describe_query_renders_the_plan_tree() {
    let harness = Harness::new();
    seed_users(&harness);

    let plan = PlanNode::DescribeQuery {
        format: "tree".into(),
        child: Box::new(PlanNode::Project {
            exprs: vec![Expression::Star { table: None }],
            child: Box::new(PlanNode::UnresolvedTable {
                database: Some("db".into()),
                name: "users".into(),
            }),
        }),
    };
    let resolved = harness.resolve(plan, "DESCRIBE SELECT * FROM users");
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper");
    };
    let rows = harness.run(*child);
    assert_eq!(rows.len(), 1);
    let Value::Text(tree) = &rows[0][0] else {
        panic!("expected a text plan rendering");
    };
    assert!(tree.contains("Project"));
    assert!(tree.contains("Table"));
}

#[test]
fn only_the_outermost_query_process_wrapper_survives_a_subquery() {
    let harness = Harness::new();
    seed_users(&harness);

    let subquery = PlanNode::SubqueryAlias {
        name: "u".into(),
        child: Box::new(PlanNode::Project {
            exprs: vec![Expression::Star { table: None }],
            child: Box::new(PlanNode::UnresolvedTable {
                database: Some("db".into()),
                name: "users".into(),
            }),
        }),
    };
    let plan = PlanNode::Project {
        exprs: vec![Expression::Star { table: None }],
        child: Box::new(subquery),
    };

    let resolved = harness.resolve(plan, "SELECT * FROM (SELECT * FROM users) AS u");
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected a QueryProcess wrapper at the root");
    };
    // The subquery's own analysis pass wraps its root in `QueryProcess` too;
    // that inner wrapper must not survive splicing back into the outer plan.
    let PlanNode::Project { child: inner, .. } = *child else {
        panic!("expected the outer Project to have survived unwrapped");
    };
    let PlanNode::SubqueryAlias { child: subquery_child, .. } = *inner else {
        panic!("expected the SubqueryAlias to have survived unwrapped");
    };
    assert!(
        !matches!(*subquery_child, PlanNode::QueryProcess { .. }),
        "subquery child must not carry its own QueryProcess wrapper: {subquery_child:?}"
    );
}

#[test]
fn subquery_alias_schema_renames_columns_to_the_alias() {
    let harness = Harness::new();
    seed_users(&harness);

    let plan = PlanNode::SubqueryAlias {
        name: "u2".into(),
        child: Box::new(PlanNode::Project {
            exprs: vec![Expression::Star { table: None }],
            child: Box::new(PlanNode::UnresolvedTable {
                database: Some("db".into()),
                name: "users".into(),
            }),
        }),
    };

    let resolved = harness.resolve(plan, "SELECT * FROM users AS u2");
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected a QueryProcess wrapper at the root");
    };
    let schema = child.schema().unwrap();
    assert!(schema.0.iter().all(|c| c.source_table == "u2"));
}

#[test]
fn show_databases_lists_every_registered_database() {
    let harness = Harness::new();
    seed_users(&harness);

    let plan = PlanNode::ShowDatabases { catalog: None };
    let resolved = harness.resolve(plan, "SHOW DATABASES");
    let PlanNode::QueryProcess { child, .. } = resolved else {
        panic!("expected QueryProcess wrapper");
    };
    let rows = harness.run(*child);
    assert_eq!(rows, vec![vec![Value::Text("db".into())]]);
}
