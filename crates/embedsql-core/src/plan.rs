use std::sync::Arc;

use smol_str::SmolStr;

use crate::catalog_handle::CatalogHandle;
use crate::error::{PlanError, PlanResult};
use crate::expression::Expression;
use crate::schema::{Column, Schema};
use crate::storage::Table;
use crate::value::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Natural,
    Cross,
}

impl JoinKind {
    fn label(self) -> &'static str {
        match self {
            JoinKind::Inner => "InnerJoin",
            JoinKind::Left => "LeftJoin",
            JoinKind::Right => "RightJoin",
            JoinKind::Natural => "NaturalJoin",
            JoinKind::Cross => "CrossJoin",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub expr: Expression,
    pub descending: bool,
}

/// A node in the logical plan tree. Every variant states its arity through
/// `children()`; nodes carrying their own expressions additionally implement
/// `expressions()`/`rebuild_with_expressions()` so analyzer rules can rewrite
/// expressions without knowing the concrete node shape.
#[derive(Clone)]
pub enum PlanNode {
    UnresolvedTable {
        database: Option<SmolStr>,
        name: SmolStr,
    },
    ResolvedTable {
        table: Arc<dyn Table>,
    },
    Project {
        exprs: Vec<Expression>,
        child: Box<PlanNode>,
    },
    Filter {
        predicate: Expression,
        child: Box<PlanNode>,
    },
    GroupBy {
        select_exprs: Vec<Expression>,
        group_by_exprs: Vec<Expression>,
        child: Box<PlanNode>,
    },
    Having {
        predicate: Expression,
        child: Box<PlanNode>,
    },
    Sort {
        fields: Vec<SortField>,
        child: Box<PlanNode>,
    },
    Limit {
        limit: Expression,
        child: Box<PlanNode>,
    },
    Offset {
        offset: Expression,
        child: Box<PlanNode>,
    },
    Join {
        kind: JoinKind,
        condition: Option<Expression>,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
    Union {
        distinct: bool,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
    Distinct {
        child: Box<PlanNode>,
    },
    SubqueryAlias {
        name: SmolStr,
        child: Box<PlanNode>,
    },
    TableAlias {
        name: SmolStr,
        child: Box<PlanNode>,
    },
    CreateIndex {
        name: SmolStr,
        driver: SmolStr,
        exprs: Vec<Expression>,
        table: Box<PlanNode>,
        catalog: Option<Arc<dyn CatalogHandle>>,
        current_database: SmolStr,
    },
    DropIndex {
        name: SmolStr,
        table_name: SmolStr,
        catalog: Option<Arc<dyn CatalogHandle>>,
        current_database: SmolStr,
    },
    ShowIndexes {
        table: Box<PlanNode>,
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    ShowDatabases {
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    ShowCreateTable {
        database: SmolStr,
        table: SmolStr,
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    ShowProcessList {
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    ShowWarnings,
    ShowTableStatus {
        database: SmolStr,
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    Use {
        database: SmolStr,
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    LockTables {
        tables: Vec<SmolStr>,
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    UnlockTables {
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    DescribeQuery {
        format: SmolStr,
        child: Box<PlanNode>,
    },
    QueryProcess {
        child: Box<PlanNode>,
        catalog: Option<Arc<dyn CatalogHandle>>,
    },
    Generate {
        column: Box<Expression>,
        child: Box<PlanNode>,
    },
    EmptyTable {
        schema: Schema,
    },
}

impl std::fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use PlanNode::*;
        match self {
            UnresolvedTable { database, name } => f
                .debug_struct("UnresolvedTable")
                .field("database", database)
                .field("name", name)
                .finish(),
            ResolvedTable { table: _ } => {
                f.debug_struct("ResolvedTable").field("table", &"<table>").finish()
            }
            Project { exprs, child } => {
                f.debug_struct("Project").field("exprs", exprs).field("child", child).finish()
            }
            Filter { predicate, child } => f
                .debug_struct("Filter")
                .field("predicate", predicate)
                .field("child", child)
                .finish(),
            GroupBy { select_exprs, group_by_exprs, child } => f
                .debug_struct("GroupBy")
                .field("select_exprs", select_exprs)
                .field("group_by_exprs", group_by_exprs)
                .field("child", child)
                .finish(),
            Having { predicate, child } => f
                .debug_struct("Having")
                .field("predicate", predicate)
                .field("child", child)
                .finish(),
            Sort { fields, child } => {
                f.debug_struct("Sort").field("fields", fields).field("child", child).finish()
            }
            Limit { limit, child } => {
                f.debug_struct("Limit").field("limit", limit).field("child", child).finish()
            }
            Offset { offset, child } => {
                f.debug_struct("Offset").field("offset", offset).field("child", child).finish()
            }
            Join { kind, condition, left, right } => f
                .debug_struct("Join")
                .field("kind", kind)
                .field("condition", condition)
                .field("left", left)
                .field("right", right)
                .finish(),
            Union { distinct, left, right } => f
                .debug_struct("Union")
                .field("distinct", distinct)
                .field("left", left)
                .field("right", right)
                .finish(),
            Distinct { child } => f.debug_struct("Distinct").field("child", child).finish(),
            SubqueryAlias { name, child } => f
                .debug_struct("SubqueryAlias")
                .field("name", name)
                .field("child", child)
                .finish(),
            TableAlias { name, child } => f
                .debug_struct("TableAlias")
                .field("name", name)
                .field("child", child)
                .finish(),
            CreateIndex { name, driver, exprs, table, catalog: _, current_database } => f
                .debug_struct("CreateIndex")
                .field("name", name)
                .field("driver", driver)
                .field("exprs", exprs)
                .field("table", table)
                .field("catalog", &"<catalog>")
                .field("current_database", current_database)
                .finish(),
            DropIndex { name, table_name, catalog: _, current_database } => f
                .debug_struct("DropIndex")
                .field("name", name)
                .field("table_name", table_name)
                .field("catalog", &"<catalog>")
                .field("current_database", current_database)
                .finish(),
            ShowIndexes { table, catalog: _ } => f
                .debug_struct("ShowIndexes")
                .field("table", table)
                .field("catalog", &"<catalog>")
                .finish(),
            ShowDatabases { catalog: _ } => {
                f.debug_struct("ShowDatabases").field("catalog", &"<catalog>").finish()
            }
            ShowCreateTable { database, table, catalog: _ } => f
                .debug_struct("ShowCreateTable")
                .field("database", database)
                .field("table", table)
                .field("catalog", &"<catalog>")
                .finish(),
            ShowProcessList { catalog: _ } => {
                f.debug_struct("ShowProcessList").field("catalog", &"<catalog>").finish()
            }
            ShowWarnings => f.debug_struct("ShowWarnings").finish(),
            ShowTableStatus { database, catalog: _ } => f
                .debug_struct("ShowTableStatus")
                .field("database", database)
                .field("catalog", &"<catalog>")
                .finish(),
            Use { database, catalog: _ } => f
                .debug_struct("Use")
                .field("database", database)
                .field("catalog", &"<catalog>")
                .finish(),
            LockTables { tables, catalog: _ } => f
                .debug_struct("LockTables")
                .field("tables", tables)
                .field("catalog", &"<catalog>")
                .finish(),
            UnlockTables { catalog: _ } => {
                f.debug_struct("UnlockTables").field("catalog", &"<catalog>").finish()
            }
            DescribeQuery { format, child } => f
                .debug_struct("DescribeQuery")
                .field("format", format)
                .field("child", child)
                .finish(),
            QueryProcess { child, catalog: _ } => f
                .debug_struct("QueryProcess")
                .field("child", child)
                .field("catalog", &"<catalog>")
                .finish(),
            Generate { column, child } => f
                .debug_struct("Generate")
                .field("column", column)
                .field("child", child)
                .finish(),
            EmptyTable { schema } => {
                f.debug_struct("EmptyTable").field("schema", schema).finish()
            }
        }
    }
}

fn ptr_eq_opt(a: &Option<Arc<dyn CatalogHandle>>, b: &Option<Arc<dyn CatalogHandle>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        use PlanNode::*;
        match (self, other) {
            (UnresolvedTable { database: da, name: na }, UnresolvedTable { database: db, name: nb }) => {
                da == db && na == nb
            }
            (ResolvedTable { table: a }, ResolvedTable { table: b }) => Arc::ptr_eq(a, b),
            (Project { exprs: ea, child: ca }, Project { exprs: eb, child: cb }) => ea == eb && ca == cb,
            (Filter { predicate: pa, child: ca }, Filter { predicate: pb, child: cb }) => {
                pa == pb && ca == cb
            }
            (
                GroupBy { select_exprs: sa, group_by_exprs: ga, child: ca },
                GroupBy { select_exprs: sb, group_by_exprs: gb, child: cb },
            ) => sa == sb && ga == gb && ca == cb,
            (Having { predicate: pa, child: ca }, Having { predicate: pb, child: cb }) => {
                pa == pb && ca == cb
            }
            (Sort { fields: fa, child: ca }, Sort { fields: fb, child: cb }) => fa == fb && ca == cb,
            (Limit { limit: la, child: ca }, Limit { limit: lb, child: cb }) => la == lb && ca == cb,
            (Offset { offset: oa, child: ca }, Offset { offset: ob, child: cb }) => oa == ob && ca == cb,
            (
                Join { kind: ka, condition: cna, left: la, right: ra },
                Join { kind: kb, condition: cnb, left: lb, right: rb },
            ) => ka == kb && cna == cnb && la == lb && ra == rb,
            (
                Union { distinct: da, left: la, right: ra },
                Union { distinct: db, left: lb, right: rb },
            ) => da == db && la == lb && ra == rb,
            (Distinct { child: a }, Distinct { child: b }) => a == b,
            (SubqueryAlias { name: na, child: ca }, SubqueryAlias { name: nb, child: cb }) => {
                na == nb && ca == cb
            }
            (TableAlias { name: na, child: ca }, TableAlias { name: nb, child: cb }) => {
                na == nb && ca == cb
            }
            (
                CreateIndex { name: na, driver: dra, exprs: ea, table: ta, catalog: cga, current_database: cda },
                CreateIndex { name: nb, driver: drb, exprs: eb, table: tb, catalog: cgb, current_database: cdb },
            ) => {
                na == nb
                    && dra == drb
                    && ea == eb
                    && ta == tb
                    && ptr_eq_opt(cga, cgb)
                    && cda == cdb
            }
            (
                DropIndex { name: na, table_name: ta, catalog: cga, current_database: cda },
                DropIndex { name: nb, table_name: tb, catalog: cgb, current_database: cdb },
            ) => na == nb && ta == tb && ptr_eq_opt(cga, cgb) && cda == cdb,
            (
                ShowIndexes { table: ta, catalog: cga },
                ShowIndexes { table: tb, catalog: cgb },
            ) => ta == tb && ptr_eq_opt(cga, cgb),
            (ShowDatabases { catalog: a }, ShowDatabases { catalog: b }) => ptr_eq_opt(a, b),
            (
                ShowCreateTable { database: da, table: ta, catalog: ca },
                ShowCreateTable { database: db, table: tb, catalog: cb },
            ) => da == db && ta == tb && ptr_eq_opt(ca, cb),
            (ShowProcessList { catalog: a }, ShowProcessList { catalog: b }) => ptr_eq_opt(a, b),
            (ShowWarnings, ShowWarnings) => true,
            (
                ShowTableStatus { database: da, catalog: ca },
                ShowTableStatus { database: db, catalog: cb },
            ) => da == db && ptr_eq_opt(ca, cb),
            (Use { database: da, catalog: ca }, Use { database: db, catalog: cb }) => {
                da == db && ptr_eq_opt(ca, cb)
            }
            (LockTables { tables: ta, catalog: ca }, LockTables { tables: tb, catalog: cb }) => {
                ta == tb && ptr_eq_opt(ca, cb)
            }
            (UnlockTables { catalog: a }, UnlockTables { catalog: b }) => ptr_eq_opt(a, b),
            (
                DescribeQuery { format: fa, child: ca },
                DescribeQuery { format: fb, child: cb },
            ) => fa == fb && ca == cb,
            (
                QueryProcess { child: a, catalog: ca },
                QueryProcess { child: b, catalog: cb },
            ) => a == b && ptr_eq_opt(ca, cb),
            (Generate { column: ga, child: ca }, Generate { column: gb, child: cb }) => {
                ga == gb && ca == cb
            }
            (EmptyTable { schema: a }, EmptyTable { schema: b }) => a == b,
            _ => false,
        }
    }
}

impl PlanNode {
    pub fn name(&self) -> &'static str {
        use PlanNode::*;
        match self {
            UnresolvedTable { .. } => "UnresolvedTable",
            ResolvedTable { .. } => "Table",
            Project { .. } => "Project",
            Filter { .. } => "Filter",
            GroupBy { .. } => "GroupBy",
            Having { .. } => "Having",
            Sort { .. } => "Sort",
            Limit { .. } => "Limit",
            Offset { .. } => "Offset",
            Join { kind, .. } => kind.label(),
            Union { .. } => "Union",
            Distinct { .. } => "Distinct",
            SubqueryAlias { .. } => "SubqueryAlias",
            TableAlias { .. } => "TableAlias",
            CreateIndex { .. } => "CreateIndex",
            DropIndex { .. } => "DropIndex",
            ShowIndexes { .. } => "ShowIndexes",
            ShowDatabases { .. } => "ShowDatabases",
            ShowCreateTable { .. } => "ShowCreateTable",
            ShowProcessList { .. } => "ShowProcessList",
            ShowWarnings => "ShowWarnings",
            ShowTableStatus { .. } => "ShowTableStatus",
            Use { .. } => "Use",
            LockTables { .. } => "LockTables",
            UnlockTables { .. } => "UnlockTables",
            DescribeQuery { .. } => "DescribeQuery",
            QueryProcess { .. } => "QueryProcess",
            Generate { .. } => "Generate",
            EmptyTable { .. } => "EmptyTable",
        }
    }

    /// Opaque nodes stop column resolution and predicate pushdown from
    /// crossing their boundary: a subquery alias's inner names are not
    /// visible outside it, and a describe wrapper's child is a different
    /// query scope entirely.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            PlanNode::SubqueryAlias { .. } | PlanNode::DescribeQuery { .. }
        )
    }

    pub fn children(&self) -> Vec<&PlanNode> {
        use PlanNode::*;
        match self {
            UnresolvedTable { .. } | ResolvedTable { .. } | ShowDatabases { .. }
            | ShowCreateTable { .. } | ShowProcessList { .. } | ShowTableStatus { .. }
            | Use { .. } | LockTables { .. } | UnlockTables { .. } | EmptyTable { .. }
            | ShowWarnings => Vec::new(),
            Project { child, .. }
            | Filter { child, .. }
            | GroupBy { child, .. }
            | Having { child, .. }
            | Sort { child, .. }
            | Limit { child, .. }
            | Offset { child, .. }
            | Distinct { child }
            | SubqueryAlias { child, .. }
            | TableAlias { child, .. }
            | DescribeQuery { child, .. }
            | QueryProcess { child, .. }
            | Generate { child, .. } => vec![child.as_ref()],
            Join { left, right, .. } | Union { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            CreateIndex { table, .. } | ShowIndexes { table, .. } => vec![table.as_ref()],
            DropIndex { .. } => Vec::new(),
        }
    }

    pub fn rebuild_with_children(&self, mut children: Vec<PlanNode>) -> PlanResult<PlanNode> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(PlanError::InvalidChildrenNumber {
                node: self.name().into(),
                expected,
                actual: children.len(),
            });
        }
        use PlanNode::*;
        Ok(match self {
            UnresolvedTable { database, name } => UnresolvedTable {
                database: database.clone(),
                name: name.clone(),
            },
            ResolvedTable { table } => ResolvedTable { table: table.clone() },
            Project { exprs, .. } => Project {
                exprs: exprs.clone(),
                child: Box::new(children.remove(0)),
            },
            Filter { predicate, .. } => Filter {
                predicate: predicate.clone(),
                child: Box::new(children.remove(0)),
            },
            GroupBy { select_exprs, group_by_exprs, .. } => GroupBy {
                select_exprs: select_exprs.clone(),
                group_by_exprs: group_by_exprs.clone(),
                child: Box::new(children.remove(0)),
            },
            Having { predicate, .. } => Having {
                predicate: predicate.clone(),
                child: Box::new(children.remove(0)),
            },
            Sort { fields, .. } => Sort {
                fields: fields.clone(),
                child: Box::new(children.remove(0)),
            },
            Limit { limit, .. } => Limit {
                limit: limit.clone(),
                child: Box::new(children.remove(0)),
            },
            Offset { offset, .. } => Offset {
                offset: offset.clone(),
                child: Box::new(children.remove(0)),
            },
            Join { kind, condition, .. } => Join {
                kind: *kind,
                condition: condition.clone(),
                left: Box::new(children.remove(0)),
                right: Box::new(children.remove(0)),
            },
            Union { distinct, .. } => Union {
                distinct: *distinct,
                left: Box::new(children.remove(0)),
                right: Box::new(children.remove(0)),
            },
            Distinct { .. } => Distinct {
                child: Box::new(children.remove(0)),
            },
            SubqueryAlias { name, .. } => SubqueryAlias {
                name: name.clone(),
                child: Box::new(children.remove(0)),
            },
            TableAlias { name, .. } => TableAlias {
                name: name.clone(),
                child: Box::new(children.remove(0)),
            },
            CreateIndex { name, driver, exprs, catalog, current_database, .. } => CreateIndex {
                name: name.clone(),
                driver: driver.clone(),
                exprs: exprs.clone(),
                table: Box::new(children.remove(0)),
                catalog: catalog.clone(),
                current_database: current_database.clone(),
            },
            DropIndex { name, table_name, catalog, current_database } => DropIndex {
                name: name.clone(),
                table_name: table_name.clone(),
                catalog: catalog.clone(),
                current_database: current_database.clone(),
            },
            ShowIndexes { catalog, .. } => ShowIndexes {
                table: Box::new(children.remove(0)),
                catalog: catalog.clone(),
            },
            ShowDatabases { catalog } => ShowDatabases { catalog: catalog.clone() },
            ShowCreateTable { database, table, catalog } => ShowCreateTable {
                database: database.clone(),
                table: table.clone(),
                catalog: catalog.clone(),
            },
            ShowProcessList { catalog } => ShowProcessList { catalog: catalog.clone() },
            ShowWarnings => ShowWarnings,
            ShowTableStatus { database, catalog } => ShowTableStatus {
                database: database.clone(),
                catalog: catalog.clone(),
            },
            Use { database, catalog } => Use {
                database: database.clone(),
                catalog: catalog.clone(),
            },
            LockTables { tables, catalog } => LockTables {
                tables: tables.clone(),
                catalog: catalog.clone(),
            },
            UnlockTables { catalog } => UnlockTables { catalog: catalog.clone() },
            DescribeQuery { format, .. } => DescribeQuery {
                format: format.clone(),
                child: Box::new(children.remove(0)),
            },
            QueryProcess { catalog, .. } => QueryProcess {
                child: Box::new(children.remove(0)),
                catalog: catalog.clone(),
            },
            Generate { column, .. } => Generate {
                column: column.clone(),
                child: Box::new(children.remove(0)),
            },
            EmptyTable { schema } => EmptyTable { schema: schema.clone() },
        })
    }

    /// Expressions this node carries directly (not those of its children).
    /// Nodes without their own expressions return an empty list.
    pub fn expressions(&self) -> Vec<&Expression> {
        use PlanNode::*;
        match self {
            Project { exprs, .. } => exprs.iter().collect(),
            Filter { predicate, .. } | Having { predicate, .. } => vec![predicate],
            GroupBy { select_exprs, group_by_exprs, .. } => {
                select_exprs.iter().chain(group_by_exprs.iter()).collect()
            }
            Sort { fields, .. } => fields.iter().map(|f| &f.expr).collect(),
            Limit { limit, .. } => vec![limit],
            Offset { offset, .. } => vec![offset],
            Join { condition: Some(c), .. } => vec![c],
            CreateIndex { exprs, .. } => exprs.iter().collect(),
            Generate { column, .. } => vec![column.as_ref()],
            _ => Vec::new(),
        }
    }

    pub fn rebuild_with_expressions(&self, exprs: Vec<Expression>) -> PlanResult<PlanNode> {
        let expected = self.expressions().len();
        if exprs.len() != expected {
            return Err(PlanError::InvalidChildrenNumber {
                node: self.name().into(),
                expected,
                actual: exprs.len(),
            });
        }
        use PlanNode::*;
        Ok(match self {
            Project { child, .. } => Project {
                exprs,
                child: child.clone(),
            },
            Filter { child, .. } => Filter {
                predicate: exprs.into_iter().next().unwrap(),
                child: child.clone(),
            },
            Having { child, .. } => Having {
                predicate: exprs.into_iter().next().unwrap(),
                child: child.clone(),
            },
            GroupBy { select_exprs, group_by_exprs, child } => {
                let split = select_exprs.len();
                let (select_exprs, group_by_exprs) = {
                    let mut exprs = exprs;
                    let rest = exprs.split_off(split);
                    (exprs, rest)
                };
                debug_assert_eq!(group_by_exprs.len(), group_by_exprs.len());
                GroupBy {
                    select_exprs,
                    group_by_exprs,
                    child: child.clone(),
                }
            }
            Sort { fields, child } => Sort {
                fields: fields
                    .iter()
                    .zip(exprs)
                    .map(|(f, expr)| SortField {
                        expr,
                        descending: f.descending,
                    })
                    .collect(),
                child: child.clone(),
            },
            Limit { child, .. } => Limit {
                limit: exprs.into_iter().next().unwrap(),
                child: child.clone(),
            },
            Offset { child, .. } => Offset {
                offset: exprs.into_iter().next().unwrap(),
                child: child.clone(),
            },
            Join { kind, left, right, .. } => Join {
                kind: *kind,
                condition: exprs.into_iter().next(),
                left: left.clone(),
                right: right.clone(),
            },
            CreateIndex { name, driver, table, catalog, current_database, .. } => CreateIndex {
                name: name.clone(),
                driver: driver.clone(),
                exprs,
                table: table.clone(),
                catalog: catalog.clone(),
                current_database: current_database.clone(),
            },
            Generate { child, .. } => Generate {
                column: Box::new(exprs.into_iter().next().unwrap()),
                child: child.clone(),
            },
            other => other.clone(),
        })
    }

    pub fn resolved(&self) -> bool {
        use PlanNode::*;
        let self_resolved = match self {
            UnresolvedTable { .. } => false,
            CreateIndex { catalog, .. }
            | DropIndex { catalog, .. }
            | ShowIndexes { catalog, .. }
            | ShowDatabases { catalog }
            | ShowCreateTable { catalog, .. }
            | ShowProcessList { catalog }
            | ShowTableStatus { catalog, .. }
            | Use { catalog, .. }
            | LockTables { catalog, .. }
            | UnlockTables { catalog } => catalog.is_some(),
            _ => true,
        };
        self_resolved
            && self.expressions().iter().all(|e| e.resolved())
            && self.children().iter().all(|c| c.resolved())
    }

    pub fn schema(&self) -> PlanResult<Schema> {
        use PlanNode::*;
        match self {
            UnresolvedTable { name, .. } => Err(PlanError::TableNotFound(name.clone())),
            ResolvedTable { table } => Ok(table.schema().clone()),
            Project { exprs, .. } => Ok(Schema::new(
                exprs
                    .iter()
                    .map(|e| Column::new(expr_label(e), e.data_type(), e.nullable()))
                    .collect(),
            )),
            Filter { child, .. } | Having { child, .. } | Sort { child, .. } | Limit { child, .. }
            | Offset { child, .. } | Distinct { child } | QueryProcess { child, .. } => child.schema(),
            GroupBy { select_exprs, .. } => Ok(Schema::new(
                select_exprs
                    .iter()
                    .map(|e| Column::new(expr_label(e), e.data_type(), e.nullable()))
                    .collect(),
            )),
            Join { left, right, .. } => {
                let mut cols = left.schema()?.0;
                cols.extend(right.schema()?.0);
                Ok(Schema::new(cols))
            }
            Union { left, .. } => left.schema(),
            SubqueryAlias { name, child } => Ok(child.schema()?.with_source_table(name.clone())),
            TableAlias { name, child } => Ok(child.schema()?.with_source_table(name.clone())),
            CreateIndex { .. } | DropIndex { .. } | Use { .. } | LockTables { .. } | UnlockTables { .. } => {
                Ok(Schema::empty())
            }
            ShowIndexes { .. } => Ok(Schema::new(vec![
                Column::new("Key_name", DataType::Text, false),
                Column::new("Column_name", DataType::Text, false),
                Column::new("Index_type", DataType::Text, false),
            ])),
            ShowDatabases { .. } => Ok(Schema::new(vec![Column::new(
                "Database",
                DataType::Text,
                false,
            )])),
            ShowCreateTable { .. } => Ok(Schema::new(vec![
                Column::new("Table", DataType::Text, false),
                Column::new("Create Table", DataType::Text, false),
            ])),
            ShowProcessList { .. } => Ok(Schema::new(vec![
                Column::new("Id", DataType::Int, false),
                Column::new("User", DataType::Text, false),
                Column::new("Info", DataType::Text, true),
            ])),
            ShowWarnings => Ok(Schema::new(vec![
                Column::new("Level", DataType::Text, false),
                Column::new("Code", DataType::Int, false),
                Column::new("Message", DataType::Text, false),
            ])),
            ShowTableStatus { .. } => Ok(Schema::new(vec![
                Column::new("Name", DataType::Text, false),
                Column::new("Rows", DataType::Int, true),
            ])),
            DescribeQuery { .. } => Ok(Schema::new(vec![Column::new(
                "plan",
                DataType::Text,
                false,
            )])),
            Generate { column, child } => {
                let mut cols = child.schema()?.0;
                cols.push(Column::new(expr_label(column), column.data_type(), true));
                Ok(Schema::new(cols))
            }
            EmptyTable { schema } => Ok(schema.clone()),
        }
    }

    pub fn tree_string(&self) -> String {
        let mut out = String::new();
        write_tree(self, 0, &mut out);
        out
    }
}

fn expr_label(expr: &Expression) -> SmolStr {
    match expr {
        Expression::GetField { name, .. }
        | Expression::UnresolvedColumn { name }
        | Expression::UnresolvedQualifiedColumn { name, .. } => name.clone(),
        Expression::Function { name, .. } | Expression::UnresolvedFunction { name, .. } => name.clone(),
        Expression::Star { table: Some(t) } => format!("{t}.*").into(),
        Expression::Star { table: None } => "*".into(),
        Expression::Literal { .. } => "literal".into(),
        Expression::Aggregate { kind, .. } => format!("{kind:?}").to_ascii_lowercase().into(),
    }
}

fn write_tree(node: &PlanNode, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(node.name());
    out.push('\n');
    for child in node.children() {
        write_tree(child, depth + 1, out);
    }
}
