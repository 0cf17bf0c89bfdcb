use std::collections::HashSet;
use std::sync::Arc;

use embedsql_catalog::{resolve_aggregate, ProcessTrackedTable};
use embedsql_core::{
    transform_expr_up, transform_up, CatalogHandle, Column, Expression, IndexSpec, JoinKind, PlanError, PlanNode,
    PlanResult, Schema, SortField, Table,
};
use smol_str::SmolStr;

use crate::rule::{AnalyzerContext, Rule};

fn child_schema(node: &PlanNode) -> PlanResult<Schema> {
    let mut columns = Vec::new();
    for child in node.children() {
        columns.extend(child.schema()?.0);
    }
    Ok(Schema::new(columns))
}

/// Resolves against `schema` first, then falls back to `outer_schemas`,
/// innermost enclosing scope first. The fallback only ever fires for a
/// correlated subquery deliberately seeded with its enclosing scopes
/// through `AnalyzerContext::outer_schemas` — plain, non-correlated queries
/// never reach it, since `schema` alone resolves them.
fn resolve_column_expr(expr: Expression, schema: &Schema, outer_schemas: &[Schema]) -> PlanResult<Expression> {
    match expr {
        Expression::UnresolvedColumn { name } => {
            if let Some(idx) = schema.resolve_column(None, &name)? {
                return Ok(get_field(schema, idx));
            }
            for outer in outer_schemas.iter().rev() {
                if let Some(idx) = outer.resolve_column(None, &name)? {
                    return Ok(get_field(outer, idx));
                }
            }
            Err(PlanError::ColumnNotFound(name))
        }
        Expression::UnresolvedQualifiedColumn { table, name } => {
            if let Some(idx) = schema.resolve_column(Some(&table), &name)? {
                return Ok(get_field(schema, idx));
            }
            for outer in outer_schemas.iter().rev() {
                if let Some(idx) = outer.resolve_column(Some(&table), &name)? {
                    return Ok(get_field(outer, idx));
                }
            }
            Err(PlanError::ColumnNotFound(name))
        }
        other => Ok(other),
    }
}

fn get_field(schema: &Schema, idx: usize) -> Expression {
    let col = &schema.0[idx];
    Expression::GetField {
        index: idx,
        name: col.name.clone(),
        data_type: col.data_type.clone(),
        nullable: col.nullable,
        source_table: col.source_table.clone(),
    }
}

/// Fully analyzes a `SubqueryAlias`'s child as its own statement before the
/// surrounding query treats it as an opaque, already-resolved relation.
/// Run in its own batch, before any rule that resolves outer-scope columns.
///
/// The nested analysis runs against the same `actx`, so it sees whatever
/// `outer_schemas` the caller already seeded, unchanged: the enclosing
/// query's own tables haven't resolved yet at this point in the batch
/// order, so there is nothing new to add to it here.
pub struct ResolveSubqueries {
    pub analyze: fn(PlanNode, &AnalyzerContext) -> PlanResult<PlanNode>,
}

impl Rule for ResolveSubqueries {
    fn name(&self) -> &'static str {
        "resolve_subqueries"
    }

    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::SubqueryAlias { name, child } => {
                let resolved = (self.analyze)(*child, actx)?;
                Ok(PlanNode::SubqueryAlias {
                    name,
                    child: Box::new(resolved),
                })
            }
            other => Ok(other),
        }
    }
}

/// Binds an `UnresolvedTable` to a catalog table, using the session's
/// current database when none was named.
pub struct ResolveTables;

impl Rule for ResolveTables {
    fn name(&self) -> &'static str {
        "resolve_tables"
    }

    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::UnresolvedTable { database, name } => {
                let database = database.unwrap_or_else(|| actx.catalog.current_database());
                let db = actx.catalog.database(&database)?;
                let table = db.table(&name).ok_or_else(|| PlanError::TableNotFound(name.clone()))?;
                Ok(PlanNode::ResolvedTable { table })
            }
            other => Ok(other),
        }
    }
}

/// Replaces unresolved column references with `GetField`s indexed into the
/// node's (already-resolved, since this runs bottom-up) children's combined
/// schema.
pub struct ResolveColumns;

impl Rule for ResolveColumns {
    fn name(&self) -> &'static str {
        "resolve_columns"
    }

    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        let exprs = node.expressions();
        if exprs.is_empty() {
            return Ok(node);
        }
        let schema = child_schema(&node)?;
        let new_exprs = exprs
            .into_iter()
            .cloned()
            .map(|e| transform_expr_up(e, &mut |inner| resolve_column_expr(inner, &schema, &actx.outer_schemas)))
            .collect::<PlanResult<Vec<_>>>()?;
        node.rebuild_with_expressions(new_exprs)
    }
}

/// Binds `UnresolvedFunction` calls to either a registered scalar function
/// or, inside a `GroupBy`'s select list, a known aggregate.
pub struct ResolveFunctions;

impl Rule for ResolveFunctions {
    fn name(&self) -> &'static str {
        "resolve_functions"
    }

    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        let is_group_by = matches!(node, PlanNode::GroupBy { .. });
        let exprs = node.expressions();
        if exprs.is_empty() {
            return Ok(node);
        }
        let registry = actx.catalog.functions();
        let new_exprs = exprs
            .into_iter()
            .cloned()
            .map(|e| {
                transform_expr_up(e, &mut |inner| match inner {
                    Expression::UnresolvedFunction { name, args } => {
                        if is_group_by && embedsql_core::AggregateKind::from_name(&name).is_some() {
                            resolve_aggregate(&name, args)
                                .map_err(|e| PlanError::FunctionNotFound(e.to_string().into()))
                        } else {
                            registry
                                .resolve(&name, args)
                                .map_err(|e| PlanError::FunctionNotFound(e.to_string().into()))
                        }
                    }
                    other => Ok(other),
                })
            })
            .collect::<PlanResult<Vec<_>>>()?;
        node.rebuild_with_expressions(new_exprs)
    }
}

/// Expands `*`/`table.*` in a `Project`'s expression list into one
/// `GetField` per matching column.
pub struct ResolveStars;

impl Rule for ResolveStars {
    fn name(&self) -> &'static str {
        "resolve_stars"
    }

    fn apply(&self, node: PlanNode, _actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::Project { exprs, child } => {
                let schema = child.schema()?;
                let mut expanded = Vec::new();
                for expr in exprs {
                    match &expr {
                        Expression::Star { table } => {
                            for (idx, col) in schema.iter().enumerate() {
                                if let Some(table) = table {
                                    if !col.source_table.eq_ignore_ascii_case(table) {
                                        continue;
                                    }
                                }
                                expanded.push(get_field(&schema, idx));
                            }
                        }
                        _ => expanded.push(expr),
                    }
                }
                Ok(PlanNode::Project {
                    exprs: expanded,
                    child,
                })
            }
            other => Ok(other),
        }
    }
}

/// Turns a `Natural` join into an `Inner` join with an equality condition
/// over every column name the two sides share.
pub struct QualifyNaturalJoins;

impl Rule for QualifyNaturalJoins {
    fn name(&self) -> &'static str {
        "qualify_natural_joins"
    }

    fn apply(&self, node: PlanNode, _actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::Join {
                kind: JoinKind::Natural,
                left,
                right,
                ..
            } => {
                let left_schema = left.schema()?;
                let right_schema = right.schema()?;
                let mut condition = None;
                for (li, lc) in left_schema.iter().enumerate() {
                    if let Some(ri) = right_schema
                        .iter()
                        .position(|rc| rc.name.eq_ignore_ascii_case(&lc.name))
                    {
                        let eq = Expression::Function {
                            name: "=".into(),
                            args: vec![
                                get_field(&left_schema, li),
                                get_field(&right_schema, ri),
                            ],
                            data_type: embedsql_core::DataType::Bool,
                            nullable: false,
                            eval: Arc::new(|args| Ok(embedsql_core::Value::Bool(args[0] == args[1]))),
                        };
                        condition = Some(match condition {
                            None => eq,
                            Some(acc) => Expression::Function {
                                name: "and".into(),
                                args: vec![acc, eq],
                                data_type: embedsql_core::DataType::Bool,
                                nullable: false,
                                eval: Arc::new(|args| {
                                    Ok(embedsql_core::Value::Bool(
                                        args[0] == embedsql_core::Value::Bool(true)
                                            && args[1] == embedsql_core::Value::Bool(true),
                                    ))
                                }),
                            },
                        });
                    }
                }
                Ok(PlanNode::Join {
                    kind: JoinKind::Inner,
                    condition,
                    left,
                    right,
                })
            }
            other => Ok(other),
        }
    }
}

/// Pushes a `Filter` below a `Sort`: sorting fewer rows is strictly
/// cheaper, and `Sort` never changes the schema a predicate resolved
/// against, so the swap is always safe.
pub struct PushdownFilterBelowSort;

impl Rule for PushdownFilterBelowSort {
    fn name(&self) -> &'static str {
        "pushdown_filter_below_sort"
    }

    fn apply(&self, node: PlanNode, _actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::Filter { predicate, child } => match *child {
                PlanNode::Sort { fields, child: inner } => Ok(PlanNode::Sort {
                    fields,
                    child: Box::new(PlanNode::Filter {
                        predicate,
                        child: inner,
                    }),
                }),
                other => Ok(PlanNode::Filter {
                    predicate,
                    child: Box::new(other),
                }),
            },
            other => Ok(other),
        }
    }
}

/// Injects the shared catalog handle and current database name into every
/// DDL and introspection node, which the plan tree only ever references
/// through the narrow `CatalogHandle` trait.
pub struct AssignCatalog;

impl Rule for AssignCatalog {
    fn name(&self) -> &'static str {
        "assign_catalog"
    }

    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        let handle: Arc<dyn CatalogHandle> = actx.catalog.clone();
        let current_database = actx.catalog.current_database();
        Ok(match node {
            PlanNode::CreateIndex { name, driver, exprs, table, .. } => PlanNode::CreateIndex {
                name,
                driver,
                exprs,
                table,
                catalog: Some(handle),
                current_database,
            },
            PlanNode::DropIndex { name, table_name, .. } => PlanNode::DropIndex {
                name,
                table_name,
                catalog: Some(handle),
                current_database,
            },
            PlanNode::ShowIndexes { table, .. } => PlanNode::ShowIndexes {
                table,
                catalog: Some(handle),
            },
            PlanNode::ShowDatabases { .. } => PlanNode::ShowDatabases { catalog: Some(handle) },
            PlanNode::ShowCreateTable { database, table, .. } => PlanNode::ShowCreateTable {
                database,
                table,
                catalog: Some(handle),
            },
            PlanNode::ShowProcessList { .. } => PlanNode::ShowProcessList { catalog: Some(handle) },
            PlanNode::ShowTableStatus { database, .. } => PlanNode::ShowTableStatus {
                database,
                catalog: Some(handle),
            },
            PlanNode::Use { database, .. } => PlanNode::Use {
                database,
                catalog: Some(handle),
            },
            PlanNode::LockTables { tables, .. } => PlanNode::LockTables {
                tables,
                catalog: Some(handle),
            },
            PlanNode::UnlockTables { .. } => PlanNode::UnlockTables { catalog: Some(handle) },
            other => other,
        })
    }
}

/// Drops a `SELECT *`-shaped placeholder projection sitting directly above
/// a `SHOW` variant. The parser emits every statement through the same
/// select-shaped production, so a `SHOW`'s own fixed column list starts out
/// wrapped in a star projection it never needs; this removes it before any
/// other rule has to reason about it.
pub struct RemoveShowStarPlaceholders;

impl Rule for RemoveShowStarPlaceholders {
    fn name(&self) -> &'static str {
        "remove_show_star_placeholders"
    }

    fn apply(&self, node: PlanNode, _actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::Project { exprs, child }
                if matches!(exprs.as_slice(), [Expression::Star { table: None }]) && is_show_variant(&child) =>
            {
                Ok(*child)
            }
            other => Ok(other),
        }
    }
}

fn is_show_variant(node: &PlanNode) -> bool {
    matches!(
        node,
        PlanNode::ShowIndexes { .. }
            | PlanNode::ShowDatabases { .. }
            | PlanNode::ShowCreateTable { .. }
            | PlanNode::ShowProcessList { .. }
            | PlanNode::ShowTableStatus { .. }
            | PlanNode::ShowWarnings
    )
}

/// Lowercases an `UnresolvedTable`'s database/name up front when the
/// catalog is case-insensitive, so every rule downstream (and any error
/// message echoing the name back) sees the same canonical spelling rather
/// than whatever casing the statement happened to use.
pub struct NormalizeTableNameCasing;

impl Rule for NormalizeTableNameCasing {
    fn name(&self) -> &'static str {
        "normalize_table_name_casing"
    }

    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
        match node {
            PlanNode::UnresolvedTable { database, name } if !actx.catalog.case_sensitive => {
                Ok(PlanNode::UnresolvedTable {
                    database: database.map(|d| d.to_ascii_lowercase().into()),
                    name: name.to_ascii_lowercase().into(),
                })
            }
            other => Ok(other),
        }
    }
}

/// Strips a `QueryProcess` wrapper found as the direct child of a
/// `SubqueryAlias`. Each subquery is analyzed as its own independent
/// statement by `ResolveSubqueries`, which means its root gets wrapped for
/// process tracking exactly like a top-level query would be; only the
/// outermost `QueryProcess` (applied by `wrap_root_for_process_tracking`
/// below) should actually survive, so this walk removes every inner one.
/// Uses `transform_up`, not the opaque-respecting variant, since it has to
/// reach through the very opaque boundary it's cleaning up after.
pub fn strip_subquery_process_wrappers(node: PlanNode) -> PlanResult<PlanNode> {
    transform_up(node, &mut |n| match n {
        PlanNode::SubqueryAlias { name, child } => match *child {
            PlanNode::QueryProcess { child: inner, .. } => Ok(PlanNode::SubqueryAlias { name, child: inner }),
            other => Ok(PlanNode::SubqueryAlias {
                name,
                child: Box::new(other),
            }),
        },
        other => Ok(other),
    })
}

/// Walks every `ResolvedTable` in the tree and wraps each distinct one
/// (by name, first occurrence wins) in a `ProcessTrackedTable`, registering
/// a progress item with the catalog so `SHOW PROCESSLIST` can report how
/// far a long-running scan has gotten. Skipped entirely for `CreateIndex`,
/// which tracks its own single table's progress directly around the index
/// build rather than through a generic per-partition wrapper. Tables a
/// prior analysis of the same plan already wrapped (`is_process_tracked`)
/// are left alone rather than nested.
pub fn track_table_process(node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode> {
    if matches!(node, PlanNode::CreateIndex { .. }) {
        return Ok(node);
    }
    let mut seen: HashSet<SmolStr> = HashSet::new();
    transform_up(node, &mut |n| match n {
        PlanNode::ResolvedTable { table } if !table.is_process_tracked() => {
            let name: SmolStr = table.name().into();
            if !seen.insert(name.clone()) {
                return Ok(PlanNode::ResolvedTable { table });
            }
            let total = table.partition_count(&actx.ctx);
            actx.catalog.process_list().add_progress_item(actx.ctx.pid, &name, total);
            let tracked: Arc<dyn Table> =
                Arc::new(ProcessTrackedTable::new(table, actx.catalog.clone(), actx.ctx.pid, name));
            Ok(PlanNode::ResolvedTable { table: tracked })
        }
        other => Ok(other),
    })
}

/// Wraps a fully-analyzed root in `QueryProcess`, unless it's a `CREATE
/// INDEX` (or already wrapped). Applied once, after every other batch, by
/// the analyzer directly rather than through the per-node rule runner,
/// since it only ever touches the root.
pub fn wrap_root_for_process_tracking(
    root: PlanNode,
    catalog: Arc<dyn CatalogHandle>,
) -> PlanNode {
    match root {
        PlanNode::CreateIndex { .. } | PlanNode::QueryProcess { .. } => root,
        other => PlanNode::QueryProcess {
            child: Box::new(other),
            catalog: Some(catalog),
        },
    }
}

/// Registers a `CREATE INDEX`'s index spec with the catalog's index
/// registry exactly once, replacing the unresolved `CreateIndex` node's
/// catalog/database fields the same way `AssignCatalog` does for every
/// other DDL node. Kept separate since its `exprs` must already be
/// resolved `GetField`s (so the index spec can carry plain column names).
pub fn index_spec_from_node(
    database: &str,
    table: &str,
    name: &str,
    driver: &str,
    exprs: &[Expression],
) -> IndexSpec {
    IndexSpec {
        database: database.into(),
        table: table.into(),
        name: name.into(),
        expressions: exprs
            .iter()
            .map(|e| match e {
                Expression::GetField { name, .. } => name.clone(),
                other => SmolStr::from(format!("{other:?}")),
            })
            .collect(),
        driver: driver.into(),
    }
}

pub fn sort_field(expr: Expression, descending: bool) -> SortField {
    SortField { expr, descending }
}
