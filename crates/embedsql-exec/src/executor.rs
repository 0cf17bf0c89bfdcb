use std::sync::Arc;

use embedsql_core::{CatalogHandle, Context, IndexSpec, PlanError, PlanNode, RowIter, Value};
use smol_str::SmolStr;
use tracing::instrument;

use crate::error::{ExecError, ExecResult};
use crate::iterators::{
    DistinctIter, EmptyTableIter, FilterIter, GenerateIter, GroupByIter, JoinIter, LimitIter, OffsetIter,
    ProjectIter, QueryProcessIter, SingleBatchIter, SortIter, TableScanIter, UnionIter,
};
use crate::span_iter::SpanRowIter;

/// Executes a fully-resolved plan node, producing the row iterator that
/// drives the rest of the tree above it. Every branch either recurses into
/// `execute` for its children or, at the leaves, turns catalog state into
/// rows directly.
#[instrument(skip_all, fields(node = node.name()))]
pub fn execute(node: &PlanNode, ctx: &Context) -> ExecResult<Box<dyn RowIter>> {
    let iter: Box<dyn RowIter> = match node {
        PlanNode::UnresolvedTable { .. } => return Err(ExecError::Unresolved("UnresolvedTable")),
        PlanNode::ResolvedTable { table } => Box::new(TableScanIter::new(table.clone(), ctx.clone())?),
        PlanNode::Project { exprs, child } => Box::new(ProjectIter {
            exprs: exprs.clone(),
            child: execute(child, ctx)?,
        }),
        PlanNode::Filter { predicate, child } => Box::new(FilterIter {
            predicate: predicate.clone(),
            child: execute(child, ctx)?,
        }),
        PlanNode::GroupBy {
            select_exprs,
            group_by_exprs,
            child,
        } => Box::new(GroupByIter::new(select_exprs, group_by_exprs, execute(child, ctx)?, ctx)?),
        PlanNode::Having { predicate, child } => Box::new(FilterIter {
            predicate: predicate.clone(),
            child: execute(child, ctx)?,
        }),
        PlanNode::Sort { fields, child } => Box::new(SortIter::new(fields, execute(child, ctx)?, ctx)?),
        PlanNode::Limit { limit, child } => Box::new(LimitIter {
            remaining: eval_int(limit)?,
            child: execute(child, ctx)?,
        }),
        PlanNode::Offset { offset, child } => Box::new(OffsetIter {
            remaining: eval_int(offset)?,
            child: execute(child, ctx)?,
        }),
        PlanNode::Join {
            kind,
            condition,
            left,
            right,
        } => {
            let left_width = left.schema()?.len();
            let right_width = right.schema()?.len();
            Box::new(JoinIter::new(
                *kind,
                condition.clone(),
                execute(left, ctx)?,
                execute(right, ctx)?,
                left_width,
                right_width,
            )?)
        }
        PlanNode::Union { distinct, left, right } => {
            let union = UnionIter {
                left: execute(left, ctx)?,
                right: execute(right, ctx)?,
                left_done: false,
            };
            if *distinct {
                Box::new(DistinctIter::new(Box::new(union)))
            } else {
                Box::new(union)
            }
        }
        PlanNode::Distinct { child } => Box::new(DistinctIter::new(execute(child, ctx)?)),
        // An alias never reshapes rows, only the schema columns are known
        // under: the rename lives in `PlanNode::schema()`, which callers
        // always consult separately from this iterator.
        PlanNode::SubqueryAlias { child, .. } | PlanNode::TableAlias { child, .. } => execute(child, ctx)?,
        PlanNode::CreateIndex {
            name,
            driver,
            exprs,
            table,
            catalog,
            current_database,
        } => Box::new(execute_create_index(name, driver, exprs, table, catalog, current_database, ctx)?),
        PlanNode::DropIndex {
            name,
            catalog,
            current_database,
            ..
        } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("DropIndex"))?;
            catalog.drop_index(current_database, name)?;
            Box::new(EmptyTableIter)
        }
        PlanNode::ShowIndexes { table, catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("ShowIndexes"))?;
            let table_name = resolved_table_name(table)?;
            let rows = catalog
                .show_indexes(&catalog.current_database(), &table_name)?
                .into_iter()
                .map(|info| {
                    vec![
                        Value::Text(info.name),
                        Value::Text(info.expressions.join(",").into()),
                        Value::Text(info.driver),
                    ]
                })
                .collect();
            Box::new(SingleBatchIter::new(rows))
        }
        PlanNode::ShowDatabases { catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("ShowDatabases"))?;
            let rows = catalog.databases().into_iter().map(|d| vec![Value::Text(d)]).collect();
            Box::new(SingleBatchIter::new(rows))
        }
        PlanNode::ShowCreateTable { database, table, catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("ShowCreateTable"))?;
            let ddl = catalog.show_create_table(database, table)?;
            Box::new(SingleBatchIter::new(vec![vec![
                Value::Text(table.clone()),
                Value::Text(ddl),
            ]]))
        }
        PlanNode::ShowProcessList { catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("ShowProcessList"))?;
            let rows = catalog
                .process_snapshot()
                .into_iter()
                .map(|p| vec![Value::Int(p.pid as i64), Value::Text(p.user), Value::Text(p.query)])
                .collect();
            Box::new(SingleBatchIter::new(rows))
        }
        PlanNode::ShowWarnings => {
            let rows = ctx
                .session
                .warnings()
                .into_iter()
                .map(|message| vec![Value::Text("Warning".into()), Value::Int(0), Value::Text(message)])
                .collect();
            Box::new(SingleBatchIter::new(rows))
        }
        PlanNode::ShowTableStatus { database, catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("ShowTableStatus"))?;
            let rows = catalog
                .show_table_status(database)?
                .into_iter()
                .map(|t| vec![Value::Text(t.name), t.rows.map(Value::Int).unwrap_or(Value::Null)])
                .collect();
            Box::new(SingleBatchIter::new(rows))
        }
        PlanNode::Use { database, catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("Use"))?;
            catalog.use_database(database)?;
            Box::new(EmptyTableIter)
        }
        PlanNode::LockTables { tables, catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("LockTables"))?;
            catalog.lock_tables(tables)?;
            Box::new(EmptyTableIter)
        }
        PlanNode::UnlockTables { catalog } => {
            let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("UnlockTables"))?;
            catalog.unlock_tables()?;
            Box::new(EmptyTableIter)
        }
        PlanNode::DescribeQuery { format, child } => {
            if !format.eq_ignore_ascii_case("tree") {
                return Err(ExecError::Plan(PlanError::InvalidDescribeFormat(format.clone())));
            }
            Box::new(SingleBatchIter::new(vec![vec![Value::Text(child.tree_string().into())]]))
        }
        PlanNode::QueryProcess { child, catalog } => match catalog {
            Some(catalog) => Box::new(QueryProcessIter {
                child: execute(child, ctx)?,
                catalog: catalog.clone(),
                pid: ctx.pid,
                finished: false,
            }),
            None => execute(child, ctx)?,
        },
        PlanNode::Generate { column, child } => {
            Box::new(GenerateIter::new((**column).clone(), execute(child, ctx)?))
        }
        PlanNode::EmptyTable { .. } => Box::new(EmptyTableIter),
    };
    Ok(SpanRowIter::wrap(iter, node.name()))
}

fn eval_int(expr: &embedsql_core::Expression) -> ExecResult<i64> {
    match expr.eval(&Vec::new())? {
        Value::Int(n) => Ok(n),
        other => Err(ExecError::Plan(PlanError::TypeError(
            format!("expected an integer, got {}", other.data_type()).into(),
        ))),
    }
}

fn resolved_table_name(node: &PlanNode) -> ExecResult<SmolStr> {
    match node {
        PlanNode::ResolvedTable { table } => Ok(table.name().into()),
        PlanNode::TableAlias { child, .. } | PlanNode::SubqueryAlias { child, .. } => resolved_table_name(child),
        other => Err(ExecError::Unresolved(other.name())),
    }
}

fn execute_create_index(
    name: &SmolStr,
    driver: &SmolStr,
    exprs: &[embedsql_core::Expression],
    table: &PlanNode,
    catalog: &Option<Arc<dyn CatalogHandle>>,
    current_database: &SmolStr,
    ctx: &Context,
) -> ExecResult<EmptyTableIter> {
    let catalog = catalog.as_ref().ok_or(ExecError::Unresolved("CreateIndex"))?;
    let table_name = resolved_table_name(table)?;
    let column_names = exprs
        .iter()
        .map(|e| match e {
            embedsql_core::Expression::GetField { name, .. } => name.clone(),
            other => SmolStr::from(format!("{other:?}")),
        })
        .collect::<Vec<_>>();
    let spec = IndexSpec {
        database: current_database.clone(),
        table: table_name.clone(),
        name: name.clone(),
        expressions: column_names.clone(),
        driver: driver.clone(),
    };
    let session = catalog.create_index(spec)?;

    let Some(underlying) = resolved_table(table) else {
        return Err(ExecError::Unresolved("CreateIndex"));
    };
    let Some(indexable) = underlying.as_indexable() else {
        return Err(ExecError::Plan(PlanError::UnsupportedFeature(
            format!("table {table_name} does not support indexing").into(),
        )));
    };
    catalog.add_progress_item(ctx.pid, &table_name, underlying.partition_count(ctx));
    let mut rows = indexable.index_key_values(ctx, &column_names)?;
    while rows.next().transpose()?.is_some() {
        catalog.update_progress(ctx.pid, &table_name, 1);
    }
    session.mark_done();
    session.wait_ready();
    catalog.mark_process_done(ctx.pid);
    Ok(EmptyTableIter)
}

fn resolved_table(node: &PlanNode) -> Option<Arc<dyn embedsql_core::Table>> {
    match node {
        PlanNode::ResolvedTable { table } => Some(table.clone()),
        PlanNode::TableAlias { child, .. } | PlanNode::SubqueryAlias { child, .. } => resolved_table(child),
        _ => None,
    }
}
