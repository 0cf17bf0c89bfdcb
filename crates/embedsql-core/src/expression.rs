use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::{PlanError, PlanResult};
use crate::value::{DataType, Row, Value};

/// A function body, installed by the catalog's function registry once a
/// call site's arguments are known. Identity is irrelevant to structural
/// equality; only the surrounding `name`/`args`/`data_type` matter (see the
/// manual `PartialEq` impl below).
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> PlanResult<Value> + Send + Sync>;

/// Either a symbolic reference awaiting analysis, or a fully resolved,
/// evaluable expression. `*` (`Star`) is a placeholder the analyzer must
/// eliminate before execution; evaluating it is an analyzer bug, reported as
/// a typed error rather than a panic.
#[derive(Clone)]
pub enum Expression {
    /// An unqualified column reference, e.g. `a`.
    UnresolvedColumn { name: SmolStr },
    /// A table-qualified column reference, e.g. `t.a`.
    UnresolvedQualifiedColumn { table: SmolStr, name: SmolStr },
    /// A function call by name, not yet bound to a catalog constructor.
    UnresolvedFunction {
        name: SmolStr,
        args: Vec<Expression>,
    },
    /// `*` or `table.*`.
    Star { table: Option<SmolStr> },
    /// A literal constant.
    Literal { value: Value, data_type: DataType },
    /// A resolved, indexed reference into the input row.
    GetField {
        index: usize,
        name: SmolStr,
        data_type: DataType,
        nullable: bool,
        source_table: SmolStr,
    },
    /// A resolved function call, ready to evaluate.
    Function {
        name: SmolStr,
        args: Vec<Expression>,
        data_type: DataType,
        nullable: bool,
        eval: FunctionImpl,
    },
    /// A resolved aggregate call inside a `GroupBy`'s select list. Unlike
    /// `Function`, this can't be evaluated row-by-row; the group-by iterator
    /// folds it over every row in a group via `AggregateKind::fold`.
    Aggregate {
        kind: AggregateKind,
        arg: Box<Expression>,
        data_type: DataType,
    },
}

/// The handful of aggregate functions the engine folds over a group. Kept as
/// a closed set (rather than a registry constructor like scalar functions)
/// because each one needs per-row accumulation state, not a pure per-row
/// evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<AggregateKind> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateKind::Count),
            "sum" => Some(AggregateKind::Sum),
            "avg" => Some(AggregateKind::Avg),
            "min" => Some(AggregateKind::Min),
            "max" => Some(AggregateKind::Max),
            _ => None,
        }
    }

    /// Folds one more row's argument value into the running accumulator.
    /// `state` is `None` before the first row.
    pub fn fold(self, state: Option<Value>, next: Value) -> PlanResult<Value> {
        if next.is_null() && self != AggregateKind::Count {
            return Ok(state.unwrap_or(Value::Null));
        }
        Ok(match (self, state) {
            (AggregateKind::Count, None) => Value::Int(if next.is_null() { 0 } else { 1 }),
            (AggregateKind::Count, Some(Value::Int(n))) => {
                Value::Int(n + if next.is_null() { 0 } else { 1 })
            }
            (AggregateKind::Sum, None) | (AggregateKind::Avg, None) => next,
            (AggregateKind::Sum, Some(acc)) | (AggregateKind::Avg, Some(acc)) => add_values(acc, next)?,
            (AggregateKind::Min, None) => next,
            (AggregateKind::Min, Some(acc)) => {
                if compare_values(&next, &acc)? == std::cmp::Ordering::Less {
                    next
                } else {
                    acc
                }
            }
            (AggregateKind::Max, None) => next,
            (AggregateKind::Max, Some(acc)) => {
                if compare_values(&next, &acc)? == std::cmp::Ordering::Greater {
                    next
                } else {
                    acc
                }
            }
            (_, Some(other)) => other,
        })
    }

    /// Applied once accumulation finishes; only `Avg` needs a final divide,
    /// carried out by the caller since it alone knows the row count.
    pub fn finish(self, state: Option<Value>, row_count: i64) -> Value {
        match (self, state) {
            (AggregateKind::Avg, Some(Value::Int(n))) if row_count > 0 => {
                Value::Float(n as f64 / row_count as f64)
            }
            (AggregateKind::Avg, Some(Value::Float(n))) if row_count > 0 => {
                Value::Float(n / row_count as f64)
            }
            (AggregateKind::Count, None) => Value::Int(0),
            (_, Some(v)) => v,
            (_, None) => Value::Null,
        }
    }
}

fn add_values(a: Value, b: Value) -> PlanResult<Value> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            Ok(Value::Float(a as f64 + b))
        }
        (a, b) => Err(PlanError::TypeError(
            format!("cannot add {:?} and {:?}", a.data_type(), b.data_type()).into(),
        )),
    }
}

fn compare_values(a: &Value, b: &Value) -> PlanResult<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).ok_or_else(|| PlanError::TypeError("NaN comparison".into()))
        }
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (a, b) => Err(PlanError::TypeError(
            format!("cannot compare {:?} and {:?}", a.data_type(), b.data_type()).into(),
        )),
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        use Expression::*;
        match (self, other) {
            (UnresolvedColumn { name: a }, UnresolvedColumn { name: b }) => a == b,
            (
                UnresolvedQualifiedColumn { table: ta, name: na },
                UnresolvedQualifiedColumn { table: tb, name: nb },
            ) => ta == tb && na == nb,
            (
                UnresolvedFunction { name: na, args: aa },
                UnresolvedFunction { name: nb, args: ab },
            ) => na == nb && aa == ab,
            (Star { table: a }, Star { table: b }) => a == b,
            (
                Literal { value: va, data_type: ta },
                Literal { value: vb, data_type: tb },
            ) => va == vb && ta == tb,
            (
                GetField { index: ia, name: na, data_type: ta, nullable: nua, source_table: sa },
                GetField { index: ib, name: nb, data_type: tb, nullable: nub, source_table: sb },
            ) => ia == ib && na == nb && ta == tb && nua == nub && sa == sb,
            (
                Function { name: na, args: aa, data_type: ta, nullable: nua, .. },
                Function { name: nb, args: ab, data_type: tb, nullable: nub, .. },
            ) => na == nb && aa == ab && ta == tb && nua == nub,
            (
                Aggregate { kind: ka, arg: aa, data_type: ta },
                Aggregate { kind: kb, arg: ab, data_type: tb },
            ) => ka == kb && aa == ab && ta == tb,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Expression::*;
        match self {
            UnresolvedColumn { name } => {
                f.debug_struct("UnresolvedColumn").field("name", name).finish()
            }
            UnresolvedQualifiedColumn { table, name } => f
                .debug_struct("UnresolvedQualifiedColumn")
                .field("table", table)
                .field("name", name)
                .finish(),
            UnresolvedFunction { name, args } => f
                .debug_struct("UnresolvedFunction")
                .field("name", name)
                .field("args", args)
                .finish(),
            Star { table } => f.debug_struct("Star").field("table", table).finish(),
            Literal { value, data_type } => f
                .debug_struct("Literal")
                .field("value", value)
                .field("data_type", data_type)
                .finish(),
            GetField { index, name, data_type, nullable, source_table } => f
                .debug_struct("GetField")
                .field("index", index)
                .field("name", name)
                .field("data_type", data_type)
                .field("nullable", nullable)
                .field("source_table", source_table)
                .finish(),
            Function { name, args, data_type, nullable, eval: _ } => f
                .debug_struct("Function")
                .field("name", name)
                .field("args", args)
                .field("data_type", data_type)
                .field("nullable", nullable)
                .field("eval", &"<fn>")
                .finish(),
            Aggregate { kind, arg, data_type } => f
                .debug_struct("Aggregate")
                .field("kind", kind)
                .field("arg", arg)
                .field("data_type", data_type)
                .finish(),
        }
    }
}

impl Expression {
    pub fn resolved(&self) -> bool {
        match self {
            Expression::UnresolvedColumn { .. }
            | Expression::UnresolvedQualifiedColumn { .. }
            | Expression::UnresolvedFunction { .. }
            | Expression::Star { .. } => false,
            Expression::Literal { .. } | Expression::GetField { .. } => true,
            Expression::Function { args, .. } => args.iter().all(Expression::resolved),
            Expression::Aggregate { arg, .. } => arg.resolved(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal { data_type, .. }
            | Expression::GetField { data_type, .. }
            | Expression::Function { data_type, .. }
            | Expression::Aggregate { data_type, .. } => data_type.clone(),
            _ => DataType::Null,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Expression::GetField { nullable, .. } | Expression::Function { nullable, .. } => {
                *nullable
            }
            Expression::Literal { value, .. } => value.is_null(),
            Expression::Aggregate { .. } => true,
            _ => true,
        }
    }

    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::UnresolvedFunction { args, .. } | Expression::Function { args, .. } => {
                args.iter().collect()
            }
            Expression::Aggregate { arg, .. } => vec![arg.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Rebuilds this node with a replaced argument list. Only meaningful for
    /// the function variants; any other variant must be called with an
    /// empty list.
    pub fn rebuild_with_children(&self, children: Vec<Expression>) -> PlanResult<Expression> {
        match self {
            Expression::UnresolvedFunction { name, .. } => Ok(Expression::UnresolvedFunction {
                name: name.clone(),
                args: children,
            }),
            Expression::Function {
                name,
                data_type,
                nullable,
                eval,
                ..
            } => Ok(Expression::Function {
                name: name.clone(),
                args: children,
                data_type: data_type.clone(),
                nullable: *nullable,
                eval: eval.clone(),
            }),
            Expression::Aggregate { kind, data_type, .. } => {
                let mut children = children;
                if children.len() != 1 {
                    return Err(PlanError::InvalidChildrenNumber {
                        node: "aggregate".into(),
                        expected: 1,
                        actual: children.len(),
                    });
                }
                Ok(Expression::Aggregate {
                    kind: *kind,
                    arg: Box::new(children.remove(0)),
                    data_type: data_type.clone(),
                })
            }
            other => {
                if children.is_empty() {
                    Ok(other.clone())
                } else {
                    Err(PlanError::InvalidChildrenNumber {
                        node: "expression".into(),
                        expected: 0,
                        actual: children.len(),
                    })
                }
            }
        }
    }

    /// Evaluates this expression against a row. `Star` is a placeholder the
    /// analyzer must have eliminated; reaching this branch is an analyzer
    /// bug, surfaced as a typed error.
    pub fn eval(&self, row: &Row) -> PlanResult<Value> {
        match self {
            Expression::Literal { value, .. } => Ok(value.clone()),
            Expression::GetField { index, name, .. } => row
                .get(*index)
                .cloned()
                .ok_or_else(|| PlanError::ColumnNotFound(name.clone())),
            Expression::Function { args, eval, .. } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(row))
                    .collect::<PlanResult<Vec<_>>>()?;
                eval(&values)
            }
            Expression::Star { table } => Err(PlanError::StarPlaceholder(
                table.clone().unwrap_or_else(|| "*".into()),
            )),
            Expression::UnresolvedColumn { name } => Err(PlanError::ColumnNotFound(name.clone())),
            Expression::UnresolvedQualifiedColumn { name, .. } => {
                Err(PlanError::ColumnNotFound(name.clone()))
            }
            Expression::UnresolvedFunction { name, .. } => {
                Err(PlanError::FunctionNotFound(name.clone()))
            }
            Expression::Aggregate { .. } => Err(PlanError::UnsupportedFeature(
                "aggregate expressions are folded by GroupBy, not evaluated per row".into(),
            )),
        }
    }
}

/// Post-order rewrite of an expression's argument list, mirroring
/// [`crate::transform::transform_up`] but threaded through expression
/// children instead of node children.
pub fn transform_expr_up(
    expr: Expression,
    f: &mut impl FnMut(Expression) -> PlanResult<Expression>,
) -> PlanResult<Expression> {
    let children = expr.children().into_iter().cloned().collect::<Vec<_>>();
    let rebuilt = if children.is_empty() {
        expr
    } else {
        let new_children = children
            .into_iter()
            .map(|c| transform_expr_up(c, f))
            .collect::<PlanResult<Vec<_>>>()?;
        expr.rebuild_with_children(new_children)?
    };
    f(rebuilt)
}
