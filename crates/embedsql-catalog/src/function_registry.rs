use std::sync::{Arc, Mutex};

use embedsql_core::{AggregateKind, DataType, Expression, PlanError, PlanResult, Value};
use embedsql_helpers::IndexMap;
use smol_str::SmolStr;

use crate::error::{CatalogError, CatalogResult};

/// A constructor installed under a function name: given the already-resolved
/// argument expressions, it either rejects the call (wrong arity, bad types)
/// or produces a resolved `Expression::Function`. Mirrors `sql.Function1`'s
/// `NewInstance` hook, generalized to any arity.
pub type FunctionConstructor = Arc<dyn Fn(Vec<Expression>) -> PlanResult<Expression> + Send + Sync>;

/// Resolves unresolved function calls by name. Aggregates are recognized
/// separately (see [`AggregateKind::from_name`]) since they fold over a
/// group rather than evaluate per row; this registry only ever produces
/// `Expression::Function`.
pub struct FunctionRegistry {
    constructors: Mutex<IndexMap<SmolStr, FunctionConstructor>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = FunctionRegistry {
            constructors: Mutex::new(IndexMap::default()),
        };
        registry.install_builtins();
        registry
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<SmolStr>, constructor: FunctionConstructor) {
        self.constructors
            .lock()
            .unwrap()
            .insert(name.into(), constructor);
    }

    pub fn resolve(&self, name: &str, args: Vec<Expression>) -> CatalogResult<Expression> {
        let constructors = self.constructors.lock().unwrap();
        let constructor = constructors
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, c)| c.clone())
            .ok_or_else(|| CatalogError::FunctionNotFound(name.into()))?;
        drop(constructors);
        constructor(args)
            .map_err(|e| CatalogError::FunctionCallError(name.into(), e.to_string().into()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.constructors
            .lock()
            .unwrap()
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    fn install_builtins(&mut self) {
        self.register(
            "abs",
            Arc::new(|args| unary(args, "abs", DataType::Int, |v| match v {
                Value::Int(n) => Ok(Value::Int(n.abs())),
                Value::Float(n) => Ok(Value::Float(n.abs())),
                Value::Null => Ok(Value::Null),
                other => Err(PlanError::TypeError(
                    format!("abs() expects a number, got {}", other.data_type()).into(),
                )),
            })),
        );
        self.register(
            "lower",
            Arc::new(|args| unary(args, "lower", DataType::Text, |v| match v {
                Value::Text(s) => Ok(Value::Text(s.to_ascii_lowercase().into())),
                Value::Null => Ok(Value::Null),
                other => Err(PlanError::TypeError(
                    format!("lower() expects text, got {}", other.data_type()).into(),
                )),
            })),
        );
        self.register(
            "upper",
            Arc::new(|args| unary(args, "upper", DataType::Text, |v| match v {
                Value::Text(s) => Ok(Value::Text(s.to_ascii_uppercase().into())),
                Value::Null => Ok(Value::Null),
                other => Err(PlanError::TypeError(
                    format!("upper() expects text, got {}", other.data_type()).into(),
                )),
            })),
        );
        self.register(
            "concat",
            Arc::new(|args| {
                if args.is_empty() {
                    return Err(PlanError::InvalidChildrenNumber {
                        node: "concat".into(),
                        expected: 1,
                        actual: 0,
                    });
                }
                let nullable = args.iter().any(Expression::nullable);
                Ok(Expression::Function {
                    name: "concat".into(),
                    args,
                    data_type: DataType::Text,
                    nullable,
                    eval: Arc::new(|values| {
                        let mut out = String::new();
                        for v in values {
                            match v {
                                Value::Null => return Ok(Value::Null),
                                Value::Text(s) => out.push_str(s),
                                Value::Int(n) => out.push_str(&n.to_string()),
                                Value::Float(n) => out.push_str(&n.to_string()),
                                Value::Bool(b) => out.push_str(&b.to_string()),
                                Value::Array(_) => {
                                    return Err(PlanError::TypeError(
                                        "concat() cannot take an array argument".into(),
                                    ))
                                }
                            }
                        }
                        Ok(Value::Text(out.into()))
                    }),
                })
            }),
        );
    }
}

fn unary(
    mut args: Vec<Expression>,
    name: &'static str,
    data_type: DataType,
    f: impl Fn(Value) -> PlanResult<Value> + Send + Sync + 'static,
) -> PlanResult<Expression> {
    if args.len() != 1 {
        return Err(PlanError::InvalidChildrenNumber {
            node: name.into(),
            expected: 1,
            actual: args.len(),
        });
    }
    let arg = args.remove(0);
    let nullable = arg.nullable();
    Ok(Expression::Function {
        name: name.into(),
        args: vec![arg],
        data_type,
        nullable,
        eval: Arc::new(move |values| f(values[0].clone())),
    })
}

/// Resolves an aggregate call, used by the resolve-functions rule when the
/// function name matches a known aggregate and the call site is a `GroupBy`
/// select expression.
pub fn resolve_aggregate(name: &str, mut args: Vec<Expression>) -> CatalogResult<Expression> {
    let kind = AggregateKind::from_name(name).ok_or_else(|| CatalogError::FunctionNotFound(name.into()))?;
    if args.len() != 1 {
        return Err(CatalogError::FunctionNotFound(name.into()));
    }
    let arg = args.remove(0);
    let data_type = match kind {
        AggregateKind::Count => DataType::Int,
        AggregateKind::Avg => DataType::Float,
        _ => arg.data_type(),
    };
    Ok(Expression::Aggregate {
        kind,
        arg: Box::new(arg),
        data_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedsql_core::Row;

    #[test]
    fn resolves_builtin_scalar() {
        let registry = FunctionRegistry::new();
        let expr = registry
            .resolve(
                "ABS",
                vec![Expression::Literal {
                    value: Value::Int(-3),
                    data_type: DataType::Int,
                }],
            )
            .unwrap();
        let row: Row = vec![];
        assert_eq!(expr.eval(&row).unwrap(), Value::Int(3));
    }

    #[test]
    fn unknown_function_errors() {
        let registry = FunctionRegistry::new();
        assert!(registry.resolve("definitely_not_a_function", vec![]).is_err());
    }

    #[test]
    fn resolves_aggregate() {
        let expr = resolve_aggregate(
            "count",
            vec![Expression::GetField {
                index: 0,
                name: "a".into(),
                data_type: DataType::Int,
                nullable: false,
                source_table: "t".into(),
            }],
        )
        .unwrap();
        assert!(matches!(expr, Expression::Aggregate { kind: AggregateKind::Count, .. }));
    }
}
