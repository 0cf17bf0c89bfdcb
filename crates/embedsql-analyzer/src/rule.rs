use std::sync::Arc;

use embedsql_catalog::Catalog;
use embedsql_core::{Context, PlanNode, PlanResult, Schema};

/// Everything a rule needs besides the plan node it's rewriting: the active
/// query context (cancellation, session, pid) and a handle to the shared
/// catalog for table/function/index lookups.
pub struct AnalyzerContext {
    pub ctx: Context,
    pub catalog: Arc<Catalog>,
    /// Schemas of enclosing query scopes, innermost last, available to a
    /// correlated subquery's column resolution. Empty for a top-level
    /// analysis; a front-end analyzing a subquery it already knows is
    /// correlated populates this itself, since `resolve_subqueries` analyzes
    /// each subquery's child as an independent statement and has nothing of
    /// the outer scope resolved yet to thread through automatically.
    pub outer_schemas: Vec<Schema>,
}

impl AnalyzerContext {
    pub fn new(ctx: Context, catalog: Arc<Catalog>) -> Self {
        AnalyzerContext {
            ctx,
            catalog,
            outer_schemas: Vec::new(),
        }
    }
}

/// One rewrite step. Rules never recurse into children themselves — the
/// batch runner threads them through [`embedsql_core::transform_up`] (or a
/// variant of it) so every rule only has to handle the node shapes it cares
/// about and pass everything else through unchanged.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, node: PlanNode, actx: &AnalyzerContext) -> PlanResult<PlanNode>;
}

/// Controls how many times a batch's rules run before the analyzer moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationPolicy {
    /// Run every rule in the batch exactly once.
    Once,
    /// Re-run the batch until the tree stops changing (structural equality),
    /// bounded by the analyzer's safety limit.
    UntilFixedPoint,
}

/// A named group of rules sharing one iteration policy, run in sequence.
pub struct Batch {
    pub name: &'static str,
    pub policy: IterationPolicy,
    pub rules: Vec<Arc<dyn Rule>>,
}

impl Batch {
    pub fn once(name: &'static str, rules: Vec<Arc<dyn Rule>>) -> Self {
        Batch {
            name,
            policy: IterationPolicy::Once,
            rules,
        }
    }

    pub fn until_fixed_point(name: &'static str, rules: Vec<Arc<dyn Rule>>) -> Self {
        Batch {
            name,
            policy: IterationPolicy::UntilFixedPoint,
            rules,
        }
    }
}
