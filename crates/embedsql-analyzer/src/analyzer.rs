use std::sync::Arc;

use embedsql_core::{transform_up_respecting_opaque, PlanError, PlanNode};
use tracing::{debug, instrument};

use crate::error::{AnalyzeError, AnalyzeResult};
use crate::rule::{AnalyzerContext, Batch, IterationPolicy};
use crate::rules::{
    strip_subquery_process_wrappers, track_table_process, wrap_root_for_process_tracking, AssignCatalog,
    NormalizeTableNameCasing, PushdownFilterBelowSort, QualifyNaturalJoins, RemoveShowStarPlaceholders,
    ResolveColumns, ResolveFunctions, ResolveStars, ResolveSubqueries, ResolveTables,
};

/// A safety bound on `UntilFixedPoint` batches: if a batch hasn't converged
/// after this many passes, rules are cycling and the analyzer gives up
/// rather than loop forever.
pub const MAX_BATCH_ITERATIONS: usize = 1000;

/// Runs the engine's fixed sequence of rule batches over an unresolved plan
/// until every node is resolved (or a rule reports an error). Each batch
/// runs its rules, bottom-up, respecting opaque node boundaries so a
/// subquery's interior — already resolved by the `resolve_subqueries` batch
/// — is never revisited by the batches that follow it.
pub struct Analyzer {
    batches: Vec<Batch>,
    max_iterations: usize,
}

impl Analyzer {
    pub fn standard() -> Self {
        Analyzer::with_max_iterations(MAX_BATCH_ITERATIONS)
    }

    /// Builds the standard batch sequence with an overridden safety bound;
    /// used by the facade to honor `EngineConfig::max_analyzer_iterations`.
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Analyzer {
            max_iterations,
            batches: vec![
                Batch::once(
                    "parse_time_fixups",
                    vec![Arc::new(RemoveShowStarPlaceholders), Arc::new(NormalizeTableNameCasing)],
                ),
                Batch::once(
                    "resolve_subqueries",
                    vec![Arc::new(ResolveSubqueries { analyze: analyze_plan })],
                ),
                Batch::once("resolve_tables", vec![Arc::new(ResolveTables)]),
                Batch::until_fixed_point("resolve_columns", vec![Arc::new(ResolveColumns)]),
                Batch::until_fixed_point("resolve_functions", vec![Arc::new(ResolveFunctions)]),
                Batch::once("resolve_stars", vec![Arc::new(ResolveStars)]),
                Batch::once(
                    "qualify_coerce_natural_joins",
                    vec![Arc::new(QualifyNaturalJoins)],
                ),
                Batch::until_fixed_point("pushdown", vec![Arc::new(PushdownFilterBelowSort)]),
                Batch::once("assign_catalog", vec![Arc::new(AssignCatalog)]),
            ],
        }
    }

    #[instrument(skip_all, fields(pid = actx.ctx.pid))]
    pub fn analyze(&self, root: PlanNode, actx: &AnalyzerContext) -> AnalyzeResult<PlanNode> {
        let mut node = root;
        for batch in &self.batches {
            node = self.run_batch(batch, node, actx)?;
        }
        let node = track_table_process(node, actx)?;
        let node = strip_subquery_process_wrappers(node)?;
        let keep_warnings = matches!(outermost_relevant_node(&node), PlanNode::ShowWarnings);
        let node = wrap_root_for_process_tracking(node, actx.catalog.clone());
        if !keep_warnings {
            actx.ctx.session.clear_warnings();
        }
        Ok(node)
    }

    fn run_batch(&self, batch: &Batch, mut node: PlanNode, actx: &AnalyzerContext) -> AnalyzeResult<PlanNode> {
        match batch.policy {
            IterationPolicy::Once => {
                node = self.run_rules_once(batch, node, actx)?;
                Ok(node)
            }
            IterationPolicy::UntilFixedPoint => {
                for iteration in 0..self.max_iterations {
                    let next = self.run_rules_once(batch, node.clone(), actx)?;
                    if next == node {
                        debug!(batch = batch.name, iteration, "batch converged");
                        return Ok(next);
                    }
                    node = next;
                }
                Err(AnalyzeError::FixedPointNotReached(self.max_iterations))
            }
        }
    }

    fn run_rules_once(&self, batch: &Batch, node: PlanNode, actx: &AnalyzerContext) -> AnalyzeResult<PlanNode> {
        transform_up_respecting_opaque(node, &mut |mut n| {
            for rule in &batch.rules {
                n = rule.apply(n, actx)?;
            }
            Ok::<_, PlanError>(n)
        })
        .map_err(AnalyzeError::from)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::standard()
    }
}

/// Peels through transparent `Limit`/`Offset` wrappers to find the node a
/// `SHOW WARNINGS` following a previous statement actually cares about:
/// `SELECT ... ; SHOW WARNINGS LIMIT 10` must still see the warnings that
/// statement raised, so clearing them on every `analyze` call would erase
/// them before the client ever asks.
fn outermost_relevant_node(node: &PlanNode) -> &PlanNode {
    match node {
        PlanNode::Limit { child, .. } | PlanNode::Offset { child, .. } => outermost_relevant_node(child),
        other => other,
    }
}

fn analyze_plan(node: PlanNode, actx: &AnalyzerContext) -> embedsql_core::PlanResult<PlanNode> {
    Analyzer::standard().analyze(node, actx).map_err(|e| match e {
        AnalyzeError::Plan(e) => e,
        AnalyzeError::FixedPointNotReached(n) => {
            PlanError::UnsupportedFeature(format!("subquery analysis did not converge after {n} iterations").into())
        }
    })
}
