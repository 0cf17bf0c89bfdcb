use crate::error::PlanResult;
use crate::plan::PlanNode;

/// Rewrites every node bottom-up: children are rebuilt and rewritten first,
/// then `f` runs on the node with its new children already in place. Most
/// analyzer rules (resolve columns, resolve functions) use this so that a
/// parent can inspect its children's already-resolved schemas.
pub fn transform_up(
    node: PlanNode,
    f: &mut impl FnMut(PlanNode) -> PlanResult<PlanNode>,
) -> PlanResult<PlanNode> {
    let children = node.children().into_iter().cloned().collect::<Vec<_>>();
    let rebuilt = if children.is_empty() {
        node
    } else {
        let new_children = children
            .into_iter()
            .map(|c| transform_up(c, f))
            .collect::<PlanResult<Vec<_>>>()?;
        node.rebuild_with_children(new_children)?
    };
    f(rebuilt)
}

/// Rewrites every node top-down: `f` runs on the node first, then its
/// (possibly replaced) children are recursed into. Predicate pushdown uses
/// this to walk from the filter toward the leaves it wants to push past.
pub fn transform_down(
    node: PlanNode,
    f: &mut impl FnMut(PlanNode) -> PlanResult<PlanNode>,
) -> PlanResult<PlanNode> {
    let node = f(node)?;
    let children = node.children().into_iter().cloned().collect::<Vec<_>>();
    if children.is_empty() {
        return Ok(node);
    }
    let new_children = children
        .into_iter()
        .map(|c| transform_down(c, f))
        .collect::<PlanResult<Vec<_>>>()?;
    node.rebuild_with_children(new_children)
}

/// Like [`transform_up`], but does not descend past an opaque node's
/// boundary: `f` still runs on the opaque node itself, but its subtree is
/// left untouched. Column resolution and predicate pushdown use this so a
/// subquery alias's inner scope is never reached from the outer query.
pub fn transform_up_respecting_opaque(
    node: PlanNode,
    f: &mut impl FnMut(PlanNode) -> PlanResult<PlanNode>,
) -> PlanResult<PlanNode> {
    if node.is_opaque() {
        return f(node);
    }
    let children = node.children().into_iter().cloned().collect::<Vec<_>>();
    let rebuilt = if children.is_empty() {
        node
    } else {
        let new_children = children
            .into_iter()
            .map(|c| transform_up_respecting_opaque(c, f))
            .collect::<PlanResult<Vec<_>>>()?;
        node.rebuild_with_children(new_children)?
    };
    f(rebuilt)
}

/// Applies `f` to every expression carried directly by nodes in the tree,
/// bottom-up over the node structure. Used by resolve-functions and
/// resolve-columns, which only ever touch expressions, never node shape.
pub fn transform_expressions_up(
    node: PlanNode,
    f: &mut impl FnMut(&PlanNode, crate::expression::Expression) -> PlanResult<crate::expression::Expression>,
) -> PlanResult<PlanNode> {
    transform_up(node, &mut |node| {
        let exprs = node.expressions().into_iter().cloned().collect::<Vec<_>>();
        if exprs.is_empty() {
            return Ok(node);
        }
        let new_exprs = exprs
            .into_iter()
            .map(|e| {
                crate::expression::transform_expr_up(e, &mut |inner| f(&node, inner))
            })
            .collect::<PlanResult<Vec<_>>>()?;
        node.rebuild_with_expressions(new_exprs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn transform_up_visits_leaves_before_root() {
        let tree = PlanNode::Distinct {
            child: Box::new(PlanNode::EmptyTable {
                schema: Schema::empty(),
            }),
        };
        let mut order = Vec::new();
        transform_up(tree, &mut |n| {
            order.push(n.name());
            Ok(n)
        })
        .unwrap();
        assert_eq!(order, vec!["EmptyTable", "Distinct"]);
    }

    #[test]
    fn transform_up_respecting_opaque_skips_subquery_interior() {
        let tree = PlanNode::SubqueryAlias {
            name: "s".into(),
            child: Box::new(PlanNode::EmptyTable {
                schema: Schema::empty(),
            }),
        };
        let mut visited = Vec::new();
        transform_up_respecting_opaque(tree, &mut |n| {
            visited.push(n.name());
            Ok(n)
        })
        .unwrap();
        assert_eq!(visited, vec!["SubqueryAlias"]);
    }
}
