//! Evaluability analysis.
//!
//! Marks every subtree of a query expression whose value is fixed for the
//! duration of one execution: it reads only constants and captured closure
//! values, so it can be computed on the client and sent as a parameter.
//!
//! A node is evaluatable when all its children are and the node itself is
//! not excluded. Lambda parameters, entity sources, lambdas, and late-bound
//! property accesses are always excluded; an [`EvaluatableFilter`] can
//! exclude more.

use std::marker::PhantomData;

use hashbrown::HashSet;
use strata_core::expression::Expr;

/// Policy deciding which otherwise-closed nodes must stay in the tree.
pub trait EvaluatableFilter: Send + Sync {
    /// Returns false to keep `expr` from being evaluated early.
    fn is_evaluatable(&self, expr: &Expr) -> bool {
        let _ = expr;
        true
    }
}

/// A filter that excludes nothing beyond the built-in rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvaluatableFilter;

impl EvaluatableFilter for NullEvaluatableFilter {}

/// The evaluatable nodes of one expression tree.
///
/// Nodes are identified by address, so the info is only meaningful for the
/// tree it was computed from, which stays borrowed while the info lives.
#[derive(Debug)]
pub struct PartialEvaluationInfo<'a> {
    evaluatable: HashSet<*const Expr>,
    _tree: PhantomData<&'a Expr>,
}

impl<'a> PartialEvaluationInfo<'a> {
    /// Analyzes `root` bottom-up.
    #[must_use]
    pub fn analyze(root: &'a Expr, filter: &dyn EvaluatableFilter) -> Self {
        let mut info = Self {
            evaluatable: HashSet::new(),
            _tree: PhantomData,
        };
        info.visit(root, filter);
        info
    }

    /// Returns true if `expr`, a node of the analyzed tree, is evaluatable.
    #[must_use]
    pub fn is_evaluatable(&self, expr: &Expr) -> bool {
        self.evaluatable.contains(&std::ptr::from_ref(expr))
    }

    /// Number of evaluatable nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.evaluatable.len()
    }

    /// Returns true if no node is evaluatable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evaluatable.is_empty()
    }

    fn visit(&mut self, expr: &'a Expr, filter: &dyn EvaluatableFilter) -> bool {
        // Every child is visited so nested closed subtrees are marked too
        let mut children = true;
        for child in expr.children() {
            children &= self.visit(child, filter);
        }
        let evaluatable = children && !is_excluded(expr) && filter.is_evaluatable(expr);
        if evaluatable {
            self.evaluatable.insert(std::ptr::from_ref(expr));
        }
        evaluatable
    }
}

fn is_excluded(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Parameter { .. }
            | Expr::Source { .. }
            | Expr::Lambda { .. }
            | Expr::Property { .. }
            | Expr::QuerySource { .. }
            | Expr::SubQuery(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::types::ValueType;
    use strata_core::expression::LambdaParam;

    fn customer() -> ValueType {
        ValueType::Entity("Customer".to_string())
    }

    fn lambda(body: Expr) -> Expr {
        Expr::lambda(
            vec![LambdaParam {
                name: "c".to_string(),
                ty: customer(),
            }],
            body,
        )
    }

    fn row() -> Expr {
        Expr::parameter("c", customer())
    }

    #[test]
    fn test_captured_values_are_evaluatable() {
        let captured = Expr::capture("city", "London");
        let body = row().member("City", ValueType::String).eq(captured);
        let tree = lambda(body);
        let info = PartialEvaluationInfo::analyze(&tree, &NullEvaluatableFilter);

        let Expr::Lambda { body, .. } = &tree else {
            unreachable!()
        };
        let Expr::Binary { left, right, .. } = body.as_ref() else {
            unreachable!()
        };
        assert!(info.is_evaluatable(right));
        assert!(!info.is_evaluatable(left));
        assert!(!info.is_evaluatable(body));
        assert!(!info.is_evaluatable(&tree));
    }

    #[test]
    fn test_property_wrapper_is_never_evaluatable() {
        let tree = Expr::capture("x", 1).property("Value", ValueType::Int32);
        let info = PartialEvaluationInfo::analyze(&tree, &NullEvaluatableFilter);
        assert!(!info.is_evaluatable(&tree));
        let Expr::Property { target, .. } = &tree else {
            unreachable!()
        };
        assert!(info.is_evaluatable(target));
    }

    #[test]
    fn test_source_blocks_evaluation() {
        let tree = Expr::Source {
            entity: "Customer".to_string(),
        }
        .operator(
            "Take",
            vec![Expr::capture("n", 5)],
            ValueType::Query(Box::new(customer())),
        );
        let info = PartialEvaluationInfo::analyze(&tree, &NullEvaluatableFilter);
        assert!(!info.is_evaluatable(&tree));
        // closure + member + the captured count
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_filter_can_exclude_nodes() {
        struct NoFunctions;
        impl EvaluatableFilter for NoFunctions {
            fn is_evaluatable(&self, expr: &Expr) -> bool {
                !matches!(expr, Expr::Function { .. })
            }
        }
        let now = strata_core::ClientFunction::new("Now", |_| Ok(1.into()));
        let tree = Expr::function(now, Vec::new(), ValueType::Int32);
        assert!(PartialEvaluationInfo::analyze(&tree, &NullEvaluatableFilter).is_evaluatable(&tree));
        assert!(PartialEvaluationInfo::analyze(&tree, &NoFunctions).is_empty());
    }
}
