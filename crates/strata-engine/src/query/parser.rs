//! Query model parser.
//!
//! Converts a parameterized operator chain into a [`QueryModel`]. Each query
//! operator is handled by a clause-construction function looked up in a
//! process-wide [`NodeTypeRegistry`] that is built on first use and never
//! mutated afterwards.
//!
//! Lambdas are resolved against the model being built: their parameter is
//! replaced by the model's current selector, which is expressed over
//! [`Expr::QuerySource`] references to clause items. Operator calls nested
//! inside lambda bodies become [`Expr::SubQuery`] nodes holding their own
//! models.
//!
//! When a body clause follows a result operator that changes which rows it
//! would see (`Take`, `Skip`, `Distinct`, `GroupBy`), the model built so far
//! is wrapped as the source of a new outer model.

use std::sync::LazyLock;

use hashbrown::{HashMap, HashSet};
use smallvec::smallvec;
use strata_common::types::ValueType;
use strata_common::utils::error::{Error, Result};
use strata_core::expression::Expr;
use strata_core::query_model::{
    BodyClause, FromClause, FromSource, JoinClause, Ordering, QueryModel, ResultOperator,
};

use super::evaluatable::{NullEvaluatableFilter, PartialEvaluationInfo};

type NodeHandler = fn(&mut QueryParser, &mut QueryModel, &[Expr]) -> Result<()>;

/// Maps query operator names to clause-construction handlers.
pub struct NodeTypeRegistry {
    handlers: HashMap<&'static str, NodeHandler>,
}

impl NodeTypeRegistry {
    fn build() -> Self {
        let mut handlers: HashMap<&'static str, NodeHandler> = HashMap::new();
        handlers.insert("Where", QueryParser::where_clause);
        handlers.insert("Select", QueryParser::select_clause);
        handlers.insert("OrderBy", |p, m, a| p.order_by(m, a, false));
        handlers.insert("OrderByDescending", |p, m, a| p.order_by(m, a, true));
        handlers.insert("ThenBy", |p, m, a| p.then_by(m, a, false));
        handlers.insert("ThenByDescending", |p, m, a| p.then_by(m, a, true));
        handlers.insert("Join", QueryParser::join);
        handlers.insert("GroupBy", QueryParser::group_by);
        handlers.insert("Include", QueryParser::include);
        handlers.insert("ThenInclude", QueryParser::then_include);
        handlers.insert("Take", |p, m, a| {
            let count = p.argument(a, 0, "Take")?;
            m.result_operators.push(ResultOperator::Take(count));
            Ok(())
        });
        handlers.insert("Skip", |p, m, a| {
            let count = p.argument(a, 0, "Skip")?;
            m.result_operators.push(ResultOperator::Skip(count));
            Ok(())
        });
        handlers.insert("Distinct", |_, m, _| {
            m.result_operators.push(ResultOperator::Distinct);
            Ok(())
        });
        handlers.insert("Count", |p, m, a| p.predicated(m, a, ResultOperator::Count));
        handlers.insert("LongCount", |p, m, a| {
            p.predicated(m, a, ResultOperator::LongCount)
        });
        handlers.insert("Sum", |p, m, a| p.aggregate(m, a, ResultOperator::Sum));
        handlers.insert("Min", |p, m, a| p.aggregate(m, a, ResultOperator::Min));
        handlers.insert("Max", |p, m, a| p.aggregate(m, a, ResultOperator::Max));
        handlers.insert("Average", |p, m, a| {
            p.aggregate(m, a, ResultOperator::Average)
        });
        handlers.insert("First", |p, m, a| {
            p.predicated(m, a, ResultOperator::First { or_default: false })
        });
        handlers.insert("FirstOrDefault", |p, m, a| {
            p.predicated(m, a, ResultOperator::First { or_default: true })
        });
        handlers.insert("Single", |p, m, a| {
            p.predicated(m, a, ResultOperator::Single { or_default: false })
        });
        handlers.insert("SingleOrDefault", |p, m, a| {
            p.predicated(m, a, ResultOperator::Single { or_default: true })
        });
        handlers.insert("Any", |p, m, a| p.predicated(m, a, ResultOperator::Any));
        handlers.insert("All", QueryParser::all);
        handlers.insert("Contains", |p, m, a| {
            let item = p.argument(a, 0, "Contains")?;
            m.result_operators.push(ResultOperator::Contains(item));
            Ok(())
        });
        Self { handlers }
    }

    fn get(&self, method: &str) -> Option<NodeHandler> {
        self.handlers.get(method).copied()
    }

    /// Returns true if `method` is a known query operator.
    #[must_use]
    pub fn is_registered(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Number of registered operators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no operator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The process-wide operator registry.
pub static NODE_TYPES: LazyLock<NodeTypeRegistry> = LazyLock::new(NodeTypeRegistry::build);

/// Parses a parameterized expression into a query model.
///
/// # Errors
///
/// Returns [`Error::UnsupportedShape`] for operators that are not
/// registered and for malformed operator arguments.
pub fn parse_query(expr: &Expr) -> Result<QueryModel> {
    QueryParser::default().parse(expr)
}

/// Builds query models; item names are unique across one parse.
#[derive(Debug, Default)]
pub struct QueryParser {
    names: HashSet<String>,
}

impl QueryParser {
    /// Parses `expr`, which must evaluate to a query.
    ///
    /// # Errors
    ///
    /// See [`parse_query`].
    pub fn parse(&mut self, expr: &Expr) -> Result<QueryModel> {
        match expr {
            Expr::Source { entity } => {
                let item_name = self.fresh_name(&initial(entity));
                Ok(QueryModel::new(FromClause {
                    item_name,
                    item_type: ValueType::Entity(entity.clone()),
                    source: FromSource::Entity(entity.clone()),
                }))
            }
            Expr::Call {
                method,
                target: None,
                args,
                ..
            } => {
                let handler = NODE_TYPES.get(method).ok_or_else(|| {
                    Error::UnsupportedShape(format!("node type '{method}' is not registered"))
                })?;
                let (source, rest) = args.split_first().ok_or_else(|| {
                    Error::UnsupportedShape(format!("operator '{method}' has no source"))
                })?;
                let mut model = self.parse(source)?;
                handler(self, &mut model, rest)?;
                Ok(model)
            }
            Expr::Member {
                target,
                member,
                ty: ValueType::Query(item),
            } => {
                let ValueType::Entity(entity) = item.as_ref() else {
                    return Err(Error::UnsupportedShape(format!(
                        "member '{member}' is not an entity collection"
                    )));
                };
                let item_name = self.fresh_name(&initial(entity));
                Ok(QueryModel::new(FromClause {
                    item_name,
                    item_type: item.as_ref().clone(),
                    source: FromSource::Navigation {
                        owner: target.as_ref().clone(),
                        navigation: member.clone(),
                        target: entity.clone(),
                    },
                }))
            }
            Expr::Parameter {
                ty: ValueType::List(item),
                ..
            } => Ok(self.value_source(expr, item)),
            Expr::NewList { item_type, .. } => Ok(self.value_source(expr, item_type)),
            other => Err(Error::UnsupportedShape(format!(
                "expression '{other}' is not a query source"
            ))),
        }
    }

    fn value_source(&mut self, expr: &Expr, item_type: &ValueType) -> QueryModel {
        let item_name = self.fresh_name("x");
        QueryModel::new(FromClause {
            item_name,
            item_type: item_type.clone(),
            source: FromSource::Value(expr.clone()),
        })
    }

    fn fresh_name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 0;
        while self.names.contains(&name) {
            name = format!("{base}{suffix}");
            suffix += 1;
        }
        self.names.insert(name.clone());
        name
    }

    fn argument(&self, args: &[Expr], index: usize, method: &str) -> Result<Expr> {
        args.get(index).cloned().ok_or_else(|| {
            Error::UnsupportedShape(format!("operator '{method}' is missing an argument"))
        })
    }

    /// Wraps the model as the source of a new outer model when a body clause
    /// or selector would otherwise see rows it must not.
    fn wrap_if(&mut self, model: &mut QueryModel, needs_wrap: impl Fn(&ResultOperator) -> bool) {
        if !model.result_operators.iter().any(needs_wrap) {
            return;
        }
        let item_name = self.fresh_name("t");
        let item_type = model.output_info().item_type().clone();
        let inner = model.clone();
        *model = QueryModel::new(FromClause {
            item_name,
            item_type,
            source: FromSource::SubQuery(Box::new(inner)),
        });
    }

    fn wrap_for_body_clause(&mut self, model: &mut QueryModel) {
        self.wrap_if(model, ResultOperator::requires_subquery_for_body_clauses);
    }

    /// Substitutes the lambda's parameters and converts nested queries.
    fn resolve(&mut self, lambda: &Expr, replacements: &[Expr]) -> Result<Expr> {
        let Expr::Lambda { params, body } = lambda else {
            return Err(Error::UnsupportedShape(format!(
                "expected a lambda, found '{lambda}'"
            )));
        };
        if params.len() != replacements.len() {
            return Err(Error::UnsupportedShape(format!(
                "lambda '{lambda}' takes {} parameters, expected {}",
                params.len(),
                replacements.len()
            )));
        }
        let bindings: Vec<(&str, &Expr)> = params
            .iter()
            .map(|p| p.name.as_str())
            .zip(replacements.iter())
            .collect();
        let body = substitute(body, &bindings)?;
        self.convert_body(&body)
    }

    fn resolve_selector(&mut self, model: &QueryModel, lambda: &Expr) -> Result<Expr> {
        let select = model.select.clone();
        self.resolve(lambda, std::slice::from_ref(&select))
    }

    fn convert_body(&mut self, expr: &Expr) -> Result<Expr> {
        match expr {
            Expr::Call {
                method,
                target: None,
                args,
                ..
            } if args.first().is_some_and(|a| a.ty().is_queryable()) => {
                // A closed call of an unknown operator is a value, not a query
                if !NODE_TYPES.is_registered(method) && is_closed(expr) {
                    return Ok(expr.clone());
                }
                Ok(Expr::SubQuery(Box::new(self.parse(expr)?)))
            }
            Expr::Member { target, member, ty } => {
                let target = self.convert_body(target)?;
                if let Expr::New { members } = &target {
                    if let Some((_, value)) = members.iter().find(|(name, _)| name == member) {
                        return Ok(value.clone());
                    }
                }
                Ok(Expr::Member {
                    target: Box::new(target),
                    member: member.clone(),
                    ty: ty.clone(),
                })
            }
            other => other.map_children(|child| self.convert_body(child)),
        }
    }

    fn where_clause(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let lambda = self.argument(args, 0, "Where")?;
        self.add_where(model, &lambda)
    }

    fn add_where(&mut self, model: &mut QueryModel, lambda: &Expr) -> Result<()> {
        self.wrap_for_body_clause(model);
        let predicate = self.resolve_selector(model, lambda)?;
        model.body_clauses.push(BodyClause::Where(predicate));
        Ok(())
    }

    fn select_clause(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let lambda = self.argument(args, 0, "Select")?;
        self.wrap_if(model, |op| {
            matches!(op, ResultOperator::Distinct | ResultOperator::GroupBy { .. })
        });
        model.select = self.resolve_selector(model, &lambda)?;
        Ok(())
    }

    fn order_by(&mut self, model: &mut QueryModel, args: &[Expr], descending: bool) -> Result<()> {
        let lambda = self.argument(args, 0, "OrderBy")?;
        self.wrap_for_body_clause(model);
        let expr = self.resolve_selector(model, &lambda)?;
        model
            .body_clauses
            .push(BodyClause::OrderBy(vec![Ordering { expr, descending }]));
        Ok(())
    }

    fn then_by(&mut self, model: &mut QueryModel, args: &[Expr], descending: bool) -> Result<()> {
        let lambda = self.argument(args, 0, "ThenBy")?;
        if !model.result_operators.is_empty()
            || !matches!(model.body_clauses.last(), Some(BodyClause::OrderBy(_)))
        {
            return Err(Error::UnsupportedShape(
                "ThenBy must directly follow OrderBy".to_string(),
            ));
        }
        let expr = self.resolve_selector(model, &lambda)?;
        if let Some(BodyClause::OrderBy(orderings)) = model.body_clauses.last_mut() {
            orderings.push(Ordering { expr, descending });
        }
        Ok(())
    }

    fn join(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let [inner, outer_key, inner_key, result] = args else {
            return Err(Error::UnsupportedShape(
                "Join takes an inner source, two key selectors and a result selector".to_string(),
            ));
        };
        self.wrap_for_body_clause(model);

        let inner_model = self.parse(inner)?;
        let item_name = inner_model.main_from.item_name.clone();
        let item_type = inner_model.output_info().item_type().clone();
        let is_plain = inner_model.body_clauses.is_empty()
            && inner_model.result_operators.is_empty()
            && matches!(&inner_model.select, Expr::QuerySource { name, .. } if *name == item_name);
        let inner_source = if is_plain {
            inner_model.main_from.source
        } else {
            FromSource::SubQuery(Box::new(inner_model))
        };
        let item = Expr::QuerySource {
            name: item_name.clone(),
            ty: item_type.clone(),
        };

        let outer_key = self.resolve_selector(model, outer_key)?;
        let inner_key = self.resolve(inner_key, std::slice::from_ref(&item))?;
        let select = model.select.clone();
        let result = self.resolve(result, &[select, item])?;

        model.body_clauses.push(BodyClause::Join(JoinClause {
            item_name,
            item_type,
            inner: inner_source,
            outer_key,
            inner_key,
        }));
        model.select = result;
        Ok(())
    }

    fn group_by(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let lambda = self.argument(args, 0, "GroupBy")?;
        self.wrap_for_body_clause(model);
        let key = self.resolve_selector(model, &lambda)?;
        model.result_operators.push(ResultOperator::GroupBy { key });
        Ok(())
    }

    fn include(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let lambda = self.argument(args, 0, "Include")?;
        let navigation = navigation_name(&lambda)?;
        model
            .result_operators
            .push(ResultOperator::Include(smallvec![navigation]));
        Ok(())
    }

    fn then_include(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let lambda = self.argument(args, 0, "ThenInclude")?;
        let navigation = navigation_name(&lambda)?;
        match model.result_operators.last_mut() {
            Some(ResultOperator::Include(path)) => {
                path.push(navigation);
                Ok(())
            }
            _ => Err(Error::UnsupportedShape(
                "ThenInclude must directly follow Include".to_string(),
            )),
        }
    }

    /// Count, First, Any and friends: an optional predicate becomes a `where`.
    fn predicated(
        &mut self,
        model: &mut QueryModel,
        args: &[Expr],
        operator: ResultOperator,
    ) -> Result<()> {
        if let Some(lambda) = args.first() {
            self.add_where(model, lambda)?;
        }
        model.result_operators.push(operator);
        Ok(())
    }

    /// Sum, Min, Max, Average: an optional selector replaces the selector.
    fn aggregate(
        &mut self,
        model: &mut QueryModel,
        args: &[Expr],
        operator: ResultOperator,
    ) -> Result<()> {
        if let Some(lambda) = args.first() {
            self.select_clause(model, std::slice::from_ref(lambda))?;
        }
        model.result_operators.push(operator);
        Ok(())
    }

    fn all(&mut self, model: &mut QueryModel, args: &[Expr]) -> Result<()> {
        let lambda = self.argument(args, 0, "All")?;
        self.wrap_for_body_clause(model);
        let predicate = self.resolve_selector(model, &lambda)?;
        model.result_operators.push(ResultOperator::All(predicate));
        Ok(())
    }
}

fn initial(entity: &str) -> String {
    entity
        .chars()
        .next()
        .map_or_else(|| "x".to_string(), |c| c.to_ascii_lowercase().to_string())
}

fn is_closed(expr: &Expr) -> bool {
    PartialEvaluationInfo::analyze(expr, &NullEvaluatableFilter).is_evaluatable(expr)
}

fn navigation_name(lambda: &Expr) -> Result<String> {
    match lambda {
        Expr::Lambda { params, body } => match body.as_ref() {
            Expr::Member { target, member, .. }
                if matches!(target.as_ref(), Expr::Parameter { name, .. } if params.iter().any(|p| p.name == *name)) =>
            {
                Ok(member.clone())
            }
            other => Err(Error::UnsupportedShape(format!(
                "'{other}' is not a navigation of the lambda parameter"
            ))),
        },
        other => Err(Error::UnsupportedShape(format!(
            "expected a navigation lambda, found '{other}'"
        ))),
    }
}

/// Replaces lambda parameters by name, respecting shadowing by nested lambdas.
fn substitute(expr: &Expr, bindings: &[(&str, &Expr)]) -> Result<Expr> {
    match expr {
        Expr::Parameter { name, .. } => Ok(bindings
            .iter()
            .find(|(n, _)| *n == name.as_str())
            .map_or_else(|| expr.clone(), |(_, replacement)| (*replacement).clone())),
        Expr::Lambda { params, .. } => {
            let visible: Vec<(&str, &Expr)> = bindings
                .iter()
                .filter(|(n, _)| !params.iter().any(|p| p.name == *n))
                .copied()
                .collect();
            if visible.is_empty() {
                return Ok(expr.clone());
            }
            expr.map_children(|child| substitute(child, &visible))
        }
        _ => expr.map_children(|child| substitute(child, bindings)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use strata_core::metadata::Model;
    use strata_core::query_model::{OutputInfo, SingleKind};
    use strata_core::{Queryable, Row};

    fn model() -> Arc<Model> {
        let mut builder = Model::builder();
        builder
            .entity("Customer", |e| {
                e.property("Id", ValueType::Int32)
                    .optional_property("Name", ValueType::String)
                    .optional_property("City", ValueType::String)
                    .key(&["Id"])
                    .collection("Orders", "Order", &["CustomerId"]);
            })
            .entity("Order", |e| {
                e.property("Id", ValueType::Int32)
                    .property("CustomerId", ValueType::Int32)
                    .property("Total", ValueType::Int32)
                    .key(&["Id"])
                    .required_reference("Customer", "Customer", &["CustomerId"]);
            });
        Arc::new(builder.build().unwrap())
    }

    fn customers() -> Queryable {
        Queryable::new(model(), "Customer")
    }

    #[test]
    fn test_registry_is_populated() {
        assert!(NODE_TYPES.is_registered("Where"));
        assert!(NODE_TYPES.is_registered("ThenInclude"));
        assert!(!NODE_TYPES.is_registered("Aggregate"));
        assert!(!NODE_TYPES.is_empty());
    }

    #[test]
    fn test_where_and_select() {
        let query = customers()
            .filter(|c| c.get("City").eq("London"))
            .select(|c| c.get("Name"));
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(
            model.to_string(),
            "from c in Customer where ([c].City == \"London\") select [c].Name"
        );
        assert_eq!(
            model.output_info(),
            OutputInfo::Sequence {
                item_type: ValueType::String
            }
        );
    }

    #[test]
    fn test_member_of_projection_is_simplified() {
        let query = customers()
            .select(|c| Expr::new_object(vec![("N", c.get("Name")), ("Id", c.get("Id"))]))
            .filter(|x| x.get("Id").gt(3));
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(
            model.to_string(),
            "from c in Customer where ([c].Id > 3) select new { N = [c].Name, Id = [c].Id }"
        );
    }

    #[test]
    fn test_then_by_extends_ordering() {
        let query = customers()
            .order_by(|c| c.get("City"))
            .then_by_descending(|c| c.get("Name"));
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(
            model.to_string(),
            "from c in Customer orderby [c].City asc, [c].Name desc select [c]"
        );
    }

    #[test]
    fn test_then_by_without_order_by_fails() {
        let query = customers().then_by(|c| c.get("Name"));
        assert!(matches!(
            parse_query(query.expr()),
            Err(Error::UnsupportedShape(_))
        ));
    }

    #[test]
    fn test_where_after_take_wraps_subquery() {
        let query = customers()
            .take(5)
            .filter(|c| c.get("Id").gt(1));
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(
            model.to_string(),
            "from t in (from c in Customer select [c] => Take(5)) where ([t].Id > 1) select [t]"
        );
    }

    #[test]
    fn test_select_after_take_does_not_wrap() {
        let query = customers().take(5).select(|c| c.get("Name"));
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(model.to_string(), "from c in Customer select [c].Name => Take(5)");
    }

    #[test]
    fn test_count_with_predicate() {
        let expr = customers().count_where(|c| c.get("City").eq("Paris"));
        let model = parse_query(&expr).unwrap();
        assert_eq!(
            model.to_string(),
            "from c in Customer where ([c].City == \"Paris\") select [c] => Count()"
        );
        assert!(matches!(
            model.output_info(),
            OutputInfo::Single {
                kind: SingleKind::Aggregate { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_aggregate_selector() {
        let expr = Queryable::new(model(), "Order").sum(|o| o.get("Total"));
        let model = parse_query(&expr).unwrap();
        assert_eq!(model.to_string(), "from o in Order select [o].Total => Sum()");
    }

    #[test]
    fn test_nested_collection_becomes_subquery() {
        let query = customers().filter(|c| {
            let m = model();
            let orders = c.get("Orders");
            orders.operator(
                "Any",
                vec![lambda_over(&m, "Order", |o| o.get("Total").gt(100))],
                ValueType::Bool,
            )
        });
        let model = parse_query(query.expr()).unwrap();
        let Some(BodyClause::Where(Expr::SubQuery(sub))) = model.body_clauses.first() else {
            panic!("Expected a subquery predicate, got {model}");
        };
        assert_eq!(
            sub.to_string(),
            "from o in [c].Orders where ([o].Total > 100) select [o] => Any()"
        );
    }

    #[test]
    fn test_join() {
        let m = model();
        let query = Queryable::new(m.clone(), "Order").join(
            Queryable::new(m, "Customer"),
            |o| o.get("CustomerId"),
            |c| c.get("Id"),
            |o, c| Expr::new_object(vec![("Total", o.get("Total")), ("Name", c.get("Name"))]),
        );
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(
            model.to_string(),
            "from o in Order join c in Customer on [o].CustomerId equals [c].Id \
             select new { Total = [o].Total, Name = [c].Name }"
        );
    }

    #[test]
    fn test_include_path() {
        let query = Queryable::new(model(), "Order")
            .include("Customer")
            .then_include("Orders");
        let model = parse_query(query.expr()).unwrap();
        assert_eq!(
            model.result_operators,
            vec![ResultOperator::Include(smallvec![
                "Customer".to_string(),
                "Orders".to_string()
            ])]
        );
    }

    #[test]
    fn test_unregistered_operator() {
        let expr = Expr::Source {
            entity: "Customer".to_string(),
        }
        .operator("Reverse", Vec::new(), ValueType::Query(Box::new(ValueType::Object)));
        let err = parse_query(&expr).unwrap_err();
        assert_eq!(
            err.to_string(),
            Error::UnsupportedShape("node type 'Reverse' is not registered".to_string()).to_string()
        );
    }

    #[test]
    fn test_shadowed_parameter_is_not_substituted() {
        let inner = Expr::lambda(
            vec![strata_core::expression::LambdaParam {
                name: "c".to_string(),
                ty: ValueType::Int32,
            }],
            Expr::parameter("c", ValueType::Int32),
        );
        let replacement = Expr::constant(1);
        let out = substitute(&inner, &[("c", &replacement)]).unwrap();
        assert_eq!(out, inner);
    }

    fn lambda_over(model: &Model, entity: &str, f: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        // Build the lambda through a throwaway queryable so member types resolve
        let probe = Queryable::new(Arc::new(model.clone()), entity).filter(f);
        match probe.into_expr() {
            Expr::Call { mut args, .. } => args.remove(1),
            other => panic!("Expected a call, got {other}"),
        }
    }
}
