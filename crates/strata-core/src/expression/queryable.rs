//! Fluent construction of query expression trees.
//!
//! ```
//! use std::sync::Arc;
//! use strata_common::ValueType;
//! use strata_core::{Expr, Model, Queryable};
//!
//! let mut builder = Model::builder();
//! builder.entity("Customer", |e| {
//!     e.property("Id", ValueType::Int32)
//!         .optional_property("City", ValueType::String)
//!         .key(&["Id"]);
//! });
//! let model = Arc::new(builder.build().unwrap());
//!
//! let query = Queryable::new(model, "Customer")
//!     .filter(|c| c.get("City").eq(Expr::capture("city", "London")))
//!     .take(5);
//! assert!(query.expr().to_string().starts_with("Take(Where(Source<Customer>"));
//! ```

use std::sync::Arc;

use strata_common::types::ValueType;

use super::{Expr, LambdaParam};
use crate::metadata::Model;

/// A lambda parameter in scope while building a query.
///
/// Member lookups are typed from the metadata model, so property access on
/// an entity produces a correctly typed [`Expr::Member`]. Unknown members
/// produce `Object`-typed accesses that fail at compile time.
pub struct Row<'a> {
    model: &'a Model,
    expr: Expr,
}

impl<'a> Row<'a> {
    fn new(model: &'a Model, expr: Expr) -> Self {
        Self { model, expr }
    }

    /// Returns the row itself as an expression.
    #[must_use]
    pub fn expr(&self) -> Expr {
        self.expr.clone()
    }

    /// Accesses a property, navigation, or projected member.
    #[must_use]
    pub fn get(&self, name: &str) -> Expr {
        let ty = self.member_type(name);
        self.expr.clone().member(name, ty)
    }

    /// Accesses a property through the late-binding property wrapper.
    #[must_use]
    pub fn property(&self, name: &str) -> Expr {
        let ty = self.member_type(name);
        self.expr.clone().property(name, ty)
    }

    /// Follows a reference navigation (or projected member) to a nested row.
    #[must_use]
    pub fn nav(&self, name: &str) -> Row<'a> {
        Row::new(self.model, self.get(name))
    }

    fn member_type(&self, name: &str) -> ValueType {
        match self.expr.ty() {
            ValueType::Entity(entity) => {
                let Some(entity) = self.model.find_entity_type(&entity) else {
                    return ValueType::Object;
                };
                if let Some(p) = self.model.find_property(entity, name) {
                    return p.clr_type();
                }
                // Properties of derived types are reachable through the base
                for derived in self.model.derived_types(entity) {
                    if let Some(p) = derived.declared_properties().iter().find(|p| p.name == name) {
                        return p.ty.clone().make_nullable();
                    }
                }
                match self.model.find_navigation(entity, name) {
                    Some(nav) if nav.is_collection => {
                        ValueType::Query(Box::new(ValueType::Entity(nav.target.clone())))
                    }
                    Some(nav) => ValueType::Entity(nav.target.clone()),
                    None => ValueType::Object,
                }
            }
            other => other.member(name).cloned().unwrap_or(ValueType::Object),
        }
    }
}

/// A query under construction over an entity set.
#[derive(Debug, Clone)]
pub struct Queryable {
    model: Arc<Model>,
    expr: Expr,
    item: ValueType,
}

impl Queryable {
    /// Starts a query over all instances of an entity type.
    #[must_use]
    pub fn new(model: Arc<Model>, entity: &str) -> Self {
        Self {
            model,
            expr: Expr::Source {
                entity: entity.to_string(),
            },
            item: ValueType::Entity(entity.to_string()),
        }
    }

    /// Returns the expression built so far.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Consumes the builder, returning the expression.
    #[must_use]
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Returns the current item type.
    #[must_use]
    pub fn item_type(&self) -> &ValueType {
        &self.item
    }

    /// Returns the model the query is built against.
    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    fn param_name(ty: &ValueType) -> String {
        match ty {
            ValueType::Entity(name) => name
                .chars()
                .next()
                .map_or_else(|| "x".to_string(), |c| c.to_ascii_lowercase().to_string()),
            _ => "x".to_string(),
        }
    }

    fn lambda(&self, f: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        Self::lambda_over(&self.model, &self.item, f)
    }

    fn lambda_over(model: &Model, item: &ValueType, f: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        let name = Self::param_name(item);
        let row = Row::new(model, Expr::parameter(name.clone(), item.clone()));
        let body = f(&row);
        Expr::lambda(
            vec![LambdaParam {
                name,
                ty: item.clone(),
            }],
            body,
        )
    }

    fn chain(self, method: &str, args: Vec<Expr>, item: ValueType) -> Self {
        let ty = ValueType::Query(Box::new(item.clone()));
        Self {
            expr: self.expr.operator(method, args, ty),
            item,
            model: self.model,
        }
    }

    fn terminal(self, method: &str, args: Vec<Expr>, ty: ValueType) -> Expr {
        self.expr.operator(method, args, ty)
    }

    /// `Where(predicate)`
    #[must_use]
    pub fn filter(self, predicate: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        let lambda = self.lambda(predicate);
        let item = self.item.clone();
        self.chain("Where", vec![lambda], item)
    }

    /// `Select(selector)`
    #[must_use]
    pub fn select(self, selector: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        let lambda = self.lambda(selector);
        let item = lambda.ty();
        self.chain("Select", vec![lambda], item)
    }

    /// `OrderBy(key)`
    #[must_use]
    pub fn order_by(self, key: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        self.ordering("OrderBy", key)
    }

    /// `OrderByDescending(key)`
    #[must_use]
    pub fn order_by_descending(self, key: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        self.ordering("OrderByDescending", key)
    }

    /// `ThenBy(key)`
    #[must_use]
    pub fn then_by(self, key: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        self.ordering("ThenBy", key)
    }

    /// `ThenByDescending(key)`
    #[must_use]
    pub fn then_by_descending(self, key: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        self.ordering("ThenByDescending", key)
    }

    fn ordering(self, method: &str, key: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        let lambda = self.lambda(key);
        let item = self.item.clone();
        self.chain(method, vec![lambda], item)
    }

    /// `Join(inner, outerKey, innerKey, resultSelector)`
    #[must_use]
    pub fn join(
        self,
        inner: Queryable,
        outer_key: impl FnOnce(&Row<'_>) -> Expr,
        inner_key: impl FnOnce(&Row<'_>) -> Expr,
        result: impl FnOnce(&Row<'_>, &Row<'_>) -> Expr,
    ) -> Self {
        let outer_lambda = self.lambda(outer_key);
        let inner_lambda = Self::lambda_over(&self.model, &inner.item, inner_key);

        let outer_name = Self::param_name(&self.item);
        let mut inner_name = Self::param_name(&inner.item);
        if inner_name == outer_name {
            inner_name.push('0');
        }
        let outer_row = Row::new(&self.model, Expr::parameter(outer_name.clone(), self.item.clone()));
        let inner_row = Row::new(&self.model, Expr::parameter(inner_name.clone(), inner.item.clone()));
        let body = result(&outer_row, &inner_row);
        let item = body.ty();
        let result_lambda = Expr::lambda(
            vec![
                LambdaParam {
                    name: outer_name,
                    ty: self.item.clone(),
                },
                LambdaParam {
                    name: inner_name,
                    ty: inner.item.clone(),
                },
            ],
            body,
        );
        self.chain(
            "Join",
            vec![inner.expr, outer_lambda, inner_lambda, result_lambda],
            item,
        )
    }

    /// `GroupBy(key)`
    #[must_use]
    pub fn group_by(self, key: impl FnOnce(&Row<'_>) -> Expr) -> Self {
        let lambda = self.lambda(key);
        self.chain("GroupBy", vec![lambda], ValueType::Object)
    }

    /// `Include(c => c.Navigation)`
    #[must_use]
    pub fn include(self, navigation: &str) -> Self {
        let lambda = self.lambda(|r| r.get(navigation));
        let item = self.item.clone();
        self.chain("Include", vec![lambda], item)
    }

    /// `ThenInclude(x => x.Navigation)`, continuing from the last included navigation.
    #[must_use]
    pub fn then_include(self, navigation: &str) -> Self {
        let previous = self.last_included_type();
        let lambda = Self::lambda_over(&self.model, &previous, |r| r.get(navigation));
        let item = self.item.clone();
        self.chain("ThenInclude", vec![lambda], item)
    }

    fn last_included_type(&self) -> ValueType {
        if let Expr::Call { method, args, .. } = &self.expr {
            if method == "Include" || method == "ThenInclude" {
                if let Some(Expr::Lambda { body, .. }) = args.get(1) {
                    return body.ty();
                }
            }
        }
        ValueType::Object
    }

    /// `Take(count)`
    #[must_use]
    pub fn take(self, count: impl Into<Expr>) -> Self {
        let item = self.item.clone();
        self.chain("Take", vec![count.into()], item)
    }

    /// `Skip(count)`
    #[must_use]
    pub fn skip(self, count: impl Into<Expr>) -> Self {
        let item = self.item.clone();
        self.chain("Skip", vec![count.into()], item)
    }

    /// `Distinct()`
    #[must_use]
    pub fn distinct(self) -> Self {
        let item = self.item.clone();
        self.chain("Distinct", Vec::new(), item)
    }

    /// `Count()`
    #[must_use]
    pub fn count(self) -> Expr {
        self.terminal("Count", Vec::new(), ValueType::Int32)
    }

    /// `Count(predicate)`
    #[must_use]
    pub fn count_where(self, predicate: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        let lambda = self.lambda(predicate);
        self.terminal("Count", vec![lambda], ValueType::Int32)
    }

    /// `LongCount()`
    #[must_use]
    pub fn long_count(self) -> Expr {
        self.terminal("LongCount", Vec::new(), ValueType::Int64)
    }

    /// `Sum(selector)`
    #[must_use]
    pub fn sum(self, selector: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        self.aggregate("Sum", selector, false)
    }

    /// `Min(selector)`
    #[must_use]
    pub fn min(self, selector: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        self.aggregate("Min", selector, false)
    }

    /// `Max(selector)`
    #[must_use]
    pub fn max(self, selector: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        self.aggregate("Max", selector, false)
    }

    /// `Average(selector)`
    #[must_use]
    pub fn average(self, selector: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        self.aggregate("Average", selector, true)
    }

    fn aggregate(self, method: &str, selector: impl FnOnce(&Row<'_>) -> Expr, average: bool) -> Expr {
        let lambda = self.lambda(selector);
        let item = lambda.ty();
        let ty = if average {
            let base = if item.underlying() == &ValueType::Decimal {
                ValueType::Decimal
            } else {
                ValueType::Float64
            };
            if matches!(item, ValueType::Nullable(_)) {
                base.make_nullable()
            } else {
                base
            }
        } else {
            item
        };
        self.terminal(method, vec![lambda], ty)
    }

    /// `First()`
    #[must_use]
    pub fn first(self) -> Expr {
        let ty = self.item.clone();
        self.terminal("First", Vec::new(), ty)
    }

    /// `First(predicate)`
    #[must_use]
    pub fn first_where(self, predicate: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        let lambda = self.lambda(predicate);
        let ty = self.item.clone();
        self.terminal("First", vec![lambda], ty)
    }

    /// `FirstOrDefault()`
    #[must_use]
    pub fn first_or_default(self) -> Expr {
        let ty = self.item.clone().make_nullable();
        self.terminal("FirstOrDefault", Vec::new(), ty)
    }

    /// `Single()`
    #[must_use]
    pub fn single(self) -> Expr {
        let ty = self.item.clone();
        self.terminal("Single", Vec::new(), ty)
    }

    /// `SingleOrDefault()`
    #[must_use]
    pub fn single_or_default(self) -> Expr {
        let ty = self.item.clone().make_nullable();
        self.terminal("SingleOrDefault", Vec::new(), ty)
    }

    /// `Any()`
    #[must_use]
    pub fn any(self) -> Expr {
        self.terminal("Any", Vec::new(), ValueType::Bool)
    }

    /// `Any(predicate)`
    #[must_use]
    pub fn any_where(self, predicate: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        let lambda = self.lambda(predicate);
        self.terminal("Any", vec![lambda], ValueType::Bool)
    }

    /// `All(predicate)`
    #[must_use]
    pub fn all(self, predicate: impl FnOnce(&Row<'_>) -> Expr) -> Expr {
        let lambda = self.lambda(predicate);
        self.terminal("All", vec![lambda], ValueType::Bool)
    }

    /// `Contains(item)`
    #[must_use]
    pub fn contains(self, item: impl Into<Expr>) -> Expr {
        self.terminal("Contains", vec![item.into()], ValueType::Bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Arc<Model> {
        let mut builder = Model::builder();
        builder
            .entity("Customer", |e| {
                e.property("Id", ValueType::Int32)
                    .optional_property("Name", ValueType::String)
                    .optional_property("Age", ValueType::Int32)
                    .key(&["Id"])
                    .collection("Orders", "Order", &["CustomerId"]);
            })
            .entity("Order", |e| {
                e.property("Id", ValueType::Int32)
                    .property("CustomerId", ValueType::Int32)
                    .key(&["Id"])
                    .required_reference("Customer", "Customer", &["CustomerId"]);
            });
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn test_member_types_come_from_model() {
        let q = Queryable::new(model(), "Customer").select(|c| c.get("Age"));
        assert_eq!(
            q.item_type(),
            &ValueType::Nullable(Box::new(ValueType::Int32))
        );
    }

    #[test]
    fn test_navigation_types() {
        let q = Queryable::new(model(), "Order").select(|o| o.nav("Customer").get("Name"));
        assert_eq!(q.item_type(), &ValueType::String);

        let q = Queryable::new(model(), "Customer").select(|c| c.get("Orders"));
        assert!(q.item_type().is_queryable());
    }

    #[test]
    fn test_unknown_member_is_object() {
        let q = Queryable::new(model(), "Customer").select(|c| c.get("Nope"));
        assert_eq!(q.item_type(), &ValueType::Object);
    }

    #[test]
    fn test_anonymous_projection_members() {
        let q = Queryable::new(model(), "Customer")
            .select(|c| Expr::new_object(vec![("N", c.get("Name")), ("Id", c.get("Id"))]))
            .filter(|x| x.get("Id").gt(3));
        assert_eq!(
            q.expr().to_string(),
            "Where(Select(Source<Customer>, c => new { N = c.Name, Id = c.Id }), x => (x.Id > 3))"
        );
    }

    #[test]
    fn test_join_parameter_names_are_distinct() {
        let m = model();
        let q = Queryable::new(m.clone(), "Customer").join(
            Queryable::new(m, "Customer"),
            |a| a.get("Id"),
            |b| b.get("Id"),
            |a, b| Expr::new_object(vec![("A", a.get("Name")), ("B", b.get("Name"))]),
        );
        assert!(q.expr().to_string().contains("(c, c0) => new { A = c.Name, B = c0.Name }"));
    }

    #[test]
    fn test_terminal_types() {
        let m = model();
        assert_eq!(Queryable::new(m.clone(), "Customer").count().ty(), ValueType::Int32);
        assert_eq!(
            Queryable::new(m.clone(), "Customer").average(|c| c.get("Id")).ty(),
            ValueType::Float64
        );
        assert_eq!(
            Queryable::new(m, "Customer").sum(|c| c.get("Age")).ty(),
            ValueType::Nullable(Box::new(ValueType::Int32))
        );
    }

    #[test]
    fn test_then_include_uses_previous_navigation_type() {
        let q = Queryable::new(model(), "Order")
            .include("Customer")
            .then_include("Orders");
        let text = q.expr().to_string();
        assert!(text.starts_with("ThenInclude(Include(Source<Order>, o => o.Customer), c => c.Orders)"));
    }
}
