//! Query model to relational tree translation.
//!
//! Each clause item is bound to what it stands for in SQL: an entity row
//! under a table alias, a scalar expression, or an anonymous object of
//! further bindings. Selectors and predicates are translated against those
//! bindings. Result operators then reshape the select; an operator that
//! cannot follow the current paging (a second `Take`, a `Skip` after
//! `Take`, an aggregate over a page) pushes the select down into a derived
//! table first.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use strata_adapters::SqlDialect;
use strata_adapters::sql::translators::{MethodCallTranslators, translate_member};
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, MetadataError, Result};
use strata_core::expression::{BinaryOp, Expr, UnaryOp};
use strata_core::metadata::{EntityType, Model, Navigation};
use strata_core::query_model::{BodyClause, FromSource, OutputInfo, QueryModel, ResultOperator};
use strata_core::relational::{InValues, SelectExpr, SqlBinaryOp, SqlExpr, TableSource};
use tracing::trace;

/// An entity row reachable under a table alias.
#[derive(Debug, Clone)]
struct EntityBinding {
    entity: String,
    alias: String,
    /// Property name to column name under `alias`.
    columns: IndexMap<String, String>,
    /// Rows may be missing entirely (outer joins).
    nullable: bool,
    /// Reference navigations loaded alongside, in projection order.
    included: Vec<EntityBinding>,
}

#[derive(Debug, Clone)]
enum Binding {
    Entity(EntityBinding),
    Value(SqlExpr),
    Object(Vec<(String, Binding)>),
}

/// Translation state of one query model.
struct QueryState {
    select: SelectExpr,
    /// Clause items visible to expressions, innermost last.
    scope: Vec<(String, Binding)>,
    binding: Binding,
    /// Reference joins already added, by owner alias and navigation.
    joins: HashMap<(String, String), EntityBinding>,
    /// The projection holds a single aggregate.
    aggregated: bool,
    /// Set when the query reduces to a boolean (`Any`, `All`, `Contains`).
    predicate: Option<SqlExpr>,
}

impl QueryState {
    fn new(scope: Vec<(String, Binding)>) -> Self {
        Self {
            select: SelectExpr::new(),
            scope,
            binding: Binding::Object(Vec::new()),
            joins: HashMap::new(),
            aggregated: false,
            predicate: None,
        }
    }
}

/// Translates query models into relational select expressions.
pub struct RelationalTranslator<'a> {
    model: &'a Model,
    dialect: &'a dyn SqlDialect,
    translators: &'a MethodCallTranslators,
    aliases: HashSet<String>,
}

impl<'a> RelationalTranslator<'a> {
    /// Creates a translator over `model`.
    #[must_use]
    pub fn new(
        model: &'a Model,
        dialect: &'a dyn SqlDialect,
        translators: &'a MethodCallTranslators,
    ) -> Self {
        Self {
            model,
            dialect,
            translators,
            aliases: HashSet::new(),
        }
    }

    /// Translates `query` into a top-level select.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedShape`] for constructs with no SQL form
    /// and a metadata error for unknown entities or members.
    pub fn translate(mut self, query: &QueryModel) -> Result<SelectExpr> {
        let state = self.translate_model(query, Vec::new())?;
        let select = self.finish(state)?;
        trace!(tables = select.tables.len(), columns = select.projection.len(), "Translated query model");
        Ok(select)
    }

    fn finish(&mut self, state: QueryState) -> Result<SelectExpr> {
        if let Some(predicate) = state.predicate {
            let mut select = SelectExpr::new();
            select.projection.push(predicate);
            return Ok(select);
        }
        let mut select = state.select;
        if !state.aggregated {
            let mut names = HashSet::new();
            self.project_into(&mut select, &state.binding, "", &mut names, None)?;
        }
        Ok(select)
    }

    fn translate_model(
        &mut self,
        query: &QueryModel,
        outer_scope: Vec<(String, Binding)>,
    ) -> Result<QueryState> {
        let mut state = QueryState::new(outer_scope);
        let from = &query.main_from;
        let (table, binding, predicate) =
            self.translate_source(&from.item_name, &from.source, &mut state)?;
        state.select.add_table(table);
        if let Some(predicate) = predicate {
            state.select.add_to_predicate(predicate);
        }
        state.scope.push((from.item_name.clone(), binding));

        for clause in &query.body_clauses {
            match clause {
                BodyClause::Where(predicate) => {
                    let predicate = self.translate_scalar(predicate, &mut state)?;
                    state.select.add_to_predicate(predicate);
                }
                BodyClause::OrderBy(orderings) => {
                    state.select.orderings.clear();
                    for ordering in orderings {
                        let key = self.translate_scalar(&ordering.expr, &mut state)?;
                        state.select.add_ordering(key, ordering.descending);
                    }
                }
                BodyClause::Join(join) => {
                    let (table, binding, discriminator) =
                        self.translate_source(&join.item_name, &join.inner, &mut state)?;
                    state.scope.push((join.item_name.clone(), binding));
                    let outer_key = self.translate_shaped(&join.outer_key, &mut state)?;
                    let inner_key = self.translate_shaped(&join.inner_key, &mut state)?;
                    let mut predicate = key_equality(outer_key, inner_key)?;
                    if let Some(discriminator) = discriminator {
                        predicate = SqlExpr::and(predicate, discriminator);
                    }
                    state.select.add_table(TableSource::InnerJoin {
                        table: Box::new(table),
                        predicate,
                    });
                }
            }
        }

        state.binding = self.translate_shaped(&query.select, &mut state)?;
        for operator in &query.result_operators {
            self.apply_result_operator(operator, &mut state)?;
        }
        Ok(state)
    }

    /// Returns the table source for a clause, the binding of its item, and
    /// any predicate restricting its rows.
    fn translate_source(
        &mut self,
        item_name: &str,
        source: &FromSource,
        state: &mut QueryState,
    ) -> Result<(TableSource, Binding, Option<SqlExpr>)> {
        match source {
            FromSource::Entity(name) => {
                let model = self.model;
                let entity = model.entity_type(name)?;
                let alias = self.fresh_alias(item_name);
                let binding = self.table_binding(entity, &alias, false);
                let predicate = self.discriminator_predicate(&binding)?;
                Ok((self.table_source(entity, alias), Binding::Entity(binding), predicate))
            }
            FromSource::SubQuery(inner) => {
                let inner = self.translate_model(inner, state.scope.clone())?;
                let alias = self.fresh_alias(item_name);
                let (select, binding) = self.derive_table(inner, &alias)?;
                Ok((TableSource::SubQuery(Box::new(select)), binding, None))
            }
            FromSource::Navigation {
                owner, navigation, ..
            } => {
                let Binding::Entity(owner) = self.translate_shaped(owner, state)? else {
                    return Err(Error::UnsupportedShape(format!(
                        "navigation '{navigation}' must be reached from an entity"
                    )));
                };
                let model = self.model;
                let owner_type = model.entity_type(&owner.entity)?;
                let nav = find_navigation(model, owner_type, navigation)?;
                if !nav.is_collection {
                    return Err(Error::UnsupportedShape(format!(
                        "reference navigation '{navigation}' cannot be queried as a sequence"
                    )));
                }
                let target = model.entity_type(&nav.target)?;
                let alias = self.fresh_alias(item_name);
                let binding = self.table_binding(target, &alias, false);

                // The foreign key lives on the collection's element type
                let mut predicate = None;
                for (fk, pk) in nav.foreign_key.iter().zip(model.key(owner_type)) {
                    let equal = SqlExpr::equal(
                        self.entity_column(&binding, fk)?,
                        self.entity_column(&owner, &pk.name)?,
                    );
                    predicate = Some(and_opt(predicate, equal));
                }
                if let Some(discriminator) = self.discriminator_predicate(&binding)? {
                    predicate = Some(and_opt(predicate, discriminator));
                }
                Ok((self.table_source(target, alias), Binding::Entity(binding), predicate))
            }
            FromSource::Value(expr) => Err(Error::UnsupportedShape(format!(
                "in-memory sequence '{expr}' cannot be used as a query source"
            ))),
        }
    }

    /// Wraps a translated model as a derived table under `alias`.
    fn derive_table(&mut self, state: QueryState, alias: &str) -> Result<(SelectExpr, Binding)> {
        if state.predicate.is_some() {
            return Err(Error::UnsupportedShape(
                "a boolean query result cannot be used as a source".to_string(),
            ));
        }
        let mut select = state.select;
        let binding = if state.aggregated {
            let aggregate = select.projection.pop().ok_or_else(|| {
                Error::Internal("aggregate query without a projection".to_string())
            })?;
            let column = column_over(alias, "value", &aggregate);
            select.projection = vec![named(aggregate, "value")];
            Binding::Value(column)
        } else {
            let mut names = HashSet::new();
            self.project_into(&mut select, &state.binding, alias, &mut names, None)?
        };
        if !select.is_paged() {
            select.orderings.clear();
        }
        select.alias = Some(alias.to_string());
        Ok((select, binding))
    }

    /// Moves the current select into a derived table and continues over it.
    fn push_down(&mut self, state: &mut QueryState) -> Result<()> {
        let alias = self.fresh_alias("t");
        let mut inner = std::mem::take(&mut state.select);
        let binding = std::mem::replace(&mut state.binding, Binding::Object(Vec::new()));
        let mut names = HashSet::new();
        let outer_binding = self.project_into(&mut inner, &binding, &alias, &mut names, None)?;

        // Orderings survive when their key is projected
        let mut outer = SelectExpr::new();
        for ordering in &inner.orderings {
            let projected = inner
                .projection
                .iter()
                .find(|p| p.unaliased() == &ordering.expr)
                .and_then(SqlExpr::projected_name);
            if let Some(name) = projected {
                outer.add_ordering(column_over(&alias, name, &ordering.expr), ordering.descending);
            }
        }
        if !inner.is_paged() {
            inner.orderings.clear();
        }
        inner.alias = Some(alias);
        outer.add_table(TableSource::SubQuery(Box::new(inner)));

        state.select = outer;
        state.binding = outer_binding;
        state.joins.clear();
        Ok(())
    }

    fn apply_result_operator(
        &mut self,
        operator: &ResultOperator,
        state: &mut QueryState,
    ) -> Result<()> {
        match operator {
            ResultOperator::Take(count) => {
                if state.select.limit.is_some() {
                    self.push_down(state)?;
                }
                state.select.limit = Some(self.translate_scalar(count, state)?);
            }
            ResultOperator::Skip(count) => {
                if state.select.is_paged() {
                    self.push_down(state)?;
                }
                state.select.offset = Some(self.translate_scalar(count, state)?);
            }
            ResultOperator::Distinct => {
                if state.select.is_paged() {
                    self.push_down(state)?;
                }
                state.select.distinct = true;
            }
            ResultOperator::Count => self.aggregate(state, |_| Ok(SqlExpr::Count { long: false }))?,
            ResultOperator::LongCount => {
                self.aggregate(state, |_| Ok(SqlExpr::Count { long: true }))?;
            }
            ResultOperator::Sum => {
                self.aggregate(state, |operand| Ok(SqlExpr::Sum(Box::new(scalar(operand)?))))?;
            }
            ResultOperator::Min => {
                self.aggregate(state, |operand| Ok(SqlExpr::Min(Box::new(scalar(operand)?))))?;
            }
            ResultOperator::Max => {
                self.aggregate(state, |operand| Ok(SqlExpr::Max(Box::new(scalar(operand)?))))?;
            }
            ResultOperator::Average => self.aggregate(state, |operand| {
                let operand = scalar(operand)?;
                let source = operand.ty();
                // Integer averages are computed in floating point
                let (operand, ty) = match source.underlying() {
                    ValueType::Int32 | ValueType::Int64 => (
                        SqlExpr::Convert {
                            operand: Box::new(operand),
                            ty: ValueType::Float64,
                        },
                        ValueType::Float64,
                    ),
                    other => (operand, other.clone()),
                };
                Ok(SqlExpr::Average {
                    operand: Box::new(operand),
                    ty: ty.make_nullable(),
                })
            })?,
            ResultOperator::First { .. } => self.limit_to(state, 1)?,
            // Two rows are enough to detect a second element
            ResultOperator::Single { .. } => self.limit_to(state, 2)?,
            ResultOperator::Any => {
                let select = take_exists_select(state);
                state.predicate = Some(SqlExpr::Exists(Box::new(select)));
            }
            ResultOperator::All(predicate) => {
                let predicate = self.translate_scalar(predicate, state)?;
                state.select.add_to_predicate(SqlExpr::not(predicate));
                let select = take_exists_select(state);
                state.predicate = Some(SqlExpr::not(SqlExpr::Exists(Box::new(select))));
            }
            ResultOperator::Contains(item) => {
                let item = self.translate_scalar(item, state)?;
                let Binding::Value(value) = state.binding.clone() else {
                    return Err(Error::UnsupportedShape(
                        "Contains requires a sequence of scalar values".to_string(),
                    ));
                };
                let mut select = std::mem::take(&mut state.select);
                if !select.is_paged() {
                    select.orderings.clear();
                }
                select.projection = vec![value];
                state.predicate = Some(SqlExpr::In {
                    operand: Box::new(item),
                    values: InValues::Subquery(Box::new(select)),
                    negated: false,
                });
            }
            ResultOperator::Include(path) => self.include(path, state)?,
            ResultOperator::GroupBy { .. } => {
                return Err(Error::UnsupportedShape(
                    "GroupBy cannot be translated to SQL".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn aggregate(
        &mut self,
        state: &mut QueryState,
        build: impl FnOnce(&Binding) -> Result<SqlExpr>,
    ) -> Result<()> {
        if state.select.is_paged() || state.select.distinct {
            self.push_down(state)?;
        }
        let aggregate = build(&state.binding)?;
        state.select.orderings.clear();
        state.select.projection = vec![aggregate.clone()];
        state.binding = Binding::Value(aggregate);
        state.aggregated = true;
        Ok(())
    }

    fn limit_to(&mut self, state: &mut QueryState, rows: i32) -> Result<()> {
        if state.select.limit.is_some() {
            self.push_down(state)?;
        }
        state.select.limit = Some(SqlExpr::constant(rows));
        Ok(())
    }

    fn include(&mut self, path: &[String], state: &mut QueryState) -> Result<()> {
        let Binding::Entity(mut root) = state.binding.clone() else {
            return Err(Error::UnsupportedShape(
                "Include requires a query returning entities".to_string(),
            ));
        };
        let model = self.model;
        let mut owner = root.clone();
        for name in path {
            let entity = model.entity_type(&owner.entity)?;
            let nav = find_navigation(model, entity, name)?;
            if nav.is_collection {
                return Err(Error::UnsupportedShape(format!(
                    "including collection navigation '{name}' is not supported"
                )));
            }
            let target = self.join_reference(&owner, nav, true, state)?;
            if !root.included.iter().any(|b| b.alias == target.alias) {
                root.included.push(target.clone());
            }
            owner = target;
        }
        state.binding = Binding::Entity(root);
        Ok(())
    }

    /// Joins the target of a reference navigation, once per owner.
    ///
    /// Required navigations of rows that are always present use an inner
    /// join; everything else uses a left join so owners without a target
    /// are kept.
    fn join_reference(
        &mut self,
        owner: &EntityBinding,
        nav: &Navigation,
        include: bool,
        state: &mut QueryState,
    ) -> Result<EntityBinding> {
        let key = (owner.alias.clone(), nav.name.clone());
        if let Some(existing) = state.joins.get(&key) {
            return Ok(existing.clone());
        }

        let model = self.model;
        let target = model.entity_type(&nav.target)?;
        let alias = self.fresh_alias(&initial(&nav.target));
        let inner_join = nav.is_required && !owner.nullable && !include;
        let binding = self.table_binding(target, &alias, !inner_join);

        let mut predicate = None;
        for (fk, pk) in nav.foreign_key.iter().zip(model.key(target)) {
            let equal = SqlExpr::equal(
                self.entity_column(owner, fk)?,
                self.entity_column(&binding, &pk.name)?,
            );
            predicate = Some(and_opt(predicate, equal));
        }
        if let Some(discriminator) = self.discriminator_predicate(&binding)? {
            predicate = Some(and_opt(predicate, discriminator));
        }
        let predicate = predicate.ok_or_else(|| {
            Error::Internal(format!("navigation '{}' has no foreign key", nav.name))
        })?;

        let table = Box::new(self.table_source(target, alias));
        state.select.add_table(if inner_join {
            TableSource::InnerJoin { table, predicate }
        } else {
            TableSource::LeftOuterJoin { table, predicate }
        });
        state.joins.insert(key, binding.clone());
        Ok(binding)
    }

    /// Translates an expression that may stand for an entity or object.
    fn translate_shaped(&mut self, expr: &Expr, state: &mut QueryState) -> Result<Binding> {
        match expr {
            Expr::QuerySource { name, .. } => state
                .scope
                .iter()
                .rev()
                .find(|(item, _)| item == name)
                .map(|(_, binding)| binding.clone())
                .ok_or_else(|| Error::Internal(format!("query source '{name}' is not in scope"))),
            Expr::Member { target, member, .. }
            | Expr::Property {
                target,
                name: member,
                ..
            } => {
                let target = self.translate_shaped(target, state)?;
                self.member_of(target, member, state)
            }
            Expr::New { members } => {
                let mut bindings = Vec::with_capacity(members.len());
                for (name, member) in members {
                    bindings.push((name.clone(), self.translate_shaped(member, state)?));
                }
                Ok(Binding::Object(bindings))
            }
            _ => Ok(Binding::Value(self.translate_scalar(expr, state)?)),
        }
    }

    fn member_of(&mut self, target: Binding, member: &str, state: &mut QueryState) -> Result<Binding> {
        match target {
            Binding::Entity(entity) => {
                let model = self.model;
                let entity_type = model.entity_type(&entity.entity)?;
                if let Some(nav) = model.find_navigation(entity_type, member) {
                    if nav.is_collection {
                        return Err(Error::UnsupportedShape(format!(
                            "collection navigation '{member}' can only be used as a query source"
                        )));
                    }
                    return Ok(Binding::Entity(self.join_reference(&entity, nav, false, state)?));
                }
                Ok(Binding::Value(self.entity_column(&entity, member)?))
            }
            Binding::Object(members) => members
                .into_iter()
                .find(|(name, _)| name == member)
                .map(|(_, binding)| binding)
                .ok_or_else(|| {
                    Error::UnsupportedShape(format!("projection has no member '{member}'"))
                }),
            Binding::Value(value) => translate_member(&value, member, self.dialect)
                .map(Binding::Value)
                .ok_or_else(|| {
                    Error::UnsupportedShape(format!(
                        "member '{member}' of {} has no SQL translation",
                        value.ty()
                    ))
                }),
        }
    }

    /// Translates an expression that must produce a single SQL value.
    fn translate_scalar(&mut self, expr: &Expr, state: &mut QueryState) -> Result<SqlExpr> {
        match expr {
            Expr::Constant { value, ty } => Ok(SqlExpr::Constant {
                value: value.clone(),
                ty: ty.clone(),
            }),
            Expr::Parameter { name, ty } => Ok(SqlExpr::parameter(name.clone(), ty.clone())),
            Expr::QuerySource { .. }
            | Expr::Member { .. }
            | Expr::Property { .. }
            | Expr::New { .. } => match self.translate_shaped(expr, state)? {
                Binding::Value(value) => Ok(value),
                Binding::Entity(entity) => Err(Error::UnsupportedShape(format!(
                    "entity '{}' cannot be used as a value",
                    entity.entity
                ))),
                Binding::Object(_) => Err(Error::UnsupportedShape(format!(
                    "projection '{expr}' cannot be used as a value"
                ))),
            },
            Expr::Binary {
                op,
                left,
                right,
                ty,
            } => self.translate_binary(*op, left, right, ty, state),
            Expr::Unary { op, operand, .. } => {
                let operand = self.translate_scalar(operand, state)?;
                Ok(match op {
                    UnaryOp::Not => SqlExpr::not(operand),
                    UnaryOp::Negate => SqlExpr::Negate(Box::new(operand)),
                    UnaryOp::Convert(target) => {
                        // Nullability changes have no SQL form
                        if target.underlying() == operand.ty().underlying()
                            || *target == ValueType::Object
                        {
                            operand
                        } else {
                            SqlExpr::Convert {
                                operand: Box::new(operand),
                                ty: target.clone(),
                            }
                        }
                    }
                })
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ty,
            } => Ok(SqlExpr::Case {
                test: Box::new(self.translate_scalar(test, state)?),
                if_true: Box::new(self.translate_scalar(if_true, state)?),
                if_false: Box::new(self.translate_scalar(if_false, state)?),
                ty: ty.clone(),
            }),
            Expr::Call {
                method,
                target: Some(target),
                args,
                ..
            } => {
                let instance = self.translate_scalar(target, state)?;
                let args = args
                    .iter()
                    .map(|arg| self.translate_scalar(arg, state))
                    .collect::<Result<Vec<_>>>()?;
                self.translators
                    .translate(&instance, method, &args, self.dialect)
            }
            Expr::Call {
                method,
                target: None,
                args,
                ..
            } if method == "Contains" && args.len() == 2 && is_list(&args[0]) => {
                let values = self.translate_list(&args[0], state)?;
                let operand = self.translate_scalar(&args[1], state)?;
                Ok(SqlExpr::In {
                    operand: Box::new(operand),
                    values,
                    negated: false,
                })
            }
            Expr::Call { method, .. } => Err(Error::UnsupportedShape(format!(
                "method '{method}' has no SQL translation"
            ))),
            Expr::Function { function, .. } => Err(Error::UnsupportedShape(format!(
                "client function '{}' reads row data and cannot be translated to SQL",
                function.name()
            ))),
            Expr::SubQuery(model) => self.translate_subquery(model, state),
            other => Err(Error::UnsupportedShape(format!(
                "expression '{other}' cannot be translated to SQL"
            ))),
        }
    }

    fn translate_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ty: &ValueType,
        state: &mut QueryState,
    ) -> Result<SqlExpr> {
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let compared = if right.is_null_constant() {
                Some(left)
            } else if left.is_null_constant() {
                Some(right)
            } else {
                None
            };
            if let Some(operand) = compared {
                let operand = self.null_test_operand(operand, state)?;
                return Ok(SqlExpr::IsNull {
                    operand: Box::new(operand),
                    negated: op == BinaryOp::Ne,
                });
            }
        }

        let left = self.translate_scalar(left, state)?;
        let right = self.translate_scalar(right, state)?;
        Ok(match SqlBinaryOp::from_expression_op(op) {
            Some(sql_op) if sql_op.is_comparison() || sql_op.is_logical() => {
                SqlExpr::binary(sql_op, left, right)
            }
            Some(sql_op) => SqlExpr::Binary {
                op: sql_op,
                left: Box::new(left),
                right: Box::new(right),
                ty: ty.clone(),
            },
            None => SqlExpr::Coalesce {
                left: Box::new(left),
                right: Box::new(right),
                ty: ty.clone(),
            },
        })
    }

    /// An entity compared with null is tested through its first key column.
    fn null_test_operand(&mut self, operand: &Expr, state: &mut QueryState) -> Result<SqlExpr> {
        match self.translate_shaped(operand, state)? {
            Binding::Value(value) => Ok(value),
            Binding::Entity(entity) => {
                let model = self.model;
                let entity_type = model.entity_type(&entity.entity)?;
                let key = model.key(entity_type);
                let first = key.first().ok_or_else(|| {
                    Error::Internal(format!("entity '{}' has no key", entity.entity))
                })?;
                self.entity_column(&entity, &first.name)
            }
            Binding::Object(_) => Err(Error::UnsupportedShape(format!(
                "projection '{operand}' cannot be compared with null"
            ))),
        }
    }

    fn translate_list(&mut self, list: &Expr, state: &mut QueryState) -> Result<InValues> {
        match list {
            Expr::NewList { items, .. } => Ok(InValues::List(
                items
                    .iter()
                    .map(|item| self.translate_scalar(item, state))
                    .collect::<Result<_>>()?,
            )),
            Expr::Constant {
                value: Value::List(values),
                ty,
            } => {
                let item_type = ty.sequence_item().cloned().unwrap_or(ValueType::Object);
                Ok(InValues::List(
                    values
                        .iter()
                        .map(|value| SqlExpr::Constant {
                            value: value.clone(),
                            ty: item_type.clone(),
                        })
                        .collect(),
                ))
            }
            // List parameters are expanded when the command is generated
            other => Ok(InValues::List(vec![self.translate_scalar(other, state)?])),
        }
    }

    fn translate_subquery(&mut self, query: &QueryModel, state: &mut QueryState) -> Result<SqlExpr> {
        if let Some(membership) = self.translate_value_contains(query, state)? {
            return Ok(membership);
        }
        let inner = self.translate_model(query, state.scope.clone())?;
        if let Some(predicate) = inner.predicate {
            return Ok(predicate);
        }
        match query.output_info() {
            OutputInfo::Single { .. } => {
                let select = self.finish(inner)?;
                if select.projection.len() != 1 {
                    return Err(Error::UnsupportedShape(format!(
                        "subquery '{query}' must produce a single column"
                    )));
                }
                Ok(SqlExpr::ScalarSubquery(Box::new(select)))
            }
            OutputInfo::Sequence { .. } => Err(Error::UnsupportedShape(format!(
                "subquery '{query}' returns a sequence and cannot be used as a value"
            ))),
        }
    }

    /// `list.Contains(x)` over an in-memory list becomes `x IN (...)`.
    fn translate_value_contains(
        &mut self,
        query: &QueryModel,
        state: &mut QueryState,
    ) -> Result<Option<SqlExpr>> {
        let FromSource::Value(list) = &query.main_from.source else {
            return Ok(None);
        };
        let selects_item = matches!(
            &query.select,
            Expr::QuerySource { name, .. } if *name == query.main_from.item_name
        );
        let [ResultOperator::Contains(item)] = query.result_operators.as_slice() else {
            return Ok(None);
        };
        if !query.body_clauses.is_empty() || !selects_item {
            return Ok(None);
        }
        let values = self.translate_list(list, state)?;
        let operand = self.translate_scalar(item, state)?;
        Ok(Some(SqlExpr::In {
            operand: Box::new(operand),
            values,
            negated: false,
        }))
    }

    /// Adds the columns of `binding` to `select` and returns the binding
    /// that reads them back through `alias`.
    fn project_into(
        &self,
        select: &mut SelectExpr,
        binding: &Binding,
        alias: &str,
        names: &mut HashSet<String>,
        hint: Option<&str>,
    ) -> Result<Binding> {
        match binding {
            Binding::Entity(entity) => Ok(Binding::Entity(
                self.project_entity(select, entity, alias, names)?,
            )),
            Binding::Value(value) => {
                let base = hint.or_else(|| value.projected_name()).unwrap_or("c");
                let name = unique_name(names, base);
                select.projection.push(named(value.clone(), &name));
                Ok(Binding::Value(column_over(alias, &name, value)))
            }
            Binding::Object(members) => {
                let mut projected = Vec::with_capacity(members.len());
                for (member, binding) in members {
                    let binding = self.project_into(select, binding, alias, names, Some(member))?;
                    projected.push((member.clone(), binding));
                }
                Ok(Binding::Object(projected))
            }
        }
    }

    fn project_entity(
        &self,
        select: &mut SelectExpr,
        entity: &EntityBinding,
        alias: &str,
        names: &mut HashSet<String>,
    ) -> Result<EntityBinding> {
        let mut columns = IndexMap::with_capacity(entity.columns.len());
        for property in entity.columns.keys() {
            let source = self.entity_column(entity, property)?;
            let name = unique_name(names, source.projected_name().unwrap_or(property));
            select.projection.push(named(source, &name));
            columns.insert(property.clone(), name);
        }
        let included = entity
            .included
            .iter()
            .map(|included| self.project_entity(select, included, alias, names))
            .collect::<Result<Vec<_>>>()?;
        Ok(EntityBinding {
            entity: entity.entity.clone(),
            alias: alias.to_string(),
            columns,
            nullable: entity.nullable,
            included,
        })
    }

    /// The column of an entity property under the binding's alias.
    ///
    /// Properties declared on derived types are nullable, since rows of
    /// other types in the hierarchy have no value for them.
    fn entity_column(&self, entity: &EntityBinding, property: &str) -> Result<SqlExpr> {
        let model = self.model;
        let entity_type = model.entity_type(&entity.entity)?;
        let (definition, derived) = match model.find_property(entity_type, property) {
            Some(definition) => (definition, false),
            None => model
                .derived_types(entity_type)
                .into_iter()
                .find_map(|d| d.declared_properties().iter().find(|p| p.name == property))
                .map(|definition| (definition, true))
                .ok_or_else(|| MetadataError::PropertyNotFound {
                    entity: entity.entity.clone(),
                    property: property.to_string(),
                })?,
        };
        let column = entity.columns.get(property).ok_or_else(|| {
            Error::UnsupportedShape(format!(
                "property '{property}' is not available from '{}'",
                entity.alias
            ))
        })?;
        Ok(SqlExpr::column(
            &entity.alias,
            column,
            definition.ty.clone(),
            definition.nullable || derived || entity.nullable,
        ))
    }

    /// Binds every column of an entity's table, derived types included.
    fn table_binding(&self, entity: &EntityType, alias: &str, nullable: bool) -> EntityBinding {
        let model = self.model;
        let mut columns = IndexMap::new();
        for property in model.properties(entity) {
            columns.insert(property.name.clone(), property.column.clone());
        }
        for derived in model.derived_types(entity) {
            for property in derived.declared_properties() {
                columns
                    .entry(property.name.clone())
                    .or_insert_with(|| property.column.clone());
            }
        }
        EntityBinding {
            entity: entity.name().to_string(),
            alias: alias.to_string(),
            columns,
            nullable,
            included: Vec::new(),
        }
    }

    fn table_source(&self, entity: &EntityType, alias: String) -> TableSource {
        TableSource::Table {
            name: self.model.table_name(entity).to_string(),
            schema: self.model.schema(entity).map(str::to_string),
            alias,
        }
    }

    /// Restricts a shared hierarchy table to rows of the bound type.
    fn discriminator_predicate(&self, binding: &EntityBinding) -> Result<Option<SqlExpr>> {
        let model = self.model;
        let entity = model.entity_type(&binding.entity)?;
        let Some(property) = model.discriminator_property(entity) else {
            return Ok(None);
        };
        let mut values: Vec<Value> = std::iter::once(entity)
            .chain(model.derived_types(entity))
            .filter_map(|e| e.discriminator_value().cloned())
            .collect();
        if values.is_empty() {
            return Ok(None);
        }
        let column = self.entity_column(binding, &property.name)?;
        Ok(Some(if values.len() == 1 {
            SqlExpr::equal(column, SqlExpr::constant(values.remove(0)))
        } else {
            SqlExpr::In {
                operand: Box::new(column),
                values: InValues::List(values.into_iter().map(SqlExpr::constant).collect()),
                negated: false,
            }
        }))
    }

    fn fresh_alias(&mut self, base: &str) -> String {
        unique_name(&mut self.aliases, base)
    }
}

fn find_navigation<'m>(model: &'m Model, entity: &'m EntityType, name: &str) -> Result<&'m Navigation> {
    model.find_navigation(entity, name).ok_or_else(|| {
        MetadataError::NavigationNotFound {
            entity: entity.name().to_string(),
            navigation: name.to_string(),
        }
        .into()
    })
}

fn key_equality(outer: Binding, inner: Binding) -> Result<SqlExpr> {
    match (outer, inner) {
        (Binding::Value(left), Binding::Value(right)) => Ok(SqlExpr::equal(left, right)),
        (Binding::Object(left), Binding::Object(right)) if left.len() == right.len() => {
            let mut predicate = None;
            for ((_, l), (_, r)) in left.into_iter().zip(right) {
                predicate = Some(and_opt(predicate, key_equality(l, r)?));
            }
            predicate.ok_or_else(|| Error::UnsupportedShape("empty join key".to_string()))
        }
        _ => Err(Error::UnsupportedShape(
            "join keys must be scalar values or anonymous objects of the same shape".to_string(),
        )),
    }
}

fn scalar(binding: &Binding) -> Result<SqlExpr> {
    match binding {
        Binding::Value(value) => Ok(value.clone()),
        _ => Err(Error::UnsupportedShape(
            "aggregate requires a scalar selector".to_string(),
        )),
    }
}

/// Detaches the current select as the body of an `EXISTS`.
fn take_exists_select(state: &mut QueryState) -> SelectExpr {
    let mut select = std::mem::take(&mut state.select);
    if !select.is_paged() {
        select.orderings.clear();
    }
    select.projection.clear();
    select
}

fn and_opt(existing: Option<SqlExpr>, predicate: SqlExpr) -> SqlExpr {
    match existing {
        Some(existing) => SqlExpr::and(existing, predicate),
        None => predicate,
    }
}

fn is_list(expr: &Expr) -> bool {
    matches!(expr.ty(), ValueType::List(_))
}

/// A column reading `source` back from a derived table.
fn column_over(alias: &str, name: &str, source: &SqlExpr) -> SqlExpr {
    let ty = source.ty();
    let nullable = source.can_be_null() || matches!(ty, ValueType::Nullable(_));
    SqlExpr::column(alias, name, ty.underlying().clone(), nullable)
}

fn named(expr: SqlExpr, name: &str) -> SqlExpr {
    match &expr {
        SqlExpr::Column(column) if column.name == name => expr,
        _ => SqlExpr::Alias {
            expr: Box::new(expr),
            alias: name.to_string(),
        },
    }
}

fn unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    let mut name = base.to_string();
    let mut suffix = 0;
    while taken.contains(&name) {
        name = format!("{base}{suffix}");
        suffix += 1;
    }
    taken.insert(name.clone());
    name
}

fn initial(entity: &str) -> String {
    entity
        .chars()
        .next()
        .map_or_else(|| "t".to_string(), |c| c.to_lowercase().collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::parser::parse_query;
    use strata_adapters::{ParameterValues, SqlGenerator, SqliteDialect};
    use strata_core::Queryable;

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
            })
            .entity("Animal", |e| {
                e.property("Id", ValueType::Int32)
                    .property("Kind", ValueType::String)
                    .key(&["Id"])
                    .discriminator("Kind")
                    .discriminator_value("Animal");
            })
            .entity("Cat", |e| {
                e.base_type("Animal")
                    .optional_property("Lives", ValueType::Int32)
                    .discriminator_value("Cat");
            });
        Arc::new(builder.build().unwrap())
    }

    fn sql(expr: &Expr) -> Result<String> {
        sql_with(expr, &ParameterValues::new())
    }

    fn sql_with(expr: &Expr, values: &ParameterValues) -> Result<String> {
        let model = model();
        let dialect = SqliteDialect::default();
        let translators = MethodCallTranslators::default();
        let query = parse_query(expr)?;
        let select = RelationalTranslator::new(&model, &dialect, &translators).translate(&query)?;
        let generated = SqlGenerator::new(&dialect, values).generate(&select)?;
        Ok(generated.command.text().to_string())
    }

    fn customers() -> Queryable {
        Queryable::new(model(), "Customer")
    }

    #[test]
    fn test_entity_projection() {
        let text = sql(customers().expr()).unwrap();
        assert_eq!(
            text,
            "SELECT \"c\".\"Id\", \"c\".\"Name\", \"c\".\"City\"\nFROM \"Customer\" AS \"c\""
        );
    }

    #[test]
    fn test_where_null_comparison() {
        let query = customers().filter(|c| c.get("Name").eq(Expr::null(ValueType::String)));
        let text = sql(query.expr()).unwrap();
        assert!(text.ends_with("WHERE \"c\".\"Name\" IS NULL"), "{text}");
    }

    #[test]
    fn test_take_then_skip_pushes_down() {
        let query = customers().take(5).skip(2).select(|c| c.get("Name"));
        let text = sql(query.expr()).unwrap();
        assert!(text.contains("LIMIT 5"), "{text}");
        assert!(text.contains(") AS \"t\""), "{text}");
        assert!(text.ends_with("LIMIT -1 OFFSET 2"), "{text}");
    }

    #[test]
    fn test_count_over_page_pushes_down() {
        let text = sql(&customers().take(3).count()).unwrap();
        assert!(text.starts_with("SELECT COUNT(*)\nFROM ("), "{text}");
    }

    #[test]
    fn test_reference_navigation_joins_once() {
        let query = Queryable::new(model(), "Order")
            .filter(|o| o.nav("Customer").get("City").eq("Paris"))
            .select(|o| o.nav("Customer").get("Name"));
        let text = sql(query.expr()).unwrap();
        assert_eq!(text.matches("INNER JOIN \"Customer\" AS \"c\"").count(), 1, "{text}");
        assert!(text.contains("ON \"o\".\"CustomerId\" = \"c\".\"Id\""), "{text}");
    }

    #[test]
    fn test_include_uses_left_join() {
        let query = Queryable::new(model(), "Order").include("Customer");
        let text = sql(query.expr()).unwrap();
        assert!(text.contains("LEFT JOIN \"Customer\" AS \"c\""), "{text}");
        assert!(text.contains("\"c\".\"Id\" AS \"Id0\""), "{text}");
    }

    #[test]
    fn test_any_over_collection_navigation() {
        let query = customers().filter(|c| {
            let orders = c.get("Orders");
            orders.operator("Any", Vec::new(), ValueType::Bool)
        });
        let text = sql(query.expr()).unwrap();
        assert!(text.contains("WHERE EXISTS ("), "{text}");
        assert!(text.contains("WHERE \"o\".\"CustomerId\" = \"c\".\"Id\""), "{text}");
    }

    #[test]
    fn test_any_at_top_level_projects_case() {
        let text = sql(&customers().any()).unwrap();
        assert!(text.starts_with("SELECT CASE"), "{text}");
        assert!(text.contains("EXISTS ("), "{text}");
    }

    #[test]
    fn test_discriminator_filters_hierarchy() {
        let text = sql(Queryable::new(model(), "Cat").expr()).unwrap();
        assert!(text.ends_with("WHERE \"c\".\"Kind\" = 'Cat'"), "{text}");

        let text = sql(Queryable::new(model(), "Animal").expr()).unwrap();
        assert!(text.contains("\"a\".\"Kind\" IN ('Animal', 'Cat')"), "{text}");
        assert!(text.contains("\"a\".\"Lives\""), "{text}");
    }

    #[test]
    fn test_average_of_integers_converts() {
        let expr = Queryable::new(model(), "Order").average(|o| o.get("Total"));
        let text = sql(&expr).unwrap();
        assert!(text.starts_with("SELECT AVG(CAST(\"o\".\"Total\" AS REAL))"), "{text}");
    }

    #[test]
    fn test_list_parameter_contains_becomes_in() {
        let ids = Expr::parameter("__ids_0", ValueType::List(Box::new(ValueType::Int32)));
        let query = customers().filter(|c| ids.list_contains(c.get("Id")));
        let mut values = ParameterValues::new();
        values.insert(
            "__ids_0".to_string(),
            Value::List(vec![Value::from(1), Value::from(3)]),
        );
        let text = sql_with(query.expr(), &values).unwrap();
        assert!(text.ends_with("WHERE \"c\".\"Id\" IN (1, 3)"), "{text}");
    }

    #[test]
    fn test_group_by_is_rejected() {
        let query = customers().group_by(|c| c.get("City"));
        assert!(matches!(sql(query.expr()), Err(Error::UnsupportedShape(_))));
    }

    #[test]
    fn test_client_function_in_predicate_is_rejected() {
        let upper = strata_core::ClientFunction::new("Shout", |args| Ok(args[0].clone()));
        let query = customers().filter(|c| {
            Expr::function(upper, vec![c.get("Name")], ValueType::String).eq("A")
        });
        let err = sql(query.expr()).unwrap_err();
        assert!(err.to_string().contains("Shout"), "{err}");
    }
}
