//! SQL text generation.
//!
//! [`SqlGenerator`] walks a [`SelectExpr`] and writes dialect-specific SQL
//! into a [`RelationalCommandBuilder`]. Parameters enter the command only
//! when they are emitted, so every parameter in the result is referenced by
//! the text and every referenced name is in the parameter list.
//!
//! Generation happens per execution: the bound parameter values drive the
//! null-semantics rewrite of `WHERE` predicates and the expansion of list
//! parameters inside `IN`.

use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};
use strata_core::relational::{InValues, SelectExpr, SqlBinaryOp, SqlExpr, TableSource};
use strata_core::storage::ValueBufferFactory;
use tracing::trace;

use super::ParameterValues;
use super::command::{RelationalCommand, RelationalCommandBuilder};
use super::dialect::{PagingStyle, SqlDialect};
use super::null_semantics;

/// The output of one generation pass.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    /// SQL text and parameters.
    pub command: RelationalCommand,
    /// Reads rows shaped like the top-level projection.
    pub value_buffer_factory: ValueBufferFactory,
}

/// Writes SQL for a select expression.
pub struct SqlGenerator<'a> {
    dialect: &'a dyn SqlDialect,
    values: &'a ParameterValues,
    sql: RelationalCommandBuilder,
}

impl<'a> SqlGenerator<'a> {
    /// Creates a generator for one execution's parameter values.
    pub fn new(dialect: &'a dyn SqlDialect, values: &'a ParameterValues) -> Self {
        Self {
            dialect,
            values,
            sql: RelationalCommandBuilder::new(dialect.parameter_prefix()),
        }
    }

    /// Generates the command and the row reader for `select`.
    pub fn generate(mut self, select: &SelectExpr) -> Result<GeneratedSql> {
        self.visit_select(select)?;
        let command = self.sql.build();
        trace!(dialect = self.dialect.name(), sql = command.text(), "Generated SQL");
        Ok(GeneratedSql {
            command,
            value_buffer_factory: ValueBufferFactory::new(select.projection_types()),
        })
    }

    fn delimit(&self, identifier: &str) -> Result<String> {
        self.dialect.delimit_identifier(identifier)
    }

    fn visit_select(&mut self, select: &SelectExpr) -> Result<()> {
        let paging = self.dialect.paging_style();
        self.sql.append("SELECT ");
        if select.distinct {
            self.sql.append("DISTINCT ");
        }
        if paging == PagingStyle::TopOffsetFetch && select.offset.is_none() {
            if let Some(limit) = &select.limit {
                self.sql.append("TOP(");
                self.visit(limit)?;
                self.sql.append(") ");
            }
        }

        if !select.projection.is_empty() {
            for (i, expr) in select.projection.iter().enumerate() {
                if i > 0 {
                    self.sql.append(", ");
                }
                self.visit_projection(expr)?;
            }
        } else if select.project_star {
            let alias = select
                .tables
                .first()
                .and_then(TableSource::alias)
                .ok_or_else(|| Error::Generation("star projection without a table".to_string()))?;
            let alias = self.delimit(alias)?;
            self.sql.append(alias).append(".*");
        } else {
            self.sql.append("1");
        }

        if !select.tables.is_empty() {
            self.sql.append_line("").append("FROM ");
            for (i, table) in select.tables.iter().enumerate() {
                if i > 0 {
                    self.sql.append_line("");
                }
                self.visit_table(table)?;
            }
        }

        if let Some(predicate) = &select.predicate {
            self.sql.append_line("").append("WHERE ");
            self.visit_predicate(predicate)?;
        }

        if !select.orderings.is_empty() {
            self.sql.append_line("").append("ORDER BY ");
            for (i, ordering) in select.orderings.iter().enumerate() {
                if i > 0 {
                    self.sql.append(", ");
                }
                self.visit_ordering_key(&ordering.expr)?;
                if ordering.descending {
                    self.sql.append(" DESC");
                }
            }
        } else if paging == PagingStyle::TopOffsetFetch && select.offset.is_some() {
            self.sql.append_line("").append("ORDER BY (SELECT 1)");
        }

        match paging {
            PagingStyle::TopOffsetFetch => {
                if let Some(offset) = &select.offset {
                    self.sql.append_line("").append("OFFSET ");
                    self.visit(offset)?;
                    self.sql.append(" ROWS");
                    if let Some(limit) = &select.limit {
                        self.sql.append(" FETCH NEXT ");
                        self.visit(limit)?;
                        self.sql.append(" ROWS ONLY");
                    }
                }
            }
            PagingStyle::LimitOffset => {
                if select.is_paged() {
                    self.sql.append_line("").append("LIMIT ");
                    match &select.limit {
                        Some(limit) => self.visit(limit)?,
                        None => {
                            self.sql.append("-1");
                        }
                    }
                    if let Some(offset) = &select.offset {
                        self.sql.append(" OFFSET ");
                        self.visit(offset)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn visit_nested_select(&mut self, select: &SelectExpr) -> Result<()> {
        self.sql.append_line("(").increment_indent();
        self.visit_select(select)?;
        self.sql.decrement_indent().append_line("").append(")");
        Ok(())
    }

    fn visit_table(&mut self, table: &TableSource) -> Result<()> {
        match table {
            TableSource::Table {
                name,
                schema,
                alias,
            } => {
                if let Some(schema) = schema {
                    let schema = self.delimit(schema)?;
                    self.sql.append(schema).append(".");
                }
                let name = self.delimit(name)?;
                let alias = self.delimit(alias)?;
                self.sql.append(name).append(" AS ").append(alias);
            }
            TableSource::SubQuery(select) => {
                self.visit_nested_select(select)?;
                if let Some(alias) = select.alias.as_deref().filter(|a| !a.is_empty()) {
                    let alias = self.delimit(alias)?;
                    self.sql.append(" AS ").append(alias);
                }
            }
            TableSource::CrossJoin(inner) => {
                self.sql.append("CROSS JOIN ");
                self.visit_table(inner)?;
            }
            TableSource::InnerJoin { table, predicate } => {
                self.sql.append("INNER JOIN ");
                self.visit_table(table)?;
                self.sql.append(" ON ");
                self.visit(predicate)?;
            }
            TableSource::LeftOuterJoin { table, predicate } => {
                self.sql.append("LEFT JOIN ");
                self.visit_table(table)?;
                self.sql.append(" ON ");
                self.visit(predicate)?;
            }
        }
        Ok(())
    }

    fn visit_predicate(&mut self, predicate: &SqlExpr) -> Result<()> {
        if let Some(b) = bool_constant(predicate) {
            self.sql.append(if b { "1 = 1" } else { "1 = 0" });
            return Ok(());
        }
        let predicate = null_semantics::rewrite_predicate(predicate, self.values);
        if let Some(b) = bool_constant(&predicate) {
            self.sql.append(if b { "1 = 1" } else { "1 = 0" });
            return Ok(());
        }
        self.visit(&predicate)?;
        if needs_truth_comparison(&predicate) {
            self.sql.append(" = ").append(self.dialect.true_literal());
        }
        Ok(())
    }

    fn visit_projection(&mut self, expr: &SqlExpr) -> Result<()> {
        let (inner, alias) = match expr {
            SqlExpr::Alias { expr, alias } => (expr.as_ref(), Some(alias.as_str())),
            other => (other, None),
        };
        if is_predicate(inner) {
            self.visit(&SqlExpr::Case {
                test: Box::new(inner.clone()),
                if_true: Box::new(SqlExpr::constant(true)),
                if_false: Box::new(SqlExpr::constant(false)),
                ty: ValueType::Bool,
            })?;
        } else if let SqlExpr::Constant {
            value: Value::Bool(b),
            ..
        } = inner
        {
            let literal = self.typed_bool(*b);
            self.sql.append(literal);
        } else {
            self.visit(inner)?;
        }
        if let Some(alias) = alias {
            let same_column = matches!(inner, SqlExpr::Column(c) if c.name == alias);
            if !same_column {
                let alias = self.delimit(alias)?;
                self.sql.append(" AS ").append(alias);
            }
        }
        Ok(())
    }

    fn visit_ordering_key(&mut self, expr: &SqlExpr) -> Result<()> {
        if let SqlExpr::Alias { expr: inner, alias } = expr {
            if let SqlExpr::Column(column) = inner.as_ref() {
                let table = self.delimit(&column.table)?;
                self.sql.append(table).append(".");
            }
            let alias = self.delimit(alias)?;
            self.sql.append(alias);
            return Ok(());
        }
        self.visit(expr)
    }

    fn typed_bool(&self, b: bool) -> &'static str {
        if b {
            self.dialect.typed_true_literal()
        } else {
            self.dialect.typed_false_literal()
        }
    }

    fn visit(&mut self, expr: &SqlExpr) -> Result<()> {
        match expr {
            SqlExpr::Column(column) => {
                let table = self.delimit(&column.table)?;
                let name = self.delimit(&column.name)?;
                self.sql.append(table).append(".").append(name);
            }
            SqlExpr::Alias { expr, .. } => self.visit(expr)?,
            SqlExpr::Constant { value, .. } => {
                let literal = self.dialect.generate_literal(value)?;
                self.sql.append(literal);
            }
            SqlExpr::Parameter { name, ty } => {
                if matches!(self.values.get(name), Some(Value::List(_))) {
                    return Err(Error::Generation(format!(
                        "list parameter '{name}' can only be used with IN"
                    )));
                }
                self.sql.append_named_parameter(name, Some(ty.clone()));
            }
            SqlExpr::Binary {
                op, left, right, ..
            } => self.visit_binary(*op, left, right)?,
            SqlExpr::Not(operand) => self.visit_not(operand)?,
            SqlExpr::Negate(operand) => {
                self.sql.append("-");
                self.visit_operand(operand, !operand.is_simple())?;
            }
            SqlExpr::Convert { operand, ty } => {
                let store_type = self.dialect.type_mapper().store_type(ty)?;
                self.sql.append("CAST(");
                self.visit(operand)?;
                self.sql.append(" AS ").append(store_type).append(")");
            }
            SqlExpr::IsNull { operand, negated } => {
                self.visit_operand(operand, needs_parentheses(operand))?;
                self.sql
                    .append(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            SqlExpr::In {
                operand,
                values,
                negated,
            } => self.visit_in(operand, values, *negated)?,
            SqlExpr::Like { operand, pattern } => {
                self.visit(operand)?;
                self.sql.append(" LIKE ");
                self.visit(pattern)?;
            }
            SqlExpr::Case {
                test,
                if_true,
                if_false,
                ..
            } => self.visit_case(test, if_true, if_false)?,
            SqlExpr::Exists(select) => {
                self.sql.append_line("EXISTS (").increment_indent();
                self.visit_select(select)?;
                self.sql.decrement_indent().append_line("").append(")");
            }
            SqlExpr::Count { long } => {
                self.sql
                    .append(self.dialect.count_function(*long))
                    .append("(*)");
            }
            SqlExpr::Sum(operand) => self.visit_function("SUM", std::slice::from_ref(operand))?,
            SqlExpr::Min(operand) => self.visit_function("MIN", std::slice::from_ref(operand))?,
            SqlExpr::Max(operand) => self.visit_function("MAX", std::slice::from_ref(operand))?,
            SqlExpr::Average { operand, .. } => {
                self.visit_function("AVG", std::slice::from_ref(operand))?;
            }
            SqlExpr::Function { name, args, .. } => {
                self.sql.append(name).append("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.sql.append(", ");
                    }
                    self.visit(arg)?;
                }
                self.sql.append(")");
            }
            SqlExpr::Coalesce { left, right, .. } => {
                self.sql.append("COALESCE(");
                self.visit(left)?;
                self.sql.append(", ");
                self.visit(right)?;
                self.sql.append(")");
            }
            SqlExpr::ScalarSubquery(select) => self.visit_nested_select(select)?,
        }
        Ok(())
    }

    fn visit_function(&mut self, name: &str, args: &[Box<SqlExpr>]) -> Result<()> {
        self.sql.append(name).append("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.sql.append(", ");
            }
            self.visit(arg)?;
        }
        self.sql.append(")");
        Ok(())
    }

    fn visit_operand(&mut self, operand: &SqlExpr, parenthesize: bool) -> Result<()> {
        if parenthesize {
            self.sql.append("(");
            self.visit(operand)?;
            self.sql.append(")");
        } else {
            self.visit(operand)?;
        }
        Ok(())
    }

    fn visit_binary(&mut self, op: SqlBinaryOp, left: &SqlExpr, right: &SqlExpr) -> Result<()> {
        let logical = op.is_logical();
        let parenthesize = logical || !left.is_simple() || !right.is_simple();
        if parenthesize {
            self.sql.append("(");
        }

        // arithmetic operands keep their own grouping
        let group = |e: &SqlExpr| {
            !logical && matches!(e, SqlExpr::Binary { op, .. } if !op.is_logical())
        };

        self.visit_operand(left, group(left))?;
        if logical && left.is_simple() {
            self.sql.append(" = ").append(self.dialect.true_literal());
        }

        let symbol = if op == SqlBinaryOp::Add && left.ty().is_textual() && right.ty().is_textual()
        {
            self.dialect.concat_operator()
        } else {
            op.symbol()
        };
        self.sql.append(" ").append(symbol).append(" ");

        self.visit_operand(right, group(right))?;
        if logical && right.is_simple() {
            self.sql.append(" = ").append(self.dialect.true_literal());
        }

        if parenthesize {
            self.sql.append(")");
        }
        Ok(())
    }

    fn visit_not(&mut self, operand: &SqlExpr) -> Result<()> {
        match operand {
            SqlExpr::In {
                operand,
                values,
                negated,
            } => self.visit_in(operand, values, !negated),
            SqlExpr::IsNull { operand, negated } => self.visit(&SqlExpr::IsNull {
                operand: operand.clone(),
                negated: !negated,
            }),
            SqlExpr::Column(_) | SqlExpr::Parameter { .. } => {
                self.visit(operand)?;
                self.sql.append(" = ").append(self.dialect.false_literal());
                Ok(())
            }
            SqlExpr::Alias { expr, .. } if matches!(expr.as_ref(), SqlExpr::Column(_)) => {
                self.visit(expr)?;
                self.sql.append(" = ").append(self.dialect.false_literal());
                Ok(())
            }
            other => {
                self.sql.append("NOT (");
                self.visit(other)?;
                self.sql.append(")");
                Ok(())
            }
        }
    }

    /// Replaces list-valued parameters by their elements.
    fn expand_in_values(&self, items: &[SqlExpr]) -> Vec<SqlExpr> {
        let mut expanded = Vec::with_capacity(items.len());
        for item in items {
            match item {
                SqlExpr::Parameter { name, .. } => match self.values.get(name) {
                    Some(Value::List(values)) => {
                        expanded.extend(values.iter().cloned().map(SqlExpr::constant));
                    }
                    _ => expanded.push(item.clone()),
                },
                other => expanded.push(other.clone()),
            }
        }
        expanded
    }

    /// Null constants and parameters without a non-null value bound.
    fn is_null_entry(&self, item: &SqlExpr) -> bool {
        match item {
            SqlExpr::Constant { value, .. } => value.is_null(),
            SqlExpr::Parameter { name, .. } => self.values.get(name).is_none_or(Value::is_null),
            _ => false,
        }
    }

    fn visit_in(&mut self, operand: &SqlExpr, values: &InValues, negated: bool) -> Result<()> {
        let items = match values {
            InValues::Subquery(select) => {
                self.visit(operand)?;
                self.sql.append(if negated { " NOT IN " } else { " IN " });
                return self.visit_nested_select(select);
            }
            InValues::List(items) => self.expand_in_values(items),
        };

        let total = items.len();
        let non_null = items
            .into_iter()
            .filter(|item| !self.is_null_entry(item))
            .collect::<Vec<_>>();

        if non_null.len() != total {
            let in_non_null = SqlExpr::In {
                operand: Box::new(operand.clone()),
                values: InValues::List(non_null),
                negated,
            };
            let rewritten = if negated {
                SqlExpr::and(in_non_null, SqlExpr::is_not_null(operand.clone()))
            } else {
                SqlExpr::or(in_non_null, SqlExpr::is_null(operand.clone()))
            };
            return self.visit(&rewritten);
        }

        if non_null.is_empty() {
            self.sql.append(if negated { "1 = 1" } else { "1 = 0" });
            return Ok(());
        }

        self.visit(operand)?;
        self.sql.append(if negated { " NOT IN (" } else { " IN (" });
        for (i, item) in non_null.iter().enumerate() {
            if i > 0 {
                self.sql.append(", ");
            }
            self.visit(item)?;
        }
        self.sql.append(")");
        Ok(())
    }

    fn visit_case(&mut self, test: &SqlExpr, if_true: &SqlExpr, if_false: &SqlExpr) -> Result<()> {
        self.sql.append_line("CASE").increment_indent();
        self.sql.append_line("WHEN").increment_indent();
        self.sql.append("(");
        self.visit(test)?;
        if needs_truth_comparison(test) {
            self.sql.append(" = ").append(self.dialect.true_literal());
        }
        self.sql.append_line(")").decrement_indent();
        self.sql.append("THEN ");
        self.visit_case_branch(if_true)?;
        self.sql.append(" ELSE ");
        self.visit_case_branch(if_false)?;
        self.sql.append_line("").decrement_indent();
        self.sql.append("END");
        Ok(())
    }

    fn visit_case_branch(&mut self, branch: &SqlExpr) -> Result<()> {
        match bool_constant(branch) {
            Some(b) => {
                let literal = self.typed_bool(b);
                self.sql.append(literal);
                Ok(())
            }
            None => self.visit(branch),
        }
    }
}

fn bool_constant(expr: &SqlExpr) -> Option<bool> {
    match expr {
        SqlExpr::Constant {
            value: Value::Bool(b),
            ..
        } => Some(*b),
        _ => None,
    }
}

/// A bare boolean value in predicate position must be compared to true.
fn needs_truth_comparison(expr: &SqlExpr) -> bool {
    match expr {
        SqlExpr::Column(_) | SqlExpr::Parameter { .. } | SqlExpr::ScalarSubquery(_) => true,
        SqlExpr::Alias { expr, .. } => matches!(expr.as_ref(), SqlExpr::Column(_)),
        _ => false,
    }
}

fn needs_parentheses(expr: &SqlExpr) -> bool {
    matches!(
        expr,
        SqlExpr::Binary { .. } | SqlExpr::Not(_) | SqlExpr::Negate(_) | SqlExpr::Case { .. }
    )
}

/// Node shapes that are predicates rather than values.
fn is_predicate(expr: &SqlExpr) -> bool {
    match expr {
        SqlExpr::Binary { op, .. } => op.is_comparison() || op.is_logical(),
        SqlExpr::Not(_)
        | SqlExpr::IsNull { .. }
        | SqlExpr::In { .. }
        | SqlExpr::Like { .. }
        | SqlExpr::Exists(_) => true,
        _ => false,
    }
}
