//! SELECT expressions and their table sources.

use strata_common::types::ValueType;

use super::{InValues, SqlExpr};

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlOrdering {
    /// Key expression.
    pub expr: SqlExpr,
    /// Descending order.
    pub descending: bool,
}

/// An entry in a `FROM` list.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// A named table.
    Table {
        /// Table name.
        name: String,
        /// Optional schema.
        schema: Option<String>,
        /// Alias.
        alias: String,
    },
    /// A derived table; the alias lives on the nested select.
    SubQuery(Box<SelectExpr>),
    /// `CROSS JOIN`
    CrossJoin(Box<TableSource>),
    /// `INNER JOIN ... ON`
    InnerJoin {
        /// Joined source.
        table: Box<TableSource>,
        /// Join condition.
        predicate: SqlExpr,
    },
    /// `LEFT JOIN ... ON`
    LeftOuterJoin {
        /// Joined source.
        table: Box<TableSource>,
        /// Join condition.
        predicate: SqlExpr,
    },
}

impl TableSource {
    /// Returns the alias rows of this source are referenced by.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::Table { alias, .. } => Some(alias),
            Self::SubQuery(select) => select.alias.as_deref(),
            Self::CrossJoin(table)
            | Self::InnerJoin { table, .. }
            | Self::LeftOuterJoin { table, .. } => table.alias(),
        }
    }
}

/// A SELECT statement or nested subquery.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectExpr {
    /// Projected expressions, in column order.
    pub projection: Vec<SqlExpr>,
    /// `FROM` list; entries after the first are usually joins.
    pub tables: Vec<TableSource>,
    /// `WHERE` predicate.
    pub predicate: Option<SqlExpr>,
    /// `ORDER BY` keys.
    pub orderings: Vec<SqlOrdering>,
    /// Row limit.
    pub limit: Option<SqlExpr>,
    /// Row offset.
    pub offset: Option<SqlExpr>,
    /// `SELECT DISTINCT`
    pub distinct: bool,
    /// Project `alias.*` of the first table instead of explicit columns.
    pub project_star: bool,
    /// Alias when used as a derived table.
    pub alias: Option<String>,
}

impl SelectExpr {
    /// Creates an empty select.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a table source.
    pub fn add_table(&mut self, table: TableSource) {
        self.tables.push(table);
    }

    /// Adds an expression to the projection, returning its column index.
    ///
    /// An expression that is already projected is not added twice.
    pub fn add_to_projection(&mut self, expr: SqlExpr) -> usize {
        if let Some(index) = self
            .projection
            .iter()
            .position(|p| p == &expr || p.unaliased() == &expr)
        {
            return index;
        }
        self.projection.push(expr);
        self.projection.len() - 1
    }

    /// ANDs a predicate onto the `WHERE` clause.
    pub fn add_to_predicate(&mut self, predicate: SqlExpr) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => SqlExpr::and(existing, predicate),
            None => predicate,
        });
    }

    /// Appends an ordering key.
    pub fn add_ordering(&mut self, expr: SqlExpr, descending: bool) {
        self.orderings.push(SqlOrdering { expr, descending });
    }

    /// Returns true when a limit or offset is set.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Returns the types of the projected columns.
    #[must_use]
    pub fn projection_types(&self) -> Vec<ValueType> {
        self.projection.iter().map(SqlExpr::ty).collect()
    }

    /// Calls `f` for every parameter referenced anywhere in this select.
    pub fn visit_parameters(&self, f: &mut impl FnMut(&str)) {
        for p in &self.projection {
            p.visit_parameters(&mut *f);
        }
        for table in &self.tables {
            visit_table_parameters(table, &mut *f);
        }
        if let Some(predicate) = &self.predicate {
            predicate.visit_parameters(&mut *f);
        }
        for o in &self.orderings {
            o.expr.visit_parameters(&mut *f);
        }
        if let Some(limit) = &self.limit {
            limit.visit_parameters(&mut *f);
        }
        if let Some(offset) = &self.offset {
            offset.visit_parameters(&mut *f);
        }
    }

    /// Returns true if any parameter is referenced anywhere in this select.
    #[must_use]
    pub fn references_parameters(&self) -> bool {
        let mut found = false;
        self.visit_parameters(&mut |_| found = true);
        found
    }
}

fn visit_table_parameters(table: &TableSource, f: &mut impl FnMut(&str)) {
    match table {
        TableSource::Table { .. } => {}
        TableSource::SubQuery(select) => select.visit_parameters(f),
        TableSource::CrossJoin(inner) => visit_table_parameters(inner, f),
        TableSource::InnerJoin { table, predicate }
        | TableSource::LeftOuterJoin { table, predicate } => {
            visit_table_parameters(table, &mut *f);
            predicate.visit_parameters(f);
        }
    }
}

impl InValues {
    /// Returns the list entries, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[SqlExpr]> {
        match self {
            Self::List(items) => Some(items),
            Self::Subquery(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> SelectExpr {
        let mut select = SelectExpr::new();
        select.add_table(TableSource::Table {
            name: "Customers".to_string(),
            schema: None,
            alias: "c".to_string(),
        });
        select
    }

    #[test]
    fn test_projection_dedup() {
        let mut select = customers();
        let id = SqlExpr::column("c", "Id", ValueType::Int32, false);
        assert_eq!(select.add_to_projection(id.clone()), 0);
        assert_eq!(
            select.add_to_projection(SqlExpr::column("c", "Name", ValueType::String, true)),
            1
        );
        assert_eq!(select.add_to_projection(id), 0);
        assert_eq!(select.projection.len(), 2);
    }

    #[test]
    fn test_predicates_are_anded() {
        let mut select = customers();
        select.add_to_predicate(SqlExpr::is_null(SqlExpr::column(
            "c",
            "Name",
            ValueType::String,
            true,
        )));
        select.add_to_predicate(SqlExpr::equal(
            SqlExpr::column("c", "Id", ValueType::Int32, false),
            SqlExpr::constant(1),
        ));
        match select.predicate {
            Some(SqlExpr::Binary { op, .. }) => assert_eq!(op, super::super::SqlBinaryOp::And),
            other => panic!("Expected AND, got {other:?}"),
        }
    }

    #[test]
    fn test_join_alias() {
        let join = TableSource::LeftOuterJoin {
            table: Box::new(TableSource::Table {
                name: "Orders".to_string(),
                schema: Some("dbo".to_string()),
                alias: "o".to_string(),
            }),
            predicate: SqlExpr::constant(true),
        };
        assert_eq!(join.alias(), Some("o"));
    }

    #[test]
    fn test_parameters_in_joins_and_paging() {
        let mut select = customers();
        select.add_table(TableSource::InnerJoin {
            table: Box::new(TableSource::Table {
                name: "Orders".to_string(),
                schema: None,
                alias: "o".to_string(),
            }),
            predicate: SqlExpr::equal(
                SqlExpr::column("o", "Total", ValueType::Int32, false),
                SqlExpr::parameter("__total_0", ValueType::Int32),
            ),
        });
        select.limit = Some(SqlExpr::parameter("__n_1", ValueType::Int32));
        let mut names = Vec::new();
        select.visit_parameters(&mut |n| names.push(n.to_string()));
        assert_eq!(names, vec!["__total_0", "__n_1"]);
        assert!(select.references_parameters());
        assert!(select.is_paged());
    }
}
