//! Relational commands and their parameters.
//!
//! A [`RelationalCommand`] is SQL text plus the ordered parameters it
//! references. Query parameters carry no value of their own; the value is
//! looked up in the execution's [`ParameterValues`] each time a physical
//! [`DbCommand`] is created. Parameters added for raw SQL carry a fixed value.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{Error, Result};
use strata_common::utils::strings::IndentedStringBuilder;

use super::ParameterValues;
use super::type_mapper::TypeMapper;
use crate::storage::connection::{DbCommand, DbParameter};

static FORMAT_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\d+)\}").unwrap());

/// A parameter referenced by a [`RelationalCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalParameter {
    /// Name as it appears in the SQL text, including the dialect prefix.
    pub name: String,
    /// Key into the execution's parameter values.
    pub invariant_name: String,
    /// Fixed value; `None` for values bound per execution.
    pub value: Option<Value>,
    /// Declared type, used for store type mapping.
    pub ty: Option<ValueType>,
}

impl RelationalParameter {
    fn bind(&self, values: &ParameterValues, mapper: &dyn TypeMapper) -> Result<DbParameter> {
        let value = match &self.value {
            Some(fixed) => fixed.clone(),
            None => values.get(&self.invariant_name).cloned().ok_or_else(|| {
                Error::Internal(format!(
                    "no value bound for parameter '{}'",
                    self.invariant_name
                ))
            })?,
        };
        let declared = self.ty.as_ref().and_then(|ty| mapper.store_type(ty).ok());
        let store_type = match declared {
            Some(store_type) => Some(store_type),
            None => mapper.default_mapping(&value)?,
        };
        let nullable = value.is_null() || self.ty.as_ref().is_none_or(ValueType::is_nullable);
        Ok(DbParameter {
            name: self.name.clone(),
            value,
            store_type,
            nullable,
        })
    }
}

/// Insertion-ordered parameters of a command being built.
#[derive(Debug, Clone, Default)]
pub struct ParameterList {
    parameters: IndexMap<String, RelationalParameter>,
    generated: usize,
}

impl ParameterList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parameter for `invariant_name`, adding it on first use.
    pub fn get_or_add(
        &mut self,
        prefix: &str,
        invariant_name: &str,
        ty: Option<ValueType>,
    ) -> &RelationalParameter {
        self.parameters
            .entry(invariant_name.to_string())
            .or_insert_with(|| RelationalParameter {
                name: format!("{prefix}{invariant_name}"),
                invariant_name: invariant_name.to_string(),
                value: None,
                ty,
            })
    }

    /// Adds a parameter with a fixed value under a generated name `p0`, `p1`, ...
    pub fn add_value(&mut self, prefix: &str, value: Value) -> &RelationalParameter {
        let mut invariant_name = format!("p{}", self.generated);
        while self.parameters.contains_key(&invariant_name) {
            self.generated += 1;
            invariant_name = format!("p{}", self.generated);
        }
        self.generated += 1;
        let ty = value.value_type();
        self.parameters
            .entry(invariant_name.clone())
            .or_insert(RelationalParameter {
                name: format!("{prefix}{invariant_name}"),
                invariant_name,
                value: Some(value),
                ty,
            })
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns true if no parameter was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationalParameter> {
        self.parameters.values()
    }

    fn into_vec(self) -> Vec<RelationalParameter> {
        self.parameters.into_values().collect()
    }
}

/// SQL text with its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalCommand {
    text: String,
    parameters: Vec<RelationalParameter>,
}

impl RelationalCommand {
    /// Creates a command from parts.
    #[must_use]
    pub fn new(text: impl Into<String>, parameters: Vec<RelationalParameter>) -> Self {
        Self {
            text: text.into(),
            parameters,
        }
    }

    /// The SQL text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parameters, in first-reference order.
    #[must_use]
    pub fn parameters(&self) -> &[RelationalParameter] {
        &self.parameters
    }

    /// Binds parameter values and store types, producing a physical command.
    ///
    /// # Errors
    ///
    /// Fails if a parameter has no value in `values` or its type has no
    /// store type mapping.
    pub fn create_command(
        &self,
        values: &ParameterValues,
        mapper: &dyn TypeMapper,
    ) -> Result<DbCommand> {
        let parameters = self
            .parameters
            .iter()
            .map(|p| p.bind(values, mapper))
            .collect::<Result<Vec<_>>>()?;
        Ok(DbCommand {
            text: self.text.clone(),
            parameters,
        })
    }
}

impl fmt::Display for RelationalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds a [`RelationalCommand`] from text fragments and parameters.
#[derive(Debug, Clone)]
pub struct RelationalCommandBuilder {
    text: IndentedStringBuilder,
    parameters: ParameterList,
    prefix: String,
}

impl Default for RelationalCommandBuilder {
    fn default() -> Self {
        Self::new("@")
    }
}

impl RelationalCommandBuilder {
    /// Creates a builder emitting parameter names with `parameter_prefix`.
    #[must_use]
    pub fn new(parameter_prefix: impl Into<String>) -> Self {
        Self {
            text: IndentedStringBuilder::new(),
            parameters: ParameterList::new(),
            prefix: parameter_prefix.into(),
        }
    }

    /// Appends a fragment.
    pub fn append(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.text.append(text);
        self
    }

    /// Appends a fragment and ends the line.
    pub fn append_line(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.text.append_line(text);
        self
    }

    /// Appends multi-line text at the current indent.
    pub fn append_lines(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.text.append_lines(text);
        self
    }

    /// Indents subsequent lines.
    pub fn increment_indent(&mut self) -> &mut Self {
        self.text.increment_indent();
        self
    }

    /// Outdents subsequent lines.
    pub fn decrement_indent(&mut self) -> &mut Self {
        self.text.decrement_indent();
        self
    }

    /// Appends a reference to a per-execution parameter.
    pub fn append_named_parameter(
        &mut self,
        invariant_name: &str,
        ty: Option<ValueType>,
    ) -> &mut Self {
        let name = self
            .parameters
            .get_or_add(&self.prefix, invariant_name, ty)
            .name
            .clone();
        self.text.append(name);
        self
    }

    /// Appends raw SQL whose `{0}`, `{1}`, ... placeholders refer to `values`.
    ///
    /// Each value becomes a fixed-value parameter; a placeholder repeated in
    /// the fragment refers to the same parameter.
    ///
    /// # Errors
    ///
    /// Fails if a placeholder index has no corresponding value.
    pub fn append_format(&mut self, sql: &str, values: &[Value]) -> Result<&mut Self> {
        let names = values
            .iter()
            .map(|v| self.parameters.add_value(&self.prefix, v.clone()).name.clone())
            .collect::<Vec<_>>();
        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        for caps in FORMAT_PLACEHOLDER.captures_iter(sql) {
            let (Some(whole), Some(index)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = index
                .as_str()
                .parse::<usize>()
                .ok()
                .and_then(|i| names.get(i))
                .ok_or_else(|| {
                    Error::Generation(format!(
                        "placeholder {} has no value; {} value(s) supplied",
                        whole.as_str(),
                        names.len()
                    ))
                })?;
            out.push_str(&sql[last..whole.start()]);
            out.push_str(name);
            last = whole.end();
        }
        out.push_str(&sql[last..]);
        self.text.append(out);
        Ok(self)
    }

    /// Parameters added so far.
    #[must_use]
    pub fn parameters(&self) -> &ParameterList {
        &self.parameters
    }

    /// Returns true if no text was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Finishes the command.
    #[must_use]
    pub fn build(self) -> RelationalCommand {
        RelationalCommand::new(self.text.into_string(), self.parameters.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::type_mapper::{SqlServerTypeMapper, SqliteTypeMapper};

    #[test]
    fn test_named_parameter_added_once() {
        let mut builder = RelationalCommandBuilder::default();
        builder
            .append("SELECT ")
            .append_named_parameter("__city_0", Some(ValueType::String))
            .append(", ")
            .append_named_parameter("__city_0", Some(ValueType::String));
        let command = builder.build();
        assert_eq!(command.text(), "SELECT @__city_0, @__city_0");
        assert_eq!(command.parameters().len(), 1);
        assert_eq!(command.parameters()[0].invariant_name, "__city_0");
    }

    #[test]
    fn test_append_format() {
        let mut builder = RelationalCommandBuilder::default();
        builder
            .append_format(
                "UPDATE T SET A = {0} WHERE B = {1} OR C = {0}",
                &[Value::Int32(1), Value::from("x")],
            )
            .unwrap();
        let command = builder.build();
        assert_eq!(
            command.text(),
            "UPDATE T SET A = @p0 WHERE B = @p1 OR C = @p0"
        );
        assert_eq!(command.parameters()[1].value, Some(Value::from("x")));
    }

    #[test]
    fn test_append_format_missing_value() {
        let mut builder = RelationalCommandBuilder::default();
        let result = builder.append_format("SELECT {2}", &[Value::Int32(1)]);
        assert!(matches!(result, Err(Error::Generation(_))));
    }

    #[test]
    fn test_create_command_binds_values() {
        let mut builder = RelationalCommandBuilder::default();
        builder
            .append("SELECT 1 WHERE x = ")
            .append_named_parameter("__x_0", Some(ValueType::Int32));
        let command = builder.build();

        let mut values = ParameterValues::new();
        values.insert("__x_0".to_string(), Value::Int32(7));
        let db = command.create_command(&values, &SqlServerTypeMapper).unwrap();
        assert_eq!(db.parameters[0].name, "@__x_0");
        assert_eq!(db.parameters[0].value, Value::Int32(7));
        assert_eq!(db.parameters[0].store_type, Some("int"));
        assert!(!db.parameters[0].nullable);

        values.insert("__x_0".to_string(), Value::Int32(8));
        let db = command.create_command(&values, &SqliteTypeMapper).unwrap();
        assert_eq!(db.parameters[0].value, Value::Int32(8));
        assert_eq!(db.text, command.text());
    }

    #[test]
    fn test_create_command_missing_value() {
        let mut builder = RelationalCommandBuilder::default();
        builder.append_named_parameter("__gone_0", None);
        let result = builder
            .build()
            .create_command(&ParameterValues::new(), &SqlServerTypeMapper);
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
