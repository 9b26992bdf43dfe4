//! Condition model.
//!
//! A [`Condition`] is a tree of comparisons joined by `AND`/`OR`/`XOR`/`NOT`.
//! It is validated and rendered in one pass by [`Condition::build`], which
//! yields a SQL fragment and its ordered parameters. Values are bound
//! through placeholders unless the comparison asks for field or value
//! quoting.
//!
//! ```
//! use oxide_dbal_core::condition::col;
//! use oxide_dbal_core::dialect::{MySqlDialect, SqlContext};
//! use oxide_dbal_core::SqlValue;
//!
//! let ctx = SqlContext::new(&MySqlDialect, "");
//! let (sql, params) = col("a").eq(1).and(col("b").is_null()).build(&ctx).unwrap();
//! assert_eq!(sql, "`a` = ? AND `b` IS NULL");
//! assert_eq!(params, vec![SqlValue::Int(1)]);
//! ```

mod shorthand;

use std::fmt;
use std::str::FromStr;

pub use shorthand::Shorthand;

use crate::dialect::{is_field, SqlContext};
use crate::error::{ArgumentError, BuildError, ConditionError};
use crate::query::Query;
use crate::value::{SqlValue, ToSqlValue};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
    /// `BETWEEN`
    Between,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `LIKE`
    Like,
    /// `LIKE %value%`
    Contains,
    /// `LIKE value%`
    Begins,
    /// `LIKE %value`
    Ends,
    /// `FIND_IN_SET(value, column) > 0`
    InSet,
}

impl Operator {
    /// SQL spelling of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like => "LIKE",
            Self::Contains => "CONTAINS",
            Self::Begins => "BEGINS",
            Self::Ends => "ENDS",
            Self::InSet => "IN SET",
        }
    }

    /// Whether this is one of the plain scalar comparisons.
    #[must_use]
    pub const fn is_scalar_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::NotEq | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Whether the operator matches against an escaped pattern.
    #[must_use]
    pub const fn is_pattern(self) -> bool {
        matches!(
            self,
            Self::Like | Self::Contains | Self::Begins | Self::Ends | Self::InSet
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "<>" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "IS" => Ok(Self::Is),
            "IS NOT" => Ok(Self::IsNot),
            "BETWEEN" => Ok(Self::Between),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "LIKE" => Ok(Self::Like),
            "CONTAINS" => Ok(Self::Contains),
            "BEGINS" => Ok(Self::Begins),
            "ENDS" => Ok(Self::Ends),
            "IN SET" => Ok(Self::InSet),
            _ => Err(ArgumentError::Operator(s.to_string())),
        }
    }
}

/// How a comparison's value reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// Bound through a `?` placeholder.
    #[default]
    Natural,
    /// Validated as identifier(s) and quoted as a field reference.
    Field,
    /// Quoted inline as a literal.
    Value,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A scalar.
    Value(SqlValue),
    /// A list of scalars (`IN`, `BETWEEN`).
    List(Vec<SqlValue>),
    /// A nested condition rendered in parentheses.
    Condition(Box<Condition>),
    /// A sub-query rendered in parentheses.
    Query(Box<Query>),
}

impl Operand {
    /// Type description used in validation errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Value(v) => v.type_name().to_string(),
            Self::List(items) => format!("array({})", items.len()),
            Self::Condition(_) => String::from("condition"),
            Self::Query(_) => String::from("query"),
        }
    }
}

impl<T: ToSqlValue> From<T> for Operand {
    fn from(value: T) -> Self {
        Self::Value(value.to_sql_value())
    }
}

/// A single `column OP operand` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Column, optionally qualified as `table.column`.
    pub column: String,
    /// Operator.
    pub operator: Operator,
    /// Right-hand side.
    pub operand: Operand,
    /// Bind mode.
    pub bind: BindMode,
}

/// Logical connective of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    /// All children.
    And,
    /// Any child.
    Or,
    /// Exactly one of two (MySQL `XOR`).
    Xor,
    /// `NOT (children AND-joined)`.
    Not,
}

impl Logic {
    const fn joiner(self) -> &'static str {
        match self {
            Self::And | Self::Not => " AND ",
            Self::Or => " OR ",
            Self::Xor => " XOR ",
        }
    }
}

/// A condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A comparison.
    Comparison(Comparison),
    /// Children joined by a connective.
    Compound {
        /// Connective.
        logic: Logic,
        /// Children.
        children: Vec<Condition>,
    },
    /// Literal SQL with its own parameters, emitted verbatim.
    Raw {
        /// SQL fragment.
        sql: String,
        /// Parameters for the fragment's placeholders.
        params: Vec<SqlValue>,
    },
}

/// Starts a comparison on `column`.
#[must_use]
pub fn col(column: &str) -> Col {
    Col(column.to_string())
}

/// A column awaiting its comparison. See [`col`].
#[derive(Debug, Clone)]
pub struct Col(String);

impl Col {
    fn cmp(self, operator: Operator, operand: Operand) -> Condition {
        Condition::new(self.0, operator, operand)
    }

    /// `column = value`
    #[must_use]
    pub fn eq<T: ToSqlValue>(self, value: T) -> Condition {
        self.cmp(Operator::Eq, value.into())
    }

    /// `column != value`
    #[must_use]
    pub fn ne<T: ToSqlValue>(self, value: T) -> Condition {
        self.cmp(Operator::Ne, value.into())
    }

    /// `column < value`
    #[must_use]
    pub fn lt<T: ToSqlValue>(self, value: T) -> Condition {
        self.cmp(Operator::Lt, value.into())
    }

    /// `column <= value`
    #[must_use]
    pub fn le<T: ToSqlValue>(self, value: T) -> Condition {
        self.cmp(Operator::Le, value.into())
    }

    /// `column > value`
    #[must_use]
    pub fn gt<T: ToSqlValue>(self, value: T) -> Condition {
        self.cmp(Operator::Gt, value.into())
    }

    /// `column >= value`
    #[must_use]
    pub fn ge<T: ToSqlValue>(self, value: T) -> Condition {
        self.cmp(Operator::Ge, value.into())
    }

    /// `column IS NULL`
    #[must_use]
    pub fn is_null(self) -> Condition {
        self.cmp(Operator::Is, Operand::Value(SqlValue::Null))
    }

    /// `column IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self) -> Condition {
        self.cmp(Operator::IsNot, Operand::Value(SqlValue::Null))
    }

    /// `column BETWEEN low AND high`
    #[must_use]
    pub fn between<T: ToSqlValue, U: ToSqlValue>(self, low: T, high: U) -> Condition {
        self.cmp(
            Operator::Between,
            Operand::List(vec![low.to_sql_value(), high.to_sql_value()]),
        )
    }

    /// `column IN (...)`. An empty list renders as an empty fragment.
    #[must_use]
    pub fn in_list<I, T>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = T>,
        T: ToSqlValue,
    {
        let values = values.into_iter().map(ToSqlValue::to_sql_value).collect();
        self.cmp(Operator::In, Operand::List(values))
    }

    /// `column NOT IN (...)`. An empty list renders as an empty fragment.
    #[must_use]
    pub fn not_in<I, T>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = T>,
        T: ToSqlValue,
    {
        let values = values.into_iter().map(ToSqlValue::to_sql_value).collect();
        self.cmp(Operator::NotIn, Operand::List(values))
    }

    /// `column IN (sub-query)`
    #[must_use]
    pub fn in_query(self, query: Query) -> Condition {
        self.cmp(Operator::In, Operand::Query(Box::new(query)))
    }

    /// `column NOT IN (sub-query)`
    #[must_use]
    pub fn not_in_query(self, query: Query) -> Condition {
        self.cmp(Operator::NotIn, Operand::Query(Box::new(query)))
    }

    /// `column LIKE value`, wildcards in `value` escaped.
    #[must_use]
    pub fn like(self, value: &str) -> Condition {
        self.cmp(Operator::Like, value.into())
    }

    /// `column LIKE %value%`
    #[must_use]
    pub fn contains(self, value: &str) -> Condition {
        self.cmp(Operator::Contains, value.into())
    }

    /// `column LIKE value%`
    #[must_use]
    pub fn begins(self, value: &str) -> Condition {
        self.cmp(Operator::Begins, value.into())
    }

    /// `column LIKE %value`
    #[must_use]
    pub fn ends(self, value: &str) -> Condition {
        self.cmp(Operator::Ends, value.into())
    }

    /// `FIND_IN_SET(value, column) > 0`
    #[must_use]
    pub fn in_set(self, value: &str) -> Condition {
        self.cmp(Operator::InSet, value.into())
    }

    /// `column OP other_column`, both sides quoted as identifiers.
    #[must_use]
    pub fn field(self, operator: Operator, other: &str) -> Condition {
        self.cmp(operator, other.into()).bind(BindMode::Field)
    }
}

impl Condition {
    /// Creates a comparison with natural binding.
    pub fn new(column: impl Into<String>, operator: Operator, operand: impl Into<Operand>) -> Self {
        Self::Comparison(Comparison {
            column: column.into(),
            operator,
            operand: operand.into(),
            bind: BindMode::Natural,
        })
    }

    /// `left = right` between two columns, as used in join conditions.
    pub fn columns_eq(left: &str, right: &str) -> Self {
        col(left).field(Operator::Eq, right)
    }

    /// Literal SQL with parameters. Not validated.
    pub fn raw(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// All of `children`.
    #[must_use]
    pub fn all(children: Vec<Self>) -> Self {
        Self::Compound {
            logic: Logic::And,
            children,
        }
    }

    /// Any of `children`.
    #[must_use]
    pub fn any(children: Vec<Self>) -> Self {
        Self::Compound {
            logic: Logic::Or,
            children,
        }
    }

    /// `a XOR b ...`
    #[must_use]
    pub fn xor(children: Vec<Self>) -> Self {
        Self::Compound {
            logic: Logic::Xor,
            children,
        }
    }

    /// `NOT (children AND-joined)`
    #[must_use]
    pub fn none(children: Vec<Self>) -> Self {
        Self::Compound {
            logic: Logic::Not,
            children,
        }
    }

    /// Negates this condition.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::none(vec![self])
    }

    /// Combines with `other` under AND, flattening into an existing AND.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.join(Logic::And, other)
    }

    /// Combines with `other` under OR, flattening into an existing OR.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.join(Logic::Or, other)
    }

    fn join(self, logic: Logic, other: Self) -> Self {
        match self {
            Self::Compound {
                logic: existing,
                mut children,
            } if existing == logic => {
                children.push(other);
                Self::Compound { logic, children }
            }
            base => Self::Compound {
                logic,
                children: vec![base, other],
            },
        }
    }

    /// Sets the bind mode of a comparison. No effect on other nodes.
    #[must_use]
    pub fn bind(mut self, mode: BindMode) -> Self {
        if let Self::Comparison(c) = &mut self {
            c.bind = mode;
        }
        self
    }

    /// Parses a raw `left OP right` string.
    pub fn parse(raw: &str) -> Result<Self, BuildError> {
        Shorthand::Raw(raw.to_string()).into_condition()
    }

    /// Normalizes a JSON shorthand into a condition.
    ///
    /// Accepts the [`Shorthand`] forms; an object with several keys is the
    /// AND of one equality per key.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, BuildError> {
        if let serde_json::Value::Object(map) = value {
            if map.len() > 1 {
                let children = map
                    .iter()
                    .map(|(k, v)| {
                        let single = serde_json::Value::Object(
                            std::iter::once((k.clone(), v.clone())).collect(),
                        );
                        Shorthand::from_json(&single)?.into_condition()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Self::all(children));
            }
        }
        Shorthand::from_json(value)?.into_condition()
    }

    /// Validates and renders the condition.
    pub fn build(&self, ctx: &SqlContext<'_>) -> Result<(String, Vec<SqlValue>), BuildError> {
        let mut params = Vec::new();
        let sql = self.write(ctx, &mut params)?;
        Ok((sql, params))
    }

    /// Validates without keeping the output.
    pub fn validate(&self, ctx: &SqlContext<'_>) -> Result<(), BuildError> {
        self.build(ctx).map(|_| ())
    }

    /// Renders into `params`, returning the fragment.
    pub(crate) fn write(
        &self,
        ctx: &SqlContext<'_>,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, BuildError> {
        match self {
            Self::Comparison(c) => c.write(ctx, params),
            Self::Raw { sql, params: own } => {
                params.extend(own.iter().cloned());
                Ok(sql.clone())
            }
            Self::Compound { logic, children } => {
                let parts = children
                    .iter()
                    .map(|child| {
                        let sql = child.write(ctx, params)?;
                        Ok(if child.needs_parens() && !sql.is_empty() {
                            format!("({sql})")
                        } else {
                            sql
                        })
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                if parts.is_empty() {
                    return Ok(String::new());
                }
                let joined = parts.join(logic.joiner());
                Ok(match logic {
                    Logic::Not => format!("NOT ({joined})"),
                    _ => joined,
                })
            }
        }
    }

    fn needs_parens(&self) -> bool {
        matches!(
            self,
            Self::Compound { logic, children } if *logic != Logic::Not && children.len() > 1
        )
    }

    /// Human-readable SQL with values inlined. Never fails; children that
    /// render empty show as `(!!)`.
    #[must_use]
    pub fn preview(&self, ctx: &SqlContext<'_>) -> String {
        match self {
            Self::Comparison(c) => c.preview(ctx),
            Self::Raw { sql, .. } => sql.clone(),
            Self::Compound { logic, children } => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|child| {
                        let p = child.preview(ctx);
                        if p.is_empty() {
                            String::from("(!!)")
                        } else if child.needs_parens() {
                            format!("({p})")
                        } else {
                            p
                        }
                    })
                    .collect();
                let joined = parts.join(logic.joiner());
                match logic {
                    Logic::Not => format!("NOT ({joined})"),
                    _ => joined,
                }
            }
        }
    }
}

/// Escapes `LIKE` wildcards.
#[must_use]
pub fn escape_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('_', "\\_")
        .replace('%', "\\%")
}

impl Comparison {
    fn fail(&self, ctx: &SqlContext<'_>, message: impl Into<String>) -> BuildError {
        ConditionError::new(message, self.preview(ctx), self.operand.describe()).into()
    }

    fn write(
        &self,
        ctx: &SqlContext<'_>,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, BuildError> {
        if !is_field(&self.column, false) {
            return Err(self.fail(ctx, format!("invalid column '{}'", self.column)));
        }
        let column = ctx.field(&self.column);
        let op = self.operator;

        if let Operand::Condition(_) | Operand::Query(_) = &self.operand {
            if matches!(op, Operator::Is | Operator::IsNot | Operator::Between) || op.is_pattern()
            {
                return Err(self.fail(ctx, format!("{op} does not accept a nested statement")));
            }
            let sub = self.write_nested(ctx, params)?;
            return Ok(format!("{column} {op} ({sub})"));
        }

        match op {
            _ if op.is_scalar_comparison() => {
                let Operand::Value(value) = &self.operand else {
                    return Err(self.fail(ctx, format!("{op} expects a scalar")));
                };
                let rhs = self.render_scalar(ctx, value, params)?;
                Ok(format!("{column} {op} {rhs}"))
            }
            Operator::Is | Operator::IsNot => {
                let keyword = match &self.operand {
                    Operand::Value(SqlValue::Null) => Some("NULL"),
                    Operand::Value(SqlValue::Text(s)) => null_keyword(s),
                    _ => None,
                };
                let keyword =
                    keyword.ok_or_else(|| self.fail(ctx, format!("{op} expects NULL or NOT NULL")))?;
                Ok(format!("{column} {op} {keyword}"))
            }
            Operator::Between => match &self.operand {
                Operand::List(bounds) if bounds.len() == 2 => {
                    let low = self.render_scalar(ctx, &bounds[0], params)?;
                    let high = self.render_scalar(ctx, &bounds[1], params)?;
                    Ok(format!("{column} BETWEEN {low} AND {high}"))
                }
                _ => Err(self.fail(ctx, "BETWEEN expects exactly two bounds")),
            },
            Operator::In | Operator::NotIn => {
                let Operand::List(values) = &self.operand else {
                    return Err(self.fail(ctx, format!("{op} expects a list")));
                };
                if values.is_empty() {
                    return Ok(String::new());
                }
                let rendered = values
                    .iter()
                    .map(|v| self.render_scalar(ctx, v, params))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{column} {op} ({})", rendered.join(", ")))
            }
            _ => self.write_pattern(ctx, &column, params),
        }
    }

    fn write_nested(
        &self,
        ctx: &SqlContext<'_>,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, BuildError> {
        match &self.operand {
            Operand::Condition(c) => c.write(ctx, params),
            Operand::Query(q) => {
                let (sql, sub_params) = q.build(ctx)?;
                params.extend(sub_params);
                Ok(sql)
            }
            _ => Ok(String::new()),
        }
    }

    fn write_pattern(
        &self,
        ctx: &SqlContext<'_>,
        column: &str,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, BuildError> {
        let op = self.operator;
        if self.bind == BindMode::Field && op != Operator::Like {
            return Err(self.fail(ctx, format!("{op} cannot compare against a field")));
        }
        let text = match &self.operand {
            Operand::Value(SqlValue::Text(s)) => s.clone(),
            Operand::Value(v @ (SqlValue::Int(_) | SqlValue::Float(_))) => v.to_string(),
            _ => return Err(self.fail(ctx, format!("{op} expects a string"))),
        };
        if self.bind == BindMode::Field {
            let rhs = self.render_scalar(ctx, &SqlValue::Text(text), params)?;
            return Ok(format!("{column} LIKE {rhs}"));
        }
        let escaped = escape_wildcards(&text);
        let pattern = match op {
            Operator::Contains => format!("%{escaped}%"),
            Operator::Begins => format!("{escaped}%"),
            Operator::Ends => format!("%{escaped}"),
            _ => escaped,
        };
        let rhs = self.render_scalar(ctx, &SqlValue::Text(pattern), params)?;
        if op == Operator::InSet {
            return Ok(format!("FIND_IN_SET({rhs}, {column}) > 0"));
        }
        Ok(format!("{column} LIKE {rhs}{}", like_escape(ctx)))
    }

    fn render_scalar(
        &self,
        ctx: &SqlContext<'_>,
        value: &SqlValue,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, BuildError> {
        match self.bind {
            BindMode::Natural => {
                params.push(value.clone());
                Ok(String::from("?"))
            }
            BindMode::Value => Ok(ctx.value(value)),
            BindMode::Field => match value {
                SqlValue::Text(name) if is_field(name, false) => Ok(ctx.field(name)),
                other => Err(ConditionError::new(
                    format!("'{}' is not a valid field reference", other.to_key()),
                    self.preview(ctx),
                    other.type_name(),
                )
                .into()),
            },
        }
    }

    fn preview(&self, ctx: &SqlContext<'_>) -> String {
        let column = if is_field(&self.column, false) {
            ctx.field(&self.column)
        } else {
            self.column.clone()
        };
        let scalar = |v: &SqlValue| match (self.bind, v) {
            (BindMode::Field, SqlValue::Text(name)) if is_field(name, false) => ctx.field(name),
            _ => ctx.value(v),
        };
        let op = self.operator;
        match (&self.operand, op) {
            (Operand::List(values), Operator::In | Operator::NotIn) if values.is_empty() => {
                String::new()
            }
            (Operand::List(values), Operator::Between) if values.len() == 2 => format!(
                "{column} BETWEEN {} AND {}",
                scalar(&values[0]),
                scalar(&values[1])
            ),
            (Operand::List(values), _) => format!(
                "{column} {op} ({})",
                values.iter().map(scalar).collect::<Vec<_>>().join(", ")
            ),
            (Operand::Value(v), Operator::Is | Operator::IsNot) => match v {
                SqlValue::Null => format!("{column} {op} NULL"),
                SqlValue::Text(s) => format!("{column} {op} {s}"),
                other => format!("{column} {op} {}", ctx.value(other)),
            },
            (Operand::Value(v), Operator::InSet) => {
                format!("FIND_IN_SET({}, {column}) > 0", scalar(v))
            }
            (Operand::Value(v), _) => format!("{column} {op} {}", scalar(v)),
            (Operand::Condition(c), _) => format!("{column} {op} ({})", c.preview(ctx)),
            (Operand::Query(q), _) => {
                let sub = q.build(ctx).map_or_else(|_| String::from("..."), |(sql, _)| sql);
                format!("{column} {op} ({sub})")
            }
        }
    }
}

fn null_keyword(s: &str) -> Option<&'static str> {
    let words: Vec<String> = s.split_whitespace().map(str::to_ascii_uppercase).collect();
    match words.as_slice() {
        [null] if null == "NULL" => Some("NULL"),
        [not, null] if not == "NOT" && null == "NULL" => Some("NOT NULL"),
        _ => None,
    }
}

fn like_escape(ctx: &SqlContext<'_>) -> &'static str {
    match ctx.dialect().kind() {
        crate::dialect::DialectKind::Sqlite => " ESCAPE '\\'",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, SqliteDialect};
    use serde_json::json;

    fn my() -> SqlContext<'static> {
        SqlContext::new(&MySqlDialect, "")
    }

    fn build(c: &Condition) -> (String, Vec<SqlValue>) {
        c.build(&my()).unwrap()
    }

    #[test]
    fn equality_shorthand() {
        let c = Condition::from_json(&json!({"a": 1})).unwrap();
        assert_eq!(build(&c), (String::from("`a` = ?"), vec![SqlValue::Int(1)]));
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let c = Condition::from_json(&json!({"a": null})).unwrap();
        assert_eq!(build(&c).0, "`a` IS NULL");
        let c = Condition::from_json(&json!(["!=", "a", null])).unwrap();
        assert_eq!(build(&c).0, "`a` IS NOT NULL");
    }

    #[test]
    fn positional_and_operator_keyed_shorthand() {
        let c = Condition::from_json(&json!([">=", "t.age", 18])).unwrap();
        assert_eq!(build(&c), (String::from("`t`.`age` >= ?"), vec![SqlValue::Int(18)]));

        let c = Condition::from_json(&json!(["IN", {"id": [1, 2, 3]}])).unwrap();
        assert_eq!(
            build(&c),
            (
                String::from("`id` IN (?, ?, ?)"),
                vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
            )
        );
    }

    #[test]
    fn multi_key_object_is_conjunction() {
        let c = Condition::from_json(&json!({"a": 1, "b": "x"})).unwrap();
        assert_eq!(build(&c).0, "`a` = ? AND `b` = ?");
    }

    #[test]
    fn empty_in_renders_empty_fragment() {
        assert_eq!(build(&col("a").in_list(Vec::<i64>::new())), (String::new(), vec![]));
        assert_eq!(build(&col("a").not_in(Vec::<i64>::new())).0, "");
    }

    #[test]
    fn empty_in_inside_compound_is_not_guarded() {
        let c = col("a").in_list(Vec::<i64>::new()).and(col("x").eq(1));
        assert_eq!(build(&c).0, " AND `x` = ?");
        assert_eq!(c.preview(&my()), "(!!) AND `x` = 1");
    }

    #[test]
    fn between_requires_two_scalars() {
        assert_eq!(
            build(&col("a").between(1, 5)),
            (
                String::from("`a` BETWEEN ? AND ?"),
                vec![SqlValue::Int(1), SqlValue::Int(5)]
            )
        );

        let three = Condition::new("a", Operator::Between, Operand::List(vec![
            SqlValue::Int(1),
            SqlValue::Int(2),
            SqlValue::Int(3),
        ]));
        let err = three.build(&my()).unwrap_err();
        let BuildError::Condition(err) = err else {
            panic!("expected condition error");
        };
        assert_eq!(err.actual, "array(3)");
        assert_eq!(err.preview, "`a` BETWEEN (1, 2, 3)");

        let scalar = Condition::new("a", Operator::Between, 4);
        assert!(scalar.build(&my()).is_err());
    }

    #[test]
    fn is_accepts_only_null_keywords() {
        let c = Condition::new("a", Operator::Is, "not  null");
        assert_eq!(build(&c).0, "`a` IS NOT NULL");
        let bad = Condition::new("a", Operator::Is, "1; DROP TABLE x");
        assert!(bad.build(&my()).is_err());
    }

    #[test]
    fn patterns_escape_wildcards() {
        assert_eq!(
            build(&col("name").contains("50%_off")),
            (
                String::from("`name` LIKE ?"),
                vec![SqlValue::Text(String::from("%50\\%\\_off%"))]
            )
        );
        assert_eq!(
            build(&col("name").begins("ab")).1,
            vec![SqlValue::Text(String::from("ab%"))]
        );
        assert_eq!(
            build(&col("name").ends("ab")).1,
            vec![SqlValue::Text(String::from("%ab"))]
        );
        assert_eq!(
            build(&col("tags").in_set("a_b")),
            (
                String::from("FIND_IN_SET(?, `tags`) > 0"),
                vec![SqlValue::Text(String::from("a\\_b"))]
            )
        );
    }

    #[test]
    fn sqlite_like_declares_escape_character() {
        let ctx = SqlContext::new(&SqliteDialect, "");
        let (sql, _) = col("name").like("x").build(&ctx).unwrap();
        assert_eq!(sql, "\"name\" LIKE ? ESCAPE '\\'");
    }

    #[test]
    fn field_bind_mode_quotes_identifiers() {
        let c = Condition::columns_eq("a.id", "b.a_id");
        assert_eq!(build(&c), (String::from("`a`.`id` = `b`.`a_id`"), vec![]));

        let bad = col("a").field(Operator::Eq, "b; DROP");
        assert!(bad.build(&my()).is_err());

        let c = col("a").contains("b").bind(BindMode::Field);
        assert!(c.build(&my()).is_err());
    }

    #[test]
    fn value_bind_mode_inlines_literals() {
        let c = col("name").eq("O'Brien").bind(BindMode::Value);
        assert_eq!(build(&c), (String::from("`name` = 'O''Brien'"), vec![]));
    }

    #[test]
    fn compound_nesting_and_not() {
        let c = col("a").eq(1).or(col("b").eq(2)).and(col("c").eq(3));
        assert_eq!(build(&c).0, "(`a` = ? OR `b` = ?) AND `c` = ?");

        let n = Condition::none(vec![col("a").eq(1), col("b").eq(2)]);
        assert_eq!(build(&n).0, "NOT (`a` = ? AND `b` = ?)");

        let x = Condition::xor(vec![col("a").eq(1), col("b").eq(2)]);
        assert_eq!(build(&x).0, "`a` = ? XOR `b` = ?");
    }

    #[test]
    fn nested_condition_operand() {
        let c = Condition::new(
            "flag",
            Operator::Eq,
            Operand::Condition(Box::new(col("a").gt(1))),
        );
        assert_eq!(build(&c), (String::from("`flag` = (`a` > ?)"), vec![SqlValue::Int(1)]));
    }

    #[test]
    fn scalar_operator_rejects_list() {
        let c = Condition::new("a", Operator::Eq, Operand::List(vec![SqlValue::Int(1)]));
        let Err(BuildError::Condition(err)) = c.build(&my()) else {
            panic!("expected condition error");
        };
        assert_eq!(err.actual, "array(1)");
    }

    #[test]
    fn invalid_column_is_rejected() {
        assert!(col("a = 1 OR 1").eq(1).build(&my()).is_err());
    }

    #[test]
    fn operators_parse_case_insensitively() {
        assert_eq!("not  in".parse(), Ok(Operator::NotIn));
        assert_eq!("in set".parse(), Ok(Operator::InSet));
        assert!("===".parse::<Operator>().is_err());
    }
}
