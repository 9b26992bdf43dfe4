//! Query builder.
//!
//! [`Query`] accumulates SELECT state through chained calls and renders it
//! with [`Query::build`] in a fixed clause order:
//!
//! ```text
//! raw("") SELECT raw FROM raw JOIN.. raw WHERE raw GROUP BY raw HAVING raw
//! ORDER BY raw LIMIT raw OFFSET raw
//! ```
//!
//! Every clause may be followed by literal SQL registered with
//! [`Query::raw`]. Building borrows the query, so calling `build` twice
//! yields identical output.
//!
//! ```
//! use oxide_dbal_core::condition::col;
//! use oxide_dbal_core::dialect::{MySqlDialect, SqlContext};
//! use oxide_dbal_core::query::Query;
//!
//! let ctx = SqlContext::new(&MySqlDialect, "");
//! let (sql, params) = Query::from("clubs")
//!     .select(["id", "name"])
//!     .where_(col("name").begins("FC"))
//!     .order_by("name DESC")
//!     .limit(10)
//!     .build(&ctx)
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT `id`, `name` FROM `clubs` WHERE `name` LIKE ? ORDER BY `name` DESC LIMIT 10"
//! );
//! assert_eq!(params.len(), 1);
//! ```

mod write;

use std::fmt;
use std::str::FromStr;

pub use write::{Delete, Insert, Update};

use crate::condition::Condition;
use crate::dialect::{is_field, is_identifier, SqlContext};
use crate::error::{ArgumentError, BuildError};
use crate::value::SqlValue;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(ArgumentError::Direction(s.to_string())),
        }
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `CROSS JOIN`
    Cross,
}

impl JoinKind {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// Raw SQL injection points. Literal SQL registered for a clause is
/// emitted right after that clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    /// Before `SELECT`.
    Start,
    /// After the select list.
    Select,
    /// After `FROM`.
    From,
    /// After the joins.
    Join,
    /// After `WHERE`.
    Where,
    /// After `GROUP BY`.
    GroupBy,
    /// After `HAVING`.
    Having,
    /// After `ORDER BY`.
    OrderBy,
    /// After `LIMIT`.
    Limit,
    /// After `OFFSET`.
    Offset,
}

#[derive(Debug, Clone, PartialEq)]
enum SelectItem {
    Field { name: String, alias: Option<String> },
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Table { name: String, alias: Option<String> },
    Subquery { query: Box<Query>, alias: String },
}

impl Source {
    /// Name the default select list and qualified references use.
    fn reference(&self) -> &str {
        match self {
            Self::Table {
                alias: Some(alias), ..
            }
            | Self::Subquery { alias, .. } => alias,
            Self::Table { name, .. } => name,
        }
    }
}

/// A join clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Kind.
    pub kind: JoinKind,
    /// Logical table name, prefixed on output.
    pub table: String,
    /// Explicit alias.
    pub alias: Option<String>,
    /// `ON` condition; ignored for cross joins.
    pub on: Option<Condition>,
}

/// A SELECT statement under construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    distinct: bool,
    fields: Vec<SelectItem>,
    source: Option<Source>,
    joins: Vec<Join>,
    condition: Option<Condition>,
    group_by: Vec<String>,
    having: Option<Condition>,
    order_by: Vec<(String, Option<String>)>,
    limit: u64,
    offset: u64,
    raw: Vec<(Clause, String, Vec<SqlValue>)>,
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a query over a table.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: &str) -> Self {
        Self::new().table(table)
    }

    /// Starts a query over a previously built sub-query. The alias is
    /// mandatory.
    #[must_use]
    pub fn from_query(query: Self, alias: &str) -> Self {
        Self {
            source: Some(Source::Subquery {
                query: Box::new(query),
                alias: alias.to_string(),
            }),
            ..Self::default()
        }
    }

    /// Sets the source table.
    #[must_use]
    pub fn table(mut self, table: &str) -> Self {
        self.source = Some(Source::Table {
            name: table.to_string(),
            alias: None,
        });
        self
    }

    /// Sets the source table with an alias.
    #[must_use]
    pub fn table_as(mut self, table: &str, alias: &str) -> Self {
        self.source = Some(Source::Table {
            name: table.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Replaces the select list. Items are field names, `table.*`, or
    /// `field AS alias`.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fields = fields.into_iter().map(|f| parse_select(f.as_ref())).collect();
        self
    }

    /// Appends `field AS alias` to the select list.
    #[must_use]
    pub fn select_as(mut self, field: &str, alias: &str) -> Self {
        self.fields.push(SelectItem::Field {
            name: field.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Appends a literal expression (`COUNT(*)`, `MAX(id)`) to the select
    /// list. Not validated.
    #[must_use]
    pub fn select_raw(mut self, expression: &str) -> Self {
        self.fields.push(SelectItem::Raw(expression.to_string()));
        self
    }

    /// `SELECT DISTINCT`.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Adds a join.
    #[must_use]
    pub fn join_with(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// `INNER JOIN table ON condition`
    #[must_use]
    pub fn join(self, table: &str, on: Condition) -> Self {
        self.join_with(Join {
            kind: JoinKind::Inner,
            table: table.to_string(),
            alias: None,
            on: Some(on),
        })
    }

    /// `LEFT JOIN table ON condition`
    #[must_use]
    pub fn left_join(self, table: &str, on: Condition) -> Self {
        self.join_with(Join {
            kind: JoinKind::Left,
            table: table.to_string(),
            alias: None,
            on: Some(on),
        })
    }

    /// `LEFT JOIN table AS alias ON condition`
    #[must_use]
    pub fn left_join_as(self, table: &str, alias: &str, on: Condition) -> Self {
        self.join_with(Join {
            kind: JoinKind::Left,
            table: table.to_string(),
            alias: Some(alias.to_string()),
            on: Some(on),
        })
    }

    /// `RIGHT JOIN table ON condition`
    #[must_use]
    pub fn right_join(self, table: &str, on: Condition) -> Self {
        self.join_with(Join {
            kind: JoinKind::Right,
            table: table.to_string(),
            alias: None,
            on: Some(on),
        })
    }

    /// `CROSS JOIN table`
    #[must_use]
    pub fn cross_join(self, table: &str) -> Self {
        self.join_with(Join {
            kind: JoinKind::Cross,
            table: table.to_string(),
            alias: None,
            on: None,
        })
    }

    /// Replaces the WHERE condition.
    #[must_use]
    pub fn where_(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// ANDs a condition onto the WHERE condition.
    #[must_use]
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(base) => base.and(condition),
            None => condition,
        });
        self
    }

    /// ORs a condition onto the WHERE condition.
    #[must_use]
    pub fn or_where(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(base) => base.or(condition),
            None => condition,
        });
        self
    }

    /// Replaces the GROUP BY list.
    #[must_use]
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the HAVING condition.
    #[must_use]
    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(condition);
        self
    }

    /// Appends an ORDER BY item, either `field` or `field DIRECTION`.
    #[must_use]
    pub fn order_by(mut self, spec: &str) -> Self {
        let mut parts = spec.split_whitespace();
        let field = parts.next().unwrap_or_default().to_string();
        let rest: Vec<&str> = parts.collect();
        let direction = (!rest.is_empty()).then(|| rest.join(" "));
        self.order_by.push((field, direction));
        self
    }

    /// Appends an ORDER BY item with an explicit direction.
    #[must_use]
    pub fn order_by_dir(mut self, field: &str, direction: Direction) -> Self {
        self.order_by
            .push((field.to_string(), Some(direction.as_str().to_string())));
        self
    }

    /// Sets LIMIT. Zero omits the clause.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets OFFSET. Zero omits the clause.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Registers literal SQL to emit after `clause`.
    #[must_use]
    pub fn raw(mut self, clause: Clause, sql: &str, params: Vec<SqlValue>) -> Self {
        self.raw.push((clause, sql.to_string(), params));
        self
    }

    /// Current LIMIT (zero when unset).
    #[must_use]
    pub const fn limit_value(&self) -> u64 {
        self.limit
    }

    /// A `SELECT COUNT(*)` over this query with ordering and paging
    /// removed.
    #[must_use]
    pub fn count_query(&self) -> Self {
        let mut inner = self.clone();
        inner.order_by.clear();
        inner.limit = 0;
        inner.offset = 0;
        Self::from_query(inner, "sub").select_raw("COUNT(*)")
    }

    /// Validates and renders the query.
    pub fn build(&self, ctx: &SqlContext<'_>) -> Result<(String, Vec<SqlValue>), BuildError> {
        let mut params = Vec::new();
        let mut parts: Vec<String> = Vec::new();

        self.emit_raw(Clause::Start, &mut parts, &mut params);

        let mut select = String::from("SELECT ");
        if self.distinct {
            select.push_str("DISTINCT ");
        }
        select.push_str(&self.render_fields(ctx)?);
        parts.push(select);
        self.emit_raw(Clause::Select, &mut parts, &mut params);

        if let Some(source) = &self.source {
            parts.push(format!("FROM {}", render_source(ctx, source, &mut params)?));
        }
        self.emit_raw(Clause::From, &mut parts, &mut params);

        for join in &self.joins {
            parts.push(render_join(ctx, join, &mut params)?);
        }
        self.emit_raw(Clause::Join, &mut parts, &mut params);

        if let Some(condition) = &self.condition {
            let sql = condition.write(ctx, &mut params)?;
            if !sql.is_empty() {
                parts.push(format!("WHERE {sql}"));
            }
        }
        self.emit_raw(Clause::Where, &mut parts, &mut params);

        if !self.group_by.is_empty() {
            let fields = self
                .group_by
                .iter()
                .map(|f| checked_field(ctx, f))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("GROUP BY {}", fields.join(", ")));
        }
        self.emit_raw(Clause::GroupBy, &mut parts, &mut params);

        if let Some(having) = &self.having {
            let sql = having.write(ctx, &mut params)?;
            if !sql.is_empty() {
                parts.push(format!("HAVING {sql}"));
            }
        }
        self.emit_raw(Clause::Having, &mut parts, &mut params);

        if !self.order_by.is_empty() {
            let items = self
                .order_by
                .iter()
                .map(|(field, direction)| {
                    let field = checked_field(ctx, field)?;
                    Ok(match direction {
                        Some(d) => format!("{field} {}", d.parse::<Direction>()?),
                        None => field,
                    })
                })
                .collect::<Result<Vec<_>, BuildError>>()?;
            parts.push(format!("ORDER BY {}", items.join(", ")));
        }
        self.emit_raw(Clause::OrderBy, &mut parts, &mut params);

        if self.limit > 0 {
            parts.push(format!("LIMIT {}", self.limit));
        }
        self.emit_raw(Clause::Limit, &mut parts, &mut params);

        if self.offset > 0 {
            parts.push(format!("OFFSET {}", self.offset));
        }
        self.emit_raw(Clause::Offset, &mut parts, &mut params);

        Ok((parts.join(" "), params))
    }

    fn emit_raw(&self, clause: Clause, parts: &mut Vec<String>, params: &mut Vec<SqlValue>) {
        for (_, sql, own) in self.raw.iter().filter(|(c, _, _)| *c == clause) {
            parts.push(sql.clone());
            params.extend(own.iter().cloned());
        }
    }

    fn render_fields(&self, ctx: &SqlContext<'_>) -> Result<String, BuildError> {
        if self.fields.is_empty() {
            let Some(source) = &self.source else {
                return Err(ArgumentError::Other(String::from(
                    "query has neither a select list nor a source",
                ))
                .into());
            };
            return Ok(ctx.field(&format!("{}.*", source.reference())));
        }
        let rendered = self
            .fields
            .iter()
            .map(|item| match item {
                SelectItem::Raw(sql) => Ok(sql.clone()),
                SelectItem::Field { name, alias } => {
                    if !is_field(name, true) {
                        return Err(ArgumentError::Identifier(name.clone()));
                    }
                    match alias {
                        Some(alias) if !is_identifier(alias) => {
                            Err(ArgumentError::Identifier(alias.clone()))
                        }
                        Some(alias) => Ok(format!("{} AS {}", ctx.field(name), ctx.ident(alias))),
                        None => Ok(ctx.field(name)),
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(", "))
    }
}

fn parse_select(item: &str) -> SelectItem {
    let words: Vec<&str> = item.split_whitespace().collect();
    match words.as_slice() {
        [name, kw, alias] if kw.eq_ignore_ascii_case("AS") => SelectItem::Field {
            name: (*name).to_string(),
            alias: Some((*alias).to_string()),
        },
        _ => SelectItem::Field {
            name: item.trim().to_string(),
            alias: None,
        },
    }
}

fn checked_field(ctx: &SqlContext<'_>, field: &str) -> Result<String, ArgumentError> {
    if is_field(field, false) {
        Ok(ctx.field(field))
    } else {
        Err(ArgumentError::Identifier(field.to_string()))
    }
}

/// Prefixed table name, aliased back to the logical name when a prefix is
/// in effect so qualified references keep working.
fn render_table(
    ctx: &SqlContext<'_>,
    name: &str,
    alias: Option<&str>,
) -> Result<String, ArgumentError> {
    if !is_identifier(name) {
        return Err(ArgumentError::Identifier(name.to_string()));
    }
    let alias = match alias {
        Some(alias) if !is_identifier(alias) => {
            return Err(ArgumentError::Identifier(alias.to_string()))
        }
        Some(alias) => Some(alias),
        None if !ctx.prefix().is_empty() => Some(name),
        None => None,
    };
    Ok(match alias {
        Some(alias) => format!("{} AS {}", ctx.table(name), ctx.ident(alias)),
        None => ctx.table(name),
    })
}

fn render_source(
    ctx: &SqlContext<'_>,
    source: &Source,
    params: &mut Vec<SqlValue>,
) -> Result<String, BuildError> {
    match source {
        Source::Table { name, alias } => Ok(render_table(ctx, name, alias.as_deref())?),
        Source::Subquery { query, alias } => {
            if !is_identifier(alias) {
                return Err(ArgumentError::Identifier(alias.clone()).into());
            }
            let (sql, sub) = query.build(ctx)?;
            params.extend(sub);
            Ok(format!("({sql}) AS {}", ctx.ident(alias)))
        }
    }
}

fn render_join(
    ctx: &SqlContext<'_>,
    join: &Join,
    params: &mut Vec<SqlValue>,
) -> Result<String, BuildError> {
    let target = render_table(ctx, &join.table, join.alias.as_deref())?;
    match (&join.on, join.kind) {
        (_, JoinKind::Cross) | (None, _) => Ok(format!("{} {target}", join.kind.keyword())),
        (Some(on), kind) => {
            let on = on.write(ctx, params)?;
            Ok(format!("{} {target} ON {on}", kind.keyword()))
        }
    }
}
