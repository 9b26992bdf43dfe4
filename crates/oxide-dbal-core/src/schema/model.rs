//! In-memory schema model: tables, columns, indexes, foreign keys, views.
//!
//! The same types describe the *declared* schema (from documents or code)
//! and the *live* schema reconstructed by introspection. The two are never
//! merged, only compared.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ArgumentError;

/// Default value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// `DEFAULT NULL`.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal, quoted on output.
    String(String),
    /// Raw SQL expression such as `CURRENT_TIMESTAMP`, emitted verbatim.
    Expression(String),
}

impl DefaultValue {
    /// Canonical text used to compare declared and live defaults.
    ///
    /// `NULL` compares equal to "no default".
    #[must_use]
    pub fn normalized(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(match s.to_ascii_lowercase().as_str() {
                "true" => String::from("1"),
                "false" => String::from("0"),
                _ => normalize_numeric(s).unwrap_or_else(|| s.clone()),
            }),
            Self::Expression(e) => Some(e.trim().trim_matches(['(', ')']).to_ascii_uppercase()),
        }
    }

    /// Parses a default as reported by a database catalog: quoted strings,
    /// numbers, `NULL`, `TRUE`/`FALSE`, anything else is an expression.
    /// Postgres-style `::type` casts are stripped.
    #[must_use]
    pub fn from_sql_literal(text: &str) -> Option<Self> {
        let mut text = text.trim();
        if let Some(idx) = cast_position(text) {
            text = text[..idx].trim();
        }
        if text.is_empty() || text.eq_ignore_ascii_case("NULL") {
            return None;
        }
        if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
            return Some(Self::String(text[1..text.len() - 1].replace("''", "'")));
        }
        if text.eq_ignore_ascii_case("true") {
            return Some(Self::Bool(true));
        }
        if text.eq_ignore_ascii_case("false") {
            return Some(Self::Bool(false));
        }
        if let Ok(n) = text.parse::<i64>() {
            return Some(Self::Integer(n));
        }
        if let Ok(f) = text.parse::<f64>() {
            return Some(Self::Float(f));
        }
        Some(Self::Expression(text.to_string()))
    }
}

/// Byte offset of a trailing `::type` cast outside quotes.
fn cast_position(text: &str) -> Option<usize> {
    let mut in_quote = false;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'\'' => in_quote = !in_quote,
            b':' if !in_quote && bytes.get(i + 1) == Some(&b':') => return Some(i),
            _ => {}
        }
    }
    None
}

fn normalize_numeric(s: &str) -> Option<String> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(n.to_string());
    }
    s.parse::<f64>().ok().map(|f| f.to_string())
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type as written, e.g. `VARCHAR(200)` or `INT UNSIGNED`.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the column is part of the table's primary key.
    pub primary_key: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Names this column had before, for rename detection.
    pub previous_names: Vec<String>,
    /// Dialect-specific metadata (enum values, comments, ...).
    pub extra: IndexMap<String, String>,
}

impl Column {
    /// Creates a NOT NULL column without default.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            previous_names: Vec::new(),
            extra: IndexMap::new(),
        }
    }

    /// Sets nullability.
    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Marks the column as auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Records previous names of this column.
    #[must_use]
    pub fn previous_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.previous_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Plain index.
    Index,
    /// Unique index.
    Unique,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Index => "index",
            Self::Unique => "unique",
        })
    }
}

impl FromStr for IndexType {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(Self::Index),
            "unique" => Ok(Self::Unique),
            other => Err(ArgumentError::Other(format!("unknown index type '{other}'"))),
        }
    }
}

/// A table index. Column order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Index type.
    pub index_type: IndexType,
    /// Ordered member columns.
    pub columns: Vec<String>,
}

impl Index {
    /// Creates an index.
    pub fn new<I, S>(name: impl Into<String>, index_type: IndexType, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            index_type,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Name assigned to an index declared without one:
    /// `<table>_<col1>_<col2>_idx` (or `_uniq`).
    #[must_use]
    pub fn default_name(table: &str, columns: &[String], index_type: IndexType) -> String {
        let suffix = match index_type {
            IndexType::Index => "idx",
            IndexType::Unique => "uniq",
        };
        format!("{table}_{}_{suffix}", columns.join("_"))
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForeignKeyRule {
    /// `RESTRICT`.
    #[default]
    Restrict,
    /// `CASCADE`.
    Cascade,
    /// `SET NULL`.
    SetNull,
    /// `NO ACTION`.
    NoAction,
}

impl ForeignKeyRule {
    /// SQL keyword(s) for this rule.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::NoAction => "NO ACTION",
        }
    }
}

impl FromStr for ForeignKeyRule {
    type Err = ArgumentError;

    /// Accepts both document spellings (`set-null`) and catalog spellings
    /// (`SET NULL`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "restrict" => Ok(Self::Restrict),
            "cascade" => Ok(Self::Cascade),
            "set null" => Ok(Self::SetNull),
            "no action" => Ok(Self::NoAction),
            _ => Err(ArgumentError::Other(format!("unknown foreign key rule '{s}'"))),
        }
    }
}

/// A single-column foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name; assigned by the sync engine when absent.
    pub name: Option<String>,
    /// Source table.
    pub table: String,
    /// Source column.
    pub column: String,
    /// Referenced table.
    pub target_table: String,
    /// Referenced column.
    pub target_column: String,
    /// `ON UPDATE` rule.
    pub on_update: ForeignKeyRule,
    /// `ON DELETE` rule.
    pub on_delete: ForeignKeyRule,
}

impl ForeignKey {
    /// Creates a foreign key with `RESTRICT` rules.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            table: table.into(),
            column: column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            on_update: ForeignKeyRule::Restrict,
            on_delete: ForeignKeyRule::Restrict,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the `ON UPDATE` and `ON DELETE` rules.
    #[must_use]
    pub const fn rules(mut self, on_update: ForeignKeyRule, on_delete: ForeignKeyRule) -> Self {
        self.on_update = on_update;
        self.on_delete = on_delete;
        self
    }

    /// The constraint name, `fk_<table>_<column>` when none was given.
    #[must_use]
    pub fn constraint_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("fk_{}_{}", self.table, self.column))
    }

    /// Structural equality: same columns, target and rules. Names are
    /// ignored.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.column == other.column
            && self.target_table == other.target_table
            && self.target_column == other.target_column
            && self.on_update == other.on_update
            && self.on_delete == other.on_delete
    }
}

/// MySQL table options. Ignored by other dialects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttributes {
    /// Storage engine.
    pub engine: Option<String>,
    /// Default character set.
    pub charset: Option<String>,
    /// Default collation.
    pub collation: Option<String>,
}

/// A default record: column name to raw value. `now()` and `uuid()` are
/// resolved when the INSERT is generated.
pub type Record = IndexMap<String, String>;

/// A table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Unprefixed table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, Column>,
    /// Indexes.
    pub indexes: Vec<Index>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Ordered primary key columns.
    pub primary_key: Vec<String>,
    /// Rows inserted when the table is created.
    pub default_records: Vec<Record>,
    /// Names this table had before, for rename detection.
    pub previous_names: Vec<String>,
    /// MySQL table options.
    pub attributes: TableAttributes,
    /// Name of the live primary key constraint, where introspection
    /// reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_name: Option<String>,
}

impl Table {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            primary_key: Vec::new(),
            default_records: Vec::new(),
            previous_names: Vec::new(),
            attributes: TableAttributes::default(),
            primary_key_name: None,
        }
    }

    /// Adds (or replaces) a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.add_column(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_primary_key(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Records previous names of this table.
    #[must_use]
    pub fn previous_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.previous_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a default record.
    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        self.default_records.push(record);
        self
    }

    /// Adds a column, replacing one with the same name in place.
    pub fn add_column(&mut self, mut column: Column) {
        column.primary_key = self.primary_key.contains(&column.name);
        self.columns.insert(column.name.clone(), column);
    }

    /// Adds an index, replacing one with the same name.
    pub fn add_index(&mut self, index: Index) {
        if let Some(existing) = self.indexes.iter_mut().find(|i| i.name == index.name) {
            *existing = index;
        } else {
            self.indexes.push(index);
        }
    }

    /// Sets the primary key and keeps the column flags in sync.
    pub fn set_primary_key(&mut self, columns: Vec<String>) {
        for column in self.columns.values_mut() {
            column.primary_key = columns.contains(&column.name);
        }
        self.primary_key = columns;
    }

    /// Looks up a column.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Whether `column` leads the primary key or some index.
    #[must_use]
    pub fn is_indexed(&self, column: &str) -> bool {
        self.primary_key.first().is_some_and(|c| c == column)
            || self
                .indexes
                .iter()
                .any(|i| i.columns.first().is_some_and(|c| c == column))
    }

    /// The single auto-increment column forming the whole primary key.
    #[must_use]
    pub fn auto_increment_key(&self) -> Option<&Column> {
        match self.primary_key.as_slice() {
            [only] => self.columns.get(only).filter(|c| c.auto_increment),
            _ => None,
        }
    }
}

/// A view. The checksum identifies the SQL body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// View name.
    pub name: String,
    /// SELECT body.
    pub sql: String,
    /// SHA-256 of the trimmed body, hex encoded.
    pub checksum: String,
}

impl View {
    /// Creates a view and computes its checksum.
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into().trim().to_string();
        let checksum = format!("{:x}", Sha256::digest(sql.as_bytes()));
        Self {
            name: name.into(),
            sql,
            checksum,
        }
    }
}

/// A schema: tables and views by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema (database) name.
    pub name: String,
    /// Tables in declaration order.
    pub tables: IndexMap<String, Table>,
    /// Views in declaration order.
    pub views: IndexMap<String, View>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: IndexMap::new(),
            views: IndexMap::new(),
        }
    }

    /// Adds a table, merging with an existing one of the same name.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.merge_table(table);
        self
    }

    /// Adds a view.
    #[must_use]
    pub fn view(mut self, view: View) -> Self {
        self.views.insert(view.name.clone(), view);
        self
    }

    /// Looks up a table.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Merges a table into the schema.
    ///
    /// The first table with a given name fixes every table-level property
    /// (attributes, primary key, default records, previous names). Later
    /// tables with the same name only contribute columns and indexes; a
    /// column or index with an already-known name replaces the earlier one
    /// in place. A foreign key comes along with the index declaring it and
    /// replaces an earlier key on the same column.
    pub fn merge_table(&mut self, table: Table) {
        match self.tables.get_mut(&table.name) {
            None => {
                self.tables.insert(table.name.clone(), table);
            }
            Some(existing) => {
                for fk in table.foreign_keys {
                    let indexed = table
                        .indexes
                        .iter()
                        .any(|i| i.columns.first() == Some(&fk.column));
                    if indexed {
                        existing.foreign_keys.retain(|k| k.column != fk.column);
                        existing.foreign_keys.push(fk);
                    }
                }
                for column in table.columns.into_values() {
                    existing.add_column(column);
                }
                for index in table.indexes {
                    existing.add_index(index);
                }
            }
        }
    }

    /// Merges another schema into this one, table by table.
    pub fn merge(&mut self, other: Self) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        for table in other.tables.into_values() {
            self.merge_table(table);
        }
        for (name, view) in other.views {
            self.views.insert(name, view);
        }
    }
}
