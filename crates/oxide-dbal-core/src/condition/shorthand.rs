//! Shorthand condition inputs.
//!
//! Callers often describe conditions as loose JSON shapes. Each accepted
//! shape is one [`Shorthand`] variant; anything else is rejected at the
//! boundary. After [`Shorthand::into_condition`] only the canonical
//! [`Condition`] tree is used.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{BindMode, Condition, Operand, Operator};
use crate::dialect::is_field;
use crate::error::{ArgumentError, BuildError};
use crate::value::SqlValue;

static RAW_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?)\s*(<=|>=|<>|!=|=|<|>|(?:IS\s+NOT|IS|NOT\s+IN|IN|LIKE)\b)\s*(.+?)\s*$",
    )
    .expect("valid raw condition pattern")
});

/// The accepted shorthand shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Shorthand {
    /// `{column: value}`: equality, `IS NULL` for null, `IN` for a list.
    Equality {
        /// Column.
        column: String,
        /// Value.
        value: Operand,
    },
    /// `[operator, column, value]`
    Positional {
        /// Operator.
        operator: Operator,
        /// Column.
        column: String,
        /// Value.
        value: Operand,
    },
    /// `[operator, {column: value}]`
    OperatorKeyed {
        /// Operator.
        operator: Operator,
        /// Column.
        column: String,
        /// Value.
        value: Operand,
    },
    /// `"left OP right"`; a single-quoted right side is a literal, anything
    /// else is a second column.
    Raw(String),
}

impl Shorthand {
    /// Classifies a JSON value. Strict: exactly one key for objects,
    /// exactly two or three elements for arrays.
    pub fn from_json(value: &Value) -> Result<Self, ArgumentError> {
        match value {
            Value::String(raw) => Ok(Self::Raw(raw.clone())),
            Value::Object(map) if map.len() == 1 => {
                let (column, value) = map
                    .iter()
                    .next()
                    .ok_or_else(|| ArgumentError::Shorthand(value.to_string()))?;
                Ok(Self::Equality {
                    column: column.clone(),
                    value: operand(value)?,
                })
            }
            Value::Array(items) => match items.as_slice() {
                [Value::String(op), Value::String(column), value] => Ok(Self::Positional {
                    operator: op.parse()?,
                    column: column.clone(),
                    value: operand(value)?,
                }),
                [Value::String(op), Value::Object(map)] if map.len() == 1 => {
                    let (column, value) = map
                        .iter()
                        .next()
                        .ok_or_else(|| ArgumentError::Shorthand(value.to_string()))?;
                    Ok(Self::OperatorKeyed {
                        operator: op.parse()?,
                        column: column.clone(),
                        value: operand(value)?,
                    })
                }
                _ => Err(ArgumentError::Shorthand(value.to_string())),
            },
            other => Err(ArgumentError::Shorthand(other.to_string())),
        }
    }

    /// Resolves the shorthand into a condition.
    pub fn into_condition(self) -> Result<Condition, BuildError> {
        match self {
            Self::Equality { column, value } => Ok(match value {
                Operand::Value(SqlValue::Null) => {
                    Condition::new(column, Operator::Is, SqlValue::Null)
                }
                list @ Operand::List(_) => Condition::new(column, Operator::In, list),
                value => Condition::new(column, Operator::Eq, value),
            }),
            Self::Positional {
                operator,
                column,
                value,
            }
            | Self::OperatorKeyed {
                operator,
                column,
                value,
            } => Ok(null_aware(column, operator, value)),
            Self::Raw(raw) => parse_raw(&raw),
        }
    }
}

/// `= NULL` and `!= NULL` never match anything; they mean `IS [NOT] NULL`.
fn null_aware(column: String, operator: Operator, value: Operand) -> Condition {
    match (&value, operator) {
        (Operand::Value(SqlValue::Null), Operator::Eq) => {
            Condition::new(column, Operator::Is, value)
        }
        (Operand::Value(SqlValue::Null), Operator::Ne | Operator::NotEq) => {
            Condition::new(column, Operator::IsNot, value)
        }
        _ => Condition::new(column, operator, value),
    }
}

fn operand(value: &Value) -> Result<Operand, ArgumentError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                SqlValue::from_json(item)
                    .ok_or_else(|| ArgumentError::Shorthand(format!("non-scalar list item {item}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Operand::List),
        other => SqlValue::from_json(other)
            .map(Operand::Value)
            .ok_or_else(|| ArgumentError::Shorthand(format!("non-scalar value {other}"))),
    }
}

fn parse_raw(raw: &str) -> Result<Condition, BuildError> {
    let caps = RAW_CONDITION
        .captures(raw)
        .ok_or_else(|| ArgumentError::Shorthand(raw.to_string()))?;
    let column = caps[1].to_string();
    let operator: Operator = caps[2].parse()?;
    let right = caps[3].trim();

    if matches!(operator, Operator::Is | Operator::IsNot) {
        return Ok(Condition::new(column, operator, right));
    }
    if right.len() >= 2 && right.starts_with('\'') && right.ends_with('\'') {
        let literal = right[1..right.len() - 1].replace("''", "'");
        return Ok(Condition::new(column, operator, literal));
    }
    if !is_field(right, false) {
        return Err(ArgumentError::Identifier(right.to_string()).into());
    }
    Ok(Condition::new(column, operator, right).bind(BindMode::Field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqlContext};
    use serde_json::json;

    fn pg(c: &Condition) -> (String, Vec<SqlValue>) {
        c.build(&SqlContext::new(&PostgresDialect, "")).unwrap()
    }

    #[test]
    fn classification() {
        assert_eq!(
            Shorthand::from_json(&json!({"a": 1})),
            Ok(Shorthand::Equality {
                column: String::from("a"),
                value: Operand::Value(SqlValue::Int(1)),
            })
        );
        assert!(matches!(
            Shorthand::from_json(&json!(["<", "a", 2])),
            Ok(Shorthand::Positional {
                operator: Operator::Lt,
                ..
            })
        ));
        assert!(matches!(
            Shorthand::from_json(&json!(["LIKE", {"a": "x"}])),
            Ok(Shorthand::OperatorKeyed {
                operator: Operator::Like,
                ..
            })
        ));
        assert!(matches!(
            Shorthand::from_json(&json!("a = b")),
            Ok(Shorthand::Raw(_))
        ));
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(Shorthand::from_json(&json!({})).is_err());
        assert!(Shorthand::from_json(&json!({"a": 1, "b": 2})).is_err());
        assert!(Shorthand::from_json(&json!(["=", "a"])).is_err());
        assert!(Shorthand::from_json(&json!(["=", "a", 1, 2])).is_err());
        assert!(Shorthand::from_json(&json!(42)).is_err());
        assert!(Shorthand::from_json(&json!({"a": {"nested": 1}})).is_err());
        assert!(Shorthand::from_json(&json!(["~", "a", 1])).is_err());
    }

    #[test]
    fn raw_cross_column_comparison() {
        let c = Condition::parse("a.id = b.a_id").unwrap();
        assert_eq!(pg(&c), (String::from("\"a\".\"id\" = \"b\".\"a_id\""), vec![]));
    }

    #[test]
    fn raw_quoted_literal_is_bound() {
        let c = Condition::parse("status != 'it''s'").unwrap();
        assert_eq!(
            pg(&c),
            (
                String::from("\"status\" != ?"),
                vec![SqlValue::Text(String::from("it's"))]
            )
        );
    }

    #[test]
    fn raw_keyword_operators() {
        let c = Condition::parse("deleted_at is not null").unwrap();
        assert_eq!(pg(&c).0, "\"deleted_at\" IS NOT NULL");
        let c = Condition::parse("name LIKE 'a_b'").unwrap();
        assert_eq!(pg(&c).1, vec![SqlValue::Text(String::from("a\\_b"))]);
    }

    #[test]
    fn raw_right_side_must_be_identifier() {
        assert!(Condition::parse("a = b; DROP TABLE c").is_err());
        assert!(Condition::parse("a = 'x' OR 1 = 1").is_err());
        assert!(Condition::parse("nonsense").is_err());
    }
}
