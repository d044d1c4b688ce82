//! Single-column filters that narrow a query before rows leave the backend.

use crate::error::AppError;
use crate::fields::Fields;
use crate::schema::{Column, Schema};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    pub fn takes_set(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => "==",
            other => other.as_sql(),
        };
        f.write_str(symbol)
    }
}

impl FromStr for Operator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "==" | "=" => Ok(Operator::Eq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            _ => Err(AppError::MalformedPredicate(format!("unsupported operator {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Single(Value),
    Set(Vec<Value>),
}

/// What a bound predicate means for the backend query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// No WHERE clause.
    All,
    /// Statically empty result; the backend is not consulted.
    Nothing,
    Where { clause: String, params: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Operator,
    pub operand: Operand,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: Operator, operand: Operand) -> Result<Self, AppError> {
        let column = column.into();
        match (&operand, op.takes_set()) {
            (Operand::Single(_), false) | (Operand::Set(_), true) => Ok(Predicate { column, op, operand }),
            (Operand::Single(_), true) => Err(AppError::MalformedPredicate(format!("{} on {} needs a set of values", op, column))),
            (Operand::Set(_), false) => Err(AppError::MalformedPredicate(format!("{} on {} needs a single value", op, column))),
        }
    }

    pub fn parse(column: impl Into<String>, op: &str, operand: Operand) -> Result<Self, AppError> {
        Predicate::new(column, op.parse()?, operand)
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate { column: column.into(), op: Operator::Eq, operand: Operand::Single(value.into()) }
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate { column: column.into(), op: Operator::Gt, operand: Operand::Single(value.into()) }
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate { column: column.into(), op: Operator::Ge, operand: Operand::Single(value.into()) }
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let set = values.into_iter().map(Into::into).collect();
        Predicate { column: column.into(), op: Operator::In, operand: Operand::Set(set) }
    }

    pub fn not_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let set = values.into_iter().map(Into::into).collect();
        Predicate { column: column.into(), op: Operator::NotIn, operand: Operand::Set(set) }
    }

    fn column_of<'s>(&self, schema: &'s Schema) -> Result<&'s Column, AppError> {
        schema
            .column(&self.column)
            .ok_or_else(|| AppError::MalformedPredicate(format!("table {} has no column {}", schema.table, self.column)))
    }

    fn coerce_operand(&self, column: &Column, value: &Value) -> Result<Value, AppError> {
        if value.is_null() {
            return Err(AppError::MalformedPredicate(format!("null operand for {} {}", self.column, self.op)));
        }
        value
            .clone()
            .coerce(column.kind)
            .map_err(|e| AppError::MalformedPredicate(format!("operand for {}: {}", self.column, e)))
    }

    /// Operands coerced into the column's kind.
    fn bound_operand(&self, column: &Column) -> Result<Operand, AppError> {
        match &self.operand {
            Operand::Single(value) if !self.op.takes_set() => Ok(Operand::Single(self.coerce_operand(column, value)?)),
            Operand::Set(values) if self.op.takes_set() => values
                .iter()
                .map(|v| self.coerce_operand(column, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Operand::Set),
            _ => Err(AppError::MalformedPredicate(format!("operand shape does not fit {} on {}", self.op, self.column))),
        }
    }

    /// Validates the predicate against `schema` and renders its SQL form.
    pub fn bind(&self, schema: &Schema) -> Result<Filter, AppError> {
        let column = self.column_of(schema)?;
        match self.bound_operand(column)? {
            Operand::Single(value) => Ok(Filter::Where {
                clause: format!("{} {} ?", column.name, self.op.as_sql()),
                params: vec![value],
            }),
            Operand::Set(values) if values.is_empty() => match self.op {
                Operator::NotIn => Ok(Filter::All),
                _ => Ok(Filter::Nothing),
            },
            Operand::Set(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                Ok(Filter::Where {
                    clause: format!("{} {} ({})", column.name, self.op.as_sql(), placeholders),
                    params: values,
                })
            }
        }
    }

    /// Evaluates the predicate against an in-memory row with the same outcome as the backend,
    /// including that a null column value satisfies nothing but `NOT IN []`.
    pub fn matches(&self, schema: &Schema, fields: &Fields) -> Result<bool, AppError> {
        let column = self.column_of(schema)?;
        let operand = self.bound_operand(column)?;
        if let Operand::Set(values) = &operand {
            if values.is_empty() {
                return Ok(self.op == Operator::NotIn);
            }
        }
        let actual = match fields.get(&self.column) {
            None | Some(Value::Null) => return Ok(false),
            Some(value) => value.clone().coerce(column.kind)?,
        };
        Ok(match (self.op, operand) {
            (Operator::Eq, Operand::Single(expected)) => actual == expected,
            (Operator::Gt, Operand::Single(expected)) => actual.compare(&expected) == Some(Ordering::Greater),
            (Operator::Ge, Operand::Single(expected)) => {
                matches!(actual.compare(&expected), Some(Ordering::Greater | Ordering::Equal))
            }
            (Operator::In, Operand::Set(values)) => values.contains(&actual),
            (Operator::NotIn, Operand::Set(values)) => !values.contains(&actual),
            _ => false,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::Single(value) => write!(f, "{} {} {}", self.column, self.op, value.to_json()),
            Operand::Set(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_json().to_string()).collect();
                write!(f, "{} {} [{}]", self.column, self.op, items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::value::ColumnKind;
    use chrono::NaiveDate;

    fn schema() -> Schema {
        Schema::new(
            "articles",
            vec![
                Column::new("article_id", ColumnKind::Text, false),
                Column::new("acquisition_date", ColumnKind::Timestamp, false),
                Column::new("ai_score", ColumnKind::Integer, false),
                Column::new("summary", ColumnKind::Text, true),
            ],
        )
    }

    #[test]
    fn parses_operators_loosely() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("not  in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("in".parse::<Operator>().unwrap(), Operator::In);
        assert!(matches!("<".parse::<Operator>(), Err(AppError::MalformedPredicate(_))));
        assert!(matches!("LIKE".parse::<Operator>(), Err(AppError::MalformedPredicate(_))));
    }

    #[test]
    fn operand_shape_must_fit_operator() {
        assert!(Predicate::parse("ai_score", "IN", Operand::Single(Value::Integer(1))).is_err());
        assert!(Predicate::parse("ai_score", ">", Operand::Set(vec![])).is_err());
        assert!(Predicate::parse("ai_score", ">=", Operand::Single(Value::Integer(1))).is_ok());
    }

    #[test]
    fn renders_parameterized_sql() {
        let filter = Predicate::ge("ai_score", "1").bind(&schema()).unwrap();
        assert_eq!(filter, Filter::Where { clause: "ai_score >= ?".into(), params: vec![Value::Integer(1)] });

        let filter = Predicate::is_in("article_id", ["a", "b"]).bind(&schema()).unwrap();
        assert_eq!(
            filter,
            Filter::Where { clause: "article_id IN (?, ?)".into(), params: vec![Value::from("a"), Value::from("b")] }
        );
    }

    #[test]
    fn timestamp_operands_are_canonicalized() {
        let Filter::Where { params, .. } = Predicate::gt("acquisition_date", "2023-12-31").bind(&schema()).unwrap() else {
            panic!("expected where clause")
        };
        let expected = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(params, vec![Value::Timestamp(expected)]);
    }

    #[test]
    fn empty_sets() {
        let none: [&str; 0] = [];
        assert_eq!(Predicate::not_in("article_id", none).bind(&schema()).unwrap(), Filter::All);
        assert_eq!(Predicate::is_in("article_id", none).bind(&schema()).unwrap(), Filter::Nothing);
    }

    #[test]
    fn unknown_column_and_null_operand_are_malformed() {
        assert!(matches!(Predicate::eq("nope", 1).bind(&schema()), Err(AppError::MalformedPredicate(_))));
        assert!(matches!(Predicate::eq("summary", Value::Null).bind(&schema()), Err(AppError::MalformedPredicate(_))));
        assert!(matches!(Predicate::eq("ai_score", "high").bind(&schema()), Err(AppError::MalformedPredicate(_))));
    }

    #[test]
    fn in_memory_matching_follows_sql_semantics() {
        let schema = schema();
        let row = Fields::new()
            .with("article_id", "a1")
            .with("acquisition_date", "2024-01-01T10:00:00")
            .with("ai_score", 1)
            .with("summary", Value::Null);

        assert!(Predicate::ge("ai_score", 1).matches(&schema, &row).unwrap());
        assert!(!Predicate::gt("ai_score", 1).matches(&schema, &row).unwrap());
        assert!(Predicate::gt("acquisition_date", "2023-12-31").matches(&schema, &row).unwrap());
        assert!(Predicate::not_in("article_id", ["a2"]).matches(&schema, &row).unwrap());
        assert!(!Predicate::is_in("article_id", ["a2"]).matches(&schema, &row).unwrap());
        assert!(!Predicate::not_in("summary", ["x"]).matches(&schema, &row).unwrap());
        assert!(Predicate::not_in("summary", Vec::<String>::new()).matches(&schema, &row).unwrap());
    }

    #[test]
    fn displays_readably() {
        assert_eq!(Predicate::is_in("article_id", ["a", "b"]).to_string(), r#"article_id IN ["a", "b"]"#);
        assert_eq!(Predicate::eq("ai_score", 2).to_string(), "ai_score == 2");
    }
}
