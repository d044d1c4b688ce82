use crate::error::AppError;
use crate::predicate::{Operand, Operator, Predicate};
use crate::schema::Schema;
use crate::value::{ColumnKind, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use utoipa::IntoParams;

/// Query-string form of a [`Predicate`]: `?column=ai_score&op=>=&value=1`.
///
/// `value` is read as a JSON literal, falling back to the raw text, so `2024-01-01` and
/// `"2024-01-01"` mean the same. On text columns an unquoted value is always taken verbatim.
/// Set operators need a JSON array.
#[derive(IntoParams, Serialize, Deserialize, Default, Debug, Clone)]
#[into_params(parameter_in = Query)]
pub struct PredicateQuery {
    #[param(example = "acquisition_date")]
    pub column: Option<String>,
    #[param(example = ">=")]
    pub op: Option<String>,
    #[param(example = "2024-01-01")]
    pub value: Option<String>,
}

impl PredicateQuery {
    pub fn sample() -> PredicateQuery {
        PredicateQuery { column: Some("ai_score".into()), op: Some(">=".into()), value: Some("1".into()) }
    }

    pub fn to_predicate(&self, schema: &Schema) -> Result<Option<Predicate>, AppError> {
        match (&self.column, &self.op) {
            (None, None) if self.value.is_none() => Ok(None),
            (Some(column), Some(op)) => {
                let op: Operator = op.parse()?;
                let kind = schema.column(column).map(|c| c.kind);
                let operand = parse_operand(op, kind, self.value.as_deref().unwrap_or_default())?;
                Predicate::new(column.clone(), op, operand).map(Some)
            }
            _ => Err(AppError::MalformedPredicate("column, op and value must be given together".into())),
        }
    }
}

fn parse_operand(op: Operator, kind: Option<ColumnKind>, raw: &str) -> Result<Operand, AppError> {
    let json = serde_json::from_str::<Json>(raw).unwrap_or_else(|_| Json::String(raw.to_string()));
    if !op.takes_set() {
        let value = match json {
            Json::String(text) => Value::Text(text),
            _ if kind == Some(ColumnKind::Text) => Value::Text(raw.to_string()),
            other => Value::from_json(other),
        };
        return Ok(Operand::Single(value));
    }
    match json {
        Json::Array(items) => Ok(Operand::Set(items.into_iter().map(Value::from_json).collect())),
        other => Err(AppError::MalformedPredicate(format!("{} expects a JSON array, got {}", op, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use once_cell::sync::Lazy;

    static ARTICLES: Lazy<Schema> = Lazy::new(|| {
        Schema::new(
            "articles",
            vec![
                Column::new("article_id", ColumnKind::Text, false),
                Column::new("acquisition_date", ColumnKind::Timestamp, false),
                Column::new("title", ColumnKind::Text, false),
                Column::new("ai_score", ColumnKind::Integer, false),
            ],
        )
    });

    fn query(column: &str, op: &str, value: &str) -> PredicateQuery {
        PredicateQuery { column: Some(column.into()), op: Some(op.into()), value: Some(value.into()) }
    }

    #[test]
    fn empty_query_has_no_predicate() {
        assert_eq!(PredicateQuery::default().to_predicate(&ARTICLES).unwrap(), None);
    }

    #[test]
    fn single_values_accept_raw_text_and_json() {
        let raw = query("acquisition_date", ">", "2023-12-31").to_predicate(&ARTICLES).unwrap().unwrap();
        let quoted = query("acquisition_date", ">", "\"2023-12-31\"").to_predicate(&ARTICLES).unwrap().unwrap();
        assert_eq!(raw, quoted);
        assert_eq!(PredicateQuery::sample().to_predicate(&ARTICLES).unwrap(), Some(Predicate::ge("ai_score", 1)));
    }

    #[test]
    fn text_columns_take_unquoted_values_verbatim() {
        let title = |value: &str| query("title", "==", value).to_predicate(&ARTICLES).unwrap().unwrap();
        assert_eq!(title("1e3"), Predicate::eq("title", "1e3"));
        assert_eq!(title("true"), Predicate::eq("title", "true"));
        assert_eq!(title("\"quoted\""), Predicate::eq("title", "quoted"));
        assert_eq!(query("ai_score", ">=", "2").to_predicate(&ARTICLES).unwrap(), Some(Predicate::ge("ai_score", 2)));
    }

    #[test]
    fn set_operators_need_arrays() {
        let predicate = query("article_id", "NOT IN", "[]").to_predicate(&ARTICLES).unwrap().unwrap();
        assert_eq!(predicate, Predicate::not_in("article_id", Vec::<String>::new()));
        assert!(matches!(query("article_id", "IN", "a1").to_predicate(&ARTICLES), Err(AppError::MalformedPredicate(_))));
    }

    #[test]
    fn partial_query_is_malformed() {
        let partial = PredicateQuery { column: Some("ai_score".into()), ..Default::default() };
        assert!(matches!(partial.to_predicate(&ARTICLES), Err(AppError::MalformedPredicate(_))));
        assert!(matches!(query("ai_score", "<", "1").to_predicate(&ARTICLES), Err(AppError::MalformedPredicate(_))));
    }
}
