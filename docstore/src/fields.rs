use crate::error::{AppError, CodecError};
use crate::schema::Schema;
use crate::value::Value;
use chrono::NaiveDateTime;
use serde_json::{Map, Value as Json};
use std::collections::HashSet;

/// Insertion-ordered column name -> value map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Fields { entries: Vec::new() }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Replaces an existing entry in place, otherwise appends.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Removes and returns the value, null when absent.
    pub fn take(&mut self, name: &str) -> Value {
        self.remove(name).unwrap_or(Value::Null)
    }

    pub fn key_value(&self, schema: &Schema) -> Option<&Value> {
        self.get(schema.primary_key().name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_json(object: Map<String, Json>) -> Fields {
        object.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }

    /// Reorders entries to follow `order`; names missing from `order` keep their relative position at the end.
    fn ordered_by(mut self, order: &[String]) -> Fields {
        self.entries.sort_by_key(|(n, _)| order.iter().position(|o| o == n).unwrap_or(usize::MAX));
        self
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (name, value) in iter {
            fields.insert(name, value);
        }
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Input of an upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Every column of the table.
    Full(Fields),
    /// Any subset of columns that includes the primary key.
    Sparse(Fields),
}

/// A payload checked against its schema, values coerced to their column kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    pub key: Value,
    /// Non-key columns in payload order.
    pub values: Vec<(&'static str, Value)>,
}

impl ValidatedPayload {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.values.iter().map(|(n, _)| *n).collect()
    }

    /// Appends the insert default of every non-nullable, non-key column the payload leaves out,
    /// in schema order, so stored rows agree with what reads decode.
    pub fn with_insert_defaults(mut self, schema: &Schema, now: NaiveDateTime) -> Self {
        for column in schema.columns.iter().skip(1).filter(|c| !c.nullable) {
            if !self.values.iter().any(|(name, _)| *name == column.name) {
                self.values.push((column.name, column.kind.insert_default(now)));
            }
        }
        self
    }
}

impl Payload {
    pub fn fields(&self) -> &Fields {
        match self {
            Payload::Full(fields) | Payload::Sparse(fields) => fields,
        }
    }

    pub fn validate(self, schema: &'static Schema) -> Result<ValidatedPayload, AppError> {
        let (fields, full) = match self {
            Payload::Full(fields) => (fields, true),
            Payload::Sparse(fields) => (fields, false),
        };
        let key_column = schema.primary_key();
        let mut seen: HashSet<&'static str> = HashSet::with_capacity(fields.len());
        let mut key = None;
        let mut values = Vec::with_capacity(fields.len());

        for (name, value) in fields {
            let column = schema.require_column(&name)?;
            if !seen.insert(column.name) {
                return Err(AppError::SchemaMismatch(format!("column {} given twice for {}", name, schema.table)));
            }
            let value = value.coerce(column.kind)?;
            if column.name == key_column.name {
                key = Some(value);
            } else if value.is_null() && !column.nullable {
                return Err(CodecError::UnexpectedNull(format!("{}.{}", schema.table, column.name)).into());
            } else {
                values.push((column.name, value));
            }
        }

        let key = key.ok_or_else(|| {
            AppError::SchemaMismatch(format!("missing primary key {} for {}", key_column.name, schema.table))
        })?;
        if key.is_null() && !(key_column.nullable && schema.has_assigned_key()) {
            return Err(AppError::SchemaMismatch(format!("primary key {} of {} cannot be null", key_column.name, schema.table)));
        }
        if full && seen.len() != schema.columns.len() {
            let missing: Vec<&str> = schema.column_names().filter(|n| !seen.contains(n)).collect();
            return Err(AppError::SchemaMismatch(format!("full record for {} is missing {}", schema.table, missing.join(", "))));
        }
        Ok(ValidatedPayload { key, values })
    }
}

/// Validates a bulk insert: every map must carry exactly the columns of the first one.
/// Rows come back aligned to the first map's column order.
pub fn validate_batch(schema: &'static Schema, batch: Vec<Fields>) -> Result<Vec<ValidatedPayload>, AppError> {
    let Some(first) = batch.first() else { return Ok(Vec::new()) };
    let head: Vec<String> = first.columns().map(str::to_string).collect();
    let head_set: HashSet<&str> = head.iter().map(String::as_str).collect();

    batch
        .into_iter()
        .enumerate()
        .map(|(idx, fields)| {
            let row_set: HashSet<&str> = fields.columns().collect();
            if row_set != head_set || fields.len() != head.len() {
                return Err(AppError::SchemaMismatch(format!(
                    "batch row {} for {} has columns [{}], expected [{}]",
                    idx,
                    schema.table,
                    fields.columns().collect::<Vec<_>>().join(", "),
                    head.join(", ")
                )));
            }
            Payload::Sparse(fields.ordered_by(&head)).validate(schema)
        })
        .collect()
}
