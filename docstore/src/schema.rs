use crate::catalog::Catalog;
use crate::error::AppError;
use crate::fields::Fields;
use crate::value::{ColumnKind, StorageKind, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind, nullable: bool) -> Self {
        Column { name, kind, nullable }
    }

    pub fn storage(&self) -> StorageKind {
        self.kind.storage()
    }
}

/// Ordered column layout of one table. The first column is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub table: &'static str,
    pub columns: Vec<Column>,
}

impl Schema {
    /// Panics on an empty column list, which `#[derive(Record)]` rejects at compile time.
    pub fn new(table: &'static str, columns: Vec<Column>) -> Self {
        assert!(!columns.is_empty(), "table {} must declare at least its key column", table);
        Schema { table, columns }
    }

    pub fn primary_key(&self) -> &Column {
        &self.columns[0]
    }

    /// Integer keys are assigned by the backend when a row is inserted with a null key.
    pub fn has_assigned_key(&self) -> bool {
        self.primary_key().kind == ColumnKind::Integer
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column, AppError> {
        self.column(name)
            .ok_or_else(|| AppError::SchemaMismatch(format!("table {} has no column {}", self.table, name)))
    }

    pub fn storage_kind(&self, name: &str) -> Option<StorageKind> {
        self.column(name).map(Column::storage)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn create_table_sql(&self) -> String {
        let definitions = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let sql_type = column.storage().sql_type();
                match (idx, column.storage()) {
                    (0, StorageKind::Integer) => format!("{} {} PRIMARY KEY", column.name, sql_type),
                    (0, StorageKind::Text) => format!("{} {} PRIMARY KEY NOT NULL", column.name, sql_type),
                    _ => format!("{} {}", column.name, sql_type),
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table, definitions)
    }

    pub fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.column_names().collect::<Vec<_>>().join(", "), self.table)
    }
}

/// A typed row of one catalog table. Implemented by `#[derive(Record)]`.
pub trait Record: Sized {
    type Catalog: Catalog;
    const TABLE: Self::Catalog;

    fn schema() -> &'static Schema;

    /// Every column, in declaration order.
    fn to_fields(&self) -> Fields;

    /// Builds the record from decoded columns; absent columns decode as null.
    fn from_fields(fields: Fields) -> Result<Self, AppError>;

    fn key(&self) -> Value {
        let key_name = Self::schema().primary_key().name;
        self.to_fields().remove(key_name).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_schema() -> Schema {
        Schema::new(
            "articles",
            vec![
                Column::new("article_id", ColumnKind::Text, false),
                Column::new("acquisition_date", ColumnKind::Timestamp, false),
                Column::new("keywords", ColumnKind::Sequence, false),
                Column::new("summary", ColumnKind::Text, true),
            ],
        )
    }

    fn preference_schema() -> Schema {
        Schema::new(
            "preferences",
            vec![
                Column::new("preference_id", ColumnKind::Integer, true),
                Column::new("ai_score", ColumnKind::Integer, false),
            ],
        )
    }

    #[test]
    fn first_column_is_the_key() {
        let schema = article_schema();
        assert_eq!(schema.primary_key().name, "article_id");
        assert!(!schema.has_assigned_key());
        assert!(preference_schema().has_assigned_key());
    }

    #[test]
    fn ddl_marks_key_and_maps_storage_kinds() {
        assert_eq!(
            article_schema().create_table_sql(),
            "CREATE TABLE IF NOT EXISTS articles (article_id TEXT PRIMARY KEY NOT NULL, acquisition_date TEXT, keywords TEXT, summary TEXT)"
        );
        assert_eq!(
            preference_schema().create_table_sql(),
            "CREATE TABLE IF NOT EXISTS preferences (preference_id INTEGER PRIMARY KEY, ai_score INTEGER)"
        );
    }

    #[test]
    fn select_lists_columns_in_declaration_order() {
        assert_eq!(article_schema().select_sql(), "SELECT article_id, acquisition_date, keywords, summary FROM articles");
    }

    #[test]
    fn unknown_column_is_a_schema_mismatch() {
        let schema = article_schema();
        assert!(schema.require_column("keywords").is_ok());
        assert!(matches!(schema.require_column("nope"), Err(AppError::SchemaMismatch(_))));
    }
}
