use crate::catalog::Catalog;
use crate::error::AppError;
use crate::fields::{validate_batch, Fields, Payload, ValidatedPayload};
use crate::predicate::{Filter, Predicate};
use crate::schema::{Record, Schema};
use crate::value::Value;
use chrono::Local;
use rusqlite::{ffi, params_from_iter, Connection, OptionalExtension, Row};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub wal: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions { busy_timeout: Duration::from_secs(5), wal: true }
    }
}

/// Typed access to the tables of catalog `C` in one SQLite file.
///
/// The store keeps no connection: every operation opens its own and drops it when done,
/// so a clone can be handed to any thread.
#[derive(Debug, Clone)]
pub struct DocumentStore<C: Catalog> {
    path: PathBuf,
    options: StoreOptions,
    catalog: PhantomData<fn() -> C>,
}

impl<C: Catalog> DocumentStore<C> {
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(DocumentStore { path, options, catalog: PhantomData })
    }

    /// Fresh database under the system temp dir, for tests and experiments.
    pub fn temp(name: &str) -> Result<Self, AppError> {
        let path = env::temp_dir().join("docstore").join(format!("{}_{}.db", name, rand::random::<u64>()));
        Self::open(path, StoreOptions::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        if self.options.wal {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        }
        Ok(conn)
    }

    /// Creates the given tables, or every catalog table, if they do not exist yet.
    pub fn initialize(&self, tables: Option<&[C]>) -> Result<(), AppError> {
        let tables = tables.unwrap_or(C::all());
        let conn = self.connect()?;
        for table in tables {
            conn.execute(&table.schema().create_table_sql(), [])?;
            info!("Table {} ready in {}", table.name(), self.path.display());
        }
        Ok(())
    }

    /// Inserts the row when its key is new, otherwise updates only the supplied columns.
    /// Returns the row key, which the backend assigns for a null integer key.
    pub fn upsert(&self, table: C, payload: Payload) -> Result<Value, AppError> {
        let schema = table.schema();
        let validated = payload.validate(schema)?;
        let conn = self.connect()?;
        upsert_row(&conn, schema, validated)
    }

    pub fn set<R: Record<Catalog = C>>(&self, record: &R) -> Result<Value, AppError> {
        self.upsert(R::TABLE, Payload::Full(record.to_fields()))
    }

    /// Inserts all rows in one transaction. Every map must share the first one's columns.
    pub fn upsert_many(&self, table: C, batch: Vec<Fields>) -> Result<usize, AppError> {
        let schema = table.schema();
        let now = Local::now().naive_local();
        let rows: Vec<ValidatedPayload> =
            validate_batch(schema, batch)?.into_iter().map(|row| row.with_insert_defaults(schema, now)).collect();
        let Some(first) = rows.first() else { return Ok(0) };
        let sql = insert_sql(schema, &first.column_names());

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &rows {
                let params = std::iter::once(&row.key).chain(row.values.iter().map(|(_, v)| v));
                stmt.execute(params_from_iter(params)).map_err(|e| constraint_error(schema, &row.key, e))?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} rows into {}", rows.len(), schema.table);
        Ok(rows.len())
    }

    pub fn set_many<R: Record<Catalog = C>>(&self, records: &[R]) -> Result<usize, AppError> {
        self.upsert_many(R::TABLE, records.iter().map(R::to_fields).collect())
    }

    pub fn get_fields(&self, table: C, key: impl Into<Value>) -> Result<Fields, AppError> {
        let schema = table.schema();
        let key_column = schema.primary_key();
        let key = key.into().coerce(key_column.kind)?;
        let sql = format!("{} WHERE {} = ?1", schema.select_sql(), key_column.name);
        let conn = self.connect()?;
        conn.query_row(&sql, [&key], |row| Ok(decode_row(schema, row)))
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", schema.table, key.to_json())))?
    }

    pub fn get<R: Record<Catalog = C>>(&self, key: impl Into<Value>) -> Result<R, AppError> {
        R::from_fields(self.get_fields(R::TABLE, key)?)
    }

    /// Rows of `table` in insertion order, narrowed by `predicate` when given.
    pub fn query_fields(&self, table: C, predicate: Option<&Predicate>) -> Result<Vec<Fields>, AppError> {
        let schema = table.schema();
        let filter = match predicate {
            Some(predicate) => predicate.bind(schema)?,
            None => Filter::All,
        };
        let (sql, params) = match filter {
            Filter::Nothing => return Ok(Vec::new()),
            Filter::All => (format!("{} ORDER BY rowid", schema.select_sql()), Vec::new()),
            Filter::Where { clause, params } => (format!("{} WHERE {} ORDER BY rowid", schema.select_sql(), clause), params),
        };

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(decode_row(schema, row)?);
        }
        debug!("Query on {} returned {} rows", schema.table, result.len());
        Ok(result)
    }

    pub fn query<R: Record<Catalog = C>>(&self, predicate: Option<&Predicate>) -> Result<Vec<R>, AppError> {
        self.query_fields(R::TABLE, predicate)?.into_iter().map(R::from_fields).collect()
    }

    pub fn count(&self, table: C) -> Result<usize, AppError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn upsert_row(conn: &Connection, schema: &Schema, row: ValidatedPayload) -> Result<Value, AppError> {
    let key_name = schema.primary_key().name;
    let exists = !row.key.is_null()
        && conn
            .query_row(&format!("SELECT 1 FROM {} WHERE {} = ?1", schema.table, key_name), [&row.key], |_| Ok(()))
            .optional()?
            .is_some();

    if exists {
        if !row.values.is_empty() {
            let assignments: Vec<String> = row.values.iter().map(|(name, _)| format!("{} = ?", name)).collect();
            let sql = format!("UPDATE {} SET {} WHERE {} = ?", schema.table, assignments.join(", "), key_name);
            let params = row.values.iter().map(|(_, v)| v).chain(std::iter::once(&row.key));
            conn.execute(&sql, params_from_iter(params))?;
        }
        debug!("Updated {} {} ({} columns)", schema.table, row.key.to_json(), row.values.len());
        return Ok(row.key);
    }

    let row = row.with_insert_defaults(schema, Local::now().naive_local());
    let sql = insert_sql(schema, &row.column_names());
    let params = std::iter::once(&row.key).chain(row.values.iter().map(|(_, v)| v));
    conn.execute(&sql, params_from_iter(params)).map_err(|e| constraint_error(schema, &row.key, e))?;
    let key = if row.key.is_null() { Value::Integer(conn.last_insert_rowid()) } else { row.key };
    debug!("Inserted {} {}", schema.table, key.to_json());
    Ok(key)
}

/// The key always leads the column list; a null integer key lets SQLite assign the rowid.
fn insert_sql(schema: &Schema, columns: &[&str]) -> String {
    let names: Vec<&str> = std::iter::once(schema.primary_key().name).chain(columns.iter().copied()).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", schema.table, names.join(", "), placeholders)
}

fn constraint_error(schema: &Schema, key: &Value, err: rusqlite::Error) -> AppError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            AppError::DuplicateKey(format!("{} {}", schema.table, key.to_json()))
        }
        _ => AppError::Sqlite(err),
    }
}

fn decode_row(schema: &Schema, row: &Row<'_>) -> Result<Fields, AppError> {
    let mut fields = Fields::new();
    for (idx, column) in schema.columns.iter().enumerate() {
        fields.insert(column.name, Value::decode(column.kind, row.get_ref(idx)?)?);
    }
    Ok(fields)
}
