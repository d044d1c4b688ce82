//! docstore persists typed records into a SQLite file through a small generic document layer.
//!
//! Record types derive their table layout with `#[derive(Record)]`, a [`catalog!`] enum names the
//! closed set of tables, and [`DocumentStore`] offers idempotent table creation, sparse upserts,
//! atomic bulk inserts and predicate-filtered reads. Column values go through a codec that keeps
//! timestamps, keyword lists and keyword-to-score maps in their natural Rust shapes.

extern crate self as docstore;

pub mod catalog;
pub mod error;
pub mod fields;
pub mod logger;
pub mod predicate;
pub mod query;
pub mod rest;
pub mod schema;
pub mod store;
pub mod value;

pub use axum;
pub use chrono;
pub use http;
pub use macros::Record;
pub use once_cell;
pub use rusqlite;
pub use serde;
pub use serde_json;
pub use tracing;
pub use tower_http;
pub use utoipa;
pub use utoipa_axum;
pub use utoipa_swagger_ui;

pub use catalog::Catalog;
pub use error::{AppError, CodecError};
pub use fields::{Fields, Payload, ValidatedPayload};
pub use predicate::{Filter, Operand, Operator, Predicate};
pub use query::PredicateQuery;
pub use rest::{build_router, serve, ApiDoc, AppJson, ErrorResponse};
pub use schema::{Column, Record, Schema};
pub use store::{DocumentStore, StoreOptions};
pub use value::{ColumnKind, ColumnValue, StorageKind, Value};
