#![allow(warnings)]

use docstore::chrono::NaiveDateTime;
use docstore::*;
use std::collections::BTreeMap;

catalog! {
    pub enum Table {
        Articles => Article = "articles",
        Users => User = "users",
    }
}

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = Table::Articles)]
pub struct Article {
    pub article_id: String,
    pub acquisition_date: NaiveDateTime,
    pub publish_date: Option<NaiveDateTime>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
}

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = Table::Users)]
pub struct User {
    pub user_id: String,
    pub preference: BTreeMap<String, i64>,
    pub active: bool,
}

fn main() {
    let schema = Article::schema();
    assert_eq!(schema.table, "articles");
    assert_eq!(schema.primary_key().name, "article_id");
    assert_eq!(schema.columns.len(), 5);
    assert!(schema.column("summary").unwrap().nullable);
    assert_eq!(schema.column("keywords").unwrap().kind, ColumnKind::Sequence);
    assert_eq!(User::schema().column("preference").unwrap().kind, ColumnKind::Mapping);
    assert_eq!(Table::Users.schema().table, "users");
    assert_eq!(Article::TABLE, Table::Articles);
}
