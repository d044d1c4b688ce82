use chrono::{Local, NaiveDateTime};
use docstore::{catalog, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

catalog! {
    pub enum Table {
        Articles => Article = "articles",
        Users => User = "users",
        Preferences => Preference = "preferences",
    }
}

/// Lowest affinity or score: the reader never wants to see this.
pub const AFFINITY_MIN: i64 = -2;
/// Highest affinity or score.
pub const AFFINITY_MAX: i64 = 2;

pub fn clamp_affinity(score: i64) -> i64 {
    score.clamp(AFFINITY_MIN, AFFINITY_MAX)
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[derive(Record, Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[record(table = Table::Articles)]
pub struct Article {
    pub article_id: String,
    pub acquisition_date: NaiveDateTime,
    pub publish_date: Option<NaiveDateTime>,
    pub source: String,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Article {
    pub fn new(article_id: impl Into<String>) -> Self {
        let now = now();
        Article {
            article_id: article_id.into(),
            acquisition_date: now,
            publish_date: None,
            source: String::new(),
            title: String::new(),
            content: String::new(),
            keywords: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Publication date when known, otherwise when it was scraped.
    pub fn effective_date(&self) -> NaiveDateTime {
        self.publish_date.unwrap_or(self.acquisition_date)
    }
}

#[derive(Record, Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[record(table = Table::Users)]
pub struct User {
    pub user_id: String,
    pub name: String,
    /// Keyword -> affinity in [AFFINITY_MIN, AFFINITY_MAX].
    pub preference: BTreeMap<String, i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now();
        User { user_id: user_id.into(), name: name.into(), preference: BTreeMap::new(), created_at: now, updated_at: now }
    }

    /// Moves the affinity of every keyword one step in the direction of `score`.
    pub fn nudge(&mut self, keywords: &[String], score: i64) -> usize {
        let step = score.signum();
        if step == 0 {
            return 0;
        }
        for keyword in keywords {
            let affinity = self.preference.entry(keyword.clone()).or_insert(0);
            *affinity = clamp_affinity(*affinity + step);
        }
        keywords.len()
    }
}

#[derive(Record, Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[record(table = Table::Preferences)]
pub struct Preference {
    /// Assigned by the store on insert.
    pub preference_id: Option<i64>,
    pub user_id: String,
    pub article_id: String,
    pub ai_score: i64,
    pub user_score: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Preference {
    pub fn new(user_id: impl Into<String>, article_id: impl Into<String>, ai_score: i64) -> Self {
        let now = now();
        Preference {
            preference_id: None,
            user_id: user_id.into(),
            article_id: article_id.into(),
            ai_score,
            user_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The user's own score wins over the model's.
    pub fn effective_score(&self) -> i64 {
        self.user_score.unwrap_or(self.ai_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore::{Catalog, ColumnKind};

    #[test]
    fn catalog_resolves_names_and_schemas() {
        assert_eq!("preferences".parse::<Table>().unwrap(), Table::Preferences);
        assert!("comments".parse::<Table>().is_err());
        assert_eq!(Table::Articles.to_string(), "articles");
        assert_eq!(Table::all().len(), 3);
        assert_eq!(Table::Users.schema().primary_key().name, "user_id");
        assert_eq!(serde_json::to_string(&Table::Users).unwrap(), "\"users\"");
    }

    #[test]
    fn article_schema_follows_field_order() {
        let schema = Article::schema();
        let names: Vec<&str> = schema.column_names().collect();
        assert_eq!(
            names,
            vec!["article_id", "acquisition_date", "publish_date", "source", "title", "content", "keywords", "summary", "created_at", "updated_at"]
        );
        assert_eq!(schema.column("keywords").unwrap().kind, ColumnKind::Sequence);
        assert!(schema.column("publish_date").unwrap().nullable);
        assert!(Preference::schema().has_assigned_key());
    }

    #[test]
    fn nudge_moves_one_step_and_clamps() {
        let mut user = User::new("u1", "Ada");
        user.preference.insert("補助金".into(), 2);
        let keywords = vec!["補助金".to_string(), "製造業".to_string()];
        assert_eq!(user.nudge(&keywords, 2), 2);
        assert_eq!(user.preference["補助金"], 2);
        assert_eq!(user.preference["製造業"], 1);

        user.nudge(&keywords, -1);
        assert_eq!(user.preference["補助金"], 1);
        assert_eq!(user.preference["製造業"], 0);
        assert_eq!(user.nudge(&keywords, 0), 0);
    }

    #[test]
    fn user_score_overrides_ai_score() {
        let mut preference = Preference::new("u1", "a1", -1);
        assert_eq!(preference.effective_score(), -1);
        preference.user_score = Some(2);
        assert_eq!(preference.effective_score(), 2);
    }
}
