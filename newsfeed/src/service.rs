use crate::err::FeedError;
use crate::llm::{self, LanguageModel};
use crate::models::{clamp_affinity, now, Article, Preference, Table, User};
use crate::scraper::PressSource;
use chrono::NaiveDate;
use docstore::{AppError, DocumentStore, Fields, Payload, Predicate, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScrapeReport {
    /// Set when only today's releases were requested and there are none yet.
    pub skipped: bool,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct KeywordReport {
    pub pending: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoreReport {
    pub user_id: String,
    pub scored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrainingReport {
    pub user_id: String,
    pub updated_preferences: usize,
    pub created_preferences: usize,
    pub adjusted_keywords: usize,
}

/// A reader's own score for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Feedback {
    pub article_id: String,
    #[schema(minimum = -2, maximum = 2)]
    pub user_score: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArticleFilter {
    /// Defaults to the configured user.
    pub user_id: Option<String>,
    /// Every stored article, scored or not.
    #[serde(default)]
    pub all: bool,
    /// Lowest effective score to list, 0 when absent.
    pub min_score: Option<i64>,
    /// Earliest publish (or acquisition) date, inclusive.
    pub from: Option<NaiveDate>,
    /// Latest publish (or acquisition) date, inclusive.
    pub to: Option<NaiveDate>,
    /// Comma separated source names.
    pub sources: Option<String>,
    /// Substring of title or content.
    pub q: Option<String>,
}

impl ArticleFilter {
    fn source_list(&self) -> Vec<String> {
        self.sources
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn keeps(&self, article: &Article, sources: Option<&Predicate>) -> Result<bool, AppError> {
        let date = article.effective_date().date();
        if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
            return Ok(false);
        }
        if let Some(predicate) = sources {
            if !predicate.matches(Article::schema(), &article.to_fields())? {
                return Ok(false);
            }
        }
        if let Some(q) = self.q.as_deref().map(str::to_lowercase).filter(|q| !q.is_empty()) {
            return Ok(article.title.to_lowercase().contains(&q) || article.content.to_lowercase().contains(&q));
        }
        Ok(true)
    }
}

/// The news feed: scraping, model enrichment, scoring, listing and training over one document store.
pub struct FeedService {
    store: DocumentStore<Table>,
    model: Arc<dyn LanguageModel>,
    source: Arc<dyn PressSource>,
    source_name: String,
    default_user: String,
    // read-modify-write cycles on users and their preferences
    user_writes: Mutex<()>,
}

impl FeedService {
    pub fn new(
        store: DocumentStore<Table>,
        model: Arc<dyn LanguageModel>,
        source: Arc<dyn PressSource>,
        source_name: impl Into<String>,
        default_user: impl Into<String>,
    ) -> Self {
        FeedService {
            store,
            model,
            source,
            source_name: source_name.into(),
            default_user: default_user.into(),
            user_writes: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &DocumentStore<Table> {
        &self.store
    }

    pub fn user_or_default(&self, user_id: Option<String>) -> String {
        user_id.filter(|u| !u.is_empty()).unwrap_or_else(|| self.default_user.clone())
    }

    /// Runs a store operation on the blocking pool.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, FeedError>
    where
        F: FnOnce(DocumentStore<Table>) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || f(store)).await??)
    }

    pub async fn setup_tables(&self) -> Result<(), FeedError> {
        self.blocking(|store| store.initialize(None)).await
    }

    pub async fn scrape(&self, only_today: bool) -> Result<ScrapeReport, FeedError> {
        if only_today && !self.source.latest_release_is_today().await? {
            info!("No press releases published today, skipping scrape");
            return Ok(ScrapeReport { skipped: true, ..Default::default() });
        }
        let releases = self.source.releases().await?;
        let source_name = self.source_name.clone();

        let report = self
            .blocking(move |store| {
                let mut report = ScrapeReport { fetched: releases.len(), ..Default::default() };
                for release in releases {
                    let article_id = release.article_id();
                    match store.get::<Article>(article_id.as_str()) {
                        Ok(_) => {
                            let patch = Fields::new()
                                .with("article_id", article_id)
                                .with("publish_date", release.published_at())
                                .with("source", source_name.as_str())
                                .with("title", release.title)
                                .with("content", release.content)
                                .with("summary", release.summary)
                                .with("updated_at", now());
                            store.upsert(Table::Articles, Payload::Sparse(patch))?;
                            report.updated += 1;
                        }
                        Err(AppError::NotFound(_)) => {
                            let mut article = Article::new(article_id);
                            article.publish_date = release.published_at();
                            article.source = source_name.clone();
                            article.title = release.title;
                            article.content = release.content;
                            article.summary = release.summary;
                            store.set(&article)?;
                            report.inserted += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(report)
            })
            .await?;
        info!("Scraped {} releases: {} new, {} updated", report.fetched, report.inserted, report.updated);
        Ok(report)
    }

    /// Asks the model for keywords of every article that has none yet.
    pub async fn extract_keywords(&self) -> Result<KeywordReport, FeedError> {
        let pending: Vec<Article> = self
            .blocking(|store| store.query::<Article>(Some(&Predicate::eq("keywords", Vec::<String>::new()))))
            .await?
            .into_iter()
            .filter(|a| !a.content.trim().is_empty())
            .collect();

        let mut report = KeywordReport { pending: pending.len(), ..Default::default() };
        for article in pending {
            let keywords = match llm::extract_keywords(self.model.as_ref(), &article.content).await {
                Ok(keywords) => keywords,
                Err(FeedError::ModelReply(reason)) => {
                    warn!("Keywords of {} skipped: {}", article.article_id, reason);
                    report.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let patch = Fields::new().with("article_id", article.article_id).with("keywords", keywords).with("updated_at", now());
            self.blocking(move |store| store.upsert(Table::Articles, Payload::Sparse(patch))).await?;
            report.updated += 1;
        }
        info!("Keywords extracted for {} of {} articles", report.updated, report.pending);
        Ok(report)
    }

    /// Scores every article the user has no preference for yet, then stores all new scores in one batch.
    pub async fn score_articles(&self, user_id: &str) -> Result<ScoreReport, FeedError> {
        let _guard = self.user_writes.lock().await;
        let uid = user_id.to_string();
        let (user, unscored) = self
            .blocking(move |store| {
                let user = store.get::<User>(uid.as_str())?;
                let scored: Vec<String> =
                    store.query::<Preference>(Some(&Predicate::eq("user_id", uid)))?.into_iter().map(|p| p.article_id).collect();
                let unscored = store.query::<Article>(Some(&Predicate::not_in("article_id", scored)))?;
                Ok((user, unscored))
            })
            .await?;

        let mut report = ScoreReport { user_id: user.user_id.clone(), ..Default::default() };
        let mut preferences = Vec::with_capacity(unscored.len());
        for article in unscored {
            let text = if article.content.trim().is_empty() { &article.title } else { &article.content };
            match llm::score_article(self.model.as_ref(), text, &user.preference).await {
                Ok(score) => preferences.push(Preference::new(user.user_id.as_str(), article.article_id, score)),
                Err(FeedError::ModelReply(reason)) => {
                    warn!("Score of {} skipped: {}", article.article_id, reason);
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        report.scored = self.blocking(move |store| store.set_many(&preferences)).await?;
        info!("Scored {} articles for {}", report.scored, report.user_id);
        Ok(report)
    }

    pub async fn articles(&self, filter: ArticleFilter) -> Result<Vec<Article>, FeedError> {
        let user_id = self.user_or_default(filter.user_id.clone());
        let min_score = filter.min_score.unwrap_or(0);
        let all = filter.all;
        let candidates = self
            .blocking(move |store| {
                if all {
                    return store.query::<Article>(None);
                }
                let visible: Vec<String> = store
                    .query::<Preference>(Some(&Predicate::eq("user_id", user_id)))?
                    .into_iter()
                    .filter(|p| p.effective_score() >= min_score)
                    .map(|p| p.article_id)
                    .collect();
                store.query::<Article>(Some(&Predicate::is_in("article_id", visible)))
            })
            .await?;

        let sources = filter.source_list();
        let source_predicate = (!sources.is_empty()).then(|| Predicate::is_in("source", sources));
        let mut articles = Vec::with_capacity(candidates.len());
        for article in candidates {
            if filter.keeps(&article, source_predicate.as_ref())? {
                articles.push(article);
            }
        }
        Ok(articles)
    }

    /// Records the reader's scores and moves their keyword affinities towards them.
    pub async fn train(&self, user_id: &str, feedback: Vec<Feedback>) -> Result<TrainingReport, FeedError> {
        let _guard = self.user_writes.lock().await;
        let uid = user_id.to_string();
        let report = self
            .blocking(move |store| {
                let mut user = store.get::<User>(uid.as_str())?;
                let ids: Vec<&str> = feedback.iter().map(|f| f.article_id.as_str()).collect();
                let articles: HashMap<String, Article> = store
                    .query::<Article>(Some(&Predicate::is_in("article_id", ids)))?
                    .into_iter()
                    .map(|a| (a.article_id.clone(), a))
                    .collect();
                if let Some(missing) = feedback.iter().find(|f| !articles.contains_key(&f.article_id)) {
                    return Err(AppError::NotFound(format!("articles {} not found", missing.article_id)));
                }
                let mut existing: BTreeMap<String, Preference> = store
                    .query::<Preference>(Some(&Predicate::eq("user_id", uid.as_str())))?
                    .into_iter()
                    .map(|p| (p.article_id.clone(), p))
                    .collect();

                let mut report = TrainingReport { user_id: uid.clone(), ..Default::default() };
                for Feedback { article_id, user_score } in feedback {
                    let score = clamp_affinity(user_score);
                    match existing.get_mut(&article_id) {
                        Some(preference) => {
                            let patch = Fields::new()
                                .with("preference_id", preference.preference_id)
                                .with("user_score", score)
                                .with("updated_at", now());
                            store.upsert(Table::Preferences, Payload::Sparse(patch))?;
                            preference.user_score = Some(score);
                            report.updated_preferences += 1;
                        }
                        None => {
                            // never scored by the model, neutral until it is
                            let mut preference = Preference::new(uid.as_str(), article_id.as_str(), 0);
                            preference.user_score = Some(score);
                            preference.preference_id = store.set(&preference)?.as_i64();
                            existing.insert(article_id.clone(), preference);
                            report.created_preferences += 1;
                        }
                    }
                    if let Some(article) = articles.get(&article_id) {
                        report.adjusted_keywords += user.nudge(&article.keywords, score);
                    }
                }
                user.updated_at = now();
                store.set(&user)?;
                Ok(report)
            })
            .await?;
        info!(
            "Training for {}: {} preferences updated, {} created, {} keyword nudges",
            report.user_id, report.updated_preferences, report.created_preferences, report.adjusted_keywords
        );
        Ok(report)
    }

    /// Creates a user with no keyword affinities; an existing id is a DuplicateKey error.
    pub async fn register_user(&self, user_id: &str, name: &str) -> Result<User, FeedError> {
        let user = User::new(user_id, name);
        let stored = user.clone();
        self.blocking(move |store| store.set_many(&[stored])).await?;
        info!("Registered user {}", user.user_id);
        Ok(user)
    }
}
