#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use docstore::DocumentStore;
use newsfeed::llm::LanguageModel;
use newsfeed::scraper::{PressRelease, PressSource};
use newsfeed::{FeedError, FeedService, Table};
use std::sync::Arc;

/// Answers by markers in the article text: `SUBSIDY` articles are unwanted, `GARBLED` ones confuse it.
pub struct MockModel;

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, prompt: &str) -> Result<String, FeedError> {
        let reply = if prompt.contains("GARBLED") {
            "I am not sure."
        } else if prompt.contains("Extract up to") {
            if prompt.contains("SUBSIDY") {
                r#"```json
["補助金","製造業"]
```"#
            } else {
                r#"["環境","水質汚染"]"#
            }
        } else if prompt.contains("SUBSIDY") {
            "-2"
        } else {
            "1"
        };
        Ok(reply.to_string())
    }
}

pub struct FixedSource {
    pub releases: Vec<PressRelease>,
    pub latest: Option<NaiveDate>,
}

#[async_trait]
impl PressSource for FixedSource {
    async fn releases(&self) -> Result<Vec<PressRelease>, FeedError> {
        Ok(self.releases.clone())
    }

    async fn latest_release_date(&self) -> Result<Option<NaiveDate>, FeedError> {
        Ok(self.latest)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn release(number: u32, title: &str, content: &str, published: NaiveDate) -> PressRelease {
    PressRelease {
        path: format!("/press/press_{:05}.html", number),
        title: title.to_string(),
        content: content.to_string(),
        summary: Some(format!("summary of {}", title)),
        publish_date: Some(published),
    }
}

pub fn sample_releases() -> Vec<PressRelease> {
    vec![
        release(1, "東京湾の水質", "WATER 東京湾環境一斉調査の結果", date(2024, 5, 17)),
        release(2, "補助金の公募", "SUBSIDY 製造業向け補助金の公募開始", date(2024, 5, 16)),
    ]
}

pub const WATER_ID: &str = "moe_press_press_00001.html";
pub const SUBSIDY_ID: &str = "moe_press_press_00002.html";

pub fn feed_with(name: &str, source: FixedSource) -> Arc<FeedService> {
    let store: DocumentStore<Table> = DocumentStore::temp(name).unwrap();
    store.initialize(None).unwrap();
    Arc::new(FeedService::new(store, Arc::new(MockModel), Arc::new(source), "環境省", "user1"))
}

pub fn feed(name: &str) -> Arc<FeedService> {
    feed_with(name, FixedSource { releases: sample_releases(), latest: Some(date(2024, 5, 17)) })
}

/// Scraped, keyworded and scored for `user1`.
pub async fn prepared_feed(name: &str) -> Arc<FeedService> {
    let feed = feed(name);
    feed.scrape(false).await.unwrap();
    feed.extract_keywords().await.unwrap();
    feed.register_user("user1", "Ada").await.unwrap();
    feed.score_articles("user1").await.unwrap();
    feed
}
