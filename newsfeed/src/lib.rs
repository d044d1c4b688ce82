//! Press-release feed over a docstore database: scrape, enrich with a language model, score
//! against each reader's keyword affinities and serve the result over HTTP.

pub mod err;
pub mod launcher;
pub mod llm;
pub mod models;
pub mod routes;
pub mod scraper;
pub mod service;
pub mod settings;

pub use err::FeedError;
pub use models::{Article, Preference, Table, User};
pub use service::FeedService;
