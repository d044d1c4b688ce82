use crate::err::FeedError;
use config::{Config, ConfigError, Environment, File};
use docstore::StoreOptions;
use dotenv::dotenv;
use http::HeaderValue;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tower_http::cors::{self, AllowOrigin, CorsLayer};
use tracing::{debug, info};

static DOTENV_LOADED: OnceLock<bool> = OnceLock::new();

/// Loads `.env` at most once and remembers whether one was found.
fn ensure_dotenv_loaded() -> bool {
    *DOTENV_LOADED.get_or_init(|| dotenv().is_ok())
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub store: StoreSettings,
    pub http: HttpSettings,
    pub llm: LlmSettings,
    pub scraper: ScraperSettings,
    pub feed: FeedSettings,
    #[serde(skip)]
    pub dotenv_loaded: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub db_path: String,
    #[serde(rename = "busy_timeout_ms", deserialize_with = "duration_from_millis")]
    pub busy_timeout: Duration,
    pub wal: bool,
}

impl StoreSettings {
    pub fn options(&self) -> StoreOptions {
        StoreOptions { busy_timeout: self.busy_timeout, wal: self.wal }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    pub enable: bool,
    pub bind_address: SocketAddr,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl HttpSettings {
    /// `*` allows any origin, an empty list disables CORS handling.
    pub fn cors_layer(&self) -> Result<Option<CorsLayer>, FeedError> {
        if self.cors_origins.is_empty() {
            return Ok(None);
        }
        let origin = if self.cors_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            let origins = self.cors_origins.iter().map(|o| HeaderValue::from_str(o)).collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(origins)
        };
        Ok(Some(CorsLayer::new().allow_origin(origin).allow_methods(cors::Any).allow_headers(cors::Any)))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmSettings {
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(rename = "timeout_s", deserialize_with = "duration_from_secs")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScraperSettings {
    pub index_url: String,
    pub base_url: String,
    pub days: u32,
    pub source_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSettings {
    pub user_id: String,
    pub log_level: String,
}

impl AppConfig {
    /// Reads `path` (without extension) and overlays `NEWSFEED__SECTION__KEY` variables.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let dotenv_loaded = ensure_dotenv_loaded();
        let builder = Config::builder()
            .add_source(File::with_name(path).required(true))
            .add_source(
                Environment::with_prefix("NEWSFEED")
                    .try_parsing(true)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("http.cors_origins"),
            );
        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.dotenv_loaded = dotenv_loaded;
        if config.llm.api_key.is_empty() {
            config.llm.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        Ok(config)
    }

    pub fn source_description(&self) -> &'static str {
        if self.dotenv_loaded {
            "Config loaded including .env file."
        } else {
            "Config loaded without .env file."
        }
    }

    /// Reports where the config came from. Runs once logging is up, which needs the config first.
    pub fn log_sources(&self) {
        info!("{}", self.source_description());
        debug!("{:#?}", self.http);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_outcome_is_kept_for_later_logging() {
        let mut config = AppConfig::new("config/settings").unwrap();
        assert_eq!(config.dotenv_loaded, ensure_dotenv_loaded());
        config.dotenv_loaded = false;
        assert_eq!(config.source_description(), "Config loaded without .env file.");
        config.dotenv_loaded = true;
        assert_eq!(config.source_description(), "Config loaded including .env file.");
    }

    fn http(origins: &[&str]) -> HttpSettings {
        HttpSettings {
            enable: true,
            bind_address: "127.0.0.1:8000".parse().unwrap(),
            cors_origins: origins.iter().map(|o| o.to_string()).collect(),
        }
    }

    #[test]
    fn loads_bundled_settings() {
        let config = AppConfig::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config/settings")).unwrap();
        assert_eq!(config.store.busy_timeout, Duration::from_millis(5000));
        assert_eq!(config.llm.timeout, Duration::from_secs(60));
        assert_eq!(config.scraper.days, 5);
        assert_eq!(config.feed.user_id, "user1");
    }

    #[test]
    fn cors_follows_origins() {
        assert!(http(&[]).cors_layer().unwrap().is_none());
        assert!(http(&["*"]).cors_layer().unwrap().is_some());
        assert!(http(&["http://localhost:3000"]).cors_layer().unwrap().is_some());
        assert!(http(&["bad\norigin"]).cors_layer().is_err());
    }
}
