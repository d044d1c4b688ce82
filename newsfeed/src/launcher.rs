use crate::err::FeedError;
use crate::llm::{LanguageModel, OpenAiModel};
use crate::models::Table;
use crate::routes::{self, AppState};
use crate::scraper::{MoeScraper, PressSource};
use crate::service::FeedService;
use crate::settings::AppConfig;
use axum::Router;
use docstore::{build_router, serve, AppError, DocumentStore};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub fn router(feed: Arc<FeedService>, cors: Option<CorsLayer>) -> Router {
    build_router(routes::routes(), AppState { feed }, cors)
}

pub fn feed_service(config: &AppConfig) -> Result<FeedService, FeedError> {
    let store = DocumentStore::<Table>::open(&config.store.db_path, config.store.options())?;
    store.initialize(None)?;
    if config.llm.api_key.is_empty() {
        warn!("No language model API key configured, keyword extraction and scoring will fail");
    }
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiModel::new(&config.llm)?);
    let source: Arc<dyn PressSource> = Arc::new(MoeScraper::new(config.scraper.clone())?);
    Ok(FeedService::new(store, model, source, config.scraper.source_name.as_str(), config.feed.user_id.as_str()))
}

/// Serves the feed until Ctrl-C, then lets in-flight requests finish.
pub async fn launch(config: AppConfig) -> Result<(), FeedError> {
    let feed = Arc::new(feed_service(&config)?);
    if !config.http.enable {
        info!("HTTP server disabled, store ready at {}", feed.store().path().display());
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = router(feed, config.http.cors_layer()?);
    let mut server = tokio::spawn(serve(app, config.http.bind_address, shutdown_rx));

    tokio::select! {
        result = &mut server => {
            result??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(AppError::from)?;
            info!("Received Ctrl-C, shutting down...");
            let _ = shutdown_tx.send(true);
            server.await??;
        }
    }
    Ok(())
}
