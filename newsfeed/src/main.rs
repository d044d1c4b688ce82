use docstore::logger;
use newsfeed::launcher;
use newsfeed::settings::AppConfig;
use newsfeed::FeedError;

#[tokio::main]
async fn main() -> Result<(), FeedError> {
    let config = AppConfig::new("config/settings")?;
    logger::init(&config.feed.log_level);
    config.log_sources();
    launcher::launch(config).await
}
