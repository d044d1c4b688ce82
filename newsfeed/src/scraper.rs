use crate::err::FeedError;
use crate::settings::ScraperSettings;
use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

/// One press release page, scraped but not stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PressRelease {
    /// Site-relative path such as `/press/press_03214.html`.
    pub path: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub publish_date: Option<NaiveDate>,
}

impl PressRelease {
    pub fn article_id(&self) -> String {
        format!("moe{}", self.path.replace('/', "_"))
    }

    pub fn published_at(&self) -> Option<NaiveDateTime> {
        self.publish_date.and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

#[async_trait]
pub trait PressSource: Send + Sync {
    /// Releases announced within the configured number of days, newest block first.
    async fn releases(&self) -> Result<Vec<PressRelease>, FeedError>;

    async fn latest_release_date(&self) -> Result<Option<NaiveDate>, FeedError>;

    async fn latest_release_is_today(&self) -> Result<bool, FeedError> {
        Ok(self.latest_release_date().await? == Some(today()))
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Press releases of the Ministry of the Environment, fetched one page at a time.
pub struct MoeScraper {
    client: Client,
    settings: ScraperSettings,
}

impl MoeScraper {
    pub fn new(settings: ScraperSettings) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        Ok(MoeScraper { client, settings })
    }

    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        let body = self.client.get(url).send().await?.error_for_status()?.text().await?;
        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }

    fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PressSource for MoeScraper {
    async fn releases(&self) -> Result<Vec<PressRelease>, FeedError> {
        let index = self.fetch(&self.settings.index_url).await?;
        let paths = parse_index(&index, &self.settings.base_url, today(), self.settings.days)?;
        info!("Found {} press releases of the last {} days", paths.len(), self.settings.days);

        let mut releases = Vec::with_capacity(paths.len());
        for path in paths {
            let url = self.page_url(&path);
            let page = self.fetch(&url).await?;
            releases.push(parse_release(&page, &path).map_err(|e| match e {
                FeedError::Scrape { reason, .. } => FeedError::scrape(url, reason),
                other => other,
            })?);
        }
        Ok(releases)
    }

    async fn latest_release_date(&self) -> Result<Option<NaiveDate>, FeedError> {
        let index = self.fetch(&self.settings.index_url).await?;
        latest_heading_date(&index)
    }
}

fn selector(css: &str) -> Result<Selector, FeedError> {
    Selector::parse(css).map_err(|e| FeedError::scrape(css, e.to_string()))
}

/// Visible text with blank lines dropped and each line trimmed.
fn inner_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses `2024年5月17日` out of text like `2024年05月17日発表`.
pub fn parse_japanese_date(text: &str) -> Option<NaiveDate> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest.find('日')? + '日'.len_utf8();
    let compact: String = rest[..end].chars().filter(|c| !c.is_whitespace()).collect();
    NaiveDate::parse_from_str(&compact, "%Y年%m月%d日").ok()
}

fn latest_heading_date(html: &str) -> Result<Option<NaiveDate>, FeedError> {
    let document = Html::parse_document(html);
    let heading = selector(".p-press-release-list__heading")?;
    Ok(document.select(&heading).next().and_then(|h| parse_japanese_date(&inner_text(h))))
}

/// Links of every index block announced on or after `today - days`.
/// Blocks are listed newest first, so the first older block ends the scan.
pub fn parse_index(html: &str, base_url: &str, today: NaiveDate, days: u32) -> Result<Vec<String>, FeedError> {
    let document = Html::parse_document(html);
    let block = selector(".p-press-release-list__block")?;
    let heading = selector(".p-press-release-list__heading")?;
    let link = selector(".c-news-link__link")?;
    let oldest = today - Duration::days(days as i64);
    let base = base_url.trim_end_matches('/');

    let mut paths = Vec::new();
    for block in document.select(&block) {
        let Some(date) = block.select(&heading).next().and_then(|h| parse_japanese_date(&inner_text(h))) else {
            continue;
        };
        if date < oldest {
            break;
        }
        for href in block.select(&link).filter_map(|a| a.value().attr("href")) {
            let path = href.strip_prefix(base).unwrap_or(href).to_string();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}

pub fn parse_release(html: &str, path: &str) -> Result<PressRelease, FeedError> {
    let document = Html::parse_document(html);
    let body = document
        .select(&selector(".c-component")?)
        .next()
        .ok_or_else(|| FeedError::scrape(path, "page has no article body"))?;

    let title = body.select(&selector(".p-press-release-material__heading")?).next().map(inner_text).unwrap_or_default();
    let summary = body.select(&selector(".c-component__bg-area")?).next().map(inner_text).filter(|s| !s.is_empty());
    let publish_date = document
        .select(&selector(".p-press-release-material__date")?)
        .next()
        .and_then(|d| parse_japanese_date(&inner_text(d)));

    Ok(PressRelease { path: path.to_string(), title, content: inner_text(body), summary, publish_date })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        <html><body>
          <div class="p-press-release-list__block">
            <h2 class="p-press-release-list__heading">2024年05月17日発表</h2>
            <a class="c-news-link__link" href="/press/press_03214.html">東京湾の水質</a>
            <a class="c-news-link__link" href="https://www.env.go.jp/press/press_03215.html">補助金</a>
          </div>
          <div class="p-press-release-list__block">
            <h2 class="p-press-release-list__heading">2024年05月14日発表</h2>
            <a class="c-news-link__link" href="/press/press_03200.html">古い発表</a>
          </div>
          <div class="p-press-release-list__block">
            <h2 class="p-press-release-list__heading">2024年05月16日発表</h2>
            <a class="c-news-link__link" href="/press/press_03210.html">after the cutoff block</a>
          </div>
        </body></html>"#;

    const PAGE: &str = r#"
        <html><body>
          <p class="p-press-release-material__date">2024年5月17日</p>
          <div class="c-component">
            <h1 class="p-press-release-material__heading">
              東京湾環境一斉調査の結果について
            </h1>
            <div class="c-component__bg-area">水質の調査結果を公表します。</div>
            <p>本文です。</p>
          </div>
        </body></html>"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn japanese_dates() {
        assert_eq!(parse_japanese_date("2024年05月17日発表"), Some(date(2024, 5, 17)));
        assert_eq!(parse_japanese_date(" 令和 2024年5月7日 "), Some(date(2024, 5, 7)));
        assert_eq!(parse_japanese_date("発表"), None);
    }

    #[test]
    fn index_stops_at_first_old_block() {
        let paths = parse_index(INDEX, "https://www.env.go.jp", date(2024, 5, 18), 3).unwrap();
        assert_eq!(paths, vec!["/press/press_03214.html", "/press/press_03215.html"]);

        let wide = parse_index(INDEX, "https://www.env.go.jp/", date(2024, 5, 18), 5).unwrap();
        assert_eq!(wide.len(), 4);
        assert_eq!(latest_heading_date(INDEX).unwrap(), Some(date(2024, 5, 17)));
    }

    #[test]
    fn release_page_fields() {
        let release = parse_release(PAGE, "/press/press_03214.html").unwrap();
        assert_eq!(release.article_id(), "moe_press_press_03214.html");
        assert_eq!(release.title, "東京湾環境一斉調査の結果について");
        assert_eq!(release.summary.as_deref(), Some("水質の調査結果を公表します。"));
        assert_eq!(release.publish_date, Some(date(2024, 5, 17)));
        assert!(release.content.contains("本文です。"));
        assert!(release.content.starts_with("東京湾環境一斉調査"));
    }

    #[test]
    fn release_without_body_is_an_error() {
        let err = parse_release("<html><body><p>moved</p></body></html>", "/press/gone.html").unwrap_err();
        assert!(matches!(err, FeedError::Scrape { .. }));
    }
}
