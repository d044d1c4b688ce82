use crate::err::FeedError;
use crate::models::{AFFINITY_MAX, AFFINITY_MIN};
use crate::settings::LlmSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const KEYWORD_LIMIT: usize = 5;

/// Text in, text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, FeedError>;
}

/// Chat-completions client for OpenAI compatible endpoints.
#[derive(Clone)]
pub struct OpenAiModel {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiModel {
    pub fn new(settings: &LlmSettings) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(OpenAiModel {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, prompt: &str) -> Result<String, FeedError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };
        let response: ChatResponse =
            self.client.post(&url).bearer_auth(&self.api_key).json(&request).send().await?.error_for_status()?.json().await?;
        debug!("Model {} answered {} choices", self.model, response.choices.len());
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| FeedError::ModelReply("reply without content".into()))
    }
}

pub fn keyword_prompt(content: &str) -> String {
    format!(
        "You will receive a news article. Extract up to {limit} keywords in the language of the article.\n\n\
         # Article\n{content}\n\n\
         # Output\nReturn only a JSON array of strings without markup, for example [\"環境\",\"水質汚染\"].",
        limit = KEYWORD_LIMIT,
        content = content
    )
}

/// `keyword:score,keyword:score`
pub fn render_preference(preference: &BTreeMap<String, i64>) -> String {
    preference.iter().map(|(k, v)| format!("{}:{}", k, v)).collect::<Vec<_>>().join(",")
}

pub fn score_prompt(content: &str, preference: &BTreeMap<String, i64>) -> String {
    format!(
        "You score news articles against a reader's interests so the reader can hide what they do not care about.\n\n\
         # Interests\nKeyword and affinity pairs, affinity from {min} (unwanted) to {max} (important), e.g. '地域経済:2,製造業:1,補助金:-2'.\n\
         Judge semantic closeness and broader or narrower topics, not only literal keyword matches.\n\n\
         # Article\n{content}\n\n\
         # Interests of this reader\n{preference}\n\n\
         # Output\nA single integer from {min} to {max}: {min} hides the article, 0 is neutral, {max} is important. Output the number only.",
        min = AFFINITY_MIN,
        max = AFFINITY_MAX,
        content = content,
        preference = render_preference(preference)
    )
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else { return trimmed };
    let inner = inner.trim_end_matches("```");
    // drop a language tag such as ```json
    match inner.find('\n') {
        Some(idx) if !inner[..idx].trim().contains(['[', '-']) && !inner[..idx].trim().starts_with(|c: char| c.is_ascii_digit()) => inner[idx + 1..].trim(),
        _ => inner.trim(),
    }
}

/// Reads the first JSON array of strings in `reply`, keeping at most [`KEYWORD_LIMIT`] distinct entries.
pub fn parse_keywords(reply: &str) -> Result<Vec<String>, FeedError> {
    let body = strip_code_fence(reply);
    let (start, end) = match (body.find('['), body.rfind(']')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(FeedError::ModelReply(format!("no keyword array in {:?}", reply))),
    };
    let raw: Vec<String> =
        serde_json::from_str(&body[start..=end]).map_err(|e| FeedError::ModelReply(format!("keyword array {:?}: {}", reply, e)))?;

    let mut keywords: Vec<String> = Vec::with_capacity(KEYWORD_LIMIT);
    for keyword in raw.into_iter().map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        if keywords.len() == KEYWORD_LIMIT {
            break;
        }
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    Ok(keywords)
}

/// Reads the first integer in `reply` and requires it to be on the affinity scale.
pub fn parse_score(reply: &str) -> Result<i64, FeedError> {
    let body = strip_code_fence(reply);
    let start = body
        .char_indices()
        .find(|(i, c)| c.is_ascii_digit() || ((*c == '-' || *c == '+') && body[i + 1..].starts_with(|d: char| d.is_ascii_digit())))
        .map(|(i, _)| i)
        .ok_or_else(|| FeedError::ModelReply(format!("no score in {:?}", reply)))?;
    let digits_end = body[start + 1..].find(|c: char| !c.is_ascii_digit()).map(|i| start + 1 + i).unwrap_or(body.len());
    let score: i64 = body[start..digits_end]
        .parse()
        .map_err(|_| FeedError::ModelReply(format!("score {:?} is not an integer", &body[start..digits_end])))?;
    if !(AFFINITY_MIN..=AFFINITY_MAX).contains(&score) {
        return Err(FeedError::ModelReply(format!("score {} outside {}..={}", score, AFFINITY_MIN, AFFINITY_MAX)));
    }
    Ok(score)
}

pub async fn extract_keywords(model: &dyn LanguageModel, content: &str) -> Result<Vec<String>, FeedError> {
    let reply = model.complete(&keyword_prompt(content)).await?;
    parse_keywords(&reply)
}

pub async fn score_article(model: &dyn LanguageModel, content: &str, preference: &BTreeMap<String, i64>) -> Result<i64, FeedError> {
    let reply = model.complete(&score_prompt(content, preference)).await?;
    parse_score(&reply)
}
