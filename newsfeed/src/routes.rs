use crate::err::FeedError;
use crate::models::{Article, Table, User};
use crate::service::{ArticleFilter, Feedback, FeedService, KeywordReport, ScoreReport, ScrapeReport, TrainingReport};
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::routing::get;
use docstore::{AppJson, Catalog, Fields, Payload, PredicateQuery};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
}

/// A raw row of any table, column name to JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(value_type = Object)]
pub struct Document(pub Map<String, Json>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StoredKey {
    pub table: String,
    #[schema(value_type = Object)]
    pub key: Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScrapeParams {
    /// Skip scraping unless the newest release was announced today.
    #[serde(default)]
    pub only_today: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserParams {
    /// Defaults to the configured user.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainingRequest {
    pub user_id: Option<String>,
    pub feedback: Vec<Feedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
}

fn table_of(name: &str) -> Result<Table, FeedError> {
    Ok(name.parse::<Table>()?)
}

#[utoipa::path(get, path = "/setup_tables", responses((status = OK, body = String)), tag = "Feed")]
#[axum::debug_handler]
pub async fn setup_tables(State(state): State<AppState>) -> Result<AppJson<String>, FeedError> {
    state.feed.setup_tables().await?;
    Ok(AppJson("OK".to_string()))
}

#[utoipa::path(get, path = "/scrape_moe", params(ScrapeParams), responses((status = OK, body = ScrapeReport)), tag = "Feed")]
#[axum::debug_handler]
pub async fn scrape_moe(State(state): State<AppState>, Query(params): Query<ScrapeParams>) -> Result<AppJson<ScrapeReport>, FeedError> {
    Ok(AppJson(state.feed.scrape(params.only_today).await?))
}

#[utoipa::path(post, path = "/extract_keywords_with_ai", responses((status = OK, body = KeywordReport)), tag = "Feed")]
#[axum::debug_handler]
pub async fn extract_keywords_with_ai(State(state): State<AppState>) -> Result<AppJson<KeywordReport>, FeedError> {
    Ok(AppJson(state.feed.extract_keywords().await?))
}

#[utoipa::path(post, path = "/score_articles", params(UserParams), responses((status = OK, body = ScoreReport)), tag = "Feed")]
#[axum::debug_handler]
pub async fn score_articles(State(state): State<AppState>, Query(params): Query<UserParams>) -> Result<AppJson<ScoreReport>, FeedError> {
    let user_id = state.feed.user_or_default(params.user_id);
    Ok(AppJson(state.feed.score_articles(&user_id).await?))
}

#[utoipa::path(get, path = "/articles", params(ArticleFilter), responses((status = OK, body = Vec<Article>)), tag = "Feed")]
#[axum::debug_handler]
pub async fn articles(State(state): State<AppState>, Query(filter): Query<ArticleFilter>) -> Result<AppJson<Vec<Article>>, FeedError> {
    Ok(AppJson(state.feed.articles(filter).await?))
}

#[utoipa::path(
    post,
    path = "/articles_training",
    request_body(content = TrainingRequest, content_type = "application/json"),
    responses((status = OK, body = TrainingReport)),
    tag = "Feed"
)]
#[axum::debug_handler]
pub async fn articles_training(
    State(state): State<AppState>,
    AppJson(request): AppJson<TrainingRequest>,
) -> Result<AppJson<TrainingReport>, FeedError> {
    let user_id = state.feed.user_or_default(request.user_id);
    Ok(AppJson(state.feed.train(&user_id, request.feedback).await?))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body(content = NewUser, content_type = "application/json"),
    responses((status = CREATED, body = User), (status = CONFLICT, body = docstore::ErrorResponse)),
    tag = "Feed"
)]
#[axum::debug_handler]
pub async fn register_user(
    State(state): State<AppState>,
    AppJson(new_user): AppJson<NewUser>,
) -> Result<(StatusCode, AppJson<User>), FeedError> {
    let user = state.feed.register_user(&new_user.user_id, &new_user.name).await?;
    Ok((StatusCode::CREATED, AppJson(user)))
}

#[utoipa::path(
    get,
    path = "/docs/{table}",
    params(("table" = String, Path, description = "articles, users or preferences"), PredicateQuery),
    responses((status = OK, body = Vec<Document>), (status = BAD_REQUEST, body = docstore::ErrorResponse)),
    tag = "Documents"
)]
#[axum::debug_handler]
pub async fn query_documents(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<PredicateQuery>,
) -> Result<AppJson<Vec<Document>>, FeedError> {
    let table = table_of(&table)?;
    let predicate = query.to_predicate(table.schema())?;
    let rows = state.feed.blocking(move |store| store.query_fields(table, predicate.as_ref())).await?;
    Ok(AppJson(rows.iter().map(to_document).collect()))
}

#[utoipa::path(
    put,
    path = "/docs/{table}",
    params(("table" = String, Path, description = "articles, users or preferences")),
    request_body(content = Document, content_type = "application/json"),
    responses((status = OK, body = StoredKey), (status = BAD_REQUEST, body = docstore::ErrorResponse)),
    tag = "Documents"
)]
#[axum::debug_handler]
pub async fn upsert_document(
    State(state): State<AppState>,
    Path(table): Path<String>,
    AppJson(document): AppJson<Document>,
) -> Result<AppJson<StoredKey>, FeedError> {
    let table = table_of(&table)?;
    let fields = Fields::from_json(document.0);
    let key = state.feed.blocking(move |store| store.upsert(table, Payload::Sparse(fields))).await?;
    Ok(AppJson(StoredKey { table: table.to_string(), key: key.to_json() }))
}

#[utoipa::path(
    get,
    path = "/docs/{table}/{key}",
    params(
        ("table" = String, Path, description = "articles, users or preferences"),
        ("key" = String, Path, description = "Primary key of the row")
    ),
    responses((status = OK, body = Document), (status = NOT_FOUND, body = docstore::ErrorResponse)),
    tag = "Documents"
)]
#[axum::debug_handler]
pub async fn get_document(
    State(state): State<AppState>,
    Path((table, key)): Path<(String, String)>,
) -> Result<AppJson<Document>, FeedError> {
    let table = table_of(&table)?;
    let fields = state.feed.blocking(move |store| store.get_fields(table, key)).await?;
    Ok(AppJson(to_document(&fields)))
}

fn to_document(fields: &Fields) -> Document {
    match fields.to_json() {
        Json::Object(map) => Document(map),
        _ => Document(Map::new()),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .route("/", get(|| async { Redirect::temporary("/swagger-ui") }))
        .routes(routes!(setup_tables))
        .routes(routes!(scrape_moe))
        .routes(routes!(extract_keywords_with_ai))
        .routes(routes!(score_articles))
        .routes(routes!(articles))
        .routes(routes!(articles_training))
        .routes(routes!(register_user))
        .routes(routes!(query_documents, upsert_document))
        .routes(routes!(get_document))
}
