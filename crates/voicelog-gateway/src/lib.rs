pub mod config;
pub mod error;
pub mod origin;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use voicelog_auth::prelude::{Authenticator, AuthnInput, OidcAuthenticator};
use voicelog_llm::prelude::{
    ChatInput, GeminiClient, GeminiConfig, ImageInput, OpenAiClient, OpenAiConfig, WorkflowClient,
    WorkflowConfig, WorkflowRunInput,
};
use voicelog_storage::prelude::*;
use voicelog_types::prelude::{DomainId, Subject, Timestamp};

use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::origin::OriginGate;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    gate: OriginGate,
    authenticator: Arc<dyn Authenticator>,
    workflow: Arc<WorkflowClient>,
    openai: Option<Arc<OpenAiClient>>,
    gemini: Option<Arc<GeminiClient>>,
    allowlist: AllowListStore,
    departments: DepartmentStore,
    journal: JournalStore,
    manga: MangaStore,
    offset: FixedOffset,
}

impl AppState {
    /// Wires every client and store once at process start; handlers receive
    /// them by injection.
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let gate = OriginGate::new(
            config.cors.production_origin.clone(),
            config.cors.allowed_origins.clone(),
        );

        let authenticator: Arc<dyn Authenticator> =
            Arc::new(OidcAuthenticator::new(config.auth.to_oidc()?)?);

        let dify_key = config.dify.resolve_api_key("dify.api_key")?;
        let mut workflow_config = WorkflowConfig::new(dify_key)?;
        if let Some(endpoint) = &config.dify.endpoint {
            workflow_config = workflow_config.with_endpoint(endpoint)?;
        }
        if let Some(secs) = config.dify.timeout_secs {
            workflow_config = workflow_config.with_timeout(std::time::Duration::from_secs(secs));
        }
        let workflow = Arc::new(WorkflowClient::new(workflow_config)?);

        let openai = if config.openai.is_configured() {
            let key = config.openai.resolve_api_key("openai.api_key")?;
            let mut cfg = OpenAiConfig::new(key)?;
            if let Some(endpoint) = &config.openai.endpoint {
                cfg = cfg.with_base_url(endpoint)?;
            }
            Some(Arc::new(OpenAiClient::new(cfg)?))
        } else {
            None
        };

        let gemini = if config.gemini.is_configured() {
            let key = config.gemini.resolve_api_key("gemini.api_key")?;
            let mut cfg = GeminiConfig::new(key)?;
            if let Some(endpoint) = &config.gemini.endpoint {
                cfg = cfg.with_base_url(endpoint)?;
            }
            Some(Arc::new(GeminiClient::new(cfg)?))
        } else {
            None
        };

        let offset = FixedOffset::east_opt(config.time.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow::anyhow!("invalid utc offset"))?;

        let datastore = MemoryDatastore::new();
        let allowlist =
            AllowListStore::new(Arc::new(InMemoryRepository::<DomainDoc>::new(&datastore)));
        let departments =
            DepartmentStore::new(Arc::new(InMemoryRepository::<DepartmentDoc>::new(&datastore)));
        let journal =
            JournalStore::new(Arc::new(InMemoryRepository::<JournalEntry>::new(&datastore)));
        let manga = MangaStore::new(
            Arc::new(InMemoryRepository::<MangaMarker>::new(&datastore)),
            offset,
        );

        Ok(Self {
            inner: Arc::new(Inner {
                gate,
                authenticator,
                workflow,
                openai,
                gemini,
                allowlist,
                departments,
                journal,
                manga,
                offset,
            }),
        })
    }

    pub fn allowlist(&self) -> &AllowListStore {
        &self.inner.allowlist
    }

    pub fn departments(&self) -> &DepartmentStore {
        &self.inner.departments
    }

    pub fn journal(&self) -> &JournalStore {
        &self.inner.journal
    }
}

pub fn app(state: AppState) -> Router {
    let authed = Router::new()
        .route("/api/dify/send", post(dify_send))
        .route("/api/gpt", post(gpt_chat))
        .route("/api/gpt/image", post(gpt_image))
        .route("/api/gemini", post(gemini_chat))
        .route("/api/manga/generate", post(manga_generate))
        .route("/api/manga/allowance", get(manga_allowance))
        .route("/api/logs", post(logs_append).get(logs_list))
        .route("/api/logs/calendar", get(logs_calendar))
        .route("/api/access/check", post(access_check))
        .route(
            "/api/domains/:domain_id/users",
            get(domain_users_list)
                .post(domain_users_add)
                .delete(domain_users_remove),
        )
        .route("/api/domains/:domain_id/departments", get(domain_departments))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/health", get(health))
        .merge(authed)
        .layer(from_fn_with_state(state.clone(), cors_gate))
        .with_state(state)
}

/// Preflights are always answered here; a disallowed mutating request is
/// rejected before any business logic runs. CORS headers are attached on
/// the way out according to the gate's decision.
async fn cors_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let allowed = state.inner.gate.is_allowed(origin.as_deref());

    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), allowed.then_some(origin).flatten());
        return response;
    }

    if matches!(*req.method(), Method::POST | Method::DELETE) && !allowed {
        let mut response = (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "code": "auth.forbidden",
                "message": "CORS policy: Origin not allowed",
            })),
        )
            .into_response();
        apply_cors_headers(response.headers_mut(), None);
        return response;
    }

    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut(), allowed.then_some(origin).flatten());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, allowed_origin: Option<String>) {
    if let Some(origin) = allowed_origin {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
}

async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing authorization header"))?;
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthenticated("authorization header is not a bearer token"))?;

    let subject = state
        .inner
        .authenticator
        .authenticate(AuthnInput::BearerJwt(token.to_string()))
        .await?;

    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct DifySendRequest {
    #[serde(default)]
    department: String,
    #[serde(default)]
    rating: String,
    #[serde(default)]
    details: String,
}

async fn dify_send(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<DifySendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let answer = state
        .inner
        .workflow
        .run(&WorkflowRunInput {
            department: body.department,
            rating: body.rating,
            details: body.details,
            user: subject.subject_id.0.clone(),
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": answer.text,
        "text": answer.text,
        "conversationId": answer.conversation_id,
        "messageId": answer.message_id,
    })))
}

async fn gpt_chat(
    State(state): State<AppState>,
    Json(input): Json<ChatInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = state
        .inner
        .openai
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("OpenAI is not configured."))?;
    let answer = client.chat(&input).await?;
    Ok(Json(chat_answer_body(answer)))
}

async fn gemini_chat(
    State(state): State<AppState>,
    Json(input): Json<ChatInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = state
        .inner
        .gemini
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Gemini is not configured."))?;
    let answer = client.chat(&input).await?;
    Ok(Json(chat_answer_body(answer)))
}

fn chat_answer_body(answer: voicelog_llm::prelude::ChatAnswer) -> serde_json::Value {
    json!({
        "success": true,
        "text": answer.text,
        "message": answer.text,
        "finishReason": answer.finish_reason,
        "usage": answer.usage,
        "model": answer.model,
        "id": answer.id,
    })
}

async fn gpt_image(
    State(state): State<AppState>,
    Json(input): Json<ImageInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = state
        .inner
        .openai
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("OpenAI is not configured."))?;
    let answer = client.generate_image(&input).await?;
    Ok(Json(image_answer_body(answer)))
}

fn image_answer_body(answer: voicelog_llm::prelude::ImageAnswer) -> serde_json::Value {
    json!({
        "success": true,
        "message": "Image generated.",
        "imageUrl": answer.source,
        "revisedPrompt": answer.revised_prompt,
        "model": answer.model,
    })
}

async fn manga_allowance(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let allowed = state
        .inner
        .manga
        .allowed_today(&subject.subject_id.0, Timestamp::now())
        .await?;
    Ok(Json(json!({ "allowed": allowed })))
}

async fn manga_generate(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Json(input): Json<ImageInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = state
        .inner
        .openai
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("OpenAI is not configured."))?;

    let user_id = &subject.subject_id.0;
    let now = Timestamp::now();
    if !state.inner.manga.allowed_today(user_id, now).await? {
        return Err(ApiError::quota_exhausted(
            "A manga was already generated today.",
        ));
    }

    let answer = client.generate_image(&input).await?;
    state.inner.manga.mark_generated(user_id, now).await?;
    info!(user = %user_id, "manga generated");

    Ok(Json(image_answer_body(answer)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogAppendRequest {
    #[serde(default)]
    domain: Option<String>,
    department: String,
    mood_score: u8,
    mood_reason: String,
    #[serde(default)]
    llm_feeling: String,
    #[serde(default)]
    llm_checkpoint: String,
    #[serde(default)]
    llm_next_step: String,
}

async fn logs_append(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<LogAppendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entry = state
        .inner
        .journal
        .append(
            NewJournalEntry {
                domain: body.domain.map(DomainId),
                user_id: subject.subject_id.0.clone(),
                user_display_name: subject.display_name.clone(),
                user_email: subject.email.clone(),
                department: body.department,
                mood_score: body.mood_score,
                mood_reason: body.mood_reason,
                llm_feeling: body.llm_feeling,
                llm_checkpoint: body.llm_checkpoint,
                llm_next_step: body.llm_next_step,
            },
            Timestamp::now(),
        )
        .await?;

    Ok(Json(json!({ "success": true, "id": entry.id })))
}

#[derive(Deserialize)]
struct LogsQuery {
    #[serde(default)]
    date: Option<chrono::NaiveDate>,
}

async fn logs_list(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state
        .inner
        .journal
        .all_for_user(&subject.subject_id.0)
        .await?;
    let days = distinct_day_count(&entries, state.inner.offset);

    let entries: Vec<&JournalEntry> = match query.date {
        Some(date) => entries_on(&entries, date, state.inner.offset),
        None => entries.iter().collect(),
    };

    Ok(Json(json!({ "entries": entries, "days": days })))
}

#[derive(Serialize)]
struct CalendarDay<'a> {
    date: String,
    entry: &'a JournalEntry,
}

async fn logs_calendar(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state
        .inner
        .journal
        .all_for_user(&subject.subject_id.0)
        .await?;
    let days: Vec<CalendarDay> = latest_per_day(&entries, state.inner.offset)
        .into_iter()
        .map(|(date, entry)| CalendarDay {
            date: date.to_string(),
            entry,
        })
        .collect();

    Ok(Json(json!({ "days": days })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessCheckRequest {
    domain_id: String,
}

async fn access_check(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<AccessCheckRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.domain_id.is_empty() {
        return Err(ApiError::invalid_argument("domainId is required"));
    }
    let email = subject
        .email
        .as_deref()
        .ok_or_else(|| ApiError::forbidden("Account has no email address."))?;

    let domain = DomainId(body.domain_id);
    let user = state.inner.allowlist.allowed_user(&domain, email).await?;

    Ok(Json(json!({ "allowed": user.is_some(), "user": user })))
}

async fn domain_users_list(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let users = state
        .inner
        .allowlist
        .list_users(&DomainId(domain_id))
        .await?;
    Ok(Json(json!({ "users": users })))
}

#[derive(Deserialize)]
struct AddUsersRequest {
    users: Vec<AllowListEntry>,
}

async fn domain_users_add(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
    Json(body): Json<AddUsersRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.users.is_empty() {
        return Err(ApiError::invalid_argument("users must be a non-empty array"));
    }
    let outcome = state
        .inner
        .allowlist
        .add_users(&DomainId(domain_id), body.users)
        .await?;
    Ok(Json(json!({ "added": outcome.added, "total": outcome.total })))
}

#[derive(Deserialize)]
struct RemoveUsersRequest {
    emails: Vec<String>,
}

async fn domain_users_remove(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
    Json(body): Json<RemoveUsersRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.emails.is_empty() {
        return Err(ApiError::invalid_argument("emails must be a non-empty array"));
    }
    let outcome = state
        .inner
        .allowlist
        .remove_users(&DomainId(domain_id), &body.emails)
        .await?;
    Ok(Json(
        json!({ "removed": outcome.removed, "total": outcome.total }),
    ))
}

async fn domain_departments(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let departments = state
        .inner
        .departments
        .list(&DomainId(domain_id))
        .await?;
    Ok(Json(json!({ "departments": departments })))
}
