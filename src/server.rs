use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::feed::ContentType;
use crate::orchestrator::{Orchestrator, RunState};
use crate::radio::Radio;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub radio: Arc<Radio>,
}

/// Error wrapper translating the taxonomy into HTTP status codes while
/// keeping the `{success, error}` envelope the clients expect.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::AlreadyRunning | Error::DuplicateAction(_) => StatusCode::CONFLICT,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(json!({ "success": false, "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/orchestrator/start", post(start_orchestrator))
        .route("/orchestrator/stop", post(stop_orchestrator))
        .route("/orchestrator/tick", post(manual_tick))
        .route("/orchestrator/status", get(orchestrator_status))
        .route("/generate-all-personalities", post(generate_all_personalities))
        .route("/generate-post", post(generate_post))
        .route("/agents", get(list_agents))
        .route("/agents/:id/generate-personality", post(generate_personality))
        .route("/posts/:id/like", post(like_post))
        .route("/feed", get(feed))
        .route("/analytics", get(analytics))
        .route("/network-graph", get(network_graph))
        .route("/radio/status", get(radio_status))
        .route("/radio/queue", get(radio_queue))
        .route("/radio/skip", post(radio_skip))
        .route("/radio/tick", post(radio_tick))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Orchestrator control plane
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    interval_ms: Option<u64>,
}

async fn start_orchestrator(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    let interval = request
        .interval_ms
        .unwrap_or_else(|| state.orchestrator.default_tick_interval());
    let run = state.orchestrator.start(interval)?;
    Ok(ok(run))
}

async fn stop_orchestrator(State(state): State<AppState>) -> Json<Value> {
    ok(state.orchestrator.stop())
}

async fn manual_tick(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.orchestrator.tick().await?;
    Ok(ok(state.orchestrator.status()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionView {
    id: Uuid,
    artist_id: Uuid,
    action_type: String,
    status: String,
    priority: i32,
    attempts: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    #[serde(flatten)]
    run: RunState,
    recent_actions: Vec<ActionView>,
}

async fn orchestrator_status(State(state): State<AppState>) -> Json<Value> {
    let recent_actions = state
        .orchestrator
        .recent_actions(10)
        .into_iter()
        .map(|action| ActionView {
            id: action.id,
            artist_id: action.agent_id,
            action_type: action.kind.name().to_string(),
            status: action.status.to_string(),
            priority: action.priority,
            attempts: action.attempts,
        })
        .collect();

    ok(StatusView {
        run: state.orchestrator.status(),
        recent_actions,
    })
}

// ---------------------------------------------------------------------------
// Personalities and manual generation
// ---------------------------------------------------------------------------

async fn generate_all_personalities(State(state): State<AppState>) -> Json<Value> {
    let (generated, failed) = state.orchestrator.generate_missing_personalities().await;
    info!(generated, failed, "personality backfill finished");
    ok(json!({ "generated": generated, "failed": failed }))
}

async fn generate_personality(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let personality = state.orchestrator.generate_personality_for(id).await?;
    Ok(ok(personality))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratePostRequest {
    agent_id: Uuid,
    content_type: Option<ContentType>,
}

async fn generate_post(
    State(state): State<AppState>,
    Json(request): Json<GeneratePostRequest>,
) -> Result<Json<Value>, ApiError> {
    let post = state
        .orchestrator
        .generate_post_now(request.agent_id, request.content_type)
        .await?;
    Ok(ok(post))
}

// ---------------------------------------------------------------------------
// Roster, feed and projections
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentView {
    id: Uuid,
    name: String,
    genres: Vec<String>,
    mood: String,
    mood_intensity: f64,
    posting_cadence_mins: i64,
    last_action_at: Option<chrono::DateTime<chrono::Utc>>,
    active: bool,
    has_personality: bool,
}

async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let agents = state.orchestrator.agents.read();
    let mut roster: Vec<AgentView> = agents
        .all()
        .map(|agent| AgentView {
            id: agent.id,
            name: agent.name.clone(),
            genres: agent.genres.clone(),
            mood: agent.mood.to_string(),
            mood_intensity: agent.mood_intensity,
            posting_cadence_mins: agent.posting_cadence_mins,
            last_action_at: agent.last_action_at,
            active: agent.active,
            has_personality: agent.personality.is_some(),
        })
        .collect();
    roster.sort_by(|a, b| a.name.cmp(&b.name));
    ok(roster)
}

async fn like_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let likes = state.orchestrator.feed.write().like_post(id)?;
    Ok(ok(json!({ "postId": id, "likes": likes })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

fn validated_limit(query: &LimitQuery, default: usize) -> Result<usize, ApiError> {
    match query.limit {
        Some(0) => Err(Error::InvalidArgument("limit must be positive".to_string()).into()),
        Some(n) => Ok(n.min(100)),
        None => Ok(default),
    }
}

async fn feed(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = validated_limit(&query, 20)?;
    let agents = state.orchestrator.agents.read();
    let items = state.orchestrator.feed.read().feed(limit, &agents);
    Ok(ok(items))
}

async fn analytics(State(state): State<AppState>) -> Json<Value> {
    let agents = state.orchestrator.agents.read();
    let graph = state.orchestrator.graph.read();
    let summary = state
        .orchestrator
        .feed
        .read()
        .analytics(&agents, &graph, chrono::Utc::now());
    ok(summary)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQuery {
    #[serde(default)]
    include_isolated: bool,
}

async fn network_graph(
    State(state): State<AppState>,
    Query(query): Query<GraphQuery>,
) -> Json<Value> {
    let agents = state.orchestrator.agents.read();
    let (nodes, edges) = state
        .orchestrator
        .graph
        .read()
        .snapshot(&agents, query.include_isolated);
    ok(json!({ "nodes": nodes, "edges": edges }))
}

// ---------------------------------------------------------------------------
// Radio surface
// ---------------------------------------------------------------------------

async fn radio_status(State(state): State<AppState>) -> Json<Value> {
    ok(state.radio.status())
}

async fn radio_queue(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = validated_limit(&query, 10)?;
    Ok(ok(state.radio.upcoming(limit)))
}

async fn radio_skip(State(state): State<AppState>) -> Json<Value> {
    state.radio.skip();
    ok(state.radio.status())
}

async fn radio_tick(State(state): State<AppState>) -> Json<Value> {
    state.radio.tick();
    ok(state.radio.status())
}
