//! Http api over the pipeline.
//!
//! Conversation memory is kept per session. Clients pass the session id in the
//! `x-session-id` header, a new id is issued when the header is missing and
//! returned both in the header and in the response body.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use nlsql_core::executor::ResultRow;
use nlsql_core::extract::SqlCandidate;
use nlsql_core::memory::{SessionId, SessionStore};
use nlsql_core::orchestrator::{
    ChartHint, CheckStage, GenerateOutcome, Pipeline, Rejection, TurnOutcome, TurnRequest,
};
use nlsql_core::schema::SchemaDescription;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::errors::{ServerError, ServerResult};

pub const SESSION_HEADER: &str = "x-session-id";

/// State that's passed to all handlers.
#[derive(Debug)]
pub struct ServerState {
    pub pipeline: Pipeline,
    pub sessions: SessionStore,
}

impl ServerState {
    pub fn new(pipeline: Pipeline) -> Self {
        ServerState {
            pipeline,
            sessions: SessionStore::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub session_id: SessionId,
    pub sql: SqlCandidate,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub session_id: SessionId,
    pub sql: String,
    pub rows: Vec<ResultRow>,
    pub repaired: bool,
    pub chart: Option<ChartHint>,
}

#[derive(Debug, Serialize)]
pub struct RejectedResponse {
    pub session_id: SessionId,
    pub warning: String,
    pub generated_sql: String,
    pub keyword: &'static str,
    pub stage: CheckStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/nl2sql", post(nl2sql))
        .route("/api/v1/ask", post(ask))
        .route("/api/v1/schema", get(schema))
        .route("/api/v1/schema/refresh", post(refresh_schema))
        .route("/api/v1/sessions/:id", delete(end_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the api until ctrl-c, expiring idle sessions in the background.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    session_ttl: Duration,
) -> anyhow::Result<()> {
    let sweeper = tokio::spawn(sweep_sessions(state.clone(), session_ttl));

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    Ok(result?)
}

async fn sweep_sessions(state: Arc<ServerState>, ttl: Duration) {
    let mut interval = tokio::time::interval((ttl / 4).max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let expired = state.sessions.expire_idle(ttl);
        if expired > 0 {
            info!(expired, remaining = state.sessions.len(), "expired idle sessions");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn nl2sql(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(req): Json<TurnRequest>,
) -> ServerResult<Response> {
    validate(&req)?;
    let session_id = session_id(&headers)?;
    let memory = state.sessions.get_or_create(session_id);

    let resp = match state.pipeline.generate(&req, &memory).await? {
        GenerateOutcome::Sql(sql) => with_session(
            StatusCode::OK,
            session_id,
            GenerateResponse { session_id, sql },
        ),
        GenerateOutcome::Rejected(rejection) => rejected(session_id, rejection),
    };
    Ok(resp)
}

pub async fn ask(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(req): Json<TurnRequest>,
) -> ServerResult<Response> {
    validate(&req)?;
    let session_id = session_id(&headers)?;
    let memory = state.sessions.get_or_create(session_id);

    let resp = match state.pipeline.ask(&req, &memory).await? {
        TurnOutcome::Rows(result) => with_session(
            StatusCode::OK,
            session_id,
            AskResponse {
                session_id,
                sql: result.sql,
                rows: result.rows,
                repaired: result.repaired,
                chart: result.chart,
            },
        ),
        TurnOutcome::Rejected(rejection) => rejected(session_id, rejection),
    };
    Ok(resp)
}

pub async fn schema(State(state): State<Arc<ServerState>>) -> Json<Arc<SchemaDescription>> {
    Json(state.pipeline.schema())
}

pub async fn refresh_schema(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<Arc<SchemaDescription>>> {
    Ok(Json(state.pipeline.refresh_schema().await?))
}

pub async fn end_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    let id = SessionId::parse(&id)
        .ok_or_else(|| ServerError::BadRequest(format!("invalid session id: {id}")))?;
    if state.sessions.end(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("unknown session: {id}")))
    }
}

fn validate(req: &TurnRequest) -> ServerResult<()> {
    if req.question.trim().is_empty() {
        return Err(ServerError::BadRequest(
            "question must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn session_id(headers: &HeaderMap) -> ServerResult<SessionId> {
    match headers.get(SESSION_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(SessionId::parse)
            .ok_or_else(|| ServerError::BadRequest(format!("invalid {SESSION_HEADER} header"))),
        None => {
            let id = SessionId::new_v4();
            debug!(session = %id, "issuing session id");
            Ok(id)
        }
    }
}

fn rejected(session_id: SessionId, rejection: Rejection) -> Response {
    with_session(
        StatusCode::BAD_REQUEST,
        session_id,
        RejectedResponse {
            session_id,
            warning: rejection.warning,
            generated_sql: rejection.sql,
            keyword: rejection.keyword,
            stage: rejection.stage,
            original_error: rejection.original_error,
        },
    )
}

fn with_session<T: Serialize>(status: StatusCode, session_id: SessionId, body: T) -> Response {
    (
        status,
        [(SESSION_HEADER, session_id.to_string())],
        Json(body),
    )
        .into_response()
}
