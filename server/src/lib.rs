pub mod config;
pub mod error;
pub mod ranker;
pub mod upstream;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Query as QueryParams, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use config::ServiceConfig;
use error::RankError;
use ranker::Ranker;
use ranking_core::Query;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use upstream::HttpUpstream;

#[derive(Debug, Default, Deserialize)]
pub struct ScoreParams {
    #[serde(default, alias = "queryID")]
    pub id: Option<String>,
    #[serde(default, alias = "queryText")]
    pub text: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub ranker: Arc<Ranker>,
}

pub fn build_app(config: ServiceConfig) -> Result<Router> {
    let upstream = HttpUpstream::new(config.upstream)?;
    let ranker = Ranker::new(Arc::new(upstream), config.ranker);
    Ok(build_router(Arc::new(ranker)))
}

pub fn build_router(ranker: Arc<Ranker>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/getDocumentScores", get(scores_get).post(scores_post))
        .with_state(AppState { ranker })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub async fn scores_get(State(state): State<AppState>, QueryParams(params): QueryParams<ScoreParams>) -> Response {
    score(&state, params).await
}

pub async fn scores_post(State(state): State<AppState>, body: Result<Json<ScoreParams>, JsonRejection>) -> Response {
    match body {
        Ok(Json(params)) => score(&state, params).await,
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    }
}

async fn score(state: &AppState, params: ScoreParams) -> Response {
    let id = params.id.filter(|s| !s.trim().is_empty());
    let text = params.text.filter(|s| !s.trim().is_empty());
    let (Some(id), Some(text)) = (id, text) else {
        return error_response(StatusCode::BAD_REQUEST, "both id and text are required");
    };

    let query = Query::new(id, text);
    match state.ranker.rank(&query).await {
        Ok(outcome) => {
            if let Some(err) = outcome.partial_error() {
                tracing::warn!(query_id = %query.id, %err, "returning partial results");
            }
            let report = &outcome.report;
            tracing::info!(
                query_id = %report.query_id,
                parsed = report.num_documents_parsed,
                ranked = report.num_ranked_documents,
                took_ms = report.process_time.as_millis() as u64,
                "processed query"
            );
            Json(outcome.documents).into_response()
        }
        Err(RankError::InvalidQuery(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(err) => {
            tracing::error!(query_id = %query.id, %err, "ranking failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
