//! HTTP routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, Request};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use patchwright_core::domain::Diagnostic;
use patchwright_core::{
    CompileOutput, CompileRequest, PassRecord, Provenance, RepairOutcome, RepairRequest, VERSION,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body of `POST /repair`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResponse {
    pub passes: u32,
    pub fixed_code: String,
    pub final_diagnostics: Vec<Diagnostic>,
    /// Where `fixed_code` came from.
    pub source: Provenance,
    pub records: Vec<PassRecord>,
}

impl From<RepairOutcome> for RepairResponse {
    fn from(outcome: RepairOutcome) -> Self {
        Self {
            passes: outcome.passes,
            fixed_code: outcome.fixed_code,
            final_diagnostics: outcome.final_diagnostics,
            source: outcome.provenance,
            records: outcome.records,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/repair", post(repair))
        .route("/compile", post(compile))
        .route("/runtime/:id", get(runtime_bundle))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                info_span!(
                    "http",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %uuid::Uuid::new_v4(),
                )
            }),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "bundles": state.compile.bundles().len(),
        "sandbox": state.compile.sandbox().is_enabled(),
    }))
}

async fn repair(
    State(state): State<AppState>,
    body: Result<Json<RepairRequest>, JsonRejection>,
) -> Result<Json<RepairResponse>, ApiError> {
    let Json(request) = body?;
    let outcome = state.repair.run(request).await?;
    Ok(Json(outcome.into()))
}

async fn compile(
    State(state): State<AppState>,
    body: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Json<CompileOutput>, ApiError> {
    let Json(request) = body?;
    let output = state.compile.compile(request).await?;
    Ok(Json(output))
}

async fn runtime_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bundle = state
        .compile
        .bundles()
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("runtime bundle {id}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        bundle.code,
    ))
}
