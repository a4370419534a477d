//! HTTP routes over [`ResultAssembler`]: id validation in, JSON and status
//! codes out.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::assembler::ResultAssembler;
use crate::error::StoreError;
use crate::models::{DisciplineScore, DisciplineScoreResult};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Incorrect {field}: {raw}")]
    BadId { field: &'static str, raw: String },

    #[error("Discipline not exists: {0}")]
    DisciplineNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadId { .. } => StatusCode::BAD_REQUEST,
            ApiError::DisciplineNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(err) => {
                error!(error = %err, "store failure while serving request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn router(assembler: Arc<ResultAssembler>) -> Router {
    Router::new()
        .route(
            "/v1/students/{student_id}/disciplines",
            get(student_disciplines),
        )
        .route(
            "/v1/students/{student_id}/disciplines/{discipline_id}",
            get(student_discipline),
        )
        .route(
            "/v1/students/{student_id}/disciplines/{discipline_id}/scores/{lesson_id}",
            get(student_discipline_score),
        )
        .route("/healthcheck", get(healthcheck))
        .layer(TraceLayer::new_for_http())
        .with_state(assembler)
}

fn parse_id(field: &'static str, raw: &str) -> ApiResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadId {
            field,
            raw: raw.to_string(),
        }),
    }
}

async fn student_disciplines(
    State(assembler): State<Arc<ResultAssembler>>,
    Path(student_id): Path<String>,
) -> ApiResult<Json<Vec<DisciplineScoreResult>>> {
    let student_id = parse_id("student_id", &student_id)?;
    Ok(Json(assembler.discipline_results(student_id).await?))
}

async fn student_discipline(
    State(assembler): State<Arc<ResultAssembler>>,
    Path((student_id, discipline_id)): Path<(String, String)>,
) -> ApiResult<Json<DisciplineScoreResult>> {
    let student_id = parse_id("student_id", &student_id)?;
    let discipline_id = parse_id("discipline_id", &discipline_id)?;

    let result = assembler
        .discipline_result(student_id, discipline_id)
        .await?;
    if !result.is_found() {
        return Err(ApiError::DisciplineNotFound(discipline_id));
    }
    Ok(Json(result))
}

async fn student_discipline_score(
    State(assembler): State<Arc<ResultAssembler>>,
    Path((student_id, discipline_id, lesson_id)): Path<(String, String, String)>,
) -> ApiResult<Json<DisciplineScore>> {
    let student_id = parse_id("student_id", &student_id)?;
    let discipline_id = parse_id("discipline_id", &discipline_id)?;
    let lesson_id = parse_id("lesson_id", &lesson_id)?;

    let result = assembler
        .discipline_score(student_id, discipline_id, lesson_id)
        .await?;
    if !result.is_found() {
        return Err(ApiError::DisciplineNotFound(discipline_id));
    }
    Ok(Json(result))
}

async fn healthcheck() -> &'static str {
    "health"
}
