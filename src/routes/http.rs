//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! pipeline and the review state machine, and map error kinds to status
//! codes. Each handler is instrumented and logs parameters and basic result
//! info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{error, info, instrument};

use crate::error::{PipelineError, ReviewError};
use crate::llm::HttpCollaborator;
use crate::pipeline::{run_generation, GenerationRequest};
use crate::protocol::*;
use crate::review;
use crate::routes::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(tag = %body.tag, class_level = body.class_level, topic = %body.topic_name))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> impl IntoResponse {
  let req = GenerationRequest {
    tag: body.tag,
    class_level: body.class_level,
    topic: body.topic_name,
    concept: body.concept,
    question_type: body.question_type.unwrap_or_default(),
    subject_id: body.subject_id,
  };

  let collaborator = match HttpCollaborator::new(body.llm.into()) {
    Ok(c) => c,
    Err(e) => return pipeline_failure(e),
  };

  match run_generation(&state.store, &collaborator, &state.prompts, &req).await {
    Ok(summary) => {
      info!(target: "pipeline", batch_id = %summary.batch_id, saved = summary.saved, "HTTP generate served");
      (StatusCode::OK, Json(GenerateOut::from(summary))).into_response()
    }
    Err(e) => pipeline_failure(e),
  }
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  match state.store.get(&id).await {
    Some(q) => (StatusCode::OK, Json(to_out(&q))).into_response(),
    None => review_failure(ReviewError::NotFound(id)),
  }
}

#[instrument(level = "info", skip(state, body), fields(%id, reviewer = %body.reviewer))]
pub async fn http_approve(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ApproveIn>,
) -> impl IntoResponse {
  match review::approve(&state.store, &id, &body.reviewer).await {
    Ok(q) => (StatusCode::OK, Json(ReviewOut { success: true, question: to_out(&q) })).into_response(),
    Err(e) => review_failure(e),
  }
}

#[instrument(level = "info", skip(state, body), fields(%id, reviewer = %body.reviewer))]
pub async fn http_reject(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<RejectIn>,
) -> impl IntoResponse {
  match review::reject(&state.store, &id, &body.reviewer, body.reason).await {
    Ok(q) => (StatusCode::OK, Json(ReviewOut { success: true, question: to_out(&q) })).into_response(),
    Err(e) => review_failure(e),
  }
}

#[instrument(level = "info", skip(state, body), fields(requested = body.ids.len(), reviewer = %body.reviewer))]
pub async fn http_bulk_approve(
  State(state): State<Arc<AppState>>,
  Json(body): Json<BulkApproveIn>,
) -> impl IntoResponse {
  let out = review::approve_many(&state.store, &body.ids, &body.reviewer).await;
  Json(BulkReviewOut { success: true, requested: out.requested, modified: out.modified })
}

#[instrument(level = "info", skip(state, body), fields(requested = body.ids.len(), reviewer = %body.reviewer))]
pub async fn http_bulk_reject(
  State(state): State<Arc<AppState>>,
  Json(body): Json<BulkRejectIn>,
) -> impl IntoResponse {
  let out = review::reject_many(&state.store, &body.ids, &body.reviewer, body.reason).await;
  Json(BulkReviewOut { success: true, requested: out.requested, modified: out.modified })
}

/// Map a pipeline failure to a status code + error envelope.
fn pipeline_failure(e: PipelineError) -> axum::response::Response {
  let status = match &e {
    PipelineError::Config(_) => StatusCode::BAD_REQUEST,
    PipelineError::Collaborator(_) => StatusCode::BAD_GATEWAY,
    PipelineError::MalformedResponse(_)
    | PipelineError::NoSurvivors
    | PipelineError::NothingVerified
    | PipelineError::AllDuplicates => StatusCode::UNPROCESSABLE_ENTITY,
  };
  error!(target: "pipeline", %status, error = %e, "generation run failed");
  (status, Json(ErrorOut { success: false, message: e.to_string() })).into_response()
}

/// Map a review failure to a status code + error envelope.
fn review_failure(e: ReviewError) -> axum::response::Response {
  let status = match &e {
    ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
    ReviewError::AlreadyApproved(_) | ReviewError::AlreadyRejected(_) => StatusCode::CONFLICT,
  };
  (status, Json(ErrorOut { success: false, message: e.to_string() })).into_response()
}
