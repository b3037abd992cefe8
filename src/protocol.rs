//! Public request/response structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and clients independently.

use serde::{Deserialize, Serialize};

use crate::domain::{QuestionType, ReviewStatus, StoredQuestion};
use crate::llm::LlmConnection;
use crate::pipeline::GenerationSummary;

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
  pub tag: String,
  #[serde(rename = "classLevel")]
  pub class_level: u32,
  #[serde(rename = "topicName")]
  pub topic_name: String,
  #[serde(default)]
  pub concept: Option<String>,
  #[serde(default, rename = "questionType")]
  pub question_type: Option<QuestionType>,
  #[serde(default, rename = "subjectId")]
  pub subject_id: Option<String>,
  pub llm: LlmConnectionIn,
}

/// Connection parameters as they arrive on the wire. Converted (not
/// validated) here; blank fields surface as configuration errors in the
/// pipeline, before any I/O.
#[derive(Debug, Deserialize)]
pub struct LlmConnectionIn {
  #[serde(default)]
  pub endpoint: String,
  #[serde(default, rename = "apiKey")]
  pub api_key: String,
  #[serde(default)]
  pub deployment: String,
  #[serde(default, rename = "apiVersion")]
  pub api_version: Option<String>,
}

impl From<LlmConnectionIn> for LlmConnection {
  fn from(c: LlmConnectionIn) -> Self {
    LlmConnection {
      endpoint: c.endpoint,
      api_key: c.api_key,
      deployment: c.deployment,
      api_version: c.api_version,
    }
  }
}

/// Public fields of a stored question. Internal review metadata (who
/// approved/rejected and when) stays out of the generation response.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
  pub id: String,
  pub question: String,
  pub options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  pub correct_answer: usize,
  pub difficulty: String,
  pub status: ReviewStatus,
  #[serde(rename = "batchId")]
  pub batch_id: String,
}

pub fn to_out(q: &StoredQuestion) -> QuestionOut {
  QuestionOut {
    id: q.id.clone(),
    question: q.question.clone(),
    options: q.options.clone(),
    correct_answer: q.correct_answer,
    difficulty: q.difficulty.clone(),
    status: q.status,
    batch_id: q.batch_id.clone(),
  }
}

#[derive(Debug, Serialize)]
pub struct GenerateOut {
  pub success: bool,
  #[serde(rename = "batchId")]
  pub batch_id: String,
  #[serde(rename = "totalCandidates")]
  pub total_candidates: usize,
  pub valid: usize,
  pub corrected: usize,
  pub invalid: usize,
  pub saved: usize,
  pub questions: Vec<QuestionOut>,
}

impl From<GenerationSummary> for GenerateOut {
  fn from(s: GenerationSummary) -> Self {
    GenerateOut {
      success: true,
      batch_id: s.batch_id,
      total_candidates: s.total_candidates,
      valid: s.valid,
      corrected: s.corrected,
      invalid: s.invalid,
      saved: s.saved,
      questions: s.questions.iter().map(to_out).collect(),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApproveIn {
  pub reviewer: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectIn {
  pub reviewer: String,
  #[serde(default)]
  pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkApproveIn {
  pub ids: Vec<String>,
  pub reviewer: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkRejectIn {
  pub ids: Vec<String>,
  pub reviewer: String,
  #[serde(default)]
  pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewOut {
  pub success: bool,
  pub question: QuestionOut,
}

#[derive(Debug, Serialize)]
pub struct BulkReviewOut {
  pub success: bool,
  pub requested: usize,
  pub modified: usize,
}

/// Error envelope shared by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorOut {
  pub success: bool,
  pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}
