//! Minimal chat-completions client for the generation and correction calls.
//!
//! We only call chat.completions with a system + user message pair and expect
//! JSON back. Calls are instrumented and log model names, latencies, and
//! response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.
//!
//! The `Collaborator` trait is the seam the pipeline talks through; tests
//! substitute scripted implementations for it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{Prompts, EXISTING_SAMPLE_LIMIT, GENERATION_COUNT};
use crate::domain::CandidateQuestion;
use crate::error::PipelineError;
use crate::pipeline::GenerationRequest;
use crate::util::fill_template;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the question-generating model lives. Arrives with every inbound
/// request; a blank field is a configuration error before any I/O happens.
#[derive(Clone, Debug, Deserialize)]
pub struct LlmConnection {
  pub endpoint: String,
  pub api_key: String,
  /// Model name, or deployment name for Azure-style endpoints.
  pub deployment: String,
  /// Present only for Azure-style endpoints.
  #[serde(default)]
  pub api_version: Option<String>,
}

impl LlmConnection {
  pub fn validate(&self) -> Result<(), PipelineError> {
    for (name, value) in [
      ("endpoint", &self.endpoint),
      ("apiKey", &self.api_key),
      ("deployment", &self.deployment),
    ] {
      if value.trim().is_empty() {
        return Err(PipelineError::Config(format!("missing field: {name}")));
      }
    }
    Ok(())
  }
}

/// The external model service, as the pipeline sees it: one blocking chat
/// round trip in, raw text out.
#[async_trait]
pub trait Collaborator: Send + Sync {
  async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, PipelineError>;
}

/// Production `Collaborator` over an OpenAI-compatible HTTP API.
pub struct HttpCollaborator {
  client: reqwest::Client,
  conn: LlmConnection,
}

impl HttpCollaborator {
  pub fn new(conn: LlmConnection) -> Result<Self, PipelineError> {
    conn.validate()?;
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| PipelineError::Collaborator(e.to_string()))?;
    Ok(Self { client, conn })
  }

  fn chat_url(&self) -> String {
    let base = self.conn.endpoint.trim_end_matches('/');
    match &self.conn.api_version {
      Some(v) => format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        base, self.conn.deployment, v
      ),
      None => format!("{}/chat/completions", base),
    }
  }
}

#[async_trait]
impl Collaborator for HttpCollaborator {
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.conn.deployment, user_len = user.len()))]
  async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, PipelineError> {
    let req = ChatCompletionRequest {
      model: self.conn.deployment.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
    };

    let mut builder = self
      .client
      .post(self.chat_url())
      .header(USER_AGENT, "quizforge-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    // Azure-style endpoints authenticate with api-key, OpenAI-style with Bearer.
    builder = if self.conn.api_version.is_some() {
      builder.header("api-key", &self.conn.api_key)
    } else {
      builder.header(AUTHORIZATION, format!("Bearer {}", self.conn.api_key))
    };

    let start = std::time::Instant::now();
    let res = builder
      .json(&req)
      .send()
      .await
      .map_err(|e| PipelineError::Collaborator(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      error!(target: "pipeline", %status, error = %crate::util::trunc_for_log(&msg, 200), "model call failed");
      return Err(PipelineError::Collaborator(format!("HTTP {status}: {msg}")));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| PipelineError::Collaborator(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "model usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "model response received");

    if text.is_empty() {
      return Err(PipelineError::MalformedResponse("model returned an empty message".into()));
    }
    Ok(text)
  }
}

/// Assemble the "generate N candidates" prompt pair.
pub fn build_generation_prompt(
  prompts: &Prompts,
  req: &GenerationRequest,
  existing_texts: &[String],
) -> (String, String) {
  let existing = if existing_texts.is_empty() {
    "(none yet)".to_string()
  } else {
    existing_texts
      .iter()
      .take(EXISTING_SAMPLE_LIMIT)
      .map(|t| format!("- {t}"))
      .collect::<Vec<_>>()
      .join("\n")
  };
  let count = GENERATION_COUNT.to_string();
  let class_level = req.class_level.to_string();
  let user = fill_template(
    &prompts.generation_user_template,
    &[
      ("count", count.as_str()),
      ("class_level", class_level.as_str()),
      ("tag", req.tag.as_str()),
      ("topic", req.topic.as_str()),
      ("concept", req.concept.as_deref().unwrap_or("(unspecified)")),
      ("existing", existing.as_str()),
    ],
  );
  (prompts.generation_system.clone(), user)
}

/// Assemble the "verify/correct this batch" prompt pair. Candidates are
/// serialized with their index so verdicts can be keyed back.
pub fn build_correction_prompt(
  prompts: &Prompts,
  candidates: &[CandidateQuestion],
) -> (String, String) {
  let indexed: Vec<serde_json::Value> = candidates
    .iter()
    .enumerate()
    .map(|(i, c)| {
      serde_json::json!({
        "index": i,
        "question": c.question,
        "options": c.options,
        "correct_answer": c.correct_answer,
        "final_answer": c.final_answer,
      })
    })
    .collect();
  let questions =
    serde_json::to_string_pretty(&indexed).unwrap_or_else(|_| "[]".to_string());
  let count = candidates.len().to_string();
  let user = fill_template(
    &prompts.correction_user_template,
    &[("count", count.as_str()), ("questions", questions.as_str())],
  );
  (prompts.correction_system.clone(), user)
}

/// One verdict from the correction call, keyed by candidate index.
#[derive(Clone, Debug, Deserialize)]
pub struct CorrectionVerdict {
  pub index: usize,
  #[serde(default, alias = "isCorrect")]
  pub is_correct: bool,
  #[serde(default)]
  pub corrected: Option<CandidateQuestion>,
  #[serde(default)]
  pub reason: Option<String>,
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
}
#[derive(Deserialize)]
struct Usage {
  #[serde(default)]
  prompt_tokens: Option<u32>,
  #[serde(default)]
  completion_tokens: Option<u32>,
  #[serde(default)]
  total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn conn(api_version: Option<&str>) -> LlmConnection {
    LlmConnection {
      endpoint: "https://models.example.com/v1".into(),
      api_key: "k".into(),
      deployment: "gpt-4o".into(),
      api_version: api_version.map(Into::into),
    }
  }

  #[test]
  fn blank_connection_fields_are_config_errors() {
    let mut c = conn(None);
    c.api_key = "  ".into();
    assert!(matches!(c.validate(), Err(PipelineError::Config(_))));
    assert!(conn(None).validate().is_ok());
  }

  #[test]
  fn url_shape_follows_api_version() {
    let plain = HttpCollaborator::new(conn(None)).expect("client");
    assert_eq!(plain.chat_url(), "https://models.example.com/v1/chat/completions");

    let azure = HttpCollaborator::new(conn(Some("2024-02-01"))).expect("client");
    assert_eq!(
      azure.chat_url(),
      "https://models.example.com/v1/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
    );
  }

  #[test]
  fn generation_prompt_lists_existing_texts() {
    let prompts = Prompts::default();
    let req = GenerationRequest {
      tag: "ALG-3".into(),
      class_level: 8,
      topic: "Linear equations".into(),
      concept: None,
      question_type: Default::default(),
      subject_id: None,
    };
    let (_sys, user) = build_generation_prompt(&prompts, &req, &["what is x".into()]);
    assert!(user.contains("- what is x"));
    assert!(user.contains("class 8"));
    assert!(user.contains("ALG-3"));
  }

  #[test]
  fn correction_verdicts_parse_leniently() {
    let raw = r#"[{"index":0,"isCorrect":true},{"index":1,"is_correct":false,"reason":"sum is wrong"}]"#;
    let v: Vec<CorrectionVerdict> = serde_json::from_str(raw).expect("parse");
    assert!(v[0].is_correct);
    assert_eq!(v[1].reason.as_deref(), Some("sum is wrong"));
  }
}
