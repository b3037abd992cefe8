//! Prompt configuration: compiled-in defaults with an optional TOML override.
//!
//! Set PROMPTS_CONFIG_PATH to a TOML file to tune prompt tone/structure
//! without rebuilding. Model *credentials* are never read from here — they
//! arrive per request, which keeps the collaborator configuration explicit
//! instead of ambient.

use serde::Deserialize;
use tracing::{error, info};

/// How many candidates one generation request asks for.
pub const GENERATION_COUNT: usize = 10;
/// How many existing question texts we pass back as avoid-context.
pub const EXISTING_SAMPLE_LIMIT: usize = 5;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts for the two model round trips: candidate generation and batch
/// correction. Templates use `{key}` placeholders (see `util::fill_template`).
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub generation_system: String,
  pub generation_user_template: String,
  pub correction_system: String,
  pub correction_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: format!(
        "You are an exam question author for school students. \
         Respond ONLY with a strict JSON array of exactly {GENERATION_COUNT} question objects. \
         Each object has fields: question (string), options (array of exactly 4 strings), \
         correct_answer (0-based index), final_answer (string equal to the correct option), \
         difficulty (\"easy\"|\"medium\"|\"hard\"), topic, concept, tag, has_math (boolean). \
         Difficulty mix: about 30% easy, 40% medium, 30% hard. \
         Spread correct_answer across all four positions; do NOT cluster answers at index 0. \
         No prose, no markdown fences."
      ),
      generation_user_template:
        "Generate {count} multiple-choice questions for class {class_level}.\n\
         Tag: {tag}\nTopic: {topic}\nConcept: {concept}\n\n\
         Do NOT duplicate any of these already existing questions:\n{existing}"
          .into(),
      correction_system:
        "You are a strict mathematics reviewer. For EACH question below: \
         re-derive the answer step by step, normalize it, and compare against the options. \
         Respond ONLY with a strict JSON array of verdict objects \
         {index, is_correct (boolean), corrected (full question object, only when you fixed it), \
         reason (string, only when invalid)}. \
         A corrected question must carry all 4 options, the fixed correct_answer index, \
         and a final_answer equal to the option at that index. \
         If a question cannot be fixed, set is_correct=false and give a reason. No prose."
          .into(),
      correction_user_template: "Verify these {count} questions:\n{questions}".into(),
    }
  }
}

/// Attempt to load `PromptConfig` from PROMPTS_CONFIG_PATH. On any
/// parsing/IO error, returns None and the defaults stay in effect.
pub fn load_prompt_config_from_env() -> Option<PromptConfig> {
  let path = std::env::var("PROMPTS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizforge_backend", %path, "Loaded prompt config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizforge_backend", %path, error = %e, "Failed to parse TOML prompt config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizforge_backend", %path, error = %e, "Failed to read TOML prompt config");
      None
    }
  }
}
