//! QuizForge · Question Generation & Verification Backend
//!
//! The core of this crate is the pipeline that asks a language model for
//! multiple-choice question candidates, subjects every candidate to strict
//! mathematical verification and correction, deduplicates against the stored
//! corpus, and persists survivors under a uniqueness guarantee. A small
//! review state machine moves persisted questions through
//! pending/approved/rejected afterwards.
//!
//! Module map:
//! - `normalize` / `verify` — answer canonicalization and the strict checks
//! - `llm` / `extract` — the model client and the parse-or-reject boundary
//! - `pipeline` — generation → pre-filter → correction → persistence
//! - `store` — the uniqueness-constrained question collection
//! - `review` — the pending/approved/rejected state machine
//! - `routes` / `protocol` — the HTTP surface

pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod protocol;
pub mod review;
pub mod routes;
pub mod store;
pub mod telemetry;
pub mod util;
pub mod verify;

pub use domain::{CandidateQuestion, ReviewStatus, StoredQuestion, Verdict};
pub use error::{PipelineError, ReviewError};
pub use pipeline::{run_generation, GenerationRequest, GenerationSummary};
pub use store::QuestionStore;
