//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, Mode, RacePrompt, ReadingPassage, Submission};

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub online: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
  pub message: String,
}

#[derive(Deserialize)]
pub struct ModeIn {
  pub mode: Mode,
}

#[derive(Serialize)]
pub struct ModeOut {
  pub mode: Mode,
}

#[derive(Deserialize)]
pub struct GradeIn {
  pub grade: u8,
}

/// Snapshot of the current session, read by the view layer on load.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
  pub mode: Mode,
  pub grade: u8,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub active_score: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub writing_prompt: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub passage: Option<ReadingPassage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub race_prompt: Option<RacePrompt>,
}

#[derive(Serialize)]
pub struct TranscriptOut {
  pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingAnswerIn {
  pub id: u32,
  pub answer: String,
}

/// Work sample sent for evaluation. Reading and RACE use the mode's active
/// content item as context.
#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum EvaluateIn {
  FreeWrite { text: String },
  Reading { answers: Vec<ReadingAnswerIn> },
  Race { answer: String },
}

#[derive(Serialize)]
pub struct EvaluateOut {
  pub score: u8,
  pub feedback: String,
  /// True when the result was discarded because the active content changed
  /// while the evaluation was in flight.
  pub stale: bool,
}

#[derive(Debug, Deserialize)]
pub struct PassageQuery {
  pub grade: Option<u8>,
  pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GradeQuery {
  pub grade: Option<u8>,
}

#[derive(Serialize)]
pub struct WritingPromptOut {
  pub id: String,
  pub prompt: String,
}

/// Finalize the current work into the archive. Gated on the active score.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SubmitIn {
  FreeWrite { title: Option<String>, text: String },
  Reading { answers: Vec<ReadingAnswerIn> },
  Race { answer: String },
}

#[derive(Serialize)]
pub struct SubmitOut {
  pub submission: Submission,
}

#[derive(Serialize)]
pub struct SubmissionsOut {
  pub submissions: Vec<Submission>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
  pub days: Option<u32>,
}

#[derive(Deserialize)]
pub struct ApiKeyIn {
  pub api_key: Option<String>,
}

#[derive(Serialize)]
pub struct SettingsOut {
  pub online: bool,
}

#[derive(Serialize)]
pub struct OkOut {
  pub ok: bool,
}
