//! Domain models: practice modes, chat messages, content items, and the
//! persisted progress ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which practice activity (or navigation-only screen) the user is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
  FreeWrite,
  Reading,
  Race,
  Dashboard,
  Submissions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  User,
  Assistant,
}

/// One entry in a per-mode chat transcript. Immutable once recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id: String,
  pub role: Role,
  pub content: String,
  /// Unix milliseconds.
  pub timestamp: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub score: Option<u8>,
}

impl ChatMessage {
  pub fn new(role: Role, content: impl Into<String>, score: Option<u8>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      role,
      content: content.into(),
      timestamp: chrono::Utc::now().timestamp_millis(),
      score,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadingQuestion {
  pub id: u32,
  pub text: String,
}

/// A passage with comprehension questions, generated or pool-selected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadingPassage {
  pub id: String,
  pub grade: u8,
  pub title: String,
  pub content: String,
  pub questions: Vec<ReadingQuestion>,
}

/// A short text plus an open-ended question answered with the RACE strategy
/// (Restate, Answer, Cite, Explain).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RacePrompt {
  pub id: String,
  pub grade: u8,
  pub title: String,
  pub content: String,
  pub prompt: String,
}

/// Which archive a finalized submission belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionKind {
  FreeWrite,
  Reading,
  Race,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnsweredQuestion {
  pub id: u32,
  pub text: String,
  pub answer: String,
}

/// Archived work. Created only after the active score cleared the gate;
/// never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
  pub id: String,
  /// `YYYY-MM-DD`, local time.
  pub date: String,
  pub kind: SubmissionKind,
  pub title: String,
  pub content: String,
  pub score: u8,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub feedback: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reading_questions: Option<Vec<AnsweredQuestion>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub race_prompt: Option<String>,
}

/// Counter keys shared by the aggregate ledger and the per-day buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatKey {
  WordsWritten,
  StoriesRead,
  RacePromptsCompleted,
  StoriesWritten,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
  #[serde(default)]
  pub words_written: u64,
  #[serde(default)]
  pub stories_read: u64,
  #[serde(default)]
  pub race_prompts_completed: u64,
  #[serde(default)]
  pub stories_written: u64,
}

impl DailyStats {
  pub fn bump(&mut self, key: StatKey, amount: u64) {
    match key {
      StatKey::WordsWritten => self.words_written += amount,
      StatKey::StoriesRead => self.stories_read += amount,
      StatKey::RacePromptsCompleted => self.race_prompts_completed += amount,
      StatKey::StoriesWritten => self.stories_written += amount,
    }
  }

  pub fn get(&self, key: StatKey) -> u64 {
    match key {
      StatKey::WordsWritten => self.words_written,
      StatKey::StoriesRead => self.stories_read,
      StatKey::RacePromptsCompleted => self.race_prompts_completed,
      StatKey::StoriesWritten => self.stories_written,
    }
  }

  /// A day counts as active when any counter moved.
  pub fn is_active(&self) -> bool {
    self.words_written > 0
      || self.stories_read > 0
      || self.race_prompts_completed > 0
      || self.stories_written > 0
  }
}

/// The sole persisted entity: running totals, streak, per-day history, and
/// the submission archive (newest first).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressLedger {
  #[serde(default)]
  pub words_written: u64,
  #[serde(default)]
  pub stories_read: u64,
  #[serde(default)]
  pub race_prompts_completed: u64,
  #[serde(default)]
  pub stories_written: u64,
  #[serde(default = "default_streak")]
  pub streak_days: u32,
  /// `YYYY-MM-DD`; defaulted to today when absent in the stored payload.
  #[serde(default)]
  pub last_active_date: String,
  #[serde(default)]
  pub history: BTreeMap<String, DailyStats>,
  #[serde(default)]
  pub submissions: Vec<Submission>,
}

fn default_streak() -> u32 {
  1
}

impl ProgressLedger {
  pub fn bump(&mut self, key: StatKey, amount: u64) {
    match key {
      StatKey::WordsWritten => self.words_written += amount,
      StatKey::StoriesRead => self.stories_read += amount,
      StatKey::RacePromptsCompleted => self.race_prompts_completed += amount,
      StatKey::StoriesWritten => self.stories_written += amount,
    }
  }

  pub fn get(&self, key: StatKey) -> u64 {
    match key {
      StatKey::WordsWritten => self.words_written,
      StatKey::StoriesRead => self.stories_read,
      StatKey::RacePromptsCompleted => self.race_prompts_completed,
      StatKey::StoriesWritten => self.stories_written,
    }
  }
}
