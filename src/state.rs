//! Application state: the session store (per-mode transcripts, active
//! content, active score), the progress ledger, user settings, and the
//! scoring gateway.
//!
//! All mutation goes through explicit operations on `AppState`; the view
//! layer never touches the fields directly. Content swaps are atomic: the
//! new item, the cleared transcript, and the reset score land under one
//! write lock so no intermediate state is observable.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{
  load_agent_config_from_env, resolve_api_key, settings_path_from_env, Settings,
};
use crate::diag::DiagLog;
use crate::domain::{
  ChatMessage, Mode, ProgressLedger, RacePrompt, ReadingPassage, Role, StatKey, Submission,
};
use crate::gateway::{Evaluation, Gateway};
use crate::ledger::{storage_path_from_env, LedgerStore};
use crate::openai::OpenAI;

/// Submission is allowed only once the active score reaches this threshold.
/// Enforced by callers of `archive_submission`, not by storage.
pub const SUBMIT_THRESHOLD: u8 = 8;

/// An active content item; the variant determines which mode it belongs to.
#[derive(Clone, Debug)]
pub enum ContentItem {
  WritingPrompt(String),
  Passage(ReadingPassage),
  RacePrompt(RacePrompt),
}

impl ContentItem {
  pub fn mode(&self) -> Mode {
    match self {
      ContentItem::WritingPrompt(_) => Mode::FreeWrite,
      ContentItem::Passage(_) => Mode::Reading,
      ContentItem::RacePrompt(_) => Mode::Race,
    }
  }

  fn id(&self) -> String {
    match self {
      // Plain writing prompts have no intrinsic id; mint one so stale
      // evaluation results can still be matched against the slot.
      ContentItem::WritingPrompt(_) => uuid::Uuid::new_v4().to_string(),
      ContentItem::Passage(p) => p.id.clone(),
      ContentItem::RacePrompt(r) => r.id.clone(),
    }
  }
}

#[derive(Clone, Debug)]
struct ActiveSlot {
  id: String,
  item: ContentItem,
}

/// Fixed per-mode transcript slots; the exhaustive match in `slot` keeps
/// mode handling honest when a new mode is added.
#[derive(Default)]
struct Transcripts {
  free_write: Vec<ChatMessage>,
  reading: Vec<ChatMessage>,
  race: Vec<ChatMessage>,
  dashboard: Vec<ChatMessage>,
  submissions: Vec<ChatMessage>,
}

impl Transcripts {
  fn slot(&mut self, mode: Mode) -> &mut Vec<ChatMessage> {
    match mode {
      Mode::FreeWrite => &mut self.free_write,
      Mode::Reading => &mut self.reading,
      Mode::Race => &mut self.race,
      Mode::Dashboard => &mut self.dashboard,
      Mode::Submissions => &mut self.submissions,
    }
  }

  fn get(&self, mode: Mode) -> &Vec<ChatMessage> {
    match mode {
      Mode::FreeWrite => &self.free_write,
      Mode::Reading => &self.reading,
      Mode::Race => &self.race,
      Mode::Dashboard => &self.dashboard,
      Mode::Submissions => &self.submissions,
    }
  }
}

/// In-memory session: everything that is not persisted.
struct Session {
  current_mode: Mode,
  grade_level: u8,
  transcripts: Transcripts,
  free_write: Option<ActiveSlot>,
  reading: Option<ActiveSlot>,
  race: Option<ActiveSlot>,
  /// Shared slot: "whatever is currently being worked on". None = not yet
  /// evaluated; a value >= SUBMIT_THRESHOLD opens the archive gate.
  active_score: Option<u8>,
}

impl Session {
  fn new() -> Self {
    Self {
      current_mode: Mode::FreeWrite,
      grade_level: 4,
      transcripts: Transcripts::default(),
      free_write: None,
      reading: None,
      race: None,
      active_score: None,
    }
  }

  fn active_slot(&self, mode: Mode) -> Option<&ActiveSlot> {
    match mode {
      Mode::FreeWrite => self.free_write.as_ref(),
      Mode::Reading => self.reading.as_ref(),
      Mode::Race => self.race.as_ref(),
      Mode::Dashboard | Mode::Submissions => None,
    }
  }
}

#[derive(Clone)]
pub struct AppState {
  pub gateway: Arc<Gateway>,
  pub diag: Arc<DiagLog>,
  session: Arc<RwLock<Session>>,
  ledger: Arc<RwLock<LedgerStore>>,
  settings: Arc<RwLock<Settings>>,
  settings_path: Arc<PathBuf>,
}

impl AppState {
  /// Build state from env: load prompts/settings, resolve the credential,
  /// load the ledger, wire up the gateway.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let prompts = load_agent_config_from_env()
      .map(|c| c.prompts)
      .unwrap_or_default();

    let settings_path = settings_path_from_env();
    let settings = Settings::load(&settings_path);

    let client = resolve_api_key(&settings).and_then(OpenAI::new);
    if let Some(c) = &client {
      info!(target: "writing_buddy", base_url = %c.base_url, model = %c.model, "Model client enabled.");
    } else {
      info!(target: "writing_buddy", "Model client disabled (no API key). Offline fallbacks everywhere.");
    }

    let diag = Arc::new(DiagLog::new());
    // Mirror diagnostics events into the tracing output for log files.
    diag.subscribe(|entry| {
      tracing::debug!(target: "writing_buddy", level = ?entry.level, message = %entry.message, "diagnostics event");
    });
    let gateway = Arc::new(Gateway::new(prompts, Arc::clone(&diag), client));
    let ledger = LedgerStore::load(&storage_path_from_env());

    Self {
      gateway,
      diag,
      session: Arc::new(RwLock::new(Session::new())),
      ledger: Arc::new(RwLock::new(ledger)),
      settings: Arc::new(RwLock::new(settings)),
      settings_path: Arc::new(settings_path),
    }
  }

  pub fn with_parts(
    gateway: Arc<Gateway>,
    diag: Arc<DiagLog>,
    ledger: LedgerStore,
    settings: Settings,
    settings_path: PathBuf,
  ) -> Self {
    Self {
      gateway,
      diag,
      session: Arc::new(RwLock::new(Session::new())),
      ledger: Arc::new(RwLock::new(ledger)),
      settings: Arc::new(RwLock::new(settings)),
      settings_path: Arc::new(settings_path),
    }
  }

  // --- Navigation / session basics ---

  /// Switching modes does not clear any per-mode state.
  pub async fn set_mode(&self, mode: Mode) {
    self.session.write().await.current_mode = mode;
  }

  pub async fn current_mode(&self) -> Mode {
    self.session.read().await.current_mode
  }

  pub async fn set_grade_level(&self, grade: u8) {
    self.session.write().await.grade_level = grade;
  }

  pub async fn grade_level(&self) -> u8 {
    self.session.read().await.grade_level
  }

  // --- Active content / transcript / score ---

  /// Replace the active content for the item's mode. Atomic with clearing
  /// that mode's transcript and resetting the active score. Returns the
  /// content id evaluations must be tagged with.
  #[instrument(level = "debug", skip(self, item), fields(mode = ?item.mode()))]
  pub async fn set_active_content(&self, item: ContentItem) -> String {
    let mode = item.mode();
    let id = item.id();
    let slot = ActiveSlot { id: id.clone(), item };

    let mut session = self.session.write().await;
    match mode {
      Mode::FreeWrite => session.free_write = Some(slot),
      Mode::Reading => session.reading = Some(slot),
      Mode::Race => session.race = Some(slot),
      Mode::Dashboard | Mode::Submissions => {}
    }
    session.transcripts.slot(mode).clear();
    session.active_score = None;
    id
  }

  pub async fn active_passage(&self) -> Option<ReadingPassage> {
    let session = self.session.read().await;
    match session.active_slot(Mode::Reading).map(|s| &s.item) {
      Some(ContentItem::Passage(p)) => Some(p.clone()),
      _ => None,
    }
  }

  pub async fn active_race_prompt(&self) -> Option<RacePrompt> {
    let session = self.session.read().await;
    match session.active_slot(Mode::Race).map(|s| &s.item) {
      Some(ContentItem::RacePrompt(r)) => Some(r.clone()),
      _ => None,
    }
  }

  pub async fn active_writing_prompt(&self) -> Option<String> {
    let session = self.session.read().await;
    match session.active_slot(Mode::FreeWrite).map(|s| &s.item) {
      Some(ContentItem::WritingPrompt(t)) => Some(t.clone()),
      _ => None,
    }
  }

  /// Drop the active content after a successful archive: slot, transcript,
  /// and score all reset in one step, same as a swap.
  #[instrument(level = "debug", skip(self), fields(?mode))]
  pub async fn reset_active_content(&self, mode: Mode) {
    let mut session = self.session.write().await;
    match mode {
      Mode::FreeWrite => session.free_write = None,
      Mode::Reading => session.reading = None,
      Mode::Race => session.race = None,
      Mode::Dashboard | Mode::Submissions => {}
    }
    session.transcripts.slot(mode).clear();
    session.active_score = None;
  }

  pub async fn active_content_id(&self, mode: Mode) -> Option<String> {
    let session = self.session.read().await;
    session.active_slot(mode).map(|s| s.id.clone())
  }

  pub async fn record_message(&self, mode: Mode, message: ChatMessage) {
    self.session.write().await.transcripts.slot(mode).push(message);
  }

  pub async fn transcript(&self, mode: Mode) -> Vec<ChatMessage> {
    self.session.read().await.transcripts.get(mode).clone()
  }

  pub async fn clear_transcript(&self, mode: Mode) {
    self.session.write().await.transcripts.slot(mode).clear();
  }

  pub async fn set_active_score(&self, score: Option<u8>) {
    self.session.write().await.active_score = score;
  }

  pub async fn active_score(&self) -> Option<u8> {
    self.session.read().await.active_score
  }

  /// Apply an evaluation that targeted `content_id`. If the mode's active
  /// content changed while the request was in flight, the stale result is
  /// discarded and false is returned; nothing is recorded.
  #[instrument(level = "debug", skip(self, evaluation), fields(?mode, %content_id))]
  pub async fn apply_evaluation(
    &self,
    mode: Mode,
    content_id: &str,
    evaluation: &Evaluation,
  ) -> bool {
    let mut session = self.session.write().await;
    let still_active = session
      .active_slot(mode)
      .map(|slot| slot.id == content_id)
      .unwrap_or(false);
    if !still_active {
      warn!(target: "writing_buddy", ?mode, %content_id, "Discarding stale evaluation result");
      return false;
    }
    session.transcripts.slot(mode).push(ChatMessage::new(
      Role::Assistant,
      evaluation.feedback.clone(),
      Some(evaluation.score),
    ));
    session.active_score = Some(evaluation.score);
    true
  }

  // --- Ledger ---

  pub async fn increment_ledger(&self, key: StatKey, amount: u64) {
    self.ledger.write().await.increment(key, amount);
  }

  /// Precondition (caller-enforced): active score >= SUBMIT_THRESHOLD.
  pub async fn archive_submission(&self, submission: Submission) {
    self.ledger.write().await.archive(submission);
  }

  pub async fn ledger_snapshot(&self) -> ProgressLedger {
    self.ledger.read().await.ledger.clone()
  }

  // --- Settings / credential ---

  /// Store (or clear) the user-entered API key and rebuild the gateway
  /// client. The environment variable keeps priority over the stored key.
  #[instrument(level = "info", skip_all, fields(has_key = api_key.is_some()))]
  pub async fn update_api_key(&self, api_key: Option<String>) -> Result<(), String> {
    let mut settings = self.settings.write().await;
    settings.api_key = api_key.filter(|k| !k.trim().is_empty());
    settings.save(&self.settings_path)?;

    let client = resolve_api_key(&settings).and_then(OpenAI::new);
    let online = client.is_some();
    self.gateway.set_client(client).await;
    info!(target: "writing_buddy", online, "Credential updated");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;
  use crate::ledger::default_ledger;
  use crate::pool;

  fn test_state(dir: &tempfile::TempDir) -> AppState {
    let diag = Arc::new(DiagLog::new());
    let gateway = Arc::new(Gateway::new(Prompts::default(), Arc::clone(&diag), None));
    let ledger = LedgerStore::with_ledger(
      dir.path().join("ledger.json"),
      default_ledger(crate::ledger::today_local()),
    );
    AppState::with_parts(gateway, diag, ledger, Settings::default(), dir.path().join("settings.toml"))
  }

  fn user_msg(text: &str) -> ChatMessage {
    ChatMessage::new(Role::User, text, None)
  }

  #[tokio::test]
  async fn content_swap_clears_transcript_and_score_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    state.record_message(Mode::Reading, user_msg("first try")).await;
    state.set_active_score(Some(9)).await;

    let passage = pool::reading_passages().remove(0);
    state.set_active_content(ContentItem::Passage(passage.clone())).await;

    assert!(state.transcript(Mode::Reading).await.is_empty());
    assert_eq!(state.active_score().await, None);
    assert_eq!(state.active_passage().await.unwrap().id, passage.id);
  }

  #[tokio::test]
  async fn mode_switch_keeps_per_mode_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    state.record_message(Mode::FreeWrite, user_msg("my story")).await;
    state.set_mode(Mode::Dashboard).await;
    state.set_mode(Mode::FreeWrite).await;

    assert_eq!(state.transcript(Mode::FreeWrite).await.len(), 1);
  }

  #[tokio::test]
  async fn stale_evaluation_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let old_id = state
      .set_active_content(ContentItem::RacePrompt(pool::race_prompts().remove(0)))
      .await;
    // Content is replaced while the evaluation is "in flight".
    state
      .set_active_content(ContentItem::RacePrompt(pool::race_prompts().remove(1)))
      .await;

    let eval = Evaluation { score: 9, feedback: "late".into() };
    let applied = state.apply_evaluation(Mode::Race, &old_id, &eval).await;

    assert!(!applied);
    assert_eq!(state.active_score().await, None);
    assert!(state.transcript(Mode::Race).await.is_empty());
  }

  #[tokio::test]
  async fn current_evaluation_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let id = state
      .set_active_content(ContentItem::WritingPrompt("Write about rain.".into()))
      .await;
    let eval = Evaluation { score: 8, feedback: "**Lovely!**".into() };
    let applied = state.apply_evaluation(Mode::FreeWrite, &id, &eval).await;

    assert!(applied);
    assert_eq!(state.active_score().await, Some(8));
    let transcript = state.transcript(Mode::FreeWrite).await;
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].score, Some(8));
    assert!(matches!(transcript[0].role, Role::Assistant));
  }

  #[tokio::test]
  async fn each_mode_has_its_own_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    state.record_message(Mode::Reading, user_msg("reading q")).await;
    state.record_message(Mode::Race, user_msg("race answer")).await;
    state.clear_transcript(Mode::Reading).await;

    assert!(state.transcript(Mode::Reading).await.is_empty());
    assert_eq!(state.transcript(Mode::Race).await.len(), 1);
  }
}
