//! Progress ledger: streak/date-rollover accounting, derived activity
//! views, and write-through JSON persistence.
//!
//! The ledger is the only persisted entity. It is loaded once at startup
//! (corrupt or missing payloads fall back to zeroed defaults) and written
//! back after every mutation. Persistence failures are logged and swallowed;
//! an increment never fails from the caller's point of view.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::domain::{DailyStats, ProgressLedger, StatKey, Submission};

pub const DEFAULT_STORAGE_PATH: &str = "./data/writing-buddy-storage-v1.json";

pub fn storage_path_from_env() -> PathBuf {
  std::env::var("STORAGE_PATH")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH))
}

fn date_key(d: NaiveDate) -> String {
  d.format("%Y-%m-%d").to_string()
}

pub fn today_local() -> NaiveDate {
  Local::now().date_naive()
}

/// Structurally valid empty ledger: streak 1, today as last active, empty
/// history and archive.
pub fn default_ledger(today: NaiveDate) -> ProgressLedger {
  ProgressLedger {
    words_written: 0,
    stories_read: 0,
    race_prompts_completed: 0,
    stories_written: 0,
    streak_days: 1,
    last_active_date: date_key(today),
    history: Default::default(),
    submissions: Vec::new(),
  }
}

/// Owns the ledger plus its storage location.
pub struct LedgerStore {
  path: PathBuf,
  pub ledger: ProgressLedger,
}

impl LedgerStore {
  /// Load from `path`. Missing file, unreadable file, or unparsable JSON all
  /// resolve to the default ledger; missing optional fields are defaulted by
  /// serde and backfilled here.
  #[instrument(level = "info", skip_all, fields(path = %path.display()))]
  pub fn load(path: &Path) -> Self {
    let today = today_local();
    let ledger = match std::fs::read_to_string(path) {
      Ok(raw) => match serde_json::from_str::<ProgressLedger>(&raw) {
        Ok(mut ledger) => {
          if ledger.last_active_date.is_empty() {
            ledger.last_active_date = date_key(today);
          }
          if ledger.streak_days == 0 {
            ledger.streak_days = 1;
          }
          info!(target: "ledger", submissions = ledger.submissions.len(), days = ledger.history.len(), "Loaded progress ledger");
          ledger
        }
        Err(e) => {
          error!(target: "ledger", error = %e, "Stored ledger is corrupt; resetting to defaults");
          default_ledger(today)
        }
      },
      Err(_) => {
        info!(target: "ledger", "No stored ledger; starting fresh");
        default_ledger(today)
      }
    };
    Self { path: path.to_path_buf(), ledger }
  }

  pub fn with_ledger(path: PathBuf, ledger: ProgressLedger) -> Self {
    Self { path, ledger }
  }

  /// Bump one counter for today's local date and persist.
  pub fn increment(&mut self, key: StatKey, amount: u64) {
    self.increment_on(key, amount, today_local());
  }

  /// Date-explicit variant of `increment`.
  ///
  /// Rollover rules:
  /// - last active == today: streak unchanged
  /// - last active == yesterday: streak += 1
  /// - anything else (gap >= 2 days, fresh ledger): streak = 1
  ///
  /// `last_active_date` is rewritten unconditionally; the per-day bucket is
  /// created lazily; bucket and aggregate move in the same step so they
  /// cannot drift apart.
  #[instrument(level = "info", skip(self))]
  pub fn increment_on(&mut self, key: StatKey, amount: u64, today: NaiveDate) {
    let today_key = date_key(today);
    if self.ledger.last_active_date != today_key {
      let yesterday = today.pred_opt().map(date_key);
      if yesterday.as_deref() == Some(self.ledger.last_active_date.as_str()) {
        self.ledger.streak_days += 1;
      } else {
        self.ledger.streak_days = 1;
      }
    }
    self.ledger.last_active_date = today_key.clone();

    self
      .ledger
      .history
      .entry(today_key)
      .or_insert_with(DailyStats::default)
      .bump(key, amount);
    self.ledger.bump(key, amount);

    self.persist();
  }

  /// Prepend a finalized submission (newest first) and persist.
  ///
  /// Precondition (caller-enforced): the active score for the submitted work
  /// was >= 8. Storage does not re-check the gate.
  #[instrument(level = "info", skip(self, submission), fields(id = %submission.id, kind = ?submission.kind, score = submission.score))]
  pub fn archive(&mut self, submission: Submission) {
    self.ledger.submissions.insert(0, submission);
    self.persist();
  }

  /// Write-through persistence. Failures are logged, never propagated.
  fn persist(&self) {
    if let Some(parent) = self.path.parent() {
      if let Err(e) = std::fs::create_dir_all(parent) {
        warn!(target: "ledger", error = %e, "Could not create storage directory; skipping persist");
        return;
      }
    }
    match serde_json::to_string_pretty(&self.ledger) {
      Ok(json) => {
        if let Err(e) = std::fs::write(&self.path, json) {
          warn!(target: "ledger", path = %self.path.display(), error = %e, "Ledger write failed; state kept in memory");
        }
      }
      Err(e) => {
        error!(target: "ledger", error = %e, "Ledger serialization failed");
      }
    }
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct DayActivity {
  pub date: String,
  pub active: bool,
}

/// Last 30 calendar days including `today`, oldest first. A day is active
/// iff its history bucket exists with at least one moved counter.
pub fn activity_grid(ledger: &ProgressLedger, today: NaiveDate) -> Vec<DayActivity> {
  (0..30)
    .rev()
    .filter_map(|back| today.checked_sub_days(chrono::Days::new(back)))
    .map(|day| {
      let key = date_key(day);
      let active = ledger.history.get(&key).map(DailyStats::is_active).unwrap_or(false);
      DayActivity { date: key, active }
    })
    .collect()
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSummary {
  pub days: u32,
  pub words_written: u64,
  pub items_completed: u64,
}

/// Sums over the trailing `days` calendar days including `today`; missing
/// days contribute zero. `items_completed` combines stories read, stories
/// written, and RACE prompts completed.
pub fn range_summary(ledger: &ProgressLedger, today: NaiveDate, days: u32) -> RangeSummary {
  let mut words_written = 0;
  let mut items_completed = 0;
  for back in 0..days {
    let Some(day) = today.checked_sub_days(chrono::Days::new(back as u64)) else {
      continue;
    };
    if let Some(stats) = ledger.history.get(&date_key(day)) {
      words_written += stats.words_written;
      items_completed += stats.stories_read + stats.stories_written + stats.race_prompts_completed;
    }
  }
  RangeSummary { days, words_written, items_completed }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::SubmissionKind;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
  }

  fn store_at(dir: &tempfile::TempDir, today: NaiveDate) -> LedgerStore {
    LedgerStore::with_ledger(dir.path().join("ledger.json"), default_ledger(today))
  }

  fn sub(score: u8) -> Submission {
    Submission {
      id: uuid::Uuid::new_v4().to_string(),
      date: "2024-01-01".into(),
      kind: SubmissionKind::FreeWrite,
      title: "My Story".into(),
      content: "Once upon a time".into(),
      score,
      feedback: None,
      reading_questions: None,
      race_prompt: None,
    }
  }

  #[test]
  fn fresh_ledger_scenario_matches_reference() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 1, 1));

    store.increment_on(StatKey::WordsWritten, 10, d(2024, 1, 1));
    assert_eq!(store.ledger.words_written, 10);
    assert_eq!(store.ledger.history["2024-01-01"].words_written, 10);
    assert_eq!(store.ledger.last_active_date, "2024-01-01");
    assert_eq!(store.ledger.streak_days, 1);

    store.increment_on(StatKey::WordsWritten, 5, d(2024, 1, 2));
    assert_eq!(store.ledger.streak_days, 2);

    store.increment_on(StatKey::WordsWritten, 5, d(2024, 1, 5));
    assert_eq!(store.ledger.streak_days, 1);
    assert_eq!(store.ledger.last_active_date, "2024-01-05");
  }

  #[test]
  fn same_day_repeats_leave_streak_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 3, 1));
    store.increment_on(StatKey::StoriesRead, 1, d(2024, 3, 2));
    let streak = store.ledger.streak_days;
    store.increment_on(StatKey::StoriesRead, 1, d(2024, 3, 2));
    store.increment_on(StatKey::WordsWritten, 20, d(2024, 3, 2));
    assert_eq!(store.ledger.streak_days, streak);
    assert_eq!(store.ledger.last_active_date, "2024-03-02");
  }

  #[test]
  fn aggregate_and_history_never_diverge() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 6, 10));
    for amount in [3, 7, 1, 9] {
      store.increment_on(StatKey::WordsWritten, amount, d(2024, 6, 10));
    }
    assert_eq!(store.ledger.get(StatKey::WordsWritten), 20);
    assert_eq!(store.ledger.history["2024-06-10"].get(StatKey::WordsWritten), 20);
  }

  #[test]
  fn streak_survives_month_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 1, 31));
    store.increment_on(StatKey::StoriesWritten, 1, d(2024, 1, 31));
    store.increment_on(StatKey::StoriesWritten, 1, d(2024, 2, 1));
    assert_eq!(store.ledger.streak_days, 2);
  }

  #[test]
  fn submissions_are_prepend_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 1, 1));
    let first = sub(8);
    let second = sub(10);
    store.archive(first.clone());
    store.archive(second.clone());
    assert_eq!(store.ledger.submissions[0].id, second.id);
    assert_eq!(store.ledger.submissions[1].id, first.id);
  }

  #[test]
  fn persisted_ledger_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    {
      let mut store = LedgerStore::with_ledger(path.clone(), default_ledger(d(2024, 1, 1)));
      store.increment_on(StatKey::RacePromptsCompleted, 2, d(2024, 1, 1));
      store.archive(sub(9));
    }
    let reloaded = LedgerStore::load(&path);
    assert_eq!(reloaded.ledger.race_prompts_completed, 2);
    assert_eq!(reloaded.ledger.submissions.len(), 1);
    assert_eq!(reloaded.ledger.history["2024-01-01"].race_prompts_completed, 2);
    assert_eq!(reloaded.ledger.last_active_date, "2024-01-01");
  }

  #[test]
  fn corrupt_payload_resets_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, "{not json at all").unwrap();
    let store = LedgerStore::load(&path);
    assert_eq!(store.ledger.streak_days, 1);
    assert!(store.ledger.history.is_empty());
    assert!(store.ledger.submissions.is_empty());
  }

  #[test]
  fn missing_optional_fields_are_defaulted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, r#"{"wordsWritten": 42, "streakDays": 3}"#).unwrap();
    let store = LedgerStore::load(&path);
    assert_eq!(store.ledger.words_written, 42);
    assert_eq!(store.ledger.streak_days, 3);
    assert!(store.ledger.history.is_empty());
    assert!(store.ledger.submissions.is_empty());
    assert!(!store.ledger.last_active_date.is_empty());
  }

  #[test]
  fn activity_grid_marks_only_touched_days() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 5, 1));
    store.increment_on(StatKey::WordsWritten, 1, d(2024, 5, 3));
    store.increment_on(StatKey::StoriesRead, 1, d(2024, 5, 10));

    let grid = activity_grid(&store.ledger, d(2024, 5, 30));
    assert_eq!(grid.len(), 30);
    assert_eq!(grid.last().unwrap().date, "2024-05-30");
    let active: Vec<&str> = grid
      .iter()
      .filter(|day| day.active)
      .map(|day| day.date.as_str())
      .collect();
    assert_eq!(active, vec!["2024-05-03", "2024-05-10"]);
  }

  #[test]
  fn range_summary_sums_trailing_window() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_at(&dir, d(2024, 5, 1));
    store.increment_on(StatKey::WordsWritten, 100, d(2024, 5, 1));
    store.increment_on(StatKey::StoriesRead, 1, d(2024, 5, 1));
    store.increment_on(StatKey::WordsWritten, 50, d(2024, 5, 6));
    store.increment_on(StatKey::RacePromptsCompleted, 1, d(2024, 5, 6));

    let week = range_summary(&store.ledger, d(2024, 5, 7), 7);
    assert_eq!(week.words_written, 150);
    assert_eq!(week.items_completed, 2);

    // The 5/1 bucket falls outside a 2-day window ending 5/7.
    let short = range_summary(&store.ledger, d(2024, 5, 7), 2);
    assert_eq!(short.words_written, 50);
    assert_eq!(short.items_completed, 1);
  }
}
