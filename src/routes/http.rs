//! HTTP endpoint handlers. These are thin wrappers over the session store
//! and scoring gateway; each handler is instrumented and logs basic result
//! info.

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::domain::{
  AnsweredQuestion, ChatMessage, Mode, Role, StatKey, Submission, SubmissionKind,
};
use crate::gateway::{EvalContext, Evaluation};
use crate::ledger::{activity_grid, range_summary, today_local};
use crate::protocol::*;
use crate::state::{AppState, ContentItem, SUBMIT_THRESHOLD};
use crate::util::word_count;

fn conflict(message: impl Into<String>) -> Response {
  (StatusCode::CONFLICT, Json(ErrorOut { message: message.into() })).into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<AppState>) -> impl IntoResponse {
  Json(HealthOut { ok: true, online: state.gateway.is_online().await })
}

// --- Session ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<AppState>) -> impl IntoResponse {
  Json(SessionOut {
    mode: state.current_mode().await,
    grade: state.grade_level().await,
    active_score: state.active_score().await,
    writing_prompt: state.active_writing_prompt().await,
    passage: state.active_passage().await,
    race_prompt: state.active_race_prompt().await,
  })
}

#[instrument(level = "info", skip(state, body), fields(mode = ?body.mode))]
pub async fn http_post_mode(
  State(state): State<AppState>,
  Json(body): Json<ModeIn>,
) -> impl IntoResponse {
  state.set_mode(body.mode).await;
  Json(ModeOut { mode: body.mode })
}

#[instrument(level = "info", skip(state, body), fields(grade = body.grade))]
pub async fn http_post_grade(
  State(state): State<AppState>,
  Json(body): Json<GradeIn>,
) -> impl IntoResponse {
  state.set_grade_level(body.grade).await;
  Json(OkOut { ok: true })
}

#[instrument(level = "info", skip(state), fields(?mode))]
pub async fn http_get_transcript(
  State(state): State<AppState>,
  Path(mode): Path<Mode>,
) -> impl IntoResponse {
  Json(TranscriptOut { messages: state.transcript(mode).await })
}

#[instrument(level = "info", skip(state), fields(?mode))]
pub async fn http_delete_transcript(
  State(state): State<AppState>,
  Path(mode): Path<Mode>,
) -> impl IntoResponse {
  state.clear_transcript(mode).await;
  Json(OkOut { ok: true })
}

// --- Evaluation ---

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_evaluate(
  State(state): State<AppState>,
  Json(body): Json<EvaluateIn>,
) -> Response {
  match body {
    EvaluateIn::FreeWrite { text } => {
      let mode = Mode::FreeWrite;
      let content_id = state.active_content_id(mode).await;
      state
        .record_message(mode, ChatMessage::new(Role::User, text.clone(), None))
        .await;
      let eval = state.gateway.evaluate(&EvalContext::FreeWrite { text }).await;
      finish_evaluation(&state, mode, content_id, eval).await
    }
    EvaluateIn::Reading { answers } => {
      let Some(passage) = state.active_passage().await else {
        return conflict("No active reading passage; load one first.");
      };
      let mode = Mode::Reading;
      let content_id = Some(passage.id.clone());
      let shown = answers
        .iter()
        .map(|a| format!("{}. {}", a.id, a.answer))
        .collect::<Vec<_>>()
        .join("\n");
      state
        .record_message(mode, ChatMessage::new(Role::User, shown, None))
        .await;
      let pairs = answers.into_iter().map(|a| (a.id, a.answer)).collect();
      let eval = state
        .gateway
        .evaluate(&EvalContext::Reading { passage, answers: pairs })
        .await;
      finish_evaluation(&state, mode, content_id, eval).await
    }
    EvaluateIn::Race { answer } => {
      let Some(prompt) = state.active_race_prompt().await else {
        return conflict("No active RACE prompt; load one first.");
      };
      let mode = Mode::Race;
      let content_id = Some(prompt.id.clone());
      state
        .record_message(mode, ChatMessage::new(Role::User, answer.clone(), None))
        .await;
      let eval = state.gateway.evaluate(&EvalContext::Race { prompt, answer }).await;
      finish_evaluation(&state, mode, content_id, eval).await
    }
  }
}

/// Apply the result under the stale-content guard. Work without an active
/// content item (plain free-writing) has nothing to go stale against and is
/// applied directly.
async fn finish_evaluation(
  state: &AppState,
  mode: Mode,
  content_id: Option<String>,
  eval: Evaluation,
) -> Response {
  let applied = match content_id {
    Some(id) => state.apply_evaluation(mode, &id, &eval).await,
    None => {
      state
        .record_message(
          mode,
          ChatMessage::new(Role::Assistant, eval.feedback.clone(), Some(eval.score)),
        )
        .await;
      state.set_active_score(Some(eval.score)).await;
      true
    }
  };
  info!(target: "writing_buddy", ?mode, score = eval.score, applied, "Evaluation finished");
  Json(EvaluateOut { score: eval.score, feedback: eval.feedback, stale: !applied }).into_response()
}

// --- Content ---

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_passage(
  State(state): State<AppState>,
  Query(q): Query<PassageQuery>,
) -> impl IntoResponse {
  let grade = match q.grade {
    Some(g) => g,
    None => state.grade_level().await,
  };
  let passage = state.gateway.generate_reading_passage(grade, q.topic.as_deref()).await;
  state.set_active_content(ContentItem::Passage(passage.clone())).await;
  info!(target: "writing_buddy", id = %passage.id, grade, "Reading passage served");
  Json(passage)
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_race_prompt(
  State(state): State<AppState>,
  Query(q): Query<GradeQuery>,
) -> impl IntoResponse {
  let grade = match q.grade {
    Some(g) => g,
    None => state.grade_level().await,
  };
  let prompt = state.gateway.generate_race_prompt(grade).await;
  state.set_active_content(ContentItem::RacePrompt(prompt.clone())).await;
  info!(target: "writing_buddy", id = %prompt.id, grade, "RACE prompt served");
  Json(prompt)
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_writing_prompt(
  State(state): State<AppState>,
  Query(q): Query<GradeQuery>,
) -> impl IntoResponse {
  let grade = match q.grade {
    Some(g) => g,
    None => state.grade_level().await,
  };
  let prompt = state.gateway.generate_writing_prompt(grade).await;
  let id = state
    .set_active_content(ContentItem::WritingPrompt(prompt.clone()))
    .await;
  info!(target: "writing_buddy", %id, grade, "Writing prompt served");
  Json(WritingPromptOut { id, prompt })
}

// --- Submissions ---

/// Finalize the current work: gate on the active score, archive, credit the
/// ledger, then reset the mode's active content.
#[instrument(level = "info", skip(state, body))]
pub async fn http_post_submit(
  State(state): State<AppState>,
  Json(body): Json<SubmitIn>,
) -> Response {
  let Some(score) = state.active_score().await.filter(|s| *s >= SUBMIT_THRESHOLD) else {
    return conflict(format!(
      "A score of at least {} is required before submitting.",
      SUBMIT_THRESHOLD
    ));
  };
  let date = today_local().format("%Y-%m-%d").to_string();

  let submission = match body {
    SubmitIn::FreeWrite { title, text } => {
      let feedback = last_feedback(&state, Mode::FreeWrite).await;
      let words = word_count(&text);
      let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        date,
        kind: SubmissionKind::FreeWrite,
        title: title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| "My Story".into()),
        content: text,
        score,
        feedback,
        reading_questions: None,
        race_prompt: None,
      };
      state.archive_submission(submission.clone()).await;
      state.increment_ledger(StatKey::WordsWritten, words).await;
      state.increment_ledger(StatKey::StoriesWritten, 1).await;
      state.reset_active_content(Mode::FreeWrite).await;
      submission
    }
    SubmitIn::Reading { answers } => {
      let Some(passage) = state.active_passage().await else {
        return conflict("No active reading passage to submit.");
      };
      let feedback = last_feedback(&state, Mode::Reading).await;
      let answered = answers
        .into_iter()
        .map(|a| AnsweredQuestion {
          id: a.id,
          text: passage
            .questions
            .iter()
            .find(|question| question.id == a.id)
            .map(|question| question.text.clone())
            .unwrap_or_else(|| "Question".into()),
          answer: a.answer,
        })
        .collect();
      let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        date,
        kind: SubmissionKind::Reading,
        title: passage.title.clone(),
        content: passage.content.clone(),
        score,
        feedback,
        reading_questions: Some(answered),
        race_prompt: None,
      };
      state.archive_submission(submission.clone()).await;
      state.increment_ledger(StatKey::StoriesRead, 1).await;
      state.reset_active_content(Mode::Reading).await;
      submission
    }
    SubmitIn::Race { answer } => {
      let Some(prompt) = state.active_race_prompt().await else {
        return conflict("No active RACE prompt to submit.");
      };
      let feedback = last_feedback(&state, Mode::Race).await;
      let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        date,
        kind: SubmissionKind::Race,
        title: prompt.title.clone(),
        content: answer,
        score,
        feedback,
        reading_questions: None,
        race_prompt: Some(prompt.prompt.clone()),
      };
      state.archive_submission(submission.clone()).await;
      state.increment_ledger(StatKey::RacePromptsCompleted, 1).await;
      state.reset_active_content(Mode::Race).await;
      submission
    }
  };

  info!(target: "writing_buddy", id = %submission.id, kind = ?submission.kind, score, "Submission archived");
  Json(SubmitOut { submission }).into_response()
}

/// Most recent assistant feedback for the mode, carried onto the archived
/// submission.
async fn last_feedback(state: &AppState, mode: Mode) -> Option<String> {
  state
    .transcript(mode)
    .await
    .iter()
    .rev()
    .find(|m| matches!(m.role, Role::Assistant))
    .map(|m| m.content.clone())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_submissions(State(state): State<AppState>) -> impl IntoResponse {
  let ledger = state.ledger_snapshot().await;
  Json(SubmissionsOut { submissions: ledger.submissions })
}

// --- Progress ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_progress(State(state): State<AppState>) -> impl IntoResponse {
  Json(state.ledger_snapshot().await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_activity(State(state): State<AppState>) -> impl IntoResponse {
  let ledger = state.ledger_snapshot().await;
  Json(activity_grid(&ledger, today_local()))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_summary(
  State(state): State<AppState>,
  Query(q): Query<RangeQuery>,
) -> impl IntoResponse {
  let days = q.days.unwrap_or(7).clamp(1, 365);
  let ledger = state.ledger_snapshot().await;
  Json(range_summary(&ledger, today_local(), days))
}

// --- Diagnostics ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
  Json(state.diag.entries())
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
  state.diag.clear();
  Json(OkOut { ok: true })
}

// --- Settings ---

#[instrument(level = "info", skip(state, body), fields(has_key = body.api_key.is_some()))]
pub async fn http_post_api_key(
  State(state): State<AppState>,
  Json(body): Json<ApiKeyIn>,
) -> Response {
  match state.update_api_key(body.api_key).await {
    Ok(()) => Json(SettingsOut { online: state.gateway.is_online().await }).into_response(),
    Err(e) => (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(ErrorOut { message: format!("Could not save settings: {}", e) }),
    )
      .into_response(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use crate::config::{Prompts, Settings};
  use crate::diag::DiagLog;
  use crate::gateway::Gateway;
  use crate::ledger::{default_ledger, today_local, LedgerStore};
  use crate::pool;

  fn test_state(dir: &tempfile::TempDir) -> AppState {
    let diag = Arc::new(DiagLog::new());
    let gateway = Arc::new(Gateway::new(Prompts::default(), Arc::clone(&diag), None));
    let ledger =
      LedgerStore::with_ledger(dir.path().join("ledger.json"), default_ledger(today_local()));
    AppState::with_parts(
      gateway,
      diag,
      ledger,
      Settings::default(),
      dir.path().join("settings.toml"),
    )
  }

  #[tokio::test]
  async fn submit_below_threshold_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    state
      .set_active_content(ContentItem::RacePrompt(pool::race_prompts().remove(0)))
      .await;
    state.set_active_score(Some(SUBMIT_THRESHOLD - 1)).await;

    let response = http_post_submit(
      State(state.clone()),
      Json(SubmitIn::Race { answer: "Because the text says so.".into() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(state.ledger_snapshot().await.submissions.is_empty());
  }

  #[tokio::test]
  async fn submit_without_evaluation_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let response = http_post_submit(
      State(state),
      Json(SubmitIn::FreeWrite { title: None, text: "a story".into() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn race_submit_archives_credits_and_resets() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let prompt = pool::race_prompts().remove(0);
    state.set_active_content(ContentItem::RacePrompt(prompt.clone())).await;
    state.set_active_score(Some(9)).await;

    let response = http_post_submit(
      State(state.clone()),
      Json(SubmitIn::Race { answer: "The question asks why Midas changed his mind...".into() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let ledger = state.ledger_snapshot().await;
    assert_eq!(ledger.submissions.len(), 1);
    assert_eq!(ledger.submissions[0].kind, SubmissionKind::Race);
    assert_eq!(ledger.submissions[0].score, 9);
    assert_eq!(ledger.submissions[0].race_prompt.as_deref(), Some(prompt.prompt.as_str()));
    assert_eq!(ledger.race_prompts_completed, 1);

    assert!(state.active_race_prompt().await.is_none());
    assert_eq!(state.active_score().await, None);
  }

  #[tokio::test]
  async fn free_write_submit_credits_word_count() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    state
      .set_active_content(ContentItem::WritingPrompt("Write about rain.".into()))
      .await;
    state.set_active_score(Some(8)).await;

    let response = http_post_submit(
      State(state.clone()),
      Json(SubmitIn::FreeWrite { title: Some("Rain".into()), text: "The rain fell all day".into() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let ledger = state.ledger_snapshot().await;
    assert_eq!(ledger.words_written, 5);
    assert_eq!(ledger.stories_written, 1);
    assert_eq!(ledger.submissions[0].title, "Rain");
  }

  #[tokio::test]
  async fn reading_evaluate_requires_active_passage() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let response = http_post_evaluate(
      State(state),
      Json(EvaluateIn::Reading { answers: vec![] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
  }
}
