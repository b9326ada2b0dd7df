//! Scoring gateway: evaluation and content generation against the model,
//! with a deterministic offline fallback when no credential is configured.
//!
//! Contract: every operation resolves to a usable value. Transport errors,
//! malformed replies, and missing credentials all degrade locally; nothing
//! here returns an error to the caller. Every attempt is recorded to the
//! diagnostics log with the full prompt/response (or the error).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::diag::{DiagLog, LogLevel};
use crate::domain::{RacePrompt, ReadingPassage, ReadingQuestion};
use crate::openai::{strip_code_fences, OpenAI};
use crate::pool;
use crate::util::{fill_template, trunc_for_log};

/// Offline evaluation is intentionally above the submission gate so users
/// without a credential are never blocked from completing a flow.
pub const OFFLINE_SCORE: u8 = 8;
pub const OFFLINE_FEEDBACK: &str =
  "I'm in offline mode right now! That's a great start. **Keep writing!**";
const OFFLINE_DELAY: Duration = Duration::from_millis(1000);

/// Neutral, unblocking default when the model replied with text that is not
/// the requested JSON shape.
const PARSE_FALLBACK_SCORE: u8 = 7;
const FAILURE_FEEDBACK: &str =
  "I'm having trouble connecting to my brain right now, but keep writing!";
const EMPTY_REPLY_FEEDBACK: &str = "Something went wrong. Please try again.";

const EVAL_MAX_TOKENS: u32 = 1000;
const GEN_MAX_TOKENS: u32 = 1000;
const PROMPT_MAX_TOKENS: u32 = 100;
const GEN_TEMPERATURE: f32 = 0.9;
const EVAL_TEMPERATURE: f32 = 0.2;

/// The work sample being evaluated, with its mode-specific context.
#[derive(Clone, Debug)]
pub enum EvalContext {
  FreeWrite { text: String },
  Reading { passage: ReadingPassage, answers: Vec<(u32, String)> },
  Race { prompt: RacePrompt, answer: String },
}

impl EvalContext {
  fn label(&self) -> &'static str {
    match self {
      EvalContext::FreeWrite { .. } => "Free Write",
      EvalContext::Reading { .. } => "Reading Comprehension",
      EvalContext::Race { .. } => "RACE Practice",
    }
  }
}

/// Normalized evaluation result: integer score in 0..=10, non-empty feedback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
  pub score: u8,
  pub feedback: String,
}

pub struct Gateway {
  prompts: Prompts,
  diag: Arc<DiagLog>,
  client: RwLock<Option<OpenAI>>,
}

impl Gateway {
  pub fn new(prompts: Prompts, diag: Arc<DiagLog>, client: Option<OpenAI>) -> Self {
    Self { prompts, diag, client: RwLock::new(client) }
  }

  /// Swap the model client (settings endpoint stored a new key, or cleared
  /// it). None switches everything to offline fallbacks.
  pub async fn set_client(&self, client: Option<OpenAI>) {
    *self.client.write().await = client;
  }

  pub async fn is_online(&self) -> bool {
    self.client.read().await.is_some()
  }

  /// Evaluate a work sample. Always resolves; see module docs.
  #[instrument(level = "info", skip(self, ctx), fields(context = ctx.label()))]
  pub async fn evaluate(&self, ctx: &EvalContext) -> Evaluation {
    let client = { self.client.read().await.clone() };
    let Some(client) = client else {
      self.diag.log(
        LogLevel::Warning,
        "Client init failed: No API Key found. Using offline evaluation.",
        Some(json!({ "error": "Missing OPENAI_API_KEY or settings key" })),
      );
      tokio::time::sleep(OFFLINE_DELAY).await;
      return Evaluation { score: OFFLINE_SCORE, feedback: OFFLINE_FEEDBACK.into() };
    };

    let (system, user) = self.build_eval_request(ctx);
    self.diag.log(
      LogLevel::Info,
      "Sending message to AI",
      Some(json!({ "system": system, "context": ctx.label(), "message": user })),
    );

    match client.chat(Some(&system), &user, EVAL_MAX_TOKENS, EVAL_TEMPERATURE).await {
      Ok(text) if !text.is_empty() => {
        info!(target: "gateway", preview = %trunc_for_log(&text, 120), "Model reply received");
        self
          .diag
          .log(LogLevel::Success, "Received AI response", Some(json!({ "response": text })));
        decode_evaluation(&text)
      }
      Ok(_) => {
        warn!(target: "gateway", "Model returned an empty reply");
        self.diag.log(LogLevel::Error, "AI returned an empty reply", None);
        Evaluation { score: 0, feedback: EMPTY_REPLY_FEEDBACK.into() }
      }
      Err(e) => {
        error!(target: "gateway", error = %e, "Evaluation request failed");
        self.diag.log(LogLevel::Error, "AI message failed", Some(json!({ "error": e })));
        Evaluation { score: 0, feedback: FAILURE_FEEDBACK.into() }
      }
    }
  }

  fn build_eval_request(&self, ctx: &EvalContext) -> (String, String) {
    let p = &self.prompts;
    match ctx {
      EvalContext::FreeWrite { text } => (
        format!("{}\n\n{}\n\n{}", p.tutor_system, p.json_contract, p.free_write_rubric),
        fill_template(&p.free_write_user_template, &[("text", text)]),
      ),
      EvalContext::Reading { passage, answers } => {
        let answers_text = answers
          .iter()
          .map(|(id, ans)| {
            let question = passage
              .questions
              .iter()
              .find(|question| question.id == *id)
              .map(|question| question.text.as_str())
              .unwrap_or("Question");
            format!("Q: {}\nA: {}", question, ans)
          })
          .collect::<Vec<_>>()
          .join("\n\n");
        (
          format!("{}\n\n{}\n\n{}", p.tutor_system, p.json_contract, p.reading_rubric),
          fill_template(
            &p.reading_user_template,
            &[("content", &passage.content), ("answers", &answers_text)],
          ),
        )
      }
      EvalContext::Race { prompt, answer } => (
        format!("{}\n\n{}\n\n{}", p.tutor_system, p.json_contract, p.race_rubric),
        fill_template(
          &p.race_user_template,
          &[("content", &prompt.content), ("prompt", &prompt.prompt), ("answer", answer)],
        ),
      ),
    }
  }

  /// Generate a reading passage; pool fallback on any failure.
  #[instrument(level = "info", skip(self))]
  pub async fn generate_reading_passage(&self, grade: u8, topic: Option<&str>) -> ReadingPassage {
    let client = { self.client.read().await.clone() };
    let Some(client) = client else {
      self
        .diag
        .log(LogLevel::Warning, "Client init failed: No API Key. Using pool passage.", None);
      tokio::time::sleep(OFFLINE_DELAY).await;
      return pool::random_reading_passage(grade);
    };

    let theme = topic.map(str::to_string).unwrap_or_else(|| pool::random_theme().to_string());
    let prompt = fill_template(
      &self.prompts.passage_gen_template,
      &[("grade", &grade.to_string()), ("theme", &theme), ("seed", &uniqueness_seed())],
    );
    self.diag.log(LogLevel::Info, "Generating reading passage", Some(json!({ "prompt": prompt })));

    match client.chat(None, &prompt, GEN_MAX_TOKENS, GEN_TEMPERATURE).await {
      Ok(text) => {
        #[derive(Deserialize)]
        struct GenPassage {
          title: String,
          content: String,
          questions: Vec<ReadingQuestion>,
        }
        match serde_json::from_str::<GenPassage>(&strip_code_fences(&text)) {
          Ok(generated) => {
            self
              .diag
              .log(LogLevel::Success, "Generated reading passage", Some(json!({ "response": text })));
            ReadingPassage {
              id: uuid::Uuid::new_v4().to_string(),
              grade,
              title: generated.title,
              content: generated.content,
              questions: generated.questions,
            }
          }
          Err(e) => {
            error!(target: "gateway", error = %e, "Passage JSON did not parse; using pool");
            self.diag.log(LogLevel::Error, "Passage generation failed", Some(json!({ "error": e.to_string(), "response": text })));
            pool::random_reading_passage(grade)
          }
        }
      }
      Err(e) => {
        error!(target: "gateway", error = %e, "Passage generation request failed; using pool");
        self.diag.log(LogLevel::Error, "Passage generation failed", Some(json!({ "error": e })));
        pool::random_reading_passage(grade)
      }
    }
  }

  /// Generate a RACE prompt; pool fallback on any failure.
  #[instrument(level = "info", skip(self))]
  pub async fn generate_race_prompt(&self, grade: u8) -> RacePrompt {
    let client = { self.client.read().await.clone() };
    let Some(client) = client else {
      self
        .diag
        .log(LogLevel::Warning, "Client init failed: No API Key. Using pool RACE prompt.", None);
      tokio::time::sleep(OFFLINE_DELAY).await;
      return pool::random_race_prompt(grade);
    };

    let theme = pool::random_theme();
    let prompt = fill_template(
      &self.prompts.race_gen_template,
      &[("grade", &grade.to_string()), ("theme", theme), ("seed", &uniqueness_seed())],
    );
    self.diag.log(LogLevel::Info, "Generating RACE prompt", Some(json!({ "prompt": prompt })));

    match client.chat(None, &prompt, GEN_MAX_TOKENS, GEN_TEMPERATURE).await {
      Ok(text) => {
        #[derive(Deserialize)]
        struct GenRace {
          title: String,
          content: String,
          prompt: String,
        }
        match serde_json::from_str::<GenRace>(&strip_code_fences(&text)) {
          Ok(generated) => {
            self
              .diag
              .log(LogLevel::Success, "Generated RACE prompt", Some(json!({ "response": text })));
            RacePrompt {
              id: uuid::Uuid::new_v4().to_string(),
              grade,
              title: generated.title,
              content: generated.content,
              prompt: generated.prompt,
            }
          }
          Err(e) => {
            error!(target: "gateway", error = %e, "RACE JSON did not parse; using pool");
            self.diag.log(LogLevel::Error, "RACE generation failed", Some(json!({ "error": e.to_string(), "response": text })));
            pool::random_race_prompt(grade)
          }
        }
      }
      Err(e) => {
        error!(target: "gateway", error = %e, "RACE generation request failed; using pool");
        self.diag.log(LogLevel::Error, "RACE generation failed", Some(json!({ "error": e })));
        pool::random_race_prompt(grade)
      }
    }
  }

  /// Generate a plain writing-prompt string; pool fallback on any failure.
  #[instrument(level = "info", skip(self))]
  pub async fn generate_writing_prompt(&self, grade: u8) -> String {
    let client = { self.client.read().await.clone() };
    let Some(client) = client else {
      self
        .diag
        .log(LogLevel::Warning, "Client init failed: No API Key. Using pool prompt.", None);
      tokio::time::sleep(OFFLINE_DELAY).await;
      return pool::random_writing_prompt();
    };

    let theme = pool::random_theme();
    let prompt = fill_template(
      &self.prompts.writing_prompt_template,
      &[("grade", &grade.to_string()), ("theme", theme), ("seed", &uniqueness_seed())],
    );
    self.diag.log(LogLevel::Info, "Generating writing prompt", Some(json!({ "prompt": prompt })));

    match client.chat(None, &prompt, PROMPT_MAX_TOKENS, GEN_TEMPERATURE).await {
      Ok(text) if !text.is_empty() => {
        self
          .diag
          .log(LogLevel::Success, "Generated writing prompt", Some(json!({ "response": text })));
        text
      }
      Ok(_) => pool::random_writing_prompt(),
      Err(e) => {
        error!(target: "gateway", error = %e, "Prompt generation request failed; using pool");
        self.diag.log(LogLevel::Error, "Prompt generation failed", Some(json!({ "error": e })));
        pool::random_writing_prompt()
      }
    }
  }
}

/// Varies generation so repeated requests don't replay a cached story.
fn uniqueness_seed() -> String {
  format!("{:04}", chrono::Utc::now().timestamp_millis() % 10_000)
}

/// Decode the two-field evaluation JSON, tolerating a fenced code block.
/// Non-JSON text degrades to the neutral score with the raw text as
/// feedback, so a mis-formatted reply is still distinguishable from a hard
/// transport failure.
fn decode_evaluation(text: &str) -> Evaluation {
  #[derive(Deserialize)]
  struct EvalJson {
    score: Option<f64>,
    feedback: Option<String>,
  }
  match serde_json::from_str::<EvalJson>(&strip_code_fences(text)) {
    Ok(parsed) => Evaluation {
      score: parsed.score.map(clamp_score).unwrap_or(0),
      feedback: parsed
        .feedback
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "Great job!".into()),
    },
    Err(_) => {
      info!(target: "gateway", "Reply was not valid JSON; using neutral score with raw feedback");
      Evaluation { score: PARSE_FALLBACK_SCORE, feedback: text.to_string() }
    }
  }
}

fn clamp_score(raw: f64) -> u8 {
  if !raw.is_finite() {
    return 0;
  }
  raw.round().clamp(0.0, 10.0) as u8
}

#[cfg(test)]
mod tests {
  use super::*;

  fn offline_gateway() -> Gateway {
    Gateway::new(Prompts::default(), Arc::new(DiagLog::new()), None)
  }

  #[tokio::test(start_paused = true)]
  async fn offline_evaluation_is_deterministic() {
    let gw = offline_gateway();
    let ctx = EvalContext::FreeWrite { text: "hi".into() };
    for _ in 0..3 {
      let result = gw.evaluate(&ctx).await;
      assert_eq!(result, Evaluation { score: 8, feedback: OFFLINE_FEEDBACK.into() });
    }
  }

  #[tokio::test(start_paused = true)]
  async fn offline_attempts_are_logged() {
    let diag = Arc::new(DiagLog::new());
    let gw = Gateway::new(Prompts::default(), Arc::clone(&diag), None);
    gw.evaluate(&EvalContext::FreeWrite { text: "hello".into() }).await;
    let entries = diag.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Warning);
  }

  #[tokio::test(start_paused = true)]
  async fn offline_generation_respects_grade_window() {
    let gw = offline_gateway();
    let passage = gw.generate_reading_passage(3, None).await;
    assert!((passage.grade as i16 - 3).abs() <= 1);
    let race = gw.generate_race_prompt(4).await;
    assert!((race.grade as i16 - 4).abs() <= 1);
    let prompt = gw.generate_writing_prompt(5).await;
    assert!(!prompt.is_empty());
  }

  #[tokio::test]
  async fn transport_failure_resolves_to_zero_score() {
    // Nothing listens on the discard port; the request fails immediately.
    let client = OpenAI {
      client: reqwest::Client::new(),
      api_key: "test-key".into(),
      base_url: "http://127.0.0.1:9".into(),
      model: "test-model".into(),
    };
    let diag = Arc::new(DiagLog::new());
    let gw = Gateway::new(Prompts::default(), Arc::clone(&diag), Some(client));

    let result = gw.evaluate(&EvalContext::FreeWrite { text: "hello".into() }).await;

    assert_eq!(result.score, 0);
    assert_eq!(result.feedback, FAILURE_FEEDBACK);
    assert!(diag.entries().iter().any(|e| e.level == LogLevel::Error));
  }

  #[test]
  fn decode_accepts_plain_and_fenced_json() {
    let plain = decode_evaluation(r#"{"score": 9, "feedback": "**Nice!**"}"#);
    assert_eq!(plain.score, 9);
    assert_eq!(plain.feedback, "**Nice!**");

    let fenced = decode_evaluation("```json\n{\"score\": 6, \"feedback\": \"ok\"}\n```");
    assert_eq!(fenced.score, 6);
  }

  #[test]
  fn decode_falls_back_to_neutral_score_on_prose() {
    let result = decode_evaluation("You did a great job restating the question!");
    assert_eq!(result.score, 7);
    assert_eq!(result.feedback, "You did a great job restating the question!");
  }

  #[test]
  fn decode_clamps_and_defaults() {
    assert_eq!(decode_evaluation(r#"{"score": 14, "feedback": "wow"}"#).score, 10);
    assert_eq!(decode_evaluation(r#"{"score": -3, "feedback": "hm"}"#).score, 0);
    assert_eq!(decode_evaluation(r#"{"score": 7.6, "feedback": "up"}"#).score, 8);

    let missing = decode_evaluation(r#"{"feedback": ""}"#);
    assert_eq!(missing.score, 0);
    assert_eq!(missing.feedback, "Great job!");
  }

  #[test]
  fn eval_request_uses_mode_specific_rubric() {
    let gw = offline_gateway();
    let passage = pool::reading_passages().remove(0);
    let (system, user) = gw.build_eval_request(&EvalContext::Reading {
      passage,
      answers: vec![(1, "a key".into()), (99, "unknown".into())],
    });
    assert!(system.contains("accuracy"));
    assert!(user.contains("Q: What did Lucy find under the doormat?"));
    assert!(user.contains("Q: Question\nA: unknown"));

    let (race_system, _) = gw.build_eval_request(&EvalContext::Race {
      prompt: pool::race_prompts().remove(0),
      answer: "Because...".into(),
    });
    assert!(race_system.contains("Restate"));
  }
}
