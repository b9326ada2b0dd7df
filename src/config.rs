//! Prompt configuration (TOML-overridable) and user settings.
//!
//! Prompts ship with defaults tuned for an elementary-school literacy tutor
//! and can be overridden via `AGENT_CONFIG_PATH`. Settings hold the
//! user-entered API key; the environment variable always wins over it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const DEFAULT_SETTINGS_PATH: &str = "./data/settings.toml";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts used by the scoring gateway. Defaults are sensible for Grades 3-5
/// literacy tutoring. Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  /// Base persona shared by every evaluation call.
  pub tutor_system: String,
  /// Appended to the system prompt: the strict two-field JSON contract.
  pub json_contract: String,
  // Per-mode grading rubrics (appended after the JSON contract).
  pub race_rubric: String,
  pub reading_rubric: String,
  pub free_write_rubric: String,
  // Per-mode user-message templates.
  pub race_user_template: String,
  pub reading_user_template: String,
  pub free_write_user_template: String,
  // Content generation templates.
  pub passage_gen_template: String,
  pub race_gen_template: String,
  pub writing_prompt_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      tutor_system: "You are a friendly, encouraging, and expert literacy tutor for elementary school students (Grades 3-5). Your goal is to help them improve their reading and writing skills. Always be positive, constructive, and use age-appropriate language. Keep your responses relatively short and focused.".into(),
      json_contract: "IMPORTANT: You must return your response in strictly valid JSON format with the following structure:\n{\n  \"score\": number, // A score from 0-10 based on quality/accuracy. 0 is poor, 10 is perfect.\n  \"feedback\": \"string\" // Your helpful feedback in Markdown format. Use bolding and lists where appropriate.\n}".into(),
      race_rubric: "Analyze the student's response based on the RACE strategy:\n- Restate: Did they restate the question?\n- Answer: Did they answer the question?\n- Cite: Did they cite evidence from the text?\n- Explain: Did they explain how the evidence supports their answer?\n\nScore criteria:\n- 0-4: Missing multiple components or incorrect.\n- 5-7: Has most components but weak explanation or citation.\n- 8-10: Strong RACE response with clear evidence.".into(),
      reading_rubric: "Check the student's answers for accuracy based on the text. Score is based on the accuracy of the answers.".into(),
      free_write_rubric: "Evaluate the writing for creativity, grammar, and clarity.".into(),
      race_user_template: "Passage:\n\"{content}\"\n\nQuestion:\n\"{prompt}\"\n\nStudent Answer:\n\"{answer}\"\n\nPlease review my RACE response.".into(),
      reading_user_template: "Passage:\n\"{content}\"\n\nStudent Q&A:\n{answers}\n\nPlease check my reading comprehension answers.".into(),
      free_write_user_template: "Student Writing:\n\"{text}\"\n\nPlease provide feedback on my writing.".into(),
      passage_gen_template: "Generate a Grade {grade} reading passage about \"{theme}\" (ID: {seed}) with a title, content (approx 150-200 words), and 2 comprehension questions.\n\nRequirements:\n- Use rich, descriptive vocabulary appropriate for Grade {grade} aiming for high proficiency.\n- Include complex sentence structures to challenge the reader.\n- Ensure the content is engaging and educational.\n- Questions should be detailed and require inferential thinking, not just recall.\n- MAKE IT UNIQUE. Do not repeat previous stories.\n\nReturn strictly valid JSON with this structure:\n{\n  \"title\": \"string\",\n  \"content\": \"string\",\n  \"questions\": [\n    { \"id\": 1, \"text\": \"question 1\" },\n    { \"id\": 2, \"text\": \"question 2\" }\n  ]\n}".into(),
      race_gen_template: "Generate a Grade {grade} short text about \"{theme}\" (ID: {seed}) and a question that requires a constructed response using the RACE strategy.\n\nRequirements:\n- The text should be rich in detail and vocabulary to support deep analysis.\n- The topic should be engaging and complex enough to require explanation.\n- The question should be open-ended and require citing specific evidence from the text to answer fully.\n\nReturn strictly valid JSON with this structure:\n{\n  \"title\": \"string\",\n  \"content\": \"string\",\n  \"prompt\": \"string\"\n}".into(),
      writing_prompt_template: "Generate a single creative writing prompt for a Grade {grade} student based on the theme: \"{theme}\".\nThe prompt should inspire sophisticated thinking and the use of descriptive language.\nAvoid simple scenarios; suggest intriguing dilemmas, magical realism, or character-driven situations.\nUnique ID: {seed}\nReturn ONLY the prompt text, without quotes or introductory phrases.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO
/// error, returns None (defaults apply).
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "writing_buddy", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "writing_buddy", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "writing_buddy", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// User-editable settings persisted next to the ledger. Currently just the
/// API key entered through the settings endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
  #[serde(default)]
  pub api_key: Option<String>,
}

impl Settings {
  /// Load settings from disk; absence or corruption yields defaults.
  pub fn load(path: &Path) -> Self {
    match std::fs::read_to_string(path) {
      Ok(s) => match toml::from_str::<Settings>(&s) {
        Ok(settings) => settings,
        Err(e) => {
          error!(target: "writing_buddy", path = %path.display(), error = %e, "Failed to parse settings; using defaults");
          Settings::default()
        }
      },
      Err(_) => Settings::default(),
    }
  }

  pub fn save(&self, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let body = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
    std::fs::write(path, body).map_err(|e| e.to_string())
  }
}

pub fn settings_path_from_env() -> PathBuf {
  std::env::var("SETTINGS_PATH")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

/// Resolve the evaluator credential. Environment wins over the settings
/// file; absence of both is a fully supported offline state, not an error.
pub fn resolve_api_key(settings: &Settings) -> Option<String> {
  if let Ok(key) = std::env::var("OPENAI_API_KEY") {
    if !key.trim().is_empty() {
      return Some(key);
    }
  }
  settings
    .api_key
    .as_ref()
    .filter(|k| !k.trim().is_empty())
    .cloned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settings_load_missing_file_defaults() {
    let s = Settings::load(Path::new("/nonexistent/settings.toml"));
    assert!(s.api_key.is_none());
  }

  #[test]
  fn settings_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("settings.toml");
    let s = Settings { api_key: Some("sk-test".into()) };
    s.save(&path).expect("save");
    let loaded = Settings::load(&path);
    assert_eq!(loaded.api_key.as_deref(), Some("sk-test"));
  }

  #[test]
  fn prompts_defaults_mention_each_rubric() {
    let p = Prompts::default();
    assert!(p.race_rubric.contains("Restate"));
    assert!(p.json_contract.contains("\"score\""));
    assert!(p.passage_gen_template.contains("{grade}"));
  }
}
