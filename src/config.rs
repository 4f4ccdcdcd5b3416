//! Settings for the diary engine.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DAGBOK_API_KEY, DAGBOK_HOME, ...)
//! 2. Config file ($DAGBOK_HOME/config.yaml)
//! 3. Built-in defaults (~/.dagbok, cloud backends, fast tier)
//!
//! Settings are loaded once at startup and passed explicitly to the
//! components that need them; backend selection happens at provider
//! construction, never ad hoc inside business logic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default instructions for the day-level narrative.
pub const DEFAULT_DIARY_PROMPT: &str = "You are an expert at writing personal diary entries. \
Write a coherent, reflective diary entry based on my voice notes, in first person, \
just as if I had sat down and written in my own diary. Capture my feelings, what I did \
and who I met, and close with a thought for tomorrow. Also extract the first names of \
the people I mention, and create fitting tags for the places or topics I talk about.";

/// Default instructions for reflective follow-up questions.
pub const DEFAULT_QUESTIONS_PROMPT: &str = "You are my personal AI coach and diary. \
Ask me 2-3 open, reflective and curious questions in the second person. For example, \
ask how I felt about a specific event, ask me to expand on something I mentioned \
briefly, or ask what I learned today. The goal is to deepen my thoughts and make the \
diary more personal and valuable.";

/// Which cloud model variant to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheaper, lower latency
    #[default]
    Fast,

    /// Slower, higher quality
    Accurate,
}

/// Backend used for transcribing voice notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionBackend {
    #[default]
    Cloud,
    Local,
}

/// Backend used for summarization and question generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryBackend {
    #[default]
    Cloud,
    Local,
    OnDevice,
}

/// Raw config file schema (matches YAML structure).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    pub api_key: Option<String>,
    pub model_tier: Option<ModelTier>,
    pub transcription_backend: Option<TranscriptionBackend>,
    pub summary_backend: Option<SummaryBackend>,
    pub local_model_path: Option<PathBuf>,
    pub diary_prompt: Option<String>,
    pub questions_prompt: Option<String>,
}

/// Resolved settings with every field populated or defaulted.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for diary data (store files, queue log)
    pub home: PathBuf,

    /// Cloud API key; absence fails cloud calls with CredentialMissing
    pub api_key: Option<String>,

    pub model_tier: ModelTier,
    pub transcription_backend: TranscriptionBackend,
    pub summary_backend: SummaryBackend,

    /// Model file for the local-native backend
    pub local_model_path: Option<PathBuf>,

    /// Prompt template for the day narrative
    pub diary_prompt: String,

    /// Prompt template for reflective questions
    pub questions_prompt: String,
}

impl Settings {
    /// Load settings from the default home (env override, then ~/.dagbok).
    pub fn load() -> Result<Self> {
        let home = match std::env::var("DAGBOK_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(".dagbok"),
        };
        Self::load_from(&home)
    }

    /// Load settings rooted at an explicit home directory.
    pub fn load_from(home: &Path) -> Result<Self> {
        let file = load_settings_file(&home.join("config.yaml"))?;

        let api_key = std::env::var("DAGBOK_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or(file.api_key);

        let local_model_path = std::env::var("DAGBOK_LOCAL_MODEL")
            .ok()
            .map(PathBuf::from)
            .or(file.local_model_path);

        Ok(Self {
            home: home.to_path_buf(),
            api_key,
            model_tier: file.model_tier.unwrap_or_default(),
            transcription_backend: file.transcription_backend.unwrap_or_default(),
            summary_backend: file.summary_backend.unwrap_or_default(),
            local_model_path,
            diary_prompt: file.diary_prompt.unwrap_or_else(|| DEFAULT_DIARY_PROMPT.to_string()),
            questions_prompt: file
                .questions_prompt
                .unwrap_or_else(|| DEFAULT_QUESTIONS_PROMPT.to_string()),
        })
    }

    /// Defaults rooted at a directory, no file or env lookups. Used by tests
    /// and embedders that configure programmatically.
    pub fn defaults_at(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            api_key: None,
            model_tier: ModelTier::default(),
            transcription_backend: TranscriptionBackend::default(),
            summary_backend: SummaryBackend::default(),
            local_model_path: None,
            diary_prompt: DEFAULT_DIARY_PROMPT.to_string(),
            questions_prompt: DEFAULT_QUESTIONS_PROMPT.to_string(),
        }
    }

    /// Directory holding the record collections.
    pub fn store_dir(&self) -> PathBuf {
        self.home.join("store")
    }

    /// Path of the durable job queue log.
    pub fn queue_path(&self) -> PathBuf {
        self.home.join("jobs.jsonl")
    }
}

/// Parse the config file if present; a missing file means all defaults.
fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(temp.path()).unwrap();

        assert_eq!(settings.model_tier, ModelTier::Fast);
        assert_eq!(settings.transcription_backend, TranscriptionBackend::Cloud);
        assert_eq!(settings.summary_backend, SummaryBackend::Cloud);
        assert_eq!(settings.diary_prompt, DEFAULT_DIARY_PROMPT);
        assert_eq!(settings.questions_prompt, DEFAULT_QUESTIONS_PROMPT);
        assert!(settings.local_model_path.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();

        let config_path = temp.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
api_key: test-key
model_tier: accurate
summary_backend: local
local_model_path: /models/diary.gguf
diary_prompt: "Write tersely."
"#
        )
        .unwrap();

        let settings = Settings::load_from(temp.path()).unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("test-key"));
        assert_eq!(settings.model_tier, ModelTier::Accurate);
        assert_eq!(settings.summary_backend, SummaryBackend::Local);
        assert_eq!(
            settings.local_model_path,
            Some(PathBuf::from("/models/diary.gguf"))
        );
        assert_eq!(settings.diary_prompt, "Write tersely.");
        // Unset keys fall back to defaults
        assert_eq!(settings.transcription_backend, TranscriptionBackend::Cloud);
        assert_eq!(settings.questions_prompt, DEFAULT_QUESTIONS_PROMPT);
    }

    #[test]
    fn test_derived_paths() {
        let settings = Settings::defaults_at(Path::new("/data/diary"));

        assert_eq!(settings.store_dir(), PathBuf::from("/data/diary/store"));
        assert_eq!(settings.queue_path(), PathBuf::from("/data/diary/jobs.jsonl"));
    }
}
