//! Local-native backend: a llama.cpp-style server plus a whisper binary.
//!
//! The text model is served by a long-lived child process bound to the
//! configured model file. Loading takes tens of seconds, so the server is
//! started lazily on first use and reused for the process lifetime;
//! concurrent first calls collapse into a single load. Changing the
//! configured model path forces a teardown and reload.
//!
//! Replies are free text: they go through fence stripping and embedded
//! JSON extraction before parsing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::domain::QaPair;

use super::{
    parse_loose, parse_questions, report, DaySummary, InferenceProvider, Progress, ProviderError,
    JSON_QUESTIONS_INSTRUCTION, JSON_SUMMARY_INSTRUCTION,
};

/// Configuration for the local backend.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Model file served by the text-model server
    pub model_path: Option<PathBuf>,

    /// llama.cpp-style server binary
    pub server_binary: String,

    /// Port the server listens on
    pub port: u16,

    /// How long to wait for the model to finish loading
    pub load_timeout_secs: u64,

    /// Whisper binary used for transcription
    pub whisper_binary: String,

    /// Whisper model name
    pub whisper_model: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            server_binary: "llama-server".to_string(),
            port: 8643,
            load_timeout_secs: 120,
            whisper_binary: "whisper".to_string(),
            whisper_model: "base".to_string(),
        }
    }
}

impl LocalConfig {
    /// Build from settings, with env overrides for the binaries.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model_path: settings.local_model_path.clone(),
            server_binary: std::env::var("DAGBOK_LLAMA_SERVER")
                .unwrap_or_else(|_| "llama-server".to_string()),
            whisper_binary: std::env::var("WHISPER_PATH").unwrap_or_else(|_| "whisper".to_string()),
            ..Self::default()
        }
    }
}

/// A running text-model server and the model it loaded.
struct LoadedServer {
    child: Child,
    model_path: PathBuf,
}

/// Local inference backend.
pub struct LocalProvider {
    config: LocalConfig,

    /// Currently configured model path; changing it resets the server
    model_path: RwLock<Option<PathBuf>>,

    /// Lifecycle state; the async lock collapses concurrent loads
    state: Mutex<Option<LoadedServer>>,

    client: reqwest::Client,
}

/// Completion endpoint reply
#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    content: String,
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
}

/// True when the loaded model no longer matches the configured path.
fn needs_reload(loaded: Option<&Path>, configured: &Path) -> bool {
    loaded != Some(configured)
}

/// File extension for a temp audio file, from its MIME type.
fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

/// Wrap a prompt in the model's chat-turn template (ChatML).
fn wrap_chat(system: &str, user: &str) -> String {
    format!(
        "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
        system, user
    )
}

impl LocalProvider {
    /// Create a provider; the server is not started until the first call.
    pub fn new(config: LocalConfig) -> Self {
        let model_path = RwLock::new(config.model_path.clone());
        Self {
            config,
            model_path,
            state: Mutex::new(None),
            client: reqwest::Client::new(),
        }
    }

    /// Repoint the provider at a different model file. The running server
    /// is torn down and reloaded on the next call.
    pub fn set_model_path(&self, path: impl Into<PathBuf>) {
        *self
            .model_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.into());
    }

    fn server_url(&self, endpoint: &str) -> String {
        format!("http://127.0.0.1:{}/{}", self.config.port, endpoint)
    }

    /// Make sure the text-model server is up and serving the configured
    /// model. At most one load is in flight at a time.
    async fn ensure_ready(&self) -> Result<(), ProviderError> {
        let configured = self
            .model_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                ProviderError::Unavailable("no local model path configured".to_string())
            })?;

        let mut state = self.state.lock().await;

        if let Some(loaded) = state.as_mut() {
            if !needs_reload(Some(&loaded.model_path), &configured) {
                return Ok(());
            }

            info!(
                old = %loaded.model_path.display(),
                new = %configured.display(),
                "Model path changed, reloading local model"
            );
            if let Err(e) = loaded.child.start_kill() {
                warn!("Failed to stop previous model server: {}", e);
            }
            *state = None;
        }

        info!(model = %configured.display(), "Loading local model (this can take a while)");

        let mut child = Command::new(&self.config.server_binary)
            .arg("-m")
            .arg(&configured)
            .arg("--port")
            .arg(self.config.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::Unavailable(format!(
                    "failed to start {}: {}",
                    self.config.server_binary, e
                ))
            })?;

        // Poll readiness until the model has finished loading
        let deadline = Instant::now() + Duration::from_secs(self.config.load_timeout_secs);
        let health_url = self.server_url("health");

        loop {
            if let Ok(response) = self.client.get(&health_url).send().await {
                if response.status().is_success() {
                    break;
                }
            }

            if Instant::now() >= deadline {
                let _ = child.start_kill();
                return Err(ProviderError::Unavailable(format!(
                    "local model did not load within {}s",
                    self.config.load_timeout_secs
                )));
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        info!("Local model ready");
        *state = Some(LoadedServer {
            child,
            model_path: configured,
        });

        Ok(())
    }

    /// Run one chat completion and return the raw free-text reply.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        self.ensure_ready().await?;

        let body = json!({
            "prompt": wrap_chat(system, user),
            "n_predict": 1024,
            "temperature": 0.7,
            "stop": ["<|im_end|>"],
        });

        debug!("Sending completion request to local model");

        let reply: CompletionReply = self
            .client
            .post(self.server_url("completion"))
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ProviderError::ModelCrash(e.to_string()))?
            .json()
            .await?;

        Ok(reply.content)
    }
}

#[async_trait]
impl InferenceProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        mime: &str,
        progress: Progress<'_>,
    ) -> Result<String, ProviderError> {
        if audio.is_empty() {
            return Err(ProviderError::MediaMissing);
        }

        report(progress, 10, "Preparing audio");

        let temp_dir = tempfile::tempdir()
            .map_err(|e| ProviderError::ModelCrash(format!("failed to create temp dir: {}", e)))?;
        let audio_path = temp_dir
            .path()
            .join(format!("note.{}", extension_for_mime(mime)));
        tokio::fs::write(&audio_path, audio)
            .await
            .map_err(|e| ProviderError::ModelCrash(format!("failed to write audio: {}", e)))?;

        report(progress, 40, "Transcribing note");

        let output = Command::new(&self.config.whisper_binary)
            .arg(&audio_path)
            .arg("--model")
            .arg(&self.config.whisper_model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ProviderError::Unavailable(format!(
                    "failed to run {}: {}",
                    self.config.whisper_binary, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::ModelCrash(format!(
                "whisper failed: {}",
                stderr.trim()
            )));
        }

        let json_path = audio_path.with_extension("json");
        let content = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| ProviderError::ModelCrash(format!("failed to read output: {}", e)))?;

        let parsed: WhisperOutput = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Malformed(format!("whisper JSON: {}", e)))?;

        report(progress, 90, "Saving text");
        Ok(parsed.text.trim().to_string())
    }

    async fn summarize(
        &self,
        transcript: &str,
        qa: &[QaPair],
        prompt_template: &str,
        progress: Progress<'_>,
    ) -> Result<DaySummary, ProviderError> {
        report(progress, 20, "Reading the day's notes");

        let system = format!("{}\n\n{}", prompt_template, JSON_SUMMARY_INSTRUCTION);
        let user = super::summary_user_prompt(transcript, qa);

        report(progress, 50, "Writing the diary entry");
        let raw = self.complete(&system, &user).await?;

        report(progress, 80, "Saving tags and people");
        parse_loose(&raw)
    }

    async fn generate_questions(
        &self,
        transcript: &str,
        prompt_template: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let system = format!("{}\n\n{}", prompt_template, JSON_QUESTIONS_INSTRUCTION);
        let user = format!("Read my short diary notes from today:\n\n{}", transcript);

        let raw = self.complete(&system, &user).await?;
        parse_questions(&raw)
    }
}
