//! On-device backend: ephemeral sessions against a platform helper.
//!
//! The platform model (when the device has one) is reached through a
//! helper binary. Availability is probed before every use, and each call
//! runs in its own short-lived session: the child process is released on
//! every exit path, success or failure.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::QaPair;

use super::{
    parse_loose, parse_questions, report, DaySummary, InferenceProvider, Progress, ProviderError,
    JSON_QUESTIONS_INSTRUCTION, JSON_SUMMARY_INSTRUCTION,
};

const SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// On-device inference backend.
pub struct OnDeviceProvider {
    /// Platform helper binary
    binary: String,
}

impl Default for OnDeviceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OnDeviceProvider {
    /// Create a provider using the default helper binary (env override:
    /// DAGBOK_EDGE_BINARY).
    pub fn new() -> Self {
        Self {
            binary: std::env::var("DAGBOK_EDGE_BINARY").unwrap_or_else(|_| "edge-ai".to_string()),
        }
    }

    /// Create a provider with a custom helper binary path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check that the platform model exists on this device.
    async fn probe(&self) -> Result<(), ProviderError> {
        let output = Command::new(&self.binary)
            .arg("probe")
            .output()
            .await
            .map_err(|_| {
                ProviderError::Unavailable(
                    "on-device model is not supported on this device".to_string(),
                )
            })?;

        if !output.status.success() {
            return Err(ProviderError::Unavailable(
                "on-device model is not available".to_string(),
            ));
        }

        Ok(())
    }

    /// Run one generation in a fresh session. The child is spawned with
    /// kill-on-drop so it is released no matter how the call ends.
    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        self.probe().await?;

        debug!("Opening on-device model session");

        let mut child = Command::new(&self.binary)
            .args(["generate", "--system", system])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::ModelCrash(format!("failed to open session: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(user.as_bytes())
                .await
                .map_err(|e| ProviderError::ModelCrash(format!("failed to send prompt: {}", e)))?;
            // Drop stdin to signal EOF
        }

        let output = timeout(SESSION_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                ProviderError::ModelCrash(format!(
                    "on-device session timed out after {:?}",
                    SESSION_TIMEOUT
                ))
            })?
            .map_err(|e| ProviderError::ModelCrash(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::ModelCrash(format!(
                "on-device model failed: {}",
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| ProviderError::Malformed("session output is not valid UTF-8".to_string()))
    }
}

#[async_trait]
impl InferenceProvider for OnDeviceProvider {
    fn name(&self) -> &str {
        "on-device"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        _mime: &str,
        _progress: Progress<'_>,
    ) -> Result<String, ProviderError> {
        if audio.is_empty() {
            return Err(ProviderError::MediaMissing);
        }

        Err(ProviderError::Unavailable(
            "on-device model cannot transcribe audio".to_string(),
        ))
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
        let raw = self.generate(&system, &user).await?;

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

        let raw = self.generate(&system, &user).await?;
        parse_questions(&raw)
    }
}
