//! Pipeline configuration.

use crate::api::{Backoff, VoiceProfile, WaitPolicy};
use crate::error::{Result, VideoError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.thucchien.ai";
pub const API_KEY_ENV: &str = "AI_GATEWAY_API_KEY";
pub const BASE_URL_ENV: &str = "AI_GATEWAY_BASE_URL";

/// Everything the pipeline components need, built once per invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Gateway credential
    pub api_key: String,
    /// Gateway root, without trailing slash
    pub base_url: String,
    /// Directory holding every artifact of a run
    pub output_dir: PathBuf,
    pub text_model: String,
    pub tts_model: String,
    pub video_model: String,
    pub voice: VoiceProfile,
    /// Scene count requested from the compose prompt
    pub scene_count: usize,
    pub compose_max_tokens: u32,
    /// Grounded context appended to the compose prompt is cut to this many chars
    pub context_char_limit: usize,
    pub video_wait: WaitPolicy,
    pub http_timeout: Duration,
    /// Directory with prompt template overrides
    pub prompts_dir: Option<PathBuf>,
    /// Explicit ffmpeg binary; looked up on PATH otherwise
    pub ffmpeg_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(api_key: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: output_dir.into(),
            text_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            video_model: "veo-3.0-generate-001".to_string(),
            voice: VoiceProfile::default(),
            scene_count: 10,
            compose_max_tokens: 10_000,
            context_char_limit: 4_000,
            video_wait: WaitPolicy {
                timeout: Duration::from_secs(600),
                backoff: Backoff::default(),
                poll_retries: 3,
            },
            http_timeout: Duration::from_secs(300),
            prompts_dir: None,
            ffmpeg_path: None,
        }
    }

    /// Build the configuration from CLI overrides, the process environment and the credential file.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        Self::resolve(overrides, |name| std::env::var(name).ok())
    }

    fn resolve(overrides: ConfigOverrides, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = CredentialFile::read(&overrides.credentials)?;

        let api_key = overrides
            .api_key
            .or_else(|| env(API_KEY_ENV))
            .or(file.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                VideoError::config(format!(
                    "no API key: pass --api-key, set {} or add GOOGLE_API_KEY to {}",
                    API_KEY_ENV,
                    overrides.credentials.display()
                ))
            })?;

        let mut config = Self::new(api_key, overrides.output_dir);
        if let Some(url) = overrides
            .base_url
            .or_else(|| env(BASE_URL_ENV))
            .or(file.base_url)
        {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(voice) = overrides.voice {
            config.voice = voice;
        }
        config.prompts_dir = overrides.prompts_dir;
        config.ffmpeg_path = overrides.ffmpeg;
        Ok(config)
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub credentials: PathBuf,
    pub output_dir: PathBuf,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub voice: Option<VoiceProfile>,
    pub prompts_dir: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialFile {
    #[serde(rename = "GOOGLE_API_KEY")]
    api_key: Option<String>,
    #[serde(rename = "BASE_URL")]
    base_url: Option<String>,
}

impl CredentialFile {
    /// A missing file is not an error; the key may come from elsewhere.
    fn read(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                VideoError::config(format!("invalid credential file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(VideoError::config(format!(
                "cannot read credential file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn overrides(dir: &TempDir) -> ConfigOverrides {
        ConfigOverrides {
            credentials: dir.path().join("env.json"),
            output_dir: dir.path().join("outputs"),
            ..Default::default()
        }
    }

    #[test]
    fn reads_key_and_base_url_from_credential_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("env.json"),
            r#"{"GOOGLE_API_KEY": "file-key", "BASE_URL": "https://gw.example/"}"#,
        )
        .unwrap();

        let config = PipelineConfig::resolve(overrides(&dir), |_| None).unwrap();

        assert_eq!(config.api_key, "file-key");
        assert_eq!(config.base_url, "https://gw.example");
        assert_eq!(config.output_dir, dir.path().join("outputs"));
    }

    #[test]
    fn cli_beats_environment_beats_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("env.json"), r#"{"GOOGLE_API_KEY": "file-key"}"#).unwrap();
        let env = |name: &str| match name {
            API_KEY_ENV => Some("env-key".to_string()),
            _ => None,
        };

        let from_env = PipelineConfig::resolve(overrides(&dir), env).unwrap();
        assert_eq!(from_env.api_key, "env-key");
        assert_eq!(from_env.base_url, DEFAULT_BASE_URL);

        let mut cli = overrides(&dir);
        cli.api_key = Some("cli-key".into());
        cli.voice = Some(VoiceProfile::Kore);
        let from_cli = PipelineConfig::resolve(cli, env).unwrap();
        assert_eq!(from_cli.api_key, "cli-key");
        assert_eq!(from_cli.voice, VoiceProfile::Kore);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let err = PipelineConfig::resolve(overrides(&dir), |_| None).unwrap_err();
        assert!(matches!(err, VideoError::Config(_)));
    }

    #[test]
    fn malformed_credential_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("env.json"), "GOOGLE_API_KEY=abc").unwrap();
        let err = PipelineConfig::resolve(overrides(&dir), |_| None).unwrap_err();
        assert!(matches!(err, VideoError::Config(_)));
    }
}
