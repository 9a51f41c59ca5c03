mod gateway;
pub mod job;

pub use gateway::GatewayClient;
pub use job::{await_video_job, Backoff, Clock, TokioClock, WaitPolicy};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Voices offered by the speech endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VoiceProfile {
    #[default]
    Zephyr,
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
}

impl VoiceProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zephyr => "Zephyr",
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
        }
    }
}

impl fmt::Display for VoiceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        <Self as clap::ValueEnum>::from_str(s, true).map_err(|_| format!("unknown voice profile: {}", s))
    }
}

/// Opaque handle of a remote video generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote state of a video job, as seen by a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    /// Finished; carries the location the clip can be downloaded from.
    Done(String),
    Failed(String),
}

/// Still image anchoring the first frame of the next clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityImage {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

impl ContinuityImage {
    pub fn new(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for(&self.path)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Video generation request for one scene.
#[derive(Debug, Clone)]
pub struct VideoRequest<'a> {
    pub prompt: String,
    pub continuity: Option<&'a ContinuityImage>,
}

/// The remote generative capabilities the pipeline depends on.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Generate text; with `enable_search` the model may ground its answer in web results.
    async fn generate_text(&self, prompt: &str, enable_search: bool) -> Result<String>;

    async fn synthesize_speech(&self, markup: &str, voice: VoiceProfile) -> Result<Vec<u8>>;

    async fn submit_video_job(&self, request: VideoRequest<'_>) -> Result<JobHandle>;

    /// Single non-blocking status check.
    async fn poll_video_job(&self, handle: &JobHandle) -> Result<JobStatus>;

    async fn download_video(&self, location: &str) -> Result<Vec<u8>>;
}
