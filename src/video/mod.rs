mod ffmpeg;

pub use ffmpeg::Ffmpeg;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local media operations delegated to an external tool.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Save the final frame of `video` as a still image at `frame`.
    async fn extract_last_frame(&self, video: &Path, frame: &Path) -> Result<PathBuf>;

    /// Join clips in the given order.
    async fn concatenate_videos(&self, videos: &[PathBuf], output: &Path) -> Result<PathBuf>;

    /// Join narration tracks in the given order.
    async fn concatenate_audio(&self, audio: &[PathBuf], output: &Path) -> Result<PathBuf>;

    /// Put `audio` under `video`, cut to the shorter of the two.
    async fn mux_and_trim(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf>;
}
