//! Fakes shared by unit tests.

use crate::api::{AiService, ContinuityImage, JobHandle, JobStatus, VideoRequest, VoiceProfile};
use crate::error::{Result, VideoError};
use crate::scene::Scene;
use crate::video::MediaTool;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) fn scene(id: u32) -> Scene {
    Scene {
        scene_id: id,
        spoken_markup: format!("<speak>Part {}</speak>", id),
        visual_description: format!("Shot {}", id),
        transition_hint: "slow dissolve".to_string(),
    }
}

/// Gateway stand-in. Video jobs finish on the first poll.
#[derive(Default)]
pub(crate) struct FakeAi {
    pub script_reply: String,
    /// 1-based index of the video submission that fails
    pub fail_submit: Option<usize>,
    pub text_calls: Mutex<Vec<(String, bool)>>,
    pub speech_calls: Mutex<Vec<String>>,
    pub submits: Mutex<Vec<(String, Option<ContinuityImage>)>>,
}

impl FakeAi {
    pub fn remote_calls(&self) -> usize {
        self.text_calls.lock().unwrap().len()
            + self.speech_calls.lock().unwrap().len()
            + self.submits.lock().unwrap().len()
    }
}

#[async_trait]
impl AiService for FakeAi {
    async fn generate_text(&self, prompt: &str, enable_search: bool) -> Result<String> {
        self.text_calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), enable_search));
        Ok(if enable_search {
            "Grounded context".to_string()
        } else {
            self.script_reply.clone()
        })
    }

    async fn synthesize_speech(&self, markup: &str, _: VoiceProfile) -> Result<Vec<u8>> {
        self.speech_calls.lock().unwrap().push(markup.to_string());
        Ok(format!("audio:{}", markup).into_bytes())
    }

    async fn submit_video_job(&self, request: VideoRequest<'_>) -> Result<JobHandle> {
        let mut submits = self.submits.lock().unwrap();
        submits.push((request.prompt, request.continuity.cloned()));
        if self.fail_submit == Some(submits.len()) {
            return Err(VideoError::service("Video API returned 500"));
        }
        Ok(JobHandle(format!("operations/{}", submits.len())))
    }

    async fn poll_video_job(&self, handle: &JobHandle) -> Result<JobStatus> {
        Ok(JobStatus::Done(format!("files/{}", handle.0)))
    }

    async fn download_video(&self, location: &str) -> Result<Vec<u8>> {
        Ok(format!("video:{}", location).into_bytes())
    }
}

/// Media tool that writes marker files instead of running FFmpeg.
#[derive(Default)]
pub(crate) struct FakeMedia {
    pub fail_extract: bool,
    pub calls: Mutex<Vec<(String, Vec<PathBuf>)>>,
}

impl FakeMedia {
    pub fn extract_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == "extract")
            .count()
    }

    pub fn inputs_of(&self, op: &str) -> Option<Vec<PathBuf>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == op)
            .map(|(_, inputs)| inputs.clone())
    }

    fn record(&self, op: &str, inputs: Vec<PathBuf>) {
        self.calls.lock().unwrap().push((op.to_string(), inputs));
    }
}

async fn write_marker(path: &Path, contents: String) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(path.to_path_buf())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_last_frame(&self, video: &Path, frame: &Path) -> Result<PathBuf> {
        self.record("extract", vec![video.to_path_buf()]);
        if self.fail_extract {
            return Err(VideoError::media_tool("ffmpeg exited with status 1"));
        }
        write_marker(frame, format!("frame-of-{}", file_name(video))).await
    }

    async fn concatenate_videos(&self, videos: &[PathBuf], output: &Path) -> Result<PathBuf> {
        self.record("concat_video", videos.to_vec());
        write_marker(output, "merged video".to_string()).await
    }

    async fn concatenate_audio(&self, audio: &[PathBuf], output: &Path) -> Result<PathBuf> {
        self.record("concat_audio", audio.to_vec());
        write_marker(output, "merged audio".to_string()).await
    }

    async fn mux_and_trim(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        self.record("mux", vec![video.to_path_buf(), audio.to_path_buf()]);
        write_marker(output, "final".to_string()).await
    }
}
