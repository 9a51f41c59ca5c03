use super::MediaTool;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// [`MediaTool`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Ffmpeg {
    /// Use `ffmpeg` (or the given binary) and the `ffprobe` next to it.
    ///
    /// Binaries that cannot be found are reported when first run, so stages
    /// that never touch media work without them.
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        let ffmpeg = ffmpeg
            .or_else(|| which::which("ffmpeg").ok())
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        let sibling = ffmpeg.with_file_name(if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" });
        let ffprobe = if sibling.is_file() {
            sibling
        } else {
            which::which("ffprobe").unwrap_or_else(|_| PathBuf::from("ffprobe"))
        };
        Self { ffmpeg, ffprobe }
    }

    async fn run_ffmpeg(&self, args: &[String], what: &str) -> Result<Output> {
        debug!("ffmpeg {}", args.join(" "));
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .output()
            .await
            .map_err(|e| VideoError::media_tool(format!("Failed to run FFmpeg: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::media_tool(format!(
                "FFmpeg {} failed: {}",
                what,
                tail(&error, 20)
            )));
        }
        Ok(output)
    }

    /// Container duration in seconds, if ffprobe can tell.
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path, kind: &str) -> Result<PathBuf> {
        if inputs.is_empty() {
            return Err(VideoError::media_tool(format!("no {} inputs to concatenate", kind)));
        }
        info!("Concatenating {} {} files...", inputs.len(), kind);

        let list_file = list_file_for(output);
        tokio::fs::write(&list_file, concat_list(inputs)).await?;

        let args = strings([
            "-y",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
            &list_file.to_string_lossy(),
            "-c",
            "copy",
            &output.to_string_lossy(),
        ]);
        let result = self.run_ffmpeg(&args, &format!("{} concat", kind)).await;
        tokio::fs::remove_file(&list_file).await.ok();
        result?;

        ensure_output(output).await?;
        info!("Concatenated {}: {}", kind, output.display());
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl MediaTool for Ffmpeg {
    async fn extract_last_frame(&self, video: &Path, frame: &Path) -> Result<PathBuf> {
        ensure_input(video).await?;
        if let Some(parent) = frame.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = strings([
            "-y",
            "-sseof",
            "-1",
            "-i",
            &video.to_string_lossy(),
            "-update",
            "1",
            "-q:v",
            "2",
            &frame.to_string_lossy(),
        ]);
        self.run_ffmpeg(&args, "last frame extraction").await?;

        ensure_output(frame).await?;
        debug!("Extracted last frame: {}", frame.display());
        Ok(frame.to_path_buf())
    }

    async fn concatenate_videos(&self, videos: &[PathBuf], output: &Path) -> Result<PathBuf> {
        self.concat(videos, output, "video").await
    }

    async fn concatenate_audio(&self, audio: &[PathBuf], output: &Path) -> Result<PathBuf> {
        self.concat(audio, output, "audio").await
    }

    async fn mux_and_trim(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        info!("Adding audio to video...");
        ensure_input(video).await?;
        ensure_input(audio).await?;

        let video_secs = self.probe_duration(video).await;
        let audio_secs = self.probe_duration(audio).await;
        let duration = trimmed_duration(video_secs, audio_secs);
        if duration.is_none() {
            warn!("Could not probe durations, relying on -shortest");
        }

        let args = mux_args(video, audio, output, duration);
        self.run_ffmpeg(&args, "audio merge").await?;

        ensure_output(output).await?;
        info!("Added audio to video: {}", output.display());
        Ok(output.to_path_buf())
    }
}

/// Output length when muxing: the shorter stream wins.
fn trimmed_duration(video: Option<f64>, audio: Option<f64>) -> Option<f64> {
    match (video, audio) {
        (Some(v), Some(a)) => Some(v.min(a)),
        _ => None,
    }
}

fn mux_args(video: &Path, audio: &Path, output: &Path, duration: Option<f64>) -> Vec<String> {
    let mut args = strings([
        "-y",
        "-i",
        &video.to_string_lossy(),
        "-i",
        &audio.to_string_lossy(),
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
    ]);
    if let Some(secs) = duration {
        args.push("-t".to_string());
        args.push(format!("{:.3}", secs));
    }
    args.push("-shortest".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Body of a concat demuxer list file.
fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

fn list_file_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "concat".to_string());
    output.with_file_name(format!("{}_list.txt", stem))
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

async fn ensure_input(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(VideoError::media_tool(format!("{} is empty", path.display()))),
        Err(e) => Err(VideoError::media_tool(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

async fn ensure_output(path: &Path) -> Result<()> {
    ensure_input(path)
        .await
        .map_err(|_| VideoError::media_tool(format!("FFmpeg produced no output at {}", path.display())))
}
