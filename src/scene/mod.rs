mod renderer;

pub use renderer::SceneRenderer;

use crate::error::{Result, VideoError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

pub const SCRIPT_PATH: &str = "scripts/script.json";
pub const SEARCH_CONTEXT_PATH: &str = "scripts/search_context.txt";
pub const AUDIO_DIR: &str = "audio";
pub const VIDEO_DIR: &str = "video";
pub const FRAMES_DIR: &str = "frames";

/// One narrated segment of the final video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// 1-based position in the script
    pub scene_id: u32,
    /// Narration as speech-synthesis markup
    #[serde(rename = "ssml")]
    pub spoken_markup: String,
    /// What the clip should show
    #[serde(rename = "visual_desc")]
    pub visual_description: String,
    /// How to cut in from the previous scene
    #[serde(default)]
    pub transition_hint: String,
}

/// Ordered scenes whose ids run 1..=N.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Script {
    scenes: Vec<Scene>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptDocument {
    Scenes(Vec<Scene>),
    Wrapped { scenes: Vec<Scene> },
}

impl Script {
    /// Validate scenes into a script.
    pub fn new(scenes: Vec<Scene>) -> Result<Self> {
        if scenes.is_empty() {
            return Err(VideoError::invalid_script("script has no scenes"));
        }

        let mut seen = HashSet::new();
        for (position, scene) in scenes.iter().enumerate() {
            if !seen.insert(scene.scene_id) {
                return Err(VideoError::invalid_script(format!(
                    "duplicate scene_id {}",
                    scene.scene_id
                )));
            }
            let expected = position as u32 + 1;
            if scene.scene_id != expected {
                return Err(VideoError::invalid_script(format!(
                    "scene at position {} has scene_id {}, expected {}",
                    expected, scene.scene_id, expected
                )));
            }
            if scene.spoken_markup.trim().is_empty() {
                return Err(VideoError::invalid_script(format!(
                    "scene {} has empty ssml",
                    scene.scene_id
                )));
            }
            if scene.visual_description.trim().is_empty() {
                return Err(VideoError::invalid_script(format!(
                    "scene {} has empty visual_desc",
                    scene.scene_id
                )));
            }
        }

        Ok(Self { scenes })
    }

    /// Parse a model reply, tolerating Markdown code fences around the JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let json_text = strip_code_fence(text);
        let document: ScriptDocument = serde_json::from_str(json_text)
            .map_err(|e| VideoError::invalid_script(format!("failed to parse script JSON: {}", e)))?;

        match document {
            ScriptDocument::Scenes(scenes) | ScriptDocument::Wrapped { scenes } => Self::new(scenes),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.scenes)?)
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scene_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.scenes.iter().map(|s| s.scene_id)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (```json) up to the first newline
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches("json"),
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Files produced for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneArtifact {
    pub scene_id: u32,
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    pub last_frame_path: Option<PathBuf>,
}

pub fn audio_path(scene_id: u32) -> PathBuf {
    PathBuf::from(AUDIO_DIR).join(format!("scene_{:02}.mp3", scene_id))
}

pub fn video_path(scene_id: u32) -> PathBuf {
    PathBuf::from(VIDEO_DIR).join(format!("scene_{:02}.mp4", scene_id))
}

pub fn frame_path(scene_id: u32) -> PathBuf {
    PathBuf::from(FRAMES_DIR).join(format!("scene_{:02}_last.png", scene_id))
}

/// Scene id encoded in a `scene_NN.<ext>` file name.
pub fn scene_id_from_file_name(name: &str, extension: &str) -> Option<u32> {
    name.strip_prefix("scene_")?
        .strip_suffix(extension)?
        .strip_suffix('.')?
        .parse()
        .ok()
}
