use super::{audio_path, frame_path, video_path, Scene, SceneArtifact, Script};
use crate::api::{await_video_job, AiService, Clock, ContinuityImage, VideoRequest, VoiceProfile, WaitPolicy};
use crate::config::PipelineConfig;
use crate::error::{Result, VideoError};
use crate::progress::ProgressLog;
use crate::prompts::Prompts;
use crate::storage::ArtifactStore;
use crate::video::MediaTool;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Turns scenes into narration and footage, one scene at a time.
///
/// The last frame of each clip anchors the first frame of the next one, so
/// scenes are rendered strictly in order.
pub struct SceneRenderer {
    ai: Arc<dyn AiService>,
    media: Arc<dyn MediaTool>,
    store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    prompts: Prompts,
    progress: ProgressLog,
    voice: VoiceProfile,
    wait: WaitPolicy,
}

impl SceneRenderer {
    pub fn new(
        config: &PipelineConfig,
        ai: Arc<dyn AiService>,
        media: Arc<dyn MediaTool>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        prompts: Prompts,
        progress: ProgressLog,
    ) -> Self {
        Self {
            ai,
            media,
            store,
            clock,
            prompts,
            progress,
            voice: config.voice,
            wait: config.video_wait,
        }
    }

    /// Render every scene of `script`, reusing artifacts already on disk.
    ///
    /// Stops at the first scene that fails; earlier artifacts stay in place.
    pub async fn render_scenes(&self, script: &Script) -> Result<Vec<SceneArtifact>> {
        let mut artifacts = Vec::with_capacity(script.len());
        let mut continuity: Option<ContinuityImage> = None;
        let mut previous: Option<&Scene> = None;

        for scene in script.scenes() {
            let is_last = scene.scene_id as usize == script.len();
            self.progress
                .record(format!("Scene {} started", scene.scene_id))
                .await;

            match self
                .render_scene(scene, previous, continuity.take(), is_last)
                .await
            {
                Ok((artifact, next)) => {
                    self.progress
                        .record(format!("Scene {} done", scene.scene_id))
                        .await;
                    artifacts.push(artifact);
                    continuity = next;
                }
                Err(e) => {
                    self.progress
                        .record(format!(
                            "Scene {} failed with {}: {}",
                            scene.scene_id,
                            e.kind(),
                            e
                        ))
                        .await;
                    return Err(VideoError::SceneFailed {
                        scene_id: scene.scene_id,
                        source: Box::new(e),
                    });
                }
            }
            previous = Some(scene);
        }

        self.progress
            .record(format!("Completed {} scenes", artifacts.len()))
            .await;
        Ok(artifacts)
    }

    async fn render_scene(
        &self,
        scene: &Scene,
        previous: Option<&Scene>,
        continuity: Option<ContinuityImage>,
        is_last: bool,
    ) -> Result<(SceneArtifact, Option<ContinuityImage>)> {
        let id = scene.scene_id;
        let audio = audio_path(id);
        let video = video_path(id);

        if self.store.exists(&audio).await {
            self.progress
                .record(format!("[TTS] Scene {} audio exists, skipping", id))
                .await;
        } else {
            let bytes = self
                .ai
                .synthesize_speech(&scene.spoken_markup, self.voice)
                .await?;
            self.store.write(&audio, &bytes).await?;
            self.progress
                .record(format!("[TTS] Scene {} saved to {}", id, audio.display()))
                .await;
        }

        let generated = !self.store.exists(&video).await;
        if !generated {
            self.progress
                .record(format!("[Video] Scene {} video exists, skipping", id))
                .await;
        } else {
            let prompt = self.prompts.scene(
                previous.map(|p| p.visual_description.as_str()).unwrap_or(""),
                &scene.transition_hint,
                &scene.visual_description,
            );
            self.progress
                .record(format!(
                    "[Video] Generating scene {} ({})",
                    id,
                    match &continuity {
                        Some(image) => format!("anchored to {}", image.path.display()),
                        None => "no continuity anchor".to_string(),
                    }
                ))
                .await;

            let handle = self
                .ai
                .submit_video_job(VideoRequest {
                    prompt,
                    continuity: continuity.as_ref(),
                })
                .await?;
            let bytes = await_video_job(self.ai.as_ref(), &handle, &self.wait, self.clock.as_ref()).await?;
            self.store.write(&video, &bytes).await?;
            self.progress
                .record(format!("[Video] Scene {} saved to {}", id, video.display()))
                .await;
        }

        let next = if is_last {
            None
        } else {
            self.continuity_frame(id, &video, generated).await
        };

        let artifact = SceneArtifact {
            scene_id: id,
            audio_path: audio,
            video_path: video,
            last_frame_path: next.as_ref().map(|image| image.path.clone()),
        };
        Ok((artifact, next))
    }

    /// Last frame of scene `id`, or `None` when it cannot be produced.
    ///
    /// A frame already on disk only belongs to `video` when the clip itself
    /// was reused; a freshly generated clip always gets a new frame.
    async fn continuity_frame(&self, id: u32, video: &Path, generated: bool) -> Option<ContinuityImage> {
        let frame = frame_path(id);

        if generated {
            if let Err(e) = self.store.remove(&frame).await {
                warn!("Could not remove stale frame {}: {}", frame.display(), e);
            }
        }
        if generated || !self.store.exists(&frame).await {
            let extracted = self
                .media
                .extract_last_frame(&self.store.resolve(video), &self.store.resolve(&frame))
                .await;
            if let Err(e) = extracted {
                warn!("Continuity frame for scene {} unavailable: {}", id, e);
                self.progress
                    .record(format!(
                        "[FFMPEG] Last frame of scene {} not extracted ({}), next scene has no anchor",
                        id,
                        e.kind()
                    ))
                    .await;
                return None;
            }
            self.progress
                .record(format!("[FFMPEG] Extracted last frame for scene {}", id))
                .await;
        }

        match self.store.read(&frame).await {
            Ok(data) if !data.is_empty() => Some(ContinuityImage::new(frame, data)),
            Ok(_) | Err(_) => {
                warn!("Continuity frame {} is unreadable", frame.display());
                None
            }
        }
    }
}
