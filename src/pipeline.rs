//! Stage sequencing for one invocation.

use crate::api::{AiService, Clock};
use crate::config::PipelineConfig;
use crate::error::{Result, VideoError};
use crate::progress::ProgressLog;
use crate::prompts::Prompts;
use crate::scene::{
    audio_path, frame_path, scene_id_from_file_name, video_path, SceneArtifact, SceneRenderer,
    AUDIO_DIR, VIDEO_DIR,
};
use crate::script::{load_script, ScriptSynthesizer};
use crate::storage::ArtifactStore;
use crate::video::MediaTool;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FINAL_VIDEO: &str = "final_video.mp4";
const MERGED_VIDEO: &str = "merged_video.mp4";
const MERGED_AUDIO: &str = "merged_audio.mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    /// Research the topic and write the script
    Script,
    /// Render audio and video for every scene
    Scenes,
    /// Join scene media into the final video
    Concat,
    /// All of the above, in order
    All,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Script => "script",
            Self::Scenes => "scenes",
            Self::Concat => "concat",
            Self::All => "all",
        })
    }
}

pub struct PipelineController {
    store: Arc<dyn ArtifactStore>,
    media: Arc<dyn MediaTool>,
    progress: ProgressLog,
    synthesizer: ScriptSynthesizer,
    renderer: SceneRenderer,
}

impl PipelineController {
    pub fn new(
        config: &PipelineConfig,
        ai: Arc<dyn AiService>,
        media: Arc<dyn MediaTool>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        prompts: Prompts,
    ) -> Self {
        let progress = ProgressLog::new(store.clone());
        let synthesizer = ScriptSynthesizer::new(
            config,
            ai.clone(),
            store.clone(),
            prompts.clone(),
            progress.clone(),
        );
        let renderer = SceneRenderer::new(
            config,
            ai,
            media.clone(),
            store.clone(),
            clock,
            prompts,
            progress.clone(),
        );

        Self {
            store,
            media,
            progress,
            synthesizer,
            renderer,
        }
    }

    /// Run `stage`. Artifacts written before a failure stay on disk.
    pub async fn run(&self, topic: &str, stage: Stage, skip_search: bool) -> Result<()> {
        self.progress
            .record(format!("Pipeline started: stage {}, topic '{}'", stage, topic))
            .await;

        match stage {
            Stage::Script => {
                self.stage(Stage::Script, self.synthesizer.generate_script(topic, skip_search))
                    .await?;
            }
            Stage::Scenes => {
                self.stage(Stage::Scenes, self.render_saved_script()).await?;
            }
            Stage::Concat => {
                self.stage(Stage::Concat, self.concat()).await?;
            }
            Stage::All => {
                let script = self
                    .stage(Stage::Script, self.synthesizer.generate_script(topic, skip_search))
                    .await?;
                self.stage(Stage::Scenes, self.renderer.render_scenes(&script))
                    .await?;
                self.stage(Stage::Concat, self.concat()).await?;
            }
        }

        self.progress
            .record(format!("Pipeline finished with stage: {}", stage))
            .await;
        Ok(())
    }

    async fn stage<T>(&self, stage: Stage, work: impl Future<Output = Result<T>>) -> Result<T> {
        self.progress
            .record(format!("Stage {} started", stage))
            .await;
        match work.await {
            Ok(value) => {
                self.progress
                    .record(format!("Stage {} finished", stage))
                    .await;
                Ok(value)
            }
            Err(e) => {
                let scene = e
                    .scene_id()
                    .map(|id| format!(" at scene {}", id))
                    .unwrap_or_default();
                self.progress
                    .record(format!(
                        "Stage {} failed{} with {}: {}",
                        stage,
                        scene,
                        e.kind(),
                        e
                    ))
                    .await;
                Err(e)
            }
        }
    }

    async fn render_saved_script(&self) -> Result<Vec<SceneArtifact>> {
        let script = load_script(self.store.as_ref()).await?;
        self.renderer.render_scenes(&script).await
    }

    /// Join every scene's clip and narration into the final video.
    async fn concat(&self) -> Result<PathBuf> {
        let artifacts = order_for_concat(self.collect_artifacts().await?);

        let resolve = |path: &Path| self.store.resolve(path);
        let videos: Vec<PathBuf> = artifacts.iter().map(|a| resolve(&a.video_path)).collect();
        let audio: Vec<PathBuf> = artifacts.iter().map(|a| resolve(&a.audio_path)).collect();
        let merged_video = resolve(Path::new(MERGED_VIDEO));
        let merged_audio = resolve(Path::new(MERGED_AUDIO));
        let output = resolve(Path::new(FINAL_VIDEO));

        self.media.concatenate_videos(&videos, &merged_video).await?;
        self.media.concatenate_audio(&audio, &merged_audio).await?;
        self.media
            .mux_and_trim(&merged_video, &merged_audio, &output)
            .await?;

        for intermediate in [MERGED_VIDEO, MERGED_AUDIO] {
            if let Err(e) = self.store.remove(Path::new(intermediate)).await {
                tracing::warn!("Could not remove {}: {}", intermediate, e);
            }
        }

        self.progress
            .record(format!(
                "Final video created from {} scenes: {}",
                artifacts.len(),
                output.display()
            ))
            .await;
        Ok(output)
    }

    /// Artifacts of every expected scene, or the list of what is missing.
    ///
    /// Expected scenes come from the saved script, or from the scene files
    /// present when no script was kept.
    async fn collect_artifacts(&self) -> Result<Vec<SceneArtifact>> {
        let expected: Vec<u32> = match load_script(self.store.as_ref()).await {
            Ok(script) => script.scene_ids().collect(),
            Err(VideoError::MissingScript(_)) => self.discover_scene_ids().await?,
            Err(e) => return Err(e),
        };
        if expected.is_empty() {
            return Err(VideoError::MissingArtifacts(format!(
                "no scene output under {}",
                self.store.resolve(Path::new(VIDEO_DIR)).display()
            )));
        }

        let mut artifacts = Vec::with_capacity(expected.len());
        let mut missing = Vec::new();
        for id in expected {
            let audio = audio_path(id);
            let video = video_path(id);
            let frame = frame_path(id);
            for path in [&audio, &video] {
                if !self.store.exists(path).await {
                    missing.push(path.display().to_string());
                }
            }
            let has_frame = self.store.exists(&frame).await;
            artifacts.push(SceneArtifact {
                scene_id: id,
                last_frame_path: has_frame.then_some(frame),
                audio_path: audio,
                video_path: video,
            });
        }

        if !missing.is_empty() {
            return Err(VideoError::MissingArtifacts(missing.join(", ")));
        }
        Ok(artifacts)
    }

    async fn discover_scene_ids(&self) -> Result<Vec<u32>> {
        let mut ids = BTreeSet::new();
        for (dir, extension) in [(VIDEO_DIR, "mp4"), (AUDIO_DIR, "mp3")] {
            for name in self.store.list(Path::new(dir)).await? {
                if let Some(id) = scene_id_from_file_name(&name, extension) {
                    ids.insert(id);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }
}

/// Scene order, numeric by id regardless of how the files sort by name.
pub fn order_for_concat(mut artifacts: Vec<SceneArtifact>) -> Vec<SceneArtifact> {
    artifacts.sort_by_key(|a| a.scene_id);
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::job::tests::ManualClock;
    use crate::scene::SCRIPT_PATH;
    use crate::storage::FsStore;
    use crate::testing::{FakeAi, FakeMedia};
    use tempfile::TempDir;

    const REPLY: &str = r#"[
      {"scene_id": 1, "ssml": "<speak>One</speak>", "visual_desc": "Newsroom", "transition_hint": ""},
      {"scene_id": 2, "ssml": "<speak>Two</speak>", "visual_desc": "Street", "transition_hint": "pan"},
      {"scene_id": 3, "ssml": "<speak>Three</speak>", "visual_desc": "Crowd", "transition_hint": "cut"}
    ]"#;

    struct Harness {
        dir: TempDir,
        ai: Arc<FakeAi>,
        media: Arc<FakeMedia>,
        controller: PipelineController,
    }

    fn harness(ai: FakeAi) -> Harness {
        let dir = TempDir::new().unwrap();
        let ai = Arc::new(ai);
        let media = Arc::new(FakeMedia::default());
        let config = PipelineConfig::new("key", dir.path());
        let controller = PipelineController::new(
            &config,
            ai.clone(),
            media.clone(),
            Arc::new(FsStore::new(dir.path())),
            Arc::new(ManualClock::default()),
            Prompts::default(),
        );
        Harness {
            dir,
            ai,
            media,
            controller,
        }
    }

    fn scripted() -> FakeAi {
        FakeAi {
            script_reply: REPLY.to_string(),
            ..FakeAi::default()
        }
    }

    fn log_of(h: &Harness) -> String {
        std::fs::read_to_string(h.dir.path().join("pipeline_log.txt")).unwrap()
    }

    fn touch(h: &Harness, relative: PathBuf) {
        let path = h.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"data").unwrap();
    }

    #[tokio::test]
    async fn all_stage_produces_final_video() {
        let h = harness(scripted());

        h.controller.run("harbour strike", Stage::All, false).await.unwrap();

        assert!(h.dir.path().join(SCRIPT_PATH).exists());
        assert!(h.dir.path().join(FINAL_VIDEO).exists());
        assert!(!h.dir.path().join(MERGED_VIDEO).exists());
        assert_eq!(h.ai.speech_calls.lock().unwrap().len(), 3);

        let videos = h.media.inputs_of("concat_video").unwrap();
        assert_eq!(
            videos,
            (1..=3).map(|id| h.dir.path().join(video_path(id))).collect::<Vec<_>>()
        );

        let log = log_of(&h);
        assert!(log.contains("Stage script finished"));
        assert!(log.contains("Stage scenes finished"));
        assert!(log.contains("Pipeline finished with stage: all"));
    }

    #[tokio::test]
    async fn scenes_stage_needs_a_script() {
        let h = harness(scripted());

        let err = h.controller.run("harbour strike", Stage::Scenes, false).await.unwrap_err();

        assert!(matches!(err, VideoError::MissingScript(_)));
        assert_eq!(h.ai.remote_calls(), 0);
        assert!(log_of(&h).contains("Stage scenes failed with MissingScriptError"));
    }

    #[tokio::test]
    async fn concat_without_scene_output_touches_no_media() {
        let h = harness(scripted());

        let err = h.controller.run("harbour strike", Stage::Concat, false).await.unwrap_err();

        assert!(matches!(err, VideoError::MissingArtifacts(_)));
        assert!(h.media.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concat_reports_each_missing_file() {
        let h = harness(scripted());
        h.controller.run("harbour strike", Stage::Script, false).await.unwrap();
        for id in 1..=3 {
            touch(&h, video_path(id));
        }
        touch(&h, audio_path(1));

        let err = h.controller.run("harbour strike", Stage::Concat, false).await.unwrap_err();

        let VideoError::MissingArtifacts(missing) = err else {
            panic!("expected missing artifacts, got {:?}", err);
        };
        assert!(missing.contains("scene_02.mp3"));
        assert!(missing.contains("scene_03.mp3"));
        assert!(h.media.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concat_orders_scenes_numerically() {
        let h = harness(scripted());
        for id in [100, 99] {
            touch(&h, video_path(id));
            touch(&h, audio_path(id));
        }

        h.controller.run("harbour strike", Stage::Concat, false).await.unwrap();

        assert_eq!(
            h.media.inputs_of("concat_audio").unwrap(),
            vec![
                h.dir.path().join("audio/scene_99.mp3"),
                h.dir.path().join("audio/scene_100.mp3"),
            ]
        );
    }

    #[test]
    fn out_of_order_artifacts_are_sorted_by_scene_id() {
        let artifact = |id| SceneArtifact {
            scene_id: id,
            audio_path: audio_path(id),
            video_path: video_path(id),
            last_frame_path: None,
        };

        let ordered = order_for_concat(vec![artifact(3), artifact(1), artifact(2)]);
        assert_eq!(ordered.iter().map(|a| a.scene_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn scene_failure_aborts_all_and_names_the_scene() {
        let h = harness(FakeAi {
            fail_submit: Some(2),
            ..scripted()
        });

        let err = h.controller.run("harbour strike", Stage::All, false).await.unwrap_err();

        assert_eq!(err.scene_id(), Some(2));
        assert!(h.media.inputs_of("concat_video").is_none());
        assert!(h.dir.path().join("video/scene_01.mp4").exists());
        assert!(log_of(&h).contains("Stage scenes failed at scene 2 with ServiceError"));
        assert!(!log_of(&h).contains("Stage concat started"));
    }

    #[tokio::test]
    async fn resumed_scenes_stage_skips_finished_work() {
        let h = harness(scripted());
        h.controller.run("harbour strike", Stage::All, false).await.unwrap();
        let calls_after_first_run = h.ai.remote_calls();

        h.controller.run("harbour strike", Stage::Scenes, false).await.unwrap();

        assert_eq!(h.ai.remote_calls(), calls_after_first_run);
        assert_eq!(h.media.extract_calls(), 2);
        assert!(log_of(&h).contains("[Video] Scene 3 video exists, skipping"));
    }
}
