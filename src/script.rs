//! Topic to structured scene script.

use crate::api::AiService;
use crate::config::PipelineConfig;
use crate::error::{Result, VideoError};
use crate::progress::ProgressLog;
use crate::prompts::{truncate_chars, Prompts};
use crate::scene::{Script, SCRIPT_PATH, SEARCH_CONTEXT_PATH};
use crate::storage::ArtifactStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ScriptSynthesizer {
    ai: Arc<dyn AiService>,
    store: Arc<dyn ArtifactStore>,
    prompts: Prompts,
    progress: ProgressLog,
    scene_count: usize,
    context_char_limit: usize,
}

impl ScriptSynthesizer {
    pub fn new(
        config: &PipelineConfig,
        ai: Arc<dyn AiService>,
        store: Arc<dyn ArtifactStore>,
        prompts: Prompts,
        progress: ProgressLog,
    ) -> Self {
        Self {
            ai,
            store,
            prompts,
            progress,
            scene_count: config.scene_count,
            context_char_limit: config.context_char_limit,
        }
    }

    /// Research `topic`, compose a script from the findings and persist both.
    pub async fn generate_script(&self, topic: &str, skip_search: bool) -> Result<Script> {
        let context = if skip_search {
            self.existing_context().await
        } else {
            self.progress
                .record(format!("[Phase 1] Searching the web for context about '{}'", topic))
                .await;
            let context = self.ai.generate_text(&self.prompts.search(topic), true).await?;
            self.store
                .write(Path::new(SEARCH_CONTEXT_PATH), context.as_bytes())
                .await?;
            self.progress
                .record(format!("[Phase 1] Search context saved to {}", SEARCH_CONTEXT_PATH))
                .await;
            context
        };

        self.progress
            .record("[Phase 2] Generating structured script")
            .await;
        let prompt = self.prompts.compose(
            topic,
            truncate_chars(&context, self.context_char_limit),
            self.scene_count,
        );
        let reply = self.ai.generate_text(&prompt, false).await?;

        let script = Script::parse(&reply).inspect_err(|e| {
            warn!("Rejected script reply ({}): {}", e, truncate_chars(&reply, 400));
        })?;
        if script.len() != self.scene_count {
            debug!(
                "Model returned {} scenes, asked for {}",
                script.len(),
                self.scene_count
            );
        }

        self.store
            .write(Path::new(SCRIPT_PATH), script.to_json()?.as_bytes())
            .await?;
        self.progress
            .record(format!(
                "[Phase 2] Script with {} scenes saved to {}",
                script.len(),
                SCRIPT_PATH
            ))
            .await;
        Ok(script)
    }

    /// Context from an earlier search, or nothing.
    async fn existing_context(&self) -> String {
        let path = Path::new(SEARCH_CONTEXT_PATH);
        if !self.store.exists(path).await {
            self.progress
                .record("[Phase 1] Search skipped, no saved context")
                .await;
            return String::new();
        }
        match self.store.read(path).await {
            Ok(bytes) => {
                self.progress
                    .record(format!("[Phase 1] Search skipped, reusing {}", SEARCH_CONTEXT_PATH))
                    .await;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Err(e) => {
                warn!("Could not read saved context: {}", e);
                String::new()
            }
        }
    }
}

/// Read the persisted script of an earlier run.
pub async fn load_script(store: &dyn ArtifactStore) -> Result<Script> {
    let path = Path::new(SCRIPT_PATH);
    if !store.exists(path).await {
        return Err(VideoError::MissingScript(
            store.resolve(path).display().to_string(),
        ));
    }
    let bytes = store.read(path).await?;
    Script::parse(&String::from_utf8_lossy(&bytes))
}
