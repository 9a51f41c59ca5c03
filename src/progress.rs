//! Append-only, human readable record of what a run did.
//!
//! The record is advisory: resumability only looks at artifact files.

use crate::storage::ArtifactStore;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const PROGRESS_LOG: &str = "pipeline_log.txt";

#[derive(Clone)]
pub struct ProgressLog {
    store: Arc<dyn ArtifactStore>,
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            path: PathBuf::from(PROGRESS_LOG),
        }
    }

    /// Append one timestamped line. Losing a line never fails the run.
    pub async fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);

        let line = format!("{} {}", Local::now().format("[%Y-%m-%d %H:%M:%S]"), message);
        if let Err(e) = self.store.append_line(&self.path, &line).await {
            warn!("Could not append to progress log: {}", e);
        }
    }
}
