//! Generate a short news video from a topic.
//!
//! A topic is researched and turned into a scene script, each scene gets
//! narration and footage from the AI gateway, and FFmpeg joins the scenes
//! into `final_video.mp4`. Every artifact lives under the output directory,
//! so an interrupted run picks up where it stopped.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scene;
pub mod script;
pub mod storage;
pub mod video;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::{Result, VideoError};
pub use pipeline::{PipelineController, Stage};
