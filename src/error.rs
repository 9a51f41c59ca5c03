use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Service error: {0}")]
    Service(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Media tool error: {0}")]
    MediaTool(String),

    #[error("Invalid script: {0}")]
    ScriptValidation(String),

    #[error("Script not found: {0}")]
    MissingScript(String),

    #[error("Missing scene artifacts: {0}")]
    MissingArtifacts(String),

    #[error("Scene {scene_id} failed: {source}")]
    SceneFailed {
        scene_id: u32,
        #[source]
        source: Box<VideoError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VideoError {
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn media_tool(msg: impl Into<String>) -> Self {
        Self::MediaTool(msg.into())
    }

    pub fn invalid_script(msg: impl Into<String>) -> Self {
        Self::ScriptValidation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short, stable name of the error category, used in progress log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(_) | Self::Http(_) => "ServiceError",
            Self::Timeout(_) => "TimeoutError",
            Self::MediaTool(_) => "MediaToolError",
            Self::ScriptValidation(_) => "ScriptValidationError",
            Self::Json(_) => "SerializationError",
            Self::MissingScript(_) => "MissingScriptError",
            Self::MissingArtifacts(_) => "MissingArtifactsError",
            Self::SceneFailed { source, .. } => source.kind(),
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
        }
    }

    /// Scene that caused the failure, if the error was raised while rendering one.
    pub fn scene_id(&self) -> Option<u32> {
        match self {
            Self::SceneFailed { scene_id, .. } => Some(*scene_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;
