use super::{AiService, JobHandle, JobStatus, VideoRequest, VoiceProfile};
use crate::config::PipelineConfig;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const GOOGLE_FILES_PREFIX: &str = "https://generativelanguage.googleapis.com/";

/// Client for the AI gateway fronting the text, speech and video models.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    api_key: String,
    base_url: String,
    text_model: String,
    tts_model: String,
    video_model: String,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WebSearchOptions {
    search_context_size: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStarted {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    metadata: Option<serde_json::Value>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: SampleVideo,
}

#[derive(Debug, Deserialize)]
struct SampleVideo {
    uri: String,
}

impl GatewayClient {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            tts_model: config.tts_model.clone(),
            video_model: config.video_model.clone(),
            max_tokens: config.compose_max_tokens,
            client,
        })
    }

    fn bearer(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn goog(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("x-goog-api-key", &self.api_key)
    }

    fn video_base(&self) -> String {
        format!("{}/gemini/v1beta", self.base_url)
    }

    fn download_url(&self, location: &str) -> String {
        let relative = location
            .strip_prefix(GOOGLE_FILES_PREFIX)
            .unwrap_or(location)
            .trim_start_matches('/');
        format!("{}/gemini/download/{}", self.base_url, relative)
    }
}

/// Turn a non-2xx reply into a service error carrying the body.
async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VideoError::service(format!("{} returned {}: {}", what, status, body)))
}

#[async_trait]
impl AiService for GatewayClient {
    async fn generate_text(&self, prompt: &str, enable_search: bool) -> Result<String> {
        info!("Generating text (search: {})", enable_search);

        let request = ChatRequest {
            model: &self.text_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: if enable_search { 0.0 } else { 0.4 },
            max_tokens: self.max_tokens,
            web_search_options: enable_search.then_some(WebSearchOptions {
                search_context_size: "large",
            }),
        };

        let response = self
            .bearer(self.client.post(format!("{}/v1/chat/completions", self.base_url)))
            .json(&request)
            .send()
            .await?;
        let response = check(response, "Text API").await?;

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| VideoError::service(format!("Malformed text response: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| VideoError::service("Text response has no content"))
    }

    async fn synthesize_speech(&self, markup: &str, voice: VoiceProfile) -> Result<Vec<u8>> {
        debug!("Synthesizing {} chars with voice {}", markup.len(), voice);

        let request_body = json!({
            "model": self.tts_model,
            "input": markup,
            "voice": voice.as_str(),
        });

        let response = self
            .bearer(self.client.post(format!("{}/audio/speech", self.base_url)))
            .json(&request_body)
            .send()
            .await?;
        let audio = check(response, "TTS API").await?.bytes().await?;

        if audio.is_empty() {
            return Err(VideoError::service("TTS API returned no audio"));
        }
        Ok(audio.to_vec())
    }

    async fn submit_video_job(&self, request: VideoRequest<'_>) -> Result<JobHandle> {
        if request.prompt.trim().is_empty() {
            return Err(VideoError::service("Video prompt is empty"));
        }

        let mut instance = json!({ "prompt": request.prompt });
        if let Some(image) = request.continuity {
            instance["image"] = json!({
                "bytesBase64Encoded": base64::engine::general_purpose::STANDARD.encode(&image.data),
                "mimeType": image.mime_type(),
            });
        }
        let request_body = json!({ "instances": [instance] });

        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.video_base(),
            self.video_model
        );
        let response = self.goog(self.client.post(url)).json(&request_body).send().await?;
        let started: OperationStarted = check(response, "Video API")
            .await?
            .json()
            .await
            .map_err(|e| VideoError::service(format!("Malformed video job response: {}", e)))?;

        let name = started
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| VideoError::service("Video job response has no operation name"))?;
        info!("Video generation job submitted: {}", name);
        Ok(JobHandle(name))
    }

    async fn poll_video_job(&self, handle: &JobHandle) -> Result<JobStatus> {
        let url = format!("{}/{}", self.video_base(), handle.0.trim_start_matches('/'));
        let response = self.goog(self.client.get(url)).send().await?;
        let operation: Operation = check(response, "Video status API")
            .await?
            .json()
            .await
            .map_err(|e| VideoError::service(format!("Malformed video status: {}", e)))?;

        if let Some(error) = operation.error {
            return Ok(JobStatus::Failed(error.message));
        }
        if !operation.done {
            return Ok(if operation.metadata.is_some() {
                JobStatus::Running
            } else {
                JobStatus::Pending
            });
        }

        Ok(operation
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .map(|sample| JobStatus::Done(sample.video.uri))
            .unwrap_or_else(|| JobStatus::Failed("finished without a video".to_string())))
    }

    async fn download_video(&self, location: &str) -> Result<Vec<u8>> {
        let url = self.download_url(location);
        info!("Downloading video from: {}", url);

        let response = self.goog(self.client.get(url)).send().await?;
        let video = check(response, "Video download").await?.bytes().await?;
        if video.is_empty() {
            return Err(VideoError::service("Downloaded video is empty"));
        }
        Ok(video.to_vec())
    }
}
