use std::time::Duration;

use base64::Engine as _;
use genqueue_core::GenerationRequest;
use genqueue_logging::{gq_debug, gq_trace};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{ErrorEnvelope, OperationHandle, PollResponse, RemoteError, RemoteOperationClient};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub base_url: String,
    pub api_version: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// [`RemoteOperationClient`] over the long-running-operation REST surface.
#[derive(Debug, Clone)]
pub struct HttpOperationClient {
    settings: HttpClientSettings,
    api_key: String,
    client: reqwest::Client,
}

impl HttpOperationClient {
    pub fn new(settings: HttpClientSettings, api_key: impl Into<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self {
            settings,
            api_key: api_key.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, RemoteError> {
        let raw = format!(
            "{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.api_version,
            path.trim_start_matches('/')
        );
        url::Url::parse(&raw).map_err(|err| RemoteError::Validation(format!("{raw}: {err}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, RemoteError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(map_status(status, &String::from_utf8_lossy(&body)));
        }
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl RemoteOperationClient for HttpOperationClient {
    async fn submit(
        &self,
        request: &GenerationRequest,
        output_index: usize,
    ) -> Result<OperationHandle, RemoteError> {
        if self.api_key.trim().is_empty() {
            return Err(RemoteError::Auth("API key is empty".to_string()));
        }
        let url = self.endpoint(&format!("models/{}:predictLongRunning", request.model))?;
        let body = SubmitBody::from_request(request);
        let payload =
            serde_json::to_vec(&body).map_err(|err| RemoteError::Validation(err.to_string()))?;
        gq_debug!(
            "submit output {} to {} (prompt {} chars, image: {})",
            output_index,
            url,
            request.prompt.len(),
            request.source_image.is_some()
        );

        let bytes = self
            .send(
                self.client
                    .post(url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(payload),
            )
            .await?;
        let started: SubmitResponse = serde_json::from_slice(&bytes)
            .map_err(|err| RemoteError::Transport(format!("malformed submit response: {err}")))?;
        Ok(OperationHandle(started.name))
    }

    async fn poll(&self, handle: &OperationHandle) -> Result<PollResponse, RemoteError> {
        let url = self.endpoint(handle.as_str())?;
        let bytes = self.send(self.client.get(url)).await?;
        let operation: OperationWire = serde_json::from_slice(&bytes)
            .map_err(|err| RemoteError::Transport(format!("malformed operation: {err}")))?;
        gq_trace!("poll {} -> done={}", handle, operation.done);
        Ok(operation.into_poll_response())
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, RemoteError> {
        let url = url::Url::parse(reference)
            .map_err(|err| RemoteError::Validation(format!("{reference}: {err}")))?;
        self.send(self.client.get(url)).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    instances: Vec<Instance>,
    parameters: Parameters,
}

impl SubmitBody {
    fn from_request(request: &GenerationRequest) -> Self {
        let image = request.source_image.as_ref().map(|image| WireImage {
            bytes_base64_encoded: base64::engine::general_purpose::STANDARD.encode(&image.data),
            mime_type: image.mime_type.clone(),
        });
        Self {
            instances: vec![Instance {
                prompt: request.prompt.clone(),
                image,
            }],
            // One video per operation; outputs fan out as separate operations.
            parameters: Parameters {
                aspect_ratio: request.aspect_ratio.as_str().to_string(),
                resolution: request.resolution.as_str().to_string(),
                sample_count: 1,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<WireImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    aspect_ratio: String,
    resolution: String,
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationWire {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    error: Option<ErrorEnvelope>,
    #[serde(default)]
    response: Option<OperationResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationMetadata {
    #[serde(default)]
    progress_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    #[serde(default)]
    generate_video_response: Option<GeneratedVideos>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedVideos {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Default, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<VideoRef>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoRef {
    #[serde(default)]
    uri: Option<String>,
}

impl OperationWire {
    fn into_poll_response(self) -> PollResponse {
        let result_reference = self
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|sample| sample.video)
            .and_then(|video| video.uri);
        PollResponse {
            done: self.done,
            progress_percent: self.metadata.and_then(|m| m.progress_percentage),
            error: self.error,
            result_reference,
        }
    }
}

fn map_status(status: StatusCode, body: &str) -> RemoteError {
    let detail = format!("{status}: {}", body.trim());
    match status.as_u16() {
        401 | 403 => RemoteError::Auth(detail),
        400 | 422 => RemoteError::Validation(detail),
        404 => RemoteError::NotFound(detail),
        _ => RemoteError::Transport(detail),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        return RemoteError::Transport(format!("timeout: {err}"));
    }
    RemoteError::Transport(err.to_string())
}
