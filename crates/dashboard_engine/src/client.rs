use std::time::Duration;

use dashboard_core::{
    infer_content_type, AnalysisOutcome, MediaBlob, Payload, ResponseShape, TrafficForecast,
    TrafficQuery,
};
use dashboard_logging::{dash_debug, dash_info, dash_warn};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::stream::{decode_chunk, ChunkSink};
use crate::wire::{decode_forecast, decode_outcome, error_detail};
use crate::{ChatRequest, ClientError, FailureKind};

pub const TRAFFIC_ENDPOINT: &str = "/api/traffic/predict/";
pub const CHAT_ENDPOINT: &str = "/api/chat";
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Origin of the prediction, traffic and chat endpoints.
    pub api_base: Url,
    /// Origin that serves the bundled sample media.
    pub asset_base: Url,
    pub connect_timeout: Duration,
    /// Whole-request deadline for everything except chat. `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Longest silence tolerated between two chat chunks.
    pub stream_idle_timeout: Option<Duration>,
    pub max_response_bytes: u64,
}

impl ClientSettings {
    pub fn new(api_base: Url, asset_base: Url) -> Self {
        Self {
            api_base,
            asset_base,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(120)),
            stream_idle_timeout: Some(Duration::from_secs(60)),
            max_response_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Transport for every request the dashboard makes. Each call sends at most
/// one request to the target endpoint and never retries.
#[async_trait::async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn fetch_sample(&self, locator: &str) -> Result<MediaBlob, ClientError>;

    async fn submit(
        &self,
        endpoint: &str,
        shape: ResponseShape,
        payload: Payload,
    ) -> Result<AnalysisOutcome, ClientError>;

    async fn fetch_artifact(&self, endpoint: &str, identifier: &str)
        -> Result<MediaBlob, ClientError>;

    async fn predict_traffic(&self, query: &TrafficQuery) -> Result<TrafficForecast, ClientError>;

    /// Streams the reply into `sink` until the body ends, fails, or `cancel` fires.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        sink: &dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ClientError::new(FailureKind::Transport { status: None }, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn api_url(&self, path: &str) -> Result<Url, ClientError> {
        join(&self.settings.api_base, path)
    }

    fn with_deadline(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.settings.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn get_blob(&self, url: Url, fallback_name: &str) -> Result<MediaBlob, ClientError> {
        let response = self
            .with_deadline(self.client.get(url))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .unwrap_or_else(|| infer_content_type(fallback_name).to_string());
        let bytes = read_body(response, self.settings.max_response_bytes).await?;
        Ok(MediaBlob::new(bytes, content_type))
    }

    async fn post_upload(
        &self,
        url: Url,
        blob: MediaBlob,
        file_name: String,
    ) -> Result<Vec<u8>, ClientError> {
        let form = Form::new().part(UPLOAD_FIELD, upload_part(&blob, file_name));
        let response = self
            .with_deadline(self.client.post(url).multipart(form))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        read_body(response, self.settings.max_response_bytes).await
    }
}

#[async_trait::async_trait]
impl SubmissionClient for ReqwestClient {
    async fn fetch_sample(&self, locator: &str) -> Result<MediaBlob, ClientError> {
        let fetched = match join(&self.settings.asset_base, locator) {
            Ok(url) => self.get_blob(url, locator).await,
            Err(err) => Err(err),
        };
        fetched.map_err(|err| {
            dash_warn!("Sample {locator} could not be fetched: {err}");
            ClientError::new(FailureKind::SampleFetch, err.to_string())
        })
    }

    async fn submit(
        &self,
        endpoint: &str,
        shape: ResponseShape,
        payload: Payload,
    ) -> Result<AnalysisOutcome, ClientError> {
        let url = self.api_url(endpoint)?;
        let (blob, file_name) = match payload {
            Payload::Ready { blob, file_name } => (blob, file_name),
            Payload::Sample { locator } => {
                let blob = self.fetch_sample(&locator).await?;
                let name = locator.rsplit('/').next().unwrap_or(&locator).to_string();
                (blob, name)
            }
        };
        dash_info!(
            "Submitting {} ({} bytes, {}) to {endpoint}",
            file_name,
            blob.len(),
            blob.content_type()
        );
        let body = self.post_upload(url, blob, file_name).await?;
        decode_outcome(shape, &body)
    }

    async fn fetch_artifact(
        &self,
        endpoint: &str,
        identifier: &str,
    ) -> Result<MediaBlob, ClientError> {
        let mut url = self.api_url(endpoint)?;
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::new(
                    FailureKind::InvalidEndpoint,
                    format!("{endpoint}: cannot append a path segment"),
                )
            })?
            .pop_if_empty()
            .push(identifier);
        dash_debug!("Fetching artifact {url}");
        self.get_blob(url, identifier).await
    }

    async fn predict_traffic(&self, query: &TrafficQuery) -> Result<TrafficForecast, ClientError> {
        let url = self.api_url(TRAFFIC_ENDPOINT)?;
        let body = json!({ "station_id": query.station_id, "datetime": query.datetime });
        let response = self
            .with_deadline(self.client.post(url).json(&body))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let bytes = read_body(response, self.settings.max_response_bytes).await?;
        decode_forecast(&bytes)
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        sink: &dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let url = self.api_url(CHAT_ENDPOINT)?;
        let idle = self.settings.stream_idle_timeout;
        let send = self.client.post(url).json(request).send();
        // Waiting for the headers counts as silence too.
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            response = within(idle, send) => response?.map_err(map_reqwest_error)?,
        };
        let response = check_status(response).await?;
        dash_info!("Chat stream opened for station {}", request.station_id);

        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut body = response.bytes_stream();
        let mut received: u64 = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                next = next_with_idle_timeout(&mut body, idle) => next?,
            };
            match next {
                Some(Ok(bytes)) => {
                    received += bytes.len() as u64;
                    if received > self.settings.max_response_bytes {
                        return Err(too_large(self.settings.max_response_bytes, Some(received)));
                    }
                    let text = decode_chunk(&mut decoder, &bytes, false);
                    if !text.is_empty() {
                        sink.chunk(text);
                    }
                }
                Some(Err(err)) => {
                    return Err(ClientError::new(FailureKind::Stream, err.to_string()));
                }
                None => {
                    let tail = decode_chunk(&mut decoder, &[], true);
                    if !tail.is_empty() {
                        sink.chunk(tail);
                    }
                    dash_info!("Chat stream closed after {received} bytes");
                    return Ok(());
                }
            }
        }
    }
}

async fn within<F: std::future::Future>(
    limit: Option<Duration>,
    future: F,
) -> Result<F::Output, ClientError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| {
            ClientError::new(
                FailureKind::Timeout,
                format!("no response within {}s", limit.as_secs_f32()),
            )
        }),
        None => Ok(future.await),
    }
}

async fn next_with_idle_timeout<S>(
    body: &mut S,
    idle: Option<Duration>,
) -> Result<Option<S::Item>, ClientError>
where
    S: futures_util::Stream + Unpin,
{
    match idle {
        Some(limit) => tokio::time::timeout(limit, body.next()).await.map_err(|_| {
            ClientError::new(
                FailureKind::Timeout,
                format!("no data received for {}s", limit.as_secs_f32()),
            )
        }),
        None => Ok(body.next().await),
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path)
        .map_err(|err| ClientError::new(FailureKind::InvalidEndpoint, format!("{path}: {err}")))
}

fn upload_part(blob: &MediaBlob, file_name: String) -> Part {
    let part = Part::bytes(blob.bytes().to_vec()).file_name(file_name.clone());
    match part.mime_str(blob.content_type()) {
        Ok(part) => part,
        Err(err) => {
            dash_debug!(
                "Content type {} rejected ({err}); sending {file_name} untyped",
                blob.content_type()
            );
            Part::bytes(blob.bytes().to_vec()).file_name(file_name)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let message = error_detail(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });
    Err(ClientError::new(
        FailureKind::Transport {
            status: Some(status.as_u16()),
        },
        message,
    ))
}

async fn read_body(response: reqwest::Response, max_bytes: u64) -> Result<Vec<u8>, ClientError> {
    if let Some(content_len) = response.content_length() {
        if content_len > max_bytes {
            return Err(too_large(max_bytes, Some(content_len)));
        }
    }
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        let next_len = bytes.len() as u64 + chunk.len() as u64;
        if next_len > max_bytes {
            return Err(too_large(max_bytes, Some(next_len)));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> ClientError {
    ClientError::new(
        FailureKind::TooLarge { max_bytes, actual },
        "response too large",
    )
}

fn cancelled() -> ClientError {
    ClientError::new(FailureKind::Cancelled, "request cancelled")
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::new(FailureKind::Timeout, err.to_string());
    }
    ClientError::new(FailureKind::Transport { status: None }, err.to_string())
}
