//! Replicate prediction API used for instruction-based image edits.

use super::http::{check_status, fetch_bytes, map_reqwest_error, read_json};
use super::{sniff_image_mime, EditedImage, ImageEditor, MediaError, SourceImage};
use crate::config::{REPLICATE_POLL_INTERVAL_MS, REPLICATE_WAIT_SECS};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const BACKEND: &str = "replicate";
const API_BASE: &str = "https://api.replicate.com/v1";

/// Prediction lifecycle reported by Replicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PredictionState {
    Pending,
    Succeeded(String),
    Failed(String),
}

/// Edits images through a Replicate model
pub struct ReplicateEditor {
    http: HttpClient,
    api_token: String,
    model: String,
    deadline: Duration,
}

impl ReplicateEditor {
    /// Create an editor for `model` (`owner/name`); polling stops after `deadline`
    #[must_use]
    pub const fn new(
        http: HttpClient,
        api_token: String,
        model: String,
        deadline: Duration,
    ) -> Self {
        Self {
            http,
            api_token,
            model,
            deadline,
        }
    }

    async fn create_prediction(
        &self,
        input_image: String,
        instruction: &str,
    ) -> Result<Value, MediaError> {
        let body = json!({
            "input": {
                "prompt": instruction,
                "input_image": input_image,
                "output_format": "png",
            }
        });
        let response = self
            .http
            .post(format!("{API_BASE}/models/{}/predictions", self.model))
            .bearer_auth(&self.api_token)
            .header("Prefer", format!("wait={REPLICATE_WAIT_SECS}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(BACKEND, &e))?;
        read_json(BACKEND, check_status(BACKEND, response).await?).await
    }

    async fn poll(&self, url: &str) -> Result<Value, MediaError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| map_reqwest_error(BACKEND, &e))?;
        read_json(BACKEND, check_status(BACKEND, response).await?).await
    }

    /// Poll until the prediction settles or the deadline passes
    async fn wait_for_output(&self, mut prediction: Value) -> Result<String, MediaError> {
        let started = Instant::now();
        loop {
            match prediction_state(&prediction)? {
                PredictionState::Succeeded(url) => return Ok(url),
                PredictionState::Failed(reason) => {
                    return Err(MediaError::Api(format!("{BACKEND}: {reason}")))
                }
                PredictionState::Pending => {}
            }

            if started.elapsed() >= self.deadline {
                return Err(MediaError::Timeout(format!(
                    "{BACKEND}: prediction still running after {:?}",
                    self.deadline
                )));
            }

            let poll_url = prediction
                .pointer("/urls/get")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| {
                    MediaError::InvalidResponse(format!("{BACKEND}: missing poll url"))
                })?;
            tokio::time::sleep(Duration::from_millis(REPLICATE_POLL_INTERVAL_MS)).await;
            prediction = self.poll(&poll_url).await?;
        }
    }
}

/// Interpret a prediction payload
pub(crate) fn prediction_state(prediction: &Value) -> Result<PredictionState, MediaError> {
    let status = prediction
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| MediaError::InvalidResponse(format!("{BACKEND}: missing status")))?;

    match status {
        "starting" | "processing" => Ok(PredictionState::Pending),
        "succeeded" => {
            let output = prediction.get("output").unwrap_or(&Value::Null);
            let url = match output {
                Value::String(url) => Some(url.as_str()),
                Value::Array(items) => items.first().and_then(Value::as_str),
                _ => None,
            }
            .ok_or_else(|| MediaError::InvalidResponse(format!("{BACKEND}: missing output")))?;
            Ok(PredictionState::Succeeded(url.to_string()))
        }
        other => {
            let reason = prediction
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or(other);
            Ok(PredictionState::Failed(reason.to_string()))
        }
    }
}

/// Image reference sent to the model: the public URL, else an inline data URI
pub(crate) fn editor_input(source: &SourceImage) -> String {
    source.object.public_url().map_or_else(
        || {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&source.bytes);
            format!("data:{};base64,{encoded}", source.mime)
        },
        ToString::to_string,
    )
}

#[async_trait]
impl ImageEditor for ReplicateEditor {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, source, instruction), fields(model = %self.model))]
    async fn edit(
        &self,
        source: &SourceImage,
        instruction: &str,
    ) -> Result<EditedImage, MediaError> {
        let input_image = editor_input(source);
        let prediction = self.create_prediction(input_image, instruction).await?;
        if let Some(id) = prediction.get("id").and_then(Value::as_str) {
            debug!(prediction_id = id, "Created prediction");
        }

        let output_url = self.wait_for_output(prediction).await.inspect_err(|e| {
            warn!(error = %e, "Prediction did not succeed");
        })?;
        let bytes = fetch_bytes(&self.http, BACKEND, &output_url, None).await?;
        info!(size = bytes.len(), "Edited image received");

        Ok(EditedImage {
            mime: sniff_image_mime(&bytes).to_string(),
            bytes,
            origin_url: Some(output_url),
        })
    }
}
