//! imageBB public hosting.

use super::http::{check_status, fetch_bytes, map_reqwest_error, read_json};
use super::{MediaError, ObjectStore, StoredObject};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::Form;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tracing::{debug, instrument};

const BACKEND: &str = "imgbb";
const UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Hosts images on imageBB and returns their public URL
pub struct ImgBbHost {
    http: HttpClient,
    api_key: String,
}

impl ImgBbHost {
    /// Create a host with the given API key
    #[must_use]
    pub const fn new(http: HttpClient, api_key: String) -> Self {
        Self { http, api_key }
    }
}

/// Extract the image id and direct URL from an upload response
pub(crate) fn parse_upload_response(body: &Value) -> Result<StoredObject, MediaError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("upload rejected");
        return Err(MediaError::Api(format!("{BACKEND}: {message}")));
    }

    let data = body
        .get("data")
        .ok_or_else(|| MediaError::InvalidResponse(format!("{BACKEND}: missing data")))?;
    let url = data
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| MediaError::InvalidResponse(format!("{BACKEND}: missing url")))?;
    let id = data.get("id").and_then(Value::as_str).unwrap_or(url);

    Ok(StoredObject {
        id: id.to_string(),
        url: Some(url.to_string()),
        public: true,
    })
}

#[async_trait]
impl ObjectStore for ImgBbHost {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, bytes, _mime), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: &str,
        _mime: &str,
    ) -> Result<StoredObject, MediaError> {
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(MediaError::TooLarge(bytes.len()));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let form = Form::new()
            .text("image", encoded)
            .text("name", file_name.to_string());

        let response = self
            .http
            .post(UPLOAD_URL)
            .query(&[("key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_reqwest_error(BACKEND, &e))?;
        let body = read_json(BACKEND, check_status(BACKEND, response).await?).await?;
        let stored = parse_upload_response(&body)?;
        debug!(image_id = %stored.id, "Hosted image on imgbb");
        Ok(stored)
    }

    /// imageBB references are public URLs.
    async fn download(&self, reference: &str) -> Result<Bytes, MediaError> {
        fetch_bytes(&self.http, BACKEND, reference, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_upload_response() {
        let body = json!({
            "data": {"id": "2ndCYJK", "url": "https://i.ibb.co/w04Prt6/c1f64245afb2.png"},
            "success": true,
            "status": 200
        });
        let stored = parse_upload_response(&body).expect("valid response");
        assert_eq!(stored.id, "2ndCYJK");
        assert_eq!(
            stored.url.as_deref(),
            Some("https://i.ibb.co/w04Prt6/c1f64245afb2.png")
        );
        assert!(stored.public);
    }

    #[test]
    fn test_parse_upload_response_failure() {
        let body = json!({"success": false, "error": {"message": "Invalid API v1 key."}});
        let err = parse_upload_response(&body).expect_err("rejected");
        assert!(err.to_string().contains("Invalid API v1 key."));
    }
}
