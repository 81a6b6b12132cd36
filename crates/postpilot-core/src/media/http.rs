//! HTTP plumbing shared by the media backends.

use super::MediaError;
use bytes::Bytes;
use lazy_regex::regex_is_match;
use reqwest::{Client as HttpClient, Response, StatusCode};
use std::time::Duration;

/// Creates an HTTP client with the given request timeout.
#[must_use]
pub fn create_http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Map a transport-level reqwest failure
pub(crate) fn map_reqwest_error(backend: &str, error: &reqwest::Error) -> MediaError {
    if error.is_timeout() {
        MediaError::Timeout(format!("{backend}: {error}"))
    } else {
        MediaError::Network(format!("{backend}: {error}"))
    }
}

/// Pass successful responses through, turn everything else into a `MediaError`
pub(crate) async fn check_status(
    backend: &str,
    response: Response,
) -> Result<Response, MediaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    let detail = if regex_is_match!(r"(?i)^\s*<(!doctype|html)", &error_text) {
        "(Server returned HTML error page)".to_string()
    } else {
        crate::utils::truncate_str(&error_text, 500)
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            MediaError::Credentials(format!("{backend}: {status} {detail}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            MediaError::Timeout(format!("{backend}: {status}"))
        }
        _ => MediaError::Api(format!("{backend}: {status} {detail}")),
    })
}

/// GET a URL and return the body bytes
pub(crate) async fn fetch_bytes(
    client: &HttpClient,
    backend: &str,
    url: &str,
    bearer: Option<&str>,
) -> Result<Bytes, MediaError> {
    let mut request = client.get(url);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| map_reqwest_error(backend, &e))?;
    check_status(backend, response)
        .await?
        .bytes()
        .await
        .map_err(|e| map_reqwest_error(backend, &e))
}

/// Read a JSON body
pub(crate) async fn read_json(
    backend: &str,
    response: Response,
) -> Result<serde_json::Value, MediaError> {
    response
        .json()
        .await
        .map_err(|e| MediaError::InvalidResponse(format!("{backend}: {e}")))
}
