//! Google Drive archive for source images.

use super::http::{check_status, fetch_bytes, map_reqwest_error, read_json};
use super::{MediaError, ObjectStore, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, instrument};

const BACKEND: &str = "google_drive";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Uploads images to a Drive folder with an OAuth bearer token
pub struct GoogleDriveStore {
    http: HttpClient,
    access_token: String,
    folder_id: Option<String>,
}

impl GoogleDriveStore {
    /// Create a Drive store; files land in `folder_id` when set
    #[must_use]
    pub fn new(http: HttpClient, access_token: String, folder_id: Option<String>) -> Self {
        Self {
            http,
            access_token,
            folder_id: folder_id.filter(|f| !f.trim().is_empty()),
        }
    }

    async fn rename_and_file(&self, file_id: &str, file_name: &str) -> Result<Value, MediaError> {
        let mut request = self
            .http
            .patch(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id,webViewLink")])
            .json(&json!({ "name": file_name }));
        if let Some(folder) = &self.folder_id {
            request = request.query(&[("addParents", folder.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(BACKEND, &e))?;
        read_json(BACKEND, check_status(BACKEND, response).await?).await
    }
}

/// Extract the stored object from a Drive `files` resource
pub(crate) fn parse_drive_file(body: &Value) -> Result<StoredObject, MediaError> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| MediaError::InvalidResponse(format!("{BACKEND}: missing file id")))?;
    Ok(StoredObject {
        id: id.to_string(),
        url: body
            .get("webViewLink")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        // webViewLink is an authenticated viewer page, not the image itself.
        public: false,
    })
}

#[async_trait]
impl ObjectStore for GoogleDriveStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: &str,
        mime: &str,
    ) -> Result<StoredObject, MediaError> {
        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| map_reqwest_error(BACKEND, &e))?;
        let created = read_json(BACKEND, check_status(BACKEND, response).await?).await?;
        let file = parse_drive_file(&created)?;

        let updated = self.rename_and_file(&file.id, file_name).await?;
        let file = parse_drive_file(&updated)?;
        debug!(file_id = %file.id, "Uploaded source image to Drive");
        Ok(file)
    }

    async fn download(&self, reference: &str) -> Result<Bytes, MediaError> {
        let url = format!("{FILES_URL}/{reference}?alt=media");
        fetch_bytes(&self.http, BACKEND, &url, Some(&self.access_token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drive_file() {
        let body = json!({
            "id": "abc123",
            "webViewLink": "https://drive.google.com/file/d/abc123/view"
        });
        let file = parse_drive_file(&body).expect("valid file");
        assert_eq!(file.id, "abc123");
        assert_eq!(
            file.url.as_deref(),
            Some("https://drive.google.com/file/d/abc123/view")
        );
        assert_eq!(file.public_url(), None);

        assert!(matches!(
            parse_drive_file(&json!({"kind": "drive#file"})),
            Err(MediaError::InvalidResponse(_))
        ));
    }
}
