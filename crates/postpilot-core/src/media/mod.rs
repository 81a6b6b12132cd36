//! Image storage, hosting and editing backends
//!
//! The image pipeline talks to three external services through two seams:
//! [`ObjectStore`] (archive and public hosting) and [`ImageEditor`]
//! (instruction-based edits).

mod google_drive;
mod http;
mod imgbb;
mod replicate;

pub use google_drive::GoogleDriveStore;
pub use http::create_http_client;
pub use imgbb::ImgBbHost;
pub use replicate::ReplicateEditor;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors returned by media backends
#[derive(Debug, Error)]
pub enum MediaError {
    /// Missing or rejected credentials
    #[error("Credential error: {0}")]
    Credentials(String),
    /// Connection or transport failure
    #[error("Network error: {0}")]
    Network(String),
    /// The backend did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Non-success status returned by the backend
    #[error("API error: {0}")]
    Api(String),
    /// The backend answered with something we cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Payload exceeds the backend's limit
    #[error("Payload too large: {0} bytes")]
    TooLarge(usize),
}

/// Reference returned by an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Durable identifier accepted by [`ObjectStore::download`]
    pub id: String,
    /// Shareable link, when the backend exposes one
    pub url: Option<String>,
    /// `url` serves the raw image bytes without authentication
    pub public: bool,
}

impl StoredObject {
    /// `url` when it can be fetched directly by a third party
    #[must_use]
    pub fn public_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|_| self.public)
    }
}

/// Image bytes plus the source reference handed to the editor
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Where the source was archived
    pub object: StoredObject,
    /// Raw image bytes
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub mime: String,
}

/// Result produced by an [`ImageEditor`]
#[derive(Debug, Clone)]
pub struct EditedImage {
    /// Edited image bytes
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub mime: String,
    /// URL the backend served the result from, if any
    pub origin_url: Option<String>,
}

/// A place images can be uploaded to and fetched from
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Upload bytes and return a durable reference
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: &str,
        mime: &str,
    ) -> Result<StoredObject, MediaError>;

    /// Fetch previously uploaded bytes by id or URL
    async fn download(&self, reference: &str) -> Result<Bytes, MediaError>;
}

/// An instruction-driven image transformation backend
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Apply `instruction` to `source`
    async fn edit(&self, source: &SourceImage, instruction: &str)
        -> Result<EditedImage, MediaError>;
}

/// Guess an image MIME type from its leading bytes
#[must_use]
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

/// File extension matching an image MIME type
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_image_mime() {
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0D]), "image/png");
        assert_eq!(sniff_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_image_mime(b"hello"), "application/octet-stream");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
    }
}
