//! Media storage for avatars and UDID documents.
//!
//! Handlers only see the [`MediaStore`] trait. [`CloudinaryStore`] talks to
//! the Cloudinary upload API with signed requests; [`DiskMediaStore`] keeps
//! files in a local directory that the router serves under `/media`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Multipart;
use chrono::Utc;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use nurture_core::config::MediaConfig;
use nurture_core::error::NurtureError;
use nurture_core::types::MediaAsset;

use crate::error::ApiError;

/// A file received in a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Only images and PDFs are accepted.
    pub fn ensure_allowed_type(&self) -> Result<(), ApiError> {
        let ct = self.content_type.to_ascii_lowercase();
        if ct.starts_with("image/") || ct == "application/pdf" {
            Ok(())
        } else {
            Err(ApiError::BadRequest(format!(
                "Unsupported file type '{}'. Only images and PDF documents are allowed",
                self.content_type
            )))
        }
    }

    /// Lower-case alphanumeric extension from the original file name.
    fn extension(&self) -> String {
        let ext = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            ext
        } else if self.content_type == "application/pdf" {
            "pdf".to_string()
        } else {
            "bin".to_string()
        }
    }
}

/// Text fields and files from a multipart body, keyed by field name.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    /// Drain a multipart body. Empty file parts are ignored; files over
    /// `max_file_bytes` are rejected with 413.
    pub async fn read(mut multipart: Multipart, max_file_bytes: usize) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await?;
                    if bytes.is_empty() {
                        continue;
                    }
                    if bytes.len() > max_file_bytes {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File '{}' exceeds the {} byte limit",
                            file_name, max_file_bytes
                        )));
                    }
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

/// Storage backend for uploaded media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store a file and return its public id and URL.
    async fn upload(&self, file: &UploadedFile) -> Result<MediaAsset, NurtureError>;

    /// Remove a previously uploaded file.
    async fn delete(&self, public_id: &str) -> Result<(), NurtureError>;
}

// =============================================================================
// Cloudinary
// =============================================================================

/// Signed uploads to Cloudinary.
pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryUpload {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryDestroy {
    result: String,
}

impl CloudinaryStore {
    pub fn new(config: &MediaConfig) -> Result<Self, NurtureError> {
        if config.cloud_name.is_empty() || config.api_key.is_empty() || config.api_secret.is_empty()
        {
            return Err(NurtureError::Config(
                "media.cloud_name, media.api_key and media.api_secret are required for Cloudinary"
                    .to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| NurtureError::Media(e.to_string()))?;

        Ok(Self {
            client,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
        })
    }

    fn endpoint(&self, resource: &str, action: &str) -> String {
        format!("{}/{}/{}/{}", self.base_url, self.cloud_name, resource, action)
    }
}

/// Cloudinary request signature: the parameters sorted by name, joined as
/// `k=v&k=v`, followed by the API secret, SHA-1 hex encoded.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, file: &UploadedFile) -> Result<MediaAsset, NurtureError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", &self.folder), ("timestamp", &timestamp)],
            &self.api_secret,
        );

        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| NurtureError::Media(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature", signature);

        let resp = self
            .client
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| NurtureError::Media(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| NurtureError::Media(e.to_string()))?;
        if !status.is_success() {
            return Err(NurtureError::Media(format!(
                "Cloudinary upload failed: {}: {}",
                status, body
            )));
        }

        let uploaded: CloudinaryUpload = serde_json::from_str(&body)
            .map_err(|e| NurtureError::Media(format!("Unexpected Cloudinary response: {}", e)))?;
        tracing::info!(public_id = %uploaded.public_id, bytes = file.bytes.len(), "Uploaded media to Cloudinary");

        Ok(MediaAsset {
            public_id: uploaded.public_id,
            secure_url: uploaded.secure_url,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), NurtureError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.api_secret,
        );

        let resp = self
            .client
            .post(self.endpoint("image", "destroy"))
            .form(&[
                ("public_id", public_id),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NurtureError::Media(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NurtureError::Media(format!("Cloudinary destroy failed: {}", status)));
        }
        let destroyed: CloudinaryDestroy = resp
            .json()
            .await
            .map_err(|e| NurtureError::Media(e.to_string()))?;
        if destroyed.result != "ok" {
            return Err(NurtureError::Media(format!(
                "Cloudinary destroy returned '{}'",
                destroyed.result
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Local disk
// =============================================================================

/// Stores uploads under a local directory.
pub struct DiskMediaStore {
    root: PathBuf,
    folder: String,
    public_base_url: String,
}

impl DiskMediaStore {
    pub fn new(root: PathBuf, folder: &str, public_base_url: &str) -> Result<Self, NurtureError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            folder: folder.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// File name for a public id, rejecting anything that could escape the root.
    fn file_name_for(&self, public_id: &str) -> Result<String, NurtureError> {
        let name = public_id.rsplit('/').next().unwrap_or_default();
        if name.is_empty() || name.starts_with('.') || name.contains('\\') {
            return Err(NurtureError::Media(format!("Invalid media id '{}'", public_id)));
        }
        Ok(name.to_string())
    }
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    async fn upload(&self, file: &UploadedFile) -> Result<MediaAsset, NurtureError> {
        let name = format!("{}.{}", Uuid::new_v4().simple(), file.extension());
        let path = self.root.join(&name);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| NurtureError::Media(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), bytes = file.bytes.len(), "Stored media on disk");

        Ok(MediaAsset {
            public_id: format!("{}/{}", self.folder, name),
            secure_url: format!("{}/{}", self.public_base_url, name),
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), NurtureError> {
        let path = self.root.join(self.file_name_for(public_id)?);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| NurtureError::Media(format!("Failed to delete {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            file_name: "face.PNG".to_string(),
            content_type: "image/png".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_signature_matches_documented_example() {
        let sig = sign_params(
            &[
                ("timestamp", "1315060510"),
                ("public_id", "sample_image"),
                ("eager", "w_400,h_300,c_pad|w_260,h_200,c_crop"),
            ],
            "abcd",
        );
        assert_eq!(sig, "bfd09f95f331f558cbd1320e67aa8d488770583e");
    }

    #[test]
    fn test_signature_skips_empty_values() {
        let with_empty = sign_params(
            &[("folder", "nurture"), ("tags", ""), ("timestamp", "1700000000")],
            "secret",
        );
        assert_eq!(with_empty, "dbbb7f4a6831271c7f90af70feb578e4fa4ed18a");
    }

    #[test]
    fn test_allowed_types() {
        assert!(png(b"x").ensure_allowed_type().is_ok());
        let pdf = UploadedFile {
            file_name: "udid.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![1],
        };
        assert!(pdf.ensure_allowed_type().is_ok());
        let exe = UploadedFile {
            file_name: "run.exe".to_string(),
            content_type: "application/octet-stream".to_string(),
            bytes: vec![1],
        };
        assert!(exe.ensure_allowed_type().is_err());
    }

    #[test]
    fn test_extension_sanitised() {
        assert_eq!(png(b"x").extension(), "png");
        let odd = UploadedFile {
            file_name: "../../etc/passwd".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1],
        };
        assert_eq!(odd.extension(), "bin");
    }

    #[test]
    fn test_cloudinary_requires_credentials() {
        assert!(CloudinaryStore::new(&MediaConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_disk_store_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DiskMediaStore::new(dir.path().join("media"), "nurture", "http://localhost:8000/media/")
                .unwrap();

        let asset = store.upload(&png(b"\x89PNG")).await.unwrap();
        assert!(asset.public_id.starts_with("nurture/"));
        assert!(asset.secure_url.starts_with("http://localhost:8000/media/"));
        assert!(asset.secure_url.ends_with(".png"));

        let name = asset.public_id.rsplit('/').next().unwrap();
        let path = store.root().join(name);
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG");

        store.delete(&asset.public_id).await.unwrap();
        assert!(!path.exists());
        assert!(store.delete(&asset.public_id).await.is_err());
    }

    #[tokio::test]
    async fn test_disk_store_rejects_hidden_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(dir.path().to_path_buf(), "nurture", "http://x").unwrap();
        assert!(store.delete("nurture/..").await.is_err());
        assert!(store.delete("").await.is_err());
    }
}
