//! services/api/src/adapters/storage.rs
//!
//! `FileStorage` adapters: Cloudinary's signed upload API, and a disabled
//! stand-in used when no Cloudinary credentials are configured.

use async_trait::async_trait;
use chrono::Utc;
use classroom_core::domain::{FileUpload, ResourceType, StoredFile};
use classroom_core::ports::{FileStorage, PortError, PortResult};
use reqwest::multipart::{Form, Part};
use retry_policies::policies::ExponentialBackoff;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::retry::{default_backoff, send_with_retry};
use crate::config::CloudinaryConfig;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Signs a parameter set the way Cloudinary expects: parameters sorted by
/// name, joined as `k=v&k=v`, the API secret appended, SHA-1 hex digest.
pub fn sign(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{:x}", Sha1::digest(format!("{}{}", joined, secret).as_bytes()))
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    resource_type: String,
    #[serde(default)]
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

//=========================================================================================
// Cloudinary
//=========================================================================================

#[derive(Clone)]
pub struct CloudinaryAdapter {
    http: reqwest::Client,
    config: CloudinaryConfig,
    backoff: ExponentialBackoff,
}

impl CloudinaryAdapter {
    pub fn new(http: reqwest::Client, config: CloudinaryConfig) -> Self {
        Self {
            http,
            config,
            backoff: default_backoff(),
        }
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            API_BASE, self.config.cloud_name, resource_type, action
        )
    }
}

#[async_trait]
impl FileStorage for CloudinaryAdapter {
    async fn upload(&self, file: FileUpload) -> PortResult<StoredFile> {
        let resource_type = ResourceType::from_mime(&file.content_type);
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &[("folder", self.config.folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        let url = self.endpoint(resource_type.as_str(), "upload");

        let response = send_with_retry(&self.backoff, "cloudinary", || {
            let part = Part::bytes(file.data.clone()).file_name(file.file_name.clone());
            let part = part
                .mime_str(&file.content_type)
                .unwrap_or_else(|_| Part::bytes(file.data.clone()).file_name(file.file_name.clone()));
            let form = Form::new()
                .part("file", part)
                .text("api_key", self.config.api_key.clone())
                .text("timestamp", timestamp.clone())
                .text("folder", self.config.folder.clone())
                .text("signature", signature.clone());
            self.http.post(&url).multipart(form)
        })
        .await?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| PortError::ExternalService(format!("Unreadable upload reply: {}", e)))?;

        let stored = StoredFile {
            public_id: body.public_id,
            url: body.secure_url,
            resource_type: match body.resource_type.as_str() {
                "raw" => ResourceType::Raw,
                "video" => ResourceType::Video,
                "image" => ResourceType::Image,
                _ => resource_type,
            },
            file_name: file.file_name,
            content_type: file.content_type,
            bytes: if body.bytes > 0 {
                body.bytes
            } else {
                file.data.len() as u64
            },
        };
        info!(public_id = %stored.public_id, bytes = stored.bytes, "Uploaded file");
        Ok(stored)
    }

    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> PortResult<()> {
        // Destroy needs a concrete type; "auto" uploads are stored as images.
        let kind = match resource_type {
            ResourceType::Auto => ResourceType::Image,
            other => other,
        };
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", public_id), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        let url = self.endpoint(kind.as_str(), "destroy");
        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
        ];

        let response = send_with_retry(&self.backoff, "cloudinary", || {
            self.http.post(&url).form(&params)
        })
        .await?;
        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| PortError::ExternalService(format!("Unreadable destroy reply: {}", e)))?;

        match body.result.as_str() {
            "ok" => {
                debug!(%public_id, "Deleted file");
                Ok(())
            }
            "not found" => Err(PortError::NotFound(format!("File {}", public_id))),
            other => Err(PortError::ExternalService(format!(
                "Cloudinary refused to delete {}: {}",
                public_id, other
            ))),
        }
    }
}

//=========================================================================================
// Disabled Storage
//=========================================================================================

/// Rejects uploads; deletes are no-ops since nothing could have been stored.
#[derive(Clone, Default)]
pub struct DisabledStorage;

#[async_trait]
impl FileStorage for DisabledStorage {
    async fn upload(&self, file: FileUpload) -> PortResult<StoredFile> {
        Err(PortError::ExternalService(format!(
            "File storage is not configured; cannot store {}",
            file.file_name
        )))
    }

    async fn delete(&self, _public_id: &str, _resource_type: ResourceType) -> PortResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        // echo -n "folder=classroom&timestamp=1700000000secret" | sha1sum
        let expected = format!(
            "{:x}",
            Sha1::digest(b"folder=classroom&timestamp=1700000000secret")
        );
        assert_eq!(
            sign(&[("timestamp", "1700000000"), ("folder", "classroom")], "secret"),
            expected
        );
        assert_eq!(expected.len(), 40);
    }

    #[test]
    fn empty_params_are_left_out_of_the_signature() {
        assert_eq!(
            sign(&[("folder", ""), ("timestamp", "1")], "s"),
            sign(&[("timestamp", "1")], "s")
        );
    }

    #[tokio::test]
    async fn disabled_storage_rejects_uploads() {
        let upload = FileUpload {
            file_name: "a.pdf".into(),
            content_type: "application/pdf".into(),
            data: vec![1, 2, 3],
        };
        assert!(matches!(
            DisabledStorage.upload(upload).await,
            Err(PortError::ExternalService(_))
        ));
        assert!(DisabledStorage.delete("x", ResourceType::Raw).await.is_ok());
    }
}
