//! Cloudinary signed upload client.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, instrument};
use url::Url;

use super::{MediaStore, StoredAsset, signing};
use crate::config::{ResourceType, SignatureAlgorithm, StorageConfig};
use crate::errors::{Error, Result};
use crate::staging::{StagedContent, StagedUpload};

const PROVIDER: &str = "Cloudinary";

pub struct CloudinaryStore {
    client: reqwest::Client,
    api_base_url: Url,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    resource_type: ResourceType,
    signature_algorithm: SignatureAlgorithm,
}

/// Subset of the upload API response we rely on.
#[derive(Debug, Deserialize)]
struct UploadApiResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
    bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

impl CloudinaryStore {
    pub fn new(config: &StorageConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.clone(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
            resource_type: config.resource_type,
            signature_algorithm: config.signature_algorithm,
        }
    }

    /// `{base}/v1_1/{cloud_name}/{resource_type}/upload`
    fn upload_url(&self) -> Result<Url> {
        let path = format!("v1_1/{}/{}/upload", self.cloud_name, self.resource_type.as_str());
        self.api_base_url.join(&path).map_err(|e| {
            error!(error = %e, cloud_name = %self.cloud_name, "Invalid Cloudinary upload URL");
            Error::Internal {
                operation: "upload file".to_string(),
            }
        })
    }

    async fn file_part(artifact: &StagedUpload) -> Result<Part> {
        let part = match artifact.content() {
            StagedContent::Memory(bytes) => Part::stream_with_length(bytes.clone(), artifact.size_bytes),
            StagedContent::Disk(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    error!(error = %e, path = %path.display(), "Failed to reopen staged upload");
                    Error::Internal {
                        operation: "stage upload".to_string(),
                    }
                })?;
                let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
                Part::stream_with_length(body, artifact.size_bytes)
            }
        };

        let part = part.file_name(artifact.file_name.clone().unwrap_or_else(|| "upload".to_string()));

        // An unparsable client-supplied type is dropped rather than failing the upload
        let mime = artifact
            .content_type
            .as_deref()
            .filter(|mime| mime.parse::<mime_guess::Mime>().is_ok());

        match mime {
            Some(mime) => part.mime_str(mime).map_err(|e| {
                error!(error = %e, mime, "Failed to set upload content type");
                Error::Internal {
                    operation: "upload file".to_string(),
                }
            }),
            None => Ok(part),
        }
    }
}

/// Extract a human readable detail from a provider error body.
///
/// Cloudinary answers errors with `{"error": {"message": "..."}}`, but proxies and load balancers
/// in front of it answer with plain text or HTML, so fall back to the raw body.
pub(crate) fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    #[instrument(skip_all, fields(size_bytes = artifact.size_bytes, folder = %self.folder))]
    async fn upload(&self, artifact: &StagedUpload) -> Result<StoredAsset> {
        let url = self.upload_url()?;
        let timestamp = unix_timestamp().to_string();
        let signature = signing::sign_params(
            &[("folder", &self.folder), ("timestamp", &timestamp)],
            &self.api_secret,
            self.signature_algorithm,
        );

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature", signature)
            .part("file", Self::file_part(artifact).await?);

        let response = self.client.post(url).multipart(form).send().await.map_err(|e| {
            error!(error = %e, "Cloudinary upload request failed");
            Error::Internal {
                operation: "upload file".to_string(),
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read Cloudinary response body");
            Error::Internal {
                operation: "upload file".to_string(),
            }
        })?;

        if !status.is_success() {
            return Err(Error::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let parsed: UploadApiResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, body = %body, "Cloudinary returned an undecodable success body");
            Error::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail: "Storage provider returned an unexpected response".to_string(),
            }
        })?;

        let Some(secure_url) = parsed.secure_url else {
            return Err(Error::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                detail: "Storage provider response did not include a secure_url".to_string(),
            });
        };

        info!(secure_url = %secure_url, public_id = ?parsed.public_id, "Stored upload");

        Ok(StoredAsset {
            secure_url,
            public_id: parsed.public_id,
            bytes: parsed.bytes,
        })
    }
}
