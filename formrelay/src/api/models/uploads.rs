use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::StoredAsset;

/// Result of a successful upload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Public HTTPS URL of the stored file
    pub secure_url: String,
}

impl From<StoredAsset> for UploadResponse {
    fn from(asset: StoredAsset) -> Self {
        Self {
            secure_url: asset.secure_url,
        }
    }
}

/// Multipart body accepted by `/upload-cv` (documentation only)
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// The file to store
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
