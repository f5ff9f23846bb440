//! Media storage providers.
//!
//! The upload relay hands a [`StagedUpload`] to a [`MediaStore`] and gets back the public URL of
//! the stored asset. [`cloudinary::CloudinaryStore`] is the production backend.

pub mod cloudinary;
pub mod signing;

use async_trait::async_trait;

use crate::errors::Result;
use crate::staging::StagedUpload;

pub use cloudinary::CloudinaryStore;

/// A stored asset as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// HTTPS URL the asset is served from
    pub secure_url: String,
    pub public_id: Option<String>,
    pub bytes: Option<u64>,
}

/// Trait for media storage backends
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Forward the staged upload and return where it can be fetched from
    async fn upload(&self, artifact: &StagedUpload) -> Result<StoredAsset>;
}
