//! Staging of inbound upload bytes before they are forwarded to the storage provider.
//!
//! A [`Stager`] reads the `file` part of a multipart request chunk by chunk, enforcing the
//! configured size limit as it goes, and holds the bytes either in memory or in a scoped
//! temporary file depending on [`StagingStrategy`].
//!
//! Temporary files are owned by a [`TempPath`], so they are removed when the [`StagedUpload`]
//! is dropped. That covers early returns, provider errors and a client hanging up mid-request
//! (the handler future is dropped). On the normal path callers use [`StagedUpload::release`],
//! which removes the file eagerly and logs a failed removal instead of ignoring it.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use bytes::{Bytes, BytesMut};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{StagingStrategy, UploadConfig};
use crate::errors::{Error, Result};

/// Reads upload parts into staged artifacts.
#[derive(Debug, Clone)]
pub struct Stager {
    strategy: StagingStrategy,
    temp_dir: Option<PathBuf>,
    /// 0 means unlimited
    max_file_size: u64,
}

/// An uploaded file held for the duration of one request.
#[derive(Debug)]
pub struct StagedUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    content: Staged,
}

#[derive(Debug)]
enum Staged {
    Memory(Bytes),
    Disk(TempPath),
}

/// Borrowed view of where the staged bytes live.
#[derive(Debug)]
pub enum StagedContent<'a> {
    Memory(&'a Bytes),
    Disk(&'a Path),
}

impl Stager {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            strategy: config.staging,
            temp_dir: config.temp_dir.clone(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn strategy(&self) -> StagingStrategy {
        self.strategy
    }

    /// Stage a multipart field, failing fast once the size limit is exceeded.
    pub async fn stage(&self, mut field: Field<'_>) -> Result<StagedUpload> {
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let mut sink = match self.strategy {
            StagingStrategy::Memory => Sink::Memory(BytesMut::new()),
            StagingStrategy::Disk => self.open_temp_file()?,
        };

        let mut total_size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            total_size += chunk.len() as u64;

            if self.max_file_size > 0 && total_size > self.max_file_size {
                warn!(
                    total_size = total_size,
                    max_file_size = self.max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                // Dropping the sink removes any partial temp file
                return Err(Error::PayloadTooLarge {
                    message: format!(
                        "File size exceeds maximum allowed size of {} bytes ({} MB)",
                        self.max_file_size,
                        self.max_file_size / (1024 * 1024)
                    ),
                });
            }

            sink.write(&chunk).await?;
        }

        let content = sink.finish().await?;
        debug!(
            file_name = ?file_name,
            content_type = ?content_type,
            size_bytes = total_size,
            strategy = ?self.strategy,
            "Staged upload"
        );

        Ok(StagedUpload {
            file_name,
            content_type,
            size_bytes: total_size,
            content,
        })
    }

    fn open_temp_file(&self) -> Result<Sink> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("formrelay-upload-");

        let named = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create temporary upload file");
            Error::Internal {
                operation: "stage upload".to_string(),
            }
        })?;

        let (file, path) = named.into_parts();
        Ok(Sink::Disk {
            file: tokio::fs::File::from_std(file),
            path,
        })
    }
}

enum Sink {
    Memory(BytesMut),
    Disk { file: tokio::fs::File, path: TempPath },
}

impl Sink {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            Sink::Memory(buffer) => {
                buffer.extend_from_slice(chunk);
                Ok(())
            }
            Sink::Disk { file, .. } => file.write_all(chunk).await.map_err(stage_io_error),
        }
    }

    async fn finish(self) -> Result<Staged> {
        match self {
            Sink::Memory(buffer) => Ok(Staged::Memory(buffer.freeze())),
            Sink::Disk { mut file, path } => {
                file.flush().await.map_err(stage_io_error)?;
                // Close the write handle; readers reopen the file by path
                drop(file);
                Ok(Staged::Disk(path))
            }
        }
    }
}

fn stage_io_error(e: std::io::Error) -> Error {
    tracing::error!(error = %e, "Failed to write temporary upload file");
    Error::Internal {
        operation: "stage upload".to_string(),
    }
}

impl StagedUpload {
    /// Build an in-memory artifact directly, bypassing multipart parsing.
    pub fn from_bytes(file_name: Option<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            file_name,
            content_type,
            size_bytes: bytes.len() as u64,
            content: Staged::Memory(bytes),
        }
    }

    pub fn content(&self) -> StagedContent<'_> {
        match &self.content {
            Staged::Memory(bytes) => StagedContent::Memory(bytes),
            Staged::Disk(path) => StagedContent::Disk(&**path),
        }
    }

    /// Location of the temporary file, when staged to disk.
    pub fn temporary_path(&self) -> Option<&Path> {
        match &self.content {
            Staged::Memory(_) => None,
            Staged::Disk(path) => Some(&**path),
        }
    }

    /// An empty part without a filename is what browsers send for an empty file input.
    pub fn is_blank(&self) -> bool {
        self.size_bytes == 0 && self.file_name.as_deref().is_none_or(str::is_empty)
    }

    /// Release the staged bytes now. A failed temp file removal is logged and otherwise ignored,
    /// since the response to the client has already been decided.
    pub fn release(self) {
        if let Staged::Disk(path) = self.content {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!(path = %shown, "Removed temporary upload file"),
                Err(e) => warn!(path = %shown, error = %e, "Failed to remove temporary upload file"),
            }
        }
    }
}
