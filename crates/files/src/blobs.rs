//! Content-addressed blob store implementation.

use crate::constants::HASH_ALGORITHM;
use crate::{FilesError, FILES_FOLDER_NAME, MAX_BLOB_BYTES};
use cardio_uuid::Sha256Hash;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata returned when a blob is stored.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Reference to hand back to callers; rows store this value
    pub hash: Sha256Hash,

    /// Size of the blob in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), best-effort only
    pub media_type: Option<String>,

    /// When this call stored the blob
    pub stored_at: DateTime<Utc>,

    /// True if identical bytes were already present and nothing was written
    pub deduplicated: bool,
}

/// Blob storage rooted at `<data_dir>/files`.
///
/// Cheap to clone; holds only the root path.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens (creating if needed) the blob folder under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidRootDirectory`] if the folder cannot be created or a
    /// non-directory already occupies its path.
    pub fn open(data_dir: &Path) -> Result<Self, FilesError> {
        let root = data_dir.join(FILES_FOLDER_NAME);
        fs::create_dir_all(&root).map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot create blob directory {}: {}",
                root.display(),
                e
            ))
        })?;

        if !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    /// Stores `bytes` and returns their reference.
    ///
    /// Storing bytes that are already present is not an error: the existing blob is kept
    /// and the returned metadata has `deduplicated = true`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `bytes` is empty or larger than [`MAX_BLOB_BYTES`]
    /// - the shard directory or the blob file cannot be written
    pub fn put(&self, bytes: &[u8]) -> Result<BlobMetadata, FilesError> {
        if bytes.is_empty() {
            return Err(FilesError::InvalidBlob("upload is empty".into()));
        }
        if bytes.len() > MAX_BLOB_BYTES {
            return Err(FilesError::InvalidBlob(format!(
                "upload is {} bytes, limit is {}",
                bytes.len(),
                MAX_BLOB_BYTES
            )));
        }

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let hash = Sha256Hash::from_bytes(&digest);
        let storage_path = self.storage_path(&hash);
        let media_type = infer::get(bytes).map(|kind| kind.mime_type().to_string());

        let deduplicated = storage_path.is_file();
        if !deduplicated {
            if let Some(parent) = storage_path.parent() {
                fs::create_dir_all(parent)?;
            }
            // Write under a temporary name so a crash never leaves a truncated blob at the
            // content-addressed path.
            let tmp = storage_path.with_extension("tmp");
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &storage_path)?;
            tracing::debug!(hash = %hash, size = bytes.len(), "stored blob");
        }

        Ok(BlobMetadata {
            hash,
            size_bytes: bytes.len() as u64,
            media_type,
            stored_at: Utc::now(),
            deduplicated,
        })
    }

    /// Reads a blob back.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if nothing is stored under `hash`.
    pub fn get(&self, hash: &Sha256Hash) -> Result<Vec<u8>, FilesError> {
        let storage_path = self.storage_path(hash);
        if !storage_path.is_file() {
            return Err(FilesError::NotFound(hash.to_string()));
        }
        Ok(fs::read(&storage_path)?)
    }

    /// Returns true if a blob is stored under `hash`.
    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.storage_path(hash).is_file()
    }

    /// Detects the media type of a stored blob, best-effort.
    pub fn media_type(&self, hash: &Sha256Hash) -> Result<Option<String>, FilesError> {
        let bytes = self.get(hash)?;
        Ok(infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
    }

    /// `<root>/sha256/<h[0..2]>/<h[2..4]>/<h>`
    fn storage_path(&self, hash: &Sha256Hash) -> PathBuf {
        let hex = hash.as_str();
        self.root
            .join(HASH_ALGORITHM)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(hex)
    }
}
