//! Cardio blob storage.
//!
//! Binary uploads (patient profile pictures) are kept out of the row store. A caller hands
//! over bytes and gets back a [`Sha256Hash`] reference; rows store only that reference.
//!
//! ## Layout
//!
//! ```text
//! <data_dir>/
//! └── files/
//!     └── sha256/
//!         └── ab/
//!             └── 3f/
//!                 └── ab3f9e…
//! ```
//!
//! Blobs are immutable and content-addressed: storing the same bytes twice yields the same
//! reference and leaves a single copy on disk.

mod blobs;
mod constants;

pub use blobs::{BlobMetadata, BlobStore};
pub use cardio_uuid::Sha256Hash;
pub use constants::{FILES_FOLDER_NAME, MAX_BLOB_BYTES};

/// Errors that can occur during blob operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory could not be created or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// No blob stored under this reference
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Upload was empty or exceeded the size limit
    #[error("Invalid blob: {0}")]
    InvalidBlob(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed reference
    #[error("Invalid reference: {0}")]
    Reference(#[from] cardio_uuid::UuidError),
}
