/// Folder under the data directory that holds all blobs.
pub const FILES_FOLDER_NAME: &str = "files";

/// Hash algorithm folder, kept in the path so the algorithm can change without collisions.
pub(crate) const HASH_ALGORITHM: &str = "sha256";

/// Upper bound for a single upload (profile pictures).
pub const MAX_BLOB_BYTES: usize = 5 * 1024 * 1024;
