//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Nothing in this crate reads environment variables during request handling.

use crate::constants::DEFAULT_DATA_DIR;
use crate::{CardioError, CardioResult};
use cardio_uuid::Sha256Hash;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    public_url: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `public_url` is the externally reachable base URL used to build image links; it must be
    /// an `http` or `https` URL. A trailing slash is dropped.
    pub fn new(data_dir: PathBuf, public_url: impl Into<String>) -> CardioResult<Self> {
        let public_url = public_url.into().trim().trim_end_matches('/').to_string();
        if !(public_url.starts_with("http://") || public_url.starts_with("https://")) {
            return Err(CardioError::Config(format!(
                "public url must start with http:// or https://, got {public_url:?}"
            )));
        }
        if public_url.contains(char::is_whitespace) {
            return Err(CardioError::Config("public url cannot contain whitespace".into()));
        }

        Ok(Self {
            data_dir,
            public_url,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Public URL at which a stored blob can be fetched.
    pub fn blob_url(&self, hash: &Sha256Hash) -> String {
        format!("{}/files/{}", self.public_url, hash)
    }
}

/// Resolve the data directory without reading environment variables.
///
/// Blank overrides fall back to [`DEFAULT_DATA_DIR`] relative to the working directory.
pub fn resolve_data_dir(override_dir: Option<String>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => PathBuf::from(DEFAULT_DATA_DIR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_trailing_slash() {
        let cfg = CoreConfig::new(PathBuf::from("data"), "https://cardio.example/").unwrap();
        assert_eq!(cfg.public_url(), "https://cardio.example");
    }

    #[test]
    fn test_new_rejects_non_http_url() {
        let err = CoreConfig::new(PathBuf::from("data"), "ftp://cardio.example")
            .expect_err("ftp should be rejected");
        assert!(matches!(err, CardioError::Config(_)));
    }

    #[test]
    fn test_blob_url() {
        let cfg = CoreConfig::new(PathBuf::from("data"), "http://localhost:3000").unwrap();
        let hash = Sha256Hash::parse(&"ab".repeat(32)).unwrap();
        assert_eq!(
            cfg.blob_url(&hash),
            format!("http://localhost:3000/files/{}", "ab".repeat(32))
        );
    }

    #[test]
    fn test_resolve_data_dir_defaults() {
        assert_eq!(resolve_data_dir(None), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(resolve_data_dir(Some("  ".into())), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(
            resolve_data_dir(Some("/srv/cardio".into())),
            PathBuf::from("/srv/cardio")
        );
    }
}
