//! TUF integration of the download client. Trust bootstrapping, the
//! per-repository metadata cache and the verified target fetch all live
//! here; signature and consistency checking is entirely `tough`'s job.

use std::path::{Path, PathBuf};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use tough::schema::{Root, Signed};
use tough::{IntoVec, RepositoryLoader, TargetName};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;

pub mod transport;

pub use transport::RegistryTransport;

/// File name of the trusted root inside the metadata cache.
pub const TRUSTED_ROOT_FILE: &str = "root.json";

/// Per-repository metadata cache directory. Repositories are keyed by the
/// first 8 hex characters of the sha256 of their metadata URL.
pub fn metadata_cache_dir(metadata_url: &str) -> Result<PathBuf, Error> {
    let digest = hex::encode(Sha256::digest(metadata_url.as_bytes()));
    let dirs = ProjectDirs::from("", "", "tufra").ok_or(Error::HomeDirectory)?;
    Ok(dirs.data_local_dir().join(&digest[..8]))
}

/// Decode the base64-encoded trusted root path from the configuration.
pub fn decode_trusted_root(encoded: &str) -> Result<PathBuf, Error> {
    let decoded = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|err| Error::InvalidTrustedRoot(err.to_string()))?;
    let path =
        String::from_utf8(decoded).map_err(|err| Error::InvalidTrustedRoot(err.to_string()))?;
    Ok(PathBuf::from(path))
}

/// Install `root` as the trusted root of the metadata cache.
pub async fn init_trusted_root(metadata_dir: &Path, root: &Path) -> Result<(), Error> {
    tokio::fs::create_dir_all(metadata_dir).await?;
    let data = tokio::fs::read(root).await?;
    tokio::fs::write(metadata_dir.join(TRUSTED_ROOT_FILE), data).await?;
    Ok(())
}

/// Trust-on-first-use initialization: fetch the version 1 root from the
/// metadata URL and install it as the trusted root. Only reached when no
/// root was configured and the cache is empty.
pub async fn init_tofu(metadata_url: &Url, metadata_dir: &Path) -> Result<(), Error> {
    let url = metadata_url.join("1.root.json")?;
    debug!("fetching initial root from {url}");
    let response = reqwest::get(url.clone()).await?;
    if !response.status().is_success() {
        return Err(Error::UnexpectedResponse {
            endpoint: url.to_string(),
            status: response.status().as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    let data = response.bytes().await?;
    tokio::fs::create_dir_all(metadata_dir).await?;
    tokio::fs::write(metadata_dir.join(TRUSTED_ROOT_FILE), &data).await?;
    Ok(())
}

/// Whether the metadata cache already holds a trusted root.
pub fn has_trusted_root(metadata_dir: &Path) -> bool {
    metadata_dir.join(TRUSTED_ROOT_FILE).is_file()
}

/// A TUF-verified artifact downloader for one repository.
#[derive(Debug)]
pub struct ArtifactDownloader {
    metadata_url: Url,
    targets_url: Url,
    metadata_dir: PathBuf,
    transport: RegistryTransport,
}

impl ArtifactDownloader {
    pub fn new(metadata_url: Url, targets_url: Url, metadata_dir: PathBuf) -> Self {
        ArtifactDownloader {
            metadata_url,
            targets_url,
            metadata_dir,
            transport: RegistryTransport::from_env(),
        }
    }

    /// Compare the operator's hash-prefix expectation against the trusted
    /// root. The metadata decides how targets are addressed, the flag only
    /// exists to surface surprising repository configurations early.
    pub async fn check_hash_prefix(&self, expected: bool) -> Result<(), Error> {
        let data = tokio::fs::read(self.metadata_dir.join(TRUSTED_ROOT_FILE)).await?;
        let root: Signed<Root> = serde_json::from_slice(&data)?;
        if root.signed.consistent_snapshot != expected {
            warn!(
                "repository metadata sets consistent_snapshot={} which overrides the configured hash_prefix={}",
                root.signed.consistent_snapshot, expected
            );
        }
        Ok(())
    }

    /// Download `target` into `out_dir` after a full TUF verification
    /// round. Returns the path the artifact was written to.
    pub async fn download(&self, target: &str, out_dir: &Path) -> Result<PathBuf, Error> {
        let root = tokio::fs::read(self.metadata_dir.join(TRUSTED_ROOT_FILE)).await?;
        let repository = RepositoryLoader::new(
            root.as_slice(),
            self.metadata_url.clone(),
            self.targets_url.clone(),
        )
        .transport(self.transport.clone())
        .datastore(&self.metadata_dir)
        .load()
        .await?;

        let name = TargetName::new(target)?;
        let stream = repository
            .read_target(&name)
            .await?
            .ok_or_else(|| Error::TargetNotFound(target.to_string()))?;
        let data = stream
            .into_vec()
            .await
            .map_err(|err| Error::DownloadFailed(format!("{target}: {err}")))?;

        let out_path = out_dir.join(target);
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&out_path, &data).await?;
        Ok(out_path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_metadata_cache_dir_is_keyed_by_url_hash() {
        let dir = metadata_cache_dir("http://example.org").expect("no cache dir");
        let digest = hex::encode(Sha256::digest(b"http://example.org"));
        assert_eq!(
            dir.file_name().and_then(|name| name.to_str()),
            Some(&digest[..8])
        );
    }

    #[test]
    fn test_metadata_cache_dir_differs_per_url() {
        let first = metadata_cache_dir("http://one.example.org").unwrap();
        let second = metadata_cache_dir("http://two.example.org").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decode_trusted_root() {
        let encoded = "ZXhhbXBsZS9ob21lL3BhdGgvLmxvY2FsL3NoYXJlL3R1ZnJhL3Jvb3QuanNvbg==";
        let decoded = decode_trusted_root(encoded).expect("decode failed");
        assert_eq!(
            decoded,
            PathBuf::from("example/home/path/.local/share/tufra/root.json")
        );
    }

    #[test]
    fn test_decode_trusted_root_rejects_garbage() {
        assert!(decode_trusted_root("not base64 at all!").is_err());
    }

    #[tokio::test]
    async fn test_init_trusted_root_copies_into_cache() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let root = dir.path().join("1.root.json");
        tokio::fs::write(&root, b"{}").await.unwrap();
        let cache = dir.path().join("cache");
        init_trusted_root(&cache, &root).await.expect("init failed");
        assert!(has_trusted_root(&cache));
        let copied = tokio::fs::read(cache.join(TRUSTED_ROOT_FILE)).await.unwrap();
        assert_eq!(copied, b"{}");
    }
}
