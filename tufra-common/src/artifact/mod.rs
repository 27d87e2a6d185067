//! Payloads for the artifact endpoints of the repository service and the
//! hashing that goes into them. Local files are hashed with blake2b-256,
//! the only file hash the service accepts; registry artifacts carry the
//! sha256 digests the registry already speaks.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub mod oci;

/// Name of the file hash algorithm in artifact payloads.
pub const BLAKE2B_256: &str = "blake2b-256";

type Blake2b256 = Blake2b<U32>;

/// The target information of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactInfo {
    /// length in bytes
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    pub custom: Option<Value>,
}

/// A single artifact of an [`AddPayload`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub info: ArtifactInfo,
    pub path: String,
}

/// The `POST api/v1/artifacts/` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddPayload {
    pub artifacts: Vec<Artifact>,
    /// whether the service records the task id in the artifact `custom` data
    pub add_task_id_to_custom: bool,
    /// whether the artifacts are published right away
    pub publish_artifacts: bool,
}

impl AddPayload {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        AddPayload {
            artifacts,
            add_task_id_to_custom: false,
            publish_artifacts: true,
        }
    }
}

/// The `POST api/v1/artifacts/delete` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletePayload {
    pub artifacts: Vec<String>,
}

/// Calculate the blake2b-256 hash of the file at `path`, reading it in
/// 8 KiB chunks so large artifacts do not end up in memory at once.
pub fn calculate_blake2b_256(path: &Path) -> Result<String, Error> {
    let mut hasher = Blake2b256::new();
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 8 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Build the payload for adding a local file. The artifact path is the file
/// name, prefixed with `target_path` when one is given.
pub fn add_payload_from_file(
    filepath: &Path,
    target_path: Option<&str>,
) -> Result<AddPayload, Error> {
    let file_name = filepath
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidArtifactPath(filepath.to_path_buf()))?;
    let length = std::fs::metadata(filepath)?.len();
    let hash = calculate_blake2b_256(filepath)?;
    let path = match target_path {
        Some(prefix) => format!("{}/{file_name}", prefix.trim_end_matches('/')),
        None => file_name.to_string(),
    };
    Ok(AddPayload::new(vec![Artifact {
        info: ArtifactInfo {
            length,
            hashes: BTreeMap::from([(BLAKE2B_256.to_string(), hash)]),
            custom: None,
        },
        path,
    }]))
}

/// Build the payload for removing artifacts from the metadata.
pub fn delete_payload(paths: Vec<String>) -> DeletePayload {
    DeletePayload { artifacts: paths }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_blake2b_256_empty_file() {
        let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
        file.flush().unwrap();
        assert_eq!(
            calculate_blake2b_256(file.path()).expect("hashing failed"),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_blake2b_256_known_vector() {
        let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();
        assert_eq!(
            calculate_blake2b_256(file.path()).expect("hashing failed"),
            "bddd813c634239723171ef3fee98579b94964e3bb1cb3e427262c8c068d52319"
        );
    }

    #[test]
    fn test_add_payload_shape() {
        let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();
        let payload =
            add_payload_from_file(file.path(), Some("downloads/")).expect("payload failed");
        let value = serde_json::to_value(&payload).expect("serialization failed");
        let artifact = &value["artifacts"][0];
        assert_eq!(artifact["info"]["length"], 3);
        assert_eq!(
            artifact["info"]["hashes"][BLAKE2B_256],
            "bddd813c634239723171ef3fee98579b94964e3bb1cb3e427262c8c068d52319"
        );
        assert!(artifact["info"]["custom"].is_null());
        assert!(artifact["path"]
            .as_str()
            .expect("path must be a string")
            .starts_with("downloads/"));
        assert_eq!(value["add_task_id_to_custom"], false);
        assert_eq!(value["publish_artifacts"], true);
    }

    #[test]
    fn test_add_payload_without_prefix_uses_file_name() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("artifact.bin");
        std::fs::write(&path, b"data").unwrap();
        let payload = add_payload_from_file(&path, None).expect("payload failed");
        assert_eq!(payload.artifacts[0].path, "artifact.bin");
    }

    #[test]
    fn test_delete_payload_shape() {
        let payload = delete_payload(vec!["dir/file.txt".to_string()]);
        let value = serde_json::to_value(&payload).expect("serialization failed");
        assert_eq!(value, serde_json::json!({"artifacts": ["dir/file.txt"]}));
    }
}
