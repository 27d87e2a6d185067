//! Harvesting of container images into artifact payloads. The image
//! reference is resolved through the registry client, the manifest (or the
//! whole image index) is walked and every reachable manifest becomes one
//! artifact entry addressed by tag or digest.

use std::collections::BTreeMap;

use oci_distribution::client::{Client, ClientConfig};
use oci_distribution::manifest;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::artifact::{AddPayload, Artifact, ArtifactInfo};
use crate::error::Error;

/// Environment variable holding the registry user name.
pub const CR_USERNAME_ENV: &str = "TUFRA_CR_USERNAME";
/// Environment variable holding the registry password or token.
pub const CR_PASSWORD_ENV: &str = "TUFRA_CR_PASSWORD";

/// Manifest media types the harvester accepts.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    manifest::OCI_IMAGE_INDEX_MEDIA_TYPE,
    manifest::IMAGE_MANIFEST_LIST_MEDIA_TYPE,
    manifest::OCI_IMAGE_MEDIA_TYPE,
    manifest::IMAGE_MANIFEST_MEDIA_TYPE,
];

/// Read registry credentials from the environment, anonymous otherwise.
pub fn registry_auth_from_env() -> RegistryAuth {
    match (
        std::env::var(CR_USERNAME_ENV),
        std::env::var(CR_PASSWORD_ENV),
    ) {
        (Ok(username), Ok(password)) => RegistryAuth::Basic(username, password),
        _ => RegistryAuth::Anonymous,
    }
}

pub struct RegistryHarvester {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryHarvester {
    pub fn new(config: ClientConfig, auth: RegistryAuth) -> Self {
        RegistryHarvester {
            auth,
            client: Client::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ClientConfig::default(), registry_auth_from_env())
    }

    async fn pull_manifest_raw(&mut self, reference: &Reference) -> Result<Vec<u8>, Error> {
        debug!("pulling manifest at {reference:?}");
        let (raw, _digest) = self
            .client
            .pull_manifest_raw(reference, &self.auth, MANIFEST_MEDIA_TYPES)
            .await?;
        Ok(raw)
    }

    /// Resolve `image` and turn it and every manifest reachable from it
    /// into artifact entries. Bare names resolve to Docker Hub, missing
    /// tags default to `latest`; digest references are rejected.
    pub async fn harvest(&mut self, image: &str) -> Result<AddPayload, Error> {
        let reference: Reference = image
            .parse()
            .map_err(|err| Error::InvalidReference(format!("{image}: {err}")))?;
        if reference.digest().is_some() {
            return Err(Error::DigestReference(image.to_string()));
        }
        let tag = reference.tag().unwrap_or("latest").to_string();

        let raw = self.pull_manifest_raw(&reference).await?;
        let (length, digest) = size_and_digest(&raw);
        let document: Value = serde_json::from_slice(&raw)?;
        let media_type = document
            .get("mediaType")
            .and_then(Value::as_str)
            .unwrap_or(manifest::OCI_IMAGE_MEDIA_TYPE)
            .to_string();

        let mut artifacts = Vec::new();
        match media_type.as_str() {
            manifest::OCI_IMAGE_INDEX_MEDIA_TYPE | manifest::IMAGE_MANIFEST_LIST_MEDIA_TYPE => {
                artifacts.push(registry_artifact(
                    format!("{}:{tag}", reference.repository()),
                    length,
                    &digest,
                ));
                for entry in index_digests(&document)? {
                    let manifest_reference = Reference::with_digest(
                        reference.registry().to_string(),
                        reference.repository().to_string(),
                        entry.clone(),
                    );
                    let raw = self.pull_manifest_raw(&manifest_reference).await?;
                    let (length, digest) = size_and_digest(&raw);
                    artifacts.push(registry_artifact(
                        format!("{}@{entry}", reference.repository()),
                        length,
                        &digest,
                    ));
                }
            }
            manifest::OCI_IMAGE_MEDIA_TYPE | manifest::IMAGE_MANIFEST_MEDIA_TYPE => {
                artifacts.push(registry_artifact(
                    format!("{}:{tag}", reference.repository()),
                    length,
                    &digest,
                ));
                artifacts.push(registry_artifact(
                    format!("{}@{digest}", reference.repository()),
                    length,
                    &digest,
                ));
            }
            other => return Err(Error::UnsupportedMediaType(other.to_string())),
        }
        Ok(AddPayload::new(artifacts))
    }
}

/// Length and `sha256:<hex>` digest of a raw manifest document.
fn size_and_digest(data: &[u8]) -> (u64, String) {
    (
        data.len() as u64,
        format!("sha256:{}", hex::encode(Sha256::digest(data))),
    )
}

fn registry_artifact(path: String, length: u64, digest: &str) -> Artifact {
    let (algorithm, value) = digest.split_once(':').unwrap_or(("sha256", digest));
    Artifact {
        info: ArtifactInfo {
            length,
            hashes: BTreeMap::from([(algorithm.to_string(), value.to_string())]),
            custom: None,
        },
        path,
    }
}

/// The digests of all entries of an image index.
fn index_digests(document: &Value) -> Result<Vec<String>, Error> {
    document
        .get("manifests")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| {
                    entry
                        .get("digest")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            Error::InvalidReference("index entry without digest".to_string())
                        })
                })
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reference_normalization_docker_hub() {
        let reference: Reference = "postgres:17".parse().expect("failed to parse reference");
        assert_eq!(reference.repository(), "library/postgres");
        assert_eq!(reference.tag(), Some("17"));
    }

    #[test]
    fn test_reference_normalization_custom_registry() {
        let reference: Reference = "ghcr.io/in-toto/archivista:0.9.0"
            .parse()
            .expect("failed to parse reference");
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.repository(), "in-toto/archivista");
        assert_eq!(reference.tag(), Some("0.9.0"));
    }

    #[test]
    fn test_size_and_digest() {
        let (length, digest) = size_and_digest(b"abc");
        assert_eq!(length, 3);
        assert_eq!(
            digest,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_registry_artifact_splits_digest() {
        let artifact = registry_artifact("library/postgres@sha256:abcd".to_string(), 7, "sha256:abcd");
        assert_eq!(artifact.info.hashes.get("sha256").map(String::as_str), Some("abcd"));
        assert_eq!(artifact.info.length, 7);
    }

    #[test]
    fn test_index_digests() {
        let document = serde_json::json!({
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {"digest": "sha256:aa", "size": 1},
                {"digest": "sha256:bb", "size": 2},
            ],
        });
        let digests = index_digests(&document).expect("digest walk failed");
        assert_eq!(digests, vec!["sha256:aa", "sha256:bb"]);
    }

    #[test]
    fn test_index_entry_without_digest_is_an_error() {
        let document = serde_json::json!({"manifests": [{"size": 1}]});
        assert!(index_digests(&document).is_err());
    }
}
