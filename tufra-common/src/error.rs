use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to connect to {0}")]
    ServerUnreachable(String),
    #[error("unexpected response from {endpoint}: {status} {body}")]
    UnexpectedResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("server {0} does not allow bootstrap")]
    BootstrapNotAllowed(String),
    #[error("missing field `{0}` in server response")]
    MissingResponseField(&'static str),
    #[error("task {task_id} did not succeed: {reason}")]
    TaskFailed { task_id: String, reason: String },
    #[error("invalid header entry {0:?}, expected `Name: value`")]
    InvalidHeader(String),
    #[error("error during I/O {0:?}")]
    Io(#[from] std::io::Error),
    #[error("HTTP request failed {0:?}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL {0:?}")]
    Url(#[from] url::ParseError),
    #[error("error while interacting with OCI registry {0:?}")]
    Oci(#[from] oci_distribution::errors::OciDistributionError),
    #[error("could not parse image reference {0}")]
    InvalidReference(String),
    #[error("digest references are not supported, use a tag: {0}")]
    DigestReference(String),
    #[error("manifest media type {0:?} is not supported")]
    UnsupportedMediaType(String),
    #[error("failure during TUF repository update {0:?}")]
    Tuf(#[from] tough::error::Error),
    #[error("artifact {0} not found in repository metadata")]
    TargetNotFound(String),
    #[error("failed to download artifact {0}")]
    DownloadFailed(String),
    #[error("could not determine a home directory for the metadata cache")]
    HomeDirectory,
    #[error("invalid trusted root setting: {0}")]
    InvalidTrustedRoot(String),
    #[error("failed to load key at {path:?}: {reason}")]
    KeyLoad { path: PathBuf, reason: String },
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("invalid role configuration: {0}")]
    InvalidRoleConfig(String),
    #[error("invalid artifact path {0:?}")]
    InvalidArtifactPath(PathBuf),
    #[error("serialization to JSON failed {0:?}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse configuration {0:?}")]
    Config(#[from] serde_yaml::Error),
}
