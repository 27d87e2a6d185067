//! # Tufra Common
//! This crate contains the pieces of the `tufra` client that are shared
//! between the command-line tool and its tests: the repository service API
//! client, artifact payload construction, the registry harvester, the
//! TUF download client and the ceremony metadata machinery.

/// Repository service REST API client.
pub mod api;
/// Artifact payloads and hashing.
pub mod artifact;
/// Configuration file handling.
pub mod config;
pub mod error;
/// Ceremony key handling and root metadata initialization.
pub mod metadata;
/// TUF download client integration.
pub mod tuf;

pub use error::Error;
