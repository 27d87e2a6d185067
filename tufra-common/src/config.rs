//! ## Example YAML Configuration
//!
//! ```
//! use tufra_common::config::RepositoryConfig;
//!
//! let config = r#"
//! server: https://api.example.org
//! headers:
//!   Authorization: "Bearer deadbeef"
//! current_repository: production
//! repositories:
//!   production:
//!     metadata_url: https://metadata.example.org
//!     artifact_base_url: https://downloads.example.org
//!     trusted_root: L3BhdGgvdG8vcm9vdC5qc29u
//!     hash_prefix: true
//! "#;
//! let config: RepositoryConfig = serde_yaml::from_str(config).expect("failed to parse config");
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Data structure that is used to configure the client with YAML files.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    /// base URL of the repository service API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Url>,
    /// headers added to every API request, e.g. an `Authorization` entry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// name of the repository used when none is selected explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_repository: Option<String>,
    /// known artifact repositories, keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<String, RepositorySettings>,
}

/// Per-repository settings for TUF-verified downloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositorySettings {
    /// base URL from which TUF metadata is fetched
    pub metadata_url: Url,
    /// base URL from which artifacts are fetched, `oci://` selects the
    /// registry transport
    pub artifact_base_url: Url,
    /// base64-encoded path to the bootstrap root file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_root: Option<String>,
    /// whether the repository serves hash-prefixed target paths
    #[serde(default)]
    pub hash_prefix: bool,
}

impl RepositoryConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf, Error> {
        let dirs = ProjectDirs::from("", "", "tufra").ok_or(Error::HomeDirectory)?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Load the configuration at `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>, Error> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_yaml::from_str(&data)?))
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn repository(&self, name: &str) -> Option<&RepositorySettings> {
        self.repositories.get(name)
    }
}

/// Settings resolved from the configuration file and command line overrides.
#[derive(Debug, Default)]
pub struct Settings {
    pub server: Option<Url>,
    pub headers: Vec<(String, String)>,
    pub config: Option<RepositoryConfig>,
}

impl Settings {
    /// Merge the file configuration with command line overrides. The
    /// `--api-server` and `--headers` flags win over the file contents.
    pub fn resolve(
        config: Option<RepositoryConfig>,
        api_server: Option<Url>,
        headers: Option<&str>,
    ) -> Result<Self, Error> {
        let server = api_server.or_else(|| config.as_ref().and_then(|c| c.server.clone()));
        let headers = match headers {
            Some(raw) => parse_headers(raw)?,
            None => config
                .as_ref()
                .map(|c| {
                    c.headers
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        };
        Ok(Settings {
            server,
            headers,
            config,
        })
    }
}

/// Parse a `"Name: value, Other: value"` header string into pairs. Values
/// may contain colons, the split happens on the first one only.
pub fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, Error> {
    let mut headers = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(entry.to_string()))?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return Err(Error::InvalidHeader(entry.to_string()));
        }
        headers.push((name.to_string(), value.to_string()));
    }
    Ok(headers)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = r#"
server: https://api.example.org
current_repository: production
repositories:
  production:
    metadata_url: https://metadata.example.org
    artifact_base_url: https://downloads.example.org
    trusted_root: L3BhdGgvdG8vcm9vdC5qc29u
"#;
        let config: RepositoryConfig =
            serde_yaml::from_str(config).expect("failed to parse config");
        assert_eq!(config.current_repository.as_deref(), Some("production"));
        let repository = config.repository("production").expect("missing repository");
        assert!(!repository.hash_prefix);
        assert_eq!(
            repository.trusted_root.as_deref(),
            Some("L3BhdGgvdG8vcm9vdC5qc29u")
        );
    }

    #[test]
    fn test_parse_headers() {
        let headers =
            parse_headers("apikey: 1234, Content-Type: application/json").expect("parse failed");
        assert_eq!(
            headers,
            vec![
                ("apikey".to_string(), "1234".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_headers_value_with_colon() {
        let headers = parse_headers("Authorization: Bearer a:b").expect("parse failed");
        assert_eq!(
            headers,
            vec![("Authorization".to_string(), "Bearer a:b".to_string())]
        );
    }

    #[test]
    fn test_parse_headers_empty() {
        assert!(parse_headers("").expect("parse failed").is_empty());
    }

    #[test]
    fn test_parse_headers_malformed() {
        assert!(parse_headers("no-colon-here").is_err());
    }

    #[test]
    fn test_settings_cli_overrides_file() {
        let config = RepositoryConfig {
            server: Some(Url::parse("https://file.example.org").unwrap()),
            headers: BTreeMap::from([("apikey".to_string(), "file".to_string())]),
            ..Default::default()
        };
        let settings = Settings::resolve(
            Some(config),
            Some(Url::parse("https://flag.example.org").unwrap()),
            Some("apikey: flag"),
        )
        .expect("resolve failed");
        assert_eq!(
            settings.server.as_ref().map(Url::as_str),
            Some("https://flag.example.org/")
        );
        assert_eq!(
            settings.headers,
            vec![("apikey".to_string(), "flag".to_string())]
        );
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let loaded = RepositoryConfig::load(&dir.path().join("missing.yaml")).expect("load failed");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.yaml");
        let config = RepositoryConfig {
            server: Some(Url::parse("https://api.example.org").unwrap()),
            current_repository: Some("production".to_string()),
            ..Default::default()
        };
        config.save(&path).expect("save failed");
        let loaded = RepositoryConfig::load(&path)
            .expect("load failed")
            .expect("missing config");
        assert_eq!(loaded, config);
    }
}
