pub mod artifact;
pub mod ceremony;
pub mod key;
pub mod metadata;
pub mod task;

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use tufra_common::api::ApiClient;
use tufra_common::config::{RepositoryConfig, Settings};

use crate::cli::Cli;

/// Merge the configuration file with the global command line overrides.
pub fn resolve_settings(args: &Cli) -> Result<Settings> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => RepositoryConfig::default_path()?,
    };
    let config = RepositoryConfig::load(&path)
        .with_context(|| format!("failed to load configuration at {}", path.display()))?;
    if config.is_some() {
        debug!("using configuration at {}", path.display());
    }
    Settings::resolve(config, args.api_server.clone(), args.headers.as_deref())
        .context("failed to resolve settings")
}

/// An API client for the configured server. Commands that talk to the
/// service require a server from the config file or `--api-server`.
pub fn api_client(settings: &Settings) -> Result<ApiClient> {
    let server = settings.server.clone().ok_or_else(|| {
        anyhow!("requires '--api-server', example: --api-server https://api.tufra.example.com")
    })?;
    Ok(ApiClient::new(server, &settings.headers)?)
}
