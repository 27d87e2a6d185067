use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

/// Client and ceremony orchestrator for a TUF repository service.
#[derive(Debug, Parser)]
#[command(name = "tufra", author, version, about, long_about = None)]
pub struct Cli {
    /// path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// URL of the repository service API
    #[arg(long, global = true)]
    pub api_server: Option<Url>,
    /// headers to include in API requests, e.g. "apikey: abc, Accept: application/json"
    #[arg(long, short = 'H', global = true)]
    pub headers: Option<String>,
    /// log level of this application, defaults to Info.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new trust-root ceremony
    Ceremony(CeremonyArgs),
    /// Manage artifacts of the repository
    #[command(subcommand)]
    Artifact(ArtifactCommand),
    /// Root metadata maintenance
    #[command(subcommand)]
    Metadata(MetadataCommand),
    /// Inspect signing keys
    #[command(subcommand)]
    Key(KeyCommand),
    /// Query backend tasks
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Debug, clap::Args)]
pub struct CeremonyArgs {
    /// bootstrap the repository service with the ceremony result
    #[arg(short, long)]
    pub bootstrap: bool,
    /// where the bootstrap payload is written
    #[arg(short, long, default_value = "payload.json")]
    pub file: PathBuf,
    /// upload an existing payload file, requires -b/--bootstrap
    #[arg(short, long)]
    pub upload: bool,
    /// additionally save the signed metadata under ./metadata/
    #[arg(short, long)]
    pub save: bool,
}

#[derive(Debug, Subcommand)]
pub enum ArtifactCommand {
    /// Add an artifact to the TUF metadata
    Add(ArtifactAddArgs),
    /// Remove artifacts from the TUF metadata
    Delete(ArtifactDeleteArgs),
    /// Publish all unpublished artifacts
    Publish,
    /// Download an artifact through the TUF-verified update client
    Download(ArtifactDownloadArgs),
}

#[derive(Debug, clap::Args)]
pub struct ArtifactAddArgs {
    /// local file path or container image reference
    pub artifact: String,
    /// treat the artifact as a container image without checking for a local file
    #[arg(long)]
    pub oci_image: bool,
    /// custom metadata path (`TARGETPATH`) prefix for the file
    #[arg(short, long)]
    pub path: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct ArtifactDeleteArgs {
    /// metadata path of the artifact to remove
    pub path: String,
}

#[derive(Debug, clap::Args)]
pub struct ArtifactDownloadArgs {
    /// metadata path of the artifact
    pub artifact: String,
    /// base URL of the TUF metadata repository
    #[arg(short, long)]
    pub metadata_url: Option<Url>,
    /// base URL of the artifact repository
    #[arg(short, long)]
    pub artifacts_url: Option<Url>,
    /// expect hash-prefixed target paths
    #[arg(short = 'p', long)]
    pub hash_prefix: bool,
    /// directory the artifact is written to, defaults to ./downloads
    #[arg(short = 'P', long)]
    pub directory_prefix: Option<PathBuf>,
    /// path to a trusted root file used instead of trust-on-first-use
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,
    /// named repository from the configuration file
    #[arg(long)]
    pub repository: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum MetadataCommand {
    /// Update the root metadata and collect new signatures
    Update(MetadataUpdateArgs),
    /// Sign metadata that is pending signatures
    Sign(MetadataSignArgs),
    /// Drop a pending signing request
    SignDelete(MetadataSignDeleteArgs),
}

#[derive(Debug, clap::Args)]
pub struct MetadataUpdateArgs {
    /// path to the current signed root metadata
    pub root: PathBuf,
    /// where the update payload is written
    #[arg(short, long, default_value = "update-payload.json")]
    pub file: PathBuf,
    /// send the payload to the repository service
    #[arg(long)]
    pub send: bool,
}

#[derive(Debug, clap::Args)]
pub struct MetadataSignArgs {
    /// role to sign, prompted when not given
    #[arg(long)]
    pub rolename: Option<String>,
    /// path to the signing key, prompted when not given
    #[arg(long)]
    pub key: Option<PathBuf>,
    /// do not send the signature to the API
    #[arg(long)]
    pub dry_run: bool,
    /// write the signature payload to a file
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct MetadataSignDeleteArgs {
    /// role whose pending signing request is dropped
    #[arg(long)]
    pub rolename: String,
}

#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    /// Show information about a signing key
    Info(KeyInfoArgs),
}

#[derive(Debug, clap::Args)]
pub struct KeyInfoArgs {
    /// Show the private key. WARNING: use private key information carefully.
    #[arg(long)]
    pub show_private: bool,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Show the state of a backend task
    Info(TaskInfoArgs),
}

#[derive(Debug, clap::Args)]
pub struct TaskInfoArgs {
    /// id of the task
    pub task_id: String,
    /// poll until the task reaches a terminal state
    #[arg(long)]
    pub watch: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Trace,
}

impl From<&LogLevel> for tracing_core::LevelFilter {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Debug => tracing_core::Level::DEBUG.into(),
            LogLevel::Info => tracing_core::Level::INFO.into(),
            LogLevel::Warn => tracing_core::Level::WARN.into(),
            LogLevel::Error => tracing_core::Level::ERROR.into(),
            LogLevel::Trace => tracing_core::Level::TRACE.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "tufra",
            "artifact",
            "download",
            "dir/file.txt",
            "-m",
            "http://localhost:8080",
            "-a",
            "http://localhost:8081",
            "-p",
        ])
        .expect("parse failed");
        match cli.command {
            Command::Artifact(ArtifactCommand::Download(args)) => {
                assert_eq!(args.artifact, "dir/file.txt");
                assert!(args.hash_prefix);
                assert!(args.root.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_ceremony_defaults() {
        let cli = Cli::try_parse_from(["tufra", "ceremony"]).expect("parse failed");
        match cli.command {
            Command::Ceremony(args) => {
                assert!(!args.bootstrap);
                assert_eq!(args.file, PathBuf::from("payload.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
