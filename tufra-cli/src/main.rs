mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

use crate::cli::{ArtifactCommand, Cli, Command, KeyCommand, MetadataCommand, TaskCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    configure_logging(&args);
    match &args.command {
        Command::Ceremony(ceremony_args) => commands::ceremony::run(&args, ceremony_args).await,
        Command::Artifact(ArtifactCommand::Add(add_args)) => {
            commands::artifact::add(&args, add_args).await
        }
        Command::Artifact(ArtifactCommand::Delete(delete_args)) => {
            commands::artifact::delete(&args, delete_args).await
        }
        Command::Artifact(ArtifactCommand::Publish) => commands::artifact::publish(&args).await,
        Command::Artifact(ArtifactCommand::Download(download_args)) => {
            commands::artifact::download(&args, download_args).await
        }
        Command::Metadata(MetadataCommand::Update(update_args)) => {
            commands::metadata::update(&args, update_args).await
        }
        Command::Metadata(MetadataCommand::Sign(sign_args)) => {
            commands::metadata::sign(&args, sign_args).await
        }
        Command::Metadata(MetadataCommand::SignDelete(delete_args)) => {
            commands::metadata::sign_delete(&args, delete_args).await
        }
        Command::Key(KeyCommand::Info(info_args)) => commands::key::info(info_args),
        Command::Task(TaskCommand::Info(info_args)) => commands::task::info(&args, info_args).await,
    }
}

fn configure_logging(args: &Cli) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            Targets::new()
                .with_target(env!("CARGO_PKG_NAME").replace('-', "_"), &args.log_level)
                .with_target("tufra_common", &args.log_level)
                .with_target("tough", tracing_core::Level::INFO)
                .with_target("oci_distribution", tracing_core::Level::INFO)
                .with_target("hyper", tracing_core::Level::INFO)
                .with_target("reqwest", tracing_core::Level::INFO),
        )
        .init();
}
