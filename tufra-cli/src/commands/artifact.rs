//! Artifact management: submitting local files and container images for
//! signing, removing artifacts, triggering publication and the
//! TUF-verified download path.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tufra_common::api::Endpoint;
use tufra_common::artifact::oci::RegistryHarvester;
use tufra_common::artifact::{add_payload_from_file, delete_payload};
use tufra_common::tuf::{
    decode_trusted_root, has_trusted_root, init_tofu, init_trusted_root, metadata_cache_dir,
    ArtifactDownloader,
};
use url::Url;

use crate::cli::{ArtifactAddArgs, ArtifactDeleteArgs, ArtifactDownloadArgs, Cli};
use crate::commands::{api_client, resolve_settings};

pub async fn add(cli: &Cli, args: &ArtifactAddArgs) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let client = api_client(&settings)?;

    let path = Path::new(&args.artifact);
    let payload = if !args.oci_image && path.is_file() {
        serde_json::to_value(add_payload_from_file(path, args.path.as_deref())?)?
    } else {
        let mut harvester = RegistryHarvester::from_env();
        serde_json::to_value(harvester.harvest(&args.artifact).await?)?
    };

    let task_id = client
        .send_payload(
            Endpoint::Artifacts,
            &payload,
            "New Artifact(s) successfully submitted.",
        )
        .await?;
    println!("Artifact Addition status: ACCEPTED ({task_id})");
    println!("Successfully submitted task with a payload of:");
    println!("{}", serde_json::to_string_pretty(&payload)?);
    println!("\nTask id (use to check its status) is: {task_id}");
    Ok(())
}

pub async fn delete(cli: &Cli, args: &ArtifactDeleteArgs) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let client = api_client(&settings)?;

    let payload = delete_payload(vec![args.path.clone()]);
    let task_id = client
        .send_payload(
            Endpoint::ArtifactsDelete,
            &payload,
            "Remove Artifact(s) successfully submitted.",
        )
        .await?;
    println!("Artifact Removal status: ACCEPTED ({task_id})");
    println!("\nTask id (use to check its status) is: {task_id}");
    Ok(())
}

pub async fn publish(cli: &Cli) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let client = api_client(&settings)?;

    let task_id = client.publish_artifacts().await?;
    println!("Publish status: ACCEPTED ({task_id})");
    client.task_status(&task_id, "Publish status:", false).await?;
    println!("Artifacts published.");
    Ok(())
}

/// Parameters of one download, resolved from flags or the configuration.
struct DownloadPlan {
    metadata_url: Url,
    artifacts_url: Url,
    hash_prefix: bool,
    trusted_root: Option<PathBuf>,
}

fn resolve_download_plan(cli: &Cli, args: &ArtifactDownloadArgs) -> Result<DownloadPlan> {
    if args.metadata_url.is_some() || args.artifacts_url.is_some() {
        let metadata_url = args
            .metadata_url
            .clone()
            .ok_or_else(|| anyhow!("please specify metadata url '-m https://metadata.url'"))?;
        let artifacts_url = args
            .artifacts_url
            .clone()
            .ok_or_else(|| anyhow!("please specify artifacts url '-a https://artifacts.url'"))?;
        return Ok(DownloadPlan {
            metadata_url,
            artifacts_url,
            hash_prefix: args.hash_prefix,
            trusted_root: args.root.clone(),
        });
    }

    let settings = resolve_settings(cli)?;
    let config = settings
        .config
        .ok_or_else(|| anyhow!("please specify metadata url '-m https://metadata.url'"))?;
    if config.repositories.is_empty() {
        bail!("no repositories listed in the config file");
    }
    let name = args
        .repository
        .clone()
        .or(config.current_repository.clone())
        .ok_or_else(|| anyhow!("please specify current repository"))?;
    let repository = config
        .repository(&name)
        .ok_or_else(|| anyhow!("repository {name} is missing in the configuration file"))?;

    let trusted_root = match (&args.root, &repository.trusted_root) {
        (Some(root), _) => root.clone(),
        (None, Some(encoded)) => decode_trusted_root(encoded)?,
        (None, None) => bail!("trusted root is not configured for repository {name}"),
    };
    Ok(DownloadPlan {
        metadata_url: repository.metadata_url.clone(),
        artifacts_url: repository.artifact_base_url.clone(),
        hash_prefix: repository.hash_prefix || args.hash_prefix,
        trusted_root: Some(trusted_root),
    })
}

pub async fn download(cli: &Cli, args: &ArtifactDownloadArgs) -> Result<()> {
    let plan = resolve_download_plan(cli, args)?;

    let metadata_dir = metadata_cache_dir(plan.metadata_url.as_str())?;
    match &plan.trusted_root {
        Some(root) => {
            init_trusted_root(&metadata_dir, root)
                .await
                .with_context(|| format!("failed to install trusted root {}", root.display()))?;
            println!("Using trusted root in {}", metadata_dir.display());
        }
        None if has_trusted_root(&metadata_dir) => {
            println!("Using trusted root in {}", metadata_dir.display());
        }
        None => {
            init_tofu(&plan.metadata_url, &metadata_dir)
                .await
                .context("trust-on-first-use initialization failed")?;
            println!(
                "Trust-on-First-Use: Initialized new root in {}",
                metadata_dir.display()
            );
        }
    }

    let downloader = ArtifactDownloader::new(
        plan.metadata_url.clone(),
        plan.artifacts_url.clone(),
        metadata_dir,
    );
    downloader.check_hash_prefix(plan.hash_prefix).await?;

    let out_dir = match &args.directory_prefix {
        Some(prefix) => prefix.clone(),
        None => std::env::current_dir()?.join("downloads"),
    };
    match downloader.download(&args.artifact, &out_dir).await {
        Ok(path) => {
            println!(
                "Successfully completed artifact download: {} -> {}",
                args.artifact,
                path.display()
            );
            Ok(())
        }
        Err(err) => Err(err).context(format!("Failed to download artifact {}", args.artifact)),
    }
}
