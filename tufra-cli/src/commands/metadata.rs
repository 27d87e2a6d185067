//! Root metadata maintenance: interactive updates of an existing root,
//! signing of pending metadata and dropping pending signing requests.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::{Confirm, Input, Password, Select};
use itertools::Itertools;
use ring::rand::SystemRandom;
use tufra_common::api::Endpoint;
use tufra_common::metadata::{
    add_root_key, bump_expiration, bump_version, is_root_signer, key_is_encrypted, keyid_hex,
    load_signing_key, remove_root_key, root_keyids, root_keyids_decoded, root_threshold,
    rotate_online_key, set_root_threshold, sign_pending_metadata, sign_role, Decoded, Hex,
    LoadedKey, Root, SignDeletePayload, SignPayload, Signed, UpdatePayload,
};

use crate::cli::{Cli, MetadataSignArgs, MetadataSignDeleteArgs, MetadataUpdateArgs};
use crate::commands::{api_client, resolve_settings};

pub async fn update(cli: &Cli, args: &MetadataUpdateArgs) -> Result<()> {
    let data = tokio::fs::read(&args.root)
        .await
        .with_context(|| format!("failed to read {}", args.root.display()))?;
    let mut root: Signed<Root> =
        serde_json::from_slice(&data).context("failed to parse the root metadata")?;
    println!(
        "Loaded root metadata version {} (expires {})",
        root.signed.version, root.signed.expires
    );
    // a root update must satisfy the threshold of the version it replaces
    let previous = PreviousRoot {
        version: root.signed.version,
        keyids: root_keyids_decoded(&root.signed),
        threshold: root_threshold(&root.signed),
    };

    if Confirm::new()
        .with_prompt("Do you want to change the expiry date?")
        .default(true)
        .interact()?
    {
        let days: u32 = Input::new()
            .with_prompt("Days until the root metadata expires?")
            .default(365)
            .interact_text()?;
        bump_expiration(&mut root.signed, days);
    }

    if Confirm::new()
        .with_prompt("Do you want to change the threshold?")
        .default(false)
        .interact()?
    {
        let threshold: u64 = Input::new()
            .with_prompt("New root signature threshold?")
            .default(root_threshold(&root.signed))
            .interact_text()?;
        set_root_threshold(&mut root.signed, threshold)?;
    }

    edit_root_keys(&mut root.signed)?;

    if Confirm::new()
        .with_prompt("Do you want to change the online key?")
        .default(false)
        .interact()?
    {
        let key = prompt_key("Enter the path to the new online key")?;
        rotate_online_key(&mut root.signed, &key)?;
    }

    bump_version(&mut root.signed)?;
    root.signatures.clear();
    collect_root_signatures(&mut root, &previous).await?;

    let payload = UpdatePayload::new(root);
    tokio::fs::write(&args.file, serde_json::to_vec_pretty(&payload)?)
        .await
        .with_context(|| format!("failed to write {}", args.file.display()))?;
    println!("Update payload written to {}", args.file.display());

    if args.send {
        let settings = resolve_settings(cli)?;
        let client = api_client(&settings)?;
        let task_id = client
            .send_payload(Endpoint::Metadata, &payload, "Metadata update accepted.")
            .await?;
        println!("Metadata update status: ACCEPTED ({task_id})");
        client
            .task_status(&task_id, "Metadata update status:", false)
            .await?;
        println!("\nMetadata update finished.");
    }
    Ok(())
}

fn edit_root_keys(root: &mut Root) -> Result<()> {
    loop {
        println!(
            "Current root keys:\n  {}",
            root_keyids(root).iter().join("\n  ")
        );
        let choice = Select::new()
            .with_prompt("Root key changes")
            .items(&["continue", "add key", "remove key"])
            .default(0)
            .interact()?;
        match choice {
            1 => {
                let key = prompt_key("Enter the path to the new root key")?;
                if let Err(err) = add_root_key(root, &key) {
                    println!("Failed: {err}");
                }
            }
            2 => {
                let names = root_keyids(root);
                let keyids = root_keyids_decoded(root);
                let index = Select::new()
                    .with_prompt("Which key should be removed?")
                    .items(&names)
                    .default(0)
                    .interact()?;
                if let Err(err) = remove_root_key(root, &keyids[index]) {
                    println!("Failed: {err}");
                }
            }
            _ => return Ok(()),
        }
    }
}

/// Root role authorization of the version an update replaces.
struct PreviousRoot {
    version: std::num::NonZeroU64,
    keyids: Vec<Decoded<Hex>>,
    threshold: u64,
}

/// Prompt for private keys until the thresholds of both the previous and
/// the updated root are satisfiable. Keys that are authorized by neither
/// version are rejected, a key may count towards both thresholds.
async fn collect_root_signatures(root: &mut Signed<Root>, previous: &PreviousRoot) -> Result<()> {
    let old_threshold = previous.threshold;
    let new_threshold = root_threshold(&root.signed);
    let rng = SystemRandom::new();
    println!(
        "The update needs {new_threshold} signature(s) from the new root keys \
         and {old_threshold} from the keys of version {}.",
        previous.version
    );
    loop {
        let old_signatures = root
            .signatures
            .iter()
            .filter(|signature| previous.keyids.contains(&signature.keyid))
            .count() as u64;
        let new_signatures = root
            .signatures
            .iter()
            .filter(|signature| is_root_signer(&root.signed, &signature.keyid))
            .count() as u64;
        if old_signatures >= old_threshold && new_signatures >= new_threshold {
            return Ok(());
        }

        let key = match prompt_key(&format!(
            "Enter the path to root key ({new_signatures}/{new_threshold} new, \
             {old_signatures}/{old_threshold} previous)"
        )) {
            Ok(key) => key,
            Err(err) => {
                println!("Failed: {err}");
                continue;
            }
        };
        if !is_root_signer(&root.signed, &key.keyid) && !previous.keyids.contains(&key.keyid) {
            println!(
                "Failed: key {} is not an authorized root key.",
                keyid_hex(&key.keyid)
            );
            continue;
        }
        if root
            .signatures
            .iter()
            .any(|signature| signature.keyid == key.keyid)
        {
            println!("Failed: key {} already signed.", keyid_hex(&key.keyid));
            continue;
        }
        sign_role(root, &[&key], &rng).await?;
        println!("Signed with {}.", keyid_hex(&key.keyid));
    }
}

fn prompt_key(prompt: &str) -> Result<LoadedKey> {
    let filepath: String = Input::new().with_prompt(prompt).interact_text()?;
    let path = Path::new(&filepath);
    let password = match std::fs::read(path) {
        Ok(data) if key_is_encrypted(&data) => Some(
            Password::new()
                .with_prompt("Enter the key password")
                .interact()?,
        ),
        _ => None,
    };
    Ok(load_signing_key(path, password.as_deref())?)
}

pub async fn sign(cli: &Cli, args: &MetadataSignArgs) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let client = api_client(&settings)?;

    let pending = client
        .pending_metadata()
        .await
        .context("failed to fetch metadata for signing")?;
    if pending.is_empty() {
        bail!("No metadata available for signing");
    }

    let rolename = match &args.rolename {
        Some(rolename) => rolename.clone(),
        None => {
            let names: Vec<&String> = pending.keys().collect();
            let index = Select::new()
                .with_prompt("Choose a role to sign")
                .items(&names)
                .default(0)
                .interact()?;
            names[index].clone()
        }
    };
    let role_metadata = pending
        .get(&rolename)
        .ok_or_else(|| anyhow!("role {rolename} is not pending signatures"))?;
    let signed_portion = role_metadata
        .get("signed")
        .ok_or_else(|| anyhow!("pending metadata for {rolename} has no signed portion"))?;
    if let Some(version) = signed_portion.get("version") {
        println!("Signing pending {rolename} metadata, version {version}");
    }

    let key = match &args.key {
        Some(path) => load_key_at(path)?,
        None => prompt_key("Enter the path to the signing key")?,
    };
    let signature = sign_pending_metadata(signed_portion, &key, &SystemRandom::new()).await?;
    let payload = SignPayload {
        role: rolename.clone(),
        signature,
    };

    if let Some(out) = &args.out {
        tokio::fs::write(out, serde_json::to_vec_pretty(&payload)?)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Saved result to {}", out.display());
    }
    if args.dry_run {
        return Ok(());
    }

    println!("\nSending signature to {}", client.server());
    let task_id = client
        .send_payload(Endpoint::MetadataSign, &payload, "Metadata sign accepted.")
        .await?;
    println!("Metadata sign status: ACCEPTED ({task_id})");
    client
        .task_status(&task_id, "Metadata sign status:", false)
        .await?;
    println!("\nMetadata signed and sent to the API.");
    Ok(())
}

fn load_key_at(path: &PathBuf) -> Result<LoadedKey> {
    let password = match std::fs::read(path) {
        Ok(data) if key_is_encrypted(&data) => Some(
            Password::new()
                .with_prompt("Enter the key password")
                .interact()?,
        ),
        _ => None,
    };
    Ok(load_signing_key(path, password.as_deref())?)
}

pub async fn sign_delete(cli: &Cli, args: &MetadataSignDeleteArgs) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let client = api_client(&settings)?;

    let payload = SignDeletePayload {
        role: args.rolename.clone(),
    };
    let task_id = client
        .send_payload(
            Endpoint::MetadataSignDelete,
            &payload,
            "Metadata sign delete accepted.",
        )
        .await?;
    println!("Metadata sign delete status: ACCEPTED ({task_id})");
    client
        .task_status(&task_id, "Metadata sign delete status:", false)
        .await?;
    println!("\nPending signing request for {} dropped.", args.rolename);
    Ok(())
}
