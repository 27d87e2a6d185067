//! The interactive trust-root ceremony: configure the service roles,
//! load the signing keys, review everything and produce the signed
//! bootstrap payload.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use comfy_table::Table;
use dialoguer::{Confirm, Input, Password};
use ring::rand::SystemRandom;
use tufra_common::api::{ApiClient, Endpoint};
use tufra_common::metadata::{
    default_role_settings, initialize_root, key_is_encrypted, key_is_registered, keyid_hex,
    load_signing_key, sign_role, valid_bins_count, BootstrapPayload, LoadedKey, Role, RoleConfig,
    Root, Signed, DEFAULT_BINS,
};

use crate::cli::{CeremonyArgs, Cli};
use crate::commands::{api_client, resolve_settings};

const CEREMONY_INTRO: &str = "\
Trust-root ceremony
===================

This walkthrough configures the roles of a new TUF repository, loads the
role keys and produces the signed bootstrap payload for the repository
service. TUF protects repositories even against attackers that compromise
the hosting infrastructure or individual signing keys; see
https://theupdateframework.io for background.
";

const ROLES_RESPONSIBILITIES: &str = "\
Roles and responsibilities
--------------------------

root       locus of trust of the repository. Signs the authorized keys of
           every top-level role. Offline keys, two keys with a threshold of
           one are the recommended minimum.
targets    decides which artifacts exist in the repository and delegates
           the actual artifact signing to the hash-bin roles. Offline keys,
           destroyed after the ceremony.
snapshot   pins a consistent view of all metadata versions. Online key.
timestamp  frequently re-signed pointer to the latest snapshot. Online key.
bins       delegated roles that sign the artifacts themselves, one role per
           hash bin. Online key.
";

const STEP_CONFIGURE: &str = "\
Step 1: Configure the roles

Each role supports multiple keys and a threshold (quorum) that defines the
minimal number of keys required to act for that role.
";

const STEP_KEYS: &str = "\
Step 2: Load the role keys

The key files must be accessible. Encrypted keys ask for their password;
neither passwords nor private key material are shown or transmitted.
";

const STEP_REVIEW: &str = "\
Step 3: Validate the configuration

Check the number of keys, the threshold/quorum and the key ids below.
";

const BINS_DELEGATION_MESSAGE: &str = "\
The targets role delegates artifacts to the hash bin roles. Artifacts are
distributed uniformly over the bins, no matter how their paths nest.
";

const HASH_BINS_EXAMPLE: &str = "\
Example: with 8 bins the artifacts

  downloads/product-a/product-a-v1.0.tar
  downloads/product-b/product-b-v1.0.tar
  downloads/product-b/updates/servicepack-1.tar

end up in the bins 1.bins-0.json, 1.bins-1.json and 1.bins-5.json; clients
look an artifact up by hashing its path.
";

pub async fn run(cli: &Cli, args: &CeremonyArgs) -> Result<()> {
    if args.upload && !args.bootstrap {
        bail!("requires '-b/--bootstrap' option");
    }

    let settings = resolve_settings(cli)?;
    let client = if args.bootstrap {
        let client = api_client(&settings)?;
        check_server_allows_bootstrap(&client).await?;
        Some(client)
    } else {
        None
    };

    if args.upload {
        let client = client.as_ref().expect("bootstrap is set when uploading");
        let data = tokio::fs::read(&args.file)
            .await
            .with_context(|| format!("invalid file {}", args.file.display()))?;
        let payload: serde_json::Value =
            serde_json::from_slice(&data).context("payload file is not valid JSON")?;
        println!("Starting online bootstrap");
        submit_bootstrap(client, &payload).await?;
        println!("\nCeremony done.");
        return Ok(());
    }

    println!("{CEREMONY_INTRO}");
    let verbose = Confirm::new()
        .with_prompt("Do you want more information about roles and responsibilities?")
        .default(false)
        .interact()?;
    if verbose {
        println!("{ROLES_RESPONSIBILITIES}");
    }
    let start = Confirm::new()
        .with_prompt("Do you want to start the ceremony?")
        .default(true)
        .interact()?;
    if !start {
        bail!("Ceremony aborted.");
    }

    let mut roles: BTreeMap<Role, RoleConfig> = Role::ALL
        .iter()
        .map(|role| (*role, RoleConfig::new(*role)))
        .collect();
    let mut targets_base_url = String::new();

    println!("{STEP_CONFIGURE}");
    for role in Role::ALL {
        configure_role(role, &mut roles, &mut targets_base_url)?;
    }

    println!("{STEP_KEYS}");
    let ready = Confirm::new()
        .with_prompt("Ready to start loading the keys? Passwords will be required for encrypted keys")
        .default(true)
        .interact()?;
    if !ready {
        bail!("Ceremony aborted.");
    }
    for role in Role::ALL {
        configure_keys(role, &mut roles)?;
    }

    println!("{STEP_REVIEW}");
    for role in Role::ALL {
        loop {
            print_role_summary(role, &roles);
            let confirmed = Confirm::new()
                .with_prompt(format!("Configuration correct for {role}?"))
                .default(true)
                .interact()?;
            if confirmed {
                break;
            }
            configure_role(role, &mut roles, &mut targets_base_url)?;
            configure_keys(role, &mut roles)?;
        }
    }

    let mut root = initialize_root(&roles)?;
    let signers: Vec<&LoadedKey> = roles[&Role::Root].keys.iter().collect();
    sign_role(&mut root, &signers, &SystemRandom::new())
        .await
        .context("failed to sign the root metadata")?;

    if args.save {
        save_metadata(&root).await?;
    }

    let payload = serde_json::to_value(BootstrapPayload::new(&roles, targets_base_url, root))?;
    tokio::fs::write(&args.file, serde_json::to_vec_pretty(&payload)?)
        .await
        .with_context(|| format!("failed to write {}", args.file.display()))?;
    println!("Bootstrap payload written to {}", args.file.display());

    if let Some(client) = &client {
        submit_bootstrap(client, &payload).await?;
    }
    println!("\nCeremony done.");
    Ok(())
}

async fn check_server_allows_bootstrap(client: &ApiClient) -> Result<()> {
    let status = client.bootstrap_status().await?;
    match status.bootstrap {
        Some(false) => Ok(()),
        Some(true) => bail!("server {} was already bootstrapped", client.server()),
        None => bail!("unexpected bootstrap state received from {}", client.server()),
    }
}

async fn submit_bootstrap(client: &ApiClient, payload: &serde_json::Value) -> Result<()> {
    let task_id = client
        .send_payload(Endpoint::Bootstrap, payload, "Bootstrap accepted.")
        .await?;
    println!("Bootstrap status: ACCEPTED ({task_id})");
    client.task_status(&task_id, "Bootstrap status:", false).await?;
    println!("Bootstrap finished.");
    Ok(())
}

fn configure_role(
    role: Role,
    roles: &mut BTreeMap<Role, RoleConfig>,
    targets_base_url: &mut String,
) -> Result<()> {
    let defaults = default_role_settings(role);
    let config = roles.get_mut(&role).expect("all roles are present");
    // reconfiguration starts from a clean slate
    config.keys.clear();
    config.settings.offline_keys = defaults.offline_keys;

    config.settings.expiration = Input::new()
        .with_prompt(format!("\nMetadata expiration for the {role} role? (days)"))
        .default(defaults.expiration)
        .validate_with(|days: &u32| {
            if *days > 0 {
                Ok(())
            } else {
                Err("expiration must be at least one day")
            }
        })
        .interact_text()?;

    config.settings.num_of_keys = Input::new()
        .with_prompt(format!("Number of keys for the {role} role?"))
        .default(defaults.num_of_keys)
        .validate_with(|keys: &usize| {
            if *keys > 0 {
                Ok(())
            } else {
                Err("at least one key is required")
            }
        })
        .interact_text()?;

    if config.settings.num_of_keys > 1 {
        let num_of_keys = config.settings.num_of_keys as u64;
        config.settings.threshold = Input::new()
            .with_prompt(format!("Key threshold for {role} role signing?"))
            .default(defaults.threshold)
            .validate_with(move |threshold: &u64| {
                if (1..=num_of_keys).contains(threshold) {
                    Ok(())
                } else {
                    Err("threshold must be between 1 and the number of keys")
                }
            })
            .interact_text()?;
    } else {
        config.settings.threshold = 1;
        println!("The threshold for {role} is 1 (one) based on the number of keys (1).");
    }

    if role == Role::Targets {
        println!("{BINS_DELEGATION_MESSAGE}");
        let show_example = Confirm::new()
            .with_prompt("Show example")
            .default(true)
            .interact()?;
        if show_example {
            println!("{HASH_BINS_EXAMPLE}");
        }
        config.bins = Some(
            Input::new()
                .with_prompt(format!("How many hash bins do you want for {role}?"))
                .default(DEFAULT_BINS)
                .validate_with(|bins: &u32| {
                    if valid_bins_count(*bins) {
                        Ok(())
                    } else {
                        Err("the number of bins must be a power of 2 between 1 and 16384")
                    }
                })
                .interact_text()?,
        );

        let mut base_url: String = Input::new()
            .with_prompt("\nWhat is the base URL? (i.e.: https://www.example.com/downloads/)")
            .interact_text()?;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        *targets_base_url = base_url;
    }
    Ok(())
}

fn configure_keys(role: Role, roles: &mut BTreeMap<Role, RoleConfig>) -> Result<()> {
    let num_of_keys = roles[&role].settings.num_of_keys;
    let mut key_count = 1;
    while roles[&role].keys.len() < num_of_keys {
        let filepath: String = Input::new()
            .with_prompt(format!(
                "\nEnter {key_count}/{num_of_keys} the {role}'s key path"
            ))
            .interact_text()?;
        let path = Path::new(&filepath);

        let password = match std::fs::read(path) {
            Ok(data) if key_is_encrypted(&data) => Some(
                Password::new()
                    .with_prompt(format!(
                        "Enter {key_count}/{num_of_keys} the {role}'s key password"
                    ))
                    .interact()?,
            ),
            _ => None,
        };

        let key = match load_signing_key(path, password.as_deref()) {
            Ok(key) => key,
            Err(err) => {
                println!("Failed: {err}");
                let try_again = Confirm::new()
                    .with_prompt("Try again?")
                    .default(true)
                    .interact()?;
                if try_again {
                    continue;
                }
                bail!("Required key not validated.");
            }
        };

        if key_is_registered(roles, &key.keyid) {
            println!("Failed: Key is duplicated.");
            continue;
        }

        roles
            .get_mut(&role)
            .expect("all roles are present")
            .keys
            .push(key);
        println!("Key {key_count}/{num_of_keys} verified");
        key_count += 1;
    }
    Ok(())
}

fn print_role_summary(role: Role, roles: &BTreeMap<Role, RoleConfig>) {
    let config = &roles[&role];
    let key_type = if config.settings.offline_keys {
        "offline"
    } else {
        "online"
    };

    let mut summary = Table::new();
    summary.set_header(vec!["Role", "Keys", "Threshold", "Key type", "Expiration"]);
    summary.add_row(vec![
        role.name().to_string(),
        config.keys.len().to_string(),
        config.settings.threshold.to_string(),
        key_type.to_string(),
        format!("{} days", config.settings.expiration),
    ]);
    println!("{summary}");

    let mut keys = Table::new();
    keys.set_header(vec!["Path", "Key id", "Verified"]);
    for key in &config.keys {
        keys.add_row(vec![
            key.filename.clone(),
            keyid_hex(&key.keyid),
            "yes".to_string(),
        ]);
    }
    println!("{keys}");

    if role == Role::Targets {
        if let Some(bins) = config.bins {
            println!("Delegations: {role} -> bins, number of bins: {bins}");
        }
    }
}

async fn save_metadata(root: &Signed<Root>) -> Result<()> {
    tokio::fs::create_dir_all("metadata").await?;
    let path = Path::new("metadata").join(format!("{}.root.json", root.signed.version));
    tokio::fs::write(&path, serde_json::to_vec_pretty(root)?)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Saved metadata to {}", path.display());
    Ok(())
}
