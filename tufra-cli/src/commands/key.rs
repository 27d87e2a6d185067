//! Inspection of signing keys: key id, type and public key material.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use dialoguer::{Input, Password};
use tufra_common::metadata::{key_is_encrypted, keyid_hex, load_signing_key};

use crate::cli::KeyInfoArgs;

pub fn info(args: &KeyInfoArgs) -> Result<()> {
    let filepath: String = Input::new()
        .with_prompt("Enter the key's filename")
        .interact_text()?;
    let path = Path::new(&filepath);

    let data = std::fs::read(path).with_context(|| format!("failed to read {filepath}"))?;
    let password = if key_is_encrypted(&data) {
        Some(
            Password::new()
                .with_prompt("Enter the private key password")
                .interact()?,
        )
    } else {
        None
    };
    let key = load_signing_key(path, password.as_deref()).context("Failed to load the key")?;

    let value = serde_json::to_value(&key.public)?;
    let keytype = value["keytype"].as_str().unwrap_or("unknown").to_string();
    let scheme = value["scheme"].as_str().unwrap_or("unknown").to_string();
    let public = match &value["keyval"]["public"] {
        serde_json::Value::String(public) => public.clone(),
        other => other.to_string(),
    };

    let mut table = Table::new();
    let mut header = vec![
        Cell::new("Key ID"),
        Cell::new("Key Type"),
        Cell::new("Scheme"),
        Cell::new("Public Key"),
    ];
    let mut row = vec![
        Cell::new(keyid_hex(&key.keyid)),
        Cell::new(keytype),
        Cell::new(scheme),
        Cell::new(public),
    ];
    if args.show_private {
        header.push(Cell::new("Private Key").fg(Color::Red));
        row.push(Cell::new(String::from_utf8_lossy(&data)).fg(Color::Red));
    }
    table.set_header(header);
    table.add_row(row);
    println!("{table}");
    Ok(())
}
