//! `modscout setup` — store portal credentials for later runs.

use crate::cli::output;
use crate::config::Config;
use crate::credentials::{Credentials, FileVault};
use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;

pub fn run(config_path: &Path, identity: &str) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let vault = FileVault::in_data_dir(&config.data_dir);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    let username = prompt(&mut lines, "Portal username: ")?;
    let password = prompt(&mut lines, "Portal password: ")?;
    let domain = prompt(&mut lines, "SSO domain (e.g. Student): ")?;

    if username.is_empty() || password.is_empty() || domain.is_empty() {
        bail!("all three fields are required");
    }

    vault.store(
        identity,
        &Credentials {
            username,
            password,
            domain,
        },
    )?;
    output::say(&format!("  credentials stored for '{identity}'"));
    Ok(())
}

fn prompt(
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
    label: &str,
) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush().ok();
    let line = lines
        .next()
        .context("stdin closed before input was complete")??;
    Ok(line.trim().to_string())
}
