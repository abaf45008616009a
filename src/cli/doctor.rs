//! Environment readiness check.

use crate::browser::chromium::find_chromium;
use crate::config::Config;
use crate::credentials::FileVault;
use anyhow::Result;
use std::path::Path;

/// Check Chromium, config, vacancy PDF, credentials, and the data dir.
pub fn run(config_path: &Path) -> Result<()> {
    println!("Modscout Doctor");
    println!("===============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set MODSCOUT_CHROMIUM_PATH."
        ),
    }

    if config_path.exists() {
        match Config::load(config_path) {
            Ok(_) => println!("[OK] Config parses: {}", config_path.display()),
            Err(e) => println!("[!!] Config is malformed: {e:#}"),
        }
    } else {
        println!("[--] No config file at {} (defaults apply)", config_path.display());
    }

    let config = Config::load_or_default(config_path)?;
    if config.vacancy_pdf.exists() {
        println!("[OK] Vacancy PDF present: {}", config.vacancy_pdf.display());
    } else {
        println!("[!!] Vacancy PDF missing: {}", config.vacancy_pdf.display());
    }

    let vault = FileVault::in_data_dir(&config.data_dir);
    if vault.exists() {
        println!("[OK] Credentials stored");
    } else {
        println!("[!!] No credentials — run `modscout setup`");
    }

    match std::fs::create_dir_all(&config.data_dir) {
        Ok(()) => println!("[OK] Data dir writable: {}", config.data_dir.display()),
        Err(e) => println!("[!!] Data dir not writable: {e}"),
    }

    println!();
    let ready = chromium.is_some() && config.vacancy_pdf.exists() && vault.exists();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
