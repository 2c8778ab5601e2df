//! Environment readiness check.

use std::path::Path;

use anyhow::Result;

use crate::browser::find_chromium;
use crate::config::TargetConfig;

/// Check Chromium availability and the resolved target file.
pub fn run(target_path: &Path) -> Result<()> {
    println!("Tablecap Doctor");
    println!("===============");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set {}.",
            crate::browser::CHROMIUM_ENV
        ),
    }

    let target_ok = match TargetConfig::load(target_path) {
        Ok(target) => {
            println!(
                "[OK] Target {}: {} ({} columns)",
                target_path.display(),
                target.label(),
                target.columns.len()
            );
            true
        }
        Err(e) => {
            println!("[!!] {e}");
            false
        }
    };

    println!();
    if chromium_path.is_some() && target_ok {
        println!("Status: READY");
    } else if target_ok {
        println!("Status: REPLAY ONLY");
        println!("  Live capture needs Chromium; `tablecap replay` works without it.");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}
