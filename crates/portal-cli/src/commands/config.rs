//! Config command - Manage CLI configuration

use crate::config::SettingsManager;
use anyhow::{Context, Result};
use colored::Colorize;
use portal_core::validate_address;

/// Set the daemon RPC port
pub async fn set_rpc_port(port: u16) -> Result<()> {
    if port == 0 {
        anyhow::bail!("Invalid port: 0");
    }

    let mut settings = SettingsManager::load().context("Failed to load settings")?;
    settings.rpc_port = port;
    SettingsManager::save(&settings).context("Failed to save settings")?;

    println!(
        "{} Daemon RPC port set to: {}",
        "✓".green(),
        port.to_string().cyan()
    );
    println!(
        "{}",
        "  Note: Restart the daemon for changes to take effect."
            .yellow()
            .dimmed()
    );

    Ok(())
}

/// Set the address new portals default to
pub async fn set_default_address(address: &str) -> Result<()> {
    let address = address.trim();
    validate_address(address).with_context(|| format!("Invalid address: {}", address))?;

    let mut settings = SettingsManager::load().context("Failed to load settings")?;
    settings.default_address = address.to_string();
    SettingsManager::save(&settings).context("Failed to save settings")?;

    println!("{} Default address set to: {}", "✓".green(), address.cyan());
    Ok(())
}

/// Show current configuration
pub async fn show() -> Result<()> {
    let settings = SettingsManager::load().context("Failed to load settings")?;

    println!("{}", "Portal Configuration".bold().underline());
    println!();

    println!("{}", "Portals:".cyan().bold());
    println!("  Default address: {}", settings.default_address);
    println!("  Relay bind host: {}", settings.bind_host);
    println!("  Session timeout: {}s", settings.session_timeout_secs);
    println!();

    println!("{}", "Daemon Settings:".cyan().bold());
    println!("  RPC Port: {}", settings.rpc_port.to_string().cyan());
    println!();

    println!("{}", "Config Files:".cyan().bold());
    println!(
        "  Settings: {}",
        SettingsManager::settings_path()?.display().to_string().dimmed()
    );
    println!(
        "  Portals:  {}",
        SettingsManager::portals_path()?.display().to_string().dimmed()
    );
    println!(
        "  PID file: {}",
        SettingsManager::pid_path()?.display().to_string().dimmed()
    );
    println!(
        "  Log file: {}",
        SettingsManager::log_path()?.display().to_string().dimmed()
    );

    Ok(())
}

/// Reset configuration to defaults
pub async fn reset(yes: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !yes {
        let confirm = Confirm::new()
            .with_prompt("Reset all settings to their defaults? Portal definitions are kept.")
            .default(false)
            .interact()?;

        if !confirm {
            println!("{}", "Reset cancelled.".yellow());
            return Ok(());
        }
    }

    let default_settings = portal_core::Settings::default();
    SettingsManager::save(&default_settings).context("Failed to save default settings")?;

    println!("{} Configuration reset to defaults.", "✓".green());

    Ok(())
}
