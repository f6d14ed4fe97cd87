//! Portal commands

use crate::config::SettingsManager;
use crate::daemon::DaemonClient;
use anyhow::{Context, Result};
use colored::Colorize;
use portal_core::{can_create, PortalState, PortalSummary, SchemeRegistry};

pub async fn create(name: &str, scheme: Option<String>, address: Option<String>) -> Result<()> {
    let settings = SettingsManager::load().context("Failed to load settings")?;
    let address = address.unwrap_or(settings.default_address);

    if !can_create(name, &address) {
        anyhow::bail!("Both a portal name and an address are required");
    }

    let client = DaemonClient::with_port(settings.rpc_port);
    let summary = client.create_portal(name, scheme, &address).await?;

    println!(
        "{} Portal {} is {}",
        "✓".green(),
        summary.name.cyan(),
        paint_state(&summary.state)
    );
    println!("  Address: {}", display_url(&summary).dimmed());
    Ok(())
}

pub async fn list(json: bool) -> Result<()> {
    let client = DaemonClient::connect()?;
    let portals = client.list_portals().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&portals)?);
        return Ok(());
    }

    if portals.is_empty() {
        println!("{}", "No portals".dimmed());
        return Ok(());
    }

    let width = portals.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
    println!(
        "{:<width$}  {:<10}  {}",
        "NAME".bold(),
        "STATE".bold(),
        "ADDRESS".bold(),
        width = width
    );
    for portal in &portals {
        // Pad before colouring so escape codes don't break alignment
        let state = format!("{:<10}", portal.state.as_str());
        println!(
            "{:<width$}  {}  {}",
            portal.name,
            paint(&portal.state, &state),
            display_url(portal),
            width = width
        );
        if let PortalState::Failed { reason } = &portal.state {
            println!("{:<width$}  {}", "", reason.red().dimmed(), width = width);
        }
    }
    Ok(())
}

pub async fn stop(name: &str) -> Result<()> {
    let client = DaemonClient::connect()?;
    client.stop_portal(name).await?;
    println!("{} Portal {} stopped", "✓".green(), name.cyan());
    Ok(())
}

pub async fn destroy(name: &str) -> Result<()> {
    let client = DaemonClient::connect()?;
    client.destroy_portal(name).await?;
    println!("{} Portal {} destroyed", "✓".green(), name.cyan());
    Ok(())
}

pub fn schemes(prefix: Option<&str>) -> Result<()> {
    let registry = SchemeRegistry::new();
    let schemes = match prefix {
        Some(prefix) => registry.suggest(prefix),
        None => registry.known_schemes().to_vec(),
    };

    if schemes.is_empty() {
        println!("{}", "No matching schemes".dimmed());
    }
    for scheme in schemes {
        println!("{}", scheme);
    }
    Ok(())
}

fn display_url(summary: &PortalSummary) -> String {
    match summary.scheme.as_deref() {
        Some(scheme) if !scheme.is_empty() => format!("{}://{}", scheme, summary.address),
        _ => summary.address.clone(),
    }
}

fn paint_state(state: &PortalState) -> colored::ColoredString {
    paint(state, state.as_str())
}

fn paint(state: &PortalState, text: &str) -> colored::ColoredString {
    match state {
        PortalState::Active => text.green(),
        PortalState::Pending | PortalState::Stopping => text.yellow(),
        PortalState::Stopped => text.dimmed(),
        PortalState::Failed { .. } => text.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_url() {
        let mut summary = PortalSummary {
            name: "db".to_string(),
            scheme: Some("postgresql".to_string()),
            address: "localhost:5432".to_string(),
            state: PortalState::Active,
        };
        assert_eq!(display_url(&summary), "postgresql://localhost:5432");

        summary.scheme = None;
        assert_eq!(display_url(&summary), "localhost:5432");
    }
}
