//! `ticketry status` — show configuration, agents, and provider status.

use anyhow::Result;
use colored::Colorize;

use ticketry_core::config::load_config;
use ticketry_core::utils::get_data_path;
use ticketry_providers::registry::PROVIDERS;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let data_dir = get_data_path();
    let config_path = data_dir.join("config.json");

    println!();
    println!("{}", "Ticketry Status".cyan().bold());
    println!();

    let config_exists = config_path.exists();
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_exists {
            "\u{2713}".green().to_string()
        } else {
            "(not found, using defaults)".yellow().to_string()
        }
    );

    println!();
    println!("  {}", "Agents:".bold());
    for entry in &config.agents {
        let workspace = crate::helpers::expand_tilde(&entry.workspace);
        let ws_exists = workspace.exists();
        println!(
            "    {:<16} model={:<32} {}",
            entry.id.clone(),
            entry.provider_selector,
            if ws_exists {
                "\u{2713}".green().to_string()
            } else {
                "(workspace not found)".dimmed().to_string()
            }
        );
    }

    println!();
    println!(
        "  {:<18} inbox_capacity={} | max_retries={} | retry_delay={}s",
        "Broker:".bold(),
        config.broker.inbox_capacity,
        config.broker.max_retries,
        config.broker.retry_delay_secs,
    );

    println!();
    println!("  {}", "Providers:".bold());
    let providers_map = config.providers.to_map();

    for spec in PROVIDERS {
        let status = if providers_map
            .get(spec.name)
            .map(|p| p.is_configured())
            .unwrap_or(false)
        {
            format!("{} (key set)", "\u{2713}".green())
        } else {
            "\u{b7} not configured".dimmed().to_string()
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    println!();
    let brave_status = if config.tools.web.search.api_key.is_empty() {
        "\u{b7} not configured".dimmed().to_string()
    } else {
        format!("{} (key set)", "\u{2713}".green())
    };
    println!("  {:<18} {}", "Brave Search:".bold(), brave_status);

    println!();

    Ok(())
}
