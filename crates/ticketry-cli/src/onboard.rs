//! `ticketry onboard` — initialize configuration, per-agent workspaces,
//! and the ticket store directory.

use anyhow::Result;
use colored::Colorize;

use ticketry_core::config::{load_config, save_config};
use ticketry_core::utils::{get_data_path, get_tickets_path};

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "Ticketry — Setup".cyan().bold());
    println!();

    let data_dir = get_data_path();
    let config_path = data_dir.join("config.json");

    let config = if config_path.exists() {
        println!("  {} config already exists at {}", "\u{2713}".green(), config_path.display());
        load_config(Some(&config_path))
    } else {
        let config = load_config(None); // defaults
        save_config(&config, Some(&config_path))?;
        println!("  {} created config at {}", "\u{2713}".green(), config_path.display());
        config
    };

    std::fs::create_dir_all(&get_tickets_path())?;
    println!("  {} ticket store at {}", "\u{2713}".green(), get_tickets_path().display());

    for entry in &config.agents {
        let workspace = crate::helpers::expand_tilde(&entry.workspace);
        std::fs::create_dir_all(&workspace)?;
        println!("  {} workspace for '{}' at {}", "\u{2713}".green(), entry.id, workspace.display());

        let memory_dir = workspace.join("memory");
        std::fs::create_dir_all(&memory_dir)?;
        create_template(&memory_dir.join("MEMORY.md"), &memory_template(&entry.id))?;
    }

    println!();
    println!("{}", "  Setup complete! Run `ticketry serve` to start the broker.".green());
    println!();

    Ok(())
}

/// Create a template file if it doesn't exist.
fn create_template(path: &std::path::Path, content: &str) -> Result<()> {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    if path.exists() {
        println!("  {} {} already exists", "\u{2713}".green(), name);
    } else {
        std::fs::write(path, content)?;
        println!("  {} created {}", "\u{2713}".green(), name);
    }
    Ok(())
}

fn memory_template(agent_id: &str) -> String {
    format!(
        "# Long-term Memory\n\nScoped memory for agent '{agent_id}'. Ticketry reads every `*.md` file\nin this directory and folds its contents into the system prompt's\n`# Memory` section.\n"
    )
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_template_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TEST.md");
        create_template(&path, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn create_template_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TEST.md");
        std::fs::write(&path, "original").unwrap();
        create_template(&path, "new content").unwrap();
        // Should NOT overwrite
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn memory_template_mentions_agent_id() {
        assert!(memory_template("assistant").contains("assistant"));
    }
}
