use anyhow::Result;
use colored::*;
use log::info;
use microhost::config::HostConfig;
use microhost::portal::ApplicationRegistry;

/// Resolve a path against the configured applications without loading anything
pub fn match_command(config: &HostConfig, path: &str) -> Result<()> {
    info!("Matching path: {}", path);

    let mut registry = ApplicationRegistry::new();
    registry.register_all(config.apps.iter().cloned())?;

    match registry.match_path(path) {
        Ok(Some(app)) => println!(
            "{} {} selects {}",
            "✓".bright_green().bold(),
            path.cyan(),
            app.name.bright_green().bold()
        ),
        Ok(None) => println!("{} {} matches no application", "○".dimmed(), path.cyan()),
        Err(e) => println!("{} {}", "✗".bright_red().bold(), e.to_string().red()),
    }

    Ok(())
}
