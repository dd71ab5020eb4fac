use anyhow::Result;
use colored::*;
use microhost::config::HostConfig;

/// List the applications a host configuration registers
pub fn apps_command(config: &HostConfig) -> Result<()> {
    if config.apps.is_empty() {
        println!("  {}", "⚠️  No applications configured".bright_yellow().bold());
        println!("  {}", "Add [[apps]] entries to the host config.".dimmed());
        return Ok(());
    }

    println!();
    println!("  {}", "Registered applications:".bright_white().bold());
    for app in &config.apps {
        let mode = app.effective_switch_mode(config.options.switch_mode);
        let preload = if app.effective_preload(config.options.preload) {
            " (preload)".bright_green()
        } else {
            "".white()
        };
        println!(
            "  {} {} → {} in {} [{}]{}",
            "○".bright_green(),
            app.name.bright_white().bold(),
            app.router_path_prefix.as_str().cyan(),
            app.host.bright_yellow(),
            mode,
            preload
        );
        for script in &app.scripts {
            println!("      {} {}", "js ".dimmed(), script);
        }
        for style in &app.styles {
            println!("      {} {}", "css".dimmed(), style);
        }
    }
    println!();

    Ok(())
}
