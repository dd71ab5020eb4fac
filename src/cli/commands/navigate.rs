use anyhow::{Context, Result};
use colored::*;
use log::info;
use serde_json::json;
use std::sync::Arc;

use microhost::config::HostConfig;
use microhost::portal::{
    APPS_LOADING_END, APPS_LOADING_START, ActivationOutcome, ApplicationBindings, HostShell,
    MemoryDocument, Portal, SwitchMode,
};

use crate::cli::runtime::{FileSystemFetcher, check_assets_root};

/// Run the host shell and visit each path in turn
pub async fn navigate_command(config: &HostConfig, paths: Vec<String>, coexist: bool) -> Result<()> {
    check_assets_root(&config.assets_root)?;

    let mut options = config
        .portal_options()
        .with_error_handler(|err| println!("    {} {}", "✗".bright_red().bold(), err.to_string().red()));
    if coexist {
        options = options.with_switch_mode(SwitchMode::Coexist);
    }
    info!("Starting shell with {:?}", options);

    let bindings = ApplicationBindings::global();
    let fetcher = Arc::new(FileSystemFetcher::new(&config.assets_root, bindings.clone()));
    let document = Arc::new(MemoryDocument::with_hosts(config.all_hosts()));
    let portal = Portal::builder(fetcher, document.clone())
        .bindings(bindings)
        .options(options)
        .build();

    portal
        .register_apps(config.apps.iter().cloned())
        .context("Failed to register applications")?;
    portal.set_portal_app_data(json!({ "shell": "microhost" }));

    let mut started = portal.dispatcher().register(APPS_LOADING_START);
    let mut finished = portal.dispatcher().register(APPS_LOADING_END);

    let mut shell = HostShell::new(portal.clone());
    shell.start().context("Failed to start portal")?;

    for path in paths {
        println!("{} {}", "→".bright_white().bold(), path.bright_white().bold());
        shell.navigate_by_url(&path);

        let Some(navigation) = shell.next_navigation().await else {
            anyhow::bail!("Shell stopped before handling {}", path);
        };
        let outcome = navigation.settled().await;

        for payload in started.drain() {
            println!("    {} loading {}", "…".dimmed(), payload["shouldLoadApps"]);
        }
        for payload in finished.drain() {
            println!("    {} loaded {}", "✓".bright_green(), payload["loadedApps"]);
        }
        print_outcome(&outcome);
        print_status(&portal, &document);
    }

    shell.shutdown();

    // Report any events that arrived after the last navigation settled
    for payload in finished.drain() {
        println!("    {} loaded {}", "✓".bright_green(), payload["loadedApps"]);
    }
    Ok(())
}

fn print_outcome(outcome: &ActivationOutcome) {
    let text = match outcome {
        ActivationOutcome::Mounted => "mounted".bright_green().bold(),
        ActivationOutcome::AlreadyMounted => "already mounted".green(),
        ActivationOutcome::Reshown => "shown again".green(),
        ActivationOutcome::NoMatch => "no application".dimmed(),
        ActivationOutcome::Superseded | ActivationOutcome::Deactivated(_) => "superseded".yellow(),
        ActivationOutcome::Failed(_) | ActivationOutcome::Ignored(_) => "failed".bright_red().bold(),
    };
    println!("    = {}", text);
}

fn print_status(portal: &Portal, document: &MemoryDocument) {
    for app in portal.applications() {
        let status = portal
            .status(&app.name)
            .map(|status| format!("{:?}", status))
            .unwrap_or_default();
        let element = match document.element(&app.host, &app.mount_selector()) {
            Some(element) if element.is_hidden() => "hidden element".dimmed(),
            Some(_) => "visible element".cyan(),
            None => "no element".dimmed(),
        };
        println!("      {:<16} {:<11} {}", app.name, status, element);
    }
}
