//! File-backed asset transport and a console sub-application for the demo shell

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::*;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use microhost::portal::{
    ApplicationBindings, AssetFetcher, AssetKind, AssetRequest, HostApplication, MicroApplication,
};

/// Resolves asset URLs against a directory on disk
///
/// Executing a script is simulated: once an application's script has been
/// read, a [`ConsoleApplication`] is bound under the application's name.
pub struct FileSystemFetcher {
    root: PathBuf,
    bindings: ApplicationBindings,
}

impl FileSystemFetcher {
    pub fn new(root: impl Into<PathBuf>, bindings: ApplicationBindings) -> Self {
        Self {
            root: root.into(),
            bindings,
        }
    }

    fn path_of(&self, url: &str) -> PathBuf {
        let relative = url.split(['?', '#']).next().unwrap_or(url);
        self.root.join(relative.trim_start_matches('/'))
    }
}

#[async_trait]
impl AssetFetcher for FileSystemFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<()> {
        let path = self.path_of(&request.url);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!("Read {} bytes for {} ({:?})", bytes.len(), request.url, request.kind);

        println!(
            "    {} {} {}",
            "↓".dimmed(),
            request.url.cyan(),
            format!("({} bytes)", bytes.len()).dimmed()
        );

        if request.kind == AssetKind::Script && !self.bindings.is_bound(&request.app) {
            self.bindings
                .bind(request.app.clone(), Arc::new(ConsoleApplication::new(&request.app)));
        }
        Ok(())
    }

    async fn fetch_text(&self, request: &AssetRequest) -> Result<String> {
        let path = self.path_of(&request.url);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Prints every lifecycle call it receives
pub struct ConsoleApplication {
    name: String,
}

impl ConsoleApplication {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl MicroApplication for ConsoleApplication {
    async fn bootstrap(&self, host: Arc<HostApplication>) -> Result<()> {
        println!(
            "    {} {} bootstrapped (portal data: {})",
            "▶".bright_green().bold(),
            self.name.bright_green().bold(),
            host.portal_data()
        );
        Ok(())
    }

    fn reset_routing(&self, path: Option<&str>) {
        match path {
            Some(path) => println!("    {} {} routing to {}", "↻".bright_blue(), self.name.bright_white(), path.cyan()),
            None => println!("    {} {} hidden", "◌".dimmed(), self.name.bright_white()),
        }
    }

    fn destroy(&self) -> Result<()> {
        println!("    {} {} destroyed", "■".bright_red(), self.name.bright_white());
        Ok(())
    }
}

/// Whether `root` looks usable as an asset directory
pub fn check_assets_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        anyhow::bail!("Assets root does not exist: {}", root.display());
    }
    Ok(())
}
