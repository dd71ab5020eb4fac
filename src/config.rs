use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::portal::{ApplicationDescriptor, PortalOptions, SwitchMode};

/// Host configuration, usually `portal.toml`
///
/// ```toml
/// assets_root = "./dist"
/// hosts = ["#portal-host"]
///
/// [options]
/// switch_mode = "coexist"
/// preload = false
///
/// [[apps]]
/// name = "app1"
/// host = "#portal-host"
/// router_path_prefix = "/app1"
/// scripts = ["main.js"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Directory asset URLs are resolved against by the file fetcher
    #[serde(default = "default_assets_root")]
    pub assets_root: PathBuf,

    /// Mount containers present in the host document
    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub apps: Vec<ApplicationDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default)]
    pub switch_mode: SwitchMode,

    #[serde(default = "default_preload")]
    pub preload: bool,
}

fn default_assets_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_preload() -> bool {
    true
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            switch_mode: SwitchMode::default(),
            preload: default_preload(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            assets_root: default_assets_root(),
            hosts: Vec::new(),
            options: OptionsConfig::default(),
            apps: Vec::new(),
        }
    }
}

impl HostConfig {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            // Use XDG config directory on Linux
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("microhost")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".microhost")
        };

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
            info!("Created config directory: {:?}", config_dir);
        }

        Ok(config_dir.join("portal.toml"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: HostConfig = toml::from_str(content).context("Failed to parse host config")?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the default config
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);

        if !path.exists() {
            info!("Config file doesn't exist, using default config");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        debug!("Loaded config with {} applications", config.apps.len());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", path);

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        fs::write(path, content).with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Config saved successfully");
        Ok(())
    }

    /// Portal options with the configured mode and preload flag
    pub fn portal_options(&self) -> PortalOptions {
        PortalOptions::default()
            .with_switch_mode(self.options.switch_mode)
            .with_preload(self.options.preload)
    }

    /// Configured hosts plus every host an application mounts into
    pub fn all_hosts(&self) -> Vec<String> {
        let mut hosts = self.hosts.clone();
        for app in &self.apps {
            if !hosts.contains(&app.host) {
                hosts.push(app.host.clone());
            }
        }
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::RoutePrefix;

    const SAMPLE: &str = r##"
assets_root = "./dist"
hosts = ["#portal-host"]

[options]
switch_mode = "coexist"
preload = false

[[apps]]
name = "app1"
host = "#portal-host"
router_path_prefix = "/app1"
resource_path_prefix = "/static/app1/"
scripts = ["main.js"]
styles = ["styles.css"]

[[apps]]
name = "reports"
host = "#side-host"
host_class = "panel wide"
router_path_prefix = { pattern = "^/reports/\\d+" }
switch_mode = "default"
preload = true
"##;

    #[test]
    fn test_parse_sample() {
        let config = HostConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.assets_root, PathBuf::from("./dist"));
        assert_eq!(config.options.switch_mode, SwitchMode::Coexist);
        assert!(!config.options.preload);
        assert_eq!(config.apps.len(), 2);

        let app1 = &config.apps[0];
        assert_eq!(app1.router_path_prefix, RoutePrefix::literal("/app1"));
        assert_eq!(app1.scripts, vec!["main.js"]);

        let reports = &config.apps[1];
        assert!(reports.router_path_prefix.matches("/reports/42"));
        assert!(!reports.router_path_prefix.matches("/reports/new"));
        assert_eq!(reports.host_class, vec!["panel", "wide"]);
        assert_eq!(reports.switch_mode, Some(SwitchMode::Default));
        assert_eq!(reports.preload, Some(true));
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = HostConfig::parse("").unwrap();
        assert_eq!(config, HostConfig::default());
        let options = config.portal_options();
        assert_eq!(options.switch_mode, SwitchMode::Default);
        assert!(options.preload);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let content = r##"
[[apps]]
name = "broken"
host = "#host"
router_path_prefix = { pattern = "(unclosed" }
"##;
        assert!(HostConfig::parse(content).is_err());
    }

    #[test]
    fn test_all_hosts_includes_app_hosts() {
        let config = HostConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.all_hosts(), vec!["#portal-host", "#side-host"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("microhost-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("portal.toml");

        let mut config = HostConfig::default();
        config.hosts.push("#portal-host".to_string());
        config.apps.push(
            ApplicationDescriptor::new("app1", "#portal-host", "/app1")
                .with_scripts(["main.js"])
                .with_switch_mode(SwitchMode::Coexist),
        );
        config.save(&path).unwrap();

        let loaded = HostConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let path = std::env::temp_dir().join("microhost-definitely-missing.toml");
        assert_eq!(HostConfig::load(&path).unwrap(), HostConfig::default());
    }
}
