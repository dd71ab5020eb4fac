//! Declarative description of a sub-application
//!
//! Descriptors are the persisted format of the portal: they are read from the
//! host configuration file (TOML) or built in code, and never change once
//! registered.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::PortalError;

/// How the previously active application is treated when another one is selected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    /// Destroy the previous application before the next one bootstraps
    #[default]
    Default,

    /// Hide the previous application and keep its instance alive
    Coexist,
}

impl fmt::Display for SwitchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchMode::Default => write!(f, "default"),
            SwitchMode::Coexist => write!(f, "coexist"),
        }
    }
}

/// Route selector of an application
///
/// A literal matches any path containing it; a pattern matches when the
/// regular expression finds a match anywhere in the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRoutePrefix", into = "RawRoutePrefix")]
pub enum RoutePrefix {
    Literal(String),
    Pattern(Regex),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRoutePrefix {
    Literal(String),
    Pattern { pattern: String },
}

impl RoutePrefix {
    pub fn literal(prefix: impl Into<String>) -> Self {
        RoutePrefix::Literal(prefix.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, PortalError> {
        Regex::new(pattern)
            .map(RoutePrefix::Pattern)
            .map_err(|e| PortalError::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            RoutePrefix::Literal(prefix) => path.contains(prefix.as_str()),
            RoutePrefix::Pattern(regex) => regex.is_match(path),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RoutePrefix::Literal(prefix) => prefix,
            RoutePrefix::Pattern(regex) => regex.as_str(),
        }
    }
}

impl PartialEq for RoutePrefix {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RoutePrefix::Literal(a), RoutePrefix::Literal(b)) => a == b,
            (RoutePrefix::Pattern(a), RoutePrefix::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl TryFrom<RawRoutePrefix> for RoutePrefix {
    type Error = PortalError;

    fn try_from(raw: RawRoutePrefix) -> Result<Self, Self::Error> {
        match raw {
            RawRoutePrefix::Literal(prefix) => Ok(RoutePrefix::Literal(prefix)),
            RawRoutePrefix::Pattern { pattern } => RoutePrefix::pattern(&pattern),
        }
    }
}

impl From<RoutePrefix> for RawRoutePrefix {
    fn from(prefix: RoutePrefix) -> Self {
        match prefix {
            RoutePrefix::Literal(prefix) => RawRoutePrefix::Literal(prefix),
            RoutePrefix::Pattern(regex) => RawRoutePrefix::Pattern {
                pattern: regex.as_str().to_string(),
            },
        }
    }
}

impl From<&str> for RoutePrefix {
    fn from(prefix: &str) -> Self {
        RoutePrefix::literal(prefix)
    }
}

/// Accepts either `host_class = "a"` or `host_class = ["a", "b"]`
mod one_or_many {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(class) => class.split_whitespace().map(str::to_string).collect(),
            OneOrMany::Many(classes) => classes,
        })
    }
}

/// Everything the portal needs to know about one sub-application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    /// Unique key, also the name the application binds its instance under
    pub name: String,

    /// Selector of the host container the mount element lives in
    pub host: String,

    /// Mount element tag/selector; defaults to `<name>-root`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Classes added to a freshly created mount element
    #[serde(default, deserialize_with = "one_or_many::deserialize", skip_serializing_if = "Vec::is_empty")]
    pub host_class: Vec<String>,

    pub router_path_prefix: RoutePrefix,

    /// Fallback prefix for both scripts and styles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_path_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path_prefix: Option<String>,

    #[serde(default)]
    pub scripts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_path_prefix: Option<String>,

    #[serde(default)]
    pub styles: Vec<String>,

    /// JSON manifest mapping logical file names to versioned ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,

    /// Overrides the portal-wide preload option
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload: Option<bool>,

    /// Overrides the portal-wide switch mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_mode: Option<SwitchMode>,

    /// Load resources one after another, aborting on the first failure
    #[serde(default)]
    pub load_serial: bool,

    /// Forwarded to the fetcher, which decides what isolation means
    #[serde(default)]
    pub sandbox: bool,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
}

impl ApplicationDescriptor {
    pub fn new(name: impl Into<String>, host: impl Into<String>, route: impl Into<RoutePrefix>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            selector: None,
            host_class: Vec::new(),
            router_path_prefix: route.into(),
            resource_path_prefix: None,
            script_path_prefix: None,
            scripts: Vec::new(),
            style_path_prefix: None,
            styles: Vec::new(),
            manifest: None,
            preload: None,
            switch_mode: None,
            load_serial: false,
            sandbox: false,
            extra: Value::Null,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_host_class(mut self, class: impl Into<String>) -> Self {
        self.host_class.push(class.into());
        self
    }

    pub fn with_resource_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_path_prefix = Some(prefix.into());
        self
    }

    pub fn with_script_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.script_path_prefix = Some(prefix.into());
        self
    }

    pub fn with_style_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.style_path_prefix = Some(prefix.into());
        self
    }

    pub fn with_scripts<I, S>(mut self, scripts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts = scripts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_styles<I, S>(mut self, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.styles = styles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = Some(preload);
        self
    }

    pub fn with_switch_mode(mut self, mode: SwitchMode) -> Self {
        self.switch_mode = Some(mode);
        self
    }

    pub fn with_load_serial(mut self, serial: bool) -> Self {
        self.load_serial = serial;
        self
    }

    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    /// Selector of the element the application renders into
    pub fn mount_selector(&self) -> String {
        self.selector
            .clone()
            .unwrap_or_else(|| format!("{}-root", self.name))
    }

    pub fn effective_switch_mode(&self, fallback: SwitchMode) -> SwitchMode {
        self.switch_mode.unwrap_or(fallback)
    }

    pub fn effective_preload(&self, fallback: bool) -> bool {
        self.preload.unwrap_or(fallback)
    }

    pub fn script_prefix(&self) -> Option<&str> {
        self.script_path_prefix
            .as_deref()
            .or(self.resource_path_prefix.as_deref())
    }

    pub fn style_prefix(&self) -> Option<&str> {
        self.style_path_prefix
            .as_deref()
            .or(self.resource_path_prefix.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_prefix_matches_substring() {
        let prefix = RoutePrefix::literal("/app1");
        assert!(prefix.matches("/app1"));
        assert!(prefix.matches("/app1/dashboard?tab=2"));
        assert!(prefix.matches("/portal/app1/x"));
        assert!(!prefix.matches("/app2"));
    }

    #[test]
    fn test_pattern_prefix() {
        let prefix = RoutePrefix::pattern(r"/app1|app4").unwrap();
        assert!(prefix.matches("/app1/users"));
        assert!(prefix.matches("/app4"));
        assert!(!prefix.matches("/app2"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = RoutePrefix::pattern("(unclosed").unwrap_err();
        assert!(matches!(err, PortalError::InvalidRoutePattern { .. }));
    }

    #[test]
    fn test_descriptor_from_toml() {
        let descriptor: ApplicationDescriptor = toml::from_str(
            r##"
            name = "app1"
            host = "#app-host-container"
            host_class = "thy-layout wide"
            router_path_prefix = { pattern = "/app1|app4" }
            resource_path_prefix = "/static/app1/"
            scripts = ["main.js"]
            styles = ["styles.css"]
            manifest = "/static/app1/assets-manifest.json"
            switch_mode = "coexist"
            load_serial = true

            [extra]
            color = "#ffa415"
            "##,
        )
        .unwrap();

        assert_eq!(descriptor.name, "app1");
        assert_eq!(descriptor.host_class, vec!["thy-layout", "wide"]);
        assert!(descriptor.router_path_prefix.matches("/app4/detail"));
        assert_eq!(descriptor.switch_mode, Some(SwitchMode::Coexist));
        assert!(descriptor.load_serial);
        assert!(!descriptor.sandbox);
        assert_eq!(descriptor.extra, json!({ "color": "#ffa415" }));
        assert_eq!(descriptor.mount_selector(), "app1-root");
        assert_eq!(descriptor.script_prefix(), Some("/static/app1/"));
    }

    #[test]
    fn test_overrides_fall_back_to_portal_defaults() {
        let descriptor = ApplicationDescriptor::new("app2", "#host", "/app2")
            .with_script_path_prefix("/cdn/app2");

        assert_eq!(descriptor.effective_switch_mode(SwitchMode::Coexist), SwitchMode::Coexist);
        assert!(!descriptor.effective_preload(false));
        assert_eq!(descriptor.script_prefix(), Some("/cdn/app2"));
        assert_eq!(descriptor.style_prefix(), None);

        let descriptor = descriptor.with_switch_mode(SwitchMode::Default).with_preload(true);
        assert_eq!(descriptor.effective_switch_mode(SwitchMode::Coexist), SwitchMode::Default);
        assert!(descriptor.effective_preload(false));
    }
}
