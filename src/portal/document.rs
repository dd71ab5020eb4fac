//! The slice of the host page the portal touches
//!
//! The orchestrator only creates, removes, hides and shows mount elements
//! inside host containers. [`MemoryDocument`] keeps that model in memory and
//! is what the CLI shell and the tests render into.

use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Style attribute applied to hidden mount elements
pub const HIDDEN_STYLE: &str = "display:none;";

pub trait Document: Send + Sync {
    /// Whether a host container with this selector exists
    fn has_host(&self, host: &str) -> bool;

    fn contains(&self, host: &str, selector: &str) -> bool;

    /// Append a mount element to `host`; false when the host does not exist
    fn create_element(&self, host: &str, selector: &str, classes: &[String]) -> bool;

    /// Remove a mount element; false when it was not there
    fn remove_element(&self, host: &str, selector: &str) -> bool;

    /// Style attribute of a mount element; `None` when the element is missing
    fn style(&self, host: &str, selector: &str) -> Option<Option<String>>;

    /// Replace (or clear) the style attribute; false when the element is missing
    fn set_style(&self, host: &str, selector: &str, style: Option<String>) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub selector: String,
    pub classes: Vec<String>,
    pub style: Option<String>,
}

impl Element {
    pub fn is_hidden(&self) -> bool {
        self.style.as_deref() == Some(HIDDEN_STYLE)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocument {
    hosts: Mutex<HashMap<String, Vec<Element>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let document = Self::new();
        for host in hosts {
            document.add_host(host);
        }
        document
    }

    fn hosts(&self) -> MutexGuard<'_, HashMap<String, Vec<Element>>> {
        self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_host(&self, host: impl Into<String>) {
        self.hosts().entry(host.into()).or_default();
    }

    /// Snapshot of a mount element
    pub fn element(&self, host: &str, selector: &str) -> Option<Element> {
        self.hosts()
            .get(host)?
            .iter()
            .find(|element| element.selector == selector)
            .cloned()
    }

    /// Snapshot of every element inside a host, in insertion order
    pub fn children(&self, host: &str) -> Vec<Element> {
        self.hosts().get(host).cloned().unwrap_or_default()
    }

    fn with_element<T>(&self, host: &str, selector: &str, f: impl FnOnce(&mut Element) -> T) -> Option<T> {
        self.hosts()
            .get_mut(host)?
            .iter_mut()
            .find(|element| element.selector == selector)
            .map(f)
    }
}

impl Document for MemoryDocument {
    fn has_host(&self, host: &str) -> bool {
        self.hosts().contains_key(host)
    }

    fn contains(&self, host: &str, selector: &str) -> bool {
        self.with_element(host, selector, |_| ()).is_some()
    }

    fn create_element(&self, host: &str, selector: &str, classes: &[String]) -> bool {
        let mut hosts = self.hosts();
        let Some(children) = hosts.get_mut(host) else {
            return false;
        };
        debug!("Creating <{}> in {}", selector, host);
        children.push(Element {
            selector: selector.to_string(),
            classes: classes.to_vec(),
            style: None,
        });
        true
    }

    fn remove_element(&self, host: &str, selector: &str) -> bool {
        let mut hosts = self.hosts();
        let Some(children) = hosts.get_mut(host) else {
            return false;
        };
        let before = children.len();
        children.retain(|element| element.selector != selector);
        before != children.len()
    }

    fn style(&self, host: &str, selector: &str) -> Option<Option<String>> {
        self.with_element(host, selector, |element| element.style.clone())
    }

    fn set_style(&self, host: &str, selector: &str, style: Option<String>) -> bool {
        self.with_element(host, selector, |element| element.style = style)
            .is_some()
    }
}
