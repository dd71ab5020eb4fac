//! Host shell integration: routes navigation requests into the portal
//!
//! The router is the [`Navigator`] sub-applications see through their host
//! handle. Requests are queued and handed to [`Portal::navigate`] by a single
//! task, so events are processed in arrival order.

use log::{debug, info, warn};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::host::{NavigationEvent, Navigator};
use super::service::{Navigation, Portal};
use crate::error::PortalResult;

/// Queue-backed navigator owned by the shell
pub struct ShellRouter {
    sender: mpsc::UnboundedSender<NavigationEvent>,
    current: RwLock<Option<String>>,
}

impl ShellRouter {
    fn new(sender: mpsc::UnboundedSender<NavigationEvent>) -> Self {
        Self {
            sender,
            current: RwLock::new(None),
        }
    }

    /// Last URL requested through this router
    pub fn current_url(&self) -> Option<String> {
        self.current
            .read()
            .map(|current| current.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Navigator for ShellRouter {
    fn navigate_by_url(&self, url: &str) {
        {
            let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            *current = Some(url.to_string());
        }
        if self.sender.send(NavigationEvent::new(url)).is_err() {
            warn!("Navigation to {} dropped: shell is not running", url);
        }
    }
}

pub struct HostShell {
    portal: Portal,
    router: Arc<ShellRouter>,
    events: Option<mpsc::UnboundedReceiver<NavigationEvent>>,
    navigations: mpsc::UnboundedReceiver<Navigation>,
    navigations_tx: mpsc::UnboundedSender<Navigation>,
    task: Option<JoinHandle<()>>,
}

impl HostShell {
    pub fn new(portal: Portal) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        let (navigations_tx, navigations) = mpsc::unbounded_channel();
        Self {
            portal,
            router: Arc::new(ShellRouter::new(sender)),
            events: Some(events),
            navigations,
            navigations_tx,
            task: None,
        }
    }

    pub fn portal(&self) -> &Portal {
        &self.portal
    }

    pub fn router(&self) -> Arc<ShellRouter> {
        Arc::clone(&self.router)
    }

    /// Start the portal with this shell's router and begin routing events
    pub fn start(&mut self) -> PortalResult<()> {
        self.portal.start(self.router.clone())?;

        let Some(mut events) = self.events.take() else {
            debug!("Shell event loop already running");
            return Ok(());
        };
        let portal = self.portal.clone();
        let navigations = self.navigations_tx.clone();
        self.task = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let navigation = portal.navigate(event);
                // Nobody listening is fine; the activation runs regardless
                let _ = navigations.send(navigation);
            }
            debug!("Shell event loop finished");
        }));

        info!("Host shell started");
        Ok(())
    }

    /// Request a navigation, as the host's own router would
    pub fn navigate_by_url(&self, url: &str) {
        self.router.navigate_by_url(url);
    }

    /// Next navigation handed to the portal, in request order
    pub async fn next_navigation(&mut self) -> Option<Navigation> {
        self.navigations.recv().await
    }

    /// Stop routing and tear the portal down
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.portal.stop();
        info!("Host shell shut down");
    }
}

impl Drop for HostShell {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
