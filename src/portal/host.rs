//! Capabilities handed to every sub-application at bootstrap

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::dispatcher::GlobalEventDispatcher;

/// A navigation the host observed; only the URL matters to the portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
}

impl NavigationEvent {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl From<&str> for NavigationEvent {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// Navigation control owned by the host shell
pub trait Navigator: Send + Sync {
    fn navigate_by_url(&self, url: &str);
}

/// Arbitrary payload the host shares with all sub-applications
#[derive(Clone, Default)]
pub struct PortalData {
    inner: Arc<RwLock<Value>>,
}

impl PortalData {
    pub fn get(&self) -> Value {
        self.inner
            .read()
            .map(|value| value.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, value: Value) {
        let mut slot = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = value;
    }
}

/// The host handle, shared by reference among all sub-applications
pub struct HostApplication {
    navigator: Arc<dyn Navigator>,
    dispatcher: GlobalEventDispatcher,
    data: PortalData,
    scheduler: Handle,
}

impl HostApplication {
    pub fn new(
        navigator: Arc<dyn Navigator>,
        dispatcher: GlobalEventDispatcher,
        data: PortalData,
        scheduler: Handle,
    ) -> Self {
        Self {
            navigator,
            dispatcher,
            data,
            scheduler,
        }
    }

    /// Ask the host shell to navigate; the portal sees it as a new event
    pub fn navigate_by_url(&self, url: &str) {
        self.navigator.navigate_by_url(url);
    }

    pub fn dispatcher(&self) -> &GlobalEventDispatcher {
        &self.dispatcher
    }

    /// Current value of the data set through `Portal::set_portal_app_data`
    pub fn portal_data(&self) -> Value {
        self.data.get()
    }

    pub fn scheduler(&self) -> &Handle {
        &self.scheduler
    }

    /// Run a task on the host's runtime
    pub fn spawn(&self, task: BoxFuture<'static, ()>) -> JoinHandle<()> {
        self.scheduler.spawn(task)
    }
}

impl fmt::Debug for HostApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostApplication")
            .field("data", &self.data.get())
            .finish_non_exhaustive()
    }
}
