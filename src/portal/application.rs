//! Contract every sub-application implements, and the name-keyed bindings
//! through which the portal finds running instances.

use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::host::HostApplication;

/// Lifecycle contract of an independently deployed sub-application
#[async_trait]
pub trait MicroApplication: Send + Sync {
    /// Start the application inside its mount element
    async fn bootstrap(&self, host: Arc<HostApplication>) -> anyhow::Result<()>;

    /// Reset internal routing; `None` asks for a neutral state (the app is
    /// being hidden), `Some(path)` asks it to follow the host's new path
    fn reset_routing(&self, path: Option<&str>);

    /// Tear the running instance down
    fn destroy(&self) -> anyhow::Result<()>;
}

static GLOBAL_BINDINGS: Lazy<ApplicationBindings> = Lazy::new(ApplicationBindings::new);

/// Process-wide application name → instance bindings
///
/// A sub-application's entry script binds its instance once it has executed.
/// The portal looks instances up on every use rather than holding on to them.
#[derive(Clone, Default)]
pub struct ApplicationBindings {
    inner: Arc<RwLock<HashMap<String, Arc<dyn MicroApplication>>>>,
}

impl ApplicationBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bindings shared by everything in this process
    pub fn global() -> ApplicationBindings {
        GLOBAL_BINDINGS.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn MicroApplication>>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn MicroApplication>>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind (or rebind) an instance under `name`
    pub fn bind(&self, name: impl Into<String>, app: Arc<dyn MicroApplication>) {
        let name = name.into();
        info!("Binding application instance: {}", name);
        self.write().insert(name, app);
    }

    pub fn unbind(&self, name: &str) -> Option<Arc<dyn MicroApplication>> {
        debug!("Unbinding application instance: {}", name);
        self.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MicroApplication>> {
        self.read().get(name).cloned()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl MicroApplication for Noop {
        async fn bootstrap(&self, _host: Arc<HostApplication>) -> anyhow::Result<()> {
            Ok(())
        }

        fn reset_routing(&self, _path: Option<&str>) {}

        fn destroy(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bind_lookup_unbind() {
        let bindings = ApplicationBindings::new();
        assert!(bindings.get("app1").is_none());

        bindings.bind("app1", Arc::new(Noop));
        assert!(bindings.is_bound("app1"));
        assert_eq!(bindings.names(), vec!["app1"]);

        assert!(bindings.unbind("app1").is_some());
        assert!(!bindings.is_bound("app1"));
    }

    #[test]
    fn test_global_bindings_are_shared() {
        ApplicationBindings::global().bind("global-test-app", Arc::new(Noop));
        assert!(ApplicationBindings::global().is_bound("global-test-app"));
        ApplicationBindings::global().unbind("global-test-app");
    }
}
