//! Portal-wide options, set before `start`

use log::{debug, error};
use std::fmt;
use std::sync::Arc;

use super::descriptor::SwitchMode;
use crate::error::PortalError;

/// Receives every runtime error (load, bootstrap, destroy, routing)
pub type ErrorHandler = Arc<dyn Fn(&PortalError) + Send + Sync>;

/// Writes one debug line for a namespace
pub type DebugSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Builds a debug sink for a namespace such as `microhost:portal`
pub type DebugFactory = Arc<dyn Fn(&str) -> DebugSink + Send + Sync>;

/// Forwards debug lines to the `log` facade with the namespace as target
pub fn log_debug_factory() -> DebugFactory {
    Arc::new(|namespace: &str| -> DebugSink {
        let target = namespace.to_string();
        Arc::new(move |message: &str| debug!(target: target.as_str(), "{}", message))
    })
}

fn log_error_handler() -> ErrorHandler {
    Arc::new(|err: &PortalError| error!("{}", err))
}

#[derive(Clone)]
pub struct PortalOptions {
    pub switch_mode: SwitchMode,

    /// Load assets of not-yet-active applications after an activation mounts
    pub preload: bool,

    pub error_handler: ErrorHandler,

    pub debug_factory: DebugFactory,
}

impl Default for PortalOptions {
    fn default() -> Self {
        Self {
            switch_mode: SwitchMode::Default,
            preload: true,
            error_handler: log_error_handler(),
            debug_factory: log_debug_factory(),
        }
    }
}

impl PortalOptions {
    pub fn with_switch_mode(mut self, mode: SwitchMode) -> Self {
        self.switch_mode = mode;
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PortalError) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn with_debug_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> DebugSink + Send + Sync + 'static,
    {
        self.debug_factory = Arc::new(factory);
        self
    }

    pub fn debugger(&self, namespace: &str) -> DebugSink {
        (self.debug_factory)(namespace)
    }
}

impl fmt::Debug for PortalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalOptions")
            .field("switch_mode", &self.switch_mode)
            .field("preload", &self.preload)
            .finish_non_exhaustive()
    }
}
