//! Switching state machine
//!
//! Everything in here runs with the portal state locked and never calls into
//! a sub-application or the error handler. Decisions are returned as a
//! [`SwitchPlan`] which the portal then carries out with the lock released.
//!
//! Per navigation event, in order:
//! 1. find the application matching the path (ambiguity aborts the event)
//! 2. if another application is mounted, destroy it (default mode) or hide
//!    it (coexist mode), and clear the current pointer
//! 3. activate the match: nothing to do if already mounted, re-show if
//!    hidden, join the in-flight activation if loading, else start one

use futures::future::{BoxFuture, Shared};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use super::application::ApplicationBindings;
use super::descriptor::{ApplicationDescriptor, SwitchMode};
use super::document::{Document, HIDDEN_STYLE};
use super::host::{HostApplication, NavigationEvent};
use super::lifecycle::ApplicationStatus;
use super::options::PortalOptions;
use super::registry::ApplicationRegistry;
use crate::error::PortalError;

/// How an activation (or a navigation) ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Assets loaded, bootstrap succeeded, application is current and visible
    Mounted,

    /// The target was already mounted; nothing happened
    AlreadyMounted,

    /// A hidden application was shown again without reloading
    Reshown,

    /// The path matched no application
    NoMatch,

    /// Assets loaded but another navigation took over before bootstrap
    Superseded,

    /// Bootstrap finished after another navigation took over; the application
    /// was immediately destroyed (`Registered`) or hidden (`Hidden`)
    Deactivated(ApplicationStatus),

    Failed(PortalError),

    /// The event was not acted upon (portal stopped, ambiguous route)
    Ignored(PortalError),
}

pub(crate) type SharedActivation = Shared<BoxFuture<'static, ActivationOutcome>>;

/// The state object created by `start` and discarded by `stop`
pub(crate) struct Orchestrator {
    pub(crate) current: Option<String>,
    pub(crate) host: Arc<HostApplication>,
}

impl Orchestrator {
    pub(crate) fn new(host: Arc<HostApplication>) -> Self {
        Self {
            current: None,
            host,
        }
    }

    pub(crate) fn is_current(&self, name: &str) -> bool {
        self.current.as_deref() == Some(name)
    }
}

/// All mutable portal state, behind one lock
pub(crate) struct PortalState {
    pub(crate) options: PortalOptions,
    pub(crate) registry: ApplicationRegistry,
    pub(crate) orchestrator: Option<Orchestrator>,
    /// Outlives the orchestrator so a restarted portal joins activations
    /// begun before `stop`
    pub(crate) in_flight: HashMap<String, SharedActivation>,
    pub(crate) loading_done: bool,
}

/// What to do with the previously mounted application
pub(crate) struct Deactivation {
    pub(crate) descriptor: Arc<ApplicationDescriptor>,
    pub(crate) mode: SwitchMode,
}

pub(crate) enum Activation {
    None,
    AlreadyMounted(String),
    Reshow(Arc<ApplicationDescriptor>),
    Join(String, SharedActivation),
    Start(String, SharedActivation),
}

pub(crate) struct SwitchPlan {
    pub(crate) deactivation: Option<Deactivation>,
    /// Hidden application whose instance vanished; its element is removed
    /// and its scripts forgotten before reactivation
    pub(crate) stale_element: Option<Arc<ApplicationDescriptor>>,
    pub(crate) activation: Activation,
}

impl PortalState {
    pub(crate) fn new(options: PortalOptions) -> Self {
        Self {
            options,
            registry: ApplicationRegistry::new(),
            orchestrator: None,
            in_flight: HashMap::new(),
            loading_done: false,
        }
    }

    /// Decide the transitions for one navigation event
    ///
    /// `spawn` builds the activation future for a descriptor and epoch; it is
    /// only called when a new activation has to start.
    pub(crate) fn plan_switch<F>(
        &mut self,
        event: &NavigationEvent,
        bindings: &ApplicationBindings,
        document: &dyn Document,
        spawn: F,
    ) -> Result<SwitchPlan, PortalError>
    where
        F: FnOnce(Arc<ApplicationDescriptor>, u64) -> SharedActivation,
    {
        let PortalState {
            options,
            registry,
            orchestrator,
            in_flight,
            loading_done,
        } = self;
        let orchestrator = orchestrator.as_mut().ok_or(PortalError::NotStarted)?;

        let matched = registry.match_path(&event.url)?.cloned();
        let matched_name = matched.as_ref().map(|descriptor| descriptor.name.clone());

        let mut deactivation = None;
        if let Some(current) = orchestrator.current.clone() {
            if matched_name.as_deref() != Some(current.as_str()) {
                deactivation = deactivate(registry, options, document, &current);
                orchestrator.current = None;
            }
        }

        let Some(descriptor) = matched else {
            *loading_done = true;
            return Ok(SwitchPlan {
                deactivation,
                stale_element: None,
                activation: Activation::None,
            });
        };

        let name = descriptor.name.clone();
        orchestrator.current = Some(name.clone());
        let mut stale_element = None;

        let Some(state) = registry.state_mut(&name) else {
            return Err(PortalError::NotStarted);
        };

        let activation = match state.status {
            ApplicationStatus::Mounted => {
                *loading_done = true;
                Activation::AlreadyMounted(name)
            }
            ApplicationStatus::Hidden if bindings.is_bound(&name) => {
                let original = state.saved_style.take().unwrap_or(None);
                document.set_style(&descriptor.host, &descriptor.mount_selector(), original);
                state.status = ApplicationStatus::Mounted;
                *loading_done = true;
                Activation::Reshow(descriptor)
            }
            ApplicationStatus::Loading if in_flight.contains_key(&name) => {
                *loading_done = false;
                let activation = in_flight[&name].clone();
                Activation::Join(name, activation)
            }
            status => {
                if status == ApplicationStatus::Hidden {
                    warn!("Instance of hidden application {} is gone, activating from scratch", name);
                    state.saved_style = None;
                    // The entry script has to run again to bind a new instance
                    state.loaded = false;
                    stale_element = Some(Arc::clone(&descriptor));
                }
                state.status = ApplicationStatus::Loading;
                state.epoch += 1;
                let activation = spawn(Arc::clone(&descriptor), state.epoch);
                in_flight.insert(name.clone(), activation.clone());
                *loading_done = false;
                Activation::Start(name, activation)
            }
        };

        Ok(SwitchPlan {
            deactivation,
            stale_element,
            activation,
        })
    }

    /// Effective switch mode of a registered application
    pub(crate) fn switch_mode_of(&self, descriptor: &ApplicationDescriptor) -> SwitchMode {
        descriptor.effective_switch_mode(self.options.switch_mode)
    }

    pub(crate) fn is_current(&self, name: &str) -> bool {
        self.orchestrator
            .as_ref()
            .is_some_and(|orchestrator| orchestrator.is_current(name))
    }

    pub(crate) fn finish_in_flight(&mut self, name: &str) {
        self.in_flight.remove(name);
    }

    /// Hide the mount element, remembering its style attribute
    pub(crate) fn hide(&mut self, document: &dyn Document, descriptor: &ApplicationDescriptor) {
        hide(&mut self.registry, document, descriptor);
    }
}

/// Apply the mode-specific status change to the mounted application `name`
///
/// Only a mounted application is deactivated; one still loading notices on
/// completion that it is no longer current.
fn deactivate(
    registry: &mut ApplicationRegistry,
    options: &PortalOptions,
    document: &dyn Document,
    name: &str,
) -> Option<Deactivation> {
    let descriptor = Arc::clone(registry.find(name)?);
    let state = registry.state_mut(name)?;
    if state.status != ApplicationStatus::Mounted {
        debug!("Leaving {} while {:?}", name, state.status);
        return None;
    }

    let mode = descriptor.effective_switch_mode(options.switch_mode);
    match mode {
        SwitchMode::Default => state.status = ApplicationStatus::Registered,
        SwitchMode::Coexist => {
            state.status = ApplicationStatus::Hidden;
            hide(registry, document, &descriptor);
        }
    }
    Some(Deactivation { descriptor, mode })
}

fn hide(registry: &mut ApplicationRegistry, document: &dyn Document, descriptor: &ApplicationDescriptor) {
    let selector = descriptor.mount_selector();
    let Some(original) = document.style(&descriptor.host, &selector) else {
        debug!("No mount element to hide for {}", descriptor.name);
        return;
    };
    document.set_style(&descriptor.host, &selector, Some(HIDDEN_STYLE.to_string()));
    if let Some(state) = registry.state_mut(&descriptor.name) {
        state.saved_style = Some(original);
    }
}
