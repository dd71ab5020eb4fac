//! The portal: public control API over registry, loader and orchestrator

use futures::future::{FutureExt, join_all};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::application::ApplicationBindings;
use super::assets::{ASSETS_NAMESPACE, AssetFetcher, AssetLoader};
use super::descriptor::{ApplicationDescriptor, SwitchMode};
use super::dispatcher::{APPS_LOADING_END, APPS_LOADING_START, GlobalEventDispatcher};
use super::document::Document;
use super::host::{HostApplication, NavigationEvent, Navigator, PortalData};
use super::lifecycle::{ApplicationStatus, RuntimeState};
use super::options::{DebugSink, ErrorHandler, PortalOptions};
use super::orchestrator::{
    Activation, ActivationOutcome, Deactivation, Orchestrator, PortalState, SharedActivation,
};
use crate::error::{PortalError, PortalResult};

const DEBUG_NAMESPACE: &str = "microhost:portal";

struct PortalInner {
    state: Mutex<PortalState>,
    loader: AssetLoader,
    document: Arc<dyn Document>,
    bindings: ApplicationBindings,
    dispatcher: GlobalEventDispatcher,
    data: PortalData,
    loading_done: watch::Sender<bool>,
}

/// Result of handing one navigation event to the portal
///
/// Teardown of the previous application has already happened when this is
/// returned; `settled` waits for the activation, if any.
pub struct Navigation {
    target: Option<String>,
    pending: Option<SharedActivation>,
    outcome: Option<ActivationOutcome>,
}

impl Navigation {
    fn done(target: Option<String>, outcome: ActivationOutcome) -> Self {
        Self {
            target,
            pending: None,
            outcome: Some(outcome),
        }
    }

    /// Application the event selected
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Whether this event started or joined an activation
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub async fn settled(self) -> ActivationOutcome {
        match (self.pending, self.outcome) {
            (Some(pending), _) => pending.await,
            (None, Some(outcome)) => outcome,
            (None, None) => ActivationOutcome::NoMatch,
        }
    }
}

pub struct PortalBuilder {
    fetcher: Arc<dyn AssetFetcher>,
    document: Arc<dyn Document>,
    bindings: Option<ApplicationBindings>,
    dispatcher: Option<GlobalEventDispatcher>,
    options: PortalOptions,
}

impl PortalBuilder {
    /// Use private bindings instead of the process-wide ones
    pub fn bindings(mut self, bindings: ApplicationBindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn dispatcher(mut self, dispatcher: GlobalEventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn options(mut self, options: PortalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Portal {
        let (loading_done, _) = watch::channel(false);
        let loader = AssetLoader::new(self.fetcher);
        loader.set_debugger(self.options.debugger(ASSETS_NAMESPACE));
        Portal {
            inner: Arc::new(PortalInner {
                state: Mutex::new(PortalState::new(self.options)),
                loader,
                document: self.document,
                bindings: self.bindings.unwrap_or_else(ApplicationBindings::global),
                dispatcher: self.dispatcher.unwrap_or_default(),
                data: PortalData::default(),
                loading_done,
            }),
        }
    }
}

/// Cheap to clone; clones control the same portal
#[derive(Clone)]
pub struct Portal {
    inner: Arc<PortalInner>,
}

impl Portal {
    pub fn builder(fetcher: Arc<dyn AssetFetcher>, document: Arc<dyn Document>) -> PortalBuilder {
        PortalBuilder {
            fetcher,
            document,
            bindings: None,
            dispatcher: None,
            options: PortalOptions::default(),
        }
    }

    pub fn new(fetcher: Arc<dyn AssetFetcher>, document: Arc<dyn Document>) -> Self {
        Self::builder(fetcher, document).build()
    }

    fn lock(&self) -> MutexGuard<'_, PortalState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn debugger(&self) -> DebugSink {
        self.lock().options.debugger(DEBUG_NAMESPACE)
    }

    fn error_handler(&self) -> ErrorHandler {
        Arc::clone(&self.lock().options.error_handler)
    }

    fn report(&self, err: &PortalError) {
        let handler = self.error_handler();
        handler(err);
    }

    fn set_loading_done(&self, state: &mut PortalState, done: bool) {
        state.loading_done = done;
        self.inner.loading_done.send_replace(done);
    }

    // Configuration and registration

    pub fn set_options(&self, options: PortalOptions) {
        debug!("Setting portal options: {:?}", options);
        self.inner.loader.set_debugger(options.debugger(ASSETS_NAMESPACE));
        self.lock().options = options;
    }

    pub fn options(&self) -> PortalOptions {
        self.lock().options.clone()
    }

    pub fn register_application(&self, descriptor: ApplicationDescriptor) -> PortalResult<()> {
        self.lock().registry.register(descriptor)
    }

    /// Register several applications; stops at the first duplicate
    pub fn register_apps<I>(&self, descriptors: I) -> PortalResult<()>
    where
        I: IntoIterator<Item = ApplicationDescriptor>,
    {
        self.lock().registry.register_all(descriptors)
    }

    /// Payload sub-applications can read through their host handle
    pub fn set_portal_app_data(&self, data: Value) {
        self.inner.data.set(data);
    }

    // Lifecycle control

    /// Create the orchestrator and begin accepting navigation events
    ///
    /// Must be called from within a tokio runtime; activations run on it.
    pub fn start(&self, navigator: Arc<dyn Navigator>) -> PortalResult<()> {
        let scheduler = Handle::try_current().map_err(|_| PortalError::NoRuntime)?;
        let mut state = self.lock();
        if state.orchestrator.is_some() {
            return Err(PortalError::AlreadyStarted);
        }

        let host = Arc::new(HostApplication::new(
            navigator,
            self.inner.dispatcher.clone(),
            self.inner.data.clone(),
            scheduler,
        ));
        state.orchestrator = Some(Orchestrator::new(host));
        info!("Portal started with {} applications", state.registry.len());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.lock().orchestrator.is_some()
    }

    /// Tear down the orchestrator: destroy every mounted or hidden application
    ///
    /// Activations still in flight are kept. A restarted portal navigating to
    /// the same application joins them; otherwise they destroy whatever they
    /// bootstrapped once they find the application is no longer current.
    pub fn stop(&self) {
        let teardown: Vec<Arc<ApplicationDescriptor>> = {
            let mut state = self.lock();
            if state.orchestrator.take().is_none() {
                return;
            }
            state
                .registry
                .entries_mut()
                .filter(|(_, runtime)| runtime.status.is_bootstrapped())
                .map(|(descriptor, runtime)| {
                    runtime.status = ApplicationStatus::Registered;
                    runtime.saved_style = None;
                    Arc::clone(descriptor)
                })
                .collect()
        };

        for descriptor in teardown {
            self.destroy_instance(&descriptor);
        }
        info!("Portal stopped");
    }

    // Navigation

    /// Handle one navigation event
    ///
    /// Never fails: errors go to the error handler and are reflected in the
    /// returned navigation's outcome.
    pub fn navigate(&self, event: impl Into<NavigationEvent>) -> Navigation {
        let event = event.into();
        let debug = self.debugger();
        debug(&format!("navigation to {}", event.url));

        let plan = {
            let mut state = self.lock();
            let document = Arc::clone(&self.inner.document);
            let portal = self.clone();
            let url = event.url.clone();
            let plan = state.plan_switch(&event, &self.inner.bindings, document.as_ref(), move |descriptor, epoch| {
                portal.activate(descriptor, epoch, url).boxed().shared()
            });
            if plan.is_ok() {
                let done = state.loading_done;
                self.set_loading_done(&mut state, done);
            }
            plan
        };

        let plan = match plan {
            Ok(plan) => plan,
            Err(err) => {
                warn!("Ignoring navigation to {}: {}", event.url, err);
                self.report(&err);
                return Navigation::done(None, ActivationOutcome::Ignored(err));
            }
        };

        if let Some(deactivation) = plan.deactivation {
            self.deactivate(deactivation);
        }
        if let Some(stale) = plan.stale_element {
            self.inner
                .document
                .remove_element(&stale.host, &stale.mount_selector());
            self.inner.loader.forget_scripts(&stale);
        }

        match plan.activation {
            Activation::None => {
                debug("no application matches");
                Navigation::done(None, ActivationOutcome::NoMatch)
            }
            Activation::AlreadyMounted(name) => {
                debug(&format!("{} already mounted", name));
                Navigation::done(Some(name), ActivationOutcome::AlreadyMounted)
            }
            Activation::Reshow(descriptor) => {
                let name = descriptor.name.clone();
                debug(&format!("showing {} again", name));
                match self.inner.bindings.get(&name) {
                    Some(app) => {
                        app.reset_routing(Some(&event.url));
                        Navigation::done(Some(name), ActivationOutcome::Reshown)
                    }
                    None => {
                        let err = PortalError::BindingMissing(name.clone());
                        self.report(&err);
                        Navigation::done(Some(name), ActivationOutcome::Failed(err))
                    }
                }
            }
            Activation::Join(name, pending) => {
                debug(&format!("joining in-flight activation of {}", name));
                Navigation {
                    target: Some(name),
                    pending: Some(pending),
                    outcome: None,
                }
            }
            Activation::Start(name, pending) => {
                self.inner
                    .dispatcher
                    .emit(APPS_LOADING_START, json!({ "shouldLoadApps": [name.clone()] }));
                self.spawn(pending.clone());
                Navigation {
                    target: Some(name),
                    pending: Some(pending),
                    outcome: None,
                }
            }
        }
    }

    fn spawn(&self, pending: SharedActivation) {
        let host = self
            .lock()
            .orchestrator
            .as_ref()
            .map(|orchestrator| Arc::clone(&orchestrator.host));
        match host {
            Some(host) => {
                host.spawn(
                    async move {
                        pending.await;
                    }
                    .boxed(),
                );
            }
            None => warn!("Portal stopped before activation could be scheduled"),
        }
    }

    /// Carry out a deactivation decided under the lock
    fn deactivate(&self, deactivation: Deactivation) {
        let Deactivation { descriptor, mode } = deactivation;
        match mode {
            SwitchMode::Default => {
                info!("Destroying application {}", descriptor.name);
                self.destroy_instance(&descriptor);
            }
            SwitchMode::Coexist => {
                info!("Hiding application {}", descriptor.name);
                if let Some(app) = self.inner.bindings.get(&descriptor.name) {
                    app.reset_routing(None);
                }
            }
        }
    }

    /// Invoke the destroy contract, then remove the mount element regardless
    fn destroy_instance(&self, descriptor: &ApplicationDescriptor) {
        if let Some(app) = self.inner.bindings.get(&descriptor.name) {
            if let Err(e) = app.destroy() {
                self.report(&PortalError::Destroy {
                    app: descriptor.name.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }
        self.inner
            .document
            .remove_element(&descriptor.host, &descriptor.mount_selector());
    }

    /// Load, bootstrap and mount one application
    async fn activate(self, descriptor: Arc<ApplicationDescriptor>, epoch: u64, url: String) -> ActivationOutcome {
        let name = descriptor.name.clone();
        let debug = self.debugger();

        let loaded = self
            .lock()
            .registry
            .state(&name)
            .is_some_and(|state| state.loaded);

        if !loaded {
            debug(&format!("loading assets of {}", name));
            if let Err(err) = self.inner.loader.load_application(&descriptor).await {
                return self.fail(&name, epoch, err);
            }
        }

        let host = {
            let mut state = self.lock();
            let still_current = state.is_current(&name);
            let host = state
                .orchestrator
                .as_ref()
                .map(|orchestrator| Arc::clone(&orchestrator.host));

            let Some(runtime) = state.registry.state_mut(&name) else {
                return ActivationOutcome::Superseded;
            };
            // Stale loads still count as loaded
            runtime.loaded = true;
            if runtime.epoch != epoch {
                return ActivationOutcome::Superseded;
            }

            match host {
                Some(host) if still_current => host,
                _ => {
                    debug!("{} loaded but is no longer the target", name);
                    runtime.status = ApplicationStatus::Registered;
                    state.finish_in_flight(&name);
                    return ActivationOutcome::Superseded;
                }
            }
        };

        let Some(app) = self.inner.bindings.get(&name) else {
            return self.fail(&name, epoch, PortalError::BindingMissing(name.clone()));
        };

        let created = self.ensure_mount_element(&descriptor);
        if let Some(runtime) = self.lock().registry.state_mut(&name) {
            runtime.bootstraps += 1;
        }
        debug(&format!("bootstrapping {}", name));
        if let Err(e) = app.bootstrap(host).await {
            if created {
                self.inner
                    .document
                    .remove_element(&descriptor.host, &descriptor.mount_selector());
            }
            let err = PortalError::Bootstrap {
                app: name.clone(),
                reason: format!("{:#}", e),
            };
            return self.fail(&name, epoch, err);
        }

        self.complete(&descriptor, epoch, &url)
    }

    /// Bootstrap succeeded: mount, or apply the deactivation that was
    /// skipped while the application was still loading
    fn complete(&self, descriptor: &Arc<ApplicationDescriptor>, epoch: u64, url: &str) -> ActivationOutcome {
        let name = descriptor.name.as_str();
        let deactivation = {
            let mut state = self.lock();
            let still_current = state.is_current(name);
            let started = state.orchestrator.is_some();
            let mode = state.switch_mode_of(descriptor);

            let Some(runtime) = state.registry.state_mut(name) else {
                return ActivationOutcome::Superseded;
            };
            let deactivation = if runtime.epoch != epoch {
                // A newer attempt owns the instance unless it was rolled back
                if runtime.status != ApplicationStatus::Registered {
                    return ActivationOutcome::Superseded;
                }
                Some(SwitchMode::Default)
            } else if still_current {
                runtime.status = ApplicationStatus::Mounted;
                None
            } else if mode == SwitchMode::Coexist && started {
                runtime.status = ApplicationStatus::Hidden;
                Some(SwitchMode::Coexist)
            } else {
                runtime.status = ApplicationStatus::Registered;
                Some(SwitchMode::Default)
            };

            state.finish_in_flight(name);
            match deactivation {
                None => self.set_loading_done(&mut state, true),
                Some(SwitchMode::Coexist) => state.hide(self.inner.document.as_ref(), descriptor),
                Some(SwitchMode::Default) => {}
            }
            deactivation
        };

        match deactivation {
            None => {
                info!("Application {} mounted at {}", name, url);
                self.inner
                    .dispatcher
                    .emit(APPS_LOADING_END, json!({ "loadedApps": [name] }));
                self.preload();
                ActivationOutcome::Mounted
            }
            Some(mode) => {
                info!("Application {} finished bootstrapping after navigation moved on", name);
                self.deactivate(Deactivation {
                    descriptor: Arc::clone(descriptor),
                    mode,
                });
                ActivationOutcome::Deactivated(match mode {
                    SwitchMode::Coexist => ApplicationStatus::Hidden,
                    SwitchMode::Default => ApplicationStatus::Registered,
                })
            }
        }
    }

    /// Roll back to `Registered` and report
    fn fail(&self, name: &str, epoch: u64, err: PortalError) -> ActivationOutcome {
        {
            let mut state = self.lock();
            let owns_attempt = state
                .registry
                .state(name)
                .is_some_and(|runtime| runtime.epoch == epoch);
            if owns_attempt {
                if let Some(runtime) = state.registry.state_mut(name) {
                    runtime.status = ApplicationStatus::Registered;
                }
                state.finish_in_flight(name);
            }
        }
        warn!("Activation of {} failed: {}", name, err);
        self.report(&err);
        ActivationOutcome::Failed(err)
    }

    /// Create the mount element if missing; true when it was created here
    fn ensure_mount_element(&self, descriptor: &ApplicationDescriptor) -> bool {
        let document = &self.inner.document;
        let selector = descriptor.mount_selector();
        if document.contains(&descriptor.host, &selector) {
            return false;
        }
        if !document.has_host(&descriptor.host) {
            warn!(
                "Host {} of application {} not found, bootstrapping without a mount element",
                descriptor.host, descriptor.name
            );
            return false;
        }
        document.create_element(&descriptor.host, &selector, &descriptor.host_class)
    }

    /// Load assets of every idle application that wants preloading
    fn preload(&self) {
        let (targets, host) = {
            let mut state = self.lock();
            let fallback = state.options.preload;
            let host = state
                .orchestrator
                .as_ref()
                .map(|orchestrator| Arc::clone(&orchestrator.host));
            let targets: Vec<Arc<ApplicationDescriptor>> = state
                .registry
                .entries_mut()
                .filter(|(descriptor, runtime)| {
                    descriptor.effective_preload(fallback)
                        && !runtime.loaded
                        && runtime.status == ApplicationStatus::Registered
                })
                .map(|(descriptor, _)| Arc::clone(descriptor))
                .collect();
            (targets, host)
        };

        let Some(host) = host else { return };
        if targets.is_empty() {
            return;
        }

        debug!("Preloading {} applications", targets.len());
        let portal = self.clone();
        let task = async move {
            let loads = targets.iter().map(|descriptor| {
                let portal = portal.clone();
                async move {
                    match portal.inner.loader.load_application(descriptor).await {
                        Ok(_) => {
                            if let Some(runtime) = portal.lock().registry.state_mut(&descriptor.name) {
                                runtime.loaded = true;
                            }
                            info!("Preloaded {}", descriptor.name);
                        }
                        Err(err) => warn!("Preload failed: {}", err),
                    }
                }
            });
            join_all(loads).await;
        };
        host.spawn(task.boxed());
    }

    // Read access

    pub fn status(&self, name: &str) -> Option<ApplicationStatus> {
        self.lock().registry.state(name).map(|state| state.status)
    }

    pub fn runtime_state(&self, name: &str) -> Option<RuntimeState> {
        self.lock().registry.state(name).cloned()
    }

    pub fn descriptor(&self, name: &str) -> Option<Arc<ApplicationDescriptor>> {
        self.lock().registry.find(name).cloned()
    }

    pub fn applications(&self) -> Vec<Arc<ApplicationDescriptor>> {
        self.lock().registry.descriptors().cloned().collect()
    }

    /// Application the latest navigation selected
    pub fn current_application(&self) -> Option<String> {
        self.lock()
            .orchestrator
            .as_ref()
            .and_then(|orchestrator| orchestrator.current.clone())
    }

    /// Resolve a path without navigating
    pub fn match_path(&self, path: &str) -> PortalResult<Option<Arc<ApplicationDescriptor>>> {
        Ok(self.lock().registry.match_path(path)?.cloned())
    }

    pub fn loading_done(&self) -> bool {
        self.lock().loading_done
    }

    pub fn watch_loading_done(&self) -> watch::Receiver<bool> {
        self.inner.loading_done.subscribe()
    }

    pub fn dispatcher(&self) -> &GlobalEventDispatcher {
        &self.inner.dispatcher
    }

    pub fn bindings(&self) -> &ApplicationBindings {
        &self.inner.bindings
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.inner.loader
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.inner.document
    }

    /// Host handle given to sub-applications, once started
    pub fn host(&self) -> Option<Arc<HostApplication>> {
        self.lock()
            .orchestrator
            .as_ref()
            .map(|orchestrator| Arc::clone(&orchestrator.host))
    }
}
