//! Test doubles shared by the integration tests

#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use microhost::portal::{
    ApplicationBindings, ApplicationDescriptor, AssetFetcher, AssetKind, AssetRequest,
    HostApplication, MemoryDocument, MicroApplication, Navigator, Portal, PortalOptions,
};
use microhost::PortalError;

pub const HOST: &str = "#host";

/// Ordered record of lifecycle calls across all test applications
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Sub-application that records what the portal asks of it
pub struct RecordingApplication {
    name: String,
    log: CallLog,
    fail_bootstrap: AtomicBool,
    fail_destroy: AtomicBool,
    /// Set to hold bootstrap until released
    gate: Mutex<Option<Arc<Notify>>>,
    /// Signalled when bootstrap starts
    pub entered: Arc<Notify>,
}

impl RecordingApplication {
    pub fn new(name: &str, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log,
            fail_bootstrap: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            gate: Mutex::new(None),
            entered: Arc::new(Notify::new()),
        })
    }

    pub fn fail_bootstrap(&self, fail: bool) {
        self.fail_bootstrap.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Hold the next bootstraps until the returned gate is notified
    pub fn hold_bootstrap(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl MicroApplication for RecordingApplication {
    async fn bootstrap(&self, _host: Arc<HostApplication>) -> Result<()> {
        self.entered.notify_one();
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_bootstrap.load(Ordering::SeqCst) {
            bail!("{} refused to start", self.name);
        }
        self.log.push(format!("{}:bootstrap", self.name));
        Ok(())
    }

    fn reset_routing(&self, path: Option<&str>) {
        self.log
            .push(format!("{}:reset:{}", self.name, path.unwrap_or("-")));
    }

    fn destroy(&self) -> Result<()> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            bail!("{} refused to stop", self.name);
        }
        self.log.push(format!("{}:destroy", self.name));
        Ok(())
    }
}

/// Fetcher with per-URL counters, failure injection and gates
///
/// Fetching an application's script binds the instance provided for that
/// application, the way an entry script registers itself on execution.
pub struct ScriptedFetcher {
    bindings: ApplicationBindings,
    instances: Mutex<HashMap<String, Arc<RecordingApplication>>>,
    fetches: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    texts: Mutex<HashMap<String, String>>,
}

impl ScriptedFetcher {
    pub fn new(bindings: ApplicationBindings) -> Arc<Self> {
        Arc::new(Self {
            bindings,
            instances: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            texts: Mutex::new(HashMap::new()),
        })
    }

    pub fn provide(&self, app: &str, instance: Arc<RecordingApplication>) {
        self.instances.lock().unwrap().insert(app.to_string(), instance);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn recover(&self, url: &str) {
        self.failing.lock().unwrap().remove(url);
    }

    /// Hold fetches of `url` until the returned gate is notified
    pub fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn serve_text(&self, url: &str, body: &str) {
        self.texts.lock().unwrap().insert(url.to_string(), body.to_string());
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn record(&self, url: &str) {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
    }

    async fn pass_gate(&self, url: &str) {
        let gate = self.gates.lock().unwrap().remove(url);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl AssetFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<()> {
        self.record(&request.url);
        self.pass_gate(&request.url).await;
        if self.failing.lock().unwrap().contains(&request.url) {
            bail!("404 Not Found: {}", request.url);
        }

        if request.kind == AssetKind::Script {
            let instance = self.instances.lock().unwrap().get(&request.app).cloned();
            if let Some(instance) = instance {
                self.bindings.bind(request.app.clone(), instance);
            }
        }
        Ok(())
    }

    async fn fetch_text(&self, request: &AssetRequest) -> Result<String> {
        self.record(&request.url);
        self.pass_gate(&request.url).await;
        match self.texts.lock().unwrap().get(&request.url) {
            Some(body) => Ok(body.clone()),
            None => bail!("404 Not Found: {}", request.url),
        }
    }
}

/// Navigator that only remembers what it was asked
#[derive(Default)]
pub struct RecordingNavigator {
    pub urls: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn navigate_by_url(&self, url: &str) {
        self.urls.lock().unwrap().push(url.to_string());
    }
}

/// A portal over in-memory doubles with private bindings
pub struct Harness {
    pub portal: Portal,
    pub fetcher: Arc<ScriptedFetcher>,
    pub document: Arc<MemoryDocument>,
    pub bindings: ApplicationBindings,
    pub log: CallLog,
    pub errors: Arc<Mutex<Vec<PortalError>>>,
}

impl Harness {
    /// Preloading is off unless the options turn it back on
    pub fn new() -> Self {
        Self::with_options(PortalOptions::default().with_preload(false))
    }

    pub fn with_options(options: PortalOptions) -> Self {
        let bindings = ApplicationBindings::new();
        let fetcher = ScriptedFetcher::new(bindings.clone());
        let document = Arc::new(MemoryDocument::with_hosts([HOST]));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&errors);
        let options = options.with_error_handler(move |err: &PortalError| {
            sink.lock().unwrap().push(err.clone());
        });

        let portal = Portal::builder(fetcher.clone(), document.clone())
            .bindings(bindings.clone())
            .options(options)
            .build();

        Self {
            portal,
            fetcher,
            document,
            bindings,
            log: CallLog::default(),
            errors,
        }
    }

    /// Descriptor mounting into [`HOST`] with one script under `/<name>/`
    pub fn descriptor(name: &str, route: &str) -> ApplicationDescriptor {
        ApplicationDescriptor::new(name, HOST, route).with_scripts([format!("/{}/main.js", name)])
    }

    /// Register `descriptor` and provide its instance to the fetcher
    pub fn register(&self, descriptor: ApplicationDescriptor) -> Arc<RecordingApplication> {
        let app = RecordingApplication::new(&descriptor.name, self.log.clone());
        self.fetcher.provide(&descriptor.name, Arc::clone(&app));
        self.portal.register_application(descriptor).unwrap();
        app
    }

    pub fn app(&self, name: &str, route: &str) -> Arc<RecordingApplication> {
        self.register(Self::descriptor(name, route))
    }

    pub fn start(&self) -> Arc<RecordingNavigator> {
        let navigator = Arc::new(RecordingNavigator::default());
        self.portal.start(navigator.clone()).unwrap();
        navigator
    }

    pub fn errors(&self) -> Vec<PortalError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn element_style(&self, name: &str) -> Option<Option<String>> {
        self.document
            .element(HOST, &format!("{}-root", name))
            .map(|element| element.style)
    }

    pub fn has_element(&self, name: &str) -> bool {
        self.element_style(name).is_some()
    }
}

/// Poll `condition` until it holds, yielding to other tasks in between
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}
