//! Script and style loading with process-wide deduplication
//!
//! The transport is abstract: an [`AssetFetcher`] fetches and applies one
//! resource. The loader guarantees a URL is fetched at most once while it
//! succeeds, that concurrent requests for the same URL share one fetch, and
//! that a failed URL is forgotten so a later attempt fetches it again.
//! Manifests are cached by URL under the same rules.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::descriptor::ApplicationDescriptor;
use super::options::{DebugSink, log_debug_factory};
use crate::error::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Style,
    Manifest,
}

/// One resource to fetch, with the application that asked for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub url: String,
    pub kind: AssetKind,
    pub app: String,
    pub sandbox: bool,
}

/// Transport used by the loader
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch a script or style and apply it to the host
    async fn fetch(&self, request: &AssetRequest) -> anyhow::Result<()>;

    /// Fetch a text resource (manifests) without applying it
    async fn fetch_text(&self, request: &AssetRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum AssetStatus {
    /// Fetched by this request (or by a concurrent request it joined)
    Loaded,

    /// Already loaded earlier; nothing was fetched
    Cached,

    Failed(String),

    /// Not attempted because an earlier resource in a serial batch failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetLoadResult {
    pub url: String,
    pub kind: AssetKind,
    pub status: AssetStatus,
}

impl AssetLoadResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, AssetStatus::Loaded | AssetStatus::Cached)
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            AssetStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Maps logical file names (`main.js`) to versioned ones (`main.4d2f1c.js`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest(HashMap<String, String>);

impl AssetManifest {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.0.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for AssetManifest {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Join a resource name onto a path prefix; absolute URLs are left alone
pub fn resolve_url(prefix: Option<&str>, name: &str) -> String {
    if name.starts_with("http://") || name.starts_with("https://") || name.starts_with("//") {
        return name.to_string();
    }
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            name.trim_start_matches('/')
        ),
        _ => name.to_string(),
    }
}

/// Debug namespace of the loader
pub const ASSETS_NAMESPACE: &str = "microhost:assets";

type SharedFetch = Shared<BoxFuture<'static, Result<(), String>>>;
type SharedManifest = Shared<BoxFuture<'static, Result<AssetManifest, String>>>;

enum CacheEntry {
    Loaded,
    InFlight(SharedFetch),
}

enum ManifestEntry {
    Ready(AssetManifest),
    InFlight(SharedManifest),
}

/// Deduplicating loader, cheap to clone; clones share the cache
#[derive(Clone)]
pub struct AssetLoader {
    fetcher: Arc<dyn AssetFetcher>,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
    manifests: Arc<Mutex<HashMap<String, ManifestEntry>>>,
    debug: Arc<RwLock<DebugSink>>,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            cache: Arc::new(Mutex::new(HashMap::new())),
            manifests: Arc::new(Mutex::new(HashMap::new())),
            debug: Arc::new(RwLock::new(log_debug_factory()(ASSETS_NAMESPACE))),
        }
    }

    /// Replace the sink loader debug lines go to
    pub fn set_debugger(&self, sink: DebugSink) {
        let mut slot = self.debug.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = sink;
    }

    fn debugger(&self) -> DebugSink {
        let slot = self.debug.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*slot)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn manifests(&self) -> MutexGuard<'_, HashMap<String, ManifestEntry>> {
        self.manifests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        matches!(self.cache().get(url), Some(CacheEntry::Loaded))
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .cache()
            .iter()
            .filter(|(_, entry)| matches!(entry, CacheEntry::Loaded))
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    /// Load one resource, sharing an in-flight fetch of the same URL
    pub async fn load(&self, request: AssetRequest) -> AssetLoadResult {
        let url = request.url.clone();
        let kind = request.kind;
        let debug = self.debugger();

        let pending = {
            let mut cache = self.cache();
            match cache.get(&url) {
                Some(CacheEntry::Loaded) => {
                    debug(&format!("already loaded {}", url));
                    return AssetLoadResult {
                        url,
                        kind,
                        status: AssetStatus::Cached,
                    };
                }
                Some(CacheEntry::InFlight(fetch)) => {
                    debug(&format!("joining in-flight load of {}", url));
                    fetch.clone()
                }
                None => {
                    let fetch = self.start_fetch(request);
                    cache.insert(url.clone(), CacheEntry::InFlight(fetch.clone()));
                    fetch
                }
            }
        };

        let status = match pending.await {
            Ok(()) => AssetStatus::Loaded,
            Err(reason) => AssetStatus::Failed(reason),
        };
        AssetLoadResult { url, kind, status }
    }

    /// The shared fetch settles its own cache entry, so whoever polls it
    /// first, the cache is updated exactly once.
    fn start_fetch(&self, request: AssetRequest) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let debug = self.debugger();

        async move {
            debug(&format!("fetching {:?} {}", request.kind, request.url));
            let result = fetcher
                .fetch(&request)
                .await
                .map_err(|e| format!("{:#}", e));

            {
                let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match &result {
                    Ok(()) => {
                        cache.insert(request.url.clone(), CacheEntry::Loaded);
                    }
                    Err(reason) => {
                        warn!("Failed to load {}: {}", request.url, reason);
                        cache.remove(&request.url);
                    }
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Load a batch of resources
    ///
    /// Serial batches run strictly in order and stop at the first failure,
    /// reporting the remaining resources as skipped. Otherwise everything
    /// loads concurrently and every outcome is reported.
    pub async fn load_batch(&self, requests: Vec<AssetRequest>, serial: bool) -> Vec<AssetLoadResult> {
        if !serial {
            return join_all(requests.into_iter().map(|request| self.load(request))).await;
        }

        let mut results = Vec::with_capacity(requests.len());
        let mut aborted = false;
        for request in requests {
            if aborted {
                results.push(AssetLoadResult {
                    url: request.url,
                    kind: request.kind,
                    status: AssetStatus::Skipped,
                });
                continue;
            }
            let result = self.load(request).await;
            aborted = !result.is_ok();
            results.push(result);
        }
        results
    }

    pub async fn load_scripts<I, S>(&self, app: &str, urls: I, serial: bool) -> Vec<AssetLoadResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_batch(requests(app, AssetKind::Script, urls, false), serial)
            .await
    }

    pub async fn load_styles<I, S>(&self, app: &str, urls: I, serial: bool) -> Vec<AssetLoadResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_batch(requests(app, AssetKind::Style, urls, false), serial)
            .await
    }

    /// Forget the scripts of an application so its next load runs them again
    ///
    /// Used when an instance vanished: only re-running the entry script binds
    /// a new one.
    pub fn forget_scripts(&self, descriptor: &ApplicationDescriptor) {
        let manifest = descriptor.manifest.as_ref().and_then(|url| match self.manifests().get(url) {
            Some(ManifestEntry::Ready(manifest)) => Some(manifest.clone()),
            _ => None,
        });
        let (scripts, _) = Self::resolve(descriptor, manifest.as_ref());

        let mut cache = self.cache();
        for url in scripts {
            if matches!(cache.get(&url), Some(CacheEntry::Loaded)) {
                cache.remove(&url);
            }
        }
        drop(cache);
        self.debugger()(&format!("forgot scripts of {}", descriptor.name));
    }

    /// Fetch and parse an application's manifest, once per URL
    pub async fn load_manifest(
        &self,
        descriptor: &ApplicationDescriptor,
        url: &str,
    ) -> Result<AssetManifest, PortalError> {
        let pending = {
            let mut manifests = self.manifests();
            match manifests.get(url) {
                Some(ManifestEntry::Ready(manifest)) => return Ok(manifest.clone()),
                Some(ManifestEntry::InFlight(fetch)) => fetch.clone(),
                None => {
                    let request = AssetRequest {
                        url: url.to_string(),
                        kind: AssetKind::Manifest,
                        app: descriptor.name.clone(),
                        sandbox: descriptor.sandbox,
                    };
                    let fetch = self.start_manifest_fetch(request);
                    manifests.insert(url.to_string(), ManifestEntry::InFlight(fetch.clone()));
                    fetch
                }
            }
        };

        let manifest = pending.await.map_err(|reason| PortalError::AssetLoad {
            app: descriptor.name.clone(),
            url: url.to_string(),
            reason,
        })?;
        self.debugger()(&format!("manifest for {} maps {} files", descriptor.name, manifest.len()));
        Ok(manifest)
    }

    fn start_manifest_fetch(&self, request: AssetRequest) -> SharedManifest {
        let fetcher = Arc::clone(&self.fetcher);
        let manifests = Arc::clone(&self.manifests);
        let debug = self.debugger();

        async move {
            debug(&format!("fetching manifest {}", request.url));
            let result = match fetcher.fetch_text(&request).await {
                Ok(body) => AssetManifest::parse(&body).map_err(|e| format!("invalid manifest: {}", e)),
                Err(e) => Err(format!("{:#}", e)),
            };

            let mut manifests = manifests.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match &result {
                Ok(manifest) => {
                    manifests.insert(request.url.clone(), ManifestEntry::Ready(manifest.clone()));
                }
                Err(reason) => {
                    warn!("Failed to load manifest {}: {}", request.url, reason);
                    manifests.remove(&request.url);
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Final script and style URLs of an application
    pub fn resolve(
        descriptor: &ApplicationDescriptor,
        manifest: Option<&AssetManifest>,
    ) -> (Vec<String>, Vec<String>) {
        let resolve_all = |names: &[String], prefix: Option<&str>| -> Vec<String> {
            names
                .iter()
                .map(|name| {
                    let name = manifest
                        .map(|m| m.resolve(name))
                        .unwrap_or(name.as_str());
                    resolve_url(prefix, name)
                })
                .collect()
        };

        (
            resolve_all(&descriptor.scripts, descriptor.script_prefix()),
            resolve_all(&descriptor.styles, descriptor.style_prefix()),
        )
    }

    /// Load everything an application needs
    ///
    /// The manifest, if any, is fetched first. Scripts and styles then load
    /// side by side, each batch honoring the serial flag. The first failure
    /// is returned as an `AssetLoad` error.
    pub async fn load_application(
        &self,
        descriptor: &ApplicationDescriptor,
    ) -> Result<Vec<AssetLoadResult>, PortalError> {
        let manifest = match &descriptor.manifest {
            Some(url) => Some(self.load_manifest(descriptor, url).await?),
            None => None,
        };
        let (scripts, styles) = Self::resolve(descriptor, manifest.as_ref());

        let script_requests = requests(&descriptor.name, AssetKind::Script, scripts, descriptor.sandbox);
        let style_requests = requests(&descriptor.name, AssetKind::Style, styles, descriptor.sandbox);

        let (mut results, style_results) = futures::join!(
            self.load_batch(script_requests, descriptor.load_serial),
            self.load_batch(style_requests, descriptor.load_serial)
        );
        results.extend(style_results);

        if let Some(failed) = results.iter().find(|r| r.failure().is_some()) {
            return Err(PortalError::AssetLoad {
                app: descriptor.name.clone(),
                url: failed.url.clone(),
                reason: failed.failure().unwrap_or_default().to_string(),
            });
        }
        Ok(results)
    }
}

fn requests<I, S>(app: &str, kind: AssetKind, urls: I, sandbox: bool) -> Vec<AssetRequest>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    urls.into_iter()
        .map(|url| AssetRequest {
            url: url.into(),
            kind,
            app: app.to_string(),
            sandbox,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url(Some("/static/app1/"), "main.js"), "/static/app1/main.js");
        assert_eq!(resolve_url(Some("/static/app1"), "/main.js"), "/static/app1/main.js");
        assert_eq!(resolve_url(None, "main.js"), "main.js");
        assert_eq!(resolve_url(Some(""), "main.js"), "main.js");
        assert_eq!(
            resolve_url(Some("/static"), "https://cdn.example.com/lib.js"),
            "https://cdn.example.com/lib.js"
        );
    }

    #[test]
    fn test_manifest_resolution() {
        let manifest = AssetManifest::from([("main.js", "main.4d2f1c.js"), ("styles.css", "styles.9a8b.css")]);
        assert_eq!(
            AssetManifest::parse(r#"{"main.js": "main.4d2f1c.js", "styles.css": "styles.9a8b.css"}"#).unwrap(),
            manifest
        );
        assert_eq!(manifest.resolve("main.js"), "main.4d2f1c.js");
        assert_eq!(manifest.resolve("polyfills.js"), "polyfills.js");

        let descriptor = ApplicationDescriptor::new("app1", "#host", "/app1")
            .with_resource_path_prefix("/static/app1/")
            .with_style_path_prefix("/css/app1")
            .with_scripts(["main.js", "polyfills.js"])
            .with_styles(["styles.css"]);

        let (scripts, styles) = AssetLoader::resolve(&descriptor, Some(&manifest));
        assert_eq!(scripts, vec!["/static/app1/main.4d2f1c.js", "/static/app1/polyfills.js"]);
        assert_eq!(styles, vec!["/css/app1/styles.9a8b.css"]);
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(AssetManifest::parse("[1, 2]").is_err());
    }

    #[derive(Default)]
    struct KindRecorder {
        seen: Mutex<Vec<(String, AssetKind)>>,
    }

    #[async_trait]
    impl AssetFetcher for KindRecorder {
        async fn fetch(&self, request: &AssetRequest) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push((request.url.clone(), request.kind));
            Ok(())
        }

        async fn fetch_text(&self, _request: &AssetRequest) -> anyhow::Result<String> {
            anyhow::bail!("no text resources")
        }
    }

    #[tokio::test]
    async fn test_scripts_and_styles_share_cache() {
        let fetcher = Arc::new(KindRecorder::default());
        let loader = AssetLoader::new(fetcher.clone());

        let scripts = loader.load_scripts("app1", ["/a.js", "/b.js"], true).await;
        assert!(scripts.iter().all(AssetLoadResult::is_ok));

        let styles = loader.load_styles("app2", ["/a.css", "/a.js"], false).await;
        assert_eq!(styles[0].status, AssetStatus::Loaded);
        assert_eq!(styles[1].status, AssetStatus::Cached);

        let seen = fetcher.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("/a.js".to_string(), AssetKind::Script),
                ("/b.js".to_string(), AssetKind::Script),
                ("/a.css".to_string(), AssetKind::Style),
            ]
        );
    }
}
