//! Micro-frontend portal: registry, asset loading, switching and mounting

pub mod application;
pub mod assets;
pub mod descriptor;
pub mod dispatcher;
pub mod document;
pub mod host;
pub mod lifecycle;
pub mod options;
mod orchestrator;
pub mod registry;
mod service;
pub mod shell;

pub use application::{ApplicationBindings, MicroApplication};
pub use assets::{
    ASSETS_NAMESPACE, AssetFetcher, AssetKind, AssetLoadResult, AssetLoader, AssetManifest,
    AssetRequest, AssetStatus,
};
pub use descriptor::{ApplicationDescriptor, RoutePrefix, SwitchMode};
pub use dispatcher::{APPS_LOADING_END, APPS_LOADING_START, EventStream, GlobalEventDispatcher};
pub use document::{Document, Element, HIDDEN_STYLE, MemoryDocument};
pub use host::{HostApplication, NavigationEvent, Navigator, PortalData};
pub use lifecycle::{ApplicationStatus, RuntimeState};
pub use options::{DebugFactory, DebugSink, ErrorHandler, PortalOptions};
pub use orchestrator::ActivationOutcome;
pub use registry::ApplicationRegistry;
pub use service::{Navigation, Portal, PortalBuilder};
pub use shell::{HostShell, ShellRouter};
