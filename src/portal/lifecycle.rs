use serde::Serialize;

/// Lifecycle status of a registered application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    /// Known to the portal, nothing running (also the state after destroy)
    Registered,

    /// Assets are being fetched or bootstrap is in progress
    Loading,

    /// Bootstrapped and visible
    Mounted,

    /// Bootstrapped but hidden by a coexist switch, instance retained
    Hidden,
}

impl ApplicationStatus {
    /// Whether a live instance exists for this application
    pub fn is_bootstrapped(&self) -> bool {
        matches!(self, ApplicationStatus::Mounted | ApplicationStatus::Hidden)
    }
}

/// Per-application mutable state, owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeState {
    pub status: ApplicationStatus,

    /// Assets have been fetched at least once
    pub loaded: bool,

    /// Bumped for every activation attempt; completions from older attempts are ignored
    pub epoch: u64,

    /// Number of times the bootstrap contract has been invoked
    pub bootstraps: u32,

    /// Style attribute the mount element had before it was hidden
    #[serde(skip)]
    pub(crate) saved_style: Option<Option<String>>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            status: ApplicationStatus::Registered,
            loaded: false,
            epoch: 0,
            bootstraps: 0,
            saved_style: None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.status == ApplicationStatus::Mounted
    }

    pub fn is_loading(&self) -> bool {
        self.status == ApplicationStatus::Loading
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}
