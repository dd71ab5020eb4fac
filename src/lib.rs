pub mod config;
pub mod error;
pub mod portal;

pub use config::HostConfig;
pub use error::{PortalError, PortalResult};
pub use portal::{
    ActivationOutcome, ApplicationBindings, ApplicationDescriptor, ApplicationStatus, HostShell,
    MicroApplication, Portal, PortalOptions, SwitchMode,
};
