//! Error kinds surfaced by the portal
//!
//! Registration errors are returned to the caller. Everything that happens
//! while handling a navigation event is routed to the configured error
//! handler instead, so these values are cheap to clone and share.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    /// An application with this name is already registered
    #[error("application `{0}` has already been registered")]
    DuplicateApplication(String),

    /// One or more assets of an application failed to load
    #[error("failed to load assets for `{app}` ({url}): {reason}")]
    AssetLoad {
        app: String,
        url: String,
        reason: String,
    },

    /// The application's bootstrap contract returned an error
    #[error("application `{app}` failed to bootstrap: {reason}")]
    Bootstrap { app: String, reason: String },

    /// The application's destroy contract returned an error
    #[error("application `{app}` failed to destroy: {reason}")]
    Destroy { app: String, reason: String },

    /// Assets loaded but the application never bound an instance
    #[error("application `{0}` has no bound instance after loading its scripts")]
    BindingMissing(String),

    /// More than one application claims the same path
    #[error("path `{path}` matches more than one application: {}", candidates.join(", "))]
    RoutingAmbiguity {
        path: String,
        candidates: Vec<String>,
    },

    /// A route pattern failed to compile
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    #[error("portal has not been started")]
    NotStarted,

    #[error("portal has already been started")]
    AlreadyStarted,

    /// `start` was called outside of a tokio runtime
    #[error("no async runtime available to drive application loading")]
    NoRuntime,
}

impl PortalError {
    /// Name of the application the error concerns, if any
    pub fn application(&self) -> Option<&str> {
        match self {
            PortalError::DuplicateApplication(app) | PortalError::BindingMissing(app) => Some(app),
            PortalError::AssetLoad { app, .. }
            | PortalError::Bootstrap { app, .. }
            | PortalError::Destroy { app, .. } => Some(app),
            _ => None,
        }
    }

    /// Errors that leave the application eligible for a navigation-triggered retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PortalError::AssetLoad { .. }
                | PortalError::Bootstrap { .. }
                | PortalError::BindingMissing(_)
        )
    }
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguity_message_lists_candidates() {
        let err = PortalError::RoutingAmbiguity {
            path: "/app1/detail".to_string(),
            candidates: vec!["app1".to_string(), "app".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "path `/app1/detail` matches more than one application: app1, app"
        );
        assert_eq!(err.application(), None);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recoverable_classification() {
        let load = PortalError::AssetLoad {
            app: "app1".into(),
            url: "/static/app1/main.js".into(),
            reason: "404".into(),
        };
        assert!(load.is_recoverable());
        assert_eq!(load.application(), Some("app1"));
        assert!(!PortalError::DuplicateApplication("app1".into()).is_recoverable());
    }
}
