//! Typed failures surfaced by the discovery and dispatch operations.

use std::path::PathBuf;
use std::sync::Arc;

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur while discovering, loading or dispatching
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A root, package or entry file is absent.
    #[error("{what} not found: {path:?}")]
    NotFound { what: &'static str, path: PathBuf },

    /// A module failed while being instantiated.
    #[error("Failed to load module '{identifier}': {source}")]
    LoadFailure {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    /// No tree provider produced a parsable dependency tree.
    #[error("Malformed dependency tree output: {0}")]
    MalformedOutput(String),

    /// A required call argument was omitted by the caller.
    #[error("Missing required argument: {0}")]
    MissingOptions(&'static str),

    /// A failure recorded once and handed to every later caller.
    #[error(transparent)]
    Shared(Arc<DiscoveryError>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DiscoveryError {
    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what,
            path: path.into(),
        }
    }

    pub fn load_failure(identifier: impl Into<String>, source: anyhow::Error) -> Self {
        Self::LoadFailure {
            identifier: identifier.into(),
            source,
        }
    }

    /// True for the "absent" class of failures that callers may treat as empty.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DiscoveryError::not_found("entry file", "/app/node_modules/a");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "entry file not found: \"/app/node_modules/a\""
        );

        let err = DiscoveryError::load_failure("plugin-x", anyhow::anyhow!("boom"));
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Failed to load module 'plugin-x': boom");

        let err = DiscoveryError::MissingOptions("options");
        assert_eq!(err.to_string(), "Missing required argument: options");

        let err = DiscoveryError::Shared(Arc::new(DiscoveryError::not_found("store", "/app")));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "store not found: \"/app\"");
    }
}
