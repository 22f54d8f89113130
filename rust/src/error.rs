use std::path::PathBuf;
use std::time::Duration;

use postbox_backend_traits::BackendError;

/// Why the readiness signal failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("store could not be opened: {cause}")]
    OpenFailure { cause: String },

    #[error("account configuration failed: {cause}")]
    ConfigurationFailure { cause: String },

    #[error("store is not configured and no credentials were supplied")]
    MissingCredentials,

    #[error("postbox stopped before becoming ready")]
    Shutdown,

    #[error("not ready after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn core thread: {0}")]
    Spawn(String),
}

/// A message event that could not be turned into a delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("lookup failed: {0}")]
    Lookup(#[from] BackendError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
