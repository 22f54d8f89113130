use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use postbox_backend_traits::Credentials;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "postbox_config.json";

pub const ENV_EMAIL_ADDRESS: &str = "POSTBOX_EMAIL_ADDRESS";
pub const ENV_EMAIL_PASSWORD: &str = "POSTBOX_EMAIL_PASSWORD";

const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// What to do when the engine reports that configuration failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigureFailurePolicy {
    /// Log it and keep waiting; the readiness signal stays pending.
    #[default]
    Wait,
    /// Fail the readiness signal with `ConfigurationFailure`.
    Fail,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostboxConfig {
    /// Directory the config was loaded from. Not part of the file.
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Account used when the store is not configured yet.
    pub email_address: Option<String>,
    pub email_password: Option<String>,
    /// Store root; defaults to `data_dir`.
    pub store_dir: Option<PathBuf>,
    /// How many delivered message ids are remembered for deduplication.
    pub dedup_capacity: usize,
    pub configure_failure: ConfigureFailurePolicy,
}

impl Default for PostboxConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            email_address: None,
            email_password: None,
            store_dir: None,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            configure_failure: ConfigureFailurePolicy::default(),
        }
    }
}

impl fmt::Debug for PostboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostboxConfig")
            .field("data_dir", &self.data_dir)
            .field("email_address", &self.email_address)
            .field(
                "email_password",
                &self.email_password.as_ref().map(|_| "<redacted>"),
            )
            .field("store_dir", &self.store_dir)
            .field("dedup_capacity", &self.dedup_capacity)
            .field("configure_failure", &self.configure_failure)
            .finish()
    }
}

impl PostboxConfig {
    /// Load `<data_dir>/postbox_config.json` (defaults when absent), then
    /// apply `POSTBOX_EMAIL_*` environment overrides.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Like [`PostboxConfig::load`] without environment overrides.
    pub fn load_file(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<PostboxConfig>(&bytes)
                .map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                PostboxConfig::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ENV_EMAIL_ADDRESS).filter(|v| !v.trim().is_empty()) {
            self.email_address = Some(addr);
        }
        if let Some(pw) = lookup(ENV_EMAIL_PASSWORD).filter(|v| !v.is_empty()) {
            self.email_password = Some(pw);
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.email_address = Some(credentials.address);
        self.email_password = Some(credentials.password);
        self
    }

    pub fn store_root(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.clone())
    }

    /// Credentials for first-run configuration, if both parts are present.
    pub fn credentials(&self) -> Option<Credentials> {
        let address = self.email_address.as_deref().map(str::trim)?;
        let password = self.email_password.as_deref()?;
        if address.is_empty() || password.is_empty() {
            return None;
        }
        Some(Credentials::new(address, password))
    }

    pub fn dedup_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.dedup_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Copy with the password replaced, for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.email_password.is_some() {
            copy.email_password = Some("<redacted>".to_string());
        }
        copy
    }
}
