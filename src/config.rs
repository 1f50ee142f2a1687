/*!
 * Configuration types for smb-bridge
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, StatusError};
use crate::generation::ProtocolGeneration;

/// Property key for the lowest accepted dialect
pub const PROP_MIN_VERSION: &str = "smb.client.minVersion";
/// Property key for the highest accepted dialect
pub const PROP_MAX_VERSION: &str = "smb.client.maxVersion";
/// Property key requiring message signing on the IPC pipe
pub const PROP_IPC_SIGNING_ENFORCED: &str = "smb.client.ipcSigningEnforced";
/// Property key forcing an explicit SMB2 negotiation round
pub const PROP_USE_SMB2_NEGOTIATION: &str = "smb.client.useSMB2Negotiation";

/// Per-connection negotiation policy
///
/// Every option is a no-op on generations that predate it. Unset version
/// bounds fall back to the generation's built-in range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Lowest protocol version accepted (e.g. "SMB202")
    #[serde(default)]
    pub min_version: Option<String>,

    /// Highest protocol version accepted (e.g. "SMB311")
    #[serde(default)]
    pub max_version: Option<String>,

    /// Require message signing on the administrative pipe
    #[serde(default)]
    pub ipc_signing_enforced: bool,

    /// Force an explicit SMB2 negotiation round before protocol upgrade
    #[serde(default)]
    pub explicit_negotiation: Option<bool>,
}

impl NegotiationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both version bounds
    pub fn with_version_range(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.min_version = Some(min.into());
        self.max_version = Some(max.into());
        self
    }

    pub fn with_min_version(mut self, min: impl Into<String>) -> Self {
        self.min_version = Some(min.into());
        self
    }

    pub fn with_max_version(mut self, max: impl Into<String>) -> Self {
        self.max_version = Some(max.into());
        self
    }

    pub fn with_ipc_signing_enforced(mut self, enforced: bool) -> Self {
        self.ipc_signing_enforced = enforced;
        self
    }

    pub fn with_explicit_negotiation(mut self, explicit: bool) -> Self {
        self.explicit_negotiation = Some(explicit);
        self
    }

    /// Parse from a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| {
            StatusError::construction_caused_by(
                format!("invalid negotiation config: {}", e),
                Box::new(e),
            )
        })
    }
}

/// Client property map handed to a generation's base-context constructor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientProperties {
    entries: BTreeMap<String, String>,
}

impl ClientProperties {
    /// Empty map (what the legacy generation receives)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the property map for `generation`, applying only the keys it
    /// understands
    pub fn for_generation(generation: ProtocolGeneration, config: &NegotiationConfig) -> Self {
        let mut props = Self::empty();

        if let Some((default_min, default_max)) = generation.default_version_range() {
            let min = config
                .min_version
                .clone()
                .unwrap_or_else(|| default_min.to_string());
            let max = config
                .max_version
                .clone()
                .unwrap_or_else(|| default_max.to_string());
            props.set(PROP_MIN_VERSION, min);
            props.set(PROP_MAX_VERSION, max);
        }

        if generation.supports_signing_enforcement() {
            props.set(PROP_IPC_SIGNING_ENFORCED, config.ipc_signing_enforced.to_string());
        }

        if generation.supports_explicit_negotiation() {
            if let Some(explicit) = config.explicit_negotiation {
                props.set(PROP_USE_SMB2_NEGOTIATION, explicit.to_string());
            }
        }

        props
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Boolean property; absent or unparseable values read as `None`
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Shorthand for log_level = debug
    #[serde(default)]
    pub verbose: bool,

    /// Log every NBNS datagram regardless of `log_level`
    #[serde(default)]
    pub trace_name_service: bool,
}

/// Host-application settings: logging plus named negotiation profiles
///
/// ```toml
/// default_generation = "smb212"
///
/// [logging]
/// log_level = "debug"
///
/// [profiles.nas]
/// min_version = "SMB202"
/// max_version = "SMB311"
/// ipc_signing_enforced = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub default_generation: Option<ProtocolGeneration>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub profiles: BTreeMap<String, NegotiationConfig>,
}

impl BridgeConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| {
            StatusError::construction_caused_by(format!("invalid config: {}", e), Box::new(e))
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            StatusError::construction_caused_by(
                format!("failed to serialize config: {}", e),
                Box::new(e),
            )
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Negotiation profile by name, or the default policy
    pub fn profile(&self, name: &str) -> NegotiationConfig {
        self.profiles.get(name).cloned().unwrap_or_default()
    }
}
