//! Service configuration.
//!
//! Everything here is static for the life of the process. The master key is
//! deliberately not part of it: it comes from the environment through
//! [`Envelope::from_env`](keyward_core::Envelope::from_env).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Duration;
use keyward_core::{KeyUsage, PermissionsConfig, ShortCodeUsage};
use keyward_perms::OperationPermissions;
use serde::{Deserialize, Serialize};

use crate::error::{KeywardError, Result};

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Upper bound on any configured lifetime.
pub const MAX_TTL_SECS: u64 = 10 * 365 * DAY;

/// Lifetime and rotation interval of keys of one usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsageConfig {
    /// How long a key stays valid after creation.
    pub ttl_secs: u64,
    /// How old the newest key may get before a new one is generated.
    pub rotation_secs: u64,
}

impl KeyUsageConfig {
    pub fn ttl(&self) -> Duration {
        secs(self.ttl_secs)
    }

    pub fn rotation(&self) -> Duration {
        secs(self.rotation_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysConfig {
    pub usages: BTreeMap<KeyUsage, KeyUsageConfig>,

    /// How long the key ring serves a key set before reading the registry
    /// again. Zero disables caching.
    #[serde(default = "default_source_cache_secs")]
    pub source_cache_secs: u64,
}

fn default_source_cache_secs() -> u64 {
    5 * 60
}

impl KeysConfig {
    pub fn usage(&self, usage: KeyUsage) -> Result<&KeyUsageConfig> {
        self.usages
            .get(&usage)
            .ok_or_else(|| KeywardError::Config(format!("no configuration for key usage {}", usage)))
    }

    pub fn source_cache(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.source_cache_secs.min(MAX_TTL_SECS))
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        let mut usages = BTreeMap::new();
        usages.insert(
            KeyUsage::Auth,
            KeyUsageConfig {
                ttl_secs: 7 * DAY,
                rotation_secs: DAY,
            },
        );
        usages.insert(
            KeyUsage::Refresh,
            KeyUsageConfig {
                ttl_secs: 30 * DAY,
                rotation_secs: 7 * DAY,
            },
        );
        Self {
            usages,
            source_cache_secs: default_source_cache_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortCodeUsageConfig {
    pub ttl_secs: u64,
}

impl ShortCodeUsageConfig {
    pub fn ttl(&self) -> Duration {
        secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortCodesConfig {
    /// Length of the cleartext code, in characters.
    pub size: usize,
    pub usages: BTreeMap<ShortCodeUsage, ShortCodeUsageConfig>,
}

impl ShortCodesConfig {
    pub fn usage(&self, usage: ShortCodeUsage) -> Result<&ShortCodeUsageConfig> {
        self.usages.get(&usage).ok_or_else(|| {
            KeywardError::Config(format!("no configuration for short code usage {}", usage))
        })
    }
}

impl Default for ShortCodesConfig {
    fn default() -> Self {
        let usages = ShortCodeUsage::ALL
            .into_iter()
            .map(|usage| (usage, ShortCodeUsageConfig { ttl_secs: HOUR }))
            .collect();
        Self { size: 32, usages }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywardConfig {
    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub short_codes: ShortCodesConfig,

    #[serde(default = "PermissionsConfig::default_hierarchy")]
    pub permissions: PermissionsConfig,

    /// Required permissions per operation. Operations missing here require
    /// no permission at all.
    #[serde(default)]
    pub operations: OperationPermissions,
}

impl Default for KeywardConfig {
    fn default() -> Self {
        Self {
            keys: KeysConfig::default(),
            short_codes: ShortCodesConfig::default(),
            permissions: PermissionsConfig::default_hierarchy(),
            operations: OperationPermissions::new(),
        }
    }
}

impl KeywardConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KeywardError::Config(format!("parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KeywardError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Reject settings that cannot work.
    ///
    /// Role inheritance is checked separately, when the gate resolves it.
    pub fn validate(&self) -> Result<()> {
        for (usage, cfg) in &self.keys.usages {
            if cfg.ttl_secs == 0 || cfg.rotation_secs == 0 {
                return Err(KeywardError::Config(format!(
                    "key usage {}: ttl and rotation must be positive",
                    usage
                )));
            }
            if cfg.ttl_secs > MAX_TTL_SECS {
                return Err(KeywardError::Config(format!(
                    "key usage {}: ttl exceeds {}s",
                    usage, MAX_TTL_SECS
                )));
            }
            if cfg.rotation_secs >= cfg.ttl_secs {
                return Err(KeywardError::Config(format!(
                    "key usage {}: rotation ({}s) must be shorter than ttl ({}s)",
                    usage, cfg.rotation_secs, cfg.ttl_secs
                )));
            }
        }

        if self.keys.source_cache_secs > MAX_TTL_SECS {
            return Err(KeywardError::Config(format!(
                "key source cache exceeds {}s",
                MAX_TTL_SECS
            )));
        }

        if self.short_codes.size == 0 {
            return Err(KeywardError::Config("short code size must be positive".into()));
        }
        for (usage, cfg) in &self.short_codes.usages {
            if cfg.ttl_secs == 0 || cfg.ttl_secs > MAX_TTL_SECS {
                return Err(KeywardError::Config(format!(
                    "short code usage {}: ttl must be between 1s and {}s",
                    usage, MAX_TTL_SECS
                )));
            }
        }

        Ok(())
    }
}

fn secs(value: u64) -> Duration {
    // Clamped so an unvalidated config cannot overflow timestamp arithmetic.
    Duration::seconds(value.min(MAX_TTL_SECS) as i64)
}
