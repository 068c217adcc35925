//! Relay configuration
//!
//! ```yaml
//! default_kort: "1"
//! korts:
//!   "4711": "1"
//!   "ov-4712": "2"
//! numeric_fields: [PointsPlayerA, PointsPlayerB, TieBreakPlayerA, TieBreakPlayerB]
//! ```
//!
//! YAML is read with `serde_yaml`, which also accepts plain JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::{env, fs};

use crate::error::{RelayError, Result};
use crate::normalizer::{CanonicalField, Normalizer};
use crate::overlay::OverlayKey;

pub const CONFIG_PATH_ENV: &str = "KORT_RELAY_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Overlay hint → kort. Keys may be any hint form and are normalized.
    pub korts: BTreeMap<String, String>,
    /// Kort used when nothing else resolves.
    pub default_kort: String,
    /// Replaces the default numeric allow-list when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_fields: Option<Vec<CanonicalField>>,
}

impl RelayConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: RelayConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RelayError::ConfigNotFound { path: path.display().to_string() });
        }
        let content = fs::read_to_string(path)?;
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json { Self::from_json(&content)? } else { Self::from_yaml(&content)? };
        log::info!(
            "Loaded relay config from {} ({} kort mappings)",
            path.display(),
            config.korts.len()
        );
        Ok(config)
    }

    /// Reads the file named by `KORT_RELAY_CONFIG`; unset or blank means none.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(path) = env::var(CONFIG_PATH_ENV) else {
            return Ok(None);
        };
        let path = path.trim();
        if path.is_empty() {
            return Ok(None);
        }
        Self::from_path(Path::new(path)).map(Some)
    }

    /// Explicit path, then the environment, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        Ok(Self::from_env()?.unwrap_or_default())
    }

    pub fn validate(&self) -> Result<()> {
        self.resolved_korts().map(|_| ())
    }

    /// Kort mapping keyed by canonical overlay key.
    pub fn resolved_korts(&self) -> Result<BTreeMap<OverlayKey, String>> {
        let mut resolved: BTreeMap<OverlayKey, String> = BTreeMap::new();
        for (hint, kort) in &self.korts {
            let key = OverlayKey::normalize(hint)
                .ok_or_else(|| RelayError::InvalidOverlayKey { hint: hint.clone() })?;
            if let Some(existing) = resolved.get(&key) {
                if existing != kort {
                    return Err(RelayError::ConflictingKort {
                        overlay: key.to_string(),
                        first: existing.clone(),
                        second: kort.clone(),
                    });
                }
            }
            resolved.insert(key, kort.clone());
        }
        Ok(resolved)
    }

    pub fn normalizer(&self) -> Normalizer {
        match &self.numeric_fields {
            Some(fields) => Normalizer::with_numeric_fields(fields.iter().copied()),
            None => Normalizer::new(),
        }
    }
}
