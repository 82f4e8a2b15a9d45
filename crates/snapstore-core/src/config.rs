//! Container and store configuration
//!
//! Loaded from TOML with every field defaulted, then layered with
//! `SNAPSTORE_*` environment overrides.
//!
//! ```toml
//! history_depth = 8
//! sweep_interval_secs = 30
//! log_profile = "development"
//!
//! [[stores]]
//! store_id = "tasks"
//! default_category = "task"
//! accepted_categories = ["task", "subtask"]
//! require_category = true
//! default_ttl_secs = 3600
//! default_tags = ["workspace"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{Result, SnapStoreError};
use crate::logging_facility::Profile;
use crate::model::{Category, MetadataOverrides, StoreId};

pub const ENV_HISTORY_DEPTH: &str = "SNAPSTORE_HISTORY_DEPTH";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "SNAPSTORE_SWEEP_INTERVAL_SECS";
pub const ENV_LOG_PROFILE: &str = "SNAPSTORE_LOG_PROFILE";

const DEFAULT_HISTORY_DEPTH: usize = 8;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Previous versions retained per snapshot id
    pub history_depth: usize,
    /// Period of the background sweeper; 0 disables it
    pub sweep_interval_secs: u64,
    pub log_profile: Profile,
    pub stores: Vec<StoreConfig>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            log_profile: Profile::default(),
            stores: Vec::new(),
        }
    }
}

impl ContainerConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `Config` when the document does not parse or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ContainerConfig = toml::from_str(contents)
            .map_err(|e| config_error(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns `Config` when the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| config_error(format!("failed to read {}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `SNAPSTORE_*` overrides from the process environment
    ///
    /// # Errors
    ///
    /// Returns `Config` when a set variable does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns `Config` when a set variable does not parse.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_HISTORY_DEPTH) {
            self.history_depth = raw
                .trim()
                .parse()
                .map_err(|e| config_error(format!("{ENV_HISTORY_DEPTH}={raw}: {e}")))?;
        }
        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            self.sweep_interval_secs = raw
                .trim()
                .parse()
                .map_err(|e| config_error(format!("{ENV_SWEEP_INTERVAL_SECS}={raw}: {e}")))?;
        }
        if let Some(raw) = lookup(ENV_LOG_PROFILE) {
            self.log_profile = raw
                .parse()
                .map_err(|e: String| config_error(format!("{ENV_LOG_PROFILE}: {e}")))?;
        }
        Ok(())
    }

    /// Sweep period, or `None` when disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// # Errors
    ///
    /// Returns `Config` on duplicate store ids or an invalid store entry.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for store in &self.stores {
            if !seen.insert(&store.store_id) {
                return Err(config_error(format!(
                    "store '{}' is declared more than once",
                    store.store_id
                )));
            }
            store.validate()?;
        }
        Ok(())
    }
}

/// Settings for one snapshot store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub store_id: StoreId,
    #[serde(default)]
    pub default_category: Option<Category>,
    /// Categories accepted on create/update; empty accepts any
    #[serde(default)]
    pub accepted_categories: BTreeSet<Category>,
    /// Reject snapshots whose category resolves to none
    #[serde(default)]
    pub require_category: bool,
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
    #[serde(default)]
    pub default_tags: BTreeSet<String>,
    /// Overrides the container-wide history depth
    #[serde(default)]
    pub history_depth: Option<usize>,
}

impl StoreConfig {
    pub fn new(store_id: impl Into<StoreId>) -> Self {
        Self {
            store_id: store_id.into(),
            default_category: None,
            accepted_categories: BTreeSet::new(),
            require_category: false,
            default_ttl_secs: None,
            default_tags: BTreeSet::new(),
            history_depth: None,
        }
    }

    pub fn with_default_category(mut self, category: impl Into<Category>) -> Self {
        self.default_category = Some(category.into());
        self
    }

    pub fn accept(mut self, category: impl Into<Category>) -> Self {
        self.accepted_categories.insert(category.into());
        self
    }

    pub fn require_category(mut self) -> Self {
        self.require_category = true;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tags.insert(tag.into());
        self
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = Some(depth);
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Defaults layered under caller overrides on create
    pub fn default_metadata(&self) -> MetadataOverrides {
        MetadataOverrides::new().with_tags(self.default_tags.iter().cloned())
    }

    pub fn accepts(&self, category: &Category) -> bool {
        self.accepted_categories.is_empty() || self.accepted_categories.contains(category)
    }

    /// # Errors
    ///
    /// Returns `Config` when the default category is not accepted.
    pub fn validate(&self) -> Result<()> {
        if self.store_id.as_str().trim().is_empty() {
            return Err(config_error("store_id cannot be empty".to_string()));
        }
        if let Some(default) = &self.default_category {
            if !self.accepts(default) {
                return Err(config_error(format!(
                    "store '{}': default category '{}' is not in accepted_categories",
                    self.store_id, default
                )));
            }
        }
        Ok(())
    }
}

fn config_error(message: String) -> SnapStoreError {
    SnapStoreError::Config { message }
}
