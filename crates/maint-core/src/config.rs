//! Engine configuration and system snapshots
//!
//! Both are TOML documents:
//!
//! ```toml
//! # maint.toml
//! assume_yes = false
//! snapshot = "/etc/maint/snapshot.toml"
//!
//! [log]
//! filter = "info"
//! json = false
//! ```
//!
//! ```toml
//! # snapshot.toml
//! upgrade_in_progress = "6.4"
//!
//! [features.satellite]
//! version = "6.3.2"
//!
//! [features.pulp]
//! probe_error = "rpm database locked"
//! ```

use crate::error::ConfigError;
use crate::state::{SessionContext, StaticFeatureRegistry, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Answer every confirmation with yes
    pub assume_yes: bool,
    /// Path of the system snapshot
    pub snapshot: Option<PathBuf>,
    /// Logging
    pub log: LogConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path)?)
    }

    /// With assume-yes
    #[inline]
    #[must_use]
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// With snapshot path
    #[inline]
    #[must_use]
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// With log filter
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log.filter = filter.into();
        self
    }
}

/// One feature entry of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureSnapshot {
    /// Installed version
    pub version: Option<String>,
    /// Make probes of this feature fail with this reason
    pub probe_error: Option<String>,
}

/// Captured system state: installed features and the upgrade marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    /// Upgrade in progress, if any
    pub upgrade_in_progress: Option<String>,
    /// Installed features by name
    pub features: BTreeMap<String, FeatureSnapshot>,
}

impl SystemSnapshot {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path)?)
    }

    /// Build the feature registry this snapshot describes
    pub fn feature_registry(&self) -> Result<StaticFeatureRegistry, ConfigError> {
        let mut registry = StaticFeatureRegistry::new();
        for (name, feature) in &self.features {
            if let Some(reason) = &feature.probe_error {
                registry = registry.with_failing_probe(name, reason);
                continue;
            }
            let version = feature
                .version
                .as_deref()
                .map(Version::parse)
                .transpose()
                .map_err(|source| ConfigError::InvalidVersion {
                    feature: name.clone(),
                    source,
                })?;
            registry.insert(name, version);
        }
        Ok(registry)
    }

    /// Build the session this snapshot describes
    #[must_use]
    pub fn session(&self, config: &EngineConfig) -> SessionContext {
        let session = SessionContext::new().with_assume_yes(config.assume_yes);
        match &self.upgrade_in_progress {
            Some(version) => session.with_upgrade_in_progress(version.clone()),
            None => session,
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FeatureRegistry;
    use std::io::Write;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.log.filter, "info");
        assert!(!config.assume_yes);
    }

    #[test]
    fn engine_config_parses_sections() {
        let config = EngineConfig::from_toml_str(
            "assume_yes = true\nsnapshot = \"/tmp/s.toml\"\n[log]\nfilter = \"debug\"\njson = true\n",
        )
        .unwrap();
        assert!(config.assume_yes);
        assert_eq!(config.snapshot.as_deref(), Some(Path::new("/tmp/s.toml")));
        assert!(config.log.json);
    }

    #[test]
    fn engine_config_rejects_bad_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("assume_yes = \"maybe\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn snapshot_builds_registry_and_session() {
        let snapshot = SystemSnapshot::from_toml_str(
            r#"
upgrade_in_progress = "6.4"

[features.satellite]
version = "6.3.2"

[features.pulp]
probe_error = "rpm database locked"
"#,
        )
        .unwrap();

        let registry = snapshot.feature_registry().unwrap();
        let sat = registry.probe("satellite").unwrap().unwrap();
        assert_eq!(sat.current_minor_version().as_deref(), Some("6.3"));
        assert!(registry.probe("pulp").is_err());

        let session = snapshot.session(&EngineConfig::new().with_assume_yes(true));
        assert_eq!(session.upgrade_in_progress(), Some("6.4"));
        assert!(session.assume_yes());
    }

    #[test]
    fn snapshot_rejects_bad_version() {
        let snapshot =
            SystemSnapshot::from_toml_str("[features.satellite]\nversion = \"six\"\n").unwrap();
        assert!(matches!(
            snapshot.feature_registry(),
            Err(ConfigError::InvalidVersion { feature, .. }) if feature == "satellite"
        ));
    }

    #[test]
    fn load_reads_files_and_reports_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "assume_yes = true").unwrap();
        assert!(EngineConfig::load(file.path()).unwrap().assume_yes);

        assert!(matches!(
            EngineConfig::load(Path::new("/nonexistent/maint.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
