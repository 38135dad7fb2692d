use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::telemetry::ForecastTelemetry;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "mealcast.toml";

/// Workspace configuration loaded from `mealcast.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MealcastConfig {
    /// Dataset and artifact locations.
    pub paths: PathsConfig,
    /// Logging and event sinks.
    pub telemetry: TelemetryConfig,
    /// HTTP service settings.
    pub server: ServerConfig,
    #[serde(skip)]
    source_dir: PathBuf,
}

/// Dataset and artifact locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Historical attendance CSV.
    pub dataset: PathBuf,
    /// Directory holding models, schema and metrics.
    pub artifacts: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data/attendance.csv"),
            artifacts: PathBuf::from("artifacts"),
        }
    }
}

/// Logging and event sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// JSON-lines log file; logging is off when unset.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file; events are off when unset.
    pub event_log: Option<PathBuf>,
    /// Lowest level written to the log.
    pub min_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_path: Some(PathBuf::from("logs/mealcast.log.jsonl")),
            event_log: None,
            min_level: "info".into(),
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
        }
    }
}

impl MealcastConfig {
    /// Loads a TOML file; relative paths inside it resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.telemetry.min_level()?;
        config.source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Loads `explicit` when given, else `mealcast.toml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Resolves a configured path relative to the config file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() || self.source_dir.as_os_str().is_empty() {
            candidate.to_path_buf()
        } else {
            self.source_dir.join(candidate)
        }
    }

    /// Resolved dataset path.
    #[must_use]
    pub fn dataset_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.dataset)
    }

    /// Resolved artifact directory.
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.artifacts)
    }

    /// Builds the telemetry handle described by the `[telemetry]` section.
    pub fn telemetry(&self, module: &str) -> Result<ForecastTelemetry> {
        let mut builder = ForecastTelemetry::builder(module).min_level(self.telemetry.min_level()?);
        if let Some(path) = &self.telemetry.log_path {
            builder = builder.log_path(self.resolve_path(path));
        }
        if let Some(path) = &self.telemetry.event_log {
            let publisher = FileEventPublisher::new(self.resolve_path(path))?;
            builder = builder.event_publisher(Arc::new(publisher));
        }
        builder.build()
    }
}

impl TelemetryConfig {
    /// Parsed minimum level.
    pub fn min_level(&self) -> Result<LogLevel> {
        self.min_level
            .parse()
            .with_context(|| format!("telemetry.min_level `{}`", self.min_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults_and_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mealcast.toml");
        fs::write(
            &path,
            "[paths]\nartifacts = \"models\"\n\n[server]\nbind = \"127.0.0.1:8080\"\n",
        )
        .unwrap();
        let config = MealcastConfig::load(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.artifacts_dir(), dir.path().join("models"));
        assert_eq!(config.dataset_path(), dir.path().join("data/attendance.csv"));
        assert_eq!(config.telemetry.min_level().unwrap(), LogLevel::Info);
    }

    #[test]
    fn rejects_unknown_log_levels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[telemetry]\nmin_level = \"chatty\"\n").unwrap();
        assert!(MealcastConfig::load(&path).is_err());
    }

    #[test]
    fn defaults_use_working_directory_paths() {
        let config = MealcastConfig::default();
        assert_eq!(config.artifacts_dir(), PathBuf::from("artifacts"));
        assert_eq!(config.server.bind, "0.0.0.0:5000");
    }
}
