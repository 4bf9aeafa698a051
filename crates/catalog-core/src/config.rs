use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Upper bound for the watcher debounce window.
pub const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Log levels accepted in `[logging] level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "SKILL_CATALOG_";

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub skills: SkillsConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
}

impl CatalogConfig {
    /// Load configuration from the default path (~/.config/skill-catalog/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path();
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write current configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(write_err)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skill-catalog")
            .join("config.toml")
    }

    /// Apply `SKILL_CATALOG_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
    }

    /// Apply overrides from an arbitrary lookup (keys without prefix).
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DIR") {
            self.skills.dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("HOT_RELOAD") {
            match parse_bool(&raw) {
                Some(enabled) => self.watch.enabled = enabled,
                None => tracing::warn!("Ignoring {}HOT_RELOAD={:?}: not a boolean", ENV_PREFIX, raw),
            }
        }
        if let Some(raw) = lookup("DEBOUNCE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.watch.debounce_ms = ms,
                Err(_) => {
                    tracing::warn!("Ignoring {}DEBOUNCE_MS={:?}: not an integer", ENV_PREFIX, raw)
                }
            }
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
    }

    /// Check settings that can't be expressed in the type system.
    ///
    /// Every problem is reported, not just the first one found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        let dir = &self.skills.dir;

        if !dir.exists() {
            problems.push(format!(
                "Skills directory does not exist: {}\n    Create it with: mkdir -p {}",
                dir.display(),
                dir.display()
            ));
        } else if !dir.is_dir() {
            problems.push(format!("Skills path is not a directory: {}", dir.display()));
        }

        if self.watch.debounce_ms > MAX_DEBOUNCE_MS {
            problems.push(format!(
                "Debounce must be at most {} ms, got: {}",
                MAX_DEBOUNCE_MS, self.watch.debounce_ms
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            problems.push(format!(
                "Invalid log level: {}\n    Valid levels: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Where skills are loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Root directory; each skill lives in its own direct subfolder.
    pub dir: PathBuf,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./skills"),
        }
    }
}

/// Hot-reload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Reload automatically when SKILL.md files change.
    pub enabled: bool,
    /// Quiet period after the last relevant change before reloading.
    pub debounce_ms: u64,
    /// What a rescan that finds no skill folders does to the catalog.
    pub on_empty: EmptyScanPolicy,
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            on_empty: EmptyScanPolicy::Retain,
        }
    }
}

/// Behavior when a rescan discovers zero skill folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyScanPolicy {
    /// Keep serving the last snapshot that had skills.
    #[default]
    Retain,
    /// Empty the catalog.
    Clear,
}

/// Log output settings for the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_serializes() {
        let config = CatalogConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("debounce_ms = 500"));
        assert!(toml_str.contains("on_empty = \"retain\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = CatalogConfig::default();
        config.watch.on_empty = EmptyScanPolicy::Clear;
        config.logging.json = true;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: CatalogConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: CatalogConfig = toml::from_str("[watch]\ndebounce_ms = 250\n").unwrap();
        assert_eq!(parsed.watch.debounce_ms, 250);
        assert!(parsed.watch.enabled);
        assert_eq!(parsed.skills.dir, PathBuf::from("./skills"));
        assert_eq!(parsed.watch.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_from_and_save_to() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = CatalogConfig::default();
        config.skills.dir = tmp.path().to_path_buf();
        config.save_to(&path).unwrap();

        let loaded = CatalogConfig::load_from(&path).unwrap();
        assert_eq!(loaded.skills.dir, tmp.path());
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[watch\n").unwrap();
        let err = CatalogConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DIR", "/srv/skills"),
            ("HOT_RELOAD", "off"),
            ("DEBOUNCE_MS", "1200"),
            ("LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();
        let mut config = CatalogConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.skills.dir, PathBuf::from("/srv/skills"));
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.debounce_ms, 1200);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_malformed_overrides_are_ignored() {
        let mut config = CatalogConfig::default();
        config.apply_overrides(|key| match key {
            "HOT_RELOAD" => Some("maybe".into()),
            "DEBOUNCE_MS" => Some("soon".into()),
            _ => None,
        });
        assert_eq!(config, CatalogConfig::default());
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = CatalogConfig::default();
        config.skills.dir = PathBuf::from("/definitely/not/here");
        config.watch.debounce_ms = MAX_DEBOUNCE_MS + 1;
        config.logging.level = "loud".into();

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => assert_eq!(problems.len(), 3),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_accepts_existing_dir() {
        let tmp = TempDir::new().unwrap();
        let mut config = CatalogConfig::default();
        config.skills.dir = tmp.path().to_path_buf();
        assert!(config.validate().is_ok());
    }
}
