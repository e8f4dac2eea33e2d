//! Workspace configuration and logging setup for Kiln.
//!
//! Configuration lives in a TOML manifest at the workspace root:
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [build]
//! max_error_count = 50
//!
//! [[project]]
//! name = "app"
//! source_root = "app/src"
//! build_root = "app/build"
//! classpath = ["lib/util.jar"]
//! depends_on = ["core"]
//! ```

mod logging;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

/// Environment variable overriding config discovery.
pub const KILN_CONFIG_ENV_VAR: &str = "KILN_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,

    /// Workspace projects in declaration order.
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Retryable failures tolerated in one build before it is interrupted.
    #[serde(default = "BuildConfig::default_max_error_count")]
    pub max_error_count: usize,

    /// Pending sets larger than this are ordered topologically.
    #[serde(default = "BuildConfig::default_sort_threshold")]
    pub sort_threshold: usize,

    /// Seeds tried when searching for the smallest cycle to break.
    #[serde(default = "BuildConfig::default_cycle_probe_limit")]
    pub cycle_probe_limit: usize,

    #[serde(default = "BuildConfig::default_source_extension")]
    pub source_extension: String,

    #[serde(default = "BuildConfig::default_artifact_extension")]
    pub artifact_extension: String,
}

impl BuildConfig {
    fn default_max_error_count() -> usize {
        100
    }

    fn default_sort_threshold() -> usize {
        2
    }

    fn default_cycle_probe_limit() -> usize {
        16
    }

    fn default_source_extension() -> String {
        "java".to_owned()
    }

    fn default_artifact_extension() -> String {
        "class".to_owned()
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_error_count: Self::default_max_error_count(),
            sort_threshold: Self::default_sort_threshold(),
            cycle_probe_limit: Self::default_cycle_probe_limit(),
            source_extension: Self::default_source_extension(),
            artifact_extension: Self::default_artifact_extension(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Binary-name prefixes never tracked as project-local dependencies.
    #[serde(default = "DependenciesConfig::default_system_prefixes")]
    pub system_prefixes: Vec<String>,
}

impl DependenciesConfig {
    fn default_system_prefixes() -> Vec<String> {
        ["java.", "javax.", "jdk.", "sun.", "com.sun."]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            system_prefixes: Self::default_system_prefixes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    /// Library class directories and `.jar`/`.zip` archives.
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// Names of projects this one depends on, in lookup order.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message but not the source snippet.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl KilnConfig {
    /// Parses a manifest; relative project paths resolve against `base`.
    pub fn from_toml_str(text: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: KilnConfig = toml::from_str(text)?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text, base)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for project in &mut self.projects {
            resolve(&mut project.source_root);
            resolve(&mut project.build_root);
            project.classpath.iter_mut().for_each(resolve);
        }
        if let Some(file) = self.logging.file.as_mut() {
            resolve(file);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.max_error_count == 0 {
            return Err(ConfigError::Invalid(
                "build.max_error_count must be at least 1".to_owned(),
            ));
        }
        if self.build.cycle_probe_limit == 0 {
            return Err(ConfigError::Invalid(
                "build.cycle_probe_limit must be at least 1".to_owned(),
            ));
        }

        let mut names = HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                return Err(ConfigError::Invalid("project name must not be empty".to_owned()));
            }
            if !names.insert(project.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate project `{}`",
                    project.name
                )));
            }
        }
        for project in &self.projects {
            for dep in &project.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "project `{}` depends on unknown project `{dep}`",
                        project.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Locate the config file for a workspace.
///
/// 1) `KILN_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `kiln.toml` in `workspace_root`
/// 3) `.kiln.toml` in `workspace_root`
/// 4) `.kiln/config.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(KILN_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path);
    }

    ["kiln.toml", ".kiln.toml", ".kiln/config.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
}

/// Load the configuration for a workspace root.
///
/// If no config is present, returns [`KilnConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(KilnConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((KilnConfig::default(), None));
    };

    let config = KilnConfig::load_from_path(&path)?;
    tracing::debug!(target = "kiln.config", path = %path.display(), "loaded workspace config");
    Ok((config, Some(path)))
}
