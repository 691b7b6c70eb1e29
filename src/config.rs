//! Build configuration.
//!
//! A [`ProcessingConfig`] is a plain structure: hosts fill it in (or load it
//! from JSON) and hand it to the driver next to the list of processing units.
//! Two flags can be overridden from the environment. Precedence, lowest to
//! highest:
//!
//! 1. built-in default
//! 2. value set in the configuration
//! 3. environment variable ([`ENV_INCREMENTAL`], [`ENV_WARNINGS_AS_ERRORS`])

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Environment override for [`ProcessingConfig::incremental`].
pub const ENV_INCREMENTAL: &str = "SYMPROC_INCREMENTAL";

/// Environment override for [`ProcessingConfig::warnings_as_errors`].
pub const ENV_WARNINGS_AS_ERRORS: &str = "SYMPROC_WARNINGS_AS_ERRORS";

/// Default bound on the number of rounds.
pub const DEFAULT_MAX_ROUNDS: u32 = 100;

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// Set in the [`ProcessingConfig`].
    Config = 1,
    /// From environment variable (highest precedence).
    EnvVar = 2,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    /// The actual value.
    pub value: T,
    /// Where the value came from.
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

/// The overridable flags after precedence has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFlags {
    pub incremental: ConfigValue<bool>,
    pub warnings_as_errors: ConfigValue<bool>,
}

// ============================================================================
// ProcessingConfig
// ============================================================================

/// Everything the driver needs to know about one module build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Name of the module being built; used in log output.
    pub module_name: String,
    /// Root that source paths are made relative to in persisted state.
    pub project_base_dir: PathBuf,
    /// Directory for lookup stores and incremental maps.
    pub caches_dir: PathBuf,
    /// Output directory per kind of generated file (by extension, e.g.
    /// `"kt"`, `"java"`; `"resources"` for everything else).
    pub output_dirs: BTreeMap<String, PathBuf>,
    pub incremental: bool,
    /// Also write the dirty set and output map of every build to
    /// `caches_dir/logs`.
    pub incremental_log: bool,
    /// Treat warning diagnostics as errors.
    pub warnings_as_errors: bool,
    /// Sources changed since the last build, as reported by the host.
    pub modified_sources: Vec<String>,
    /// Sources deleted since the last build.
    pub removed_sources: Vec<String>,
    /// Qualified names of classpath classes that changed. Files that looked
    /// any of them up are reprocessed.
    pub changed_classes: Vec<String>,
    /// Safety bound on the number of rounds.
    pub max_rounds: u32,
    /// Free-form options handed to every processing unit.
    pub unit_options: BTreeMap<String, String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            module_name: "main".to_string(),
            project_base_dir: PathBuf::new(),
            caches_dir: PathBuf::from("build/symproc/caches"),
            output_dirs: BTreeMap::new(),
            incremental: false,
            incremental_log: false,
            warnings_as_errors: false,
            modified_sources: Vec::new(),
            removed_sources: Vec::new(),
            changed_classes: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            unit_options: BTreeMap::new(),
        }
    }
}

impl ProcessingConfig {
    pub fn new(module_name: impl Into<String>) -> Self {
        ProcessingConfig {
            module_name: module_name.into(),
            ..Self::default()
        }
    }

    pub fn with_project_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_base_dir = dir.into();
        self
    }

    pub fn with_caches_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.caches_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, kind: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.output_dirs.insert(kind.into(), dir.into());
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_incremental_log(mut self, enabled: bool) -> Self {
        self.incremental_log = enabled;
        self
    }

    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn with_modified_sources(
        mut self,
        sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.modified_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_removed_sources(
        mut self,
        sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.removed_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_changed_classes(
        mut self,
        classes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.changed_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_unit_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.unit_options.insert(key.into(), value.into());
        self
    }

    /// Output directory for a generated file, chosen by its extension.
    pub fn output_dir_for(&self, path: &str) -> Option<&Path> {
        let extension = Path::new(path).extension().and_then(|e| e.to_str());
        extension
            .and_then(|ext| self.output_dirs.get(ext))
            .or_else(|| self.output_dirs.get("resources"))
            .map(PathBuf::as_path)
    }

    /// `path` relative to `project_base_dir`; paths outside it are kept as
    /// given. Incremental caches key files by this form.
    pub fn relative_source(&self, path: &str) -> String {
        relative_path(&self.project_base_dir, path)
    }

    /// Check the configuration before a build.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.module_name.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "module_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.caches_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "caches_dir",
                reason: "must not be empty".to_string(),
            });
        }
        if self.caches_dir.exists() && !self.caches_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.caches_dir.clone(),
            });
        }
        if let Some((kind, _)) = self
            .output_dirs
            .iter()
            .find(|(_, dir)| dir.as_path() == self.caches_dir.as_path())
        {
            return Err(ConfigError::InvalidField {
                field: "output_dirs",
                reason: format!("output directory for '{kind}' is the caches directory"),
            });
        }
        if let Some(source) = self
            .removed_sources
            .iter()
            .find(|source| self.modified_sources.contains(source))
        {
            return Err(ConfigError::InvalidField {
                field: "removed_sources",
                reason: format!("'{source}' is listed as both modified and removed"),
            });
        }
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn resolve_flags(&self) -> ConfigResult<ResolvedFlags> {
        self.resolve_flags_from(|var| std::env::var(var).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn resolve_flags_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<ResolvedFlags> {
        let defaults = ProcessingConfig::default();
        let incremental = flag(self.incremental, defaults.incremental, ENV_INCREMENTAL, &lookup)?;
        let warnings_as_errors = flag(
            self.warnings_as_errors,
            defaults.warnings_as_errors,
            ENV_WARNINGS_AS_ERRORS,
            &lookup,
        )?;
        Ok(ResolvedFlags {
            incremental,
            warnings_as_errors,
        })
    }

    /// Copy of this configuration with environment overrides applied.
    pub fn with_env_overrides(&self) -> ConfigResult<ProcessingConfig> {
        let flags = self.resolve_flags()?;
        Ok(ProcessingConfig {
            incremental: flags.incremental.value,
            warnings_as_errors: flags.warnings_as_errors.value,
            ..self.clone()
        })
    }
}

fn flag(
    configured: bool,
    default: bool,
    var: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConfigResult<ConfigValue<bool>> {
    let source = if configured == default {
        ConfigSource::Default
    } else {
        ConfigSource::Config
    };
    let value = ConfigValue::new(configured, source);
    match lookup(var) {
        Some(raw) => {
            let parsed = parse_bool(&raw).ok_or(ConfigError::InvalidEnv { var, value: raw })?;
            Ok(value.merge(ConfigValue::new(parsed, ConfigSource::EnvVar)))
        }
        None => Ok(value),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `path` relative to `base`, or `path` itself if it lies outside `base`.
pub fn relative_path(base: &Path, path: &str) -> String {
    Path::new(path)
        .strip_prefix(base)
        .ok()
        .and_then(Path::to_str)
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    mod validate_tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn default_is_valid() {
            assert!(ProcessingConfig::default().validate().is_ok());
        }

        #[test]
        fn zero_rounds_rejected() {
            let err = ProcessingConfig::new("app").with_max_rounds(0).validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidField { field: "max_rounds", .. }));
        }

        #[test]
        fn blank_module_name_rejected() {
            let err = ProcessingConfig::new("  ").validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidField { field: "module_name", .. }));
        }

        #[test]
        fn caches_dir_must_be_a_directory() {
            let temp = TempDir::new().unwrap();
            let file = temp.path().join("caches");
            std::fs::write(&file, b"").unwrap();
            let err = ProcessingConfig::new("app").with_caches_dir(&file).validate().unwrap_err();
            assert!(matches!(err, ConfigError::NotADirectory { .. }));
        }

        #[test]
        fn output_dir_may_not_be_caches_dir() {
            let config = ProcessingConfig::new("app")
                .with_caches_dir("build/c")
                .with_output_dir("kt", "build/c");
            assert!(config.validate().is_err());
        }

        #[test]
        fn modified_and_removed_overlap_rejected() {
            let config = ProcessingConfig::new("app")
                .with_modified_sources(["a.kt"])
                .with_removed_sources(["a.kt"]);
            assert!(config.validate().is_err());
        }
    }

    mod flag_tests {
        use super::*;

        #[test]
        fn defaults_without_env() {
            let flags = ProcessingConfig::default().resolve_flags_from(no_env).unwrap();
            assert!(!flags.incremental.value);
            assert_eq!(flags.incremental.source, ConfigSource::Default);
        }

        #[test]
        fn config_value_tracked() {
            let flags = ProcessingConfig::default()
                .with_incremental(true)
                .resolve_flags_from(no_env)
                .unwrap();
            assert_eq!(flags.incremental, ConfigValue::new(true, ConfigSource::Config));
        }

        #[test]
        fn env_overrides_config() {
            let config = ProcessingConfig::default().with_incremental(true);
            let flags = config
                .resolve_flags_from(|var| (var == ENV_INCREMENTAL).then(|| "off".to_string()))
                .unwrap();
            assert_eq!(flags.incremental, ConfigValue::new(false, ConfigSource::EnvVar));
            assert_eq!(flags.warnings_as_errors.source, ConfigSource::Default);
        }

        #[test]
        fn unparsable_env_rejected() {
            let err = ProcessingConfig::default()
                .resolve_flags_from(|var| {
                    (var == ENV_WARNINGS_AS_ERRORS).then(|| "maybe".to_string())
                })
                .unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidEnv { var: ENV_WARNINGS_AS_ERRORS, .. }
            ));
        }

        #[test]
        fn merge_prefers_higher_source() {
            let low = ConfigValue::new(1, ConfigSource::Default);
            let high = ConfigValue::new(2, ConfigSource::EnvVar);
            assert_eq!(low.clone().merge(high.clone()).value, 2);
            assert_eq!(high.merge(low).value, 2);
        }
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn missing_fields_take_defaults() {
            let config: ProcessingConfig =
                serde_json::from_str(r#"{"module_name": "app", "incremental": true}"#).unwrap();
            assert_eq!(config.module_name, "app");
            assert!(config.incremental);
            assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
        }

        #[test]
        fn output_dir_by_extension() {
            let config = ProcessingConfig::new("app")
                .with_output_dir("kt", "gen/kotlin")
                .with_output_dir("resources", "gen/res");
            assert_eq!(config.output_dir_for("a/B.kt"), Some(Path::new("gen/kotlin")));
            assert_eq!(config.output_dir_for("META-INF/x.txt"), Some(Path::new("gen/res")));
        }

        #[test]
        fn relative_source_strips_base_dir() {
            let config = ProcessingConfig::new("app").with_project_base_dir("/work/app");
            assert_eq!(config.relative_source("/work/app/src/A.kt"), "src/A.kt");
            assert_eq!(config.relative_source("/elsewhere/B.kt"), "/elsewhere/B.kt");
            assert_eq!(config.relative_source("src/C.kt"), "src/C.kt");
        }
    }
}
