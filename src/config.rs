//! Engine configuration.
//!
//! Project config lives at `.cadence/config.yml`; a global config at
//! `~/.config/cadence/config.yml` supplies machine-wide defaults. Project
//! values override global values, which override built-in defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Extra environment applied under every workflow's own `env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize)]
pub struct DefaultsConfig {
    /// Shell used for `run` steps that don't declare one.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Upper bound on concurrently running job instances.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

#[derive(Debug, Deserialize)]
pub struct RunnerConfig {
    /// Labels this host satisfies; jobs whose `runs-on` matches none of
    /// them are skipped with a warning.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CacheConfig {
    /// Override for the cache directory; `~` is expanded.
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_max_parallel() -> usize {
    4
}

fn default_labels() -> Vec<String> {
    vec![
        "ubuntu-latest".to_string(),
        "self-hosted".to_string(),
        "local".to_string(),
    ]
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            runner: RunnerConfig::default(),
            env: BTreeMap::new(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_merged_from(
            global_config_path().as_deref(),
            Path::new(crate::paths::CONFIG_FILE),
        )
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config")
    }

    /// Load merged configuration from specified global and project config paths.
    /// Project config values override global config values; both are optional.
    pub fn load_merged_from(global_path: Option<&Path>, project_path: &Path) -> Result<Self> {
        let global = global_path
            .filter(|p| p.exists())
            .map(PartialConfig::load_from)
            .transpose()?
            .unwrap_or_default();

        let project = if project_path.exists() {
            PartialConfig::load_from(project_path)?
        } else {
            PartialConfig::default()
        };

        Ok(global.merge_with(project))
    }

    /// Effective cache directory: the configured override or the project
    /// default.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache.dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => PathBuf::from(crate::paths::CACHE_DIR),
        }
    }

    /// Whether this host satisfies a job's `runs-on` labels. Jobs that
    /// request no labels run anywhere.
    pub fn satisfies_labels(&self, requested: &[String]) -> bool {
        requested.is_empty()
            || requested
                .iter()
                .any(|l| self.runner.labels.iter().any(|have| have == l))
    }
}

/// Returns the path to the global config file at ~/.config/cadence/config.yml
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/cadence/config.yml"))
}

/// Partial config for merging - all fields optional
#[derive(Debug, Deserialize, Default)]
struct PartialConfig {
    pub defaults: Option<PartialDefaultsConfig>,
    pub runner: Option<PartialRunnerConfig>,
    pub env: Option<BTreeMap<String, String>>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct PartialDefaultsConfig {
    pub shell: Option<String>,
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct PartialRunnerConfig {
    pub labels: Option<Vec<String>>,
}

impl PartialConfig {
    fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Merge this global config with a project config, returning the merged
    /// result. Values from the project config take precedence.
    fn merge_with(self, project: PartialConfig) -> Config {
        let global_defaults = self.defaults.unwrap_or_default();
        let project_defaults = project.defaults.unwrap_or_default();
        let global_runner = self.runner.unwrap_or_default();
        let project_runner = project.runner.unwrap_or_default();

        // Env maps are unioned, project keys winning.
        let mut env = self.env.unwrap_or_default();
        env.extend(project.env.unwrap_or_default());

        Config {
            defaults: DefaultsConfig {
                shell: project_defaults
                    .shell
                    .or(global_defaults.shell)
                    .unwrap_or_else(default_shell),
                max_parallel: project_defaults
                    .max_parallel
                    .or(global_defaults.max_parallel)
                    .unwrap_or_else(default_max_parallel),
            },
            runner: RunnerConfig {
                labels: project_runner
                    .labels
                    .or(global_runner.labels)
                    .unwrap_or_else(default_labels),
            },
            env,
            cache: project.cache.or(self.cache).unwrap_or_default(),
        }
    }
}
