use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool configuration, distinct from the `Recipe` a build consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub staging: StagingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_builds")]
    pub max_builds: usize,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_directory")]
    pub directory: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            staging: StagingConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_builds: default_max_builds(),
            storage_path: default_storage_path(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            directory: default_staging_directory(),
        }
    }
}

fn default_max_builds() -> usize {
    50
}

fn default_storage_path() -> String {
    "~/.kiln/build_history.json".to_string()
}

fn default_staging_directory() -> String {
    ".kiln/staging".to_string()
}

impl Config {
    /// Project config wins over the global one; both are optional.
    pub fn load(context_dir: &Path) -> anyhow::Result<Self> {
        let project = context_dir.join("kiln.config.toml");
        if project.exists() {
            Self::load_from_file(project)
        } else {
            Self::load_from_file(Self::global_path())
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let expanded = shellexpand::tilde(path.as_ref().to_str().unwrap_or_default());
        let path = Path::new(expanded.as_ref());

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn global_path() -> PathBuf {
        let expanded = shellexpand::tilde("~/.config/kiln/config.toml");
        PathBuf::from(expanded.as_ref())
    }

    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.as_ref())
    }

    pub fn storage_path(&self) -> PathBuf {
        Self::expand_path(&self.history.storage_path)
    }

    /// Staging directory, resolved against the build context when relative.
    pub fn staging_dir(&self, context_dir: &Path) -> PathBuf {
        let expanded = Self::expand_path(&self.staging.directory);
        if expanded.is_absolute() {
            expanded
        } else {
            context_dir.join(expanded)
        }
    }
}
