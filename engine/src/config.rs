use serde::Deserialize;
use std::path::{Path, PathBuf};

// Default value function for serde (bool::default() is false, so only true needs a fn)
pub(crate) const fn default_true() -> bool {
    true
}

/// Raw `config.toml` contents.
///
/// ```toml
/// [tools]
/// require_approval = true
/// enable_multi_step = true
/// max_iterations = 10
///
/// [tools.approval]
/// allowlist = ["filesystem.read_file"]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ToolgateConfig {
    pub tools: Option<ToolsConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Tool-use policy.
#[derive(Debug, Deserialize)]
pub struct ToolsConfig {
    /// Ask the operator before running tools that are not allow-listed. Default: true.
    #[serde(default = "default_true")]
    pub require_approval: bool,
    /// Let the model chain tool rounds within one turn. Default: true.
    #[serde(default = "default_true")]
    pub enable_multi_step: bool,
    /// Ceiling on tool rounds per user turn. Default: 10.
    pub max_iterations: Option<u32>,
    pub approval: Option<ToolApprovalConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            require_approval: true,
            enable_multi_step: true,
            max_iterations: None,
            approval: None,
        }
    }
}

/// Global allow-list applied to every conversation.
#[derive(Debug, Default, Deserialize)]
pub struct ToolApprovalConfig {
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl ToolgateConfig {
    /// Load from the default location. `Ok(None)` when no config file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".toolgate").join("config.toml"))
}
