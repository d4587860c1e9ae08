use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sluice_core::{DType, Shuffle};

use crate::error::StreamError;

pub const CONFIG_ENV: &str = "SLUICE_CONFIG";
pub const FLOATX_ENV: &str = "SLUICE_FLOATX";
pub const DATA_PATH_ENV: &str = "SLUICE_DATA_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default floating point type for casts and padding masks.
    pub float_x: DType,
    /// Directories searched for relative dataset file names.
    pub data_path: Vec<PathBuf>,
    /// Seed of [`Config::shuffle`], used when a caller asks for shuffling
    /// without naming a seed.
    pub default_seed: u64,
    /// Queue size of a prefetcher built without an explicit capacity.
    pub prefetch_max_batches: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            float_x: DType::F64,
            data_path: Vec::new(),
            default_seed: 1,
            prefetch_max_batches: 100,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Defaults, then the TOML file named by `SLUICE_CONFIG`, then the
    /// `SLUICE_FLOATX` and `SLUICE_DATA_PATH` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// [`Config::load`] for pipeline builders that fall back to configured
    /// defaults.
    pub(crate) fn for_defaults() -> crate::error::Result<Self> {
        Self::load().map_err(|e| StreamError::Config(format!("{e:#}")))
    }

    pub fn shuffle(&self) -> Shuffle {
        Shuffle::from_u64(self.default_seed)
    }

    fn with_env_overrides(
        mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(float_x) = var(FLOATX_ENV) {
            self.float_x = float_x
                .parse()
                .with_context(|| format!("invalid {FLOATX_ENV}"))?;
            if !self.float_x.is_float() {
                anyhow::bail!("{FLOATX_ENV} must be a float type, got {}", self.float_x);
            }
        }
        if let Some(data_path) = var(DATA_PATH_ENV) {
            self.data_path = std::env::split_paths(&data_path).collect();
        }
        Ok(self)
    }
}
