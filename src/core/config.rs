//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{FidxError, Result};
use crate::core::paths::home_dir;
use crate::index::tree::{DEFAULT_ORDER, MIN_ORDER};

/// Full fidx configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub loader: LoaderConfig,
    pub walker: WalkerSettings,
    pub log: LogConfig,
    pub paths: PathsConfig,
}

/// Tree shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum children per internal node; leaves hold `order - 1` entries.
    pub order: usize,
}

/// Bulk-load pipeline sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Insertion worker threads.
    pub workers: usize,
    /// Records each worker buffers before taking the tree lock.
    pub batch_size: usize,
    /// Capacity of the bounded producer → worker channel.
    pub channel_capacity: usize,
}

/// Directory walk policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalkerSettings {
    /// Maximum directory depth below the root; `None` walks everything.
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
    /// Index directories below the root alongside regular files.
    pub include_directories: bool,
    pub excluded_paths: Vec<PathBuf>,
}

/// JSONL activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

/// Filesystem paths used by fidx.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, |n| n.get().clamp(1, 8)),
            batch_size: 50,
            channel_capacity: 1_000,
        }
    }
}

impl Default for WalkerSettings {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_symlinks: false,
            include_directories: true,
            excluded_paths: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: home_dir()
                .join(".local")
                .join("share")
                .join("fidx")
                .join("activity.jsonl"),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: home_dir().join(".config").join("fidx").join("config.toml"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| FidxError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(FidxError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic FNV-1a hash of the effective config, for log correlation.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        set_usize(&mut lookup, "FIDX_INDEX_ORDER", &mut self.index.order)?;
        set_usize(&mut lookup, "FIDX_LOADER_WORKERS", &mut self.loader.workers)?;
        set_usize(&mut lookup, "FIDX_LOADER_BATCH_SIZE", &mut self.loader.batch_size)?;
        set_usize(
            &mut lookup,
            "FIDX_LOADER_CHANNEL_CAPACITY",
            &mut self.loader.channel_capacity,
        )?;

        if let Some(raw) = lookup("FIDX_WALKER_MAX_DEPTH") {
            self.walker.max_depth = Some(parse_env("FIDX_WALKER_MAX_DEPTH", &raw)?);
        }
        set_bool(
            &mut lookup,
            "FIDX_WALKER_FOLLOW_SYMLINKS",
            &mut self.walker.follow_symlinks,
        )?;
        set_bool(
            &mut lookup,
            "FIDX_WALKER_INCLUDE_DIRECTORIES",
            &mut self.walker.include_directories,
        )?;

        set_bool(&mut lookup, "FIDX_LOG_ENABLED", &mut self.log.enabled)?;
        if let Some(raw) = lookup("FIDX_LOG_PATH") {
            self.log.path = PathBuf::from(raw);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.index.order < MIN_ORDER {
            return Err(FidxError::InvalidConfig {
                details: format!("index.order must be >= {MIN_ORDER}, got {}", self.index.order),
            });
        }
        for (name, value) in [
            ("loader.workers", self.loader.workers),
            ("loader.batch_size", self.loader.batch_size),
            ("loader.channel_capacity", self.loader.channel_capacity),
        ] {
            if value == 0 {
                return Err(FidxError::InvalidConfig {
                    details: format!("{name} must be >= 1"),
                });
            }
        }
        if self.log.enabled && self.log.max_size_bytes == 0 {
            return Err(FidxError::InvalidConfig {
                details: "log.max_size_bytes must be > 0 when logging is enabled".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_usize<F>(lookup: &mut F, name: &str, slot: &mut usize) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| FidxError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
