//! Builder configuration.
//!
//! `BuilderConfig` is an explicit value handed to every component. It is read
//! from `$XDG_CONFIG_HOME/llbuild/builder.yaml` when present, missing keys take
//! their defaults, and a few `LLBUILD_*` environment variables override the
//! result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILE, DEFAULT_CHANNEL};
use crate::platform::host_arch;
use crate::platform::paths::{cache_dir, config_dir, data_dir};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid config file {path}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BuilderConfig {
  /// Local package store.
  pub repo_path: PathBuf,

  /// Where base layers are checked out, one directory per local ref.
  pub layers_dir: PathBuf,

  /// Download cache for archive and file sources.
  pub archive_cache: PathBuf,

  /// Directory holding `linglong.yaml`.
  pub project_root: PathBuf,

  pub remote_endpoint: String,
  pub remote_repo_name: String,
  pub channel: String,

  /// Sandbox-init program, resolved through `PATH`.
  pub sandbox_init: String,
  pub overlay_program: String,
  pub fetch_git_helper: PathBuf,
  pub fetch_dsc_helper: PathBuf,

  /// Launcher written into rewritten desktop entries.
  pub run_wrapper: String,

  pub mount_timeout_secs: u64,
  pub result_timeout_secs: u64,
  pub keep_container: bool,
  pub target_arch: String,
}

impl Default for BuilderConfig {
  fn default() -> Self {
    Self {
      repo_path: data_dir().join("repo"),
      layers_dir: cache_dir().join("layers"),
      archive_cache: cache_dir().join("archives"),
      project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
      remote_endpoint: "https://mirror-repo-linglong.deepin.com".to_string(),
      remote_repo_name: "repo".to_string(),
      channel: DEFAULT_CHANNEL.to_string(),
      sandbox_init: "ll-box".to_string(),
      overlay_program: "fuse-overlayfs".to_string(),
      fetch_git_helper: PathBuf::from("/usr/libexec/linglong/fetch-git-repo"),
      fetch_dsc_helper: PathBuf::from("/usr/libexec/linglong/fetch-dsc-repo"),
      run_wrapper: "ll-cli".to_string(),
      mount_timeout_secs: 10,
      result_timeout_secs: 5,
      keep_container: false,
      target_arch: host_arch(),
    }
  }
}

impl BuilderConfig {
  /// Default config file location.
  pub fn default_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
  }

  /// Loads the configuration.
  ///
  /// An explicit `path` must exist. Without one, the default location is used
  /// when present and defaults otherwise. Environment overrides apply last.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None => {
        let path = Self::default_path();
        if path.is_file() {
          Self::from_file(&path)?
        } else {
          debug!(path = ?path, "no config file, using defaults");
          Self::default()
        }
      }
    };
    config.apply_env();
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    // An empty document deserializes to unit, not to a struct of defaults.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  fn apply_env(&mut self) {
    if let Ok(path) = std::env::var("LLBUILD_REPO") {
      self.repo_path = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("LLBUILD_LAYERS") {
      self.layers_dir = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("LLBUILD_ARCHIVE_CACHE") {
      self.archive_cache = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("LLBUILD_PROJECT_ROOT") {
      self.project_root = PathBuf::from(path);
    }
    if let Ok(endpoint) = std::env::var("LLBUILD_REMOTE_ENDPOINT") {
      self.remote_endpoint = endpoint;
    }
    if let Ok(name) = std::env::var("LLBUILD_REMOTE_NAME") {
      self.remote_repo_name = name;
    }
    if let Ok(program) = std::env::var("LLBUILD_SANDBOX_INIT") {
      self.sandbox_init = program;
    }
    if let Ok(value) = std::env::var("LLBUILD_KEEP_CONTAINER") {
      self.keep_container = matches!(value.as_str(), "1" | "true" | "yes");
    }
  }

  /// URL of the configured remote repository.
  pub fn remote_url(&self) -> String {
    format!(
      "{}/repos/{}",
      self.remote_endpoint.trim_end_matches('/'),
      self.remote_repo_name
    )
  }

  pub fn mount_timeout(&self) -> Duration {
    Duration::from_secs(self.mount_timeout_secs)
  }

  pub fn result_timeout(&self) -> Duration {
    Duration::from_secs(self.result_timeout_secs)
  }
}
