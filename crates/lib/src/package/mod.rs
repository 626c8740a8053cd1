//! Package references and the persisted package record.

pub mod info;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_CHANNEL, MODULE_RUNTIME};

pub use info::PackageInfo;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid package ref '{0}'")]
pub struct RefParseError(pub String);

/// Identifies one module of one package build in the store.
///
/// Equality covers the whole tuple. An empty `version` marks a ref that still
/// has to be resolved against a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
  pub repo: Option<String>,
  pub channel: String,
  pub id: String,
  pub version: String,
  pub arch: String,
  pub module: String,
}

impl PackageRef {
  pub fn new(id: impl Into<String>, version: impl Into<String>, arch: impl Into<String>) -> Self {
    Self {
      repo: None,
      channel: DEFAULT_CHANNEL.to_string(),
      id: id.into(),
      version: version.into(),
      arch: arch.into(),
      module: MODULE_RUNTIME.to_string(),
    }
  }

  pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
    self.channel = channel.into();
    self
  }

  pub fn with_module(mut self, module: impl Into<String>) -> Self {
    self.module = module.into();
    self
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }

  /// `id/version/arch`, used for layer directories and `info.json`.
  pub fn local_ref(&self) -> String {
    format!("{}/{}/{}", self.id, self.version, self.arch)
  }

  /// `channel/id/version/arch/module`, the branch name in the store.
  pub fn store_ref(&self) -> String {
    format!(
      "{}/{}/{}/{}/{}",
      self.channel, self.id, self.version, self.arch, self.module
    )
  }

  /// True when `other` names the same package, ignoring version and repo.
  pub fn same_package(&self, other: &PackageRef) -> bool {
    self.channel == other.channel && self.id == other.id && self.arch == other.arch && self.module == other.module
  }
}

impl fmt::Display for PackageRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.repo {
      Some(repo) => write!(f, "{}:{}", repo, self.store_ref()),
      None => write!(f, "{}", self.store_ref()),
    }
  }
}

impl FromStr for PackageRef {
  type Err = RefParseError;

  /// Accepts `[repo:]` followed by one of
  /// `id`, `id/version`, `id/version/arch`, `id/version/arch/module` or
  /// `channel/id/version/arch/module`. Missing parts stay empty, except the
  /// module which defaults to `runtime`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (repo, rest) = match s.split_once(':') {
      Some((repo, rest)) if !repo.is_empty() => (Some(repo.to_string()), rest),
      Some(_) => return Err(RefParseError(s.to_string())),
      None => (None, s),
    };
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
      return Err(RefParseError(s.to_string()));
    }

    let mut reference = PackageRef::new("", "", "");
    reference.repo = repo;
    match parts.as_slice() {
      [id] => reference.id = id.to_string(),
      [id, version] => {
        reference.id = id.to_string();
        reference.version = version.to_string();
      }
      [id, version, arch] => {
        reference.id = id.to_string();
        reference.version = version.to_string();
        reference.arch = arch.to_string();
      }
      [id, version, arch, module] => {
        reference.id = id.to_string();
        reference.version = version.to_string();
        reference.arch = arch.to_string();
        reference.module = module.to_string();
      }
      [channel, id, version, arch, module] => {
        reference.channel = channel.to_string();
        reference.id = id.to_string();
        reference.version = version.to_string();
        reference.arch = arch.to_string();
        reference.module = module.to_string();
      }
      _ => return Err(RefParseError(s.to_string())),
    }
    Ok(reference)
  }
}

/// Orders dotted version strings component by component.
///
/// Numeric components compare numerically, anything else lexically, and a
/// version that is a prefix of another sorts first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
  let mut left = a.split('.');
  let mut right = b.split('.');
  loop {
    match (left.next(), right.next()) {
      (None, None) => return Ordering::Equal,
      (None, Some(_)) => return Ordering::Less,
      (Some(_), None) => return Ordering::Greater,
      (Some(x), Some(y)) => {
        let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
          (Ok(x), Ok(y)) => x.cmp(&y),
          _ => x.cmp(y),
        };
        if ordering != Ordering::Equal {
          return ordering;
        }
      }
    }
  }
}

/// True when `version` satisfies the possibly partial `wanted` version.
///
/// `1.2` matches `1.2` and `1.2.3`, but not `1.20`.
pub fn version_matches(wanted: &str, version: &str) -> bool {
  wanted.is_empty() || version == wanted || version.starts_with(&format!("{wanted}."))
}
