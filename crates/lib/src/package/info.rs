//! The `info.json` record written beside every committed module.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageInfo {
  pub appid: String,
  pub name: String,
  pub version: String,
  pub arch: Vec<String>,
  pub kind: String,
  pub module: String,
  /// Local ref of the runtime, empty when none.
  pub runtime: String,
  /// Local ref of the base, empty when none.
  pub base: String,
  pub description: String,
  /// Bytes of regular files in the module's `files/` tree.
  pub size: u64,
}

impl PackageInfo {
  pub fn read(path: &Path) -> io::Result<Self> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(io::Error::other)
  }

  pub fn write(&self, path: &Path) -> io::Result<()> {
    let data = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
    fs::write(path, data)
  }
}
