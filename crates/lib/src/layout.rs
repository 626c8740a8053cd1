//! On-disk layout of a project's build cache.
//!
//! Everything a build writes lives below `<project root>/linglong/cache/<id>`:
//!
//! ```text
//! sources/            fetched source tree (kept between builds)
//! runtime/            runtime checkout, dependency files merged into runtime/files
//! output/runtime/     committed app/lib/runtime module (files, entries, info.json)
//! output/devel/       committed devel module
//! overlayfs/{up,wk,lp,lower}
//! entry.sh            generated build script
//! containers/         per-run container directories
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::util::fs::reset_dir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
  root: PathBuf,
}

impl ProjectPaths {
  pub fn new(project_root: &Path, package_id: &str) -> Self {
    Self {
      root: project_root.join("linglong").join("cache").join(package_id),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn sources(&self) -> PathBuf {
    self.root.join("sources")
  }

  pub fn runtime(&self) -> PathBuf {
    self.root.join("runtime")
  }

  pub fn runtime_files(&self) -> PathBuf {
    self.runtime().join("files")
  }

  pub fn install(&self) -> PathBuf {
    self.root.join("output").join("runtime")
  }

  pub fn install_files(&self) -> PathBuf {
    self.install().join("files")
  }

  pub fn entries(&self) -> PathBuf {
    self.install().join("entries")
  }

  pub fn devel(&self) -> PathBuf {
    self.root.join("output").join("devel")
  }

  pub fn devel_files(&self) -> PathBuf {
    self.devel().join("files")
  }

  pub fn overlay_upper(&self) -> PathBuf {
    self.root.join("overlayfs").join("up")
  }

  pub fn overlay_workdir(&self) -> PathBuf {
    self.root.join("overlayfs").join("wk")
  }

  pub fn overlay_lower_parent(&self) -> PathBuf {
    self.root.join("overlayfs").join("lp")
  }

  /// Lower layer of the commit overlay for app and lib packages.
  pub fn overlay_lower(&self) -> PathBuf {
    self.root.join("overlayfs").join("lower")
  }

  /// Where the sandbox's writes below `prefix` end up.
  pub fn upper_prefix(&self, prefix: &str) -> PathBuf {
    self.overlay_upper().join(prefix.trim_start_matches('/'))
  }

  pub fn build_script(&self) -> PathBuf {
    self.root.join("entry.sh")
  }

  pub fn containers(&self) -> PathBuf {
    self.root.join("containers")
  }

  /// Wipes and recreates everything a previous build produced.
  ///
  /// The sources directory survives so git checkouts can be updated in place.
  pub fn reset(&self, install_prefix: &str) -> io::Result<()> {
    for dir in [
      self.runtime(),
      self.install(),
      self.devel(),
      self.root.join("overlayfs"),
    ] {
      reset_dir(&dir)?;
    }
    for dir in [
      self.upper_prefix(install_prefix),
      self.overlay_workdir(),
      self.overlay_lower_parent(),
      self.overlay_lower(),
      self.sources(),
      self.containers(),
    ] {
      fs::create_dir_all(&dir)?;
    }
    Ok(())
  }
}
