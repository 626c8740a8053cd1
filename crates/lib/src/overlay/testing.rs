//! Overlay stand-in for tests that cannot use FUSE.

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use super::{CommitError, OverlayLayout, OverlayMount, OverlayMounter};
use crate::error::IoContext;
use crate::util::fs::copy_dir_all;

/// "Mounts" by copying lower, then upper, into the target.
///
/// A `sleep` process stands in for the mount daemon so tests can check that
/// it gets released.
#[derive(Debug, Default)]
pub struct CopyMounter {
  pub pids: Mutex<Vec<u32>>,
  pub layouts: Mutex<Vec<OverlayLayout>>,
}

impl CopyMounter {
  pub fn last_pid(&self) -> Option<u32> {
    self.pids.lock().unwrap().last().copied()
  }
}

fn merge(src: &Path, dst: &Path) -> Result<(), CommitError> {
  if src.is_dir() {
    copy_dir_all(src, dst).io_context(|| format!("copying {}", src.display()))?;
  }
  Ok(())
}

impl OverlayMounter for CopyMounter {
  async fn mount(&self, layout: &OverlayLayout) -> Result<OverlayMount, CommitError> {
    merge(&layout.lower, &layout.target)?;
    merge(&layout.upper, &layout.target)?;
    let child = Command::new("sleep")
      .arg("300")
      .spawn()
      .map_err(|source| CommitError::MountSpawn {
        program: "sleep".to_string(),
        source,
      })?;
    self.pids.lock().unwrap().push(child.id());
    self.layouts.lock().unwrap().push(layout.clone());
    Ok(OverlayMount::new(child, layout.target.clone()))
  }
}
