//! Per-build container working directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Scratch directory of one sandbox run.
///
/// Holds the (empty) root the sandbox pivots into and a `<pid>.pid` marker
/// naming the builder process that owns it.
#[derive(Debug)]
pub struct Container {
  pub id: String,
  pub working_dir: PathBuf,
  /// Pid of the sandbox-init process once launched.
  pub pid: Option<i32>,
}

impl Container {
  /// Creates a fresh container directory below `base`.
  pub fn create(base: &Path) -> io::Result<Self> {
    fs::create_dir_all(base)?;
    let working_dir = tempfile::Builder::new().prefix("container-").tempdir_in(base)?.keep();
    let id = working_dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();

    let container = Self {
      id,
      working_dir,
      pid: None,
    };
    fs::create_dir_all(container.root_path())?;
    fs::write(container.pid_file(), std::process::id().to_string())?;
    debug!(id = %container.id, path = ?container.working_dir, "container created");
    Ok(container)
  }

  pub fn root_path(&self) -> PathBuf {
    self.working_dir.join("root")
  }

  pub fn pid_file(&self) -> PathBuf {
    self.working_dir.join(format!("{}.pid", std::process::id()))
  }

  /// Removes the container directory unless `keep` is set.
  pub fn destroy(self, keep: bool) {
    if keep {
      debug!(path = ?self.working_dir, "keeping container directory");
      return;
    }
    if let Err(e) = fs::remove_dir_all(&self.working_dir) {
      warn!(path = ?self.working_dir, error = %e, "failed to remove container directory");
    }
  }
}
