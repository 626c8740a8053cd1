//! Composition of the sandbox's change-set into committed package modules.
//!
//! After a successful build the writable upper layer is mounted over the
//! lower layer with a user-space overlay, post-processed and imported into
//! the store. [`OverlayCommitter`] drives that; the mount itself is behind
//! [`OverlayMounter`] and lives in an [`OverlayMount`] guard.

pub mod commit;
pub mod desktop;
pub mod fuse;
#[cfg(test)]
pub mod testing;

use std::future::Future;
use std::path::PathBuf;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ContextError;
use crate::project::ProjectError;
use crate::repo::RepoError;

pub use commit::OverlayCommitter;
pub use fuse::FuseOverlayfs;

/// How long a terminated mount process gets before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum CommitError {
  #[error("failed to start overlay mount program {program}")]
  MountSpawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("overlay mount program exited before the mount was ready ({status})")]
  MountExited { status: String },

  #[error("overlay mount at {target} not ready after {timeout:?}")]
  MountTimeout { target: PathBuf, timeout: Duration },

  #[error("failed to write package metadata {path}")]
  Metadata {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to render project descriptor")]
  Descriptor(#[source] ProjectError),

  #[error("failed to import {module} module")]
  Import {
    module: String,
    #[source]
    source: RepoError,
  },

  #[error(transparent)]
  Io(#[from] ContextError),
}

/// Directories of one overlay mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayout {
  pub upper: PathBuf,
  pub workdir: PathBuf,
  pub lower: PathBuf,
  /// Mount point of the merged view.
  pub target: PathBuf,
}

/// Something that can present an [`OverlayLayout`] as a merged tree.
pub trait OverlayMounter: Send + Sync {
  /// Mounts `layout` and returns once the merged view is readable.
  fn mount(&self, layout: &OverlayLayout) -> impl Future<Output = Result<OverlayMount, CommitError>> + Send;
}

/// A running overlay mount process.
///
/// The process is terminated when the guard is dropped, so every path out of
/// the commit stage releases it.
#[derive(Debug)]
pub struct OverlayMount {
  child: Option<Child>,
  target: PathBuf,
}

impl OverlayMount {
  pub fn new(child: Child, target: PathBuf) -> Self {
    Self {
      child: Some(child),
      target,
    }
  }

  pub fn pid(&self) -> Option<u32> {
    self.child.as_ref().map(Child::id)
  }

  pub fn target(&self) -> &PathBuf {
    &self.target
  }

  /// Exit status if the process has already ended.
  pub(crate) fn try_wait(&mut self) -> std::io::Result<Option<String>> {
    match self.child.as_mut() {
      Some(child) => Ok(child.try_wait()?.map(|status| status.to_string())),
      None => Ok(Some("terminated".to_string())),
    }
  }

  /// Terminates the mount on the blocking thread pool.
  ///
  /// Async callers use this. [`Self::terminate`] and `Drop` block the calling
  /// thread for up to the grace period.
  pub async fn release(mut self) {
    let pid = self.pid();
    if let Err(e) = tokio::task::spawn_blocking(move || self.terminate()).await {
      warn!(pid = ?pid, error = %e, "overlay mount release did not finish");
    }
  }

  /// Sends SIGTERM, waits up to a grace period, then kills and reaps.
  pub fn terminate(&mut self) {
    let Some(mut child) = self.child.take() else {
      return;
    };
    if let Ok(Some(_)) = child.try_wait() {
      return;
    }

    let pid = Pid::from_raw(child.id() as i32);
    debug!(pid = %pid, target = ?self.target, "terminating overlay mount");
    if let Err(e) = kill(pid, Signal::SIGTERM) {
      warn!(pid = %pid, error = %e, "failed to signal overlay mount");
    }

    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
      match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => thread::sleep(Duration::from_millis(20)),
        Err(_) => break,
      }
    }

    warn!(pid = %pid, "overlay mount ignored SIGTERM, killing");
    let _ = child.kill();
    let _ = child.wait();
  }
}

impl Drop for OverlayMount {
  fn drop(&mut self) {
    self.terminate();
  }
}
