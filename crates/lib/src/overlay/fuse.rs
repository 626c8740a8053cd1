//! `fuse-overlayfs` backed [`OverlayMounter`].

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{CommitError, OverlayLayout, OverlayMount, OverlayMounter};
use crate::config::BuilderConfig;
use crate::error::IoContext;

const MOUNTINFO: &str = "/proc/self/mountinfo";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct FuseOverlayfs {
  program: String,
  timeout: Duration,
}

impl FuseOverlayfs {
  pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
    Self {
      program: program.into(),
      timeout,
    }
  }

  pub fn from_config(config: &BuilderConfig) -> Self {
    Self::new(&config.overlay_program, config.mount_timeout())
  }

  fn command(&self, layout: &OverlayLayout) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd
      .arg("-f")
      .args(["-o", "auto_unmount"])
      .arg("-o")
      .arg(format!("upperdir={}", layout.upper.display()))
      .arg("-o")
      .arg(format!("workdir={}", layout.workdir.display()))
      .arg("-o")
      .arg(format!("lowerdir={}", layout.lower.display()))
      .arg(&layout.target)
      .stdin(Stdio::null())
      .stdout(Stdio::null());
    cmd
  }
}

impl OverlayMounter for FuseOverlayfs {
  async fn mount(&self, layout: &OverlayLayout) -> Result<OverlayMount, CommitError> {
    let target = dunce::canonicalize(&layout.target).io_context(|| format!("resolving {}", layout.target.display()))?;
    let child = self.command(layout).spawn().map_err(|source| CommitError::MountSpawn {
      program: self.program.clone(),
      source,
    })?;
    let mut mount = OverlayMount::new(child, target.clone());
    info!(pid = ?mount.pid(), target = ?target, "overlay mount started");

    let deadline = Instant::now() + self.timeout;
    loop {
      let table = tokio::fs::read_to_string(MOUNTINFO)
        .await
        .io_context(|| format!("reading {MOUNTINFO}"))?;
      if is_mount_point(&table, &target) {
        debug!(target = ?target, "overlay mount ready");
        return Ok(mount);
      }
      if let Some(status) = mount.try_wait().io_context(|| "polling overlay mount process".to_string())? {
        return Err(CommitError::MountExited { status });
      }
      if Instant::now() >= deadline {
        return Err(CommitError::MountTimeout {
          target,
          timeout: self.timeout,
        });
      }
      tokio::time::sleep(POLL_INTERVAL).await;
    }
  }
}

/// Decodes the octal escapes (`\040` for space) used in mountinfo fields.
fn unescape(field: &str) -> String {
  let bytes = field.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b)) {
      let value = bytes[i + 1..i + 4].iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
      out.push(value as u8);
      i += 4;
    } else {
      out.push(bytes[i]);
      i += 1;
    }
  }
  String::from_utf8_lossy(&out).into_owned()
}

/// Mount points listed in a mountinfo table.
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
  table
    .lines()
    .filter_map(|line| line.split(' ').nth(4))
    .map(|field| PathBuf::from(unescape(field)))
}

fn is_mount_point(table: &str, target: &Path) -> bool {
  mount_points(table).any(|point| point == target)
}
