//! External helper scripts for git and dsc sources.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{info, warn};

use super::FetchError;
use crate::error::IoContext;

pub const GIT_HELPER: &str = include_str!("../../scripts/fetch-git-repo.sh");
pub const DSC_HELPER: &str = include_str!("../../scripts/fetch-dsc-repo.sh");

/// Runs `sh <script> <args...>`.
///
/// When `configured` does not exist the built-in `embedded` script is written
/// to a temporary directory and used instead. That directory is kept if the
/// helper fails.
pub async fn run_helper(configured: &Path, embedded: &str, args: &[String]) -> Result<(), FetchError> {
  let mut dumped = None;
  let script: PathBuf = if configured.is_file() {
    configured.to_path_buf()
  } else {
    let dir = tempfile::Builder::new()
      .prefix("llbuild-helper-")
      .tempdir()
      .io_context(|| "creating helper directory".to_string())?;
    let name = configured.file_name().unwrap_or_else(|| OsStr::new("fetch-helper"));
    let path = dir.path().join(name);
    std::fs::write(&path, embedded).io_context(|| format!("writing {}", path.display()))?;
    dumped = Some(dir);
    path
  };

  info!(script = ?script, args = ?args, "running fetch helper");
  let status = Command::new("sh")
    .arg(&script)
    .args(args)
    .status()
    .await
    .io_context(|| format!("spawning sh {}", script.display()))?;

  if !status.success() {
    if let Some(dir) = dumped {
      let kept = dir.keep();
      warn!(path = ?kept, "fetch helper failed, script kept for inspection");
    }
    return Err(FetchError::Helper {
      script,
      status: status.to_string(),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_script;
  use tempfile::tempdir;

  #[tokio::test]
  async fn configured_script_receives_arguments() {
    let temp = tempdir().unwrap();
    let log = temp.path().join("args");
    let script = write_script(temp.path(), "helper", &format!("echo \"$@\" > {}", log.display()));

    run_helper(
      &script,
      "exit 1",
      &["dest".into(), "url".into(), "".into(), "1.0".into()],
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "dest url  1.0\n");
  }

  #[tokio::test]
  async fn embedded_script_used_when_configured_is_missing() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("marker");

    run_helper(
      &temp.path().join("absent-helper"),
      "touch \"$1\"",
      &[marker.display().to_string()],
    )
    .await
    .unwrap();

    assert!(marker.exists());
  }

  #[tokio::test]
  async fn failing_helper_is_an_error() {
    let temp = tempdir().unwrap();
    let script = write_script(temp.path(), "helper", "exit 3");

    let err = run_helper(&script, "", &[]).await.unwrap_err();

    assert!(matches!(err, FetchError::Helper { .. }));
  }

  #[test]
  fn embedded_helpers_take_dest_first() {
    assert!(GIT_HELPER.contains("dest=\"$1\""));
    assert!(DSC_HELPER.contains("dest=\"$1\""));
  }
}
