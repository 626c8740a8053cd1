//! [`Repository`] backed by the `ostree` command line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use super::{RepoError, Repository};
use crate::config::BuilderConfig;
use crate::error::IoContext;
use crate::package::{PackageRef, compare_versions, version_matches};

pub struct OstreeRepo {
  path: PathBuf,
  remote_name: String,
  remote_url: String,
  program: String,
  push_program: String,
}

impl OstreeRepo {
  pub fn new(path: impl Into<PathBuf>, remote_name: impl Into<String>, remote_url: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      remote_name: remote_name.into(),
      remote_url: remote_url.into(),
      program: "ostree".to_string(),
      push_program: "ostree-push".to_string(),
    }
  }

  pub fn from_config(config: &BuilderConfig) -> Self {
    Self::new(&config.repo_path, &config.remote_repo_name, config.remote_url())
  }

  /// Replaces the `ostree` and `ostree-push` executables.
  pub fn with_programs(mut self, program: impl Into<String>, push_program: impl Into<String>) -> Self {
    self.program = program.into();
    self.push_program = push_program.into();
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn repo_arg(&self) -> OsString {
    let mut arg = OsString::from("--repo=");
    arg.push(&self.path);
    arg
  }

  async fn run(&self, program: &str, args: Vec<OsString>) -> Result<String, RepoError> {
    let output = self.output(program, &args).await?;
    if !output.status.success() {
      return Err(RepoError::Command {
        command: render_command(program, &args),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }

  async fn output(&self, program: &str, args: &[OsString]) -> Result<std::process::Output, RepoError> {
    debug!(command = %render_command(program, args), "running");
    Command::new(program)
      .args(args)
      .output()
      .await
      .map_err(|source| RepoError::Spawn {
        program: program.to_string(),
        source,
      })
  }

  async fn ostree(&self, args: &[&str]) -> Result<String, RepoError> {
    let mut full = vec![self.repo_arg()];
    full.extend(args.iter().map(OsString::from));
    self.run(&self.program, full).await
  }
}

fn render_command(program: &str, args: &[OsString]) -> String {
  let mut command = program.to_string();
  for arg in args {
    command.push(' ');
    command.push_str(&arg.to_string_lossy());
  }
  command
}

/// Picks the newest ref from `ostree remote refs` output that matches `wanted`.
fn latest_matching_ref(listing: &str, wanted: &PackageRef) -> Option<PackageRef> {
  listing
    .lines()
    .filter_map(|line| line.trim().parse::<PackageRef>().ok())
    .filter(|candidate| candidate.same_package(wanted) && version_matches(&wanted.version, &candidate.version))
    .max_by(|a, b| compare_versions(&a.version, &b.version))
}

impl Repository for OstreeRepo {
  async fn init(&self) -> Result<(), RepoError> {
    if self.path.join("config").is_file() {
      return Ok(());
    }
    std::fs::create_dir_all(&self.path).io_context(|| format!("creating {}", self.path.display()))?;
    info!(path = ?self.path, "initializing local repository");
    self.ostree(&["init", "--mode=bare-user-only"]).await?;
    Ok(())
  }

  async fn import_directory(&self, reference: &PackageRef, dir: &Path) -> Result<(), RepoError> {
    info!(reference = %reference, dir = ?dir, "importing");
    let branch = format!("--branch={}", reference.store_ref());
    let tree = format!("--tree=dir={}", dir.display());
    let subject = format!("--subject={} {}", reference.id, reference.version);
    self
      .ostree(&["commit", "--no-xattrs", &branch, &tree, &subject])
      .await?;
    Ok(())
  }

  async fn checkout(&self, reference: &PackageRef, subpath: &str, target: &Path) -> Result<(), RepoError> {
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent).io_context(|| format!("creating {}", parent.display()))?;
    }
    let mut args = vec![
      self.repo_arg(),
      OsString::from("checkout"),
      OsString::from("--user-mode"),
      OsString::from("--union"),
    ];
    let subpath = subpath.trim_matches('/');
    if !subpath.is_empty() {
      args.push(OsString::from(format!("--subpath=/{subpath}")));
    }
    args.push(OsString::from(reference.to_string()));
    args.push(target.as_os_str().to_owned());
    self.run(&self.program, args).await?;
    Ok(())
  }

  async fn push(&self, reference: &PackageRef) -> Result<(), RepoError> {
    info!(reference = %reference, remote = %self.remote_url, "pushing");
    let args = vec![
      self.repo_arg(),
      OsString::from(&self.remote_url),
      OsString::from(reference.store_ref()),
    ];
    self.run(&self.push_program, args).await?;
    Ok(())
  }

  async fn has_ref(&self, reference: &PackageRef) -> Result<bool, RepoError> {
    let args = vec![
      self.repo_arg(),
      OsString::from("rev-parse"),
      OsString::from(reference.to_string()),
    ];
    Ok(self.output(&self.program, &args).await?.status.success())
  }

  async fn pull(&self, reference: &PackageRef) -> Result<(), RepoError> {
    let remote = reference.repo.clone().unwrap_or_else(|| self.remote_name.clone());
    info!(reference = %reference.store_ref(), remote = %remote, "pulling");
    self.ostree(&["pull", &remote, &reference.store_ref()]).await?;
    Ok(())
  }

  async fn remote_latest_ref(&self, reference: &PackageRef) -> Result<Option<PackageRef>, RepoError> {
    let listing = self.ostree(&["remote", "refs", &self.remote_name]).await?;
    Ok(latest_matching_ref(&listing, reference))
  }

  async fn remote_add(&self, name: &str, url: &str) -> Result<(), RepoError> {
    self.ostree(&["remote", "add", "--no-gpg-verify", name, url]).await?;
    Ok(())
  }

  async fn remote_delete(&self, name: &str) -> Result<(), RepoError> {
    self.ostree(&["remote", "delete", name]).await?;
    Ok(())
  }

  async fn remote_show_url(&self, name: &str) -> Result<Option<String>, RepoError> {
    let args = vec![
      self.repo_arg(),
      OsString::from("remote"),
      OsString::from("show-url"),
      OsString::from(name),
    ];
    let output = self.output(&self.program, &args).await?;
    if !output.status.success() {
      return Ok(None);
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(Some(url).filter(|u| !u.is_empty()))
  }
}
