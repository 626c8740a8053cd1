//! Build orchestration.
//!
//! [`Builder`] sequences one build: dependencies that carry their own source
//! and build procedure are built first, one at a time and in declaration
//! order, then the project itself goes through
//! fetch, prepare, sandbox and commit. The first failing stage aborts the
//! whole build; nothing is retried.
//!
//! # Submodules
//!
//! - [`flow`] - The per-project build sequence
//! - [`commands`] - Project commands other than `build`

pub mod commands;
pub mod flow;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::BuilderConfig;
use crate::consts::PROJECT_FILE;
use crate::error::BuilderError;
use crate::overlay::OverlayMounter;
use crate::package::PackageRef;
use crate::project::{Project, synthesize_dependency};
use crate::repo::Repository;

/// Refs committed by one `build` invocation, in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
  pub built: Vec<PackageRef>,
}

pub struct Builder<'a, R, M> {
  config: &'a BuilderConfig,
  repo: &'a R,
  mounter: &'a M,
}

impl<'a, R: Repository, M: OverlayMounter> Builder<'a, R, M> {
  pub fn new(config: &'a BuilderConfig, repo: &'a R, mounter: &'a M) -> Self {
    Self { config, repo, mounter }
  }

  pub fn config(&self) -> &BuilderConfig {
    self.config
  }

  pub fn project_file(&self) -> PathBuf {
    self.config.project_root.join(PROJECT_FILE)
  }

  /// Loads the descriptor from the configured project root.
  pub fn load_project(&self) -> Result<Project, BuilderError> {
    Ok(Project::load(&self.project_file())?)
  }

  /// Creates the local store if needed and points the configured remote at
  /// the configured URL.
  pub async fn init_repo(&self) -> Result<(), BuilderError> {
    self
      .repo
      .init()
      .await
      .map_err(|e| BuilderError::repo("initializing local store", e))?;

    let name = &self.config.remote_repo_name;
    let url = self.config.remote_url();
    let current = self
      .repo
      .remote_show_url(name)
      .await
      .map_err(|e| BuilderError::repo(format!("reading remote {name}"), e))?;

    match current {
      Some(current) if current == url => return Ok(()),
      Some(current) => {
        warn!(remote = %name, old = %current, new = %url, "remote url changed, replacing");
        self
          .repo
          .remote_delete(name)
          .await
          .map_err(|e| BuilderError::repo(format!("deleting remote {name}"), e))?;
      }
      None => {}
    }
    self
      .repo
      .remote_add(name, &url)
      .await
      .map_err(|e| BuilderError::repo(format!("adding remote {name}"), e))?;
    info!(remote = %name, url = %url, "remote configured");
    Ok(())
  }

  /// Builds the project in the configured project root, dependencies first.
  pub async fn build(&self) -> Result<BuildReport, BuilderError> {
    self.init_repo().await?;
    let project = self.load_project()?;

    let mut report = BuildReport::default();
    self.build_project(&project, &mut report).await?;
    info!(id = %project.package.id, committed = report.built.len(), "build finished");
    Ok(report)
  }

  /// Builds every buildable dependency of `project`, then `project` itself.
  pub async fn build_project(&self, project: &Project, report: &mut BuildReport) -> Result<(), BuilderError> {
    for depend in project.depends.iter().filter(|d| d.is_buildable()) {
      info!(parent = %project.package.id, depend = %depend.id, "building dependency");
      let sub = synthesize_dependency(project, depend);
      Box::pin(self.build_project(&sub, report)).await?;
    }

    let committed = self.build_flow(project).await?;
    report.built.extend(committed);
    Ok(())
  }
}
