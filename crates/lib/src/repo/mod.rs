//! The content-addressed package store.
//!
//! The builder only needs a handful of store operations, collected in the
//! [`Repository`] trait. [`OstreeRepo`] implements them with the `ostree`
//! command line tool.

#[cfg(test)]
pub mod memory;
pub mod ostree;

use std::future::Future;
use std::path::Path;

use thiserror::Error;

use crate::error::ContextError;
use crate::package::PackageRef;

pub use ostree::OstreeRepo;

#[derive(Debug, Error)]
pub enum RepoError {
  #[error("failed to run {program}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("`{command}` failed ({status}): {stderr}")]
  Command {
    command: String,
    status: String,
    stderr: String,
  },

  #[error("ref not found: {0}")]
  NotFound(String),

  #[error(transparent)]
  Io(#[from] ContextError),
}

/// Store operations used by the builder.
///
/// A ref carrying a `repo` names the copy pulled from that remote.
pub trait Repository: Send + Sync {
  /// Creates the store if it does not exist yet.
  fn init(&self) -> impl Future<Output = Result<(), RepoError>> + Send;

  /// Commits the contents of `dir` under `reference`.
  fn import_directory(&self, reference: &PackageRef, dir: &Path) -> impl Future<Output = Result<(), RepoError>> + Send;

  /// Materializes `subpath` of `reference` (everything when empty) into
  /// `target`, merging with what is already there.
  fn checkout(
    &self,
    reference: &PackageRef,
    subpath: &str,
    target: &Path,
  ) -> impl Future<Output = Result<(), RepoError>> + Send;

  /// Uploads a local ref to the configured remote.
  fn push(&self, reference: &PackageRef) -> impl Future<Output = Result<(), RepoError>> + Send;

  /// True when the store holds exactly `reference`.
  fn has_ref(&self, reference: &PackageRef) -> impl Future<Output = Result<bool, RepoError>> + Send;

  /// Downloads `reference` from its remote into the store.
  fn pull(&self, reference: &PackageRef) -> impl Future<Output = Result<(), RepoError>> + Send;

  /// Newest remote ref for the same package whose version matches the
  /// (possibly partial or empty) version of `reference`.
  fn remote_latest_ref(
    &self,
    reference: &PackageRef,
  ) -> impl Future<Output = Result<Option<PackageRef>, RepoError>> + Send;

  fn remote_add(&self, name: &str, url: &str) -> impl Future<Output = Result<(), RepoError>> + Send;

  fn remote_delete(&self, name: &str) -> impl Future<Output = Result<(), RepoError>> + Send;

  /// URL of remote `name`, or `None` when no such remote is configured.
  fn remote_show_url(&self, name: &str) -> impl Future<Output = Result<Option<String>, RepoError>> + Send;
}
