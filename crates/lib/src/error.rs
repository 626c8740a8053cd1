//! Top-level error type of a build and the I/O context helper shared by the
//! module error enums.

use thiserror::Error;

use crate::overlay::CommitError;
use crate::project::ProjectError;
use crate::repo::RepoError;
use crate::sandbox::SandboxError;
use crate::source::FetchError;

/// An I/O error annotated with what was being attempted.
#[derive(Debug, Error)]
#[error("{context}")]
pub struct ContextError {
  pub context: String,
  #[source]
  pub source: std::io::Error,
}

/// Helper trait for adding context to IO errors
pub trait IoContext<T> {
  fn io_context<F>(self, f: F) -> Result<T, ContextError>
  where
    F: FnOnce() -> String;
}

impl<T> IoContext<T> for std::io::Result<T> {
  fn io_context<F>(self, f: F) -> Result<T, ContextError>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|source| ContextError { context: f(), source })
  }
}

/// Why a build, or one of the project commands, failed.
///
/// Every variant keeps the underlying error as its source so the whole cause
/// chain can be printed.
#[derive(Debug, Error)]
pub enum BuilderError {
  #[error("invalid project configuration")]
  Config(#[from] ProjectError),

  #[error("failed to fetch {what}")]
  Fetch {
    what: String,
    #[source]
    source: FetchError,
  },

  #[error("sandbox failure")]
  Sandbox(#[from] SandboxError),

  #[error("build script failed in sandbox (wait status {status})")]
  BuildScript { status: i32 },

  #[error("failed to commit {id}")]
  Commit {
    id: String,
    #[source]
    source: CommitError,
  },

  #[error("repository operation failed: {context}")]
  Repo {
    context: String,
    #[source]
    source: RepoError,
  },

  #[error("{0}")]
  Invalid(String),

  #[error(transparent)]
  Io(#[from] ContextError),
}

impl BuilderError {
  pub fn fetch(what: impl Into<String>, source: FetchError) -> Self {
    Self::Fetch {
      what: what.into(),
      source,
    }
  }

  pub fn repo(context: impl Into<String>, source: RepoError) -> Self {
    Self::Repo {
      context: context.into(),
      source,
    }
  }
}
