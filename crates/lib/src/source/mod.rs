//! Acquisition of a project's source tree.
//!
//! Archive and file sources are downloaded into a shared cache and verified
//! against their declared SHA-256 digest. Git and dsc sources are delegated to
//! helper scripts. Every transfer is awaited before the next one starts.

pub mod archive;
pub mod download;
pub mod helper;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::config::BuilderConfig;
use crate::error::{ContextError, IoContext};
use crate::project::{SourceDescriptor, SourceKind};
use crate::repo::RepoError;

pub use archive::{ArchiveFormat, extract};
pub use download::{download, url_to_filename};

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request to {url} failed")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{url} answered HTTP {status}")]
  Status { url: String, status: u16 },

  #[error("digest mismatch for {url}: expected {expected}, got {actual}")]
  DigestMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("unsupported archive format: {0}")]
  UnsupportedArchive(PathBuf),

  #[error("extracting {archive} failed ({status})")]
  Extract { archive: PathBuf, status: String },

  #[error("fetch helper {script} failed ({status})")]
  Helper { script: PathBuf, status: String },

  #[error("source has no url")]
  MissingUrl,

  #[error("failed to stage {reference}")]
  Dependency {
    reference: String,
    #[source]
    source: RepoError,
  },

  #[error("no local or remote ref matches {0}")]
  Unresolved(String),

  #[error(transparent)]
  Io(#[from] ContextError),
}

/// Fetches one project's source into its `sources/` directory.
pub struct SourceFetcher<'a> {
  source: Option<&'a SourceDescriptor>,
  config: &'a BuilderConfig,
  sources_dir: PathBuf,
}

impl<'a> SourceFetcher<'a> {
  pub fn new(source: Option<&'a SourceDescriptor>, config: &'a BuilderConfig, sources_dir: impl Into<PathBuf>) -> Self {
    Self {
      source,
      config,
      sources_dir: sources_dir.into(),
    }
  }

  fn url(&self) -> Result<&'a str, FetchError> {
    self
      .source
      .and_then(|s| s.url.as_deref())
      .ok_or(FetchError::MissingUrl)
  }

  /// Directory mounted at `/source` in the sandbox.
  ///
  /// Git checkouts live in a directory named after the repository, every
  /// other kind uses the sources directory itself. Without a source the
  /// project root is used.
  pub fn source_root(&self) -> PathBuf {
    match self.source {
      None => self.config.project_root.clone(),
      Some(source) if source.kind == SourceKind::Git => {
        let url = source.url.as_deref().unwrap_or_default();
        self.sources_dir.join(git_checkout_name(url))
      }
      Some(_) => self.sources_dir.clone(),
    }
  }

  /// Fetches the source and returns [`Self::source_root`].
  pub async fn fetch(&self) -> Result<PathBuf, FetchError> {
    let Some(source) = self.source else {
      return Ok(self.source_root());
    };
    std::fs::create_dir_all(&self.sources_dir)
      .io_context(|| format!("creating {}", self.sources_dir.display()))?;

    info!(kind = source.kind.as_str(), url = ?source.url, "fetching source");
    match source.kind {
      SourceKind::Archive => {
        let archive = download(self.url()?, source.digest.as_deref(), &self.config.archive_cache).await?;
        extract(&archive, &self.sources_dir).await?;
      }
      SourceKind::File => {
        let file = download(self.url()?, source.digest.as_deref(), &self.config.archive_cache).await?;
        place_file(&file, &self.sources_dir)?;
      }
      SourceKind::Git => {
        let args = vec![
          self.source_root().display().to_string(),
          self.url()?.to_string(),
          source.commit.clone().unwrap_or_default(),
          source.version.clone().unwrap_or_default(),
        ];
        helper::run_helper(&self.config.fetch_git_helper, helper::GIT_HELPER, &args).await?;
      }
      SourceKind::Dsc => {
        let args = vec![
          self.sources_dir.display().to_string(),
          self.url()?.to_string(),
          source.commit.clone().unwrap_or_default(),
          source.version.clone().unwrap_or_default(),
        ];
        helper::run_helper(&self.config.fetch_dsc_helper, helper::DSC_HELPER, &args).await?;
      }
    }
    Ok(self.source_root())
  }
}

/// Copies a verified download into `dir` through a staging name.
fn place_file(file: &Path, dir: &Path) -> Result<(), FetchError> {
  let name = file.file_name().unwrap_or_default();
  let staging = dir.join(format!(".{}.part", name.to_string_lossy()));
  let target = dir.join(name);
  std::fs::copy(file, &staging).io_context(|| format!("staging {}", staging.display()))?;
  std::fs::rename(&staging, &target).io_context(|| format!("moving into {}", target.display()))?;
  Ok(())
}

/// Directory name for a git checkout: the last url component without `.git`.
fn git_checkout_name(url: &str) -> String {
  let name = url_to_filename(url.trim_end_matches('/'));
  name.strip_suffix(".git").unwrap_or(&name).to_string()
}
