//! Staging of runtime, base and dependency layers from the store.

use std::path::Path;

use tracing::{debug, info};

use crate::error::IoContext;
use crate::package::PackageRef;
use crate::repo::{RepoError, Repository};
use crate::source::FetchError;

pub struct DependFetcher<'a, R> {
  repo: &'a R,
}

fn staging_error(reference: &PackageRef) -> impl FnOnce(RepoError) -> FetchError + '_ {
  move |source| FetchError::Dependency {
    reference: reference.to_string(),
    source,
  }
}

impl<'a, R: Repository> DependFetcher<'a, R> {
  pub fn new(repo: &'a R) -> Self {
    Self { repo }
  }

  /// Settles `reference` to a concrete ref present in the local store.
  ///
  /// An exact local match wins. Otherwise the newest matching remote ref is
  /// pulled.
  pub async fn resolve(&self, reference: &PackageRef) -> Result<PackageRef, FetchError> {
    if !reference.version.is_empty() && self.repo.has_ref(reference).await.map_err(staging_error(reference))? {
      debug!(reference = %reference, "found in local store");
      return Ok(reference.clone());
    }

    let latest = self
      .repo
      .remote_latest_ref(reference)
      .await
      .map_err(staging_error(reference))?
      .ok_or_else(|| FetchError::Unresolved(reference.to_string()))?;
    self.repo.pull(&latest).await.map_err(staging_error(&latest))?;
    Ok(latest)
  }

  /// Resolves `reference` and checks out its `subpath` into `target`.
  pub async fn fetch(&self, reference: &PackageRef, subpath: &str, target: &Path) -> Result<PackageRef, FetchError> {
    let resolved = self.resolve(reference).await?;
    info!(reference = %resolved, subpath = %subpath, target = ?target, "staging dependency");
    std::fs::create_dir_all(target).io_context(|| format!("creating {}", target.display()))?;
    self
      .repo
      .checkout(&resolved, subpath, target)
      .await
      .map_err(staging_error(&resolved))?;
    Ok(resolved)
  }
}
