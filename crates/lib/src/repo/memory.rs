//! Directory-backed [`Repository`] for tests.
//!
//! Imports copy the tree into a private temp directory, a separate "remote"
//! area can be seeded, and every call is recorded for assertions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use super::{RepoError, Repository};
use crate::error::IoContext;
use crate::package::{PackageRef, compare_versions, version_matches};
use crate::util::fs::{copy_dir_all, reset_dir};

#[derive(Debug, Default)]
pub struct Calls {
  pub inits: usize,
  pub imports: Vec<PackageRef>,
  pub pulls: Vec<PackageRef>,
  pub pushes: Vec<PackageRef>,
  pub checkouts: Vec<(PackageRef, String, PathBuf)>,
  pub remote_adds: Vec<(String, String)>,
  pub remote_deletes: Vec<String>,
}

#[derive(Default)]
struct State {
  local: HashMap<String, PathBuf>,
  remote: Vec<(PackageRef, PathBuf)>,
  remotes: HashMap<String, String>,
  counter: usize,
  calls: Calls,
}

pub struct MemoryRepo {
  dir: TempDir,
  state: Mutex<State>,
}

impl Default for MemoryRepo {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryRepo {
  pub fn new() -> Self {
    Self {
      dir: tempfile::tempdir().unwrap(),
      state: Mutex::new(State::default()),
    }
  }

  fn store_copy(&self, state: &mut State, src: &Path) -> Result<PathBuf, RepoError> {
    state.counter += 1;
    let dest = self.dir.path().join(format!("obj-{}", state.counter));
    reset_dir(&dest).io_context(|| format!("creating {}", dest.display()))?;
    copy_dir_all(src, &dest).io_context(|| format!("copying {}", src.display()))?;
    Ok(dest)
  }

  /// Makes `tree` available on the remote as `reference`.
  pub fn seed_remote(&self, mut reference: PackageRef, tree: &Path) {
    reference.repo = Some("origin".to_string());
    let mut state = self.state.lock().unwrap();
    let stored = self.store_copy(&mut state, tree).unwrap();
    state.remote.push((reference, stored));
  }

  /// Imports `tree` straight into the local store.
  pub fn seed_local(&self, reference: &PackageRef, tree: &Path) {
    let mut state = self.state.lock().unwrap();
    let stored = self.store_copy(&mut state, tree).unwrap();
    state.local.insert(reference.store_ref(), stored);
  }

  pub fn set_remote(&self, name: &str, url: &str) {
    self.state.lock().unwrap().remotes.insert(name.to_string(), url.to_string());
  }

  /// Local tree stored under `reference`.
  pub fn local_tree(&self, reference: &PackageRef) -> Option<PathBuf> {
    self.state.lock().unwrap().local.get(&reference.store_ref()).cloned()
  }

  pub fn with_calls<T>(&self, f: impl FnOnce(&Calls) -> T) -> T {
    f(&self.state.lock().unwrap().calls)
  }
}

impl Repository for MemoryRepo {
  async fn init(&self) -> Result<(), RepoError> {
    self.state.lock().unwrap().calls.inits += 1;
    Ok(())
  }

  async fn import_directory(&self, reference: &PackageRef, dir: &Path) -> Result<(), RepoError> {
    let mut state = self.state.lock().unwrap();
    let stored = self.store_copy(&mut state, dir)?;
    state.local.insert(reference.store_ref(), stored);
    state.calls.imports.push(reference.clone());
    Ok(())
  }

  async fn checkout(&self, reference: &PackageRef, subpath: &str, target: &Path) -> Result<(), RepoError> {
    let mut state = self.state.lock().unwrap();
    state
      .calls
      .checkouts
      .push((reference.clone(), subpath.to_string(), target.to_path_buf()));
    let stored = state
      .local
      .get(&reference.store_ref())
      .cloned()
      .ok_or_else(|| RepoError::NotFound(reference.to_string()))?;
    let src = stored.join(subpath.trim_matches('/'));
    if !src.exists() {
      return Err(RepoError::NotFound(format!("{reference}:{subpath}")));
    }
    std::fs::create_dir_all(target).io_context(|| format!("creating {}", target.display()))?;
    copy_dir_all(&src, target).io_context(|| format!("checking out into {}", target.display()))?;
    Ok(())
  }

  async fn push(&self, reference: &PackageRef) -> Result<(), RepoError> {
    let mut state = self.state.lock().unwrap();
    if !state.local.contains_key(&reference.store_ref()) {
      return Err(RepoError::NotFound(reference.to_string()));
    }
    state.calls.pushes.push(reference.clone());
    Ok(())
  }

  async fn has_ref(&self, reference: &PackageRef) -> Result<bool, RepoError> {
    Ok(self.state.lock().unwrap().local.contains_key(&reference.store_ref()))
  }

  async fn pull(&self, reference: &PackageRef) -> Result<(), RepoError> {
    let mut state = self.state.lock().unwrap();
    let stored = state
      .remote
      .iter()
      .find(|(r, _)| r.store_ref() == reference.store_ref())
      .map(|(_, p)| p.clone())
      .ok_or_else(|| RepoError::NotFound(reference.to_string()))?;
    state.local.insert(reference.store_ref(), stored);
    state.calls.pulls.push(reference.clone());
    Ok(())
  }

  async fn remote_latest_ref(&self, reference: &PackageRef) -> Result<Option<PackageRef>, RepoError> {
    let state = self.state.lock().unwrap();
    Ok(
      state
        .remote
        .iter()
        .map(|(r, _)| r)
        .filter(|r| r.same_package(reference) && version_matches(&reference.version, &r.version))
        .max_by(|a, b| compare_versions(&a.version, &b.version))
        .cloned(),
    )
  }

  async fn remote_add(&self, name: &str, url: &str) -> Result<(), RepoError> {
    let mut state = self.state.lock().unwrap();
    state.remotes.insert(name.to_string(), url.to_string());
    state.calls.remote_adds.push((name.to_string(), url.to_string()));
    Ok(())
  }

  async fn remote_delete(&self, name: &str) -> Result<(), RepoError> {
    let mut state = self.state.lock().unwrap();
    state.remotes.remove(name);
    state.calls.remote_deletes.push(name.to_string());
    Ok(())
  }

  async fn remote_show_url(&self, name: &str) -> Result<Option<String>, RepoError> {
    Ok(self.state.lock().unwrap().remotes.get(name).cloned())
  }
}
