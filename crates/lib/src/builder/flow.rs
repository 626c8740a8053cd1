//! The build sequence of a single project.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Builder;
use crate::consts::INFO_FILE;
use crate::depend::DependFetcher;
use crate::error::{BuilderError, IoContext};
use crate::layout::ProjectPaths;
use crate::overlay::OverlayMounter;
use crate::overlay::commit::{BuildLayers, OverlayCommitter};
use crate::package::{PackageInfo, PackageRef};
use crate::project::Project;
use crate::project::script::generate_build_script;
use crate::repo::Repository;
use crate::runtime::{Container, RuntimeSpecBuilder};
use crate::sandbox::SandboxLauncher;
use crate::source::SourceFetcher;

/// Layers staged for one build.
struct Staged {
  runtime: Option<PackageRef>,
  base: Option<PackageRef>,
  base_files: Option<PathBuf>,
}

/// Base ref recorded in a runtime checkout's `info.json`.
fn runtime_base(runtime_dir: &Path, arch: &str, channel: &str) -> Result<Option<PackageRef>, BuilderError> {
  let path = runtime_dir.join(INFO_FILE);
  if !path.is_file() {
    warn!(path = ?path, "runtime has no info.json, cannot derive base");
    return Ok(None);
  }
  let info = PackageInfo::read(&path).io_context(|| format!("reading {}", path.display()))?;
  if info.base.is_empty() {
    return Ok(None);
  }
  let mut base: PackageRef = info
    .base
    .parse()
    .map_err(|e| BuilderError::Invalid(format!("runtime {} declares invalid base: {e}", info.appid)))?;
  base.channel = channel.to_string();
  if base.arch.is_empty() {
    base.arch = arch.to_string();
  }
  Ok(Some(base))
}

impl<R: Repository, M: OverlayMounter> Builder<'_, R, M> {
  /// Runs fetch, prepare, sandbox and commit for `project` alone.
  ///
  /// Returns the committed refs.
  pub async fn build_flow(&self, project: &Project) -> Result<Vec<PackageRef>, BuilderError> {
    let config = self.config;
    let id = &project.package.id;
    let paths = ProjectPaths::new(&config.project_root, id);
    info!(id = %id, version = %project.package.version, kind = %project.package.kind, "building project");

    paths
      .reset(&project.install_prefix())
      .io_context(|| format!("resetting {}", paths.root().display()))?;

    let mut project = project.clone();
    let script = paths.build_script();
    generate_build_script(&project, &script).io_context(|| format!("writing {}", script.display()))?;
    project.set_build_script_path(script);

    let source_root = SourceFetcher::new(project.source.as_ref(), config, paths.sources())
      .fetch()
      .await
      .map_err(|e| BuilderError::fetch(format!("source of {id}"), e))?;

    let staged = self.stage_layers(&project, &paths).await?;

    let mut container = Container::create(&paths.containers())
      .io_context(|| format!("creating container in {}", paths.containers().display()))?;
    let result = self.run_and_commit(&project, &paths, &mut container, &source_root, &staged).await;
    container.destroy(config.keep_container);
    result
  }

  /// Stages runtime, dependencies and base for the sandbox.
  async fn stage_layers(&self, project: &Project, paths: &ProjectPaths) -> Result<Staged, BuilderError> {
    let arch = &self.config.target_arch;
    let channel = &self.config.channel;
    let fetcher = DependFetcher::new(self.repo);

    let runtime = match &project.runtime {
      Some(wanted) => {
        let reference = wanted.resolve(arch, channel);
        let resolved = fetcher
          .fetch(&reference, "", &paths.runtime())
          .await
          .map_err(|e| BuilderError::fetch(format!("runtime {wanted}"), e))?;
        Some(resolved)
      }
      None => None,
    };

    for depend in &project.depends {
      let reference = depend.fuzzy_ref().resolve(arch, channel);
      fetcher
        .fetch(&reference, "files", &paths.runtime_files())
        .await
        .map_err(|e| BuilderError::fetch(format!("dependency {}", depend.id), e))?;
    }

    let wanted_base = match (&project.base, &runtime) {
      (Some(base), _) => Some(base.resolve(arch, channel)),
      (None, Some(_)) => runtime_base(&paths.runtime(), arch, channel)?,
      (None, None) => None,
    };
    let Some(wanted_base) = wanted_base else {
      warn!(id = %project.package.id, "no base layer, building against an empty root");
      return Ok(Staged {
        runtime,
        base: None,
        base_files: None,
      });
    };

    let resolve_error = |e| BuilderError::fetch(format!("base {wanted_base}"), e);
    let resolved = fetcher.resolve(&wanted_base).await.map_err(resolve_error)?;
    let target = self.config.layers_dir.join(resolved.local_ref());
    let base = fetcher.fetch(&resolved, "", &target).await.map_err(resolve_error)?;
    debug!(base = %base, path = ?target, "base staged");
    Ok(Staged {
      runtime,
      base: Some(base),
      base_files: Some(target.join("files")),
    })
  }

  async fn run_and_commit(
    &self,
    project: &Project,
    paths: &ProjectPaths,
    container: &mut Container,
    source_root: &Path,
    staged: &Staged,
  ) -> Result<Vec<PackageRef>, BuilderError> {
    let spec = RuntimeSpecBuilder::new(project, paths, container, &self.config.target_arch)
      .source_root(source_root)
      .base_files(staged.base_files.clone())
      .build();

    let outcome = SandboxLauncher::from_config(self.config).run(spec).await?;
    container.pid = Some(outcome.pid);
    if !outcome.result.success() {
      return Err(BuilderError::BuildScript {
        status: outcome.result.wstatus,
      });
    }
    info!(id = %project.package.id, "build script finished");

    OverlayCommitter::new(self.config, self.repo, self.mounter)
      .commit(
        project,
        paths,
        BuildLayers {
          runtime: staged.runtime.as_ref(),
          base: staged.base.as_ref(),
        },
      )
      .await
      .map_err(|source| BuilderError::Commit {
        id: project.package.id.clone(),
        source,
      })
  }
}
