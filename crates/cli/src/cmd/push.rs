use std::path::Path;

use anyhow::{Context, Result};

use llbuild_lib::Builder;
use llbuild_lib::overlay::FuseOverlayfs;
use llbuild_lib::repo::OstreeRepo;

use super::{load_config, runtime};
use crate::output::print_refs;

pub fn cmd_push(config: Option<&Path>, with_devel: bool) -> Result<()> {
  let config = load_config(config)?;
  let repo = OstreeRepo::from_config(&config);
  let mounter = FuseOverlayfs::from_config(&config);
  let builder = Builder::new(&config, &repo, &mounter);

  let pushed = runtime()?.block_on(builder.push(with_devel)).context("Push failed")?;

  print_refs(&format!("Pushed to {}", config.remote_url()), &pushed);
  Ok(())
}
