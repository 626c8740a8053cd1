mod build;
mod create;
mod export;
mod import;
mod info;
mod push;
mod track;

use std::path::Path;

use anyhow::{Context, Result};
use llbuild_lib::BuilderConfig;

pub use build::cmd_build;
pub use create::cmd_create;
pub use export::cmd_export;
pub use import::cmd_import;
pub use info::cmd_info;
pub use push::cmd_push;
pub use track::cmd_track;

fn load_config(path: Option<&Path>) -> Result<BuilderConfig> {
  BuilderConfig::load(path).context("Failed to load builder configuration")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
