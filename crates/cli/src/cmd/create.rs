use anyhow::{Context, Result};

use llbuild_lib::builder::commands::create_project;

use crate::output::print_success;

pub fn cmd_create(name: &str) -> Result<()> {
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let dir = create_project(&cwd, name)?;
  print_success(&format!("Created project {}", dir.display()));
  Ok(())
}
