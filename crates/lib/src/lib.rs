//! llbuild-lib: sandboxed package builds for the Linglong package format
//!
//! A build reads a project descriptor, fetches sources and layers, runs the
//! build script inside an external sandbox, and commits the result into a
//! content-addressed store:
//! - `Project`: the parsed `linglong.yaml` descriptor
//! - `SourceFetcher` / `DependFetcher`: source and layer acquisition
//! - `RuntimeSpecBuilder` / `SandboxLauncher`: the sandbox document and its launch
//! - `OverlayCommitter`: turning the sandbox's change-set into package modules
//! - `Builder`: the recursive orchestration of all of the above

pub mod builder;
pub mod config;
pub mod consts;
pub mod depend;
pub mod error;
pub mod layout;
pub mod overlay;
pub mod package;
pub mod platform;
pub mod project;
pub mod repo;
pub mod runtime;
pub mod sandbox;
pub mod source;
pub mod util;

pub use builder::{BuildReport, Builder};
pub use config::BuilderConfig;
pub use error::BuilderError;
