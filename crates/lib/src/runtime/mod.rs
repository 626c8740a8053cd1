//! The sandbox execution specification and the per-build container.

pub mod builder;
pub mod container;
pub mod spec;

pub use builder::RuntimeSpecBuilder;
pub use container::Container;
pub use spec::{Mount, Runtime};
