// src/config/mod.rs
//! Target configuration resolution
//!
//! Builds the [`ConfigurationMap`] for an assembly run by overlaying, in
//! increasing precedence, built-in conventions, the `<target>.properties`
//! file and caller overrides.

pub mod properties;
mod resolver;

pub use resolver::{
    BuildFlags, ConfigurationMap, Overrides, ProjectIdentity, PropertyResolver, DEFAULT_DIST_DIR,
    DEFAULT_TARGET,
};
