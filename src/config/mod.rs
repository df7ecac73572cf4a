// src/config/mod.rs

//! Project and module configuration.
//!
//! - [`model`] maps the TOML file shapes and the resolved declarations.
//! - [`loader`] reads files into declarations.
//! - [`validate`] checks raw declarations before graph construction.
//! - [`migrate`] is the standalone legacy-schema rewriter.

pub mod loader;
pub mod migrate;
pub mod model;
pub mod validate;

pub use model::{
    ModuleDeclaration, ModuleFile, ProjectFile, RunnableDeclaration, ServiceDeclaration,
};
