//! # depscope
//!
//! Incremental dependency analysis for JavaScript/TypeScript source trees.
//!
//! A run scans the project, compares every file's content hash with the
//! persistent cache, re-resolves the import statements of changed files,
//! rebuilds the file-level dependency graph, reports circular dependencies
//! and links documentation files to the code they reference.
//!
//! ## Resolution order
//!
//! Built-in modules, absolute paths, `tsconfig` path aliases, bare package
//! names (`node_modules`), then relative paths with extension and
//! `index.<ext>` inference. The first strategy that claims a literal decides
//! its resolution kind.

pub mod config;
pub mod core;
pub mod error;
pub mod parsers;

pub use crate::config::AnalysisConfig;
pub use crate::core::{AnalysisCoordinator, AnalysisReport, AnalysisStatistics};
pub use crate::error::{DepscopeError, Result};
