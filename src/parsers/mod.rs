pub mod common;
pub mod typescript;

use anyhow::Result;
use std::path::Path;

use crate::core::types::ImportStatement;

/// Supplies the raw import-like statements of one source file.
///
/// Implementations only read syntax; resolution of the literals happens in
/// `PathResolver`. Statements must be returned in declaration order.
pub trait StatementExtractor: Send + Sync {
    fn extract(&self, file_path: &Path, source: &str) -> Result<Vec<ImportStatement>>;

    fn supports(&self, extension: &str) -> bool;
}

pub use typescript::TypeScriptExtractor;
