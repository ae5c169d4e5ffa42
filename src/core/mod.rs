pub mod analyzer;
pub mod cache;
pub mod cycles;
pub mod graph;
pub mod patterns;
pub mod project;
pub mod resolver;
pub mod scanner;
pub mod types;

pub use analyzer::{AnalysisCoordinator, AnalysisEvent, AnalysisPhase, AnalysisReport, AnalysisStatistics};
pub use cache::{CacheStatistics, CacheStore, FileStatus};
pub use cycles::CycleDetector;
pub use graph::{DependencyGraph, GraphBuilder, GraphNode};
pub use patterns::{link_strength, DocumentPatternExtractor, PatternMatcher};
pub use project::ProjectContext;
pub use resolver::{AliasMap, PathResolver, ResolutionContext};
pub use scanner::{ScannedFile, SourceScanner};
