pub mod config;
pub mod error;
pub mod types;

pub use config::{ExtractionConfig, FileConfig, Neo4jConfig, OutputConfig, OutputKind, RetryConfig};
pub use error::{Result, ThreadlineError};
pub use types::*;
