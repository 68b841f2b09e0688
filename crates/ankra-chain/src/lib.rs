pub mod manager;
pub mod source;
pub mod streaming;

pub use manager::SourceManager;
pub use source::{SourceError, SourceKind, SourceStatsSnapshot};
pub use streaming::{StreamingConfig, StreamingSource};
