pub mod dedup;
pub mod processor;
pub mod registry;
pub mod result;
pub mod stats;
pub mod traits;

pub use dedup::DedupState;
pub use processor::{IngestProcessor, ProcessorConfig};
pub use registry::{EventHandler, HandlerRegistry};
pub use result::IngestResult;
pub use stats::{ProcessorStats, ProcessorStatsSnapshot};
pub use traits::{Authorizer, EventRetriever};
