pub mod anchor;
pub mod constants;
pub mod error;
pub mod event;
pub mod status;
pub mod types;

pub use anchor::{AnchorAction, AnchoredEvent, BlockchainMetadata, ChainMetadata, EnrichedEvent};
pub use constants::*;
pub use error::AnkraError;
pub use event::{Event, TypeField};
pub use status::IngestStatus;
pub use types::{ContentHash, EventType};
