pub mod cache;
pub mod error;
pub mod ipfs;
pub mod s3;
pub mod store;
pub mod tiers;

pub use cache::{CacheConfig, RedisCache};
pub use error::StoreError;
pub use ipfs::{IpfsClient, IpfsConfig};
pub use s3::{S3Config, S3Store};
pub use store::{
    ConnectivityReport, EventStore, Retrieved, RetrieveOptions, RetrievalSource, StoreOutcome,
    StoreStatsSnapshot,
};
pub use tiers::{BlockTier, CacheTier, ObjectTier, SidecarMapping};
