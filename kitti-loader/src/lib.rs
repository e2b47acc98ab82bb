//! The multi-modal KITTI batch prefetcher.

pub mod common;
pub mod config;
pub mod data;
pub mod error;
pub mod index;
pub mod loader;
pub mod profiling;
pub mod voxel;
pub mod worker;

pub use config::Config;
pub use data::{Batch, BatchVoxel};
pub use error::SampleError;
pub use loader::{LidarOps, Loader, LoaderState};
