//! Loader configuration format.

use crate::common::*;
use lidar_ops::{FrustumAugmenter, LidarRange};

pub use dataset::*;
pub use loader::*;
pub use voxel::*;

/// The main loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub loader: LoaderConfig,
    pub image: ImageConfig,
    pub voxel: VoxelConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints that cannot be expressed by the types.
    pub fn validate(&self) -> Result<()> {
        let LoaderConfig {
            batch_size,
            replica_count,
            ..
        } = self.loader;
        ensure!(
            batch_size.get() % replica_count.get() == 0,
            "batch_size ({}) must be a multiple of replica_count ({})",
            batch_size,
            replica_count
        );
        ensure!(
            self.voxel.voxel_size.iter().all(|&size| size > 0.0),
            "voxel_size must be positive, but get {:?}",
            self.voxel.voxel_size
        );
        Ok(())
    }
}

mod dataset {
    use super::*;

    /// Dataset location options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The directory containing `image_2`, `velodyne`, `label_2` and `calib`.
        pub dir: PathBuf,
        /// Optional file listing one training sample tag per line.
        ///
        /// If not set, samples are discovered in the dataset directory.
        #[serde(default)]
        pub split_file: Option<PathBuf>,
        /// Optional file listing one validation sample tag per line.
        #[serde(default)]
        pub valid_file: Option<PathBuf>,
    }

    /// Target image dimensions.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct ImageConfig {
        pub height: NonZeroUsize,
        pub width: NonZeroUsize,
    }
}

mod loader {
    use super::*;

    /// Prefetching and batching options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoaderConfig {
        /// The maximum number of batches waiting in the queue.
        pub queue_capacity: NonZeroUsize,
        /// Number of samples per batch.
        pub batch_size: NonZeroUsize,
        /// Number of concurrent producers. Zero runs a single cooperative producer.
        #[serde(default)]
        pub num_workers: usize,
        /// Reshuffle the sample order at start and on every wraparound.
        #[serde(default)]
        pub shuffle: bool,
        /// Run through the dataset once without augmentation.
        #[serde(default)]
        pub eval_mode: bool,
        /// Number of replicas a batch is split into.
        #[serde(default = "default_replica_count")]
        pub replica_count: NonZeroUsize,
        /// What a producer does when a sample fails to load.
        #[serde(default)]
        pub failure_policy: FailurePolicy,
        /// Optional seed for shuffling, curriculum and augmentation.
        #[serde(default)]
        pub seed: Option<u64>,
    }

    impl LoaderConfig {
        /// The number of producers actually started.
        pub fn num_producers(&self) -> usize {
            if self.eval_mode {
                1
            } else {
                self.num_workers.max(1)
            }
        }

        pub fn shuffle_enabled(&self) -> bool {
            self.shuffle && !self.eval_mode
        }

        /// Number of samples per replica.
        pub fn replica_size(&self) -> usize {
            self.batch_size.get() / self.replica_count.get()
        }
    }

    /// Reaction of a producer to a sample that fails to load.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum FailurePolicy {
        /// Discard the whole batch. Training rewinds the index, evaluation ends the stream.
        AbandonBatch,
        /// Drop the failed sample and request a replacement.
        SkipSample,
    }

    impl Default for FailurePolicy {
        fn default() -> Self {
            Self::AbandonBatch
        }
    }

    fn default_replica_count() -> NonZeroUsize {
        NonZeroUsize::new(1).unwrap()
    }
}

mod voxel {
    use super::*;

    /// Voxelization and augmentation options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct VoxelConfig {
        /// The voxel size in (z, y, x) order. The second resolution uses twice this size.
        pub voxel_size: [f32; 3],
        /// The nominal maximum number of points per voxel.
        pub max_points_per_voxel: NonZeroUsize,
        /// The voxelized LiDAR region.
        #[serde(default)]
        pub range: LidarRange,
        /// Augmentation parameters of the training path.
        #[serde(default)]
        pub augment: FrustumAugmenter,
    }
}
