//! The consumer-facing loader.

use crate::{
    common::*,
    config::Config,
    data::{Batch, DescriptorSet, FetchMode, SampleFetcher},
    error::SampleError,
    index::{DatasetIndex, IndexHandle, IndexMode},
    voxel::{PointsPerVoxelSchedule, VoxelBuilder},
    worker::{spawn_producers, ProducerContext},
};
use lidar_ops::{Augmenter, GridVoxelizer, Voxelizer};
use tokio::task::JoinHandle;

/// The lifecycle of a [Loader].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// The index is built and the producers are spawned.
    Initializing,
    /// Batches are being consumed.
    Running,
    /// The producers stopped. Queued batches are still delivered.
    Draining,
    Stopped,
}

/// The point cloud algorithms driving the loader.
#[derive(Debug, Clone)]
pub struct LidarOps {
    pub voxelizer: Arc<dyn Voxelizer>,
    pub augmenter: Arc<dyn Augmenter>,
}

impl LidarOps {
    /// The built-in voxelizer and augmenter configured by `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            voxelizer: Arc::new(GridVoxelizer::new(config.voxel.range)),
            augmenter: Arc::new(config.voxel.augment.clone()),
        }
    }
}

/// Prefetches batches of KITTI samples in background tasks.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Loader {
    config: Arc<Config>,
    state: LoaderState,
    train_set: DescriptorSet,
    valid_set: DescriptorSet,
    fetcher: SampleFetcher,
    builder: VoxelBuilder,
    index: IndexHandle,
    #[derivative(Debug = "ignore")]
    rx: Option<flume::Receiver<Batch>>,
    #[derivative(Debug = "ignore")]
    exit: Arc<AtomicBool>,
    #[derivative(Debug = "ignore")]
    producers: Vec<JoinHandle<()>>,
    num_producers: usize,
    delivered: usize,
    frame_info: Vec<String>,
    rng: StdRng,
}

impl Loader {
    /// Build the loader with the built-in point cloud algorithms and start prefetching.
    pub async fn new(config: Config) -> Result<Self> {
        let ops = LidarOps::from_config(&config);
        Self::with_ops(config, ops).await
    }

    /// Build the loader and start prefetching. Must be called within a tokio runtime.
    pub async fn with_ops(config: Config, ops: LidarOps) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let Config {
            dataset,
            loader,
            image,
            voxel,
        } = &*config;

        // load descriptors
        info!("loading descriptors from '{}'", dataset.dir.display());
        let train_set = match &dataset.split_file {
            Some(split_file) => DescriptorSet::load_split_file(&dataset.dir, split_file)?,
            None => DescriptorSet::discover(&dataset.dir)?,
        };
        let valid_set = match &dataset.valid_file {
            Some(valid_file) => DescriptorSet::load_split_file(&dataset.dir, valid_file)?,
            None => DescriptorSet::default(),
        };
        info!(
            "{} training samples, {} validation samples",
            train_set.len(),
            valid_set.len()
        );

        let batch_size = loader.batch_size.get();
        if !loader.eval_mode {
            ensure!(
                batch_size <= train_set.len(),
                "batch_size ({}) exceeds the dataset size ({})",
                batch_size,
                train_set.len()
            );
        }

        let fetcher = SampleFetcher::new(*image, ops.augmenter.clone());
        let builder = VoxelBuilder::new(
            ops.voxelizer.clone(),
            voxel.voxel_size,
            PointsPerVoxelSchedule::new(voxel.max_points_per_voxel.get()),
            loader.replica_count.get(),
            loader.replica_size(),
            (image.height.get(), image.width.get()),
        );

        // start the index coordinator
        let num_producers = loader.num_producers();
        let mode = if loader.eval_mode {
            IndexMode::Eval
        } else {
            IndexMode::Train {
                shuffle: loader.shuffle_enabled(),
            }
        };
        let index_rng = match loader.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (index, _) = IndexHandle::spawn(
            DatasetIndex::new(train_set.clone(), mode, index_rng),
            num_producers * 2,
        );

        // start producers
        let exit = Arc::new(AtomicBool::new(false));
        let (tx, rx) = flume::bounded(loader.queue_capacity.get());
        let ctx = ProducerContext {
            index: index.clone(),
            fetcher: fetcher.clone(),
            builder: builder.clone(),
            batch_size,
            failure_policy: loader.failure_policy,
            eval_mode: loader.eval_mode,
            exit: exit.clone(),
        };
        let producers = spawn_producers(ctx, num_producers, loader.seed, tx);
        info!("started {} producers", num_producers);

        let rng = match loader.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_sub(1)),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            state: LoaderState::Initializing,
            train_set,
            valid_set,
            fetcher,
            builder,
            index,
            rx: Some(rx),
            exit,
            producers,
            num_producers,
            delivered: 0,
            frame_info: vec![],
            rng,
        })
    }

    /// Wait for the next prefetched batch. `None` marks the end of the stream.
    pub async fn load(&mut self) -> Option<Batch> {
        if self.state == LoaderState::Stopped {
            return None;
        }
        if self.config.loader.eval_mode && self.delivered >= self.len() {
            self.stop();
            return None;
        }
        if self.exit.load(atomic::Ordering::SeqCst) {
            self.state = LoaderState::Draining;
        } else if self.state == LoaderState::Initializing {
            self.state = LoaderState::Running;
        }

        let rx = self.rx.as_ref()?;
        let result = rx.recv_async().instrument(trace_span!("recv_batch")).await;
        match result {
            Ok(batch) => {
                self.delivered += self.config.loader.batch_size.get();
                self.frame_info = batch.tags.clone();
                Some(batch)
            }
            Err(_) => {
                debug!("all producers have exited");
                self.stop();
                None
            }
        }
    }

    /// Load validation samples without augmentation.
    ///
    /// Random indices are drawn if `indices` is not given. At most
    /// `batch_size` indices are accepted.
    pub fn load_specified(&mut self, indices: Option<&[usize]>) -> Result<Batch> {
        let set = self.valid_set.clone();
        if set.is_empty() {
            warn!("no validation samples are configured");
        }
        self.load_from(&set, indices)
    }

    /// Load training samples without augmentation.
    ///
    /// Random indices are drawn if `indices` is not given.
    pub fn load_specified_train(&mut self, indices: Option<&[usize]>) -> Result<Batch> {
        let set = self.train_set.clone();
        self.load_from(&set, indices)
    }

    fn load_from(&mut self, set: &DescriptorSet, indices: Option<&[usize]>) -> Result<Batch> {
        let batch_size = self.config.loader.batch_size.get();
        let indices: Vec<usize> = match indices {
            Some(indices) => {
                ensure!(
                    indices.len() <= batch_size,
                    "{} indices exceed the batch size {}",
                    indices.len(),
                    batch_size
                );
                indices.to_vec()
            }
            None if set.is_empty() => vec![],
            None => (0..batch_size)
                .map(|_| self.rng.gen_range(0..set.len()))
                .collect(),
        };

        let mut samples = vec![];
        for index in indices {
            let result = match set.get(index) {
                Some(descriptor) => self.fetcher.fetch(descriptor, FetchMode::Clip, &mut self.rng),
                None => Err(SampleError::OutOfRange {
                    index,
                    len: set.len(),
                }),
            };
            match result {
                Ok(sample) => samples.push(sample),
                Err(err) => warn!("drop sample: {}", err),
            }
        }

        let max_points = self.builder.schedule().nominal();
        self.builder.build_batch(samples, max_points)
    }

    /// Signal the producers to exit and discard queued batches.
    pub fn close(&mut self) {
        self.stop();
    }

    /// Wait for the producer tasks to finish. Call it after [Loader::close] or
    /// once the stream has ended.
    pub async fn join(&mut self) -> Result<()> {
        future::try_join_all(self.producers.drain(..)).await?;
        Ok(())
    }

    fn stop(&mut self) {
        self.exit.store(true, atomic::Ordering::SeqCst);
        if self.rx.take().is_some() {
            debug!("close the batch queue");
        }
        self.state = LoaderState::Stopped;
    }

    /// The number of training samples.
    pub fn len(&self) -> usize {
        self.train_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_set.is_empty()
    }

    /// The number of validation samples.
    pub fn valid_len(&self) -> usize {
        self.valid_set.len()
    }

    /// The `(height, width, channels)` of the delivered images.
    pub fn image_shape(&self) -> (usize, usize, usize) {
        self.fetcher.image_shape()
    }

    /// The tags of the most recently delivered batch.
    pub fn frame_info(&self) -> &[String] {
        &self.frame_info
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// The number of delivered samples, counted in whole batches.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn num_producers(&self) -> usize {
        self.num_producers
    }

    /// The current cursor of the dataset index.
    pub async fn cursor(&self) -> Result<usize> {
        self.index.cursor().await
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.stop();
    }
}
