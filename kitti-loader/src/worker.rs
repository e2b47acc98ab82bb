//! Batch producers feeding the prefetch queue.

use crate::{
    common::*,
    config::FailurePolicy,
    data::{Batch, FetchMode, RawSample, SampleDescriptor, SampleFetcher},
    error::SampleError,
    index::IndexHandle,
    profiling::Timing,
    voxel::VoxelBuilder,
};
use tokio::task::JoinHandle;

/// The state shared by all producers.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ProducerContext {
    pub index: IndexHandle,
    pub fetcher: SampleFetcher,
    pub builder: VoxelBuilder,
    pub batch_size: usize,
    pub failure_policy: FailurePolicy,
    /// Walk the dataset once without augmentation.
    pub eval_mode: bool,
    #[derivative(Debug = "ignore")]
    pub exit: Arc<AtomicBool>,
}

/// The result of one attempt to fill a batch.
#[derive(Debug)]
pub enum BatchOutcome {
    Ready(Batch),
    /// The batch was discarded after sample failures. The producer may try again.
    Abandoned,
    /// No more batches will be produced.
    EndOfStream,
}

/// One producer with its own random state.
#[derive(Debug)]
pub struct Producer {
    id: usize,
    ctx: ProducerContext,
    rng: StdRng,
}

impl Producer {
    pub fn new(id: usize, ctx: ProducerContext, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        Self { id, ctx, rng }
    }

    fn fetch_mode(&self) -> FetchMode {
        if self.ctx.eval_mode {
            FetchMode::Clip
        } else {
            FetchMode::Augment
        }
    }

    /// Keep producing batches until the exit signal is set, the index is
    /// exhausted or the queue is closed.
    pub async fn run(mut self, tx: flume::Sender<Batch>) -> Result<()> {
        loop {
            if self.ctx.exit.load(atomic::Ordering::SeqCst) {
                debug!("producer {} observed the exit signal", self.id);
                break;
            }

            match self.produce_batch().await? {
                BatchOutcome::Ready(batch) => {
                    let result = tx
                        .send_async(batch)
                        .instrument(trace_span!("send_batch"))
                        .await;
                    if result.is_err() {
                        debug!("producer {} found the queue closed", self.id);
                        break;
                    }
                }
                BatchOutcome::Abandoned => continue,
                BatchOutcome::EndOfStream => {
                    self.ctx.exit.store(true, atomic::Ordering::SeqCst);
                    break;
                }
            }
        }

        debug!("producer {} exits", self.id);
        Ok(())
    }

    /// Fill one batch from the next index slice.
    pub async fn produce_batch(&mut self) -> Result<BatchOutcome> {
        let mut timing = Timing::new("produce_batch");
        let batch_size = self.ctx.batch_size;

        let slice = match self
            .ctx
            .index
            .next(batch_size)
            .instrument(trace_span!("request_slice"))
            .await?
        {
            Some(slice) => slice,
            None => return Ok(BatchOutcome::EndOfStream),
        };
        timing.add_event("request slice");

        let max_points = self.ctx.builder.schedule().sample(slice.progress, &mut self.rng);

        let samples = match self.ctx.failure_policy {
            FailurePolicy::AbandonBatch => {
                let (samples, errors) = self.fetch(slice.descriptors, true).await?;
                if let Some(err) = errors.into_iter().next() {
                    return self.abandon(&err).await;
                }
                samples
            }
            FailurePolicy::SkipSample => {
                let mut samples = vec![];
                let mut failures = 0;
                let mut pending = slice.descriptors;

                loop {
                    let (fetched, errors) = self.fetch(pending, false).await?;
                    samples.extend(fetched);
                    if errors.is_empty() {
                        break;
                    }

                    errors.iter().for_each(|err| warn!("skip sample: {}", err));
                    failures += errors.len();
                    if failures >= batch_size {
                        warn!("{} samples failed in one batch", failures);
                        return self.abandon(&errors[errors.len() - 1]).await;
                    }

                    pending = match self.ctx.index.next(errors.len()).await? {
                        Some(slice) => slice.descriptors,
                        None => break,
                    };
                }

                if samples.is_empty() {
                    return Ok(BatchOutcome::Abandoned);
                }
                samples
            }
        };
        timing.add_event("fetch samples");

        let builder = self.ctx.builder.clone();
        let batch = tokio::task::spawn_blocking(move || builder.build_batch(samples, max_points))
            .instrument(trace_span!("build_batch"))
            .await??;
        timing.add_event("build batch");
        timing.report();

        Ok(BatchOutcome::Ready(batch))
    }

    async fn abandon(&mut self, err: &SampleError) -> Result<BatchOutcome> {
        if self.ctx.eval_mode {
            warn!("stop evaluation stream: {}", err);
            self.ctx.exit.store(true, atomic::Ordering::SeqCst);
            Ok(BatchOutcome::EndOfStream)
        } else {
            warn!("abandon batch and rewind: {}", err);
            self.ctx.index.rewind().await?;
            Ok(BatchOutcome::Abandoned)
        }
    }

    /// Load the samples on the blocking thread pool. If `stop_on_error` is
    /// set, loading stops at the first failure.
    async fn fetch(
        &mut self,
        descriptors: Vec<Arc<SampleDescriptor>>,
        stop_on_error: bool,
    ) -> Result<(Vec<RawSample>, Vec<SampleError>)> {
        let fetcher = self.ctx.fetcher.clone();
        let mode = self.fetch_mode();
        let mut rng = StdRng::from_rng(&mut self.rng)?;

        let output = tokio::task::spawn_blocking(move || {
            let mut samples = vec![];
            let mut errors = vec![];

            for descriptor in &descriptors {
                match fetcher.fetch(descriptor, mode, &mut rng) {
                    Ok(sample) => samples.push(sample),
                    Err(err) => {
                        errors.push(err);
                        if stop_on_error {
                            break;
                        }
                    }
                }
            }
            (samples, errors)
        })
        .instrument(trace_span!("fetch_samples"))
        .await?;

        Ok(output)
    }
}

/// Start `num_producers` producer tasks sending into `tx`.
pub fn spawn_producers(
    ctx: ProducerContext,
    num_producers: usize,
    seed: Option<u64>,
    tx: flume::Sender<Batch>,
) -> Vec<JoinHandle<()>> {
    (0..num_producers)
        .map(|id| {
            let producer = Producer::new(id, ctx.clone(), seed);
            let tx = tx.clone();
            let exit = ctx.exit.clone();

            let future = async move {
                if let Err(err) = producer.run(tx).await {
                    error!("producer {} failed: {:?}", id, err);
                    exit.store(true, atomic::Ordering::SeqCst);
                }
            };
            tokio::spawn(future.instrument(trace_span!("producer", id)))
        })
        .collect()
}
