//! The dataset read cursor and its coordinator.

use crate::{
    common::*,
    data::{DescriptorSet, SampleDescriptor},
};
use tokio::task::JoinHandle;

pub use coordinator::*;
pub use dataset_index::*;

mod dataset_index {
    use super::*;

    /// The end-of-epoch behavior of the index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum IndexMode {
        /// Wrap around to the start, optionally reshuffling. A trailing window
        /// shorter than the request is skipped.
        Train { shuffle: bool },
        /// Walk through the samples once, then report exhaustion.
        Eval,
    }

    /// The descriptors handed out by one `next` call.
    #[derive(Debug, Clone)]
    pub struct IndexSlice {
        pub descriptors: Vec<Arc<SampleDescriptor>>,
        /// The cursor at the slice start divided by the dataset size.
        pub progress: R64,
    }

    /// Ordered descriptors with a read cursor.
    #[derive(Debug)]
    pub struct DatasetIndex {
        descriptors: DescriptorSet,
        order: Vec<usize>,
        cursor: usize,
        mode: IndexMode,
        exhausted: bool,
        rng: StdRng,
    }

    impl DatasetIndex {
        pub fn new(descriptors: DescriptorSet, mode: IndexMode, rng: StdRng) -> Self {
            let order = (0..descriptors.len()).collect();
            let mut index = Self {
                descriptors,
                order,
                cursor: 0,
                mode,
                exhausted: false,
                rng,
            };
            if let IndexMode::Train { shuffle: true } = mode {
                index.shuffle();
            }
            index
        }

        pub fn len(&self) -> usize {
            self.order.len()
        }

        pub fn is_empty(&self) -> bool {
            self.order.is_empty()
        }

        pub fn cursor(&self) -> usize {
            self.cursor
        }

        pub fn is_exhausted(&self) -> bool {
            self.exhausted
        }

        /// The current permutation of descriptor positions.
        pub fn order(&self) -> &[usize] {
            &self.order
        }

        /// Draw a fresh permutation of all descriptor positions.
        pub fn shuffle(&mut self) {
            self.order.shuffle(&mut self.rng);
        }

        /// Take the next `n` descriptors and advance the cursor.
        ///
        /// Returns `None` once the index is exhausted. A training index is
        /// exhausted only when it cannot serve `n` samples at all.
        pub fn next(&mut self, n: usize) -> Option<IndexSlice> {
            if self.exhausted {
                return None;
            }
            let len = self.len();

            let range = match self.mode {
                IndexMode::Train { shuffle } => {
                    if n == 0 || n > len {
                        self.exhausted = true;
                        return None;
                    }
                    if self.cursor + n > len {
                        if shuffle {
                            self.shuffle();
                        }
                        self.cursor = 0;
                    }
                    self.cursor..(self.cursor + n)
                }
                IndexMode::Eval => {
                    if self.cursor >= len {
                        self.exhausted = true;
                        return None;
                    }
                    self.cursor..(self.cursor + n).min(len)
                }
            };

            let progress = r64(range.start as f64 / len as f64);
            self.cursor = range.end;

            let descriptors = self.order[range]
                .iter()
                .filter_map(|&position| self.descriptors.get(position).cloned())
                .collect();

            Some(IndexSlice {
                descriptors,
                progress,
            })
        }

        /// Move the cursor back to the start, reshuffling if enabled.
        pub fn rewind(&mut self) {
            if let IndexMode::Train { shuffle: true } = self.mode {
                self.shuffle();
            }
            self.cursor = 0;
        }
    }
}

mod coordinator {
    use super::*;

    #[derive(Debug)]
    enum IndexRequest {
        Next {
            n: usize,
            reply: oneshot::Sender<Option<IndexSlice>>,
        },
        Rewind {
            reply: oneshot::Sender<()>,
        },
        Cursor {
            reply: oneshot::Sender<usize>,
        },
    }

    /// The message-passing interface to a [DatasetIndex] owned by a coordinator task.
    ///
    /// Producers hold handles only, so cursor updates are serialized by the
    /// coordinator. The coordinator stops when the last handle is dropped.
    #[derive(Debug, Clone)]
    pub struct IndexHandle {
        tx: mpsc::Sender<IndexRequest>,
    }

    impl IndexHandle {
        /// Spawn the coordinator task. The join handle yields the index back on shutdown.
        pub fn spawn(mut index: DatasetIndex, buf_size: usize) -> (Self, JoinHandle<DatasetIndex>) {
            let (tx, mut rx) = mpsc::channel(buf_size.max(1));

            let future = async move {
                while let Some(request) = rx.recv().await {
                    match request {
                        IndexRequest::Next { n, reply } => {
                            let slice = index.next(n);
                            trace!(
                                "serve {} descriptors, cursor at {}",
                                slice.as_ref().map(|slice| slice.descriptors.len()).unwrap_or(0),
                                index.cursor()
                            );
                            let _ = reply.send(slice);
                        }
                        IndexRequest::Rewind { reply } => {
                            index.rewind();
                            debug!("rewind dataset index");
                            let _ = reply.send(());
                        }
                        IndexRequest::Cursor { reply } => {
                            let _ = reply.send(index.cursor());
                        }
                    }
                }
                index
            };
            let join = tokio::spawn(future.instrument(trace_span!("index_coordinator")));

            (Self { tx }, join)
        }

        /// Request the next `n` descriptors. `None` means the index is exhausted.
        pub async fn next(&self, n: usize) -> Result<Option<IndexSlice>> {
            let (reply, rx) = oneshot::channel();
            self.request(IndexRequest::Next { n, reply }).await?;
            rx.await.map_err(|_| stopped())
        }

        pub async fn rewind(&self) -> Result<()> {
            let (reply, rx) = oneshot::channel();
            self.request(IndexRequest::Rewind { reply }).await?;
            rx.await.map_err(|_| stopped())
        }

        pub async fn cursor(&self) -> Result<usize> {
            let (reply, rx) = oneshot::channel();
            self.request(IndexRequest::Cursor { reply }).await?;
            rx.await.map_err(|_| stopped())
        }

        async fn request(&self, request: IndexRequest) -> Result<()> {
            self.tx.send(request).await.map_err(|_| stopped())
        }
    }

    fn stopped() -> Error {
        format_err!("the index coordinator has stopped")
    }
}
