// Prefetching epoch iterator — bounded worker pool, strict delivery order
//
// Workers pop (batch index, entry positions) jobs from a shared queue, load
// and collate each batch, and send the tagged result through a bounded
// channel. Completion order depends on scheduling, so the consumer holds
// early arrivals in a reorder buffer and releases batches strictly in
// traversal order. The pool lives exactly as long as the iterator: dropping
// it closes the channel, which unblocks and stops every worker, and the
// threads are joined before drop returns.

use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use crate::dataset::FolderIndex;
use crate::error::Result;
use crate::loader::{load_batch, Batch};
use crate::transform::Pipeline;

type TaggedBatch = (usize, Result<Batch>);

pub(crate) struct PrefetchIter {
    rx: Option<Receiver<TaggedBatch>>,
    pending: BTreeMap<usize, Result<Batch>>,
    next_batch: usize,
    total: usize,
    handles: Vec<thread::JoinHandle<()>>,
}

impl PrefetchIter {
    pub(crate) fn spawn(
        index: Arc<FolderIndex>,
        pipeline: Arc<Pipeline>,
        batches: Vec<Vec<usize>>,
        workers: usize,
        capacity: usize,
        seed: u64,
        epoch: u64,
    ) -> Self {
        let total = batches.len();
        let (tx, rx) = mpsc::sync_channel::<TaggedBatch>(capacity.max(1));

        // Shared work queue: each worker pops the next batch to produce
        let queue = Arc::new(Mutex::new(batches.into_iter().enumerate()));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let tx: SyncSender<TaggedBatch> = tx.clone();
            let queue = Arc::clone(&queue);
            let index = Arc::clone(&index);
            let pipeline = Arc::clone(&pipeline);

            handles.push(thread::spawn(move || loop {
                let job = { queue.lock().unwrap().next() };
                let Some((batch_idx, positions)) = job else {
                    break;
                };
                let result = load_batch(&index, &pipeline, &positions, seed, epoch);
                // A send error means the consumer is gone — stop working
                if tx.send((batch_idx, result)).is_err() {
                    break;
                }
            }));
        }
        // Only worker clones remain; the channel closes when they finish
        drop(tx);

        Self {
            rx: Some(rx),
            pending: BTreeMap::new(),
            next_batch: 0,
            total,
            handles,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.total - self.next_batch
    }
}

impl Iterator for PrefetchIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_batch >= self.total {
            return None;
        }
        loop {
            if let Some(result) = self.pending.remove(&self.next_batch) {
                self.next_batch += 1;
                return Some(result);
            }
            let rx = self.rx.as_ref()?;
            match rx.recv() {
                Ok((idx, result)) => {
                    self.pending.insert(idx, result);
                }
                Err(_) => {
                    // Channel closed with batches outstanding: a worker died
                    self.next_batch = self.total;
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl Drop for PrefetchIter {
    fn drop(&mut self) {
        // Closing the receiver fails every blocked or future send, so the
        // workers fall out of their loops; then wait for them.
        self.pending.clear();
        drop(self.rx.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
