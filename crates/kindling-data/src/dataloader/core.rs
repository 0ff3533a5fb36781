//! Core DataLoader Functionality
//!
//! Batches samples from an input and runs the worker-side processor on each
//! batch. Map-style inputs can be loaded by a pool of worker threads; batches
//! are still delivered in sampler order. Iterable inputs are always read on
//! the calling thread.

use super::samplers::Sampler;
use crate::input::{Input, InputSource, IterableInput};
use crate::processor::InputTransformProcessor;
use kindling_core::{KindlingError, Result, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Configuration for DataLoader
#[derive(Debug, Clone, PartialEq)]
pub struct DataLoaderConfig {
    pub batch_size: usize,
    /// Worker threads; zero loads on the calling thread
    pub num_workers: usize,
    /// Batches buffered per worker
    pub prefetch_factor: usize,
    pub drop_last: bool,
    pub timeout: Option<Duration>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            prefetch_factor: 2,
            drop_last: false,
            timeout: None,
        }
    }
}

impl DataLoaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(KindlingError::invalid_argument_op(
                "dataloader",
                "batch_size must be greater than zero",
            ));
        }
        if self.num_workers > 0 && self.prefetch_factor == 0 {
            return Err(KindlingError::invalid_argument_op(
                "dataloader",
                "prefetch_factor must be greater than zero when num_workers > 0",
            ));
        }
        Ok(())
    }

    /// Number of batches produced from `len` samples
    pub fn num_batches(&self, len: usize) -> usize {
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }
}

/// Batched view over an input
pub struct DataLoader {
    source: InputSource,
    sampler: Arc<dyn Sampler>,
    config: DataLoaderConfig,
    processor: Arc<InputTransformProcessor>,
}

impl DataLoader {
    pub fn new(
        source: impl Into<InputSource>,
        sampler: Arc<dyn Sampler>,
        config: DataLoaderConfig,
        processor: InputTransformProcessor,
    ) -> Result<Self> {
        config.validate()?;
        let source = source.into();
        if source.is_iterable() && config.num_workers > 0 {
            log::warn!(
                "'{}' is iterable; ignoring num_workers={} and loading on the calling thread",
                source.name(),
                config.num_workers
            );
        }
        log::info!(
            "DataLoader for '{}' ({}): batch_size={}, num_workers={}, drop_last={}",
            source.name(),
            source.running_stage(),
            config.batch_size,
            config.num_workers,
            config.drop_last
        );
        Ok(Self {
            source,
            sampler,
            config,
            processor: Arc::new(processor),
        })
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn processor(&self) -> &InputTransformProcessor {
        &self.processor
    }

    pub fn sampler(&self) -> &dyn Sampler {
        self.sampler.as_ref()
    }

    /// Number of batches per pass; `None` for iterable inputs
    pub fn len(&self) -> Option<usize> {
        self.source.len().map(|len| self.config.num_batches(len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Start a pass over the data
    pub fn iter(&self) -> DataLoaderIterator {
        let processor = Arc::clone(&self.processor);
        let feed = match &self.source {
            InputSource::Iterable(input) => Feed::Stream {
                input: input.clone(),
            },
            InputSource::Map(input) => {
                let indices: Vec<usize> = self.sampler.sample_indices(input.len()).collect();
                let batches: VecDeque<Vec<usize>> = indices
                    .chunks(self.config.batch_size)
                    .filter(|chunk| !self.config.drop_last || chunk.len() == self.config.batch_size)
                    .map(<[usize]>::to_vec)
                    .collect();
                if self.config.num_workers == 0 {
                    Feed::Inline {
                        input: input.clone(),
                        batches,
                    }
                } else {
                    Feed::spawn(input.clone(), batches.into(), &self.config, Arc::clone(&processor))
                }
            }
        };
        DataLoaderIterator {
            feed,
            processor,
            batch_size: self.config.batch_size,
            drop_last: self.config.drop_last,
            timeout: self.config.timeout,
            finished: false,
        }
    }
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("source", &self.source.name())
            .field("stage", &self.source.running_stage())
            .field("config", &self.config)
            .field("random", &self.sampler.is_random())
            .finish()
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = Result<Value>;
    type IntoIter = DataLoaderIterator;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

type Delivery = (usize, Result<Value>);

enum Feed {
    Inline {
        input: Input,
        batches: VecDeque<Vec<usize>>,
    },
    Stream {
        input: IterableInput,
    },
    Workers {
        receiver: Option<Receiver<Delivery>>,
        pending: BTreeMap<usize, Result<Value>>,
        next_batch: usize,
        total_batches: usize,
        handles: Vec<thread::JoinHandle<()>>,
        shutdown: Arc<AtomicBool>,
    },
}

impl Feed {
    /// Worker `w` loads batches `w, w + n, w + 2n, ...`
    fn spawn(
        input: Input,
        batches: Vec<Vec<usize>>,
        config: &DataLoaderConfig,
        processor: Arc<InputTransformProcessor>,
    ) -> Self {
        let total_batches = batches.len();
        let batches = Arc::new(batches);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::sync_channel(config.num_workers * config.prefetch_factor);

        let handles = (0..config.num_workers.min(total_batches))
            .map(|worker| {
                let input = input.clone();
                let batches = Arc::clone(&batches);
                let processor = Arc::clone(&processor);
                let shutdown = Arc::clone(&shutdown);
                let sender = sender.clone();
                let stride = config.num_workers;
                thread::spawn(move || {
                    for batch_idx in (worker..batches.len()).step_by(stride) {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        let result = load_batch(&input, &batches[batch_idx], &processor);
                        if sender.send((batch_idx, result)).is_err() {
                            break; // Receiver has been dropped
                        }
                    }
                })
            })
            .collect();

        Feed::Workers {
            receiver: Some(receiver),
            pending: BTreeMap::new(),
            next_batch: 0,
            total_batches,
            handles,
            shutdown,
        }
    }
}

fn load_batch(input: &Input, indices: &[usize], processor: &InputTransformProcessor) -> Result<Value> {
    let samples = indices
        .iter()
        .map(|&index| input.get(index))
        .collect::<Result<Vec<_>>>()?;
    processor.process(Value::List(samples))
}

/// One pass over a [`DataLoader`]; stops after the first error
pub struct DataLoaderIterator {
    feed: Feed,
    processor: Arc<InputTransformProcessor>,
    batch_size: usize,
    drop_last: bool,
    timeout: Option<Duration>,
    finished: bool,
}

impl DataLoaderIterator {
    fn next_stream_batch(input: &mut IterableInput, batch_size: usize, drop_last: bool) -> Option<Result<Vec<Value>>> {
        let mut samples = Vec::with_capacity(batch_size);
        for item in input.by_ref().take(batch_size) {
            match item {
                Ok(sample) => samples.push(sample),
                Err(err) => return Some(Err(err)),
            }
        }
        if samples.is_empty() || (drop_last && samples.len() < batch_size) {
            None
        } else {
            Some(Ok(samples))
        }
    }

    fn next_batch(&mut self) -> Option<Result<Value>> {
        match &mut self.feed {
            Feed::Inline { input, batches } => {
                let indices = batches.pop_front()?;
                Some(load_batch(input, &indices, &self.processor))
            }
            Feed::Stream { input } => {
                let samples = Self::next_stream_batch(input, self.batch_size, self.drop_last)?;
                Some(samples.and_then(|samples| self.processor.process(Value::List(samples))))
            }
            Feed::Workers {
                receiver,
                pending,
                next_batch,
                total_batches,
                ..
            } => loop {
                if *next_batch >= *total_batches {
                    return None;
                }
                if let Some(result) = pending.remove(next_batch) {
                    *next_batch += 1;
                    return Some(result);
                }
                let receiver = receiver.as_ref()?;
                let received = match self.timeout {
                    Some(timeout) => receiver.recv_timeout(timeout),
                    None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match received {
                    Ok((batch_idx, result)) => {
                        pending.insert(batch_idx, result);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        return Some(Err(KindlingError::Io(format!(
                            "DataLoader timed out after {:?} waiting for batch {}",
                            self.timeout.unwrap_or_default(),
                            next_batch
                        ))));
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Some(Err(KindlingError::Io(format!(
                            "DataLoader workers exited before delivering batch {}",
                            next_batch
                        ))));
                    }
                }
            },
        }
    }
}

impl Iterator for DataLoaderIterator {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.next_batch();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

impl Drop for DataLoaderIterator {
    fn drop(&mut self) {
        if let Feed::Workers {
            receiver,
            handles,
            shutdown,
            ..
        } = &mut self.feed
        {
            shutdown.store(true, Ordering::Relaxed);
            // Unblock workers waiting on a full channel
            drop(receiver.take());
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
