//! Batched, shuffled, prefetched example streams.
//!
//! A producer thread walks the examples in streaming-shuffle order, decodes
//! each window file and hands complete batches to the consumer through a
//! bounded channel. The producer exits as soon as the stream is dropped.

use std::thread;

use candle_core::{Device, Tensor};
use crossbeam_channel::{Receiver, Sender, bounded};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    audio::read_audio_file,
    constants::{BATCH_SIZE, FRAME_WORDS, PREFETCH_BATCHES, SHUFFLE_BUFFER_BATCHES, SHUFFLE_SEED},
};

use super::{DatasetError, Example};

#[derive(Clone, Debug)]
pub struct StreamOptions {
    pub batch_size: usize,
    /// Number of examples held in the streaming shuffle buffer.
    pub shuffle_buffer: usize,
    /// Number of ready batches queued ahead of the consumer.
    pub prefetch: usize,
    pub seed: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            shuffle_buffer: BATCH_SIZE * SHUFFLE_BUFFER_BATCHES,
            prefetch: PREFETCH_BATCHES,
            seed: SHUFFLE_SEED,
        }
    }
}

/// Decoded windows (row-major, `len × FRAME_WORDS`) and their labels.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub audio: Vec<f32>,
    pub labels: Vec<u32>,
}

impl Batch {
    fn with_capacity(n: usize) -> Self {
        Self {
            audio: Vec::with_capacity(n * FRAME_WORDS),
            labels: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(input [len, FRAME_WORDS] f32, target [len] u32)` tensors.
    pub fn into_tensors(self, dev: &Device) -> candle_core::Result<(Tensor, Tensor)> {
        let n = self.len();
        let x = Tensor::from_vec(self.audio, (n, FRAME_WORDS), dev)?;
        let y = Tensor::from_vec(self.labels, (n,), dev)?;
        Ok((x, y))
    }
}

pub struct ExampleStream {
    rx: Receiver<Result<Batch, DatasetError>>,
    batches: usize,
}

impl ExampleStream {
    /// Start a producer over `examples`.
    pub fn spawn(examples: &[Example], opts: &StreamOptions) -> Result<Self, DatasetError> {
        let batch_size = opts.batch_size.max(1);
        let batches = examples.len().div_ceil(batch_size);
        let (tx, rx) = bounded(opts.prefetch.max(1));

        let order = shuffle_buffer_order(examples.len(), opts.shuffle_buffer, opts.seed);
        let queue: Vec<Example> = order.into_iter().map(|i| examples[i].clone()).collect();
        thread::Builder::new()
            .name("doa-prefetch".into())
            .spawn(move || produce(queue, batch_size, tx))?;

        Ok(Self { rx, batches })
    }

    /// Number of batches the stream will yield.
    pub fn batches(&self) -> usize {
        self.batches
    }
}

impl Iterator for ExampleStream {
    type Item = Result<Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

fn produce(queue: Vec<Example>, batch_size: usize, tx: Sender<Result<Batch, DatasetError>>) {
    let mut batch = Batch::with_capacity(batch_size);
    for ex in queue {
        match read_audio_file(&ex.path) {
            Ok(audio) => {
                batch.audio.extend(audio);
                batch.labels.push(ex.label);
            }
            Err(e) => {
                if tx.send(Err(e.into())).is_err() {
                    return;
                }
                continue;
            }
        }
        if batch.len() == batch_size {
            let full = std::mem::replace(&mut batch, Batch::with_capacity(batch_size));
            if tx.send(Ok(full)).is_err() {
                return;
            }
        }
    }
    if !batch.is_empty() {
        let _ = tx.send(Ok(batch));
    }
}

/// Visiting order of a streaming shuffle with a `buffer_size` buffer.
///
/// The first `buffer_size` indices fill the buffer; every following index
/// replaces a uniformly chosen buffered one, which is emitted. The buffer is
/// drained in random order at the end.
pub fn shuffle_buffer_order(n: usize, buffer_size: usize, seed: u64) -> Vec<usize> {
    let buffer_size = buffer_size.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf: Vec<usize> = Vec::with_capacity(buffer_size.min(n));
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        if buf.len() < buffer_size {
            buf.push(i);
            continue;
        }
        let j = rng.random_range(0..buf.len());
        out.push(std::mem::replace(&mut buf[j], i));
    }
    while !buf.is_empty() {
        let j = rng.random_range(0..buf.len());
        out.push(buf.swap_remove(j));
    }
    out
}
