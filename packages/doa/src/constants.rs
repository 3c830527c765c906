/// NCHANNELS is the number of interleaved microphone channels in every recording.
pub const NCHANNELS: usize = 8;

/// SAMPLES_PER_SECOND is the per-channel sample rate of the array recordings.
pub const SAMPLES_PER_SECOND: usize = 24000;

/// DATASET_NSAMPLES is the number of per-channel samples in one inference window.
pub const DATASET_NSAMPLES: usize = 512;

/// FRAME_WORDS is the number of S32LE words in one inference window.
pub const FRAME_WORDS: usize = NCHANNELS * DATASET_NSAMPLES;

/// FRAME_BYTES is the on-disk / on-wire size of one inference window.
pub const FRAME_BYTES: usize = FRAME_WORDS * std::mem::size_of::<i32>();

/// FULL_SCALE is the divisor mapping signed 32-bit samples onto [-1, 1].
pub const FULL_SCALE: f32 = 2_147_483_648.0;

/// SILENCE_LABEL is the class name of windows without a sound source.
pub const SILENCE_LABEL: &str = "silence";

/// DATASET_FILE_MARKER must appear in the name of every dataset window file.
pub const DATASET_FILE_MARKER: &str = "raw_";

// Training

/// VALID_SPLIT is the fraction of the shuffled dataset held out for validation.
pub const VALID_SPLIT: f32 = 0.1;

/// BATCH_SIZE is the number of windows per training batch.
pub const BATCH_SIZE: usize = 32;

/// EPOCHS caps the number of training epochs.
pub const EPOCHS: usize = 100;

/// SHUFFLE_SEED seeds every dataset shuffle.
pub const SHUFFLE_SEED: u64 = 42;

/// LEARNING_RATE is the Adam step size.
pub const LEARNING_RATE: f64 = 0.001;

/// EARLY_STOP_PATIENCE is the number of epochs without a validation accuracy
/// improvement after which training stops.
pub const EARLY_STOP_PATIENCE: usize = 8;

/// SHUFFLE_BUFFER_BATCHES sizes the streaming shuffle buffer in batches.
pub const SHUFFLE_BUFFER_BATCHES: usize = 8;

/// PREFETCH_BATCHES is the depth of the producer → trainer batch queue.
pub const PREFETCH_BATCHES: usize = 4;

/// HIDDEN_LAYERS lists the widths of the ReLU dense stack, input side first.
pub const HIDDEN_LAYERS: [usize; 8] = [4096, 4096, 1024, 1024, 512, 512, 256, 256];

/// MODEL_EXTENSION is the mandatory extension of a persisted weights file.
pub const MODEL_EXTENSION: &str = "safetensors";

/// CLASS_NAMES_EXTENSION is the extension of the side-car class-name file.
pub const CLASS_NAMES_EXTENSION: &str = "json";

// Evaluation

/// LOOSE_MATCH_TOLERANCE_DEG is the angular distance still counted as a loose hit.
pub const LOOSE_MATCH_TOLERANCE_DEG: f32 = 11.25;

/// BATCH_EVAL_ITERATIONS is the default number of random files the batch evaluator scores.
pub const BATCH_EVAL_ITERATIONS: usize = 10;

/// LIVE_EVAL_ITERATIONS is the default number of frames the live evaluator consumes.
pub const LIVE_EVAL_ITERATIONS: usize = 100;

// Visualisation

/// PGM_MAXVAL is the maximum sample value written to 16-bit bitmaps.
pub const PGM_MAXVAL: u16 = u16::MAX;

/// KERNEL_TILE_WIDTH is the width of one reshaped kernel column / tile.
pub const KERNEL_TILE_WIDTH: usize = 64;

// Recording preparation

/// INITIAL_SKIP_S skips the start-of-recording glitch of the USB microphones.
pub const INITIAL_SKIP_S: f64 = 0.5;

/// SILENCE_TRAINING_S is the known-silent stretch used to learn the noise floor.
pub const SILENCE_TRAINING_S: f64 = 1.0;

/// VALID_SAMPLE_THRESHOLD scales the loudest silent sample into the activity threshold.
pub const VALID_SAMPLE_THRESHOLD: f64 = 1.1;

/// VALID_SAMPLES_PERCENT is the share of loud words that makes a chunk active.
pub const VALID_SAMPLES_PERCENT: f64 = 10.0;

/// OUT_DROP_PERCENT is the default share of prepared windows randomly discarded.
pub const OUT_DROP_PERCENT: u32 = 95;
