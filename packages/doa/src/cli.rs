//! Command line interface of the `doa` tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use doa::constants::{
    BATCH_EVAL_ITERATIONS, BATCH_SIZE, EPOCHS, LIVE_EVAL_ITERATIONS, LOOSE_MATCH_TOLERANCE_DEG,
    OUT_DROP_PERCENT,
};

/// Direction-of-arrival estimation toolkit
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a training data set from raw microphone recordings
    PrepareData(PrepareCommand),

    /// Train a DOA estimation model
    Train(TrainCommand),

    /// Test the DOA estimation model
    Test(TestCommand),

    /// Test the DOA estimation model on a live recording stream
    Livetest(LivetestCommand),

    /// Draw the Dense layers in a model
    DrawLayers(DrawLayersCommand),

    /// Print the layer table of a model
    Summary(SummaryCommand),

    /// Report whether a GPU backend is usable
    CheckGpu,
}

#[derive(Parser, Debug)]
pub struct PrepareCommand {
    /// Directory with the raw microphone recordings
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output data set directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Randomly drop this percentage of windows
    #[arg(long, default_value_t = OUT_DROP_PERCENT, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub drop_percent: u32,

    /// Seed for stable output
    #[arg(long)]
    pub seed: Option<u64>,
}

// Help texts of the model arguments are kept word for word, trailing
// periods included, so they are given with `help = ...`.

#[derive(Parser, Debug)]
pub struct TrainCommand {
    #[arg(short, long, help = "Directory with audio datasets.")]
    pub input: PathBuf,

    #[arg(short, long, help = "File to write the final model.")]
    pub output: PathBuf,

    #[arg(short, long, help = "Directory to write debug training logs to.")]
    pub debug: Option<PathBuf>,

    /// Maximum number of training epochs
    #[arg(long, default_value_t = EPOCHS)]
    pub epochs: usize,

    /// Number of audio windows per training batch
    #[arg(long, default_value_t = BATCH_SIZE)]
    pub batch_size: usize,

    /// Train on the CPU even when a GPU is available
    #[arg(long)]
    pub cpu: bool,
}

#[derive(Parser, Debug)]
pub struct TestCommand {
    #[arg(short, long, help = "Directory with test vectors of audio chunks")]
    pub input: PathBuf,

    #[arg(short, long, help = "NN model file to use")]
    pub model: PathBuf,

    #[arg(short, long, default_value_t = BATCH_EVAL_ITERATIONS, help = "How much test iterations to do")]
    pub niterations: usize,

    /// Seed for the test vector picks
    #[arg(long)]
    pub seed: Option<u64>,

    /// Loose match tolerance in degrees
    #[arg(long, default_value_t = LOOSE_MATCH_TOLERANCE_DEG)]
    pub tolerance: f32,

    /// Run inference on the CPU even when a GPU is available
    #[arg(long)]
    pub cpu: bool,
}

#[derive(Parser, Debug)]
pub struct LivetestCommand {
    #[arg(short, long, required_unless_present = "demo", help = "NN model file to use")]
    pub model: Option<PathBuf>,

    #[arg(short, long, default_value_t = LIVE_EVAL_ITERATIONS, help = "How much test iterations to do")]
    pub niterations: usize,

    #[arg(
        short,
        long,
        default_value_t = -1,
        allow_negative_numbers = true,
        help = "Use the given TCP port for incoming data instead of stdin."
    )]
    pub port: i32,

    /// Sweep the protractor without a model
    #[arg(long)]
    pub demo: bool,

    /// Run inference on the CPU even when a GPU is available
    #[arg(long)]
    pub cpu: bool,
}

#[derive(Parser, Debug)]
pub struct DrawLayersCommand {
    #[arg(short, long, help = "Directory to save the drawings to.")]
    pub output: PathBuf,

    #[arg(short, long, help = "NN model file to use")]
    pub model: PathBuf,
}

#[derive(Parser, Debug)]
pub struct SummaryCommand {
    #[arg(short, long, help = "NN model file to use")]
    pub model: PathBuf,
}
