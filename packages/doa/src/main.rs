//! DOA CLI binary
//! Direction-of-arrival model preparation, training and testing using Candle ML

use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::io::{self, Write};
use std::time::Duration;

mod cli;
use cli::{
    Cli, Commands, DrawLayersCommand, LivetestCommand, PrepareCommand, SummaryCommand,
    TestCommand, TrainCommand,
};

use doa::evaluate::{self, AnglePrinter, BatchEvalOptions};
use doa::model::{self, DoaModel};
use doa::prepare::{self, PrepareOptions};
use doa::trainer::{self, TrainOptions};
use doa::{FrameSource, visualize};

/// Protractor width of `--demo`: 64 angle classes.
const DEMO_WIDTH: usize = 64;
const DEMO_STEP: Duration = Duration::from_millis(21);

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::PrepareData(cmd) => prepare_data(cmd),
        Commands::Train(cmd) => train(cmd),
        Commands::Test(cmd) => test(cmd),
        Commands::Livetest(cmd) => livetest(cmd),
        Commands::DrawLayers(cmd) => draw_layers(cmd),
        Commands::Summary(cmd) => summary(cmd),
        Commands::CheckGpu => {
            println!("GPU available: {}", model::gpu_available());
            Ok(())
        }
    }
}

fn prepare_data(cmd: PrepareCommand) -> Result<()> {
    let opts = PrepareOptions {
        drop_percent: cmd.drop_percent,
        seed: cmd.seed,
    };
    prepare::prepare_recordings(&cmd.input, &cmd.output, &opts).with_context(|| {
        format!(
            "preparing {} into {}",
            cmd.input.display(),
            cmd.output.display()
        )
    })?;
    Ok(())
}

fn train(cmd: TrainCommand) -> Result<()> {
    let dev = model::select_device(cmd.cpu).context("selecting compute device")?;
    info!("Training on {dev:?}");

    let opts = TrainOptions {
        epochs: cmd.epochs,
        batch_size: cmd.batch_size,
        debug_dir: cmd.debug,
        ..Default::default()
    };
    let report = trainer::train_dir(&cmd.input, &cmd.output, &opts, &dev)
        .with_context(|| format!("training on {}", cmd.input.display()))?;

    println!(
        "Validation loss: {:.4}, validation accuracy: {:.4} (best epoch {})",
        report.final_val_loss, report.final_val_accuracy, report.best_epoch
    );
    Ok(())
}

fn load_model(path: &std::path::Path, force_cpu: bool) -> Result<DoaModel> {
    let dev = model::select_device(force_cpu).context("selecting compute device")?;
    DoaModel::load(path, &dev).with_context(|| format!("loading model {}", path.display()))
}

fn test(cmd: TestCommand) -> Result<()> {
    let model = load_model(&cmd.model, cmd.cpu)?;
    let opts = BatchEvalOptions {
        iterations: cmd.niterations,
        tolerance_deg: cmd.tolerance,
        seed: cmd.seed,
    };
    let mut out = io::stdout().lock();
    evaluate::run_batch(&model, &cmd.input, &opts, &mut out)
        .with_context(|| format!("testing on {}", cmd.input.display()))?;
    Ok(())
}

fn livetest(cmd: LivetestCommand) -> Result<()> {
    if cmd.demo {
        let mut printer = AnglePrinter::new(io::stdout(), DEMO_WIDTH);
        printer.demo(DEMO_STEP)?;
        return Ok(());
    }

    let Some(model_path) = cmd.model else {
        bail!("--model is required unless --demo is given");
    };
    let model = load_model(&model_path, cmd.cpu)?;

    let mut source = if cmd.port > 0 {
        let port = u16::try_from(cmd.port).with_context(|| format!("invalid port {}", cmd.port))?;
        FrameSource::tcp(port).with_context(|| format!("listening on port {port}"))?
    } else {
        FrameSource::stdin()
    };

    let mut printer = evaluate::printer_for(&model, io::stdout());
    evaluate::run_live(&model, &mut source, cmd.niterations, &mut printer)
        .with_context(|| format!("live test on {}", source.origin()))?;
    println!();
    io::stdout().flush()?;
    Ok(())
}

fn draw_layers(cmd: DrawLayersCommand) -> Result<()> {
    let model = load_model(&cmd.model, true)?;
    let written = visualize::draw_layers(&model, &cmd.output)
        .with_context(|| format!("drawing layers into {}", cmd.output.display()))?;
    info!("Wrote {} images to {}", written.len(), cmd.output.display());
    Ok(())
}

fn summary(cmd: SummaryCommand) -> Result<()> {
    let model = load_model(&cmd.model, true)?;
    println!("{}", model.net().summary());
    println!("Classes: {}", model.class_names().join(", "));
    Ok(())
}
