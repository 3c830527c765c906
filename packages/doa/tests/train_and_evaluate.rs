//! End-to-end: train a tiny network on synthetic windows, reload it through
//! the side-car and run every consumer of a persisted model.
//
//   cargo test -p doa --test train_and_evaluate
//

use anyhow::Result;
use candle_core::Device;
use doa::{
    FRAME_WORDS, NCHANNELS,
    audio::FrameSource,
    evaluate::{self, BatchEvalOptions},
    LabeledDataset,
    model::{ClassNames, DoaModel, class_names_path},
    trainer::{TrainError, TrainOptions, fit_observed, train_dir},
    visualize::draw_layers,
};
use std::{collections::HashMap, fs, io::Cursor, path::Path};

/// Helpers
fn window_bytes(channel0: i32) -> Vec<u8> {
    (0..FRAME_WORDS)
        .flat_map(|i| {
            let v = if i % NCHANNELS == 0 { channel0 } else { 0 };
            v.to_le_bytes()
        })
        .collect()
}

fn build_dataset(root: &Path) -> Result<()> {
    for i in 0..20 {
        let loud = root.join("45.000/0.0/1.0");
        fs::create_dir_all(&loud)?;
        fs::write(
            loud.join(format!("rec.raw_{i}")),
            window_bytes(1_500_000_000 - i * 1_000_000),
        )?;

        let quiet = root.join("silence");
        fs::create_dir_all(&quiet)?;
        fs::write(quiet.join(format!("rec.raw_{i}")), window_bytes(i))?;
    }
    Ok(())
}

fn tiny_options() -> TrainOptions {
    TrainOptions {
        epochs: 4,
        batch_size: 8,
        early_stop_pat: 2,
        hidden_layers: vec![64, 8],
        ..Default::default()
    }
}

#[test]
fn train_reload_and_evaluate() -> Result<()> {
    let data = tempfile::tempdir()?;
    let work = tempfile::tempdir()?;
    build_dataset(data.path())?;

    let model_path = work.path().join("model.safetensors");
    let debug_dir = work.path().join("debug");
    let opts = TrainOptions {
        debug_dir: Some(debug_dir.clone()),
        ..tiny_options()
    };

    /* ---------- training ---------- */
    let report = train_dir(data.path(), &model_path, &opts, &Device::Cpu)?;
    assert!(!report.history.is_empty() && report.history.len() <= opts.epochs);
    assert!((1..=opts.epochs).contains(&report.best_epoch));
    assert!((0.0..=1.0).contains(&report.final_val_accuracy));
    assert!(report.final_val_loss.is_finite());

    assert!(model_path.exists());
    assert!(!work.path().join("model.safetensors.tmp").exists());
    let side_car = class_names_path(&model_path);
    assert_eq!(side_car, work.path().join("model.json"));
    assert_eq!(
        ClassNames::load_for_model(&model_path)?.class_names,
        ["45.000", "silence"]
    );

    let history = fs::read_to_string(debug_dir.join("history.jsonl"))?;
    assert_eq!(history.lines().count(), report.history.len());
    assert!(debug_dir.join("options.json").exists());

    /* ---------- reload ---------- */
    let model = DoaModel::load(&model_path, &Device::Cpu)?;
    assert_eq!(model.class_names(), ["45.000", "silence"]);
    assert_eq!(model.net().input_dim(), FRAME_WORDS);
    assert_eq!(model.net().num_classes(), 2);

    let audio = doa::decode_frame(&window_bytes(0))?;
    let probs = model.probabilities(&audio)?;
    assert_eq!(probs.len(), 2);
    assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    let prediction = model.predict(&audio)?;
    assert!(model.class_names().contains(&prediction.class_name));

    /* ---------- batch evaluator ---------- */
    let mut out = Vec::new();
    let eval_opts = BatchEvalOptions {
        iterations: 6,
        seed: Some(3),
        ..Default::default()
    };
    let acc = evaluate::run_batch(&model, data.path(), &eval_opts, &mut out)?;
    assert_eq!(acc.total, 6);
    assert!(acc.loose >= acc.exact);
    let text = String::from_utf8(out)?;
    assert_eq!(text.lines().filter(|l| l.starts_with("Expected: ")).count(), 6);
    assert!(text.contains("Exact accuracy: "));
    assert!(text.contains("Loose accuracy: "));

    /* ---------- live evaluator ---------- */
    let mut frames = window_bytes(1_400_000_000);
    frames.extend(window_bytes(0));
    let mut source = FrameSource::from_reader(Cursor::new(frames), "test");
    let mut printer = evaluate::printer_for(&model, Vec::new());
    assert_eq!(printer.width(), 1);
    let shown = evaluate::run_live(&model, &mut source, 10, &mut printer)?;
    assert_eq!(shown, 2, "stops at end of stream");
    let screen = String::from_utf8(printer.into_inner())?;
    assert_eq!(screen.matches('\r').count(), 2);

    /* ---------- visualizer ---------- */
    let images = work.path().join("layers");
    let written = draw_layers(&model, &images)?;
    let names: Vec<String> = written
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    for expected in [
        "45.000.pgm",
        "silence.pgm",
        "dense-linear.pgm",
        "dense-sample-outputs.pgm",
        "dense-sample-outputs2.pgm",
        "dense-sample-outputs3.pgm",
        "dense-pgm-test.pgm",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
    let header = "P5\n4096 64\n65535\n";
    assert_eq!(
        fs::metadata(images.join("dense-linear.pgm"))?.len() as usize,
        header.len() + 4096 * 64 * 2
    );
    Ok(())
}

type Weights = HashMap<String, Vec<f32>>;

fn flatten(tensors: &HashMap<String, candle_core::Tensor>) -> Result<Weights> {
    let mut out = HashMap::new();
    for (name, t) in tensors {
        out.insert(name.clone(), t.flatten_all()?.to_vec1::<f32>()?);
    }
    Ok(out)
}

#[test]
fn saved_model_holds_best_epoch_weights() -> Result<()> {
    let data = tempfile::tempdir()?;
    let work = tempfile::tempdir()?;
    build_dataset(data.path())?;

    let model_path = work.path().join("best.safetensors");
    let opts = TrainOptions {
        epochs: 12,
        ..tiny_options()
    };
    let split = LabeledDataset::prepare(data.path(), opts.seed)?;
    ClassNames::new(split.class_names.clone()).save_for_model(&model_path)?;

    let mut per_epoch: HashMap<usize, Weights> = HashMap::new();
    let report = fit_observed(&split, &model_path, &opts, &Device::Cpu, |m, vars| {
        let data = vars
            .data()
            .lock()
            .map_err(|e| TrainError::Poison(e.to_string()))?;
        let mut weights = HashMap::new();
        for (name, var) in data.iter() {
            weights.insert(name.clone(), var.as_tensor().flatten_all()?.to_vec1::<f32>()?);
        }
        per_epoch.insert(m.epoch, weights);
        Ok(())
    })?;

    let ran = report.history.len();
    assert_eq!(per_epoch.len(), ran);
    assert!(
        ran == opts.epochs || ran == report.best_epoch + opts.early_stop_pat,
        "ran {ran} epochs, best {}",
        report.best_epoch
    );

    let best = &report.history[report.best_epoch - 1];
    assert!(
        report
            .history
            .iter()
            .all(|m| m.val_accuracy <= best.val_accuracy)
    );
    assert!(
        report.history[..report.best_epoch - 1]
            .iter()
            .all(|m| m.val_accuracy < best.val_accuracy),
        "best epoch is the first maximum"
    );
    assert_eq!(report.best_val_accuracy, best.val_accuracy);
    assert_eq!(report.final_val_accuracy, best.val_accuracy);

    let saved = flatten(&candle_core::safetensors::load(&model_path, &Device::Cpu)?)?;
    assert_eq!(saved, per_epoch[&report.best_epoch]);
    if report.best_epoch < ran {
        assert_ne!(saved, per_epoch[&ran], "last epoch weights were saved");
    }
    Ok(())
}

#[test]
fn missing_side_car_fails_to_load() -> Result<()> {
    let data = tempfile::tempdir()?;
    let work = tempfile::tempdir()?;
    build_dataset(data.path())?;

    let model_path = work.path().join("m.safetensors");
    let opts = TrainOptions {
        epochs: 1,
        ..tiny_options()
    };
    train_dir(data.path(), &model_path, &opts, &Device::Cpu)?;

    fs::remove_file(class_names_path(&model_path))?;
    assert!(DoaModel::load(&model_path, &Device::Cpu).is_err());
    Ok(())
}

#[test]
fn wrong_frame_size_is_rejected() {
    assert!(doa::decode_frame(&[0u8; 100]).is_err());
}
