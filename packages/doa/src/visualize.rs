//! Dense-layer kernel dumps as 16-bit grayscale bitmaps.
//!
//! Kernels are addressed Keras-style, `kernel[input][unit]`, which is the
//! transpose of the `[unit, input]` weight matrix Candle stores.
//!
//! The per-sample-channel mosaics of the first dense layer are exploratory:
//! each tries a different guess of how the flattened interleaved input maps
//! onto samples and channels, and none is known to be the meaningful one.

use std::{
    fs,
    path::{Path, PathBuf},
};

use candle_core::DType;
use thiserror::Error;

use crate::{
    constants::{KERNEL_TILE_WIDTH, NCHANNELS, PGM_MAXVAL},
    model::{DoaModel, OUTPUT_LAYER, dense_layer_name},
    pgm::{GrayImage16, PgmError},
};

#[derive(Debug, Error)]
pub enum VisualizeError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("bitmap: {0}")]
    Pgm(#[from] PgmError),
}

/// Min–max scale onto `0..=65535`; a constant input maps to zeros.
pub fn normalize_to_16bit(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if range.is_nan() || range <= 0.0 {
        return vec![0.0; values.len()];
    }
    let scale = f32::from(PGM_MAXVAL) / range;
    values.iter().map(|&v| (v - min) * scale).collect()
}

/// ReLU then scale by the maximum onto `0..=65535`; no positive value maps to zeros.
pub fn normalize_relu_to_16bit(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max.is_nan() || max <= 0.0 {
        return vec![0.0; values.len()];
    }
    let scale = f32::from(PGM_MAXVAL) / max;
    values.iter().map(|&v| v.max(0.0) * scale).collect()
}

/// Index hypothesis for one mosaic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MosaicLayout {
    /// input = ch · nsamples + sample, tile row-major
    PlanarRowTiles,
    /// input = ch · nsamples + sample, tile column-major
    PlanarColumnTiles,
    /// input = ch + sample · NCHANNELS, tile column-major
    InterleavedColumnTiles,
}

impl MosaicLayout {
    pub const ALL: [(Self, &'static str); 3] = [
        (Self::PlanarRowTiles, "-sample-outputs"),
        (Self::PlanarColumnTiles, "-sample-outputs2"),
        (Self::InterleavedColumnTiles, "-sample-outputs3"),
    ];
}

/// Mosaic of one `tile_w × tile_h` tile per (channel, sample) input word,
/// samples running horizontally and channels vertically. Each tile shows the
/// weights from that input word to every unit.
///
/// `weights` is the row-major `[units, inputs]` matrix.
pub fn sample_channel_mosaic(
    weights: &[f32],
    units: usize,
    inputs: usize,
    layout: MosaicLayout,
) -> Option<GrayImage16> {
    let tile_w = KERNEL_TILE_WIDTH;
    if units == 0 || units % tile_w != 0 || inputs % NCHANNELS != 0 {
        return None;
    }
    let tile_h = units / tile_w;
    let nsamples = inputs / NCHANNELS;
    let width = nsamples * tile_w;
    let height = NCHANNELS * tile_h;

    let mut pixels = vec![0u16; width * height];
    for ch in 0..NCHANNELS {
        for sample in 0..nsamples {
            let input = match layout {
                MosaicLayout::PlanarRowTiles | MosaicLayout::PlanarColumnTiles => {
                    ch * nsamples + sample
                }
                MosaicLayout::InterleavedColumnTiles => ch + sample * NCHANNELS,
            };
            for x in 0..tile_w {
                for y in 0..tile_h {
                    let unit = match layout {
                        MosaicLayout::PlanarRowTiles => x + y * tile_w,
                        _ => x * tile_h + y,
                    };
                    let ax = tile_w * sample + x;
                    let ay = ch * tile_h + y;
                    pixels[ay * width + ax] = weights[unit * inputs + input] as u16;
                }
            }
        }
    }
    GrayImage16::new(width, height, pixels).ok()
}

/// Diagonal gradient used to eyeball viewer support for 16-bit PGMs.
pub fn gradient_test_image(side: usize) -> Result<GrayImage16, PgmError> {
    let mut pixels = Vec::with_capacity(side * side);
    for y in 0..side {
        for x in 0..side {
            pixels.push(((x + y) * usize::from(PGM_MAXVAL) / 2 / side) as u16);
        }
    }
    GrayImage16::new(side, side, pixels)
}

fn pgm_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.pgm"))
}

/// One output-layer kernel column, reshaped to `(len / 64, 64)`.
///
/// A column whose length is not a multiple of 64 is zero-padded.
pub fn output_column_image(column: &[f32]) -> Result<GrayImage16, PgmError> {
    let mut scaled = normalize_to_16bit(column);
    let rows = scaled.len().div_ceil(KERNEL_TILE_WIDTH);
    scaled.resize(rows * KERNEL_TILE_WIDTH, 0.0);
    GrayImage16::from_matrix(rows, KERNEL_TILE_WIDTH, &scaled)
}

/// Write the kernel images of `model` into `out_dir`; returns the files written.
///
/// * `output` layer: one `<class name>.pgm` per class.
/// * first dense layer: `dense-linear.pgm`, the three sample/channel mosaics
///   and `dense-pgm-test.pgm`.
pub fn draw_layers(model: &DoaModel, out_dir: &Path) -> Result<Vec<PathBuf>, VisualizeError> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();
    let first_dense = dense_layer_name(0);

    for (name, layer) in model.net().layers() {
        // For clarity, biases are not drawn.
        let weights = layer.weight().to_dtype(DType::F32)?;
        let (units, inputs) = weights.dims2()?;

        if name == OUTPUT_LAYER {
            let rows = weights.to_vec2::<f32>()?;
            for (class, column) in model.class_names().iter().zip(rows.iter()) {
                let path = pgm_path(out_dir, class);
                output_column_image(column)?.save(&path)?;
                written.push(path);
            }
        } else if name == first_dense {
            log::info!("Dumping {name}");
            let flat = normalize_relu_to_16bit(&weights.flatten_all()?.to_vec1::<f32>()?);

            // kernel[input][unit] drawn with input horizontal == weight matrix row-major
            let path = pgm_path(out_dir, &format!("{name}-linear"));
            GrayImage16::from_scaled(inputs, units, &flat)?.save(&path)?;
            written.push(path);

            for (layout, suffix) in MosaicLayout::ALL {
                match sample_channel_mosaic(&flat, units, inputs, layout) {
                    Some(img) => {
                        let path = pgm_path(out_dir, &format!("{name}{suffix}"));
                        img.save(&path)?;
                        written.push(path);
                    }
                    None => log::warn!(
                        "{name}: {units}x{inputs} kernel does not tile into {KERNEL_TILE_WIDTH}-wide tiles, skipping {suffix}"
                    ),
                }
            }

            let path = pgm_path(out_dir, &format!("{name}-pgm-test"));
            gradient_test_image(1024)?.save(&path)?;
            written.push(path);
        }
    }
    Ok(written)
}
