//! Turn long raw microphone-array recordings into labeled dataset windows.
//!
//! Recordings are S32LE, [`NCHANNELS`] interleaved channels at
//! [`SAMPLES_PER_SECOND`]. Each one starts with a short glitch followed by
//! a known-silent stretch used to learn the noise floor; the remainder is
//! cut into [`FRAME_WORDS`]-word chunks.
//!
//! * `output-silence*.raw`: every chunk is a `silence` window.
//! * `output-<angle>deg-<elev>elev-<dist>m.raw`: speech played from `angle`
//!   (between mic 0 and mic 1). Only active chunks are kept, and each one is
//!   written eight times with the channels rotated to simulate the other
//!   seven 45° sectors.

use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;

use crate::{
    audio::read_words,
    constants::{
        FRAME_WORDS, INITIAL_SKIP_S, NCHANNELS, OUT_DROP_PERCENT,
        SAMPLES_PER_SECOND, SILENCE_LABEL, SILENCE_TRAINING_S, VALID_SAMPLE_THRESHOLD,
        VALID_SAMPLES_PERCENT,
    },
};

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} has invalid filename")]
    FileName(String),
    #[error("input file {path} is too short ({words} words, need more than {needed})")]
    TooShort {
        path: PathBuf,
        words: usize,
        needed: usize,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PrepareError + '_ {
    move |source| PrepareError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Clone, Debug)]
pub struct PrepareOptions {
    /// Percentage (0..=100) of windows randomly discarded
    pub drop_percent: u32,
    /// Fixed seed for the drop decisions; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            drop_percent: OUT_DROP_PERCENT,
            seed: None,
        }
    }
}

/// Physical setup of one speech recording, taken from its file name.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordingParams {
    pub subangle: f32,
    pub elev: i32,
    pub distance: f32,
}

impl RecordingParams {
    /// Parse `output-05.625deg-0elev-1.0m.raw`.
    pub fn parse(file_name: &str) -> Result<Self, PrepareError> {
        let bad = || PrepareError::FileName(file_name.to_owned());
        let rest = file_name.strip_prefix("output-").ok_or_else(bad)?;
        let (angle, rest) = rest.split_once("deg-").ok_or_else(bad)?;
        let (elev, rest) = rest.split_once("elev-").ok_or_else(bad)?;
        let distance = rest.strip_suffix("m.raw").ok_or_else(bad)?;
        Ok(Self {
            subangle: angle.parse().map_err(|_| bad())?,
            elev: elev.parse().map_err(|_| bad())?,
            distance: distance.parse().map_err(|_| bad())?,
        })
    }

    /// Class directory (plus elevation and distance sub-directories) of the
    /// recording rotated by `mic_offs` sectors.
    pub fn angle_dir(&self, mic_offs: usize) -> PathBuf {
        let angle = self.subangle + mic_offs as f32 * (360.0 / NCHANNELS as f32);
        PathBuf::from(format!("{angle:.3}"))
            .join(format!("{:.1}", self.elev as f32))
            .join(format!("{:.1}", self.distance))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecordingKind {
    Silence,
    Speech(RecordingParams),
}

/// Noise floor learned from the silent stretch of a recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoiseFloor {
    pub silence_max: u32,
    /// A word is loud when `|v| >= threshold`.
    pub threshold: u32,
    /// First word after the silence-training stretch.
    pub data_start: usize,
}

/// Offset in words of `secs` seconds of audio.
fn secs_to_words(secs: f64) -> usize {
    (SAMPLES_PER_SECOND as f64 * secs).floor() as usize * NCHANNELS
}

/// Minimum loud words for a chunk to count as active.
pub fn active_word_threshold() -> usize {
    (FRAME_WORDS as f64 * VALID_SAMPLES_PERCENT / 100.0) as usize
}

impl NoiseFloor {
    /// Skip the start-up glitch and take the loudest word of the following
    /// known-silent stretch. `None` when the recording ends before any data.
    pub fn learn(words: &[i32]) -> Option<Self> {
        let silence_start = secs_to_words(INITIAL_SKIP_S);
        let data_start = silence_start + secs_to_words(SILENCE_TRAINING_S);
        if data_start >= words.len() {
            return None;
        }
        let silence_max = words[silence_start..data_start]
            .iter()
            .map(|v| v.unsigned_abs())
            .max()
            .unwrap_or(0);
        Some(Self {
            silence_max,
            threshold: (f64::from(silence_max) * VALID_SAMPLE_THRESHOLD) as u32,
            data_start,
        })
    }

    pub fn is_active(&self, chunk: &[i32]) -> bool {
        let loud = chunk
            .iter()
            .filter(|v| v.unsigned_abs() >= self.threshold)
            .count();
        loud >= active_word_threshold()
    }
}

/// Rotate the channels of an interleaved chunk by `mic_offs` positions
/// (`out[(ch + mic_offs) % 8] = in[ch]`), then replace channels 1..8 by
/// their difference from channel 0. Channel 0 keeps the raw signal.
pub fn rotate_and_difference(chunk: &[i32], mic_offs: usize) -> Vec<i32> {
    let mut data = vec![0i32; chunk.len()];
    for (src, dst) in chunk
        .chunks_exact(NCHANNELS)
        .zip(data.chunks_exact_mut(NCHANNELS))
    {
        for ch in 0..NCHANNELS {
            dst[(ch + mic_offs) % NCHANNELS] = src[ch];
        }
        let base = dst[0];
        for v in &mut dst[1..] {
            *v = v.wrapping_sub(base);
        }
    }
    data
}

/// Per-recording outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingStats {
    /// Chunks accepted for output (before random dropping)
    pub chunks: usize,
    /// Window files actually written
    pub written: usize,
}

/// Writes the windows of one or more recordings below an output root.
pub struct Preparer {
    out_dir: PathBuf,
    drop_percent: u32,
    rng: StdRng,
}

impl Preparer {
    pub fn new(out_dir: &Path, opts: &PrepareOptions) -> Self {
        let rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            out_dir: out_dir.to_path_buf(),
            drop_percent: opts.drop_percent,
            rng,
        }
    }

    fn save_window(
        &mut self,
        dir: &Path,
        src_name: &str,
        chunk_i: usize,
        words: &[i32],
    ) -> Result<bool, PrepareError> {
        if self.rng.random_range(0..100) < self.drop_percent {
            return Ok(false);
        }
        let dir = self.out_dir.join(dir);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let dst = dir.join(format!("{src_name}_{chunk_i}"));
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        fs::write(&dst, bytes).map_err(io_err(&dst))?;
        Ok(true)
    }

    /// Cut one recording into windows.
    pub fn process(
        &mut self,
        path: &Path,
        kind: RecordingKind,
    ) -> Result<RecordingStats, PrepareError> {
        log::info!("Processing {} ...", path.display());
        let src_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let words = read_words(&fs::read(path).map_err(io_err(path))?);
        let floor = NoiseFloor::learn(&words).ok_or_else(|| PrepareError::TooShort {
            path: path.to_path_buf(),
            words: words.len(),
            needed: secs_to_words(INITIAL_SKIP_S) + secs_to_words(SILENCE_TRAINING_S),
        })?;
        log::debug!(
            "    Max silence sample: {:#x}, threshold {}, data scan index {}, active above {}/{}",
            floor.silence_max,
            floor.threshold,
            floor.data_start,
            active_word_threshold(),
            FRAME_WORDS
        );

        let mut stats = RecordingStats::default();
        let mut chunk_i = floor.data_start;
        while chunk_i + FRAME_WORDS <= words.len() {
            let chunk = &words[chunk_i..chunk_i + FRAME_WORDS];
            match kind {
                RecordingKind::Silence => {
                    stats.chunks += 1;
                    if self.save_window(Path::new(SILENCE_LABEL), &src_name, chunk_i, chunk)? {
                        stats.written += 1;
                    }
                }
                RecordingKind::Speech(params) if floor.is_active(chunk) => {
                    stats.chunks += 1;
                    for mic_offs in 0..NCHANNELS {
                        let data = rotate_and_difference(chunk, mic_offs);
                        if self.save_window(&params.angle_dir(mic_offs), &src_name, chunk_i, &data)? {
                            stats.written += 1;
                        }
                    }
                }
                RecordingKind::Speech(_) => {}
            }
            chunk_i += FRAME_WORDS;
        }

        log::info!(
            "    Number of data chunks recorded: {} ({}%)",
            stats.chunks,
            (stats.chunks * FRAME_WORDS * 100) / words.len().max(1)
        );
        Ok(stats)
    }
}

fn is_silence_recording(name: &str) -> bool {
    name.starts_with("output-silence") && name.ends_with(".raw")
}

fn is_speech_recording(name: &str) -> bool {
    name.strip_prefix("output-")
        .and_then(|r| r.split_once("deg-"))
        .and_then(|(_, r)| r.split_once("elev-"))
        .is_some_and(|(_, r)| r.ends_with("m.raw"))
}

/// Silence recordings then speech recordings found directly in `input_dir`,
/// each group in file name order.
pub fn discover_recordings(input_dir: &Path) -> Result<Vec<(PathBuf, RecordingKind)>, PrepareError> {
    let mut silence = Vec::new();
    let mut speech = Vec::new();
    for entry in fs::read_dir(input_dir).map_err(io_err(input_dir))? {
        let path = entry.map_err(io_err(input_dir))?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_silence_recording(name) {
            silence.push((name.to_owned(), path));
        } else if is_speech_recording(name) {
            let params = RecordingParams::parse(name)?;
            speech.push((name.to_owned(), path, params));
        }
    }
    silence.sort_by(|a, b| a.0.cmp(&b.0));
    speech.sort_by(|a, b| a.0.cmp(&b.0));
    if silence.len() > 1 {
        log::warn!(
            "{} silence recordings found; all are written to the same class",
            silence.len()
        );
    }

    Ok(silence
        .into_iter()
        .map(|(_, p)| (p, RecordingKind::Silence))
        .chain(
            speech
                .into_iter()
                .map(|(_, p, params)| (p, RecordingKind::Speech(params))),
        )
        .collect())
}

/// Prepare every recording in `input_dir` into the dataset at `output_dir`.
pub fn prepare_recordings(
    input_dir: &Path,
    output_dir: &Path,
    opts: &PrepareOptions,
) -> Result<RecordingStats, PrepareError> {
    let recordings = discover_recordings(input_dir)?;
    log::info!(
        "Found {} recordings in {}",
        recordings.len(),
        input_dir.display()
    );
    let mut preparer = Preparer::new(output_dir, opts);
    let mut total = RecordingStats::default();
    for (path, kind) in recordings {
        let stats = preparer.process(&path, kind)?;
        total.chunks += stats.chunks;
        total.written += stats.written;
    }
    log::info!(
        "Wrote {} window files from {} chunks to {}",
        total.written,
        total.chunks,
        output_dir.display()
    );
    Ok(total)
}
