//! Recording preparation over synthetic array recordings.
//
//   cargo test -p doa --test prepare
//

use anyhow::Result;
use doa::{
    FRAME_WORDS, NCHANNELS, SAMPLES_PER_SECOND,
    audio::read_words,
    dataset::LabeledDataset,
    prepare::{PrepareOptions, prepare_recordings},
};
use std::{fs, path::Path};

/// Words before the first data chunk: 0.5 s glitch + 1 s silence training.
const DATA_START: usize = (SAMPLES_PER_SECOND / 2 + SAMPLES_PER_SECOND) * NCHANNELS;

fn write_recording(path: &Path, chunks: &[Option<i32>]) -> Result<()> {
    let mut words: Vec<i32> = (0..DATA_START).map(|i| (i % 7) as i32 - 3).collect();
    for chunk in chunks {
        match chunk {
            // loud: every channel c carries value + c
            Some(v) => words.extend((0..FRAME_WORDS).map(|i| v + (i % NCHANNELS) as i32)),
            None => words.extend(std::iter::repeat_n(0, FRAME_WORDS)),
        }
    }
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(path, bytes)?;
    Ok(())
}

fn keep_all() -> PrepareOptions {
    PrepareOptions {
        drop_percent: 0,
        seed: Some(1),
    }
}

#[test]
fn speech_and_silence_become_labeled_windows() -> Result<()> {
    let rec = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    write_recording(&rec.path().join("output-silence.raw"), &[None, None, None])?;
    write_recording(
        &rec.path().join("output-0deg-0elev-1.0m.raw"),
        &[Some(1000), None, Some(2000)],
    )?;
    fs::write(rec.path().join("notes.txt"), b"ignored")?;

    let stats = prepare_recordings(rec.path(), out.path(), &keep_all())?;
    // 3 silence chunks + 2 active speech chunks × 8 rotations
    assert_eq!(stats.chunks, 5);
    assert_eq!(stats.written, 3 + 2 * NCHANNELS);

    let ds = LabeledDataset::from_dir(out.path())?;
    assert_eq!(
        ds.class_names,
        [
            "0.000", "135.000", "180.000", "225.000", "270.000", "315.000", "45.000", "90.000",
            "silence"
        ]
    );
    assert_eq!(ds.examples.len(), 19);

    // first active chunk, unrotated: channel 0 raw, the rest relative to it
    let first = out
        .path()
        .join("0.000/0.0/1.0")
        .join(format!("output-0deg-0elev-1.0m.raw_{DATA_START}"));
    let words = read_words(&fs::read(first)?);
    assert_eq!(words.len(), FRAME_WORDS);
    assert_eq!(&words[..NCHANNELS], &[1000, 1, 2, 3, 4, 5, 6, 7]);

    // one sector on: old channel 7 is the new reference
    let rotated = out
        .path()
        .join("45.000/0.0/1.0")
        .join(format!("output-0deg-0elev-1.0m.raw_{DATA_START}"));
    let words = read_words(&fs::read(rotated)?);
    assert_eq!(&words[..NCHANNELS], &[1007, -7, -6, -5, -4, -3, -2, -1]);
    Ok(())
}

#[test]
fn full_drop_writes_nothing() -> Result<()> {
    let rec = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    write_recording(&rec.path().join("output-silence.raw"), &[None, None])?;

    let opts = PrepareOptions {
        drop_percent: 100,
        seed: None,
    };
    let stats = prepare_recordings(rec.path(), out.path(), &opts)?;
    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.written, 0);
    Ok(())
}

#[test]
fn short_recording_is_an_error() -> Result<()> {
    let rec = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    fs::write(rec.path().join("output-silence.raw"), [0u8; 64])?;
    assert!(prepare_recordings(rec.path(), out.path(), &keep_all()).is_err());
    Ok(())
}

#[test]
fn malformed_recording_name_is_an_error() -> Result<()> {
    let rec = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    write_recording(&rec.path().join("output-northdeg-0elev-1.0m.raw"), &[None])?;
    assert!(prepare_recordings(rec.path(), out.path(), &keep_all()).is_err());
    Ok(())
}
