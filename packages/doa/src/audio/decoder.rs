//! Raw audio window decoding.
//!
//! Every dataset file and every live frame is one inference window:
//! [`FRAME_WORDS`] interleaved signed 32-bit little-endian words
//! (8 channels × 512 samples). Decoding maps each word onto `[-1, 1]`
//! by dividing by 2³¹.

use std::{fs, path::Path};

use thiserror::Error;

use crate::constants::{FRAME_BYTES, FRAME_WORDS, FULL_SCALE};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{origin}: expected {expected} bytes of S32LE audio, got {actual}")]
    Length {
        origin: String,
        expected: usize,
        actual: usize,
    },
}

/// Split a byte buffer into little-endian `i32` words.
///
/// Trailing bytes that do not form a whole word are ignored.
pub fn read_words(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Decode one window of raw audio into normalised `f32` samples.
pub fn decode_frame(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    decode_checked(bytes, "frame")
}

/// Read and decode a raw window file.
pub fn read_audio_file<P: AsRef<Path>>(path: P) -> Result<Vec<f32>, DecodeError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    decode_checked(&bytes, &path.display().to_string())
}

fn decode_checked(bytes: &[u8], origin: &str) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() != FRAME_BYTES {
        return Err(DecodeError::Length {
            origin: origin.to_owned(),
            expected: FRAME_BYTES,
            actual: bytes.len(),
        });
    }
    let audio: Vec<f32> = read_words(bytes)
        .into_iter()
        .map(|w| w as f32 / FULL_SCALE)
        .collect();
    debug_assert_eq!(audio.len(), FRAME_WORDS);
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(words: &[i32]) -> Vec<u8> {
        let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.resize(FRAME_BYTES, 0);
        bytes
    }

    #[test]
    fn full_scale_maps_to_unit_range() {
        let bytes = frame_of(&[i32::MIN, i32::MAX, 0, 1 << 30]);
        let audio = decode_frame(&bytes).unwrap();

        assert_eq!(audio.len(), FRAME_WORDS);
        assert_eq!(audio[0], -1.0);
        assert!((audio[1] - 1.0).abs() < 1e-6);
        assert_eq!(audio[2], 0.0);
        assert_eq!(audio[3], 0.5);
    }

    #[test]
    fn short_frame_is_rejected() {
        let err = decode_frame(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Length {
                expected: FRAME_BYTES,
                actual: 16,
                ..
            }
        ));
    }

    #[test]
    fn words_are_little_endian() {
        assert_eq!(read_words(&[0x01, 0x00, 0x00, 0x80, 0xff]), vec![i32::MIN + 1]);
    }
}
