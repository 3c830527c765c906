/// Raw S32LE window decoding.
pub mod decoder;
/// Blocking fixed-size frame source (stdin / TCP).
pub mod frame_reader;

pub use decoder::{DecodeError, decode_frame, read_audio_file, read_words};
pub use frame_reader::FrameSource;
