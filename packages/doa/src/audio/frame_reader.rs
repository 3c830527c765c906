//! Blocking source of fixed-size raw audio frames.
//!
//! The live evaluator reads either from standard input (e.g. piped from
//! `arecord -c8 -t raw -f S32_LE -r24000`) or from the first client that
//! connects to a TCP port. Reads block until a whole frame has arrived;
//! there is no timeout and no cancellation.

use std::{
    io::{self, Read},
    net::TcpListener,
};

use crate::constants::FRAME_BYTES;

use super::decoder::{DecodeError, decode_frame};

pub struct FrameSource {
    inner: Box<dyn Read>,
    origin: String,
}

impl FrameSource {
    /// Read frames from the process' standard input.
    pub fn stdin() -> Self {
        Self::from_reader(io::stdin().lock(), "stdin")
    }

    /// Listen on `0.0.0.0:port`, accept exactly one client and read from it.
    pub fn tcp(port: u16) -> io::Result<Self> {
        Self::accept(TcpListener::bind(("0.0.0.0", port))?)
    }

    /// Accept exactly one client on `listener` and read from it.
    ///
    /// The listener is dropped once the client is connected.
    pub fn accept(listener: TcpListener) -> io::Result<Self> {
        log::info!("Waiting for an audio stream on {} ...", listener.local_addr()?);
        let (conn, peer) = listener.accept()?;
        log::info!("Accepted audio stream from {peer}");
        Ok(Self::from_reader(conn, &peer.to_string()))
    }

    /// Wrap an arbitrary byte stream.
    pub fn from_reader<R: Read + 'static>(reader: R, origin: &str) -> Self {
        Self {
            inner: Box::new(reader),
            origin: origin.to_owned(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Block until one full frame is available and decode it.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
    pub fn read_frame(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        let mut buf = vec![0u8; FRAME_BYTES];
        let mut filled = 0;
        while filled < FRAME_BYTES {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(DecodeError::Length {
                        origin: self.origin.clone(),
                        expected: FRAME_BYTES,
                        actual: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        decode_frame(&buf).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per `read` call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn short_reads_are_accumulated() {
        let mut bytes = vec![0u8; FRAME_BYTES * 2];
        bytes[FRAME_BYTES..FRAME_BYTES + 4].copy_from_slice(&(1i32 << 30).to_le_bytes());
        let mut src = FrameSource::from_reader(
            Trickle {
                data: Cursor::new(bytes),
                step: 1000,
            },
            "test",
        );

        let first = src.read_frame().unwrap().unwrap();
        assert!(first.iter().all(|&v| v == 0.0));
        let second = src.read_frame().unwrap().unwrap();
        assert_eq!(second[0], 0.5);
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn tcp_client_frames_then_partial_tail() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || {
            let mut conn = std::net::TcpStream::connect(addr).unwrap();
            let mut bytes = vec![0u8; FRAME_BYTES + FRAME_BYTES / 2];
            bytes[..4].copy_from_slice(&(-(1i32 << 30)).to_le_bytes());
            io::Write::write_all(&mut conn, &bytes).unwrap();
        });

        let mut src = FrameSource::accept(listener).unwrap();
        assert!(src.origin().starts_with("127.0.0.1:"));
        let frame = src.read_frame().unwrap().unwrap();
        assert_eq!(frame.len(), FRAME_BYTES / 4);
        assert_eq!(frame[0], -0.5);

        client.join().unwrap();
        assert!(matches!(
            src.read_frame(),
            Err(DecodeError::Length { actual, .. }) if actual == FRAME_BYTES / 2
        ));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut src = FrameSource::from_reader(Cursor::new(vec![0u8; 100]), "test");
        assert!(matches!(
            src.read_frame(),
            Err(DecodeError::Length { actual: 100, .. })
        ));
    }
}
