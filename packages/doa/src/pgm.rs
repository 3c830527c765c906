//! Binary 16-bit grayscale PGM (`P5`, maxval 65535) writer.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use thiserror::Error;

use crate::constants::PGM_MAXVAL;

#[derive(Debug, Error)]
pub enum PgmError {
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("{width}x{height} image needs {expected} pixels, got {actual}")]
    PixelCount {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
}

/// Row-major 16-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage16 {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
}

impl GrayImage16 {
    pub fn new(width: usize, height: usize, pixels: Vec<u16>) -> Result<Self, PgmError> {
        if pixels.len() != width * height {
            return Err(PgmError::PixelCount {
                width,
                height,
                expected: width * height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build from already scaled `f32` samples; values are truncated and
    /// saturated into `0..=65535`.
    pub fn from_scaled(width: usize, height: usize, values: &[f32]) -> Result<Self, PgmError> {
        Self::new(width, height, values.iter().map(|&v| v as u16).collect())
    }

    /// Render a row-major `rows × cols` matrix with the first axis running
    /// horizontally: width = `rows`, height = `cols`, pixel (x, y) = m[x][y].
    pub fn from_matrix(rows: usize, cols: usize, m: &[f32]) -> Result<Self, PgmError> {
        if m.len() != rows * cols {
            return Err(PgmError::PixelCount {
                width: rows,
                height: cols,
                expected: rows * cols,
                actual: m.len(),
            });
        }
        let mut pixels = vec![0u16; rows * cols];
        for x in 0..rows {
            for y in 0..cols {
                pixels[y * rows + x] = m[x * cols + y] as u16;
            }
        }
        Self::new(rows, cols, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    pub fn header(&self) -> String {
        format!("P5\n{} {}\n{}\n", self.width, self.height, PGM_MAXVAL)
    }

    /// Exact size of the encoded file.
    pub fn encoded_len(&self) -> usize {
        self.header().len() + self.pixels.len() * 2
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(self.header().as_bytes())?;
        for px in &self.pixels {
            w.write_all(&px.to_be_bytes())?;
        }
        w.flush()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PgmError> {
        let f = File::create(path)?;
        self.write_to(BufWriter::new(f))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_size_is_header_plus_two_bytes_per_pixel() {
        let img = GrayImage16::new(3, 2, vec![0, 1, 2, 3, 4, 65535]).unwrap();
        let mut buf = Vec::new();
        img.write_to(&mut buf).unwrap();

        let header = b"P5\n3 2\n65535\n";
        assert_eq!(buf.len(), 3 * 2 * 2 + header.len());
        assert_eq!(buf.len(), img.encoded_len());
        assert_eq!(&buf[..header.len()], header);
        assert_eq!(&buf[header.len()..header.len() + 4], &[0, 0, 0, 1]);
        assert_eq!(&buf[buf.len() - 2..], &[0xff, 0xff]);
    }

    #[test]
    fn wrong_pixel_count_is_rejected() {
        assert!(matches!(
            GrayImage16::new(2, 2, vec![0; 3]),
            Err(PgmError::PixelCount { expected: 4, .. })
        ));
    }

    #[test]
    fn matrix_first_axis_runs_horizontally() {
        // 2 rows × 3 cols
        let m = [0.0, 1.0, 2.0, 10.0, 11.0, 12.0];
        let img = GrayImage16::from_matrix(2, 3, &m).unwrap();
        assert_eq!((img.width(), img.height()), (2, 3));
        assert_eq!(img.pixel(1, 0), Some(10));
        assert_eq!(img.pixel(0, 2), Some(2));
        assert_eq!(img.pixel(2, 0), None);
    }

    #[test]
    fn scaled_values_saturate() {
        let img = GrayImage16::from_scaled(3, 1, &[-4.0, 70000.0, 1234.9]).unwrap();
        assert_eq!(img.pixel(0, 0), Some(0));
        assert_eq!(img.pixel(1, 0), Some(65535));
        assert_eq!(img.pixel(2, 0), Some(1234));
    }
}
