//! One-line textual protractor for live DOA output.
//!
//! ```text
//! 0.000   45.000  90.000  135.000 180.000 225.000 270.000 315.000
//! |       |       |       |       |       |       |       |       |
//!                   #
//! ```
//!
//! The bottom line is redrawn in place (`\r`) for every prediction.

use std::{
    io::{self, Write},
    thread,
    time::Duration,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtractorError {
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("invalid angle {0}")]
    AngleOutOfRange(f32),
}

pub struct AnglePrinter<W: Write> {
    out: W,
    maxn: usize,
    marker_space: usize,
}

impl<W: Write> AnglePrinter<W> {
    /// A protractor `maxn` columns wide with a tick every `maxn / 8` columns.
    pub fn new(out: W, maxn: usize) -> Self {
        Self {
            out,
            maxn,
            marker_space: (maxn / 8).max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.maxn
    }

    fn markers(&self) -> usize {
        self.maxn / self.marker_space
    }

    /// Angle labels and tick marks.
    pub fn print_header(&mut self) -> io::Result<()> {
        let markers = self.markers();
        let a_step = if markers == 0 {
            0.0
        } else {
            360.0 / markers as f64
        };
        let width = self.marker_space;

        let mut labels = String::new();
        let mut ticks = String::new();
        for i in 0..markers {
            labels.push_str(&format!("{:<width$.3}", i as f64 * a_step));
            ticks.push('|');
            ticks.push_str(&" ".repeat(width - 1));
        }
        ticks.push('|');
        writeln!(self.out, "{labels}")?;
        writeln!(self.out, "{ticks}")
    }

    /// Redraw the marker line with `#` at the column of `angle` degrees.
    pub fn update_angle(&mut self, angle: f32) -> Result<(), ProtractorError> {
        let x = f64::from(angle) * self.maxn as f64 / 360.0;
        if x.is_nan() || x < 0.0 || x as usize > self.maxn {
            return Err(ProtractorError::AngleOutOfRange(angle));
        }
        let x = x as usize;
        let line: String = (0..self.maxn)
            .map(|i| if i == x { '#' } else { ' ' })
            .collect();
        write!(self.out, "\r{line}")?;
        self.out.flush()?;
        Ok(())
    }

    /// Redraw the marker line as a row of dots.
    pub fn update_silence(&mut self) -> io::Result<()> {
        write!(self.out, "\r{}", ".".repeat(self.maxn))?;
        self.out.flush()
    }

    /// Sweep the marker round the dial forever, blanking once per turn.
    pub fn demo(&mut self, step: Duration) -> Result<(), ProtractorError> {
        self.print_header()?;
        let mut angle = 0.0f32;
        loop {
            thread::sleep(step);
            self.update_angle(angle)?;
            angle += 360.0 / 64.0;
            if angle >= 360.0 {
                angle = 0.0;
                thread::sleep(step);
                self.update_silence()?;
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
