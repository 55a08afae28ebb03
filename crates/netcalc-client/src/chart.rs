//! Round-trip latency chart.
//!
//! Samples are scaled into ten rows: the smallest visible sample sits on row
//! 1, the largest on row 10, and a flat series stays on row 1. Each column is
//! two characters wide, the first one linking to the previous sample.

use std::{collections::VecDeque, fmt::Write as _, time::Duration};

/// Chart rows.
pub const HEIGHT: u64 = 10;

/// Columns used when the terminal width is unknown: `(80 / 2) - 1`.
pub const DEFAULT_COLUMNS: usize = 39;

const ARROW_UP: char = '↑';
const VERTICAL: char = '│';
const HORIZONTAL: char = '─';
const TOP_LEFT: char = '┌';
const TOP_RIGHT: char = '┐';
const BOTTOM_LEFT: char = '└';
const BOTTOM_RIGHT: char = '┘';

/// Something that can display a series of round-trip times.
pub trait Chart {
    /// Add a sample.
    fn update(&mut self, sample: Duration);

    /// Draw the chart, newline-terminated.
    fn render(&self) -> String;
}

/// Line chart of round-trip times in microseconds.
///
/// Only the last `columns` samples are kept.
#[derive(Debug, Clone)]
pub struct LatencyChart {
    samples: VecDeque<u64>,
    columns: usize,
}

impl LatencyChart {
    /// Create an empty chart showing at most `columns` samples.
    pub fn new(columns: usize) -> Self {
        let columns = columns.max(1);
        Self { samples: VecDeque::with_capacity(columns), columns }
    }

    /// Number of samples held, at most `columns`.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before the first sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The visible samples scaled into `1..=HEIGHT`.
    pub fn normalized(&self) -> Vec<u64> {
        let (Some(&min), Some(&max)) = (self.samples.iter().min(), self.samples.iter().max()) else {
            return Vec::new();
        };

        self.samples
            .iter()
            .map(|&v| {
                if max == min {
                    1
                } else {
                    let scaled = u128::from(v - min) * u128::from(HEIGHT - 1) / u128::from(max - min);
                    u64::try_from(scaled).unwrap_or(HEIGHT - 1) + 1
                }
            })
            .collect()
    }
}

impl Default for LatencyChart {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMNS)
    }
}

impl Chart for LatencyChart {
    fn update(&mut self, sample: Duration) {
        if self.samples.len() == self.columns {
            self.samples.pop_front();
        }
        self.samples.push_back(u64::try_from(sample.as_micros()).unwrap_or(u64::MAX));
    }

    fn render(&self) -> String {
        let data = self.normalized();
        let mut out = String::new();

        let _ = writeln!(out, "{ARROW_UP}");
        for height in (1..=HEIGHT).rev() {
            out.push(VERTICAL);
            for (i, &value) in data.iter().enumerate() {
                let previous = if i == 0 { 0 } else { data[i - 1] };
                out.push(link_char(previous, value, height));
                out.push(if value == height { HORIZONTAL } else { ' ' });
            }
            out.push('\n');
        }

        out.push(BOTTOM_LEFT);
        out.extend(std::iter::repeat_n(HORIZONTAL, self.columns * 2));
        out.push_str(">\n");
        out
    }
}

/// Character joining the previous sample to the current one at `height`.
fn link_char(previous: u64, current: u64, height: u64) -> char {
    let low = previous.min(current);
    let high = previous.max(current);

    if previous == height && current == height {
        HORIZONTAL
    } else if height > low && height < high {
        VERTICAL
    } else if height == high && high == current {
        TOP_LEFT
    } else if height == high {
        TOP_RIGHT
    } else if height == low && low == current {
        BOTTOM_LEFT
    } else if height == low {
        BOTTOM_RIGHT
    } else {
        ' '
    }
}
