//! Fixed-binning 1D and 2D histograms.
//!
//! Bin storage follows the usual convention: slot 0 is underflow, slots
//! `1..=bins` are in range and slot `bins + 1` is overflow.

use serde::{Deserialize, Serialize};

/// Uniform binning over `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub bins: usize,
    pub low: f64,
    pub high: f64,
}

impl Axis {
    pub const fn new(bins: usize, low: f64, high: f64) -> Self {
        Self { bins, low, high }
    }

    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Storage slot for `x`. NaN lands in overflow.
    pub fn slot(&self, x: f64) -> usize {
        if x < self.low {
            0
        } else if x >= self.high || x.is_nan() {
            self.bins + 1
        } else {
            // Guard against rounding pushing the last edge out of range
            (((x - self.low) / self.width()) as usize).min(self.bins - 1) + 1
        }
    }

    pub fn in_range(&self, slot: usize) -> bool {
        slot >= 1 && slot <= self.bins
    }

    /// Lower edge of in-range bin `bin` (0-based).
    pub fn edge(&self, bin: usize) -> f64 {
        self.low + bin as f64 * self.width()
    }
}

/// One-dimensional weighted histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hist1D {
    pub name: String,
    pub title: String,
    pub axis: Axis,
    pub counts: Vec<f64>,
    pub entries: u64,
    sum_w: f64,
    sum_wx: f64,
}

impl Hist1D {
    pub fn new(name: impl Into<String>, title: impl Into<String>, axis: Axis) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            axis,
            counts: vec![0.0; axis.bins + 2],
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
        }
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        let slot = self.axis.slot(x);
        self.counts[slot] += w;
        self.entries += 1;
        if self.axis.in_range(slot) {
            self.sum_w += w;
            self.sum_wx += w * x;
        }
    }

    pub fn underflow(&self) -> f64 {
        self.counts[0]
    }

    pub fn overflow(&self) -> f64 {
        self.counts[self.axis.bins + 1]
    }

    /// Content of in-range bin `bin` (0-based).
    pub fn bin(&self, bin: usize) -> f64 {
        self.counts[bin + 1]
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.counts[1..=self.axis.bins].iter().sum()
    }

    /// Weighted mean of in-range fills.
    pub fn mean(&self) -> Option<f64> {
        (self.sum_w != 0.0).then(|| self.sum_wx / self.sum_w)
    }
}

/// Two-dimensional weighted histogram, stored x-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hist2D {
    pub name: String,
    pub title: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub counts: Vec<f64>,
    pub entries: u64,
    sum_w: f64,
    sum_wx: f64,
    sum_wy: f64,
}

impl Hist2D {
    pub fn new(name: impl Into<String>, title: impl Into<String>, x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x_axis,
            y_axis,
            counts: vec![0.0; (x_axis.bins + 2) * (y_axis.bins + 2)],
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
            sum_wy: 0.0,
        }
    }

    fn index(&self, xs: usize, ys: usize) -> usize {
        xs * (self.y_axis.bins + 2) + ys
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        self.fill_weighted(x, y, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, y: f64, w: f64) {
        let (xs, ys) = (self.x_axis.slot(x), self.y_axis.slot(y));
        let idx = self.index(xs, ys);
        self.counts[idx] += w;
        self.entries += 1;
        if self.x_axis.in_range(xs) && self.y_axis.in_range(ys) {
            self.sum_w += w;
            self.sum_wx += w * x;
            self.sum_wy += w * y;
        }
    }

    /// Content of in-range bin `(bx, by)` (0-based).
    pub fn bin(&self, bx: usize, by: usize) -> f64 {
        self.counts[self.index(bx + 1, by + 1)]
    }

    pub fn integral(&self) -> f64 {
        let mut total = 0.0;
        for bx in 0..self.x_axis.bins {
            for by in 0..self.y_axis.bins {
                total += self.bin(bx, by);
            }
        }
        total
    }

    pub fn mean_x(&self) -> Option<f64> {
        (self.sum_w != 0.0).then(|| self.sum_wx / self.sum_w)
    }

    pub fn mean_y(&self) -> Option<f64> {
        (self.sum_w != 0.0).then(|| self.sum_wy / self.sum_w)
    }
}

/// Any histogram a recipe produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Histogram {
    #[serde(rename = "1d")]
    One(Hist1D),
    #[serde(rename = "2d")]
    Two(Hist2D),
}

impl Histogram {
    pub fn name(&self) -> &str {
        match self {
            Self::One(h) => &h.name,
            Self::Two(h) => &h.name,
        }
    }

    pub fn entries(&self) -> u64 {
        match self {
            Self::One(h) => h.entries,
            Self::Two(h) => h.entries,
        }
    }
}
