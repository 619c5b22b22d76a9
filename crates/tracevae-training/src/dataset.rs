//! Trace matrix loading and preprocessing
//!
//! Input is a delimited numeric text file (tab, comma, or whitespace), one
//! fixed-length trace per row, gzip-compressed when the path ends in `.gz`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use tracevae_core::VaeError;

/// A row-major f32 matrix of calcium traces; every row has the same length.
#[derive(Debug, Clone)]
pub struct TraceMatrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl TraceMatrix {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = match rows.first() {
            Some(row) => row.len(),
            None => anyhow::bail!("trace matrix is empty"),
        };
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in &rows {
            if row.len() != cols {
                return Err(VaeError::ShapeMismatch {
                    what: "trace row length",
                    got: row.len(),
                    expected: cols,
                }
                .into());
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open trace file {}", path.display()))?;
        let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|token| !token.is_empty())
                .map(|token| {
                    token.parse::<f32>().with_context(|| {
                        format!("invalid number {token:?} on line {}", idx + 1)
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            rows.push(row);
        }
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Global min-max normalization to [-0.5, 0.5]. A constant matrix maps
    /// to all zeros.
    pub fn normalize(&mut self) {
        let min = self.data.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max > min {
            let span = max - min;
            for value in &mut self.data {
                *value = (*value - min) / span - 0.5;
            }
        } else {
            self.data.fill(0.0);
        }
    }

    /// Splits into disjoint (train, validation) sets by a seeded random
    /// permutation. Requires at least two rows; both sides are non-empty.
    pub fn split(&self, val_fraction: f64, seed: u64) -> (TraceMatrix, TraceMatrix) {
        assert!(self.rows >= 2, "need at least two traces to split");
        let mut indices: Vec<usize> = (0..self.rows).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let n_val = ((self.rows as f64) * val_fraction).round() as usize;
        let n_val = n_val.clamp(1, self.rows - 1);
        let (val_indices, train_indices) = indices.split_at(n_val);
        (self.subset(train_indices), self.subset(val_indices))
    }

    pub fn subset(&self, indices: &[usize]) -> TraceMatrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &index in indices {
            data.extend_from_slice(self.row(index));
        }
        TraceMatrix {
            data,
            rows: indices.len(),
            cols: self.cols,
        }
    }

    /// The whole matrix as a (rows, cols) tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.data.clone(),
            (self.rows, self.cols),
            device,
        )?)
    }

    /// Gathers the given rows into a (len, cols) batch tensor.
    pub fn batch_tensor(&self, indices: &[usize], device: &Device) -> Result<Tensor> {
        let subset = self.subset(indices);
        Ok(Tensor::from_vec(
            subset.data,
            (indices.len(), self.cols),
            device,
        )?)
    }
}
