//! Product quantization
//!
//! A vector is split into `m` contiguous sub-vectors; each sub-vector is
//! replaced by the index of its nearest sub-centroid (one byte per
//! sub-space). Query-time scoring uses asymmetric distance computation:
//! the query stays exact and is compared to every sub-centroid once, then
//! each code is scored by `m` table lookups.

use crate::distance::{dot, l2_squared};
use crate::kmeans;
use quiver_core::DistanceMetric;

/// Trained product quantizer
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantizer {
    m: usize,
    dsub: usize,
    ksub: usize,
    /// `m × ksub × dsub`, sub-space major
    codebook: Vec<f32>,
}

impl ProductQuantizer {
    /// Train on `points`
    ///
    /// `ksub` is `min(2^bits, points.len())`. Each sub-space is clustered
    /// with its own seed derived from `seed`.
    pub fn train(points: &[&[f32]], dim: usize, m: usize, bits: u8, seed: u64) -> Option<Self> {
        if points.is_empty() || m == 0 || dim % m != 0 || !(1..=8).contains(&bits) {
            return None;
        }
        let dsub = dim / m;
        let ksub = (1usize << bits).min(points.len());
        let mut codebook = Vec::with_capacity(m * ksub * dsub);
        for sub in 0..m {
            let slices: Vec<&[f32]> = points
                .iter()
                .map(|p| &p[sub * dsub..(sub + 1) * dsub])
                .collect();
            let centroids = kmeans::train(&slices, dsub, ksub, seed.wrapping_add(sub as u64))?;
            codebook.extend_from_slice(centroids.as_flat());
            // Duplicate points can leave fewer distinct rows; pad by repeating
            for i in centroids.len()..ksub {
                let row = centroids.get(i % centroids.len()).to_vec();
                codebook.extend_from_slice(&row);
            }
        }
        Some(ProductQuantizer {
            m,
            dsub,
            ksub,
            codebook,
        })
    }

    /// Rebuild from persisted parts
    pub fn from_parts(m: usize, dsub: usize, ksub: usize, codebook: Vec<f32>) -> Option<Self> {
        if m == 0 || dsub == 0 || ksub == 0 || ksub > 256 || codebook.len() != m * ksub * dsub {
            return None;
        }
        Some(ProductQuantizer {
            m,
            dsub,
            ksub,
            codebook,
        })
    }

    /// Number of sub-spaces (bytes per code)
    pub fn m(&self) -> usize {
        self.m
    }

    /// Sub-vector dimension
    pub fn dsub(&self) -> usize {
        self.dsub
    }

    /// Centroids per sub-space
    pub fn ksub(&self) -> usize {
        self.ksub
    }

    /// Flat codebook
    pub fn codebook(&self) -> &[f32] {
        &self.codebook
    }

    fn centroid(&self, sub: usize, k: usize) -> &[f32] {
        let start = (sub * self.ksub + k) * self.dsub;
        &self.codebook[start..start + self.dsub]
    }

    /// Append the code for `v` to `out`
    pub fn encode_into(&self, v: &[f32], out: &mut Vec<u8>) {
        for sub in 0..self.m {
            let part = &v[sub * self.dsub..(sub + 1) * self.dsub];
            let mut best = 0usize;
            let mut best_dist = f32::INFINITY;
            for k in 0..self.ksub {
                let d = l2_squared(part, self.centroid(sub, k));
                if d < best_dist {
                    best_dist = d;
                    best = k;
                }
            }
            out.push(best as u8);
        }
    }

    /// Code for `v`
    pub fn encode(&self, v: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.m);
        self.encode_into(v, &mut out);
        out
    }

    /// Lookup table of per-sub-space rank keys for `query`
    ///
    /// L2 tables hold squared distances; inner product and cosine tables
    /// hold negated dot products so that summing a row gives a key where
    /// lower is better.
    pub fn distance_table(&self, query: &[f32], metric: DistanceMetric) -> Vec<f32> {
        let mut table = Vec::with_capacity(self.m * self.ksub);
        for sub in 0..self.m {
            let part = &query[sub * self.dsub..(sub + 1) * self.dsub];
            for k in 0..self.ksub {
                let c = self.centroid(sub, k);
                table.push(match metric {
                    DistanceMetric::L2 => l2_squared(part, c),
                    DistanceMetric::InnerProduct | DistanceMetric::Cosine => -dot(part, c),
                });
            }
        }
        table
    }

    /// Approximate rank key of `code` using a table from [`distance_table`]
    ///
    /// [`distance_table`]: ProductQuantizer::distance_table
    #[inline]
    pub fn adc(&self, table: &[f32], code: &[u8]) -> f32 {
        code.iter()
            .enumerate()
            .map(|(sub, &k)| table[sub * self.ksub + k as usize])
            .sum()
    }
}
