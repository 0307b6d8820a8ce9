//! Seeded k-means clustering
//!
//! k-means++ initialisation followed by Lloyd iterations. All randomness comes
//! from one `StdRng` seeded by the caller, so training the same vectors with
//! the same seed always yields the same centroids.

use crate::distance::l2_squared;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Maximum Lloyd iterations
pub const MAX_ITERATIONS: usize = 25;

/// Trained centroids stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Centroids {
    dim: usize,
    data: Vec<f32>,
}

impl Centroids {
    /// Wrap row-major centroid data
    pub fn from_flat(dim: usize, data: Vec<f32>) -> Option<Self> {
        if dim == 0 || data.is_empty() || data.len() % dim != 0 {
            return None;
        }
        Some(Centroids { dim, data })
    }

    /// Number of centroids
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Always false for a constructed value
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Centroid `i`
    pub fn get(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Row-major data
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Index of the centroid closest to `v` in L2
    pub fn nearest(&self, v: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (i, c) in self.data.chunks_exact(self.dim).enumerate() {
            let d = l2_squared(v, c);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }
}

/// Cluster `points` into at most `k` groups
///
/// Returns `None` when there are no points. When `k` exceeds the number of
/// points, one centroid per point is produced.
pub fn train(points: &[&[f32]], dim: usize, k: usize, seed: u64) -> Option<Centroids> {
    if points.is_empty() || k == 0 || dim == 0 {
        return None;
    }
    let k = k.min(points.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = init_plus_plus(points, dim, k, &mut rng);

    let mut assignment = vec![usize::MAX; points.len()];
    for iteration in 0..MAX_ITERATIONS {
        let centroids = Centroids {
            dim,
            data: data.clone(),
        };
        let mut changed = 0usize;
        for (slot, p) in assignment.iter_mut().zip(points) {
            let nearest = centroids.nearest(p);
            if *slot != nearest {
                *slot = nearest;
                changed += 1;
            }
        }

        let mut sums = vec![0f64; k * dim];
        let mut counts = vec![0usize; k];
        for (&c, p) in assignment.iter().zip(points) {
            counts[c] += 1;
            for (s, x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(p.iter()) {
                *s += *x as f64;
            }
        }
        for c in 0..k {
            let row = &mut data[c * dim..(c + 1) * dim];
            if counts[c] == 0 {
                // Empty cluster: reseed from a random point
                let p = points[rng.gen_range(0..points.len())];
                row.copy_from_slice(p);
                continue;
            }
            let n = counts[c] as f64;
            for (x, s) in row.iter_mut().zip(&sums[c * dim..(c + 1) * dim]) {
                *x = (*s / n) as f32;
            }
        }

        if changed == 0 {
            debug!(target: "quiver::kmeans", k, iteration, "converged");
            break;
        }
    }
    Some(Centroids { dim, data })
}

fn init_plus_plus(points: &[&[f32]], dim: usize, k: usize, rng: &mut StdRng) -> Vec<f32> {
    let mut data = Vec::with_capacity(k * dim);
    let first = points[rng.gen_range(0..points.len())];
    data.extend_from_slice(first);

    let mut min_dist: Vec<f32> = points.iter().map(|p| l2_squared(p, first)).collect();
    for _ in 1..k {
        let total: f64 = min_dist.iter().map(|&d| d as f64).sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = points.len() - 1;
            for (i, &d) in min_dist.iter().enumerate() {
                target -= d as f64;
                if target <= 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            // All remaining points coincide with a centroid
            rng.gen_range(0..points.len())
        };
        let c = points[chosen];
        data.extend_from_slice(c);
        for (d, p) in min_dist.iter_mut().zip(points) {
            let nd = l2_squared(p, c);
            if nd < *d {
                *d = nd;
            }
        }
    }
    data
}
