//! Distance kernels and metric-aware scoring
//!
//! Raw scores keep the metric's natural direction. For ranking, every score
//! is mapped to a "lower is better" key so a single ascending sort serves all
//! metrics.

use quiver_core::DistanceMetric;

/// Squared Euclidean distance
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Inner product
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    wide_dot(a, b) as f32
}

// Accumulates in f64 so products of large finite components stay finite
#[inline]
fn wide_dot(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// L2 norm
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    wide_dot(a, a).sqrt() as f32
}

/// Reciprocal of the L2 norm, 0 for the zero vector
#[inline]
pub fn inv_norm(a: &[f32]) -> f32 {
    let n = wide_dot(a, a).sqrt();
    if n > 0.0 {
        (1.0 / n) as f32
    } else {
        0.0
    }
}

/// Copy of `a` scaled to unit length (zero stays zero)
pub fn normalized(a: &[f32]) -> Vec<f32> {
    let inv = inv_norm(a);
    a.iter().map(|x| x * inv).collect()
}

/// Map a raw score to an ascending rank key
#[inline]
pub fn rank_key(metric: DistanceMetric, raw: f32) -> f32 {
    if metric.higher_is_better() {
        -raw
    } else {
        raw
    }
}

/// Scores stored vectors against one query
///
/// The query norm is computed once; stored vectors pass their cached
/// reciprocal norm.
pub struct Scorer<'a> {
    metric: DistanceMetric,
    query: &'a [f32],
    query_inv_norm: f32,
}

impl<'a> Scorer<'a> {
    /// Create a scorer for `query`
    pub fn new(metric: DistanceMetric, query: &'a [f32]) -> Self {
        Scorer {
            metric,
            query,
            query_inv_norm: inv_norm(query),
        }
    }

    /// Metric in use
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Raw metric value between the query and `v`
    #[inline]
    pub fn score(&self, v: &[f32], v_inv_norm: f32) -> f32 {
        match self.metric {
            DistanceMetric::L2 => l2_squared(self.query, v),
            DistanceMetric::InnerProduct => dot(self.query, v),
            DistanceMetric::Cosine => {
                (wide_dot(self.query, v)
                    * f64::from(self.query_inv_norm)
                    * f64::from(v_inv_norm)) as f32
            }
        }
    }
}
