//! Inverted-file structure
//!
//! Vectors are partitioned by their nearest coarse centroid; a query only
//! visits the `nprobe` closest partitions. With product quantization enabled
//! every slot also carries a compact code used for approximate ranking.
//!
//! The structure stores slot numbers, not vectors. Vectors handed to it are
//! already in "index space" (unit length for cosine collections).

use crate::distance::{dot, l2_squared};
use crate::kmeans::{self, Centroids};
use crate::pq::ProductQuantizer;
use quiver_core::{DistanceMetric, IndexKind, IndexParams};
use tracing::info;

/// Assignment marker for slots that are not in any list
pub const UNASSIGNED: u32 = u32::MAX;

/// Compact codes for every slot
#[derive(Debug, Clone, PartialEq)]
pub struct PqCodes {
    /// Trained quantizer
    pub quantizer: ProductQuantizer,
    /// `slots × m` bytes
    pub codes: Vec<u8>,
}

impl PqCodes {
    /// Code of `slot`
    pub fn code(&self, slot: usize) -> &[u8] {
        let m = self.quantizer.m();
        &self.codes[slot * m..(slot + 1) * m]
    }
}

/// Trained coarse partitioning plus optional PQ codes
#[derive(Debug, Clone)]
pub struct IvfIndex {
    metric: DistanceMetric,
    centroids: Centroids,
    lists: Vec<Vec<u32>>,
    assignment: Vec<u32>,
    pq: Option<PqCodes>,
}

impl IvfIndex {
    /// Train centroids (and a quantizer for IVF-PQ) on `points`
    ///
    /// Lists start empty; callers insert every live slot afterwards.
    pub fn train(
        points: &[&[f32]],
        dim: usize,
        metric: DistanceMetric,
        kind: IndexKind,
        params: &IndexParams,
    ) -> Option<Self> {
        let centroids = kmeans::train(points, dim, params.nlist, params.seed)?;
        let pq = if kind == IndexKind::IvfPq {
            let quantizer = ProductQuantizer::train(
                points,
                dim,
                params.pq_m,
                params.pq_bits,
                params.seed.wrapping_add(0x9e37_79b9),
            )?;
            Some(PqCodes {
                quantizer,
                codes: Vec::new(),
            })
        } else {
            None
        };
        info!(
            target: "quiver::ivf",
            points = points.len(),
            nlist = centroids.len(),
            pq = pq.is_some(),
            "Trained inverted file"
        );
        Some(IvfIndex {
            metric,
            lists: vec![Vec::new(); centroids.len()],
            centroids,
            assignment: Vec::new(),
            pq,
        })
    }

    /// Rebuild from persisted parts
    ///
    /// `assignment` has one entry per slot. Returns `None` if any part is
    /// inconsistent with the others.
    pub fn from_parts(
        metric: DistanceMetric,
        centroids: Centroids,
        assignment: Vec<u32>,
        pq: Option<PqCodes>,
    ) -> Option<Self> {
        let nlist = centroids.len();
        let mut lists = vec![Vec::new(); nlist];
        for (slot, &list) in assignment.iter().enumerate() {
            if list == UNASSIGNED {
                continue;
            }
            lists.get_mut(list as usize)?.push(slot as u32);
        }
        if let Some(pq) = &pq {
            if pq.codes.len() != assignment.len() * pq.quantizer.m()
                || pq.quantizer.m() * pq.quantizer.dsub() != centroids.dim()
            {
                return None;
            }
        }
        Some(IvfIndex {
            metric,
            centroids,
            lists,
            assignment,
            pq,
        })
    }

    /// Number of partitions
    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }

    /// Coarse centroids
    pub fn centroids(&self) -> &Centroids {
        &self.centroids
    }

    /// Partition of `slot`, if assigned
    pub fn assignment(&self, slot: usize) -> Option<u32> {
        self.assignment
            .get(slot)
            .copied()
            .filter(|&l| l != UNASSIGNED)
    }

    /// PQ codes, for IVF-PQ
    pub fn pq(&self) -> Option<&PqCodes> {
        self.pq.as_ref()
    }

    /// Coarse key of `v` against centroid `c` (lower = closer)
    fn coarse_key(&self, v: &[f32], c: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::InnerProduct => -dot(v, c),
            DistanceMetric::L2 | DistanceMetric::Cosine => l2_squared(v, c),
        }
    }

    fn nearest_list(&self, v: &[f32]) -> usize {
        let mut best = 0;
        let mut best_key = f32::INFINITY;
        for i in 0..self.centroids.len() {
            let key = self.coarse_key(v, self.centroids.get(i));
            if key < best_key {
                best_key = key;
                best = i;
            }
        }
        best
    }

    /// Assign `slot` to its partition and encode it
    pub fn insert(&mut self, slot: usize, v: &[f32]) {
        let list = self.nearest_list(v);
        if self.assignment.len() <= slot {
            self.assignment.resize(slot + 1, UNASSIGNED);
        }
        self.assignment[slot] = list as u32;
        self.lists[list].push(slot as u32);
        if let Some(pq) = &mut self.pq {
            let m = pq.quantizer.m();
            if pq.codes.len() < (slot + 1) * m {
                pq.codes.resize((slot + 1) * m, 0);
            }
            let code = pq.quantizer.encode(v);
            pq.codes[slot * m..(slot + 1) * m].copy_from_slice(&code);
        }
    }

    /// The `nprobe` partitions closest to `query`, best first
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut keyed: Vec<(f32, usize)> = (0..self.centroids.len())
            .map(|i| (self.coarse_key(query, self.centroids.get(i)), i))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        keyed.truncate(nprobe.max(1));
        keyed.into_iter().map(|(_, i)| i).collect()
    }

    /// Slots stored in partition `list`
    pub fn list(&self, list: usize) -> &[u32] {
        &self.lists[list]
    }
}
