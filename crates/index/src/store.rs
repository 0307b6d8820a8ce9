//! In-memory index store for one collection
//!
//! Records live in insertion-ordered slots; the slot number doubles as the
//! tie-breaker when two records score identically. Removal leaves a
//! tombstone until tombstones outnumber live records, at which point the
//! slots are compacted (order preserved).
//!
//! For IVF kinds the store trains once enough records are resident and then
//! assigns new records incrementally. Replacing or removing a record after
//! training leaves the partitioning stale: the store flips to
//! [`IndexState::Dirty`] and answers searches exhaustively until
//! [`IndexStore::rebuild`] retrains it.

use crate::distance::{inv_norm, normalized, rank_key, Scorer};
use crate::filter::FilterExpr;
use crate::ivf::IvfIndex;
use quiver_core::{
    CollectionConfig, DistanceMetric, Error, IndexKind, IndexParams, Result, SearchHit,
    VectorRecord,
};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, info};

/// Whether the approximate structure reflects the live records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Searches use the index structure as-is
    Clean,
    /// Structure is stale; searches scan every record until rebuilt
    Dirty,
}

/// IVF structure as handed to or from persistence
#[derive(Debug)]
pub enum AuxState<T> {
    /// Not yet trained (flat kinds are always here)
    Untrained,
    /// Trained and consistent with the records
    Trained(T),
    /// Must be retrained before approximate search resumes
    NeedsRebuild,
}

#[derive(Debug, Clone)]
struct Slot {
    record: VectorRecord,
    inv_norm: f32,
}

impl Slot {
    fn new(record: VectorRecord) -> Self {
        let inv_norm = inv_norm(&record.vector);
        Slot { record, inv_norm }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: f32,
    score: f32,
    slot: usize,
}

/// Index store for a single collection
#[derive(Debug, Clone)]
pub struct IndexStore {
    config: CollectionConfig,
    created_at: i64,
    slots: Vec<Option<Slot>>,
    ids: HashMap<String, usize>,
    live: usize,
    ivf: Option<IvfIndex>,
    state: IndexState,
    stale_removals: usize,
}

impl IndexStore {
    /// Create an empty store
    ///
    /// # Errors
    /// `InvalidParameters` if the dimension is 0 or the kind parameters
    /// are invalid.
    pub fn create(
        dimension: usize,
        metric: DistanceMetric,
        kind: IndexKind,
        params: IndexParams,
    ) -> Result<Self> {
        let config = CollectionConfig::new(dimension, metric, kind, params)?;
        Ok(Self::with_config(config))
    }

    /// Create an empty store from a resolved config
    pub fn with_config(config: CollectionConfig) -> Self {
        IndexStore {
            config,
            created_at: chrono::Utc::now().timestamp_micros(),
            slots: Vec::new(),
            ids: HashMap::new(),
            live: 0,
            ivf: None,
            state: IndexState::Clean,
            stale_removals: 0,
        }
    }

    /// Reassemble a store from persisted parts
    ///
    /// Records are placed in slots `0..n` in the given order; a trained IVF
    /// structure must describe exactly those slots.
    ///
    /// # Errors
    /// `InvalidParameters` if records or the IVF structure are inconsistent
    /// with the config.
    pub fn from_parts(
        config: CollectionConfig,
        created_at: i64,
        records: Vec<VectorRecord>,
        aux: AuxState<IvfIndex>,
    ) -> Result<Self> {
        let mut store = IndexStore {
            created_at,
            ..Self::with_config(config)
        };
        store.slots.reserve(records.len());
        for record in records {
            store.validate(&record)?;
            if store.ids.contains_key(&record.id) {
                return Err(Error::invalid(format!("duplicate id '{}'", record.id)));
            }
            store.ids.insert(record.id.clone(), store.slots.len());
            store.slots.push(Some(Slot::new(record)));
        }
        store.live = store.slots.len();

        match aux {
            AuxState::Untrained => {}
            AuxState::NeedsRebuild => store.state = IndexState::Dirty,
            AuxState::Trained(ivf) => {
                if !config.kind.is_ivf() {
                    return Err(Error::invalid("flat index carries IVF data"));
                }
                if ivf.centroids().dim() != config.dimension
                    || (config.kind == IndexKind::IvfPq) != ivf.pq().is_some()
                {
                    return Err(Error::invalid("IVF data does not match collection config"));
                }
                if (0..store.live).any(|slot| ivf.assignment(slot).is_none()) {
                    return Err(Error::invalid("IVF data does not cover every record"));
                }
                store.ivf = Some(ivf);
            }
        }
        Ok(store)
    }

    /// Collection configuration
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Creation time, microseconds since the Unix epoch
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the store has no live records
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current index state
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Whether an IVF structure has been trained
    pub fn is_trained(&self) -> bool {
        self.ivf.is_some()
    }

    /// Removals and replacements since the last (re)training
    pub fn stale_removals(&self) -> usize {
        self.stale_removals
    }

    /// Record by id
    pub fn get(&self, id: &str) -> Option<&VectorRecord> {
        let slot = *self.ids.get(id)?;
        self.slots[slot].as_ref().map(|s| &s.record)
    }

    /// Whether `id` is present
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Live records with their slot numbers, in insertion order
    pub fn live_slots(&self) -> impl Iterator<Item = (usize, &VectorRecord)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, &s.record)))
    }

    /// Live records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &VectorRecord> + '_ {
        self.live_slots().map(|(_, r)| r)
    }

    /// IVF structure for persistence
    pub fn aux(&self) -> AuxState<&IvfIndex> {
        match (&self.ivf, self.state) {
            (_, IndexState::Dirty) => AuxState::NeedsRebuild,
            (Some(ivf), IndexState::Clean) => AuxState::Trained(ivf),
            (None, IndexState::Clean) => AuxState::Untrained,
        }
    }

    fn validate(&self, record: &VectorRecord) -> Result<()> {
        if record.id.is_empty() {
            return Err(Error::invalid("record id must not be empty"));
        }
        self.validate_vector(&record.vector)
    }

    fn validate_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                got: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::invalid("vector components must be finite"));
        }
        Ok(())
    }

    /// Vector as seen by the IVF structure
    fn index_space<'a>(&self, v: &'a [f32]) -> Cow<'a, [f32]> {
        if self.config.metric == DistanceMetric::Cosine {
            Cow::Owned(normalized(v))
        } else {
            Cow::Borrowed(v)
        }
    }

    /// Insert or replace records
    ///
    /// The whole batch is validated first; on error nothing is applied.
    /// A record whose id already exists replaces the old one in place and
    /// keeps its insertion position.
    ///
    /// # Errors
    /// - `DimensionMismatch` if a vector has the wrong length
    /// - `InvalidParameters` for empty ids or non-finite components
    pub fn add(&mut self, records: Vec<VectorRecord>) -> Result<usize> {
        for record in &records {
            self.validate(record)?;
        }
        let count = records.len();
        for record in records {
            if let Some(&slot) = self.ids.get(&record.id) {
                self.slots[slot] = Some(Slot::new(record));
                if self.ivf.is_some() {
                    self.state = IndexState::Dirty;
                    self.stale_removals += 1;
                }
                continue;
            }
            let slot = self.slots.len();
            self.ids.insert(record.id.clone(), slot);
            if self.state == IndexState::Clean {
                if let Some(ivf) = self.ivf.as_mut() {
                    let v = if self.config.metric == DistanceMetric::Cosine {
                        Cow::Owned(normalized(&record.vector))
                    } else {
                        Cow::Borrowed(record.vector.as_slice())
                    };
                    ivf.insert(slot, &v);
                }
            }
            self.slots.push(Some(Slot::new(record)));
            self.live += 1;
        }
        self.maybe_train();
        Ok(count)
    }

    /// Remove records by id; unknown ids are ignored
    ///
    /// Returns the number of records actually removed.
    pub fn remove<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let mut removed = 0;
        for id in ids {
            if let Some(slot) = self.ids.remove(id.as_ref()) {
                self.slots[slot] = None;
                self.live -= 1;
                removed += 1;
            }
        }
        if removed > 0 && self.ivf.is_some() {
            self.state = IndexState::Dirty;
            self.stale_removals += removed;
        }
        if self.slots.len() - self.live > self.live {
            self.compact();
        }
        removed
    }

    fn compact(&mut self) {
        let before = self.slots.len();
        self.slots.retain(Option::is_some);
        self.ids.clear();
        for (slot, s) in self.slots.iter().enumerate() {
            if let Some(s) = s {
                self.ids.insert(s.record.id.clone(), slot);
            }
        }
        // Slot numbers moved; any partitioning refers to old slots
        if self.ivf.take().is_some() {
            self.state = IndexState::Dirty;
        }
        debug!(target: "quiver::store", before, after = self.slots.len(), "Compacted slots");
    }

    fn maybe_train(&mut self) {
        if self.config.kind.is_ivf()
            && self.ivf.is_none()
            && self.state == IndexState::Clean
            && self.live > 0
            && self.live >= self.config.params.min_train_size
        {
            self.train();
        }
    }

    fn train(&mut self) {
        let ivf = {
            let vectors: Vec<(usize, Cow<'_, [f32]>)> = self
                .live_slots()
                .map(|(slot, r)| (slot, self.index_space(&r.vector)))
                .collect();
            let points: Vec<&[f32]> = vectors.iter().map(|(_, v)| v.as_ref()).collect();
            let trained = IvfIndex::train(
                &points,
                self.config.dimension,
                self.config.metric,
                self.config.kind,
                &self.config.params,
            );
            trained.map(|mut ivf| {
                for (slot, v) in &vectors {
                    ivf.insert(*slot, v);
                }
                ivf
            })
        };
        self.ivf = ivf;
        self.stale_removals = 0;
    }

    /// Compact slots and retrain the IVF structure from the live records
    ///
    /// Afterwards the store is [`IndexState::Clean`]. For IVF kinds below
    /// the training threshold the store is left untrained.
    pub fn rebuild(&mut self) {
        if self.slots.len() != self.live {
            self.compact();
        }
        self.ivf = None;
        self.state = IndexState::Clean;
        self.stale_removals = 0;
        self.maybe_train();
        info!(
            target: "quiver::store",
            records = self.live,
            trained = self.ivf.is_some(),
            "Rebuilt index"
        );
    }

    /// k nearest records to `query`
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.search_filtered(query, k, None, None)
    }

    /// k nearest records that pass `filter`
    ///
    /// Results are ordered best first; ties keep insertion order. The
    /// filter is applied before truncation, so fewer than `k` hits means
    /// fewer than `k` records match. With `metric_override` the IVF probe
    /// still uses the collection metric but candidates are ranked by the
    /// override.
    ///
    /// # Errors
    /// - `DimensionMismatch` if the query has the wrong length
    /// - `InvalidParameters` if the query has non-finite components
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        metric_override: Option<DistanceMetric>,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<SearchHit>> {
        self.validate_vector(query)?;
        if k == 0 || self.live == 0 {
            return Ok(Vec::new());
        }
        let scorer = Scorer::new(metric_override.unwrap_or(self.config.metric), query);
        let mut candidates = match (&self.ivf, self.state) {
            (Some(ivf), IndexState::Clean) => {
                self.ivf_candidates(ivf, query, k, metric_override.is_some(), &scorer, filter)
            }
            _ => self.exhaustive_candidates(&scorer, filter),
        };
        top_k(&mut candidates, k);
        Ok(candidates
            .into_iter()
            .filter_map(|c| {
                let slot = self.slots[c.slot].as_ref()?;
                Some(SearchHit::new(
                    slot.record.id.clone(),
                    c.score,
                    slot.record.metadata.clone(),
                ))
            })
            .collect())
    }

    fn passes(filter: Option<&FilterExpr>, record: &VectorRecord) -> bool {
        filter.map_or(true, |f| f.matches(record))
    }

    fn exact(&self, scorer: &Scorer<'_>, slot: usize) -> Option<Candidate> {
        let s = self.slots.get(slot)?.as_ref()?;
        let score = scorer.score(&s.record.vector, s.inv_norm);
        Some(Candidate {
            key: rank_key(scorer.metric(), score),
            score,
            slot,
        })
    }

    fn exhaustive_candidates(
        &self,
        scorer: &Scorer<'_>,
        filter: Option<&FilterExpr>,
    ) -> Vec<Candidate> {
        self.live_slots()
            .filter(|(_, r)| Self::passes(filter, r))
            .filter_map(|(slot, _)| self.exact(scorer, slot))
            .collect()
    }

    fn ivf_candidates(
        &self,
        ivf: &IvfIndex,
        query: &[f32],
        k: usize,
        overridden: bool,
        scorer: &Scorer<'_>,
        filter: Option<&FilterExpr>,
    ) -> Vec<Candidate> {
        let q = self.index_space(query);
        let probes = ivf.probe(&q, self.config.params.nprobe);
        let members = probes.into_iter().flat_map(|list| ivf.list(list).iter()).filter_map(
            |&slot| {
                let slot = slot as usize;
                let s = self.slots.get(slot)?.as_ref()?;
                Self::passes(filter, &s.record).then_some(slot)
            },
        );

        match ivf.pq() {
            Some(pq) if !overridden => {
                let table = pq.quantizer.distance_table(&q, self.config.metric);
                let mut approx: Vec<Candidate> = members
                    .map(|slot| Candidate {
                        key: pq.quantizer.adc(&table, pq.code(slot)),
                        score: 0.0,
                        slot,
                    })
                    .collect();
                let shortlist = k.saturating_mul(self.config.params.refine_factor.max(1));
                top_k(&mut approx, shortlist);
                approx
                    .into_iter()
                    .filter_map(|c| self.exact(scorer, c.slot))
                    .collect()
            }
            _ => members
                .filter_map(|slot| self.exact(scorer, slot))
                .collect(),
        }
    }

    /// Live records passing `filter`, in insertion order
    pub fn scan<'a>(
        &'a self,
        filter: Option<&'a FilterExpr>,
    ) -> impl Iterator<Item = &'a VectorRecord> + 'a {
        self.records().filter(move |r| Self::passes(filter, r))
    }
}

/// Keep the `k` best candidates, sorted by key then slot
fn top_k(candidates: &mut Vec<Candidate>, k: usize) {
    let order = |a: &Candidate, b: &Candidate| a.key.total_cmp(&b.key).then(a.slot.cmp(&b.slot));
    if k == 0 {
        candidates.clear();
        return;
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, order);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(order);
}
