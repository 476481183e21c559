//! Streaming, mergeable t-digest for quantile and rank estimation.
//!
//! The digest keeps two centroid arrays: a sorted, compressed array holding
//! merged clusters and an unsorted staging buffer of incoming singletons.
//! Ingestion appends to the buffer; when the buffer fills, the merge engine
//! ([`compressor`]) folds everything into a fresh compressed array under the
//! scale-function weight bound ([`scale`]). Queries and serialization always
//! drain the buffer first, so they see all data.
//!
//! Based on Ted Dunning & Otmar Ertl, "Computing Extremely Accurate
//! Quantiles Using t-Digests", following the merging-digest variant: no
//! per-value tree maintenance, just sort + one linear coalescing scan.

pub mod centroid;
mod compressor;
pub mod precision;
mod quantile;
mod rank;
mod scale;
pub mod test_helpers;
pub mod wire;

use core::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{TdError, TdResult};

pub use centroid::Centroid;
pub use precision::FloatLike;

/// Compression parameter used when none is given.
pub const DEFAULT_K: u16 = 100;

/// Smallest accepted compression parameter.
pub const MIN_K: u16 = 10;

/// Alternate the merge scan direction on successive compressions. Scanning
/// in one direction only would nudge centroid means the same way every time.
pub(crate) const USE_ALTERNATING_SORT: bool = true;

/// Run ingestion at a larger internal compression and reduce to `k`-scale
/// only on explicit compression, trading a little memory for tail accuracy.
pub(crate) const USE_TWO_LEVEL_COMPRESSION: bool = true;

/// Bound clusters by the scale function's weight cap rather than by rank
/// limits; behaves better on heavily skewed input.
pub(crate) const USE_WEIGHT_LIMIT: bool = true;

/// Staging buffer holds this many centroids per slot of compressed capacity.
/// Values around 5-10 work; 5 keeps memory modest while amortizing the sort.
const BUFFER_MULTIPLIER: usize = 5;

/// t-digest over observations of precision `F` (`f32` or `f64`).
///
/// A digest is created empty with a compression parameter `k`, mutated by
/// [`update`](TDigest::update), [`merge`](TDigest::merge) and
/// [`compress`](TDigest::compress), and queried for
/// [`rank`](TDigest::rank) and [`quantile`](TDigest::quantile). Queries take
/// `&mut self` because they fold buffered values in first.
///
/// A single digest is not safe for concurrent mutation; build one digest per
/// thread and merge at a join point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TDigest<F: FloatLike> {
    k: u16,
    internal_k: u16,
    reverse_merge: bool,
    min: F,
    max: F,
    centroids_capacity: usize,
    centroids: Vec<Centroid<F>>,
    centroids_weight: u64,
    buffer_capacity: usize,
    buffer: Vec<Centroid<F>>,
    buffered_weight: u64,
}

impl<F: FloatLike> Default for TDigest<F> {
    fn default() -> Self {
        TDigest::new(DEFAULT_K)
    }
}

impl<F: FloatLike> TDigest<F> {
    /// Creates an empty digest with the given compression parameter.
    ///
    /// Larger `k` gives better accuracy and a larger digest. The fallible
    /// version of this constructor is [`TDigest::try_new`].
    ///
    /// # Panics
    ///
    /// Panics if `k` is below [`MIN_K`].
    pub fn new(k: u16) -> Self {
        assert!(k >= MIN_K, "k must be at least {MIN_K}, got {k}");
        Self::from_parts(false, k, F::infinity(), F::neg_infinity(), Vec::new(), 0)
    }

    /// Creates an empty digest, rejecting `k` below [`MIN_K`].
    pub fn try_new(k: u16) -> TdResult<Self> {
        if k < MIN_K {
            return Err(TdError::invalid_argument("k is below the minimum of 10"));
        }
        Ok(Self::new(k))
    }

    /// Rebuild a digest from previously validated state (deserialization).
    pub(crate) fn from_parts(
        reverse_merge: bool,
        k: u16,
        min: F,
        max: F,
        centroids: Vec<Centroid<F>>,
        total_weight: u64,
    ) -> Self {
        debug_assert!(k >= MIN_K);
        let (centroids_capacity, buffer_capacity, internal_k) = Self::capacities(k);
        let mut digest = TDigest {
            k,
            internal_k,
            reverse_merge,
            min,
            max,
            centroids_capacity,
            centroids,
            centroids_weight: total_weight,
            buffer_capacity,
            buffer: Vec::new(),
            buffered_weight: 0,
        };
        digest.centroids.reserve(centroids_capacity);
        digest.buffer.reserve(buffer_capacity);
        digest
    }

    /// Derived sizing: compressed capacity tracks `2k` plus head-room for
    /// the weight-limit scan; the buffer is a multiple of that; the internal
    /// compression is raised so that two-level merging retains resolution
    /// proportional to the buffer-to-capacity ratio.
    fn capacities(k: u16) -> (usize, usize, u16) {
        let fudge: usize = if k < 30 { 30 } else { 10 };
        let mut centroids_capacity = 2 * k as usize + fudge;
        let mut buffer_capacity = BUFFER_MULTIPLIER * centroids_capacity;

        let mut internal_k = k;
        if USE_TWO_LEVEL_COMPRESSION {
            let ratio = (buffer_capacity as f64 / centroids_capacity as f64 - 1.0).max(1.0);
            internal_k = (ratio.sqrt() * k as f64).ceil().min(u16::MAX as f64) as u16;
        }
        if centroids_capacity < internal_k as usize + fudge {
            centroids_capacity = internal_k as usize + fudge;
        }
        if buffer_capacity < 2 * centroids_capacity {
            buffer_capacity = 2 * centroids_capacity;
        }
        (centroids_capacity, buffer_capacity, internal_k)
    }

    /// Ingest one observation with weight 1.
    ///
    /// NaN and infinite values are rejected with
    /// [`TdError::InvalidArgument`]; the digest is left unchanged.
    pub fn update(&mut self, value: F) -> TdResult<()> {
        if !value.to_f64().is_finite() {
            return Err(TdError::invalid_argument("update value must be finite"));
        }
        if self.buffer.len() >= self.buffer_capacity {
            self.merge_buffered(self.internal_k);
        }
        self.buffer.push(Centroid::new(value, 1));
        self.buffered_weight += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        Ok(())
    }

    /// Merge `other` into this digest, consuming it.
    ///
    /// All of `other`'s mass (compressed and buffered) is staged into this
    /// digest's buffer and integrated immediately.
    pub fn merge(&mut self, other: TDigest<F>) {
        if other.is_empty() {
            return;
        }
        let transferred = other.total_weight();
        self.buffer
            .reserve(other.buffer.len() + other.centroids.len());
        self.buffer.extend(other.buffer);
        self.buffer.extend(other.centroids);
        self.buffered_weight += transferred;
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
        self.merge_buffered(self.internal_k);
    }

    /// Fold all buffered values into the compressed array.
    ///
    /// With two-level compression on, a final pass reduces the result from
    /// the internal compression back to `k`-scale. No-op (and cheap) when
    /// the buffer is already empty.
    pub fn compress(&mut self) {
        if self.buffered_weight == 0 {
            return;
        }
        self.merge_buffered(self.internal_k);
        if USE_TWO_LEVEL_COMPRESSION && self.internal_k != self.k {
            self.buffer.append(&mut self.centroids);
            self.buffered_weight = self.centroids_weight;
            self.centroids_weight = 0;
            self.merge_buffered(self.k);
        }
    }

    /// True if the digest has seen no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty() && self.buffer.is_empty()
    }

    /// Compression parameter this digest was configured with.
    #[inline]
    pub fn k(&self) -> u16 {
        self.k
    }

    /// Smallest observation seen; `None` if empty. Exact, not approximate.
    #[inline]
    pub fn min_value(&self) -> Option<F> {
        if self.is_empty() {
            None
        } else {
            Some(self.min)
        }
    }

    /// Largest observation seen; `None` if empty. Exact, not approximate.
    #[inline]
    pub fn max_value(&self) -> Option<F> {
        if self.is_empty() {
            None
        } else {
            Some(self.max)
        }
    }

    /// Total weight: update count plus all merged-in weight.
    #[inline]
    pub fn total_weight(&self) -> u64 {
        self.centroids_weight + self.buffered_weight
    }

    /// Compressed centroids, sorted ascending by mean. Does not include
    /// buffered values; call [`compress`](TDigest::compress) first for a
    /// complete view.
    #[inline]
    pub fn centroids(&self) -> &[Centroid<F>] {
        &self.centroids
    }

    /// Human-readable digest summary, optionally listing every centroid.
    pub fn summary(&self, include_centroids: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "### t-digest summary:");
        let _ = writeln!(out, "   k               : {}", self.k);
        let _ = writeln!(out, "   internal k      : {}", self.internal_k);
        let _ = writeln!(out, "   empty           : {}", self.is_empty());
        let _ = writeln!(out, "   centroids       : {}", self.centroids.len());
        let _ = writeln!(out, "   buffered        : {}", self.buffer.len());
        let _ = writeln!(out, "   total weight    : {}", self.total_weight());
        let _ = writeln!(out, "   buffered weight : {}", self.buffered_weight);
        let _ = writeln!(out, "   reverse merge   : {}", self.reverse_merge);
        if !self.is_empty() {
            let _ = writeln!(out, "   min             : {}", self.min);
            let _ = writeln!(out, "   max             : {}", self.max);
        }
        if include_centroids && !self.centroids.is_empty() {
            let _ = writeln!(out, "centroids (mean, weight):");
            for c in &self.centroids {
                let _ = writeln!(out, "   {} {}", c.mean(), c.weight());
            }
        }
        let _ = writeln!(out, "### end summary");
        out
    }
}

impl<F: FloatLike> fmt::Display for TDigest<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_digest_is_empty() {
        let d = TDigest::<f64>::new(100);
        assert!(d.is_empty());
        assert_eq!(d.total_weight(), 0);
        assert_eq!(d.k(), 100);
        assert_eq!(d.min_value(), None);
        assert_eq!(d.max_value(), None);
    }

    #[test]
    fn try_new_rejects_small_k() {
        assert!(matches!(
            TDigest::<f64>::try_new(9),
            Err(TdError::InvalidArgument { .. })
        ));
        assert!(TDigest::<f64>::try_new(10).is_ok());
    }

    #[test]
    #[should_panic(expected = "k must be at least")]
    fn new_panics_on_small_k() {
        let _ = TDigest::<f64>::new(5);
    }

    #[test]
    fn two_level_doubles_internal_compression() {
        // buffer multiplier 5 gives ratio 4, so internal k = 2k
        let d = TDigest::<f64>::new(100);
        assert_eq!(d.internal_k, 200);
        let d = TDigest::<f64>::new(10);
        assert_eq!(d.internal_k, 20);
    }

    #[test]
    fn update_rejects_non_finite() {
        let mut d = TDigest::<f64>::new(100);
        assert!(d.update(f64::NAN).is_err());
        assert!(d.update(f64::INFINITY).is_err());
        assert!(d.update(f64::NEG_INFINITY).is_err());
        assert!(d.is_empty());
    }

    #[test]
    fn update_tracks_min_max_exactly() {
        let mut d = TDigest::<f64>::new(100);
        for v in [3.0, -7.5, 12.0, 0.0, -7.5] {
            d.update(v).unwrap();
        }
        assert_eq!(d.min_value(), Some(-7.5));
        assert_eq!(d.max_value(), Some(12.0));
        assert_eq!(d.total_weight(), 5);
    }

    #[test]
    fn buffer_overflow_triggers_integration() {
        let mut d = TDigest::<f64>::new(10);
        let cap = d.buffer_capacity;
        for i in 0..(cap + 1) {
            d.update(i as f64).unwrap();
        }
        assert!(!d.centroids.is_empty(), "buffer never flushed");
        assert_eq!(d.total_weight(), cap as u64 + 1);
    }

    #[test]
    fn merge_consumes_and_conserves_weight() {
        let mut a = TDigest::<f64>::new(100);
        let mut b = TDigest::<f64>::new(100);
        for i in 1..=50 {
            a.update(i as f64).unwrap();
        }
        for i in 51..=100 {
            b.update(i as f64).unwrap();
        }
        a.merge(b);
        assert_eq!(a.total_weight(), 100);
        assert_eq!(a.min_value(), Some(1.0));
        assert_eq!(a.max_value(), Some(100.0));
    }

    #[test]
    fn merge_of_empty_is_a_noop() {
        let mut a = TDigest::<f64>::new(100);
        a.update(1.0).unwrap();
        let before = a.clone();
        a.merge(TDigest::new(100));
        assert_eq!(a, before);
    }

    #[test]
    fn compress_is_idempotent_on_empty_buffer() {
        let mut d = TDigest::<f64>::new(100);
        for i in 0..1000 {
            d.update(i as f64).unwrap();
        }
        d.compress();
        let snapshot = d.clone();
        d.compress();
        assert_eq!(d, snapshot);
    }

    #[test]
    fn compress_bounds_centroid_count() {
        let mut d = TDigest::<f64>::new(100);
        for i in 0..100_000 {
            d.update(i as f64).unwrap();
        }
        d.compress();
        assert!(d.buffer.is_empty());
        assert!(
            d.centroids.len() <= 2 * d.internal_k as usize,
            "{} centroids for internal k {}",
            d.centroids.len(),
            d.internal_k
        );
    }

    #[test]
    fn summary_mentions_centroids_when_asked() {
        let mut d = TDigest::<f64>::new(100);
        d.update(42.0).unwrap();
        d.compress();
        let brief = d.summary(false);
        let full = d.summary(true);
        assert!(brief.contains("total weight    : 1"));
        assert!(!brief.contains("centroids (mean, weight)"));
        assert!(full.contains("centroids (mean, weight)"));
        assert!(full.contains("42"));
    }

    #[test]
    fn f32_digest_works_end_to_end() {
        let mut d = TDigest::<f32>::new(50);
        for i in 1..=1000 {
            d.update(i as f32).unwrap();
        }
        assert_eq!(d.min_value(), Some(1.0_f32));
        assert_eq!(d.max_value(), Some(1000.0_f32));
        let mid = d.quantile(0.5).unwrap();
        assert!((mid - 500.0).abs() < 25.0, "median estimate {mid}");
    }
}
