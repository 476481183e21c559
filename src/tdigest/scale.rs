//! Scale function for the merge engine.
//!
//! This is the logistic ("K_2") mapping between normalized rank `q` and
//! cluster index `k`. Cluster capacity is proportional to `q * (1 - q)`, so
//! clusters shrink toward the tails and the centroid count stays strictly
//! bounded regardless of stream length. The normalizer folds the current
//! total weight into the compression parameter.

/// Domain clamp for `q`; `ln(q / (1 - q))` blows up at the endpoints.
const Q_EPS: f64 = 1e-15;

/// `q → k`: cluster index of rank `q`.
#[inline]
pub(crate) fn k_of_q(q: f64, normalizer: f64) -> f64 {
    let q = q.clamp(Q_EPS, 1.0 - Q_EPS);
    (q / (1.0 - q)).ln() * normalizer
}

/// `k → q`: inverse of [`k_of_q`].
#[inline]
pub(crate) fn q_of_k(k: f64, normalizer: f64) -> f64 {
    let w = (k / normalizer).exp();
    w / (1.0 + w)
}

/// Largest fraction of total weight a cluster near rank `q` may absorb.
#[inline]
pub(crate) fn max_fraction(q: f64, normalizer: f64) -> f64 {
    q * (1.0 - q) / normalizer
}

/// Weight-aware normalizer: `compression / (4 ln(n / compression) + 24)`.
///
/// Recomputed on every merge because it depends on the running total `n`.
#[inline]
pub(crate) fn normalizer(compression: f64, n: f64) -> f64 {
    compression / z(compression, n)
}

#[inline]
fn z(compression: f64, n: f64) -> f64 {
    4.0 * (n / compression).ln() + 24.0
}
