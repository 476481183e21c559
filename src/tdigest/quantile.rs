//! Quantile estimation over the compressed centroids.
//!
//! A centroid of weight `w` is treated as `w/2` mass on each side of its
//! mean, so interpolation runs between centroid midpoints. Weight-1
//! centroids are atomic observations: a target falling within half a unit
//! of one snaps to its exact mean, which keeps the extreme quantiles exact
//! when the tails are singletons.

use crate::error::{TdError, TdResult};
use crate::tdigest::precision::FloatLike;
use crate::tdigest::TDigest;

/// Interpolation between two anchors, written so that nearly-equal anchors
/// do not cancel.
#[inline]
pub(crate) fn weighted_average(x1: f64, w1: f64, x2: f64, w2: f64) -> f64 {
    x1 + (x2 - x1) * w2 / (w1 + w2)
}

impl<F: FloatLike> TDigest<F> {
    /// Value at the given normalized rank.
    ///
    /// Returns NaN for an empty digest; a rank outside `[0, 1]` is an
    /// [`TdError::InvalidArgument`]. Ranks 0 and 1 return the exact min and
    /// max.
    pub fn quantile(&mut self, rank: f64) -> TdResult<F> {
        if !(0.0..=1.0).contains(&rank) {
            return Err(TdError::invalid_argument(
                "normalized rank must be within [0, 1]",
            ));
        }
        if self.is_empty() {
            return Ok(F::nan());
        }
        self.compress();

        let num = self.centroids.len();
        if num == 1 {
            return Ok(self.centroids[0].mean());
        }

        let n = self.centroids_weight as f64;
        let weight = rank * n;
        if weight < 1.0 {
            return Ok(self.min);
        }
        if weight > n - 1.0 {
            return Ok(self.max);
        }
        let min = self.min.to_f64();
        let max = self.max.to_f64();

        // left tail: below the midpoint of a non-singleton first centroid,
        // interpolate from the exact minimum
        let first_weight = self.centroids[0].weight() as f64;
        if self.centroids[0].weight() > 1 && weight < first_weight / 2.0 {
            let v = min
                + (weight - 1.0) / (first_weight / 2.0 - 1.0)
                    * (self.centroids[0].mean().to_f64() - min);
            return Ok(F::from_f64(v));
        }

        // right tail, mirror image
        let last_weight = self.centroids[num - 1].weight() as f64;
        if self.centroids[num - 1].weight() > 1 && n - weight <= last_weight / 2.0 {
            let v = max
                - (n - weight - 1.0) / (last_weight / 2.0 - 1.0)
                    * (max - self.centroids[num - 1].mean().to_f64());
            return Ok(F::from_f64(v));
        }

        // interior: walk midpoint to midpoint
        let mut weight_so_far = first_weight / 2.0;
        for i in 0..num - 1 {
            let dw =
                (self.centroids[i].weight() as f64 + self.centroids[i + 1].weight() as f64) / 2.0;
            if weight_so_far + dw > weight {
                // target falls between the midpoints of centroids i and i+1
                let mut left_excluded = 0.0;
                if self.centroids[i].weight() == 1 {
                    if weight - weight_so_far < 0.5 {
                        return Ok(self.centroids[i].mean());
                    }
                    left_excluded = 0.5;
                }
                let mut right_excluded = 0.0;
                if self.centroids[i + 1].weight() == 1 {
                    if weight_so_far + dw - weight <= 0.5 {
                        return Ok(self.centroids[i + 1].mean());
                    }
                    right_excluded = 0.5;
                }
                let above_left = weight - weight_so_far - left_excluded;
                let below_right = weight_so_far + dw - weight - right_excluded;
                let v = weighted_average(
                    self.centroids[i].mean().to_f64(),
                    below_right,
                    self.centroids[i + 1].mean().to_f64(),
                    above_left,
                );
                return Ok(F::from_f64(v));
            }
            weight_so_far += dw;
        }

        // unreachable in practice: the right-tail branches above cover every
        // weight beyond the last midpoint
        let above_last = (weight - (n - last_weight / 2.0)).max(0.0);
        let below_max = last_weight / 2.0 - above_last;
        Ok(F::from_f64(weighted_average(
            self.centroids[num - 1].mean().to_f64(),
            below_max,
            max,
            above_last,
        )))
    }

    /// Convenience for `quantile(0.5)`.
    pub fn median(&mut self) -> TdResult<F> {
        self.quantile(0.5)
    }
}
