// src/tdigest/rank.rs
//! Rank estimation: the fraction of observations at or below a value.
//!
//! Each centroid contributes half its weight below and half above its mean,
//! so the rank at a centroid's mean is its midpoint rank. Between adjacent
//! means the rank is interpolated linearly in the value; outside the first
//! and last means it is interpolated against the exact min and max, with the
//! extreme observations themselves pinned at half a unit of weight from the
//! ends.

use crate::error::{TdError, TdResult};
use crate::tdigest::precision::FloatLike;
use crate::tdigest::TDigest;

impl<F: FloatLike> TDigest<F> {
    /// Approximate normalized rank of `value`, in `[0, 1]`.
    ///
    /// Returns NaN for an empty digest; a NaN value is an
    /// [`TdError::InvalidArgument`].
    pub fn rank(&mut self, value: F) -> TdResult<f64> {
        let v = value.to_f64();
        if v.is_nan() {
            return Err(TdError::invalid_argument("rank value must not be NaN"));
        }
        if self.is_empty() {
            return Ok(f64::NAN);
        }
        if value < self.min {
            return Ok(0.0);
        }
        if value > self.max {
            return Ok(1.0);
        }
        // a single observation: value == min == max
        if self.centroids.len() + self.buffer.len() == 1 {
            return Ok(0.5);
        }

        self.compress();

        let n = self.centroids_weight as f64;
        let num = self.centroids.len();
        let min = self.min.to_f64();
        let max = self.max.to_f64();

        // left of the first mean: interpolate toward the exact minimum
        let first_mean = self.centroids[0].mean().to_f64();
        if v < first_mean {
            if first_mean - min > 0.0 {
                let r = if v == min {
                    0.5 / n
                } else {
                    (1.0 + (v - min) / (first_mean - min)
                        * (self.centroids[0].weight() as f64 / 2.0 - 1.0))
                        / n
                };
                return Ok(r);
            }
            return Ok(0.0);
        }

        // right of the last mean, mirror image
        let last_mean = self.centroids[num - 1].mean().to_f64();
        if v > last_mean {
            if max - last_mean > 0.0 {
                let r = if v == max {
                    1.0 - 0.5 / n
                } else {
                    1.0 - (1.0
                        + (max - v) / (max - last_mean)
                            * (self.centroids[num - 1].weight() as f64 / 2.0 - 1.0))
                        / n
                };
                return Ok(r);
            }
            return Ok(1.0);
        }

        // bracket the value: lower = rightmost mean <= v reachable from the
        // left, upper = rightmost mean <= v (last of an equal-mean run)
        let mut lower = self.centroids.partition_point(|c| c.mean().to_f64() < v);
        if v < self.centroids[lower].mean().to_f64() {
            lower -= 1;
        }
        let mut upper = self.centroids.partition_point(|c| c.mean().to_f64() <= v);
        if upper == num || self.centroids[upper - 1].mean().to_f64() >= v {
            upper -= 1;
        }

        let mut weight_below = 0.0;
        for c in &self.centroids[..lower] {
            weight_below += c.weight() as f64;
        }
        weight_below += self.centroids[lower].weight() as f64 / 2.0;

        let mut weight_delta = 0.0;
        for c in &self.centroids[lower..upper] {
            weight_delta += c.weight() as f64;
        }
        weight_delta -= self.centroids[lower].weight() as f64 / 2.0;
        weight_delta += self.centroids[upper].weight() as f64 / 2.0;

        let lower_mean = self.centroids[lower].mean().to_f64();
        let upper_mean = self.centroids[upper].mean().to_f64();
        let r = if upper_mean - lower_mean > 0.0 {
            (weight_below + weight_delta * (v - lower_mean) / (upper_mean - lower_mean)) / n
        } else {
            (weight_below + weight_delta / 2.0) / n
        };
        Ok(r)
    }

    /// Ranks at each split point, plus a trailing 1.0.
    ///
    /// `split_points` must be strictly increasing and free of NaN. For an
    /// empty digest every entry is NaN.
    pub fn cdf(&mut self, split_points: &[F]) -> TdResult<Vec<f64>> {
        for pair in split_points.windows(2) {
            // the positive comparison also rejects NaN
            if !(pair[0] < pair[1]) {
                return Err(TdError::invalid_argument(
                    "split points must be strictly increasing and not NaN",
                ));
            }
        }
        if split_points.len() == 1 && split_points[0].to_f64().is_nan() {
            return Err(TdError::invalid_argument(
                "split points must be strictly increasing and not NaN",
            ));
        }
        if self.is_empty() {
            return Ok(vec![f64::NAN; split_points.len() + 1]);
        }

        let mut out = Vec::with_capacity(split_points.len() + 1);
        for &p in split_points {
            out.push(self.rank(p)?);
        }
        out.push(1.0);
        Ok(out)
    }
}
