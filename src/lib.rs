//! Streaming quantile and rank estimation with a mergeable t-digest.
//!
//! ```
//! use tdigest_sketch::TDigest;
//!
//! let mut digest = TDigest::<f64>::new(100);
//! for i in 1..=1000 {
//!     digest.update(i as f64)?;
//! }
//! let p99 = digest.quantile(0.99)?;
//! assert!(p99 > 950.0 && p99 <= 1000.0);
//! # Ok::<(), tdigest_sketch::TdError>(())
//! ```

pub mod error;
pub mod tdigest;

pub use error::{TdError, TdResult};
pub use tdigest::{Centroid, FloatLike, TDigest, DEFAULT_K, MIN_K};
