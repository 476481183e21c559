// src/tdigest/wire.rs
//! Binary wire codec for the digest.
//!
//! Native layout (little-endian):
//!
//!   0      : preamble longs (1 if empty, 2 otherwise)
//!   1      : serial version = 1
//!   2      : sketch type = 20
//!   3      : flags (bit 0 = empty, bit 1 = reverse merge)
//!   4..6   : k (u16)
//!   6..8   : reserved zero
//!   -- empty digest ends here --
//!   8..12  : centroid count (u32)
//!   12..16 : buffered count (u32, always 0 on the wire)
//!   16..24 : total weight (u64)
//!   24..   : min, max (one float of the digest's precision each)
//!   ..     : centroid means, ascending (floats of the digest's precision)
//!   ..     : centroid weights, same order (u64 each)
//!
//! The buffer is always drained before writing, so the buffered count is a
//! placeholder.
//!
//! Decoding also accepts the big-endian layouts of the reference
//! implementation, recognized by a leading 32-bit type of 1 (double
//! precision) or 2 (single precision) where the native preamble byte can
//! never be zero. A digest read from a compat layout is written back in
//! native form.

use std::io::{self, Read, Write};

use crate::error::{TdError, TdResult};
use crate::tdigest::centroid::{is_sorted_by_mean, Centroid};
use crate::tdigest::precision::FloatLike;
use crate::tdigest::{TDigest, MIN_K};

pub(crate) const PREAMBLE_LONGS_EMPTY: u8 = 1;
pub(crate) const PREAMBLE_LONGS_NON_EMPTY: u8 = 2;
pub(crate) const SERIAL_VERSION: u8 = 1;
pub(crate) const SKETCH_TYPE: u8 = 20;

pub(crate) const COMPAT_DOUBLE: u8 = 1;
pub(crate) const COMPAT_FLOAT: u8 = 2;

pub(crate) const FLAG_IS_EMPTY: u8 = 1 << 0;
pub(crate) const FLAG_REVERSE_MERGE: u8 = 1 << 1;

/// Offsets in the serialized form are 32-bit; refuse anything larger.
pub(crate) const MAX_SERIALIZED_BYTES: usize = u32::MAX as usize;

impl<F: FloatLike> TDigest<F> {
    /// Exact size of the native serialized form, after draining the buffer.
    pub fn serialized_size_bytes(&mut self) -> usize {
        self.compress();
        if self.is_empty() {
            8
        } else {
            8 + 8 + 8 + 2 * F::WIRE_BYTES + self.centroids().len() * (F::WIRE_BYTES + 8)
        }
    }

    /// Write the digest to a stream in native form.
    ///
    /// Drains the buffer first, so the digest is fully compressed afterwards.
    pub fn serialize_into<W: Write>(&mut self, w: &mut W) -> TdResult<()> {
        self.compress();
        let empty = self.is_empty();

        let mut flags = 0u8;
        if empty {
            flags |= FLAG_IS_EMPTY;
        }
        if self.reverse_merge {
            flags |= FLAG_REVERSE_MERGE;
        }
        let preamble = if empty {
            PREAMBLE_LONGS_EMPTY
        } else {
            PREAMBLE_LONGS_NON_EMPTY
        };
        w.write_all(&[preamble, SERIAL_VERSION, SKETCH_TYPE, flags])?;
        w.write_all(&self.k.to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?;
        if empty {
            return Ok(());
        }

        w.write_all(&(self.centroids.len() as u32).to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?;
        w.write_all(&self.centroids_weight.to_le_bytes())?;
        self.min.write_le(w)?;
        self.max.write_le(w)?;
        for c in &self.centroids {
            c.mean().write_le(w)?;
        }
        for c in &self.centroids {
            w.write_all(&c.weight().to_le_bytes())?;
        }
        Ok(())
    }

    /// Serialize to a byte vector of exactly the known size, with
    /// `header_size` caller-reserved zero bytes in front of the sketch.
    pub fn to_bytes(&mut self, header_size: usize) -> TdResult<Vec<u8>> {
        let body = self.serialized_size_bytes();
        let total = header_size
            .checked_add(body)
            .ok_or(TdError::capacity(usize::MAX, MAX_SERIALIZED_BYTES))?;
        if total > MAX_SERIALIZED_BYTES {
            return Err(TdError::capacity(total, MAX_SERIALIZED_BYTES));
        }
        let mut out = Vec::with_capacity(total);
        out.resize(header_size, 0);
        self.serialize_into(&mut out)?;
        debug_assert_eq!(out.len(), total);
        Ok(out)
    }

    /// Reconstruct a digest from bytes produced by [`serialize_into`] or by
    /// the reference implementation's writers.
    ///
    /// Validates the version, sketch type, declared sizes, and that the
    /// centroid weights sum to the declared total weight. Trailing bytes
    /// are ignored.
    ///
    /// [`serialize_into`]: TDigest::serialize_into
    pub fn from_bytes(bytes: &[u8]) -> TdResult<Self> {
        let mut slice = bytes;
        Self::from_reader(&mut slice)
    }

    /// Reconstruct a digest by reading its serialized form from a stream.
    pub fn from_reader<R: Read>(r: &mut R) -> TdResult<Self> {
        let mut head = [0u8; 4];
        read_exact_or(r, &mut head, "preamble")?;
        if head[0] == 0 && head[1] == 0 && head[2] == 0 {
            // big-endian 32-bit compat type; native preambles are never zero
            return decode_compat(r, head[3]);
        }
        decode_native(r, head)
    }
}

fn decode_native<F: FloatLike, R: Read>(r: &mut R, head: [u8; 4]) -> TdResult<TDigest<F>> {
    let [preamble, version, sketch_type, flags] = head;
    if sketch_type != SKETCH_TYPE {
        return Err(TdError::format(format!(
            "unrecognized sketch type {sketch_type}, expected {SKETCH_TYPE}"
        )));
    }
    if version != SERIAL_VERSION {
        return Err(TdError::format(format!(
            "unsupported serial version {version}, expected {SERIAL_VERSION}"
        )));
    }
    if flags & !(FLAG_IS_EMPTY | FLAG_REVERSE_MERGE) != 0 {
        return Err(TdError::format(format!("unknown flag bits {flags:#04x}")));
    }
    let empty = flags & FLAG_IS_EMPTY != 0;
    let reverse_merge = flags & FLAG_REVERSE_MERGE != 0;
    let expected_preamble = if empty {
        PREAMBLE_LONGS_EMPTY
    } else {
        PREAMBLE_LONGS_NON_EMPTY
    };
    if preamble != expected_preamble {
        return Err(TdError::format(format!(
            "preamble longs {preamble} does not match flags (expected {expected_preamble})"
        )));
    }

    let k = read_u16_le(r, "k")?;
    if k < MIN_K {
        return Err(TdError::format(format!("k {k} is below the minimum {MIN_K}")));
    }
    read_u16_le(r, "reserved")?;
    if empty {
        return Ok(TDigest::from_parts(
            reverse_merge,
            k,
            F::infinity(),
            F::neg_infinity(),
            Vec::new(),
            0,
        ));
    }

    let num_centroids = read_u32_le(r, "centroid count")? as usize;
    let num_buffered = read_u32_le(r, "buffered count")?;
    if num_centroids == 0 {
        return Err(TdError::format("non-empty digest with zero centroids"));
    }
    if num_buffered != 0 {
        return Err(TdError::format(format!(
            "buffered count must be zero on the wire, got {num_buffered}"
        )));
    }
    let declared_weight = read_u64_le(r, "total weight")?;

    let min = read_float_le::<F, R>(r, "min")?;
    let max = read_float_le::<F, R>(r, "max")?;
    if min.to_f64().is_nan() || max.to_f64().is_nan() {
        return Err(TdError::format("min/max must not be NaN"));
    }
    if max < min {
        return Err(TdError::format("max is below min"));
    }

    // reads are incremental, so a hostile count cannot force a huge
    // allocation up front
    let mut means: Vec<F> = Vec::with_capacity(num_centroids.min(1 << 20));
    for _ in 0..num_centroids {
        let mean = read_float_le::<F, R>(r, "centroid mean")?;
        if mean.to_f64().is_nan() {
            return Err(TdError::format("centroid mean must not be NaN"));
        }
        means.push(mean);
    }
    if !means.windows(2).all(|w| w[0] <= w[1]) {
        return Err(TdError::format("centroid means are not sorted"));
    }
    let mut total_weight = 0u64;
    let mut centroids: Vec<Centroid<F>> = Vec::with_capacity(means.len());
    for mean in means {
        let weight = read_u64_le(r, "centroid weight")?;
        if weight == 0 {
            return Err(TdError::format("centroid weight must not be zero"));
        }
        total_weight = total_weight
            .checked_add(weight)
            .ok_or_else(|| TdError::format("centroid weights overflow"))?;
        centroids.push(Centroid::new(mean, weight));
    }
    if total_weight != declared_weight {
        return Err(TdError::format(format!(
            "centroid weights sum to {total_weight} but the header declares {declared_weight}"
        )));
    }

    Ok(TDigest::from_parts(
        reverse_merge,
        k,
        min,
        max,
        centroids,
        total_weight,
    ))
}

/// Big-endian layouts of the reference implementation. Both carry min, max
/// and the compression up front, then the centroid array as (weight, mean)
/// pairs. The digest is rebuilt with a forward scan direction.
fn decode_compat<F: FloatLike, R: Read>(r: &mut R, compat_type: u8) -> TdResult<TDigest<F>> {
    let (k, min, max, num_centroids) = match compat_type {
        COMPAT_DOUBLE => {
            let min = read_f64_be(r, "min")?;
            let max = read_f64_be(r, "max")?;
            let k = read_f64_be(r, "compression")? as u16;
            let num = read_u32_be(r, "centroid count")? as usize;
            (k, min, max, num)
        }
        COMPAT_FLOAT => {
            let min = read_f64_be(r, "min")?;
            let max = read_f64_be(r, "max")?;
            let k = read_f32_be(r, "compression")? as u16;
            // the reference stores centroid and buffer capacities here;
            // both are derived from k on our side
            read_u32_be(r, "capacities")?;
            let num = read_u16_be(r, "centroid count")? as usize;
            (k, min, max, num)
        }
        other => {
            return Err(TdError::format(format!(
                "unrecognized compat sketch type {other}"
            )));
        }
    };

    if k < MIN_K {
        return Err(TdError::format(format!(
            "compat compression {k} is below the minimum {MIN_K}"
        )));
    }
    if min.is_nan() || max.is_nan() {
        return Err(TdError::format("compat min/max must not be NaN"));
    }
    if max < min {
        return Err(TdError::format("compat max is below min"));
    }

    let mut centroids: Vec<Centroid<F>> = Vec::with_capacity(num_centroids.min(1 << 20));
    let mut total_weight = 0u64;
    for _ in 0..num_centroids {
        let (weight, mean) = match compat_type {
            COMPAT_DOUBLE => (
                read_f64_be(r, "centroid weight")? as u64,
                read_f64_be(r, "centroid mean")?,
            ),
            _ => (
                read_f32_be(r, "centroid weight")? as u64,
                read_f32_be(r, "centroid mean")? as f64,
            ),
        };
        if weight == 0 {
            return Err(TdError::format("compat centroid weight must not be zero"));
        }
        if mean.is_nan() {
            return Err(TdError::format("compat centroid mean must not be NaN"));
        }
        total_weight = total_weight
            .checked_add(weight)
            .ok_or_else(|| TdError::format("compat centroid weights overflow"))?;
        centroids.push(Centroid::new(F::from_f64(mean), weight));
    }
    if !is_sorted_by_mean(&centroids) {
        return Err(TdError::format("compat centroid means are not sorted"));
    }

    Ok(TDigest::from_parts(
        false,
        k,
        F::from_f64(min),
        F::from_f64(max),
        centroids,
        total_weight,
    ))
}

/* ============================
 * Read helpers
 * ============================ */

fn read_exact_or<R: Read>(r: &mut R, buf: &mut [u8], field: &'static str) -> TdResult<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TdError::format(format!("truncated input reading {field}"))
        } else {
            TdError::Io(e)
        }
    })
}

fn read_u16_le<R: Read>(r: &mut R, field: &'static str) -> TdResult<u16> {
    let mut buf = [0u8; 2];
    read_exact_or(r, &mut buf, field)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(r: &mut R, field: &'static str) -> TdResult<u32> {
    let mut buf = [0u8; 4];
    read_exact_or(r, &mut buf, field)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(r: &mut R, field: &'static str) -> TdResult<u64> {
    let mut buf = [0u8; 8];
    read_exact_or(r, &mut buf, field)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_float_le<F: FloatLike, R: Read>(r: &mut R, field: &'static str) -> TdResult<F> {
    F::read_le(r).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TdError::format(format!("truncated input reading {field}"))
        } else {
            TdError::Io(e)
        }
    })
}

fn read_u16_be<R: Read>(r: &mut R, field: &'static str) -> TdResult<u16> {
    let mut buf = [0u8; 2];
    read_exact_or(r, &mut buf, field)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32_be<R: Read>(r: &mut R, field: &'static str) -> TdResult<u32> {
    let mut buf = [0u8; 4];
    read_exact_or(r, &mut buf, field)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_f32_be<R: Read>(r: &mut R, field: &'static str) -> TdResult<f32> {
    let mut buf = [0u8; 4];
    read_exact_or(r, &mut buf, field)?;
    Ok(f32::from_be_bytes(buf))
}

fn read_f64_be<R: Read>(r: &mut R, field: &'static str) -> TdResult<f64> {
    let mut buf = [0u8; 8];
    read_exact_or(r, &mut buf, field)?;
    Ok(f64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_is_eight_bytes() {
        let mut d = TDigest::<f64>::new(100);
        let bytes = d.to_bytes(0).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[0], PREAMBLE_LONGS_EMPTY);
        assert_eq!(bytes[1], SERIAL_VERSION);
        assert_eq!(bytes[2], SKETCH_TYPE);
        assert_eq!(bytes[3] & FLAG_IS_EMPTY, FLAG_IS_EMPTY);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 100);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 0);
    }

    #[test]
    fn header_layout_of_single_value() {
        let mut d = TDigest::<f64>::new(100);
        d.update(42.0).unwrap();
        let bytes = d.to_bytes(0).unwrap();
        assert_eq!(bytes.len(), 8 + 8 + 8 + 16 + 16);
        assert_eq!(bytes[0], PREAMBLE_LONGS_NON_EMPTY);
        assert_eq!(bytes[3] & FLAG_IS_EMPTY, 0);
        let num = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(num, 1);
        let buffered = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(buffered, 0);
        let weight = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        assert_eq!(weight, 1);
        let min = f64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let max = f64::from_le_bytes(bytes[32..40].try_into().unwrap());
        assert_eq!(min, 42.0);
        assert_eq!(max, 42.0);
        let mean = f64::from_le_bytes(bytes[40..48].try_into().unwrap());
        assert_eq!(mean, 42.0);
        let w = u64::from_le_bytes(bytes[48..56].try_into().unwrap());
        assert_eq!(w, 1);
    }

    #[test]
    fn reserved_header_prefix_is_zeroed() {
        let mut d = TDigest::<f64>::new(100);
        d.update(1.0).unwrap();
        let bytes = d.to_bytes(16).unwrap();
        assert!(bytes[..16].iter().all(|&b| b == 0));
        assert_eq!(bytes[16], PREAMBLE_LONGS_NON_EMPTY);
        let body = d.to_bytes(0).unwrap();
        assert_eq!(&bytes[16..], &body[..]);
    }

    #[test]
    fn serialized_size_matches_actual_bytes() {
        let mut d = TDigest::<f64>::new(100);
        for i in 0..10_000 {
            d.update(i as f64).unwrap();
        }
        let size = d.serialized_size_bytes();
        let bytes = d.to_bytes(0).unwrap();
        assert_eq!(bytes.len(), size);

        let mut f = TDigest::<f32>::new(100);
        for i in 0..1_000 {
            f.update(i as f32).unwrap();
        }
        let size = f.serialized_size_bytes();
        assert_eq!(f.to_bytes(0).unwrap().len(), size);
    }

    #[test]
    fn stream_and_vector_forms_agree() {
        let mut d = TDigest::<f64>::new(100);
        for i in 0..500 {
            d.update(i as f64).unwrap();
        }
        let vec_form = d.to_bytes(0).unwrap();
        let mut stream_form = Vec::new();
        d.serialize_into(&mut stream_form).unwrap();
        assert_eq!(vec_form, stream_form);
        let restored = TDigest::<f64>::from_reader(&mut stream_form.as_slice()).unwrap();
        assert_eq!(restored.total_weight(), 500);
    }

    #[test]
    fn bad_version_and_type_are_rejected() {
        let mut d = TDigest::<f64>::new(100);
        d.update(1.0).unwrap();
        let good = d.to_bytes(0).unwrap();

        let mut bad = good.clone();
        bad[1] = 9;
        assert!(matches!(
            TDigest::<f64>::from_bytes(&bad),
            Err(TdError::Format(_))
        ));

        let mut bad = good.clone();
        bad[2] = 21;
        assert!(matches!(
            TDigest::<f64>::from_bytes(&bad),
            Err(TdError::Format(_))
        ));

        let mut bad = good;
        bad[3] |= 0x80;
        assert!(matches!(
            TDigest::<f64>::from_bytes(&bad),
            Err(TdError::Format(_))
        ));
    }

    #[test]
    fn truncation_is_a_format_error() {
        let mut d = TDigest::<f64>::new(100);
        for i in 0..100 {
            d.update(i as f64).unwrap();
        }
        let bytes = d.to_bytes(0).unwrap();
        for cut in [2, 7, 12, 20, 30, bytes.len() - 1] {
            assert!(
                matches!(
                    TDigest::<f64>::from_bytes(&bytes[..cut]),
                    Err(TdError::Format(_))
                ),
                "cut at {cut} not rejected"
            );
        }
    }

    #[test]
    fn weight_mismatch_is_rejected() {
        let mut d = TDigest::<f64>::new(100);
        d.update(1.0).unwrap();
        d.update(2.0).unwrap();
        let mut bytes = d.to_bytes(0).unwrap();
        bytes[16] = 99; // declared total weight
        assert!(matches!(
            TDigest::<f64>::from_bytes(&bytes),
            Err(TdError::Format(_))
        ));
    }

    #[test]
    fn oversized_header_request_is_a_capacity_error() {
        let mut d = TDigest::<f64>::new(100);
        d.update(1.0).unwrap();
        assert!(matches!(
            d.to_bytes(MAX_SERIALIZED_BYTES),
            Err(TdError::Capacity { .. })
        ));
    }
}
