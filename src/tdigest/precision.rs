//! Floating-point parameterization for the digest.
//!
//! `FloatLike` binds the storage precision (`f32` or `f64`) to its width on
//! the wire and to the `f64` conversions used for interpolation math. The
//! trait is sealed: the binary format only defines single- and
//! double-precision layouts.

use core::fmt;
use std::io::{self, Read, Write};

use ordered_float::FloatCore;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

pub trait FloatLike: FloatCore + fmt::Display + fmt::Debug + sealed::Sealed + 'static {
    /// Width of one value of this precision on the wire, in bytes.
    const WIRE_BYTES: usize;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Write the little-endian encoding to a stream.
    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()>;

    /// Read a little-endian value of this precision from a stream.
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self>;
}

impl FloatLike for f32 {
    const WIRE_BYTES: usize = 4;

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_le_bytes())
    }

    #[inline]
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }
}

impl FloatLike for f64 {
    const WIRE_BYTES: usize = 8;

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_le_bytes())
    }

    #[inline]
    fn read_le<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }
}
