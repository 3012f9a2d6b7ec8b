// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The cell codec: a bounded buffer with independent write and read
//! cursors, used to build and parse every message body on the wire.
//!
//! Every value is preceded by a one-byte [`TypeCode`]. Reading a value
//! whose tag does not match what the caller expected still has to leave
//! the cursor in a usable state, so [`Cell::skip_value`] consumes exactly
//! the number of bytes the encoded type would have occupied and the
//! caller gets back [`ErrorCode::Type`] instead of losing synchronization
//! with the rest of the cell.

use crate::error::ErrorCode;
use crate::value::{TypeCode, Value};
use byteorder::{BigEndian, ByteOrder};
use std::net::Ipv4Addr;

/// A bounded, growable byte buffer with a write cursor (append-only, the
/// buffer length) and an independent read cursor (`rpos`).
#[derive(Debug, Clone, Default)]
pub struct Cell {
    buf: Vec<u8>,
    rpos: usize,
    cap: usize,
}

impl Cell {
    /// Create an empty cell that refuses writes past `cap` bytes.
    pub fn new(cap: usize) -> Cell {
        Cell {
            buf: Vec::with_capacity(cap.min(256)),
            rpos: 0,
            cap,
        }
    }

    /// Wrap an already-filled buffer for reading. Its own length is also
    /// its capacity, since a decoded cell is never appended to.
    pub fn from_vec(buf: Vec<u8>) -> Cell {
        let cap = buf.len();
        Cell { buf, rpos: 0, cap }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left to read before the cursor reaches the end of the cell.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.rpos
    }

    pub fn reset_read(&mut self) {
        self.rpos = 0;
    }

    fn grow(&mut self, n: usize) -> Result<(), ErrorCode> {
        if self.buf.len() + n > self.cap {
            return Err(ErrorCode::Overflow);
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&[u8], ErrorCode> {
        if self.rpos + n > self.buf.len() {
            return Err(ErrorCode::Deser);
        }
        let s = &self.buf[self.rpos..self.rpos + n];
        self.rpos += n;
        Ok(s)
    }

    // -- raw primitive writes, untagged --

    pub fn write_u8(&mut self, v: u8) -> Result<(), ErrorCode> {
        self.grow(1)?;
        self.buf.push(v);
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<(), ErrorCode> {
        self.write_u8(v as u8)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ErrorCode> {
        self.grow(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), ErrorCode> {
        let mut b = [0u8; 2];
        BigEndian::write_u16(&mut b, v);
        self.write_bytes(&b)
    }

    pub fn write_i16(&mut self, v: i16) -> Result<(), ErrorCode> {
        self.write_u16(v as u16)
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), ErrorCode> {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, v);
        self.write_bytes(&b)
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), ErrorCode> {
        self.write_u32(v as u32)
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), ErrorCode> {
        let mut b = [0u8; 8];
        BigEndian::write_u64(&mut b, v);
        self.write_bytes(&b)
    }

    pub fn write_i64(&mut self, v: i64) -> Result<(), ErrorCode> {
        self.write_u64(v as u64)
    }

    pub fn write_f32(&mut self, v: f32) -> Result<(), ErrorCode> {
        let mut b = [0u8; 4];
        BigEndian::write_f32(&mut b, v);
        self.write_bytes(&b)
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), ErrorCode> {
        let mut b = [0u8; 8];
        BigEndian::write_f64(&mut b, v);
        self.write_bytes(&b)
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), ErrorCode> {
        if s.len() > u16::MAX as usize {
            return Err(ErrorCode::Overflow);
        }
        self.write_u16(s.len() as u16)?;
        self.write_bytes(s.as_bytes())
    }

    // -- raw primitive reads, untagged --

    pub fn read_u8(&mut self) -> Result<u8, ErrorCode> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ErrorCode> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ErrorCode> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, ErrorCode> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ErrorCode> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ErrorCode> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, ErrorCode> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ErrorCode> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, ErrorCode> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ErrorCode> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    pub fn read_str(&mut self) -> Result<String, ErrorCode> {
        let n = self.read_u16()? as usize;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ErrorCode::Deser)
    }

    /// Read exactly `n` raw bytes with no type tag or length prefix,
    /// used by the `READ`/`WRITE` opcodes whose body already carries an
    /// explicit length field.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ErrorCode> {
        Ok(self.take(n)?.to_vec())
    }

    // -- tagged value codec --

    /// Write a type-tag byte followed by the value's encoding.
    pub fn write_value(&mut self, v: &Value) -> Result<(), ErrorCode> {
        self.write_u8(v.type_code().as_u8())?;
        self.write_payload(v)
    }

    fn write_payload(&mut self, v: &Value) -> Result<(), ErrorCode> {
        match v {
            Value::Bool(x) => self.write_u8(if *x { 1 } else { 0 }),
            Value::Int8(x) => self.write_i8(*x),
            Value::Int16(x) => self.write_i16(*x),
            Value::Int32(x) => self.write_i32(*x),
            Value::Int64(x) => self.write_i64(*x),
            Value::Uint8(x) => self.write_u8(*x),
            Value::Uint16(x) => self.write_u16(*x),
            Value::Uint32(x) => self.write_u32(*x),
            Value::Uint64(x) => self.write_u64(*x),
            Value::Float(x) => self.write_f32(*x),
            Value::Double(x) => self.write_f64(*x),
            Value::Ipv4(x) => self.write_bytes(&x.octets()),
            Value::Vec2F(x) => {
                self.write_f32(x[0])?;
                self.write_f32(x[1])
            }
            Value::Vec3F(x) => {
                self.write_f32(x[0])?;
                self.write_f32(x[1])?;
                self.write_f32(x[2])
            }
            Value::Vec2D(x) => {
                self.write_f64(x[0])?;
                self.write_f64(x[1])
            }
            Value::Vec3D(x) => {
                self.write_f64(x[0])?;
                self.write_f64(x[1])?;
                self.write_f64(x[2])
            }
            Value::Str(s) => self.write_str(s),
            Value::Int8Array(xs) => self.write_array(xs, |c, x| c.write_i8(*x)),
            Value::Int16Array(xs) => self.write_array(xs, |c, x| c.write_i16(*x)),
            Value::Int32Array(xs) => self.write_array(xs, |c, x| c.write_i32(*x)),
            Value::Int64Array(xs) => self.write_array(xs, |c, x| c.write_i64(*x)),
            Value::Uint8Array(xs) => self.write_array(xs, |c, x| c.write_u8(*x)),
            Value::Uint16Array(xs) => self.write_array(xs, |c, x| c.write_u16(*x)),
            Value::Uint32Array(xs) => self.write_array(xs, |c, x| c.write_u32(*x)),
            Value::Uint64Array(xs) => self.write_array(xs, |c, x| c.write_u64(*x)),
            Value::Call => Ok(()),
        }
    }

    fn write_array<T, F>(&mut self, xs: &[T], mut f: F) -> Result<(), ErrorCode>
    where
        F: FnMut(&mut Self, &T) -> Result<(), ErrorCode>,
    {
        if xs.len() > u16::MAX as usize {
            return Err(ErrorCode::Overflow);
        }
        self.write_u16(xs.len() as u16)?;
        for x in xs {
            f(self, x)?;
        }
        Ok(())
    }

    /// Read the next tag byte without decoding a payload.
    pub fn read_tag(&mut self) -> Result<u8, ErrorCode> {
        self.read_u8()
    }

    /// Consume the payload bytes belonging to `tag` without interpreting
    /// them, so a subsequent read starts at the next value in the cell.
    /// An unrecognized tag can't be skipped safely and yields `Deser`.
    pub fn skip_value(&mut self, tag: u8) -> Result<(), ErrorCode> {
        let tc = TypeCode::from_u8(tag).ok_or(ErrorCode::Deser)?;
        if let Some(width) = tc.fixed_width() {
            self.take(width)?;
            return Ok(());
        }
        if tc == TypeCode::Str {
            let n = self.read_u16()? as usize;
            self.take(n)?;
            return Ok(());
        }
        let elem_width = tc.array_width().expect("every variable-width type is str or array");
        let n = self.read_u16()? as usize;
        self.take(n * elem_width)?;
        Ok(())
    }

    /// Read a value tagged with exactly `expected`. A mismatched tag is
    /// skipped (to preserve cursor alignment) and reported as `Type`.
    pub fn read_expect(&mut self, expected: TypeCode) -> Result<Value, ErrorCode> {
        let tag = self.read_tag()?;
        if tag != expected.as_u8() {
            self.skip_value(tag)?;
            return Err(ErrorCode::Type);
        }
        self.read_payload(expected)
    }

    /// Read whatever value is next, regardless of type. Used by the query
    /// server and save/load grammar, which accept any wire type.
    pub fn read_value(&mut self) -> Result<Value, ErrorCode> {
        let tag = self.read_tag()?;
        let tc = TypeCode::from_u8(tag).ok_or(ErrorCode::Deser)?;
        self.read_payload(tc)
    }

    fn read_payload(&mut self, tc: TypeCode) -> Result<Value, ErrorCode> {
        Ok(match tc {
            TypeCode::Bool => Value::Bool(self.read_u8()? != 0),
            TypeCode::Int8 => Value::Int8(self.read_i8()?),
            TypeCode::Int16 => Value::Int16(self.read_i16()?),
            TypeCode::Int32 => Value::Int32(self.read_i32()?),
            TypeCode::Int64 => Value::Int64(self.read_i64()?),
            TypeCode::Uint8 => Value::Uint8(self.read_u8()?),
            TypeCode::Uint16 => Value::Uint16(self.read_u16()?),
            TypeCode::Uint32 => Value::Uint32(self.read_u32()?),
            TypeCode::Uint64 => Value::Uint64(self.read_u64()?),
            TypeCode::Float => Value::Float(self.read_f32()?),
            TypeCode::Double => Value::Double(self.read_f64()?),
            TypeCode::Ipv4 => {
                let b = self.take(4)?;
                Value::Ipv4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            TypeCode::Vec2F => Value::Vec2F([self.read_f32()?, self.read_f32()?]),
            TypeCode::Vec3F => {
                Value::Vec3F([self.read_f32()?, self.read_f32()?, self.read_f32()?])
            }
            TypeCode::Vec2D => Value::Vec2D([self.read_f64()?, self.read_f64()?]),
            TypeCode::Vec3D => {
                Value::Vec3D([self.read_f64()?, self.read_f64()?, self.read_f64()?])
            }
            TypeCode::Str => Value::Str(self.read_str()?),
            TypeCode::Int8Array => Value::Int8Array(self.read_array(Cell::read_i8)?),
            TypeCode::Int16Array => Value::Int16Array(self.read_array(Cell::read_i16)?),
            TypeCode::Int32Array => Value::Int32Array(self.read_array(Cell::read_i32)?),
            TypeCode::Int64Array => Value::Int64Array(self.read_array(Cell::read_i64)?),
            TypeCode::Uint8Array => Value::Uint8Array(self.read_array(Cell::read_u8)?),
            TypeCode::Uint16Array => Value::Uint16Array(self.read_array(Cell::read_u16)?),
            TypeCode::Uint32Array => Value::Uint32Array(self.read_array(Cell::read_u32)?),
            TypeCode::Uint64Array => Value::Uint64Array(self.read_array(Cell::read_u64)?),
            TypeCode::Call => Value::Call,
        })
    }

    fn read_array<T, F>(&mut self, mut f: F) -> Result<Vec<T>, ErrorCode>
    where
        F: FnMut(&mut Self) -> Result<T, ErrorCode>,
    {
        let n = self.read_u16()? as usize;
        let mut out = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            out.push(f(self)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_every_scalar_kind() {
        let values = vec![
            Value::Bool(true),
            Value::Int8(-5),
            Value::Int16(-1000),
            Value::Int32(-100_000),
            Value::Int64(-1),
            Value::Uint8(200),
            Value::Uint16(60000),
            Value::Uint32(4_000_000_000),
            Value::Uint64(u64::MAX),
            Value::Float(1.5),
            Value::Double(2.5),
            Value::Ipv4(Ipv4Addr::new(192, 168, 1, 1)),
            Value::Vec2F([1.0, 2.0]),
            Value::Vec3F([1.0, 2.0, 3.0]),
            Value::Vec2D([1.0, 2.0]),
            Value::Vec3D([1.0, 2.0, 3.0]),
            Value::Str("hello".into()),
            Value::Int32Array(vec![1, -2, 3]),
            Value::Uint8Array(vec![1, 2, 3]),
            Value::Call,
        ];
        for v in values {
            let mut c = Cell::new(256);
            c.write_value(&v).unwrap();
            let mut r = Cell::from_vec(c.into_vec());
            assert_eq!(r.read_value().unwrap(), v);
        }
    }

    #[test]
    fn overflow_on_write_past_capacity() {
        let mut c = Cell::new(2);
        assert!(c.write_u32(1).is_err());
    }

    #[test]
    fn deser_on_read_past_end() {
        let mut c = Cell::from_vec(vec![0x00]);
        assert_eq!(c.read_u32(), Err(ErrorCode::Deser));
    }

    #[test]
    fn type_mismatch_skips_and_preserves_alignment() {
        let mut c = Cell::new(64);
        c.write_value(&Value::Uint32(7)).unwrap();
        c.write_value(&Value::Str("next".into())).unwrap();
        let mut r = Cell::from_vec(c.into_vec());
        assert_eq!(r.read_expect(TypeCode::Bool), Err(ErrorCode::Type));
        assert_eq!(
            r.read_expect(TypeCode::Str),
            Ok(Value::Str("next".into()))
        );
    }

    #[test]
    fn unrecognized_tag_is_deser() {
        let mut c = Cell::from_vec(vec![0x99]);
        assert_eq!(c.read_value(), Err(ErrorCode::Deser));
    }
}
