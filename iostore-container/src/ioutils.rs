//! Internal utility functions for reading TOC structures.

use std::io::{Error, ErrorKind, Read};

/// Generic trait for reading integer types from a buffer.
pub trait ReadInt {
    /// Error type which can be returned on read failures.
    type Error;

    /// Read a `u8` from the buffer.
    fn read_u8(&mut self) -> Result<u8, Self::Error>;

    /// Read a little-endian `u16` from the buffer.
    fn read_u16le(&mut self) -> Result<u16, Self::Error>;

    /// Read a little-endian `u32` from the buffer.
    fn read_u32le(&mut self) -> Result<u32, Self::Error>;

    /// Read a little-endian `u64` from the buffer.
    fn read_u64le(&mut self) -> Result<u64, Self::Error>;

    /// Read a little-endian `i32` from the buffer.
    fn read_i32le(&mut self) -> Result<i32, Self::Error>;

    /// Read a big-endian 40-bit unsigned integer from the buffer.
    fn read_u40be(&mut self) -> Result<u64, Self::Error>;
}

impl<T: Read> ReadInt for T {
    type Error = Error;

    fn read_u8(&mut self) -> Result<u8, Self::Error> {
        let mut b = [0; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_u16le(&mut self) -> Result<u16, Self::Error> {
        let mut b = [0; size_of::<u16>()];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    fn read_u32le(&mut self) -> Result<u32, Self::Error> {
        let mut b = [0; size_of::<u32>()];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64le(&mut self) -> Result<u64, Self::Error> {
        let mut b = [0; size_of::<u64>()];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn read_i32le(&mut self) -> Result<i32, Self::Error> {
        let mut b = [0; size_of::<i32>()];
        self.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    fn read_u40be(&mut self) -> Result<u64, Self::Error> {
        let mut b = [0; size_of::<u64>()];
        self.read_exact(&mut b[3..])?;
        Ok(u64::from_be_bytes(b))
    }
}

/// Read a serialized string: a little-endian `i32` length (including the
/// NUL terminator) followed by that many bytes.
///
/// A negative length denotes a UTF-16 string, which the directory index
/// never uses; it is rejected as invalid data.
pub fn read_string<R: Read>(reader: &mut R) -> Result<String, Error> {
    let len = reader.read_i32le()?;

    if len < 0 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "UTF-16 serialized strings are not supported",
        ));
    }
    if len == 0 {
        return Ok(String::new());
    }

    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;

    // Drop the NUL terminator and anything after it.
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    bytes.truncate(end);

    String::from_utf8(bytes)
        .map_err(|e| Error::new(ErrorKind::InvalidData, format!("invalid string: {e}")))
}

/// Read a length-prefixed array: a little-endian `u32` count followed by
/// `count` elements decoded by `f`.
pub fn read_array<R, T, F>(reader: &mut R, mut f: F) -> Result<Vec<T>, Error>
where
    R: Read,
    F: FnMut(&mut R) -> Result<T, Error>,
{
    let count = reader.read_u32le()?;
    let mut items = Vec::with_capacity(count.min(0x0010_0000) as usize);
    for _ in 0..count {
        items.push(f(reader)?);
    }
    Ok(items)
}
