//! Module for cursors over a byte slice.
//!

use crate::codec::{Decode, Encode, Error};

/// Not a byte writer. It is just a cursor to track where a byte slice is being written.
pub struct WriteCursor<'d> {
    pos: usize,
    data: &'d mut [u8],
}

impl<'d> WriteCursor<'d> {
    /// Creates a new write cursor at the beginning of the data.
    pub fn new(data: &'d mut [u8]) -> Self {
        Self { pos: 0, data }
    }

    /// Append byte slice
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.available() < data.len() {
            Err(Error::InsufficientSpace)
        } else {
            self.data[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            Ok(())
        }
    }

    /// Write fixed sized type
    pub fn write<E: Encode>(&mut self, data: E) -> Result<(), Error> {
        if self.available() < data.size() {
            Err(Error::InsufficientSpace)
        } else {
            data.encode(&mut self.data[self.pos..self.pos + data.size()])?;
            self.pos += data.size();
            Ok(())
        }
    }

    /// Write the lower 24 bits of a value, as used by extended advertising intervals.
    pub fn write_u24(&mut self, value: u32) -> Result<(), Error> {
        if value > 0x00ff_ffff {
            return Err(Error::InvalidValue);
        }
        self.append(&value.to_le_bytes()[..3])
    }

    /// Returns amount of bytes that remain available.
    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns the current length of the data written.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Returns the byte slice that was written by this cursor.
    pub fn finish(self) -> &'d mut [u8] {
        &mut self.data[..self.pos]
    }
}

#[derive(Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub struct ReadCursor<'d> {
    pos: usize,
    data: &'d [u8],
}

impl<'d> ReadCursor<'d> {
    pub fn new(data: &'d [u8]) -> Self {
        Self { pos: 0, data }
    }

    pub fn read<T: Decode<'d>>(&mut self) -> Result<T, Error> {
        let src = &self.data[self.pos..];
        let val = T::decode(src)?;
        self.pos += val.size();
        Ok(val)
    }

    pub fn slice(&mut self, nbytes: usize) -> Result<&'d [u8], Error> {
        if self.available() < nbytes {
            Err(Error::InsufficientSpace)
        } else {
            let src = &self.data[self.pos..self.pos + nbytes];
            self.pos += nbytes;
            Ok(src)
        }
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn remaining(self) -> &'d [u8] {
        &self.data[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_past_end_is_rejected() {
        let mut buf = [0; 3];
        let mut w = WriteCursor::new(&mut buf);
        w.write(0x0201u16).unwrap();
        assert_eq!(w.write(0x0403u16), Err(Error::InsufficientSpace));
        w.write(0x05u8).unwrap();
        assert_eq!(w.available(), 0);
        assert_eq!(w.finish(), &[0x01, 0x02, 0x05]);
    }

    #[test]
    fn u24_intervals() {
        let mut buf = [0; 3];
        let mut w = WriteCursor::new(&mut buf);
        assert_eq!(w.write_u24(0x0100_0000), Err(Error::InvalidValue));
        w.write_u24(0x0000a0).unwrap();
        assert_eq!(buf, [0xa0, 0x00, 0x00]);
    }

    #[test]
    fn read_past_end_does_not_panic() {
        let data = [0x34, 0x12, 0x99];
        let mut r = ReadCursor::new(&data);
        assert_eq!(r.read::<u16>().unwrap(), 0x1234);
        assert_eq!(r.read::<u16>(), Err(Error::InsufficientSpace));
        assert_eq!(r.slice(2), Err(Error::InsufficientSpace));
        assert_eq!(r.read::<u8>().unwrap(), 0x99);
        assert_eq!(r.available(), 0);
        assert!(r.remaining().is_empty());
    }
}
