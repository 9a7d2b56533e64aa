use crate::codec::{Decode, Encode, Error, FixedSize};

//
// Implementations for primitives
//
impl FixedSize for u8 {
    const SIZE: usize = 1;
}

impl FixedSize for i8 {
    const SIZE: usize = 1;
}

impl FixedSize for u16 {
    const SIZE: usize = 2;
}

impl FixedSize for u32 {
    const SIZE: usize = 4;
}

impl FixedSize for u64 {
    const SIZE: usize = 8;
}

impl<const N: usize> FixedSize for [u8; N] {
    const SIZE: usize = N;
}

fn check(src: &[u8], size: usize) -> Result<(), Error> {
    if src.len() < size {
        Err(Error::InsufficientSpace)
    } else {
        Ok(())
    }
}

impl Decode<'_> for u8 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        check(src, Self::SIZE)?;
        Ok(src[0])
    }
}

impl Decode<'_> for i8 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        check(src, Self::SIZE)?;
        Ok(src[0] as i8)
    }
}

impl Decode<'_> for u16 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        check(src, Self::SIZE)?;
        Ok(u16::from_le_bytes([src[0], src[1]]))
    }
}

impl Decode<'_> for u32 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        check(src, Self::SIZE)?;
        Ok(u32::from_le_bytes([src[0], src[1], src[2], src[3]]))
    }
}

impl Decode<'_> for u64 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        check(src, Self::SIZE)?;
        let mut b = [0; 8];
        b.copy_from_slice(&src[..8]);
        Ok(u64::from_le_bytes(b))
    }
}

impl<const N: usize> Decode<'_> for [u8; N] {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        check(src, N)?;
        let mut b = [0; N];
        b.copy_from_slice(&src[..N]);
        Ok(b)
    }
}

impl Encode for u8 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest[0] = *self;
        Ok(())
    }
}

impl Encode for i8 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest[0] = *self as u8;
        Ok(())
    }
}

impl Encode for u16 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest.copy_from_slice(&self.to_le_bytes()[..]);
        Ok(())
    }
}

impl Encode for u32 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest.copy_from_slice(&self.to_le_bytes()[..]);
        Ok(())
    }
}

impl Encode for u64 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest.copy_from_slice(&self.to_le_bytes()[..]);
        Ok(())
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        dest.copy_from_slice(&self[..]);
        Ok(())
    }
}
