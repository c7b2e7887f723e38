//! Variable length integer (varint) ser/des for the Bitcoin SV wire format.

use crate::util::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use std::io::{Read, Write};

/// Returns the number of bytes required for the varint without allocating.
#[must_use]
#[inline]
pub fn size(n: u64) -> usize {
    if n <= 252 {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffffffff {
        5
    } else {
        9
    }
}

/// Writes the varint to bytes using the smallest form for the value.
#[inline]
pub fn write(n: u64, writer: &mut dyn Write) -> io::Result<()> {
    if n <= 252 {
        writer.write_u8(n as u8)
    } else if n <= 0xffff {
        writer.write_u8(0xfd)?;
        writer.write_u16::<LittleEndian>(n as u16)
    } else if n <= 0xffffffff {
        writer.write_u8(0xfe)?;
        writer.write_u32::<LittleEndian>(n as u32)
    } else {
        writer.write_u8(0xff)?;
        writer.write_u64::<LittleEndian>(n)
    }
}

/// Reads a varint from bytes. Non-canonical encodings are accepted.
///
/// # Errors
/// `Error::VarIntTruncated` if the declared trailer cannot be supplied.
#[inline]
pub fn read(reader: &mut dyn Read) -> Result<u64> {
    let n0 = reader.read_u8().map_err(|_| Error::VarIntTruncated)?;
    match n0 {
        0xff => reader.read_u64::<LittleEndian>().map_err(|_| Error::VarIntTruncated),
        0xfe => reader
            .read_u32::<LittleEndian>()
            .map(u64::from)
            .map_err(|_| Error::VarIntTruncated),
        0xfd => reader
            .read_u16::<LittleEndian>()
            .map(u64::from)
            .map_err(|_| Error::VarIntTruncated),
        _ => Ok(n0 as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn size_bands() {
        assert_eq!(super::size(0), 1);
        assert_eq!(super::size(252), 1);
        assert_eq!(super::size(253), 3);
        assert_eq!(super::size(u16::MAX as u64), 3);
        assert_eq!(super::size(u16::MAX as u64 + 1), 5);
        assert_eq!(super::size(u32::MAX as u64), 5);
        assert_eq!(super::size(u32::MAX as u64 + 1), 9);
        assert_eq!(super::size(u64::MAX), 9);
    }

    #[test]
    fn write_read() {
        write_read_value(0);
        write_read_value(252);
        write_read_value(253);
        write_read_value(u16::MAX as u64);
        write_read_value(u32::MAX as u64);
        write_read_value(u64::MAX);
    }

    fn write_read_value(n: u64) {
        let mut v = Vec::new();
        write(n, &mut v).unwrap();
        assert_eq!(v.len(), size(n));
        assert_eq!(read(&mut Cursor::new(&v)).unwrap(), n);
    }

    #[test]
    fn truncated() {
        // 0xfd prefix declares a two byte trailer, only one supplied
        let mut c = Cursor::new(vec![0xfdu8, 0x01]);
        assert!(matches!(read(&mut c), Err(Error::VarIntTruncated)));
        let mut c = Cursor::new(Vec::<u8>::new());
        assert!(matches!(read(&mut c), Err(Error::VarIntTruncated)));
    }

    #[test]
    fn non_canonical_accepted() {
        // 1 encoded wastefully with the 0xfd form
        let mut c = Cursor::new(vec![0xfdu8, 0x01, 0x00]);
        assert_eq!(read(&mut c).unwrap(), 1);
    }
}
