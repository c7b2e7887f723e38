//! Transaction output record.
//!
//! Wire layout: `satoshis (8 bytes LE) ‖ varint(script length) ‖ script`.

use crate::script::Script;
use crate::util::{Error, Result, Serializable, var_int};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io;
use std::io::{Read, Write};

/// Transaction output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    /// Number of satoshis locked by this output.
    pub satoshis: u64,
    /// Script that must be satisfied to spend this output.
    pub locking_script: Script,
}

impl Output {
    /// Serialized size in bytes, without allocating.
    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        let l = self.locking_script.len();
        8 + var_int::size(l as u64) + l
    }

    /// The serialization used when hashing outputs for signature digests.
    #[must_use]
    pub fn bytes_for_sig_hash(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        self.write(&mut buf).unwrap_or_default();
        buf
    }

    /// Clones the output with a fresh script buffer.
    #[must_use]
    pub fn deep_clone(&self) -> Output {
        Output { satoshis: self.satoshis, locking_script: self.locking_script.deep_clone() }
    }
}

impl Serializable<Output> for Output {
    fn read(reader: &mut dyn Read) -> Result<Output> {
        let satoshis = reader
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::OutputTooShort)?;
        let script_len = var_int::read(reader)? as usize;
        let mut locking_script = vec![0u8; script_len];
        reader
            .read_exact(&mut locking_script)
            .map_err(|_| Error::OutputTooShort)?;
        Ok(Output { satoshis, locking_script: Script::from_bytes(locking_script) })
    }

    fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.satoshis.to_le_bytes())?;
        var_int::write(self.locking_script.len() as u64, writer)?;
        writer.write_all(self.locking_script.as_bytes())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "value: {} scriptLen: {} script: {}",
            self.satoshis,
            self.locking_script.len(),
            self.locking_script,
        )
    }
}
