//! Transaction input record.
//!
//! Wire layout (standard form):
//!
//! ```text
//! prev tx hash    32 bytes
//! prev out index  4 bytes LE
//! script length   varint
//! script          script-length bytes
//! sequence        4 bytes LE
//! ```
//!
//! The extended form appends the previous output's satoshis (8 bytes LE)
//! and locking script (varint length + bytes), carrying everything offline
//! signing needs.

use crate::script::Script;
use crate::util::{Error, Hash256, Result, Serializable, var_int};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io;
use std::io::{Read, Write};

/// The default finalized sequence number.
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    /// Hash of the previous transaction, in network byte order. Display
    /// reversal happens only when formatting.
    pub prev_tx_hash: Hash256,
    /// Index of the output being spent in the previous transaction.
    pub prev_out_index: u32,
    /// Script proving authorization to spend. Empty until signing.
    pub unlocking_script: Script,
    /// Sequence number; 0xFFFFFFFF marks the input final.
    pub sequence: u32,
    /// Value of the previous output. Extended form only.
    pub prev_satoshis: u64,
    /// Locking script of the previous output. Extended form only.
    pub prev_locking_script: Option<Script>,
}

impl Default for Input {
    fn default() -> Input {
        Input {
            prev_tx_hash: Hash256::ZERO,
            prev_out_index: 0,
            unlocking_script: Script::new(),
            sequence: DEFAULT_SEQUENCE,
            prev_satoshis: 0,
            prev_locking_script: None,
        }
    }
}

impl Input {
    /// The previous transaction id in display hex.
    #[must_use]
    pub fn prev_txid(&self) -> String {
        self.prev_tx_hash.encode()
    }

    /// Serialized size of the standard form in bytes, without allocating.
    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        let l = self.unlocking_script.len();
        40 + var_int::size(l as u64) + l
    }

    /// Serialized size of the extended form in bytes, without allocating.
    #[must_use]
    #[inline]
    pub fn extended_size(&self) -> usize {
        let l = self.prev_locking_script.as_ref().map_or(0, Script::len);
        self.size() + 8 + var_int::size(l as u64) + l
    }

    /// Reads an extended-form input.
    ///
    /// # Errors
    /// `Error::InputTooShort` when the reader runs dry mid-field.
    pub fn read_extended(reader: &mut dyn Read) -> Result<Input> {
        let mut input = Input::read(reader)?;
        let prev_satoshis = reader
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::InputTooShort)?;
        let script_len = var_int::read(reader)? as usize;
        let mut prev_locking_script = vec![0u8; script_len];
        reader
            .read_exact(&mut prev_locking_script)
            .map_err(|_| Error::InputTooShort)?;
        input.prev_satoshis = prev_satoshis;
        input.prev_locking_script = Some(Script::from_bytes(prev_locking_script));
        Ok(input)
    }

    /// Writes the extended form: standard fields then the prevout tail.
    ///
    /// # Errors
    /// IO errors.
    pub fn write_extended(&self, writer: &mut dyn Write) -> io::Result<()> {
        self.write(writer)?;
        writer.write_u64::<LittleEndian>(self.prev_satoshis)?;
        match &self.prev_locking_script {
            Some(script) => {
                var_int::write(script.len() as u64, writer)?;
                writer.write_all(script.as_bytes())
            }
            None => var_int::write(0, writer),
        }
    }

    /// Writes the 36-byte outpoint used in prevout digests.
    pub(crate) fn write_outpoint(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.prev_tx_hash.0)?;
        writer.write_u32::<LittleEndian>(self.prev_out_index)
    }

    /// Clones the input with fresh script buffers.
    #[must_use]
    pub fn deep_clone(&self) -> Input {
        Input {
            prev_tx_hash: self.prev_tx_hash,
            prev_out_index: self.prev_out_index,
            unlocking_script: self.unlocking_script.deep_clone(),
            sequence: self.sequence,
            prev_satoshis: self.prev_satoshis,
            prev_locking_script: self.prev_locking_script.as_ref().map(Script::deep_clone),
        }
    }
}

impl Serializable<Input> for Input {
    fn read(reader: &mut dyn Read) -> Result<Input> {
        let mut prev_tx_hash = [0u8; 32];
        reader.read_exact(&mut prev_tx_hash).map_err(|_| Error::InputTooShort)?;
        let prev_out_index = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::InputTooShort)?;
        let script_len = var_int::read(reader)? as usize;
        let mut unlocking_script = vec![0u8; script_len];
        reader
            .read_exact(&mut unlocking_script)
            .map_err(|_| Error::InputTooShort)?;
        let sequence = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::InputTooShort)?;
        Ok(Input {
            prev_tx_hash: Hash256(prev_tx_hash),
            prev_out_index,
            unlocking_script: Script::from_bytes(unlocking_script),
            sequence,
            prev_satoshis: 0,
            prev_locking_script: None,
        })
    }

    fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.prev_tx_hash.0)?;
        writer.write_u32::<LittleEndian>(self.prev_out_index)?;
        var_int::write(self.unlocking_script.len() as u64, writer)?;
        writer.write_all(self.unlocking_script.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.sequence)
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "prevTxHash: {} prevOutIndex: {} scriptLen: {} sequence: {:x}",
            self.prev_txid(),
            self.prev_out_index,
            self.unlocking_script.len(),
            self.sequence,
        )
    }
}
