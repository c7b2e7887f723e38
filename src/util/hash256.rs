//! 256-bit hash for blocks and transactions.
//
/// Stored in network byte order; displayed as hex of the reversed bytes.
use crate::util::{Error, Result, Serializable};
use bitcoin_hashes::{Hash as BHHash, sha256d as bh_sha256d};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::io::{Read, Write};

/// 256-bit hash for blocks and transactions.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash, used by coinbase previous outpoints.
    pub const ZERO: Hash256 = Hash256([0; 32]);

    /// Converts the hash into its display hex string (byte-reversed).
    #[must_use]
    #[inline]
    pub fn encode(&self) -> String {
        let mut r = self.0;
        r.reverse();
        hex::encode(r)
    }

    /// Converts a display hex string into a hash.
    ///
    /// Accepts up to 64 characters; shorter or odd-length strings are
    /// left-padded with zero nibbles in display order.
    ///
    /// # Errors
    /// `Error::HashStrSize` for strings longer than 64 characters,
    /// `Error::HexInvalid` for non-hex characters.
    #[inline]
    pub fn decode(s: &str) -> Result<Hash256> {
        if s.len() > 64 {
            return Err(Error::HashStrSize(s.len()));
        }
        let mut padded = String::with_capacity(64);
        for _ in 0..64 - s.len() {
            padded.push('0');
        }
        padded.push_str(s);
        let decoded_bytes = hex::decode(&padded)?;
        let mut hash_bytes = [0; 32];
        hash_bytes.copy_from_slice(&decoded_bytes);
        hash_bytes.reverse();
        Ok(Hash256(hash_bytes))
    }

    /// Returns true if every byte is zero.
    #[must_use]
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl Serializable<Hash256> for Hash256 {
    fn read(reader: &mut dyn Read) -> Result<Hash256> {
        let mut bytes = [0; 32];
        reader.read_exact(&mut bytes).map_err(Error::IOError)?;
        Ok(Hash256(bytes))
    }

    fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&self.0)
    }
}

/// Hashes a data array twice using SHA256.
#[must_use]
#[inline]
pub fn sha256d(data: &[u8]) -> Hash256 {
    let h = bh_sha256d::Hash::hash(data).to_byte_array();
    Hash256(h)
}

impl Ord for Hash256 {
    fn cmp(&self, other: &Hash256) -> Ordering {
        for i in (0..32).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Hash256 {
    fn partial_cmp(&self, other: &Hash256) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::decode(&s).map_err(D::Error::custom)
    }
}
