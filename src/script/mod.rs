//! Script values, opcodes and the evaluation engine.

pub mod checker;
pub mod debug;
pub mod interpreter;
pub mod op_codes;
pub mod stack;

pub use self::checker::{Checker, TransactionChecker, TransactionlessChecker};
pub use self::debug::{CondState, Debugger, NopDebugger, State};
pub use self::interpreter::Engine;
pub use self::op_codes::next_op;

use crate::address::{Network, encode_p2pkh_address};
use crate::util::{Error, Hash160, Result};
use op_codes::*;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Recognized locking script shapes.
///
/// Carries the data downstream signing needs so callers can match on it
/// exhaustively instead of re-probing byte prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptType {
    /// Pay-to-public-key-hash.
    P2pkh {
        /// The 20-byte public key hash the script pays to.
        pubkey_hash: Hash160,
    },
    /// P2PKH followed by an ordinal inscription envelope.
    P2pkhInscription {
        /// The 20-byte public key hash of the P2PKH prefix.
        pubkey_hash: Hash160,
    },
    /// Data carrier: OP_RETURN or OP_FALSE OP_RETURN.
    OpReturn,
    /// Anything else.
    Unknown,
}

/// An immutable byte sequence holding Bitcoin script.
///
/// The byte buffer is shared on clone; builder methods copy-on-write. This
/// gives record-level clones the aliasing the wire formats assume while
/// keeping mutation safe.
#[derive(Default, Clone, PartialEq, Eq, Hash)]
pub struct Script(Arc<Vec<u8>>);

impl Script {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Script {
        Script::default()
    }

    /// Creates a script from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Script {
        Script(Arc::new(bytes))
    }

    /// Creates a script from a hex string.
    ///
    /// # Errors
    /// `Error::HexInvalid` for non-hex input.
    pub fn from_hex(s: &str) -> Result<Script> {
        Ok(Script::from_bytes(hex::decode(s)?))
    }

    /// Creates a script from its ASM form.
    ///
    /// Tokens are opcode names or hex data pushes.
    ///
    /// # Errors
    /// `Error::BadArgument` for unknown opcode names,
    /// `Error::HexInvalid` for malformed data tokens.
    pub fn from_asm(asm: &str) -> Result<Script> {
        let mut script = Script::new();
        for token in asm.split_whitespace() {
            if let Some(op) = op_codes::from_name(token) {
                script.append(op);
            } else if token.starts_with("OP_") {
                return Err(Error::BadArgument(format!("Unknown opcode: {}", token)));
            } else {
                script.append_data(&hex::decode(token)?)?;
            }
        }
        Ok(script)
    }

    /// The script bytes.
    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The script bytes as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Disassembles the script using the standard opcode table.
    ///
    /// Data pushes render as hex; a truncated trailing push renders the
    /// bytes that are present.
    #[must_use]
    pub fn to_asm(&self) -> String {
        let b = self.as_bytes();
        let mut parts: Vec<String> = Vec::new();
        let mut i = 0;
        while i < b.len() {
            let op = b[i];
            let data_start = match op {
                1..=75 => Some(i + 1),
                OP_PUSHDATA1 => Some(i + 2),
                OP_PUSHDATA2 => Some(i + 3),
                OP_PUSHDATA4 => Some(i + 5),
                _ => None,
            };
            match data_start {
                Some(start) => {
                    let next = next_op(i, b);
                    let start = start.min(b.len());
                    parts.push(hex::encode(&b[start..next.min(b.len())]));
                    i = next;
                }
                None => {
                    match op_codes::name(op) {
                        Some(name) => parts.push(name.to_string()),
                        None => parts.push(format!("OP_UNKNOWN_{}", op)),
                    }
                    i += 1;
                }
            }
        }
        parts.join(" ")
    }

    /// Script length in bytes.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script is empty.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clones the script with a fresh buffer, sharing nothing.
    #[must_use]
    pub fn deep_clone(&self) -> Script {
        Script(Arc::new(self.0.as_ref().clone()))
    }

    fn bytes_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }

    /// Appends a single opcode.
    pub fn append(&mut self, op: u8) {
        self.bytes_mut().push(op);
    }

    /// Appends raw bytes without any push opcode.
    pub fn append_slice(&mut self, slice: &[u8]) {
        self.bytes_mut().extend_from_slice(slice);
    }

    /// Appends a data push using the smallest push opcode for the length.
    ///
    /// # Errors
    /// `Error::BadArgument` for data longer than a PUSHDATA4 can carry.
    pub fn append_data(&mut self, data: &[u8]) -> Result<()> {
        let b = self.bytes_mut();
        match data.len() {
            0 => b.push(OP_0),
            1..=75 => {
                b.push(data.len() as u8);
                b.extend_from_slice(data);
            }
            76..=0xff => {
                b.push(OP_PUSHDATA1);
                b.push(data.len() as u8);
                b.extend_from_slice(data);
            }
            0x100..=0xffff => {
                b.push(OP_PUSHDATA2);
                b.extend_from_slice(&(data.len() as u16).to_le_bytes());
                b.extend_from_slice(data);
            }
            len if len <= u32::MAX as usize => {
                b.push(OP_PUSHDATA4);
                b.extend_from_slice(&(data.len() as u32).to_le_bytes());
                b.extend_from_slice(data);
            }
            len => return Err(Error::BadArgument(format!("Data too long: {}", len))),
        }
        Ok(())
    }

    /// Appends a number as a minimally-encoded data push.
    ///
    /// # Errors
    /// `ScriptError::NumericOverflow` for values outside the classic range.
    pub fn append_num(&mut self, val: i64) -> Result<()> {
        let encoded = stack::encode_num(val)?;
        self.append_data(&encoded)
    }

    /// Returns the first matching classification for the script.
    #[must_use]
    pub fn script_type(&self) -> ScriptType {
        let b = self.as_bytes();
        if is_p2pkh_prefix(b) {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[3..23]);
            if b.len() == 25 {
                return ScriptType::P2pkh { pubkey_hash: Hash160(hash) };
            }
            // inscription envelope: OP_FALSE OP_IF "ord"
            if b.len() > 30 && b[25] == OP_FALSE && b[26] == OP_IF && b[27] == 3 && &b[28..31] == b"ord"
            {
                return ScriptType::P2pkhInscription { pubkey_hash: Hash160(hash) };
            }
            return ScriptType::Unknown;
        }
        if self.is_data() {
            return ScriptType::OpReturn;
        }
        ScriptType::Unknown
    }

    /// Whether the script is the exact 25-byte P2PKH template.
    #[must_use]
    pub fn is_p2pkh(&self) -> bool {
        matches!(self.script_type(), ScriptType::P2pkh { .. })
    }

    /// Whether the script is a data carrier (OP_RETURN or
    /// OP_FALSE OP_RETURN prefix).
    #[must_use]
    pub fn is_data(&self) -> bool {
        let b = self.as_bytes();
        b.first() == Some(&OP_RETURN)
            || (b.len() >= 2 && b[0] == OP_FALSE && b[1] == OP_RETURN)
    }

    /// Extracts the public key hash from a P2PKH-class script.
    ///
    /// # Errors
    /// `Error::InvalidScriptType` for any other shape.
    pub fn public_key_hash(&self) -> Result<Hash160> {
        match self.script_type() {
            ScriptType::P2pkh { pubkey_hash } | ScriptType::P2pkhInscription { pubkey_hash } => {
                Ok(pubkey_hash)
            }
            other => Err(Error::InvalidScriptType(format!("{:?}", other))),
        }
    }

    /// Returns the display addresses derivable from a P2PKH-class script.
    ///
    /// # Errors
    /// `Error::InvalidScriptType` for non-P2PKH scripts.
    pub fn addresses(&self) -> Result<Vec<String>> {
        let hash = self.public_key_hash()?;
        Ok(vec![encode_p2pkh_address(Network::Mainnet, &hash.0)?])
    }
}

fn is_p2pkh_prefix(b: &[u8]) -> bool {
    b.len() >= 25
        && b[0] == OP_DUP
        && b[1] == OP_HASH160
        && b[2] == OP_PUSH + 20
        && b[23] == OP_EQUALVERIFY
        && b[24] == OP_CHECKSIG
}

impl Deref for Script {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Script {
        Script::from_bytes(bytes)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_data_selects_smallest_push() {
        let mut s = Script::new();
        s.append_data(&[]).unwrap();
        assert_eq!(s.as_bytes(), &[OP_0]);

        let mut s = Script::new();
        s.append_data(&[7; 75]).unwrap();
        assert_eq!(s.as_bytes()[0], 75);
        assert_eq!(s.len(), 76);

        let mut s = Script::new();
        s.append_data(&[7; 76]).unwrap();
        assert_eq!(s.as_bytes()[0], OP_PUSHDATA1);
        assert_eq!(s.as_bytes()[1], 76);

        let mut s = Script::new();
        s.append_data(&[7; 256]).unwrap();
        assert_eq!(s.as_bytes()[0], OP_PUSHDATA2);
        assert_eq!(&s.as_bytes()[1..3], &[0x00, 0x01]);
    }

    #[test]
    fn clone_shares_deep_clone_copies() {
        let mut a = Script::from_hex("76a914000000000000000000000000000000000000000088ac").unwrap();
        let shared = a.clone();
        let deep = a.deep_clone();
        // copy-on-write: mutating one side leaves the other untouched
        a.append(OP_NOP);
        assert_eq!(shared.len(), 25);
        assert_eq!(deep.len(), 25);
        assert_eq!(a.len(), 26);
    }

    #[test]
    fn classify_p2pkh() {
        let s = Script::from_hex("76a91418392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb88ac").unwrap();
        match s.script_type() {
            ScriptType::P2pkh { pubkey_hash } => {
                assert_eq!(hex::encode(pubkey_hash.0), "18392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb");
            }
            other => panic!("expected P2pkh, got {:?}", other),
        }
        assert!(s.is_p2pkh());
        // The display address round-trips back to the same hash
        let addrs = s.addresses().unwrap();
        assert_eq!(addrs.len(), 1);
        let (version, payload) = crate::address::decode_address(&addrs[0]).unwrap();
        assert_eq!(version, 0x00);
        assert_eq!(hex::encode(payload), "18392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb");
    }

    #[test]
    fn classify_p2pkh_rejects_lookalikes() {
        // One byte longer than the template with no inscription envelope
        let s = Script::from_hex("76a91418392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb88ac51").unwrap();
        assert_eq!(s.script_type(), ScriptType::Unknown);
        assert!(!s.is_p2pkh());
        // Truncated template
        let s = Script::from_hex("76a91418392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb88").unwrap();
        assert_eq!(s.script_type(), ScriptType::Unknown);
    }

    #[test]
    fn classify_inscription() {
        let mut s = Script::from_hex("76a91418392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb88ac").unwrap();
        s.append(OP_FALSE);
        s.append(OP_IF);
        s.append_data(b"ord").unwrap();
        s.append(OP_1);
        s.append_data(b"text/plain").unwrap();
        s.append(OP_0);
        s.append_data(b"hello").unwrap();
        s.append(OP_ENDIF);
        match s.script_type() {
            ScriptType::P2pkhInscription { pubkey_hash } => {
                assert_eq!(hex::encode(pubkey_hash.0), "18392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb");
            }
            other => panic!("expected inscription, got {:?}", other),
        }
    }

    #[test]
    fn classify_op_return() {
        let s = Script::from_bytes(vec![OP_RETURN, 3, 1, 2, 3]);
        assert_eq!(s.script_type(), ScriptType::OpReturn);
        let s = Script::from_bytes(vec![OP_FALSE, OP_RETURN, 1, 9]);
        assert_eq!(s.script_type(), ScriptType::OpReturn);
        assert!(s.is_data());
        let s = Script::from_bytes(vec![OP_1]);
        assert_eq!(s.script_type(), ScriptType::Unknown);
    }

    #[test]
    fn asm_round_trip() {
        let s = Script::from_hex("76a91418392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb88ac").unwrap();
        let asm = s.to_asm();
        assert_eq!(
            asm,
            "OP_DUP OP_HASH160 18392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb OP_EQUALVERIFY OP_CHECKSIG"
        );
        let back = Script::from_asm(&asm).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn asm_unknown_name() {
        assert!(Script::from_asm("OP_BOGUS").is_err());
        assert!(Script::from_asm("zz").is_err());
    }

    #[test]
    fn public_key_hash_rejects_other_types() {
        let s = Script::from_bytes(vec![OP_RETURN]);
        assert!(s.public_key_hash().is_err());
        assert!(s.addresses().is_err());
    }
}
