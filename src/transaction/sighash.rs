//! Signature hash computation for transaction signing.
//!
//! Two pre-image algorithms are supported: the BIP-143 style used when the
//! FORKID flag is set, and the legacy modified-transaction style otherwise.
//! The three FORKID midstates (prevouts, sequences, outputs) are cached on
//! the transaction; structural mutation clears them, writing unlocking
//! scripts does not, which keeps signing all inputs linear.

use crate::script::next_op;
use crate::script::op_codes::OP_CODESEPARATOR;
use crate::transaction::Tx;
use crate::util::{Error, Hash256, Result, Serializable, sha256d, var_int};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt;
use std::ops::BitOr;

/// The 24-bit fork id carried in the upper bytes of the serialized flag.
const FORK_ID: u32 = 0;
/// Mask selecting the base mode bits of a flag.
const SIGHASH_MASK: u8 = 0x1f;

/// Signature hash flag byte.
///
/// The low five bits select the base mode, bit 6 selects the BIP-143
/// pre-image, bit 7 restricts the commitment to this input alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flag(pub u8);

impl Flag {
    /// Historical zero flag, treated as ALL.
    pub const OLD: Flag = Flag(0x00);
    /// Commit to all outputs.
    pub const ALL: Flag = Flag(0x01);
    /// Commit to no outputs.
    pub const NONE: Flag = Flag(0x02);
    /// Commit to the output at this input's index only.
    pub const SINGLE: Flag = Flag(0x03);
    /// Use the BIP-143 pre-image (replay protection).
    pub const FORK_ID: Flag = Flag(0x40);
    /// Commit to this input only.
    pub const ANYONE_CAN_PAY: Flag = Flag(0x80);
    /// ALL with FORKID.
    pub const ALL_FORK_ID: Flag = Flag(0x41);
    /// NONE with FORKID.
    pub const NONE_FORK_ID: Flag = Flag(0x42);
    /// SINGLE with FORKID.
    pub const SINGLE_FORK_ID: Flag = Flag(0x43);

    /// Whether every bit of `other` is set in this flag.
    #[must_use]
    #[inline]
    pub fn has(self, other: Flag) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the base mode bits equal `other`.
    #[must_use]
    #[inline]
    pub fn has_with_mask(self, other: Flag) -> bool {
        self.0 & SIGHASH_MASK == other.0
    }

    /// The base mode bits alone.
    #[must_use]
    #[inline]
    pub fn base(self) -> Flag {
        Flag(self.0 & SIGHASH_MASK)
    }
}

impl BitOr for Flag {
    type Output = Flag;

    fn bitor(self, rhs: Flag) -> Flag {
        Flag(self.0 | rhs.0)
    }
}

impl fmt::Display for Flag {
    /// The conventional display name. Unknown combinations fall back to
    /// `ALL`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self.0 {
            0x01 => "ALL",
            0x02 => "NONE",
            0x03 => "SINGLE",
            0x81 => "ALL|ANYONECANPAY",
            0x82 => "NONE|ANYONECANPAY",
            0x83 => "SINGLE|ANYONECANPAY",
            0x41 => "ALL|FORKID",
            0x42 => "NONE|FORKID",
            0x43 => "SINGLE|FORKID",
            0xc1 => "ALL|FORKID|ANYONECANPAY",
            0xc2 => "NONE|FORKID|ANYONECANPAY",
            0xc3 => "SINGLE|FORKID|ANYONECANPAY",
            _ => "ALL",
        };
        write!(f, "{}", name)
    }
}

/// Cached midstates of the BIP-143 pre-image.
#[derive(Debug, Default, Clone)]
pub(crate) struct SigHashCache {
    pub(crate) hash_prevouts: Option<Hash256>,
    pub(crate) hash_sequence: Option<Hash256>,
    pub(crate) hash_outputs: Option<Hash256>,
}

/// Computes the digest a signer signs for one input.
///
/// Routes to the BIP-143 pre-image when `flag` carries FORKID, the legacy
/// modified-transaction pre-image otherwise.
///
/// # Errors
/// `Error::BadArgument` for an input index out of range.
pub fn signature_hash(
    tx: &Tx,
    n_input: usize,
    script_code: &[u8],
    satoshis: u64,
    flag: Flag,
) -> Result<Hash256> {
    if n_input >= tx.inputs.len() {
        return Err(Error::BadArgument("input index out of range".to_string()));
    }
    if flag.has(Flag::FORK_ID) {
        Ok(sha256d(&bip143_preimage(tx, n_input, script_code, satoshis, flag)))
    } else {
        legacy_sighash(tx, n_input, script_code, flag)
    }
}

fn hash_prevouts(tx: &Tx) -> Hash256 {
    if let Some(h) = tx.cache.borrow().hash_prevouts {
        return h;
    }
    let mut buf = Vec::with_capacity(36 * tx.inputs.len());
    for input in &tx.inputs {
        input.write_outpoint(&mut buf).unwrap_or_default();
    }
    let h = sha256d(&buf);
    tx.cache.borrow_mut().hash_prevouts = Some(h);
    h
}

fn hash_sequence(tx: &Tx) -> Hash256 {
    if let Some(h) = tx.cache.borrow().hash_sequence {
        return h;
    }
    let mut buf = Vec::with_capacity(4 * tx.inputs.len());
    for input in &tx.inputs {
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    let h = sha256d(&buf);
    tx.cache.borrow_mut().hash_sequence = Some(h);
    h
}

fn hash_outputs(tx: &Tx) -> Hash256 {
    if let Some(h) = tx.cache.borrow().hash_outputs {
        return h;
    }
    let mut buf = Vec::with_capacity(tx.outputs.iter().map(super::Output::size).sum());
    for output in &tx.outputs {
        output.write(&mut buf).unwrap_or_default();
    }
    let h = sha256d(&buf);
    tx.cache.borrow_mut().hash_outputs = Some(h);
    h
}

/// BIP-143 pre-image: ten fixed fields ending in the 32-bit flag.
pub(crate) fn bip143_preimage(
    tx: &Tx,
    n_input: usize,
    script_code: &[u8],
    satoshis: u64,
    flag: Flag,
) -> Vec<u8> {
    let base = flag.base();
    let anyone_can_pay = flag.has(Flag::ANYONE_CAN_PAY);
    let mut s = Vec::with_capacity(156 + script_code.len() + var_int::size(script_code.len() as u64));

    // 1. nVersion
    s.extend_from_slice(&tx.version.to_le_bytes());
    // 2. hashPrevouts
    if anyone_can_pay {
        s.extend_from_slice(&[0u8; 32]);
    } else {
        s.extend_from_slice(&hash_prevouts(tx).0);
    }
    // 3. hashSequence
    if anyone_can_pay || base == Flag::SINGLE || base == Flag::NONE {
        s.extend_from_slice(&[0u8; 32]);
    } else {
        s.extend_from_slice(&hash_sequence(tx).0);
    }
    // 4. outpoint
    tx.inputs[n_input].write_outpoint(&mut s).unwrap_or_default();
    // 5. scriptCode
    var_int::write(script_code.len() as u64, &mut s).unwrap_or_default();
    s.extend_from_slice(script_code);
    // 6. value
    s.extend_from_slice(&satoshis.to_le_bytes());
    // 7. nSequence
    s.extend_from_slice(&tx.inputs[n_input].sequence.to_le_bytes());
    // 8. hashOutputs
    if base == Flag::SINGLE && n_input < tx.outputs.len() {
        s.extend_from_slice(&sha256d(&tx.outputs[n_input].bytes_for_sig_hash()).0);
    } else if base == Flag::SINGLE || base == Flag::NONE {
        s.extend_from_slice(&[0u8; 32]);
    } else {
        s.extend_from_slice(&hash_outputs(tx).0);
    }
    // 9. nLockTime
    s.extend_from_slice(&tx.locktime.to_le_bytes());
    // 10. sighash flag, low byte carries the flag
    let _ = s.write_u32::<LittleEndian>((FORK_ID << 8) | flag.0 as u32);
    s
}

fn legacy_sighash(tx: &Tx, n_input: usize, script_code: &[u8], flag: Flag) -> Result<Hash256> {
    if flag.base() == Flag::SINGLE && n_input >= tx.outputs.len() {
        // Historical behaviour: out-of-range SINGLE signs the number one.
        let mut one = [0u8; 32];
        one[0] = 1;
        return Ok(Hash256(one));
    }
    Ok(sha256d(&legacy_preimage(tx, n_input, script_code, flag)))
}

/// Legacy pre-image: the serialized modified transaction plus the flag.
pub(crate) fn legacy_preimage(tx: &Tx, n_input: usize, script_code: &[u8], flag: Flag) -> Vec<u8> {
    let base = flag.base();
    let anyone_can_pay = flag.has(Flag::ANYONE_CAN_PAY);

    // Subscript with OP_CODESEPARATOR occurrences removed
    let mut sub_script = Vec::with_capacity(script_code.len());
    let mut i = 0;
    while i < script_code.len() {
        let next = next_op(i, script_code);
        if script_code[i] != OP_CODESEPARATOR {
            sub_script.extend_from_slice(&script_code[i..next]);
        }
        i = next;
    }

    let mut s = Vec::with_capacity(tx.size());
    s.extend_from_slice(&tx.version.to_le_bytes());

    // Inputs
    let n_inputs = if anyone_can_pay { 1 } else { tx.inputs.len() };
    var_int::write(n_inputs as u64, &mut s).unwrap_or_default();
    for idx in 0..tx.inputs.len() {
        let input_idx = if anyone_can_pay { n_input } else { idx };
        let input = &tx.inputs[input_idx];
        input.write_outpoint(&mut s).unwrap_or_default();
        if input_idx == n_input {
            var_int::write(sub_script.len() as u64, &mut s).unwrap_or_default();
            s.extend_from_slice(&sub_script);
        } else {
            var_int::write(0, &mut s).unwrap_or_default();
        }
        let sequence = if input_idx != n_input && (base == Flag::NONE || base == Flag::SINGLE) {
            0
        } else {
            input.sequence
        };
        s.extend_from_slice(&sequence.to_le_bytes());
        if anyone_can_pay {
            break;
        }
    }

    // Outputs: none, blanked up to this index, or all
    let n_outputs = match base {
        Flag::NONE => 0,
        Flag::SINGLE => n_input + 1,
        _ => tx.outputs.len(),
    };
    var_int::write(n_outputs as u64, &mut s).unwrap_or_default();
    for idx in 0..n_outputs {
        if (base == Flag::SINGLE && idx != n_input) || idx >= tx.outputs.len() {
            // blanked output: maximal value, empty script
            s.extend_from_slice(&u64::MAX.to_le_bytes());
            var_int::write(0, &mut s).unwrap_or_default();
        } else {
            tx.outputs[idx].write(&mut s).unwrap_or_default();
        }
    }

    s.extend_from_slice(&tx.locktime.to_le_bytes());
    let _ = s.write_u32::<LittleEndian>(flag.0 as u32);
    s
}

impl Tx {
    /// Computes the digest for signing the input at `input_idx`, resolving
    /// the previous locking script and value from the input's extended
    /// fields.
    ///
    /// # Errors
    /// `Error::EmptyPreviousTxId`, `Error::EmptyPreviousTxScript`,
    /// `Error::InputSatoshisZero` when the extended data is missing.
    pub fn calc_input_signature_hash(&self, input_idx: usize, flag: Flag) -> Result<Hash256> {
        let (script, satoshis) = self.input_sign_data(input_idx, flag)?;
        signature_hash(self, input_idx, &script, satoshis, flag)
    }

    /// The pre-image bytes behind [`Tx::calc_input_signature_hash`].
    ///
    /// # Errors
    /// As [`Tx::calc_input_signature_hash`].
    pub fn calc_input_preimage(&self, input_idx: usize, flag: Flag) -> Result<Vec<u8>> {
        let (script, satoshis) = self.input_sign_data(input_idx, flag)?;
        if flag.has(Flag::FORK_ID) {
            Ok(bip143_preimage(self, input_idx, &script, satoshis, flag))
        } else {
            Ok(legacy_preimage(self, input_idx, &script, flag))
        }
    }

    fn input_sign_data(&self, input_idx: usize, flag: Flag) -> Result<(Vec<u8>, u64)> {
        let input = self
            .inputs
            .get(input_idx)
            .ok_or_else(|| Error::BadArgument("input index out of range".to_string()))?;
        if input.prev_tx_hash.is_zero() {
            return Err(Error::EmptyPreviousTxId);
        }
        let script = input
            .prev_locking_script
            .as_ref()
            .ok_or(Error::EmptyPreviousTxScript)?;
        if flag.has(Flag::FORK_ID) && input.prev_satoshis == 0 {
            return Err(Error::InputSatoshisZero);
        }
        Ok((script.as_bytes().to_vec(), input.prev_satoshis))
    }
}
