//! Script checkers for signature, locktime and sequence validation.
use crate::transaction::Tx;
use crate::transaction::sighash::{Flag, signature_hash};
use crate::util::{Error, Result, ScriptError};
use secp256k1::{Message, PublicKey, Secp256k1, ecdsa::Signature};

const LOCKTIME_THRESHOLD: i64 = 500_000_000;
const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Validation callbacks the interpreter delegates to during evaluation.
pub trait Checker {
    /// Verifies a signature (with trailing flag byte) against a public key
    /// and the signed subscript. Returns whether the signature is valid.
    ///
    /// # Errors
    /// `Error::Script` for malformed material or policy violations.
    fn check_sig(&mut self, sig: &[u8], pubkey: &[u8], script: &[u8]) -> Result<bool>;

    /// Checks a required locktime against the transaction (BIP-65).
    ///
    /// # Errors
    /// `Error::Script` for malformed operands.
    fn check_locktime(&self, locktime: i64) -> Result<bool>;

    /// Checks a required sequence against the input (BIP-112).
    ///
    /// # Errors
    /// `Error::Script` for malformed operands.
    fn check_sequence(&self, sequence: i64) -> Result<bool>;
}

/// Checker for contexts with no spending transaction.
///
/// Always errors to keep transaction-dependent opcodes out of detached
/// script evaluation.
#[derive(Default, Clone, Debug)]
pub struct TransactionlessChecker;

impl Checker for TransactionlessChecker {
    fn check_sig(&mut self, _sig: &[u8], _pubkey: &[u8], _script: &[u8]) -> Result<bool> {
        Err(Error::BadData("No transaction context".to_string()))
    }

    fn check_locktime(&self, _locktime: i64) -> Result<bool> {
        Err(Error::BadData("No transaction context".to_string()))
    }

    fn check_sequence(&self, _sequence: i64) -> Result<bool> {
        Err(Error::BadData("No transaction context".to_string()))
    }
}

/// Checker bound to a transaction input being spent.
#[derive(Debug)]
pub struct TransactionChecker<'a> {
    /// The spending transaction.
    pub tx: &'a Tx,
    /// Index of the input being checked.
    pub input: usize,
    /// Value of the previous output in satoshis.
    pub satoshis: u64,
    /// Reject signatures without the FORKID flag.
    pub require_sighash_forkid: bool,
}

impl<'a> TransactionChecker<'a> {
    /// Creates a checker for one input of a transaction.
    #[must_use]
    pub fn new(tx: &'a Tx, input: usize, satoshis: u64, require_sighash_forkid: bool) -> Self {
        TransactionChecker { tx, input, satoshis, require_sighash_forkid }
    }
}

impl Checker for TransactionChecker<'_> {
    fn check_sig(&mut self, sig: &[u8], pubkey: &[u8], script: &[u8]) -> Result<bool> {
        if sig.is_empty() {
            return Ok(false);
        }
        let flag = Flag(sig[sig.len() - 1]);
        if self.require_sighash_forkid && !flag.has(Flag::FORK_ID) {
            return Err(ScriptError::SigHashType.into());
        }

        let sig_hash = signature_hash(self.tx, self.input, script, self.satoshis, flag)?;

        let der_sig = &sig[..sig.len() - 1];
        let secp = Secp256k1::verification_only();
        let signature = Signature::from_der(der_sig).map_err(|_| ScriptError::SigDer)?;
        let message = Message::from_digest(sig_hash.0);
        let public_key = PublicKey::from_slice(pubkey).map_err(|_| ScriptError::PubKeyFormat)?;

        Ok(secp.verify_ecdsa(message, &signature, &public_key).is_ok())
    }

    fn check_locktime(&self, locktime: i64) -> Result<bool> {
        if locktime < 0 {
            return Err(ScriptError::NumericOverflow.into());
        }

        let tx_locktime = self.tx.locktime as i64;
        if (locktime >= LOCKTIME_THRESHOLD) != (tx_locktime >= LOCKTIME_THRESHOLD) {
            return Ok(false);
        }
        if locktime > tx_locktime {
            return Ok(false);
        }
        // A finalized input can never be locktime-constrained
        if self.tx.inputs()[self.input].sequence == 0xffffffff {
            return Ok(false);
        }

        Ok(true)
    }

    fn check_sequence(&self, sequence: i64) -> Result<bool> {
        if sequence < 0 {
            return Err(ScriptError::NumericOverflow.into());
        }

        let sequence = sequence as u32;
        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Ok(true);
        }
        if self.tx.version < 2 {
            return Ok(false);
        }

        let tx_seq = self.tx.inputs()[self.input].sequence;
        if tx_seq & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return Ok(false);
        }

        let seq_masked = sequence & (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
        let tx_masked = tx_seq & (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
        if (seq_masked >= SEQUENCE_LOCKTIME_TYPE_FLAG) != (tx_masked >= SEQUENCE_LOCKTIME_TYPE_FLAG) {
            return Ok(false);
        }
        if seq_masked & SEQUENCE_LOCKTIME_MASK > tx_masked & SEQUENCE_LOCKTIME_MASK {
            return Ok(false);
        }

        Ok(true)
    }
}
