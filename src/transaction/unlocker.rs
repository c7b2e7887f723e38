//! Pluggable input unlocking.
//!
//! An [`Unlocker`] turns a transaction and input index into an unlocking
//! script; an [`UnlockerGetter`] picks the right unlocker for a previous
//! locking script. [`SimpleUnlocker`] covers P2PKH with a local key, or
//! delegates the raw ECDSA operation to a process-wide external signer
//! installed once at startup (for hardware or remote signing).

use crate::address::decode_wif;
use crate::script::{Script, ScriptType};
use crate::transaction::Tx;
use crate::transaction::p2pkh;
use crate::transaction::sighash::Flag;
use crate::util::{Error, Hash256, Result};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::sync::OnceLock;

/// Selects the input to unlock and the flags to sign under.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlockerParams {
    /// Index of the input to unlock.
    pub input_idx: usize,
    /// Signature hash flags; zero means `ALL|FORKID`.
    pub sighash_flags: Flag,
}

/// Builds unlocking scripts for transaction inputs.
pub trait Unlocker {
    /// Produces the unlocking script for the selected input.
    ///
    /// # Errors
    /// `Error::EmptyPreviousTxScript`, `Error::UnsupportedScript`, signing
    /// errors.
    fn unlocking_script(&self, tx: &Tx, params: UnlockerParams) -> Result<Script>;
}

/// Supplies an [`Unlocker`] able to satisfy a given locking script.
pub trait UnlockerGetter {
    /// Picks an unlocker for the locking script, for example by deriving
    /// the key that owns the address it pays.
    ///
    /// # Errors
    /// `Error::NoUnlocker` when no unlocker matches.
    fn unlocker(&self, locking_script: &Script) -> Result<Box<dyn Unlocker>>;
}

type ExternalSignerFn = Box<dyn Fn(&[u8], &[u8]) -> Result<Vec<u8>> + Send + Sync>;

static EXTERNAL_SIGNER: OnceLock<ExternalSignerFn> = OnceLock::new();

/// Installs the process-wide external signer.
///
/// The hook receives the 32-byte digest and the raw private key and
/// returns a DER signature without a flag byte. The slot is immutable
/// after the first successful install.
///
/// # Errors
/// `Error::BadArgument` when a signer is already installed.
pub fn install_external_signer<F>(signer: F) -> Result<()>
where
    F: Fn(&[u8], &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
{
    EXTERNAL_SIGNER
        .set(Box::new(signer))
        .map_err(|_| Error::BadArgument("external signer already installed".to_string()))
}

fn external_signer() -> Option<&'static ExternalSignerFn> {
    EXTERNAL_SIGNER.get()
}

/// Generates a DER-encoded ECDSA signature over the digest with the flag
/// byte appended, low-S normalized per RFC6979/BIP62.
///
/// # Errors
/// `Error::BadData` for an invalid private key.
pub fn generate_signature(private_key: &[u8; 32], sighash: &Hash256, flag: Flag) -> Result<Vec<u8>> {
    let secp = Secp256k1::signing_only();
    let secret_key = SecretKey::from_byte_array(*private_key)
        .map_err(|_| Error::BadData("Invalid private key".to_string()))?;
    let message = Message::from_digest(sighash.0);
    let mut signature = secp.sign_ecdsa(message, &secret_key);
    signature.normalize_s();
    let mut der = signature.serialize_der().to_vec();
    der.push(flag.0);
    Ok(der)
}

/// P2PKH unlocker holding a local private key.
#[derive(Clone)]
pub struct SimpleUnlocker {
    private_key: [u8; 32],
}

impl SimpleUnlocker {
    /// Creates an unlocker from raw key bytes.
    #[must_use]
    pub fn new(private_key: [u8; 32]) -> SimpleUnlocker {
        SimpleUnlocker { private_key }
    }

    /// Creates an unlocker from a WIF string.
    ///
    /// # Errors
    /// WIF decoding errors.
    pub fn from_wif(wif: &str) -> Result<SimpleUnlocker> {
        Ok(SimpleUnlocker { private_key: decode_wif(wif)?.key })
    }

    fn compressed_pubkey(&self) -> Result<[u8; 33]> {
        let secp = Secp256k1::signing_only();
        let secret_key = SecretKey::from_byte_array(self.private_key)
            .map_err(|_| Error::BadData("Invalid private key".to_string()))?;
        Ok(PublicKey::from_secret_key(&secp, &secret_key).serialize())
    }
}

impl Unlocker for SimpleUnlocker {
    fn unlocking_script(&self, tx: &Tx, params: UnlockerParams) -> Result<Script> {
        let mut flags = params.sighash_flags;
        if flags == Flag::OLD {
            flags = Flag::ALL_FORK_ID;
        }
        let input = tx
            .inputs()
            .get(params.input_idx)
            .ok_or_else(|| Error::BadArgument(format!("no input at index {}", params.input_idx)))?;
        let prev_script = input
            .prev_locking_script
            .as_ref()
            .ok_or(Error::EmptyPreviousTxScript)?;

        match prev_script.script_type() {
            ScriptType::P2pkh { .. } | ScriptType::P2pkhInscription { .. } => {
                let digest = tx.calc_input_signature_hash(params.input_idx, flags)?;
                let sig_with_flag = match external_signer() {
                    Some(sign) => {
                        let mut der = sign(&digest.0, &self.private_key)?;
                        der.push(flags.0);
                        der
                    }
                    None => generate_signature(&self.private_key, &digest, flags)?,
                };
                let pubkey = self.compressed_pubkey()?;
                Ok(p2pkh::create_unlock_script(&sig_with_flag, &pubkey))
            }
            ScriptType::OpReturn | ScriptType::Unknown => Err(Error::UnsupportedScript),
        }
    }
}

/// Hands out a [`SimpleUnlocker`] for its key regardless of the script
/// presented.
#[derive(Clone)]
pub struct SimpleGetter {
    private_key: [u8; 32],
}

impl SimpleGetter {
    /// Creates a getter from raw key bytes.
    #[must_use]
    pub fn new(private_key: [u8; 32]) -> SimpleGetter {
        SimpleGetter { private_key }
    }

    /// Creates a getter from a WIF string.
    ///
    /// # Errors
    /// WIF decoding errors.
    pub fn from_wif(wif: &str) -> Result<SimpleGetter> {
        Ok(SimpleGetter { private_key: decode_wif(wif)?.key })
    }
}

impl UnlockerGetter for SimpleGetter {
    fn unlocker(&self, _locking_script: &Script) -> Result<Box<dyn Unlocker>> {
        Ok(Box::new(SimpleUnlocker::new(self.private_key)))
    }
}

impl Tx {
    /// Unlocks the selected input with `unlocker`, writing the produced
    /// script in place. A zero flag is replaced with `ALL|FORKID`.
    ///
    /// # Errors
    /// Unlocker errors; `Error::BadArgument` for an index out of range.
    pub fn fill_input(&mut self, unlocker: &dyn Unlocker, mut params: UnlockerParams) -> Result<()> {
        if params.sighash_flags == Flag::OLD {
            params.sighash_flags = Flag::ALL_FORK_ID;
        }
        let script = unlocker.unlocking_script(self, params)?;
        self.insert_input_unlocking_script(params.input_idx, script)
    }

    /// Signs every input with `ALL|FORKID`, obtaining each input's
    /// unlocker from the getter via its previous locking script.
    ///
    /// # Errors
    /// `Error::EmptyPreviousTxScript` for inputs without extended data;
    /// getter and unlocker errors.
    pub fn fill_all_inputs(&mut self, getter: &dyn UnlockerGetter) -> Result<()> {
        for input_idx in 0..self.inputs().len() {
            let prev_script = self.inputs()[input_idx]
                .prev_locking_script
                .clone()
                .ok_or(Error::EmptyPreviousTxScript)?;
            let unlocker = getter.unlocker(&prev_script)?;
            self.fill_input(
                unlocker.as_ref(),
                UnlockerParams { input_idx, sighash_flags: Flag::ALL_FORK_ID },
            )?;
        }
        Ok(())
    }
}
