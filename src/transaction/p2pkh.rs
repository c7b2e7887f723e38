//! Pay-to-Public-Key-Hash script templates and checks.

use crate::script::op_codes::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160, OP_PUSH};
use crate::script::{Script, next_op};
use crate::util::{Error, Hash160, Result};

/// Creates the P2PKH lock script
/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`.
#[must_use]
pub fn create_lock_script(pubkey_hash: &Hash160) -> Script {
    let mut script = Script::new();
    script.append(OP_DUP);
    script.append(OP_HASH160);
    script.append(OP_PUSH + 20);
    script.append_slice(&pubkey_hash.0);
    script.append(OP_EQUALVERIFY);
    script.append(OP_CHECKSIG);
    script
}

/// Creates the P2PKH unlock script `<sig‖flag> <pubkey>`.
///
/// The signature push already carries its trailing flag byte.
#[must_use]
pub fn create_unlock_script(sig_with_flag: &[u8], public_key: &[u8]) -> Script {
    let mut script = Script::new();
    script.append_data(sig_with_flag).unwrap_or_default();
    script.append_data(public_key).unwrap_or_default();
    script
}

/// Whether the script is the exact 25-byte P2PKH lock template.
#[must_use]
pub fn check_lock_script(lock_script: &[u8]) -> bool {
    lock_script.len() == 25
        && lock_script[0] == OP_DUP
        && lock_script[1] == OP_HASH160
        && lock_script[2] == OP_PUSH + 20
        && lock_script[23] == OP_EQUALVERIFY
        && lock_script[24] == OP_CHECKSIG
}

/// Whether the script is a P2PKH unlock: a 71-73 byte signature push then
/// a 33 or 65 byte public key push.
#[must_use]
pub fn check_unlock_script(unlock_script: &[u8]) -> bool {
    if unlock_script.is_empty() {
        return false;
    }
    let sig_len = unlock_script[0];
    if sig_len < OP_PUSH + 71 || sig_len > OP_PUSH + 73 {
        return false;
    }
    let i = next_op(0, unlock_script);
    if i >= unlock_script.len() {
        return false;
    }
    let pk_len = unlock_script[i];
    if pk_len != OP_PUSH + 33 && pk_len != OP_PUSH + 65 {
        return false;
    }
    next_op(i, unlock_script) == unlock_script.len()
}

/// Extracts the public key from a P2PKH unlock script.
///
/// # Errors
/// `Error::InvalidScriptType` for any other shape.
pub fn extract_pubkey(unlock_script: &[u8]) -> Result<Vec<u8>> {
    if !check_unlock_script(unlock_script) {
        return Err(Error::InvalidScriptType("not a P2PKH unlock script".to_string()));
    }
    let i = next_op(0, unlock_script);
    Ok(unlock_script[i + 1..].to_vec())
}

/// Extracts the pubkey hash from a P2PKH lock script.
///
/// # Errors
/// `Error::InvalidScriptType` for any other shape.
pub fn extract_pubkey_hash(lock_script: &[u8]) -> Result<Hash160> {
    if !check_lock_script(lock_script) {
        return Err(Error::InvalidScriptType("not a P2PKH lock script".to_string()));
    }
    let mut hash = Hash160([0; 20]);
    hash.0.copy_from_slice(&lock_script[3..23]);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::op_codes::OP_1;
    use pretty_assertions::assert_eq;

    #[test]
    fn lock_script_shape() {
        let s = create_lock_script(&Hash160([5; 20]));
        assert!(check_lock_script(s.as_bytes()));
        assert_eq!(extract_pubkey_hash(s.as_bytes()).unwrap(), Hash160([5; 20]));

        let mut longer = s.clone();
        longer.append(OP_1);
        assert!(!check_lock_script(longer.as_bytes()));
        assert!(extract_pubkey_hash(longer.as_bytes()).is_err());
        assert!(!check_lock_script(&[]));
    }

    #[test]
    fn unlock_script_shape() {
        assert!(!check_unlock_script(&[]));

        let sig71pk33 = create_unlock_script(&[0; 71], &[0; 33]);
        assert!(check_unlock_script(sig71pk33.as_bytes()));

        let sig73pk65 = create_unlock_script(&[0; 73], &[0; 65]);
        assert!(check_unlock_script(sig73pk65.as_bytes()));

        // wrong pubkey length
        let sig72pk30 = create_unlock_script(&[0; 72], &[0; 30]);
        assert!(!check_unlock_script(sig72pk30.as_bytes()));

        // signature alone
        let mut only_sig = Script::new();
        only_sig.append_data(&[0; 71]).unwrap();
        assert!(!check_unlock_script(only_sig.as_bytes()));

        // trailing garbage
        let mut trailing = create_unlock_script(&[0; 71], &[0; 33]);
        trailing.append(OP_1);
        assert!(!check_unlock_script(trailing.as_bytes()));
    }

    #[test]
    fn pubkey_extraction() {
        let s = create_unlock_script(&[7; 72], &[9; 65]);
        assert_eq!(extract_pubkey(s.as_bytes()).unwrap(), vec![9; 65]);
        assert!(extract_pubkey(&[1, 2, 3]).is_err());
    }
}
