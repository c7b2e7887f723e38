//! Address handling: P2PKH base58check encoding/decoding and WIF keys.
//!
//! Supports Mainnet, Testnet, and STN with double-SHA256 checksum
//! verification. Key derivation is out of scope; WIF material is decoded
//! for callers that supply their own keys.

use crate::util::{Error, Result, sha256d};
use base58::{FromBase58, ToBase58};

const MAINNET_P2PKH_VERSION: u8 = 0x00;
const TESTNET_P2PKH_VERSION: u8 = 0x6f;
const MAINNET_WIF_VERSION: u8 = 0x80;
const TESTNET_WIF_VERSION: u8 = 0xef;

/// Network a key or address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Test network.
    Testnet,
    /// Scaling test network.
    STN,
}

/// Encodes a base58check string from a version byte and 20-byte payload.
///
/// # Errors
/// `Error::BadArgument` if the payload is not exactly 20 bytes.
#[inline]
pub fn encode_address(version: u8, payload: &[u8]) -> Result<String> {
    if payload.len() != 20 {
        return Err(Error::BadArgument("Payload must be 20 bytes".to_string()));
    }
    let mut v = [0u8; 25];
    v[0] = version;
    v[1..21].copy_from_slice(payload);
    let checksum = sha256d(&v[..21]);
    v[21..25].copy_from_slice(&checksum.0[..4]);
    Ok(v.to_base58())
}

/// Decodes a base58check address into its version byte and 20-byte payload.
///
/// # Errors
/// `Error::FromBase58Error` on decode failure, `Error::BadData` on invalid
/// length or checksum.
#[inline]
pub fn decode_address(input: &str) -> Result<(u8, [u8; 20])> {
    let bytes = input.from_base58().map_err(Error::FromBase58Error)?;
    if bytes.len() != 25 {
        return Err(Error::BadData("Invalid address length".to_string()));
    }
    let checksum = sha256d(&bytes[..21]);
    if checksum.0[..4] != bytes[21..] {
        return Err(Error::BadData("Invalid checksum".to_string()));
    }
    let mut payload = [0u8; 20];
    payload.copy_from_slice(&bytes[1..21]);
    Ok((bytes[0], payload))
}

/// Encodes a P2PKH address from a 20-byte pubkey hash.
///
/// # Errors
/// `Error::BadArgument` if the payload is not 20 bytes.
#[inline]
pub fn encode_p2pkh_address(network: Network, pubkey_hash: &[u8]) -> Result<String> {
    let version = match network {
        Network::Mainnet => MAINNET_P2PKH_VERSION,
        Network::Testnet | Network::STN => TESTNET_P2PKH_VERSION,
    };
    encode_address(version, pubkey_hash)
}

/// Decodes a P2PKH address to its 20-byte pubkey hash, any network.
///
/// # Errors
/// `Error::BadData` if the version byte is not a known P2PKH version.
pub fn address_to_pubkey_hash(address: &str) -> Result<[u8; 20]> {
    let (version, payload) = decode_address(address)?;
    if version != MAINNET_P2PKH_VERSION && version != TESTNET_P2PKH_VERSION {
        return Err(Error::BadData(format!("Not a P2PKH address version: {}", version)));
    }
    Ok(payload)
}

/// A private key decoded from wallet import format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wif {
    /// The raw 32-byte secret key.
    pub key: [u8; 32],
    /// Whether the corresponding public key should be serialized compressed.
    pub compressed: bool,
    /// Network the key was encoded for.
    pub network: Network,
}

/// Decodes a WIF string into its key material.
///
/// # Errors
/// `Error::FromBase58Error` on decode failure, `Error::BadData` on invalid
/// length, version or checksum.
pub fn decode_wif(input: &str) -> Result<Wif> {
    let bytes = input.from_base58().map_err(Error::FromBase58Error)?;
    // version(1) + key(32) + optional compressed marker(1) + checksum(4)
    if bytes.len() != 37 && bytes.len() != 38 {
        return Err(Error::BadData(format!("Invalid WIF length: {}", bytes.len())));
    }
    let split = bytes.len() - 4;
    let checksum = sha256d(&bytes[..split]);
    if checksum.0[..4] != bytes[split..] {
        return Err(Error::BadData("Invalid WIF checksum".to_string()));
    }
    let network = match bytes[0] {
        MAINNET_WIF_VERSION => Network::Mainnet,
        TESTNET_WIF_VERSION => Network::Testnet,
        v => return Err(Error::BadData(format!("Invalid WIF version: {}", v))),
    };
    let compressed = bytes.len() == 38;
    if compressed && bytes[33] != 0x01 {
        return Err(Error::BadData("Invalid WIF compression marker".to_string()));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes[1..33]);
    Ok(Wif { key, compressed, network })
}
