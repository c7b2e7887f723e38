//! Unspent transaction outputs used as funding and signing sources.

use crate::script::Script;
use crate::transaction::unlocker::Unlocker;
use crate::util::{Error, Hash256, Result};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// One satoshi-bearing coin: an output of a prior transaction together
/// with everything needed to spend it.
#[derive(Clone)]
pub struct Utxo {
    /// Id of the transaction that created the output, network byte order.
    pub txid_hash: Hash256,
    /// Index of the output in that transaction.
    pub vout: u32,
    /// The output's locking script.
    pub locking_script: Script,
    /// The output's value.
    pub satoshis: u64,
    /// Optional signer able to unlock this coin.
    pub unlocker: Option<Arc<dyn Unlocker>>,
}

impl Utxo {
    /// Creates a UTXO without a signer handle.
    #[must_use]
    pub fn new(txid_hash: Hash256, vout: u32, locking_script: Script, satoshis: u64) -> Utxo {
        Utxo { txid_hash, vout, locking_script, satoshis, unlocker: None }
    }

    /// Attaches a signer handle.
    #[must_use]
    pub fn with_unlocker(mut self, unlocker: Arc<dyn Unlocker>) -> Utxo {
        self.unlocker = Some(unlocker);
        self
    }

    /// The attached signer.
    ///
    /// # Errors
    /// `Error::NoUnlocker` when none is attached.
    pub fn unlocker(&self) -> Result<&Arc<dyn Unlocker>> {
        self.unlocker.as_ref().ok_or(Error::NoUnlocker)
    }

    /// The creating transaction's id in display hex.
    #[must_use]
    pub fn txid(&self) -> String {
        self.txid_hash.encode()
    }

    /// Serializes to the node JSON form, with the value in whole coins.
    ///
    /// # Errors
    /// JSON errors.
    pub fn to_node_json(&self) -> Result<String> {
        let node = NodeUtxoJson {
            txid: self.txid(),
            vout: self.vout,
            script_pub_key: self.locking_script.to_hex(),
            amount: self.satoshis as f64 / 100_000_000.0,
        };
        Ok(serde_json::to_string(&node)?)
    }

    /// Parses the node JSON form.
    ///
    /// # Errors
    /// JSON and hex errors.
    pub fn from_node_json(json: &str) -> Result<Utxo> {
        let node: NodeUtxoJson = serde_json::from_str(json)?;
        Ok(Utxo::new(
            Hash256::decode(&node.txid)?,
            node.vout,
            Script::from_hex(&node.script_pub_key)?,
            (node.amount * 100_000_000.0).round() as u64,
        ))
    }
}

impl PartialEq for Utxo {
    fn eq(&self, other: &Utxo) -> bool {
        self.txid_hash == other.txid_hash
            && self.vout == other.vout
            && self.locking_script == other.locking_script
            && self.satoshis == other.satoshis
    }
}

impl Eq for Utxo {}

impl fmt::Debug for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Utxo")
            .field("txid", &self.txid())
            .field("vout", &self.vout)
            .field("locking_script", &self.locking_script)
            .field("satoshis", &self.satoshis)
            .field("unlocker", &self.unlocker.is_some())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct UtxoJson {
    txid: String,
    vout: u32,
    #[serde(rename = "lockingScript")]
    locking_script: String,
    satoshis: u64,
}

#[derive(Serialize, Deserialize)]
struct NodeUtxoJson {
    txid: String,
    vout: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: String,
    amount: f64,
}

impl Serialize for Utxo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        UtxoJson {
            txid: self.txid(),
            vout: self.vout,
            locking_script: self.locking_script.to_hex(),
            satoshis: self.satoshis,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Utxo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = UtxoJson::deserialize(deserializer)?;
        Ok(Utxo::new(
            Hash256::decode(&json.txid).map_err(D::Error::custom)?,
            json.vout,
            Script::from_hex(&json.locking_script).map_err(D::Error::custom)?,
            json.satoshis,
        ))
    }
}
