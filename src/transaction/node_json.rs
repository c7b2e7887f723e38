//! Node-format transaction JSON, as returned by `getrawtransaction`.

use crate::script::{Script, ScriptType};
use crate::transaction::{Input, Output, Tx};
use crate::util::{Hash256, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeTxJson {
    version: u32,
    locktime: u32,
    #[serde(default)]
    txid: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    size: usize,
    #[serde(default)]
    hex: String,
    #[serde(default)]
    vin: Vec<NodeInputJson>,
    #[serde(default)]
    vout: Vec<NodeOutputJson>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeScriptSigJson {
    asm: String,
    hex: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeInputJson {
    #[serde(rename = "scriptSig", default, skip_serializing_if = "Option::is_none")]
    script_sig: Option<NodeScriptSigJson>,
    txid: String,
    vout: u32,
    sequence: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeScriptPubKeyJson {
    asm: String,
    hex: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeOutputJson {
    value: f64,
    n: usize,
    #[serde(rename = "scriptPubKey", default, skip_serializing_if = "Option::is_none")]
    script_pub_key: Option<NodeScriptPubKeyJson>,
}

fn script_kind(script: &Script) -> &'static str {
    match script.script_type() {
        ScriptType::P2pkh { .. } | ScriptType::P2pkhInscription { .. } => "pubkeyhash",
        ScriptType::OpReturn => "nulldata",
        ScriptType::Unknown => "nonstandard",
    }
}

impl Tx {
    /// Serializes to the node JSON form.
    ///
    /// # Errors
    /// JSON errors.
    pub fn to_node_json(&self) -> Result<String> {
        let vin = self
            .inputs()
            .iter()
            .map(|input| NodeInputJson {
                script_sig: Some(NodeScriptSigJson {
                    asm: input.unlocking_script.to_asm(),
                    hex: input.unlocking_script.to_hex(),
                }),
                txid: input.prev_txid(),
                vout: input.prev_out_index,
                sequence: input.sequence,
            })
            .collect();
        let vout = self
            .outputs()
            .iter()
            .enumerate()
            .map(|(n, output)| NodeOutputJson {
                value: output.satoshis as f64 / 100_000_000.0,
                n,
                script_pub_key: Some(NodeScriptPubKeyJson {
                    asm: output.locking_script.to_asm(),
                    hex: output.locking_script.to_hex(),
                    kind: script_kind(&output.locking_script).to_string(),
                }),
            })
            .collect();
        let json = NodeTxJson {
            version: self.version,
            locktime: self.locktime,
            txid: self.txid(),
            hash: self.txid(),
            size: self.size(),
            hex: self.to_hex(),
            vin,
            vout,
        };
        Ok(serde_json::to_string(&json)?)
    }

    /// Parses the node JSON form. A non-empty `hex` field short-circuits to
    /// parsing the raw transaction; otherwise the record is rebuilt from
    /// `vin`/`vout`.
    ///
    /// # Errors
    /// JSON, hex and hash decoding errors.
    pub fn from_node_json(json: &str) -> Result<Tx> {
        let node: NodeTxJson = serde_json::from_str(json)?;
        if !node.hex.is_empty() {
            return Tx::from_hex(&node.hex);
        }

        let mut tx = Tx::new();
        tx.version = node.version;
        tx.locktime = node.locktime;
        for vin in &node.vin {
            let unlocking_script = match &vin.script_sig {
                Some(script_sig) => Script::from_hex(&script_sig.hex)?,
                None => Script::new(),
            };
            tx.add_input(Input {
                prev_tx_hash: Hash256::decode(&vin.txid)?,
                prev_out_index: vin.vout,
                unlocking_script,
                sequence: vin.sequence,
                ..Default::default()
            });
        }
        for vout in &node.vout {
            let locking_script = match &vout.script_pub_key {
                Some(spk) => Script::from_hex(&spk.hex)?,
                None => Script::new(),
            };
            tx.add_output(Output {
                satoshis: (vout.value * 100_000_000.0).round() as u64,
                locking_script,
            });
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::DEFAULT_SEQUENCE;
    use pretty_assertions::assert_eq;

    const RAW_TX: &str = "02000000011ccba787d421b98904da3329b2c7336f368b62e89bc896019b5eadaa28145b9c000000004847304402205cc711985ce2a6d61eece4f9b6edd6337bad3b7eca3aa3ce59bc15620d8de2a80220410c92c48a226ba7d5a9a01105524097f673f31320d46c3b61d2378e6f05320041ffffffff01c0aff629010000001976a91418392a59fc1f76ad6a3c7ffcea20cfcb17bda9eb88ac00000000";

    #[test]
    fn round_trip_via_hex_shortcut() {
        let tx = Tx::from_hex(RAW_TX).unwrap();
        let json = tx.to_node_json().unwrap();
        assert!(json.contains(&format!("\"txid\":\"{}\"", tx.txid())));
        assert!(json.contains("\"type\":\"pubkeyhash\""));
        assert!(json.contains(&format!("\"size\":{}", tx.size())));

        let back = Tx::from_node_json(&json).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.to_hex(), RAW_TX);
    }

    #[test]
    fn rebuild_without_hex() {
        let tx = Tx::from_hex(RAW_TX).unwrap();
        let json = tx.to_node_json().unwrap();

        // blank the hex field to force the structural path
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["hex"] = serde_json::Value::String(String::new());
        let back = Tx::from_node_json(&value.to_string()).unwrap();

        assert_eq!(back, tx);
        assert_eq!(back.txid(), tx.txid());
    }

    #[test]
    fn data_output_kind() {
        let mut tx = Tx::new();
        tx.add_op_return_output(b"hello").unwrap();
        let json = tx.to_node_json().unwrap();
        assert!(json.contains("\"type\":\"nulldata\""));
    }

    #[test]
    fn sequence_defaults_round_trip() {
        let tx = Tx::from_hex(RAW_TX).unwrap();
        assert_eq!(tx.inputs()[0].sequence, DEFAULT_SEQUENCE);
        let json = tx.to_node_json().unwrap();
        let back = Tx::from_node_json(&json).unwrap();
        assert_eq!(back.inputs()[0].sequence, DEFAULT_SEQUENCE);
    }
}
