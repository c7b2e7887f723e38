//! Transaction building, serialization, funding and signing.
//!
//! Transactions round-trip through two wire formats: the standard Bitcoin
//! serialization, and the extended format which inserts the sentinel
//! `00 00 00 00 00 EF` after the version and carries each input's previous
//! output value and locking script, so a transaction can be signed with no
//! chain lookups. The id is always computed over the standard bytes.

pub mod fee_quote;
pub mod fees;
mod input;
mod node_json;
mod output;
pub mod p2pkh;
pub mod sighash;
pub mod unlocker;
mod utxo;

pub use self::fee_quote::{Fee, FeeQuote, FeeQuotes, FeeType, FeeUnit};
pub use self::fees::{TxFees, TxSize};
pub use self::input::{DEFAULT_SEQUENCE, Input};
pub use self::output::Output;
pub use self::utxo::Utxo;

use crate::address::address_to_pubkey_hash;
use crate::script::op_codes::{OP_FALSE, OP_RETURN};
use crate::script::{Engine, Script, TransactionChecker};
use crate::util::{Error, Hash160, Hash256, Result, Serializable, sha256d, var_int};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sighash::SigHashCache;
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::io::{Read, Write};

/// Trailing bytes of the extended-format sentinel, following the four zero
/// bytes a standard parse reads as empty input and output counts.
const EXTENDED_SENTINEL_TAIL: [u8; 4] = [0x00, 0x00, 0x00, 0xef];

/// Bitcoin transaction.
pub struct Tx {
    /// Transaction version.
    pub version: u32,
    /// Block height or timestamp at which the transaction unlocks.
    pub locktime: u32,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) cache: RefCell<SigHashCache>,
}

impl Tx {
    /// Creates an empty transaction with version 1 and locktime 0.
    #[must_use]
    pub fn new() -> Tx {
        Tx {
            version: 1,
            locktime: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            cache: RefCell::new(SigHashCache::default()),
        }
    }

    /// The transaction inputs in insertion order.
    #[must_use]
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// The transaction outputs in insertion order.
    #[must_use]
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Mutable access to an input. Clears the signature-hash midstate cache.
    pub fn input_mut(&mut self, index: usize) -> Option<&mut Input> {
        self.invalidate_sighash_cache();
        self.inputs.get_mut(index)
    }

    /// Mutable access to an output. Clears the signature-hash midstate
    /// cache.
    pub fn output_mut(&mut self, index: usize) -> Option<&mut Output> {
        self.invalidate_sighash_cache();
        self.outputs.get_mut(index)
    }

    pub(crate) fn invalidate_sighash_cache(&self) {
        *self.cache.borrow_mut() = SigHashCache::default();
    }

    /// Appends an input. Clears the signature-hash midstate cache.
    pub fn add_input(&mut self, input: Input) {
        self.invalidate_sighash_cache();
        self.inputs.push(input);
    }

    /// Appends an output. Clears the signature-hash midstate cache.
    pub fn add_output(&mut self, output: Output) {
        self.invalidate_sighash_cache();
        self.outputs.push(output);
    }

    /// Appends an input spending the given previous output, with the
    /// default finalized sequence number.
    ///
    /// # Errors
    /// `Error::InvalidTxId` for a malformed previous transaction id,
    /// `Error::HexInvalid` for a malformed script.
    pub fn from_prev_output(
        &mut self,
        prev_txid: &str,
        vout: u32,
        prev_locking_script: &str,
        satoshis: u64,
    ) -> Result<()> {
        let prev_tx_hash = Hash256::decode(prev_txid).map_err(|_| Error::InvalidTxId)?;
        let script = Script::from_hex(prev_locking_script)?;
        self.from_utxos(&[Utxo::new(prev_tx_hash, vout, script, satoshis)]);
        Ok(())
    }

    /// Appends one input per UTXO, with the default finalized sequence
    /// number.
    pub fn from_utxos(&mut self, utxos: &[Utxo]) {
        for utxo in utxos {
            self.add_input(Input {
                prev_tx_hash: utxo.txid_hash,
                prev_out_index: utxo.vout,
                unlocking_script: Script::new(),
                sequence: DEFAULT_SEQUENCE,
                prev_satoshis: utxo.satoshis,
                prev_locking_script: Some(utxo.locking_script.clone()),
            });
        }
    }

    /// Appends a P2PKH output paying `satoshis` to `address`.
    ///
    /// # Errors
    /// Address decoding errors.
    pub fn add_p2pkh_output_from_address(&mut self, address: &str, satoshis: u64) -> Result<()> {
        let pubkey_hash = address_to_pubkey_hash(address)?;
        self.add_output(Output {
            satoshis,
            locking_script: p2pkh::create_lock_script(&Hash160(pubkey_hash)),
        });
        Ok(())
    }

    /// Appends a zero-satoshi data output carrying `data` after
    /// OP_FALSE OP_RETURN.
    ///
    /// # Errors
    /// `Error::BadArgument` if the data cannot be pushed.
    pub fn add_op_return_output(&mut self, data: &[u8]) -> Result<()> {
        self.add_op_return_parts_output(&[data])
    }

    /// Appends a zero-satoshi data output with one push per part.
    ///
    /// # Errors
    /// `Error::BadArgument` if a part cannot be pushed.
    pub fn add_op_return_parts_output(&mut self, parts: &[&[u8]]) -> Result<()> {
        let mut script = Script::new();
        script.append(OP_FALSE);
        script.append(OP_RETURN);
        for part in parts {
            script.append_data(part)?;
        }
        self.add_output(Output { satoshis: 0, locking_script: script });
        Ok(())
    }

    /// Writes an unlocking script into the input at `index`.
    ///
    /// Unlocking scripts are not covered by the signature-hash midstates,
    /// so the cache survives this call.
    ///
    /// # Errors
    /// `Error::BadArgument` if no input exists at the index.
    pub fn insert_input_unlocking_script(&mut self, index: usize, script: Script) -> Result<()> {
        match self.inputs.get_mut(index) {
            Some(input) => {
                input.unlocking_script = script;
                Ok(())
            }
            None => Err(Error::BadArgument(format!("no input at index {}", index))),
        }
    }

    /// Number of inputs.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Sum of the previous output values carried by the inputs.
    #[must_use]
    pub fn total_input_satoshis(&self) -> u64 {
        self.inputs.iter().map(|i| i.prev_satoshis).sum()
    }

    /// Sum of the output values.
    #[must_use]
    pub fn total_output_satoshis(&self) -> u64 {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }

    /// Double-SHA256 of the standard serialization. Extended-only fields
    /// never contribute.
    #[must_use]
    pub fn tx_hash(&self) -> Hash256 {
        let mut b = Vec::with_capacity(self.size());
        self.write(&mut b).unwrap_or_default();
        sha256d(&b)
    }

    /// The transaction id in display hex.
    #[must_use]
    pub fn txid(&self) -> String {
        self.tx_hash().encode()
    }

    /// Serializes to standard-format bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(self.size());
        self.write(&mut b).unwrap_or_default();
        b
    }

    /// Serializes to standard-format hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Serializes to extended-format bytes.
    #[must_use]
    pub fn to_extended_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(self.extended_size());
        self.write_extended(&mut b).unwrap_or_default();
        b
    }

    /// Writes the extended format: sentinel after the version, inputs with
    /// their prevout tails.
    ///
    /// # Errors
    /// IO errors.
    pub fn write_extended(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_all(&[0x00, 0x00])?;
        writer.write_all(&EXTENDED_SENTINEL_TAIL)?;
        var_int::write(self.inputs.len() as u64, writer)?;
        for input in &self.inputs {
            input.write_extended(writer)?;
        }
        var_int::write(self.outputs.len() as u64, writer)?;
        for output in &self.outputs {
            output.write(writer)?;
        }
        writer.write_u32::<LittleEndian>(self.locktime)
    }

    /// Serialized size of the standard form in bytes, without allocating.
    #[must_use]
    pub fn size(&self) -> usize {
        8 + var_int::size(self.inputs.len() as u64)
            + self.inputs.iter().map(Input::size).sum::<usize>()
            + var_int::size(self.outputs.len() as u64)
            + self.outputs.iter().map(Output::size).sum::<usize>()
    }

    /// Serialized size of the extended form in bytes, without allocating.
    #[must_use]
    pub fn extended_size(&self) -> usize {
        14 + var_int::size(self.inputs.len() as u64)
            + self.inputs.iter().map(Input::extended_size).sum::<usize>()
            + var_int::size(self.outputs.len() as u64)
            + self.outputs.iter().map(Output::size).sum::<usize>()
    }

    /// Parses a transaction from bytes in either format.
    ///
    /// # Errors
    /// `Error::TxTooShort` below the 10-byte minimum, decoding errors
    /// otherwise.
    pub fn from_bytes(bytes: &[u8]) -> Result<Tx> {
        if bytes.len() < 10 {
            return Err(Error::TxTooShort);
        }
        Tx::read(&mut io::Cursor::new(bytes))
    }

    /// Parses a transaction from hex in either format.
    ///
    /// # Errors
    /// `Error::HexInvalid` for non-hex input, then as [`Tx::from_bytes`].
    pub fn from_hex(s: &str) -> Result<Tx> {
        Tx::from_bytes(&hex::decode(s)?)
    }

    /// Deep copy sharing nothing with the original.
    #[must_use]
    pub fn deep_clone(&self) -> Tx {
        Tx {
            version: self.version,
            locktime: self.locktime,
            inputs: self.inputs.iter().map(Input::deep_clone).collect(),
            outputs: self.outputs.iter().map(Output::deep_clone).collect(),
            cache: RefCell::new(self.cache.borrow().clone()),
        }
    }

    /// Copy whose records are independent but whose immutable script
    /// buffers are shared with the original.
    #[must_use]
    pub fn shallow_clone(&self) -> Tx {
        Tx {
            version: self.version,
            locktime: self.locktime,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            cache: RefCell::new(self.cache.borrow().clone()),
        }
    }

    /// Whether this is the block reward transaction: exactly one input with
    /// a zero previous hash and index 0xFFFFFFFF.
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_hash.is_zero()
            && self.inputs[0].prev_out_index == 0xffff_ffff
    }

    /// Whether any output is a data carrier (OP_RETURN or
    /// OP_FALSE OP_RETURN locking script).
    #[must_use]
    pub fn has_data_outputs(&self) -> bool {
        self.outputs.iter().any(|o| o.locking_script.is_data())
    }

    /// Runs the interpreter over one input's unlocking script against the
    /// previous locking script carried in extended form.
    ///
    /// # Errors
    /// `Error::EmptyPreviousTxScript` without extended data, any
    /// `ScriptError` the evaluation raises.
    pub fn verify_input(&self, index: usize) -> Result<()> {
        let input = self
            .inputs
            .get(index)
            .ok_or_else(|| Error::BadArgument(format!("no input at index {}", index)))?;
        let prev_script = input
            .prev_locking_script
            .as_ref()
            .ok_or(Error::EmptyPreviousTxScript)?;
        let mut checker = TransactionChecker::new(self, index, input.prev_satoshis, false);
        Engine::new()
            .with_scripts(&input.unlocking_script, prev_script)
            .after_genesis(true)
            .execute(&mut checker)
    }

    /// Verifies every input with [`Tx::verify_input`].
    ///
    /// # Errors
    /// The first failing input's error.
    pub fn verify_all_inputs(&self) -> Result<()> {
        for index in 0..self.inputs.len() {
            self.verify_input(index)?;
        }
        Ok(())
    }

    fn read_counted(
        reader: &mut dyn Read,
        version: u32,
        n_inputs: u64,
        extended: bool,
    ) -> Result<Tx> {
        let mut inputs = Vec::with_capacity(n_inputs.min(1024) as usize);
        for _ in 0..n_inputs {
            inputs.push(if extended {
                Input::read_extended(reader)?
            } else {
                Input::read(reader)?
            });
        }
        let n_outputs = var_int::read(reader)?;
        let outputs = Tx::read_outputs(reader, n_outputs)?;
        let locktime = Tx::read_locktime(reader)?;
        Ok(Tx { version, locktime, inputs, outputs, cache: RefCell::new(SigHashCache::default()) })
    }

    fn read_outputs(reader: &mut dyn Read, n_outputs: u64) -> Result<Vec<Output>> {
        let mut outputs = Vec::with_capacity(n_outputs.min(1024) as usize);
        for _ in 0..n_outputs {
            outputs.push(Output::read(reader)?);
        }
        Ok(outputs)
    }

    fn read_locktime(reader: &mut dyn Read) -> Result<u32> {
        let mut locktime = [0u8; 4];
        reader.read_exact(&mut locktime).map_err(|_| Error::NLockTimeLength)?;
        Ok(u32::from_le_bytes(locktime))
    }
}

impl Serializable<Tx> for Tx {
    /// Reads a transaction, auto-detecting the extended format.
    ///
    /// A standard parse of the sentinel consumes an empty input count, an
    /// empty output count, and locktime bytes `00 00 00 EF`; reaching that
    /// state switches the parser to extended mode for the real body.
    fn read(reader: &mut dyn Read) -> Result<Tx> {
        let version = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::TxTooShort)?;
        let n_inputs = var_int::read(reader)?;
        if n_inputs != 0 {
            return Tx::read_counted(reader, version, n_inputs, false);
        }
        let n_outputs = var_int::read(reader)?;
        if n_outputs != 0 {
            // A transaction with no inputs is unusual but well-formed.
            let outputs = Tx::read_outputs(reader, n_outputs)?;
            let locktime = Tx::read_locktime(reader)?;
            return Ok(Tx {
                version,
                locktime,
                inputs: Vec::new(),
                outputs,
                cache: RefCell::new(SigHashCache::default()),
            });
        }
        let mut locktime = [0u8; 4];
        reader.read_exact(&mut locktime).map_err(|_| Error::NLockTimeLength)?;
        if locktime == EXTENDED_SENTINEL_TAIL {
            let n_inputs = var_int::read(reader)?;
            return Tx::read_counted(reader, version, n_inputs, true);
        }
        Ok(Tx {
            version,
            locktime: u32::from_le_bytes(locktime),
            inputs: Vec::new(),
            outputs: Vec::new(),
            cache: RefCell::new(SigHashCache::default()),
        })
    }

    fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.version)?;
        var_int::write(self.inputs.len() as u64, writer)?;
        for input in &self.inputs {
            input.write(writer)?;
        }
        var_int::write(self.outputs.len() as u64, writer)?;
        for output in &self.outputs {
            output.write(writer)?;
        }
        writer.write_u32::<LittleEndian>(self.locktime)
    }
}

impl Default for Tx {
    fn default() -> Tx {
        Tx::new()
    }
}

impl Clone for Tx {
    /// Deep copy; see [`Tx::shallow_clone`] for the buffer-sharing variant.
    fn clone(&self) -> Tx {
        self.deep_clone()
    }
}

impl PartialEq for Tx {
    fn eq(&self, other: &Tx) -> bool {
        self.version == other.version
            && self.locktime == other.locktime
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl Eq for Tx {}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Tx")
            .field("version", &self.version)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("locktime", &self.locktime)
            .finish()
    }
}

/// A batch of transactions, as they appear in a block after the header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Txs(pub Vec<Tx>);

impl Txs {
    /// Reads `varint(count)` transactions and returns the batch together
    /// with the total bytes consumed.
    ///
    /// The caller skips the 80-byte block header first when streaming a
    /// block.
    ///
    /// # Errors
    /// Any transaction decoding error.
    pub fn read_from(reader: &mut dyn Read) -> Result<(Txs, u64)> {
        let mut tally = TallyReader { inner: reader, count: 0 };
        let n = var_int::read(&mut tally)?;
        let mut txs = Vec::with_capacity(n.min(1024) as usize);
        for _ in 0..n {
            txs.push(Tx::read(&mut tally)?);
        }
        Ok((Txs(txs), tally.count))
    }
}

struct TallyReader<'a> {
    inner: &'a mut dyn Read,
    count: u64,
}

impl Read for TallyReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
