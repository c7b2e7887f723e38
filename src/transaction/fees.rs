//! Fee planning: byte accounting by fee kind, sufficiency checks, the
//! iterative funding loop and change calculation.

use crate::address::address_to_pubkey_hash;
use crate::script::Script;
use crate::transaction::fee_quote::{FeeQuote, FeeType};
use crate::transaction::{Output, Tx, Utxo, p2pkh};
use crate::util::{Error, Hash160, Result, var_int};

/// An unsigned P2PKH input is costed as if it carried the usual unlocking
/// script: a 72-byte DER signature with its push byte, then a 33-byte
/// compressed public key with its push byte.
const ESTIMATED_P2PKH_UNLOCK_LEN: usize = 107;

/// Serialized byte counts of a transaction split by fee kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxSize {
    /// All bytes.
    pub total_bytes: u64,
    /// Bytes charged at the standard rate.
    pub total_std_bytes: u64,
    /// Bytes of data-carrier outputs, charged at the data rate.
    pub total_data_bytes: u64,
}

/// Fee accounting for a transaction under a quote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxFees {
    /// What the transaction actually pays: inputs minus outputs.
    pub total_fee_paid: u64,
    /// The fee the standard bytes require.
    pub std_fee_paid: u64,
    /// The fee the data bytes require.
    pub data_fee_paid: u64,
}

impl TxFees {
    /// The fee the whole transaction requires.
    #[must_use]
    pub fn required(&self) -> u64 {
        self.std_fee_paid + self.data_fee_paid
    }
}

impl Tx {
    /// Byte counts by fee kind for the transaction as serialized now.
    ///
    /// A data-carrier output contributes all of its bytes (value, length
    /// varint and script) to the data count; everything else, inputs
    /// included, is standard.
    #[must_use]
    pub fn size_with_types(&self) -> TxSize {
        let total = self.size() as u64;
        let data: u64 = self
            .outputs
            .iter()
            .filter(|o| o.locking_script.is_data())
            .map(|o| o.size() as u64)
            .sum();
        TxSize {
            total_bytes: total,
            total_std_bytes: total - data,
            total_data_bytes: data,
        }
    }

    /// Byte counts by fee kind with every unsigned input costed at the
    /// assumed P2PKH unlocking script size.
    #[must_use]
    pub fn estimate_size_with_types(&self) -> TxSize {
        let mut size = self.size_with_types();
        for input in &self.inputs {
            if input.unlocking_script.is_empty() {
                let actual = input.size() as u64;
                let assumed = (40
                    + var_int::size(ESTIMATED_P2PKH_UNLOCK_LEN as u64)
                    + ESTIMATED_P2PKH_UNLOCK_LEN) as u64;
                size.total_bytes += assumed - actual;
                size.total_std_bytes += assumed - actual;
            }
        }
        size
    }

    fn fees_for(&self, size: TxSize, fq: &FeeQuote) -> Result<TxFees> {
        let std_rate = fq.fee(FeeType::Standard)?.mining_fee;
        let data_rate = fq.fee(FeeType::Data)?.mining_fee;
        Ok(TxFees {
            total_fee_paid: self
                .total_input_satoshis()
                .saturating_sub(self.total_output_satoshis()),
            std_fee_paid: std_rate.fee_for(size.total_std_bytes),
            data_fee_paid: data_rate.fee_for(size.total_data_bytes),
        })
    }

    /// Fee accounting against the serialized size.
    ///
    /// # Errors
    /// Quote lookup errors.
    pub fn fees_paid(&self, fq: &FeeQuote) -> Result<TxFees> {
        self.fees_for(self.size_with_types(), fq)
    }

    /// Fee accounting against the estimated (as-if-signed) size.
    ///
    /// # Errors
    /// Quote lookup errors.
    pub fn estimate_fees_paid(&self, fq: &FeeQuote) -> Result<TxFees> {
        self.fees_for(self.estimate_size_with_types(), fq)
    }

    /// Whether inputs minus outputs cover the fee the serialized size
    /// requires.
    ///
    /// # Errors
    /// Quote lookup errors.
    pub fn is_fee_paid_enough(&self, fq: &FeeQuote) -> Result<bool> {
        let fees = self.fees_paid(fq)?;
        Ok(fees.total_fee_paid >= fees.required())
    }

    /// Whether inputs minus outputs cover the fee the estimated size
    /// requires.
    ///
    /// # Errors
    /// Quote lookup errors.
    pub fn estimate_is_fee_paid_enough(&self, fq: &FeeQuote) -> Result<bool> {
        let fees = self.estimate_fees_paid(fq)?;
        Ok(fees.total_fee_paid >= fees.required())
    }

    /// Satoshis still missing before the transaction pays for its outputs
    /// and its estimated fee. Zero when funded.
    ///
    /// # Errors
    /// Quote lookup errors.
    pub fn estimate_deficit(&self, fq: &FeeQuote) -> Result<u64> {
        let required = self.estimate_fees_paid(fq)?.required();
        Ok((self.total_output_satoshis() + required).saturating_sub(self.total_input_satoshis()))
    }

    /// Funds the transaction by repeatedly asking `next` for UTXOs worth
    /// the current deficit, until the estimated fee and outputs are
    /// covered.
    ///
    /// `next` receives the caller's context token and the deficit; it may
    /// return fewer satoshis than asked, in which case it is called again
    /// with the re-estimated deficit. It signals exhaustion by returning
    /// `Error::NoUtxo`.
    ///
    /// # Errors
    /// `Error::InsufficientFunds` if the source is exhausted while the
    /// deficit is still positive; any other getter error verbatim.
    pub fn fund<Ctx, F>(&mut self, ctx: &Ctx, fq: &FeeQuote, mut next: F) -> Result<()>
    where
        F: FnMut(&Ctx, u64) -> Result<Vec<Utxo>>,
    {
        let mut deficit = self.estimate_deficit(fq)?;
        while deficit != 0 {
            match next(ctx, deficit) {
                Ok(utxos) => self.from_utxos(&utxos),
                Err(Error::NoUtxo) => break,
                Err(e) => return Err(e),
            }
            deficit = self.estimate_deficit(fq)?;
        }
        if deficit != 0 {
            return Err(Error::InsufficientFunds);
        }
        Ok(())
    }

    /// Appends a change output paying `address` whatever remains after the
    /// estimated fee, or leaves the transaction unchanged when nothing
    /// remains.
    ///
    /// # Errors
    /// Address decoding errors, `Error::InsufficientInputs` when the
    /// outputs already exceed the inputs.
    pub fn change_to_address(&mut self, address: &str, fq: &FeeQuote) -> Result<()> {
        let pubkey_hash = address_to_pubkey_hash(address)?;
        self.change(p2pkh::create_lock_script(&Hash160(pubkey_hash)), fq)
    }

    /// As [`Tx::change_to_address`] with an explicit locking script.
    ///
    /// # Errors
    /// As [`Tx::change_to_address`].
    pub fn change(&mut self, locking_script: Script, fq: &FeeQuote) -> Result<()> {
        let available = self
            .total_input_satoshis()
            .checked_sub(self.total_output_satoshis())
            .ok_or(Error::InsufficientInputs)?;

        // Cost the fee with the hypothetical change output in place.
        self.add_output(Output { satoshis: 0, locking_script });
        let required = self.estimate_fees_paid(fq)?.required();
        if available > required {
            let last = self.outputs.len() - 1;
            self.outputs[last].satoshis = available - required;
            self.invalidate_sighash_cache();
        } else {
            self.outputs.pop();
            self.invalidate_sighash_cache();
        }
        Ok(())
    }
}

/// The estimated size of a not-yet-created P2PKH input, for callers sizing
/// a transaction before funding.
#[must_use]
pub fn estimated_input_size() -> usize {
    40 + var_int::size(ESTIMATED_P2PKH_UNLOCK_LEN as u64) + ESTIMATED_P2PKH_UNLOCK_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::fee_quote::{Fee, FeeUnit};
    use crate::util::Hash256;
    use pretty_assertions::assert_eq;

    /// The 0.5 sat/byte quote the upstream test-suite uses everywhere.
    fn half_sat_per_byte() -> FeeQuote {
        let unit = FeeUnit { satoshis: 5, bytes: 10 };
        FeeQuote::default()
            .add_quote(Fee { fee_type: FeeType::Standard, mining_fee: unit, relay_fee: unit })
            .add_quote(Fee { fee_type: FeeType::Data, mining_fee: unit, relay_fee: unit })
    }

    fn tx_with_input(satoshis: u64) -> Tx {
        let mut tx = Tx::new();
        tx.from_prev_output(
            "a4c76f8a7c05a91dcf5699b95b54e856298e50c1ceca9a8a5569c8532c500c11",
            0,
            "76a91455b61be43392125d127f1780fb038437cd67ef9c88ac",
            satoshis,
        )
        .unwrap();
        tx
    }

    #[test]
    fn unsigned_sizes() {
        let mut tx = tx_with_input(1000);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 905).unwrap();
        // unsigned actual size: overhead 10 + input 41 + output 34
        assert_eq!(
            tx.size_with_types(),
            TxSize { total_bytes: 85, total_std_bytes: 85, total_data_bytes: 0 }
        );
        // estimated: the empty unlocking script is costed at 107 bytes
        assert_eq!(
            tx.estimate_size_with_types(),
            TxSize { total_bytes: 192, total_std_bytes: 192, total_data_bytes: 0 }
        );
        assert_eq!(estimated_input_size(), 148);
    }

    #[test]
    fn estimate_is_fee_paid_enough() {
        // paying less by one satoshi: 192 estimated bytes need 96 sats
        let mut tx = tx_with_input(1000);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 905).unwrap();
        assert!(!tx.estimate_is_fee_paid_enough(&half_sat_per_byte()).unwrap());

        // paying exactly
        let mut tx = tx_with_input(1000);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 904).unwrap();
        assert!(tx.estimate_is_fee_paid_enough(&half_sat_per_byte()).unwrap());

        // no inputs never pays
        let mut tx = Tx::new();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 256_559).unwrap();
        assert_eq!(tx.size_with_types().total_bytes, 44);
        assert!(!tx.estimate_is_fee_paid_enough(&half_sat_per_byte()).unwrap());

        // two outputs, exact: 226 estimated bytes need 113 sats
        let mut tx = tx_with_input(834_763);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 256_559).unwrap();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 578_091).unwrap();
        assert!(tx.estimate_is_fee_paid_enough(&half_sat_per_byte()).unwrap());

        // short by one
        let mut tx = tx_with_input(834_763);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 256_560).unwrap();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 578_091).unwrap();
        assert!(!tx.estimate_is_fee_paid_enough(&half_sat_per_byte()).unwrap());
    }

    #[test]
    fn is_fee_paid_enough_uses_actual_size() {
        // 85 actual bytes need 42 sats
        let mut tx = tx_with_input(1000);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 958).unwrap();
        assert!(tx.is_fee_paid_enough(&half_sat_per_byte()).unwrap());
        let mut tx = tx_with_input(1000);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 959).unwrap();
        assert!(!tx.is_fee_paid_enough(&half_sat_per_byte()).unwrap());
    }

    #[test]
    fn data_bytes_counted_separately() {
        let mut tx = tx_with_input(1000);
        tx.add_op_return_output(b"hellohello").unwrap();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 100).unwrap();
        let size = tx.size_with_types();
        // data output: 8 value + 1 varint + 13 script bytes
        assert_eq!(size.total_data_bytes, 22);
        assert_eq!(size.total_std_bytes + size.total_data_bytes, size.total_bytes);

        // a data-only rate change shifts the required fee
        let cheap_data = FeeQuote::default()
            .add_quote(Fee {
                fee_type: FeeType::Standard,
                mining_fee: FeeUnit { satoshis: 5, bytes: 10 },
                relay_fee: FeeUnit { satoshis: 5, bytes: 10 },
            })
            .add_quote(Fee {
                fee_type: FeeType::Data,
                mining_fee: FeeUnit { satoshis: 0, bytes: 10 },
                relay_fee: FeeUnit { satoshis: 0, bytes: 10 },
            });
        let full = tx.estimate_fees_paid(&half_sat_per_byte()).unwrap();
        let discounted = tx.estimate_fees_paid(&cheap_data).unwrap();
        assert_eq!(discounted.data_fee_paid, 0);
        assert!(discounted.required() < full.required());
    }

    #[test]
    fn fee_monotonicity() {
        let mut tx = Tx::new();
        let mut previous = tx.size_with_types().total_bytes;
        tx.from_prev_output(
            "a4c76f8a7c05a91dcf5699b95b54e856298e50c1ceca9a8a5569c8532c500c11",
            0,
            "76a91455b61be43392125d127f1780fb038437cd67ef9c88ac",
            1000,
        )
        .unwrap();
        assert!(tx.size_with_types().total_bytes >= previous);
        previous = tx.size_with_types().total_bytes;
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 1).unwrap();
        assert!(tx.size_with_types().total_bytes >= previous);
        previous = tx.size_with_types().total_bytes;
        tx.add_op_return_output(b"x").unwrap();
        assert!(tx.size_with_types().total_bytes >= previous);
    }

    #[test]
    fn funding_converges() {
        let mut tx = Tx::new();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 5000).unwrap();

        let supply = [500u64, 670, 700, 1000, 1000, 1000, 1000, 650];
        let mut served = 0usize;
        let mut observed = Vec::new();
        let fq = half_sat_per_byte();

        tx.fund(&(), &fq, |_, deficit| {
            observed.push(deficit);
            if served >= supply.len() {
                return Err(Error::NoUtxo);
            }
            let utxo = Utxo::new(
                Hash256([served as u8 + 1; 32]),
                served as u32,
                Script::from_hex("76a91455b61be43392125d127f1780fb038437cd67ef9c88ac").unwrap(),
                supply[served],
            );
            served += 1;
            Ok(vec![utxo])
        })
        .unwrap();

        // the getter saw one deficit per under-funded round and stopped
        // after the seventh input covered the shortfall
        assert_eq!(observed, vec![5022, 4596, 4000, 3374, 2448, 1522, 596]);
        assert_eq!(tx.input_count(), 7);
        assert_eq!(tx.estimate_deficit(&fq).unwrap(), 0);
        assert!(tx.estimate_is_fee_paid_enough(&fq).unwrap());
    }

    #[test]
    fn funding_insufficient() {
        let mut tx = Tx::new();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 5000).unwrap();

        let mut served = false;
        let result = tx.fund(&(), &half_sat_per_byte(), |_, _| {
            if served {
                return Err(Error::NoUtxo);
            }
            served = true;
            Ok(vec![Utxo::new(
                Hash256([1; 32]),
                0,
                Script::from_hex("76a91455b61be43392125d127f1780fb038437cd67ef9c88ac").unwrap(),
                100,
            )])
        });
        assert!(matches!(result, Err(Error::InsufficientFunds)));
    }

    #[test]
    fn funding_getter_errors_pass_through() {
        let mut tx = Tx::new();
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 5000).unwrap();
        let result = tx.fund(&(), &half_sat_per_byte(), |_, _| {
            Err(Error::BadData("backend down".to_string()))
        });
        assert!(matches!(result, Err(Error::BadData(_))));
    }

    #[test]
    fn change_appends_remainder() {
        let mut tx = tx_with_input(834_709);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 256_559).unwrap();
        tx.change_to_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", &half_sat_per_byte()).unwrap();

        // estimated size with change: 226 bytes, fee 113
        assert_eq!(tx.output_count(), 2);
        assert_eq!(tx.outputs()[1].satoshis, 834_709 - 256_559 - 113);
        assert!(tx.estimate_is_fee_paid_enough(&half_sat_per_byte()).unwrap());
        // pays exactly
        let fees = tx.estimate_fees_paid(&half_sat_per_byte()).unwrap();
        assert_eq!(fees.total_fee_paid, fees.required());
    }

    #[test]
    fn change_omitted_when_nothing_remains() {
        let mut tx = tx_with_input(1000);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 950).unwrap();
        tx.change_to_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", &half_sat_per_byte()).unwrap();
        assert_eq!(tx.output_count(), 1);
    }

    #[test]
    fn change_rejects_overdrawn_tx() {
        let mut tx = tx_with_input(100);
        tx.add_p2pkh_output_from_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", 500).unwrap();
        assert!(matches!(
            tx.change_to_address("mtestD3vRB7AoYWK2n6kLdZmAMLbLhDsLr", &half_sat_per_byte()),
            Err(Error::InsufficientInputs)
        ));
    }
}
