//! Fee rate quotes, keyed by fee kind and optionally by miner.

use crate::util::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Kind of bytes a fee rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    /// Ordinary transaction bytes.
    Standard,
    /// Data-carrier output bytes.
    Data,
}

impl fmt::Display for FeeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeeType::Standard => write!(f, "standard"),
            FeeType::Data => write!(f, "data"),
        }
    }
}

impl FromStr for FeeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<FeeType> {
        match s {
            "standard" => Ok(FeeType::Standard),
            "data" => Ok(FeeType::Data),
            other => Err(Error::UnknownFeeType(other.to_string())),
        }
    }
}

/// A mining rate: satoshis per a number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeUnit {
    /// Satoshis charged per `bytes`.
    pub satoshis: u64,
    /// The byte quantum the satoshi amount applies to.
    pub bytes: u64,
}

impl FeeUnit {
    /// The fee for `size` bytes at this rate. Integer arithmetic, truncated
    /// toward zero.
    #[must_use]
    #[inline]
    pub fn fee_for(&self, size: u64) -> u64 {
        if self.bytes == 0 {
            return 0;
        }
        size * self.satoshis / self.bytes
    }
}

/// Rates for one fee kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// The kind of bytes these rates cover.
    #[serde(rename = "feeType")]
    pub fee_type: FeeType,
    /// Rate for inclusion in a block.
    #[serde(rename = "miningFee")]
    pub mining_fee: FeeUnit,
    /// Rate for relay without mining.
    #[serde(rename = "relayFee")]
    pub relay_fee: FeeUnit,
}

impl Fee {
    /// The conventional default rate: 50 satoshis per 1000 bytes.
    #[must_use]
    pub fn default_rate(fee_type: FeeType) -> Fee {
        Fee {
            fee_type,
            mining_fee: FeeUnit { satoshis: 50, bytes: 1000 },
            relay_fee: FeeUnit { satoshis: 25, bytes: 1000 },
        }
    }
}

/// A quote holding one [`Fee`] per fee kind.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    fees: HashMap<FeeType, Fee>,
}

impl FeeQuote {
    /// Creates a quote populated with default standard and data rates.
    #[must_use]
    pub fn new() -> FeeQuote {
        FeeQuote::default()
            .add_quote(Fee::default_rate(FeeType::Standard))
            .add_quote(Fee::default_rate(FeeType::Data))
    }

    /// Adds or replaces the quote for a fee kind.
    #[must_use]
    pub fn add_quote(mut self, fee: Fee) -> FeeQuote {
        self.fees.insert(fee.fee_type, fee);
        self
    }

    /// The fee for a kind.
    ///
    /// # Errors
    /// `Error::FeeQuoteNotInit` on an unpopulated quote,
    /// `Error::FeeTypeNotFound` for a kind the quote does not carry.
    pub fn fee(&self, fee_type: FeeType) -> Result<&Fee> {
        if self.fees.is_empty() {
            return Err(Error::FeeQuoteNotInit);
        }
        self.fees.get(&fee_type).ok_or(Error::FeeTypeNotFound)
    }
}

/// Quotes for several miners, keyed by miner name.
#[derive(Debug, Default, Clone)]
pub struct FeeQuotes {
    quotes: HashMap<String, FeeQuote>,
}

impl FeeQuotes {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> FeeQuotes {
        FeeQuotes::default()
    }

    /// Stores a miner's quote, replacing any existing one.
    pub fn add_miner(&mut self, miner: &str, quote: FeeQuote) {
        self.quotes.insert(miner.to_string(), quote);
    }

    /// The quote for a miner.
    ///
    /// # Errors
    /// `Error::FeeQuotesNotInit` when no miners are stored,
    /// `Error::MinerNoQuotes` for an unknown miner.
    pub fn quote(&self, miner: &str) -> Result<&FeeQuote> {
        if self.quotes.is_empty() {
            return Err(Error::FeeQuotesNotInit);
        }
        self.quotes.get(miner).ok_or(Error::MinerNoQuotes)
    }

    /// The fee of one kind for a miner.
    ///
    /// # Errors
    /// As [`FeeQuotes::quote`] plus `Error::FeeTypeNotFound`.
    pub fn fee(&self, miner: &str, fee_type: FeeType) -> Result<&Fee> {
        self.quote(miner)?.fee(fee_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_cover_both_kinds() {
        let fq = FeeQuote::new();
        assert_eq!(fq.fee(FeeType::Standard).unwrap().mining_fee.satoshis, 50);
        assert_eq!(fq.fee(FeeType::Data).unwrap().mining_fee.bytes, 1000);
    }

    #[test]
    fn empty_quote_errors() {
        let fq = FeeQuote::default();
        assert!(matches!(fq.fee(FeeType::Standard), Err(Error::FeeQuoteNotInit)));

        let fq = FeeQuote::default().add_quote(Fee::default_rate(FeeType::Standard));
        assert!(matches!(fq.fee(FeeType::Data), Err(Error::FeeTypeNotFound)));
    }

    #[test]
    fn fee_for_truncates() {
        let unit = FeeUnit { satoshis: 5, bytes: 10 };
        assert_eq!(unit.fee_for(0), 0);
        assert_eq!(unit.fee_for(1), 0);
        assert_eq!(unit.fee_for(2), 1);
        assert_eq!(unit.fee_for(85), 42);
        assert_eq!(unit.fee_for(192), 96);
        let zero = FeeUnit { satoshis: 5, bytes: 0 };
        assert_eq!(zero.fee_for(100), 0);
    }

    #[test]
    fn fee_type_strings() {
        assert_eq!(FeeType::Standard.to_string(), "standard");
        assert_eq!("data".parse::<FeeType>().unwrap(), FeeType::Data);
        assert!(matches!("bogus".parse::<FeeType>(), Err(Error::UnknownFeeType(_))));
    }

    #[test]
    fn miners() {
        let mut quotes = FeeQuotes::new();
        assert!(matches!(quotes.quote("taal"), Err(Error::FeeQuotesNotInit)));
        quotes.add_miner("taal", FeeQuote::new());
        assert!(quotes.quote("taal").is_ok());
        assert!(matches!(quotes.quote("other"), Err(Error::MinerNoQuotes)));
        assert!(quotes.fee("taal", FeeType::Data).is_ok());
    }

    #[test]
    fn quote_serde_round_trip() {
        let fq = FeeQuote::new();
        let json = serde_json::to_string(&fq).unwrap();
        let back: FeeQuote = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fq);
    }
}
