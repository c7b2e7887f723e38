//! Standard error and result types for the library.
use base58::FromBase58Error;
use hex::FromHexError;
use secp256k1::Error as Secp256k1Error;
use std::fmt;
use std::io;

/// Standard error type used in the library.
#[derive(Debug)]
pub enum Error {
    /// An argument provided is invalid.
    BadArgument(String),
    /// The data given is not valid.
    BadData(String),
    /// Base58 string could not be decoded.
    FromBase58Error(FromBase58Error),
    /// Serialized transaction is shorter than the 10-byte minimum.
    TxTooShort,
    /// Serialized input ended before all fields were read.
    InputTooShort,
    /// Serialized output ended before all fields were read.
    OutputTooShort,
    /// Lock time field is not 4 bytes long.
    NLockTimeLength,
    /// A varint declared more trailer bytes than the reader could supply.
    VarIntTruncated,
    /// Hash string is longer than 64 hex characters.
    HashStrSize(usize),
    /// Hex string could not be decoded.
    HexInvalid(FromHexError),
    /// Input references a previous transaction script type the library
    /// cannot unlock.
    UnsupportedScript,
    /// Script does not match any recognized type where one is required.
    InvalidScriptType(String),
    /// No unlocker was supplied for signing.
    NoUnlocker,
    /// Input is missing its previous transaction id.
    EmptyPreviousTxId,
    /// Input is missing its previous locking script.
    EmptyPreviousTxScript,
    /// Input carries a zero previous satoshi value.
    InputSatoshisZero,
    /// Previous transaction id is not a valid 32-byte hash.
    InvalidTxId,
    /// The UTXO getter has no more unspent outputs to offer.
    NoUtxo,
    /// Satoshis inputted to the tx are less than the outputted satoshis.
    InsufficientInputs,
    /// The UTXO source was exhausted before the deficit reached zero.
    InsufficientFunds,
    /// Fee quotes collection has not been set up.
    FeeQuotesNotInit,
    /// The named miner has no quotes stored.
    MinerNoQuotes,
    /// The requested fee type is not present in the quote.
    FeeTypeNotFound,
    /// Fee quote has not been initialized.
    FeeQuoteNotInit,
    /// Fee type string is not a known kind.
    UnknownFeeType(String),
    /// Script evaluation failed.
    Script(ScriptError),
    /// Standard library IO error.
    IOError(io::Error),
    /// Error in the secp256k1 library.
    Secp256k1Error(Secp256k1Error),
    /// JSON (de)serialization error.
    JsonError(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadArgument(s) => write!(f, "Bad argument: {}", s),
            Error::BadData(s) => write!(f, "Bad data: {}", s),
            Error::FromBase58Error(e) => write!(f, "Base58 decoding error: {:?}", e),
            Error::TxTooShort => {
                write!(f, "too short to be a tx - even an empty tx has 10 bytes")
            }
            Error::InputTooShort => write!(f, "input length too short"),
            Error::OutputTooShort => write!(f, "output length too short"),
            Error::NLockTimeLength => write!(f, "nLockTime length must be 4 bytes long"),
            Error::VarIntTruncated => write!(f, "varint truncated"),
            Error::HashStrSize(n) => write!(f, "hash string too long: {} characters", n),
            Error::HexInvalid(e) => write!(f, "Hex decoding error: {}", e),
            Error::UnsupportedScript => write!(f, "non-P2PKH input used in the tx - unsupported"),
            Error::InvalidScriptType(s) => write!(f, "invalid script type: {}", s),
            Error::NoUnlocker => write!(f, "unlocker not supplied"),
            Error::EmptyPreviousTxId => write!(f, "previous tx id not supplied"),
            Error::EmptyPreviousTxScript => write!(f, "previous tx script not supplied"),
            Error::InputSatoshisZero => write!(f, "input satoshi value is not provided"),
            Error::InvalidTxId => write!(f, "invalid TxID"),
            Error::NoUtxo => write!(f, "no remaining utxos"),
            Error::InsufficientInputs => {
                write!(f, "satoshis inputted to the tx are less than the outputted satoshis")
            }
            Error::InsufficientFunds => write!(f, "insufficient funds provided"),
            Error::FeeQuotesNotInit => write!(f, "fee quotes have not been setup"),
            Error::MinerNoQuotes => write!(f, "miner has no quotes stored"),
            Error::FeeTypeNotFound => write!(f, "fee type not found"),
            Error::FeeQuoteNotInit => write!(f, "fee quote has not been initialized"),
            Error::UnknownFeeType(s) => write!(f, "unknown fee type: {}", s),
            Error::Script(e) => write!(f, "Script error: {}", e),
            Error::IOError(e) => write!(f, "IO error: {}", e),
            Error::Secp256k1Error(e) => write!(f, "Secp256k1 error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::HexInvalid(e) => Some(e),
            Error::IOError(e) => Some(e),
            Error::Secp256k1Error(e) => Some(e),
            Error::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FromBase58Error> for Error {
    fn from(e: FromBase58Error) -> Self {
        Error::FromBase58Error(e)
    }
}

impl From<FromHexError> for Error {
    fn from(e: FromHexError) -> Self {
        Error::HexInvalid(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IOError(e)
    }
}

impl From<Secp256k1Error> for Error {
    fn from(e: Secp256k1Error) -> Self {
        Error::Secp256k1Error(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonError(e)
    }
}

impl From<ScriptError> for Error {
    fn from(e: ScriptError) -> Self {
        Error::Script(e)
    }
}

/// Fatal script evaluation failures surfaced by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Script, element, opcode-count or stack limit exceeded, or a push ran
    /// past the end of the script.
    ScriptOverflow,
    /// A disabled opcode was encountered.
    DisabledOpcode(u8),
    /// An undefined or reserved opcode was executed.
    BadOpcode(u8),
    /// A stack operation was attempted with too few elements.
    InvalidStackOperation,
    /// IF/ELSE/ENDIF nesting did not balance.
    UnbalancedConditional,
    /// A numeric operand was out of range for the active rules.
    NumericOverflow,
    /// Signature is not strict DER.
    SigDer,
    /// Signature S value is in the upper half of the curve order.
    SigHighS,
    /// Signature hash type byte is not a recognized flag combination.
    SigHashType,
    /// Public key is not in a recognized format.
    PubKeyFormat,
    /// A VERIFY-class operation or the final stack check failed.
    VerifyFailed,
    /// Stack was not clean after execution under pre-genesis rules.
    CleanStack,
    /// A numeric operand was not minimally encoded.
    MinimalEncoding,
    /// Division or modulo by zero.
    DivideByZero,
    /// OP_RETURN encountered under pre-genesis rules.
    EarlyReturn,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScriptError::ScriptOverflow => write!(f, "script overflow"),
            ScriptError::DisabledOpcode(op) => write!(f, "disabled opcode: {}", op),
            ScriptError::BadOpcode(op) => write!(f, "bad opcode: {}", op),
            ScriptError::InvalidStackOperation => write!(f, "invalid stack operation"),
            ScriptError::UnbalancedConditional => write!(f, "unbalanced conditional"),
            ScriptError::NumericOverflow => write!(f, "number out of range"),
            ScriptError::SigDer => write!(f, "signature is not strict DER"),
            ScriptError::SigHighS => write!(f, "signature S value is too high"),
            ScriptError::SigHashType => write!(f, "invalid signature hash type"),
            ScriptError::PubKeyFormat => write!(f, "invalid public key format"),
            ScriptError::VerifyFailed => write!(f, "verify failed"),
            ScriptError::CleanStack => write!(f, "stack is not clean"),
            ScriptError::MinimalEncoding => write!(f, "number is not minimally encoded"),
            ScriptError::DivideByZero => write!(f, "divide by zero"),
            ScriptError::EarlyReturn => write!(f, "hit OP_RETURN"),
        }
    }
}

impl std::error::Error for ScriptError {}

/// Standard Result used in the library.
pub type Result<T> = std::result::Result<T, Error>;
