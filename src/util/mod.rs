//! Shared helpers: hashes, varints, errors and binary serialization.

mod bits;
mod hash160;
mod hash256;
mod result;
mod serdes;
pub mod var_int;

pub(crate) use self::bits::{lshift, rshift};

pub use self::hash160::{Hash160, hash160};
pub use self::hash256::{Hash256, sha256d};
pub use self::result::{Error, Result, ScriptError};
pub use self::serdes::Serializable;
