#![deny(missing_docs)]
#![deny(unsafe_code)]

/*! # bsvtx

A Bitcoin SV transaction toolkit. Provides the wire codecs (standard and
extended format), BIP-143-style signature hashing with midstate caching,
pluggable P2PKH signing, fee planning with iterative funding, and a stack
machine for evaluating locking/unlocking script pairs.

## Usage

Build and sign a transaction:

```no_run
use bsvtx::transaction::Tx;
use bsvtx::transaction::unlocker::SimpleGetter;

let mut tx = Tx::new();
tx.from_prev_output(
    "3c8edde27cb9a9132c22038dac4391496be9db16fd21351565cc1006966fdad5",
    0,
    "76a914eb0bd5edba389198e73f8efabddfc61666969ff788ac",
    2_000_000,
)?;
tx.add_p2pkh_output_from_address("n2wmGVP89x3DsLNqk3NvctfQy9m9pvt7mk", 1_999_942)?;

let getter = SimpleGetter::from_wif("KznvCNc6Yf4iztSThoMH6oHWzH9EgjfodKxmeuUGPq5DEX5maspS")?;
tx.fill_all_inputs(&getter)?;
let _raw = tx.to_bytes();
# Ok::<(), bsvtx::util::Error>(())
```

## Security

- ECDSA, SHA-256 and RIPEMD-160 are consumed from `secp256k1` and
  `bitcoin_hashes`; this crate implements no cryptographic primitives.
- Not intended for full consensus validation; use with a trusted BSV node.
*/

pub mod address;
pub mod script;
pub mod transaction;
pub mod util;
