//! eCash wallet primitives: hashing, encodings, and secp256k1 keys.
//!
//! This crate provides the foundational building blocks for the wallet:
//! - Hash functions (SHA-256, SHA-256d, RIPEMD-160, SHA-512, HMAC)
//! - CompactSize integers with bounds-checked readers and writers
//! - Base58Check and chain hashes
//! - Per-network `ChainParams`
//! - ECDSA, Schnorr and blind Schnorr signatures, ECIES, signed messages
//! - WIF and minikey import, BIP32 derivation, BIP38 key encryption

pub mod aes;
pub mod base58;
pub mod bip32;
pub mod bip38;
pub mod chain_params;
pub mod chainhash;
pub mod ec;
pub mod hash;
pub mod script_type;
pub mod util;
pub mod wif;

mod error;
pub use error::PrimitivesError;

pub use chain_params::{ChainParams, Network};
pub use script_type::ScriptType;
