//! Elliptic curve cryptography on secp256k1.
//!
//! Keys, ECDSA and Schnorr signatures, blind Schnorr, ECIES message
//! encryption, and recoverable signed messages.

pub mod blind_schnorr;
pub mod curve;
pub mod ecies;
pub mod message;
pub mod private_key;
pub mod public_key;
pub mod schnorr;
pub mod signature;

pub use blind_schnorr::{BlindSignatureRequest, BlindSigner};
pub use private_key::PrivateKey;
pub use public_key::{is_pubkey_shape, PublicKey};
pub use signature::Signature;

/// True if `sig` has the length of a Schnorr signature. DER ECDSA
/// signatures are never exactly 64 bytes.
pub fn is_schnorr_signature(sig: &[u8]) -> bool {
    sig.len() == schnorr::SCHNORR_SIG_LEN
}
