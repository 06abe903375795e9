//! eCash transactions that may be partially signed.
//!
//! Provides the `Transaction` type with its inputs and outputs, the wire
//! codec (including the value extension carried by incomplete inputs),
//! the FORKID sighash with its per-transaction cache, size estimation,
//! and the signing engine. Inputs that are not yet signed identify their
//! keys with x_pubkeys so that cosigners and offline signers can find them.

pub mod input;
pub mod outpoint;
pub mod output;
pub mod sighash;
pub mod transaction;
pub mod x_pubkey;

mod error;
pub use error::TransactionError;
pub use input::{Encoding, InputDescriptor, SignatureSlot, TxInput, DEFAULT_SEQUENCE};
pub use outpoint::OutPoint;
pub use output::{TxOutput, MAX_VALUE};
pub use transaction::{verify_signature, KeyPairs, Transaction};
pub use x_pubkey::XPubKey;
