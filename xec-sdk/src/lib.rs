#![deny(missing_docs)]

//! eCash wallet core.
//!
//! Re-exports the key, script, transaction and wallet crates for
//! single-crate usage.

pub use xec_primitives as primitives;
pub use xec_script as script;
pub use xec_transaction as transaction;
pub use xec_wallet as wallet;
