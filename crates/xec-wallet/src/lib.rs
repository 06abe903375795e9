//! Wallet-side pieces of transaction building.
//!
//! Keystores that hand keys to the signing engine, the privacy-aware coin
//! chooser, and a background worker that fetches prior transactions.

mod error;
pub use error::WalletError;

pub mod coin_chooser;
pub mod fetch;
pub mod keystore;

pub use coin_chooser::{spend_max, ChooserConfig, CoinChooser, Prng, DUST_THRESHOLD};
pub use fetch::{
    fill_input_values, spawn_fetch_worker, FetchClient, FetchConfig, FetchReport, PriorTxCache,
    TxFetchProvider,
};
pub use keystore::{Bip32Keystore, Derivation, ImportedKeystore, Keystore};
