//! eCash script codec and addresses.
//!
//! Provides opcode definitions, minimal push encoding and chunk parsing,
//! the `Script` type with its output templates, the CashAddr codec,
//! `Address`, and the `Destination` union an output pays to.

pub mod address;
pub mod cashaddr;
pub mod chunk;
pub mod destination;
pub mod opcodes;
pub mod script;
pub mod script_output;

mod error;
pub use error::ScriptError;

pub use address::{Address, AddressFormat, AddressKind};
pub use chunk::{get_ops, push_data, ScriptChunk};
pub use destination::Destination;
pub use script::{MultisigScript, Script};
pub use script_output::{Protocol, ProtocolRecognizer, ScriptOutput};
