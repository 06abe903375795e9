/// Error types for transaction operations.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Only `SIGHASH_ALL | SIGHASH_FORKID` (0x41) is supported.
    #[error("unsupported sighash type {0:#x}")]
    UnsupportedSighash(u32),

    /// The spent value of an input is needed but unknown.
    #[error("value of input {0} is missing")]
    InputValueMissing(usize),

    /// A sum of input or output values does not fit in an amount.
    #[error("total value out of range")]
    ValueOverflow,

    /// Malformed wire bytes, trailing data or an out-of-range count.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The input's scriptSig matches no known template.
    #[error("cannot handle input of type {0}")]
    UnknownInputType(String),

    /// An extended pubkey with an unknown prefix or bad derivation suffix.
    #[error("invalid x_pubkey: {0}")]
    InvalidXPubKey(String),

    /// Structural misuse such as an out-of-range index.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Broadcast serialization of a transaction with unsigned inputs.
    #[error("transaction is incomplete: {signed} of {required} signatures")]
    Incomplete { signed: usize, required: usize },

    #[error("script error: {0}")]
    Script(#[from] xec_script::ScriptError),

    #[error("primitives error: {0}")]
    Primitives(#[from] xec_primitives::PrimitivesError),
}
