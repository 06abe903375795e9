/// Error types for keystores, coin selection and prior-transaction fetching.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The spendable coins fall short of outputs plus fee.
    #[error("insufficient funds: short by {shortfall} satoshis")]
    InsufficientFunds { shortfall: u64 },

    /// The selected transaction would be larger than the configured limit.
    #[error("transaction size {size} exceeds maximum {max}")]
    ExceedsMaxTxSize { size: usize, max: usize },

    /// The fee would exceed 100 satoshis per byte.
    #[error("fee of {fee} satoshis is excessive for {size} bytes")]
    ExcessiveFee { fee: u64, size: usize },

    #[error("incorrect password")]
    InvalidPassword,

    #[error("keystore is watching-only")]
    WatchingOnly,

    /// The keystore holds no key for the requested derivation.
    #[error("no key for derivation: {0}")]
    UnknownDerivation(String),

    #[error("timed out fetching {pending} prior transactions")]
    FetchTimeout { pending: usize },

    #[error("prior-transaction fetch cancelled")]
    FetchCancelled,

    #[error("fetch provider error: {0}")]
    Provider(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transaction error: {0}")]
    Transaction(#[from] xec_transaction::TransactionError),

    #[error("script error: {0}")]
    Script(#[from] xec_script::ScriptError),

    #[error("primitives error: {0}")]
    Primitives(#[from] xec_primitives::PrimitivesError),
}
