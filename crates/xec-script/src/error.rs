/// Error types for script and address operations.
///
/// Covers truncated scripts, address and CashAddr decoding failures, and
/// malformed public keys or hashes handed to the address constructors.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A push opcode claims more bytes than the script holds.
    #[error("truncated script at offset {0}")]
    Truncated(usize),

    /// Invalid script text or template parameters.
    #[error("invalid script: {0}")]
    InvalidScript(String),

    /// An opcode name that is not part of the opcode table.
    #[error("unknown opcode {0}")]
    UnknownOpcode(String),

    /// Invalid address string.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An address hash that is not 20 bytes long.
    #[error("address hash must be 20 bytes, got {0}")]
    InvalidHashLength(usize),

    /// Bytes that are neither a 33-byte compressed nor a 65-byte uncompressed key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// CashAddr text mixes upper and lower case.
    #[error("cashaddr has mixed case")]
    CashAddrMixedCase,

    /// A character outside the CashAddr alphabet.
    #[error("cashaddr has invalid character {0:?}")]
    CashAddrInvalidChar(char),

    /// The polymod checksum did not verify.
    #[error("cashaddr checksum mismatch")]
    CashAddrChecksum,

    /// CashAddr text without a `prefix:` part where one is required.
    #[error("cashaddr prefix missing")]
    CashAddrMissingPrefix,

    /// A prefix that does not belong to the selected network.
    #[error("cashaddr has unexpected prefix {0}")]
    CashAddrUnexpectedPrefix(String),

    /// The payload is too short or its size bits disagree with the hash length.
    #[error("cashaddr payload has invalid length {0}")]
    CashAddrInvalidLength(usize),

    /// The version byte names an unknown address type.
    #[error("cashaddr has unknown version byte {0:#04x}")]
    CashAddrVersion(u8),

    /// Non-zero padding bits in the 5-bit to 8-bit conversion.
    #[error("cashaddr has invalid padding")]
    CashAddrPadding,

    /// Hex decoding error.
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Error from primitives crate.
    #[error("primitives error: {0}")]
    Primitives(#[from] xec_primitives::PrimitivesError),
}
