/// Unified error type for all primitives operations.
///
/// Covers errors from hashing, EC operations, encryption, encoding, key
/// derivation and key management.
#[derive(Debug, thiserror::Error)]
pub enum PrimitivesError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid WIF format: {0}")]
    InvalidWif(String),

    #[error("invalid minikey")]
    InvalidMinikey,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("point not on curve")]
    PointNotOnCurve,

    #[error("point at infinity")]
    PointAtInfinity,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Authentication failure: a MAC or BIP38 address-hash mismatch.
    #[error("incorrect password")]
    InvalidPassword,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("invalid extended key: {0}")]
    InvalidExtendedKey(String),

    #[error("cannot derive hardened child {0:#x} from a public key")]
    HardenedPublicDerivation(u32),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("invalid BIP38 key: {0}")]
    InvalidBip38(String),

    #[error("blind signer nonce already used")]
    NonceReused,

    #[error("varint too large")]
    VarIntTooLarge,

    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("{0}")]
    Other(String),
}

impl From<hex::FromHexError> for PrimitivesError {
    fn from(e: hex::FromHexError) -> Self {
        PrimitivesError::InvalidHex(e.to_string())
    }
}
