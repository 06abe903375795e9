//! Base58 and Base58Check codecs.
//!
//! Base58Check carries legacy addresses, WIF keys, BIP32 extended keys
//! and BIP38 encrypted keys. The payload is followed by the first four
//! bytes of its double SHA-256 before encoding.

use crate::hash::sha256d;
use crate::PrimitivesError;

/// The Bitcoin Base58 alphabet (no `0`, `O`, `I` or `l`).
pub const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Encode bytes as Base58. Leading zero bytes become leading `1`s.
pub fn encode(data: &[u8]) -> String {
    bs58::encode(data)
        .with_alphabet(bs58::Alphabet::BITCOIN)
        .into_string()
}

/// Decode a Base58 string.
pub fn decode(s: &str) -> Result<Vec<u8>, PrimitivesError> {
    bs58::decode(s)
        .with_alphabet(bs58::Alphabet::BITCOIN)
        .into_vec()
        .map_err(|e| PrimitivesError::InvalidBase58(e.to_string()))
}

/// True if every character of `s` is in the Base58 alphabet.
pub fn is_base58(s: &str) -> bool {
    s.chars().all(|c| ALPHABET.contains(c))
}

/// Encode `data` followed by its 4-byte double-SHA-256 checksum.
pub fn check_encode(data: &[u8]) -> String {
    let checksum = sha256d(data);
    let mut payload = Vec::with_capacity(data.len() + 4);
    payload.extend_from_slice(data);
    payload.extend_from_slice(&checksum[..4]);
    encode(&payload)
}

/// Decode a Base58Check string and verify its checksum.
///
/// # Returns
/// The payload without the checksum, `ChecksumMismatch` if the trailing
/// four bytes disagree, or `InvalidBase58` for bad characters or a
/// payload shorter than the checksum.
pub fn check_decode(s: &str) -> Result<Vec<u8>, PrimitivesError> {
    let decoded = decode(s)?;
    if decoded.len() < 4 {
        return Err(PrimitivesError::InvalidBase58(
            "data too short for checksum".to_string(),
        ));
    }
    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    if checksum != &sha256d(payload)[..4] {
        return Err(PrimitivesError::ChecksumMismatch);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zeros_map_to_ones() {
        assert_eq!(encode(&[0, 0, 0, 1]), "1112");
        assert_eq!(decode("1112").unwrap(), vec![0, 0, 0, 1]);
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(encode(b"hello world"), "StV1DL6CwTryKyV");
        assert_eq!(decode("StV1DL6CwTryKyV").unwrap(), b"hello world");
    }

    #[test]
    fn test_invalid_characters_rejected() {
        assert!(matches!(decode("0OIl"), Err(PrimitivesError::InvalidBase58(_))));
        assert!(!is_base58("abc0"));
        assert!(is_base58("S6c56bnXQiBjk9mqSYE7ykVQ7NzrRy"));
    }

    /// Genesis coinbase P2PKH address decodes to version 0 + hash160.
    #[test]
    fn test_check_decode_address() {
        let payload = check_decode("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").unwrap();
        assert_eq!(
            hex::encode(&payload),
            "0062e907b15cbf27d5425399ebf6f0fb50ebb88f18"
        );
        assert_eq!(check_encode(&payload), "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
    }

    #[test]
    fn test_check_decode_bad_checksum() {
        assert!(matches!(
            check_decode("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb"),
            Err(PrimitivesError::ChecksumMismatch)
        ));
        assert!(check_decode("11").is_err());
    }
}
