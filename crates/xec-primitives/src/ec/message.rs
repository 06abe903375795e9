//! Signed messages with recoverable 65-byte signatures.

use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::ec::signature::Signature;
use crate::hash::sha256d;
use crate::util::CompactSize;
use crate::PrimitivesError;

pub const SIG65_LEN: usize = 65;

/// `sha256d(varint(len(magic)) || magic || varint(len(msg)) || msg)`.
pub fn message_hash(message: &[u8], magic: &str) -> [u8; 32] {
    let mut buf = Vec::with_capacity(magic.len() + message.len() + 10);
    buf.extend_from_slice(&CompactSize::from(magic.len()).to_bytes());
    buf.extend_from_slice(magic.as_bytes());
    buf.extend_from_slice(&CompactSize::from(message.len()).to_bytes());
    buf.extend_from_slice(message);
    sha256d(&buf)
}

/// Sign `message`, returning `[27 + recid + 4·compressed] || r || s`.
pub fn sign_message(
    key: &PrivateKey,
    message: &[u8],
    compressed: bool,
    magic: &str,
) -> Result<[u8; SIG65_LEN], PrimitivesError> {
    let hash = message_hash(message, magic);
    let sig = Signature::sign_low_r(&hash, key)?;
    let expected = key.public_key(compressed);
    for recid in 0..4u8 {
        let Ok(recovered) = sig.recover(&hash, recid, compressed) else {
            continue;
        };
        if recovered == expected {
            let mut out = [0u8; SIG65_LEN];
            out[0] = 27 + recid + if compressed { 4 } else { 0 };
            out[1..].copy_from_slice(&sig.to_compact());
            return Ok(out);
        }
    }
    Err(PrimitivesError::InvalidSignature(
        "no recovery id reproduces the signing key".to_string(),
    ))
}

/// Recover the signer's key and its SEC1 form from a 65-byte signature.
pub fn recover_message_key(
    sig65: &[u8],
    message: &[u8],
    magic: &str,
) -> Result<PublicKey, PrimitivesError> {
    if sig65.len() != SIG65_LEN {
        return Err(PrimitivesError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIG65_LEN,
            sig65.len()
        )));
    }
    let header = sig65[0];
    if !(27..=34).contains(&header) {
        return Err(PrimitivesError::InvalidSignature(format!(
            "bad header byte {header}"
        )));
    }
    let compressed = header >= 31;
    let recid = (header - 27) & 3;
    let sig = Signature::from_compact(&sig65[1..])?;
    sig.recover(&message_hash(message, magic), recid, compressed)
}

/// True if `sig65` was made over `message` by `pub_key`.
pub fn verify_message(pub_key: &PublicKey, sig65: &[u8], message: &[u8], magic: &str) -> bool {
    match recover_message_key(sig65, message, magic) {
        Ok(recovered) => {
            recovered.to_uncompressed() == pub_key.to_uncompressed()
                && verify_recovered(&recovered, sig65, message, magic)
        }
        Err(_) => false,
    }
}

/// True if `sig65` recovers to a key whose hash160 (in the signalled
/// form) equals `hash160`. This is the P2PKH address check.
pub fn verify_message_with_hash160(
    hash160: &[u8; 20],
    sig65: &[u8],
    message: &[u8],
    magic: &str,
) -> bool {
    match recover_message_key(sig65, message, magic) {
        Ok(recovered) => {
            &recovered.hash160() == hash160 && verify_recovered(&recovered, sig65, message, magic)
        }
        Err(_) => false,
    }
}

fn verify_recovered(key: &PublicKey, sig65: &[u8], message: &[u8], magic: &str) -> bool {
    match Signature::from_compact(&sig65[1..]) {
        Ok(sig) => sig.verify(&message_hash(message, magic), key),
        Err(_) => false,
    }
}
