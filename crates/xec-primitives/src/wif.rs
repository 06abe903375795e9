//! Wallet Import Format and Casascius minikeys.
//!
//! The WIF version byte is `wif_prefix + script_type` (mod 256), so one
//! string records both the key and the template it was exported for.

use crate::base58;
use crate::bip38;
use crate::chain_params::ChainParams;
use crate::ec::PrivateKey;
use crate::hash::sha256;
use crate::script_type::ScriptType;
use crate::PrimitivesError;

/// A private key parsed from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedKey {
    pub script_type: ScriptType,
    pub key: PrivateKey,
    pub compressed: bool,
}

/// Encode a key as WIF.
pub fn encode(
    key: &PrivateKey,
    compressed: bool,
    script_type: ScriptType,
    params: &ChainParams,
) -> String {
    let prefix = (params.wif_prefix as i16 + script_type.value()) as u8;
    let mut payload = Vec::with_capacity(34);
    payload.push(prefix);
    payload.extend_from_slice(&key.to_bytes());
    if compressed {
        payload.push(0x01);
    }
    base58::check_encode(&payload)
}

/// Decode a WIF string or a minikey.
///
/// BIP38-encrypted keys are rejected; decrypt them with `bip38::decrypt`.
pub fn decode(text: &str, params: &ChainParams) -> Result<ImportedKey, PrimitivesError> {
    if bip38::is_bip38_key(text) {
        return Err(PrimitivesError::InvalidWif(
            "key is BIP38 encrypted".to_string(),
        ));
    }
    if is_minikey(text) {
        return Ok(ImportedKey {
            script_type: ScriptType::P2pkh,
            key: minikey_to_private_key(text)?,
            compressed: false,
        });
    }

    let vch = base58::check_decode(text)?;
    if vch.len() != 33 && vch.len() != 34 {
        return Err(PrimitivesError::InvalidWif(format!(
            "key has invalid length {}",
            vch.len()
        )));
    }
    let offset = vch[0] as i16 - params.wif_prefix as i16;
    let script_type = match ScriptType::from_value(offset) {
        Some(t @ (ScriptType::P2pkh | ScriptType::P2sh | ScriptType::P2pk)) => t,
        _ => {
            return Err(PrimitivesError::InvalidWif(format!(
                "unexpected version byte {:#04x}",
                vch[0]
            )))
        }
    };
    let compressed = vch.len() == 34;
    if compressed && vch[33] != 0x01 {
        return Err(PrimitivesError::InvalidWif(format!(
            "length suggests compressed pubkey, but last byte is {:#04x} != 0x01",
            vch[33]
        )));
    }
    Ok(ImportedKey {
        script_type,
        key: PrivateKey::from_bytes(&vch[1..33])?,
        compressed,
    })
}

/// True if `text` decodes as an unencrypted private key.
pub fn is_private_key(text: &str, params: &ChainParams) -> bool {
    decode(text, params).is_ok()
}

/// A minikey starts with `S`, is base58, at least 20 characters long, and
/// `sha256(text + "?")` begins with a zero byte.
pub fn is_minikey(text: &str) -> bool {
    text.len() >= 20
        && text.starts_with('S')
        && base58::is_base58(text)
        && sha256(format!("{text}?").as_bytes())[0] == 0x00
}

/// The minikey's private key is `sha256(text)`, always used uncompressed.
pub fn minikey_to_private_key(text: &str) -> Result<PrivateKey, PrimitivesError> {
    if !is_minikey(text) {
        return Err(PrimitivesError::InvalidMinikey);
    }
    PrivateKey::from_bytes(&sha256(text.as_bytes()))
}
