//! CashAddr text encoding.
//!
//! `prefix:payload` where the payload is base32 over
//! `version byte ‖ hash` followed by a 40-bit BCH-code checksum that also
//! commits to the prefix. The version byte packs the address type in its
//! high bits and a hash-size code in its low three bits.

use crate::ScriptError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;

/// Address type carried in the version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CashAddrType {
    PubKey,
    Script,
}

impl CashAddrType {
    fn bits(self) -> u8 {
        match self {
            CashAddrType::PubKey => 0,
            CashAddrType::Script => 1,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(CashAddrType::PubKey),
            1 => Some(CashAddrType::Script),
            _ => None,
        }
    }
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u64 {
    const GEN: [u64; 5] = [
        0x98_f2bc_8e61,
        0x79_b76d_99e2,
        0xf3_3e5f_b3c4,
        0xae_2eab_e2a8,
        0x1e_4f43_e470,
    ];
    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        for (i, g) in GEN.iter().enumerate() {
            if (c0 >> i) & 1 == 1 {
                c ^= g;
            }
        }
    }
    c ^ 1
}

fn prefix_expand(prefix: &str) -> impl Iterator<Item = u8> + '_ {
    prefix.bytes().map(|b| b & 0x1f).chain(std::iter::once(0))
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, ScriptError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &v in data {
        acc = (acc << from) | v as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & maxv) as u8);
        }
        acc &= (1 << bits) - 1;
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || (acc << (to - bits)) & maxv != 0 {
        return Err(ScriptError::CashAddrPadding);
    }
    Ok(out)
}

fn size_code(hash_len: usize) -> Option<u8> {
    match hash_len {
        20 => Some(0),
        24 => Some(1),
        28 => Some(2),
        32 => Some(3),
        40 => Some(4),
        48 => Some(5),
        56 => Some(6),
        64 => Some(7),
        _ => None,
    }
}

/// Encode with the prefix, e.g. `ecash:qr6m...`.
pub fn encode_full(prefix: &str, kind: CashAddrType, hash: &[u8]) -> Result<String, ScriptError> {
    let size = size_code(hash.len()).ok_or(ScriptError::CashAddrInvalidLength(hash.len()))?;
    let mut raw = Vec::with_capacity(hash.len() + 1);
    raw.push(kind.bits() << 3 | size);
    raw.extend_from_slice(hash);
    let payload = convert_bits(&raw, 8, 5, true)?;

    let checksum = polymod(
        prefix_expand(prefix)
            .chain(payload.iter().copied())
            .chain([0u8; CHECKSUM_LEN]),
    );

    let mut out = String::with_capacity(prefix.len() + 1 + payload.len() + CHECKSUM_LEN);
    out.push_str(prefix);
    out.push(':');
    for d in &payload {
        out.push(CHARSET[*d as usize] as char);
    }
    for i in 0..CHECKSUM_LEN {
        let d = (checksum >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f;
        out.push(CHARSET[d as usize] as char);
    }
    Ok(out)
}

/// Encode without the prefix. The prefix still enters the checksum.
pub fn encode(prefix: &str, kind: CashAddrType, hash: &[u8]) -> Result<String, ScriptError> {
    let full = encode_full(prefix, kind, hash)?;
    Ok(full[prefix.len() + 1..].to_string())
}

/// Decode `prefix:payload` into `(prefix, type, hash)`.
///
/// The prefix is returned in lower case.
pub fn decode(text: &str) -> Result<(String, CashAddrType, Vec<u8>), ScriptError> {
    let has_lower = text.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = text.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(ScriptError::CashAddrMixedCase);
    }
    let text = text.to_ascii_lowercase();
    let (prefix, body) = text.rsplit_once(':').ok_or(ScriptError::CashAddrMissingPrefix)?;
    if prefix.is_empty() {
        return Err(ScriptError::CashAddrMissingPrefix);
    }

    let mut data = Vec::with_capacity(body.len());
    for c in body.chars() {
        let pos = CHARSET
            .iter()
            .position(|&x| x as char == c)
            .ok_or(ScriptError::CashAddrInvalidChar(c))?;
        data.push(pos as u8);
    }
    if data.len() <= CHECKSUM_LEN {
        return Err(ScriptError::CashAddrInvalidLength(data.len()));
    }
    if polymod(prefix_expand(prefix).chain(data.iter().copied())) != 0 {
        return Err(ScriptError::CashAddrChecksum);
    }

    let raw = convert_bits(&data[..data.len() - CHECKSUM_LEN], 5, 8, false)?;
    let (&version, hash) = raw
        .split_first()
        .ok_or(ScriptError::CashAddrInvalidLength(0))?;
    if version & 0x80 != 0 {
        return Err(ScriptError::CashAddrVersion(version));
    }
    let kind = CashAddrType::from_bits(version >> 3).ok_or(ScriptError::CashAddrVersion(version))?;
    if size_code(hash.len()) != Some(version & 0x07) {
        return Err(ScriptError::CashAddrInvalidLength(hash.len()));
    }
    Ok((prefix.to_string(), kind, hash.to_vec()))
}
