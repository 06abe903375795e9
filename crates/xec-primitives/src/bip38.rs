//! BIP38 passphrase-protected private keys.
//!
//! Both key kinds are supported:
//!
//! - non-EC-multiply (`6P` + flag 0xC0/0xE0): the key itself is AES-256
//!   encrypted with a scrypt-derived key, salted by the address hash;
//! - EC-multiply (flag bits 0x20/0x04): the key is `passfactor * factorb`,
//!   where `factorb` is recovered from the encrypted seed. These can be
//!   generated without knowing the final key.
//!
//! A wrong passphrase is detected by the address-hash check and reported
//! as `InvalidPassword`, never as a parse error.

use rand::rngs::OsRng;
use rand::RngCore;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use crate::aes::{ecb_decrypt, ecb_encrypt};
use crate::base58;
use crate::chain_params::ChainParams;
use crate::ec::curve::{scalar_reduce, scalar_to_bytes};
use crate::ec::{PrivateKey, PublicKey};
use crate::hash::{hash160, sha256d};
use crate::script_type::ScriptType;
use crate::wif::{self, ImportedKey};
use crate::PrimitivesError;

const ENCODED_LEN: usize = 39;
const TYPE_NON_EC: u8 = 0x42;
const TYPE_EC: u8 = 0x43;

/// Which BIP38 construction a key uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bip38Kind {
    NonEcMultiply,
    EcMultiply,
}

/// A decoded (still encrypted) BIP38 key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip38Key {
    encoded: String,
    raw: [u8; ENCODED_LEN],
    kind: Bip38Kind,
    compressed: bool,
    has_lot_sequence: bool,
}

impl Bip38Key {
    /// Parse a `6P...` string.
    pub fn parse(text: &str) -> Result<Self, PrimitivesError> {
        let text = text.trim();
        if !text.starts_with("6P") {
            return Err(PrimitivesError::InvalidBip38("expected a '6P' prefix".to_string()));
        }
        let dec = base58::check_decode(text)?;
        let raw: [u8; ENCODED_LEN] = dec.as_slice().try_into().map_err(|_| {
            PrimitivesError::InvalidBip38(format!(
                "decoded length should be {ENCODED_LEN}, is {}",
                dec.len()
            ))
        })?;

        let flag = raw[2];
        let (kind, compressed, has_lot_sequence) = match (raw[0], raw[1]) {
            (0x01, TYPE_NON_EC) => {
                if flag != 0xe0 && flag != 0xc0 {
                    return Err(PrimitivesError::InvalidBip38(
                        "invalid compression flag".to_string(),
                    ));
                }
                (Bip38Kind::NonEcMultiply, flag == 0xe0, false)
            }
            (0x01, TYPE_EC) => {
                if flag & 0x24 != flag {
                    return Err(PrimitivesError::InvalidBip38(
                        "invalid EC-multiply flag".to_string(),
                    ));
                }
                (Bip38Kind::EcMultiply, flag & 0x20 != 0, flag & 0x04 != 0)
            }
            _ => return Err(PrimitivesError::InvalidBip38("unknown key type".to_string())),
        };

        Ok(Bip38Key {
            encoded: text.to_string(),
            raw,
            kind,
            compressed,
            has_lot_sequence,
        })
    }

    pub fn kind(&self) -> Bip38Kind {
        self.kind
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Lot number, for EC-multiply keys created with lot/sequence.
    pub fn lot(&self) -> Option<u32> {
        self.has_lot_sequence.then(|| {
            let e = self.entropy();
            e[4] as u32 * 4096 + e[5] as u32 * 16 + e[6] as u32 / 16
        })
    }

    pub fn sequence(&self) -> Option<u32> {
        self.has_lot_sequence.then(|| {
            let e = self.entropy();
            (e[6] as u32 & 0x0f) * 256 + e[7] as u32
        })
    }

    fn address_hash(&self) -> &[u8] {
        &self.raw[3..7]
    }

    fn owner_salt(&self) -> &[u8] {
        if self.has_lot_sequence {
            &self.raw[7..11]
        } else {
            &self.raw[7..15]
        }
    }

    fn entropy(&self) -> &[u8] {
        &self.raw[7..15]
    }

    /// Encrypt a key (non-EC-multiply).
    pub fn encrypt(
        key: &PrivateKey,
        compressed: bool,
        passphrase: &str,
        params: &ChainParams,
    ) -> Result<Self, PrimitivesError> {
        let address = legacy_p2pkh_address(&key.public_key(compressed), params);
        let addr_hash = &sha256d(address.as_bytes())[..4];
        let derived = scrypt_kdf(normalize(passphrase).as_bytes(), addr_hash, 14, 8, 8, 64)?;
        let (half1, half2) = derived.split_at(32);
        let half2: [u8; 32] = half2.try_into().map_err(|_| internal("derived key"))?;

        let key_bytes = key.to_bytes();
        let xored: Vec<u8> = key_bytes.iter().zip(half1).map(|(k, d)| k ^ d).collect();
        let encrypted = ecb_encrypt(&half2, &xored)?;

        let mut raw = Vec::with_capacity(ENCODED_LEN);
        raw.extend_from_slice(&[0x01, TYPE_NON_EC, if compressed { 0xe0 } else { 0xc0 }]);
        raw.extend_from_slice(addr_hash);
        raw.extend_from_slice(&encrypted);
        Self::parse(&base58::check_encode(&raw))
    }

    /// Generate a fresh EC-multiply key for `passphrase`.
    ///
    /// `lot_sequence` (lot in `0..=1048575`, sequence in `0..=4095`) is
    /// embedded in the owner entropy when given.
    pub fn create_ec_mult(
        passphrase: &str,
        lot_sequence: Option<(u32, u32)>,
        compressed: bool,
        params: &ChainParams,
    ) -> Result<Self, PrimitivesError> {
        let passphrase = normalize(passphrase);
        let mut owner_entropy = [0u8; 8];
        let owner_salt: Vec<u8> = match lot_sequence {
            None => {
                OsRng.fill_bytes(&mut owner_entropy);
                owner_entropy.to_vec()
            }
            Some((lot, seq)) => {
                if lot > 1_048_575 || seq > 4095 {
                    return Err(PrimitivesError::InvalidBip38(
                        "lot or sequence out of range".to_string(),
                    ));
                }
                OsRng.fill_bytes(&mut owner_entropy[..4]);
                owner_entropy[4..].copy_from_slice(&(lot * 4096 + seq).to_be_bytes());
                owner_entropy[..4].to_vec()
            }
        };

        let prefactor = scrypt_kdf(passphrase.as_bytes(), &owner_salt, 14, 8, 8, 32)?;
        let passfactor = if lot_sequence.is_some() {
            sha256d(&[prefactor.as_slice(), &owner_entropy[..]].concat())
        } else {
            to_array32(&prefactor)?
        };
        let passpoint = PrivateKey::from_bytes(&passfactor)?.pub_key();

        let mut seedb = [0u8; 24];
        OsRng.fill_bytes(&mut seedb);
        let factorb = scalar_reduce(&sha256d(&seedb));
        let point = passpoint.to_projective_point()? * factorb;
        let generated = PublicKey::from_projective(&point, compressed)?;
        let address = legacy_p2pkh_address(&generated, params);
        let addr_hash = sha256d(address.as_bytes());

        let salt = [&addr_hash[..4], &owner_entropy[..]].concat();
        let derived = scrypt_kdf(&passpoint.to_compressed(), &salt, 10, 1, 1, 64)?;
        let half2 = to_array32(&derived[32..])?;

        let part1_in: Vec<u8> = seedb[..16].iter().zip(&derived[..16]).map(|(a, b)| a ^ b).collect();
        let encrypted1 = ecb_encrypt(&half2, &part1_in)?;
        let part2_in: Vec<u8> = encrypted1[8..]
            .iter()
            .chain(&seedb[16..])
            .zip(&derived[16..32])
            .map(|(a, b)| a ^ b)
            .collect();
        let encrypted2 = ecb_encrypt(&half2, &part2_in)?;

        let mut flag = if compressed { 0x20 } else { 0x00 };
        if lot_sequence.is_some() {
            flag |= 0x04;
        }
        let mut raw = Vec::with_capacity(ENCODED_LEN);
        raw.extend_from_slice(&[0x01, TYPE_EC, flag]);
        raw.extend_from_slice(&addr_hash[..4]);
        raw.extend_from_slice(&owner_entropy);
        raw.extend_from_slice(&encrypted1[..8]);
        raw.extend_from_slice(&encrypted2);
        Self::parse(&base58::check_encode(&raw))
    }

    /// Decrypt with `passphrase`.
    ///
    /// # Returns
    /// A P2PKH `ImportedKey`, or `InvalidPassword` if the recovered key
    /// does not hash to the stored address hash.
    pub fn decrypt(
        &self,
        passphrase: &str,
        params: &ChainParams,
    ) -> Result<ImportedKey, PrimitivesError> {
        let passphrase = normalize(passphrase);
        let key = match self.kind {
            Bip38Kind::NonEcMultiply => self.decrypt_non_ec(&passphrase)?,
            Bip38Kind::EcMultiply => self.decrypt_ec(&passphrase)?,
        };

        let address = legacy_p2pkh_address(&key.public_key(self.compressed), params);
        if &sha256d(address.as_bytes())[..4] != self.address_hash() {
            return Err(PrimitivesError::InvalidPassword);
        }
        Ok(ImportedKey {
            script_type: ScriptType::P2pkh,
            key,
            compressed: self.compressed,
        })
    }

    fn decrypt_non_ec(&self, passphrase: &str) -> Result<PrivateKey, PrimitivesError> {
        let derived = scrypt_kdf(passphrase.as_bytes(), self.address_hash(), 14, 8, 8, 64)?;
        let half2 = to_array32(&derived[32..])?;
        let decrypted = ecb_decrypt(&half2, &self.raw[7..39])?;
        let key_bytes: Vec<u8> = decrypted.iter().zip(&derived[..32]).map(|(a, b)| a ^ b).collect();
        PrivateKey::from_bytes(&key_bytes).map_err(|_| PrimitivesError::InvalidPassword)
    }

    fn decrypt_ec(&self, passphrase: &str) -> Result<PrivateKey, PrimitivesError> {
        let prefactor = scrypt_kdf(passphrase.as_bytes(), self.owner_salt(), 14, 8, 8, 32)?;
        let passfactor = if self.has_lot_sequence {
            sha256d(&[prefactor.as_slice(), self.entropy()].concat())
        } else {
            to_array32(&prefactor)?
        };
        let passpoint = PrivateKey::from_bytes(&passfactor)
            .map_err(|_| PrimitivesError::InvalidPassword)?
            .pub_key();

        let salt = [self.address_hash(), self.entropy()].concat();
        let derived = scrypt_kdf(&passpoint.to_compressed(), &salt, 10, 1, 1, 64)?;
        let half2 = to_array32(&derived[32..])?;

        let part2: Vec<u8> = ecb_decrypt(&half2, &self.raw[23..39])?
            .iter()
            .zip(&derived[16..32])
            .map(|(a, b)| a ^ b)
            .collect();
        let encrypted1 = [&self.raw[15..23], &part2[..8]].concat();
        let part1: Vec<u8> = ecb_decrypt(&half2, &encrypted1)?
            .iter()
            .zip(&derived[..16])
            .map(|(a, b)| a ^ b)
            .collect();

        let seedb = [&part1[..16], &part2[8..]].concat();
        let factorb = scalar_reduce(&sha256d(&seedb));
        let key = scalar_reduce(&passfactor) * factorb;
        if bool::from(key.is_zero()) {
            return Err(PrimitivesError::InvalidPassword);
        }
        PrivateKey::from_bytes(&scalar_to_bytes(&key))
    }
}

impl std::fmt::Display for Bip38Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// True if `text` parses as a BIP38 key. Needs no passphrase.
pub fn is_bip38_key(text: &str) -> bool {
    Bip38Key::parse(text).is_ok()
}

/// Encrypt a P2PKH WIF key.
pub fn encrypt_wif(
    wif_text: &str,
    passphrase: &str,
    params: &ChainParams,
) -> Result<Bip38Key, PrimitivesError> {
    let imported = wif::decode(wif_text, params)?;
    if imported.script_type != ScriptType::P2pkh {
        return Err(PrimitivesError::InvalidBip38(
            "only p2pkh keys may be BIP38 encrypted".to_string(),
        ));
    }
    Bip38Key::encrypt(&imported.key, imported.compressed, passphrase, params)
}

/// Decrypt a `6P...` string to its WIF text.
pub fn decrypt_to_wif(
    text: &str,
    passphrase: &str,
    params: &ChainParams,
) -> Result<String, PrimitivesError> {
    let key = Bip38Key::parse(text)?.decrypt(passphrase, params)?;
    Ok(wif::encode(&key.key, key.compressed, key.script_type, params))
}

fn normalize(passphrase: &str) -> String {
    passphrase.nfc().collect()
}

/// The Base58 P2PKH address string BIP38 salts with.
fn legacy_p2pkh_address(pub_key: &PublicKey, params: &ChainParams) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(params.addrtype_p2pkh);
    payload.extend_from_slice(&hash160(&pub_key.to_bytes()));
    base58::check_encode(&payload)
}

fn scrypt_kdf(
    password: &[u8],
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, PrimitivesError> {
    let params = scrypt::Params::new(log_n, r, p, len)
        .map_err(|e| PrimitivesError::EncryptionError(e.to_string()))?;
    let mut out = Zeroizing::new(vec![0u8; len]);
    scrypt::scrypt(password, salt, &params, &mut out[..])
        .map_err(|e| PrimitivesError::EncryptionError(e.to_string()))?;
    Ok(out)
}

fn to_array32(bytes: &[u8]) -> Result<[u8; 32], PrimitivesError> {
    bytes.try_into().map_err(|_| internal("32-byte slice"))
}

fn internal(what: &str) -> PrimitivesError {
    PrimitivesError::Other(format!("unexpected length for {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mainnet() -> ChainParams {
        ChainParams::mainnet()
    }

    #[test]
    fn test_non_ec_uncompressed_vector() {
        let enc = "6PRVWUbkzzsbcVac2qwfssoUJAN1Xhrg6bNk8J7Nzm5H7kxEbn2Nh2ZoGg";
        let wif = "5KN7MzqK5wt2TP1fQCYyHBtDrXdJuXbUzm4A9rKAteGu3Qi5CVR";
        assert_eq!(
            decrypt_to_wif(enc, "TestingOneTwoThree", &mainnet()).unwrap(),
            wif
        );
        assert_eq!(
            encrypt_wif(wif, "TestingOneTwoThree", &mainnet()).unwrap().as_str(),
            enc
        );
    }

    #[test]
    fn test_non_ec_compressed_vector() {
        let enc = "6PYNKZ1EAgYgmQfmNVamxyXVWHzK5s6DGhwP4J5o44cvXdoY7sRzhtpUeo";
        let wif = "L44B5gGEpqEDRS9vVPz7QT35jcBG2r3CZwSwQ4fCewXAhAhqGVpP";
        let key = Bip38Key::parse(enc).unwrap();
        assert_eq!(key.kind(), Bip38Kind::NonEcMultiply);
        assert!(key.is_compressed());
        assert_eq!(
            decrypt_to_wif(enc, "TestingOneTwoThree", &mainnet()).unwrap(),
            wif
        );
        assert_eq!(
            encrypt_wif(wif, "TestingOneTwoThree", &mainnet()).unwrap().as_str(),
            enc
        );
    }

    #[test]
    fn test_ec_multiply_vectors() {
        let plain = Bip38Key::parse("6PfQu77ygVyJLZjfvMLyhLMQbYnu5uguoJJ4kMCLqWwPEdfpwANVS76gTX")
            .unwrap();
        assert_eq!(plain.kind(), Bip38Kind::EcMultiply);
        assert_eq!(plain.lot(), None);
        let key = plain.decrypt("TestingOneTwoThree", &mainnet()).unwrap();
        assert_eq!(
            wif::encode(&key.key, key.compressed, key.script_type, &mainnet()),
            "5K4caxezwjGCGfnoPTZ8tMcJBLB7Jvyjv4xxeacadhq8nLisLR2"
        );

        let lot = Bip38Key::parse("6PgNBNNzDkKdhkT6uJntUXwwzQV8Rr2tZcbkDcuC9DZRsS6AtHts4Ypo1j")
            .unwrap();
        assert_eq!(lot.lot(), Some(263183));
        assert_eq!(lot.sequence(), Some(1));
        assert_eq!(
            decrypt_to_wif(lot.as_str(), "MOLON LABE", &mainnet()).unwrap(),
            "5JLdxTtcTHcfYcmJsNVy1v2PMDx432JPoYcBTVVRHpPaxUrdtf8"
        );
    }

    #[test]
    fn test_wrong_passphrase_is_invalid_password() {
        for enc in [
            "6PYNKZ1EAgYgmQfmNVamxyXVWHzK5s6DGhwP4J5o44cvXdoY7sRzhtpUeo",
            "6PfQu77ygVyJLZjfvMLyhLMQbYnu5uguoJJ4kMCLqWwPEdfpwANVS76gTX",
        ] {
            assert!(matches!(
                Bip38Key::parse(enc).unwrap().decrypt("wrong", &mainnet()),
                Err(PrimitivesError::InvalidPassword)
            ));
        }
    }

    #[test]
    fn test_created_ec_mult_key_decrypts() {
        let created = Bip38Key::create_ec_mult("correct horse", Some((7, 9)), true, &mainnet())
            .unwrap();
        assert!(created.as_str().starts_with("6Po"));
        assert_eq!(created.lot(), Some(7));
        assert_eq!(created.sequence(), Some(9));
        let key = created.decrypt("correct horse", &mainnet()).unwrap();
        assert!(key.compressed);
        assert!(matches!(
            created.decrypt("battery staple", &mainnet()),
            Err(PrimitivesError::InvalidPassword)
        ));
    }

    #[test]
    fn test_parse_rejects_non_bip38() {
        assert!(!is_bip38_key("5KN7MzqK5wt2TP1fQCYyHBtDrXdJuXbUzm4A9rKAteGu3Qi5CVR"));
        assert!(!is_bip38_key("6Pnot-base58"));
        assert!(is_bip38_key("6PRVWUbkzzsbcVac2qwfssoUJAN1Xhrg6bNk8J7Nzm5H7kxEbn2Nh2ZoGg"));
        let wif_p2sh = "LgXW2Y5GXd8GfKikUTQkQynC1zaBfpBBjP8z6YCV2M5VxaMBQ5C1";
        assert!(matches!(
            encrypt_wif(wif_p2sh, "x", &mainnet()),
            Err(PrimitivesError::InvalidBip38(_))
        ));
    }
}
