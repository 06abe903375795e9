//! eCash address handling.
//!
//! An address is a 20-byte hash plus a kind (P2PKH or P2SH). It converts
//! to and from CashAddr (eCash and BCH prefixes) and legacy Base58Check
//! text, with the version bytes and prefixes taken from a `ChainParams`.
//! Formatted strings are cached per format and network.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use xec_primitives::base58;
use xec_primitives::ec::is_pubkey_shape;
use xec_primitives::hash::{hash160, sha256};
use xec_primitives::ChainParams;

use crate::cashaddr::{self, CashAddrType};
use crate::script::Script;
use crate::ScriptError;

/// Length of the hash an address commits to.
pub const HASH160_LEN: usize = 20;

/// Legacy strings are at most this long; anything longer is parsed as CashAddr.
const MAX_LEGACY_LEN: usize = 35;

/// What the address hash commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressKind {
    P2pkh,
    P2sh,
}

/// Text encodings an address can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFormat {
    /// CashAddr with the eCash prefix.
    CashAddr,
    /// CashAddr with the BCH prefix, for converters and hardware wallets.
    CashAddrBch,
    /// Base58Check with a version byte.
    Legacy,
}

/// A P2PKH or P2SH address.
///
/// Immutable once built. Equality, ordering and hashing consider only the
/// kind and hash; the string cache is invisible.
pub struct Address {
    hash160: [u8; HASH160_LEN],
    kind: AddressKind,
    cache: Mutex<HashMap<(AddressFormat, String), String>>,
}

impl Address {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Build an address from a hash of any length.
    ///
    /// # Returns
    /// The address, or `InvalidHashLength` if `hash` is not 20 bytes.
    pub fn new(hash: &[u8], kind: AddressKind) -> Result<Self, ScriptError> {
        let hash160: [u8; HASH160_LEN] = hash
            .try_into()
            .map_err(|_| ScriptError::InvalidHashLength(hash.len()))?;
        Ok(Self::from_hash(hash160, kind))
    }

    fn from_hash(hash160: [u8; HASH160_LEN], kind: AddressKind) -> Self {
        Address {
            hash160,
            kind,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A P2PKH address for a public key hash.
    pub fn from_p2pkh_hash(hash: [u8; HASH160_LEN]) -> Self {
        Self::from_hash(hash, AddressKind::P2pkh)
    }

    /// A P2SH address for a script hash.
    pub fn from_p2sh_hash(hash: [u8; HASH160_LEN]) -> Self {
        Self::from_hash(hash, AddressKind::P2sh)
    }

    /// The P2PKH address of a serialized public key.
    ///
    /// # Arguments
    /// * `pubkey` - 33-byte compressed or 65-byte uncompressed key bytes.
    ///
    /// # Returns
    /// The address, or `InvalidPublicKey` for any other shape.
    pub fn from_pubkey(pubkey: &[u8]) -> Result<Self, ScriptError> {
        if !is_pubkey_shape(pubkey) {
            return Err(ScriptError::InvalidPublicKey(hex::encode(pubkey)));
        }
        Ok(Self::from_p2pkh_hash(hash160(pubkey)))
    }

    /// The P2SH address of a redeem script.
    pub fn from_multisig_script(redeem_script: &Script) -> Self {
        Self::from_p2sh_hash(hash160(redeem_script.as_bytes()))
    }

    /// Parse a CashAddr string, with or without its prefix.
    ///
    /// A prefixed string must use one of the network's two prefixes. A bare
    /// payload is tried against the eCash prefix, then the BCH prefix.
    pub fn from_cashaddr_string(text: &str, params: &ChainParams) -> Result<Self, ScriptError> {
        let (_, kind, hash) = if text.contains(':') {
            let decoded = cashaddr::decode(text)?;
            if !params.cashaddr_prefixes().contains(&decoded.0.as_str()) {
                return Err(ScriptError::CashAddrUnexpectedPrefix(decoded.0));
            }
            decoded
        } else {
            let mut first_err = None;
            let mut found = None;
            for prefix in params.cashaddr_prefixes() {
                match cashaddr::decode(&format!("{prefix}:{text}")) {
                    Ok(decoded) => {
                        found = Some(decoded);
                        break;
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            match (found, first_err) {
                (Some(decoded), _) => decoded,
                (None, Some(e)) => return Err(e),
                (None, None) => return Err(ScriptError::CashAddrMissingPrefix),
            }
        };
        let kind = match kind {
            CashAddrType::PubKey => AddressKind::P2pkh,
            CashAddrType::Script => AddressKind::P2sh,
        };
        Self::new(&hash, kind)
    }

    /// Parse an address in any supported format.
    ///
    /// Strings longer than 35 characters are CashAddr (prefixed or not);
    /// shorter ones are legacy Base58Check.
    ///
    /// # Arguments
    /// * `text` - The address text.
    /// * `params` - Network whose prefixes and version bytes are accepted.
    ///
    /// # Returns
    /// The address, or a typed error naming what failed: a CashAddr
    /// condition, `Primitives(ChecksumMismatch)` for a legacy checksum, or
    /// `InvalidAddress` for an unknown version byte or length.
    pub fn from_string(text: &str, params: &ChainParams) -> Result<Self, ScriptError> {
        if text.len() > MAX_LEGACY_LEN {
            return Self::from_cashaddr_string(text, params);
        }
        let raw = base58::check_decode(text)?;
        if raw.len() != 1 + HASH160_LEN {
            return Err(ScriptError::InvalidAddress(format!(
                "{text}: payload is {} bytes",
                raw.len()
            )));
        }
        let kind = if raw[0] == params.addrtype_p2pkh {
            AddressKind::P2pkh
        } else if raw[0] == params.addrtype_p2sh {
            AddressKind::P2sh
        } else {
            return Err(ScriptError::InvalidAddress(format!(
                "unknown version byte {}",
                raw[0]
            )));
        };
        Self::new(&raw[1..], kind)
    }

    /// True if `text` parses as an address on this network.
    pub fn is_valid(text: &str, params: &ChainParams) -> bool {
        Self::from_string(text, params).is_ok()
    }

    /// True if `text` is a legacy Base58Check address on this network.
    pub fn is_legacy(text: &str, params: &ChainParams) -> bool {
        match base58::check_decode(text) {
            Ok(raw) => {
                raw.len() == 1 + HASH160_LEN
                    && (raw[0] == params.addrtype_p2pkh || raw[0] == params.addrtype_p2sh)
            }
            Err(_) => false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn hash160(&self) -> &[u8; HASH160_LEN] {
        &self.hash160
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    fn cashaddr_type(&self) -> CashAddrType {
        match self.kind {
            AddressKind::P2pkh => CashAddrType::PubKey,
            AddressKind::P2sh => CashAddrType::Script,
        }
    }

    fn legacy_version(&self, params: &ChainParams) -> u8 {
        match self.kind {
            AddressKind::P2pkh => params.addrtype_p2pkh,
            AddressKind::P2sh => params.addrtype_p2sh,
        }
    }

    fn prefix_for<'a>(format: AddressFormat, params: &'a ChainParams) -> &'a str {
        match format {
            AddressFormat::CashAddrBch => &params.cashaddr_prefix_bch,
            _ => &params.cashaddr_prefix,
        }
    }

    /// Render in `format`. CashAddr formats are produced without the prefix.
    pub fn to_string(&self, format: AddressFormat, params: &ChainParams) -> String {
        let tag = match format {
            AddressFormat::Legacy => format!(
                "{}/{}",
                params.addrtype_p2pkh, params.addrtype_p2sh
            ),
            _ => Self::prefix_for(format, params).to_string(),
        };
        let key = (format, tag);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(text) = cache.get(&key) {
            return text.clone();
        }
        let text = match format {
            AddressFormat::Legacy => {
                let mut payload = Vec::with_capacity(1 + HASH160_LEN);
                payload.push(self.legacy_version(params));
                payload.extend_from_slice(&self.hash160);
                base58::check_encode(&payload)
            }
            _ => {
                let prefix = Self::prefix_for(format, params);
                // A 20-byte hash always has a CashAddr size code.
                cashaddr::encode(prefix, self.cashaddr_type(), &self.hash160)
                    .unwrap_or_default()
            }
        };
        cache.insert(key, text.clone());
        text
    }

    /// Render in `format`, with the `prefix:` for CashAddr formats.
    pub fn to_full_string(&self, format: AddressFormat, params: &ChainParams) -> String {
        let text = self.to_string(format, params);
        match format {
            AddressFormat::Legacy => text,
            _ => format!("{}:{}", Self::prefix_for(format, params), text),
        }
    }

    /// Prefixed eCash CashAddr, the form shown to users.
    pub fn to_ui_string(&self, params: &ChainParams) -> String {
        self.to_full_string(AddressFormat::CashAddr, params)
    }

    /// Legacy text, the form used in wallet storage.
    pub fn to_storage_string(&self, params: &ChainParams) -> String {
        self.to_string(AddressFormat::Legacy, params)
    }

    // -----------------------------------------------------------------------
    // Scripts
    // -----------------------------------------------------------------------

    /// The output script paying to this address.
    pub fn to_script(&self) -> Script {
        match self.kind {
            AddressKind::P2pkh => Script::p2pkh(&self.hash160),
            AddressKind::P2sh => Script::p2sh(&self.hash160),
        }
    }

    pub fn to_script_hex(&self) -> String {
        self.to_script().to_hex()
    }

    /// SHA-256 of the output script, as indexed by Electrum-protocol servers.
    pub fn to_scripthash(&self) -> [u8; 32] {
        sha256(self.to_script().as_bytes())
    }

    /// The script hash in display (byte-reversed) hex.
    pub fn to_scripthash_hex(&self) -> String {
        let mut hash = self.to_scripthash();
        hash.reverse();
        hex::encode(hash)
    }
}

impl Clone for Address {
    fn clone(&self) -> Self {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Address {
            hash160: self.hash160,
            kind: self.kind,
            cache: Mutex::new(cache),
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.hash160 == other.hash160
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.hash160.hash(state);
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.kind, self.hash160).cmp(&(other.kind, other.hash160))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:?}, {})", self.kind, hex::encode(self.hash160))
    }
}

#[cfg(test)]
mod tests {
    //! Tests for address parsing and rendering.
    //!
    //! Vectors use the published CashAddr hash f5bf48b3...dac9.

    use super::*;
    use xec_primitives::PrimitivesError;

    const HASH: &str = "f5bf48b397dae70be82b3cca4793f8eb2b6cdac9";

    fn hash() -> [u8; 20] {
        hex::decode(HASH).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_render_all_formats() {
        let params = ChainParams::mainnet();
        let p2pkh = Address::from_p2pkh_hash(hash());
        assert_eq!(
            p2pkh.to_full_string(AddressFormat::CashAddr, &params),
            "ecash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyx54vzvwa"
        );
        assert_eq!(
            p2pkh.to_string(AddressFormat::CashAddr, &params),
            "qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyx54vzvwa"
        );
        assert_eq!(
            p2pkh.to_full_string(AddressFormat::CashAddrBch, &params),
            "bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2"
        );
        assert_eq!(
            p2pkh.to_storage_string(&params),
            "1PQPheJQSauxRPTxzNMUco1XmoCyPoEJCp"
        );

        let p2sh = Address::from_p2sh_hash(hash());
        assert_eq!(
            p2sh.to_ui_string(&params),
            "ecash:pr6m7j9njldwwzlg9v7v53unlr4jkmx6ey33gr904q"
        );
        assert_eq!(
            p2sh.to_string(AddressFormat::Legacy, &params),
            "3Q6QdBnqzVELWZAQ7U253RNTvKVgz7Cfqm"
        );
    }

    #[test]
    fn test_cache_is_per_network() {
        let addr = Address::from_p2pkh_hash(hash());
        let main = addr.to_string(AddressFormat::Legacy, &ChainParams::mainnet());
        let test = addr.to_string(AddressFormat::Legacy, &ChainParams::testnet());
        assert_eq!(main, "1PQPheJQSauxRPTxzNMUco1XmoCyPoEJCp");
        assert_eq!(test, "n3vLzhPPFcMDCVwahwKrSiDrdnogPBjJCm");
        assert_eq!(
            addr.to_ui_string(&ChainParams::testnet()),
            "ectest:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyqltv9pdv"
        );
    }

    #[test]
    fn test_from_string_accepts_every_form() {
        let params = ChainParams::mainnet();
        let expected = Address::from_p2pkh_hash(hash());
        for text in [
            "ecash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyx54vzvwa",
            "qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyx54vzvwa",
            "bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2",
            "qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2",
            "1PQPheJQSauxRPTxzNMUco1XmoCyPoEJCp",
        ] {
            assert_eq!(Address::from_string(text, &params).unwrap(), expected, "{text}");
        }
        let p2sh = Address::from_string("3Q6QdBnqzVELWZAQ7U253RNTvKVgz7Cfqm", &params).unwrap();
        assert_eq!(p2sh.kind(), AddressKind::P2sh);
    }

    #[test]
    fn test_from_string_errors() {
        let params = ChainParams::mainnet();
        assert!(matches!(
            Address::from_string("ectest:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyqltv9pdv", &params),
            Err(ScriptError::CashAddrUnexpectedPrefix(_))
        ));
        assert!(matches!(
            Address::from_string("1PQPheJQSauxRPTxzNMUco1XmoCyPoEJCq", &params),
            Err(ScriptError::Primitives(PrimitivesError::ChecksumMismatch))
        ));
        // A testnet legacy address on mainnet.
        assert!(matches!(
            Address::from_string("n3vLzhPPFcMDCVwahwKrSiDrdnogPBjJCm", &params),
            Err(ScriptError::InvalidAddress(_))
        ));
        assert!(!Address::is_valid("qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyx54vzvwq", &params));
    }

    #[test]
    fn test_is_legacy() {
        let params = ChainParams::mainnet();
        assert!(Address::is_legacy("1PQPheJQSauxRPTxzNMUco1XmoCyPoEJCp", &params));
        assert!(!Address::is_legacy("qr6m7j9njldwwzlg9v7v53unlr4jkmx6eyx54vzvwa", &params));
    }

    #[test]
    fn test_hash_length_is_checked() {
        assert!(matches!(
            Address::new(&[0u8; 19], AddressKind::P2pkh),
            Err(ScriptError::InvalidHashLength(19))
        ));
        assert!(Address::new(&hash(), AddressKind::P2sh).is_ok());
    }

    #[test]
    fn test_from_pubkey() {
        let g = hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap();
        let addr = Address::from_pubkey(&g).unwrap();
        assert_eq!(hex::encode(addr.hash160()), "751e76e8199196d454941c45d1b3a323f1433bd6");
        assert!(matches!(
            Address::from_pubkey(&g[..32]),
            Err(ScriptError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_scripts_and_scripthash() {
        let addr = Address::from_p2pkh_hash(hash());
        assert_eq!(addr.to_script_hex(), format!("76a914{HASH}88ac"));
        assert_eq!(
            addr.to_scripthash_hex(),
            "5e4d53184dee17c7af1ba19cf1ee4dbd4a09e6973095d69573f5cd66ea8ba3d8"
        );
        let redeem = Script::multisig(1, &[vec![0x02; 33]]).unwrap();
        let p2sh = Address::from_multisig_script(&redeem);
        assert_eq!(p2sh.kind(), AddressKind::P2sh);
        assert_eq!(p2sh.to_script().p2sh_hash().unwrap(), hash160(redeem.as_bytes()));
    }

    #[test]
    fn test_equality_ignores_cache() {
        let a = Address::from_p2pkh_hash(hash());
        let b = a.clone();
        let _ = a.to_ui_string(&ChainParams::mainnet());
        assert_eq!(a, b);
        assert_ne!(a, Address::from_p2sh_hash(hash()));
    }
}
