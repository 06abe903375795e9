//! Per-network version bytes and text prefixes.
//!
//! Every function that needs a version byte or prefix takes a
//! `&ChainParams` argument. There is no process-wide "current network".

use serde::{Deserialize, Serialize};

/// Which network a parameter table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Version bytes, prefixes and headers for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: Network,
    /// Legacy Base58 version byte for P2PKH addresses.
    pub addrtype_p2pkh: u8,
    /// Legacy Base58 version byte for P2SH addresses.
    pub addrtype_p2sh: u8,
    /// WIF version byte before the script-type offset is added.
    pub wif_prefix: u8,
    /// CashAddr human-readable prefix for eCash.
    pub cashaddr_prefix: String,
    /// CashAddr prefix for the BCH chain, still accepted on input.
    pub cashaddr_prefix_bch: String,
    /// BIP32 serialization header for private extended keys.
    pub xprv_header: u32,
    /// BIP32 serialization header for public extended keys.
    pub xpub_header: u32,
    /// BIP44 coin type used by `bip44_derivation`.
    pub bip44_coin_type: u32,
    /// Prefix hashed in front of signed messages.
    pub message_magic: String,
}

impl ChainParams {
    /// eCash mainnet.
    pub fn mainnet() -> Self {
        ChainParams {
            network: Network::Mainnet,
            addrtype_p2pkh: 0x00,
            addrtype_p2sh: 0x05,
            wif_prefix: 0x80,
            cashaddr_prefix: "ecash".to_string(),
            cashaddr_prefix_bch: "bitcoincash".to_string(),
            xprv_header: 0x0488_ade4,
            xpub_header: 0x0488_b21e,
            bip44_coin_type: 899,
            message_magic: "eCash Signed Message:\n".to_string(),
        }
    }

    /// eCash testnet.
    pub fn testnet() -> Self {
        ChainParams {
            network: Network::Testnet,
            addrtype_p2pkh: 0x6f,
            addrtype_p2sh: 0xc4,
            wif_prefix: 0xef,
            cashaddr_prefix: "ectest".to_string(),
            cashaddr_prefix_bch: "bchtest".to_string(),
            xprv_header: 0x0435_8394,
            xpub_header: 0x0435_87cf,
            bip44_coin_type: 1,
            message_magic: "eCash Signed Message:\n".to_string(),
        }
    }

    /// eCash regtest. Shares testnet version bytes.
    pub fn regtest() -> Self {
        ChainParams {
            network: Network::Regtest,
            cashaddr_prefix: "ecregtest".to_string(),
            cashaddr_prefix_bch: "bchreg".to_string(),
            ..Self::testnet()
        }
    }

    /// Mainnet parameters with BCH-era message magic and coin type.
    pub fn bch_mainnet() -> Self {
        ChainParams {
            bip44_coin_type: 145,
            message_magic: "Bitcoin Signed Message:\n".to_string(),
            ..Self::mainnet()
        }
    }

    /// The BIP44 account path `m/44'/coin'/account'` for this network.
    pub fn bip44_derivation(&self, account: u32) -> String {
        format!("m/44'/{}'/{}'", self.bip44_coin_type, account)
    }

    /// Both CashAddr prefixes accepted when parsing on this network.
    pub fn cashaddr_prefixes(&self) -> [&str; 2] {
        [&self.cashaddr_prefix, &self.cashaddr_prefix_bch]
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bip44_paths() {
        assert_eq!(ChainParams::mainnet().bip44_derivation(0), "m/44'/899'/0'");
        assert_eq!(ChainParams::bch_mainnet().bip44_derivation(2), "m/44'/145'/2'");
        assert_eq!(ChainParams::testnet().bip44_derivation(0), "m/44'/1'/0'");
    }

    /// Parameter tables load from JSON so callers can configure custom chains.
    #[test]
    fn test_json_roundtrip() {
        let params = ChainParams::regtest();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"network\":\"regtest\""));
        let back: ChainParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
        assert_eq!(back.addrtype_p2pkh, 0x6f);
    }
}
