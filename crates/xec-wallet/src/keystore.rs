//! Keystores: where signing keys come from.
//!
//! A keystore recognizes the x_pubkeys in a transaction's open signature
//! slots, maps each to a `Derivation`, and hands out the private key for
//! it when given the right password. Keys are only handed to the signing
//! engine for the duration of one `sign_transaction` call.

use std::collections::{BTreeMap, HashMap};

use rand::RngCore;
use tracing::debug;
use xec_primitives::aes::constant_time_eq;
use xec_primitives::bip32::{ExtendedKey, EXTENDED_KEY_LEN};
use xec_primitives::ec::PrivateKey;
use xec_primitives::hash::sha256d;
use xec_primitives::{wif, ChainParams};
use xec_script::Address;
use xec_transaction::{KeyPairs, Transaction, XPubKey};
use zeroize::Zeroizing;

use crate::WalletError;

const SALT_LEN: usize = 16;

/// How a keystore locates the key for one x_pubkey.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Derivation {
    /// An imported key, by its serialized pubkey.
    Imported(Vec<u8>),
    /// `[change, index]` below the account xpub.
    Bip32([u32; 2]),
}

/// Salted `sha256d(password ‖ salt)` used to reject wrong passwords.
#[derive(Clone)]
pub struct PasswordCheck {
    salt: [u8; SALT_LEN],
    digest: [u8; 32],
}

impl PasswordCheck {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        PasswordCheck {
            digest: Self::digest(password, &salt),
            salt,
        }
    }

    fn digest(password: &str, salt: &[u8]) -> [u8; 32] {
        let mut buf = Zeroizing::new(Vec::with_capacity(password.len() + salt.len()));
        buf.extend_from_slice(password.as_bytes());
        buf.extend_from_slice(salt);
        sha256d(&buf)
    }

    pub fn verify(&self, password: Option<&str>) -> Result<(), WalletError> {
        match password {
            Some(pw) if constant_time_eq(&Self::digest(pw, &self.salt), &self.digest) => Ok(()),
            _ => Err(WalletError::InvalidPassword),
        }
    }
}

fn check(lock: &Option<PasswordCheck>, password: Option<&str>) -> Result<(), WalletError> {
    match lock {
        Some(lock) => lock.verify(password),
        None => Ok(()),
    }
}

/// A source of signing keys.
pub trait Keystore {
    fn is_watching_only(&self) -> bool;

    /// Fails with `InvalidPassword` unless `password` unlocks this keystore.
    fn check_password(&self, password: Option<&str>) -> Result<(), WalletError>;

    /// The derivation of `x_pubkey` if it belongs to this keystore.
    fn get_pubkey_derivation(&self, x_pubkey: &XPubKey) -> Option<Derivation>;

    /// The private key and its compression flag for `derivation`.
    fn get_private_key(
        &self,
        derivation: &Derivation,
        password: Option<&str>,
    ) -> Result<(PrivateKey, bool), WalletError>;

    /// Open slots of `tx` this keystore can fill, keyed by x_pubkey bytes.
    fn get_tx_derivations(&self, tx: &Transaction) -> HashMap<Vec<u8>, Derivation> {
        tx.inputs()
            .iter()
            .flat_map(|input| input.signature_slots())
            .filter_map(|slot| {
                let derivation = self.get_pubkey_derivation(&slot.x_pubkey)?;
                Some((slot.x_pubkey.to_bytes(), derivation))
            })
            .collect()
    }

    fn can_sign(&self, tx: &Transaction) -> bool {
        !self.is_watching_only() && !self.get_tx_derivations(tx).is_empty()
    }

    /// Sign every slot of `tx` this keystore has a key for.
    ///
    /// # Returns
    /// The number of signatures added. Watching-only keystores add none.
    fn sign_transaction(
        &self,
        tx: &mut Transaction,
        password: Option<&str>,
    ) -> Result<usize, WalletError> {
        if self.is_watching_only() {
            return Ok(0);
        }
        self.check_password(password)?;
        let mut keypairs = KeyPairs::new();
        for (x_pubkey, derivation) in self.get_tx_derivations(tx) {
            keypairs.insert(x_pubkey, self.get_private_key(&derivation, password)?);
        }
        if keypairs.is_empty() {
            return Ok(0);
        }
        let added = tx.sign(&keypairs)?;
        debug!(keys = keypairs.len(), added, "keystore signed transaction");
        Ok(added)
    }
}

// -----------------------------------------------------------------------
// Imported keys
// -----------------------------------------------------------------------

/// Individually imported private keys, keyed by their pubkey.
#[derive(Clone, Default)]
pub struct ImportedKeystore {
    keys: BTreeMap<Vec<u8>, (PrivateKey, bool)>,
    password: Option<PasswordCheck>,
}

impl ImportedKeystore {
    pub fn new(password: Option<&str>) -> Self {
        ImportedKeystore {
            keys: BTreeMap::new(),
            password: password.map(PasswordCheck::new),
        }
    }

    /// Import a WIF key or minikey. Returns its pubkey.
    pub fn import_wif(
        &mut self,
        text: &str,
        params: &ChainParams,
        password: Option<&str>,
    ) -> Result<Vec<u8>, WalletError> {
        let imported = wif::decode(text, params)?;
        self.import_key(imported.key, imported.compressed, password)
    }

    pub fn import_key(
        &mut self,
        key: PrivateKey,
        compressed: bool,
        password: Option<&str>,
    ) -> Result<Vec<u8>, WalletError> {
        self.check_password(password)?;
        let pubkey = key.public_key(compressed).to_bytes();
        self.keys.insert(pubkey.clone(), (key, compressed));
        Ok(pubkey)
    }

    pub fn remove(&mut self, pubkey: &[u8]) -> bool {
        self.keys.remove(pubkey).is_some()
    }

    /// P2PKH addresses of the imported keys, in pubkey order.
    pub fn addresses(&self) -> Vec<Address> {
        self.keys
            .keys()
            .filter_map(|pk| Address::from_pubkey(pk).ok())
            .collect()
    }

    pub fn address_to_pubkey(&self, address: &Address) -> Option<&[u8]> {
        self.keys
            .keys()
            .find(|pk| Address::from_pubkey(pk).ok().as_ref() == Some(address))
            .map(Vec::as_slice)
    }
}

impl Keystore for ImportedKeystore {
    fn is_watching_only(&self) -> bool {
        false
    }

    fn check_password(&self, password: Option<&str>) -> Result<(), WalletError> {
        check(&self.password, password)
    }

    fn get_pubkey_derivation(&self, x_pubkey: &XPubKey) -> Option<Derivation> {
        match x_pubkey {
            XPubKey::PubKey(pk) if self.keys.contains_key(pk) => {
                Some(Derivation::Imported(pk.clone()))
            }
            XPubKey::Address(_) => {
                let address = x_pubkey.address().ok()?;
                let pk = self.address_to_pubkey(&address)?;
                Some(Derivation::Imported(pk.to_vec()))
            }
            _ => None,
        }
    }

    fn get_private_key(
        &self,
        derivation: &Derivation,
        password: Option<&str>,
    ) -> Result<(PrivateKey, bool), WalletError> {
        self.check_password(password)?;
        match derivation {
            Derivation::Imported(pk) => self
                .keys
                .get(pk)
                .cloned()
                .ok_or_else(|| WalletError::UnknownDerivation(hex::encode(pk))),
            other => Err(WalletError::UnknownDerivation(format!("{other:?}"))),
        }
    }
}

// -----------------------------------------------------------------------
// BIP32 account
// -----------------------------------------------------------------------

/// One BIP32 account. Keys are `[change, index]` below the account node.
#[derive(Clone)]
pub struct Bip32Keystore {
    xpub: ExtendedKey,
    xprv: Option<ExtendedKey>,
    params: ChainParams,
    /// Derivations for address hints, supplied by the wallet.
    wallet_advice: HashMap<Address, [u32; 2]>,
    password: Option<PasswordCheck>,
}

impl Bip32Keystore {
    /// Account at `derivation` (e.g. `m/44'/899'/0'`) below the seed's master.
    pub fn from_seed(
        seed: &[u8],
        derivation: &str,
        params: &ChainParams,
        password: Option<&str>,
    ) -> Result<Self, WalletError> {
        let account = ExtendedKey::from_seed(seed)?.derive_path(derivation)?;
        Ok(Self::from_account(account, params, password))
    }

    pub fn from_xprv(
        xprv: &str,
        params: &ChainParams,
        password: Option<&str>,
    ) -> Result<Self, WalletError> {
        let account = ExtendedKey::from_string(xprv, params)?;
        if !account.is_private() {
            return Err(WalletError::InvalidArgument("expected an xprv".to_string()));
        }
        Ok(Self::from_account(account, params, password))
    }

    /// A watching-only account.
    pub fn from_xpub(xpub: &str, params: &ChainParams) -> Result<Self, WalletError> {
        let account = ExtendedKey::from_string(xpub, params)?;
        Ok(Bip32Keystore {
            xpub: account.neuter(),
            xprv: None,
            params: params.clone(),
            wallet_advice: HashMap::new(),
            password: None,
        })
    }

    fn from_account(account: ExtendedKey, params: &ChainParams, password: Option<&str>) -> Self {
        Bip32Keystore {
            xpub: account.neuter(),
            xprv: account.is_private().then_some(account),
            params: params.clone(),
            wallet_advice: HashMap::new(),
            password: password.map(PasswordCheck::new),
        }
    }

    pub fn xpub(&self) -> String {
        self.xpub.to_string(&self.params)
    }

    /// Compressed pubkey at `[change, index]`.
    pub fn derive_pubkey(&self, change: u32, index: u32) -> Result<Vec<u8>, WalletError> {
        let node = self.xpub.derive_indices(&[change, index])?;
        Ok(node.public_key().to_compressed().to_vec())
    }

    /// The x_pubkey advertising `[change, index]` in unsigned inputs.
    pub fn get_xpubkey(&self, change: u32, index: u32) -> XPubKey {
        XPubKey::from_bip32(self.xpub.to_bytes(&self.params), change, index)
    }

    /// Record which derivation an address belongs to, for `fd` hints.
    pub fn set_wallet_advice(&mut self, address: Address, derivation: [u32; 2]) {
        self.wallet_advice.insert(address, derivation);
    }

    /// Same node, ignoring the 4-byte version header.
    fn is_own_xpub(&self, xpub: &[u8; EXTENDED_KEY_LEN]) -> bool {
        xpub[4..] == self.xpub.to_bytes(&self.params)[4..]
    }
}

impl Keystore for Bip32Keystore {
    fn is_watching_only(&self) -> bool {
        self.xprv.is_none()
    }

    fn check_password(&self, password: Option<&str>) -> Result<(), WalletError> {
        check(&self.password, password)
    }

    fn get_pubkey_derivation(&self, x_pubkey: &XPubKey) -> Option<Derivation> {
        match x_pubkey {
            XPubKey::Bip32 { xpub, derivation } if self.is_own_xpub(xpub) => {
                Some(Derivation::Bip32(*derivation))
            }
            XPubKey::Address(_) => {
                let address = x_pubkey.address().ok()?;
                self.wallet_advice.get(&address).copied().map(Derivation::Bip32)
            }
            _ => None,
        }
    }

    fn get_private_key(
        &self,
        derivation: &Derivation,
        password: Option<&str>,
    ) -> Result<(PrivateKey, bool), WalletError> {
        self.check_password(password)?;
        let xprv = self.xprv.as_ref().ok_or(WalletError::WatchingOnly)?;
        match derivation {
            Derivation::Bip32(path) => {
                let node = xprv.derive_indices(path)?;
                let key = node
                    .private_key()
                    .cloned()
                    .ok_or_else(|| WalletError::UnknownDerivation(format!("{path:?}")))?;
                Ok((key, true))
            }
            other => Err(WalletError::UnknownDerivation(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_primitives::chainhash::Hash256;
    use xec_primitives::ScriptType;
    use xec_transaction::{InputDescriptor, OutPoint, TxInput, TxOutput, DEFAULT_SEQUENCE};

    const SEED: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];

    fn spend(x_pubkey: XPubKey) -> Transaction {
        let keys = InputDescriptor::p2pkh(x_pubkey).unwrap();
        let input = TxInput::from_descriptor(
            OutPoint::new(Hash256::new([5; 32]), 0),
            DEFAULT_SEQUENCE,
            keys,
            Some(10_000),
        )
        .unwrap();
        let output = TxOutput::new(Address::from_p2pkh_hash([1; 20]), 9_000);
        Transaction::from_io(vec![input], vec![output], 0, false)
    }

    fn account(password: Option<&str>) -> Bip32Keystore {
        Bip32Keystore::from_seed(&SEED, "m/44'/899'/0'", &ChainParams::mainnet(), password)
            .unwrap()
    }

    #[test]
    fn test_password_check() {
        let lock = PasswordCheck::new("hunter2");
        assert!(lock.verify(Some("hunter2")).is_ok());
        assert!(matches!(lock.verify(Some("hunter3")), Err(WalletError::InvalidPassword)));
        assert!(matches!(lock.verify(None), Err(WalletError::InvalidPassword)));
        assert!(matches!(lock.verify(Some("")), Err(WalletError::InvalidPassword)));
        assert!(matches!(lock.verify(Some("hunter22")), Err(WalletError::InvalidPassword)));
        // Salted: the same password gives a different digest.
        assert_ne!(PasswordCheck::new("hunter2").digest, lock.digest);
    }

    #[test]
    fn test_bip32_signs_own_slots() {
        let ks = account(Some("pw"));
        let mut tx = spend(ks.get_xpubkey(0, 7));
        let derivations = ks.get_tx_derivations(&tx);
        assert_eq!(derivations.values().collect::<Vec<_>>(), vec![&Derivation::Bip32([0, 7])]);
        assert!(ks.can_sign(&tx));

        assert!(matches!(
            ks.sign_transaction(&mut tx, Some("wrong")),
            Err(WalletError::InvalidPassword)
        ));
        assert_eq!(ks.sign_transaction(&mut tx, Some("pw")).unwrap(), 1);
        assert!(tx.is_complete());
        assert!(!ks.can_sign(&tx));
        assert_eq!(tx.inputs()[0].pubkeys()[0], ks.derive_pubkey(0, 7).unwrap());
    }

    #[test]
    fn test_bip32_ignores_foreign_xpub() {
        let ks = account(None);
        let other = Bip32Keystore::from_seed(&[9u8; 16], "m/44'/899'/0'", &ChainParams::mainnet(), None)
            .unwrap();
        let tx = spend(other.get_xpubkey(0, 0));
        assert!(ks.get_tx_derivations(&tx).is_empty());
        assert!(!ks.can_sign(&tx));
    }

    #[test]
    fn test_bip32_header_does_not_matter() {
        let ks = account(None);
        let testnet_view = XPubKey::from_bip32(
            ks.xpub.to_bytes(&ChainParams::testnet()),
            1,
            2,
        );
        assert_eq!(ks.get_pubkey_derivation(&testnet_view), Some(Derivation::Bip32([1, 2])));
    }

    #[test]
    fn test_watching_only() {
        let full = account(None);
        let watch = Bip32Keystore::from_xpub(&full.xpub(), &ChainParams::mainnet()).unwrap();
        assert!(watch.is_watching_only());
        let mut tx = spend(full.get_xpubkey(0, 1));
        assert!(!watch.can_sign(&tx));
        assert_eq!(watch.sign_transaction(&mut tx, None).unwrap(), 0);
        assert!(matches!(
            watch.get_private_key(&Derivation::Bip32([0, 1]), None),
            Err(WalletError::WatchingOnly)
        ));
    }

    #[test]
    fn test_wallet_advice_for_address_hint() {
        let mut ks = account(None);
        let pubkey = ks.derive_pubkey(0, 4).unwrap();
        let address = Address::from_pubkey(&pubkey).unwrap();
        let mut tx = spend(XPubKey::from_address(&address));
        assert!(!ks.can_sign(&tx));

        ks.set_wallet_advice(address, [0, 4]);
        assert_eq!(ks.sign_transaction(&mut tx, None).unwrap(), 1);
        assert_eq!(tx.inputs()[0].pubkeys(), &[pubkey]);
    }

    #[test]
    fn test_imported_wif() {
        let params = ChainParams::mainnet();
        let key = PrivateKey::from_bytes(&[0x21; 32]).unwrap();
        let text = wif::encode(&key, true, ScriptType::P2pkh, &params);

        let mut ks = ImportedKeystore::new(Some("pw"));
        assert!(matches!(
            ks.import_wif(&text, &params, Some("nope")),
            Err(WalletError::InvalidPassword)
        ));
        let pubkey = ks.import_wif(&text, &params, Some("pw")).unwrap();
        assert_eq!(pubkey, key.public_key(true).to_bytes());
        assert_eq!(ks.addresses(), vec![Address::from_pubkey(&pubkey).unwrap()]);

        let mut tx = spend(XPubKey::PubKey(pubkey.clone()));
        assert_eq!(ks.sign_transaction(&mut tx, Some("pw")).unwrap(), 1);
        assert!(tx.is_complete());

        assert!(ks.remove(&pubkey));
        assert!(ks.addresses().is_empty());
    }

    #[test]
    fn test_imported_address_hint() {
        let key = PrivateKey::from_bytes(&[0x22; 32]).unwrap();
        let mut ks = ImportedKeystore::new(None);
        let pubkey = ks.import_key(key, false, None).unwrap();
        assert_eq!(pubkey.len(), 65);
        let address = Address::from_pubkey(&pubkey).unwrap();

        let mut tx = spend(XPubKey::from_address(&address));
        assert_eq!(ks.sign_transaction(&mut tx, None).unwrap(), 1);
        assert_eq!(tx.inputs()[0].pubkeys(), &[pubkey]);
    }
}
