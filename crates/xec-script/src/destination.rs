//! Where an output pays to.

use xec_primitives::ec::PublicKey;
use xec_primitives::ChainParams;

use crate::address::Address;
use crate::script::Script;
use crate::script_output::ScriptOutput;

/// The destination of a transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// P2PKH or P2SH.
    Address(Address),
    /// Bare pay-to-pubkey, keeping the key's serialized form.
    PublicKey(PublicKey),
    /// Anything else, including OP_RETURN data.
    Script(ScriptOutput),
}

impl Destination {
    /// Classify an output script.
    ///
    /// 25-byte P2PKH and 23-byte P2SH scripts become addresses, 35- and
    /// 67-byte P2PK scripts with a valid curve point become public keys,
    /// and everything else is kept as a raw script.
    pub fn from_script_pubkey(script: &[u8]) -> Self {
        let script = Script::from_bytes(script);
        if let Some(hash) = script.p2pkh_hash() {
            return Destination::Address(Address::from_p2pkh_hash(hash));
        }
        if let Some(hash) = script.p2sh_hash() {
            return Destination::Address(Address::from_p2sh_hash(hash));
        }
        if let Some(pubkey) = script.p2pk_pubkey().and_then(|b| PublicKey::from_bytes(b).ok()) {
            return Destination::PublicKey(pubkey);
        }
        Destination::Script(ScriptOutput::new(script))
    }

    /// The output script paying to this destination.
    pub fn to_script(&self) -> Script {
        match self {
            Destination::Address(addr) => addr.to_script(),
            Destination::PublicKey(pubkey) => Script::p2pk(&pubkey.to_bytes()),
            Destination::Script(out) => out.to_script(),
        }
    }

    /// Text for display: prefixed CashAddr, pubkey hex, or the script listing.
    pub fn to_display_string(&self, params: &ChainParams) -> String {
        match self {
            Destination::Address(addr) => addr.to_ui_string(params),
            Destination::PublicKey(pubkey) => pubkey.to_hex(),
            Destination::Script(out) => out.to_ui_string(),
        }
    }

    /// The address this destination pays to, if any. P2PK resolves to the
    /// key's P2PKH address.
    pub fn address(&self) -> Option<Address> {
        match self {
            Destination::Address(addr) => Some(addr.clone()),
            Destination::PublicKey(pubkey) => Some(Address::from_p2pkh_hash(pubkey.hash160())),
            Destination::Script(_) => None,
        }
    }

    pub fn is_opreturn(&self) -> bool {
        matches!(self, Destination::Script(out) if out.is_opreturn())
    }
}

impl From<Address> for Destination {
    fn from(addr: Address) -> Self {
        Destination::Address(addr)
    }
}

impl From<ScriptOutput> for Destination {
    fn from(out: ScriptOutput) -> Self {
        Destination::Script(out)
    }
}
