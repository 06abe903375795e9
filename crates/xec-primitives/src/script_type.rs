use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PrimitivesError;

/// Spending template of an input, also offset into the WIF prefix byte.
///
/// Non-negative values are WIF offsets; negative values only tag inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2pk,
    Coinbase,
    Unknown,
}

impl ScriptType {
    pub fn value(self) -> i16 {
        match self {
            ScriptType::P2pkh => 0,
            ScriptType::P2sh => 5,
            ScriptType::P2pk => -1,
            ScriptType::Coinbase => -2,
            ScriptType::Unknown => -3,
        }
    }

    pub fn from_value(v: i16) -> Option<Self> {
        match v {
            0 => Some(ScriptType::P2pkh),
            5 => Some(ScriptType::P2sh),
            -1 => Some(ScriptType::P2pk),
            -2 => Some(ScriptType::Coinbase),
            -3 => Some(ScriptType::Unknown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2pk => "p2pk",
            ScriptType::Coinbase => "coinbase",
            ScriptType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptType {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p2pkh" => Ok(ScriptType::P2pkh),
            "p2sh" => Ok(ScriptType::P2sh),
            "p2pk" => Ok(ScriptType::P2pk),
            "coinbase" => Ok(ScriptType::Coinbase),
            "unknown" => Ok(ScriptType::Unknown),
            other => Err(PrimitivesError::Other(format!("unknown script type '{other}'"))),
        }
    }
}
