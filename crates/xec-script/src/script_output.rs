//! Arbitrary output scripts and the protocols carried in OP_RETURN data.
//!
//! Recognition runs an ordered list of `(matches, decode)` pairs; the
//! first pair whose `matches` accepts the script decides. Callers with
//! extra protocols pass their own list to `recognize_with`.

use std::fmt;

use crate::chunk::{get_ops, ScriptChunk};
use crate::opcodes::*;
use crate::script::Script;
use crate::ScriptError;

/// Length of a lokad protocol identifier.
pub const LOKAD_ID_LEN: usize = 4;

/// A protocol decoded from an output script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// Data tagged by a 4-byte lokad id, either as the first push after
    /// `OP_RETURN` or as the head of the first eMPP section
    /// (`OP_RETURN OP_RESERVED <id ‖ payload> ...`).
    Lokad {
        id: [u8; LOKAD_ID_LEN],
        empp: bool,
        pushes: Vec<Vec<u8>>,
    },
    /// Any other `OP_RETURN` followed only by pushes.
    OpReturn { pushes: Vec<Vec<u8>> },
}

impl Protocol {
    /// Human name for well-known lokad ids.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Lokad { id, .. } => match id {
                b"SLP\0" => "SLP",
                b"SLP2" => "ALP",
                _ => "lokad",
            },
            Protocol::OpReturn { .. } => "op_return",
        }
    }
}

/// One entry of the recognizer list.
#[derive(Clone, Copy)]
pub struct ProtocolRecognizer {
    pub name: &'static str,
    pub matches: fn(&[u8]) -> bool,
    pub decode: fn(&[u8]) -> Option<Protocol>,
}

impl fmt::Debug for ProtocolRecognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRecognizer")
            .field("name", &self.name)
            .finish()
    }
}

/// Built-in recognizers, most specific first.
pub const RECOGNIZERS: &[ProtocolRecognizer] = &[
    ProtocolRecognizer {
        name: "lokad",
        matches: lokad_matches,
        decode: lokad_decode,
    },
    ProtocolRecognizer {
        name: "op_return",
        matches: op_return_matches,
        decode: op_return_decode,
    },
];

/// Run the built-in recognizers.
pub fn recognize(script: &[u8]) -> Option<Protocol> {
    recognize_with(script, RECOGNIZERS)
}

/// Run `recognizers` in order; the first match decides.
pub fn recognize_with(script: &[u8], recognizers: &[ProtocolRecognizer]) -> Option<Protocol> {
    recognizers
        .iter()
        .find(|r| (r.matches)(script))
        .and_then(|r| (r.decode)(script))
}

/// The pushes following `OP_RETURN`, or `None` if anything else follows.
fn op_return_pushes(script: &[u8]) -> Option<Vec<Vec<u8>>> {
    if script.first() != Some(&OP_RETURN) {
        return None;
    }
    get_ops(&script[1..])
        .ok()?
        .into_iter()
        .map(|chunk| chunk.data)
        .collect()
}

fn is_empp(script: &[u8]) -> bool {
    script.len() > 1 && script[0] == OP_RETURN && script[1] == OP_RESERVED
}

fn lokad_matches(script: &[u8]) -> bool {
    lokad_decode(script).is_some()
}

fn lokad_decode(script: &[u8]) -> Option<Protocol> {
    if is_empp(script) {
        let pushes: Vec<Vec<u8>> = get_ops(&script[2..])
            .ok()?
            .into_iter()
            .map(|chunk| chunk.data)
            .collect::<Option<_>>()?;
        let id = pushes.first()?.get(..LOKAD_ID_LEN)?.try_into().ok()?;
        return Some(Protocol::Lokad { id, empp: true, pushes });
    }
    let pushes = op_return_pushes(script)?;
    let first = pushes.first()?;
    if first.len() != LOKAD_ID_LEN {
        return None;
    }
    let id = first.as_slice().try_into().ok()?;
    Some(Protocol::Lokad { id, empp: false, pushes })
}

fn op_return_matches(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

fn op_return_decode(script: &[u8]) -> Option<Protocol> {
    Some(Protocol::OpReturn {
        pushes: op_return_pushes(script)?,
    })
}

/// An output script that is neither P2PKH, P2SH nor P2PK.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptOutput {
    script: Script,
}

impl ScriptOutput {
    pub fn new(script: Script) -> Self {
        ScriptOutput { script }
    }

    /// Build from opcode names and hex data, as in `Script::from_asm`.
    pub fn from_asm(asm: &str) -> Result<Self, ScriptError> {
        Ok(Self::new(Script::from_asm(asm)?))
    }

    /// `OP_RETURN` followed by each payload as a minimal push.
    pub fn from_opreturn_pushes(pushes: &[&[u8]]) -> Self {
        Self::new(Script::op_return(pushes))
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn to_script(&self) -> Script {
        self.script.clone()
    }

    /// True iff the script starts with `OP_RETURN`.
    pub fn is_opreturn(&self) -> bool {
        self.script.is_opreturn()
    }

    /// The protocol carried by this output, using the built-in recognizers.
    pub fn protocol(&self) -> Option<Protocol> {
        recognize(self.script.as_bytes())
    }

    /// Opcode names joined by `", "`, with pushed data shown as a quoted
    /// string when it is printable UTF-8 and as hex otherwise, e.g.
    /// `OP_RETURN, (5) "hello"`. A truncated script renders as
    /// `Invalid script: <hex>`.
    pub fn to_ui_string(&self) -> String {
        let ops = match get_ops(self.script.as_bytes()) {
            Ok(ops) => ops,
            Err(_) => return format!("Invalid script: {}", self.script.to_hex()),
        };
        ops.iter().map(render_chunk).collect::<Vec<_>>().join(", ")
    }
}

fn render_chunk(chunk: &ScriptChunk) -> String {
    let name = opcode_display(chunk.op);
    match &chunk.data {
        Some(data) if chunk.is_push() => format!("{name} {}", render_data(data)),
        _ => name,
    }
}

/// Pushed data as a quoted string if it is UTF-8 without too many
/// escapes (at most one per three characters), otherwise as hex.
fn render_data(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => {
            let quoted = format!("{text:?}");
            let escapes = quoted.matches('\\').count();
            if escapes * 3 > text.chars().count() {
                hex::encode(data)
            } else {
                quoted
            }
        }
        Err(_) => hex::encode(data),
    }
}

impl fmt::Display for ScriptOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ui_string())
    }
}

impl From<Script> for ScriptOutput {
    fn from(script: Script) -> Self {
        Self::new(script)
    }
}
