//! Script chunk parsing and push encoding.
//!
//! A script chunk is either an opcode or a data push with its associated
//! bytes. `get_ops` turns raw script bytes into chunks; `push_data` encodes
//! a payload with the shortest push the BIP62 rules allow.

use crate::opcodes::*;
use crate::ScriptError;

/// A single parsed element of a script.
///
/// Push chunks carry their payload in `data`. `OP_1`..`OP_16` and
/// `OP_1NEGATE` also carry the single byte they push, so a chunk list
/// re-encodes to equivalent bytes with `push_data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptChunk {
    /// The opcode byte. For direct pushes (1-75 bytes), this is the length.
    pub op: u8,
    /// The data payload, if this chunk pushes data.
    pub data: Option<Vec<u8>>,
}

impl ScriptChunk {
    /// True if the chunk is a length-prefixed push (including `OP_0`).
    pub fn is_push(&self) -> bool {
        self.op <= OP_PUSHDATA4
    }

    /// Encode this chunk back to script bytes.
    ///
    /// Push chunks use the minimal encoding; bare opcodes are emitted as-is.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.data {
            Some(data) => push_data(data, true),
            None => vec![self.op],
        }
    }

    /// Render as an ASM token: hex for length-prefixed pushes, otherwise the
    /// opcode name.
    pub fn to_asm_string(&self) -> String {
        match &self.data {
            Some(data) if self.is_push() && !data.is_empty() => hex::encode(data),
            _ => opcode_display(self.op),
        }
    }
}

/// Decode raw script bytes into chunks.
///
/// Handles direct pushes, `OP_PUSHDATA1/2/4`, and synthesizes the pushed
/// byte for `OP_1`..`OP_16` and `OP_1NEGATE`.
///
/// # Arguments
/// * `script` - The raw script bytes to decode.
///
/// # Returns
/// The parsed chunks, or `ScriptError::Truncated` with the offset of the
/// push that runs past the end of the script.
pub fn get_ops(script: &[u8]) -> Result<Vec<ScriptChunk>, ScriptError> {
    let mut ops = Vec::new();
    let mut n = 0;

    while n < script.len() {
        let start = n;
        let op = script[n];
        n += 1;

        let data = if op <= OP_PUSHDATA4 {
            let (dlen, width) = match op {
                OP_PUSHDATA1 => (read_len(script, n, 1, start)?, 1),
                OP_PUSHDATA2 => (read_len(script, n, 2, start)?, 2),
                OP_PUSHDATA4 => (read_len(script, n, 4, start)?, 4),
                _ => (op as usize, 0),
            };
            n += width;
            let end = n.checked_add(dlen).ok_or(ScriptError::Truncated(start))?;
            if end > script.len() {
                return Err(ScriptError::Truncated(start));
            }
            let data = script[n..end].to_vec();
            n = end;
            Some(data)
        } else if is_small_int_op(op) {
            Some(vec![op - OP_1 + 1])
        } else if op == OP_1NEGATE {
            Some(vec![0x81])
        } else {
            None
        };

        ops.push(ScriptChunk { op, data });
    }

    Ok(ops)
}

fn read_len(script: &[u8], at: usize, width: usize, start: usize) -> Result<usize, ScriptError> {
    let bytes = script
        .get(at..at + width)
        .ok_or(ScriptError::Truncated(start))?;
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf) as usize)
}

/// The length prefix for a push of `data_len` bytes.
///
/// A plain length byte below `OP_PUSHDATA1`, then `OP_PUSHDATA1/2/4` by size.
pub fn op_push_bytes(data_len: usize) -> Vec<u8> {
    if data_len < OP_PUSHDATA1 as usize {
        vec![data_len as u8]
    } else if data_len <= 0xff {
        vec![OP_PUSHDATA1, data_len as u8]
    } else if data_len <= 0xffff {
        let mut buf = vec![OP_PUSHDATA2];
        buf.extend_from_slice(&(data_len as u16).to_le_bytes());
        buf
    } else {
        let mut buf = vec![OP_PUSHDATA4];
        buf.extend_from_slice(&(data_len as u32).to_le_bytes());
        buf
    }
}

/// Encode a data push.
///
/// With `minimal` set, the BIP62 rules apply: an empty payload or a single
/// zero byte becomes `OP_0`, a single byte 1..=16 becomes `OP_1`..`OP_16`,
/// and `0x81` becomes `OP_1NEGATE`. Otherwise, and for all longer payloads,
/// the data is length-prefixed.
///
/// # Arguments
/// * `data` - The payload to push.
/// * `minimal` - Whether to apply the small-value opcodes.
///
/// # Returns
/// The push opcode(s) followed by the payload.
pub fn push_data(data: &[u8], minimal: bool) -> Vec<u8> {
    if minimal {
        match data {
            [] | [0x00] => return vec![OP_0],
            [v @ 1..=16] => return vec![OP_1 + *v - 1],
            [0x81] => return vec![OP_1NEGATE],
            _ => {}
        }
    }
    let mut out = op_push_bytes(data.len());
    out.extend_from_slice(data);
    out
}

/// Encode several payloads as consecutive minimal pushes.
pub fn encode_push_datas(parts: &[&[u8]]) -> Vec<u8> {
    parts.iter().flat_map(|part| push_data(part, true)).collect()
}
