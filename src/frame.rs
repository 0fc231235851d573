// Frame Codec — pure, no I/O.
//
// Encodes a typed request plus its arguments into the wire format the HSM
// expects, splits the encoded bytes into transport-sized blocks, and
// interprets the bytes that come back over a single write.

use crate::error::ProxyError;

const COMPONENT: &str = "frame-codec";

/// Maximum body bytes per block write; each write is BLOCK + 2 header
/// bytes, which must stay at or under the 512-byte BLE MTU.
pub const BLOCK: usize = 510;

/// Operation codes understood by the HSM, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    GenerateKeys = 1,
    RotateKeys = 2,
    EraseKeys = 3,
    DigestBytes = 4,
    SignBytes = 5,
    ValidSignature = 6,
}

impl Op {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Encode `op` with its arguments into the full request byte sequence
/// (before block segmentation).
///
/// Wire layout: `[op][arg_count][len_hi][len_lo][bytes]...`. Each
/// argument's length is a big-endian u16, so individual arguments longer
/// than 65535 bytes are rejected rather than silently truncated.
pub fn encode(op: Op, args: &[Vec<u8>]) -> Result<Vec<u8>, ProxyError> {
    if args.len() > u8::MAX as usize {
        return Err(ProxyError::unexpected(
            COMPONENT,
            format!("{} arguments exceeds the 255-argument wire limit", args.len()),
        ));
    }

    let mut body = Vec::with_capacity(2 + args.iter().map(|a| 2 + a.len()).sum::<usize>());
    body.push(op.code());
    body.push(args.len() as u8);
    for arg in args {
        if arg.len() > u16::MAX as usize {
            return Err(ProxyError::argument_too_large(COMPONENT, arg.len()));
        }
        body.extend_from_slice(&(arg.len() as u16).to_be_bytes());
        body.extend_from_slice(arg);
    }
    Ok(body)
}

/// Parse the op code and argument count out of an encoded request's
/// leading bytes. A one-byte request is treated as an implicit
/// zero-argument request rather than a malformed one.
pub fn parse_headers(body: &[u8]) -> Result<(u8, u8), ProxyError> {
    if body.is_empty() {
        return Err(ProxyError::unexpected(COMPONENT, "empty request body"));
    }
    let op = body[0];
    let arg_count = if body.len() == 1 { 0 } else { body[1] };
    Ok((op, arg_count))
}

/// Split an encoded request body into the blocks that must be written to
/// the BLE write characteristic, in transmission order.
///
/// Bodies of `BLOCK + 2` bytes or fewer need no segmentation and produce
/// a single block. Longer bodies produce `B` "extra" blocks — sent first,
/// in descending index order, each carrying a `[0x00, k]` continuation
/// header — followed by the primary block (the first `BLOCK + 2` bytes
/// of the body, carrying the op code and argument count, with no
/// continuation header of its own).
pub fn segment(body: &[u8]) -> Vec<Vec<u8>> {
    let len = body.len();
    if len <= BLOCK + 2 {
        return vec![body.to_vec()];
    }

    let extra_blocks = (len - 2).div_ceil(BLOCK) - 1;
    let mut blocks = Vec::with_capacity(extra_blocks + 1);

    for k in (1..=extra_blocks).rev() {
        let start = k * BLOCK + 2;
        let end = (start + BLOCK).min(len);
        let mut block = Vec::with_capacity(2 + (end - start));
        block.push(0x00);
        block.push((k & 0xFF) as u8);
        block.extend_from_slice(&body[start..end]);
        blocks.push(block);
    }

    let primary_end = (BLOCK + 2).min(len);
    blocks.push(body[..primary_end].to_vec());
    blocks
}

/// The HSM's interpretation of one response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Length-1 response with a status code greater than 1: the device
    /// rejected the block that produced it.
    Error(u8),
    /// Length-1 response with value 0 or 1.
    Bool(bool),
    /// Any other length: an opaque payload (public key, digest, signature).
    Bytes(Vec<u8>),
}

pub fn parse_response(bytes: &[u8]) -> Response {
    if bytes.len() == 1 {
        match bytes[0] {
            0 => Response::Bool(false),
            1 => Response::Bool(true),
            code => Response::Error(code),
        }
    } else {
        Response::Bytes(bytes.to_vec())
    }
}
