//! Frame constants and the pure, stateless codec.
//!
//! A handful of free functions plus a small constant table, the same shape
//! as a CRC-8/SMBus framing codec, but the checksum here is the XOR
//! BCC1/BCC2 pair this protocol uses, and the payload goes through
//! HDLC-style byte stuffing that a length-prefixed framing scheme never
//! needs.

/// Frame delimiter. Never appears unescaped inside a frame.
pub const FLAG: u8 = 0x7E;

/// Address byte used by commands Tx→Rx and by ordinary replies Rx→Tx.
pub const A_CMD: u8 = 0x03;

/// Address byte used only for the final UA of the close handshake.
pub const A_CLOSE: u8 = 0x01;

/// Escape byte.
pub const ESC: u8 = 0x7D;

/// What `FLAG` becomes after escaping.
pub const FLAG_ESCAPED: u8 = 0x5E;

/// What `ESC` becomes after escaping.
pub const ESC_ESCAPED: u8 = 0x5D;

pub const C_SET: u8 = 0x03;
pub const C_UA: u8 = 0x07;
pub const C_DISC: u8 = 0x0B;

/// `I(s) = s << 6`, the LAP-B convention for an information frame's
/// sequence bit.
#[inline]
pub const fn c_information(seq: u8) -> u8 {
    (seq & 1) << 6
}

/// `RR(r) = (r << 7) | 0x05`.
#[inline]
pub const fn c_rr(seq: u8) -> u8 {
    ((seq & 1) << 7) | 0x05
}

/// `REJ(r) = (r << 7) | 0x01`.
#[inline]
pub const fn c_rej(seq: u8) -> u8 {
    ((seq & 1) << 7) | 0x01
}

/// Whether a C-field value denotes an information frame (as opposed to a
/// supervisory one). The receiver state machine uses this to decide
/// whether to continue into the DATA sub-state after BCC1_OK.
#[inline]
pub fn is_information_c(c: u8) -> bool {
    c == c_information(0) || c == c_information(1)
}

fn xor_all(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// BCC2: XOR of all unescaped payload bytes.
#[inline]
pub fn bcc2(payload: &[u8]) -> u8 {
    xor_all(payload)
}

/// Applies the escape rule to a byte sequence (payload ‖ BCC2 only; header
/// bytes are never escaped).
pub fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            FLAG => {
                out.push(ESC);
                out.push(FLAG_ESCAPED);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESCAPED);
            }
            other => out.push(other),
        }
    }
    out
}

/// Encodes an information payload into an escaped, BCC-protected frame.
/// Output length ≤ `2 * payload.len() + 6`.
pub fn encode_information(payload: &[u8], seq: u8) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 1);
    body.extend_from_slice(payload);
    body.push(bcc2(payload));

    let escaped = escape(&body);
    let c = c_information(seq);
    let bcc1 = A_CMD ^ c;

    let mut frame = Vec::with_capacity(escaped.len() + 6);
    frame.push(FLAG);
    frame.push(A_CMD);
    frame.push(c);
    frame.push(bcc1);
    frame.extend_from_slice(&escaped);
    frame.push(FLAG);
    frame
}

/// Encodes a 5-byte supervisory frame: `[FLAG, a, c, a ^ c, FLAG]`.
pub fn encode_supervisory(a: u8, c: u8) -> [u8; 5] {
    [FLAG, a, c, a ^ c, FLAG]
}
