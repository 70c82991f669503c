//! Application-layer packet framing (spec §4.7).
//!
//! New crate with no direct teacher counterpart — `dxkb-split-link-tester`
//! has a `TransferChunk` struct it serializes generically with `serde` +
//! `ssmarshal`, but this protocol's packets have a fixed TLV byte layout
//! (spec.md §4.7), not a generic struct, so they're encoded/decoded by
//! hand the way `original_source/src/application_layer.c` lays out its
//! (unfinished) packet format, in the teacher's plain-function codec style
//! (`serlink_proto::wire`) rather than a derive macro.

use std::fmt;

/// Recommended chunk size; the canonical value per spec.md §9 (one draft
/// used 5 for debugging, but that was never meant to ship).
pub const MAX_DATA_SIZE: usize = 512;

const CTRL_START: u8 = 2;
const CTRL_DATA: u8 = 1;
const CTRL_END: u8 = 3;

const FIELD_SIZE: u8 = 0;
const FIELD_NAME: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start { file_size: u64, file_name: String },
    Data(Vec<u8>),
    End { file_size: u64, file_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    Empty,
    UnknownControlByte(u8),
    Truncated,
    SizeFieldTooWide,
    NameNotUtf8,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Empty => write!(f, "empty packet"),
            PacketError::UnknownControlByte(c) => write!(f, "unknown control byte 0x{c:02x}"),
            PacketError::Truncated => write!(f, "packet truncated before declared field length"),
            PacketError::SizeFieldTooWide => write!(f, "file size field wider than 8 bytes"),
            PacketError::NameNotUtf8 => write!(f, "file name field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for PacketError {}

/// Big-endian-encodes `value` using the fewest bytes that represent it
/// (at least one byte, for a zero-byte file).
fn encode_size_field(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first_nonzero..].to_vec()
}

/// Decodes a big-endian size field.
///
/// `original_source`'s draft shifts the accumulator left unconditionally
/// inside the loop body, including after the last byte, which multiplies
/// the decoded value by 256 (spec.md §9). The fix: only shift *before*
/// folding in each subsequent byte, never after the last one.
fn decode_size_field(bytes: &[u8]) -> Result<u64, PacketError> {
    if bytes.len() > 8 {
        return Err(PacketError::SizeFieldTooWide);
    }
    let mut value: u64 = 0;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    Ok(value)
}

fn encode_control(control: u8, file_size: u64, file_name: &str) -> Vec<u8> {
    let size_bytes = encode_size_field(file_size);
    let name_bytes = file_name.as_bytes();

    let mut out = Vec::with_capacity(1 + 2 + size_bytes.len() + 2 + name_bytes.len());
    out.push(control);
    out.push(FIELD_SIZE);
    out.push(size_bytes.len() as u8);
    out.extend_from_slice(&size_bytes);
    out.push(FIELD_NAME);
    out.push(name_bytes.len() as u8);
    out.extend_from_slice(name_bytes);
    out
}

fn decode_control(bytes: &[u8]) -> Result<(u64, String), PacketError> {
    let mut file_size = None;
    let mut file_name = None;
    let mut rest = bytes;

    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(PacketError::Truncated);
        }
        let field_type = rest[0];
        let len = rest[1] as usize;
        if rest.len() < 2 + len {
            return Err(PacketError::Truncated);
        }
        let value = &rest[2..2 + len];
        match field_type {
            FIELD_SIZE => file_size = Some(decode_size_field(value)?),
            FIELD_NAME => {
                file_name =
                    Some(std::str::from_utf8(value).map_err(|_| PacketError::NameNotUtf8)?.to_string())
            }
            _ => {} // forward-compatible: unknown fields are ignored, not fatal
        }
        rest = &rest[2 + len..];
    }

    Ok((file_size.unwrap_or(0), file_name.unwrap_or_default()))
}

/// Encodes a Start control packet.
pub fn encode_start(file_size: u64, file_name: &str) -> Vec<u8> {
    encode_control(CTRL_START, file_size, file_name)
}

/// Encodes an End control packet.
pub fn encode_end(file_size: u64, file_name: &str) -> Vec<u8> {
    encode_control(CTRL_END, file_size, file_name)
}

/// Encodes a data packet. `payload.len()` must be `<= MAX_DATA_SIZE`.
pub fn encode_data(payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_DATA_SIZE);
    let size = payload.len();
    let mut out = Vec::with_capacity(3 + payload.len());
    out.push(CTRL_DATA);
    out.push((size / 256) as u8);
    out.push((size % 256) as u8);
    out.extend_from_slice(payload);
    out
}

/// Decodes any application packet, dispatching on its leading control byte.
pub fn decode(bytes: &[u8]) -> Result<Packet, PacketError> {
    let (&control, rest) = bytes.split_first().ok_or(PacketError::Empty)?;
    match control {
        CTRL_START => {
            let (file_size, file_name) = decode_control(rest)?;
            Ok(Packet::Start { file_size, file_name })
        }
        CTRL_END => {
            let (file_size, file_name) = decode_control(rest)?;
            Ok(Packet::End { file_size, file_name })
        }
        CTRL_DATA => {
            if rest.len() < 2 {
                return Err(PacketError::Truncated);
            }
            let size = rest[0] as usize * 256 + rest[1] as usize;
            let payload = rest.get(2..2 + size).ok_or(PacketError::Truncated)?;
            Ok(Packet::Data(payload.to_vec()))
        }
        other => Err(PacketError::UnknownControlByte(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_packet_round_trips() {
        let encoded = encode_start(1234, "report.pdf");
        assert_eq!(
            decode(&encoded),
            Ok(Packet::Start { file_size: 1234, file_name: "report.pdf".into() })
        );
    }

    #[test]
    fn end_packet_round_trips() {
        let encoded = encode_end(1234, "report.pdf");
        assert_eq!(
            decode(&encoded),
            Ok(Packet::End { file_size: 1234, file_name: "report.pdf".into() })
        );
    }

    #[test]
    fn data_packet_round_trips() {
        let payload = vec![0xAB; 300];
        let encoded = encode_data(&payload);
        assert_eq!(decode(&encoded), Ok(Packet::Data(payload)));
    }

    #[test]
    fn empty_data_packet_is_valid_end_of_file_marker() {
        let encoded = encode_data(&[]);
        assert_eq!(decode(&encoded), Ok(Packet::Data(Vec::new())));
    }

    #[test]
    fn zero_byte_file_size_encodes_as_single_zero_byte() {
        let encoded = encode_start(0, "empty.txt");
        // control(1) + field(2)=0x00 + len(1)=1 + size byte(1)=0x00 + field(2)=0x01 + len(1)=9 + name(9)
        assert_eq!(encoded[1], 0);
        assert_eq!(encoded[2], 1);
        assert_eq!(encoded[3], 0);
        assert_eq!(decode(&encoded), Ok(Packet::Start { file_size: 0, file_name: "empty.txt".into() }));
    }

    #[test]
    fn large_file_size_does_not_get_multiplied_by_256() {
        // Regression test for the decode bug documented in spec.md §9:
        // shifting after the last byte would turn this into 256x the
        // intended value.
        let file_size = 0x00AB_CDEFu64;
        let encoded = encode_start(file_size, "big.bin");
        assert_eq!(decode(&encoded), Ok(Packet::Start { file_size, file_name: "big.bin".into() }));
    }

    #[test]
    fn unknown_control_byte_is_rejected() {
        assert_eq!(decode(&[0xFF]), Err(PacketError::UnknownControlByte(0xFF)));
    }

    #[test]
    fn truncated_data_packet_is_rejected() {
        assert_eq!(decode(&[CTRL_DATA, 0x00]), Err(PacketError::Truncated));
    }
}
