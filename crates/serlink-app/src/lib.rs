//! The application layer: packet framing and file chunking built on top of
//! `serlink_proto`'s link controller (spec §4.7).

pub mod packet;
pub mod transfer;

pub use packet::{Packet, PacketError, MAX_DATA_SIZE};
pub use transfer::{receive_file, send_file, AppError};
