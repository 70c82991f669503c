//! A stop-and-wait ARQ link layer over an asynchronous serial link,
//! modeled on HDLC/LAP-B: byte stuffing, BCC1/BCC2 integrity, a
//! multi-state frame receiver, timer-driven retransmission with a bounded
//! retry budget, and a connection lifecycle (SET/UA, I/RR/REJ, DISC/UA).
//!
//! A single I-frame is in flight at a time, acknowledged or rejected by a
//! one-bit sequence number — there's no piggybacked acknowledgement, no
//! sliding window, and no link-liveness probing.

pub mod controller;
pub mod error;
pub mod receiver;
pub mod wire;

pub use controller::{ConnectionParams, LinkController, Role};
pub use error::LinkError;
