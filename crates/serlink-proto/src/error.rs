//! Link-layer error kinds.
//!
//! A plain enum propagated with `?` — no payload beyond what's needed to
//! report the failure, nothing allocated, nothing that can itself fail.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// SET→UA did not complete within the retransmission budget.
    HandshakeTimeout,
    /// An I-frame was not acknowledged within the retransmission budget
    /// (including the case where the budget was spent on repeated REJ).
    WriteNoAck,
    /// The receiver detected a BCC2 mismatch; a REJ was sent, the caller
    /// should call `read` again.
    BadFrame,
    /// The receiver got an I-frame carrying the wrong sequence bit; an RR
    /// was re-sent without advancing `V(r)`, the caller should call `read`
    /// again.
    DuplicateFrame,
    /// The DISC handshake did not complete within the retransmission
    /// budget.
    CloseTimeout,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LinkError::HandshakeTimeout => "SET/UA handshake timed out",
            LinkError::WriteNoAck => "information frame was not acknowledged",
            LinkError::BadFrame => "received frame failed its checksum",
            LinkError::DuplicateFrame => "received a duplicate information frame",
            LinkError::CloseTimeout => "DISC handshake timed out",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for LinkError {}
