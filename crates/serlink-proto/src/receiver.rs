//! The byte-at-a-time receiver state machine.
//!
//! A pure function of accumulated bytes, parameterized by what this
//! particular call expects to see (`expected_a` and a small `accepted_c`
//! set), driven one byte at a time because the underlying serial channel
//! only offers `read_one() -> Option<u8>` rather than a complete datagram —
//! so it's a `step` function rather than a `decode` function.

use crate::wire::{bcc2, is_information_c, ESC, ESC_ESCAPED, FLAG, FLAG_ESCAPED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    FlagRcv,
    ARcv,
    CRcv,
    Bcc1Ok,
    Data,
}

/// What a completed receive pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A supervisory frame (SET/UA/DISC/RR/REJ) with this C-field value.
    Supervisory(u8),
    /// An information frame with this C-field value (encodes the sequence
    /// bit) and its unescaped, BCC2-verified payload.
    Information(u8, Vec<u8>),
    /// An information frame whose BCC2 did not match. The caller (link
    /// controller) replies REJ.
    ChecksumError,
}

/// One step of [`FrameReceiver::step`].
pub enum Step {
    /// Not enough bytes yet; keep feeding.
    Continue,
    /// A terminal outcome was reached; the receiver should be discarded.
    Done(Verdict),
}

/// A single-pass instance of the receiver automaton. A fresh instance is
/// created for every "run the receiver machine expecting ..." step the
/// controller performs; it is never reused across passes.
pub struct FrameReceiver {
    expected_a: u8,
    accepted_c: Vec<u8>,
    state: State,
    a_check: u8,
    c_check: u8,
    data_buf: Vec<u8>,
    escape_pending: bool,
}

impl FrameReceiver {
    /// `accepted_c` is a small set (1-4 values).
    pub fn new(expected_a: u8, accepted_c: &[u8]) -> Self {
        Self {
            expected_a,
            accepted_c: accepted_c.to_vec(),
            state: State::Start,
            a_check: 0,
            c_check: 0,
            data_buf: Vec::new(),
            escape_pending: false,
        }
    }

    pub fn step(&mut self, byte: u8) -> Step {
        match self.state {
            State::Start => {
                if byte == FLAG {
                    self.state = State::FlagRcv;
                }
                Step::Continue
            }
            State::FlagRcv => {
                if byte == FLAG {
                    // stays in FLAG_RCV
                } else if byte == self.expected_a {
                    self.a_check = byte;
                    self.state = State::ARcv;
                } else {
                    self.state = State::Start;
                }
                Step::Continue
            }
            State::ARcv => {
                if byte == FLAG {
                    self.state = State::FlagRcv;
                } else if self.accepted_c.contains(&byte) {
                    self.c_check = byte;
                    self.state = State::CRcv;
                } else {
                    self.state = State::Start;
                }
                Step::Continue
            }
            State::CRcv => {
                if byte == (self.a_check ^ self.c_check) {
                    self.state = State::Bcc1Ok;
                } else if byte == FLAG {
                    self.state = State::FlagRcv;
                } else {
                    self.state = State::Start;
                }
                Step::Continue
            }
            State::Bcc1Ok => {
                if is_information_c(self.c_check) {
                    self.data_buf.clear();
                    self.escape_pending = false;
                    self.state = State::Data;
                    self.feed_data_byte(byte)
                } else if byte == FLAG {
                    self.state = State::Start;
                    Step::Done(Verdict::Supervisory(self.c_check))
                } else {
                    self.state = State::Start;
                    Step::Continue
                }
            }
            State::Data => self.feed_data_byte(byte),
        }
    }

    fn feed_data_byte(&mut self, byte: u8) -> Step {
        if self.escape_pending {
            self.escape_pending = false;
            let unescaped = match byte {
                FLAG_ESCAPED => FLAG,
                ESC_ESCAPED => ESC,
                other => other,
            };
            self.data_buf.push(unescaped);
            Step::Continue
        } else if byte == ESC {
            self.escape_pending = true;
            Step::Continue
        } else if byte == FLAG {
            self.state = State::Start;
            match self.data_buf.split_last() {
                None => Step::Done(Verdict::ChecksumError),
                Some((&received_bcc2, payload)) => {
                    if bcc2(payload) == received_bcc2 {
                        Step::Done(Verdict::Information(self.c_check, payload.to_vec()))
                    } else {
                        Step::Done(Verdict::ChecksumError)
                    }
                }
            }
        } else {
            self.data_buf.push(byte);
            Step::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{c_rr, encode_information, encode_supervisory, A_CMD, C_UA};

    fn run(receiver: &mut FrameReceiver, bytes: &[u8]) -> Option<Verdict> {
        for &b in bytes {
            if let Step::Done(v) = receiver.step(b) {
                return Some(v);
            }
        }
        None
    }

    #[test]
    fn decodes_supervisory_ua() {
        let frame = encode_supervisory(A_CMD, C_UA);
        let mut r = FrameReceiver::new(A_CMD, &[C_UA]);
        assert_eq!(run(&mut r, &frame), Some(Verdict::Supervisory(C_UA)));
    }

    #[test]
    fn decodes_information_frame_with_escape() {
        let payload = [FLAG, ESC, 0x42];
        let frame = encode_information(&payload, 1);
        let mut r = FrameReceiver::new(A_CMD, &[0x00, 0x40]);
        assert_eq!(
            run(&mut r, &frame),
            Some(Verdict::Information(0x40, payload.to_vec()))
        );
    }

    #[test]
    fn rejects_on_bcc2_mismatch() {
        let mut frame = encode_information(&[0x01, 0x02], 0);
        // corrupt the BCC2 byte (last byte before the trailing FLAG)
        let n = frame.len();
        frame[n - 2] ^= 0xFF;
        let mut r = FrameReceiver::new(A_CMD, &[0x00, 0x40]);
        assert_eq!(run(&mut r, &frame), Some(Verdict::ChecksumError));
    }

    #[test]
    fn ignores_noise_before_a_real_frame() {
        let frame = encode_supervisory(A_CMD, C_UA);
        let mut noisy = vec![0x11, 0x22, FLAG, 0x99]; // stray bytes + a bogus A
        noisy.extend_from_slice(&frame);
        let mut r = FrameReceiver::new(A_CMD, &[C_UA]);
        assert_eq!(run(&mut r, &noisy), Some(Verdict::Supervisory(C_UA)));
    }

    #[test]
    fn resynchronizes_after_wrong_c_value() {
        // A frame with a C value not in accepted_c should bounce the
        // machine back to START without ever emitting a verdict, and a
        // subsequent valid frame should still decode.
        let wrong = encode_supervisory(A_CMD, 0x99);
        let right = encode_supervisory(A_CMD, C_UA);
        let mut bytes = wrong.to_vec();
        bytes.extend_from_slice(&right);
        let mut r = FrameReceiver::new(A_CMD, &[C_UA]);
        assert_eq!(run(&mut r, &bytes), Some(Verdict::Supervisory(C_UA)));
    }

    #[test]
    fn scenario_5_duplicate_frame_detected_by_c_check() {
        // Rx has already advanced V(r) to 1 and is waiting for I(1) or a
        // duplicate I(0). Feed it a duplicate I(0) frame.
        let dup = encode_information(&[0xAA], 0);
        let mut r = FrameReceiver::new(A_CMD, &[c_rr(0) /* unused */, 0x00, 0x40]);
        match run(&mut r, &dup) {
            Some(Verdict::Information(c, payload)) => {
                assert_eq!(c, 0x00);
                assert_eq!(payload, vec![0xAA]);
            }
            other => panic!("expected Information verdict, got {other:?}"),
        }
    }
}
