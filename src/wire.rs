// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Message framing on top of a [`Cell`] body: a 16-bit transaction id, a
//! one-byte opcode whose top bit distinguishes request from response, and
//! an opcode-specific body.

use crate::cell::Cell;
use crate::error::ErrorCode;

/// The operation an envelope requests or answers. Numeric values are the
/// low seven bits of the opcode byte; the response form of an opcode sets
/// bit 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0,
    Set = 1,
    ICall = 2,
    IGet = 3,
    ISet = 4,
    Add = 5,
    Sub = 6,
    Read = 7,
    Write = 8,
    Call = 9,
    ClSub = 10,
    ClUnsub = 11,
    Pub = 12,
}

const RESPONSE_BIT: u8 = 0x80;

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Opcode> {
        Some(match v & !RESPONSE_BIT {
            0 => Opcode::Get,
            1 => Opcode::Set,
            2 => Opcode::ICall,
            3 => Opcode::IGet,
            4 => Opcode::ISet,
            5 => Opcode::Add,
            6 => Opcode::Sub,
            7 => Opcode::Read,
            8 => Opcode::Write,
            9 => Opcode::Call,
            10 => Opcode::ClSub,
            11 => Opcode::ClUnsub,
            12 => Opcode::Pub,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A decoded envelope: transaction id, opcode, request/response flag, and
/// the still-encoded body (a [`Cell`] the caller decodes according to the
/// opcode's own grammar).
#[derive(Debug)]
pub struct Envelope {
    pub txid: u16,
    pub opcode: Opcode,
    pub is_response: bool,
    pub body: Cell,
}

/// Largest body a single envelope may carry. Matches the datagram MTU
/// headroom budgeted in the design document for UDP transports.
pub const MAX_BODY_LEN: usize = 1400;

impl Envelope {
    pub fn request(txid: u16, opcode: Opcode, body: Cell) -> Envelope {
        Envelope {
            txid,
            opcode,
            is_response: false,
            body,
        }
    }

    pub fn response(txid: u16, opcode: Opcode, body: Cell) -> Envelope {
        Envelope {
            txid,
            opcode,
            is_response: true,
            body,
        }
    }

    /// Serialize the full envelope (header + body) into one frame ready
    /// for a transport to send as a single unit.
    pub fn encode(&self) -> Result<Vec<u8>, ErrorCode> {
        let mut out = Vec::with_capacity(3 + self.body.len());
        out.push((self.txid >> 8) as u8);
        out.push((self.txid & 0xFF) as u8);
        let tag = self.opcode.as_u8() | if self.is_response { RESPONSE_BIT } else { 0 };
        out.push(tag);
        out.extend_from_slice(self.body.as_slice());
        if out.len() > MAX_BODY_LEN {
            return Err(ErrorCode::Overflow);
        }
        Ok(out)
    }

    /// Parse a full frame received from a transport back into an
    /// envelope. The body is handed back as an unread [`Cell`].
    pub fn decode(frame: &[u8]) -> Result<Envelope, ErrorCode> {
        if frame.len() < 3 {
            return Err(ErrorCode::Deser);
        }
        let txid = ((frame[0] as u16) << 8) | frame[1] as u16;
        let tag = frame[2];
        let is_response = tag & RESPONSE_BIT != 0;
        let opcode = Opcode::from_u8(tag).ok_or(ErrorCode::Opcode)?;
        let body = Cell::from_vec(frame[3..].to_vec());
        Ok(Envelope {
            txid,
            opcode,
            is_response,
            body,
        })
    }
}

/// Monotonically wrapping transaction-id generator used by a client to
/// label each outgoing request.
#[derive(Debug, Default)]
pub struct TxidGen {
    next: u16,
}

impl TxidGen {
    pub fn new() -> TxidGen {
        TxidGen { next: 0 }
    }

    pub fn next(&mut self) -> u16 {
        let v = self.next;
        self.next = self.next.wrapping_add(1);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn envelope_roundtrips_through_encode_decode() {
        let mut body = Cell::new(64);
        body.write_value(&Value::Uint32(42)).unwrap();
        let env = Envelope::request(7, Opcode::Get, body);
        let frame = env.encode().unwrap();
        let decoded = Envelope::decode(&frame).unwrap();
        assert_eq!(decoded.txid, 7);
        assert_eq!(decoded.opcode, Opcode::Get);
        assert!(!decoded.is_response);
    }

    #[test]
    fn response_bit_round_trips() {
        let env = Envelope::response(1, Opcode::Set, Cell::new(8));
        let frame = env.encode().unwrap();
        assert_eq!(frame[2], Opcode::Set.as_u8() | RESPONSE_BIT);
        let decoded = Envelope::decode(&frame).unwrap();
        assert!(decoded.is_response);
        assert_eq!(decoded.opcode, Opcode::Set);
    }

    #[test]
    fn short_frame_is_deser() {
        assert_eq!(Envelope::decode(&[0x00, 0x01]).unwrap_err(), ErrorCode::Deser);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(
            Envelope::decode(&[0, 1, 0x7F]).unwrap_err(),
            ErrorCode::Opcode
        );
    }

    #[test]
    fn txid_generator_wraps() {
        let mut g = TxidGen::new();
        for i in 0..=u16::MAX {
            assert_eq!(g.next(), i);
        }
        assert_eq!(g.next(), 0);
    }
}
