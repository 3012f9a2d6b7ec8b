// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Error codes carried in-band on the wire, plus the local error type for
//! conditions that never reach the wire (I/O failures, lock poisoning,
//! malformed configuration).

use std::error;
use std::fmt;
use std::io::Error as IOError;

/// Protocol-level outcome of a single request, carried as a signed byte in
/// every response. `ErrorCode::None` is zero so callers can write
/// `if code != ErrorCode::None { ... }` the way the wire format intends.
///
/// Numbering is part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ErrorCode {
    None = 0,
    Unspec = -1,
    Timeout = -2,
    Owner = -3,
    Reset = -4,
    Destroyed = -5,
    Overflow = -6,
    Type = -7,
    Pattern = -8,
    Access = -9,
    Range = -10,
    Step = -11,
    Invalid = -12,
    Alignment = -13,
    Deser = -14,
    Opcode = -15,
    Pid = -16,
    Eid = -17,
    Notfound = -18,
    Unknown = -19,
}

impl ErrorCode {
    /// Decode a wire byte, clamping anything outside the valid range to
    /// `Unknown` the same way the original `ErrToString` clamps `err`.
    pub fn from_i8(v: i8) -> ErrorCode {
        match v {
            0 => ErrorCode::None,
            -1 => ErrorCode::Unspec,
            -2 => ErrorCode::Timeout,
            -3 => ErrorCode::Owner,
            -4 => ErrorCode::Reset,
            -5 => ErrorCode::Destroyed,
            -6 => ErrorCode::Overflow,
            -7 => ErrorCode::Type,
            -8 => ErrorCode::Pattern,
            -9 => ErrorCode::Access,
            -10 => ErrorCode::Range,
            -11 => ErrorCode::Step,
            -12 => ErrorCode::Invalid,
            -13 => ErrorCode::Alignment,
            -14 => ErrorCode::Deser,
            -15 => ErrorCode::Opcode,
            -16 => ErrorCode::Pid,
            -17 => ErrorCode::Eid,
            -18 => ErrorCode::Notfound,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn as_i8(self) -> i8 {
        self as i8
    }

    pub fn is_none(self) -> bool {
        self == ErrorCode::None
    }

    fn mnemonic(self) -> &'static str {
        match self {
            ErrorCode::None => "NONE",
            ErrorCode::Unspec => "UNSPEC",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Owner => "OWNER",
            ErrorCode::Reset => "RESET",
            ErrorCode::Destroyed => "DESTROYED",
            ErrorCode::Overflow => "OVERFLOW",
            ErrorCode::Type => "TYPE",
            ErrorCode::Pattern => "PATTERN",
            ErrorCode::Access => "ACCESS",
            ErrorCode::Range => "RANGE",
            ErrorCode::Step => "STEP",
            ErrorCode::Invalid => "INVALID",
            ErrorCode::Alignment => "ALIGNMENT",
            ErrorCode::Deser => "DESER",
            ErrorCode::Opcode => "OPCODE",
            ErrorCode::Pid => "PID",
            ErrorCode::Eid => "EID",
            ErrorCode::Notfound => "NOTFOUND",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::None
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Local errors that never cross the wire: transport failures, lock
/// poisoning, and malformed configuration. Protocol-level outcomes
/// (including `TIMEOUT`) are returned as [`ErrorCode`] values instead.
#[derive(Debug)]
pub enum Error {
    Io(IOError),
    Lock,
    Connect(String),
    InvalidInput { input: String },
    Config { reason: String },
    Tls(native_tls::Error),
    Protocol(ErrorCode),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Lock => write!(f, "lock error: panicked"),
            Error::Connect(s) => write!(f, "connection error: {}", s),
            Error::InvalidInput { input } => write!(f, "invalid input: {}", input),
            Error::Config { reason } => write!(f, "configuration error: {}", reason),
            Error::Tls(e) => write!(f, "tls error: {}", e),
            Error::Protocol(code) => write!(f, "protocol error: {}", code),
        }
    }
}

impl From<IOError> for Error {
    fn from(e: IOError) -> Self {
        Error::Io(e)
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Error::Tls(e)
    }
}

impl From<ErrorCode> for Error {
    fn from(e: ErrorCode) -> Self {
        Error::Protocol(e)
    }
}

// This is important for other errors to wrap this one.
impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Tls(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_every_known_code() {
        let codes = [
            ErrorCode::None,
            ErrorCode::Unspec,
            ErrorCode::Timeout,
            ErrorCode::Owner,
            ErrorCode::Reset,
            ErrorCode::Destroyed,
            ErrorCode::Overflow,
            ErrorCode::Type,
            ErrorCode::Pattern,
            ErrorCode::Access,
            ErrorCode::Range,
            ErrorCode::Step,
            ErrorCode::Invalid,
            ErrorCode::Alignment,
            ErrorCode::Deser,
            ErrorCode::Opcode,
            ErrorCode::Pid,
            ErrorCode::Eid,
            ErrorCode::Notfound,
        ];
        for code in codes {
            assert_eq!(ErrorCode::from_i8(code.as_i8()), code);
        }
    }

    #[test]
    fn clamps_out_of_range_codes_to_unknown() {
        assert_eq!(ErrorCode::from_i8(1), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_i8(-100), ErrorCode::Unknown);
    }

    #[test]
    fn none_is_zero_and_default() {
        assert_eq!(ErrorCode::None.as_i8(), 0);
        assert_eq!(ErrorCode::default(), ErrorCode::None);
        assert!(ErrorCode::None.is_none());
        assert!(!ErrorCode::Pid.is_none());
    }
}
