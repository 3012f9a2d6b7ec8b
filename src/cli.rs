// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Shared plumbing for the one-shot CLI tools (`hcget`, `hcset`, `hciget`,
//! `hciset`, `hccall`, `hcicall`, `hcsub`): common argv, a client opened
//! over UDP, typed value parsing, and the exit code convention.

use crate::client::Client;
use crate::error::{Error, ErrorCode};
use crate::transport::udp::UdpTransport;
use crate::value::Value;
use clap::Args;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Host/port/timeout shared by every one-shot tool.
#[derive(Debug, Args)]
pub struct Endpoint {
    /// Server host name or IP address.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server UDP port.
    #[arg(long)]
    pub port: u16,

    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
}

impl Endpoint {
    /// Open a client over a UDP transport connected to this endpoint.
    pub fn connect(&self) -> Result<Arc<Client>, Error> {
        let dest: SocketAddr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Connect(format!("could not resolve {}:{}", self.host, self.port)))?;
        let transport = Arc::new(UdpTransport::connect(0, dest)?);
        Ok(Client::new(transport, Duration::from_millis(self.timeout_ms)))
    }
}

/// The wire type a one-shot tool's `value` argument should be parsed as.
/// The client has no way to discover a remote parameter's declared type
/// (there is no introspection opcode), so tools that write a value take
/// this on the command line.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum TypeArg {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
}

impl std::fmt::Display for TypeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Parse `raw` as the wire value named by `ty`, for tools that send a
/// value (`hcset`, `hciset`, `add`/`sub` if a tool grows them).
pub fn parse_value(ty: TypeArg, raw: &str) -> Result<Value, String> {
    let bad = |e: std::fmt::Arguments| format!("{}", e);
    match ty {
        TypeArg::Bool => raw
            .parse()
            .map(Value::Bool)
            .map_err(|_| bad(format_args!("{:?} is not a valid bool", raw))),
        TypeArg::I8 => raw
            .parse()
            .map(Value::Int8)
            .map_err(|_| bad(format_args!("{:?} is not a valid i8", raw))),
        TypeArg::I16 => raw
            .parse()
            .map(Value::Int16)
            .map_err(|_| bad(format_args!("{:?} is not a valid i16", raw))),
        TypeArg::I32 => raw
            .parse()
            .map(Value::Int32)
            .map_err(|_| bad(format_args!("{:?} is not a valid i32", raw))),
        TypeArg::I64 => raw
            .parse()
            .map(Value::Int64)
            .map_err(|_| bad(format_args!("{:?} is not a valid i64", raw))),
        TypeArg::U8 => raw
            .parse()
            .map(Value::Uint8)
            .map_err(|_| bad(format_args!("{:?} is not a valid u8", raw))),
        TypeArg::U16 => raw
            .parse()
            .map(Value::Uint16)
            .map_err(|_| bad(format_args!("{:?} is not a valid u16", raw))),
        TypeArg::U32 => raw
            .parse()
            .map(Value::Uint32)
            .map_err(|_| bad(format_args!("{:?} is not a valid u32", raw))),
        TypeArg::U64 => raw
            .parse()
            .map(Value::Uint64)
            .map_err(|_| bad(format_args!("{:?} is not a valid u64", raw))),
        TypeArg::F32 => raw
            .parse()
            .map(Value::Float)
            .map_err(|_| bad(format_args!("{:?} is not a valid f32", raw))),
        TypeArg::F64 => raw
            .parse()
            .map(Value::Double)
            .map_err(|_| bad(format_args!("{:?} is not a valid f64", raw))),
        TypeArg::Str => Ok(Value::Str(raw.to_string())),
    }
}

/// Zero on success, negative on a usage error, positive (the absolute
/// value of the wire `ErrorCode`) for a protocol-level failure.
pub const EXIT_USAGE: i32 = -1;
pub const EXIT_IO: i32 = -2;

pub fn exit_code_for(code: ErrorCode) -> i32 {
    -(code.as_i8() as i32)
}

/// Print `err` to stderr and return the exit code a one-shot tool's
/// `main` should pass to `std::process::exit`.
pub fn report_error(err: &Error) -> i32 {
    eprintln!("error: {}", err);
    EXIT_IO
}

pub fn report_protocol_error(code: ErrorCode) -> i32 {
    eprintln!("error: {}", code);
    exit_code_for(code)
}

pub fn report_usage(msg: &str) -> i32 {
    eprintln!("error: {}", msg);
    EXIT_USAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_is_the_positive_magnitude_of_the_wire_code() {
        assert_eq!(exit_code_for(ErrorCode::Pid), 16);
        assert_eq!(exit_code_for(ErrorCode::None), 0);
    }

    #[test]
    fn parse_value_rejects_malformed_numerics() {
        assert!(parse_value(TypeArg::I32, "not-a-number").is_err());
        assert_eq!(parse_value(TypeArg::I32, "42").unwrap(), Value::Int32(42));
    }

    #[test]
    fn parse_value_accepts_any_string_for_str_type() {
        assert_eq!(parse_value(TypeArg::Str, "hello").unwrap(), Value::Str("hello".into()));
    }
}
