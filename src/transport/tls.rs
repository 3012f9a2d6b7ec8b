// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! TLS byte stream over TCP, for connections configured with
//! `<tlsclient>`. Wraps [`native_tls`], consumed rather than
//! reimplemented (the design document names TLS as carried ambient
//! stack, not a protocol this crate implements itself).

use super::tcp::TcpClientStream;
use crate::error::Error;
use native_tls::{TlsConnector, TlsStream};
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// A TLS stream that authenticates the peer with the connector's
/// default trust store and, after the handshake, writes `authstring`
/// as a single newline-terminated line the server checks before
/// treating the connection as a live SLIP stream.
pub struct TlsClientStream {
    inner: TlsStream<TcpClientStream>,
}

impl TlsClientStream {
    pub fn connect(srv_addr: SocketAddr, domain: &str, authstring: &str) -> Result<TlsClientStream, Error> {
        let connector = TlsConnector::new()?;
        let tcp = TcpClientStream::new(srv_addr);
        let mut stream = connector.connect(domain, tcp).map_err(|e| match e {
            native_tls::HandshakeError::Failure(e) => Error::from(e),
            native_tls::HandshakeError::WouldBlock(_) => {
                Error::Connect("tls handshake would block on a blocking socket".to_string())
            }
        })?;
        stream.write_all(authstring.as_bytes())?;
        stream.write_all(b"\n")?;
        Ok(TlsClientStream { inner: stream })
    }
}

impl Read for TlsClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TlsClientStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
