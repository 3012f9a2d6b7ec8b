// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! A reconnecting TCP byte stream, meant to sit underneath
//! [`crate::transport::FramedTransport`]. Mirrors the original
//! `TCPClient`: a blocking connection that silently redials on failure
//! rather than surfacing every transient drop to the caller.

use log::{info, warn};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct TcpClientStream {
    srv_addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpClientStream {
    pub fn new(srv_addr: SocketAddr) -> TcpClientStream {
        TcpClientStream {
            srv_addr,
            stream: None,
        }
    }

    fn ensure_connected(&mut self) -> io::Result<&mut TcpStream> {
        if self.stream.is_none() {
            loop {
                match TcpStream::connect(self.srv_addr) {
                    Ok(s) => {
                        info!("tcp transport: connected to {}", self.srv_addr);
                        self.stream = Some(s);
                        break;
                    }
                    Err(e) => {
                        warn!("tcp transport: connect to {} failed: {}", self.srv_addr, e);
                        thread::sleep(RECONNECT_DELAY);
                    }
                }
            }
        }
        Ok(self.stream.as_mut().unwrap())
    }
}

impl Read for TcpClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let stream = self.ensure_connected()?;
            match stream.read(buf) {
                Ok(0) => {
                    warn!("tcp transport: peer closed connection, reconnecting");
                    self.stream = None;
                }
                Ok(n) => return Ok(n),
                Err(e) => {
                    warn!("tcp transport: read error: {}, reconnecting", e);
                    self.stream = None;
                }
            }
        }
    }
}

impl Write for TcpClientStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let stream = self.ensure_connected()?;
            match stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) => {
                    warn!("tcp transport: write error: {}, reconnecting", e);
                    self.stream = None;
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stream) = &mut self.stream {
            stream.flush()
        } else {
            Ok(())
        }
    }
}
