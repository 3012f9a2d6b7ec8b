// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! UDP transport. Preserves message boundaries natively. When
//! constructed with a zero destination IP or port it operates in
//! "reply-to-sender" mode: each receive updates the cached destination,
//! and sends target the most recent sender, exactly like the original
//! `UDPSocket`'s `_setdestonread` behavior.

use super::MessageTransport;
use crate::error::Error;
use crate::wire::MAX_BODY_LEN;
use log::{debug, warn};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

pub struct UdpTransport {
    socket: UdpSocket,
    dest: Mutex<Option<SocketAddr>>,
    set_dest_on_read: bool,
}

impl UdpTransport {
    /// Bind locally on `local_port` (0 for ephemeral). `dest` is the
    /// fixed peer, or `None` to operate in reply-to-sender mode.
    pub fn bind(local_port: u16, dest: Option<SocketAddr>) -> Result<UdpTransport, Error> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))?;
        Ok(UdpTransport {
            socket,
            set_dest_on_read: dest.is_none(),
            dest: Mutex::new(dest),
        })
    }

    pub fn connect(local_port: u16, dest: SocketAddr) -> Result<UdpTransport, Error> {
        UdpTransport::bind(local_port, Some(dest))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl MessageTransport for UdpTransport {
    fn send(&self, msg: &[u8]) -> Result<(), Error> {
        let dest = *self.dest.lock().map_err(|_| Error::Lock)?;
        let Some(dest) = dest else {
            warn!("udp transport: no destination known yet, dropping send");
            return Ok(());
        };
        self.socket.send_to(msg, dest)?;
        Ok(())
    }

    fn recv(&self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; MAX_BODY_LEN];
        let (n, from) = self.socket.recv_from(&mut buf)?;
        if self.set_dest_on_read {
            *self.dest.lock().map_err(|_| Error::Lock)? = Some(from);
        }
        buf.truncate(n);
        debug!("udp transport: received {} bytes from {}", n, from);
        Ok(buf)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_to_sender_updates_destination_from_recv() {
        let server = UdpTransport::bind(0, None).unwrap();
        let server_addr = server.socket.local_addr().unwrap();
        let client = UdpTransport::connect(0, server_addr).unwrap();

        client.send(b"hi").unwrap();
        let got = server.recv().unwrap();
        assert_eq!(got, b"hi");

        server.send(b"ack").unwrap();
        let got = client.recv().unwrap();
        assert_eq!(got, b"ack");
    }
}
