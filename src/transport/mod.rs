// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Transport abstraction: whatever the underlying medium, server and
//! client code sees whole messages in and out. Datagram media (UDP)
//! preserve message boundaries on their own; stream media (TCP, TLS,
//! serial) get boundaries from [`crate::framer::SlipFramer`] wrapped in
//! [`FramedTransport`].

pub mod serial;
pub mod tcp;
pub mod tls;
pub mod udp;

use crate::error::Error;
use crate::framer::SlipFramer;
use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::Duration;

/// One whole message in, one whole message out. Implementations
/// serialise concurrent senders internally (mirroring the teacher's
/// `tcp::Transport` wrapping its stream in a `Mutex`), so a single
/// instance can be shared behind an `Arc` across threads.
pub trait MessageTransport: Send + Sync {
    fn send(&self, msg: &[u8]) -> Result<(), Error>;
    fn recv(&self) -> Result<Vec<u8>, Error>;
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), Error>;
}

/// Adapts any `Read + Write` byte stream into a [`MessageTransport`] by
/// running it through a SLIP framer behind a mutex.
pub struct FramedTransport<T> {
    framer: Mutex<SlipFramer<T>>,
}

impl<T: Read + Write + Send> FramedTransport<T> {
    pub fn new(inner: T, max_payload: usize) -> FramedTransport<T> {
        FramedTransport {
            framer: Mutex::new(SlipFramer::new(inner, max_payload)),
        }
    }
}

impl<T: Read + Write + Send> MessageTransport for FramedTransport<T> {
    fn send(&self, msg: &[u8]) -> Result<(), Error> {
        self.framer.lock().map_err(|_| Error::Lock)?.send(msg)
    }

    fn recv(&self) -> Result<Vec<u8>, Error> {
        self.framer.lock().map_err(|_| Error::Lock)?.recv()
    }

    fn set_read_timeout(&self, _timeout: Option<Duration>) -> Result<(), Error> {
        // The stream's own read timeout (if any) is configured when the
        // concrete transport is opened; SLIP framing has no timeout
        // concept of its own to adjust.
        Ok(())
    }
}
