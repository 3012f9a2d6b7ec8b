// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! HC is a remote device-control fabric: a hierarchical, typed parameter
//! tree exposed by a server over a binary client/server protocol, reachable
//! over either datagram (UDP) or framed stream (TCP, TLS, serial)
//! transports. An aggregator can mount several remote trees under one root
//! and re-export the union as a single server.
//!
//! # Examples
//! ```no_run
//! # use hc::client::Client;
//! # use hc::transport::udp::UdpTransport;
//! # use std::net::SocketAddr;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # fn main() -> Result<(), hc::error::Error> {
//! let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
//! let transport = Arc::new(UdpTransport::connect(0, addr)?);
//! let client = Client::new(transport, Duration::from_secs(1));
//! let level: i32 = client.get(0)?;
//! println!("level = {}", level);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cell;
pub mod cli;
pub mod client;
pub mod error;
pub mod framer;
pub mod query;
pub mod server;
pub mod transport;
pub mod tree;
pub mod value;
pub mod wire;
