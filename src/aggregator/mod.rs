// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The aggregator: parses a configuration document, builds one
//! [`connection::Connection`] per configured backend, mounts each under
//! the aggregator's own root container, and re-exports the union
//! through one outbound [`crate::server::Server`].

pub mod config;
pub mod connection;

use crate::client::Client;
use crate::error::Error;
use crate::query::QueryServer;
use crate::server::Server;
use crate::transport::udp::UdpTransport;
use crate::tree::container::Container;
use config::ServerConfig;
use connection::Connection;
use log::warn;
use std::sync::Arc;

/// Built aggregator: the outbound server plus, if configured, the
/// parallel query endpoint. Keeps every connection's client alive so
/// its receive thread, and the remote parameters it backs, stay live
/// for as long as the aggregator does.
pub struct Aggregator {
    pub server: Arc<Server>,
    pub query: Option<Arc<QueryServer>>,
    clients: Vec<Arc<Client>>,
    names: Vec<String>,
}

impl Aggregator {
    /// Parse `xml`, build every connection whose transport initializes
    /// successfully (a connection that fails to build is skipped with a
    /// warning rather than aborting the whole aggregator), mount them
    /// under one root, and construct (but do not start) the outbound
    /// server and optional query server.
    pub fn build(xml: &str) -> Result<Aggregator, Error> {
        let cfg = ServerConfig::parse(xml)?;
        let mut root = Container::root();
        let mut clients = Vec::new();
        let mut names = Vec::new();
        for conn_cfg in &cfg.connections {
            match Connection::build(conn_cfg) {
                Ok(conn) => {
                    clients.push(conn.client);
                    names.push(conn.name);
                    root.add_container(conn.mount);
                }
                Err(e) => warn!(
                    "aggregator: connection {:?} failed to initialize: {}",
                    conn_cfg.name, e
                ),
            }
        }

        let transport = Arc::new(UdpTransport::bind(cfg.port, None)?);
        let server = Arc::new(Server::new(root, transport));
        server.register_tree()?;

        let query = match cfg.qport {
            Some(qport) => Some(Arc::new(QueryServer::bind(qport, server.shared_root())?)),
            None => None,
        };

        Ok(Aggregator {
            server,
            query,
            clients,
            names,
        })
    }

    /// Start the outbound server and, if configured, the query server.
    pub fn start(&self) -> Result<(), Error> {
        self.server.start()?;
        if let Some(query) = &self.query {
            query.start()?;
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<(), Error> {
        if let Some(query) = &self.query {
            query.stop();
        }
        self.server.stop()?;
        Ok(())
    }

    pub fn connection_names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }
}
