// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! A connection pairs a [`Client`] talking to one remote backend with
//! a mount point in the aggregator's own tree. Each remote parameter is
//! represented locally by a [`RemoteParam`] whose handlers forward the
//! request over the client rather than touching local storage.

use super::config::{ConnConfig, SlipInnerConfig, TransportConfig};
use crate::cell::Cell;
use crate::client::Client;
use crate::error::{Error, ErrorCode};
use crate::tree::container::Container;
use crate::tree::param::ParamKind;
use crate::transport::tcp::TcpClientStream;
use crate::transport::tls::TlsClientStream;
use crate::transport::udp::UdpTransport;
use crate::transport::{FramedTransport, MessageTransport};
use crate::value::TypeCode;
use std::net::SocketAddr;
use std::sync::Arc;

/// A remote-backed parameter: every handler forwards to the owning
/// client by the remote server's own PID. Access control is whatever
/// the remote server enforces; this parameter is a transparent relay.
pub struct RemoteParam {
    client: Arc<Client>,
    remote_pid: u16,
    tc: TypeCode,
}

impl RemoteParam {
    pub fn new(client: Arc<Client>, remote_pid: u16, tc: TypeCode) -> RemoteParam {
        RemoteParam {
            client,
            remote_pid,
            tc,
        }
    }
}

impl ParamKind for RemoteParam {
    fn type_code(&self) -> TypeCode {
        self.tc
    }

    fn get_cell(&self, out: &mut Cell) -> ErrorCode {
        match self.client.get_raw(self.remote_pid) {
            Ok(v) => out.write_value(&v).err().unwrap_or(ErrorCode::None),
            Err(e) => e,
        }
    }

    fn set_cell(&self, input: &mut Cell) -> ErrorCode {
        let v = match input.read_value() {
            Ok(v) => v,
            Err(e) => return e,
        };
        self.client
            .set_raw(self.remote_pid, &v)
            .err()
            .unwrap_or(ErrorCode::None)
    }

    fn get_cell_tbl(&self, eid: u32, out: &mut Cell) -> ErrorCode {
        match self.client.iget_raw(self.remote_pid, eid) {
            Ok(v) => out.write_value(&v).err().unwrap_or(ErrorCode::None),
            Err(e) => e,
        }
    }

    fn set_cell_tbl(&self, eid: u32, input: &mut Cell) -> ErrorCode {
        let v = match input.read_value() {
            Ok(v) => v,
            Err(e) => return e,
        };
        self.client
            .iset_raw(self.remote_pid, eid, &v)
            .err()
            .unwrap_or(ErrorCode::None)
    }

    fn add_cell(&self, input: &mut Cell) -> ErrorCode {
        let v = match input.read_value() {
            Ok(v) => v,
            Err(e) => return e,
        };
        self.client
            .add_raw(self.remote_pid, &v)
            .err()
            .unwrap_or(ErrorCode::None)
    }

    fn sub_cell(&self, input: &mut Cell) -> ErrorCode {
        let v = match input.read_value() {
            Ok(v) => v,
            Err(e) => return e,
        };
        self.client
            .sub_raw(self.remote_pid, &v)
            .err()
            .unwrap_or(ErrorCode::None)
    }

    fn read_cell(&self, offset: u32, length: u16, out: &mut Cell) -> ErrorCode {
        match self.client.read_raw(self.remote_pid, offset, length) {
            Ok(bytes) => out.write_bytes(&bytes).err().unwrap_or(ErrorCode::None),
            Err(e) => e,
        }
    }

    fn write_cell(&self, offset: u32, data: &[u8]) -> ErrorCode {
        self.client
            .write_raw(self.remote_pid, offset, data)
            .err()
            .unwrap_or(ErrorCode::None)
    }

    fn call_cell(&self, _input: &mut Cell, _out: &mut Cell) -> ErrorCode {
        self.client.call_raw(self.remote_pid).err().unwrap_or(ErrorCode::None)
    }

    fn call_cell_tbl(&self, eid: u32, _input: &mut Cell, _out: &mut Cell) -> ErrorCode {
        self.client
            .icall_raw(self.remote_pid, eid)
            .err()
            .unwrap_or(ErrorCode::None)
    }
}

/// One backend: its client and the container mounted under the
/// aggregator's root bearing the connection's name.
pub struct Connection {
    pub name: String,
    pub client: Arc<Client>,
    pub mount: Container,
}

impl Connection {
    /// Build the transport stack named by `cfg.transport`, wrap it in a
    /// client, and mount one [`RemoteParam`] per entry in `cfg.mirrors`.
    pub fn build(cfg: &ConnConfig) -> Result<Connection, Error> {
        let transport = build_transport(&cfg.transport)?;
        let client = Client::new(transport, cfg.timeout);
        let mut mount = Container::new(cfg.name.clone());
        for p in &cfg.mirrors {
            mount.add_parameter(Arc::new(crate::tree::param::Parameter::new(
                p.name.clone(),
                crate::tree::param::Access::scalar_rw(),
                Box::new(RemoteParam::new(client.clone(), p.remote_pid, p.type_code)),
            )));
        }
        Ok(Connection {
            name: cfg.name.clone(),
            client,
            mount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::param::{Access, Parameter, ScalarParam};
    use crate::value::Value;
    use std::sync::Mutex;

    fn backend_server_and_client() -> (Arc<crate::server::Server>, Arc<Client>) {
        let mut root = Container::root();
        let store = Arc::new(Mutex::new(42i32));
        root.add_parameter(Arc::new(Parameter::new(
            "level",
            Access::scalar_rw(),
            Box::new(ScalarParam::mutex(store)),
        )));
        let backend_transport = Arc::new(UdpTransport::bind(0, None).unwrap());
        let backend_addr = backend_transport.local_addr().unwrap();
        let server = Arc::new(crate::server::Server::new(root, backend_transport));
        server.register_tree().unwrap();
        server.start().unwrap();

        let client_transport = Arc::new(UdpTransport::connect(0, backend_addr).unwrap());
        let client = Client::new(client_transport, std::time::Duration::from_millis(500));
        (server, client)
    }

    #[test]
    fn remote_param_forwards_get_to_the_real_server() {
        let (_server, client) = backend_server_and_client();
        let remote = RemoteParam::new(client, 0, TypeCode::Int32);
        let mut out = Cell::new(64);
        assert_eq!(remote.get_cell(&mut out), ErrorCode::None);
        let mut r = Cell::from_vec(out.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Int32(42)));
    }

    #[test]
    fn remote_param_forwards_set_then_get_round_trips() {
        let (_server, client) = backend_server_and_client();
        let remote = RemoteParam::new(client, 0, TypeCode::Int32);
        let mut input = Cell::new(64);
        input.write_value(&Value::Int32(99)).unwrap();
        assert_eq!(remote.set_cell(&mut input), ErrorCode::None);

        let mut out = Cell::new(64);
        remote.get_cell(&mut out);
        let mut r = Cell::from_vec(out.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Int32(99)));
    }

    #[test]
    fn remote_param_surfaces_unknown_pid_error() {
        let (_server, client) = backend_server_and_client();
        let remote = RemoteParam::new(client, 99, TypeCode::Int32);
        let mut out = Cell::new(64);
        assert_eq!(remote.get_cell(&mut out), ErrorCode::Pid);
    }
}

fn build_transport(cfg: &TransportConfig) -> Result<Arc<dyn MessageTransport>, Error> {
    match cfg {
        TransportConfig::Udp {
            port,
            dest_ip,
            dest_port,
        } => {
            let dest = SocketAddr::new(*dest_ip, *dest_port);
            Ok(Arc::new(UdpTransport::connect(*port, dest)?))
        }
        TransportConfig::Slip {
            max_payload_size,
            inner,
        } => match inner {
            SlipInnerConfig::Tcp {
                srv_ip, srv_port, ..
            } => {
                let addr = SocketAddr::new(*srv_ip, *srv_port);
                let stream = TcpClientStream::new(addr);
                Ok(Arc::new(FramedTransport::new(stream, *max_payload_size)))
            }
            SlipInnerConfig::Tls {
                srv_ip,
                srv_port,
                authstring,
                ..
            } => {
                let addr = SocketAddr::new(*srv_ip, *srv_port);
                let stream = TlsClientStream::connect(addr, &srv_ip.to_string(), authstring)?;
                Ok(Arc::new(FramedTransport::new(stream, *max_payload_size)))
            }
        },
    }
}
