// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The server: a parameter registry dispatching incoming requests to
//! the matching parameter's typed handler, plus the subscription
//! publish path.

pub mod subscription;

use crate::cell::Cell;
use crate::error::{Error, ErrorCode};
use crate::tree::container::{Container, Lookup};
use crate::tree::param::Parameter;
use crate::transport::MessageTransport;
use crate::value::Value;
use crate::wire::{Envelope, Opcode};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use subscription::Subscription;

/// Registers parameters (assigning dense PIDs), then serves requests
/// over a transport from a background receive thread once started.
/// After [`Server::start`] the schema is immutable, matching the
/// concurrency model: the receive thread reads the registry without a
/// lock.
pub struct Server {
    root: Arc<Mutex<Container>>,
    registry: Mutex<Vec<Arc<Parameter>>>,
    started: AtomicBool,
    transport: Arc<dyn MessageTransport>,
    subscriptions: Mutex<HashMap<u16, Vec<Subscription>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl Server {
    pub fn new(root: Container, transport: Arc<dyn MessageTransport>) -> Server {
        Server {
            root: Arc::new(Mutex::new(root)),
            registry: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            transport,
            subscriptions: Mutex::new(HashMap::new()),
            thread: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared handle to the tree, for a [`crate::query::QueryServer`]
    /// mounted alongside this server to introspect the same schema.
    pub fn shared_root(&self) -> Arc<Mutex<Container>> {
        self.root.clone()
    }

    /// Register every parameter already linked into the tree, assigning
    /// dense PIDs in tree-walk order. Must be called before `start`.
    pub fn register_tree(&self) -> Result<(), Error> {
        if self.started.load(Ordering::Acquire) {
            return Err(ErrorCode::Invalid.into());
        }
        let root = self.root.lock().map_err(|_| Error::Lock)?;
        let mut registry = self.registry.lock().map_err(|_| Error::Lock)?;
        root.walk(|_path, param| {
            let pid = registry.len() as u16;
            if param.assign_pid(pid).is_ok() {
                registry.push(param.clone());
            }
        });
        Ok(())
    }

    fn parameter(&self, pid: u16) -> Option<Arc<Parameter>> {
        self.registry.lock().ok()?.get(pid as usize).cloned()
    }

    /// Spawn the receive thread. After this call the schema is frozen.
    pub fn start(self: &Arc<Self>) -> Result<(), Error> {
        self.started.store(true, Ordering::Release);
        let server = self.clone();
        let handle = std::thread::spawn(move || server.recv_loop());
        *self.thread.lock().map_err(|_| Error::Lock)? = Some(handle);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), Error> {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().map_err(|_| Error::Lock)?.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn recv_loop(self: Arc<Self>) {
        while !self.stop.load(Ordering::Acquire) {
            let frame = match self.transport.recv() {
                Ok(f) => f,
                Err(e) => {
                    debug!("server: transport recv error: {}", e);
                    continue;
                }
            };
            let env = match Envelope::decode(&frame) {
                Ok(e) => e,
                Err(e) => {
                    debug!("server: malformed datagram ignored ({})", e);
                    continue;
                }
            };
            if env.is_response {
                continue;
            }
            if let Some(response) = self.dispatch(env) {
                match response.encode() {
                    Ok(bytes) => {
                        if let Err(e) = self.transport.send(&bytes) {
                            warn!("server: send failed: {}", e);
                        }
                    }
                    Err(e) => warn!("server: failed to encode response: {}", e),
                }
            }
        }
    }

    /// Handle one decoded request, returning the response envelope to
    /// send back (`None` for opcodes that have no response, i.e. a
    /// successfully registered CLSUB produces a response, but a PUB
    /// arriving at a server - which should never happen - is dropped).
    fn dispatch(&self, env: Envelope) -> Option<Envelope> {
        let Envelope {
            txid, opcode, mut body, ..
        } = env;
        match opcode {
            Opcode::Get | Opcode::Set | Opcode::Add | Opcode::Sub | Opcode::Call => {
                Some(self.dispatch_scalar(txid, opcode, &mut body))
            }
            Opcode::ICall | Opcode::IGet | Opcode::ISet => {
                Some(self.dispatch_tabular(txid, opcode, &mut body))
            }
            Opcode::Read | Opcode::Write => Some(self.dispatch_file(txid, opcode, &mut body)),
            Opcode::ClSub => Some(self.dispatch_clsub(txid, &mut body)),
            Opcode::ClUnsub => Some(self.dispatch_clunsub(txid, &mut body)),
            Opcode::Pub => None,
        }
    }

    fn dispatch_scalar(&self, txid: u16, opcode: Opcode, body: &mut Cell) -> Envelope {
        let mut out = Cell::new(crate::wire::MAX_BODY_LEN);
        let pid = match body.read_u16() {
            Ok(p) => p,
            Err(e) => return err_response(txid, opcode, e),
        };
        let _ = out.write_u16(pid);
        let Some(param) = self.parameter(pid) else {
            let _ = out.write_i8(ErrorCode::Pid.as_i8());
            return Envelope::response(txid, opcode, out);
        };

        // GET's response carries a value only on success; the errcode is
        // written first so the client can bail out before trying to
        // decode a value that was never written (e.g. on ACCESS/PID).
        if opcode == Opcode::Get {
            let mut scratch = Cell::new(crate::wire::MAX_BODY_LEN);
            let code = param.kind().get_cell(&mut scratch);
            let _ = out.write_i8(code.as_i8());
            if code.is_none() {
                let _ = out.write_bytes(scratch.as_slice());
            }
            return Envelope::response(txid, opcode, out);
        }

        let code = match opcode {
            Opcode::Set => param.kind().set_cell(body),
            Opcode::Add => param.kind().add_cell(body),
            Opcode::Sub => param.kind().sub_cell(body),
            Opcode::Call => {
                let mut call_out = Cell::new(crate::wire::MAX_BODY_LEN);
                param.kind().call_cell(body, &mut call_out)
            }
            _ => ErrorCode::Opcode,
        };
        if code.is_none() {
            if let Some(pid) = param.pid() {
                self.maybe_publish_after_write(opcode, pid, &param);
            }
        }
        let _ = out.write_i8(code.as_i8());
        Envelope::response(txid, opcode, out)
    }

    fn maybe_publish_after_write(&self, opcode: Opcode, pid: u16, param: &Arc<Parameter>) {
        if !matches!(opcode, Opcode::Set | Opcode::Add | Opcode::Sub) {
            return;
        }
        let mut current = Cell::new(crate::wire::MAX_BODY_LEN);
        if param.kind().get_cell(&mut current) != ErrorCode::None {
            return;
        }
        let mut reader = Cell::from_vec(current.into_vec());
        if let Ok(value) = reader.read_value() {
            self.publish(pid, &value);
        }
    }

    fn dispatch_tabular(&self, txid: u16, opcode: Opcode, body: &mut Cell) -> Envelope {
        let mut out = Cell::new(crate::wire::MAX_BODY_LEN);
        let pid = match body.read_u16() {
            Ok(p) => p,
            Err(e) => return err_response(txid, opcode, e),
        };
        let eid = match body.read_u32() {
            Ok(e) => e,
            Err(e) => {
                let _ = out.write_u16(pid);
                let _ = out.write_i8(e.as_i8());
                return Envelope::response(txid, opcode, out);
            }
        };
        let _ = out.write_u16(pid);
        let _ = out.write_u32(eid);
        let Some(param) = self.parameter(pid) else {
            let _ = out.write_i8(ErrorCode::Pid.as_i8());
            return Envelope::response(txid, opcode, out);
        };

        // Same errcode-before-value layout as GET, for the same reason.
        if opcode == Opcode::IGet {
            let mut scratch = Cell::new(crate::wire::MAX_BODY_LEN);
            let code = param.kind().get_cell_tbl(eid, &mut scratch);
            let _ = out.write_i8(code.as_i8());
            if code.is_none() {
                let _ = out.write_bytes(scratch.as_slice());
            }
            return Envelope::response(txid, opcode, out);
        }

        let code = match opcode {
            Opcode::ISet => param.kind().set_cell_tbl(eid, body),
            Opcode::ICall => {
                let mut call_out = Cell::new(crate::wire::MAX_BODY_LEN);
                param.kind().call_cell_tbl(eid, body, &mut call_out)
            }
            _ => ErrorCode::Opcode,
        };
        let _ = out.write_i8(code.as_i8());
        Envelope::response(txid, opcode, out)
    }

    fn dispatch_file(&self, txid: u16, opcode: Opcode, body: &mut Cell) -> Envelope {
        let mut out = Cell::new(crate::wire::MAX_BODY_LEN);
        let pid = match body.read_u16() {
            Ok(p) => p,
            Err(e) => return err_response(txid, opcode, e),
        };
        let offset = match body.read_u32() {
            Ok(v) => v,
            Err(e) => {
                let _ = out.write_u16(pid);
                let _ = out.write_i8(e.as_i8());
                return Envelope::response(txid, opcode, out);
            }
        };
        let length = match body.read_u16() {
            Ok(v) => v,
            Err(e) => {
                let _ = out.write_u16(pid);
                let _ = out.write_u32(offset);
                let _ = out.write_i8(e.as_i8());
                return Envelope::response(txid, opcode, out);
            }
        };
        let incoming = if opcode == Opcode::Write {
            match body.read_bytes(length as usize) {
                Ok(v) => v,
                Err(e) => {
                    let _ = out.write_u16(pid);
                    let _ = out.write_u32(offset);
                    let _ = out.write_i8(e.as_i8());
                    return Envelope::response(txid, opcode, out);
                }
            }
        } else {
            Vec::new()
        };

        let _ = out.write_u16(pid);
        let _ = out.write_u32(offset);

        let Some(param) = self.parameter(pid) else {
            if opcode == Opcode::Write {
                let _ = out.write_u16(length);
            }
            let _ = out.write_i8(ErrorCode::Pid.as_i8());
            return Envelope::response(txid, opcode, out);
        };

        // READ's variable-length payload trails the errcode, same as
        // GET/IGET; WRITE never carries a payload in its response so its
        // echoed length can stay ahead of the errcode.
        match opcode {
            Opcode::Read => {
                let mut scratch = Cell::new(crate::wire::MAX_BODY_LEN);
                let code = param.kind().read_cell(offset, length, &mut scratch);
                let _ = out.write_i8(code.as_i8());
                if code.is_none() {
                    let actual = scratch.as_slice();
                    let _ = out.write_u16(actual.len() as u16);
                    let _ = out.write_bytes(actual);
                }
            }
            Opcode::Write => {
                let code = param.kind().write_cell(offset, &incoming);
                let _ = out.write_u16(length);
                let _ = out.write_i8(code.as_i8());
            }
            _ => {
                let _ = out.write_i8(ErrorCode::Opcode.as_i8());
            }
        }
        Envelope::response(txid, opcode, out)
    }

    fn dispatch_clsub(&self, txid: u16, body: &mut Cell) -> Envelope {
        let mut out = Cell::new(64);
        let code = (|| -> ErrorCode {
            let path = match body.read_str() {
                Ok(s) => s,
                Err(e) => return e,
            };
            let criterion = match body.read_str() {
                Ok(s) => s,
                Err(e) => return e,
            };
            let root = match self.root.lock() {
                Ok(r) => r,
                Err(_) => return ErrorCode::Unspec,
            };
            let Some(Lookup::Parameter(param)) = root.resolve(&path) else {
                return ErrorCode::Notfound;
            };
            let Some(pid) = param.pid() else {
                return ErrorCode::Pid;
            };
            let mut subs = match self.subscriptions.lock() {
                Ok(s) => s,
                Err(_) => return ErrorCode::Unspec,
            };
            subs.entry(pid).or_default().push(Subscription {
                txid,
                path,
                criterion,
            });
            ErrorCode::None
        })();
        let _ = out.write_i8(code.as_i8());
        Envelope::response(txid, Opcode::ClSub, out)
    }

    fn dispatch_clunsub(&self, txid: u16, body: &mut Cell) -> Envelope {
        let mut out = Cell::new(64);
        let code = (|| -> ErrorCode {
            let path = match body.read_str() {
                Ok(s) => s,
                Err(e) => return e,
            };
            let mut subs = match self.subscriptions.lock() {
                Ok(s) => s,
                Err(_) => return ErrorCode::Unspec,
            };
            for list in subs.values_mut() {
                list.retain(|s| s.path != path);
            }
            ErrorCode::None
        })();
        let _ = out.write_i8(code.as_i8());
        Envelope::response(txid, Opcode::ClUnsub, out)
    }

    /// Push a `PUB` to every subscriber of `pid` whose criterion the
    /// new value satisfies.
    pub fn publish(&self, pid: u16, value: &Value) {
        let subs = match self.subscriptions.lock() {
            Ok(s) => s,
            Err(_) => return,
        };
        let Some(list) = subs.get(&pid) else {
            return;
        };
        let text = value.to_text();
        for sub in list {
            if !sub.matches(&text) {
                continue;
            }
            let mut body = Cell::new(crate::wire::MAX_BODY_LEN);
            let _ = body.write_u16(pid);
            if body.write_value(value).is_err() {
                continue;
            }
            let env = Envelope::request(sub.txid, Opcode::Pub, body);
            match env.encode() {
                Ok(bytes) => {
                    if let Err(e) = self.transport.send(&bytes) {
                        warn!("server: publish send failed: {}", e);
                    }
                }
                Err(e) => warn!("server: failed to encode publish: {}", e),
            }
        }
    }
}

fn err_response(txid: u16, opcode: Opcode, code: ErrorCode) -> Envelope {
    let mut out = Cell::new(64);
    let _ = out.write_i8(code.as_i8());
    Envelope::response(txid, opcode, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::param::{Access, ScalarParam};
    use crate::transport::udp::UdpTransport;
    use std::sync::Mutex as StdMutex;

    fn loopback_transport() -> (Arc<UdpTransport>, Arc<UdpTransport>) {
        let a = Arc::new(UdpTransport::bind(0, None).unwrap());
        let addr = a.local_addr().unwrap();
        let b = Arc::new(UdpTransport::connect(0, addr).unwrap());
        (a, b)
    }

    #[test]
    fn get_request_round_trips_through_dispatch() {
        let mut root = Container::root();
        let store = Arc::new(StdMutex::new(7i32));
        root.add_parameter(Arc::new(Parameter::new(
            "gain",
            Access::scalar_rw(),
            Box::new(ScalarParam::mutex(store)),
        )));
        let (srv_transport, cli_transport) = loopback_transport();
        let server = Arc::new(Server::new(root, srv_transport));
        server.register_tree().unwrap();

        let mut body = Cell::new(8);
        body.write_u16(0).unwrap();
        let req = Envelope::request(1, Opcode::Get, body);
        cli_transport.send(&req.encode().unwrap()).unwrap();

        let frame = server.transport.recv().unwrap();
        let env = Envelope::decode(&frame).unwrap();
        let response = server.dispatch(env).unwrap();
        let bytes = response.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        let mut r = decoded.body;
        assert_eq!(r.read_u16(), Ok(0));
        assert_eq!(r.read_i8(), Ok(ErrorCode::None.as_i8()));
        assert_eq!(r.read_value(), Ok(Value::Int32(7)));
    }

    #[test]
    fn unknown_pid_returns_pid_error() {
        let root = Container::root();
        let (srv_transport, _cli) = loopback_transport();
        let server = Arc::new(Server::new(root, srv_transport));
        server.register_tree().unwrap();
        let mut body = Cell::new(8);
        body.write_u16(99).unwrap();
        let env = Envelope::request(1, Opcode::Get, body);
        let response = server.dispatch(env).unwrap();
        let mut r = response.body;
        let _ = r.read_u16();
        assert_eq!(r.read_i8(), Ok(ErrorCode::Pid.as_i8()));
    }
}
