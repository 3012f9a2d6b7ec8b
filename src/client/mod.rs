// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The client: typed PID-addressed request wrappers over a single
//! in-flight transaction, plus a background receive thread that
//! matches responses and dispatches `PUB` notifications.

use crate::cell::Cell;
use crate::error::ErrorCode;
use crate::tree::param::ScalarCodec;
use crate::transport::MessageTransport;
use crate::value::Value;
use crate::wire::{Envelope, Opcode, TxidGen, MAX_BODY_LEN};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

struct InFlight {
    txid: u16,
    opcode: Opcode,
    response: Option<Cell>,
}

struct State {
    gen: TxidGen,
    inflight: Option<InFlight>,
}

type PubCallback = Box<dyn Fn(u16, Value) + Send + Sync>;

/// A single-connection client. One transaction is in flight at a time;
/// concurrent callers serialise on `state`.
pub struct Client {
    transport: Arc<dyn MessageTransport>,
    state: Mutex<State>,
    cvar: Condvar,
    timeout: Duration,
    subscriptions: Mutex<HashMap<u16, PubCallback>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl Client {
    pub fn new(transport: Arc<dyn MessageTransport>, timeout: Duration) -> Arc<Client> {
        let client = Arc::new(Client {
            transport,
            state: Mutex::new(State {
                gen: TxidGen::new(),
                inflight: None,
            }),
            cvar: Condvar::new(),
            timeout,
            subscriptions: Mutex::new(HashMap::new()),
            thread: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
        });
        let bg = client.clone();
        let handle = std::thread::spawn(move || bg.recv_loop());
        *client.thread.lock().expect("client thread mutex poisoned") = Some(handle);
        client
    }

    pub fn close(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.lock().expect("client thread mutex poisoned").take() {
            let _ = handle.join();
        }
    }

    fn recv_loop(self: Arc<Self>) {
        while !self.stop.load(Ordering::Acquire) {
            let frame = match self.transport.recv() {
                Ok(f) => f,
                Err(e) => {
                    debug!("client: transport recv error: {}", e);
                    continue;
                }
            };
            let env = match Envelope::decode(&frame) {
                Ok(e) => e,
                Err(e) => {
                    debug!("client: malformed message ignored ({})", e);
                    continue;
                }
            };
            if env.opcode == Opcode::Pub {
                self.dispatch_pub(env);
                continue;
            }
            let mut guard = match self.state.lock() {
                Ok(g) => g,
                Err(_) => continue,
            };
            if let Some(inflight) = &mut guard.inflight {
                if inflight.txid == env.txid && inflight.opcode == env.opcode {
                    inflight.response = Some(env.body);
                    self.cvar.notify_all();
                }
            }
        }
    }

    fn dispatch_pub(&self, mut env: Envelope) {
        let Ok(pid) = env.body.read_u16() else {
            return;
        };
        let Ok(value) = env.body.read_value() else {
            return;
        };
        let subs = match self.subscriptions.lock() {
            Ok(s) => s,
            Err(_) => return,
        };
        if let Some(cb) = subs.get(&env.txid) {
            cb(pid, value);
        }
    }

    /// Run one request/response exchange: take the mutex, pick the next
    /// transaction id, send, wait for the matching response (or the
    /// configured timeout), release the mutex. Returns the transaction id
    /// used alongside the response body, since `CLSUB` repurposes it as a
    /// subscription handle.
    fn transact(&self, opcode: Opcode, body: Cell) -> Result<(u16, Cell), ErrorCode> {
        let mut guard = self.state.lock().map_err(|_| ErrorCode::Unspec)?;
        let txid = guard.gen.next();
        guard.inflight = Some(InFlight {
            txid,
            opcode,
            response: None,
        });
        let frame = Envelope::request(txid, opcode, body).encode()?;
        if self.transport.send(&frame).is_err() {
            guard.inflight = None;
            return Err(ErrorCode::Unspec);
        }
        let (mut guard, timeout_result) = self
            .cvar
            .wait_timeout_while(guard, self.timeout, |s| {
                s.inflight
                    .as_ref()
                    .is_some_and(|f| f.txid == txid && f.response.is_none())
            })
            .map_err(|_| ErrorCode::Unspec)?;
        let inflight = guard.inflight.take();
        if timeout_result.timed_out() {
            return Err(ErrorCode::Timeout);
        }
        match inflight.and_then(|f| f.response) {
            Some(cell) => Ok((txid, cell)),
            None => Err(ErrorCode::Timeout),
        }
    }

    fn read_pid_and_error(mut body: Cell) -> Result<(u16, ErrorCode), ErrorCode> {
        let pid = body.read_u16()?;
        let raw = body.read_i8()?;
        Ok((pid, ErrorCode::from_i8(raw)))
    }

    pub fn get<T: ScalarCodec>(&self, pid: u16) -> Result<T, ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        let (_, mut response) = self.transact(Opcode::Get, body)?;
        let _pid = response.read_u16()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if !code.is_none() {
            return Err(code);
        }
        let value = response.read_expect(T::type_code())?;
        T::from_value(value)
    }

    pub fn set<T: ScalarCodec>(&self, pid: u16, value: T) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_value(&value.to_value())?;
        let (_, response) = self.transact(Opcode::Set, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn iget<T: ScalarCodec>(&self, pid: u16, eid: u32) -> Result<T, ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(eid)?;
        let (_, mut response) = self.transact(Opcode::IGet, body)?;
        let _pid = response.read_u16()?;
        let _eid = response.read_u32()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if !code.is_none() {
            return Err(code);
        }
        let value = response.read_expect(T::type_code())?;
        T::from_value(value)
    }

    pub fn iset<T: ScalarCodec>(&self, pid: u16, eid: u32, value: T) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(eid)?;
        body.write_value(&value.to_value())?;
        let (_, mut response) = self.transact(Opcode::ISet, body)?;
        let _pid = response.read_u16()?;
        let _eid = response.read_u32()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn add<T: ScalarCodec>(&self, pid: u16, delta: T) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_value(&delta.to_value())?;
        let (_, response) = self.transact(Opcode::Add, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn sub<T: ScalarCodec>(&self, pid: u16, delta: T) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_value(&delta.to_value())?;
        let (_, response) = self.transact(Opcode::Sub, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn call(&self, pid: u16) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        let (_, response) = self.transact(Opcode::Call, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn icall(&self, pid: u16, eid: u32) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(eid)?;
        let (_, mut response) = self.transact(Opcode::ICall, body)?;
        let _pid = response.read_u16()?;
        let _eid = response.read_u32()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn read(&self, pid: u16, offset: u32, length: u16) -> Result<Vec<u8>, ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(offset)?;
        body.write_u16(length)?;
        let (_, mut response) = self.transact(Opcode::Read, body)?;
        let _pid = response.read_u16()?;
        let _offset = response.read_u32()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if !code.is_none() {
            return Err(code);
        }
        let len = response.read_u16()?;
        response.read_bytes(len as usize)
    }

    pub fn write(&self, pid: u16, offset: u32, data: &[u8]) -> Result<(), ErrorCode> {
        if data.len() > u16::MAX as usize {
            return Err(ErrorCode::Overflow);
        }
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(offset)?;
        body.write_u16(data.len() as u16)?;
        body.write_bytes(data)?;
        let (_, mut response) = self.transact(Opcode::Write, body)?;
        let _pid = response.read_u16()?;
        let _offset = response.read_u32()?;
        let _length = response.read_u16()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    // -- untyped wrappers, used by the aggregator to mirror a remote
    // schema whose concrete Rust type isn't known until the remote
    // responds with its own type tag.

    pub fn get_raw(&self, pid: u16) -> Result<Value, ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        let (_, mut response) = self.transact(Opcode::Get, body)?;
        let _pid = response.read_u16()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if !code.is_none() {
            return Err(code);
        }
        response.read_value()
    }

    pub fn set_raw(&self, pid: u16, value: &Value) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_value(value)?;
        let (_, response) = self.transact(Opcode::Set, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn iget_raw(&self, pid: u16, eid: u32) -> Result<Value, ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(eid)?;
        let (_, mut response) = self.transact(Opcode::IGet, body)?;
        let _pid = response.read_u16()?;
        let _eid = response.read_u32()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if !code.is_none() {
            return Err(code);
        }
        response.read_value()
    }

    pub fn iset_raw(&self, pid: u16, eid: u32, value: &Value) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_u32(eid)?;
        body.write_value(value)?;
        let (_, mut response) = self.transact(Opcode::ISet, body)?;
        let _pid = response.read_u16()?;
        let _eid = response.read_u32()?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn add_raw(&self, pid: u16, delta: &Value) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_value(delta)?;
        let (_, response) = self.transact(Opcode::Add, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn sub_raw(&self, pid: u16, delta: &Value) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_u16(pid)?;
        body.write_value(delta)?;
        let (_, response) = self.transact(Opcode::Sub, body)?;
        let (_pid, code) = Self::read_pid_and_error(response)?;
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }

    pub fn call_raw(&self, pid: u16) -> Result<(), ErrorCode> {
        self.call(pid)
    }

    pub fn icall_raw(&self, pid: u16, eid: u32) -> Result<(), ErrorCode> {
        self.icall(pid, eid)
    }

    pub fn read_raw(&self, pid: u16, offset: u32, length: u16) -> Result<Vec<u8>, ErrorCode> {
        self.read(pid, offset, length)
    }

    pub fn write_raw(&self, pid: u16, offset: u32, data: &[u8]) -> Result<(), ErrorCode> {
        self.write(pid, offset, data)
    }

    /// Subscribe to a path, registering `callback` to be invoked with
    /// `(pid, value)` on every matching publish. Returns a handle
    /// (really the transaction-id the server will echo in each `PUB`)
    /// to later pass the same path into [`Client::cl_unsub`].
    pub fn cl_sub<F>(&self, path: &str, criterion: &str, callback: F) -> Result<u16, ErrorCode>
    where
        F: Fn(u16, Value) + Send + Sync + 'static,
    {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_str(path)?;
        body.write_str(criterion)?;
        let (handle, mut response) = self.transact(Opcode::ClSub, body)?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if !code.is_none() {
            return Err(code);
        }
        self.subscriptions
            .lock()
            .map_err(|_| ErrorCode::Unspec)?
            .insert(handle, Box::new(callback));
        Ok(handle)
    }

    pub fn cl_unsub(&self, path: &str) -> Result<(), ErrorCode> {
        let mut body = Cell::new(MAX_BODY_LEN);
        body.write_str(path)?;
        let (_, mut response) = self.transact(Opcode::ClUnsub, body)?;
        let code = ErrorCode::from_i8(response.read_i8()?);
        if code.is_none() {
            Ok(())
        } else {
            Err(code)
        }
    }
}
