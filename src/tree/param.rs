// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Parameters: typed tree leaves dispatched through a small trait object
//! contract, the same shape the teacher crate uses for its `Field` trait
//! (`data_block`/`offset`/`to_bytes` dispatched per concrete field kind)
//! generalized here to the five parameter kinds named in the data model
//! (scalar, tabular, list, file, callable).

use crate::cell::Cell;
use crate::error::ErrorCode;
use crate::value::{TypeCode, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;

/// Which operations a parameter answers. Unset access bits aren't
/// enforced separately from `ParamKind`'s default `ACCESS` responses;
/// they exist for introspection (the query server reports them).
#[derive(Debug, Clone, Copy, Default)]
pub struct Access {
    pub readable: bool,
    pub writable: bool,
    pub invokable: bool,
    pub tabular: bool,
    pub file_like: bool,
}

impl Access {
    pub fn scalar_rw() -> Access {
        Access {
            readable: true,
            writable: true,
            ..Default::default()
        }
    }

    pub fn scalar_ro() -> Access {
        Access {
            readable: true,
            ..Default::default()
        }
    }

    pub fn tabular_rw() -> Access {
        Access {
            readable: true,
            writable: true,
            tabular: true,
            ..Default::default()
        }
    }

    pub fn file() -> Access {
        Access {
            file_like: true,
            ..Default::default()
        }
    }

    pub fn callable() -> Access {
        Access {
            invokable: true,
            ..Default::default()
        }
    }
}

/// Inclusive numeric bounds and quantum checked before a scalar set
/// handler runs.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Bounds {
    pub fn check(&self, v: f64) -> Result<(), ErrorCode> {
        if v < self.min || v > self.max {
            return Err(ErrorCode::Range);
        }
        if self.step > 0.0 {
            let steps = (v - self.min) / self.step;
            if (steps - steps.round()).abs() > 1e-9 {
                return Err(ErrorCode::Step);
            }
        }
        Ok(())
    }
}

/// The per-kind dispatch contract every parameter implements. A handler
/// not meaningful for a given kind keeps the default, which answers
/// `ACCESS`.
pub trait ParamKind: Send + Sync {
    fn type_code(&self) -> TypeCode;

    fn get_cell(&self, _out: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn set_cell(&self, _input: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn get_cell_tbl(&self, _eid: u32, _out: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn set_cell_tbl(&self, _eid: u32, _input: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn add_cell(&self, _input: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn sub_cell(&self, _input: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn read_cell(&self, _offset: u32, _length: u16, _out: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn write_cell(&self, _offset: u32, _data: &[u8]) -> ErrorCode {
        ErrorCode::Access
    }

    fn call_cell(&self, _input: &mut Cell, _out: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }

    fn call_cell_tbl(&self, _eid: u32, _input: &mut Cell, _out: &mut Cell) -> ErrorCode {
        ErrorCode::Access
    }
}

/// Converts a concrete Rust type to and from the wire [`Value`] enum.
/// Implemented for every scalar kind named in the data model so
/// [`ScalarParam`], [`TabularParam`], and [`ListParam`] can be generic
/// over it.
pub trait ScalarCodec: Clone + Send + Sync + 'static {
    fn to_value(&self) -> Value;
    fn from_value(v: Value) -> Result<Self, ErrorCode>;
    fn type_code() -> TypeCode;
    fn to_f64(&self) -> Option<f64> {
        None
    }
}

macro_rules! impl_scalar_codec_numeric {
    ($t:ty, $variant:ident, $tc:ident) => {
        impl ScalarCodec for $t {
            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }
            fn from_value(v: Value) -> Result<Self, ErrorCode> {
                match v {
                    Value::$variant(x) => Ok(x),
                    _ => Err(ErrorCode::Type),
                }
            }
            fn type_code() -> TypeCode {
                TypeCode::$tc
            }
            fn to_f64(&self) -> Option<f64> {
                Some(*self as f64)
            }
        }
    };
}

impl_scalar_codec_numeric!(i8, Int8, Int8);
impl_scalar_codec_numeric!(i16, Int16, Int16);
impl_scalar_codec_numeric!(i32, Int32, Int32);
impl_scalar_codec_numeric!(i64, Int64, Int64);
impl_scalar_codec_numeric!(u8, Uint8, Uint8);
impl_scalar_codec_numeric!(u16, Uint16, Uint16);
impl_scalar_codec_numeric!(u32, Uint32, Uint32);
impl_scalar_codec_numeric!(u64, Uint64, Uint64);
impl_scalar_codec_numeric!(f32, Float, Float);
impl_scalar_codec_numeric!(f64, Double, Double);

impl ScalarCodec for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
    fn from_value(v: Value) -> Result<Self, ErrorCode> {
        match v {
            Value::Bool(x) => Ok(x),
            _ => Err(ErrorCode::Type),
        }
    }
    fn type_code() -> TypeCode {
        TypeCode::Bool
    }
}

impl ScalarCodec for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
    fn from_value(v: Value) -> Result<Self, ErrorCode> {
        match v {
            Value::Str(x) => Ok(x),
            _ => Err(ErrorCode::Type),
        }
    }
    fn type_code() -> TypeCode {
        TypeCode::Str
    }
}

/// A user-supplied getter/setter pair backing a scalar parameter. Kept as
/// trait objects so server code doesn't need to be generic over the
/// user's storage strategy (a plain `Mutex<T>`, an atomic, a hardware
/// register shim, etc.).
pub struct ScalarParam<T: ScalarCodec> {
    get: Box<dyn Fn() -> T + Send + Sync>,
    set: Option<Box<dyn Fn(T) -> ErrorCode + Send + Sync>>,
    bounds: Option<Bounds>,
}

impl<T: ScalarCodec> ScalarParam<T> {
    pub fn read_only<G>(get: G) -> ScalarParam<T>
    where
        G: Fn() -> T + Send + Sync + 'static,
    {
        ScalarParam {
            get: Box::new(get),
            set: None,
            bounds: None,
        }
    }

    pub fn read_write<G, S>(get: G, set: S) -> ScalarParam<T>
    where
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) -> ErrorCode + Send + Sync + 'static,
    {
        ScalarParam {
            get: Box::new(get),
            set: Some(Box::new(set)),
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Backed by a plain `Mutex<T>` the caller owns via `Arc`, the most
    /// common case (mirrors the teacher's `Mutex`-wrapped transport
    /// state).
    pub fn mutex(store: std::sync::Arc<Mutex<T>>) -> ScalarParam<T> {
        let get_store = store.clone();
        let set_store = store;
        ScalarParam::read_write(
            move || get_store.lock().expect("parameter mutex poisoned").clone(),
            move |v| {
                *set_store.lock().expect("parameter mutex poisoned") = v;
                ErrorCode::None
            },
        )
    }
}

impl<T: ScalarCodec> ParamKind for ScalarParam<T> {
    fn type_code(&self) -> TypeCode {
        T::type_code()
    }

    fn get_cell(&self, out: &mut Cell) -> ErrorCode {
        let v = (self.get)();
        match out.write_value(&v.to_value()) {
            Ok(()) => ErrorCode::None,
            Err(e) => e,
        }
    }

    fn set_cell(&self, input: &mut Cell) -> ErrorCode {
        let Some(set) = &self.set else {
            return ErrorCode::Access;
        };
        let value = match input.read_expect(T::type_code()) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let parsed = match T::from_value(value) {
            Ok(v) => v,
            Err(e) => return e,
        };
        if let Some(bounds) = self.bounds {
            if let Some(f) = parsed.to_f64() {
                if let Err(e) = bounds.check(f) {
                    return e;
                }
            }
        }
        set(parsed)
    }
}

/// A tabular parameter indexed by 32-bit EID, each row independently
/// readable/writable. Rows are created lazily on first write and report
/// `EID` for an unknown row on read.
pub struct TabularParam<T: ScalarCodec> {
    rows: Mutex<HashMap<u32, T>>,
    default: T,
}

impl<T: ScalarCodec> TabularParam<T> {
    pub fn new(default: T) -> TabularParam<T> {
        TabularParam {
            rows: Mutex::new(HashMap::new()),
            default,
        }
    }
}

impl<T: ScalarCodec> ParamKind for TabularParam<T> {
    fn type_code(&self) -> TypeCode {
        T::type_code()
    }

    fn get_cell_tbl(&self, eid: u32, out: &mut Cell) -> ErrorCode {
        let rows = self.rows.lock().expect("tabular parameter mutex poisoned");
        let v = match rows.get(&eid) {
            Some(v) => v.clone(),
            None => self.default.clone(),
        };
        match out.write_value(&v.to_value()) {
            Ok(()) => ErrorCode::None,
            Err(e) => e,
        }
    }

    fn set_cell_tbl(&self, eid: u32, input: &mut Cell) -> ErrorCode {
        let value = match input.read_expect(T::type_code()) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let parsed = match T::from_value(value) {
            Ok(v) => v,
            Err(e) => return e,
        };
        self.rows
            .lock()
            .expect("tabular parameter mutex poisoned")
            .insert(eid, parsed);
        ErrorCode::None
    }
}

/// A list parameter supporting relative `add`/`sub` adjustments on top of
/// a running numeric total, for counters and accumulators.
pub struct ListParam<T> {
    total: Mutex<T>,
}

impl<T> ListParam<T>
where
    T: ScalarCodec + std::ops::Add<Output = T> + std::ops::Sub<Output = T>,
{
    pub fn new(initial: T) -> ListParam<T> {
        ListParam {
            total: Mutex::new(initial),
        }
    }
}

impl<T> ParamKind for ListParam<T>
where
    T: ScalarCodec + std::ops::Add<Output = T> + std::ops::Sub<Output = T>,
{
    fn type_code(&self) -> TypeCode {
        T::type_code()
    }

    fn get_cell(&self, out: &mut Cell) -> ErrorCode {
        let v = self.total.lock().expect("list parameter mutex poisoned").clone();
        match out.write_value(&v.to_value()) {
            Ok(()) => ErrorCode::None,
            Err(e) => e,
        }
    }

    fn add_cell(&self, input: &mut Cell) -> ErrorCode {
        let delta = match input.read_expect(T::type_code()).and_then(T::from_value) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let mut total = self.total.lock().expect("list parameter mutex poisoned");
        *total = total.clone() + delta;
        ErrorCode::None
    }

    fn sub_cell(&self, input: &mut Cell) -> ErrorCode {
        let delta = match input.read_expect(T::type_code()).and_then(T::from_value) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let mut total = self.total.lock().expect("list parameter mutex poisoned");
        *total = total.clone() - delta;
        ErrorCode::None
    }
}

/// A byte-stream parameter for upload/download, addressed by
/// offset/length rather than by a single tagged value.
pub struct FileParam {
    data: Mutex<Vec<u8>>,
}

impl FileParam {
    pub fn new() -> FileParam {
        FileParam {
            data: Mutex::new(Vec::new()),
        }
    }
}

impl Default for FileParam {
    fn default() -> Self {
        FileParam::new()
    }
}

impl ParamKind for FileParam {
    fn type_code(&self) -> TypeCode {
        TypeCode::Uint8Array
    }

    fn read_cell(&self, offset: u32, length: u16, out: &mut Cell) -> ErrorCode {
        let data = self.data.lock().expect("file parameter mutex poisoned");
        let offset = offset as usize;
        if offset > data.len() {
            return ErrorCode::Range;
        }
        let end = (offset + length as usize).min(data.len());
        match out.write_bytes(&data[offset..end]) {
            Ok(()) => ErrorCode::None,
            Err(e) => e,
        }
    }

    fn write_cell(&self, offset: u32, bytes: &[u8]) -> ErrorCode {
        let mut data = self.data.lock().expect("file parameter mutex poisoned");
        let offset = offset as usize;
        if offset > data.len() {
            return ErrorCode::Range;
        }
        let end = offset + bytes.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(bytes);
        ErrorCode::None
    }
}

/// A callable parameter: no stored value, invoked for its side effect
/// and an error code.
pub struct CallParam {
    call: Box<dyn Fn() -> ErrorCode + Send + Sync>,
}

impl CallParam {
    pub fn new<F>(call: F) -> CallParam
    where
        F: Fn() -> ErrorCode + Send + Sync + 'static,
    {
        CallParam {
            call: Box::new(call),
        }
    }
}

impl ParamKind for CallParam {
    fn type_code(&self) -> TypeCode {
        TypeCode::Call
    }

    fn call_cell(&self, _input: &mut Cell, _out: &mut Cell) -> ErrorCode {
        (self.call)()
    }
}

/// A tree leaf. PID is unassigned (`u16::MAX`) until
/// [`crate::server::Server::add`] registers it.
pub struct Parameter {
    name: String,
    pid: AtomicU16,
    access: Access,
    kind: Box<dyn ParamKind>,
    value_enum: Option<Vec<(i64, String)>>,
    eid_enum: Option<Vec<(u32, String)>>,
    scale: Option<f64>,
}

pub const UNASSIGNED_PID: u16 = u16::MAX;

impl Parameter {
    pub fn new(name: impl Into<String>, access: Access, kind: Box<dyn ParamKind>) -> Parameter {
        Parameter {
            name: name.into(),
            pid: AtomicU16::new(UNASSIGNED_PID),
            access,
            kind,
            value_enum: None,
            eid_enum: None,
            scale: None,
        }
    }

    pub fn with_value_enum(mut self, table: Vec<(i64, String)>) -> Self {
        self.value_enum = Some(table);
        self
    }

    pub fn with_eid_enum(mut self, table: Vec<(u32, String)>) -> Self {
        self.eid_enum = Some(table);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn type_code(&self) -> TypeCode {
        self.kind.type_code()
    }

    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    pub fn value_enum(&self) -> Option<&[(i64, String)]> {
        self.value_enum.as_deref()
    }

    pub fn eid_enum(&self) -> Option<&[(u32, String)]> {
        self.eid_enum.as_deref()
    }

    pub fn pid(&self) -> Option<u16> {
        let p = self.pid.load(Ordering::Acquire);
        if p == UNASSIGNED_PID {
            None
        } else {
            Some(p)
        }
    }

    /// Assign a PID. Returns `INVALID` if a PID has already been
    /// assigned, since a parameter may belong to exactly one server.
    pub fn assign_pid(&self, pid: u16) -> Result<(), ErrorCode> {
        match self
            .pid
            .compare_exchange(UNASSIGNED_PID, pid, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(_) => Err(ErrorCode::Invalid),
        }
    }

    pub fn kind(&self) -> &dyn ParamKind {
        self.kind.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn scalar_param_get_set_roundtrip() {
        let store = Arc::new(Mutex::new(0i32));
        let p = ScalarParam::mutex(store);
        let mut out = Cell::new(64);
        assert_eq!(p.get_cell(&mut out), ErrorCode::None);
        let mut input = Cell::new(64);
        input.write_value(&Value::Int32(42)).unwrap();
        assert_eq!(p.set_cell(&mut input), ErrorCode::None);
        let mut out2 = Cell::new(64);
        p.get_cell(&mut out2);
        let mut r = Cell::from_vec(out2.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Int32(42)));
    }

    #[test]
    fn scalar_param_rejects_out_of_range() {
        let p = ScalarParam::read_write(|| 0i32, |_| ErrorCode::None)
            .with_bounds(Bounds { min: 0.0, max: 10.0, step: 0.0 });
        let mut input = Cell::new(64);
        input.write_value(&Value::Int32(20)).unwrap();
        assert_eq!(p.set_cell(&mut input), ErrorCode::Range);
    }

    #[test]
    fn scalar_param_read_only_rejects_set() {
        let p = ScalarParam::read_only(|| 5i32);
        let mut input = Cell::new(64);
        input.write_value(&Value::Int32(1)).unwrap();
        assert_eq!(p.set_cell(&mut input), ErrorCode::Access);
    }

    #[test]
    fn tabular_param_unknown_row_returns_default() {
        let t = TabularParam::new(0u32);
        let mut out = Cell::new(64);
        assert_eq!(t.get_cell_tbl(5, &mut out), ErrorCode::None);
        let mut r = Cell::from_vec(out.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Uint32(0)));
    }

    #[test]
    fn list_param_add_and_sub() {
        let l = ListParam::new(10i32);
        let mut input = Cell::new(64);
        input.write_value(&Value::Int32(5)).unwrap();
        assert_eq!(l.add_cell(&mut input), ErrorCode::None);
        let mut out = Cell::new(64);
        l.get_cell(&mut out);
        let mut r = Cell::from_vec(out.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Int32(15)));
    }

    #[test]
    fn file_param_write_then_read_range() {
        let f = FileParam::new();
        assert_eq!(f.write_cell(0, b"hello world"), ErrorCode::None);
        let mut out = Cell::new(64);
        assert_eq!(f.read_cell(6, 5, &mut out), ErrorCode::None);
        assert_eq!(out.as_slice(), b"world");
    }

    #[test]
    fn file_param_write_past_end_is_range() {
        let f = FileParam::new();
        assert_eq!(f.write_cell(10, b"x"), ErrorCode::Range);
    }

    #[test]
    fn call_param_invokes_closure() {
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        let p = CallParam::new(move || {
            *c.lock().unwrap() += 1;
            ErrorCode::None
        });
        let mut input = Cell::new(8);
        let mut out = Cell::new(8);
        assert_eq!(p.call_cell(&mut input, &mut out), ErrorCode::None);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn pid_can_only_be_assigned_once() {
        let param = Parameter::new("x", Access::scalar_ro(), Box::new(ScalarParam::read_only(|| 1i32)));
        assert_eq!(param.pid(), None);
        assert_eq!(param.assign_pid(3), Ok(()));
        assert_eq!(param.pid(), Some(3));
        assert_eq!(param.assign_pid(4), Err(ErrorCode::Invalid));
    }
}
