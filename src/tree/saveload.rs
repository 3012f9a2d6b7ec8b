// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Flat-file save/load: one `path=value` line per writable scalar or
//! string parameter, replayed on load through the same command grammar
//! and evaluator the interactive shell (out of scope) would use.

use super::command::{self, Command, RowRef};
use super::container::Container;
use super::{value_from_literal, value_to_text};
use crate::cell::Cell;
use crate::error::{Error, ErrorCode};
use crate::value::{TypeCode, Value};
use log::{debug, warn};
use std::io::{BufRead, Write};

fn is_savable(tc: TypeCode) -> bool {
    matches!(
        tc,
        TypeCode::Bool
            | TypeCode::Int8
            | TypeCode::Int16
            | TypeCode::Int32
            | TypeCode::Int64
            | TypeCode::Uint8
            | TypeCode::Uint16
            | TypeCode::Uint32
            | TypeCode::Uint64
            | TypeCode::Float
            | TypeCode::Double
            | TypeCode::Str
    )
}

/// Write one `path=value` line for every writable scalar/string
/// parameter reachable from `root`.
pub fn save(root: &Container, w: &mut impl Write) -> Result<(), Error> {
    let mut lines = Vec::new();
    root.walk(|path, param| {
        let tc = param.type_code();
        if !param.access().writable || !is_savable(tc) {
            return;
        }
        let mut out = Cell::new(4096);
        if param.kind().get_cell(&mut out) != ErrorCode::None {
            return;
        }
        let mut reader = Cell::from_vec(out.into_vec());
        if let Ok(value) = reader.read_value() {
            lines.push(format!("{}={}", path, value_to_text(&value, param.scale())));
        }
    });
    for line in lines {
        writeln!(w, "{}", line)?;
    }
    Ok(())
}

/// Replay every non-comment, non-blank line from `r` as a command
/// against `root`. A malformed or failing line is logged and skipped;
/// load does not abort on the first error, matching a save file being
/// edited by hand.
pub fn load(root: &Container, r: impl BufRead) -> Result<(), Error> {
    for (lineno, line) in r.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match command::parse(trimmed) {
            Ok(cmd) => {
                if let Err(e) = apply(root, &cmd) {
                    warn!("load: line {}: {} ({})", lineno + 1, trimmed, e);
                }
            }
            Err(e) => debug!("load: line {}: unparsable ({})", lineno + 1, e),
        }
    }
    Ok(())
}

/// Apply one parsed command directly against the local tree (no wire
/// round-trip; used by both load and the one-shot tools when they talk
/// to a locally-built tree rather than a remote server).
pub fn apply(root: &Container, cmd: &Command) -> Result<(), ErrorCode> {
    match cmd {
        Command::Set { path, value } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let v = value_from_literal(param.type_code(), param.scale(), value)?;
            let mut input = Cell::new(4096);
            input.write_value(&v)?;
            err_to_result(param.kind().set_cell(&mut input))
        }
        Command::SetRow { path, row, value } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let eid = resolve_row(param, row)?;
            let v = value_from_literal(param.type_code(), param.scale(), value)?;
            let mut input = Cell::new(4096);
            input.write_value(&v)?;
            err_to_result(param.kind().set_cell_tbl(eid, &mut input))
        }
        Command::Call { path } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let mut input = Cell::new(8);
            let mut out = Cell::new(8);
            err_to_result(param.kind().call_cell(&mut input, &mut out))
        }
        Command::CallRow { path, row } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let eid = resolve_row(param, row)?;
            let mut input = Cell::new(8);
            let mut out = Cell::new(8);
            err_to_result(param.kind().call_cell_tbl(eid, &mut input, &mut out))
        }
        Command::Add { path, value } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let v = value_from_literal(param.type_code(), param.scale(), value)?;
            let mut input = Cell::new(4096);
            input.write_value(&v)?;
            err_to_result(param.kind().add_cell(&mut input))
        }
        Command::Sub { path, value } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let v = value_from_literal(param.type_code(), param.scale(), value)?;
            let mut input = Cell::new(4096);
            input.write_value(&v)?;
            err_to_result(param.kind().sub_cell(&mut input))
        }
        Command::Upload { path, file } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let bytes = std::fs::read(file).map_err(|_| ErrorCode::Notfound)?;
            err_to_result(param.kind().write_cell(0, &bytes))
        }
        Command::Download { path, file } => {
            let param = root.resolve_parameter(path).ok_or(ErrorCode::Notfound)?;
            let mut out = Cell::new(1 << 20);
            let code = param.kind().read_cell(0, u16::MAX, &mut out);
            err_to_result(code)?;
            std::fs::write(file, out.as_slice()).map_err(|_| ErrorCode::Unspec)
        }
    }
}

fn resolve_row(param: &crate::tree::param::Parameter, row: &RowRef) -> Result<u32, ErrorCode> {
    match row {
        RowRef::Eid(eid) => Ok(*eid),
        RowRef::Enum(name) => param
            .eid_enum()
            .and_then(|table| table.iter().find(|(_, n)| n == name))
            .map(|(eid, _)| *eid)
            .ok_or(ErrorCode::Eid),
    }
}

fn err_to_result(code: ErrorCode) -> Result<(), ErrorCode> {
    if code.is_none() {
        Ok(())
    } else {
        Err(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::param::{Access, ScalarParam};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn sample_tree() -> Container {
        let mut root = Container::root();
        let store = Arc::new(Mutex::new(3i32));
        root.add_parameter(Arc::new(crate::tree::param::Parameter::new(
            "gain",
            Access::scalar_rw(),
            Box::new(ScalarParam::mutex(store)),
        )));
        root
    }

    #[test]
    fn save_emits_one_line_per_writable_scalar() {
        let root = sample_tree();
        let mut buf = Vec::new();
        save(&root, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "/gain=3\n");
    }

    #[test]
    fn load_replays_set_commands() {
        let root = sample_tree();
        let input = Cursor::new(b"# comment\n/gain=7\n\n".to_vec());
        load(&root, input).unwrap();
        let param = root.resolve_parameter("/gain").unwrap();
        let mut out = Cell::new(64);
        param.kind().get_cell(&mut out);
        let mut r = Cell::from_vec(out.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Int32(7)));
    }

    #[test]
    fn load_skips_bad_lines_without_aborting() {
        let root = sample_tree();
        let input = Cursor::new(b"/nope=1\n/gain=9\n".to_vec());
        load(&root, input).unwrap();
        let param = root.resolve_parameter("/gain").unwrap();
        let mut out = Cell::new(64);
        param.kind().get_cell(&mut out);
        let mut r = Cell::from_vec(out.into_vec());
        assert_eq!(r.read_value(), Ok(Value::Int32(9)));
    }
}
