// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The command grammar shared by save/load and the one-shot tools'
//! underlying library calls: `P=N`, `P="S"`, `P[I]=N`, `P["E"]=N`,
//! `P()`, `P(I)`, `P("E")`, `P<N`, `P>N`, `P@"file"`, `P#"file"`.
//!
//! A leading `#` on a whole line is a comment; that rule belongs to the
//! save/load file reader, not this parser, since a single CLI invocation
//! never carries a comment.

use crate::error::ErrorCode;

/// A literal value in a command's argument position, before it is
/// reconciled against the target parameter's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
}

/// How a tabular command addresses its row: directly by EID, or
/// symbolically through the parameter's EID-enum table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowRef {
    Eid(u32),
    Enum(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { path: String, value: Literal },
    SetRow { path: String, row: RowRef, value: Literal },
    Call { path: String },
    CallRow { path: String, row: RowRef },
    Add { path: String, value: Literal },
    Sub { path: String, value: Literal },
    Upload { path: String, file: String },
    Download { path: String, file: String },
}

const TERMINATORS: [char; 7] = ['=', '[', '(', '<', '>', '@', '#'];

/// Parse a single command line (without a leading `#` comment). Returns
/// `INVALID` for anything that doesn't match the grammar.
pub fn parse(line: &str) -> Result<Command, ErrorCode> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ErrorCode::Invalid);
    }
    let split_at = line.find(|c| TERMINATORS.contains(&c)).ok_or(ErrorCode::Invalid)?;
    let path = &line[..split_at];
    if path.is_empty() {
        return Err(ErrorCode::Invalid);
    }
    let rest = &line[split_at..];
    let mut chars = rest.chars();
    match chars.next().unwrap() {
        '=' => {
            let value = parse_literal(&rest[1..])?;
            Ok(Command::Set {
                path: path.to_string(),
                value,
            })
        }
        '[' => parse_row_set(path, rest),
        '(' => parse_call(path, rest),
        '<' => Ok(Command::Sub {
            path: path.to_string(),
            value: parse_literal(&rest[1..])?,
        }),
        '>' => Ok(Command::Add {
            path: path.to_string(),
            value: parse_literal(&rest[1..])?,
        }),
        '@' => Ok(Command::Upload {
            path: path.to_string(),
            file: parse_quoted(&rest[1..])?,
        }),
        '#' => Ok(Command::Download {
            path: path.to_string(),
            file: parse_quoted(&rest[1..])?,
        }),
        _ => Err(ErrorCode::Invalid),
    }
}

fn parse_row_set(path: &str, rest: &str) -> Result<Command, ErrorCode> {
    let close = rest.find(']').ok_or(ErrorCode::Invalid)?;
    let inner = &rest[1..close];
    let row = parse_row_ref(inner)?;
    let after = &rest[close + 1..];
    if !after.starts_with('=') {
        return Err(ErrorCode::Invalid);
    }
    let value = parse_literal(&after[1..])?;
    Ok(Command::SetRow {
        path: path.to_string(),
        row,
        value,
    })
}

fn parse_call(path: &str, rest: &str) -> Result<Command, ErrorCode> {
    let close = rest.find(')').ok_or(ErrorCode::Invalid)?;
    let inner = rest[1..close].trim();
    if inner.is_empty() {
        return Ok(Command::Call {
            path: path.to_string(),
        });
    }
    Ok(Command::CallRow {
        path: path.to_string(),
        row: parse_row_ref(inner)?,
    })
}

fn parse_row_ref(inner: &str) -> Result<RowRef, ErrorCode> {
    if let Some(s) = strip_quotes(inner) {
        Ok(RowRef::Enum(s.to_string()))
    } else {
        inner.parse::<u32>().map(RowRef::Eid).map_err(|_| ErrorCode::Invalid)
    }
}

fn parse_literal(s: &str) -> Result<Literal, ErrorCode> {
    let s = s.trim();
    if let Some(inner) = strip_quotes(s) {
        return Ok(Literal::Str(inner.to_string()));
    }
    s.parse::<f64>().map(Literal::Num).map_err(|_| ErrorCode::Invalid)
}

fn parse_quoted(s: &str) -> Result<String, ErrorCode> {
    strip_quotes(s.trim())
        .map(|s| s.to_string())
        .ok_or(ErrorCode::Invalid)
}

fn strip_quotes(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_set() {
        assert_eq!(
            parse("/motor/velocity=3.5"),
            Ok(Command::Set {
                path: "/motor/velocity".to_string(),
                value: Literal::Num(3.5)
            })
        );
    }

    #[test]
    fn parses_quoted_string_set() {
        assert_eq!(
            parse("/label=\"hello world\""),
            Ok(Command::Set {
                path: "/label".to_string(),
                value: Literal::Str("hello world".to_string())
            })
        );
    }

    #[test]
    fn parses_row_set_by_eid() {
        assert_eq!(
            parse("/tbl[3]=9"),
            Ok(Command::SetRow {
                path: "/tbl".to_string(),
                row: RowRef::Eid(3),
                value: Literal::Num(9.0)
            })
        );
    }

    #[test]
    fn parses_row_set_by_enum() {
        assert_eq!(
            parse("/tbl[\"east\"]=1"),
            Ok(Command::SetRow {
                path: "/tbl".to_string(),
                row: RowRef::Enum("east".to_string()),
                value: Literal::Num(1.0)
            })
        );
    }

    #[test]
    fn parses_bare_call() {
        assert_eq!(
            parse("/reset()"),
            Ok(Command::Call {
                path: "/reset".to_string()
            })
        );
    }

    #[test]
    fn parses_call_with_eid() {
        assert_eq!(
            parse("/axis/home(2)"),
            Ok(Command::CallRow {
                path: "/axis/home".to_string(),
                row: RowRef::Eid(2)
            })
        );
    }

    #[test]
    fn parses_add_and_sub() {
        assert_eq!(
            parse("/counter>5"),
            Ok(Command::Add {
                path: "/counter".to_string(),
                value: Literal::Num(5.0)
            })
        );
        assert_eq!(
            parse("/counter<5"),
            Ok(Command::Sub {
                path: "/counter".to_string(),
                value: Literal::Num(5.0)
            })
        );
    }

    #[test]
    fn parses_upload_and_download() {
        assert_eq!(
            parse("/firmware@\"fw.bin\""),
            Ok(Command::Upload {
                path: "/firmware".to_string(),
                file: "fw.bin".to_string()
            })
        );
        assert_eq!(
            parse("/firmware#\"fw.bin\""),
            Ok(Command::Download {
                path: "/firmware".to_string(),
                file: "fw.bin".to_string()
            })
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse(""), Err(ErrorCode::Invalid));
        assert_eq!(parse("/x"), Err(ErrorCode::Invalid));
        assert_eq!(parse("/x=abc"), Err(ErrorCode::Invalid));
        assert_eq!(parse("/x[1=2"), Err(ErrorCode::Invalid));
    }
}
