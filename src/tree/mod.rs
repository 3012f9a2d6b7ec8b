// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The parameter tree: containers, parameters, path resolution, the
//! command grammar, and save/load built on top of it.

pub mod command;
pub mod container;
pub mod param;
pub mod path;
pub mod saveload;

use crate::error::ErrorCode;
use crate::value::{TypeCode, Value};
use command::Literal;

/// Reconcile a grammar literal against a parameter's declared wire type,
/// applying `scale` (wire-value × scale = value as typed by the user) to
/// numeric kinds when present.
pub fn value_from_literal(tc: TypeCode, scale: Option<f64>, lit: &Literal) -> Result<Value, ErrorCode> {
    let descale = |x: f64| scale.map_or(x, |s| if s != 0.0 { x / s } else { x });
    Ok(match (tc, lit) {
        (TypeCode::Str, Literal::Str(s)) => Value::Str(s.clone()),
        (TypeCode::Bool, Literal::Num(n)) => Value::Bool(*n != 0.0),
        (TypeCode::Int8, Literal::Num(n)) => Value::Int8(descale(*n) as i8),
        (TypeCode::Int16, Literal::Num(n)) => Value::Int16(descale(*n) as i16),
        (TypeCode::Int32, Literal::Num(n)) => Value::Int32(descale(*n) as i32),
        (TypeCode::Int64, Literal::Num(n)) => Value::Int64(descale(*n) as i64),
        (TypeCode::Uint8, Literal::Num(n)) => Value::Uint8(descale(*n) as u8),
        (TypeCode::Uint16, Literal::Num(n)) => Value::Uint16(descale(*n) as u16),
        (TypeCode::Uint32, Literal::Num(n)) => Value::Uint32(descale(*n) as u32),
        (TypeCode::Uint64, Literal::Num(n)) => Value::Uint64(descale(*n) as u64),
        (TypeCode::Float, Literal::Num(n)) => Value::Float(descale(*n) as f32),
        (TypeCode::Double, Literal::Num(n)) => Value::Double(descale(*n)),
        _ => return Err(ErrorCode::Type),
    })
}

/// Render a decoded value as text for display/save, applying `scale` the
/// opposite direction from [`value_from_literal`].
pub fn value_to_text(value: &Value, scale: Option<f64>) -> String {
    let rescale = |x: f64| scale.map_or(x, |s| x * s);
    match value {
        Value::Int8(v) => rescale(*v as f64).to_string(),
        Value::Int16(v) => rescale(*v as f64).to_string(),
        Value::Int32(v) => rescale(*v as f64).to_string(),
        Value::Int64(v) => rescale(*v as f64).to_string(),
        Value::Uint8(v) => rescale(*v as f64).to_string(),
        Value::Uint16(v) => rescale(*v as f64).to_string(),
        Value::Uint32(v) => rescale(*v as f64).to_string(),
        Value::Uint64(v) => rescale(*v as f64).to_string(),
        Value::Float(v) => rescale(*v as f64).to_string(),
        Value::Double(v) => rescale(*v).to_string(),
        other => other.to_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_divides_on_write_and_multiplies_on_read() {
        let v = value_from_literal(TypeCode::Int32, Some(0.1), &Literal::Num(2.0)).unwrap();
        assert_eq!(v, Value::Int32(20));
        assert_eq!(value_to_text(&v, Some(0.1)), "2");
    }

    #[test]
    fn string_literal_rejected_for_numeric_type() {
        assert_eq!(
            value_from_literal(TypeCode::Int32, None, &Literal::Str("x".into())),
            Err(ErrorCode::Type)
        );
    }
}
