//! C9: string/repr conversion and the printf-style formatter (§4.9).
//!
//! Grounded in `kscript`'s `fmt.c` specifier set (`examples/original_source`)
//! — `%i %l %p %f %+f %c %s %o %S %R %T` for native arguments, plus the
//! narrower object-level format (format string + argument tuple) that
//! recognizes only `%s` and dispatches through `str` (§4.9, last sentence).

use crate::error::{Error, Result};
use crate::frame::Interpreter;
use crate::object::Value;

/// `str(obj)` (§4.1 "str" slot / display conversion). Dispatches to
/// `type.str_` for non-primitives; primitives have a canonical rendering.
pub fn to_display_string(interp: &mut Interpreter, v: &Value) -> Result<String> {
    match v {
        Value::None => Ok("none".to_string()),
        Value::Bool(b) => Ok(if *b { "true".to_string() } else { "false".to_string() }),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(format_f64(*f)),
        Value::Complex(r, i) => Ok(format!("{}{}{}i", format_f64(*r), if *i >= 0.0 { "+" } else { "" }, format_f64(*i))),
        Value::Str(s) => Ok(s.bytes.clone()),
        Value::Tuple(items) => join_seq(interp, items.iter(), "(", ")", items.len() == 1),
        Value::List(items) => join_seq(interp, items.borrow().iter(), "[", "]", false),
        Value::Dict(d) => {
            let d = d.borrow();
            let mut parts = Vec::with_capacity(d.len());
            for (k, val) in d.iter() {
                parts.push(format!("{}: {}", to_repr_string(interp, k)?, to_repr_string(interp, val)?));
            }
            Ok(format!("{{{}}}", parts.join(", ")))
        }
        Value::Range(r) => Ok(format!("range({}, {}, {})", r.start, r.stop, r.step)),
        Value::Type(t) => Ok(format!("<type '{}'>", t.name)),
        Value::Exception(e) => Ok(format!("{}: {}", e.type_name, e.message)),
        Value::Module(m) => Ok(format!("<module '{}'>", m.name)),
        _ => {
            let ty = v.type_of();
            let slot = ty.slots.borrow().str_.clone();
            match slot {
                Some(callable) => match crate::call::call(interp, &callable, &[v.clone()])? {
                    Value::Str(s) => Ok(s.bytes.clone()),
                    _ => Err(Error::Type("str() must return a str".into()).into()),
                },
                None => Ok(format!("<'{}' object>", v.type_name())),
            }
        }
    }
}

/// `repr(obj)`. Strings quote themselves; everything else falls back to
/// `str` unless the type overrides `repr`.
pub fn to_repr_string(interp: &mut Interpreter, v: &Value) -> Result<String> {
    if let Value::Str(s) = v {
        return Ok(format!("'{}'", s.bytes.replace('\\', "\\\\").replace('\'', "\\'")));
    }
    let ty = v.type_of();
    let slot = ty.slots.borrow().repr.clone();
    if let Some(callable) = slot {
        return match crate::call::call(interp, &callable, &[v.clone()])? {
            Value::Str(s) => Ok(s.bytes.clone()),
            _ => Err(Error::Type("repr() must return a str".into()).into()),
        };
    }
    to_display_string(interp, v)
}

fn join_seq<'a>(
    interp: &mut Interpreter,
    items: impl Iterator<Item = &'a Value>,
    open: &str,
    close: &str,
    trailing_comma_if_single: bool,
) -> Result<String> {
    let mut parts = Vec::new();
    let mut n = 0;
    for item in items {
        parts.push(to_repr_string(interp, item)?);
        n += 1;
    }
    let mut body = parts.join(", ");
    if trailing_comma_if_single && n == 1 {
        body.push(',');
    }
    Ok(format!("{open}{body}{close}"))
}

fn format_f64(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Object-level format (§4.9 last sentence): a format string plus an
/// argument tuple, recognizing only `%s`, each dispatching through `str`.
pub fn object_format(interp: &mut Interpreter, template: &str, args: &[Value]) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut arg_idx = 0;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                let arg = args
                    .get(arg_idx)
                    .ok_or_else(|| Error::Arg("not enough arguments for format string".into()))?;
                out.push_str(&to_display_string(interp, arg)?);
                arg_idx += 1;
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    Ok(out)
}

/// The native printf-like formatter (§4.9): `%i %l %p %f %+f %c %s %o %S %R
/// %T`, driven directly off already-converted `Value` arguments (the native
/// collaborator is expected to have coerced its own values into `Value`
/// first; this crate never formats raw machine words).
pub fn native_format(interp: &mut Interpreter, template: &str, args: &[Value]) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut arg_idx = 0;
    let mut next_arg = |idx: &mut usize| -> Result<Value> {
        let v = args
            .get(*idx)
            .cloned()
            .ok_or_else(|| Error::Arg("not enough arguments for format string".into()))?;
        *idx += 1;
        Ok(v)
    };
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut plus = false;
        if chars.peek() == Some(&'+') {
            plus = true;
            chars.next();
        }
        match chars.next() {
            Some('i') | Some('l') => {
                let v = next_arg(&mut arg_idx)?;
                match v {
                    Value::Int(i) => out.push_str(&i.to_string()),
                    other => return Err(Error::Type(format!("%i/%l expects int, got '{}'", other.type_name())).into()),
                }
            }
            Some('p') => {
                let v = next_arg(&mut arg_idx)?;
                out.push_str(&format!("{:#x}", crate::object::value_addr(&v)));
            }
            Some('f') => {
                let v = next_arg(&mut arg_idx)?;
                let f = match v {
                    Value::Float(f) => f,
                    Value::Int(i) => i.to_f64(),
                    other => return Err(Error::Type(format!("%f expects a number, got '{}'", other.type_name())).into()),
                };
                if plus && f >= 0.0 {
                    out.push('+');
                }
                out.push_str(&format!("{f}"));
            }
            Some('c') => {
                let v = next_arg(&mut arg_idx)?;
                match v {
                    Value::Int(i) => {
                        let code = i.to_f64() as u32;
                        out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    }
                    Value::Str(s) => out.push_str(&s.bytes),
                    other => return Err(Error::Type(format!("%c expects int or str, got '{}'", other.type_name())).into()),
                }
            }
            Some('s') => {
                let v = next_arg(&mut arg_idx)?;
                out.push_str(&to_display_string(interp, &v)?);
            }
            Some('o') => {
                let v = next_arg(&mut arg_idx)?;
                out.push_str(&format!("<'{}' obj @ {:#x}>", v.type_name(), crate::object::value_addr(&v)));
            }
            Some('S') => {
                let v = next_arg(&mut arg_idx)?;
                out.push_str(&to_display_string(interp, &v)?);
            }
            Some('R') => {
                let v = next_arg(&mut arg_idx)?;
                out.push_str(&to_repr_string(interp, &v)?);
            }
            Some('T') => {
                let v = next_arg(&mut arg_idx)?;
                out.push_str(&v.type_name());
            }
            Some('%') => out.push('%'),
            Some(other) => return Err(Error::Syntax(format!("unknown format specifier '%{other}'")).into()),
            None => out.push('%'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_of_list_of_ints() {
        let mut interp = Interpreter::new();
        let l = Value::List(std::rc::Rc::new(std::cell::RefCell::new(vec![Value::int(1), Value::int(2)])));
        assert_eq!(to_display_string(&mut interp, &l).unwrap(), "[1, 2]");
    }

    #[test]
    fn object_format_recognizes_only_percent_s() {
        let mut interp = Interpreter::new();
        let s = object_format(&mut interp, "hi %s!", &[Value::new_str("there")]).unwrap();
        assert_eq!(s, "hi there!");
    }

    #[test]
    fn native_format_handles_type_name_specifier() {
        let mut interp = Interpreter::new();
        let s = native_format(&mut interp, "%T", &[Value::int(5)]).unwrap();
        assert_eq!(s, "int");
    }
}
