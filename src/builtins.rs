//! Global builtins (§4.1 construction, §4.8 "globals"): the type
//! constructors wired as `type.new` slots in [`crate::frame::BuiltinTypes`],
//! plus the free functions every program sees without an `import` —
//! `len`, `repr`, `type`, `print`, `abs`, `min`, `max`, `sum`, and
//! `__import__` (§4.6 "`import X` ⇒ `X = __import__(\"X\")`").
//!
//! Grounded on the teacher's `sandbox.rs` global-function registration
//! pattern, generalized from its Python-stdlib surface to this language's
//! own builtin set.

use std::cell::RefCell;
use std::rc::Rc;

use crate::containers::{Dict, RangeObj};
use crate::error::{Error, Result};
use crate::frame::Interpreter;
use crate::object::{value_hash, values_eq, CFunc, IntValue, Value};

fn native(name: &str, sig: &str, f: impl Fn(&mut Interpreter, &[Value]) -> Result<Value> + 'static) -> Value {
    Value::CFunc(Rc::new(CFunc {
        name: name.to_string(),
        sig: sig.to_string(),
        f: Box::new(f),
    }))
}

/// Populate `interp.globals` with the type names and the free builtin
/// functions (§9 "Global mutable state" — the globals dictionary is one of
/// the two well-known roots).
pub fn install_globals(interp: &mut Interpreter) {
    let b = crate::frame::builtin_types();
    interp.globals.insert("int".to_string(), Value::Type(b.int_type.clone()));
    interp.globals.insert("float".to_string(), Value::Type(b.float_type.clone()));
    interp.globals.insert("str".to_string(), Value::Type(b.str_type.clone()));
    interp.globals.insert("bool".to_string(), Value::Type(b.bool_type.clone()));
    interp.globals.insert("list".to_string(), Value::Type(b.list_type.clone()));
    interp.globals.insert("tuple".to_string(), Value::Type(b.tuple_type.clone()));
    interp.globals.insert("dict".to_string(), Value::Type(b.dict_type.clone()));
    interp.globals.insert("range".to_string(), Value::Type(b.range_type.clone()));

    interp.globals.insert("len".to_string(), native("len", "len(obj)", |interp, args| {
        arity(args, 1, "len")?;
        Ok(Value::int(crate::object::value_len(interp, &args[0])?))
    }));
    interp.globals.insert("repr".to_string(), native("repr", "repr(obj)", |interp, args| {
        arity(args, 1, "repr")?;
        Ok(Value::new_str(crate::fmt::to_repr_string(interp, &args[0])?))
    }));
    interp.globals.insert("type".to_string(), native("type", "type(obj)", |_interp, args| {
        arity(args, 1, "type")?;
        Ok(Value::Type(args[0].type_of()))
    }));
    interp.globals.insert("print".to_string(), native("print", "print(*args)", |interp, args| {
        let mut parts = Vec::with_capacity(args.len());
        for a in args {
            parts.push(crate::fmt::to_display_string(interp, a)?);
        }
        println!("{}", parts.join(" "));
        Ok(Value::None)
    }));
    interp.globals.insert("abs".to_string(), native("abs", "abs(x)", |_interp, args| {
        arity(args, 1, "abs")?;
        match &args[0] {
            Value::Int(i) => Ok(Value::Int(crate::numeric::int_abs(i))),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(Error::Type(format!("abs() not supported for '{}'", other.type_name())).into()),
        }
    }));
    interp.globals.insert("min".to_string(), native("min", "min(*args)", |interp, args| {
        reduce_by_cmp(interp, args, "min", std::cmp::Ordering::Less)
    }));
    interp.globals.insert("max".to_string(), native("max", "max(*args)", |interp, args| {
        reduce_by_cmp(interp, args, "max", std::cmp::Ordering::Greater)
    }));
    interp.globals.insert("sum".to_string(), native("sum", "sum(iterable, start=0)", |interp, args| {
        arity_range(args, 1, 2, "sum")?;
        let mut total = args.get(1).cloned().unwrap_or_else(|| Value::int(0));
        for item in iterate_eagerly(interp, &args[0])? {
            total = crate::operators::apply_binop(interp, crate::bytecode::BinOpKind::Add, total, item)?;
        }
        Ok(total)
    }));
    interp.globals.insert("__import__".to_string(), native("__import__", "__import__(name)", |interp, args| {
        arity(args, 1, "__import__")?;
        match &args[0] {
            Value::Str(s) => interp.modules.load(&s.bytes),
            other => Err(Error::Type(format!("__import__() expects a str, got '{}'", other.type_name())).into()),
        }
    }));
}

fn arity(args: &[Value], n: usize, name: &str) -> Result<()> {
    if args.len() != n {
        return Err(Error::Arg(format!("{name}() takes exactly {n} argument(s), got {}", args.len())).into());
    }
    Ok(())
}

fn arity_range(args: &[Value], lo: usize, hi: usize, name: &str) -> Result<()> {
    if args.len() < lo || args.len() > hi {
        return Err(Error::Arg(format!("{name}() takes {lo}..={hi} argument(s), got {}", args.len())).into());
    }
    Ok(())
}

fn reduce_by_cmp(interp: &mut Interpreter, args: &[Value], name: &str, want: std::cmp::Ordering) -> Result<Value> {
    let items: Vec<Value> = if args.len() == 1 {
        iterate_eagerly(interp, &args[0])?
    } else {
        args.to_vec()
    };
    let mut it = items.into_iter();
    let mut best = it
        .next()
        .ok_or_else(|| Error::Arg(format!("{name}() arg is an empty sequence")))?;
    for candidate in it {
        let cmp = crate::operators::apply_binop(
            interp,
            crate::bytecode::BinOpKind::Cmp,
            candidate.clone(),
            best.clone(),
        )?;
        if let Value::Int(IntValue::Small(c)) = cmp {
            if c as i32 == want_to_sign(want) {
                best = candidate;
            }
        }
    }
    Ok(best)
}

fn want_to_sign(want: std::cmp::Ordering) -> i32 {
    match want {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Equal => 0,
    }
}

/// Drain an iterable value (range/list/tuple/str/dict, or anything with a
/// `type.iter` slot) into a `Vec` — used by builtins (`sum`, `min`, `max`)
/// that need every element up front rather than one at a time.
fn iterate_eagerly(interp: &mut Interpreter, v: &Value) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    let ty = v.type_of();
    let iter_slot = ty
        .slots
        .borrow()
        .iter
        .clone()
        .ok_or_else(|| Error::Type(format!("'{}' object is not iterable", v.type_name())))?;
    let iterator = crate::call::call(interp, &iter_slot, &[v.clone()])?;
    let next_slot = iterator
        .type_of()
        .slots
        .borrow()
        .next
        .clone()
        .ok_or_else(|| Error::Internal("iterator has no next slot".into()))?;
    loop {
        match crate::call::call(interp, &next_slot, std::slice::from_ref(&iterator)) {
            Ok(v) => out.push(v),
            Err(crate::error::Signal::Raise { value, .. }) if crate::object::exception_display(&value).starts_with("OutOfIterError") => break,
            Err(other) => return Err(other),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Type constructors (§4.1 "Construction"), wired as `type.new` slots.
// ---------------------------------------------------------------------------

pub fn construct_int(_interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(i.clone())),
        Some(Value::Float(f)) => Ok(Value::int(*f as i64)),
        Some(Value::Bool(b)) => Ok(Value::int(if *b { 1 } else { 0 })),
        Some(Value::Str(s)) => s
            .bytes
            .trim()
            .parse::<i64>()
            .map(Value::int)
            .map_err(|_| Error::Type(format!("invalid literal for int(): '{}'", s.bytes)).into()),
        Some(other) => Err(Error::Type(format!("int() argument must be a string or a number, not '{}'", other.type_name())).into()),
    }
}

pub fn construct_float(_interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::Int(i)) => Ok(Value::Float(i.to_f64())),
        Some(Value::Bool(b)) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Some(Value::Str(s)) => s
            .bytes
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::Type(format!("invalid literal for float(): '{}'", s.bytes)).into()),
        Some(other) => Err(Error::Type(format!("float() argument must be a string or a number, not '{}'", other.type_name())).into()),
    }
}

pub fn construct_str(interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::new_str("")),
        Some(v) => Ok(Value::new_str(crate::fmt::to_display_string(interp, v)?)),
    }
}

pub fn construct_bool(interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Bool(false)),
        Some(v) => Ok(Value::Bool(v.truthy(interp)?)),
    }
}

pub fn construct_list(interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::List(Rc::new(RefCell::new(Vec::new())))),
        Some(v) => Ok(Value::List(Rc::new(RefCell::new(iterate_eagerly(interp, v)?)))),
    }
}

pub fn construct_tuple(interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Tuple(Rc::new(Vec::new()))),
        Some(v) => Ok(Value::Tuple(Rc::new(iterate_eagerly(interp, v)?))),
    }
}

/// `dict(*kvs)`: accepts zero or more two-element key/value pairs (§4.1),
/// mirroring the literal-vs-constructor equivalence used by `dict_to_pairs`.
pub fn construct_dict(interp: &mut Interpreter, args: &[Value]) -> Result<Value> {
    let mut d = Dict::new();
    for pair in args {
        let items = iterate_eagerly(interp, pair)?;
        if items.len() != 2 {
            return Err(Error::Arg("dict() expects (key, value) pairs".into()).into());
        }
        let key = items[0].clone();
        let val = items[1].clone();
        let h = value_hash(interp, &key)?;
        let key_for_eq = key.clone();
        d.set(h, key, val, |o| values_eq(interp, o, &key_for_eq).unwrap_or(false));
    }
    Ok(Value::Dict(Rc::new(RefCell::new(d))))
}

pub fn construct_range(args: &[Value]) -> Result<Value> {
    let as_i64 = |v: &Value| -> Result<i64> {
        match v {
            Value::Int(i) => Ok(match i {
                IntValue::Small(n) => *n,
                IntValue::Big(_) => return Err(Error::Math("range() bound too large".into()).into()),
            }),
            other => Err(Error::Type(format!("range() arguments must be int, not '{}'", other.type_name())).into()),
        }
    };
    let r = match args.len() {
        1 => RangeObj { start: 0, stop: as_i64(&args[0])?, step: 1 },
        2 => RangeObj { start: as_i64(&args[0])?, stop: as_i64(&args[1])?, step: 1 },
        3 => {
            let step = as_i64(&args[2])?;
            if step == 0 {
                return Err(Error::Arg("range() step must not be zero".into()).into());
            }
            RangeObj { start: as_i64(&args[0])?, stop: as_i64(&args[1])?, step }
        }
        n => return Err(Error::Arg(format!("range() takes 1 to 3 arguments, got {n}")).into()),
    };
    Ok(Value::Range(Rc::new(r)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_dispatches_to_builtin_containers() {
        let mut interp = Interpreter::new();
        let l = construct_list(&mut interp, &[Value::Range(Rc::new(RangeObj { start: 0, stop: 5, step: 1 }))]).unwrap();
        let len_fn = interp.globals.get("len").unwrap().clone();
        let n = crate::call::call(&mut interp, &len_fn, &[l]).unwrap();
        assert!(matches!(n, Value::Int(IntValue::Small(5))));
    }

    #[test]
    fn sum_over_range_matches_expected_total() {
        let mut interp = Interpreter::new();
        let r = Value::Range(Rc::new(RangeObj { start: 1, stop: 11, step: 1 }));
        let sum_fn = interp.globals.get("sum").unwrap().clone();
        let total = crate::call::call(&mut interp, &sum_fn, &[r]).unwrap();
        assert!(matches!(total, Value::Int(IntValue::Small(55))));
    }

    #[test]
    fn construct_int_parses_strings() {
        let mut interp = Interpreter::new();
        let v = construct_int(&mut interp, &[Value::new_str(" 42 ")]).unwrap();
        assert!(matches!(v, Value::Int(IntValue::Small(42))));
    }

    #[test]
    fn range_with_zero_step_is_arg_error() {
        assert!(construct_range(&[Value::int(0), Value::int(10), Value::int(0)]).is_err());
    }
}
