//! Binary/unary operator dispatch (§3.2 "operator slots", §4.6 "BOP_*").
//!
//! Grounded in the teacher's `operators.rs` (`apply_binop`/`apply_cmpop`
//! shape) but adapted to this kernel's dispatch rule: built-in primitive
//! combinations are handled directly (the same fast path the teacher takes
//! for its own `PyValue` arms), and anything else falls through to the
//! operand's type-slot table so a hypothetical user override is reached by
//! the exact same `BOP_*` opcode (§9 "Dynamic dispatch").

use std::cmp::Ordering;
use std::rc::Rc;

use crate::bytecode::{BinOpKind, UnOpKind};
use crate::error::{Error, Result};
use crate::frame::Interpreter;
use crate::numeric;
use crate::object::{values_eq, IntValue, Value};

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(i.to_f64()),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_complex(v: &Value) -> Option<(f64, f64)> {
    match v {
        Value::Complex(r, i) => Some((*r, *i)),
        other => as_f64(other).map(|f| (f, 0.0)),
    }
}

fn bool_to_int(b: bool) -> IntValue {
    IntValue::Small(if b { 1 } else { 0 })
}

fn as_int(v: &Value) -> Option<IntValue> {
    match v {
        Value::Int(i) => Some(i.clone()),
        Value::Bool(b) => Some(bool_to_int(*b)),
        _ => None,
    }
}

fn slot_fallback(
    interp: &mut Interpreter,
    pick: impl Fn(&crate::object::Slots) -> Option<Value>,
    a: &Value,
    b: &Value,
    opname: &str,
) -> Result<Value> {
    let ty = a.type_of();
    let slot = pick(&ty.slots.borrow());
    match slot {
        Some(callable) => crate::call::call(interp, &callable, &[a.clone(), b.clone()]),
        None => Err(Error::Op(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            opname,
            a.type_name(),
            b.type_name()
        ))
        .into()),
    }
}

/// §4.6 `BOP_*`: dispatch a binary operator over two already-evaluated
/// operands.
pub fn apply_binop(interp: &mut Interpreter, op: BinOpKind, a: Value, b: Value) -> Result<Value> {
    use BinOpKind::*;
    match op {
        Add => add(interp, a, b),
        Sub => arith(interp, a, b, "-", numeric::int_sub, |x, y| x - y, |xr, xi, yr, yi| (xr - yr, xi - yi)),
        Mul => arith(interp, a, b, "*", numeric::int_mul, |x, y| x * y, |xr, xi, yr, yi| {
            (xr * yr - xi * yi, xr * yi + xi * yr)
        }),
        Div => div(interp, a, b),
        Mod => modulo(interp, a, b),
        Pow => pow(interp, a, b),
        BinOr => bitop(interp, a, b, "|", |x, y| x | y, |pick| pick.binor.clone()),
        BinAnd => bitop(interp, a, b, "&", |x, y| x & y, |pick| pick.binand.clone()),
        BinXor => bitop(interp, a, b, "^", |x, y| x ^ y, |pick| pick.binxor.clone()),
        LShift => shift(interp, a, b, true),
        RShift => shift(interp, a, b, false),
        Cmp => spaceship(interp, a, b),
        Lt => compare(interp, a, b, |o| o == Ordering::Less, |s| s.lt.clone(), "<"),
        Le => compare(interp, a, b, |o| o != Ordering::Greater, |s| s.le.clone(), "<="),
        Gt => compare(interp, a, b, |o| o == Ordering::Greater, |s| s.gt.clone(), ">"),
        Ge => compare(interp, a, b, |o| o != Ordering::Less, |s| s.ge.clone(), ">="),
        Eq => Ok(Value::Bool(values_eq(interp, &a, &b)?)),
        Ne => Ok(Value::Bool(!values_eq(interp, &a, &b)?)),
    }
}

fn add(interp: &mut Interpreter, a: Value, b: Value) -> Result<Value> {
    match (&a, &b) {
        (Value::Str(x), Value::Str(y)) => Ok(Value::new_str(format!("{}{}", x.bytes, y.bytes))),
        (Value::List(x), Value::List(y)) => {
            let mut out = x.borrow().clone();
            out.extend(y.borrow().iter().cloned());
            Ok(Value::List(Rc::new(std::cell::RefCell::new(out))))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            let mut out = (**x).clone();
            out.extend(y.iter().cloned());
            Ok(Value::Tuple(Rc::new(out)))
        }
        _ => arith(interp, a, b, "+", numeric::int_add, |x, y| x + y, |xr, xi, yr, yi| (xr + yr, xi + yi)),
    }
}

fn arith(
    interp: &mut Interpreter,
    a: Value,
    b: Value,
    opname: &str,
    int_op: impl Fn(&IntValue, &IntValue) -> IntValue,
    float_op: impl Fn(f64, f64) -> f64,
    complex_op: impl Fn(f64, f64, f64, f64) -> (f64, f64),
) -> Result<Value> {
    if matches!(a, Value::Complex(..)) || matches!(b, Value::Complex(..)) {
        if let (Some((xr, xi)), Some((yr, yi))) = (as_complex(&a), as_complex(&b)) {
            let (r, i) = complex_op(xr, xi, yr, yi);
            return Ok(Value::Complex(r, i));
        }
    }
    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        return Ok(Value::Int(int_op(&x, &y)));
    }
    if let (Some(x), Some(y)) = (as_f64(&a), as_f64(&b)) {
        return Ok(Value::Float(float_op(x, y)));
    }
    slot_fallback(interp, |s| s.add.clone(), &a, &b, opname)
}

fn div(interp: &mut Interpreter, a: Value, b: Value) -> Result<Value> {
    if matches!(a, Value::Complex(..)) || matches!(b, Value::Complex(..)) {
        if let (Some((xr, xi)), Some((yr, yi))) = (as_complex(&a), as_complex(&b)) {
            let denom = yr * yr + yi * yi;
            if denom == 0.0 {
                return Err(Error::Math("division by zero".into()).into());
            }
            return Ok(Value::Complex((xr * yr + xi * yi) / denom, (xi * yr - xr * yi) / denom));
        }
    }
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        return Ok(Value::Int(numeric::int_div(x, y)?));
    }
    if let (Some(x), Some(y)) = (as_f64(&a), as_f64(&b)) {
        if y == 0.0 {
            return Err(Error::Math("division by zero".into()).into());
        }
        return Ok(Value::Float(x / y));
    }
    slot_fallback(interp, |s| s.div.clone(), &a, &b, "/")
}

fn modulo(interp: &mut Interpreter, a: Value, b: Value) -> Result<Value> {
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        return Ok(Value::Int(numeric::int_mod(x, y)?));
    }
    if let (Some(x), Some(y)) = (as_f64(&a), as_f64(&b)) {
        if y == 0.0 {
            return Err(Error::Math("modulo by zero".into()).into());
        }
        return Ok(Value::Float(numeric::float_mod(x, y)));
    }
    slot_fallback(interp, |s| s.mod_.clone(), &a, &b, "%")
}

fn pow(interp: &mut Interpreter, a: Value, b: Value) -> Result<Value> {
    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        return Ok(Value::Int(numeric::int_pow(&x, &y)?));
    }
    if let (Some(x), Some(y)) = (as_f64(&a), as_f64(&b)) {
        return Ok(Value::Float(x.powf(y)));
    }
    slot_fallback(interp, |s| s.pow_.clone(), &a, &b, "**")
}

fn bitop(
    interp: &mut Interpreter,
    a: Value,
    b: Value,
    opname: &str,
    f: impl Fn(&num_bigint::BigInt, &num_bigint::BigInt) -> num_bigint::BigInt,
    pick: impl Fn(&crate::object::Slots) -> Option<Value>,
) -> Result<Value> {
    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        return Ok(Value::Int(numeric::int_bitop(&x, &y, f)));
    }
    slot_fallback(interp, pick, &a, &b, opname)
}

fn shift(interp: &mut Interpreter, a: Value, b: Value, left: bool) -> Result<Value> {
    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        let shift_amt = match &y {
            IntValue::Small(v) if *v >= 0 => *v as u32,
            _ => return Err(Error::Math("negative shift count".into()).into()),
        };
        let xb = x.to_big();
        let result = if left { xb << shift_amt } else { xb >> shift_amt };
        return Ok(Value::Int(IntValue::from_big(result)));
    }
    slot_fallback(
        interp,
        |s| if left { s.lshift.clone() } else { s.rshift.clone() },
        &a,
        &b,
        if left { "<<" } else { ">>" },
    )
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_int(a), as_int(b)) {
        if !matches!(a, Value::Float(_)) && !matches!(b, Value::Float(_)) {
            return Some(numeric::int_cmp(&x, &y));
        }
    }
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return Some(x.bytes.cmp(&y.bytes));
    }
    None
}

fn compare(
    interp: &mut Interpreter,
    a: Value,
    b: Value,
    test: impl Fn(Ordering) -> bool,
    pick: impl Fn(&crate::object::Slots) -> Option<Value>,
    opname: &str,
) -> Result<Value> {
    match numeric_cmp(&a, &b) {
        Some(ord) => Ok(Value::Bool(test(ord))),
        None => {
            let ty = a.type_of();
            let slot = pick(&ty.slots.borrow());
            match slot {
                Some(callable) => crate::call::call(interp, &callable, &[a, b]),
                None => Err(Error::Op(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    opname,
                    a.type_name(),
                    b.type_name()
                ))
                .into()),
            }
        }
    }
}

fn spaceship(interp: &mut Interpreter, a: Value, b: Value) -> Result<Value> {
    match numeric_cmp(&a, &b) {
        Some(ord) => Ok(Value::int(match ord {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })),
        None => slot_fallback(interp, |s| s.cmp.clone(), &a, &b, "<=>"),
    }
}

/// §4.6 `UOP_*`: unary `-`, `~`, `abs`.
pub fn apply_unop(interp: &mut Interpreter, op: UnOpKind, a: Value) -> Result<Value> {
    match op {
        UnOpKind::Neg => match &a {
            Value::Int(i) => Ok(Value::Int(numeric::int_neg(i))),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Complex(r, i) => Ok(Value::Complex(-r, -i)),
            Value::Bool(b) => Ok(Value::int(if *b { -1 } else { 0 })),
            _ => unop_slot(interp, &a, "neg", |s| s.neg.clone()),
        },
        UnOpKind::Sqig => match as_int(&a) {
            Some(i) => Ok(Value::Int(numeric::int_bitop(&i, &IntValue::Small(-1), |x, y| x ^ y))),
            None => unop_slot(interp, &a, "sqig", |s| s.sqig.clone()),
        },
        UnOpKind::Abs => match &a {
            Value::Int(i) => Ok(Value::Int(numeric::int_abs(i))),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Complex(r, i) => Ok(Value::Float((r * r + i * i).sqrt())),
            Value::Bool(b) => Ok(Value::int(if *b { 1 } else { 0 })),
            _ => unop_slot(interp, &a, "abs", |s| s.abs_.clone()),
        },
    }
}

fn unop_slot(
    interp: &mut Interpreter,
    a: &Value,
    opname: &str,
    pick: impl Fn(&crate::object::Slots) -> Option<Value>,
) -> Result<Value> {
    let ty = a.type_of();
    let slot = pick(&ty.slots.borrow());
    match slot {
        Some(callable) => crate::call::call(interp, &callable, &[a.clone()]),
        None => Err(Error::Op(format!("bad operand type for unary {}: '{}'", opname, a.type_name())).into()),
    }
}

/// `!expr` — logical negation via `Value::truthy` (§4.1).
pub fn apply_not(interp: &mut Interpreter, a: Value) -> Result<Value> {
    Ok(Value::Bool(!a.truthy(interp)?))
}

/// `TRUTHY` — replace the operand with its own boolean truthiness.
pub fn apply_truthy(interp: &mut Interpreter, a: Value) -> Result<Value> {
    Ok(Value::Bool(a.truthy(interp)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Interpreter;

    #[test]
    fn int_overflow_add_promotes() {
        let mut interp = Interpreter::new();
        let r = apply_binop(&mut interp, BinOpKind::Add, Value::int(i64::MAX), Value::int(1)).unwrap();
        assert!(matches!(r, Value::Int(IntValue::Big(_))));
    }

    #[test]
    fn str_concat_via_add() {
        let mut interp = Interpreter::new();
        let r = apply_binop(&mut interp, BinOpKind::Add, Value::new_str("a"), Value::new_str("b")).unwrap();
        match r {
            Value::Str(s) => assert_eq!(s.bytes, "ab"),
            _ => panic!("expected str"),
        }
    }

    #[test]
    fn division_by_zero_raises() {
        let mut interp = Interpreter::new();
        assert!(apply_binop(&mut interp, BinOpKind::Div, Value::int(1), Value::int(0)).is_err());
    }
}
