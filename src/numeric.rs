//! Numeric kernels for `int`/`float`/`complex`/`bool` arithmetic (§4.2
//! "int"). Kept separate from `operators.rs` the way the teacher keeps
//! `operators.rs`'s numeric_binop as its own match arm cluster distinct
//! from the generic dispatch shell — here the split is a whole module,
//! since promotion/overflow handling is large enough to deserve its own
//! home and its own unit tests.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::{Error, Result};
use crate::object::IntValue;

/// `a + b` with overflow promotion to big-integer (§3.3/§4.2/§8 boundary
/// behavior: `INT64_MAX`/`INT64_MIN` must not wrap silently).
pub fn int_add(a: &IntValue, b: &IntValue) -> IntValue {
    if let (IntValue::Small(x), IntValue::Small(y)) = (a, b) {
        if let Some(r) = x.checked_add(*y) {
            return IntValue::Small(r);
        }
    }
    IntValue::from_big(a.to_big() + b.to_big())
}

pub fn int_sub(a: &IntValue, b: &IntValue) -> IntValue {
    if let (IntValue::Small(x), IntValue::Small(y)) = (a, b) {
        if let Some(r) = x.checked_sub(*y) {
            return IntValue::Small(r);
        }
    }
    IntValue::from_big(a.to_big() - b.to_big())
}

pub fn int_mul(a: &IntValue, b: &IntValue) -> IntValue {
    if let (IntValue::Small(x), IntValue::Small(y)) = (a, b) {
        if let Some(r) = x.checked_mul(*y) {
            return IntValue::Small(r);
        }
    }
    IntValue::from_big(a.to_big() * b.to_big())
}

/// Integer division. Division by zero raises `MathError` (§4.2).
pub fn int_div(a: &IntValue, b: &IntValue) -> Result<IntValue> {
    if b.is_zero() {
        return Err(Error::Math("division by zero".into()).into());
    }
    if let (IntValue::Small(x), IntValue::Small(y)) = (a, b) {
        if !(*x == i64::MIN && *y == -1) {
            return Ok(IntValue::Small(Integer::div_floor(x, y)));
        }
    }
    let (ab, bb) = (a.to_big(), b.to_big());
    Ok(IntValue::from_big(ab.div_floor(&bb)))
}

/// Floor-mod, normalized to non-negative when the divisor is positive
/// (§4.2 "Modulo normalizes to non-negative when divisor is positive").
pub fn int_mod(a: &IntValue, b: &IntValue) -> Result<IntValue> {
    if b.is_zero() {
        return Err(Error::Math("modulo by zero".into()).into());
    }
    let (ab, bb) = (a.to_big(), b.to_big());
    let m = ab.mod_floor(&bb);
    Ok(IntValue::from_big(m))
}

/// `base ** exp`. Negative exponents with an integer base and a non-unit
/// result yield `0` (§4.2). The exponent must fit in a native word.
pub fn int_pow(base: &IntValue, exp: &IntValue) -> Result<IntValue> {
    let exp_i = match exp {
        IntValue::Small(e) => *e,
        IntValue::Big(b) => b
            .to_i64()
            .ok_or_else(|| Error::Math("exponent too large".into()))?,
    };
    if exp_i < 0 {
        let is_unit = matches!(base, IntValue::Small(1)) || matches!(base, IntValue::Small(-1));
        return Ok(if is_unit {
            if exp_i % 2 == 0 {
                IntValue::Small(1)
            } else {
                base.clone()
            }
        } else {
            IntValue::Small(0)
        });
    }
    let base_big = base.to_big();
    let result = base_big.pow(exp_i as u32);
    Ok(IntValue::from_big(result))
}

pub fn int_neg(a: &IntValue) -> IntValue {
    match a {
        IntValue::Small(v) => match v.checked_neg() {
            Some(r) => IntValue::Small(r),
            None => IntValue::from_big(-a.to_big()),
        },
        IntValue::Big(b) => IntValue::from_big(-b.clone()),
    }
}

pub fn int_abs(a: &IntValue) -> IntValue {
    match a {
        IntValue::Small(v) => match v.checked_abs() {
            Some(r) => IntValue::Small(r),
            None => IntValue::from_big(a.to_big().abs()),
        },
        IntValue::Big(b) => IntValue::from_big(b.abs()),
    }
}

pub fn int_cmp(a: &IntValue, b: &IntValue) -> std::cmp::Ordering {
    if let (IntValue::Small(x), IntValue::Small(y)) = (a, b) {
        return x.cmp(y);
    }
    a.to_big().cmp(&b.to_big())
}

pub fn int_bitop(a: &IntValue, b: &IntValue, f: impl Fn(&BigInt, &BigInt) -> BigInt) -> IntValue {
    IntValue::from_big(f(&a.to_big(), &b.to_big()))
}

pub fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overflow_promotes_to_big() {
        let a = IntValue::Small(i64::MAX);
        let b = IntValue::Small(1);
        let r = int_add(&a, &b);
        assert!(matches!(r, IntValue::Big(_)));
        assert_eq!(r.to_big(), BigInt::from(i64::MAX) + BigInt::from(1));
    }

    #[test]
    fn sub_min_overflow_promotes() {
        let a = IntValue::Small(i64::MIN);
        let b = IntValue::Small(1);
        let r = int_sub(&a, &b);
        assert!(matches!(r, IntValue::Big(_)));
    }

    #[test]
    fn division_by_zero_is_math_error() {
        assert!(int_div(&IntValue::Small(1), &IntValue::Small(0)).is_err());
    }

    #[test]
    fn mod_normalizes_to_non_negative() {
        let r = int_mod(&IntValue::Small(-1), &IntValue::Small(5)).unwrap();
        assert_eq!(r, IntValue::Small(4));
    }

    #[test]
    fn pow_matches_expected_big_result() {
        let r = int_pow(&IntValue::Small(2), &IntValue::Small(100)).unwrap();
        assert_eq!(r.to_string(), "1267650600228229401496703205376");
    }

    #[test]
    fn pow_negative_exponent_non_unit_base_is_zero() {
        let r = int_pow(&IntValue::Small(2), &IntValue::Small(-1)).unwrap();
        assert_eq!(r, IntValue::Small(0));
    }
}
