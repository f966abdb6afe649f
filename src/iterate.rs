//! Iterator protocol bodies (§4.7 "MAKE_ITER / ITER_NEXT"). Each built-in
//! container type owns a tiny iterator object that remembers its source
//! and a cursor; the VM never matches on these directly — it always goes
//! through `type.iter`/`type.next` (wired in `crate::frame::BuiltinTypes`),
//! which hold thin wrappers over the free functions below.
//!
//! Exhaustion is *not* an error: it is the `OutOfIterError` signal (§4.3),
//! which `for` (§4.6 lowering) and manual `try`/`catch` around `next()` are
//! both expected to observe.

use std::cell::RefCell;
use std::rc::Rc;

use crate::containers::RangeObj;
use crate::error::{Error, Result};
use crate::object::Value;

pub fn make_range_iter(v: &Value) -> Value {
    match v {
        Value::Range(r) => Value::RangeIter(Rc::new(RefCell::new((**r, r.start)))),
        _ => unreachable!("range.iter called on non-range"),
    }
}

pub fn range_iter_next(v: &Value) -> Result<Value> {
    match v {
        Value::RangeIter(state) => {
            let mut s = state.borrow_mut();
            let (range, cursor): &mut (RangeObj, i64) = &mut s;
            let done = if range.step > 0 {
                *cursor >= range.stop
            } else if range.step < 0 {
                *cursor <= range.stop
            } else {
                true
            };
            if done {
                return Err(Error::OutOfIter.into());
            }
            let current = *cursor;
            *cursor += range.step;
            Ok(Value::int(current))
        }
        _ => unreachable!("range_iter.next called on non-range_iter"),
    }
}

pub fn make_list_iter(v: &Value) -> Value {
    Value::ListIter(Rc::new(RefCell::new((v.clone(), 0))))
}

pub fn list_iter_next(v: &Value) -> Result<Value> {
    match v {
        Value::ListIter(state) => {
            let mut s = state.borrow_mut();
            let (src, idx) = &mut *s;
            match src {
                Value::List(items) => {
                    let items = items.borrow();
                    if *idx >= items.len() {
                        return Err(Error::OutOfIter.into());
                    }
                    let item = items[*idx].clone();
                    *idx += 1;
                    Ok(item)
                }
                Value::Tuple(items) => {
                    if *idx >= items.len() {
                        return Err(Error::OutOfIter.into());
                    }
                    let item = items[*idx].clone();
                    *idx += 1;
                    Ok(item)
                }
                _ => unreachable!("list_iter over non-sequence"),
            }
        }
        _ => unreachable!("list_iter.next called on non-list_iter"),
    }
}

pub fn make_dict_iter(v: &Value) -> Value {
    Value::DictIter(Rc::new(RefCell::new((v.clone(), 0))))
}

pub fn dict_iter_next(v: &Value) -> Result<Value> {
    match v {
        Value::DictIter(state) => {
            let mut s = state.borrow_mut();
            let (src, idx) = &mut *s;
            match src {
                Value::Dict(d) => {
                    let d = d.borrow();
                    let pair = d.iter().nth(*idx);
                    match pair {
                        Some((k, val)) => {
                            *idx += 1;
                            Ok(Value::Tuple(Rc::new(vec![k.clone(), val.clone()])))
                        }
                        None => Err(Error::OutOfIter.into()),
                    }
                }
                _ => unreachable!("dict_iter over non-dict"),
            }
        }
        _ => unreachable!("dict_iter.next called on non-dict_iter"),
    }
}

pub fn make_str_iter(v: &Value) -> Value {
    match v {
        Value::Str(s) => Value::StrIter(Rc::new(RefCell::new((s.clone(), 0)))),
        _ => unreachable!("str.iter called on non-str"),
    }
}

pub fn str_iter_next(v: &Value) -> Result<Value> {
    match v {
        Value::StrIter(state) => {
            let mut s = state.borrow_mut();
            let (src, idx) = &mut *s;
            let ch = src.bytes.chars().nth(*idx);
            match ch {
                Some(c) => {
                    *idx += 1;
                    Ok(Value::new_str(c.to_string()))
                }
                None => Err(Error::OutOfIter.into()),
            }
        }
        _ => unreachable!("str_iter.next called on non-str_iter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_iter_exhausts_with_out_of_iter() {
        let r = Value::Range(Rc::new(RangeObj { start: 0, stop: 2, step: 1 }));
        let it = make_range_iter(&r);
        assert!(matches!(range_iter_next(&it), Ok(Value::Int(_))));
        assert!(matches!(range_iter_next(&it), Ok(Value::Int(_))));
        assert!(range_iter_next(&it).is_err());
    }
}
