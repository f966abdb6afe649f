//! C1: the object & type kernel. §3.1/§3.2/§4.1.
//!
//! `Value` is the tagged union every other component passes around. Dynamic
//! dispatch does not happen by matching on `Value` directly (that would be
//! the "tagged union" object model the spec explicitly declines, §9) — it
//! happens by fetching `value.type_of()` and looking up an *operator slot*
//! on that [`TypeObj`], then invoking whatever callable sits there through
//! the uniform call convention (C8, [`crate::call`]). Built-in types simply
//! populate their slots with native [`CFunc`]s at interpreter construction
//! time, so a built-in int addition and a hypothetical user override are
//! dispatched through the exact same path.
//!
//! Refcounting (§3.1) is realized with `Rc`/`RefCell` rather than a
//! hand-rolled counter — see SPEC_FULL.md §3.1's implementation note.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::bytecode::CodeObject;
use crate::containers::{hash_bytes, Dict, PyStr, RangeObj};
use crate::error::{Error, Result, Signal};

// ---------------------------------------------------------------------------
// Integers: small/big union (§3.3 "int")
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum IntValue {
    Small(i64),
    Big(BigInt),
}

impl IntValue {
    pub fn small(v: i64) -> Self {
        IntValue::Small(v)
    }

    /// Normalize a `BigInt` back to `Small` when it fits, so that equality
    /// and hashing never depend on which form was used to get there
    /// (§8 "arithmetic results compare equal regardless of which form").
    pub fn from_big(b: BigInt) -> Self {
        match b.to_i64() {
            Some(v) => IntValue::Small(v),
            None => IntValue::Big(b),
        }
    }

    pub fn to_big(&self) -> BigInt {
        match self {
            IntValue::Small(v) => BigInt::from(*v),
            IntValue::Big(b) => b.clone(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            IntValue::Small(v) => *v as f64,
            IntValue::Big(b) => b.to_f64().unwrap_or(f64::INFINITY),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            IntValue::Small(v) => *v == 0,
            IntValue::Big(b) => b.is_zero(),
        }
    }

    pub fn hash(&self) -> u64 {
        match self {
            IntValue::Small(v) => {
                let h = *v as u64;
                if h == 0 {
                    1
                } else {
                    h
                }
            }
            IntValue::Big(b) => hash_bytes(b.to_string().as_bytes()),
        }
    }
}

impl PartialEq for IntValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IntValue::Small(a), IntValue::Small(b)) => a == b,
            _ => self.to_big() == other.to_big(),
        }
    }
}

impl fmt::Display for IntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntValue::Small(v) => write!(f, "{v}"),
            IntValue::Big(b) => write!(f, "{b}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Function objects (§3.5)
// ---------------------------------------------------------------------------

pub type NativeFn = Box<dyn Fn(&mut crate::frame::Interpreter, &[Value]) -> Result<Value>>;

/// A native-implemented function (§3.5 "cfunc").
pub struct CFunc {
    pub name: String,
    pub sig: String,
    pub f: NativeFn,
}

impl fmt::Debug for CFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<cfunc {}>", self.sig)
    }
}

/// A bytecode function (§3.5 "kfunc"). `closures` is populated by
/// `ADD_CLOSURE` each time the literal is materialized (§4.6).
#[derive(Debug)]
pub struct KFunc {
    pub name: String,
    pub params: Vec<String>,
    pub defaults: Vec<Value>,
    pub code: Rc<CodeObject>,
    pub closures: RefCell<Vec<Rc<RefCell<HashMap<String, Value>>>>>,
}

/// A bound-method / partial application (§3.5 "pfunc").
#[derive(Debug)]
pub struct PFunc {
    pub callable: Value,
    pub bound: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Type descriptor & operator slots (§3.2)
// ---------------------------------------------------------------------------

/// One operator-slot table. Every field is `Option<Value>`: the callable
/// installed there (a [`CFunc`] for built-ins), or `None` meaning "undefined
/// for this type" (§3.2, §9 "Dynamic dispatch").
#[derive(Default, Clone)]
pub struct Slots {
    pub new: Option<Value>,
    pub init: Option<Value>,
    pub free: Option<Value>,
    pub str_: Option<Value>,
    pub repr: Option<Value>,
    pub hash: Option<Value>,
    pub len: Option<Value>,
    pub getattr: Option<Value>,
    pub setattr: Option<Value>,
    pub getitem: Option<Value>,
    pub setitem: Option<Value>,
    pub call: Option<Value>,
    pub iter: Option<Value>,
    pub next: Option<Value>,
    pub add: Option<Value>,
    pub sub: Option<Value>,
    pub mul: Option<Value>,
    pub div: Option<Value>,
    pub mod_: Option<Value>,
    pub pow_: Option<Value>,
    pub binor: Option<Value>,
    pub binand: Option<Value>,
    pub binxor: Option<Value>,
    pub lshift: Option<Value>,
    pub rshift: Option<Value>,
    pub cmp: Option<Value>,
    pub lt: Option<Value>,
    pub le: Option<Value>,
    pub gt: Option<Value>,
    pub ge: Option<Value>,
    pub eq: Option<Value>,
    pub ne: Option<Value>,
    pub neg: Option<Value>,
    pub sqig: Option<Value>,
    pub not_: Option<Value>,
    pub abs_: Option<Value>,
}

/// A type descriptor (§3.2). Itself an object reachable as `Value::Type`.
pub struct TypeObj {
    pub name: String,
    pub bases: Vec<Rc<TypeObj>>,
    pub attrs: RefCell<HashMap<String, Value>>,
    pub slots: RefCell<Slots>,
}

impl TypeObj {
    pub fn new(name: impl Into<String>, bases: Vec<Rc<TypeObj>>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            bases,
            attrs: RefCell::new(HashMap::new()),
            slots: RefCell::new(Slots::default()),
        })
    }

    /// Subtype test (§3.2): `A` is a subtype of `B` iff `A == B` or any
    /// parent of `A` transitively is `B`.
    pub fn is_subtype_of(self: &Rc<Self>, other: &Rc<TypeObj>) -> bool {
        if Rc::ptr_eq(self, other) {
            return true;
        }
        self.bases.iter().any(|b| b.is_subtype_of(other))
    }

    /// Method-resolution-order attribute lookup: depth-first, left-to-right
    /// over parents, each visited once (§4.1 "Attribute resolution").
    pub fn mro_lookup(self: &Rc<Self>, name: &str, seen: &mut Vec<*const TypeObj>) -> Option<Value> {
        let ptr = Rc::as_ptr(self);
        if seen.contains(&ptr) {
            return None;
        }
        seen.push(ptr);
        if let Some(v) = self.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        for base in &self.bases {
            if let Some(v) = base.mro_lookup(name, seen) {
                return Some(v);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Exception objects (§4.3)
// ---------------------------------------------------------------------------

pub struct ExceptionObj {
    pub type_name: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Module object (C10 body; registry itself lives in crate::modules)
// ---------------------------------------------------------------------------

pub struct ModuleObj {
    pub name: String,
    pub attrs: RefCell<HashMap<String, Value>>,
}

// ---------------------------------------------------------------------------
// The value union
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(IntValue),
    Float(f64),
    Complex(f64, f64),
    Str(Rc<PyStr>),
    Tuple(Rc<Vec<Value>>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Dict>>),
    Range(Rc<RangeObj>),
    RangeIter(Rc<RefCell<(RangeObj, i64)>>),
    ListIter(Rc<RefCell<(Value, usize)>>),
    DictIter(Rc<RefCell<(Value, usize)>>),
    StrIter(Rc<RefCell<(Rc<PyStr>, usize)>>),
    CFunc(Rc<CFunc>),
    KFunc(Rc<KFunc>),
    PFunc(Rc<PFunc>),
    Type(Rc<TypeObj>),
    Exception(Rc<ExceptionObj>),
    Code(Rc<CodeObject>),
    Module(Rc<ModuleObj>),
}

impl Value {
    pub fn new_str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(PyStr::new(s)))
    }

    pub fn int(v: i64) -> Value {
        Value::Int(IntValue::Small(v))
    }

    pub fn is_callable(&self) -> bool {
        if matches!(
            self,
            Value::CFunc(_) | Value::KFunc(_) | Value::PFunc(_) | Value::Type(_)
        ) {
            return true;
        }
        self.type_of().slots.borrow().call.is_some()
    }

    /// Truthiness (§4.1 "Length, truthiness"):
    /// `true`→true, `false`/`none`→false, numerics→nonzero,
    /// containers→nonempty; otherwise dispatch to the type's `not` slot.
    pub fn truthy(&self, interp: &mut crate::frame::Interpreter) -> Result<bool> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Complex(r, im) => *r != 0.0 || *im != 0.0,
            Value::Str(s) => !s.bytes.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Range(r) => r.len() != 0,
            _ => {
                let ty = self.type_of();
                let slot = ty.slots.borrow().not_.clone();
                match slot {
                    Some(callable) => !crate::call::call(interp, &callable, &[self.clone()])?.truthy(interp)?,
                    None => true,
                }
            }
        })
    }

    pub fn type_of(&self) -> Rc<TypeObj> {
        let b = crate::frame::builtin_types();
        match self {
            Value::None => b.none_type.clone(),
            Value::Bool(_) => b.bool_type.clone(),
            Value::Int(_) => b.int_type.clone(),
            Value::Float(_) => b.float_type.clone(),
            Value::Complex(..) => b.complex_type.clone(),
            Value::Str(_) => b.str_type.clone(),
            Value::Tuple(_) => b.tuple_type.clone(),
            Value::List(_) => b.list_type.clone(),
            Value::Dict(_) => b.dict_type.clone(),
            Value::Range(_) => b.range_type.clone(),
            Value::RangeIter(_) => b.range_iter_type.clone(),
            Value::ListIter(_) => b.list_iter_type.clone(),
            Value::DictIter(_) => b.dict_iter_type.clone(),
            Value::StrIter(_) => b.str_iter_type.clone(),
            Value::CFunc(_) => b.cfunc_type.clone(),
            Value::KFunc(_) => b.kfunc_type.clone(),
            Value::PFunc(_) => b.pfunc_type.clone(),
            Value::Type(_) => b.type_type.clone(),
            Value::Exception(_) => b.exception_type.clone(),
            Value::Code(_) => b.code_type.clone(),
            Value::Module(_) => b.module_type.clone(),
        }
    }

    pub fn type_name(&self) -> String {
        self.type_of().name.clone()
    }
}

/// Identity address for `%p`/`%o` formatting (§4.9). Heap-backed variants
/// report their `Rc` allocation address; value types report a synthetic
/// address derived from their bit pattern so every `Value` has *something*
/// stable to print.
pub fn value_addr(v: &Value) -> usize {
    match v {
        Value::None => 0,
        Value::Bool(b) => *b as usize,
        Value::Int(i) => i.hash() as usize,
        Value::Float(f) => f.to_bits() as usize,
        Value::Complex(r, im) => (r.to_bits() ^ im.to_bits()) as usize,
        Value::Str(s) => Rc::as_ptr(s) as usize,
        Value::Tuple(t) => Rc::as_ptr(t) as usize,
        Value::List(l) => Rc::as_ptr(l) as usize,
        Value::Dict(d) => Rc::as_ptr(d) as usize,
        Value::Range(r) => Rc::as_ptr(r) as usize,
        Value::RangeIter(r) => Rc::as_ptr(r) as usize,
        Value::ListIter(r) => Rc::as_ptr(r) as usize,
        Value::DictIter(r) => Rc::as_ptr(r) as usize,
        Value::StrIter(r) => Rc::as_ptr(r) as usize,
        Value::CFunc(f) => Rc::as_ptr(f) as usize,
        Value::KFunc(f) => Rc::as_ptr(f) as usize,
        Value::PFunc(f) => Rc::as_ptr(f) as usize,
        Value::Type(t) => Rc::as_ptr(t) as usize,
        Value::Exception(e) => Rc::as_ptr(e) as usize,
        Value::Code(c) => Rc::as_ptr(c) as usize,
        Value::Module(m) => Rc::as_ptr(m) as usize,
    }
}

/// Pointer/singleton-aware equality (§4.1 "Equality and hash"): same
/// pointer, or identical small-integer encodings, or `type.eq` agrees. Falls
/// back to structural equality for built-ins that have no separate `eq`
/// slot invocation path (the slot *is* populated for built-ins too; this
/// function is what those slots ultimately call).
pub fn values_eq(interp: &mut crate::frame::Interpreter, a: &Value, b: &Value) -> Result<bool> {
    Ok(match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x.to_f64() == *y,
        (Value::Complex(xr, xi), Value::Complex(yr, yi)) => xr == yr && xi == yi,
        (Value::Str(x), Value::Str(y)) => x.bytes == y.bytes,
        (Value::Tuple(x), Value::Tuple(y)) => {
            if x.len() != y.len() {
                false
            } else {
                let mut ok = true;
                for (xi, yi) in x.iter().zip(y.iter()) {
                    if !values_eq(interp, xi, yi)? {
                        ok = false;
                        break;
                    }
                }
                ok
            }
        }
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                true
            } else {
                let xb = x.borrow();
                let yb = y.borrow();
                if xb.len() != yb.len() {
                    false
                } else {
                    let mut ok = true;
                    for (xi, yi) in xb.iter().zip(yb.iter()) {
                        if !values_eq(interp, xi, yi)? {
                            ok = false;
                            break;
                        }
                    }
                    ok
                }
            }
        }
        (Value::Range(x), Value::Range(y)) => x == y,
        (Value::Type(x), Value::Type(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        _ => ptr_eq_fallback(a, b),
    })
}

fn ptr_eq_fallback(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::CFunc(x), Value::CFunc(y)) => Rc::ptr_eq(x, y),
        (Value::KFunc(x), Value::KFunc(y)) => Rc::ptr_eq(x, y),
        (Value::PFunc(x), Value::PFunc(y)) => Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// `hash(obj)` (§4.1): delegates to `type.hash`. Absence makes the object
/// unhashable (`TypeError`, raised here rather than by the caller so every
/// call site gets the same message).
pub fn value_hash(interp: &mut crate::frame::Interpreter, v: &Value) -> Result<u64> {
    match v {
        Value::None => Ok(1),
        Value::Bool(b) => Ok(if *b { 1 } else { 2 }),
        Value::Int(i) => Ok(i.hash()),
        Value::Float(f) => Ok(hash_bytes(&f.to_bits().to_le_bytes())),
        Value::Str(s) => Ok(s.hash),
        Value::Tuple(t) => {
            let mut h: u64 = 0xcbf29ce484222325;
            for item in t.iter() {
                h ^= value_hash(interp, item)?;
                h = h.wrapping_mul(0x100000001b3);
            }
            Ok(if h == 0 { 1 } else { h })
        }
        _ => {
            let ty = v.type_of();
            let slot = ty.slots.borrow().hash.clone();
            match slot {
                Some(callable) => {
                    let result = crate::call::call(interp, &callable, &[v.clone()])?;
                    match result {
                        Value::Int(i) => {
                            let h = i.hash();
                            Ok(if h == 0 { 1 } else { h })
                        }
                        _ => Err(Error::Type("hash() must return an int".into()).into()),
                    }
                }
                None => Err(Error::Type(format!("unhashable type: '{}'", v.type_name())).into()),
            }
        }
    }
}

/// `getattr(obj, name)` (§4.1). If the type defines a `getattr` slot,
/// dispatch there; otherwise walk the MRO. A found callable is returned
/// bound to `obj` as a partial (§3.5 "pfunc").
pub fn getattr(interp: &mut crate::frame::Interpreter, obj: &Value, name: &str) -> Result<Value> {
    let ty = obj.type_of();
    let custom = ty.slots.borrow().getattr.clone();
    if let Some(callable) = custom {
        return crate::call::call(interp, &callable, &[obj.clone(), Value::new_str(name)]);
    }
    // Instance-level attrs (modules, exceptions) are checked before the MRO.
    if let Value::Module(m) = obj {
        if let Some(v) = m.attrs.borrow().get(name) {
            return Ok(v.clone());
        }
    }
    if let Value::Type(t) = obj {
        let mut seen = Vec::new();
        if let Some(v) = t.mro_lookup(name, &mut seen) {
            return Ok(v);
        }
    }
    let mut seen = Vec::new();
    match ty.mro_lookup(name, &mut seen) {
        Some(v) if v.is_callable() => Ok(Value::PFunc(Rc::new(PFunc {
            callable: v,
            bound: vec![obj.clone()],
        }))),
        Some(v) => Ok(v),
        None => Err(Error::Attr(format!(
            "'{}' object has no attribute '{}'",
            obj.type_name(),
            name
        ))
        .into()),
    }
}

pub fn setattr(_interp: &mut crate::frame::Interpreter, obj: &Value, name: &str, value: Value) -> Result<()> {
    match obj {
        Value::Module(m) => {
            m.attrs.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        Value::Type(t) => {
            t.attrs.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        _ => Err(Error::Attr(format!(
            "'{}' object attributes are read-only",
            obj.type_name()
        ))
        .into()),
    }
}

/// `len(obj)` (§4.1).
pub fn value_len(interp: &mut crate::frame::Interpreter, v: &Value) -> Result<i64> {
    match v {
        Value::Str(s) => Ok(s.bytes.chars().count() as i64),
        Value::Tuple(t) => Ok(t.len() as i64),
        Value::List(l) => Ok(l.borrow().len() as i64),
        Value::Dict(d) => Ok(d.borrow().len() as i64),
        Value::Range(r) => Ok(r.len()),
        _ => {
            let ty = v.type_of();
            let slot = ty.slots.borrow().len.clone();
            match slot {
                Some(callable) => match crate::call::call(interp, &callable, &[v.clone()])? {
                    Value::Int(IntValue::Small(n)) => Ok(n),
                    _ => Err(Error::Type("len() must return an int".into()).into()),
                },
                None => Err(Error::Type(format!("object of type '{}' has no len()", v.type_name())).into()),
            }
        }
    }
}

pub fn make_exception(err: Error) -> Value {
    Value::Exception(Rc::new(ExceptionObj {
        type_name: err.type_name().to_string(),
        message: err.message(),
    }))
}

pub fn exception_display(v: &Value) -> String {
    match v {
        Value::Exception(e) => format!("{}: {}", e.type_name, e.message),
        other => format!("{}", other.type_name()),
    }
}

/// Promote a raised [`Signal`] value back into an [`Error`] for contexts
/// (like a catch-all `catch` binding) that just want type+message.
pub fn signal_to_value(sig: Signal) -> Value {
    match sig {
        Signal::Raise { value, .. } => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_and_big_ints_compare_equal() {
        let small = IntValue::Small(42);
        let big = IntValue::from_big(BigInt::from(42));
        assert_eq!(small, big);
    }

    #[test]
    fn big_int_normalizes_back_to_small_when_it_fits() {
        let v = IntValue::from_big(BigInt::from(7));
        assert!(matches!(v, IntValue::Small(7)));
    }

    #[test]
    fn hash_of_zero_int_is_never_zero() {
        assert_ne!(IntValue::Small(0).hash(), 0);
    }

    #[test]
    fn subtype_of_self_is_true() {
        let t = TypeObj::new("Foo", vec![]);
        assert!(t.is_subtype_of(&t));
    }

    #[test]
    fn subtype_walks_transitive_parents() {
        let base = TypeObj::new("Base", vec![]);
        let mid = TypeObj::new("Mid", vec![base.clone()]);
        let leaf = TypeObj::new("Leaf", vec![mid.clone()]);
        assert!(leaf.is_subtype_of(&base));
        assert!(!base.is_subtype_of(&leaf));
    }
}
