//! C6 instruction set and the code container (§3.4, §4.6).
//!
//! `Op` is a pervasive sum type by design (§9 "Pervasive sum types") — one
//! Rust `enum`, not a class hierarchy. Operand payloads that the spec
//! describes as "optional 32-bit operand" are embedded directly in each
//! variant rather than carried alongside in a separate operand array, which
//! is how the teacher's own `bytecode.rs` shapes `Op`.

use crate::diagnostic::Span;
use crate::object::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BinOr,
    BinAnd,
    BinXor,
    LShift,
    RShift,
    Cmp,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
    Neg,
    Sqig,
    Abs,
}

/// One bytecode instruction (§4.6 table). Jump operands are signed relative
/// offsets in instruction units; everything else is an index into one of
/// the code object's pools.
#[derive(Debug, Clone)]
pub enum Op {
    Noop,
    Push(u32),
    Dup,
    Popu,
    List(u32),
    Tuple(u32),
    GetItem(u32),
    SetItem(u32),
    Call(u32),
    Ret,
    Throw,
    Assert,
    Jmp(i32),
    Jmpt(i32),
    Jmpf(i32),
    TryStart(i32),
    TryEnd(i32),
    Load(u32),
    Store(u32),
    LoadAttr(u32),
    StoreAttr(u32),
    NewFunc,
    AddClosure,
    MakeIter,
    IterNext(i32),
    BinOp(BinOpKind),
    UnOp(UnOpKind),
    Truthy,
    Not,
}

/// A compiled unit: one per module and one per function body (§3.4).
/// Constants are deduplicated by the compiler so that two occurrences of the
/// same literal (string or small int) share one pool slot (§4.6).
pub struct CodeObject {
    pub source_name: String,
    pub consts: Vec<Value>,
    pub names: Vec<String>,
    pub ops: Vec<Op>,
    pub spans: Vec<Span>,
}

impl CodeObject {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            consts: Vec::new(),
            names: Vec::new(),
            ops: Vec::new(),
            spans: Vec::new(),
        }
    }
}
