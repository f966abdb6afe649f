//! C6: lowers the AST into a [`CodeObject`] (§4.6).
//!
//! Mirrors the teacher's bytecode compiler in spirit: one `Compiler` walks
//! the tree once, emitting instructions into a flat vector and recording a
//! span per instruction so the VM can point at source on failure. Jump
//! operands are relative to the position *after* the jump instruction, so a
//! patch computes `offset = target - (jump_index + 1)`.
//!
//! Only the outermost program body keeps the value of its final bare
//! expression statement on the stack (so `run_source` can return it); every
//! nested block and every function body always discards statement values
//! via `Popu` and relies on an explicit `ret` — a function that falls off
//! the end implicitly returns `none`, and so does a program with no trailing
//! expression.
//!
//! `{k: v, ...}` dict literals (§8 scenario 2) have no dedicated opcode:
//! they lower to building a list of 2-tuples and calling the global `dict`
//! constructor over it, reusing `List`/`Tuple`/`Call` exactly as a
//! hand-written `dict([(k, v), ...])` call would compile.

use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::ast::{BinOp, Const, Expr, Func, Stmt, UnOp};
use crate::bytecode::{BinOpKind, CodeObject, Op, UnOpKind};
use crate::diagnostic::Span;
use crate::error::{Error, Result};
use crate::object::{IntValue, KFunc, Value};

struct Compiler {
    code: CodeObject,
}

impl Compiler {
    fn new(source_name: impl Into<String>) -> Self {
        Self {
            code: CodeObject::new(source_name),
        }
    }

    fn here(&self) -> usize {
        self.code.ops.len()
    }

    fn emit(&mut self, op: Op, span: Span) -> usize {
        self.code.ops.push(op);
        self.code.spans.push(span);
        self.code.ops.len() - 1
    }

    fn patch_jump(&mut self, idx: usize, target: usize) {
        let offset = target as i32 - (idx as i32 + 1);
        match &mut self.code.ops[idx] {
            Op::Jmp(o) | Op::Jmpt(o) | Op::Jmpf(o) | Op::TryStart(o) | Op::TryEnd(o) | Op::IterNext(o) => {
                *o = offset;
            }
            other => unreachable!("patch_jump on non-jump op {other:?}"),
        }
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(i) = self.code.names.iter().position(|n| n == name) {
            return i as u32;
        }
        self.code.names.push(name.to_string());
        (self.code.names.len() - 1) as u32
    }

    fn add_const(&mut self, value: Value) -> u32 {
        if let Some(i) = self.code.consts.iter().position(|c| const_eq(c, &value)) {
            return i as u32;
        }
        self.code.consts.push(value);
        (self.code.consts.len() - 1) as u32
    }

    /// Compiles a statement sequence where every statement's expression
    /// value is discarded — the shape used by every nested block and every
    /// function body.
    fn compile_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for s in stmts {
            self.compile_stmt(s)?;
        }
        Ok(())
    }

    /// Compiles a statement sequence the way [`compile_block`] does, except
    /// the final statement's value is kept on the stack if (and only if) it
    /// is a bare expression statement. Returns whether a value was kept.
    fn compile_block_tail(&mut self, stmts: &[Stmt]) -> Result<bool> {
        if stmts.is_empty() {
            return Ok(false);
        }
        let last = stmts.len() - 1;
        for (i, s) in stmts.iter().enumerate() {
            if i == last {
                if let Stmt::Expr(e) = s {
                    self.compile_expr(e)?;
                    return Ok(true);
                }
            }
            self.compile_stmt(s)?;
        }
        Ok(false)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e)?;
                self.emit(Op::Popu, e.span());
            }
            Stmt::If { cond, then, elifs, else_ } => self.compile_if(cond, then, elifs, else_)?,
            Stmt::While { cond, body, else_ } => self.compile_while(cond, body, else_)?,
            Stmt::For { name, iter, body } => self.compile_for(name, iter, body)?,
            Stmt::TryCatch { body, bind, handler } => self.compile_try(body, bind, handler)?,
            Stmt::Throw(e, span) => {
                self.compile_expr(e)?;
                self.emit(Op::Throw, *span);
            }
            Stmt::Assert(e, span) => {
                self.compile_expr(e)?;
                self.emit(Op::Assert, *span);
            }
            Stmt::Ret(opt, span) => {
                match opt {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        let idx = self.add_const(Value::None);
                        self.emit(Op::Push(idx), *span);
                    }
                }
                self.emit(Op::Ret, *span);
            }
            Stmt::FuncDef(func, span) => self.compile_funcdef(func, *span)?,
            Stmt::Import(name, span) => self.compile_import(name, *span)?,
        }
        Ok(())
    }

    fn compile_if(&mut self, cond: &Expr, then: &[Stmt], elifs: &[(Expr, Vec<Stmt>)], else_: &Option<Vec<Stmt>>) -> Result<()> {
        let mut end_jumps = Vec::new();
        self.compile_expr(cond)?;
        let mut next = self.emit(Op::Jmpf(0), cond.span());
        self.compile_block(then)?;
        end_jumps.push(self.emit(Op::Jmp(0), cond.span()));
        self.patch_jump(next, self.here());

        for (c, body) in elifs {
            self.compile_expr(c)?;
            next = self.emit(Op::Jmpf(0), c.span());
            self.compile_block(body)?;
            end_jumps.push(self.emit(Op::Jmp(0), c.span()));
            self.patch_jump(next, self.here());
        }

        if let Some(body) = else_ {
            self.compile_block(body)?;
        }

        let end = self.here();
        for j in end_jumps {
            self.patch_jump(j, end);
        }
        Ok(())
    }

    /// No `break`/`continue` exist in this grammar (§4.2 keyword list), so an
    /// attached `else` block always runs once the condition first tests
    /// false — there is no early exit for it to distinguish from.
    fn compile_while(&mut self, cond: &Expr, body: &[Stmt], else_: &Option<Vec<Stmt>>) -> Result<()> {
        let top = self.here();
        self.compile_expr(cond)?;
        let exit = self.emit(Op::Jmpf(0), cond.span());
        self.compile_block(body)?;
        let back = self.emit(Op::Jmp(0), cond.span());
        self.patch_jump(back, top);
        self.patch_jump(exit, self.here());
        if let Some(body) = else_ {
            self.compile_block(body)?;
        }
        Ok(())
    }

    /// `for x in e: body` => `e; MAKE_ITER; L: ITER_NEXT end; STORE x; body;
    /// JMP L; end:`. `STORE` leaves its value on the stack (§4.6, so that
    /// `x = 5` can itself be used as an expression), so the loop-variable
    /// store here is immediately followed by its own `Popu` the same way any
    /// assignment-as-statement is.
    fn compile_for(&mut self, name: &str, iter: &Expr, body: &[Stmt]) -> Result<()> {
        self.compile_expr(iter)?;
        self.emit(Op::MakeIter, iter.span());
        let top = self.here();
        let exit = self.emit(Op::IterNext(0), iter.span());
        let idx = self.add_name(name);
        self.emit(Op::Store(idx), iter.span());
        self.emit(Op::Popu, iter.span());
        self.compile_block(body)?;
        let back = self.emit(Op::Jmp(0), iter.span());
        self.patch_jump(back, top);
        self.patch_jump(exit, self.here());
        Ok(())
    }

    /// `try B catch [name] H` => `TRY_START H; B; TRY_END after; H: [STORE
    /// name; POPU;] H; after:`. The VM pushes the live exception object onto
    /// the stack the instant it jumps to the handler (§4.3 "Propagation
    /// policy"), so the handler prologue here only needs to bind-or-discard
    /// it — no bytecode instruction produces that value itself.
    fn compile_try(&mut self, body: &[Stmt], bind: &Option<String>, handler: &[Stmt]) -> Result<()> {
        let span = approx_span(body).or_else(|| approx_span(handler)).unwrap_or(Span::new(0, 0));
        let try_start = self.emit(Op::TryStart(0), span);
        self.compile_block(body)?;
        let try_end = self.emit(Op::TryEnd(0), span);
        self.patch_jump(try_start, self.here());
        if let Some(name) = bind {
            let idx = self.add_name(name);
            self.emit(Op::Store(idx), span);
        }
        self.emit(Op::Popu, span);
        self.compile_block(handler)?;
        self.patch_jump(try_end, self.here());
        Ok(())
    }

    fn compile_funcdef(&mut self, func: &Func, span: Span) -> Result<()> {
        let code = self.compile_function_body(func)?;
        let mut defaults = Vec::with_capacity(func.defaults.len());
        for d in &func.defaults {
            defaults.push(const_fold(d)?);
        }
        let kfunc = Value::KFunc(Rc::new(KFunc {
            name: func.name.clone(),
            params: func.params.clone(),
            defaults,
            code: Rc::new(code),
            closures: RefCell::new(Vec::new()),
        }));
        let cidx = self.add_const(kfunc);
        self.emit(Op::Push(cidx), span);
        self.emit(Op::NewFunc, span);
        self.emit(Op::AddClosure, span);
        let nidx = self.add_name(&func.name);
        self.emit(Op::Store(nidx), span);
        self.emit(Op::Popu, span);
        Ok(())
    }

    /// A function body never keeps a trailing expression's value the way the
    /// top-level program does — only an explicit `ret` produces a result, so
    /// falling off the end is equivalent to `ret none`.
    fn compile_function_body(&self, func: &Func) -> Result<CodeObject> {
        let mut c = Compiler::new(format!("{}::{}", self.code.source_name, func.name));
        c.compile_block(&func.body)?;
        let idx = c.add_const(Value::None);
        c.emit(Op::Push(idx), Span::new(0, 0));
        c.emit(Op::Ret, Span::new(0, 0));
        Ok(c.code)
    }

    /// `import X` => `X = __import__("X")`.
    fn compile_import(&mut self, name: &str, span: Span) -> Result<()> {
        let callee_idx = self.add_name("__import__");
        self.emit(Op::Load(callee_idx), span);
        let str_idx = self.add_const(Value::new_str(name));
        self.emit(Op::Push(str_idx), span);
        self.emit(Op::Call(2), span);
        let nidx = self.add_name(name);
        self.emit(Op::Store(nidx), span);
        self.emit(Op::Popu, span);
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Const(c, span) => self.compile_const(c, *span)?,
            Expr::Name(name, span) => {
                let idx = self.add_name(name);
                self.emit(Op::Load(idx), *span);
            }
            Expr::Attr(obj, name, span) => {
                self.compile_expr(obj)?;
                let idx = self.add_name(name);
                self.emit(Op::LoadAttr(idx), *span);
            }
            Expr::Tuple(items, span) => {
                for it in items {
                    self.compile_expr(it)?;
                }
                self.emit(Op::Tuple(items.len() as u32), *span);
            }
            Expr::List(items, span) => {
                for it in items {
                    self.compile_expr(it)?;
                }
                self.emit(Op::List(items.len() as u32), *span);
            }
            Expr::DictLit(pairs, span) => {
                let dict_idx = self.add_name("dict");
                self.emit(Op::Load(dict_idx), *span);
                for (k, v) in pairs {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                    self.emit(Op::Tuple(2), *span);
                }
                self.emit(Op::List(pairs.len() as u32), *span);
                self.emit(Op::Call(2), *span);
            }
            Expr::Call(callee, args, span) => {
                self.compile_expr(callee)?;
                for a in args {
                    self.compile_expr(a)?;
                }
                self.emit(Op::Call((args.len() + 1) as u32), *span);
            }
            Expr::Subscript(obj, keys, span) => {
                self.compile_expr(obj)?;
                for k in keys {
                    self.compile_expr(k)?;
                }
                self.emit(Op::GetItem((keys.len() + 1) as u32), *span);
            }
            Expr::Binary(op, l, r, span) => self.compile_binary(*op, l, r, *span)?,
            Expr::Unary(op, operand, span) => self.compile_unary(*op, operand, *span)?,
            Expr::Assign(lhs, rhs, span) => self.compile_assign(lhs, rhs, *span)?,
        }
        Ok(())
    }

    fn compile_const(&mut self, c: &Const, span: Span) -> Result<()> {
        let value = match c {
            Const::True => Value::Bool(true),
            Const::False => Value::Bool(false),
            Const::None => Value::None,
            Const::Int(s) => parse_int_literal(s)?,
            Const::Float(f) => Value::Float(*f),
            Const::Complex(f) => Value::Complex(0.0, *f),
            Const::Str(s) => Value::new_str(s.clone()),
        };
        let idx = self.add_const(value);
        self.emit(Op::Push(idx), span);
        Ok(())
    }

    /// `&&`/`||` short-circuit via conditional jumps rather than a `BinOp`
    /// (the bytecode's `BinOpKind` deliberately has no `And`/`Or` variant):
    /// duplicate the left operand, test-and-consume the duplicate, and only
    /// evaluate the right operand when short-circuiting doesn't apply.
    fn compile_binary(&mut self, op: BinOp, l: &Expr, r: &Expr, span: Span) -> Result<()> {
        match op {
            BinOp::And => {
                self.compile_expr(l)?;
                self.emit(Op::Dup, span);
                let short_circuit = self.emit(Op::Jmpf(0), span);
                self.emit(Op::Popu, span);
                self.compile_expr(r)?;
                self.patch_jump(short_circuit, self.here());
            }
            BinOp::Or => {
                self.compile_expr(l)?;
                self.emit(Op::Dup, span);
                let short_circuit = self.emit(Op::Jmpt(0), span);
                self.emit(Op::Popu, span);
                self.compile_expr(r)?;
                self.patch_jump(short_circuit, self.here());
            }
            _ => {
                self.compile_expr(l)?;
                self.compile_expr(r)?;
                self.emit(Op::BinOp(bin_op_kind(op)), span);
            }
        }
        Ok(())
    }

    fn compile_unary(&mut self, op: UnOp, operand: &Expr, span: Span) -> Result<()> {
        self.compile_expr(operand)?;
        match op {
            UnOp::Not => self.emit(Op::Not, span),
            UnOp::Neg => self.emit(Op::UnOp(UnOpKind::Neg), span),
            UnOp::Sqig => self.emit(Op::UnOp(UnOpKind::Sqig), span),
            UnOp::Abs => self.emit(Op::UnOp(UnOpKind::Abs), span),
        };
        Ok(())
    }

    /// `STORE`/`STORE_ATTR`/`SETITEM` all leave the assigned value on the
    /// stack (§4.6), which is what makes `x = y = 5` and `print(x = 5)` work
    /// as expressions.
    fn compile_assign(&mut self, lhs: &Expr, rhs: &Expr, span: Span) -> Result<()> {
        match lhs {
            Expr::Name(name, _) => {
                self.compile_expr(rhs)?;
                let idx = self.add_name(name);
                self.emit(Op::Store(idx), span);
            }
            Expr::Attr(obj, name, _) => {
                self.compile_expr(obj)?;
                self.compile_expr(rhs)?;
                let idx = self.add_name(name);
                self.emit(Op::StoreAttr(idx), span);
            }
            Expr::Subscript(obj, keys, _) => {
                self.compile_expr(obj)?;
                for k in keys {
                    self.compile_expr(k)?;
                }
                self.compile_expr(rhs)?;
                self.emit(Op::SetItem((keys.len() + 2) as u32), span);
            }
            _ => return Err(Error::Syntax("invalid assignment target".into()).into()),
        }
        Ok(())
    }
}

fn bin_op_kind(op: BinOp) -> BinOpKind {
    match op {
        BinOp::Add => BinOpKind::Add,
        BinOp::Sub => BinOpKind::Sub,
        BinOp::Mul => BinOpKind::Mul,
        BinOp::Div => BinOpKind::Div,
        BinOp::Mod => BinOpKind::Mod,
        BinOp::Pow => BinOpKind::Pow,
        BinOp::BinOr => BinOpKind::BinOr,
        BinOp::BinAnd => BinOpKind::BinAnd,
        BinOp::BinXor => BinOpKind::BinXor,
        BinOp::LShift => BinOpKind::LShift,
        BinOp::RShift => BinOpKind::RShift,
        BinOp::Cmp => BinOpKind::Cmp,
        BinOp::Lt => BinOpKind::Lt,
        BinOp::Le => BinOpKind::Le,
        BinOp::Gt => BinOpKind::Gt,
        BinOp::Ge => BinOpKind::Ge,
        BinOp::Eq => BinOpKind::Eq,
        BinOp::Ne => BinOpKind::Ne,
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops never reach bin_op_kind"),
    }
}

fn const_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Complex(xr, xi), Value::Complex(yr, yi)) => xr.to_bits() == yr.to_bits() && xi.to_bits() == yi.to_bits(),
        (Value::Str(x), Value::Str(y)) => x.bytes == y.bytes,
        _ => false,
    }
}

/// `L` forces big-integer parsing; [`IntValue::from_big`] still normalizes
/// back down to `Small` when the value fits, preserving the invariant that
/// equality never depends on which representation produced a value.
fn parse_int_literal(s: &str) -> Result<Value> {
    let forced_big = s.ends_with('L');
    let digits = if forced_big { &s[..s.len() - 1] } else { s };
    if !forced_big {
        if let Ok(v) = digits.parse::<i64>() {
            return Ok(Value::Int(IntValue::Small(v)));
        }
    }
    let big: BigInt = digits
        .parse()
        .map_err(|_| Error::Syntax(format!("invalid integer literal '{s}'")))?;
    Ok(Value::Int(IntValue::from_big(big)))
}

/// Parameter default values are evaluated once, at definition time, and
/// baked into the `KFunc` template (`object::KFunc::defaults: Vec<Value>`
/// is already a value pool, not an expression pool) — so a default must be
/// a literal constant. `func f(x=compute())` is out of scope; this mirrors
/// the restriction most bytecode-compiled languages place on mutable or
/// call-carrying defaults.
fn const_fold(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Const(c, _) => Ok(match c {
            Const::True => Value::Bool(true),
            Const::False => Value::Bool(false),
            Const::None => Value::None,
            Const::Int(s) => parse_int_literal(s)?,
            Const::Float(f) => Value::Float(*f),
            Const::Complex(f) => Value::Complex(0.0, *f),
            Const::Str(s) => Value::new_str(s.clone()),
        }),
        Expr::Unary(UnOp::Neg, inner, _) => match const_fold(inner)? {
            Value::Int(IntValue::Small(v)) => Ok(Value::Int(IntValue::Small(-v))),
            Value::Int(IntValue::Big(b)) => Ok(Value::Int(IntValue::from_big(-b))),
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => Err(Error::Syntax("parameter default must be a literal constant".into()).into()),
        },
        _ => Err(Error::Syntax("parameter default must be a literal constant".into()).into()),
    }
}

fn approx_span(stmts: &[Stmt]) -> Option<Span> {
    stmts.first().map(|s| match s {
        Stmt::Expr(e) => e.span(),
        Stmt::Throw(_, s) | Stmt::Assert(_, s) | Stmt::Ret(_, s) | Stmt::FuncDef(_, s) | Stmt::Import(_, s) => *s,
        Stmt::If { cond, .. } => cond.span(),
        Stmt::While { cond, .. } => cond.span(),
        Stmt::For { iter, .. } => iter.span(),
        Stmt::TryCatch { body, .. } => approx_span(body).unwrap_or(Span::new(0, 0)),
    })
}

/// Compiles one top-level program. Only its final bare expression statement
/// (if any) keeps its value on the stack; everything else is compiled the
/// same way a function body is, and the code object always ends in an
/// explicit `Ret` so the VM never needs special "ran off the end" handling.
pub fn compile_program(stmts: &[Stmt], source_name: &str) -> Result<CodeObject> {
    let mut c = Compiler::new(source_name);
    let kept = c.compile_block_tail(stmts)?;
    if !kept {
        let idx = c.add_const(Value::None);
        c.emit(Op::Push(idx), Span::new(0, 0));
    }
    c.emit(Op::Ret, Span::new(0, 0));
    Ok(c.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn compile(src: &str) -> CodeObject {
        let toks = crate::lexer::tokenize(src, "<test>").unwrap();
        let stmts = parser::parse(toks, src, "<test>").unwrap();
        compile_program(&stmts, "<test>").unwrap()
    }

    #[test]
    fn arithmetic_precedence_emits_mul_before_add() {
        let code = compile("1 + 2 * 3");
        let kinds: Vec<_> = code.ops.iter().filter(|op| matches!(op, Op::BinOp(_))).collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], Op::BinOp(BinOpKind::Mul)));
        assert!(matches!(kinds[1], Op::BinOp(BinOpKind::Add)));
    }

    #[test]
    fn final_bare_expression_is_kept_others_are_popped() {
        let code = compile("1; 2; 3");
        let ret_idx = code.ops.iter().position(|op| matches!(op, Op::Ret)).unwrap();
        assert!(matches!(code.ops[ret_idx - 1], Op::Push(_)));
        let popu_count = code.ops.iter().filter(|op| matches!(op, Op::Popu)).count();
        assert_eq!(popu_count, 2);
    }

    #[test]
    fn dict_literal_lowers_to_list_of_pairs_and_call() {
        let code = compile("{'a': 1}");
        assert!(code.ops.iter().any(|op| matches!(op, Op::Tuple(2))));
        assert!(code.ops.iter().any(|op| matches!(op, Op::List(1))));
        assert!(code.ops.iter().any(|op| matches!(op, Op::Call(2))));
    }

    #[test]
    fn for_loop_lowers_make_iter_and_iter_next() {
        let code = compile("for x in range(3) { x }");
        assert!(code.ops.iter().any(|op| matches!(op, Op::MakeIter)));
        assert!(code.ops.iter().any(|op| matches!(op, Op::IterNext(_))));
    }

    #[test]
    fn try_catch_binds_name_before_handler_body() {
        let code = compile("try { throw 1 } catch e { e }");
        assert!(code.ops.iter().any(|op| matches!(op, Op::TryStart(_))));
        assert!(code.ops.iter().any(|op| matches!(op, Op::TryEnd(_))));
    }

    #[test]
    fn func_def_stores_under_its_own_name() {
        let code = compile("func id(x) { ret x }");
        assert!(code.ops.iter().any(|op| matches!(op, Op::NewFunc)));
        assert!(code.ops.iter().any(|op| matches!(op, Op::AddClosure)));
    }

    #[test]
    fn big_int_literal_promotes() {
        let code = compile("123L");
        let has_big = code.consts.iter().any(|c| matches!(c, Value::Int(IntValue::Small(123))));
        assert!(has_big);
    }

    #[test]
    fn and_short_circuits_via_dup_and_conditional_jump() {
        let code = compile("1 && 2");
        assert!(code.ops.iter().any(|op| matches!(op, Op::Dup)));
        assert!(code.ops.iter().any(|op| matches!(op, Op::Jmpf(_))));
    }
}
