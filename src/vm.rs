//! C7: the stack-based bytecode virtual machine (§4.6, §4.7).
//!
//! This is the **only** module that mutates the live call stack and operand
//! stack; everything else (compiler, operators, builtins) either produces
//! bytecode or is a stateless helper the VM calls into. The two public entry
//! points mirror §4.6's framing: `run_module` starts a fresh top-level frame,
//! `run_kfunc` is what [`crate::call::call`] delegates to for every `kfunc`
//! invocation (including recursive ones).
//!
//! Both share one `Vec<Value>` operand stack on [`crate::frame::Thread`] —
//! there is no per-frame stack segment, since the compiler (§9 "Pervasive
//! sum types"; see `compiler.rs`'s module doc) guarantees every code object
//! leaves the stack exactly as it found it except for the one value it
//! hands back on `Ret`, so frames nest cleanly on a single stack the same
//! way native call frames nest on the machine stack.
//!
//! Name resolution for `LOAD`/`STORE` (§4.6) walks: current frame locals →
//! the frame's flattened closure chain (innermost enclosing scope first,
//! populated by `ADD_CLOSURE` at closure-literal time) → globals. A `LOAD`
//! miss is reported as a `KeyError`, reusing the taxonomy's "name not found
//! in a scope" bucket rather than adding a twelfth exception kind.
//!
//! `try`/`catch` (§4.3, §4.6) is scoped to the frame that opened it: an
//! exception raised three calls deep unwinds straight through intervening
//! frames (each propagates the `Err` because its own `handlers` stack has
//! nothing covering an instruction it never executed) and is only caught by
//! a `TRY_START`/`TRY_END` pair in the frame that is live when the `throw`
//! (or failing instruction) executes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{CodeObject, Op};
use crate::diagnostic::Span;
use crate::error::{Error, Result, Signal};
use crate::frame::{Frame, Interpreter};
use crate::object::{exception_display, signal_to_value, value_hash, values_eq, IntValue, KFunc, Value};

/// Run a freshly compiled top-level program to completion.
pub fn run_module(interp: &mut Interpreter, code: Rc<CodeObject>) -> Result<Value> {
    interp.gil.acquire();
    let frame = Frame::new(code, "<module>".to_string());
    interp.thread.frames.push(frame);
    let frame_index = interp.thread.frames.len() - 1;
    let result = run_frame(interp, frame_index);
    interp.thread.frames.pop();
    result
}

/// Run a `kfunc`'s body to completion. The uniform call convention (C8,
/// `call.rs`) routes every `kfunc` invocation through here.
pub fn run_kfunc(interp: &mut Interpreter, callable: &Value, args: &[Value]) -> Result<Value> {
    interp.check_recursion()?;
    let kfunc = match callable {
        Value::KFunc(k) => k.clone(),
        _ => return Err(Error::Internal("run_kfunc called on a non-kfunc value".into()).into()),
    };
    let locals = bind_params(&kfunc, args)?;
    interp.gil.acquire();
    let frame = Frame {
        code: kfunc.code.clone(),
        ip: 0,
        locals: Rc::new(RefCell::new(locals)),
        closures: kfunc.closures.borrow().clone(),
        callee_name: kfunc.name.clone(),
        handlers: Vec::new(),
    };
    interp.thread.frames.push(frame);
    let frame_index = interp.thread.frames.len() - 1;
    let result = run_frame(interp, frame_index);
    interp.thread.frames.pop();
    result
}

/// Bind `args` to `kfunc.params`, padding trailing parameters from
/// `kfunc.defaults` (§4.6 "fewer arguments than parameters with no default
/// is ArgError").
fn bind_params(kfunc: &KFunc, args: &[Value]) -> Result<HashMap<String, Value>> {
    let total = kfunc.params.len();
    let defaulted = kfunc.defaults.len();
    let required = total - defaulted;
    if args.len() < required || args.len() > total {
        return Err(Error::Arg(format!(
            "{}() takes {} to {} argument(s), got {}",
            kfunc.name,
            required,
            total,
            args.len()
        ))
        .into());
    }
    let mut locals = HashMap::with_capacity(total);
    for (i, name) in kfunc.params.iter().enumerate() {
        let value = if i < args.len() {
            args[i].clone()
        } else {
            kfunc.defaults[i - required].clone()
        };
        locals.insert(name.clone(), value);
    }
    Ok(locals)
}

/// What one executed instruction asks the dispatch loop to do next.
enum Flow {
    Continue,
    Return(Value),
}

/// The fetch-decode-execute loop (§4.6) for the frame at `frame_index` in
/// `interp.thread.frames`. Every code object is guaranteed by the compiler
/// to end in an explicit `Ret`, so there is no "ran off the end" case.
fn run_frame(interp: &mut Interpreter, frame_index: usize) -> Result<Value> {
    loop {
        interp.check_instruction_budget()?;
        interp.maybe_suspend();

        let (op, span) = {
            let frame = &interp.thread.frames[frame_index];
            let ip = frame.ip;
            (frame.code.ops[ip].clone(), frame.code.spans[ip])
        };
        interp.thread.frames[frame_index].ip += 1;

        match exec_one(interp, frame_index, op, span) {
            Ok(Flow::Continue) => continue,
            Ok(Flow::Return(v)) => return Ok(v),
            Err(signal) => {
                let handler = interp.thread.frames[frame_index].handlers.pop();
                match handler {
                    Some(target) => {
                        let exc_value = signal_to_value(signal);
                        interp.thread.stack.push(exc_value);
                        interp.thread.frames[frame_index].ip = target as usize;
                    }
                    None => return Err(signal),
                }
            }
        }
    }
}

fn pop1(interp: &mut Interpreter) -> Result<Value> {
    interp
        .thread
        .stack
        .pop()
        .ok_or_else(|| Error::Internal("operand stack underflow".into()).into())
}

/// Execute one instruction against `interp`'s shared operand stack and the
/// frame at `frame_index`.
fn exec_one(interp: &mut Interpreter, frame_index: usize, op: Op, span: Span) -> Result<Flow> {
    match op {
        Op::Noop => {}

        Op::Push(idx) => {
            let v = interp.thread.frames[frame_index].code.consts[idx as usize].clone();
            interp.thread.stack.push(v);
        }
        Op::Dup => {
            let v = interp
                .thread
                .stack
                .last()
                .cloned()
                .ok_or_else(|| Error::Internal("DUP on empty stack".into()))?;
            interp.thread.stack.push(v);
        }
        Op::Popu => {
            pop1(interp)?;
        }

        Op::List(n) => {
            let len = interp.thread.stack.len();
            let items = interp.thread.stack.split_off(len - n as usize);
            interp.thread.stack.push(Value::List(Rc::new(RefCell::new(items))));
        }
        Op::Tuple(n) => {
            let len = interp.thread.stack.len();
            let items = interp.thread.stack.split_off(len - n as usize);
            interp.thread.stack.push(Value::Tuple(Rc::new(items)));
        }

        Op::GetItem(n) => {
            let len = interp.thread.stack.len();
            let mut items = interp.thread.stack.split_off(len - n as usize);
            let obj = items.remove(0);
            let result = do_getitem(interp, &obj, items)?;
            interp.thread.stack.push(result);
        }
        Op::SetItem(n) => {
            let len = interp.thread.stack.len();
            let mut items = interp.thread.stack.split_off(len - n as usize);
            let obj = items.remove(0);
            let value = items.pop().ok_or_else(|| Error::Internal("SETITEM missing value".into()))?;
            do_setitem(interp, &obj, items, value.clone())?;
            interp.thread.stack.push(value);
        }

        Op::Call(n) => {
            let len = interp.thread.stack.len();
            let mut items = interp.thread.stack.split_off(len - n as usize);
            let callee = items.remove(0);
            let result = crate::call::call(interp, &callee, &items)?;
            interp.thread.stack.push(result);
        }

        Op::Ret => {
            let v = interp.thread.stack.pop().unwrap_or(Value::None);
            return Ok(Flow::Return(v));
        }

        Op::Throw => {
            let value = pop1(interp)?;
            let trace = interp.snapshot_trace(span);
            interp.thread.current_exception = Some((value.clone(), trace.clone()));
            return Err(Signal::Raise { value, trace });
        }
        Op::Assert => {
            let value = pop1(interp)?;
            if !value.truthy(interp)? {
                return Err(Error::Assert("assertion failed".into()).into());
            }
        }

        Op::Jmp(off) => jump(interp, frame_index, off),
        Op::Jmpt(off) => {
            let v = pop1(interp)?;
            if v.truthy(interp)? {
                jump(interp, frame_index, off);
            }
        }
        Op::Jmpf(off) => {
            let v = pop1(interp)?;
            if !v.truthy(interp)? {
                jump(interp, frame_index, off);
            }
        }

        Op::TryStart(off) => {
            let target = (interp.thread.frames[frame_index].ip as i32 + off) as u32;
            interp.thread.frames[frame_index].handlers.push(target);
        }
        Op::TryEnd(off) => {
            interp.thread.frames[frame_index].handlers.pop();
            jump(interp, frame_index, off);
        }

        Op::Load(idx) => {
            let name = interp.thread.frames[frame_index].code.names[idx as usize].clone();
            let value = resolve_name(interp, frame_index, &name)?;
            interp.thread.stack.push(value);
        }
        Op::Store(idx) => {
            let name = interp.thread.frames[frame_index].code.names[idx as usize].clone();
            let value = interp
                .thread
                .stack
                .last()
                .cloned()
                .ok_or_else(|| Error::Internal("STORE on empty stack".into()))?;
            interp.thread.frames[frame_index]
                .locals
                .borrow_mut()
                .insert(name, value);
        }

        Op::LoadAttr(idx) => {
            let name = interp.thread.frames[frame_index].code.names[idx as usize].clone();
            let obj = pop1(interp)?;
            let value = crate::object::getattr(interp, &obj, &name)?;
            interp.thread.stack.push(value);
        }
        Op::StoreAttr(idx) => {
            let name = interp.thread.frames[frame_index].code.names[idx as usize].clone();
            let value = pop1(interp)?;
            let obj = pop1(interp)?;
            crate::object::setattr(interp, &obj, &name, value.clone())?;
            interp.thread.stack.push(value);
        }

        Op::NewFunc => {
            let template = pop1(interp)?;
            let fresh = match template {
                Value::KFunc(k) => Value::KFunc(Rc::new(KFunc {
                    name: k.name.clone(),
                    params: k.params.clone(),
                    defaults: k.defaults.clone(),
                    code: k.code.clone(),
                    closures: RefCell::new(Vec::new()),
                })),
                other => {
                    return Err(
                        Error::Internal(format!("NEW_FUNC on non-kfunc constant: {}", other.type_name())).into(),
                    )
                }
            };
            interp.thread.stack.push(fresh);
        }
        Op::AddClosure => {
            let top = interp
                .thread
                .stack
                .last()
                .cloned()
                .ok_or_else(|| Error::Internal("ADD_CLOSURE on empty stack".into()))?;
            if let Value::KFunc(k) = &top {
                let (locals, enclosing) = {
                    let frame = &interp.thread.frames[frame_index];
                    (frame.locals.clone(), frame.closures.clone())
                };
                let mut scopes = k.closures.borrow_mut();
                scopes.push(locals);
                scopes.extend(enclosing);
            }
        }

        Op::MakeIter => {
            let obj = pop1(interp)?;
            let ty = obj.type_of();
            let iter_slot = ty.slots.borrow().iter.clone();
            let iter_slot =
                iter_slot.ok_or_else(|| Error::Type(format!("'{}' object is not iterable", obj.type_name())))?;
            let iterator = crate::call::call(interp, &iter_slot, std::slice::from_ref(&obj))?;
            interp.thread.stack.push(iterator);
        }
        Op::IterNext(off) => {
            let iterator = interp
                .thread
                .stack
                .last()
                .cloned()
                .ok_or_else(|| Error::Internal("ITER_NEXT on empty stack".into()))?;
            let ty = iterator.type_of();
            let next_slot = ty
                .slots
                .borrow()
                .next
                .clone()
                .ok_or_else(|| Error::Internal("iterator has no next slot".into()))?;
            match crate::call::call(interp, &next_slot, std::slice::from_ref(&iterator)) {
                Ok(v) => interp.thread.stack.push(v),
                Err(signal @ Signal::Raise { .. }) => {
                    let is_exhausted =
                        matches!(&signal, Signal::Raise { value, .. } if exception_display(value).starts_with("OutOfIterError"));
                    if is_exhausted {
                        interp.thread.stack.pop();
                        jump(interp, frame_index, off);
                    } else {
                        return Err(signal);
                    }
                }
            }
        }

        Op::BinOp(kind) => {
            let b = pop1(interp)?;
            let a = pop1(interp)?;
            let r = crate::operators::apply_binop(interp, kind, a, b)?;
            interp.thread.stack.push(r);
        }
        Op::UnOp(kind) => {
            let a = pop1(interp)?;
            let r = crate::operators::apply_unop(interp, kind, a)?;
            interp.thread.stack.push(r);
        }
        Op::Not => {
            let a = pop1(interp)?;
            let r = crate::operators::apply_not(interp, a)?;
            interp.thread.stack.push(r);
        }
        Op::Truthy => {
            let a = pop1(interp)?;
            let r = crate::operators::apply_truthy(interp, a)?;
            interp.thread.stack.push(r);
        }
    }
    Ok(Flow::Continue)
}

fn jump(interp: &mut Interpreter, frame_index: usize, off: i32) {
    let frame = &mut interp.thread.frames[frame_index];
    frame.ip = (frame.ip as i32 + off) as usize;
}

/// `LOAD` resolution order (§4.6): current frame locals, then the closure
/// chain innermost-first, then globals.
fn resolve_name(interp: &mut Interpreter, frame_index: usize, name: &str) -> Result<Value> {
    let frame = &interp.thread.frames[frame_index];
    if let Some(v) = frame.locals.borrow().get(name) {
        return Ok(v.clone());
    }
    for scope in &frame.closures {
        if let Some(v) = scope.borrow().get(name) {
            return Ok(v.clone());
        }
    }
    if let Some(v) = interp.globals.get(name) {
        return Ok(v.clone());
    }
    Err(Error::Key(format!("use of undeclared variable '{name}'")).into())
}

/// Multiple subscript keys (`a[i, j]`, §4.5's `Subscript(obj, keys)`) pack
/// into a tuple key; a single key is used as-is, matching how a literal
/// `dict`'s keys are never themselves wrapped.
fn combine_key(mut keys: Vec<Value>) -> Value {
    if keys.len() == 1 {
        keys.pop().unwrap()
    } else {
        Value::Tuple(Rc::new(keys))
    }
}

fn index_to_usize(key: &Value, len: usize) -> Result<usize> {
    let i = match key {
        Value::Int(IntValue::Small(v)) => *v,
        Value::Int(IntValue::Big(_)) => return Err(Error::Key("index out of range".into()).into()),
        other => return Err(Error::Type(format!("indices must be integers, not '{}'", other.type_name())).into()),
    };
    let n = len as i64;
    let real = if i < 0 { i + n } else { i };
    if real < 0 || real >= n {
        return Err(Error::Key("index out of range".into()).into());
    }
    Ok(real as usize)
}

/// `GETITEM` (§4.6). Built-in containers are indexed directly; anything
/// else falls back to the operand's `getitem` slot (§3.2) since no generic
/// free function for it exists in the object kernel.
fn do_getitem(interp: &mut Interpreter, obj: &Value, keys: Vec<Value>) -> Result<Value> {
    let key = combine_key(keys);
    match obj {
        Value::List(items) => {
            let len = items.borrow().len();
            let idx = index_to_usize(&key, len)?;
            Ok(items.borrow()[idx].clone())
        }
        Value::Tuple(items) => {
            let idx = index_to_usize(&key, items.len())?;
            Ok(items[idx].clone())
        }
        Value::Str(s) => {
            let len = s.bytes.chars().count();
            let idx = index_to_usize(&key, len)?;
            Ok(Value::new_str(s.bytes.chars().nth(idx).unwrap().to_string()))
        }
        Value::Range(r) => {
            let len = r.len() as usize;
            let idx = index_to_usize(&key, len)?;
            Ok(Value::int(r.start + idx as i64 * r.step))
        }
        Value::Dict(d) => {
            let h = value_hash(interp, &key)?;
            let key_for_eq = key.clone();
            let d = d.borrow();
            d.get(h, |o| values_eq(interp, o, &key_for_eq).unwrap_or(false))
                .cloned()
                .ok_or_else(|| Error::Key(format!("key not found: {}", key.type_name())).into())
        }
        other => {
            let ty = other.type_of();
            let slot = ty.slots.borrow().getitem.clone();
            match slot {
                Some(callable) => crate::call::call(interp, &callable, &[other.clone(), key]),
                None => Err(Error::Type(format!("'{}' object is not subscriptable", other.type_name())).into()),
            }
        }
    }
}

/// `SETITEM` (§4.6). Mirrors `do_getitem`'s dispatch; immutable containers
/// (`tuple`, `str`, `range`) reject assignment.
fn do_setitem(interp: &mut Interpreter, obj: &Value, keys: Vec<Value>, value: Value) -> Result<()> {
    let key = combine_key(keys);
    match obj {
        Value::List(items) => {
            let len = items.borrow().len();
            let idx = index_to_usize(&key, len)?;
            items.borrow_mut()[idx] = value;
            Ok(())
        }
        Value::Dict(d) => {
            let h = value_hash(interp, &key)?;
            let key_for_eq = key.clone();
            d.borrow_mut()
                .set(h, key, value, |o| values_eq(interp, o, &key_for_eq).unwrap_or(false));
            Ok(())
        }
        Value::Tuple(_) | Value::Str(_) | Value::Range(_) => Err(Error::Type(format!(
            "'{}' object does not support item assignment",
            obj.type_name()
        ))
        .into()),
        other => {
            let ty = other.type_of();
            let slot = ty.slots.borrow().setitem.clone();
            match slot {
                Some(callable) => {
                    crate::call::call(interp, &callable, &[other.clone(), key, value])?;
                    Ok(())
                }
                None => Err(Error::Type(format!(
                    "'{}' object does not support item assignment",
                    other.type_name()
                ))
                .into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler, lexer, parser};

    fn run(src: &str) -> Value {
        let mut interp = Interpreter::new();
        let toks = lexer::tokenize(src, "<t>").unwrap();
        let stmts = parser::parse(toks, src, "<t>").unwrap();
        let code = compiler::compile_program(&stmts, "<t>").unwrap();
        run_module(&mut interp, Rc::new(code)).unwrap()
    }

    #[test]
    fn push_and_binop_computes_arithmetic() {
        let v = run("3 * (4 + 5)");
        assert!(matches!(v, Value::Int(IntValue::Small(27))));
    }

    #[test]
    fn list_subscript_supports_negative_indexing() {
        let v = run("l = [1, 2, 3]; l[-1]");
        assert!(matches!(v, Value::Int(IntValue::Small(3))));
    }

    #[test]
    fn list_subscript_assignment_mutates_in_place() {
        let v = run("l = [1, 2, 3]; l[1] = 9; l[1]");
        assert!(matches!(v, Value::Int(IntValue::Small(9))));
    }

    #[test]
    fn out_of_range_index_raises_key_error() {
        let mut interp = Interpreter::new();
        let src = "[1, 2][5]";
        let toks = lexer::tokenize(src, "<t>").unwrap();
        let stmts = parser::parse(toks, src, "<t>").unwrap();
        let code = compiler::compile_program(&stmts, "<t>").unwrap();
        let err = run_module(&mut interp, Rc::new(code)).unwrap_err();
        assert!(err.to_string().contains("KeyError"));
    }

    #[test]
    fn for_loop_accumulates_sum() {
        let v = run("total = 0; for x in range(1, 5) { total = total + x }; total");
        assert!(matches!(v, Value::Int(IntValue::Small(10))));
    }

    #[test]
    fn recursive_function_computes_factorial() {
        let v = run("func fact(n) { if n <= 1 { ret 1 }; ret n * fact(n - 1) }; fact(5)");
        assert!(matches!(v, Value::Int(IntValue::Small(120))));
    }

    #[test]
    fn nested_closures_flatten_across_two_levels() {
        let src = "func outer(a) { func middle(b) { func inner(c) { ret a + b + c }; ret inner }; ret middle }; \
                    outer(1)(2)(3)";
        let v = run(src);
        assert!(matches!(v, Value::Int(IntValue::Small(6))));
    }

    #[test]
    fn uncaught_exception_propagates_past_try_in_sibling_call() {
        let mut interp = Interpreter::new();
        let src = "func boom() { throw 'x' }; try { 1 } catch e { boom() }";
        let toks = lexer::tokenize(src, "<t>").unwrap();
        let stmts = parser::parse(toks, src, "<t>").unwrap();
        let code = compiler::compile_program(&stmts, "<t>").unwrap();
        let err = run_module(&mut interp, Rc::new(code)).unwrap_err();
        assert!(matches!(err, Signal::Raise { .. }));
    }

    #[test]
    fn dict_literal_and_subscript_round_trip() {
        let v = run("d = {'x': 10}; d['x']");
        assert!(matches!(v, Value::Int(IntValue::Small(10))));
    }
}
