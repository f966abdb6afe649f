//! C8: the uniform call convention. Every flavor of callable in §3.5
//! (`cfunc`, `kfunc`, `pfunc`, and a type object being constructed) is
//! invoked through this one entry point, so operator-slot dispatch, the
//! `CALL` opcode, and built-in constructors never need to special-case on
//! what kind of thing they are calling.

use crate::error::{Error, Result};
use crate::object::{PFunc, Value};

/// Invoke `callable(*args)`.
///
/// - `cfunc`: calls the native closure directly.
/// - `kfunc`: binds `args` to parameters (padding with defaults, §4.6
///   "fewer arguments than parameters with no default is ArgError") and
///   runs the bytecode body to completion (`crate::vm::run_kfunc`).
/// - `pfunc`: prepends its bound arguments and re-enters `call` against the
///   wrapped callable (§3.5 "pfunc ... is itself callable").
/// - `type`: construction, §4.1 "Construction" — `new` builds the instance,
///   `init` (if present) initializes it in place; `new`'s return value is
///   what the expression evaluates to either way.
pub fn call(interp: &mut crate::frame::Interpreter, callable: &Value, args: &[Value]) -> Result<Value> {
    interp.check_recursion()?;
    match callable {
        Value::CFunc(f) => (f.f)(interp, args),
        Value::KFunc(_) => crate::vm::run_kfunc(interp, callable, args),
        Value::PFunc(p) => {
            let PFunc { callable: inner, bound } = &**p;
            let mut all = bound.clone();
            all.extend_from_slice(args);
            call(interp, inner, &all)
        }
        Value::Type(t) => {
            let new_slot = t.slots.borrow().new.clone();
            let new_fn = new_slot.ok_or_else(|| Error::Type(format!("type '{}' is not constructible", t.name)))?;
            let instance = call(interp, &new_fn, args)?;
            let init_slot = t.slots.borrow().init.clone();
            if let Some(init_fn) = init_slot {
                let mut init_args = vec![instance.clone()];
                init_args.extend_from_slice(args);
                call(interp, &init_fn, &init_args)?;
            }
            Ok(instance)
        }
        _ => Err(Error::Type(format!("'{}' object is not callable", callable.type_name())).into()),
    }
}
