//! C10: the module registry. `import "name"` (§4.9) asks the registry for a
//! module by name; the first request runs that module's loader and caches
//! the resulting [`crate::object::ModuleObj`], every later request in the
//! same process returns the cached object untouched (§4.9 "a module is
//! loaded at most once per process").
//!
//! Grounded on the teacher's `modules.rs`/`sandbox.rs` `ModuleBuilder`
//! pattern (constant/function registration closures), generalized from
//! Python-standard-library names to this language's own `math` module.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::object::{CFunc, ModuleObj, Value};

type Loader = Box<dyn Fn() -> Value>;

pub struct Registry {
    loaders: HashMap<String, Loader>,
    loaded: RefCell<HashMap<String, Value>>,
}

impl Registry {
    pub fn new() -> Self {
        let mut reg = Self {
            loaders: HashMap::new(),
            loaded: RefCell::new(HashMap::new()),
        };
        reg.loaders.insert("math".to_string(), Box::new(build_math_module));
        reg
    }

    /// Register (or replace) a loader for `name`. Used by embedding hosts to
    /// add their own modules without touching the VM.
    pub fn register(&mut self, name: impl Into<String>, loader: impl Fn() -> Value + 'static) {
        self.loaders.insert(name.into(), Box::new(loader));
    }

    /// `import "name"` (§4.9). Memoized: the loader runs at most once.
    pub fn load(&self, name: &str) -> Result<Value> {
        if let Some(v) = self.loaded.borrow().get(name) {
            return Ok(v.clone());
        }
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| Error::Key(format!("no module named '{name}'")))?;
        let module = loader();
        self.loaded.borrow_mut().insert(name.to_string(), module.clone());
        tracing::debug!(module = name, "loaded module");
        Ok(module)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn native_fn(name: &str, sig: &str, f: impl Fn(&mut crate::frame::Interpreter, &[Value]) -> Result<Value> + 'static) -> Value {
    Value::CFunc(Rc::new(CFunc {
        name: name.to_string(),
        sig: sig.to_string(),
        f: Box::new(f),
    }))
}

fn arg_as_f64(args: &[Value], idx: usize) -> Result<f64> {
    match args.get(idx) {
        Some(Value::Int(i)) => Ok(i.to_f64()),
        Some(Value::Float(f)) => Ok(*f),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => Err(Error::Type("expected a numeric argument".into()).into()),
    }
}

fn build_math_module() -> Value {
    let attrs = RefCell::new(HashMap::new());
    {
        let mut a = attrs.borrow_mut();
        a.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
        a.insert("e".to_string(), Value::Float(std::f64::consts::E));
        a.insert("tau".to_string(), Value::Float(std::f64::consts::TAU));
        a.insert("inf".to_string(), Value::Float(f64::INFINITY));
        a.insert("nan".to_string(), Value::Float(f64::NAN));

        a.insert(
            "sqrt".to_string(),
            native_fn("math.sqrt", "sqrt(x)", |_i, args| Ok(Value::Float(arg_as_f64(args, 0)?.sqrt()))),
        );
        a.insert(
            "floor".to_string(),
            native_fn("math.floor", "floor(x)", |_i, args| Ok(Value::int(arg_as_f64(args, 0)?.floor() as i64))),
        );
        a.insert(
            "ceil".to_string(),
            native_fn("math.ceil", "ceil(x)", |_i, args| Ok(Value::int(arg_as_f64(args, 0)?.ceil() as i64))),
        );
        a.insert(
            "sin".to_string(),
            native_fn("math.sin", "sin(x)", |_i, args| Ok(Value::Float(arg_as_f64(args, 0)?.sin()))),
        );
        a.insert(
            "cos".to_string(),
            native_fn("math.cos", "cos(x)", |_i, args| Ok(Value::Float(arg_as_f64(args, 0)?.cos()))),
        );
        a.insert(
            "log".to_string(),
            native_fn("math.log", "log(x, base=e)", |_i, args| {
                let x = arg_as_f64(args, 0)?;
                if args.len() >= 2 {
                    Ok(Value::Float(x.ln() / arg_as_f64(args, 1)?.ln()))
                } else {
                    Ok(Value::Float(x.ln()))
                }
            }),
        );
        a.insert(
            "pow".to_string(),
            native_fn("math.pow", "pow(x, y)", |_i, args| {
                Ok(Value::Float(arg_as_f64(args, 0)?.powf(arg_as_f64(args, 1)?)))
            }),
        );
        a.insert(
            "fabs".to_string(),
            native_fn("math.fabs", "fabs(x)", |_i, args| Ok(Value::Float(arg_as_f64(args, 0)?.abs()))),
        );
    }
    Value::Module(Rc::new(ModuleObj {
        name: "math".to_string(),
        attrs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_module_loads_once_and_is_memoized() {
        let reg = Registry::new();
        let a = reg.load("math").unwrap();
        let b = reg.load("math").unwrap();
        match (a, b) {
            (Value::Module(x), Value::Module(y)) => assert!(Rc::ptr_eq(&x, &y)),
            _ => panic!("expected module values"),
        }
    }

    #[test]
    fn unknown_module_is_key_error() {
        let reg = Registry::new();
        assert!(reg.load("nope").is_err());
    }
}
