//! C3: stack frames, threads, the interpreter context, and the global lock.
//!
//! §9 "Global mutable state" asks for the module registry and globals
//! dictionary to live behind a single process-wide context rather than
//! scattered statics; [`Interpreter`] is that context. §9 "Co-operative
//! threading" asks for a builder pattern (enter/leave) rather than ambient
//! thread-locals for the GIL; [`Gil`] is that builder. Because the object
//! graph is `Rc`-based (§3.1's implementation note), `Interpreter` itself is
//! `!Send`/`!Sync` — see SPEC_FULL.md §5's implementation note for why that
//! is the correct rendering of "parallel native threads serialized by a
//! global lock" in a refcounted, non-atomic object model.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::CodeObject;
use crate::diagnostic::Span;
use crate::error::{Error, Result, Signal, TraceEntry, Traceback};
use crate::object::{CFunc, KFunc, TypeObj, Value};

/// One activation record (§3.6). Locals live in a `Rc<RefCell<..>>` so a
/// `kfunc` literal created inside this frame can close over it (§4.6
/// "ADD_CLOSURE").
pub struct Frame {
    pub code: Rc<CodeObject>,
    pub ip: usize,
    pub locals: Rc<RefCell<HashMap<String, Value>>>,
    pub closures: Vec<Rc<RefCell<HashMap<String, Value>>>>,
    pub callee_name: String,
    /// Active `TRY_START`/`TRY_END` handler offsets, innermost last.
    pub handlers: Vec<u32>,
}

impl Frame {
    pub fn new(code: Rc<CodeObject>, callee_name: String) -> Self {
        Self {
            code,
            ip: 0,
            locals: Rc::new(RefCell::new(HashMap::new())),
            closures: Vec::new(),
            callee_name,
            handlers: Vec::new(),
        }
    }
}

/// A cooperative thread of execution (§3.6, §5). Mirrors the spec's "thread
/// owns: a name, operand stack, call-frame stack, current exception, and
/// (on throw) a captured snapshot."
pub struct Thread {
    pub name: String,
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
    pub current_exception: Option<(Value, Traceback)>,
}

impl Thread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack: Vec::new(),
            frames: Vec::new(),
            current_exception: None,
        }
    }
}

/// The global interpreter lock (§5, §9). Re-entrant token owned by at most
/// one logical holder at a time. Because `Interpreter` lives on one OS
/// thread's stack in this single-process Rc-based realization, `Gil` here
/// tracks re-entrancy depth rather than arbitrating between real OS
/// threads — a host that wants true OS-thread parallelism runs one
/// `Interpreter` per thread and hands control between them explicitly
/// (SPEC_FULL.md §5 implementation note).
#[derive(Default)]
pub struct Gil {
    depth: u32,
}

pub struct GilGuard<'a> {
    gil: &'a mut Gil,
}

impl Gil {
    pub fn acquire(&mut self) -> GilGuard<'_> {
        self.depth += 1;
        tracing::trace!(depth = self.depth, "gil acquired");
        GilGuard { gil: self }
    }

    pub fn held(&self) -> bool {
        self.depth > 0
    }
}

impl Drop for GilGuard<'_> {
    fn drop(&mut self) {
        self.gil.depth -= 1;
        tracing::trace!(depth = self.gil.depth, "gil released");
    }
}

/// Host-configurable VM resource caps (ambient config layer, SPEC_FULL.md §1).
#[derive(Clone, Debug)]
pub struct Limits {
    /// Max bytecode instructions executed per top-level `run`. `None` = unbounded.
    pub instruction_limit: Option<u64>,
    /// Max call-frame depth (§8 "deeply-nested calls... raise a dedicated error").
    pub recursion_limit: usize,
    /// Instructions between voluntary GIL release points (§5 "Suspension points").
    pub gil_switch_interval: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            instruction_limit: None,
            recursion_limit: 2000,
            gil_switch_interval: 100,
        }
    }
}

/// All built-in type descriptors (§3.2), built once per OS thread (see the
/// module doc comment on why this is thread-local rather than a single
/// global).
pub struct BuiltinTypes {
    pub none_type: Rc<TypeObj>,
    pub bool_type: Rc<TypeObj>,
    pub int_type: Rc<TypeObj>,
    pub float_type: Rc<TypeObj>,
    pub complex_type: Rc<TypeObj>,
    pub str_type: Rc<TypeObj>,
    pub tuple_type: Rc<TypeObj>,
    pub list_type: Rc<TypeObj>,
    pub dict_type: Rc<TypeObj>,
    pub range_type: Rc<TypeObj>,
    pub range_iter_type: Rc<TypeObj>,
    pub list_iter_type: Rc<TypeObj>,
    pub dict_iter_type: Rc<TypeObj>,
    pub str_iter_type: Rc<TypeObj>,
    pub cfunc_type: Rc<TypeObj>,
    pub kfunc_type: Rc<TypeObj>,
    pub pfunc_type: Rc<TypeObj>,
    pub type_type: Rc<TypeObj>,
    pub exception_type: Rc<TypeObj>,
    pub code_type: Rc<TypeObj>,
    pub module_type: Rc<TypeObj>,
}

fn native(name: &str, sig: &str, f: impl Fn(&mut Interpreter, &[Value]) -> Result<Value> + 'static) -> Value {
    Value::CFunc(Rc::new(CFunc {
        name: name.to_string(),
        sig: sig.to_string(),
        f: Box::new(f),
    }))
}

impl BuiltinTypes {
    fn new() -> Self {
        let none_type = TypeObj::new("none", vec![]);
        let bool_type = TypeObj::new("bool", vec![]);
        let int_type = TypeObj::new("int", vec![]);
        let float_type = TypeObj::new("float", vec![]);
        let complex_type = TypeObj::new("complex", vec![]);
        let str_type = TypeObj::new("str", vec![]);
        let tuple_type = TypeObj::new("tuple", vec![]);
        let list_type = TypeObj::new("list", vec![]);
        let dict_type = TypeObj::new("dict", vec![]);
        let range_type = TypeObj::new("range", vec![]);
        let range_iter_type = TypeObj::new("range_iter", vec![]);
        let list_iter_type = TypeObj::new("list_iter", vec![]);
        let dict_iter_type = TypeObj::new("dict_iter", vec![]);
        let str_iter_type = TypeObj::new("str_iter", vec![]);
        let cfunc_type = TypeObj::new("cfunc", vec![]);
        let kfunc_type = TypeObj::new("kfunc", vec![]);
        let pfunc_type = TypeObj::new("pfunc", vec![]);
        let type_type = TypeObj::new("type", vec![]);
        let exception_type = TypeObj::new("Error", vec![]);
        let code_type = TypeObj::new("code", vec![]);
        let module_type = TypeObj::new("module", vec![]);

        // Iterator `next` slots: thin wrappers over the free functions in
        // `crate::iterate`, so MAKE_ITER/ITER_NEXT (§4.7) reach them by the
        // same uniform type-slot path a user-defined iterator would use.
        range_iter_type.slots.borrow_mut().next = Some(native("range_iter.next", "range_iter.__next__(self)", |_interp, args| {
            crate::iterate::range_iter_next(&args[0])
        }));
        list_iter_type.slots.borrow_mut().next = Some(native("list_iter.next", "list_iter.__next__(self)", |_interp, args| {
            crate::iterate::list_iter_next(&args[0])
        }));
        dict_iter_type.slots.borrow_mut().next = Some(native("dict_iter.next", "dict_iter.__next__(self)", |_interp, args| {
            crate::iterate::dict_iter_next(&args[0])
        }));
        str_iter_type.slots.borrow_mut().next = Some(native("str_iter.next", "str_iter.__next__(self)", |_interp, args| {
            crate::iterate::str_iter_next(&args[0])
        }));

        range_type.slots.borrow_mut().iter = Some(native("range.iter", "range.__iter__(self)", |_interp, args| {
            Ok(crate::iterate::make_range_iter(&args[0]))
        }));
        list_type.slots.borrow_mut().iter = Some(native("list.iter", "list.__iter__(self)", |_interp, args| {
            Ok(crate::iterate::make_list_iter(&args[0]))
        }));
        dict_type.slots.borrow_mut().iter = Some(native("dict.iter", "dict.__iter__(self)", |_interp, args| {
            Ok(crate::iterate::make_dict_iter(&args[0]))
        }));
        str_type.slots.borrow_mut().iter = Some(native("str.iter", "str.__iter__(self)", |_interp, args| {
            Ok(crate::iterate::make_str_iter(&args[0]))
        }));

        // Type-construction slots (C8 "type: construct (new, init)").
        int_type.slots.borrow_mut().new = Some(native("int.new", "int(x=0)", |interp, args| {
            crate::builtins::construct_int(interp, args)
        }));
        float_type.slots.borrow_mut().new = Some(native("float.new", "float(x=0.0)", |interp, args| {
            crate::builtins::construct_float(interp, args)
        }));
        str_type.slots.borrow_mut().new = Some(native("str.new", "str(x='')", |interp, args| {
            crate::builtins::construct_str(interp, args)
        }));
        bool_type.slots.borrow_mut().new = Some(native("bool.new", "bool(x=false)", |interp, args| {
            crate::builtins::construct_bool(interp, args)
        }));
        list_type.slots.borrow_mut().new = Some(native("list.new", "list(x=[])", |interp, args| {
            crate::builtins::construct_list(interp, args)
        }));
        tuple_type.slots.borrow_mut().new = Some(native("tuple.new", "tuple(x=())", |interp, args| {
            crate::builtins::construct_tuple(interp, args)
        }));
        dict_type.slots.borrow_mut().new = Some(native("dict.new", "dict(*kvs)", |interp, args| {
            crate::builtins::construct_dict(interp, args)
        }));
        range_type.slots.borrow_mut().new = Some(native("range.new", "range(start, stop=none, step=1)", |_interp, args| {
            crate::builtins::construct_range(args)
        }));

        Self {
            none_type,
            bool_type,
            int_type,
            float_type,
            complex_type,
            str_type,
            tuple_type,
            list_type,
            dict_type,
            range_type,
            range_iter_type,
            list_iter_type,
            dict_iter_type,
            str_iter_type,
            cfunc_type,
            kfunc_type,
            pfunc_type,
            type_type,
            exception_type,
            code_type,
            module_type,
        }
    }
}

thread_local! {
    static BUILTIN_TYPES: Rc<BuiltinTypes> = Rc::new(BuiltinTypes::new());
}

pub fn builtin_types() -> Rc<BuiltinTypes> {
    BUILTIN_TYPES.with(|t| t.clone())
}

/// The process-wide context (§9 "Global mutable state"): globals dictionary,
/// module registry, and the GIL, created at init and torn down at shutdown
/// (dropped with the `Interpreter`).
pub struct Interpreter {
    pub globals: HashMap<String, Value>,
    pub modules: crate::modules::Registry,
    pub gil: Gil,
    pub limits: Limits,
    pub thread: Thread,
    instructions_run: u64,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interp = Self {
            globals: HashMap::new(),
            modules: crate::modules::Registry::new(),
            gil: Gil::default(),
            limits: Limits::default(),
            thread: Thread::new("main"),
            instructions_run: 0,
        };
        crate::builtins::install_globals(&mut interp);
        interp
    }

    pub fn with_limits(limits: Limits) -> Self {
        let mut interp = Self::new();
        interp.limits = limits;
        interp
    }

    /// Voluntary suspension point (§5). In this single-threaded realization
    /// there is no other OS thread to admit, but the accounting and the
    /// `tracing` event are real: an embedding host driving multiple
    /// `Interpreter`s round-robin can use this as the handoff point.
    pub fn maybe_suspend(&mut self) {
        self.instructions_run += 1;
        if self.instructions_run % self.limits.gil_switch_interval == 0 {
            tracing::trace!(count = self.instructions_run, "suspension point");
        }
    }

    pub fn check_instruction_budget(&self) -> Result<()> {
        if let Some(limit) = self.limits.instruction_limit {
            if self.instructions_run > limit {
                return Err(Error::Internal("instruction budget exceeded".into()).into());
            }
        }
        Ok(())
    }

    pub fn check_recursion(&self) -> Result<()> {
        if self.thread.frames.len() >= self.limits.recursion_limit {
            return Err(Error::Internal("maximum recursion depth exceeded".into()).into());
        }
        Ok(())
    }

    /// Build a traceback snapshot of the current call stack (§4.3 "raising
    /// stores ... a snapshot of frames").
    pub fn snapshot_trace(&self, span: Span) -> Traceback {
        let mut frames: Vec<TraceEntry> = self
            .thread
            .frames
            .iter()
            .map(|f| TraceEntry {
                func_name: f.callee_name.clone(),
                span,
            })
            .collect();
        frames.push(TraceEntry {
            func_name: "<module>".to_string(),
            span,
        });
        Traceback { frames }
    }

    pub fn raise(&mut self, err: Error, span: Span) -> Signal {
        let value = crate::object::make_exception(err);
        let trace = self.snapshot_trace(span);
        self.thread.current_exception = Some((value.clone(), trace.clone()));
        Signal::Raise { value, trace }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
