//! Exception taxonomy (§4.3/§7) and the signal threaded through every
//! fallible VM operation.
//!
//! Every subtype named in §4.3 is a variant here. `Signal` is what actually
//! propagates through `Result`: either a hard host-level error (a Rust-side
//! bug such as a malformed constant pool) or `Raise`, which carries a live
//! language-level exception object that a `try`/`catch` can observe and
//! re-enter the VM with.

use std::fmt;

use crate::object::Value;

pub type Result<T> = std::result::Result<T, Signal>;

/// The exception taxonomy from §4.3. Each variant becomes a language-level
/// exception object (see [`crate::object::make_exception`]) whose type name
/// matches the variant name.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("MathError: {0}")]
    Math(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("AttrError: {0}")]
    Attr(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("OpError: {0}")]
    Op(String),
    #[error("ArgError: {0}")]
    Arg(String),
    #[error("InternalError: {0}")]
    Internal(String),
    #[error("AssertError: {0}")]
    Assert(String),
    #[error("OutOfIterError")]
    OutOfIter,
    #[error("IOError: {0}")]
    Io(String),
}

impl Error {
    /// The exception type name as seen by language-level `catch` matching.
    pub fn type_name(&self) -> &'static str {
        match self {
            Error::Syntax(_) => "SyntaxError",
            Error::Math(_) => "MathError",
            Error::Type(_) => "TypeError",
            Error::Attr(_) => "AttrError",
            Error::Key(_) => "KeyError",
            Error::Op(_) => "OpError",
            Error::Arg(_) => "ArgError",
            Error::Internal(_) => "InternalError",
            Error::Assert(_) => "AssertError",
            Error::OutOfIter => "OutOfIterError",
            Error::Io(_) => "IOError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Error::Syntax(m)
            | Error::Math(m)
            | Error::Type(m)
            | Error::Attr(m)
            | Error::Key(m)
            | Error::Op(m)
            | Error::Arg(m)
            | Error::Internal(m)
            | Error::Assert(m)
            | Error::Io(m) => m.clone(),
            Error::OutOfIter => String::new(),
        }
    }
}

/// One entry in a captured call-stack snapshot, taken at the raise site
/// (§4.3, §7).
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub func_name: String,
    pub span: crate::diagnostic::Span,
}

/// A captured call-stack snapshot, printed frame-by-frame on an escaping
/// exception (§7 "User-visible failure").
#[derive(Debug, Clone, Default)]
pub struct Traceback {
    pub frames: Vec<TraceEntry>,
}

impl Traceback {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for frame in self.frames.iter().rev() {
            out.push_str(&format!(
                "  at {} ({}:{})\n",
                frame.func_name, frame.span.start, frame.span.end
            ));
        }
        out
    }
}

impl fmt::Display for Traceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// The distinguishable failure signal (§7 "Propagation policy") that every
/// fallible operation returns alongside setting the thread's current
/// exception slot.
#[derive(Debug, Clone)]
pub enum Signal {
    /// A language-level exception is in flight. `value` is the exception
    /// object (a subtype of `Error`, §4.3); `trace` is the snapshot taken at
    /// the raise site.
    Raise { value: Value, trace: Traceback },
}

impl Signal {
    pub fn raise(err: Error) -> Self {
        Signal::Raise {
            value: crate::object::make_exception(err),
            trace: Traceback::default(),
        }
    }

    pub fn with_trace(mut self, entry: TraceEntry) -> Self {
        if let Signal::Raise { trace, .. } = &mut self {
            trace.frames.push(entry);
        }
        self
    }
}

impl From<Error> for Signal {
    fn from(e: Error) -> Self {
        Signal::raise(e)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Raise { value, .. } => write!(f, "{}", crate::object::exception_display(value)),
        }
    }
}
