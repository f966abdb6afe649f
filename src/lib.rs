//! kimscript — a dynamically-typed scripting language runtime: lexer,
//! recursive-descent/precedence-climbing parser, bytecode compiler, and a
//! stack-based virtual machine over a reference-counted, metaclass-typed
//! object model.
//!
//! # Quick start
//!
//! ```
//! use kimscript::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! let result = kimscript::run_source(&mut interp, "1 + 2 * 3", "<example>").unwrap();
//! assert_eq!(kimscript::fmt::to_display_string(&mut interp, &result).unwrap(), "7");
//! ```
//!
//! # Architecture
//!
//! | Module | Component |
//! |---|---|
//! | [`object`] | C1 object/type kernel: `Value`, `TypeObj`, operator slots |
//! | [`containers`] | C2 containers: open-addressed `dict`, `str`, `range` |
//! | [`frame`] | C3 frames, threads, the GIL, the process-wide `Interpreter` |
//! | [`error`] | C3 exception taxonomy and the `Signal` propagated by every op |
//! | [`lexer`] / [`token`] | C4 tokenizer |
//! | [`ast`] / [`parser`] | C5 AST and parser |
//! | [`bytecode`] / [`compiler`] | C6 instruction set and AST→bytecode lowering |
//! | [`vm`] | C7 dispatch loop |
//! | [`call`] | C8 uniform call convention |
//! | [`fmt`] | C9 display/repr/printf-style formatting |
//! | [`modules`] | C10 module registry |
//! | [`builtins`] | global functions and type constructors |
//! | [`numeric`] / [`operators`] | arithmetic kernels and operator dispatch |

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod call;
pub mod compiler;
pub mod containers;
pub mod diagnostic;
pub mod error;
pub mod fmt;
pub mod frame;
pub mod iterate;
pub mod lexer;
pub mod modules;
pub mod numeric;
pub mod object;
pub mod operators;
pub mod parser;
pub mod token;
pub mod vm;

pub use error::{Error, Result, Signal};
pub use frame::{Interpreter, Limits};
pub use object::Value;

/// Compile and run one top-level program, returning the value of the final
/// statement (or `none` if the program was empty or ended in a non-`ret`
/// statement whose value was discarded — mirrors the REPL/embedding use case
/// that drives the end-to-end scenarios in SPEC_FULL.md §8).
pub fn run_source(interp: &mut Interpreter, source: &str, source_name: &str) -> Result<Value> {
    let toks = lexer::tokenize(source, source_name)?;
    let stmts = parser::parse(toks, source, source_name)?;
    let code = compiler::compile_program(&stmts, source_name)?;
    vm::run_module(interp, std::rc::Rc::new(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_and_precedence() {
        let mut interp = Interpreter::new();
        let v = run_source(&mut interp, "1 + 2 * 3", "<t>").unwrap();
        assert!(matches!(v, Value::Int(object::IntValue::Small(7))));
    }

    #[test]
    fn dict_round_trip() {
        let mut interp = Interpreter::new();
        let v = run_source(&mut interp, "d = {'a': 1, 'b': 2}; d['a'] + d['b']", "<t>").unwrap();
        assert!(matches!(v, Value::Int(object::IntValue::Small(3))));
    }

    #[test]
    fn closures_capture_enclosing_locals() {
        let mut interp = Interpreter::new();
        let src = "func make(n) { func inner() { ret n }; ret inner }; f = make(41); f() + 1";
        let v = run_source(&mut interp, src, "<t>").unwrap();
        assert!(matches!(v, Value::Int(object::IntValue::Small(42))));
    }

    #[test]
    fn exception_flow_through_try_catch() {
        let mut interp = Interpreter::new();
        let src = "try { throw 1/0 } catch e { ret 'ok' }";
        let v = run_source(&mut interp, src, "<t>").unwrap();
        match v {
            Value::Str(s) => assert_eq!(s.bytes, "ok"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn iterator_sum_over_range() {
        let mut interp = Interpreter::new();
        let v = run_source(&mut interp, "sum(range(1, 11))", "<t>").unwrap();
        assert!(matches!(v, Value::Int(object::IntValue::Small(55))));
    }

    #[test]
    fn big_integer_promotion_matches_literal() {
        let mut interp = Interpreter::new();
        let v = run_source(&mut interp, "2 ** 100", "<t>").unwrap();
        let lit = run_source(&mut interp, "1267650600228229401496703205376L", "<t>").unwrap();
        assert!(object::values_eq(&mut interp, &v, &lit).unwrap());
    }
}
