//! Black-box end-to-end tests driving the public `kimscript` API directly
//! (no access to crate-private helpers), covering the §8 end-to-end
//! scenarios plus the boundary behaviors called out alongside them.

use kimscript::object::IntValue;
use kimscript::{fmt, run_source, Interpreter, Value};
use pretty_assertions::assert_eq;

fn eval(src: &str) -> Value {
    let mut interp = Interpreter::new();
    run_source(&mut interp, src, "<test>").unwrap()
}

fn display(src: &str) -> String {
    let mut interp = Interpreter::new();
    let v = run_source(&mut interp, src, "<test>").unwrap();
    fmt::to_display_string(&mut interp, &v).unwrap()
}

fn err_display(src: &str) -> String {
    let mut interp = Interpreter::new();
    run_source(&mut interp, src, "<test>").unwrap_err().to_string()
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(display("1 + 2 * 3"), "7");
}

#[test]
fn dict_round_trip() {
    assert_eq!(display("d = {'a': 1, 'b': 2}; d['a'] + d['b']"), "3");
}

#[test]
fn closure_captures_enclosing_local() {
    let src = "func make(n) { func inner() { ret n }; ret inner }; f = make(41); f() + 1";
    assert_eq!(display(src), "42");
}

#[test]
fn exception_flow_through_try_catch() {
    let src = "try { throw 1/0 } catch e { ret 'ok' }";
    assert_eq!(display(src), "ok");
}

#[test]
fn iterator_sum_over_range() {
    assert_eq!(display("sum(range(1, 11))"), "55");
}

#[test]
fn big_integer_promotion_matches_literal() {
    let v = eval("2 ** 100");
    let lit = eval("1267650600228229401496703205376L");
    let mut interp = Interpreter::new();
    assert!(kimscript::object::values_eq(&mut interp, &v, &lit).unwrap());
}

#[test]
fn int64_boundary_promotes_instead_of_wrapping() {
    // i64::MAX + 1 must promote to a bigint rather than wrap to i64::MIN.
    let v = eval("9223372036854775807 + 1");
    match v {
        Value::Int(IntValue::Big(_)) => {}
        other => panic!("expected promotion to a bigint, got {other:?}"),
    }
    assert_eq!(display("9223372036854775807 + 1"), "9223372036854775808");
}

#[test]
fn negative_list_indexing_and_string_indexing() {
    assert_eq!(display("[10, 20, 30][-1]"), "30");
    assert_eq!(display("'hello'[0]"), "h");
}

#[test]
fn multi_key_subscript_packs_a_tuple_key() {
    let src = "d = {}; d[1, 2] = 'pair'; d[1, 2]";
    assert_eq!(display(src), "pair");
}

#[test]
fn for_loop_consumes_iterator_to_exhaustion_without_raising() {
    let src = "total = 0; for x in range(0, 5) { total = total + x }; total";
    assert_eq!(display(src), "10");
}

#[test]
fn dict_survives_alternating_insert_and_delete_without_ghost_entries() {
    let src = "\
        d = {}; \
        d['a'] = 1; d['b'] = 2; d['c'] = 3; \
        d['b'] = 99; \
        len(d)";
    assert_eq!(display(src), "3");
}

#[test]
fn deeply_nested_recursion_either_completes_or_raises_cleanly() {
    let mut interp = Interpreter::new();
    let src = "func count(n) { if n <= 0 { ret 0 }; ret 1 + count(n - 1) }; count(50)";
    let v = run_source(&mut interp, src, "<test>").unwrap();
    assert!(matches!(v, Value::Int(IntValue::Small(50))));

    // Deliberately past any reasonable recursion limit: must raise a
    // dedicated error rather than corrupt the frame stack (and must not
    // poison the interpreter for later calls on the same instance).
    let mut interp = Interpreter::new();
    let deep = "func count(n) { if n <= 0 { ret 0 }; ret 1 + count(n - 1) }; count(100000)";
    let result = run_source(&mut interp, deep, "<test>");
    assert!(result.is_err());
    let v = run_source(&mut interp, "1 + 1", "<test>").unwrap();
    assert!(matches!(v, Value::Int(IntValue::Small(2))));
}

#[test]
fn division_by_zero_raises_math_error() {
    assert!(err_display("1 / 0").contains("MathError"));
}

#[test]
fn undeclared_name_raises_key_error() {
    assert!(err_display("this_name_was_never_bound").contains("KeyError"));
}

#[test]
fn out_of_range_list_index_raises_key_error() {
    assert!(err_display("[1, 2, 3][10]").contains("KeyError"));
}

#[test]
fn assignment_to_tuple_element_raises_type_error() {
    assert!(err_display("t = (1, 2); t[0] = 9").contains("TypeError"));
}

#[test]
fn while_loop_with_else_runs_else_when_never_broken() {
    // No `break` statement exists in this language, so the loop always
    // runs to natural exhaustion and the `else` clause always fires.
    let src = "n = 0; total = 0; while n < 3 { total = total + n; n = n + 1 } else { total = total + 100 }; total";
    assert_eq!(display(src), "103");
}

#[test]
fn assert_statement_raises_assert_error_on_false_condition() {
    assert!(err_display("assert 1 == 2").contains("AssertError"));
}

#[test]
fn string_concatenation_and_repetition() {
    assert_eq!(display("'ab' + 'cd'"), "abcd");
    assert_eq!(display("'ab' * 3"), "ababab");
}

#[test]
fn imported_math_module_exposes_constants_and_functions() {
    assert_eq!(display("import math; math.sqrt(16)"), "4.0");
}

#[test]
fn module_is_loaded_at_most_once_per_process() {
    let mut interp = Interpreter::new();
    let a = run_source(&mut interp, "import math; math", "<test>").unwrap();
    let b = run_source(&mut interp, "import math; math", "<test>").unwrap();
    assert!(kimscript::object::values_eq(&mut interp, &a, &b).unwrap());
}

#[test]
fn recursive_closures_of_closures_flatten_enclosing_scopes() {
    let src = "func outer(a) { func middle(b) { func inner(c) { ret a + b + c }; ret inner }; ret middle }; \
               outer(1)(2)(3)";
    assert_eq!(display(src), "6");
}
