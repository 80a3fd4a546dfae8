//! Tests that touch process-wide state (the error handler, the interrupt
//! flag, the optimize/trace flags) serialize on one lock and restore what
//! they change.

use std::sync::Mutex;

use quill_core::error::QuillError;
use quill_core::runtime;
use quill_core::{interrupt, options};
use quill_core::writer::write;

static PROCESS_STATE: Mutex<()> = Mutex::new(());

fn ev(src: &str) -> String {
    runtime::init();
    write(&runtime::eval_source(src).expect(src))
}

#[test]
fn undefined_globals_error() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let err = runtime::eval_source("(ef-no-such-thing)").unwrap_err();
    assert!(err.to_string().contains("Undefined symbol"), "{}", err);
}

#[test]
fn type_mismatches_are_argument_errors() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let err = runtime::eval_source("(car 5)").unwrap_err();
    assert!(matches!(err, QuillError::Argument(_)), "{}", err);
}

#[test]
fn calling_a_non_function_errors() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let err = runtime::eval_source("(1 2)").unwrap_err();
    assert!(err.to_string().contains("Not callable"), "{}", err);
}

#[test]
fn errors_accrue_the_enclosing_code_name() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let err = runtime::eval_source("(fn ef-ctx () (car 5)) (ef-ctx)").unwrap_err();
    assert_eq!(err.context(), Some("ef-ctx"));
    assert!(err.to_string().contains("[in ef-ctx]"), "{}", err);
}

#[test]
fn top_handler_receives_errors_and_its_result_wins() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let out = runtime::eval_source(
        "(var *top-handler* (func (e) (list 'caught (error? e))))
         (ef-missing-global)",
    )
    .unwrap();
    assert_eq!(write(&out), "(caught true)");
    runtime::eval_source("(undef *top-handler*)").unwrap();
}

#[test]
fn thrown_values_reach_the_handler_as_error_values() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let out = runtime::eval_source(
        "(var *top-handler* (func (e) (car (to-list (error-data e)))))
         (throw io-error: \"gone\")",
    )
    .unwrap();
    assert_eq!(write(&out), "io-error:");
    runtime::eval_source("(undef *top-handler*)").unwrap();
}

#[test]
fn interrupts_bypass_the_top_handler() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    runtime::eval_source("(var *top-handler* (func (e) 'caught))").unwrap();
    interrupt::request_interrupt();
    let err = runtime::eval_source("(+ 1 2)").unwrap_err();
    interrupt::clear_interrupt();
    assert!(err.is_interrupt(), "{}", err);
    runtime::eval_source("(undef *top-handler*)").unwrap();
}

#[test]
fn optimized_and_instrumented_interpreters_agree() {
    let _guard = PROCESS_STATE.lock().unwrap();
    runtime::init();
    let scenarios = [
        ("(+ 1 2)", "3"),
        (
            "(var ef-fact (func (n) (if (<= n 1) 1 (* n (ef-fact (- n 1)))))) (ef-fact 5)",
            "120",
        ),
        ("`(a ~(+ 1 2) ~@(list 4 5))", "(a 3 4 5)"),
        ("(callcc (func (k) (+ 1 (k 42))))", "42"),
        (
            "(let loop ((i 0) (acc 0)) (if (= i 100) acc (loop (inc i) (+ acc i))))",
            "4950",
        ),
    ];
    for (src, expected) in scenarios {
        options::set_flags(false, false, false, false, false);
        assert_eq!(ev(src), expected, "instrumented: {}", src);
        options::set_flags(true, false, false, false, false);
        assert_eq!(ev(src), expected, "optimized: {}", src);
        options::set_flags(false, false, false, false, false);
    }
}
