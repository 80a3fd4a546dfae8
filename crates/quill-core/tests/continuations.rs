use quill_core::runtime;
use quill_core::writer::write;

fn ev(src: &str) -> String {
    runtime::init();
    write(&runtime::eval_source(src).expect(src))
}

#[test]
fn callcc_round_trips_any_value() {
    assert_eq!(ev("(callcc (func (k) (k 42)))"), "42");
    assert_eq!(ev("(callcc (func (k) (k 'sym)))"), "sym");
    assert_eq!(ev("(callcc (func (k) (k '(1 2))))"), "(1 2)");
    assert_eq!(ev("(callcc (func (k) (k null)))"), "null");
}

#[test]
fn continuation_escapes_pending_computation() {
    assert_eq!(ev("(callcc (func (k) (+ 1 (k 42))))"), "42");
    assert_eq!(ev("(+ 1 (callcc (func (k) (+ 10 (k 1)))))"), "2");
}

#[test]
fn callcc_without_escape_returns_normally() {
    assert_eq!(ev("(callcc (func (k) 7))"), "7");
    assert_eq!(ev("(+ 1 (callcc (func (k) 7)))"), "8");
}

#[test]
fn continuations_are_multi_shot() {
    assert_eq!(
        ev("(var cn-k null)
            (+ 1 (callcc (func (k) (set! cn-k k) 1)))"),
        "2"
    );
    // Each invocation re-enters the captured point with a fresh value.
    assert_eq!(ev("(cn-k 10)"), "11");
    assert_eq!(ev("(cn-k 41)"), "42");
    assert_eq!(ev("(cn-k 10)"), "11");
}

#[test]
fn continuation_arity_is_one() {
    runtime::init();
    assert!(runtime::eval_source("(callcc (func (k) (k 1 2)))").is_err());
    assert!(runtime::eval_source("(callcc list 1)").is_err());
}

#[test]
fn continuations_work_in_tail_position() {
    assert_eq!(
        ev("(var cn-f (func (k) (k 5)))
            (var cn-g (func () (callcc cn-f)))
            (inc (cn-g))"),
        "6"
    );
}
