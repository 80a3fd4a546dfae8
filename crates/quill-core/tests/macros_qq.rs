use quill_core::expand::macroexpand;
use quill_core::reader::{read, KeyPolicy};
use quill_core::runtime;
use quill_core::writer::write;

fn ev(src: &str) -> String {
    runtime::init();
    write(&runtime::eval_source(src).expect(src))
}

fn expand(src: &str) -> String {
    runtime::init();
    let expr = read(src, KeyPolicy::Any).unwrap();
    write(&macroexpand(&expr).expect(src))
}

#[test]
fn quasiquote_splices() {
    assert_eq!(ev("`(a ~(+ 1 2) ~@(list 4 5))"), "(a 3 4 5)");
    assert_eq!(ev("`(a b)"), "(a b)");
    assert_eq!(ev("`x"), "x");
    assert_eq!(ev("`7"), "7");
    assert_eq!(ev("(var qq-v 9) `(start ~qq-v)"), "(start 9)");
}

#[test]
fn quasiquote_nests_plain_lists() {
    assert_eq!(ev("`(a (b ~(+ 1 1)))"), "(a (b 2))");
}

#[test]
fn nested_quasiquote_is_an_error() {
    runtime::init();
    assert!(runtime::eval_source("`(a `(b))").is_err());
}

#[test]
fn top_level_splice_is_an_error() {
    runtime::init();
    assert!(runtime::eval_source("`~@(list 1 2)").is_err());
}

#[test]
fn swap_macro_rewrites_to_fixed_point() {
    assert_eq!(
        ev("(macro mq-swap (func (a b) `(let ((tmp ~a)) (set! ~a ~b) (set! ~b tmp))))
            (var mq-x 1)
            (var mq-y 2)
            (mq-swap mq-x mq-y)
            (list mq-x mq-y)"),
        "(2 1)"
    );
}

#[test]
fn macro_surface_form_with_parameter_list() {
    assert_eq!(
        ev("(macro mq-twice (e) `(+ ~e ~e))
            (mq-twice 21)"),
        "42"
    );
}

#[test]
fn macros_expand_recursively() {
    assert_eq!(
        ev("(macro mq-one (e) `(inc ~e))
            (macro mq-two (e) `(mq-one (mq-one ~e)))
            (mq-two 40)"),
        "42"
    );
}

#[test]
fn self_returning_macro_is_bounded() {
    runtime::init();
    let err = runtime::eval_source(
        "(macro mq-loop (& args) `(mq-loop ~@args))
         (mq-loop 1)",
    );
    assert!(err.is_err());
}

#[test]
fn macro_cannot_be_used_as_a_value() {
    runtime::init();
    assert!(runtime::eval_source("(macro mq-m (e) `~e) (list mq-m)").is_err());
}

#[test]
fn fn_rewrites_to_var_of_func() {
    let text = expand("(fn add2 (x) (+ x 2))");
    assert!(text.starts_with("(var add2 (func (x)"), "{}", text);
}

#[test]
fn leading_defs_in_a_body_become_letrec() {
    assert_eq!(
        ev("((func ()
              (var mq-even? (func (n) (if (= n 0) true (mq-odd? (- n 1)))))
              (var mq-odd? (func (n) (if (= n 0) false (mq-even? (- n 1)))))
              (mq-even? 10)))"),
        "true"
    );
}

#[test]
fn macro_definitions_inside_a_body_are_errors() {
    runtime::init();
    assert!(runtime::eval_source("((func () (macro mq-inner (e) `~e) 1))").is_err());
}

#[test]
fn let_binds_in_parallel() {
    assert_eq!(ev("(let ((x 1) (y 2)) (+ x y))"), "3");
    assert_eq!(ev("(var mq-shadow 10) (let ((mq-shadow 1)) mq-shadow)"), "1");
}

#[test]
fn letrec_allows_forward_references() {
    assert_eq!(
        ev("(letrec ((ev? (func (n) (if (= n 0) true (od? (- n 1)))))
                     (od? (func (n) (if (= n 0) false (ev? (- n 1))))))
              (od? 9))"),
        "true"
    );
}

#[test]
fn cond_chains_right_associatively() {
    assert_eq!(ev("(cond (false 1) (true 2) (else 3))"), "2");
    assert_eq!(ev("(cond (false 1) (else 3))"), "3");
    assert_eq!(ev("(cond (false 1) (false 2))"), "null");
}

#[test]
fn cond_arrow_applies_the_function_to_the_tested_value() {
    assert_eq!(ev("(cond ((car '(5)) => inc) (else 0))"), "6");
    assert_eq!(ev("(cond (false => inc) (else 'fell))"), "fell");
}

#[test]
fn cond_arrow_evaluates_its_test_once() {
    assert_eq!(
        ev("(var mq-hits 0)
            (var mq-probe (func () (do (set! mq-hits (inc mq-hits)) 7)))
            (cond ((mq-probe) => inc) (else 0))
            mq-hits"),
        "1"
    );
}
