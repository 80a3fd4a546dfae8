use quill_core::runtime;
use quill_core::writer::write;

fn ev(src: &str) -> String {
    runtime::init();
    write(&runtime::eval_source(src).expect(src))
}

#[test]
fn arithmetic() {
    assert_eq!(ev("(+ 1 2)"), "3");
    assert_eq!(ev("(* 6 7)"), "42");
    assert_eq!(ev("(/ 7 2)"), "3.5");
    assert_eq!(ev("(- 10 4)"), "6");
    assert_eq!(ev("(inc 41)"), "42");
    assert_eq!(ev("(dec 1)"), "0");
}

#[test]
fn numeric_equality_uses_epsilon() {
    assert_eq!(ev("(= 1 1.0000000000001)"), "true");
    assert_eq!(ev("(= 1 1.1)"), "false");
    assert_eq!(ev("(< 1 2)"), "true");
    assert_eq!(ev("(>= 2 2)"), "true");
}

#[test]
fn do_and_if() {
    assert_eq!(ev("(do 1 2 3)"), "3");
    assert_eq!(ev("(if true 1 2)"), "1");
    assert_eq!(ev("(if false 1 2)"), "2");
    assert_eq!(ev("(if false 1)"), "null");
    // null is not false
    assert_eq!(ev("(if null 1 2)"), "1");
}

#[test]
fn globals_define_and_set() {
    assert_eq!(ev("(var vmb-x 10) (set! vmb-x 32) (+ vmb-x 10)"), "42");
}

#[test]
fn undef_removes_a_binding() {
    assert_eq!(ev("(var vmb-gone 5) (undef vmb-gone)"), "vmb-gone");
    assert!(runtime::eval_source("(var vmb-gone2 5) (undef vmb-gone2) vmb-gone2").is_err());
}

#[test]
fn closures_capture_their_frame() {
    assert_eq!(ev("(((func (x) (func (y) (+ x y))) 40) 2)"), "42");
}

#[test]
fn factorial() {
    assert_eq!(
        ev("(var vmb-fact (func (n) (if (<= n 1) 1 (* n (vmb-fact (- n 1))))))
            (vmb-fact 5)"),
        "120"
    );
}

#[test]
fn named_let_accumulates_in_constant_stack() {
    assert_eq!(
        ev("(let loop ((i 0) (acc 0)) (if (= i 100) acc (loop (inc i) (+ acc i))))"),
        "4950"
    );
}

#[test]
fn deep_tail_recursion_does_not_grow_the_stack() {
    // Far deeper than the 1000-slot stack could absorb without tail calls.
    assert_eq!(
        ev("(var vmb-count (func (n) (if (= n 0) 'done (vmb-count (dec n)))))
            (vmb-count 100000)"),
        "done"
    );
}

#[test]
fn rest_parameters() {
    assert_eq!(ev("((func (x & more) (length more)) 1 2 3)"), "2");
    assert_eq!(ev("((func args (length args)) 1 2 3)"), "3");
    assert_eq!(ev("((func (x & more) more) 1 2 3)"), "(2 3)");
}

#[test]
fn optional_parameters_fill_from_defaults() {
    assert_eq!(ev("((func (x [(y 2) (z 3)]) (+ x (+ y z))) 1)"), "6");
    assert_eq!(ev("((func (x [(y 2) (z 3)]) (+ x (+ y z))) 1 10)"), "14");
    assert_eq!(ev("((func (x [y]) (list x y)) 1)"), "(1 null)");
}

#[test]
fn keyword_parameters_bind_by_name() {
    assert_eq!(ev("((func (x {y: 2}) (+ x y)) 1)"), "3");
    assert_eq!(ev("((func (x {y: 2}) (+ x y)) 1 y: 40)"), "41");
    assert!(runtime::eval_source("((func (x {y: 2}) (+ x y)) 1 z: 40)").is_err());
}

#[test]
fn arity_mismatches_are_argument_errors() {
    assert!(runtime::eval_source("((func (x) x) 1 2)").is_err());
    assert!(runtime::eval_source("((func (x y) x) 1)").is_err());
}

#[test]
fn apply_spreads_its_final_list() {
    assert_eq!(ev("(apply + '(1 2))"), "3");
    assert_eq!(ev("(apply + 1 '(2))"), "3");
    assert_eq!(ev("(apply list 1 2 '(3 4))"), "(1 2 3 4)");
}

#[test]
fn keywords_are_accessors() {
    assert_eq!(ev("(var vmb-s {a: 1}) (a: vmb-s)"), "1");
    assert_eq!(ev("(b: {a: 1})"), "null");
}

#[test]
fn vector_and_struct_literals_evaluate_elements() {
    assert_eq!(ev("[1 (+ 1 1) 3]"), "[1 2 3]");
    assert_eq!(ev("{a: (+ 20 22)}"), "{a: 42}");
    assert_eq!(ev("(var vmb-v 7) [vmb-v]"), "[7]");
}

#[test]
fn list_primitives() {
    assert_eq!(ev("(cons 1 '(2 3))"), "(1 2 3)");
    assert_eq!(ev("(car '(1 2))"), "1");
    assert_eq!(ev("(cdr '(1 2))"), "(2)");
    assert_eq!(ev("(concat '(1) '(2 3))"), "(1 2 3)");
    assert_eq!(ev("(reverse '(1 2 3))"), "(3 2 1)");
    assert_eq!(ev("(flatten '(1 (2 (3 4))))"), "(1 2 3 4)");
    assert_eq!(ev("(length \"hello\")"), "5");
}

#[test]
fn interning_is_identity() {
    assert_eq!(ev("(identical? (intern \"foo\") (intern \"foo\"))"), "true");
    assert_eq!(ev("(identical? 'bar 'bar)"), "true");
}

#[test]
fn instances_unwrap_for_equality() {
    assert_eq!(ev("(equal? #<point>{x: 1} {x: 1})"), "true");
    assert_eq!(ev("(type #<point>{x: 1})"), "<point>");
}

#[test]
fn system_library_loads() {
    assert_eq!(
        ev("(import quill)
            (list (map inc '(1 2 3))
                  (filter (func (n) (< n 3)) '(1 2 3 4))
                  (reduce + 0 '(1 2 3 4))
                  (range 4))"),
        "((2 3 4) (1 2) 10 (0 1 2 3))"
    );
    assert_eq!(ev("(import quill) (when true 1 2 3)"), "3");
    assert_eq!(ev("(import quill) (unless true 1)"), "null");
    assert_eq!(ev("(import quill) (and 1 2 3)"), "3");
    assert_eq!(ev("(import quill) (or false 2)"), "2");
}

#[test]
fn spawn_returns_null_and_runs_concurrently() {
    assert_eq!(ev("(var vmb-spawned 0) (spawn (func () (set! vmb-spawned 1)))"), "null");
    // The task mutates a shared global; wait for it with a bounded poll.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let seen = ev("vmb-spawned");
        if seen == "1" {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "spawned task never ran");
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}
