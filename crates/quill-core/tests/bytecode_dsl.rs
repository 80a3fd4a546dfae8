use quill_core::expand::macroexpand;
use quill_core::reader::{read, KeyPolicy};
use quill_core::runtime;
use quill_core::vm::compiler::compile;
use quill_core::writer::write;

fn decompile(src: &str) -> String {
    runtime::init();
    let expr = read(src, KeyPolicy::Any).unwrap();
    let expanded = macroexpand(&expr).unwrap();
    compile(&expanded).unwrap().decompile(true)
}

#[test]
fn decompiled_code_reloads_and_reruns() {
    runtime::init();
    let text = decompile("(do (var dsl-x 5) (inc dsl-x))");
    assert!(text.starts_with("(code"), "{}", text);
    let reloaded = runtime::eval_source(&text).unwrap();
    assert_eq!(write(&reloaded), "6");
}

#[test]
fn closures_decompile_recursively_and_reload() {
    runtime::init();
    let text = decompile("(do (var dsl-f (func (n) (* n n))) (dsl-f 7))");
    assert!(text.contains("(closure"), "{}", text);
    assert!(text.contains("(func (\"dsl-f\" 1 null null)"), "{}", text);
    let reloaded = runtime::eval_source(&text).unwrap();
    assert_eq!(write(&reloaded), "49");
}

#[test]
fn rest_and_optional_headers_survive_the_round_trip() {
    runtime::init();
    let rest = decompile("(var dsl-r (func (x & more) more))");
    assert!(rest.contains("(func (\"dsl-r\" 1 [] null)"), "{}", rest);
    let optional = decompile("(var dsl-o (func (x [(y 2)]) y))");
    assert!(optional.contains("(func (\"dsl-o\" 1 [2] null)"), "{}", optional);

    runtime::eval_source(&rest).unwrap();
    assert_eq!(
        write(&runtime::eval_source("(dsl-r 1 2 3)").unwrap()),
        "(2 3)"
    );
    runtime::eval_source(&optional).unwrap();
    assert_eq!(write(&runtime::eval_source("(dsl-o 1)").unwrap()), "2");
}

#[test]
fn compile_primitive_yields_a_code_value() {
    runtime::init();
    let text = write(&runtime::eval_source("(compile '(+ dsl-z 1))").unwrap());
    assert!(text.contains("(global inc)"), "{}", text);
    let text = write(&runtime::eval_source("(compile '(+ 1 2))").unwrap());
    assert!(text.contains("(global +)"), "{}", text);
}

#[test]
fn jump_displacements_follow_the_encoding() {
    // (if p c a): JUMP-FALSE displacement lands on the antecedent,
    // stored as target - location + 1. In a non-tail position the
    // consequent also jumps over the antecedent.
    let text = decompile("(inc (if true 1 2))");
    assert!(text.contains("(jumpfalse"), "{}", text);
    assert!(text.contains("(jump "), "{}", text);
    runtime::init();
    assert_eq!(
        write(&runtime::eval_source("(if (= 1 2) 'yes 'no)").unwrap()),
        "no"
    );
}

#[test]
fn compile_file_emits_reloadable_text() {
    runtime::init();
    let dir = std::env::temp_dir();
    let path = dir.join("quill_dsl_test.ql");
    std::fs::write(&path, "(var dsl-file-x 20)\n(+ dsl-file-x 22)\n").unwrap();
    let text = runtime::compile_file(&path.to_string_lossy()).unwrap();
    assert!(text.contains("(code"), "{}", text);
    let value = runtime::eval_source(&text).unwrap();
    assert_eq!(write(&value), "42");
    let _ = std::fs::remove_file(&path);
}
