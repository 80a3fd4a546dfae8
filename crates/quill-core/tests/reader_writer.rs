use quill_core::reader::{read, read_all, KeyPolicy};
use quill_core::runtime;
use quill_core::value::Value;
use quill_core::writer::{pretty, write, write_json};

fn roundtrip(src: &str) {
    let value = read(src, KeyPolicy::Any).expect(src);
    let text = write(&value);
    let again = read(&text, KeyPolicy::Any).expect(&text);
    assert!(value.equal(&again), "{} -> {} -> {}", src, text, write(&again));
}

#[test]
fn write_then_read_is_identity() {
    for src in [
        "null",
        "true",
        "42",
        "-2.5",
        "#\\a",
        "#\\newline",
        "#\\x00E9",
        "\"a\\nb\\\"c\\\\d\"",
        "foo",
        "foo:",
        "<point>",
        "(1 2 3)",
        "[1 [2] {a: 3}]",
        "{name: \"quill\" tags: (a b)}",
        "'(quoted list)",
        "`(a ~b ~@c)",
        "()",
    ] {
        roundtrip(src);
    }
}

#[test]
fn eval_of_rewritten_source_matches() {
    runtime::init();
    for src in ["(+ 1 2)", "(if true 'yes 'no)", "(car '(9 8))"] {
        let direct = runtime::eval_source(src).unwrap();
        let expr = read(src, KeyPolicy::Any).unwrap();
        let rewritten = write(&expr);
        let again = runtime::eval_source(&rewritten).unwrap();
        assert!(direct.equal(&again), "{} vs {}", src, rewritten);
    }
}

#[test]
fn read_all_reads_every_form() {
    let forms = read_all("1 2 ; comment\n3", KeyPolicy::Any).unwrap();
    assert_eq!(forms.len(), 3);
    assert_eq!(write(&forms[2]), "3");
}

#[test]
fn shebang_is_a_comment() {
    let forms = read_all("#!/usr/bin/env quill\n(+ 1 2)", KeyPolicy::Any).unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(write(&forms[0]), "(+ 1 2)");
}

#[test]
fn end_of_input_reads_as_null() {
    assert_eq!(read("", KeyPolicy::Any).unwrap(), Value::Null);
    assert_eq!(read("   ; just a comment", KeyPolicy::Any).unwrap(), Value::Null);
}

#[test]
fn struct_colon_between_key_and_value_is_skipped() {
    let v = read("{a: : 1}", KeyPolicy::Any).unwrap();
    assert_eq!(write(&v), "{a: 1}");
}

#[test]
fn number_like_keyword_is_an_error() {
    assert!(read("42:", KeyPolicy::Any).is_err());
}

#[test]
fn instance_reader_macro() {
    let v = read("#<point> {x: 1}", KeyPolicy::Any).unwrap();
    assert_eq!(write(&v), "#<point>{x: 1}");
    // Instances of primitive types are the value itself.
    let v = read("#<number> 5", KeyPolicy::Any).unwrap();
    assert_eq!(write(&v), "5");
    assert!(read("#<point", KeyPolicy::Any).is_err());
}

#[test]
fn pretty_mode_indents_by_four() {
    let v = read("(a (b c))", KeyPolicy::Any).unwrap();
    let text = pretty(&v);
    assert!(text.contains("\n    a"));
    assert!(text.contains("\n        b"));
    assert!(text.ends_with(")\n"));
}

#[test]
fn quote_sugar_prints_in_both_modes() {
    let v = read("'x", KeyPolicy::Any).unwrap();
    assert_eq!(write(&v), "'x");
    assert!(pretty(&v).starts_with("'x"));
    // Only the exact two-element form is sugared.
    let v = read("(quote x y)", KeyPolicy::Any).unwrap();
    assert_eq!(write(&v), "(quote x y)");
}

#[test]
fn json_mode_maps_the_data_subset() {
    let v = read("{list: (1 2) flag: true name: \"q\"}", KeyPolicy::Any).unwrap();
    let text = write_json(&v, false).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["list"], serde_json::json!([1.0, 2.0]));
    assert_eq!(parsed["flag"], serde_json::json!(true));
    assert_eq!(parsed["name"], serde_json::json!("q"));
}

#[test]
fn json_mode_rejects_functions_and_types() {
    runtime::init();
    let f = runtime::eval_source("(func (x) x)").unwrap();
    assert!(write_json(&f, false).is_err());
    let t = read("<point>", KeyPolicy::Any).unwrap();
    assert!(write_json(&t, false).is_err());
}

#[test]
fn display_mode_shows_raw_text() {
    runtime::init();
    let v = runtime::eval_source("\"a b\"").unwrap();
    assert_eq!(quill_core::writer::to_display_string(&v), "a b");
    assert_eq!(write(&v), "\"a b\"");
}
