//! Rendering values to text. `write` is the readable single-line form,
//! `pretty` adds newlines with four-space nesting, and the JSON mode maps the
//! data subset of the language onto a serde_json tree.

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::error::QuillError;
use crate::list::List;
use crate::symbols::{sym_name, unkeyworded_text};
use crate::value::{Function, Value};

const INDENT_SIZE: &str = "    ";

/// Readable, single-line rendition.
pub fn write(value: &Value) -> String {
    write_data(value, "", "")
}

/// Readable, indented rendition.
pub fn pretty(value: &Value) -> String {
    format!("{}\n", write_data(value, "", INDENT_SIZE))
}

/// Each element of a list of top-level forms on its own line.
pub fn write_all(values: &[Value]) -> String {
    let mut buf = String::new();
    for value in values {
        buf.push_str(&write(value));
        buf.push('\n');
    }
    buf
}

/// The indented form of `write_all`.
pub fn pretty_all(values: &[Value]) -> String {
    let mut buf = String::new();
    for value in values {
        buf.push_str(&pretty(value));
    }
    buf
}

/// The display form: strings and characters render as their raw text.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(true) => "true".to_string(),
        Value::Boolean(false) => "false".to_string(),
        Value::Character(c) => c.to_string(),
        Value::Number(f) => format_number(*f),
        Value::String(text) => text.to_string(),
        Value::Symbol(sym) | Value::Keyword(sym) | Value::Type(sym) => sym_name(*sym).to_string(),
        Value::List(lst) => write_list_display(lst),
        Value::Vector(els) => {
            let parts: Vec<String> = els.iter().map(to_display_string).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Struct(bindings) => {
            let parts: Vec<String> = bindings
                .iter()
                .map(|(k, v)| format!("{} {}", k.text, to_display_string(v)))
                .collect();
            format!("{{{}}}", parts.join(" "))
        }
        Value::Function(fun) => function_to_string(fun),
        Value::Code(code) => code.decompile(true),
        Value::Error(err) => format!("#<error>{}", write(&err.data)),
        Value::Instance(inst) => {
            format!("#{}{}", sym_name(inst.tag), write(&inst.value))
        }
    }
}

pub fn function_to_string(fun: &Function) -> String {
    match fun {
        Function::Primitive(prim) => format!("#[function {}]", prim.name),
        Function::Closure(cl) => {
            if cl.code.name.is_empty() {
                "#[function]".to_string()
            } else {
                format!("#[function {}]", cl.code.name)
            }
        }
        Function::Continuation(_) => "#[continuation]".to_string(),
        Function::Apply => "#[function apply]".to_string(),
        Function::CallCc => "#[function callcc]".to_string(),
        Function::Spawn => "#[function spawn]".to_string(),
    }
}

/// The declared signature of any function value.
pub fn function_signature(fun: &Function) -> String {
    match fun {
        Function::Primitive(prim) => prim.signature.clone(),
        Function::Closure(cl) => cl.code.signature(),
        Function::Continuation(_) => "(<function>) <any>".to_string(),
        Function::Apply => "(<any>*) <list>".to_string(),
        Function::CallCc => "(<function>) <any>".to_string(),
        Function::Spawn => "(<function> <any>*) <null>".to_string(),
    }
}

fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.0}", f)
    } else {
        format!("{}", f)
    }
}

fn quote_sugar(lst: &List) -> Option<(&'static str, Value)> {
    if lst.len() != 2 {
        return None;
    }
    let head = lst.car();
    let Value::Symbol(sym) = head else {
        return None;
    };
    let sugar = match sym_name(sym).as_ref() {
        "quote" => "'",
        "quasiquote" => "`",
        "unquote" => "~",
        "unquote-splicing" => "~@",
        _ => return None,
    };
    Some((sugar, lst.cadr()))
}

fn write_list_display(lst: &List) -> String {
    if let Some((sugar, operand)) = quote_sugar(lst) {
        return format!("{}{}", sugar, to_display_string(&operand));
    }
    let parts: Vec<String> = lst.iter().map(to_display_string).collect();
    format!("({})", parts.join(" "))
}

fn write_data(value: &Value, indent: &str, indent_size: &str) -> String {
    match value {
        Value::Null | Value::Boolean(_) | Value::Number(_) => to_display_string(value),
        Value::Symbol(_) | Value::Keyword(_) | Value::Type(_) => to_display_string(value),
        Value::String(text) => encode_string(text),
        Value::Character(c) => write_character(*c),
        Value::List(lst) => write_list(lst, indent, indent_size),
        Value::Vector(_) => write_vector(value, indent, indent_size),
        Value::Struct(_) => write_struct(value, indent, indent_size),
        other => to_display_string(other),
    }
}

fn write_character(c: char) -> String {
    match c {
        '\0' => "#\\null".to_string(),
        '\u{7}' => "#\\alarm".to_string(),
        '\u{8}' => "#\\backspace".to_string(),
        '\t' => "#\\tab".to_string(),
        '\n' => "#\\newline".to_string(),
        '\r' => "#\\return".to_string(),
        '\u{1b}' => "#\\escape".to_string(),
        ' ' => "#\\space".to_string(),
        '\u{7f}' => "#\\delete".to_string(),
        c if c > ' ' && c < '\u{7f}' => format!("#\\{}", c),
        c => format!("#\\x{:04X}", c as u32),
    }
}

fn write_list(lst: &List, indent: &str, indent_size: &str) -> String {
    if lst.is_empty() {
        return "()".to_string();
    }
    if let Some((sugar, operand)) = quote_sugar(lst) {
        return format!("{}{}", sugar, write_data(&operand, indent, indent_size));
    }
    let mut buf = String::from("(");
    let (next_indent, delim) = if indent_size.is_empty() {
        (String::new(), " ".to_string())
    } else {
        let next = format!("{}{}", indent, indent_size);
        let delim = format!("\n{}", next);
        buf.push_str(&delim);
        (next, delim)
    };
    let mut first = true;
    for item in lst.iter() {
        if !first {
            buf.push_str(&delim);
        }
        first = false;
        buf.push_str(&write_data(item, &next_indent, indent_size));
    }
    if !indent_size.is_empty() {
        buf.push('\n');
        buf.push_str(indent);
    }
    buf.push(')');
    buf
}

fn write_vector(value: &Value, indent: &str, indent_size: &str) -> String {
    let Value::Vector(els) = value else {
        unreachable!()
    };
    let mut buf = String::from("[");
    if !els.is_empty() {
        let (next_indent, delim) = if indent_size.is_empty() {
            (String::new(), " ".to_string())
        } else {
            let next = format!("{}{}", indent, indent_size);
            let delim = format!("\n{}", next);
            buf.push_str(&delim);
            (next, delim)
        };
        let mut first = true;
        for item in els.iter() {
            if !first {
                buf.push_str(&delim);
            }
            first = false;
            buf.push_str(&write_data(item, &next_indent, indent_size));
        }
        if !indent_size.is_empty() {
            buf.push('\n');
            buf.push_str(indent);
        }
    }
    buf.push(']');
    buf
}

fn write_struct(value: &Value, indent: &str, indent_size: &str) -> String {
    let Value::Struct(bindings) = value else {
        unreachable!()
    };
    let mut buf = String::from("{");
    if !bindings.is_empty() {
        let (next_indent, delim) = if indent_size.is_empty() {
            (String::new(), " ".to_string())
        } else {
            let next = format!("{}{}", indent, indent_size);
            let delim = format!("\n{}", next);
            buf.push_str(&delim);
            (next, delim)
        };
        let mut first = true;
        for (k, v) in bindings.iter() {
            if !first {
                buf.push_str(&delim);
            }
            first = false;
            buf.push_str(&write_data(&k.to_value(), &next_indent, indent_size));
            buf.push(' ');
            buf.push_str(&write_data(v, &next_indent, indent_size));
        }
        if !indent_size.is_empty() {
            buf.push('\n');
            buf.push_str(indent);
        }
    }
    buf.push('}');
    buf
}

/// The encoded (readable) form of a string, the inverse of the reader's
/// escape handling.
pub fn encode_string(text: &str) -> String {
    let mut buf = String::with_capacity(text.len() + 2);
    buf.push('"');
    for c in text.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\t' => buf.push_str("\\t"),
            '\u{c}' => buf.push_str("\\f"),
            '\u{8}' => buf.push_str("\\b"),
            '\r' => buf.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                buf.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
    buf
}

/// Render a value as JSON. Lists become arrays, keywords become strings, and
/// the variants with no JSON meaning are argument-errors.
pub fn write_json(value: &Value, pretty: bool) -> Result<String, QuillError> {
    let tree = json_value(value)?;
    let rendered = if pretty {
        serde_json::to_string_pretty(&tree)
    } else {
        serde_json::to_string(&tree)
    };
    rendered.map_err(|e| QuillError::argument(format!("cannot encode JSON: {}", e)))
}

fn json_value(value: &Value) -> Result<JsonValue, QuillError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
        Value::Number(f) => JsonNumber::from_f64(*f).map(JsonValue::Number).ok_or_else(|| {
            QuillError::argument(format!(
                "Data cannot be described in JSON: {}",
                write(value)
            ))
        }),
        Value::Character(c) => Ok(JsonValue::String(c.to_string())),
        Value::String(text) => Ok(JsonValue::String(text.to_string())),
        Value::Symbol(sym) => Ok(JsonValue::String(sym_name(*sym).to_string())),
        Value::Keyword(sym) => Ok(JsonValue::String(unkeyworded_text(*sym))),
        Value::List(lst) => {
            let mut items = Vec::with_capacity(lst.len());
            for item in lst.iter() {
                items.push(json_value(item)?);
            }
            Ok(JsonValue::Array(items))
        }
        Value::Vector(els) => {
            let mut items = Vec::with_capacity(els.len());
            for item in els.iter() {
                items.push(json_value(item)?);
            }
            Ok(JsonValue::Array(items))
        }
        Value::Struct(bindings) => {
            let mut map = JsonMap::new();
            for (k, v) in bindings.iter() {
                let key = match k.kind {
                    crate::value::StructKeyKind::Keyword => {
                        crate::symbols::keyword_name_text(&k.text).to_string()
                    }
                    _ => k.text.to_string(),
                };
                map.insert(key, json_value(v)?);
            }
            Ok(JsonValue::Object(map))
        }
        other => Err(QuillError::argument(format!(
            "Data cannot be described in JSON: {}",
            write(other)
        ))),
    }
}
