//! The quill object model: a tagged union over the language's value variants.
//! Everything the reader, expander, compiler, and VM exchange is a `Value`.

use std::fmt;
use std::sync::Arc;

use im::{HashMap as StructBindings, Vector as VectorElements};

use crate::error::QuillError;
use crate::list::List;
use crate::symbols::{self, intern, Sym, SymKind};
use crate::vm::code::Code;
use crate::vm::exec::Frame;

/// Numeric equality tolerance.
pub const EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    Character(char),
    String(Arc<str>),
    Symbol(Sym),
    Keyword(Sym),
    Type(Sym),
    List(List),
    Vector(VectorElements<Value>),
    Struct(StructBindings<StructKey, Value>),
    Function(Function),
    Code(Arc<Code>),
    Error(Arc<ErrorValue>),
    Instance(Arc<InstanceValue>),
}

/// A function value is one of six capabilities.
#[derive(Clone, Debug)]
pub enum Function {
    Closure(Arc<Closure>),
    Primitive(Arc<Primitive>),
    Continuation(Arc<Continuation>),
    Apply,
    CallCc,
    Spawn,
}

#[derive(Debug)]
pub struct Closure {
    pub code: Arc<Code>,
    pub frame: Arc<Frame>,
}

#[derive(Debug)]
pub struct Continuation {
    /// Code whose ops to resume; a continuation captured at the root of the
    /// program has nothing to resume and yields its argument when invoked.
    pub code: Option<Arc<Code>>,
    pub pc: usize,
    pub stack: Vec<Value>,
    pub frame: Option<Arc<Frame>>,
}

pub type PrimitiveImpl = fn(&[Value]) -> Result<Value, QuillError>;

/// A host function callable from the VM, with its declared signature.
#[derive(Debug)]
pub struct Primitive {
    pub name: String,
    pub fun: PrimitiveImpl,
    pub signature: String,
    /// Count of required arguments (total declared args minus defaults).
    pub argc: usize,
    pub result: Sym,
    pub args: Vec<Sym>,
    pub rest: Option<Sym>,
    pub defaults: Option<Vec<Value>>,
    pub keys: Option<Vec<Sym>>,
}

#[derive(Debug)]
pub struct ErrorValue {
    /// Usually a vector of a keyword tag followed by message data.
    pub data: Value,
    pub context: Option<String>,
}

#[derive(Debug)]
pub struct InstanceValue {
    pub tag: Sym,
    pub value: Value,
}

/// Struct keys combine the key text with the key's kind so that the original
/// value can be recovered when enumerating keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructKey {
    pub text: Arc<str>,
    pub kind: StructKeyKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructKeyKind {
    String,
    Symbol,
    Keyword,
    Type,
}

impl StructKey {
    pub fn from_value(value: &Value) -> Option<StructKey> {
        let (text, kind) = match value {
            Value::String(text) => (text.clone(), StructKeyKind::String),
            Value::Symbol(sym) => (symbols::sym_name(*sym), StructKeyKind::Symbol),
            Value::Keyword(sym) => (symbols::sym_name(*sym), StructKeyKind::Keyword),
            Value::Type(sym) => (symbols::sym_name(*sym), StructKeyKind::Type),
            _ => return None,
        };
        Some(StructKey { text, kind })
    }

    pub fn to_value(&self) -> Value {
        match self.kind {
            StructKeyKind::String => Value::String(self.text.clone()),
            StructKeyKind::Symbol => Value::Symbol(intern(&self.text)),
            StructKeyKind::Keyword => Value::Keyword(intern(&self.text)),
            StructKeyKind::Type => Value::Type(intern(&self.text)),
        }
    }
}

pub fn is_valid_struct_key(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Symbol(_) | Value::Keyword(_) | Value::Type(_)
    )
}

/// Well-known type names.
pub mod types {
    use crate::symbols::{intern, Sym};

    pub fn null() -> Sym {
        intern("<null>")
    }
    pub fn boolean() -> Sym {
        intern("<boolean>")
    }
    pub fn character() -> Sym {
        intern("<character>")
    }
    pub fn number() -> Sym {
        intern("<number>")
    }
    pub fn string() -> Sym {
        intern("<string>")
    }
    pub fn symbol() -> Sym {
        intern("<symbol>")
    }
    pub fn keyword() -> Sym {
        intern("<keyword>")
    }
    pub fn type_() -> Sym {
        intern("<type>")
    }
    pub fn list() -> Sym {
        intern("<list>")
    }
    pub fn vector() -> Sym {
        intern("<vector>")
    }
    pub fn struct_() -> Sym {
        intern("<struct>")
    }
    pub fn function() -> Sym {
        intern("<function>")
    }
    pub fn code() -> Sym {
        intern("<code>")
    }
    pub fn error() -> Sym {
        intern("<error>")
    }
    pub fn any() -> Sym {
        intern("<any>")
    }
}

pub fn is_primitive_type(tag: Sym) -> bool {
    tag == types::null()
        || tag == types::boolean()
        || tag == types::character()
        || tag == types::number()
        || tag == types::string()
        || tag == types::list()
        || tag == types::vector()
        || tag == types::struct_()
        || tag == types::symbol()
        || tag == types::keyword()
        || tag == types::type_()
        || tag == types::function()
}

/// Create an instance of the named type. Instances of the built-in types are
/// the value itself.
pub fn instance(tag: &Value, value: Value) -> Result<Value, QuillError> {
    let Value::Type(tag) = tag else {
        return Err(QuillError::argument(format!(
            "<type> expected, got {}",
            crate::writer::write(tag)
        )));
    };
    if is_primitive_type(*tag) {
        return Ok(value);
    }
    Ok(Value::Instance(Arc::new(InstanceValue { tag: *tag, value })))
}

impl Value {
    pub fn number(f: f64) -> Value {
        Value::Number(f)
    }

    pub fn int(n: i64) -> Value {
        Value::Number(n as f64)
    }

    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(intern(name))
    }

    pub fn keyword(name: &str) -> Value {
        Value::Keyword(intern(name))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Only `false` itself is false; everything else (including null) is true.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Boolean(false))
    }

    pub fn type_sym(&self) -> Sym {
        match self {
            Value::Null => types::null(),
            Value::Boolean(_) => types::boolean(),
            Value::Number(_) => types::number(),
            Value::Character(_) => types::character(),
            Value::String(_) => types::string(),
            Value::Symbol(_) => types::symbol(),
            Value::Keyword(_) => types::keyword(),
            Value::Type(_) => types::type_(),
            Value::List(_) => types::list(),
            Value::Vector(_) => types::vector(),
            Value::Struct(_) => types::struct_(),
            Value::Function(_) => types::function(),
            Value::Code(_) => types::code(),
            Value::Error(_) => types::error(),
            Value::Instance(inst) => inst.tag,
        }
    }

    pub fn type_name(&self) -> Arc<str> {
        symbols::sym_name(self.type_sym())
    }

    /// Unwrap a typed instance once; any other value is itself.
    pub fn self_value(&self) -> &Value {
        match self {
            Value::Instance(inst) => &inst.value,
            other => other,
        }
    }

    pub fn as_number(&self) -> Result<f64, QuillError> {
        match self {
            Value::Number(f) => Ok(*f),
            other => Err(QuillError::argument(format!(
                "Expected a <number>, got a {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_int(&self) -> Result<i64, QuillError> {
        Ok(self.as_number()? as i64)
    }

    pub fn as_string(&self) -> Result<Arc<str>, QuillError> {
        match self {
            Value::String(text) => Ok(text.clone()),
            other => Err(QuillError::argument(format!(
                "Expected a <string>, got a {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_list(&self) -> Result<&List, QuillError> {
        match self {
            Value::List(lst) => Ok(lst),
            other => Err(QuillError::argument(format!(
                "Expected a <list>, got a {}",
                other.type_name()
            ))),
        }
    }

    pub fn is_whole(&self) -> bool {
        matches!(self, Value::Number(f) if f.trunc() == *f)
    }

    /// Structural equality with numeric epsilon; instances unwrap once.
    pub fn equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => number_equal(*a, *b),
            (Value::Character(a), Value::Character(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.equal(b),
            (Value::Vector(a), Value::Vector(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equal(y))
            }
            (Value::Struct(a), Value::Struct(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.equal(w)))
            }
            (Value::Instance(a), _) => a.value.equal(other.self_value()),
            (_, Value::Instance(b)) => self.self_value().equal(&b.value),
            _ => false,
        }
    }

    /// Identity: interned names by handle, shared aggregates by allocation.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Character(a), Value::Character(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::String(a), Value::String(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => a.same_cells(b),
            (Value::Vector(a), Value::Vector(b)) => a.ptr_eq(b),
            (Value::Struct(a), Value::Struct(b)) => a.ptr_eq(b),
            (Value::Code(a), Value::Code(b)) => Arc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => match (a, b) {
                (Function::Closure(x), Function::Closure(y)) => Arc::ptr_eq(x, y),
                (Function::Primitive(x), Function::Primitive(y)) => Arc::ptr_eq(x, y),
                (Function::Continuation(x), Function::Continuation(y)) => Arc::ptr_eq(x, y),
                (Function::Apply, Function::Apply) => true,
                (Function::CallCc, Function::CallCc) => true,
                (Function::Spawn, Function::Spawn) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.equal(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::writer::to_display_string(self))
    }
}

pub fn number_equal(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() < EPSILON
}

/// Build a struct from alternating key/value arguments; a struct argument
/// copies its bindings in.
pub fn struct_from_values(fieldvals: &[Value]) -> Result<Value, QuillError> {
    let mut bindings = StructBindings::new();
    let mut i = 0;
    while i < fieldvals.len() {
        let field = fieldvals[i].self_value().clone();
        i += 1;
        match &field {
            Value::Struct(other) => {
                for (k, v) in other.iter() {
                    bindings.insert(k.clone(), v.clone());
                }
            }
            key if is_valid_struct_key(key) => {
                if i == fieldvals.len() {
                    return Err(QuillError::argument(format!(
                        "Mismatched keyword/value in arglist: {}",
                        crate::writer::write(key)
                    )));
                }
                let sk = StructKey::from_value(key).expect("validated struct key");
                bindings.insert(sk, fieldvals[i].clone());
                i += 1;
            }
            other => {
                return Err(QuillError::argument(format!(
                    "Bad struct key: {}",
                    crate::writer::write(other)
                )));
            }
        }
    }
    Ok(Value::Struct(bindings))
}

/// Struct field lookup, used by the VM when a keyword is called as a
/// function. Missing keys are null.
pub fn struct_get(value: &Value, key: &Value) -> Result<Value, QuillError> {
    let target = value.self_value();
    let Value::Struct(bindings) = target else {
        return Err(QuillError::argument(format!(
            "get expected a <struct> argument, got a {}",
            value.type_name()
        )));
    };
    match StructKey::from_value(key) {
        Some(sk) => Ok(bindings.get(&sk).cloned().unwrap_or(Value::Null)),
        None => Ok(Value::Null),
    }
}

pub fn struct_keys(value: &Value) -> Result<List, QuillError> {
    match value.self_value() {
        Value::Struct(bindings) => Ok(List::from_vec(
            bindings.keys().map(|k| k.to_value()).collect(),
        )),
        other => Err(QuillError::argument(format!(
            "keys expected a <struct>, got a {}",
            other.type_name()
        ))),
    }
}

pub fn struct_values(value: &Value) -> Result<List, QuillError> {
    match value.self_value() {
        Value::Struct(bindings) => Ok(List::from_vec(bindings.values().cloned().collect())),
        other => Err(QuillError::argument(format!(
            "values expected a <struct>, got a {}",
            other.type_name()
        ))),
    }
}

pub fn string_characters(text: &str) -> Vec<Value> {
    text.chars().map(Value::Character).collect()
}

/// Convert to a list where a conversion exists.
pub fn to_list(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::List(_) => Ok(value.clone()),
        Value::Vector(els) => Ok(Value::List(List::from_vec(els.iter().cloned().collect()))),
        Value::Struct(bindings) => {
            let pairs: Vec<Value> = bindings
                .iter()
                .map(|(k, v)| Value::List(List::from_values(&[k.to_value(), v.clone()])))
                .collect();
            Ok(Value::List(List::from_vec(pairs)))
        }
        Value::String(text) => Ok(Value::List(List::from_vec(string_characters(text)))),
        other => Err(QuillError::argument(format!(
            "to-list cannot accept {}",
            other.type_name()
        ))),
    }
}

pub fn to_vector(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Vector(_) => Ok(value.clone()),
        Value::List(lst) => Ok(Value::Vector(lst.iter().cloned().collect())),
        Value::Struct(bindings) => {
            let pairs: VectorElements<Value> = bindings
                .iter()
                .map(|(k, v)| {
                    Value::Vector(VectorElements::from(vec![k.to_value(), v.clone()]))
                })
                .collect();
            Ok(Value::Vector(pairs))
        }
        Value::String(text) => Ok(Value::Vector(string_characters(text).into())),
        other => Err(QuillError::argument(format!(
            "to-vector expected <vector>, <list>, <struct>, or <string>, got a {}",
            other.type_name()
        ))),
    }
}

/// Convert a list or vector of bindings, or alternating keys and values, to a
/// struct.
pub fn to_struct(value: &Value) -> Result<Value, QuillError> {
    let target = value.self_value();
    match target {
        Value::Struct(_) => Ok(target.clone()),
        Value::List(lst) => struct_from_bindings(&lst.to_vec()),
        Value::Vector(els) => struct_from_bindings(&els.iter().cloned().collect::<Vec<_>>()),
        other => Err(QuillError::argument(format!(
            "to-struct cannot accept argument of type {}",
            other.type_name()
        ))),
    }
}

fn struct_from_bindings(items: &[Value]) -> Result<Value, QuillError> {
    let mut bindings = StructBindings::new();
    let mut i = 0;
    while i < items.len() {
        let item = &items[i];
        i += 1;
        match item {
            Value::List(pair) if pair.len() == 2 && is_valid_struct_key(&pair.car()) => {
                let sk = StructKey::from_value(&pair.car()).expect("validated struct key");
                bindings.insert(sk, pair.cadr());
            }
            Value::Vector(pair) if pair.len() == 2 => {
                let key = pair.get(0).cloned().unwrap_or(Value::Null);
                if !is_valid_struct_key(&key) {
                    return Err(QuillError::argument(format!(
                        "Bad struct key: {}",
                        crate::writer::write(&key)
                    )));
                }
                let sk = StructKey::from_value(&key).expect("validated struct key");
                bindings.insert(sk, pair.get(1).cloned().unwrap_or(Value::Null));
            }
            key if is_valid_struct_key(key) => {
                if i == items.len() {
                    return Err(QuillError::argument(format!(
                        "Mismatched keyword/value in list: {}",
                        crate::writer::write(key)
                    )));
                }
                let sk = StructKey::from_value(key).expect("validated struct key");
                bindings.insert(sk, items[i].clone());
                i += 1;
            }
            other => {
                return Err(QuillError::argument(format!(
                    "Bad struct binding: {}",
                    crate::writer::write(other)
                )));
            }
        }
    }
    Ok(Value::Struct(bindings))
}

pub fn to_string_value(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Null | Value::String(_) => Ok(value.clone()),
        Value::Character(c) => Ok(Value::string(c.to_string())),
        Value::Symbol(sym) | Value::Keyword(sym) | Value::Type(sym) => {
            Ok(Value::String(symbols::sym_name(*sym)))
        }
        Value::Number(_) | Value::Boolean(_) => {
            Ok(Value::string(crate::writer::to_display_string(value)))
        }
        Value::Vector(els) => {
            let mut text = String::new();
            for el in els.iter() {
                match el {
                    Value::Character(c) => text.push(*c),
                    other => {
                        return Err(QuillError::argument(format!(
                            "to-string: vector element is not a <character>: {}",
                            crate::writer::write(other)
                        )));
                    }
                }
            }
            Ok(Value::string(text))
        }
        Value::List(lst) => {
            let mut text = String::new();
            for el in lst.iter() {
                match el {
                    Value::Character(c) => text.push(*c),
                    other => {
                        return Err(QuillError::argument(format!(
                            "to-string: list element is not a <character>: {}",
                            crate::writer::write(other)
                        )));
                    }
                }
            }
            Ok(Value::string(text))
        }
        other => Err(QuillError::argument(format!(
            "to-string: cannot convert argument to <string>: {}",
            crate::writer::write(other)
        ))),
    }
}

pub fn to_character(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Character(_) => Ok(value.clone()),
        Value::String(text) => {
            let mut chars = text.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                return Ok(Value::Character(c));
            }
            Err(QuillError::argument(format!(
                "Cannot convert to <character>: {}",
                crate::writer::write(value)
            )))
        }
        Value::Number(f) => match char::from_u32(*f as u32) {
            Some(c) => Ok(Value::Character(c)),
            None => Err(QuillError::argument(format!(
                "Cannot convert to <character>: {}",
                crate::writer::write(value)
            ))),
        },
        other => Err(QuillError::argument(format!(
            "Cannot convert to <character>: {}",
            crate::writer::write(other)
        ))),
    }
}

pub fn to_number(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::Character(c) => Ok(Value::number(*c as u32 as f64)),
        Value::Boolean(b) => Ok(Value::number(if *b { 1.0 } else { 0.0 })),
        Value::String(text) => match text.parse::<f64>() {
            Ok(f) => Ok(Value::number(f)),
            Err(_) => Err(QuillError::argument(format!(
                "cannot convert to a number: {}",
                crate::writer::write(value)
            ))),
        },
        other => Err(QuillError::argument(format!(
            "cannot convert to a number: {}",
            crate::writer::write(other)
        ))),
    }
}

/// Deep flatten of nested lists and vectors into a single list.
pub fn flatten(lst: &List) -> List {
    let mut out: Vec<Value> = Vec::new();
    fn walk(item: &Value, out: &mut Vec<Value>) {
        match item {
            Value::List(inner) => {
                for v in inner.iter() {
                    walk(v, out);
                }
            }
            Value::Vector(els) => {
                for v in els.iter() {
                    walk(v, out);
                }
            }
            other => out.push(other.clone()),
        }
    }
    for item in lst.iter() {
        walk(item, &mut out);
    }
    List::from_vec(out)
}

impl SymKind {
    pub fn value_of(self, sym: Sym) -> Value {
        match self {
            SymKind::Symbol => Value::Symbol(sym),
            SymKind::Keyword => Value::Keyword(sym),
            SymKind::Type => Value::Type(sym),
        }
    }
}

/// Intern a name and wrap it in the Value variant its shape dictates.
pub fn interned_value(name: &str) -> Value {
    let sym = intern(name);
    symbols::sym_kind(sym).value_of(sym)
}
