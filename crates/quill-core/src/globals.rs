//! Process-wide mutable state shared by every task: global bindings, the
//! macro table, and the constants pool. The constants pool is append-only;
//! a reverse map deduplicates the hashable subset of values (composite
//! values may be stored more than once, which costs space, not correctness).

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::error::{QuillError, WARN_TAG};
use crate::symbols::{intern, Sym};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct MacroRecord {
    pub name: Sym,
    pub expander: Value,
}

static GLOBALS: Lazy<RwLock<HashMap<Sym, Value>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static MACROS: Lazy<RwLock<HashMap<Sym, MacroRecord>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static CONSTANTS: Lazy<RwLock<ConstantPool>> = Lazy::new(|| {
    RwLock::new(ConstantPool {
        values: Vec::with_capacity(1000),
        index: HashMap::new(),
    })
});

/// Return the global value for the symbol, or none if undefined.
pub fn get_global(sym: Sym) -> Option<Value> {
    GLOBALS.read().unwrap().get(&sym).cloned()
}

pub fn is_defined(sym: Sym) -> bool {
    GLOBALS.read().unwrap().contains_key(&sym)
}

/// Bind the value to the symbol; a macro of the same name is dropped.
pub fn def_global(sym: Sym, value: Value) {
    GLOBALS.write().unwrap().insert(sym, value);
    MACROS.write().unwrap().remove(&sym);
}

pub fn undef_global(sym: Sym) {
    GLOBALS.write().unwrap().remove(&sym);
}

pub fn define_global(name: &str, value: Value) {
    def_global(intern(name), value);
}

/// All symbols that currently have a global binding.
pub fn globals() -> Vec<Sym> {
    GLOBALS.read().unwrap().keys().copied().collect()
}

pub fn get_macro(sym: Sym) -> Option<MacroRecord> {
    MACROS.read().unwrap().get(&sym).cloned()
}

pub fn def_macro(sym: Sym, expander: Value) {
    MACROS.write().unwrap().insert(
        sym,
        MacroRecord {
            name: sym,
            expander,
        },
    );
}

/// All symbols that currently name a macro.
pub fn macros() -> Vec<Sym> {
    MACROS.read().unwrap().keys().copied().collect()
}

pub fn warn_if_redefining(name: &str) {
    if is_defined(intern(name)) {
        eprintln!("{} redefining {} with a primitive", WARN_TAG, name);
    }
}

struct ConstantPool {
    values: Vec<Value>,
    index: HashMap<ConstKey, usize>,
}

/// Hashable identity for the values the reverse map can deduplicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ConstKey {
    Null,
    Boolean(bool),
    Number(u64),
    Character(char),
    String(std::sync::Arc<str>),
    Symbol(Sym),
    Keyword(Sym),
    Type(Sym),
}

fn const_key(value: &Value) -> Option<ConstKey> {
    match value {
        Value::Null => Some(ConstKey::Null),
        Value::Boolean(b) => Some(ConstKey::Boolean(*b)),
        Value::Number(f) => Some(ConstKey::Number(f.to_bits())),
        Value::Character(c) => Some(ConstKey::Character(*c)),
        Value::String(s) => Some(ConstKey::String(s.clone())),
        Value::Symbol(sym) => Some(ConstKey::Symbol(*sym)),
        Value::Keyword(sym) => Some(ConstKey::Keyword(*sym)),
        Value::Type(sym) => Some(ConstKey::Type(*sym)),
        _ => None,
    }
}

/// Intern a value into the constants pool and return its index.
pub fn put_constant(value: &Value) -> usize {
    let key = const_key(value);
    let mut pool = CONSTANTS.write().unwrap();
    if let Some(key) = &key {
        if let Some(idx) = pool.index.get(key) {
            return *idx;
        }
    }
    let idx = pool.values.len();
    pool.values.push(value.clone());
    if let Some(key) = key {
        pool.index.insert(key, idx);
    }
    idx
}

pub fn constant(idx: usize) -> Result<Value, QuillError> {
    CONSTANTS
        .read()
        .unwrap()
        .values
        .get(idx)
        .cloned()
        .ok_or_else(|| QuillError::message(format!("invalid constant index: {}", idx)))
}

/// The symbol stored at a constant index; the compiler only emits symbol
/// operands for the global-addressing opcodes.
pub fn constant_sym(idx: usize) -> Result<Sym, QuillError> {
    match constant(idx)? {
        Value::Symbol(sym) => Ok(sym),
        other => Err(QuillError::message(format!(
            "constant {} is not a symbol: {}",
            idx,
            crate::writer::write(&other)
        ))),
    }
}
