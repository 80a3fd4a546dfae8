//! Process-wide interning of symbols, keywords, and type names.
//!
//! The textual shape of a name decides its kind: a trailing `:` makes a
//! keyword, a `<name>` wrapper makes a type, anything else is a plain symbol.
//! Interning the same text twice yields the same `Sym`, so identity equality
//! on `Sym` is name equality.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::QuillError;
use crate::value::Value;

/// Handle to an interned name. Copyable; equality is interned identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymKind {
    Symbol,
    Keyword,
    Type,
}

struct SymbolTable {
    entries: Vec<(Arc<str>, SymKind)>,
    by_name: HashMap<Arc<str>, Sym>,
}

static SYMTAB: Lazy<RwLock<SymbolTable>> = Lazy::new(|| {
    RwLock::new(SymbolTable {
        entries: Vec::new(),
        by_name: HashMap::new(),
    })
});

pub fn is_valid_keyword_name(name: &str) -> bool {
    name.len() > 1 && name.ends_with(':')
}

pub fn is_valid_type_name(name: &str) -> bool {
    name.len() > 2 && name.starts_with('<') && name.ends_with('>')
}

fn kind_of_name(name: &str) -> SymKind {
    if is_valid_keyword_name(name) {
        SymKind::Keyword
    } else if is_valid_type_name(name) {
        SymKind::Type
    } else {
        SymKind::Symbol
    }
}

/// Intern `name` into the global symbol table.
pub fn intern(name: &str) -> Sym {
    assert!(!name.is_empty(), "cannot intern an empty name");
    {
        let table = SYMTAB.read().unwrap();
        if let Some(sym) = table.by_name.get(name) {
            return *sym;
        }
    }
    let mut table = SYMTAB.write().unwrap();
    if let Some(sym) = table.by_name.get(name) {
        return *sym;
    }
    let text: Arc<str> = Arc::from(name);
    let sym = Sym(table.entries.len() as u32);
    table.entries.push((text.clone(), kind_of_name(name)));
    table.by_name.insert(text, sym);
    sym
}

pub fn sym_name(sym: Sym) -> Arc<str> {
    SYMTAB.read().unwrap().entries[sym.0 as usize].0.clone()
}

pub fn sym_kind(sym: Sym) -> SymKind {
    SYMTAB.read().unwrap().entries[sym.0 as usize].1
}

/// Every name interned so far, in interning order.
pub fn symbols() -> Vec<Sym> {
    let table = SYMTAB.read().unwrap();
    (0..table.entries.len() as u32).map(Sym).collect()
}

pub fn type_name_text(name: &str) -> &str {
    &name[1..name.len() - 1]
}

pub fn keyword_name_text(name: &str) -> &str {
    &name[..name.len() - 1]
}

/// The keyword's name without its trailing colon; other interned names as-is.
pub fn unkeyworded_text(sym: Sym) -> String {
    let name = sym_name(sym);
    match sym_kind(sym) {
        SymKind::Keyword => keyword_name_text(&name).to_string(),
        _ => name.to_string(),
    }
}

/// Convert a symbol or keyword to the plain symbol of the same base name.
pub fn unkeyworded(value: &Value) -> Result<Sym, QuillError> {
    match value {
        Value::Symbol(sym) => Ok(*sym),
        Value::Keyword(sym) => {
            let name = sym_name(*sym);
            Ok(intern(keyword_name_text(&name)))
        }
        other => Err(QuillError::argument(format!(
            "Expected <keyword> or <symbol>, got {}",
            other.type_name()
        ))),
    }
}

pub fn to_symbol(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Symbol(_) => Ok(value.clone()),
        Value::Keyword(sym) => {
            let name = sym_name(*sym);
            Ok(Value::Symbol(intern(keyword_name_text(&name))))
        }
        Value::Type(sym) => {
            let name = sym_name(*sym);
            Ok(Value::Symbol(intern(type_name_text(&name))))
        }
        Value::String(text) if !text.is_empty() => Ok(Value::Symbol(intern(text))),
        other => Err(QuillError::argument(format!(
            "to-symbol expected a <keyword>, <type>, <symbol>, or <string>, got a {}",
            other.type_name()
        ))),
    }
}

pub fn to_keyword(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Keyword(_) => Ok(value.clone()),
        Value::Type(sym) => {
            let name = sym_name(*sym);
            Ok(Value::Keyword(intern(&format!(
                "{}:",
                type_name_text(&name)
            ))))
        }
        Value::Symbol(sym) => {
            let name = sym_name(*sym);
            Ok(Value::Keyword(intern(&format!("{}:", name))))
        }
        Value::String(text) if is_valid_keyword_name(text) => Ok(Value::Keyword(intern(text))),
        Value::String(text) if !text.is_empty() => {
            Ok(Value::Keyword(intern(&format!("{}:", text))))
        }
        other => Err(QuillError::argument(format!(
            "to-keyword expected a <keyword>, <type>, <symbol>, or <string>, got a {}",
            other.type_name()
        ))),
    }
}

/// `<name>` -> `name` as a symbol.
pub fn type_name(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Type(sym) => {
            let name = sym_name(*sym);
            Ok(Value::Symbol(intern(type_name_text(&name))))
        }
        other => Err(QuillError::argument(format!(
            "type-name expected a <type>, got a {}",
            other.type_name()
        ))),
    }
}

/// `name:` -> `name` as a symbol.
pub fn keyword_name(value: &Value) -> Result<Value, QuillError> {
    match value {
        Value::Keyword(_) => Ok(Value::Symbol(unkeyworded(value)?)),
        other => Err(QuillError::argument(format!(
            "keyword-name expected a <keyword>, got a {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_identity() {
        assert_eq!(intern("foo"), intern("foo"));
        assert_ne!(intern("foo"), intern("bar"));
        assert_eq!(sym_kind(intern("foo:")), SymKind::Keyword);
        assert_eq!(sym_kind(intern("<foo>")), SymKind::Type);
        assert_eq!(sym_kind(intern("foo")), SymKind::Symbol);
    }

    #[test]
    fn keyword_and_type_conversions() {
        let kw = to_keyword(&Value::Symbol(intern("x"))).unwrap();
        assert!(matches!(kw, Value::Keyword(_)));
        let sym = to_symbol(&kw).unwrap();
        assert_eq!(sym, Value::Symbol(intern("x")));
        let ty = Value::Type(intern("<point>"));
        assert_eq!(type_name(&ty).unwrap(), Value::Symbol(intern("point")));
    }
}
