//! Errors are first-class: every failure carries a keyword tag and a payload
//! that the language can observe as an error value. The Rust-side type keeps
//! the tag as a variant and accretes a context name (the code object in whose
//! frame the unwind began) as it propagates.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::symbols::{intern, Sym};
use crate::value::{ErrorValue, Value};

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";
pub const WARN_TAG: &str = "\x1b[33m[WARN]\x1b[0m";

#[derive(Clone, Debug)]
pub struct ErrorData {
    pub message: String,
    pub context: Option<String>,
}

impl ErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
        }
    }

    fn set_context(&mut self, context: String) {
        if self.context.is_none() {
            self.context = Some(context);
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{} [in {}]", self.message, ctx),
            None => write!(f, "{}", self.message),
        }
    }
}

/// An error raised with an arbitrary payload value rather than a message.
#[derive(Clone, Debug)]
pub struct ThrownData {
    pub data: Value,
    pub context: Option<String>,
}

impl fmt::Display for ThrownData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = crate::writer::write(&self.data);
        match &self.context {
            Some(ctx) => write!(f, "{} [in {}]", text, ctx),
            None => write!(f, "{}", text),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum QuillError {
    #[error("error: {0}")]
    Message(ErrorData),

    #[error("argument-error: {0}")]
    Argument(ErrorData),

    #[error("syntax-error: {0}")]
    Syntax(ErrorData),

    #[error("macro-error: {0}")]
    Macro(ErrorData),

    #[error("io-error: {0}")]
    Io(ErrorData),

    #[error("http-error: {0}")]
    Http(ErrorData),

    #[error("interrupt: {0}")]
    Interrupt(ErrorData),

    #[error("{0}")]
    Thrown(ThrownData),
}

impl QuillError {
    pub fn message(message: impl Into<String>) -> Self {
        QuillError::Message(ErrorData::new(message))
    }

    pub fn argument(message: impl Into<String>) -> Self {
        QuillError::Argument(ErrorData::new(message))
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        QuillError::Syntax(ErrorData::new(message))
    }

    pub fn macro_error(message: impl Into<String>) -> Self {
        QuillError::Macro(ErrorData::new(message))
    }

    pub fn io(message: impl Into<String>) -> Self {
        QuillError::Io(ErrorData::new(message))
    }

    pub fn http(message: impl Into<String>) -> Self {
        QuillError::Http(ErrorData::new(message))
    }

    pub fn interrupt(message: impl Into<String>) -> Self {
        QuillError::Interrupt(ErrorData::new(message))
    }

    pub fn thrown(data: Value) -> Self {
        QuillError::Thrown(ThrownData {
            data,
            context: None,
        })
    }

    /// The keyword tag of this error.
    pub fn tag(&self) -> Sym {
        match self {
            QuillError::Message(_) => intern("error:"),
            QuillError::Argument(_) => intern("argument-error:"),
            QuillError::Syntax(_) => intern("syntax-error:"),
            QuillError::Macro(_) => intern("macro-error:"),
            QuillError::Io(_) => intern("io-error:"),
            QuillError::Http(_) => intern("http-error:"),
            QuillError::Interrupt(_) => intern("interrupt:"),
            QuillError::Thrown(thrown) => match &thrown.data {
                Value::Vector(els) => match els.get(0) {
                    Some(Value::Keyword(sym)) => *sym,
                    _ => intern("error:"),
                },
                _ => intern("error:"),
            },
        }
    }

    /// `interrupt:` errors must never reach `*top-handler*`.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, QuillError::Interrupt(_))
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        if let Some(ctx) = context {
            match &mut self {
                QuillError::Message(data)
                | QuillError::Argument(data)
                | QuillError::Syntax(data)
                | QuillError::Macro(data)
                | QuillError::Io(data)
                | QuillError::Http(data)
                | QuillError::Interrupt(data) => data.set_context(ctx),
                QuillError::Thrown(thrown) => {
                    if thrown.context.is_none() {
                        thrown.context = Some(ctx);
                    }
                }
            }
        }
        self
    }

    pub fn context(&self) -> Option<&str> {
        match self {
            QuillError::Message(data)
            | QuillError::Argument(data)
            | QuillError::Syntax(data)
            | QuillError::Macro(data)
            | QuillError::Io(data)
            | QuillError::Http(data)
            | QuillError::Interrupt(data) => data.context.as_deref(),
            QuillError::Thrown(thrown) => thrown.context.as_deref(),
        }
    }

    /// The error as a language value: the payload vector plus context.
    pub fn to_value(&self) -> Value {
        let data = match self {
            QuillError::Thrown(thrown) => thrown.data.clone(),
            QuillError::Message(d)
            | QuillError::Argument(d)
            | QuillError::Syntax(d)
            | QuillError::Macro(d)
            | QuillError::Io(d)
            | QuillError::Http(d)
            | QuillError::Interrupt(d) => Value::Vector(
                vec![Value::Keyword(self.tag()), Value::string(d.message.clone())].into(),
            ),
        };
        Value::Error(Arc::new(ErrorValue {
            data,
            context: self.context().map(|s| s.to_string()),
        }))
    }

    /// Reconstruct an error from a language error value (or wrap any other
    /// value as a thrown error).
    pub fn from_value(value: &Value) -> Self {
        let (data, context) = match value {
            Value::Error(err) => (err.data.clone(), err.context.clone()),
            other => (
                Value::Vector(vec![Value::keyword("error:"), other.clone()].into()),
                None,
            ),
        };
        QuillError::Thrown(ThrownData { data, context })
    }

    /// Raise with an explicit keyword tag and payload values.
    pub fn raise(tag: Sym, payload: Vec<Value>) -> Self {
        let mut data = vec![Value::Keyword(tag)];
        data.extend(payload);
        QuillError::Thrown(ThrownData {
            data: Value::Vector(data.into()),
            context: None,
        })
    }

    /// The payload of the error as a value (without the context).
    pub fn data(&self) -> Value {
        match self {
            QuillError::Thrown(thrown) => thrown.data.clone(),
            _ => match self.to_value() {
                Value::Error(err) => err.data.clone(),
                other => other,
            },
        }
    }
}

impl From<String> for QuillError {
    fn from(s: String) -> Self {
        QuillError::message(s)
    }
}

impl From<&str> for QuillError {
    fn from(s: &str) -> Self {
        QuillError::message(s.to_string())
    }
}

impl From<std::io::Error> for QuillError {
    fn from(err: std::io::Error) -> Self {
        QuillError::io(err.to_string())
    }
}

/// Render a list of message pieces the way error constructors expect: values
/// in their written form, already-string pieces verbatim.
pub fn error_text(parts: &[Value]) -> String {
    let mut text = String::new();
    for part in parts.iter() {
        match part {
            Value::String(s) => text.push_str(s),
            other => text.push_str(&crate::writer::write(other)),
        }
    }
    text
}
