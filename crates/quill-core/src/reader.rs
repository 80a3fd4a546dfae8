//! The reader: textual S-expressions to values, with one byte of lookahead
//! via pushback. `;` starts a line comment (`#!` also comments, for
//! shebangs); `#` dispatches the reader macros for characters, instances,
//! and unreadable objects.

use crate::error::QuillError;
use crate::list::List;
use crate::symbols::{self, intern};
use crate::value::{instance, interned_value, struct_from_values, to_string_value, Value};

/// How struct keys are normalized after reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    #[default]
    Any,
    Keyword,
    Symbol,
    String,
}

impl KeyPolicy {
    /// The policy named by a type value, as accepted by the `read` primitive.
    pub fn from_type(value: &Value) -> Result<KeyPolicy, QuillError> {
        match value {
            Value::Null => Ok(KeyPolicy::Any),
            Value::Type(sym) => {
                let name = symbols::sym_name(*sym);
                match name.as_ref() {
                    "<any>" => Ok(KeyPolicy::Any),
                    "<keyword>" => Ok(KeyPolicy::Keyword),
                    "<symbol>" => Ok(KeyPolicy::Symbol),
                    "<string>" => Ok(KeyPolicy::String),
                    other => Err(QuillError::argument(format!(
                        "read: bad key type: {}",
                        other
                    ))),
                }
            }
            other => Err(QuillError::argument(format!(
                "read: bad key option: {}",
                crate::writer::write(other)
            ))),
        }
    }
}

/// Read the first value in the input; null at end of input.
pub fn read(input: &str, keys: KeyPolicy) -> Result<Value, QuillError> {
    let mut reader = Reader::new(input);
    match reader.read_value(keys)? {
        Some(value) => Ok(value),
        None => Ok(Value::Null),
    }
}

/// Read every value in the input, stopping cleanly at end of input.
pub fn read_all(input: &str, keys: KeyPolicy) -> Result<Vec<Value>, QuillError> {
    let mut reader = Reader::new(input);
    let mut values = Vec::new();
    while let Some(value) = reader.read_value(keys)? {
        values.push(value);
    }
    Ok(values)
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\n' || b == b'\t' || b == b'\r' || b == b','
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'"' | b'\'' | b'#' | b':'
    )
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str) -> Reader<'a> {
        Reader {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn get_char(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    fn unget_char(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
        }
    }

    /// Read the next value; none at end of input.
    pub fn read_value(&mut self, keys: KeyPolicy) -> Result<Option<Value>, QuillError> {
        while let Some(c) = self.get_char() {
            if is_whitespace(c) {
                continue;
            }
            match c {
                b';' => {
                    self.skip_comment();
                }
                b'\'' => {
                    return self.read_sugar("quote", keys);
                }
                b'`' => {
                    return self.read_sugar("quasiquote", keys);
                }
                b'~' => {
                    let mut sugar = "unquote";
                    match self.get_char() {
                        Some(b'@') => sugar = "unquote-splicing",
                        Some(_) => self.unget_char(),
                        None => {}
                    }
                    return self.read_sugar(sugar, keys);
                }
                b'#' => match self.read_reader_macro(keys)? {
                    Some(value) => return Ok(Some(value)),
                    None => continue,
                },
                b'(' => return Ok(Some(self.read_list(keys)?)),
                b'[' => return Ok(Some(self.read_vector(keys)?)),
                b'{' => return Ok(Some(self.read_struct(keys)?)),
                b'"' => return Ok(Some(self.read_string()?)),
                b')' | b']' | b'}' => {
                    return Err(QuillError::syntax(format!(
                        "Unexpected '{}'",
                        c as char
                    )));
                }
                c => return Ok(Some(self.read_atom(c)?)),
            }
        }
        Ok(None)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.get_char() {
            if c == b'\n' {
                return;
            }
        }
    }

    fn read_sugar(&mut self, name: &str, keys: KeyPolicy) -> Result<Option<Value>, QuillError> {
        match self.read_value(keys)? {
            Some(operand) => Ok(Some(Value::List(List::from_values(&[
                Value::symbol(name),
                operand,
            ])))),
            None => Ok(None),
        }
    }

    fn read_string(&mut self) -> Result<Value, QuillError> {
        let mut text = String::new();
        loop {
            let Some(c) = self.get_char() else {
                return Err(QuillError::syntax("unterminated string"));
            };
            match c {
                b'"' => return Ok(Value::string(text)),
                b'\\' => {
                    let Some(esc) = self.get_char() else {
                        return Err(QuillError::syntax("unterminated string escape"));
                    };
                    match esc {
                        b'n' => text.push('\n'),
                        b't' => text.push('\t'),
                        b'f' => text.push('\u{c}'),
                        b'b' => text.push('\u{8}'),
                        b'r' => text.push('\r'),
                        b'u' | b'U' => {
                            let mut hex = String::with_capacity(4);
                            for _ in 0..4 {
                                let Some(h) = self.get_char() else {
                                    return Err(QuillError::syntax(
                                        "unterminated unicode escape",
                                    ));
                                };
                                hex.push(h as char);
                            }
                            let code = u32::from_str_radix(&hex, 16).map_err(|_| {
                                QuillError::syntax(format!("bad unicode escape: \\u{}", hex))
                            })?;
                            match char::from_u32(code) {
                                Some(decoded) => text.push(decoded),
                                None => {
                                    return Err(QuillError::syntax(format!(
                                        "bad unicode escape: \\u{}",
                                        hex
                                    )));
                                }
                            }
                        }
                        other => text.push(other as char),
                    }
                }
                c => {
                    // Collect the full UTF-8 sequence starting at this byte.
                    let start = self.pos - 1;
                    let mut end = self.pos;
                    while end < self.bytes.len() && (self.bytes[end] & 0xC0) == 0x80 {
                        end += 1;
                    }
                    match std::str::from_utf8(&self.bytes[start..end]) {
                        Ok(seq) => {
                            text.push_str(seq);
                            self.pos = end;
                        }
                        Err(_) => text.push(c as char),
                    }
                }
            }
        }
    }

    fn read_list(&mut self, keys: KeyPolicy) -> Result<Value, QuillError> {
        let items = self.read_sequence(b')', keys)?;
        Ok(Value::List(List::from_vec(items)))
    }

    fn read_vector(&mut self, keys: KeyPolicy) -> Result<Value, QuillError> {
        let items = self.read_sequence(b']', keys)?;
        Ok(Value::Vector(items.into()))
    }

    fn read_sequence(&mut self, end: u8, keys: KeyPolicy) -> Result<Vec<Value>, QuillError> {
        let mut items = Vec::new();
        loop {
            let Some(c) = self.get_char() else {
                return Err(QuillError::syntax(format!(
                    "unterminated sequence, expected '{}'",
                    end as char
                )));
            };
            if is_whitespace(c) {
                continue;
            }
            if c == b';' {
                self.skip_comment();
                continue;
            }
            if c == end {
                return Ok(items);
            }
            self.unget_char();
            match self.read_value(keys)? {
                Some(item) => items.push(item),
                None => {
                    return Err(QuillError::syntax(format!(
                        "unterminated sequence, expected '{}'",
                        end as char
                    )));
                }
            }
        }
    }

    /// Skip to the next datum, optionally skipping the `:` allowed between a
    /// struct key and its value.
    fn skip_to_data(&mut self, skip_colon: bool) -> Result<u8, QuillError> {
        loop {
            let Some(c) = self.get_char() else {
                return Err(QuillError::syntax("unterminated struct"));
            };
            if is_whitespace(c) || (skip_colon && c == b':') {
                continue;
            }
            if c == b';' {
                self.skip_comment();
                continue;
            }
            return Ok(c);
        }
    }

    fn read_struct(&mut self, keys: KeyPolicy) -> Result<Value, QuillError> {
        let mut items = Vec::new();
        loop {
            let c = self.skip_to_data(false)?;
            if c == b':' {
                return Err(QuillError::syntax("Unexpected ':' in struct"));
            }
            if c == b'}' {
                return struct_from_values(&items)
                    .map_err(|e| QuillError::syntax(format!("{}", e)));
            }
            self.unget_char();
            let Some(key) = self.read_value(KeyPolicy::Any)? else {
                return Err(QuillError::syntax("unterminated struct"));
            };
            let key = coerce_key(key, keys)?;
            items.push(key);
            let c = self.skip_to_data(true)?;
            if c == b'}' {
                return Err(QuillError::syntax("mismatched key/value in struct"));
            }
            self.unget_char();
            let Some(value) = self.read_value(keys)? else {
                return Err(QuillError::syntax("unterminated struct"));
            };
            items.push(value);
        }
    }

    fn read_atom(&mut self, first: u8) -> Result<Value, QuillError> {
        let text = self.read_atom_string(first)?;
        let mut name = text.as_str();
        let keyword = name.ends_with(':');
        if keyword {
            name = &name[..name.len() - 1];
        } else {
            match name {
                "null" => return Ok(Value::Null),
                "true" => return Ok(Value::Boolean(true)),
                "false" => return Ok(Value::Boolean(false)),
                _ => {}
            }
        }
        if let Ok(f) = name.parse::<f64>() {
            if keyword {
                return Err(QuillError::syntax(format!(
                    "Keyword cannot have a name that looks like a number: {}:",
                    name
                )));
            }
            return Ok(Value::Number(f));
        }
        Ok(interned_value(&text))
    }

    fn read_atom_string(&mut self, first: u8) -> Result<String, QuillError> {
        let mut buf = Vec::new();
        if first != 0 {
            if first == b':' {
                return Err(QuillError::syntax(
                    "Invalid keyword: colons only valid at the end of symbols",
                ));
            }
            buf.push(first);
        }
        while let Some(c) = self.get_char() {
            if is_whitespace(c) {
                break;
            }
            if c == b':' {
                buf.push(c);
                break;
            }
            if is_delimiter(c) {
                self.unget_char();
                break;
            }
            buf.push(c);
        }
        String::from_utf8(buf).map_err(|_| QuillError::syntax("invalid UTF-8 in atom"))
    }

    fn read_type_name(&mut self, first: u8) -> Result<String, QuillError> {
        if first != b'<' {
            return Err(QuillError::syntax("Invalid type name"));
        }
        let mut buf = vec![first];
        while let Some(c) = self.get_char() {
            if is_whitespace(c) {
                break;
            }
            if c == b'>' {
                buf.push(c);
                break;
            }
            if is_delimiter(c) {
                self.unget_char();
                break;
            }
            buf.push(c);
        }
        String::from_utf8(buf).map_err(|_| QuillError::syntax("invalid UTF-8 in type name"))
    }

    /// Dispatch after `#`. A comment (`#!`) yields none; everything else is a
    /// value or a syntax error.
    fn read_reader_macro(&mut self, keys: KeyPolicy) -> Result<Option<Value>, QuillError> {
        let Some(c) = self.get_char() else {
            return Err(QuillError::syntax("unexpected end of input after '#'"));
        };
        match c {
            b'\\' => Ok(Some(self.read_character()?)),
            b'!' => {
                self.skip_comment();
                Ok(None)
            }
            b'[' => {
                let text = self.read_atom_string(0)?;
                Err(QuillError::syntax(format!(
                    "Unreadable object: #[{}]",
                    text
                )))
            }
            c => {
                let name = self.read_type_name(c)?;
                if !symbols::is_valid_type_name(&name) {
                    return Err(QuillError::syntax(format!(
                        "Bad reader macro: #{} ...",
                        name
                    )));
                }
                let Some(value) = self.read_value(keys)? else {
                    return Err(QuillError::syntax(format!(
                        "Bad reader macro: #{} ...",
                        name
                    )));
                };
                Ok(Some(instance(&Value::Type(intern(&name)), value)?))
            }
        }
    }

    fn read_character(&mut self) -> Result<Value, QuillError> {
        let Some(c) = self.get_char() else {
            return Err(QuillError::syntax("unexpected end of character literal"));
        };
        if is_whitespace(c) || is_delimiter(c) {
            return Ok(Value::Character(c as char));
        }
        let Some(c2) = self.get_char() else {
            return Ok(Value::Character(c as char));
        };
        if !is_whitespace(c2) && !is_delimiter(c2) {
            let mut name = vec![c, c2];
            while let Some(next) = self.get_char() {
                if is_whitespace(next) || is_delimiter(next) {
                    self.unget_char();
                    break;
                }
                name.push(next);
            }
            let name = String::from_utf8(name)
                .map_err(|_| QuillError::syntax("invalid UTF-8 in character name"))?;
            return named_char(&name).map(Value::Character);
        }
        self.unget_char();
        Ok(Value::Character(c as char))
    }
}

fn named_char(name: &str) -> Result<char, QuillError> {
    match name {
        "null" => Ok('\0'),
        "alarm" => Ok('\u{7}'),
        "backspace" => Ok('\u{8}'),
        "tab" => Ok('\t'),
        "newline" => Ok('\n'),
        "return" => Ok('\r'),
        "escape" => Ok('\u{1b}'),
        "space" => Ok(' '),
        "delete" => Ok('\u{7f}'),
        _ => {
            if let Some(hex) = name.strip_prefix('x') {
                let code = u32::from_str_radix(hex, 16)
                    .map_err(|_| QuillError::syntax(format!("Bad named character: #\\{}", name)))?;
                return char::from_u32(code).ok_or_else(|| {
                    QuillError::syntax(format!("Bad named character: #\\{}", name))
                });
            }
            Err(QuillError::syntax(format!(
                "Bad named character: #\\{}",
                name
            )))
        }
    }
}

fn coerce_key(key: Value, policy: KeyPolicy) -> Result<Value, QuillError> {
    let coerced = match policy {
        KeyPolicy::Any => return Ok(key),
        KeyPolicy::Keyword => symbols::to_keyword(&key),
        KeyPolicy::Symbol => symbols::to_symbol(&key),
        KeyPolicy::String => to_string_value(&key),
    };
    coerced.map_err(|e| QuillError::syntax(format!("{}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write;

    fn read1(src: &str) -> Value {
        read(src, KeyPolicy::Any).expect(src)
    }

    #[test]
    fn atoms() {
        assert_eq!(write(&read1("42")), "42");
        assert_eq!(write(&read1("-2.5")), "-2.5");
        assert_eq!(write(&read1("foo")), "foo");
        assert_eq!(write(&read1("foo:")), "foo:");
        assert_eq!(write(&read1("<point>")), "<point>");
        assert_eq!(write(&read1("null")), "null");
        assert_eq!(write(&read1("true")), "true");
    }

    #[test]
    fn comma_is_whitespace() {
        assert_eq!(write(&read1("(1, 2, 3)")), "(1 2 3)");
    }

    #[test]
    fn quote_sugar_round_trips() {
        assert_eq!(write(&read1("'x")), "'x");
        assert_eq!(write(&read1("`(a ~b ~@c)")), "`(a ~b ~@c)");
    }

    #[test]
    fn characters() {
        assert_eq!(read1("#\\a"), Value::Character('a'));
        assert_eq!(read1("#\\newline"), Value::Character('\n'));
        assert_eq!(read1("#\\x0041"), Value::Character('A'));
    }

    #[test]
    fn string_escapes_decode() {
        assert_eq!(read1("\"a\\tb\""), Value::string("a\tb"));
        assert_eq!(read1("\"\\u0041\""), Value::string("A"));
        assert_eq!(read1("\"q\\\"q\""), Value::string("q\"q"));
        assert_eq!(read1("\"back\\\\slash\""), Value::string("back\\slash"));
    }

    #[test]
    fn colon_errors() {
        assert!(read(":x", KeyPolicy::Any).is_err());
        assert!(read("{: 1}", KeyPolicy::Any).is_err());
        assert!(read("{a 1 b}", KeyPolicy::Any).is_err());
    }

    #[test]
    fn unreadable_object_errors() {
        assert!(read("#[function cons]", KeyPolicy::Any).is_err());
    }

    #[test]
    fn struct_key_policies() {
        let v = read("{a 1}", KeyPolicy::Keyword).unwrap();
        assert_eq!(write(&v), "{a: 1}");
        let v = read("{a: 1}", KeyPolicy::Symbol).unwrap();
        assert_eq!(write(&v), "{a 1}");
        let v = read("{a 1}", KeyPolicy::String).unwrap();
        assert_eq!(write(&v), "{\"a\" 1}");
    }
}
