//! Compiled bytecode objects. `ops` is a flat run of opcodes interleaved
//! with their integer operands; constant-table indices address the shared,
//! process-wide constants pool.

use std::fmt;
use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use crate::error::QuillError;
use crate::globals;
use crate::list::List;
use crate::symbols::{intern, sym_name, Sym};
use crate::value::{struct_get, Value};
use crate::writer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Literal = 0,
    Local = 1,
    JumpFalse = 2,
    Jump = 3,
    TailCall = 4,
    Call = 5,
    Return = 6,
    Closure = 7,
    Pop = 8,
    Global = 9,
    DefGlobal = 10,
    SetLocal = 11,
    Import = 12,
    DefMacro = 13,
    Vector = 14,
    Struct = 15,
    UndefGlobal = 16,
}

pub const OPCODE_COUNT: usize = 17;

impl Opcode {
    pub fn from_usize(op: usize) -> Option<Opcode> {
        match op {
            0 => Some(Opcode::Literal),
            1 => Some(Opcode::Local),
            2 => Some(Opcode::JumpFalse),
            3 => Some(Opcode::Jump),
            4 => Some(Opcode::TailCall),
            5 => Some(Opcode::Call),
            6 => Some(Opcode::Return),
            7 => Some(Opcode::Closure),
            8 => Some(Opcode::Pop),
            9 => Some(Opcode::Global),
            10 => Some(Opcode::DefGlobal),
            11 => Some(Opcode::SetLocal),
            12 => Some(Opcode::Import),
            13 => Some(Opcode::DefMacro),
            14 => Some(Opcode::Vector),
            15 => Some(Opcode::Struct),
            16 => Some(Opcode::UndefGlobal),
            _ => None,
        }
    }

    /// The mnemonic used by the `(code …)` DSL.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Literal => "literal",
            Opcode::Local => "local",
            Opcode::JumpFalse => "jumpfalse",
            Opcode::Jump => "jump",
            Opcode::TailCall => "tailcall",
            Opcode::Call => "call",
            Opcode::Return => "return",
            Opcode::Closure => "closure",
            Opcode::Pop => "pop",
            Opcode::Global => "global",
            Opcode::DefGlobal => "defglobal",
            Opcode::SetLocal => "setlocal",
            Opcode::Import => "import",
            Opcode::DefMacro => "macro",
            Opcode::Vector => "vector",
            Opcode::Struct => "struct",
            Opcode::UndefGlobal => "undefine",
        }
    }
}

#[derive(Debug, Default)]
pub struct Code {
    pub name: String,
    pub argc: usize,
    /// None for plain procedures, empty for a rest parameter, non-empty for
    /// optional or keyword parameters.
    pub defaults: Option<Vec<Value>>,
    /// When present, parallel to `defaults`; selects keyword-parameter mode.
    pub keys: Option<Vec<Sym>>,
    pub ops: Vec<usize>,
}

impl Code {
    pub fn new(
        argc: usize,
        defaults: Option<Vec<Value>>,
        keys: Option<Vec<Sym>>,
        name: &str,
    ) -> Code {
        Code {
            name: name.to_string(),
            argc,
            defaults,
            keys,
            ops: Vec::new(),
        }
    }

    pub fn emit_literal(&mut self, value: &Value) {
        self.ops.push(Opcode::Literal as usize);
        self.ops.push(globals::put_constant(value));
    }

    pub fn emit_global(&mut self, sym: Sym) {
        self.ops.push(Opcode::Global as usize);
        self.ops.push(globals::put_constant(&Value::Symbol(sym)));
    }

    pub fn emit_call(&mut self, argc: usize) {
        self.ops.push(Opcode::Call as usize);
        self.ops.push(argc);
    }

    pub fn emit_tail_call(&mut self, argc: usize) {
        self.ops.push(Opcode::TailCall as usize);
        self.ops.push(argc);
    }

    pub fn emit_return(&mut self) {
        self.ops.push(Opcode::Return as usize);
    }

    pub fn emit_pop(&mut self) {
        self.ops.push(Opcode::Pop as usize);
    }

    pub fn emit_local(&mut self, i: usize, j: usize) {
        self.ops.push(Opcode::Local as usize);
        self.ops.push(i);
        self.ops.push(j);
    }

    pub fn emit_set_local(&mut self, i: usize, j: usize) {
        self.ops.push(Opcode::SetLocal as usize);
        self.ops.push(i);
        self.ops.push(j);
    }

    pub fn emit_def_global(&mut self, sym: Sym) {
        self.ops.push(Opcode::DefGlobal as usize);
        self.ops.push(globals::put_constant(&Value::Symbol(sym)));
    }

    pub fn emit_undef_global(&mut self, sym: Sym) {
        self.ops.push(Opcode::UndefGlobal as usize);
        self.ops.push(globals::put_constant(&Value::Symbol(sym)));
    }

    pub fn emit_def_macro(&mut self, sym: Sym) {
        self.ops.push(Opcode::DefMacro as usize);
        self.ops.push(globals::put_constant(&Value::Symbol(sym)));
    }

    pub fn emit_closure(&mut self, code: Arc<Code>) {
        self.ops.push(Opcode::Closure as usize);
        self.ops.push(globals::put_constant(&Value::Code(code)));
    }

    pub fn emit_import(&mut self, sym: Sym) {
        self.ops.push(Opcode::Import as usize);
        self.ops.push(globals::put_constant(&Value::Symbol(sym)));
    }

    pub fn emit_vector(&mut self, count: usize) {
        self.ops.push(Opcode::Vector as usize);
        self.ops.push(count);
    }

    pub fn emit_struct(&mut self, count: usize) {
        self.ops.push(Opcode::Struct as usize);
        self.ops.push(count);
    }

    /// Emit a jump-false with a placeholder displacement; returns the operand
    /// location for later patching.
    pub fn emit_jump_false(&mut self, offset: usize) -> usize {
        self.ops.push(Opcode::JumpFalse as usize);
        let loc = self.ops.len();
        self.ops.push(offset);
        loc
    }

    pub fn emit_jump(&mut self, offset: usize) -> usize {
        self.ops.push(Opcode::Jump as usize);
        let loc = self.ops.len();
        self.ops.push(offset);
        loc
    }

    /// Patch the displacement at `loc` to target the current end of code.
    pub fn set_jump_location(&mut self, loc: usize) {
        self.ops[loc] = self.ops.len() - loc + 1;
    }

    /// The declared signature, overridable per name via `*declarations*`.
    pub fn signature(&self) -> String {
        if !self.name.is_empty() {
            if let Some(decls) = globals::get_global(intern("*declarations*")) {
                if matches!(decls, Value::Struct(_)) {
                    if let Ok(sig) = struct_get(&decls, &Value::Symbol(intern(&self.name))) {
                        if !sig.is_null() {
                            return crate::writer::to_display_string(&sig);
                        }
                    }
                }
            }
        }
        let mut tmp = String::new();
        for _ in 0..self.argc {
            tmp.push_str(" <any>");
        }
        if self.defaults.is_some() {
            tmp.push_str(" <any>*");
        }
        if tmp.is_empty() {
            "()".to_string()
        } else {
            format!("({})", &tmp[1..])
        }
    }

    /// Round-trip this code object to the textual `(code …)` DSL.
    pub fn decompile(&self, pretty: bool) -> String {
        let mut buf = String::new();
        self.decompile_into(&mut buf, "", pretty);
        buf.replacen("(func (\"\" 0 null null)", "(code", 1)
    }

    fn decompile_into(&self, buf: &mut String, indent: &str, pretty: bool) {
        let indent_amount = "   ";
        let defaults = match &self.defaults {
            None => "null".to_string(),
            Some(defaults) => {
                let parts: Vec<String> = defaults.iter().map(writer::write).collect();
                format!("[{}]", parts.join(" "))
            }
        };
        let keys = match &self.keys {
            None => "null".to_string(),
            Some(keys) => {
                let parts: Vec<String> = keys.iter().map(|k| sym_name(*k).to_string()).collect();
                format!("[{}]", parts.join(" "))
            }
        };
        let _ = write!(
            buf,
            "{}(func ({:?} {} {} {})",
            indent, self.name, self.argc, defaults, keys
        );
        let inner = if pretty {
            format!("{}{}", indent, indent_amount)
        } else {
            indent.to_string()
        };
        let prefix = if pretty {
            format!("\n{}", inner)
        } else {
            " ".to_string()
        };
        let mut offset = 0;
        while offset < self.ops.len() {
            let Some(op) = Opcode::from_usize(self.ops[offset]) else {
                let _ = write!(buf, "{}(bad {})", prefix, self.ops[offset]);
                offset += 1;
                continue;
            };
            match op {
                Opcode::Pop | Opcode::Return => {
                    let _ = write!(buf, "{}({})", prefix, op.mnemonic());
                    offset += 1;
                }
                Opcode::Literal
                | Opcode::DefGlobal
                | Opcode::Import
                | Opcode::Global
                | Opcode::UndefGlobal
                | Opcode::DefMacro => {
                    let operand = globals::constant(self.ops[offset + 1])
                        .map(|v| writer::write(&v))
                        .unwrap_or_else(|_| "?".to_string());
                    let _ = write!(buf, "{}({} {})", prefix, op.mnemonic(), operand);
                    offset += 2;
                }
                Opcode::Call
                | Opcode::TailCall
                | Opcode::JumpFalse
                | Opcode::Jump
                | Opcode::Vector
                | Opcode::Struct => {
                    let _ = write!(
                        buf,
                        "{}({} {})",
                        prefix,
                        op.mnemonic(),
                        self.ops[offset + 1]
                    );
                    offset += 2;
                }
                Opcode::Local | Opcode::SetLocal => {
                    let _ = write!(
                        buf,
                        "{}({} {} {})",
                        prefix,
                        op.mnemonic(),
                        self.ops[offset + 1],
                        self.ops[offset + 2]
                    );
                    offset += 3;
                }
                Opcode::Closure => {
                    let _ = write!(buf, "{}({}", prefix, op.mnemonic());
                    if pretty {
                        buf.push('\n');
                    } else {
                        buf.push(' ');
                    }
                    let inner2 = if pretty {
                        format!("{}{}", inner, indent_amount)
                    } else {
                        String::new()
                    };
                    match globals::constant(self.ops[offset + 1]) {
                        Ok(Value::Code(code)) => code.decompile_into(buf, &inner2, pretty),
                        _ => buf.push('?'),
                    }
                    buf.push(')');
                    offset += 2;
                }
            }
        }
        buf.push(')');
    }

    /// Load instructions from the `(code …)` DSL body.
    pub fn load_ops(&mut self, lst: &List) -> Result<(), QuillError> {
        for instr in lst.iter() {
            let Value::List(instr) = instr else {
                return Err(QuillError::syntax(format!(
                    "bad instruction: {}",
                    writer::write(instr)
                )));
            };
            let op = instr.car();
            let Value::Symbol(op_sym) = op else {
                return Err(QuillError::syntax(format!(
                    "bad instruction: {}",
                    writer::write(&Value::List(instr.clone()))
                )));
            };
            let op_name = sym_name(op_sym);
            match op_name.as_ref() {
                "closure" => {
                    let func = instr.cadr();
                    let Value::List(func) = &func else {
                        return Err(QuillError::syntax(format!(
                            "bad closure instruction: {}",
                            writer::write(&func)
                        )));
                    };
                    if func.car() != Value::symbol("func") {
                        return Err(QuillError::syntax(format!(
                            "bad closure instruction: {}",
                            writer::write(&Value::List(func.clone()))
                        )));
                    }
                    let func = func.cdr();
                    let params = func.car();
                    let mut code = parse_code_header(&params)?;
                    code.load_ops(&func.cdr())?;
                    self.emit_closure(Arc::new(code));
                }
                "literal" => self.emit_literal(&instr.cadr()),
                "local" => {
                    let i = instr.cadr().as_int()? as usize;
                    let j = instr.caddr().as_int()? as usize;
                    self.emit_local(i, j);
                }
                "setlocal" => {
                    let i = instr.cadr().as_int()? as usize;
                    let j = instr.caddr().as_int()? as usize;
                    self.emit_set_local(i, j);
                }
                "global" => match instr.cadr() {
                    Value::Symbol(sym) => self.emit_global(sym),
                    other => {
                        return Err(QuillError::syntax(format!(
                            "global argument 1 not a symbol: {}",
                            writer::write(&other)
                        )));
                    }
                },
                "undefine" => match instr.cadr() {
                    Value::Symbol(sym) => self.emit_undef_global(sym),
                    other => {
                        return Err(QuillError::syntax(format!(
                            "undefine argument 1 not a symbol: {}",
                            writer::write(&other)
                        )));
                    }
                },
                "jump" => {
                    let loc = instr.cadr().as_int()? as usize;
                    self.emit_jump(loc);
                }
                "jumpfalse" => {
                    let loc = instr.cadr().as_int()? as usize;
                    self.emit_jump_false(loc);
                }
                "call" => {
                    let argc = instr.cadr().as_int()? as usize;
                    self.emit_call(argc);
                }
                "tailcall" => {
                    let argc = instr.cadr().as_int()? as usize;
                    self.emit_tail_call(argc);
                }
                "return" => self.emit_return(),
                "pop" => self.emit_pop(),
                "defglobal" => match instr.cadr() {
                    Value::Symbol(sym) => self.emit_def_global(sym),
                    other => {
                        return Err(QuillError::syntax(format!(
                            "defglobal argument 1 not a symbol: {}",
                            writer::write(&other)
                        )));
                    }
                },
                "macro" => match instr.cadr() {
                    Value::Symbol(sym) => self.emit_def_macro(sym),
                    other => {
                        return Err(QuillError::syntax(format!(
                            "macro argument 1 not a symbol: {}",
                            writer::write(&other)
                        )));
                    }
                },
                "import" => match instr.cadr() {
                    Value::Symbol(sym) => self.emit_import(sym),
                    other => {
                        return Err(QuillError::syntax(format!(
                            "import argument 1 not a symbol: {}",
                            writer::write(&other)
                        )));
                    }
                },
                other => {
                    return Err(QuillError::syntax(format!("bad instruction: {}", other)));
                }
            }
        }
        Ok(())
    }
}

/// Parse a closure header: either the modern
/// `("name" argc defaults keys)` list or the legacy bare argument count
/// (negative meaning a rest parameter).
fn parse_code_header(params: &Value) -> Result<Code, QuillError> {
    match params {
        Value::Number(_) => {
            let mut argc = params.as_int()?;
            let mut defaults = None;
            if argc < 0 {
                argc = -argc - 1;
                defaults = Some(Vec::new());
            }
            Ok(Code::new(argc as usize, defaults, None, ""))
        }
        Value::List(lst) if lst.len() == 4 => {
            let name = lst.car().as_string()?;
            let argc = lst.cadr().as_int()? as usize;
            let defaults = match lst.caddr() {
                Value::Null => None,
                Value::Vector(els) => Some(els.iter().cloned().collect()),
                other => {
                    return Err(QuillError::syntax(format!(
                        "bad closure defaults: {}",
                        writer::write(&other)
                    )));
                }
            };
            let keys = match lst.cdddr().car() {
                Value::Null => None,
                Value::Vector(els) => {
                    let mut keys = Vec::with_capacity(els.len());
                    for el in els.iter() {
                        match el {
                            Value::Symbol(sym) => keys.push(*sym),
                            other => {
                                return Err(QuillError::syntax(format!(
                                    "bad closure key: {}",
                                    writer::write(other)
                                )));
                            }
                        }
                    }
                    Some(keys)
                }
                other => {
                    return Err(QuillError::syntax(format!(
                        "bad closure keys: {}",
                        writer::write(&other)
                    )));
                }
            };
            Ok(Code::new(argc, defaults, keys, &name))
        }
        other => Err(QuillError::syntax(format!(
            "bad closure parameters: {}",
            writer::write(other)
        ))),
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decompile(true))
    }
}
