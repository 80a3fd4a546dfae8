//! The virtual machine. The stack is used top-down: `sp` starts at the
//! array's length and decreases as values are pushed, so the arguments of a
//! pending call always occupy `sp+1 … sp+n`. One dispatch loop is
//! monomorphized twice: the fast path and the instrumented path that the
//! trace flag drives.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::error::QuillError;
use crate::globals;
use crate::interrupt;
use crate::list::List;
use crate::options;
use crate::symbols::{intern, sym_name};
use crate::value::{
    struct_from_values, struct_get, Closure, Continuation, Function, Primitive, Value,
};
use crate::vm::code::{Code, Opcode};
use crate::writer::{function_to_string, write};

pub const DEFAULT_STACK_SIZE: usize = 1000;

/// A call activation. `previous` chains the dynamic call stack; `parent`
/// chains lexical scope. Continuations and closures may keep a frame alive
/// past its caller's return.
#[derive(Debug)]
pub struct Frame {
    pub previous: Option<Arc<Frame>>,
    pub parent: Option<Arc<Frame>>,
    pub code: Option<Arc<Code>>,
    pub saved_code: Option<Arc<Code>>,
    pub saved_pc: usize,
    pub elements: RwLock<Vec<Value>>,
}

impl Frame {
    fn root(code: Arc<Code>, elements: Vec<Value>) -> Arc<Frame> {
        Arc::new(Frame {
            previous: None,
            parent: None,
            code: Some(code),
            saved_code: None,
            saved_pc: 0,
            elements: RwLock::new(elements),
        })
    }
}

fn lexical_frame(env: &Arc<Frame>, depth: usize) -> Result<Arc<Frame>, QuillError> {
    let mut frame = env.clone();
    for _ in 0..depth {
        frame = frame
            .parent
            .clone()
            .ok_or_else(|| QuillError::message("undefined local"))?;
    }
    Ok(frame)
}

/// The context name attached to an error unwinding out of `env`: the
/// enclosing code's name, or the caller's when that frame is named `throw`.
fn frame_context(env: &Arc<Frame>) -> Option<String> {
    let code = env.code.as_ref()?;
    if code.name != "throw" {
        if code.name.is_empty() {
            return None;
        }
        return Some(code.name.clone());
    }
    let previous = env.previous.as_ref()?;
    let code = previous.code.as_ref()?;
    if code.name.is_empty() {
        None
    } else {
        Some(code.name.clone())
    }
}

/// Execute a code object with the given arguments on a fresh VM.
pub fn exec(code: &Arc<Code>, args: Vec<Value>) -> Result<Value, QuillError> {
    if args.len() != code.argc {
        return Err(QuillError::argument("Wrong number of arguments"));
    }
    let env = Frame::root(code.clone(), args);
    let start = Instant::now();
    let mut vm = Vm::new(DEFAULT_STACK_SIZE);
    let result = vm.run(code.clone(), env)?;
    if options::verbose() {
        eprintln!("; executed in {:?}", start.elapsed());
        if !options::interactive() {
            eprintln!("; => {}", result);
        }
    }
    Ok(result)
}

/// Run a macro expander closure at compile time, with verbose output
/// suppressed.
pub fn exec_compile_time(expander: &Closure, arg: Value) -> Result<Value, QuillError> {
    let env = Arc::new(Frame {
        previous: None,
        parent: Some(expander.frame.clone()),
        code: Some(expander.code.clone()),
        saved_code: None,
        saved_pc: 0,
        elements: RwLock::new(vec![arg]),
    });
    let was_verbose = options::verbose();
    options::set_verbose(false);
    let mut vm = Vm::new(DEFAULT_STACK_SIZE);
    let result = vm.run(expander.code.clone(), env);
    options::set_verbose(was_verbose);
    result
}

/// Build a frame's element array for a call, interpreting the code object's
/// defaults, keys, and rest conventions.
pub fn frame_elements(
    fun_desc: &str,
    code: &Code,
    args: &[Value],
) -> Result<Vec<Value>, QuillError> {
    let argc = args.len();
    let expected = code.argc;
    let Some(defaults) = &code.defaults else {
        if argc != expected {
            return Err(QuillError::argument(format!(
                "Wrong number of args to {} (expected {}, got {})",
                fun_desc, expected, argc
            )));
        }
        return Ok(args.to_vec());
    };
    let extra = defaults.len();
    let rest = extra == 0;
    if argc < expected {
        return Err(QuillError::argument(format!(
            "Wrong number of args to {} (expected at least {}, got {})",
            fun_desc, expected, argc
        )));
    }
    if rest {
        let mut elements = Vec::with_capacity(expected + 1);
        elements.extend_from_slice(&args[..expected]);
        elements.push(Value::List(List::from_values(&args[expected..])));
        return Ok(elements);
    }
    let total = expected + extra;
    if let Some(keys) = &code.keys {
        let bindings = &args[expected..];
        if bindings.len() % 2 != 0 {
            return Err(QuillError::argument(format!(
                "Bad keyword argument(s): {}",
                write(&Value::List(List::from_values(bindings)))
            )));
        }
        let mut elements = Vec::with_capacity(total);
        elements.extend_from_slice(&args[..expected]);
        elements.extend(defaults.iter().cloned());
        let mut i = 0;
        while i < bindings.len() {
            let key = match crate::symbols::to_symbol(&bindings[i]) {
                Ok(Value::Symbol(sym)) => sym,
                _ => {
                    return Err(QuillError::argument(format!(
                        "Bad keyword argument: {}",
                        write(&bindings[i])
                    )));
                }
            };
            match keys.iter().position(|k| *k == key) {
                Some(pos) => elements[expected + pos] = bindings[i + 1].clone(),
                None => {
                    return Err(QuillError::argument(format!(
                        "Undefined keyword argument: {}",
                        sym_name(key)
                    )));
                }
            }
            i += 2;
        }
        return Ok(elements);
    }
    if argc > total {
        return Err(QuillError::argument(format!(
            "Wrong number of args to {} (expected {} to {}, got {})",
            fun_desc, expected, total, argc
        )));
    }
    let mut elements = Vec::with_capacity(total);
    elements.extend_from_slice(args);
    for i in argc..total {
        elements.push(defaults[i - expected].clone());
    }
    Ok(elements)
}

fn argc_error(name: &str, min: usize, max: Option<usize>, provided: usize) -> QuillError {
    let wanted = match max {
        Some(max) if min == max && min == 1 => "1 argument".to_string(),
        Some(max) if min == max => format!("{} arguments", min),
        Some(max) => format!("{} to {} arguments", min, max),
        None => format!("{} or more arguments", min),
    };
    QuillError::argument(format!("{} expected {}, got {}", name, wanted, provided))
}

fn check_arg_type(prim: &Primitive, index: usize, arg: &Value) -> Result<(), QuillError> {
    let declared = prim.args[index];
    if declared != crate::value::types::any() && arg.type_sym() != declared {
        return Err(QuillError::argument(format!(
            "{} expected a {} for argument {}, got a {}",
            prim.name,
            sym_name(declared),
            index + 1,
            arg.type_name()
        )));
    }
    Ok(())
}

/// Invoke a primitive, enforcing its declared signature.
pub fn call_primitive(prim: &Primitive, args: &[Value]) -> Result<Value, QuillError> {
    if prim.defaults.is_some() {
        return call_primitive_with_defaults(prim, args);
    }
    if args.len() != prim.argc {
        return Err(argc_error(&prim.name, prim.argc, Some(prim.argc), args.len()));
    }
    for (i, arg) in args.iter().enumerate() {
        check_arg_type(prim, i, arg)?;
    }
    (prim.fun)(args)
}

fn call_primitive_with_defaults(prim: &Primitive, args: &[Value]) -> Result<Value, QuillError> {
    let provided = args.len();
    let minargc = prim.argc;
    let defaults = prim.defaults.as_ref().expect("defaults checked by caller");
    if defaults.is_empty() {
        // Rest mode: any number of rest-typed arguments may follow.
        if provided < minargc {
            return Err(argc_error(&prim.name, minargc, None, provided));
        }
        for i in 0..minargc {
            check_arg_type(prim, i, &args[i])?;
        }
        if let Some(rest) = prim.rest {
            if rest != crate::value::types::any() {
                for (i, arg) in args.iter().enumerate().skip(minargc) {
                    if arg.type_sym() != rest {
                        return Err(QuillError::argument(format!(
                            "{} expected a {} for argument {}, got a {}",
                            prim.name,
                            sym_name(rest),
                            i + 1,
                            arg.type_name()
                        )));
                    }
                }
            }
        }
        return (prim.fun)(args);
    }
    let maxargc = prim.args.len();
    if provided < minargc {
        return Err(argc_error(&prim.name, minargc, Some(maxargc), provided));
    }
    let mut newargs: Vec<Value>;
    if let Some(keys) = &prim.keys {
        newargs = Vec::with_capacity(maxargc);
        newargs.extend_from_slice(&args[..minargc]);
        newargs.extend(defaults.iter().cloned());
        let mut j = minargc;
        while j < provided {
            let key = args[j].clone();
            j += 1;
            if j == provided {
                return Err(QuillError::argument(
                    "mismatched keyword/value pair in argument list",
                ));
            }
            let Value::Keyword(key) = key else {
                return Err(QuillError::argument(format!(
                    "expected keyword, got a {}",
                    key.type_name()
                )));
            };
            match keys.iter().position(|k| *k == key) {
                Some(pos) => {
                    newargs[minargc + pos] = args[j].clone();
                    j += 1;
                }
                None => {
                    return Err(QuillError::argument(format!(
                        "{} accepts {} as keyword arg(s), not {}",
                        prim.name,
                        keys.iter()
                            .map(|k| sym_name(*k).to_string())
                            .collect::<Vec<_>>()
                            .join(" "),
                        sym_name(key)
                    )));
                }
            }
        }
    } else {
        if provided > maxargc {
            return Err(argc_error(&prim.name, minargc, Some(maxargc), provided));
        }
        newargs = Vec::with_capacity(maxargc);
        newargs.extend_from_slice(args);
        for i in provided..maxargc {
            newargs.push(defaults[i - minargc].clone());
        }
    }
    for (i, arg) in newargs.iter().enumerate() {
        check_arg_type(prim, i, arg)?;
    }
    (prim.fun)(&newargs)
}

/// Where the dispatch loop goes after a call-shaped transition.
enum Flow {
    Continue {
        code: Arc<Code>,
        pc: usize,
        env: Arc<Frame>,
    },
    Done(Value),
}

pub struct Vm {
    stack: Vec<Value>,
    sp: usize,
}

impl Vm {
    pub fn new(stack_size: usize) -> Vm {
        Vm {
            stack: vec![Value::Null; stack_size],
            sp: stack_size,
        }
    }

    pub fn run(&mut self, code: Arc<Code>, env: Arc<Frame>) -> Result<Value, QuillError> {
        if !options::optimize() || options::verbose() || options::trace() {
            self.dispatch::<true>(code, env)
        } else {
            self.dispatch::<false>(code, env)
        }
    }

    fn push(&mut self, value: Value) -> Result<(), QuillError> {
        if self.sp == 0 {
            return Err(QuillError::message("stack overflow"));
        }
        self.sp -= 1;
        self.stack[self.sp] = value;
        Ok(())
    }

    fn operand(&self, code: &Code, at: usize) -> Result<usize, QuillError> {
        code.ops
            .get(at)
            .copied()
            .ok_or_else(|| QuillError::message("bad instruction: truncated operand"))
    }

    fn show_stack(&self) -> String {
        let mut out = String::from("[");
        let end = (self.sp + 5).min(self.stack.len());
        for slot in self.sp..end {
            let mut text = write(&self.stack[slot]);
            if text.len() > 30 {
                text.truncate(27);
                text.push_str("...");
            }
            out.push(' ');
            out.push_str(&text);
        }
        if end < self.stack.len() {
            out.push_str(" ...");
        }
        out.push_str(" ]");
        out
    }

    fn show_instruction(&self, pc: usize, op: Opcode, args: &str) {
        let body = format!("{:<8}{:<10}{}", pc, op.mnemonic(), args);
        eprintln!("{:<40}{}", body, self.show_stack());
    }

    fn dispatch<const TRACED: bool>(
        &mut self,
        code: Arc<Code>,
        env: Arc<Frame>,
    ) -> Result<Value, QuillError> {
        let mut code = code;
        let mut env = env;
        let mut pc = 0usize;
        loop {
            let op = self.operand(&code, pc)?;
            let Some(op) = Opcode::from_usize(op) else {
                return Err(QuillError::message(format!("bad instruction: {}", op)));
            };
            match op {
                Opcode::Literal => {
                    let idx = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", idx));
                    }
                    let value = globals::constant(idx)?;
                    self.push(value)?;
                    pc += 2;
                }
                Opcode::Local => {
                    let i = self.operand(&code, pc + 1)?;
                    let j = self.operand(&code, pc + 2)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}, {}", i, j));
                    }
                    let frame = lexical_frame(&env, i)?;
                    let value = {
                        let elements = frame.elements.read().unwrap();
                        elements
                            .get(j)
                            .cloned()
                            .ok_or_else(|| QuillError::message("undefined local"))?
                    };
                    self.push(value)?;
                    pc += 3;
                }
                Opcode::SetLocal => {
                    let i = self.operand(&code, pc + 1)?;
                    let j = self.operand(&code, pc + 2)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}, {}", i, j));
                    }
                    let frame = lexical_frame(&env, i)?;
                    let value = self.stack[self.sp].clone();
                    let mut elements = frame.elements.write().unwrap();
                    if j >= elements.len() {
                        return Err(QuillError::message("undefined local"));
                    }
                    elements[j] = value;
                    pc += 3;
                }
                Opcode::Global => {
                    let idx = self.operand(&code, pc + 1)?;
                    let sym = globals::constant_sym(idx)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &sym_name(sym));
                    }
                    match globals::get_global(sym) {
                        Some(value) => {
                            self.push(value)?;
                            pc += 2;
                        }
                        None => {
                            let err = QuillError::message(format!(
                                "Undefined symbol: {}",
                                sym_name(sym)
                            ));
                            match self.catch(err, &env)? {
                                Flow::Continue {
                                    code: c,
                                    pc: p,
                                    env: e,
                                } => {
                                    code = c;
                                    pc = p;
                                    env = e;
                                }
                                Flow::Done(value) => return Ok(value),
                            }
                        }
                    }
                }
                Opcode::JumpFalse => {
                    let delta = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", pc + delta));
                    }
                    let value = self.stack[self.sp].clone();
                    self.sp += 1;
                    if value.is_false() {
                        pc += delta;
                    } else {
                        pc += 2;
                    }
                }
                Opcode::Jump => {
                    let delta = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", pc + delta));
                    }
                    pc += delta;
                }
                Opcode::Pop => {
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, "");
                    }
                    self.sp += 1;
                    pc += 1;
                }
                Opcode::Call => {
                    let argc = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", argc));
                    }
                    interrupt::check_for_interrupt()
                        .map_err(|e| e.with_context(frame_context(&env)))?;
                    let fun = self.stack[self.sp].clone();
                    self.sp += 1;
                    match self.funcall(fun, argc, &code, pc + 2, &env)? {
                        Flow::Continue {
                            code: c,
                            pc: p,
                            env: e,
                        } => {
                            code = c;
                            pc = p;
                            env = e;
                        }
                        Flow::Done(value) => return Ok(value),
                    }
                }
                Opcode::TailCall => {
                    let argc = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", argc));
                    }
                    interrupt::check_for_interrupt()
                        .map_err(|e| e.with_context(frame_context(&env)))?;
                    let fun = self.stack[self.sp].clone();
                    self.sp += 1;
                    match self.tailcall(fun, argc, &env)? {
                        Flow::Continue {
                            code: c,
                            pc: p,
                            env: e,
                        } => {
                            code = c;
                            pc = p;
                            env = e;
                        }
                        Flow::Done(value) => return Ok(value),
                    }
                }
                Opcode::Return => {
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, "");
                    }
                    interrupt::check_for_interrupt()
                        .map_err(|e| e.with_context(frame_context(&env)))?;
                    match (&env.previous, &env.saved_code) {
                        (None, _) => return Ok(self.stack[self.sp].clone()),
                        (Some(previous), Some(saved)) => {
                            code = saved.clone();
                            pc = env.saved_pc;
                            env = previous.clone();
                        }
                        (Some(_), None) => {
                            return Err(QuillError::message("frame missing resume point"));
                        }
                    }
                }
                Opcode::Closure => {
                    let idx = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, "");
                    }
                    match globals::constant(idx)? {
                        Value::Code(fn_code) => {
                            self.push(Value::Function(Function::Closure(Arc::new(Closure {
                                code: fn_code,
                                frame: env.clone(),
                            }))))?;
                        }
                        other => {
                            return Err(QuillError::message(format!(
                                "closure constant is not code: {}",
                                write(&other)
                            )));
                        }
                    }
                    pc += 2;
                }
                Opcode::DefGlobal => {
                    let idx = self.operand(&code, pc + 1)?;
                    let sym = globals::constant_sym(idx)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &sym_name(sym));
                    }
                    globals::def_global(sym, self.stack[self.sp].clone());
                    pc += 2;
                }
                Opcode::UndefGlobal => {
                    let idx = self.operand(&code, pc + 1)?;
                    let sym = globals::constant_sym(idx)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &sym_name(sym));
                    }
                    globals::undef_global(sym);
                    pc += 2;
                }
                Opcode::DefMacro => {
                    let idx = self.operand(&code, pc + 1)?;
                    let sym = globals::constant_sym(idx)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &sym_name(sym));
                    }
                    globals::def_macro(sym, self.stack[self.sp].clone());
                    self.stack[self.sp] = Value::Symbol(sym);
                    pc += 2;
                }
                Opcode::Import => {
                    let idx = self.operand(&code, pc + 1)?;
                    let sym = globals::constant_sym(idx)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &sym_name(sym));
                    }
                    match crate::runtime::import(sym) {
                        Ok(()) => {
                            self.push(Value::Symbol(sym))?;
                            pc += 2;
                        }
                        Err(err) => match self.catch(err, &env)? {
                            Flow::Continue {
                                code: c,
                                pc: p,
                                env: e,
                            } => {
                                code = c;
                                pc = p;
                                env = e;
                            }
                            Flow::Done(value) => return Ok(value),
                        },
                    }
                }
                Opcode::Vector => {
                    let count = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", count));
                    }
                    let elements: im::Vector<Value> =
                        self.stack[self.sp..self.sp + count].iter().cloned().collect();
                    self.sp += count;
                    self.push(Value::Vector(elements))?;
                    pc += 2;
                }
                Opcode::Struct => {
                    let count = self.operand(&code, pc + 1)?;
                    if TRACED && options::trace() {
                        self.show_instruction(pc, op, &format!("{}", count));
                    }
                    let fields: Vec<Value> =
                        self.stack[self.sp..self.sp + count].to_vec();
                    match struct_from_values(&fields) {
                        Ok(value) => {
                            self.sp += count;
                            self.push(value)?;
                            pc += 2;
                        }
                        Err(err) => match self.catch(err, &env)? {
                            Flow::Continue {
                                code: c,
                                pc: p,
                                env: e,
                            } => {
                                code = c;
                                pc = p;
                                env = e;
                            }
                            Flow::Done(value) => return Ok(value),
                        },
                    }
                }
            }
        }
    }

    /// CALL: dispatch on the callee, re-entering for apply and callcc.
    fn funcall(
        &mut self,
        fun: Value,
        argc: usize,
        code: &Arc<Code>,
        saved_pc: usize,
        env: &Arc<Frame>,
    ) -> Result<Flow, QuillError> {
        let mut fun = fun;
        let mut argc = argc;
        loop {
            match &fun {
                Value::Function(Function::Closure(cl)) => {
                    let args = &self.stack[self.sp..self.sp + argc];
                    let elements =
                        match frame_elements(&function_to_string(&Function::Closure(cl.clone())), &cl.code, args) {
                            Ok(elements) => elements,
                            Err(err) => return self.catch(err, env),
                        };
                    self.sp += argc;
                    let frame = Arc::new(Frame {
                        previous: Some(env.clone()),
                        parent: Some(cl.frame.clone()),
                        code: Some(cl.code.clone()),
                        saved_code: Some(code.clone()),
                        saved_pc,
                        elements: RwLock::new(elements),
                    });
                    return Ok(Flow::Continue {
                        code: cl.code.clone(),
                        pc: 0,
                        env: frame,
                    });
                }
                Value::Function(Function::Primitive(prim)) => {
                    let args = &self.stack[self.sp..self.sp + argc];
                    match call_primitive(prim, args) {
                        Ok(value) => {
                            self.sp = self.sp + argc - 1;
                            self.stack[self.sp] = value;
                            return Ok(Flow::Continue {
                                code: code.clone(),
                                pc: saved_pc,
                                env: env.clone(),
                            });
                        }
                        Err(err) => return self.catch(err, env),
                    }
                }
                Value::Function(Function::Apply) => {
                    if argc < 2 {
                        return self.catch(
                            QuillError::argument(format!(
                                "apply expected at least 2 arguments, got {}",
                                argc
                            )),
                            env,
                        );
                    }
                    let new_fun = self.stack[self.sp].clone();
                    let last = self.stack[self.sp + argc - 1].clone();
                    let Value::List(last) = last else {
                        return self.catch(
                            QuillError::argument(
                                "apply expected a <list> as its final argument",
                            ),
                            env,
                        );
                    };
                    let mut arglist = last;
                    for i in (1..argc - 1).rev() {
                        arglist = List::cons(self.stack[self.sp + i].clone(), arglist);
                    }
                    self.sp += argc;
                    let spread = arglist.to_vec();
                    if spread.len() > self.sp {
                        return Err(QuillError::message("stack overflow"));
                    }
                    self.sp -= spread.len();
                    for (i, value) in spread.iter().enumerate() {
                        self.stack[self.sp + i] = value.clone();
                    }
                    argc = spread.len();
                    fun = new_fun;
                }
                Value::Function(Function::CallCc) => {
                    if argc != 1 {
                        return self.catch(
                            QuillError::argument(format!(
                                "callcc expected 1 argument, got {}",
                                argc
                            )),
                            env,
                        );
                    }
                    let new_fun = self.stack[self.sp].clone();
                    let continuation = Continuation {
                        code: Some(code.clone()),
                        pc: saved_pc,
                        stack: self.stack[self.sp + 1..].to_vec(),
                        frame: Some(env.clone()),
                    };
                    self.stack[self.sp] =
                        Value::Function(Function::Continuation(Arc::new(continuation)));
                    fun = new_fun;
                }
                Value::Function(Function::Continuation(cont)) => {
                    if argc != 1 {
                        return self.catch(
                            QuillError::argument(format!(
                                "#[continuation] expected 1 argument, got {}",
                                argc
                            )),
                            env,
                        );
                    }
                    let arg = self.stack[self.sp].clone();
                    let new_sp = self.stack.len() - cont.stack.len();
                    if new_sp == 0 {
                        return Err(QuillError::message("stack overflow"));
                    }
                    self.stack[new_sp..].clone_from_slice(&cont.stack);
                    self.sp = new_sp - 1;
                    self.stack[self.sp] = arg;
                    match (&cont.code, &cont.frame) {
                        (Some(cont_code), Some(frame)) => {
                            return Ok(Flow::Continue {
                                code: cont_code.clone(),
                                pc: cont.pc,
                                env: frame.clone(),
                            });
                        }
                        _ => return Ok(Flow::Done(self.stack[self.sp].clone())),
                    }
                }
                Value::Function(Function::Spawn) => {
                    if argc < 1 {
                        return self.catch(
                            QuillError::argument("spawn expected at least 1 argument, got 0"),
                            env,
                        );
                    }
                    let fun_arg = self.stack[self.sp].clone();
                    let args = self.stack[self.sp + 1..self.sp + argc].to_vec();
                    if let Err(err) = spawn_task(fun_arg, &args) {
                        return self.catch(err, env);
                    }
                    self.sp = self.sp + argc - 1;
                    self.stack[self.sp] = Value::Null;
                    return Ok(Flow::Continue {
                        code: code.clone(),
                        pc: saved_pc,
                        env: env.clone(),
                    });
                }
                Value::Keyword(_) => {
                    if argc != 1 {
                        return self.catch(
                            QuillError::argument(format!(
                                "{} expected 1 argument, got {}",
                                write(&fun),
                                argc
                            )),
                            env,
                        );
                    }
                    match struct_get(&self.stack[self.sp], &fun) {
                        Ok(value) => {
                            self.stack[self.sp] = value;
                            return Ok(Flow::Continue {
                                code: code.clone(),
                                pc: saved_pc,
                                env: env.clone(),
                            });
                        }
                        Err(err) => return self.catch(err, env),
                    }
                }
                other => {
                    return self.catch(
                        QuillError::argument(format!("Not callable: {}", write(other))),
                        env,
                    );
                }
            }
        }
    }

    /// TAIL-CALL: like CALL, but the current activation is reused or
    /// bypassed.
    fn tailcall(
        &mut self,
        fun: Value,
        argc: usize,
        env: &Arc<Frame>,
    ) -> Result<Flow, QuillError> {
        let mut fun = fun;
        let mut argc = argc;
        loop {
            match &fun {
                Value::Function(Function::Closure(cl)) => {
                    let self_call = cl.code.defaults.is_none()
                        && env
                            .code
                            .as_ref()
                            .is_some_and(|current| Arc::ptr_eq(current, &cl.code));
                    if self_call {
                        if argc != cl.code.argc {
                            return self.catch(
                                QuillError::argument(format!(
                                    "Wrong number of args to {} (expected {}, got {})",
                                    function_to_string(&Function::Closure(cl.clone())),
                                    cl.code.argc,
                                    argc
                                )),
                                env,
                            );
                        }
                        {
                            let args = &self.stack[self.sp..self.sp + argc];
                            let mut elements = env.elements.write().unwrap();
                            elements.clear();
                            elements.extend_from_slice(args);
                        }
                        self.sp += argc;
                        return Ok(Flow::Continue {
                            code: cl.code.clone(),
                            pc: 0,
                            env: env.clone(),
                        });
                    }
                    let args = &self.stack[self.sp..self.sp + argc];
                    let elements = match frame_elements(
                        &function_to_string(&Function::Closure(cl.clone())),
                        &cl.code,
                        args,
                    ) {
                        Ok(elements) => elements,
                        Err(err) => return self.catch(err, env),
                    };
                    self.sp += argc;
                    let frame = Arc::new(Frame {
                        previous: env.previous.clone(),
                        parent: Some(cl.frame.clone()),
                        code: Some(cl.code.clone()),
                        saved_code: env.saved_code.clone(),
                        saved_pc: env.saved_pc,
                        elements: RwLock::new(elements),
                    });
                    return Ok(Flow::Continue {
                        code: cl.code.clone(),
                        pc: 0,
                        env: frame,
                    });
                }
                Value::Function(Function::Primitive(prim)) => {
                    let args = &self.stack[self.sp..self.sp + argc];
                    match call_primitive(prim, args) {
                        Ok(value) => {
                            self.sp = self.sp + argc - 1;
                            self.stack[self.sp] = value;
                            return self.return_from(env);
                        }
                        Err(err) => return self.catch(err, env),
                    }
                }
                Value::Function(Function::Apply) => {
                    if argc < 2 {
                        return self.catch(
                            QuillError::argument(format!(
                                "apply expected at least 2 arguments, got {}",
                                argc
                            )),
                            env,
                        );
                    }
                    let new_fun = self.stack[self.sp].clone();
                    let last = self.stack[self.sp + argc - 1].clone();
                    let Value::List(last) = last else {
                        return self.catch(
                            QuillError::argument(
                                "apply expected its last argument to be a <list>",
                            ),
                            env,
                        );
                    };
                    let mut arglist = last;
                    for i in (1..argc - 1).rev() {
                        arglist = List::cons(self.stack[self.sp + i].clone(), arglist);
                    }
                    self.sp += argc;
                    let spread = arglist.to_vec();
                    if spread.len() > self.sp {
                        return Err(QuillError::message("stack overflow"));
                    }
                    self.sp -= spread.len();
                    for (i, value) in spread.iter().enumerate() {
                        self.stack[self.sp + i] = value.clone();
                    }
                    argc = spread.len();
                    fun = new_fun;
                }
                Value::Function(Function::CallCc) => {
                    if argc != 1 {
                        return self.catch(
                            QuillError::argument(format!(
                                "callcc expected 1 argument, got {}",
                                argc
                            )),
                            env,
                        );
                    }
                    let new_fun = self.stack[self.sp].clone();
                    let continuation = Continuation {
                        code: env.saved_code.clone(),
                        pc: env.saved_pc,
                        stack: self.stack[self.sp..].to_vec(),
                        frame: env.previous.clone(),
                    };
                    self.stack[self.sp] =
                        Value::Function(Function::Continuation(Arc::new(continuation)));
                    fun = new_fun;
                }
                Value::Function(Function::Continuation(cont)) => {
                    if argc != 1 {
                        return self.catch(
                            QuillError::argument(format!(
                                "#[continuation] expected 1 argument, got {}",
                                argc
                            )),
                            env,
                        );
                    }
                    let arg = self.stack[self.sp].clone();
                    let new_sp = self.stack.len() - cont.stack.len();
                    if new_sp == 0 {
                        return Err(QuillError::message("stack overflow"));
                    }
                    self.stack[new_sp..].clone_from_slice(&cont.stack);
                    self.sp = new_sp - 1;
                    self.stack[self.sp] = arg;
                    match (&cont.code, &cont.frame) {
                        (Some(cont_code), Some(frame)) => {
                            return Ok(Flow::Continue {
                                code: cont_code.clone(),
                                pc: cont.pc,
                                env: frame.clone(),
                            });
                        }
                        _ => return Ok(Flow::Done(self.stack[self.sp].clone())),
                    }
                }
                Value::Function(Function::Spawn) => {
                    if argc < 1 {
                        return self.catch(
                            QuillError::argument("spawn expected at least 1 argument, got 0"),
                            env,
                        );
                    }
                    let fun_arg = self.stack[self.sp].clone();
                    let args = self.stack[self.sp + 1..self.sp + argc].to_vec();
                    if let Err(err) = spawn_task(fun_arg, &args) {
                        return self.catch(err, env);
                    }
                    self.sp = self.sp + argc - 1;
                    self.stack[self.sp] = Value::Null;
                    return self.return_from(env);
                }
                Value::Keyword(_) => {
                    if argc != 1 {
                        return self.catch(
                            QuillError::argument(format!(
                                "{} expected 1 argument, got {}",
                                write(&fun),
                                argc
                            )),
                            env,
                        );
                    }
                    match struct_get(&self.stack[self.sp], &fun) {
                        Ok(value) => {
                            self.stack[self.sp] = value;
                            return self.return_from(env);
                        }
                        Err(err) => return self.catch(err, env),
                    }
                }
                other => {
                    return self.catch(
                        QuillError::argument(format!("Not callable: {}", write(other))),
                        env,
                    );
                }
            }
        }
    }

    /// RETURN semantics after a value has been placed on the stack top.
    fn return_from(&mut self, env: &Arc<Frame>) -> Result<Flow, QuillError> {
        match (&env.previous, &env.saved_code) {
            (None, _) => Ok(Flow::Done(self.stack[self.sp].clone())),
            (Some(previous), Some(saved)) => Ok(Flow::Continue {
                code: saved.clone(),
                pc: env.saved_pc,
                env: previous.clone(),
            }),
            (Some(_), None) => Err(QuillError::message("frame missing resume point")),
        }
    }

    /// The catch path: give the error to a 1-argument `*top-handler*`
    /// closure, whose return value becomes the program result; otherwise
    /// propagate with the frame's name attached.
    fn catch(&mut self, err: QuillError, env: &Arc<Frame>) -> Result<Flow, QuillError> {
        if err.is_interrupt() {
            return Err(err.with_context(frame_context(env)));
        }
        if let Some(Value::Function(Function::Closure(handler))) =
            globals::get_global(intern("*top-handler*"))
        {
            if handler.code.argc == 1 && handler.code.defaults.is_none() {
                let errval = err.to_value();
                self.sp = self.stack.len() - 1;
                self.stack[self.sp] = errval.clone();
                let frame = Arc::new(Frame {
                    previous: None,
                    parent: Some(handler.frame.clone()),
                    code: Some(handler.code.clone()),
                    saved_code: None,
                    saved_pc: 0,
                    elements: RwLock::new(vec![errval]),
                });
                return Ok(Flow::Continue {
                    code: handler.code.clone(),
                    pc: 0,
                    env: frame,
                });
            }
        }
        Err(err.with_context(frame_context(env)))
    }
}

/// Package a closure and arguments into a task on its own thread with an
/// independent VM. The caller continues immediately.
fn spawn_task(fun: Value, args: &[Value]) -> Result<(), QuillError> {
    let Value::Function(Function::Closure(cl)) = &fun else {
        return Err(QuillError::argument(format!(
            "Bad function for spawn: {}",
            write(&fun)
        )));
    };
    let elements = frame_elements(
        &function_to_string(&Function::Closure(cl.clone())),
        &cl.code,
        args,
    )?;
    let code = cl.code.clone();
    let frame = Arc::new(Frame {
        previous: None,
        parent: Some(cl.frame.clone()),
        code: Some(code.clone()),
        saved_code: None,
        saved_pc: 0,
        elements: RwLock::new(elements),
    });
    std::thread::spawn(move || {
        let mut vm = Vm::new(DEFAULT_STACK_SIZE);
        let _ = vm.run(code, frame);
    });
    Ok(())
}
