//! The primitive library and its registry. Primitives declare their
//! signatures (result type, argument types, rest/optional/keyword shapes) so
//! the VM can check calls before the host function runs.

use std::sync::{Arc, Mutex, Once};

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{error_text, QuillError};
use crate::globals::{self, define_global};
use crate::list::List;
use crate::reader::{self, KeyPolicy};
use crate::symbols::{self, intern, sym_name, Sym};
use crate::value::{
    self, flatten, instance, struct_from_values, struct_get, struct_keys, struct_values,
    to_character, to_list, to_string_value, to_struct, to_vector, types, Function, Primitive,
    StructKey, Value,
};
use crate::vm::compiler::compile;
use crate::writer;

fn signature_from_types(result: Sym, args: &[Sym], rest: Option<Sym>) -> String {
    let mut sig = String::from("(");
    for (i, t) in args.iter().enumerate() {
        if i > 0 {
            sig.push(' ');
        }
        sig.push_str(&sym_name(*t));
    }
    if let Some(rest) = rest {
        if sig.len() > 1 {
            sig.push(' ');
        }
        sig.push_str(&sym_name(rest));
        sig.push('*');
    }
    sig.push_str(") ");
    sig.push_str(&sym_name(result));
    sig
}

fn primitive(
    name: &str,
    fun: value::PrimitiveImpl,
    result: Sym,
    args: Vec<Sym>,
    rest: Option<Sym>,
    defaults: Option<Vec<Value>>,
    keys: Option<Vec<Sym>>,
) -> Value {
    let mut argc = args.len();
    if let Some(defaults) = &defaults {
        debug_assert!(defaults.len() <= argc, "more defaults than args: {}", name);
        if let Some(keys) = &keys {
            debug_assert_eq!(keys.len(), defaults.len(), "keys/defaults mismatch: {}", name);
        }
        argc -= defaults.len();
    } else {
        debug_assert!(keys.is_none(), "keys require defaults: {}", name);
    }
    let signature = signature_from_types(result, &args, rest);
    Value::Function(Function::Primitive(Arc::new(Primitive {
        name: name.to_string(),
        fun,
        signature,
        argc,
        result,
        args,
        rest,
        defaults,
        keys,
    })))
}

fn define_primitive(name: &str, prim: Value) {
    globals::warn_if_redefining(name);
    define_global(name, prim);
}

/// Register a primitive with fixed typed arguments.
fn define_function(name: &str, fun: value::PrimitiveImpl, result: Sym, args: &[Sym]) {
    define_primitive(
        name,
        primitive(name, fun, result, args.to_vec(), None, None, None),
    );
}

/// Register a primitive whose trailing arguments all have the rest type.
fn define_function_rest_args(
    name: &str,
    fun: value::PrimitiveImpl,
    result: Sym,
    rest: Sym,
    args: &[Sym],
) {
    define_primitive(
        name,
        primitive(
            name,
            fun,
            result,
            args.to_vec(),
            Some(rest),
            Some(Vec::new()),
            None,
        ),
    );
}

/// Register a primitive with optional arguments filled from defaults.
fn define_function_optional_args(
    name: &str,
    fun: value::PrimitiveImpl,
    result: Sym,
    args: &[Sym],
    defaults: Vec<Value>,
) {
    define_primitive(
        name,
        primitive(name, fun, result, args.to_vec(), None, Some(defaults), None),
    );
}

/// Register a primitive taking keyword arguments.
fn define_function_key_args(
    name: &str,
    fun: value::PrimitiveImpl,
    result: Sym,
    args: &[Sym],
    defaults: Vec<Value>,
    keys: &[&str],
) {
    let keys = keys.iter().map(|k| intern(k)).collect();
    define_primitive(
        name,
        primitive(
            name,
            fun,
            result,
            args.to_vec(),
            None,
            Some(defaults),
            Some(keys),
        ),
    );
}

/// Register a primitive macro expander.
fn define_macro(name: &str, fun: value::PrimitiveImpl) {
    let sym = intern(name);
    if globals::get_macro(sym).is_some() {
        eprintln!(
            "{} redefining macro {}",
            crate::error::WARN_TAG,
            name
        );
    }
    let prim = primitive(name, fun, types::any(), vec![types::any()], None, None, None);
    globals::def_macro(sym, prim);
}

static INIT: Once = Once::new();

/// Install the primitive library. Idempotent.
pub fn init() {
    INIT.call_once(install);
}

fn install() {
    define_macro("quasiquote", prim_quasiquote);
    define_macro("let", prim_let);
    define_macro("letrec", prim_letrec);
    define_macro("cond", prim_cond);

    define_global("apply", Value::Function(Function::Apply));
    define_global("callcc", Value::Function(Function::CallCc));
    define_global("spawn", Value::Function(Function::Spawn));

    define_function("type", prim_type, types::type_(), &[types::any()]);
    define_function("eval", prim_eval, types::any(), &[types::any()]);
    define_function("compile", prim_compile, types::code(), &[types::any()]);
    define_function("load", prim_load, types::string(), &[types::string()]);
    define_function("exit", prim_exit, types::null(), &[types::number()]);
    define_function_rest_args("throw", prim_throw, types::null(), types::any(), &[types::any()]);

    define_function("+", prim_add, types::number(), &[types::number(), types::number()]);
    define_function("-", prim_sub, types::number(), &[types::number(), types::number()]);
    define_function("*", prim_mul, types::number(), &[types::number(), types::number()]);
    define_function("/", prim_div, types::number(), &[types::number(), types::number()]);
    define_function("=", prim_num_equal, types::boolean(), &[types::number(), types::number()]);
    define_function("<", prim_num_less, types::boolean(), &[types::number(), types::number()]);
    define_function("<=", prim_num_less_equal, types::boolean(), &[types::number(), types::number()]);
    define_function(">", prim_num_greater, types::boolean(), &[types::number(), types::number()]);
    define_function(">=", prim_num_greater_equal, types::boolean(), &[types::number(), types::number()]);
    define_function("inc", prim_inc, types::number(), &[types::number()]);
    define_function("dec", prim_dec, types::number(), &[types::number()]);
    define_function("&", prim_bit_and, types::number(), &[types::number(), types::number()]);
    define_function("|", prim_bit_or, types::number(), &[types::number(), types::number()]);
    define_function("^", prim_bit_xor, types::number(), &[types::number(), types::number()]);
    define_function("<<", prim_shift_left, types::number(), &[types::number(), types::number()]);
    define_function(">>", prim_shift_right, types::number(), &[types::number(), types::number()]);
    define_function("round", prim_round, types::number(), &[types::number()]);
    define_function("ceil", prim_ceil, types::number(), &[types::number()]);
    define_function("floor", prim_floor, types::number(), &[types::number()]);
    define_function("log", prim_log, types::number(), &[types::number()]);
    define_function("sin", prim_sin, types::number(), &[types::number()]);
    define_function("cos", prim_cos, types::number(), &[types::number()]);
    define_function_optional_args(
        "random",
        prim_random,
        types::number(),
        &[types::number(), types::number()],
        vec![Value::number(0.0), Value::number(1.0)],
    );
    define_function("random-seed!", prim_random_seed, types::null(), &[types::number()]);

    define_function("cons", prim_cons, types::list(), &[types::any(), types::list()]);
    define_function("car", prim_car, types::any(), &[types::list()]);
    define_function("cdr", prim_cdr, types::list(), &[types::list()]);
    define_function_rest_args("list", prim_list, types::list(), types::any(), &[]);
    define_function_rest_args("concat", prim_concat, types::list(), types::list(), &[]);
    define_function("reverse", prim_reverse, types::list(), &[types::list()]);
    define_function("flatten", prim_flatten, types::list(), &[types::list()]);
    define_function("length", prim_length, types::number(), &[types::any()]);
    define_function("to-list", prim_to_list, types::list(), &[types::any()]);

    define_function_rest_args("string", prim_string, types::string(), types::any(), &[]);
    define_function("to-string", prim_to_string, types::string(), &[types::any()]);
    define_function("split", prim_split, types::list(), &[types::string(), types::string()]);
    define_function("reverse-string", prim_reverse_string, types::string(), &[types::string()]);
    define_function("intern", prim_intern, types::any(), &[types::string()]);
    define_function_rest_args("symbol", prim_symbol, types::symbol(), types::any(), &[types::any()]);
    define_function("to-symbol", prim_to_symbol, types::symbol(), &[types::any()]);
    define_function("to-keyword", prim_to_keyword, types::keyword(), &[types::any()]);
    define_function("keyword-name", prim_keyword_name, types::symbol(), &[types::keyword()]);
    define_function("type-name", prim_type_name, types::symbol(), &[types::type_()]);
    define_function("to-char", prim_to_char, types::character(), &[types::any()]);

    define_function_rest_args("struct", prim_struct, types::struct_(), types::any(), &[]);
    define_function("get", prim_get, types::any(), &[types::any(), types::any()]);
    define_function("has?", prim_has, types::boolean(), &[types::any(), types::any()]);
    define_function("put", prim_put, types::struct_(), &[types::struct_(), types::any(), types::any()]);
    define_function("unput", prim_unput, types::struct_(), &[types::struct_(), types::any()]);
    define_function("keys", prim_keys, types::list(), &[types::any()]);
    define_function("values", prim_values, types::list(), &[types::any()]);
    define_function("to-struct", prim_to_struct, types::struct_(), &[types::any()]);
    define_function_rest_args("vector", prim_vector, types::vector(), types::any(), &[]);
    define_function("to-vector", prim_to_vector, types::vector(), &[types::any()]);
    define_function("instance", prim_instance, types::any(), &[types::type_(), types::any()]);

    define_function("not", prim_not, types::boolean(), &[types::any()]);
    define_function("null?", prim_is_null, types::boolean(), &[types::any()]);
    define_function("boolean?", prim_is_boolean, types::boolean(), &[types::any()]);
    define_function("number?", prim_is_number, types::boolean(), &[types::any()]);
    define_function("int?", prim_is_int, types::boolean(), &[types::any()]);
    define_function("float?", prim_is_float, types::boolean(), &[types::any()]);
    define_function("char?", prim_is_char, types::boolean(), &[types::any()]);
    define_function("string?", prim_is_string, types::boolean(), &[types::any()]);
    define_function("symbol?", prim_is_symbol, types::boolean(), &[types::any()]);
    define_function("keyword?", prim_is_keyword, types::boolean(), &[types::any()]);
    define_function("type?", prim_is_type, types::boolean(), &[types::any()]);
    define_function("list?", prim_is_list, types::boolean(), &[types::any()]);
    define_function("vector?", prim_is_vector, types::boolean(), &[types::any()]);
    define_function("struct?", prim_is_struct, types::boolean(), &[types::any()]);
    define_function("function?", prim_is_function, types::boolean(), &[types::any()]);
    define_function("code?", prim_is_code, types::boolean(), &[types::any()]);
    define_function("error?", prim_is_error, types::boolean(), &[types::any()]);
    define_function("error-data", prim_error_data, types::any(), &[types::error()]);
    define_function("empty?", prim_is_empty, types::boolean(), &[types::any()]);
    define_function("equal?", prim_equal, types::boolean(), &[types::any(), types::any()]);
    define_function("identical?", prim_identical, types::boolean(), &[types::any(), types::any()]);
    define_function("defined?", prim_defined, types::boolean(), &[types::symbol()]);

    define_function_rest_args("print", prim_print, types::null(), types::any(), &[]);
    define_function_rest_args("println", prim_println, types::null(), types::any(), &[]);
    define_function("write", prim_write, types::string(), &[types::any()]);
    define_function("pretty", prim_pretty, types::string(), &[types::any()]);
    define_function_key_args(
        "read",
        prim_read,
        types::any(),
        &[types::string(), types::any()],
        vec![Value::Type(types::any())],
        &["keys:"],
    );
    define_function_key_args(
        "read-all",
        prim_read_all,
        types::list(),
        &[types::string(), types::any()],
        vec![Value::Type(types::any())],
        &["keys:"],
    );
    define_function_key_args(
        "write-json",
        prim_write_json,
        types::string(),
        &[types::any(), types::any()],
        vec![Value::Boolean(false)],
        &["pretty:"],
    );
    define_function("slurp", prim_slurp, types::string(), &[types::string()]);
    define_function("spit", prim_spit, types::null(), &[types::string(), types::string()]);
}

fn prim_quasiquote(args: &[Value]) -> Result<Value, QuillError> {
    crate::expand::expand_quasiquote(&args[0])
}

fn prim_let(args: &[Value]) -> Result<Value, QuillError> {
    crate::expand::expand_let(&args[0])
}

fn prim_letrec(args: &[Value]) -> Result<Value, QuillError> {
    crate::expand::expand_letrec(&args[0])
}

fn prim_cond(args: &[Value]) -> Result<Value, QuillError> {
    crate::expand::expand_cond(&args[0])
}

fn prim_type(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Type(args[0].type_sym()))
}

fn prim_eval(args: &[Value]) -> Result<Value, QuillError> {
    crate::runtime::eval(&args[0])
}

fn prim_compile(args: &[Value]) -> Result<Value, QuillError> {
    let expanded = crate::expand::macroexpand(&args[0])?;
    Ok(Value::Code(compile(&expanded)?))
}

fn prim_load(args: &[Value]) -> Result<Value, QuillError> {
    let name = args[0].as_string()?;
    crate::runtime::load(&name)?;
    Ok(args[0].clone())
}

fn prim_exit(args: &[Value]) -> Result<Value, QuillError> {
    std::process::exit(args[0].as_int()? as i32);
}

/// `(throw tag: data…)` raises an error with the given payload; a bare error
/// value re-raises it.
fn prim_throw(args: &[Value]) -> Result<Value, QuillError> {
    if let Value::Error(_) = &args[0] {
        if args.len() == 1 {
            return Err(QuillError::from_value(&args[0]));
        }
    }
    let (tag, rest) = match &args[0] {
        Value::Keyword(sym) => (*sym, &args[1..]),
        _ => (intern("error:"), args),
    };
    Err(QuillError::raise(
        tag,
        vec![Value::string(error_text(rest))],
    ))
}

fn prim_add(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()? + args[1].as_number()?))
}

fn prim_sub(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()? - args[1].as_number()?))
}

fn prim_mul(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()? * args[1].as_number()?))
}

fn prim_div(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()? / args[1].as_number()?))
}

fn prim_num_equal(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(value::number_equal(
        args[0].as_number()?,
        args[1].as_number()?,
    )))
}

fn prim_num_less(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].as_number()? < args[1].as_number()?))
}

fn prim_num_less_equal(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].as_number()? <= args[1].as_number()?))
}

fn prim_num_greater(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].as_number()? > args[1].as_number()?))
}

fn prim_num_greater_equal(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].as_number()? >= args[1].as_number()?))
}

fn prim_inc(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()? + 1.0))
}

fn prim_dec(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()? - 1.0))
}

fn prim_bit_and(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number((args[0].as_int()? & args[1].as_int()?) as f64))
}

fn prim_bit_or(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number((args[0].as_int()? | args[1].as_int()?) as f64))
}

fn prim_bit_xor(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number((args[0].as_int()? ^ args[1].as_int()?) as f64))
}

fn prim_shift_left(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(((args[0].as_int()?) << args[1].as_int()?) as f64))
}

fn prim_shift_right(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(((args[0].as_int()?) >> args[1].as_int()?) as f64))
}

fn prim_round(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()?.round()))
}

fn prim_ceil(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()?.ceil()))
}

fn prim_floor(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()?.floor()))
}

fn prim_log(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()?.ln()))
}

fn prim_sin(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()?.sin()))
}

fn prim_cos(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::number(args[0].as_number()?.cos()))
}

// Seeded so runs are reproducible until random-seed! is called.
static RANDOM: Lazy<Mutex<StdRng>> = Lazy::new(|| Mutex::new(StdRng::seed_from_u64(1)));

fn prim_random(args: &[Value]) -> Result<Value, QuillError> {
    let min = args[0].as_number()?;
    let max = args[1].as_number()?;
    let unit: f64 = RANDOM.lock().unwrap().gen();
    Ok(Value::number(min + unit * (max - min)))
}

fn prim_random_seed(args: &[Value]) -> Result<Value, QuillError> {
    *RANDOM.lock().unwrap() = StdRng::seed_from_u64(args[0].as_int()? as u64);
    Ok(Value::Null)
}

fn prim_cons(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(List::cons(
        args[0].clone(),
        args[1].as_list()?.clone(),
    )))
}

fn prim_car(args: &[Value]) -> Result<Value, QuillError> {
    Ok(args[0].as_list()?.car())
}

fn prim_cdr(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(args[0].as_list()?.cdr()))
}

fn prim_list(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(List::from_values(args)))
}

fn prim_concat(args: &[Value]) -> Result<Value, QuillError> {
    let mut items = Vec::new();
    for arg in args {
        items.extend(arg.as_list()?.iter().cloned());
    }
    Ok(Value::List(List::from_vec(items)))
}

fn prim_reverse(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(args[0].as_list()?.reverse()))
}

fn prim_flatten(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(flatten(args[0].as_list()?)))
}

fn prim_length(args: &[Value]) -> Result<Value, QuillError> {
    let n = match &args[0] {
        Value::String(text) => text.chars().count(),
        Value::List(lst) => lst.len(),
        Value::Vector(els) => els.len(),
        Value::Struct(bindings) => bindings.len(),
        other => {
            return Err(QuillError::argument(format!(
                "length expected a <string>, <list>, <vector>, or <struct>, got a {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::number(n as f64))
}

fn prim_to_list(args: &[Value]) -> Result<Value, QuillError> {
    to_list(&args[0])
}

fn prim_string(args: &[Value]) -> Result<Value, QuillError> {
    let mut text = String::new();
    for arg in args {
        text.push_str(&writer::to_display_string(arg));
    }
    Ok(Value::string(text))
}

fn prim_to_string(args: &[Value]) -> Result<Value, QuillError> {
    to_string_value(&args[0])
}

fn prim_split(args: &[Value]) -> Result<Value, QuillError> {
    let text = args[0].as_string()?;
    let sep = args[1].as_string()?;
    let parts: Vec<Value> = text
        .split(sep.as_ref())
        .map(Value::string)
        .collect();
    Ok(Value::List(List::from_vec(parts)))
}

fn prim_reverse_string(args: &[Value]) -> Result<Value, QuillError> {
    let text = args[0].as_string()?;
    Ok(Value::string(text.chars().rev().collect::<String>()))
}

fn prim_intern(args: &[Value]) -> Result<Value, QuillError> {
    let name = args[0].as_string()?;
    if name.is_empty() {
        return Err(QuillError::argument("intern expected a non-empty <string>"));
    }
    Ok(value::interned_value(&name))
}

fn prim_symbol(args: &[Value]) -> Result<Value, QuillError> {
    let mut name = String::new();
    for arg in args {
        match arg {
            Value::String(text) => name.push_str(text),
            Value::Symbol(sym) => name.push_str(&sym_name(*sym)),
            other => {
                return Err(QuillError::argument(format!(
                    "symbol name component invalid: {}",
                    writer::write(other)
                )));
            }
        }
    }
    if name.is_empty() {
        return Err(QuillError::argument(
            "symbol expected at least 1 argument, got none",
        ));
    }
    Ok(Value::Symbol(intern(&name)))
}

fn prim_to_symbol(args: &[Value]) -> Result<Value, QuillError> {
    symbols::to_symbol(&args[0])
}

fn prim_to_keyword(args: &[Value]) -> Result<Value, QuillError> {
    symbols::to_keyword(&args[0])
}

fn prim_keyword_name(args: &[Value]) -> Result<Value, QuillError> {
    symbols::keyword_name(&args[0])
}

fn prim_type_name(args: &[Value]) -> Result<Value, QuillError> {
    symbols::type_name(&args[0])
}

fn prim_to_char(args: &[Value]) -> Result<Value, QuillError> {
    to_character(&args[0])
}

fn prim_struct(args: &[Value]) -> Result<Value, QuillError> {
    struct_from_values(args)
}

fn prim_get(args: &[Value]) -> Result<Value, QuillError> {
    struct_get(&args[0], &args[1])
}

fn prim_has(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(!struct_get(&args[0], &args[1])?.is_null()))
}

fn prim_put(args: &[Value]) -> Result<Value, QuillError> {
    let Value::Struct(bindings) = args[0].self_value() else {
        return Err(QuillError::argument(format!(
            "put expected a <struct>, got a {}",
            args[0].type_name()
        )));
    };
    let Some(key) = StructKey::from_value(&args[1]) else {
        return Err(QuillError::argument(format!(
            "Bad struct key: {}",
            writer::write(&args[1])
        )));
    };
    Ok(Value::Struct(bindings.update(key, args[2].clone())))
}

fn prim_unput(args: &[Value]) -> Result<Value, QuillError> {
    let Value::Struct(bindings) = args[0].self_value() else {
        return Err(QuillError::argument(format!(
            "unput expected a <struct>, got a {}",
            args[0].type_name()
        )));
    };
    let Some(key) = StructKey::from_value(&args[1]) else {
        return Err(QuillError::argument(format!(
            "Bad struct key: {}",
            writer::write(&args[1])
        )));
    };
    Ok(Value::Struct(bindings.without(&key)))
}

fn prim_keys(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(struct_keys(&args[0])?))
}

fn prim_values(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::List(struct_values(&args[0])?))
}

fn prim_to_struct(args: &[Value]) -> Result<Value, QuillError> {
    to_struct(&args[0])
}

fn prim_vector(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Vector(args.iter().cloned().collect()))
}

fn prim_to_vector(args: &[Value]) -> Result<Value, QuillError> {
    to_vector(&args[0])
}

fn prim_instance(args: &[Value]) -> Result<Value, QuillError> {
    instance(&args[0], args[1].clone())
}

fn prim_not(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].is_false()))
}

fn prim_is_null(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].is_null()))
}

fn prim_is_boolean(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Boolean(_))))
}

fn prim_is_number(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Number(_))))
}

fn prim_is_int(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].is_whole()))
}

fn prim_is_float(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(
        matches!(args[0], Value::Number(_)) && !args[0].is_whole(),
    ))
}

fn prim_is_char(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Character(_))))
}

fn prim_is_string(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::String(_))))
}

fn prim_is_symbol(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Symbol(_))))
}

fn prim_is_keyword(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Keyword(_))))
}

fn prim_is_type(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Type(_))))
}

fn prim_is_list(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::List(_))))
}

fn prim_is_vector(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Vector(_))))
}

fn prim_is_struct(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Struct(_))))
}

fn prim_is_function(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Function(_))))
}

fn prim_is_code(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Code(_))))
}

fn prim_is_error(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(matches!(args[0], Value::Error(_))))
}

fn prim_error_data(args: &[Value]) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Error(err) => Ok(err.data.clone()),
        other => Err(QuillError::argument(format!(
            "error-data expected an <error>, got a {}",
            other.type_name()
        ))),
    }
}

fn prim_is_empty(args: &[Value]) -> Result<Value, QuillError> {
    let empty = match &args[0] {
        Value::Null => true,
        Value::List(lst) => lst.is_empty(),
        Value::Vector(els) => els.is_empty(),
        Value::Struct(bindings) => bindings.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    };
    Ok(Value::Boolean(empty))
}

fn prim_equal(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].equal(&args[1])))
}

fn prim_identical(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::Boolean(args[0].identical(&args[1])))
}

fn prim_defined(args: &[Value]) -> Result<Value, QuillError> {
    match &args[0] {
        Value::Symbol(sym) => Ok(Value::Boolean(globals::is_defined(*sym))),
        other => Err(QuillError::argument(format!(
            "defined? expected a <symbol>, got a {}",
            other.type_name()
        ))),
    }
}

fn prim_print(args: &[Value]) -> Result<Value, QuillError> {
    for arg in args {
        print!("{}", writer::to_display_string(arg));
    }
    Ok(Value::Null)
}

fn prim_println(args: &[Value]) -> Result<Value, QuillError> {
    for arg in args {
        print!("{}", writer::to_display_string(arg));
    }
    println!();
    Ok(Value::Null)
}

fn prim_write(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::string(writer::write(&args[0])))
}

fn prim_pretty(args: &[Value]) -> Result<Value, QuillError> {
    Ok(Value::string(writer::pretty(&args[0])))
}

fn prim_read(args: &[Value]) -> Result<Value, QuillError> {
    let text = args[0].as_string()?;
    let policy = KeyPolicy::from_type(&args[1])?;
    reader::read(&text, policy)
}

fn prim_read_all(args: &[Value]) -> Result<Value, QuillError> {
    let text = args[0].as_string()?;
    let policy = KeyPolicy::from_type(&args[1])?;
    Ok(Value::List(List::from_vec(reader::read_all(&text, policy)?)))
}

fn prim_write_json(args: &[Value]) -> Result<Value, QuillError> {
    let pretty = !args[1].is_false() && !args[1].is_null();
    Ok(Value::string(writer::write_json(&args[0], pretty)?))
}

fn prim_slurp(args: &[Value]) -> Result<Value, QuillError> {
    let path = args[0].as_string()?;
    Ok(Value::string(crate::runtime::slurp(&path)?))
}

fn prim_spit(args: &[Value]) -> Result<Value, QuillError> {
    let path = args[0].as_string()?;
    let data = args[1].as_string()?;
    crate::runtime::spit(&path, &data)?;
    Ok(Value::Null)
}
