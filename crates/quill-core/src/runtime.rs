//! The top-level driver: the read–macroexpand–compile–execute loop, module
//! search over `*load-path*`, and the embedded system library addressed by
//! the `@/` prefix.

use std::path::Path;
use std::sync::Once;

use crate::error::QuillError;
use crate::expand::macroexpand;
use crate::globals::{define_global, get_global};
use crate::list::List;
use crate::options;
use crate::reader::{read_all, KeyPolicy};
use crate::symbols::{intern, sym_name, Sym};
use crate::value::Value;
use crate::vm::compiler::compile;
use crate::vm::exec::exec;
use crate::writer::write;

pub const SOURCE_EXT: &str = ".ql";
pub const COMPILED_EXT: &str = ".qlc";

/// The bundled read-only library root, addressed as `@/…`.
static SYS_LIB: &[(&str, &str)] = &[("quill.ql", include_str!("../lib/quill.ql"))];

static INIT: Once = Once::new();

/// Initialize the runtime: primitives, the default load path from
/// `QUILL_PATH` (or `.` plus `$HOME/lib/quill`), and the version global.
pub fn init() {
    INIT.call_once(|| {
        crate::primitives::init();
        let mut load_path = match std::env::var("QUILL_PATH") {
            Ok(path) if !path.is_empty() => path,
            _ => {
                let mut path = ".".to_string();
                if let Ok(home) = std::env::var("HOME") {
                    let homelib = Path::new(&home).join("lib/quill");
                    if homelib.is_dir() {
                        path.push(':');
                        path.push_str(&homelib.to_string_lossy());
                    }
                }
                path
            }
        };
        load_path.push_str(":@/");
        define_global("*load-path*", Value::string(load_path));
        define_global("*version*", Value::string(env!("CARGO_PKG_VERSION")));
    });
}

fn load_path_sym() -> Sym {
    intern("*load-path*")
}

/// Prepend a directory to `*load-path*`.
pub fn add_load_directory(dirname: &str) {
    let path = match get_global(load_path_sym()) {
        Some(Value::String(existing)) => format!("{}:{}", dirname, existing),
        _ => dirname.to_string(),
    };
    define_global("*load-path*", Value::string(path));
}

/// Expand a leading `~/` using `HOME`.
pub fn expand_file_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}

fn sys_lib_file(path: &str) -> Option<&'static str> {
    let name = path.strip_prefix("@/")?;
    SYS_LIB
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, text)| *text)
}

pub fn is_file_readable(path: &str) -> bool {
    if path.starts_with("@/") {
        return sys_lib_file(path).is_some();
    }
    Path::new(path).is_file()
}

pub fn is_directory_readable(path: &str) -> bool {
    if path.starts_with("@/") {
        return path == "@/";
    }
    Path::new(path).is_dir()
}

/// Read a whole file, including embedded library files, as a string.
pub fn slurp(path: &str) -> Result<String, QuillError> {
    let path = expand_file_path(path);
    if let Some(text) = sys_lib_file(&path) {
        return Ok(text.to_string());
    }
    std::fs::read_to_string(&path)
        .map_err(|e| QuillError::io(format!("cannot read {}: {}", path, e)))
}

pub fn spit(path: &str, data: &str) -> Result<(), QuillError> {
    let path = expand_file_path(path);
    std::fs::write(&path, data).map_err(|e| QuillError::io(format!("cannot write {}: {}", path, e)))
}

/// Search `*load-path*` for a module: the compiled artifact first, then the
/// source file.
pub fn find_module_by_name(module_name: &str) -> Result<String, QuillError> {
    if module_name == "quill" || module_name == "quill.ql" {
        return Ok("@/quill.ql".to_string());
    }
    let load_path = match get_global(load_path_sym()) {
        Some(Value::String(path)) => path.to_string(),
        _ => ".".to_string(),
    };
    let (name, lname) = match module_name.strip_suffix(SOURCE_EXT) {
        Some(stem) => (
            module_name.to_string(),
            format!("{}{}", stem, COMPILED_EXT),
        ),
        None => (
            format!("{}{}", module_name, SOURCE_EXT),
            format!("{}{}", module_name, COMPILED_EXT),
        ),
    };
    for dirname in load_path.split(':') {
        for candidate in [&lname, &name] {
            let filename = if dirname.ends_with('/') {
                format!("{}{}", dirname, candidate)
            } else {
                format!("{}/{}", dirname, candidate)
            };
            if is_file_readable(&filename) {
                return Ok(filename);
            }
        }
    }
    Err(QuillError::io(format!("Module not found: {}", module_name)))
}

/// A name with a dot is a direct file reference; anything else goes through
/// the module search.
pub fn find_module_file(name: &str) -> Result<String, QuillError> {
    if !name.contains('.') {
        return find_module_by_name(name);
    }
    if !is_file_readable(name) {
        return Err(QuillError::io(format!("Cannot read file: {}", name)));
    }
    Ok(name.to_string())
}

/// The VM's IMPORT opcode lands here.
pub fn import(sym: Sym) -> Result<(), QuillError> {
    load(&sym_name(sym))
}

pub fn load(name: &str) -> Result<(), QuillError> {
    if options::verbose() {
        eprintln!("; [loading {}]", name);
    }
    let file = find_module_file(name)?;
    load_file(&file)
}

pub fn load_file(file: &str) -> Result<(), QuillError> {
    if options::verbose() {
        eprintln!("; loading file {}", file);
    }
    let text = slurp(file)?;
    for expr in read_all(&text, KeyPolicy::Any)? {
        eval(&expr)?;
    }
    Ok(())
}

/// Macroexpand, compile, and execute one top-level expression.
pub fn eval(expr: &Value) -> Result<Value, QuillError> {
    if options::debug() {
        eprintln!("; eval: {}", write(expr));
    }
    let expanded = macroexpand(expr)?;
    if options::debug() {
        eprintln!("; expanded to: {}", write(&expanded));
    }
    let code = compile(&expanded)?;
    if options::debug() {
        let text = code.decompile(true).replace('\n', "\n; ");
        eprintln!("; compiled to:\n;  {}", text);
    }
    exec(&code, Vec::new())
}

/// Read and evaluate every form in the source, returning the last result.
pub fn eval_source(src: &str) -> Result<Value, QuillError> {
    let mut result = Value::Null;
    for expr in read_all(src, KeyPolicy::Any)? {
        result = eval(&expr)?;
    }
    Ok(result)
}

/// Compile a file to its textual bytecode for `--compile`. Each form is also
/// executed so that macros and imports defined earlier in the file affect
/// the forms after them.
pub fn compile_file(name: &str) -> Result<String, QuillError> {
    let file = find_module_file(name)?;
    if options::verbose() {
        eprintln!("; compiling file {}", file);
    }
    let text = slurp(&file)?;
    let mut out = format!(";\n; code generated from {}\n;\n", file);
    for expr in read_all(&text, KeyPolicy::Any)? {
        if options::debug() {
            eprintln!("; compile: {}", write(&expr));
        }
        let expanded = macroexpand(&expr)?;
        let code = compile(&expanded)?;
        out.push_str(&code.decompile(true));
        out.push('\n');
        exec(&code, Vec::new())?;
    }
    Ok(out)
}

/// The reserved heads of the language, as completion and documentation
/// surfaces want them.
pub fn reserved_heads() -> Vec<Sym> {
    ["quote", "func", "if", "do", "var", "fn", "macro", "set!", "code", "import"]
        .iter()
        .map(|name| intern(name))
        .collect()
}

/// Convenience used by tests and embedders: initialize and evaluate.
pub fn init_and_eval(src: &str) -> Result<Value, QuillError> {
    init();
    eval_source(src)
}

/// Run files given on the command line; any error is fatal to the caller.
pub fn run_files(files: &[String]) -> Result<(), QuillError> {
    for file in files {
        load(file)?;
    }
    Ok(())
}

/// Evaluate a list value as a program body, used by embedders that build
/// forms programmatically.
pub fn eval_forms(forms: &List) -> Result<Value, QuillError> {
    let mut result = Value::Null;
    for expr in forms.iter() {
        result = eval(expr)?;
    }
    Ok(result)
}
