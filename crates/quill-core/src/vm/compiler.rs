//! The bytecode compiler. Works on macro-expanded values, tracking the
//! lexical environment (innermost frame first), tail position, and whether
//! the expression's result is discarded.

use std::sync::Arc;

use crate::error::QuillError;
use crate::globals;
use crate::list::List;
use crate::symbols::{intern, sym_name, Sym};
use crate::value::{number_equal, StructKeyKind, Value};
use crate::vm::code::Code;
use crate::writer::write;

/// Compile an expanded expression into a top-level thunk. The expression is
/// in tail position: the thunk delivers its value through the return of
/// whatever it tail-calls.
pub fn compile(expr: &Value) -> Result<Arc<Code>, QuillError> {
    let mut target = Code::new(0, None, None, "");
    compile_expr(&mut target, &[], expr, true, false, "")?;
    target.emit_return();
    Ok(Arc::new(target))
}

fn calculate_location(sym: Sym, env: &[Vec<Sym>]) -> Option<(usize, usize)> {
    for (i, frame) in env.iter().enumerate() {
        for (j, bound) in frame.iter().enumerate() {
            if *bound == sym {
                return Some((i, j));
            }
        }
    }
    None
}

/// Atoms and aggregates of atoms compile to a single constant load.
fn is_literal(expr: &Value) -> bool {
    match expr {
        Value::Symbol(_) => false,
        Value::List(lst) => lst.is_empty(),
        Value::Vector(els) => els.iter().all(is_literal),
        Value::Struct(bindings) => bindings.values().all(is_literal),
        _ => true,
    }
}

fn compile_expr(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &Value,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    match expr {
        Value::Keyword(_) | Value::Type(_) => compile_self_literal(target, expr, tail, ignore),
        Value::Symbol(sym) => compile_symbol(target, env, *sym, tail, ignore),
        Value::List(lst) => compile_list(target, env, lst, tail, ignore, context),
        Value::Vector(_) if !is_literal(expr) => {
            compile_vector(target, env, expr, tail, ignore, context)
        }
        Value::Struct(_) if !is_literal(expr) => {
            compile_struct(target, env, expr, tail, ignore, context)
        }
        _ => compile_self_literal(target, expr, tail, ignore),
    }
}

fn compile_self_literal(
    target: &mut Code,
    expr: &Value,
    tail: bool,
    ignore: bool,
) -> Result<(), QuillError> {
    if !ignore {
        target.emit_literal(expr);
        if tail {
            target.emit_return();
        }
    }
    Ok(())
}

fn compile_symbol(
    target: &mut Code,
    env: &[Vec<Sym>],
    sym: Sym,
    tail: bool,
    ignore: bool,
) -> Result<(), QuillError> {
    if globals::get_macro(sym).is_some() {
        return Err(QuillError::macro_error(format!(
            "Cannot use macro as a value: {}",
            sym_name(sym)
        )));
    }
    match calculate_location(sym, env) {
        Some((i, j)) => target.emit_local(i, j),
        None => target.emit_global(sym),
    }
    if ignore {
        target.emit_pop();
    } else if tail {
        target.emit_return();
    }
    Ok(())
}

fn compile_list(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &List,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    if expr.is_empty() {
        return compile_self_literal(target, &Value::List(expr.clone()), tail, ignore);
    }
    let lstlen = expr.len();
    let head = expr.car();
    if let Value::Symbol(sym) = &head {
        match sym_name(*sym).as_ref() {
            "quote" => return compile_quote(target, expr, tail, ignore, lstlen),
            "do" => return compile_sequence(target, env, &expr.cdr(), tail, ignore, context),
            "if" => {
                if lstlen == 3 || lstlen == 4 {
                    return compile_if_else(
                        target,
                        env,
                        &expr.cadr(),
                        &expr.caddr(),
                        &expr.cdddr(),
                        tail,
                        ignore,
                        context,
                    );
                }
                return Err(syntax_error(expr));
            }
            "var" => return compile_def(target, env, expr, tail, ignore, lstlen),
            "undef" => return compile_undef(target, expr, tail, ignore, lstlen),
            "macro" => return compile_macro(target, env, expr, tail, ignore, lstlen),
            "func" => {
                if lstlen < 3 {
                    return Err(syntax_error(expr));
                }
                let args = expr.cadr();
                let body = expr.cddr();
                return compile_fn(target, env, &args, &body, tail, ignore, context);
            }
            "set!" => return compile_set(target, env, expr, tail, ignore, context, lstlen),
            "code" => return target.load_ops(&expr.cdr()),
            "import" => return compile_import(target, &expr.cdr()),
            _ => {}
        }
    }
    let (head, args) = optimize_funcall(head, expr.cdr());
    compile_funcall(target, env, &head, &args, tail, ignore, context)
}

fn compile_quote(
    target: &mut Code,
    expr: &List,
    tail: bool,
    ignore: bool,
    lstlen: usize,
) -> Result<(), QuillError> {
    if lstlen != 2 {
        return Err(syntax_error(expr));
    }
    compile_self_literal(target, &expr.cadr(), tail, ignore)
}

fn compile_def(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &List,
    tail: bool,
    ignore: bool,
    lstlen: usize,
) -> Result<(), QuillError> {
    if lstlen < 3 {
        return Err(syntax_error(expr));
    }
    let Value::Symbol(sym) = expr.cadr() else {
        return Err(syntax_error(expr));
    };
    let value = expr.caddr();
    compile_expr(target, env, &value, false, false, &sym_name(sym))?;
    target.emit_def_global(sym);
    if ignore {
        target.emit_pop();
    } else if tail {
        target.emit_return();
    }
    Ok(())
}

fn compile_undef(
    target: &mut Code,
    expr: &List,
    tail: bool,
    ignore: bool,
    lstlen: usize,
) -> Result<(), QuillError> {
    if lstlen != 2 {
        return Err(syntax_error(expr));
    }
    let Value::Symbol(sym) = expr.cadr() else {
        return Err(syntax_error(expr));
    };
    target.emit_undef_global(sym);
    if !ignore {
        target.emit_literal(&Value::Symbol(sym));
        if tail {
            target.emit_return();
        }
    }
    Ok(())
}

fn compile_macro(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &List,
    tail: bool,
    ignore: bool,
    lstlen: usize,
) -> Result<(), QuillError> {
    if lstlen != 3 {
        return Err(syntax_error(expr));
    }
    let Value::Symbol(sym) = expr.cadr() else {
        return Err(syntax_error(expr));
    };
    compile_expr(target, env, &expr.caddr(), false, false, &sym_name(sym))?;
    target.emit_def_macro(sym);
    if ignore {
        target.emit_pop();
    } else if tail {
        target.emit_return();
    }
    Ok(())
}

fn compile_set(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &List,
    tail: bool,
    ignore: bool,
    context: &str,
    lstlen: usize,
) -> Result<(), QuillError> {
    if lstlen != 3 {
        return Err(syntax_error(expr));
    }
    let Value::Symbol(sym) = expr.cadr() else {
        return Err(syntax_error(expr));
    };
    compile_expr(target, env, &expr.caddr(), false, false, context)?;
    match calculate_location(sym, env) {
        Some((i, j)) => target.emit_set_local(i, j),
        None => target.emit_def_global(sym),
    }
    if ignore {
        target.emit_pop();
    } else if tail {
        target.emit_return();
    }
    Ok(())
}

fn compile_sequence(
    target: &mut Code,
    env: &[Vec<Sym>],
    exprs: &List,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    if exprs.is_empty() {
        return Err(syntax_error(&List::cons(
            Value::symbol("do"),
            exprs.clone(),
        )));
    }
    let mut rest = exprs.clone();
    while !rest.cdr().is_empty() {
        compile_expr(target, env, &rest.car(), false, true, context)?;
        rest = rest.cdr();
    }
    compile_expr(target, env, &rest.car(), tail, ignore, context)
}

/// Parse a parameter list and compile the function body into its own code
/// object, closing over the current environment.
fn compile_fn(
    target: &mut Code,
    env: &[Vec<Sym>],
    args: &Value,
    body: &List,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    let mut argc = 0usize;
    let mut syms: Vec<Sym> = Vec::new();
    let mut defaults: Option<Vec<Value>> = None;
    let mut keys: Option<Vec<Sym>> = None;

    match args {
        Value::Symbol(sym) => {
            // A bare symbol captures all actuals as a rest list.
            syms.push(*sym);
            defaults = Some(Vec::new());
        }
        _ => {
            let items: Vec<Value> = match args {
                Value::List(lst) => lst.to_vec(),
                Value::Vector(els) => els.iter().cloned().collect(),
                _ => return Err(QuillError::syntax(format!("bad parameter list: {}", write(args)))),
            };
            let mut rest = false;
            let mut idx = 0;
            while idx < items.len() {
                let item = &items[idx];
                match item {
                    Value::Vector(optionals) => {
                        if idx + 1 != items.len() {
                            return Err(QuillError::syntax(format!(
                                "bad parameter list: {}",
                                write(args)
                            )));
                        }
                        let mut defs = Vec::with_capacity(optionals.len());
                        for opt in optionals.iter() {
                            let (sym, def) = match opt {
                                Value::Symbol(sym) => (*sym, Value::Null),
                                Value::List(pair) => match pair.car() {
                                    Value::Symbol(sym) => (sym, pair.cadr()),
                                    _ => {
                                        return Err(QuillError::syntax(format!(
                                            "bad parameter list: {}",
                                            write(args)
                                        )));
                                    }
                                },
                                _ => {
                                    return Err(QuillError::syntax(format!(
                                        "bad parameter list: {}",
                                        write(args)
                                    )));
                                }
                            };
                            syms.push(sym);
                            defs.push(def);
                        }
                        defaults = Some(defs);
                        break;
                    }
                    Value::Struct(bindings) => {
                        if idx + 1 != items.len() {
                            return Err(QuillError::syntax(format!(
                                "bad parameter list: {}",
                                write(args)
                            )));
                        }
                        let mut defs = Vec::with_capacity(bindings.len());
                        let mut key_syms = Vec::with_capacity(bindings.len());
                        for (key, def) in bindings.iter() {
                            let sym = match key.kind {
                                StructKeyKind::Symbol => intern(&key.text),
                                StructKeyKind::Keyword => {
                                    intern(crate::symbols::keyword_name_text(&key.text))
                                }
                                _ => {
                                    return Err(QuillError::syntax(format!(
                                        "bad parameter list: {}",
                                        write(args)
                                    )));
                                }
                            };
                            syms.push(sym);
                            key_syms.push(sym);
                            defs.push(def.clone());
                        }
                        defaults = Some(defs);
                        keys = Some(key_syms);
                        break;
                    }
                    Value::Symbol(sym) if sym_name(*sym).as_ref() == "&" => {
                        rest = true;
                    }
                    Value::Symbol(sym) => {
                        if rest {
                            syms.push(*sym);
                            defaults = Some(Vec::new());
                            break;
                        }
                        argc += 1;
                        syms.push(*sym);
                    }
                    _ => {
                        return Err(QuillError::syntax(format!(
                            "bad parameter list: {}",
                            write(args)
                        )));
                    }
                }
                idx += 1;
            }
        }
    }

    let mut new_env: Vec<Vec<Sym>> = Vec::with_capacity(env.len() + 1);
    new_env.push(syms);
    new_env.extend(env.iter().cloned());

    let mut fn_code = Code::new(argc, defaults, keys, context);
    compile_sequence(&mut fn_code, &new_env, body, true, false, context)?;
    if !ignore {
        target.emit_closure(Arc::new(fn_code));
        if tail {
            target.emit_return();
        }
    }
    Ok(())
}

/// Rewrite `(+ x 1)` / `(+ 1 x)` / `(- x 1)` into `inc` / `dec` when the
/// other operand is not itself a number literal.
fn optimize_funcall(head: Value, args: List) -> (Value, List) {
    if args.len() != 2 {
        return (head, args);
    }
    let Value::Symbol(sym) = &head else {
        return (head, args);
    };
    let first = args.car();
    let second = args.cadr();
    let is_one = |v: &Value| matches!(v, Value::Number(f) if number_equal(*f, 1.0));
    let is_number = |v: &Value| matches!(v, Value::Number(_));
    match sym_name(*sym).as_ref() {
        "+" => {
            if is_one(&first) && !is_number(&second) {
                return (Value::symbol("inc"), List::from_values(&[second]));
            }
            if is_one(&second) && !is_number(&first) {
                return (Value::symbol("inc"), List::from_values(&[first]));
            }
            (head, args)
        }
        "-" => {
            if is_one(&second) && !is_number(&first) {
                return (Value::symbol("dec"), List::from_values(&[first]));
            }
            (head, args)
        }
        _ => (head, args),
    }
}

fn compile_funcall(
    target: &mut Code,
    env: &[Vec<Sym>],
    head: &Value,
    args: &List,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    let argc = args.len();
    compile_args(target, env, args, context)?;
    compile_expr(target, env, head, false, false, context)?;
    if tail {
        target.emit_tail_call(argc);
    } else {
        target.emit_call(argc);
        if ignore {
            target.emit_pop();
        }
    }
    Ok(())
}

/// Arguments are evaluated in reverse order so the first argument ends up on
/// top of the stack before the callee.
fn compile_args(
    target: &mut Code,
    env: &[Vec<Sym>],
    args: &List,
    context: &str,
) -> Result<(), QuillError> {
    if args.is_empty() {
        return Ok(());
    }
    compile_args(target, env, &args.cdr(), context)?;
    compile_expr(target, env, &args.car(), false, false, context)
}

#[allow(clippy::too_many_arguments)]
fn compile_if_else(
    target: &mut Code,
    env: &[Vec<Sym>],
    predicate: &Value,
    consequent: &Value,
    antecedent_optional: &List,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    let antecedent = if antecedent_optional.is_empty() {
        Value::Null
    } else {
        antecedent_optional.car()
    };
    compile_expr(target, env, predicate, false, false, context)?;
    let loc1 = target.emit_jump_false(0);
    compile_expr(target, env, consequent, tail, ignore, context)?;
    let loc2 = if tail { 0 } else { target.emit_jump(0) };
    target.set_jump_location(loc1);
    compile_expr(target, env, &antecedent, tail, ignore, context)?;
    if !tail {
        target.set_jump_location(loc2);
    }
    Ok(())
}

fn compile_import(target: &mut Code, rest: &List) -> Result<(), QuillError> {
    if rest.len() != 1 {
        return Err(syntax_error(&List::cons(
            Value::symbol("import"),
            rest.clone(),
        )));
    }
    let Value::Symbol(sym) = rest.car() else {
        return Err(syntax_error(rest));
    };
    target.emit_import(sym);
    Ok(())
}

fn compile_vector(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &Value,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    let Value::Vector(els) = expr else {
        unreachable!()
    };
    for item in els.iter().rev() {
        compile_expr(target, env, item, false, false, context)?;
    }
    if !ignore {
        target.emit_vector(els.len());
        if tail {
            target.emit_return();
        }
    }
    Ok(())
}

fn compile_struct(
    target: &mut Code,
    env: &[Vec<Sym>],
    expr: &Value,
    tail: bool,
    ignore: bool,
    context: &str,
) -> Result<(), QuillError> {
    let Value::Struct(bindings) = expr else {
        unreachable!()
    };
    let mut vals = Vec::with_capacity(bindings.len() * 2);
    for (k, v) in bindings.iter() {
        vals.push(k.to_value());
        vals.push(v.clone());
    }
    for item in vals.iter().rev() {
        compile_expr(target, env, item, false, false, context)?;
    }
    if !ignore {
        target.emit_struct(vals.len());
        if tail {
            target.emit_return();
        }
    }
    Ok(())
}

fn syntax_error(expr: &List) -> QuillError {
    QuillError::syntax(write(&Value::List(expr.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read, KeyPolicy};

    fn compile_src(src: &str) -> String {
        let expr = read(src, KeyPolicy::Any).unwrap();
        let expanded = crate::expand::macroexpand(&expr).unwrap();
        compile(&expanded).unwrap().decompile(false)
    }

    #[test]
    fn increments_use_the_peephole() {
        assert!(compile_src("(+ x 1)").contains("(global inc)"));
        assert!(compile_src("(+ 1 x)").contains("(global inc)"));
        assert!(compile_src("(- x 1)").contains("(global dec)"));
    }

    #[test]
    fn literal_operands_are_not_peepholed() {
        assert!(compile_src("(+ 1 2)").contains("(global +)"));
        assert!(compile_src("(+ 1 1)").contains("(global +)"));
    }

    #[test]
    fn top_level_calls_are_tail_calls() {
        let text = compile_src("(+ 1 2)");
        assert!(text.contains("(tailcall 2)"));
        assert!(text.ends_with("(return))"));
    }

    #[test]
    fn literal_vectors_collapse_to_one_constant() {
        assert!(compile_src("[1 2 3]").starts_with("(code (literal [1 2 3])"));
        assert!(compile_src("[1 x]").contains("(vector 2)"));
    }
}
