//! The macro engine. Expansion rewrites a value bottom-up: special forms get
//! dedicated rewriters, user macros are invoked (closures on a compile-time
//! VM execution, primitives directly) and their results re-expanded to a
//! fixed point. Expansion depth is bounded so a macro that returns itself
//! fails instead of hanging.

use crate::error::QuillError;
use crate::globals::{self, MacroRecord};
use crate::list::List;
use crate::symbols::{sym_name, Sym};
use crate::value::{Function, Value};
use crate::vm::exec::exec_compile_time;
use crate::writer::write;

const MAX_EXPANSION_DEPTH: usize = 200;

/// Expand all macros in the value and return the result.
pub fn macroexpand(expr: &Value) -> Result<Value, QuillError> {
    expand_value(expr, 0)
}

fn expand_value(expr: &Value, depth: usize) -> Result<Value, QuillError> {
    match expr {
        Value::List(lst) if !lst.is_empty() => expand_list(lst, depth),
        _ => Ok(expr.clone()),
    }
}

fn expand_list(expr: &List, depth: usize) -> Result<Value, QuillError> {
    if expr.is_empty() {
        return Ok(Value::List(expr.clone()));
    }
    let head = expr.car();
    match &head {
        Value::Symbol(sym) => {
            if let Some(result) = expand_special(*sym, expr, depth)? {
                return Ok(result);
            }
            let tail = expand_sequence(&expr.cdr(), depth)?;
            Ok(Value::List(List::cons(head, tail)))
        }
        Value::List(inner) if !inner.is_empty() => {
            let expanded_head = expand_list(inner, depth)?;
            let tail = expand_sequence(&expr.cdr(), depth)?;
            Ok(Value::List(List::cons(expanded_head, tail)))
        }
        _ => {
            let tail = expand_sequence(&expr.cdr(), depth)?;
            Ok(Value::List(List::cons(head, tail)))
        }
    }
}

fn expand_sequence(seq: &List, depth: usize) -> Result<List, QuillError> {
    let mut items = Vec::with_capacity(seq.len());
    for item in seq.iter() {
        match item {
            Value::List(lst) if !lst.is_empty() => items.push(expand_list(lst, depth)?),
            other => items.push(other.clone()),
        }
    }
    Ok(List::from_vec(items))
}

/// Rewriters for the reserved heads; a macro-table hit for any other symbol.
/// None means the head is an ordinary call.
fn expand_special(sym: Sym, expr: &List, depth: usize) -> Result<Option<Value>, QuillError> {
    let name = sym_name(sym);
    let result = match name.as_ref() {
        "quote" => Some(Value::List(expr.clone())),
        "do" => Some(Value::List(expand_sequence(expr, depth)?)),
        "if" => Some(expand_if(expr, depth)?),
        "var" => Some(expand_var(expr, depth)?),
        "undef" => Some(expand_undef(expr)?),
        "fn" => Some(expand_fn(expr, depth)?),
        "macro" => Some(expand_defmacro(expr, depth)?),
        "func" => Some(expand_func(expr, depth)?),
        "set!" => Some(expand_set(expr, depth)?),
        "code" => Some(Value::List(expr.clone())),
        "import" => Some(Value::List(expr.clone())),
        _ => match globals::get_macro(sym) {
            Some(record) => Some(expand_macro(&record, &Value::List(expr.clone()), depth)?),
            None => None,
        },
    };
    Ok(result)
}

fn expand_macro(record: &MacroRecord, expr: &Value, depth: usize) -> Result<Value, QuillError> {
    if depth >= MAX_EXPANSION_DEPTH {
        return Err(QuillError::macro_error(format!(
            "macro expansion did not terminate: {}",
            sym_name(record.name)
        )));
    }
    let expanded = match &record.expander {
        Value::Function(Function::Closure(cl))
            if cl.code.argc == 1 && cl.code.defaults.is_none() =>
        {
            exec_compile_time(cl, expr.clone())?
        }
        Value::Function(Function::Primitive(prim)) => (prim.fun)(std::slice::from_ref(expr))?,
        other => {
            return Err(QuillError::macro_error(format!(
                "Bad macro expander function: {}",
                write(other)
            )));
        }
    };
    match &expanded {
        Value::List(_) => expand_value(&expanded, depth + 1),
        other => Ok(other.clone()),
    }
}

fn expand_if(expr: &List, depth: usize) -> Result<Value, QuillError> {
    match expr.len() {
        4 => {
            let tail = expand_sequence(&expr.cdr(), depth)?;
            Ok(Value::List(List::cons(expr.car(), tail)))
        }
        3 => {
            let padded = List::from_values(&[expr.cadr(), expr.caddr(), Value::Null]);
            let tail = expand_sequence(&padded, depth)?;
            Ok(Value::List(List::cons(expr.car(), tail)))
        }
        _ => Err(syntax_at(expr)),
    }
}

fn expand_undef(expr: &List) -> Result<Value, QuillError> {
    if expr.len() != 2 || !matches!(expr.cadr(), Value::Symbol(_)) {
        return Err(syntax_at(expr));
    }
    Ok(Value::List(expr.clone()))
}

/// `(var name value)`; a list value is expanded in place.
fn expand_var(expr: &List, depth: usize) -> Result<Value, QuillError> {
    if expr.len() != 3 {
        return Err(syntax_at(expr));
    }
    let name = expr.cadr();
    if !matches!(name, Value::Symbol(_)) {
        return Err(syntax_at(expr));
    }
    let body = expr.caddr();
    let value = match &body {
        Value::List(lst) if !lst.is_empty() => expand_list(lst, depth)?,
        other => other.clone(),
    };
    Ok(Value::List(List::from_values(&[expr.car(), name, value])))
}

/// `(fn name args body…)` -> `(var name (func args body…))`.
fn expand_fn(expr: &List, depth: usize) -> Result<Value, QuillError> {
    if expr.len() < 4 {
        return Err(syntax_at(expr));
    }
    let name = expr.cadr();
    if !matches!(name, Value::Symbol(_)) {
        return Err(syntax_at(expr));
    }
    let args = expr.caddr();
    let body = expand_sequence(&expr.cdddr(), depth)?;
    let func = expand_func_form(&args, &body, depth)?;
    Ok(Value::List(List::from_values(&[
        Value::symbol("var"),
        name,
        func,
    ])))
}

/// `(macro name args body…)` -> the one-argument expander wrapper applied to
/// the call's cdr.
fn expand_defmacro(expr: &List, depth: usize) -> Result<Value, QuillError> {
    let name = expr.cadr();
    if !matches!(name, Value::Symbol(_)) {
        return Err(syntax_at(expr));
    }
    let inner = if expr.len() >= 4 {
        let args = expr.caddr();
        let body = expand_sequence(&expr.cdddr(), depth)?;
        expand_func_form(&args, &body, depth)?
    } else if expr.len() == 3 && head_is(&expr.caddr(), "func") {
        // The expander func written out explicitly: (macro name (func args body…)).
        let Value::List(func_form) = expr.caddr() else {
            return Err(syntax_at(expr));
        };
        expand_func(&func_form, depth)?
    } else if expr.len() == 3 {
        // An arbitrary expander expression; compiled as given.
        let value = match expr.caddr() {
            Value::List(lst) if !lst.is_empty() => expand_list(&lst, depth)?,
            other => other,
        };
        return Ok(Value::List(List::from_values(&[expr.car(), name, value])));
    } else {
        return Err(syntax_at(expr));
    };
    let expr_sym = Value::symbol("expr");
    let apply_form = Value::List(List::from_values(&[
        Value::symbol("apply"),
        inner,
        Value::List(List::from_values(&[Value::symbol("cdr"), expr_sym.clone()])),
    ]));
    let wrapper_body = List::from_values(&[apply_form]);
    let wrapper_args = Value::List(List::from_values(&[expr_sym]));
    let wrapper = expand_func_form(&wrapper_args, &wrapper_body, depth)?;
    Ok(Value::List(List::from_values(&[
        Value::symbol("macro"),
        name,
        wrapper,
    ])))
}

/// `(func args body…)`: a leading run of `(var …)` definitions in the body is
/// gathered into a `letrec`; `(macro …)` in a body is an error.
fn expand_func(expr: &List, depth: usize) -> Result<Value, QuillError> {
    if expr.len() < 3 {
        return Err(syntax_at(expr));
    }
    let args = expr.cadr();
    let body = expand_sequence(&expr.cddr(), depth)?;
    expand_func_form(&args, &body, depth)
}

fn head_is(value: &Value, name: &str) -> bool {
    match value {
        Value::List(lst) if !lst.is_empty() => match lst.car() {
            Value::Symbol(sym) => sym_name(sym).as_ref() == name,
            _ => false,
        },
        _ => false,
    }
}

fn expand_func_form(args: &Value, body: &List, depth: usize) -> Result<Value, QuillError> {
    let first = body.car();
    if !body.is_empty() && (head_is(&first, "var") || head_is(&first, "macro")) {
        let mut rest = body.clone();
        let mut bindings: Vec<Value> = Vec::new();
        loop {
            let item = rest.car();
            if head_is(&item, "macro") {
                return Err(QuillError::macro_error(
                    "macros can only be defined at top level",
                ));
            }
            if !head_is(&item, "var") {
                break;
            }
            let Value::List(def) = &item else {
                break;
            };
            let expanded = expand_var(def, depth)?;
            let Value::List(expanded) = &expanded else {
                return Err(syntax_at(def));
            };
            // (var name value) -> (name value)
            bindings.push(Value::List(expanded.cdr()));
            rest = rest.cdr();
        }
        let letrec = Value::List(List::cons(
            Value::symbol("letrec"),
            List::cons(Value::List(List::from_vec(bindings)), rest),
        ));
        let expanded = expand_value(&letrec, depth)?;
        return Ok(Value::List(List::from_values(&[
            Value::symbol("func"),
            args.clone(),
            expanded,
        ])));
    }
    Ok(Value::List(List::cons(
        Value::symbol("func"),
        List::cons(args.clone(), body.clone()),
    )))
}

fn expand_set(expr: &List, depth: usize) -> Result<Value, QuillError> {
    if expr.len() != 3 {
        return Err(syntax_at(expr));
    }
    let value = match expr.caddr() {
        Value::List(lst) if !lst.is_empty() => expand_list(&lst, depth)?,
        other => other,
    };
    Ok(Value::List(List::from_values(&[
        expr.car(),
        expr.cadr(),
        value,
    ])))
}

/// `(let ((n v) …) body…)` and the named-let form.
pub fn expand_let(expr: &Value) -> Result<Value, QuillError> {
    let lst = expr.as_list()?;
    if matches!(lst.cadr(), Value::Symbol(_)) {
        return expand_named_let(lst);
    }
    let Value::List(bindings) = lst.cadr() else {
        return Err(syntax_at(lst));
    };
    let (names, values) = crack_let_bindings(&bindings).ok_or_else(|| syntax_at(lst))?;
    let body = lst.cddr();
    if body.is_empty() {
        return Err(syntax_at(lst));
    }
    let func = Value::List(List::cons(
        Value::symbol("func"),
        List::cons(Value::List(names), body),
    ));
    let call = List::cons(macroexpand(&func)?, values);
    Ok(Value::List(call))
}

fn crack_let_bindings(bindings: &List) -> Option<(List, List)> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    for binding in bindings.iter() {
        let Value::List(pair) = binding else {
            return None;
        };
        let name = pair.car();
        if !matches!(name, Value::Symbol(_)) {
            return None;
        }
        if pair.cdr().is_empty() {
            return None;
        }
        let value = macroexpand(&pair.cadr()).ok()?;
        names.push(name);
        values.push(value);
    }
    Some((List::from_vec(names), List::from_vec(values)))
}

fn expand_named_let(lst: &List) -> Result<Value, QuillError> {
    let name = lst.cadr();
    let Value::List(bindings) = lst.caddr() else {
        return Err(syntax_at(lst));
    };
    let (names, values) = crack_let_bindings(&bindings).ok_or_else(|| syntax_at(lst))?;
    let body = lst.cdddr();
    let func = Value::List(List::cons(
        Value::symbol("func"),
        List::cons(Value::List(names), body),
    ));
    let binding = Value::List(List::from_values(&[name.clone(), func]));
    let letrec = Value::List(List::from_values(&[
        Value::symbol("letrec"),
        Value::List(List::from_values(&[binding])),
        Value::List(List::cons(name, values)),
    ]));
    macroexpand(&letrec)
}

/// `(letrec ((n v) …) body…)` -> `((func (n …) (set! n v) … body…) null …)`.
pub fn expand_letrec(expr: &Value) -> Result<Value, QuillError> {
    let lst = expr.as_list()?;
    let body = lst.cddr();
    if body.is_empty() {
        return Err(syntax_at(lst));
    }
    let Value::List(bindings) = lst.cadr() else {
        return Err(syntax_at(lst));
    };
    let mut names = Vec::new();
    let mut inits = Vec::new();
    for binding in bindings.iter() {
        let Value::List(pair) = binding else {
            return Err(syntax_at(lst));
        };
        let name = pair.car();
        if !matches!(name, Value::Symbol(_)) || pair.cdr().is_empty() {
            return Err(syntax_at(lst));
        }
        inits.push(Value::List(List::cons(
            Value::symbol("set!"),
            pair.clone(),
        )));
        names.push(name);
    }
    let full_body = List::from_vec(inits).concat(&body);
    let func = Value::List(List::cons(
        Value::symbol("func"),
        List::cons(Value::List(List::from_vec(names.clone())), full_body),
    ));
    let nulls = List::repeated(names.len(), &Value::Null);
    let call = List::cons(macroexpand(&func)?, nulls);
    Ok(Value::List(call))
}

/// `cond` as a right-associative chain of `if`; an `=>` clause binds its
/// tested value exactly once.
pub fn expand_cond(expr: &Value) -> Result<Value, QuillError> {
    let lst = expr.as_list()?;
    let clauses = lst.cdr();
    if clauses.is_empty() {
        return Err(syntax_at(lst));
    }
    let built = build_cond_clauses(&clauses, lst)?;
    macroexpand(&built)
}

fn build_cond_clauses(clauses: &List, whole: &List) -> Result<Value, QuillError> {
    if clauses.is_empty() {
        return Ok(Value::Null);
    }
    let Value::List(clause) = clauses.car() else {
        return Err(syntax_at(whole));
    };
    if clause.is_empty() {
        return Err(syntax_at(whole));
    }
    let test = clause.car();
    if matches!(&test, Value::Symbol(sym) if sym_name(*sym).as_ref() == "else") {
        if !clauses.cdr().is_empty() {
            return Err(syntax_at(whole));
        }
        return Ok(Value::List(List::cons(Value::symbol("do"), clause.cdr())));
    }
    let rest = build_cond_clauses(&clauses.cdr(), whole)?;
    if matches!(&clause.cadr(), Value::Symbol(sym) if sym_name(*sym).as_ref() == "=>") {
        if clause.len() != 3 {
            return Err(syntax_at(whole));
        }
        let tmp = Value::symbol("__tmp__");
        let binding = Value::List(List::from_values(&[tmp.clone(), test]));
        let call = Value::List(List::from_values(&[clause.caddr(), tmp.clone()]));
        return Ok(Value::List(List::from_values(&[
            Value::symbol("let"),
            Value::List(List::from_values(&[binding])),
            Value::List(List::from_values(&[
                Value::symbol("if"),
                tmp,
                call,
                rest,
            ])),
        ])));
    }
    Ok(Value::List(List::from_values(&[
        Value::symbol("if"),
        test,
        Value::List(List::cons(Value::symbol("do"), clause.cdr())),
        rest,
    ])))
}

/// `(quasiquote x)`.
pub fn expand_quasiquote(expr: &Value) -> Result<Value, QuillError> {
    let lst = expr.as_list()?;
    if lst.len() != 2 {
        return Err(syntax_at(lst));
    }
    expand_qq(&lst.cadr())
}

fn expand_qq(expr: &Value) -> Result<Value, QuillError> {
    match expr {
        Value::List(lst) => {
            if lst.is_empty() {
                return Ok(expr.clone());
            }
            if !lst.cdr().is_empty() {
                if head_name_is(lst, "unquote") {
                    if !lst.cddr().is_empty() {
                        return Err(syntax_at(lst));
                    }
                    return macroexpand(&lst.cadr());
                }
                if head_name_is(lst, "unquote-splicing") {
                    return Err(QuillError::macro_error(
                        "unquote-splicing can only occur in the context of a list",
                    ));
                }
            }
            let built = expand_qq_list(lst)?;
            macroexpand(&built)
        }
        Value::Symbol(_) => Ok(Value::List(List::from_values(&[
            Value::symbol("quote"),
            expr.clone(),
        ]))),
        other => Ok(other.clone()),
    }
}

fn head_name_is(lst: &List, name: &str) -> bool {
    matches!(lst.car(), Value::Symbol(sym) if sym_name(sym).as_ref() == name)
}

fn expand_qq_list(lst: &List) -> Result<Value, QuillError> {
    let mut pieces = vec![Value::symbol("concat")];
    for item in lst.iter() {
        match item {
            Value::List(inner) if !inner.is_empty() => {
                if head_name_is(inner, "quasiquote") {
                    return Err(QuillError::macro_error("nested quasiquote not supported"));
                }
                if head_name_is(inner, "unquote") && inner.len() == 2 {
                    let expanded = macroexpand(&inner.cadr())?;
                    pieces.push(Value::List(List::from_values(&[
                        Value::symbol("list"),
                        expanded,
                    ])));
                } else if head_name_is(inner, "unquote-splicing") && inner.len() == 2 {
                    pieces.push(macroexpand(&inner.cadr())?);
                } else {
                    let nested = expand_qq_list(inner)?;
                    pieces.push(Value::List(List::from_values(&[
                        Value::symbol("list"),
                        nested,
                    ])));
                }
            }
            other => {
                let quoted = Value::List(List::from_values(&[
                    Value::symbol("quote"),
                    other.clone(),
                ]));
                pieces.push(Value::List(List::from_values(&[
                    Value::symbol("list"),
                    quoted,
                ])));
            }
        }
    }
    Ok(Value::List(List::from_vec(pieces)))
}

fn syntax_at(expr: &List) -> QuillError {
    QuillError::syntax(write(&Value::List(expr.clone())))
}
