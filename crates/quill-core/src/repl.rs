//! The REPL seam: an eval handler that balances parentheses across
//! continuation lines, a completion surface over reserved heads, macros, and
//! globals, and an interactive loop on rustyline.

use std::path::PathBuf;

use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use crate::error::{QuillError, ERROR_TAG};
use crate::globals;
use crate::interrupt;
use crate::reader::{read_all, KeyPolicy};
use crate::runtime;
use crate::symbols::{intern, sym_name};
use crate::value::Value;
use crate::writer::{to_display_string, write};

const HISTORY_LIMIT: usize = 100;

pub enum ReplOutcome {
    /// A result line ready to print.
    Result(String),
    /// The input is incomplete; keep reading.
    More,
    Empty,
}

#[derive(Default)]
pub struct ReplHandler {
    buf: String,
}

impl ReplHandler {
    pub fn new() -> ReplHandler {
        ReplHandler::default()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Whether a previous fragment is waiting for its closing parens.
    pub fn pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Feed one line. Unbalanced opens buffer the line; unbalanced closes
    /// are an error; a balanced whole is read and evaluated.
    pub fn eval_expr(&mut self, chunk: &str) -> Result<ReplOutcome, QuillError> {
        interrupt::clear_interrupt();
        let whole = format!("{}{}", self.buf, chunk);
        let whole = whole.trim();
        let opens = whole.matches('(').count();
        let closes = whole.matches(')').count();
        if opens > closes {
            self.buf = format!("{} ", whole);
            return Ok(ReplOutcome::More);
        }
        self.buf.clear();
        if closes > opens {
            return Err(QuillError::syntax("unbalanced ')' encountered"));
        }
        if whole.is_empty() {
            return Ok(ReplOutcome::Empty);
        }
        let exprs = read_all(whole, KeyPolicy::Any)?;
        let mut result = Value::Null;
        for expr in &exprs {
            result = runtime::eval(expr)?;
        }
        Ok(ReplOutcome::Result(format!("= {}", write(&result))))
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\'' | '#' | ':' | ','
        )
}

/// The prefix under completion and whether it sits in head position.
fn complete_prefix(expr: &str) -> (&str, bool) {
    let Some(last) = expr.chars().last() else {
        return ("", false);
    };
    if is_boundary(last) {
        return ("", false);
    }
    match expr.rfind(is_boundary) {
        Some(idx) => {
            let boundary = expr[idx..].chars().next().unwrap_or(' ');
            (&expr[idx + boundary.len_utf8()..], boundary == '(')
        }
        None => (expr, false),
    }
}

fn greatest_common_prefix(matches: &[String]) -> String {
    let Some(first) = matches.first() else {
        return String::new();
    };
    let mut prefix = first.clone();
    for m in &matches[1..] {
        let common = prefix
            .chars()
            .zip(m.chars())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(prefix.char_indices().nth(common).map_or(prefix.len(), |(i, _)| i));
    }
    prefix
}

/// Complete a partial input: the addendum extending the prefix, plus all
/// candidates. Head position offers reserved heads, macros, and function
/// globals; operand position offers every global.
pub fn complete(expr: &str) -> (String, Vec<String>) {
    let (prefix, fun_position) = complete_prefix(expr);
    let mut matches: Vec<String> = Vec::new();
    if fun_position {
        for sym in runtime::reserved_heads() {
            let name = sym_name(sym).to_string();
            if name.starts_with(prefix) && !matches.contains(&name) {
                matches.push(name);
            }
        }
        for sym in globals::macros() {
            let name = sym_name(sym).to_string();
            if name.starts_with(prefix) && !matches.contains(&name) {
                matches.push(name);
            }
        }
    }
    for sym in globals::globals() {
        let name = sym_name(sym).to_string();
        if !name.starts_with(prefix) || matches.contains(&name) {
            continue;
        }
        if fun_position {
            if let Some(Value::Function(_)) = globals::get_global(sym) {
                matches.push(name);
            }
        } else {
            matches.push(name);
        }
    }
    matches.sort();
    let gcp = greatest_common_prefix(&matches);
    let addendum = if gcp.len() > prefix.len() {
        gcp[prefix.len()..].to_string()
    } else {
        String::new()
    };
    (addendum, matches)
}

pub fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        let mut path = PathBuf::from(home);
        path.push(".quill_history");
        path
    })
}

fn trim_history(path: &PathBuf) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();
    if lines.len() <= HISTORY_LIMIT {
        return;
    }
    let kept = &lines[lines.len() - HISTORY_LIMIT..];
    let _ = std::fs::write(path, format!("{}\n", kept.join("\n")));
}

struct QuillHelper;

impl Completer for QuillHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<String>), ReadlineError> {
        let (prefix, _) = complete_prefix(&line[..pos]);
        let (_, candidates) = complete(&line[..pos]);
        Ok((pos - prefix.len(), candidates))
    }
}

impl Hinter for QuillHelper {
    type Hint = String;
}

impl Highlighter for QuillHelper {}
impl Validator for QuillHelper {}
impl Helper for QuillHelper {}

fn current_prompt(handler: &ReplHandler) -> String {
    if handler.pending() {
        return "... ".to_string();
    }
    match globals::get_global(intern("*prompt*")) {
        Some(prompt) => to_display_string(&prompt),
        None => "quill> ".to_string(),
    }
}

/// The interactive loop. Assumes `runtime::init` has already run.
pub fn interactive_repl() {
    let mut rl: Editor<QuillHelper, DefaultHistory> = match Editor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{} repl: {}", ERROR_TAG, e);
            return;
        }
    };
    rl.set_helper(Some(QuillHelper));
    let hist_path = history_path();
    if let Some(path) = &hist_path {
        let _ = rl.load_history(path);
    }
    println!("quill {}", to_display_string(
        &globals::get_global(intern("*version*")).unwrap_or(Value::Null),
    ));
    let mut handler = ReplHandler::new();
    loop {
        match rl.readline(&current_prompt(&handler)) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() && !handler.pending() {
                    continue;
                }
                if !trimmed.is_empty() {
                    let _ = rl.add_history_entry(trimmed);
                    if let Some(path) = &hist_path {
                        let _ = rl.append_history(path);
                    }
                }
                match handler.eval_expr(&line) {
                    Ok(ReplOutcome::Result(text)) => println!("{}", text),
                    Ok(ReplOutcome::More) | Ok(ReplOutcome::Empty) => {}
                    Err(e) => {
                        if interrupt::is_interrupted() {
                            println!("; execution interrupted");
                            interrupt::clear_interrupt();
                        } else {
                            eprintln!("{} {}", ERROR_TAG, e);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                handler.reset();
                interrupt::clear_interrupt();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{} repl: {}", ERROR_TAG, e);
                break;
            }
        }
    }
    if let Some(path) = &hist_path {
        trim_history(path);
    }
}
