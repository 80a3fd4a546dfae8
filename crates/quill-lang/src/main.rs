use std::env;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use once_cell::sync::Lazy;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;

use quill_core::error::ERROR_TAG;
use quill_core::{interrupt, options, repl, runtime};

static ALWAYS_TRUE_FLAG: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(true)));

fn help() -> ! {
    println!("Usage: quill [OPTIONS] [file ...]");
    println!();
    println!("Options:");
    println!("  --help        Show this help");
    println!("  --compile     Compile each file and print its bytecode instead of executing");
    println!("  --optimize    Optimize execution speed; disables tracing and verbose paths");
    println!("  --verbose     Print load notes and execution duration");
    println!("  --debug       Print each macroexpansion, compilation, and eval step");
    println!("  --trace       Disassemble each executed instruction with a stack snapshot");
    println!("  --noinit      Skip loading ~/.ql when starting the REPL");
    println!("  --path DIRS   Colon-separated directories prepended to the module search path");
    println!();
    println!("With no files, an interactive REPL is started.");
    std::process::exit(1);
}

fn unknown_option(opt: &str) -> ! {
    eprintln!("unknown option: {}", opt);
    help();
}

fn install_signal_handlers() {
    if let Err(err) = flag::register(SIGINT, interrupt::interrupt_flag()) {
        eprintln!(
            "{} failed to register signal handler ({}): {}",
            ERROR_TAG, SIGINT, err
        );
    }
    if let Err(err) = flag::register_conditional_shutdown(SIGTERM, 1, ALWAYS_TRUE_FLAG.clone()) {
        eprintln!(
            "{} failed to register signal handler ({}): {}",
            ERROR_TAG, SIGTERM, err
        );
    }
}

fn main() {
    let mut args = env::args().skip(1).collect::<Vec<_>>();

    let mut compile = false;
    let mut optimize = false;
    let mut verbose = false;
    let mut debug = false;
    let mut trace = false;
    let mut noinit = false;
    let mut path: Option<String> = None;

    loop {
        match args.first().map(|s| s.as_str()) {
            Some("--help") => help(),
            Some("--compile") => {
                compile = true;
                args.remove(0);
            }
            Some("--optimize") => {
                optimize = true;
                args.remove(0);
            }
            Some("--verbose") => {
                verbose = true;
                args.remove(0);
            }
            Some("--debug") => {
                debug = true;
                args.remove(0);
            }
            Some("--trace") => {
                trace = true;
                args.remove(0);
            }
            Some("--noinit") => {
                noinit = true;
                args.remove(0);
            }
            Some("--path") => {
                if args.len() < 2 {
                    eprintln!("--path requires a value");
                    help();
                }
                path = Some(args[1].clone());
                args.drain(0..2);
            }
            Some(s) if s.starts_with('-') => unknown_option(s),
            _ => break,
        }
    }

    let interactive = args.is_empty();
    install_signal_handlers();
    runtime::init();
    options::set_flags(optimize, verbose, debug, trace, interactive);

    if let Some(path) = path {
        for dir in path.split(':') {
            let expanded = runtime::expand_file_path(dir);
            if runtime::is_directory_readable(&expanded) {
                runtime::add_load_directory(&expanded);
                if debug {
                    eprintln!("; [added directory to path: '{}']", expanded);
                }
            } else if debug {
                eprintln!(
                    "; [directory not readable, cannot add to path: '{}']",
                    expanded
                );
            }
        }
    }

    if !args.is_empty() {
        if compile {
            for filename in &args {
                match runtime::compile_file(filename) {
                    Ok(text) => println!("{}", text),
                    Err(err) => {
                        eprintln!("{} {}", ERROR_TAG, err);
                        std::process::exit(1);
                    }
                }
            }
        } else if let Err(err) = runtime::run_files(&args) {
            eprintln!("{} {}", ERROR_TAG, err);
            std::process::exit(1);
        }
        return;
    }

    if !noinit {
        if let Ok(home) = env::var("HOME") {
            let init_file = Path::new(&home).join(".ql");
            if init_file.is_file() {
                if let Err(err) = runtime::load_file(&init_file.to_string_lossy()) {
                    eprintln!("{} {}", ERROR_TAG, err);
                    std::process::exit(1);
                }
            }
        }
    }
    repl::interactive_repl();
}
