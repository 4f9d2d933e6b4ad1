mod repl;

use clap::Parser as ClapParser;
use colored::Colorize;
use dicta::{Interpreter, Limits};
use std::fmt::Display;
use std::fs;
use std::io::{self, Read};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "dicta", version, about = "The Dicta language interpreter")]
struct Cli {
    /// Program to run; `-` reads it from stdin
    file: Option<String>,
    /// Run source code given inline
    #[arg(short = 'e', value_name = "CODE", conflicts_with = "file")]
    code: Option<String>,
    /// Print the token stream instead of running
    #[arg(long)]
    tokens: bool,
    /// Start the interactive REPL
    #[arg(short = 'i', long)]
    repl: bool,
    /// Maximum number of active function calls
    #[arg(long, value_name = "N", default_value_t = Limits::default().max_call_depth)]
    max_depth: usize,
    /// Maximum number of passes of a single while loop
    #[arg(long, value_name = "N", default_value_t = Limits::default().max_loop_iterations)]
    max_iterations: usize,
}

impl Cli {
    fn limits(&self) -> Limits {
        Limits {
            max_call_depth: self.max_depth,
            max_loop_iterations: self.max_iterations,
        }
    }
}

fn fail(message: impl Display) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    process::exit(1);
}

fn read_source(cli: &Cli) -> Option<String> {
    if let Some(code) = &cli.code {
        return Some(code.clone());
    }
    match cli.file.as_deref() {
        Some("-") => {
            let mut source = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut source) {
                fail(format!("cannot read stdin: {}", e));
            }
            Some(source)
        }
        Some(path) => match fs::read_to_string(path) {
            Ok(source) => Some(source),
            Err(e) => fail(format!("cannot read '{}': {}", path, e)),
        },
        None => None,
    }
}

fn dump_tokens(source: &str) {
    match dicta::tokenize(source) {
        Ok(tokens) => {
            for token in tokens {
                println!("{}:{} {:?}", token.position.line, token.position.column, token.kind);
            }
        }
        Err(e) => fail(e),
    }
}

fn run_program(source: &str, limits: Limits) {
    let program = match dicta::parse_source(source) {
        Ok(program) => program,
        Err(e) => fail(e),
    };
    let mut interpreter = Interpreter::with_limits(limits);
    match interpreter.run(&program) {
        Ok(value) => println!("{}", value),
        Err(e) => fail(e),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("DICTA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.repl {
        repl::run_repl(cli.limits());
        return;
    }

    match read_source(&cli) {
        Some(source) if cli.tokens => dump_tokens(&source),
        Some(source) => run_program(&source, cli.limits()),
        None if cli.tokens => fail("--tokens needs a program"),
        None => repl::run_repl(cli.limits()),
    }
}
