use colored::Colorize;
use dicta::ast::{Expr, ExprKind};
use dicta::lexer::{Lexer, TokenKind};
use dicta::parser::Parser;
use dicta::{Interpreter, Limits, Position};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::fmt::Display;
use std::fs;

pub fn run_repl(limits: Limits) {
    println!("Dicta REPL v{}", dicta::VERSION);
    println!("Type .help for commands, .exit to quit.\n");

    if let Err(e) = repl_loop(limits) {
        report(format!("REPL failure: {}", e));
    }
}

fn report(message: impl Display) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

fn repl_loop(limits: Limits) -> RlResult<()> {
    let mut rl = DefaultEditor::new()?;
    let mut interpreter = Interpreter::with_limits(limits);
    let mut input_buffer = String::new();
    let mut brace_depth: usize = 0;

    let history_path = dirs_history_path();
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = if brace_depth > 0 { "...> " } else { "dicta> " };

        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if brace_depth == 0 && trimmed.starts_with('.') {
                    rl.add_history_entry(trimmed)?;
                    if handle_command(trimmed, &mut interpreter) {
                        break;
                    }
                    continue;
                }

                for c in line.chars() {
                    match c {
                        '{' => brace_depth += 1,
                        '}' => brace_depth = brace_depth.saturating_sub(1),
                        _ => {}
                    }
                }

                input_buffer.push_str(&line);
                input_buffer.push('\n');
                if brace_depth > 0 {
                    continue;
                }

                let input = input_buffer.trim();
                if !input.is_empty() {
                    rl.add_history_entry(input)?;
                    execute_input(&mut interpreter, input);
                }
                input_buffer.clear();
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                input_buffer.clear();
                brace_depth = 0;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                report(err);
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

fn dirs_history_path() -> Option<String> {
    dirs::home_dir().map(|mut path| {
        path.push(".dicta_history");
        path.to_string_lossy().to_string()
    })
}

/// Handle a REPL command. Returns true if the REPL should exit.
fn handle_command(cmd: &str, interpreter: &mut Interpreter) -> bool {
    let (command, arg) = match cmd.split_once(' ') {
        Some((command, arg)) => (command, Some(arg.trim()).filter(|arg| !arg.is_empty())),
        None => (cmd, None),
    };

    match command {
        ".exit" | ".quit" | ".q" => {
            println!("Goodbye!");
            return true;
        }
        ".help" | ".h" => print_repl_help(),
        ".clear" => {
            interpreter.reset();
            println!("State cleared.");
        }
        ".vars" => print_variables(interpreter),
        ".load" => match arg {
            Some(path) => load_file(interpreter, path),
            None => report("usage: .load <file>"),
        },
        ".run" => run_function(interpreter, arg.unwrap_or("main")),
        _ => {
            report(format!("unknown command {}", command));
            eprintln!("Type .help for available commands.");
        }
    }

    false
}

fn load_file(interpreter: &mut Interpreter, path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => return report(format!("cannot read '{}': {}", path, e)),
    };
    let program = match dicta::parse_source(&source) {
        Ok(program) => program,
        Err(e) => return report(e),
    };
    if let Err(e) = interpreter.load(&program) {
        return report(e);
    }

    let names: Vec<&str> = program.functions().map(|f| f.name.as_str()).collect();
    if !names.is_empty() {
        println!("Loaded: {}", names.join(", "));
    }
    if names.contains(&"main") {
        run_function(interpreter, "main");
    }
}

fn run_function(interpreter: &mut Interpreter, name: &str) {
    let result = if name == "main" {
        interpreter.call_main()
    } else {
        let call = Expr::new(ExprKind::Call(name.to_string(), Vec::new()), Position::new(1, 1));
        interpreter.evaluate(&call)
    };
    match result {
        Ok(value) => println!("=> {}", value),
        Err(e) => report(e),
    }
}

// Functions and typed declarations are definitions; anything else is an
// expression to evaluate.
fn is_definition(input: &str) -> bool {
    match Lexer::new(input).next_token() {
        Ok(token) => token.kind == TokenKind::Function || token.kind.is_type_keyword(),
        Err(_) => false,
    }
}

fn execute_input(interpreter: &mut Interpreter, input: &str) {
    if is_definition(input) {
        let program = match dicta::parse_source(input) {
            Ok(program) => program,
            Err(e) => return report(e),
        };
        match interpreter.load(&program) {
            Ok(()) => {
                for func in program.functions() {
                    println!("Defined function: {}", func.name);
                }
            }
            Err(e) => report(e),
        }
        return;
    }

    let expr = match Parser::new(input).and_then(|mut parser| parser.parse_standalone_expr()) {
        Ok(expr) => expr,
        Err(e) => return report(e),
    };
    match interpreter.evaluate(&expr) {
        Ok(value) => println!("=> {}", value),
        Err(e) => report(e),
    }
}

fn print_repl_help() {
    println!(
        r#"
REPL Commands:
    .help, .h          Show this help message
    .exit, .quit, .q   Exit the REPL
    .clear             Forget all globals and functions
    .vars              Show globals and functions
    .load <file>       Load a program, running main() if it defines one
    .run [func]        Call a zero-argument function (default: main)

Navigation:
    Up/Down arrows     Navigate command history
    Ctrl-C             Cancel current input
    Ctrl-D             Exit REPL

Examples:
    Dict<string, int> ages = {{"ann": 31, "bob": 17}};
                       Declare a global
    function int twice(int n) {{ return n * 2; }}
                       Define a function
    twice(ages.get("ann"))
                       Evaluate an expression
    from Pair<string, int> p in ages where p.second() > 18 select p.first()
                       Query a dictionary

Tips:
    - Multi-line input: open braces are auto-detected
    - History is saved to ~/.dicta_history
"#
    );
}

fn print_variables(interpreter: &Interpreter) {
    let mut globals: Vec<_> = interpreter.globals().iter().collect();
    globals.sort_by(|a, b| a.0.cmp(b.0));
    let functions = interpreter.function_names();

    if globals.is_empty() && functions.is_empty() {
        println!("No globals or functions defined.");
        return;
    }

    if !globals.is_empty() {
        println!("Globals:");
        for (name, binding) in globals {
            println!("  {} {} = {}", binding.ty, name, binding.value);
        }
    }

    if !functions.is_empty() {
        println!("Functions:");
        for name in functions {
            println!("  {}()", name);
        }
    }
}
