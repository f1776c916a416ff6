use std::io::{BufRead, Write};

use clap::Parser;
use log::error;

use kst_lang::interpreter::value::ValueKind;
use kst_lang::runner::Runner;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Source file to run, or the literal "stdin" for the interactive
    /// interpreter.
    file: String,

    /// Write token and AST dumps to .parse/.
    #[arg(long)]
    dump_parse: bool,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Cli::parse();
    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Warn
    };
    simple_logger::init_with_level(level).unwrap();

    // Evaluation recurses with the AST, so give it a roomy stack; the
    // interpreter's own depth guard is what should trip first.
    let evaluator = std::thread::Builder::new()
        .name("kst-eval".into())
        .stack_size(64 * 1024 * 1024)
        .spawn(move || run(args))
        .expect("failed to spawn the evaluator thread");
    std::process::exit(evaluator.join().unwrap_or(1));
}

fn run(args: Cli) -> i32 {
    let mut runner = Runner::new();
    runner.dump_parse = args.dump_parse;

    if args.file == "stdin" {
        repl(&mut runner);
        return 0;
    }

    let text = match std::fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(err) => {
            error!("could not read file '{}': {err}", args.file);
            return 1;
        }
    };

    match runner.run(&args.file, &text) {
        Ok(_) => 0,
        Err(diagnostic) => {
            eprint!("{diagnostic}");
            1
        }
    }
}

/// Read one line at a time against the persistent global scope, echoing the
/// truthy statement values back. Errors are rendered without leaving the
/// loop.
fn repl(runner: &mut Runner) {
    println!("Welcome to Kst {}", env!("CARGO_PKG_VERSION"));

    let stdin = std::io::stdin();
    loop {
        print!(">>> ");
        if std::io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        match runner.run("<stdin>", &line) {
            Ok(result) => {
                if let ValueKind::List(items) = &result.kind {
                    for item in items.borrow().iter() {
                        if item.is_true() {
                            println!("{item}");
                        }
                    }
                }
            }
            Err(diagnostic) => eprint!("{diagnostic}"),
        }
    }
}
