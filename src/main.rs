use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox_interpreter as lox;

use lox::ast_printer::AstPrinter;
use lox::error::LoxError;
use lox::parser::Parser;
use lox::scanner::Scanner;
use lox::Lox;

/// Exit status for lexing, parsing and resolution errors.
const EXIT_STATIC_ERROR: i32 = 65;
/// Exit status for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print the token list as JSON instead of one token per line
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: PathBuf },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Lox program
    Run { filename: PathBuf },

    /// Starts an interactive prompt sharing one global scope
    Repl,
}

/// Maps the source file read‑only into memory.
fn read_file(filename: &Path) -> Result<Mmap> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    // SAFETY: the map is read-only and lives only while the file is being
    // interpreted; concurrent truncation by another process is not guarded.
    let map = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    info!("Mapped {} bytes from {:?}", map.len(), filename);

    Ok(map)
}

fn source_text(map: &Mmap) -> Result<&str> {
    std::str::from_utf8(map)
        .map_err(LoxError::from)
        .context("Source is not valid UTF-8")
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            // Strip 'rox_interpreter::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rox_interpreter::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{} {}:{}] - {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Prints every error and picks the exit status the batch commands use.
fn report(errors: &[LoxError]) -> i32 {
    for e in errors {
        debug!("Reporting: {:?}", e);
        eprintln!("{}", e);
    }

    if errors.iter().any(LoxError::is_static) {
        EXIT_STATIC_ERROR
    } else {
        EXIT_RUNTIME_ERROR
    }
}

fn tokenize(filename: &Path, json: bool) -> Result<()> {
    let map = read_file(filename)?;
    let (tokens, errors) = Scanner::new(source_text(&map)?).scan_tokens();

    for e in &errors {
        eprintln!("{}", e);
    }

    if json {
        let out: String = serde_json::to_string_pretty(&tokens).context("Failed to encode tokens")?;
        println!("{}", out);
    } else {
        for token in &tokens {
            println!("{}", token);
        }
    }

    if !errors.is_empty() {
        debug!("Tokenization failed, exiting with code {}", EXIT_STATIC_ERROR);
        std::process::exit(EXIT_STATIC_ERROR);
    }

    info!("Tokenization completed successfully");
    Ok(())
}

fn parse(filename: &Path) -> Result<()> {
    let map = read_file(filename)?;
    let (tokens, errors) = Scanner::new(source_text(&map)?).scan_tokens();

    if !errors.is_empty() {
        std::process::exit(report(&errors));
    }

    match Parser::new(tokens).parse_expression() {
        Ok(expr) => {
            let ast: String = AstPrinter::print(&expr);
            debug!("AST: {}", ast);
            println!("{}", ast);
            Ok(())
        }
        Err(errors) => std::process::exit(report(&errors)),
    }
}

fn evaluate(filename: &Path) -> Result<()> {
    let map = read_file(filename)?;
    let mut lox = Lox::new();

    match lox.evaluate(source_text(&map)?) {
        Ok(value) => {
            debug!("Evaluated to: {}", value);
            println!("{}", value);
            Ok(())
        }
        Err(errors) => std::process::exit(report(&errors)),
    }
}

fn run(filename: &Path) -> Result<()> {
    let map = read_file(filename)?;
    let mut lox = Lox::new();

    if let Err(errors) = lox.run(source_text(&map)?) {
        let code: i32 = report(&errors);
        io::stdout().flush()?;
        std::process::exit(code);
    }

    info!("Program executed successfully");
    Ok(())
}

fn repl() -> Result<()> {
    let mut lox = Lox::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }

        // Errors end this line only; the session and its globals go on.
        if let Err(errors) = lox.run(&line) {
            report(&errors);
        }
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match &args.commands {
        Commands::Tokenize { filename, json } => tokenize(filename, *json),
        Commands::Parse { filename } => parse(filename),
        Commands::Evaluate { filename } => evaluate(filename),
        Commands::Run { filename } => run(filename),
        Commands::Repl => repl(),
    }
}
