pub mod ast;
pub mod ast_printer;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod native;
pub mod object;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;

use std::io::Write;

use log::{debug, info};

use ast::{Expr, Stmt};
use error::LoxError;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;
use token::Token;
use value::Value;

/// One interpreter session.  Globals persist across [`Lox::run`] calls, so
/// a REPL can feed it one line at a time.
pub struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
        }
    }

    /// Session whose `print` output goes to `out` instead of stdout.
    pub fn with_output<W: Write + 'static>(out: W) -> Self {
        Self {
            interpreter: Interpreter::with_output(out),
        }
    }

    /// Scan, parse, resolve and run `source`.
    ///
    /// Lexing, parsing and resolution errors are all collected and returned
    /// together before anything runs.  A runtime error is returned alone,
    /// after whatever output preceded it.
    pub fn run(&mut self, source: &str) -> Result<(), Vec<LoxError>> {
        let statements: Vec<Stmt> = Self::front_end(source)?;

        debug!("Running {} statement(s)", statements.len());

        Resolver::new(&mut self.interpreter)
            .resolve(&statements)
            .map_err(|errors| errors.into_iter().map(LoxError::from).collect::<Vec<_>>())?;

        self.interpreter
            .interpret(&statements)
            .map_err(|e| vec![LoxError::from(e)])
    }

    /// Evaluate `source` as a single expression.
    pub fn evaluate(&mut self, source: &str) -> Result<Value, Vec<LoxError>> {
        let tokens: Vec<Token> = Self::scan(source)?;
        let expr: Expr = Parser::new(tokens).parse_expression()?;

        // Wrap as a statement so the resolver sees it; nothing is local at
        // top level, so this only validates `this`/`super` placement.
        let statements: [Stmt; 1] = [Stmt::Expression(expr)];
        Resolver::new(&mut self.interpreter)
            .resolve(&statements)
            .map_err(|errors| errors.into_iter().map(LoxError::from).collect::<Vec<_>>())?;

        let [Stmt::Expression(expr)] = &statements else {
            unreachable!("statement array built just above");
        };

        self.interpreter
            .evaluate(expr)
            .map_err(|e| vec![LoxError::from(e)])
    }

    fn scan(source: &str) -> Result<Vec<Token>, Vec<LoxError>> {
        let (tokens, errors) = Scanner::new(source).scan_tokens();

        if errors.is_empty() {
            Ok(tokens)
        } else {
            Err(errors)
        }
    }

    /// Scanner and parser errors are reported together.
    fn front_end(source: &str) -> Result<Vec<Stmt>, Vec<LoxError>> {
        let (tokens, mut errors) = Scanner::new(source).scan_tokens();

        match Parser::new(tokens).parse() {
            Ok(statements) if errors.is_empty() => {
                info!("Front end produced {} statement(s)", statements.len());
                Ok(statements)
            }
            Ok(_) => Err(errors),
            Err(parse_errors) => {
                errors.extend(parse_errors);
                Err(errors)
            }
        }
    }
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}
