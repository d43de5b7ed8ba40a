//! Centralised error hierarchy for the **Lox interpreter**.
//!
//! Three tiers are kept apart:
//!
//! * front‑end failures (`Lex`, `Parse`) and static resolution failures
//!   ([`ResolveError`]) stop a program before it runs;
//! * [`RuntimeError`]s abort the current `interpret` call;
//! * internal‑consistency violations (a resolved depth that walks off the
//!   environment chain) are bugs and panic instead of being reported.
//!
//! The module **does not** print diagnostics itself

use std::io;
use thiserror::Error;

use log::info;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error. `location` is ` at 'lexeme'` or ` at end`.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        location: String,
        line: usize,
    },

    /// Static‑analysis failure reported by the resolver.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Runtime evaluation error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(line: usize, location: String, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        LoxError::Parse {
            message,
            location,
            line,
        }
    }

    /// Is this a compile‑time (pre‑execution) failure?  Drives exit code 65.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve(_)
        )
    }
}

/// Static errors found by the resolver.  Every variant records the line and
/// lexeme of the offending token so the report can point at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("[line {line}] Error at '{lexeme}': A class can't inherit from itself.")]
    SelfInheritance { lexeme: String, line: usize },

    #[error("[line {line}] Error at '{lexeme}': Can't return from top-level code.")]
    ReturnOutsideFunction { lexeme: String, line: usize },

    #[error("[line {line}] Error at '{lexeme}': Can't return a value from an initializer.")]
    ReturnValueInInitializer { lexeme: String, line: usize },

    #[error("[line {line}] Error at '{lexeme}': Can't use 'this' outside of a class.")]
    ThisOutsideClass { lexeme: String, line: usize },

    /// `reason` distinguishes "outside of a class" from "in a class with no
    /// superclass".
    #[error("[line {line}] Error at '{lexeme}': Can't use 'super' {reason}.")]
    SuperOutsideSubclass {
        lexeme: String,
        line: usize,
        reason: &'static str,
    },

    #[error("[line {line}] Error at '{lexeme}': Can't read local variable in its own initializer.")]
    SelfReferencingInitializer { lexeme: String, line: usize },

    #[error("[line {line}] Error at '{lexeme}': Already a variable with this name in this scope.")]
    DuplicateDeclaration { lexeme: String, line: usize },
}

/// Errors raised while evaluating a program.  The first one aborts the run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'.\n[line {line}]")]
    UndefinedVariable { name: String, line: usize },

    #[error("Undefined property '{name}'.\n[line {line}]")]
    UndefinedProperty { name: String, line: usize },

    #[error("{message}\n[line {line}]")]
    TypeMismatch { message: String, line: usize },

    #[error("Can only call functions and classes.\n[line {line}]")]
    NotCallable { line: usize },

    #[error("Expected {expected} arguments but got {got}.\n[line {line}]")]
    ArityMismatch {
        expected: usize,
        got: usize,
        line: usize,
    },

    /// Writing `print` output failed.
    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl RuntimeError {
    pub fn type_mismatch<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating TypeMismatch error: line={}, msg={}", line, message);

        RuntimeError::TypeMismatch { message, line }
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;
