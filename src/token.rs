use std::fmt;
use std::mem;

use log::debug;
use serde::Serialize;

/// Kind of a scanned token.  `STRING` and `NUMBER` carry their literal
/// value; equality ignores that payload and compares the kind only.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Serialize)]
pub enum TokenType {
    // Punctuation.
    LEFT_PAREN,
    RIGHT_PAREN,
    LEFT_BRACE,
    RIGHT_BRACE,
    COMMA,
    DOT,
    MINUS,
    PLUS,
    SEMICOLON,
    SLASH,
    STAR,

    // Comparison and assignment, one or two characters.
    BANG,
    BANG_EQUAL,
    EQUAL,
    EQUAL_EQUAL,
    GREATER,
    GREATER_EQUAL,
    LESS,
    LESS_EQUAL,

    // Literals.
    IDENTIFIER,
    STRING(String),
    NUMBER(f64),

    // Keywords.
    AND,
    CLASS,
    ELSE,
    FALSE,
    FUN,
    FOR,
    IF,
    NIL,
    OR,
    PRINT,
    RETURN,
    SUPER,
    THIS,
    TRUE,
    VAR,
    WHILE,

    EOF,
}

impl PartialEq for TokenType {
    fn eq(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

impl TokenType {
    /// Variant name without payload, as printed by `tokenize`.
    pub fn name(&self) -> &'static str {
        use TokenType::*;

        match self {
            LEFT_PAREN => "LEFT_PAREN",
            RIGHT_PAREN => "RIGHT_PAREN",
            LEFT_BRACE => "LEFT_BRACE",
            RIGHT_BRACE => "RIGHT_BRACE",
            COMMA => "COMMA",
            DOT => "DOT",
            MINUS => "MINUS",
            PLUS => "PLUS",
            SEMICOLON => "SEMICOLON",
            SLASH => "SLASH",
            STAR => "STAR",
            BANG => "BANG",
            BANG_EQUAL => "BANG_EQUAL",
            EQUAL => "EQUAL",
            EQUAL_EQUAL => "EQUAL_EQUAL",
            GREATER => "GREATER",
            GREATER_EQUAL => "GREATER_EQUAL",
            LESS => "LESS",
            LESS_EQUAL => "LESS_EQUAL",
            IDENTIFIER => "IDENTIFIER",
            STRING(_) => "STRING",
            NUMBER(_) => "NUMBER",
            AND => "AND",
            CLASS => "CLASS",
            ELSE => "ELSE",
            FALSE => "FALSE",
            FUN => "FUN",
            FOR => "FOR",
            IF => "IF",
            NIL => "NIL",
            OR => "OR",
            PRINT => "PRINT",
            RETURN => "RETURN",
            SUPER => "SUPER",
            THIS => "THIS",
            TRUE => "TRUE",
            VAR => "VAR",
            WHILE => "WHILE",
            EOF => "EOF",
        }
    }
}

/// A scanned token.  The lexeme is owned: AST nodes keep tokens for error
/// reporting after the source text is gone (REPL lines, escaping closures).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    /// 1‑based source line.
    pub line: usize,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: impl Into<String>, line: usize) -> Self {
        let lexeme: String = lexeme.into();

        debug!(
            "Creating token: type={:?}, lexeme={}, line={}",
            token_type, lexeme, line
        );

        Self {
            token_type,
            lexeme,
            line,
        }
    }

    /// Literal column of the `tokenize` output: `3` → `3.0`, strings bare,
    /// `null` for everything without a literal.
    fn literal(&self) -> String {
        match &self.token_type {
            TokenType::STRING(s) => s.clone(),
            TokenType::NUMBER(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                let mut buf: itoa::Buffer = itoa::Buffer::new();
                format!("{}.0", buf.format(*n as i64))
            }
            TokenType::NUMBER(n) => n.to_string(),
            _ => "null".to_owned(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.token_type.name(),
            self.lexeme,
            self.literal()
        )
    }
}
