//! Streaming lexer for Lox source text.
//!
//! [`Scanner`] is an iterator of `Result<Token, LoxError>`: a bad character
//! or an unterminated string yields an `Err` item and scanning carries on
//! with the next byte, so one pass reports every lexical error.  The stream
//! always ends with exactly one `EOF` token and is fused afterwards.
//!
//! Lexemes are sliced out of the `&str` at ASCII boundaries, so tokens own
//! valid UTF‑8 without re‑validation.  `//` comments are skipped with
//! `memchr` and keywords come from a compile‑time `phf` map.

use std::iter::FusedIterator;

use log::{debug, info};
use memchr::memchr;
use phf::phf_map;

use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and"    => TokenType::AND,
    "class"  => TokenType::CLASS,
    "else"   => TokenType::ELSE,
    "false"  => TokenType::FALSE,
    "fun"    => TokenType::FUN,
    "for"    => TokenType::FOR,
    "if"     => TokenType::IF,
    "nil"    => TokenType::NIL,
    "or"     => TokenType::OR,
    "print"  => TokenType::PRINT,
    "return" => TokenType::RETURN,
    "super"  => TokenType::SUPER,
    "this"   => TokenType::THIS,
    "true"   => TokenType::TRUE,
    "var"    => TokenType::VAR,
    "while"  => TokenType::WHILE,
};

pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    /// First byte of the lexeme being scanned.
    start: usize,
    /// Next byte to examine.
    pos: usize,
    line: usize,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        info!("Scanner created over {} bytes", source.len());

        Self {
            source,
            bytes: source.as_bytes(),
            start: 0,
            pos: 0,
            line: 1,
            done: false,
        }
    }

    /// Drain the scanner, keeping tokens and lexing errors apart.  The token
    /// list always ends with `EOF`.
    pub fn scan_tokens(self) -> (Vec<Token>, Vec<LoxError>) {
        let (mut tokens, mut errors) = (Vec::new(), Vec::new());

        for item in self {
            match item {
                Ok(token) => tokens.push(token),
                Err(e) => errors.push(e),
            }
        }

        debug!(
            "Scan finished: {} token(s), {} error(s)",
            tokens.len(),
            errors.len()
        );

        (tokens, errors)
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Byte `offset` positions ahead of the cursor, `0` past the end.
    #[inline]
    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    #[inline]
    fn bump(&mut self) -> u8 {
        let b: u8 = self.bytes[self.pos];
        self.pos += 1;
        b
    }

    /// `matched` if the next byte is `=` (consuming it), else `single`.
    fn with_equal(&mut self, matched: TokenType, single: TokenType) -> TokenType {
        if self.peek_at(0) == b'=' {
            self.pos += 1;
            matched
        } else {
            single
        }
    }

    fn lexeme(&self) -> &'a str {
        let source: &'a str = self.source;
        &source[self.start..self.pos]
    }

    /// Scan from `self.start`.  `Ok(None)` means whitespace or a comment was
    /// consumed and nothing is emitted.
    fn scan_token(&mut self) -> Result<Option<TokenType>> {
        let token_type: TokenType = match self.bump() {
            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b',' => TokenType::COMMA,
            b'.' => TokenType::DOT,
            b'-' => TokenType::MINUS,
            b'+' => TokenType::PLUS,
            b';' => TokenType::SEMICOLON,
            b'*' => TokenType::STAR,

            b'!' => self.with_equal(TokenType::BANG_EQUAL, TokenType::BANG),
            b'=' => self.with_equal(TokenType::EQUAL_EQUAL, TokenType::EQUAL),
            b'<' => self.with_equal(TokenType::LESS_EQUAL, TokenType::LESS),
            b'>' => self.with_equal(TokenType::GREATER_EQUAL, TokenType::GREATER),

            b'/' if self.peek_at(0) == b'/' => {
                // The newline itself is left for the line counter.
                self.pos = match memchr(b'\n', &self.bytes[self.pos..]) {
                    Some(offset) => self.pos + offset,
                    None => self.bytes.len(),
                };
                return Ok(None);
            }
            b'/' => TokenType::SLASH,

            b' ' | b'\r' | b'\t' => return Ok(None),
            b'\n' => {
                self.line += 1;
                return Ok(None);
            }

            b'"' => self.string()?,
            b'0'..=b'9' => self.number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier(),

            _ => {
                // Step over the whole character, which may be multi-byte.
                let c: char = self.source[self.start..]
                    .chars()
                    .next()
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                self.pos = self.start + c.len_utf8();

                return Err(LoxError::lex(
                    self.line,
                    format!("Unexpected character: {}", c),
                ));
            }
        };

        Ok(Some(token_type))
    }

    /// Strings may span lines; the token is stamped with the closing line.
    fn string(&mut self) -> Result<TokenType> {
        while !self.is_at_end() && self.peek_at(0) != b'"' {
            if self.bump() == b'\n' {
                self.line += 1;
            }
        }

        if self.is_at_end() {
            return Err(LoxError::lex(self.line, "Unterminated string."));
        }
        self.pos += 1;

        let contents: &str = &self.source[self.start + 1..self.pos - 1];
        Ok(TokenType::STRING(contents.to_owned()))
    }

    fn number(&mut self) -> TokenType {
        while self.peek_at(0).is_ascii_digit() {
            self.pos += 1;
        }

        // A trailing '.' without digits is left for the DOT token.
        if self.peek_at(0) == b'.' && self.peek_at(1).is_ascii_digit() {
            self.pos += 1;
            while self.peek_at(0).is_ascii_digit() {
                self.pos += 1;
            }
        }

        // Digits with an optional fraction always parse.
        TokenType::NUMBER(self.lexeme().parse().unwrap_or_default())
    }

    fn identifier(&mut self) -> TokenType {
        while matches!(self.peek_at(0), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.pos += 1;
        }

        KEYWORDS
            .get(self.lexeme())
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER)
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while !self.is_at_end() {
            self.start = self.pos;

            match self.scan_token() {
                Ok(Some(token_type)) => {
                    debug!("Scanned {:?} on line {}", token_type, self.line);
                    return Some(Ok(Token::new(token_type, self.lexeme(), self.line)));
                }
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }

        self.done = true;
        Some(Ok(Token::new(TokenType::EOF, "", self.line)))
    }
}

impl<'a> FusedIterator for Scanner<'a> {}
