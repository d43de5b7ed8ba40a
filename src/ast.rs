//! Syntax tree consumed by the resolver and the interpreter.
//!
//! Nodes that the resolver binds (`Variable`, `Assign`, `This`, `Super`)
//! carry an [`ExprId`]: the resolver's depth table is keyed on that id, not
//! on structural equality, so two identical `a` references at different
//! positions resolve independently.  Resolvable nodes are not
//! `Clone`: a copy would share the original's id and with it its depth.

use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::token::Token;

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

/// Stable identity of a resolvable expression node.
///
/// Ids come from one process‑wide counter, so nodes parsed from different
/// REPL lines never collide inside a long‑lived interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(usize);

impl ExprId {
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A **literal constant** that appears directly in the source code.
///
/// The parser copies the value out of the token so the tree does not
/// depend on the token buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,

    False,

    Nil,
}

/// A named variable reference, either read as an expression or named as a
/// class's superclass.
#[derive(Debug, PartialEq)]
pub struct Variable {
    pub id: ExprId,
    pub name: Token,
}

impl Variable {
    pub fn new(name: Token) -> Self {
        Self {
            id: ExprId::fresh(),
            name,
        }
    }
}

/// **Abstract‑Syntax‑Tree node** representing every kind of *expression*.
#[derive(Debug, PartialEq)]
pub enum Expr {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Prefix unary operator expression
    /// *Example:* `!isReady` or `-42`
    Unary { operator: Token, right: Box<Expr> },

    /// Infix binary operator expression
    /// *Example:* `a + b`, `x <= y`
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Parenthesised sub‑expression: `"(" expression ")"`.
    Grouping(Box<Expr>),

    /// Variable access.
    Variable(Variable),

    /// Assignment expression: `identifier "=" expression`
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },

    /// Short‑circuiting logical operators `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Function‑, method‑ or constructor‑call expression.
    Call {
        callee: Box<Expr>,
        /// The closing `)` token ‑ retained for error reporting.
        paren: Token,
        arguments: Vec<Expr>,
    },

    /// object.property
    Get { object: Box<Expr>, name: Token },

    /// object.property = value
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    /// The `this` keyword inside a method.
    This { id: ExprId, keyword: Token },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

/// A function or method declaration.  Shared behind `Rc` so every function
/// value created from it points at the same body.
#[derive(Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,

    /// Parameter name tokens (arity ≤ 255).
    pub params: Vec<Token>,

    pub body: Vec<Stmt>,
}

/// **Abstract‑Syntax‑Tree node** for *statements*.  A program is a
/// sequence of these nodes.
#[derive(Debug, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    /// `print` statement used for output.
    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop.  `for` loops are desugared into this by the parser.
    While { condition: Expr, body: Box<Stmt> },

    /// Function declaration ‑ becomes a first‑class callable value.
    Function(Rc<FunctionDecl>),

    Return {
        /// The `return` keyword token.
        keyword: Token,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    Class {
        name: Token,
        superclass: Option<Variable>,
        methods: Vec<Rc<FunctionDecl>>,
    },
}
