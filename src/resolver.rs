//! Static resolver pass for the **Lox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<String, bool>` tracking declared/defined),
//!    pushing exactly where the interpreter will create environments: blocks,
//!    function calls, and the `super`/`this` scopes of bound methods.
//! 2. Report static errors without stopping (self‑inheritance, reading a
//!    variable in its own initializer, misplaced `return`/`this`/`super`,
//!    duplicate local declarations).
//! 3. Tell the interpreter, for every local variable occurrence, how many
//!    scopes out its binding lives.  Occurrences left unrecorded are globals
//!    and are looked up dynamically at runtime.  Nothing is recorded for a
//!    pass that reports an error, since that program never runs.

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::ResolveError;
use crate::interpreter::Interpreter;
use crate::token::Token;
use log::{debug, info};
use std::collections::HashMap;

/// What kind of function body are we in?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

/// What kind of class body are we in?  Used to validate `this`/`super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and *records* binding
/// distances by calling back into the interpreter.
pub struct Resolver<'interp> {
    interpreter: &'interp mut Interpreter,
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    current_function: FunctionType,
    current_class: ClassType,
    /// Global being initialised, so `var a = a;` is caught at top level too.
    initializing_global: Option<String>,
    /// Depths found so far; handed to the interpreter only if no error is.
    locals: Vec<(ExprId, usize)>,
    errors: Vec<ResolveError>,
}

impl<'interp> Resolver<'interp> {
    /// Create a new resolver bound to the given interpreter.
    pub fn new(interpreter: &'interp mut Interpreter) -> Self {
        info!("Resolver instantiated");
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            initializing_global: None,
            locals: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Walk all top‑level statements.  Every static error is collected;
    /// the program must not run if any are returned.
    pub fn resolve(mut self, statements: &[Stmt]) -> Result<(), Vec<ResolveError>> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        if self.errors.is_empty() {
            debug!("Committing {} local resolution(s)", self.locals.len());
            self.interpreter.note_locals(self.locals);
            Ok(())
        } else {
            info!("Resolve pass found {} error(s)", self.errors.len());
            Err(self.errors)
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    if self.scopes.is_empty() {
                        self.initializing_global = Some(name.lexeme.clone());
                    }
                    self.resolve_expr(expr);
                    self.initializing_global = None;
                }
                self.define(name);
            }

            Stmt::Function(declaration) => {
                // name is visible *inside* its own body
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(declaration, FunctionType::Function);
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing_class: ClassType = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(name);
                self.define(name);

                if let Some(superclass) = superclass {
                    if superclass.name.lexeme == name.lexeme {
                        self.error(ResolveError::SelfInheritance {
                            lexeme: superclass.name.lexeme.clone(),
                            line: superclass.name.line,
                        });
                    }

                    self.current_class = ClassType::Subclass;
                    self.resolve_local(superclass.id, &superclass.name);

                    self.begin_scope();
                    self.define_synthetic("super");
                }

                self.begin_scope();
                self.define_synthetic("this");

                for method in methods {
                    let kind: FunctionType = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };
                    self.resolve_function(method, kind);
                }

                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing_class;
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(ResolveError::ReturnOutsideFunction {
                        lexeme: keyword.lexeme.clone(),
                        line: keyword.line,
                    });
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(ResolveError::ReturnValueInInitializer {
                            lexeme: keyword.lexeme.clone(),
                            line: keyword.line,
                        });
                    }
                    self.resolve_expr(expr);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable(variable) => {
                let name: &Token = &variable.name;

                let in_own_initializer: bool = match self.scopes.last() {
                    Some(scope) => scope.get(&name.lexeme) == Some(&false),
                    None => self.initializing_global.as_deref() == Some(name.lexeme.as_str()),
                };

                if in_own_initializer {
                    self.error(ResolveError::SelfReferencingInitializer {
                        lexeme: name.lexeme.clone(),
                        line: name.line,
                    });
                }

                self.resolve_local(variable.id, name);
            }

            Expr::Assign { id, name, value } => {
                // First resolve RHS, then bind LHS
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(ResolveError::ThisOutsideClass {
                        lexeme: keyword.lexeme.clone(),
                        line: keyword.line,
                    });
                    return;
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                let reason: Option<&'static str> = match self.current_class {
                    ClassType::None => Some("outside of a class"),
                    ClassType::Class => Some("in a class with no superclass"),
                    ClassType::Subclass => None,
                };

                if let Some(reason) = reason {
                    self.error(ResolveError::SuperOutsideSubclass {
                        lexeme: keyword.lexeme.clone(),
                        line: keyword.line,
                        reason,
                    });
                    return;
                }

                self.resolve_local(*id, keyword);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function’s parameters + body.  The body's
    /// statements share the parameter scope, as they do at runtime.
    fn resolve_function(&mut self, declaration: &FunctionDecl, kind: FunctionType) {
        let enclosing: FunctionType = self.current_function;
        self.current_function = kind;

        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &declaration.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        if scope.contains_key(&name.lexeme) {
            let e = ResolveError::DuplicateDeclaration {
                lexeme: name.lexeme.clone(),
                line: name.line,
            };
            self.error(e);
            return;
        }

        scope.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// Binds `this`/`super` in the scope just pushed.
    fn define_synthetic(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    fn error(&mut self, error: ResolveError) {
        debug!("Static error: {}", error);
        self.errors.push(error);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as a local at depth `d`, or leave it
    /// unrecorded (global) if no scope declares it.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.locals.push((id, depth));
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn resolve(source: &str) -> Result<(), Vec<ResolveError>> {
        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty());
        let statements = Parser::new(tokens).parse().expect("program should parse");
        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter).resolve(&statements)
    }

    #[test]
    fn depths_are_recorded_only_when_resolution_succeeds() {
        let mut interpreter = Interpreter::new();
        let parse = |source: &str| {
            let (tokens, _) = Scanner::new(source).scan_tokens();
            Parser::new(tokens).parse().expect("program should parse")
        };

        let failing = parse("{ var a = 1; print a; return a; }");
        assert!(Resolver::new(&mut interpreter).resolve(&failing).is_err());
        assert_eq!(interpreter.local_count(), 0);

        let passing = parse("{ var a = 1; print a; a = 2; }");
        assert!(Resolver::new(&mut interpreter).resolve(&passing).is_ok());
        assert_eq!(interpreter.local_count(), 2);
    }

    #[test]
    fn self_reference_in_initializer_is_rejected_at_every_level() {
        for source in ["var a = a;", "{ var a = a; }", "fun f() { var b = 1 + b; }"] {
            let errors = resolve(source).unwrap_err();
            assert!(
                matches!(errors[0], ResolveError::SelfReferencingInitializer { .. }),
                "{}: {:?}",
                source,
                errors
            );
        }
    }

    #[test]
    fn shadowing_an_outer_name_in_initializer_is_still_self_reference() {
        let errors = resolve("var a = 1; { var a = a + 1; }").unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn return_rules() {
        let errors = resolve("return 1;").unwrap_err();
        assert!(matches!(errors[0], ResolveError::ReturnOutsideFunction { .. }));

        let errors = resolve("class A { init() { return 1; } }").unwrap_err();
        assert!(matches!(errors[0], ResolveError::ReturnValueInInitializer { .. }));

        assert!(resolve("class A { init() { return; } }").is_ok());
    }

    #[test]
    fn this_and_super_need_a_class() {
        let errors = resolve("print this;").unwrap_err();
        assert!(matches!(errors[0], ResolveError::ThisOutsideClass { .. }));

        let errors = resolve("fun f() { super.go(); }").unwrap_err();
        assert!(matches!(
            errors[0],
            ResolveError::SuperOutsideSubclass { reason: "outside of a class", .. }
        ));

        let errors = resolve("class A { go() { super.go(); } }").unwrap_err();
        assert!(matches!(
            errors[0],
            ResolveError::SuperOutsideSubclass { reason: "in a class with no superclass", .. }
        ));
    }

    #[test]
    fn class_cannot_inherit_from_itself() {
        let errors = resolve("class A < A {}").unwrap_err();
        assert_eq!(
            errors,
            vec![ResolveError::SelfInheritance {
                lexeme: "A".into(),
                line: 1
            }]
        );
    }

    #[test]
    fn duplicate_locals_but_not_globals() {
        assert!(resolve("var a = 1; var a = 2;").is_ok());

        let errors = resolve("fun f(x, x) {}").unwrap_err();
        assert!(matches!(errors[0], ResolveError::DuplicateDeclaration { .. }));
    }

    #[test]
    fn all_errors_are_collected() {
        let errors = resolve("return; print this; { var a = a; }").unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn globals_may_be_used_before_declaration() {
        assert!(resolve("fun f() { return g(); } fun g() { return 1; }").is_ok());
    }
}
