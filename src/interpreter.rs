use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Expr, ExprId, LiteralValue, Stmt};
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::native;
use crate::object::{Callable, Instance, LoxClass, LoxFunction};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// How a statement finished.  `Return` unwinds to the nearest call
/// boundary, passing untouched through blocks and loops.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
}

/// Convenient alias for interpreter results.
pub type IResult<T> = Result<T, RuntimeError>;

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    /// Scope distance of every locally bound `Variable`/`Assign`/`This`/
    /// `Super` node, filled in by the resolver.  Missing ⇒ global.
    locals: HashMap<ExprId, usize>,
    out: Box<dyn Write>,
}

impl Interpreter {
    /// Creates a new Interpreter printing to stdout, with native functions
    /// such as `clock` defined.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Like [`Interpreter::new`], but `print` writes to `out`.
    pub fn with_output<W: Write + 'static>(out: W) -> Self {
        info!("Initializing Interpreter");

        let mut globals = Environment::new();
        native::define_globals(&mut globals);
        let globals: Rc<RefCell<Environment>> = globals.shared();

        Self {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
            out: Box::new(out),
        }
    }

    /// Records, for each `(id, depth)`, that node `id` refers to a binding
    /// `depth` scopes out.  Only called with a program that resolved cleanly.
    pub fn note_locals<I>(&mut self, depths: I)
    where
        I: IntoIterator<Item = (ExprId, usize)>,
    {
        self.locals.extend(depths);
        debug!("Depth table now holds {} entries", self.locals.len());
    }

    /// Number of nodes currently resolved to a local scope.
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Interprets a list of statements (a "program").  The first runtime
    /// error stops the run; the global scope survives for the next call.
    pub fn interpret(&mut self, statements: &[Stmt]) -> IResult<()> {
        debug!("Interpreting {} statements", statements.len());

        let outcome: IResult<()> = statements
            .iter()
            .try_for_each(|stmt| self.execute(stmt).map(|_| ()));

        // Whatever was printed before an error must reach the sink first.
        let flushed: io::Result<()> = self.out.flush();
        outcome?;
        flushed?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> IResult<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
                debug!("Printed value: {}", value);
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.environment.borrow_mut().define(&name.lexeme, value);
            }

            Stmt::Block(statements) => {
                let scope = Environment::with_enclosing(self.environment.clone());
                return self.execute_block(statements, scope.shared());
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.execute(else_branch);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }

            Stmt::Function(declaration) => {
                // The closure is the scope active at the declaration.
                let function =
                    LoxFunction::new(declaration.clone(), self.environment.clone(), false);
                info!(
                    "Function '{}' defined with {} parameters",
                    declaration.name.lexeme,
                    declaration.params.len()
                );
                self.environment.borrow_mut().define(
                    &declaration.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                return Ok(Flow::Return(value));
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass: Option<Rc<LoxClass>> = match superclass {
                    Some(variable) => match self.look_up_variable(variable.id, &variable.name)? {
                        Value::Callable(Callable::Class(class)) => Some(class),
                        _ => {
                            return Err(RuntimeError::type_mismatch(
                                variable.name.line,
                                "Superclass must be a class.",
                            ))
                        }
                    },
                    None => None,
                };

                // Define first, assign later: methods may name the class.
                self.environment
                    .borrow_mut()
                    .define(&name.lexeme, Value::Nil);

                let methods: HashMap<String, Rc<LoxFunction>> = methods
                    .iter()
                    .map(|declaration| {
                        let is_initializer: bool = declaration.name.lexeme == "init";
                        let method = LoxFunction::new(
                            declaration.clone(),
                            self.environment.clone(),
                            is_initializer,
                        );
                        (declaration.name.lexeme.clone(), Rc::new(method))
                    })
                    .collect();

                info!(
                    "Class '{}' declared with {} method(s)",
                    name.lexeme,
                    methods.len()
                );

                let class = LoxClass::new(name.lexeme.clone(), superclass, methods);
                self.environment
                    .borrow_mut()
                    .assign(name, Value::Callable(Callable::Class(Rc::new(class))))?;
            }
        }

        Ok(Flow::Normal)
    }

    /// Runs `statements` with `environment` active, restoring the previous
    /// environment however the block exits.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> IResult<Flow> {
        let previous: Rc<RefCell<Environment>> = mem::replace(&mut self.environment, environment);

        let result: IResult<Flow> = self.execute_all(statements);

        self.environment = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt]) -> IResult<Flow> {
        for stmt in statements {
            if let Flow::Return(value) = self.execute(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> IResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(evaluate_literal(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;

                let short_circuits: bool = if operator.token_type == TokenType::OR {
                    left.is_truthy()
                } else {
                    !left.is_truthy()
                };

                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable(variable) => self.look_up_variable(variable.id, &variable.name),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&depth) => {
                        self.environment
                            .borrow_mut()
                            .assign_at(depth, &name.lexeme, value.clone());
                    }
                    None => {
                        self.globals.borrow_mut().assign(name, value.clone())?;
                    }
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee: Value = self.evaluate(callee)?;

                let mut values: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                self.invoke_callable(callee, paren, values)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Instance::get(&instance, name),
                _ => Err(RuntimeError::type_mismatch(
                    name.line,
                    "Only instances have properties.",
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(RuntimeError::type_mismatch(
                        name.line,
                        "Only instances have fields.",
                    ));
                };

                let value: Value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super { id, method, .. } => self.evaluate_super(*id, method),
        }
    }

    /// Evaluates a unary expression.
    fn evaluate_unary(&mut self, op: &Token, right: &Expr) -> IResult<Value> {
        let right: Value = self.evaluate(right)?;

        match op.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::type_mismatch(
                    op.line,
                    "Operand must be a number.",
                )),
            },
            TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
            _ => unreachable!("parser only builds '-' and '!' unary nodes"),
        }
    }

    /// Evaluates a binary expression.
    fn evaluate_binary(&mut self, left: &Expr, op: &Token, right: &Expr) -> IResult<Value> {
        let left: Value = self.evaluate(left)?;
        let right: Value = self.evaluate(right)?;

        debug!("Binary '{}': {} , {}", op.lexeme, left, right);

        match op.token_type {
            TokenType::PLUS => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), b) => Ok(Value::String(format!("{}{}", a, b))),
                (a, Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
                _ => Err(RuntimeError::type_mismatch(
                    op.line,
                    "Operands must be two numbers or at least one string.",
                )),
            },

            TokenType::MINUS => numeric(op, left, right, |a, b| Value::Number(a - b)),
            TokenType::STAR => numeric(op, left, right, |a, b| Value::Number(a * b)),
            // IEEE semantics: x / 0 is ±Infinity or NaN, never an error.
            TokenType::SLASH => numeric(op, left, right, |a, b| Value::Number(a / b)),

            TokenType::GREATER => numeric(op, left, right, |a, b| Value::Bool(a > b)),
            TokenType::GREATER_EQUAL => numeric(op, left, right, |a, b| Value::Bool(a >= b)),
            TokenType::LESS => numeric(op, left, right, |a, b| Value::Bool(a < b)),
            TokenType::LESS_EQUAL => numeric(op, left, right, |a, b| Value::Bool(a <= b)),

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

            _ => unreachable!("parser only builds binary nodes for binary operators"),
        }
    }

    /// Resolved names read from their exact scope; the rest are globals.
    fn look_up_variable(&self, id: ExprId, name: &Token) -> IResult<Value> {
        match self.locals.get(&id) {
            Some(&depth) => {
                debug!("Variable '{}' resolved at depth {}", name.lexeme, depth);
                Ok(self.environment.borrow().get_at(depth, &name.lexeme))
            }
            None => self.globals.borrow().get(name),
        }
    }

    /// `super.method`: look the method up from the superclass bound in the
    /// `super` scope and bind it to the `this` one scope nearer.
    fn evaluate_super(&self, id: ExprId, method: &Token) -> IResult<Value> {
        let Some(&depth) = self.locals.get(&id) else {
            panic!("'super' on line {} was never resolved", method.line);
        };

        let superclass: Value = self.environment.borrow().get_at(depth, "super");
        let this: Value = self.environment.borrow().get_at(depth - 1, "this");

        let (Value::Callable(Callable::Class(superclass)), Value::Instance(instance)) =
            (superclass, this)
        else {
            panic!("'super'/'this' scopes hold unexpected values");
        };

        match superclass.bind_method(&method.lexeme, &instance) {
            Some(bound) => Ok(Value::Callable(Callable::Function(Rc::new(bound)))),
            None => Err(RuntimeError::UndefinedProperty {
                name: method.lexeme.clone(),
                line: method.line,
            }),
        }
    }

    /// Invokes a callable (native function, user function or class).
    fn invoke_callable(
        &mut self,
        callee: Value,
        paren: &Token,
        arguments: Vec<Value>,
    ) -> IResult<Value> {
        let Value::Callable(callable) = callee else {
            return Err(RuntimeError::NotCallable { line: paren.line });
        };

        if arguments.len() != callable.arity() {
            return Err(RuntimeError::ArityMismatch {
                expected: callable.arity(),
                got: arguments.len(),
                line: paren.line,
            });
        }

        debug!("Calling {} with {} argument(s)", callable, arguments.len());

        callable.call(self, arguments)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate_literal(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::True => Value::Bool(true),
        LiteralValue::False => Value::Bool(false),
        LiteralValue::Nil => Value::Nil,
    }
}

/// Applies `f` when both operands are numbers.
fn numeric(op: &Token, left: Value, right: Value, f: impl Fn(f64, f64) -> Value) -> IResult<Value> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(f(a, b)),
        _ => Err(RuntimeError::type_mismatch(
            op.line,
            "Operands must be numbers.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    /// Shared in-memory sink so the test can read what `print` wrote.
    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(source: &str) -> (String, IResult<()>) {
        let capture = Capture::default();
        let mut interpreter = Interpreter::with_output(capture.clone());

        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty(), "lex errors: {:?}", errors);
        let statements = Parser::new(tokens).parse().expect("program should parse");
        Resolver::new(&mut interpreter)
            .resolve(&statements)
            .expect("program should resolve");

        let result = interpreter.interpret(&statements);
        let output = String::from_utf8(capture.0.borrow().clone()).unwrap();
        (output, result)
    }

    #[test]
    fn buffered_output_is_flushed_before_a_runtime_error() {
        let capture = Capture::default();
        let mut interpreter = Interpreter::with_output(io::BufWriter::new(capture.clone()));

        let (tokens, _) = Scanner::new("print \"before\";\nprint -\"x\";").scan_tokens();
        let statements = Parser::new(tokens).parse().expect("program should parse");
        Resolver::new(&mut interpreter)
            .resolve(&statements)
            .expect("program should resolve");

        let result = interpreter.interpret(&statements);

        assert_eq!(
            result.unwrap_err().to_string(),
            "Operand must be a number.\n[line 2]"
        );
        assert_eq!(capture.0.borrow().as_slice(), b"before\n");
    }

    #[test]
    fn arithmetic_and_concatenation() {
        let (out, result) = run("print 1 + 2 * 3; print \"a\" + 1; print 2 + \"b\"; print 7 / 2;");
        assert!(result.is_ok());
        assert_eq!(out, "7\na1\n2b\n3.5\n");
    }

    #[test]
    fn division_by_zero_follows_ieee() {
        let (out, result) = run("print 1 / 0; print -1 / 0; print 0 / 0 == 0 / 0;");
        assert!(result.is_ok());
        assert_eq!(out, "Infinity\n-Infinity\nfalse\n");
    }

    #[test]
    fn logical_operators_return_operands() {
        let (out, _) = run("print nil or \"x\"; print 1 and 2; print false and boom; print 0 or boom;");
        assert_eq!(out, "x\n2\nfalse\n0\n");
    }

    #[test]
    fn negating_a_string_is_a_type_mismatch() {
        let (_, result) = run("print -\"a\";");
        assert!(matches!(result, Err(RuntimeError::TypeMismatch { line: 1, .. })));
    }

    #[test]
    fn comparison_requires_numbers() {
        let (_, result) = run("print 1 < \"2\";");
        match result {
            Err(RuntimeError::TypeMismatch { message, .. }) => {
                assert_eq!(message, "Operands must be numbers.")
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn plus_without_strings_or_numbers_fails() {
        let (_, result) = run("print nil + true;");
        assert!(matches!(result, Err(RuntimeError::TypeMismatch { .. })));
    }

    #[test]
    fn return_unwinds_through_loops_and_blocks() {
        let (out, result) = run(
            "fun find() { var i = 0; while (true) { { if (i == 3) return i; } i = i + 1; } }
             print find();",
        );
        assert!(result.is_ok());
        assert_eq!(out, "3\n");
    }

    #[test]
    fn environment_is_restored_after_error_in_block() {
        let capture = Capture::default();
        let mut interpreter = Interpreter::with_output(capture.clone());

        let program = |src: &str, interpreter: &mut Interpreter| {
            let (tokens, _) = Scanner::new(src).scan_tokens();
            let statements = Parser::new(tokens).parse().unwrap();
            Resolver::new(interpreter).resolve(&statements).unwrap();
            interpreter.interpret(&statements)
        };

        assert!(program("var a = \"global\"; { var a = \"local\"; undefined(); }", &mut interpreter).is_err());
        // Declared in whatever scope is active: must be the global one again.
        assert!(program("var b = a; print b;", &mut interpreter).is_ok());
        assert_eq!(String::from_utf8(capture.0.borrow().clone()).unwrap(), "global\n");
    }

    #[test]
    fn clock_is_a_zero_arity_native() {
        let (out, result) = run("print clock; print clock() >= 0; clock(1);");
        assert_eq!(out, "<native fn>\ntrue\n");
        assert!(matches!(
            result,
            Err(RuntimeError::ArityMismatch { expected: 0, got: 1, .. })
        ));
    }
}
