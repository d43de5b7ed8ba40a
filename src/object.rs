//! Runtime object model: callables, classes and instances.
//!
//! Methods are stored unbound on their [`LoxClass`] and bound afresh on
//! every property access that yields one.  Binding wraps the method's
//! defining closure in a `super` scope (only when the defining class has a
//! superclass) and then a `this` scope, mirroring the scopes the resolver
//! pushes around a class body.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::interpreter::{Flow, Interpreter};
use crate::token::Token;
use crate::value::Value;

/// Anything that can appear in callee position.
#[derive(Clone)]
pub enum Callable {
    Native(Rc<NativeFunction>),
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(function) => function.arity(),
            Callable::Class(class) => class.arity(),
        }
    }

    /// Invokes the callable.  The caller has already checked the argument
    /// count against [`Callable::arity`].
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match self {
            Callable::Native(native) => {
                debug!("Calling native function '{}'", native.name);
                Ok((native.func)(&arguments))
            }
            Callable::Function(function) => function.call(interpreter, arguments),
            Callable::Class(class) => LoxClass::construct(class, interpreter, arguments),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "<native fn>"),
            Callable::Function(function) => write!(f, "{}", function),
            Callable::Class(class) => write!(f, "{}", class.name),
        }
    }
}

// Closures can reach themselves through their environment, so Debug only
// prints names.
impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(native) => write!(f, "Native({})", native.name),
            Callable::Function(function) => write!(f, "Function({})", function.name()),
            Callable::Class(class) => write!(f, "Class({})", class.name),
        }
    }
}

/// Host function exposed as a global.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[Value]) -> Value,
}

/// A user function together with the scope it was declared in.
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Produces a copy of this method whose closure fixes `this` to
    /// `instance` and, if `superclass` is given, `super` to it.
    pub fn bind(
        &self,
        instance: Rc<RefCell<Instance>>,
        superclass: Option<Rc<LoxClass>>,
    ) -> LoxFunction {
        let mut enclosing: Rc<RefCell<Environment>> = self.closure.clone();

        if let Some(superclass) = superclass {
            let mut super_scope = Environment::with_enclosing(enclosing);
            super_scope.define("super", Value::Callable(Callable::Class(superclass)));
            enclosing = super_scope.shared();
        }

        let mut this_scope = Environment::with_enclosing(enclosing);
        this_scope.define("this", Value::Instance(instance));

        debug!("Bound method '{}'", self.name());

        LoxFunction {
            declaration: self.declaration.clone(),
            closure: this_scope.shared(),
            is_initializer: self.is_initializer,
        }
    }

    fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        debug!("Calling user-defined function '{}'", self.name());

        // The parameter scope doubles as the body's top-level block scope.
        let mut environment = Environment::with_enclosing(self.closure.clone());
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            environment.define(&param.lexeme, argument);
        }

        let flow: Flow = interpreter.execute_block(&self.declaration.body, environment.shared())?;

        if self.is_initializer {
            return Ok(self.closure.borrow().get_at(0, "this"));
        }

        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        })
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

/// A class: its name, optional superclass and unbound methods.  Immutable
/// once built.
pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn new(
        name: impl Into<String>,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
    ) -> Self {
        Self {
            name: name.into(),
            superclass,
            methods,
        }
    }

    /// Looks `name` up on this class, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        match self.methods.get(name) {
            Some(method) => Some(method.clone()),
            None => self.superclass.as_ref()?.find_method(name),
        }
    }

    /// Finds `name` like [`LoxClass::find_method`] and binds it to
    /// `instance`.  The `super` scope refers to the superclass of the class
    /// that *defines* the method, not of the instance's class.
    pub fn bind_method(&self, name: &str, instance: &Rc<RefCell<Instance>>) -> Option<LoxFunction> {
        match self.methods.get(name) {
            Some(method) => Some(method.bind(instance.clone(), self.superclass.clone())),
            None => self.superclass.as_ref()?.bind_method(name, instance),
        }
    }

    /// A class takes the arguments of its `init`, or none without one.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }

    /// Calling a class allocates an instance and runs `init` on it, if any.
    pub fn construct(
        class: &Rc<LoxClass>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));

        info!("Constructing instance of '{}'", class.name);

        if let Some(initializer) = class.bind_method("init", &instance) {
            initializer.call(interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

/// An object with dynamic fields.
pub struct Instance {
    class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    /// Fields shadow methods; a method is bound to `instance` on the way
    /// out.
    pub fn get(instance: &Rc<RefCell<Instance>>, name: &Token) -> Result<Value, RuntimeError> {
        let this = instance.borrow();

        if let Some(value) = this.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        match this.class.bind_method(&name.lexeme, instance) {
            Some(method) => Ok(Value::Callable(Callable::Function(Rc::new(method)))),
            None => Err(RuntimeError::UndefinedProperty {
                name: name.lexeme.clone(),
                line: name.line,
            }),
        }
    }

    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.name)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
