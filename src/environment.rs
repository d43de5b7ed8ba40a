use crate::error::RuntimeError;
use crate::token::Token;
use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One scope of the environment chain.
///
/// Scopes are shared (`Rc<RefCell<_>>`): a block or call owns the scope it
/// creates, and so does every closure that captured it, so a scope lives
/// as long as its longest holder.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wraps a fresh scope for sharing.
    pub fn shared(self) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(self))
    }

    /// Binds `name` in this scope only, overwriting any previous binding.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Linear lookup through the chain.  Only used for unresolved (global)
    /// names.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(RuntimeError::UndefinedVariable {
                name: name.lexeme.clone(),
                line: name.line,
            })
        }
    }

    /// Assignment never defines: the name must already exist somewhere in
    /// the chain.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(RuntimeError::UndefinedVariable {
                name: name.lexeme.clone(),
                line: name.line,
            })
        }
    }

    /// Reads `name` from the scope exactly `depth` links out.
    ///
    /// # Panics
    ///
    /// If the chain is shorter than `depth` or the target scope lacks the
    /// name.  The resolver guarantees neither happens for a resolved
    /// program, so either one is an interpreter bug.
    pub fn get_at(&self, depth: usize, name: &str) -> Value {
        if depth == 0 {
            match self.values.get(name) {
                Some(value) => value.clone(),
                None => panic!("resolved variable '{}' missing from its scope", name),
            }
        } else {
            debug!("get_at: stepping out for '{}', {} left", name, depth);
            self.enclosing_or_panic(depth).borrow().get_at(depth - 1, name)
        }
    }

    /// Writes `name` in the scope exactly `depth` links out.  Same panics as
    /// [`Environment::get_at`].
    pub fn assign_at(&mut self, depth: usize, name: &str, value: Value) {
        if depth == 0 {
            match self.values.get_mut(name) {
                Some(slot) => *slot = value,
                None => panic!("resolved variable '{}' missing from its scope", name),
            }
        } else {
            self.enclosing_or_panic(depth)
                .borrow_mut()
                .assign_at(depth - 1, name, value);
        }
    }

    fn enclosing_or_panic(&self, depth: usize) -> &Rc<RefCell<Environment>> {
        match &self.enclosing {
            Some(enclosing) => enclosing,
            None => panic!("resolved depth overruns environment chain by {}", depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::IDENTIFIER, name, 1)
    }

    #[test]
    fn get_walks_to_enclosing() {
        let globals = Environment::new().shared();
        globals.borrow_mut().define("a", Value::Number(1.0));

        let inner = Environment::with_enclosing(globals.clone());

        assert_eq!(inner.get(&ident("a")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn get_undefined_fails() {
        let env = Environment::new();

        match env.get(&ident("missing")) {
            Err(RuntimeError::UndefinedVariable { name, line }) => {
                assert_eq!(name, "missing");
                assert_eq!(line, 1);
            }
            other => panic!("expected UndefinedVariable, got {:?}", other),
        }
    }

    #[test]
    fn assign_updates_defining_scope_and_never_defines() {
        let globals = Environment::new().shared();
        globals.borrow_mut().define("a", Value::Nil);

        let mut inner = Environment::with_enclosing(globals.clone());
        inner.assign(&ident("a"), Value::Bool(true)).unwrap();

        assert_eq!(globals.borrow().get(&ident("a")).unwrap(), Value::Bool(true));
        assert!(inner.assign(&ident("b"), Value::Nil).is_err());
        assert!(globals.borrow().get(&ident("b")).is_err());
    }

    #[test]
    fn depth_indexed_access_skips_shadowing() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define("x", Value::String("outer".into()));

        let middle = Environment::with_enclosing(outer.clone()).shared();
        middle.borrow_mut().define("x", Value::String("middle".into()));

        let mut inner = Environment::with_enclosing(middle.clone());

        assert_eq!(inner.get_at(2, "x"), Value::String("outer".into()));
        assert_eq!(inner.get_at(1, "x"), Value::String("middle".into()));

        inner.assign_at(2, "x", Value::Number(7.0));
        assert_eq!(outer.borrow().get_at(0, "x"), Value::Number(7.0));
        assert_eq!(middle.borrow().get_at(0, "x"), Value::String("middle".into()));
    }

    #[test]
    #[should_panic(expected = "overruns")]
    fn depth_past_global_is_a_bug() {
        let env = Environment::new();
        env.get_at(1, "x");
    }
}
