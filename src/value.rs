use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::object::{Callable, Instance};

/// Runtime value.  Strings, numbers, booleans and `nil` compare by value;
/// callables and instances compare by identity.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Callable(Callable),
    Instance(Rc<RefCell<Instance>>),
}

impl Value {
    /// `nil` and `false` are falsey; everything else, `0` and `""`
    /// included, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => fmt_number(*n, f),

            Value::String(s) => write!(f, "{}", s),

            Value::Callable(c) => write!(f, "{}", c),

            Value::Instance(instance) => write!(f, "{}", instance.borrow()),
        }
    }
}

/// Whole numbers print without a decimal point (`3`, not `3.0`).
fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        write!(f, "{}", if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        if n == 0.0 && n.is_sign_negative() {
            return write!(f, "-0");
        }
        let mut buf: itoa::Buffer = itoa::Buffer::new();
        write!(f, "{}", buf.format(n as i64))
    } else if n.fract() == 0.0 {
        write!(f, "{:.0}", n)
    } else {
        write!(f, "{}", n)
    }
}
