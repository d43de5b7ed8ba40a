//! Host functions installed into the global scope.

use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Instant;

use log::debug;

use crate::environment::Environment;
use crate::object::{Callable, NativeFunction};
use crate::value::Value;

static CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Defines every native function in `globals`.
pub fn define_globals(globals: &mut Environment) {
    CLOCK_ORIGIN.get_or_init(Instant::now);

    define(globals, "clock", 0, clock);
}

fn define(globals: &mut Environment, name: &'static str, arity: usize, func: fn(&[Value]) -> Value) {
    debug!("Defining native function '{}'", name);

    let native = NativeFunction { name, arity, func };
    globals.define(name, Value::Callable(Callable::Native(Rc::new(native))));
}

/// Seconds on a monotonic clock since the first interpreter was created.
fn clock(_args: &[Value]) -> Value {
    let origin: &Instant = CLOCK_ORIGIN.get_or_init(Instant::now);
    Value::Number(origin.elapsed().as_secs_f64())
}
