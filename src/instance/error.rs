//! The error channel.
//!
//! User-function failures are values, not panics. They propagate up the
//! `errorCaptured` ancestor chain; an unhandled error reaches the global
//! error handler, and failing that, the warn channel. Nothing here throws.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::instance::options::Hook;
use crate::instance::Instance;
use crate::types::{FnValue, Value};
use crate::util::warn;

/// An error produced by user code (data factory, watcher callback, lifecycle
/// hook, event handler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Message(String),
}

impl RuntimeError {
    pub fn msg(message: impl Into<String>) -> RuntimeError {
        RuntimeError::Message(message.into())
    }
}

pub type ErrorHandler = Rc<dyn Fn(&RuntimeError, Option<&Instance>, &str)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
}

/// Install the global error handler, the last stop for unhandled errors.
pub fn set_error_handler(handler: impl Fn(&RuntimeError, Option<&Instance>, &str) + 'static) {
    ERROR_HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

pub fn reset_error_handler() {
    ERROR_HANDLER.with(|h| *h.borrow_mut() = None);
}

/// Route an error through the `errorCaptured` ancestor chain, then the
/// global handler. A capture hook returning `false` stops propagation.
pub fn handle_error(err: &RuntimeError, vm: Option<&Instance>, info: &str) {
    if let Some(vm) = vm {
        let mut current = vm.parent();
        while let Some(cur) = current {
            for hook in cur.hooks(Hook::ErrorCaptured) {
                match hook.call(
                    Some(&cur),
                    &[Value::string(err.to_string()), Value::string(info)],
                ) {
                    Ok(result) => {
                        if result == Value::Bool(false) {
                            return;
                        }
                    }
                    Err(nested) => {
                        global_handle_error(&nested, Some(&cur), "errorCaptured hook");
                    }
                }
            }
            current = cur.parent();
        }
    }
    global_handle_error(err, vm, info);
}

fn global_handle_error(err: &RuntimeError, vm: Option<&Instance>, info: &str) {
    let handler = ERROR_HANDLER.with(|h| h.borrow().clone());
    if let Some(handler) = handler {
        handler(err, vm, info);
        return;
    }
    warn(&format!("Error in {info}: \"{err}\""), vm);
}

/// Invoke a user function, routing any error through the channel. Returns
/// `Value::Null` on failure.
pub fn invoke_with_error_handling(
    f: &FnValue,
    vm: Option<&Instance>,
    args: &[Value],
    info: &str,
) -> Value {
    match f.call(vm, args) {
        Ok(value) => value,
        Err(err) => {
            handle_error(&err, vm, info);
            Value::Null
        }
    }
}
