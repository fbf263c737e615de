//! Warning channel and global configuration.
//!
//! Every development-mode diagnostic in the crate flows through [`warn`].
//! By default warnings are emitted as `tracing` events; tests (and embedders)
//! install a handler via [`set_warn_handler`] to capture them instead.
//! Nothing in the core panics on user error.

use std::cell::RefCell;
use std::rc::Rc;

use crate::instance::Instance;

pub type WarnHandler = Rc<dyn Fn(&str, Option<&Instance>)>;

thread_local! {
    static SILENT: RefCell<bool> = const { RefCell::new(false) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Suppress all warnings (mirrors the handler-less production build).
pub fn set_silent(silent: bool) {
    SILENT.with(|s| *s.borrow_mut() = silent);
}

pub fn is_silent() -> bool {
    SILENT.with(|s| *s.borrow())
}

/// Install a warning hook. Replaces any previous hook.
pub fn set_warn_handler(handler: impl Fn(&str, Option<&Instance>) + 'static) {
    WARN_HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the warning hook and stop suppressing warnings.
pub fn reset_warn_state() {
    WARN_HANDLER.with(|h| *h.borrow_mut() = None);
    SILENT.with(|s| *s.borrow_mut() = false);
}

/// Report a development-mode warning.
///
/// Routed to the installed handler when one exists, otherwise emitted as a
/// `tracing::warn!` event unless silenced.
pub fn warn(msg: &str, vm: Option<&Instance>) {
    let handler = WARN_HANDLER.with(|h| h.borrow().clone());
    if let Some(handler) = handler {
        handler(msg, vm);
        return;
    }
    if !is_silent() {
        match vm.and_then(|vm| vm.component_name()) {
            Some(name) => tracing::warn!(component = %name, "{msg}"),
            None => tracing::warn!("{msg}"),
        }
    }
}

/// Lower-urgency hint. Same routing as [`warn`].
pub fn tip(msg: &str, vm: Option<&Instance>) {
    let handler = WARN_HANDLER.with(|h| h.borrow().clone());
    if let Some(handler) = handler {
        handler(msg, vm);
        return;
    }
    if !is_silent() {
        tracing::info!("{msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_warn_handler_captures() {
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        set_warn_handler(move |msg, _| {
            seen_clone.borrow_mut().push(msg.to_string());
        });

        warn("something is off", None);
        assert_eq!(seen.borrow().as_slice(), ["something is off"]);

        reset_warn_state();
        warn("dropped on the floor", None);
        assert_eq!(seen.borrow().len(), 1);
    }
}
