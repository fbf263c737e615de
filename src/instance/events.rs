//! The per-instance event bus.
//!
//! Handlers are stored per event name in registration order. `once` wraps
//! the handler in a self-removing shim that still deregisters by the
//! original reference. Emission snapshots the handler list first, so
//! handlers added or removed mid-emit take effect next time.

use crate::instance::error::invoke_with_error_handling;
use crate::instance::Instance;
use crate::types::{FnValue, Value};
use crate::util::tip;

#[derive(Clone)]
pub struct EventHandler {
    pub(crate) invoker: FnValue,
    /// For `once` shims: the user's original handler, so `off` can match it.
    pub(crate) original: Option<FnValue>,
}

impl Instance {
    /// Register a handler. Appends to the event's handler list.
    pub fn on(&self, event: &str, handler: FnValue) {
        if event.starts_with("hook:") {
            self.inner.has_hook_event.set(true);
        }
        self.inner
            .events
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(EventHandler {
                invoker: handler,
                original: None,
            });
    }

    /// Register a handler that removes itself after the first invocation.
    pub fn once(&self, event: &str, handler: FnValue) {
        let weak = self.downgrade();
        let event_name = event.to_string();
        let original = handler.clone();
        let shim_original = handler.clone();
        let invoker = FnValue::new(move |vm, args| {
            if let Some(instance) = weak.upgrade() {
                instance.off(&event_name, &shim_original);
            }
            handler.call(vm, args)
        });
        if event.starts_with("hook:") {
            self.inner.has_hook_event.set(true);
        }
        self.inner
            .events
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(EventHandler {
                invoker,
                original: Some(original),
            });
    }

    /// Remove every handler for every event.
    pub fn off_all(&self) {
        self.inner.events.borrow_mut().clear();
    }

    /// Remove every handler for one event.
    pub fn off_event(&self, event: &str) {
        self.inner.events.borrow_mut().remove(event);
    }

    /// Remove one handler, matching either the registered function or the
    /// original wrapped by `once`.
    pub fn off(&self, event: &str, handler: &FnValue) {
        let mut events = self.inner.events.borrow_mut();
        if let Some(handlers) = events.get_mut(event) {
            handlers.retain(|h| {
                !h.invoker.ptr_eq(handler)
                    && !h.original.as_ref().is_some_and(|o| o.ptr_eq(handler))
            });
            if handlers.is_empty() {
                events.remove(event);
            }
        }
    }

    /// Invoke every handler for an event, in registration order, with the
    /// instance as receiver. Handler errors route through the error channel.
    pub fn emit(&self, event: &str, args: &[Value]) {
        {
            let events = self.inner.events.borrow();
            if !events.contains_key(event) {
                let lowercase = event.to_ascii_lowercase();
                if lowercase != event && events.contains_key(&lowercase) {
                    tip(
                        &format!(
                            "Event \"{lowercase}\" is emitted in component but the handler \
                             is registered for \"{event}\". Note that HTML attributes are \
                             case-insensitive. You should use \"{lowercase}\" instead of \
                             \"{event}\"."
                        ),
                        Some(self),
                    );
                }
            }
        }
        let handlers: Vec<EventHandler> = self
            .inner
            .events
            .borrow()
            .get(event)
            .cloned()
            .unwrap_or_default();
        let info = format!("event handler for \"{event}\"");
        for handler in handlers {
            invoke_with_error_handling(&handler.invoker, Some(self), args, &info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::options::Options;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn collector() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> FnValue) {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let log_handler = log.clone();
        let make = move |tag: &str| {
            let log = log_handler.clone();
            let tag = tag.to_string();
            FnValue::simple(move |_, _| {
                log.borrow_mut().push(tag.clone());
                Value::Null
            })
        };
        (log, make)
    }

    #[test]
    fn test_emit_in_registration_order() {
        let vm = Instance::new(Options::new());
        let (log, make) = collector();

        vm.on("ping", make("first"));
        vm.on("ping", make("second"));
        vm.emit("ping", &[]);
        assert_eq!(log.borrow().as_slice(), ["first", "second"]);
    }

    #[test]
    fn test_once_self_removes() {
        let vm = Instance::new(Options::new());
        let (log, make) = collector();

        vm.once("ping", make("only"));
        vm.emit("ping", &[]);
        vm.emit("ping", &[]);
        assert_eq!(log.borrow().as_slice(), ["only"]);
    }

    #[test]
    fn test_off_matches_once_original() {
        let vm = Instance::new(Options::new());
        let (log, make) = collector();

        let handler = make("never");
        vm.once("ping", handler.clone());
        vm.off("ping", &handler);
        vm.emit("ping", &[]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_off_variants() {
        let vm = Instance::new(Options::new());
        let (log, make) = collector();

        let a = make("a");
        vm.on("ping", a.clone());
        vm.on("ping", make("b"));
        vm.on("pong", make("c"));

        vm.off("ping", &a);
        vm.emit("ping", &[]);
        assert_eq!(log.borrow().as_slice(), ["b"]);

        vm.off_event("ping");
        vm.emit("ping", &[]);
        assert_eq!(log.borrow().as_slice(), ["b"]);

        vm.off_all();
        vm.emit("pong", &[]);
        assert_eq!(log.borrow().as_slice(), ["b"]);
    }

    #[test]
    fn test_case_mismatch_tip() {
        let tips: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let tips_handler = tips.clone();
        crate::util::set_warn_handler(move |msg, _| tips_handler.borrow_mut().push(msg.into()));

        let vm = Instance::new(Options::new());
        let (_log, make) = collector();
        vm.on("myevent", make("x"));
        vm.emit("myEvent", &[]);

        assert_eq!(tips.borrow().len(), 1);
        assert!(tips.borrow()[0].contains("case-insensitive"));
        crate::util::reset_warn_state();
    }
}
