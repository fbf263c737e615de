//! Provide / inject resolution.
//!
//! `inject` resolves before `data`/`props` by walking the parent chain for
//! a `_provided` record owning the requested source key; `provide` resolves
//! after them. Injected values are installed as reactive, warn-on-write
//! properties, and descendants of freshly injected values are not observed.

use std::rc::Rc;

use crate::instance::options::{OptionKey, OptionValue, PropDefault};
use crate::instance::Instance;
use crate::reactive::observer::{define_reactive, toggle_observing};
use crate::types::{Str, Value};
use crate::util::warn;

pub(crate) fn init_injections(vm: &Instance) {
    let resolved = resolve_inject(vm);
    if resolved.is_empty() {
        return;
    }
    let injected = vm.inner.injected.borrow().clone();
    let prev = toggle_observing(false);
    for (key, value) in resolved {
        let warn_key = key.clone();
        let warn_vm = vm.downgrade();
        define_reactive(
            &injected,
            &key,
            Some(value),
            Some(Rc::new(move |_new: &Value| {
                let vm = warn_vm.upgrade();
                warn(
                    &format!(
                        "Avoid mutating an injected value directly since the changes \
                         will be overwritten whenever the provided component \
                         re-renders. injection being mutated: \"{warn_key}\""
                    ),
                    vm.as_ref(),
                );
            })),
            false,
        );
    }
    toggle_observing(prev);
}

fn resolve_inject(vm: &Instance) -> Vec<(Str, Value)> {
    let inject = match vm.options().get(&OptionKey::Inject) {
        Some(OptionValue::Inject(inject)) => inject.clone(),
        _ => return Vec::new(),
    };
    let mut resolved = Vec::new();
    for (key, def) in inject {
        let mut source = vm.parent();
        let mut found = None;
        while let Some(ancestor) = source {
            if let Some(provided) = ancestor.provided() {
                if provided.contains_key(&def.from) {
                    found = provided.get_raw(&def.from);
                    break;
                }
            }
            source = ancestor.parent();
        }
        match found {
            Some(value) => resolved.push((key, value)),
            None => match &def.default {
                Some(PropDefault::Value(value)) => resolved.push((key, value.clone())),
                Some(PropDefault::Factory(factory)) => {
                    let value = factory.call(Some(vm), &[]).unwrap_or(Value::Null);
                    resolved.push((key, value));
                }
                None => {
                    warn(&format!("Injection \"{key}\" not found"), Some(vm));
                }
            },
        }
    }
    resolved
}

pub(crate) fn init_provide(vm: &Instance) {
    let provide = match vm.options().get(&OptionKey::Provide) {
        Some(OptionValue::Provide(def)) => def.clone(),
        _ => return,
    };
    match provide.eval(Some(vm)) {
        Value::Object(provided) => {
            *vm.inner.provided.borrow_mut() = Some(provided);
        }
        Value::Null => {}
        other => {
            warn(
                &format!("provide should resolve to an object, got {other:?}"),
                Some(vm),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::instance::options::{InjectDef, Options, PropDefault};
    use crate::instance::Instance;
    use crate::types::{Obj, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_inject_resolves_through_ancestors() {
        let grandparent = Instance::new(Options::new().provide_obj(Obj::from_pairs([(
            "theme",
            Value::string("dark"),
        )])));
        let parent = Instance::new_child(&grandparent, Options::new());
        let child = Instance::new_child(&parent, Options::new().inject_names(&["theme"]));

        assert_eq!(child.get("theme"), Value::string("dark"));
    }

    #[test]
    fn test_inject_default_applies_when_missing() {
        let parent = Instance::new(Options::new());
        let child = Instance::new_child(
            &parent,
            Options::new().inject(
                "theme",
                InjectDef {
                    from: Rc::from("theme"),
                    default: Some(PropDefault::Value(Value::string("light"))),
                },
            ),
        );
        assert_eq!(child.get("theme"), Value::string("light"));
    }

    #[test]
    fn test_missing_injection_warns() {
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let handler = seen.clone();
        crate::util::set_warn_handler(move |msg, _| handler.borrow_mut().push(msg.into()));

        let parent = Instance::new(Options::new());
        let child = Instance::new_child(&parent, Options::new().inject_names(&["nothing"]));
        assert_eq!(child.get("nothing"), Value::Null);
        assert!(seen
            .borrow()
            .iter()
            .any(|w| w.contains("Injection \"nothing\" not found")));
        crate::util::reset_warn_state();
    }

    #[test]
    fn test_provide_function_form() {
        let parent = Instance::new(
            Options::new()
                .data_fn(|_| Value::Object(Obj::from_pairs([("color", Value::string("red"))])))
                .provide_fn(|vm| {
                    let color = vm.map(|vm| vm.get("color")).unwrap_or(Value::Null);
                    Value::Object(Obj::from_pairs([("color", color)]))
                }),
        );
        let child = Instance::new_child(&parent, Options::new().inject_names(&["color"]));
        assert_eq!(child.get("color"), Value::string("red"));
    }
}
