//! Prop validation and coercion.
//!
//! For each declared prop: locate the value in `propsData`, apply boolean
//! casting rules, fall back to the declared default (reusing the previous
//! default when a re-render passes nothing for the same key), then run the
//! type check, `required`, and the custom validator. Failures warn; the
//! value always passes through.

use crate::instance::options::{PropDefault, PropOptions, PropType};
use crate::instance::Instance;
use crate::reactive::observer::{observe, toggle_observing};
use crate::types::{Obj, Value};
use crate::util::{hyphenate, warn};

pub(crate) fn validate_prop(
    key: &str,
    prop: &PropOptions,
    props_data: &Obj,
    vm: &Instance,
) -> Value {
    let absent = !props_data.contains_key(key);
    let mut value = props_data.get_raw(key).unwrap_or(Value::Null);

    // boolean casting
    if let Some(bool_index) = type_index(prop, PropType::Bool) {
        if absent && prop.default.is_none() {
            value = Value::Bool(false);
        } else if value.as_str() == Some("") || value.as_str() == Some(&*hyphenate(key)) {
            // empty string / hyphenated-name shorthand casts to true unless
            // String is declared with higher priority
            let string_index = type_index(prop, PropType::Str);
            if string_index.is_none() || bool_index < string_index.unwrap() {
                value = Value::Bool(true);
            }
        }
    }

    if absent && value.is_null() {
        value = default_prop_value(vm, prop, key);
        // the default is fresh, unobserved data: always observe it
        let prev = toggle_observing(true);
        observe(&value);
        toggle_observing(prev);
    }

    assert_prop(key, prop, &value, absent, vm);
    value
}

fn type_index(prop: &PropOptions, wanted: PropType) -> Option<usize> {
    prop.types
        .as_ref()
        .and_then(|types| types.iter().position(|t| *t == wanted))
}

fn default_prop_value(vm: &Instance, prop: &PropOptions, key: &str) -> Value {
    let Some(default) = &prop.default else {
        return Value::Null;
    };
    // a re-render that passes nothing keeps the previous default, avoiding
    // an unnecessary watcher trigger
    let previous = vm.props().get_raw(key);
    if let Some(previous) = previous {
        if !previous.is_null() {
            return previous;
        }
    }
    match default {
        PropDefault::Value(value) => {
            if value.is_container() {
                warn(
                    &format!(
                        "Invalid default value for prop \"{key}\": Props with type \
                         Object/Array must use a factory function to return the \
                         default value."
                    ),
                    Some(vm),
                );
            }
            value.clone()
        }
        PropDefault::Factory(factory) => factory.call(Some(vm), &[]).unwrap_or(Value::Null),
    }
}

fn assert_prop(key: &str, prop: &PropOptions, value: &Value, absent: bool, vm: &Instance) {
    if prop.required && absent {
        warn(&format!("Missing required prop: \"{key}\""), Some(vm));
        return;
    }
    if value.is_null() && !prop.required {
        return;
    }
    if let Some(types) = &prop.types {
        let valid = types.iter().any(|t| t.matches(value));
        if !valid {
            let expected: Vec<&str> = types.iter().map(PropType::name).collect();
            warn(
                &format!(
                    "Invalid prop: type check failed for prop \"{key}\". \
                     Expected {}, got {}.",
                    expected.join(", "),
                    type_name(value),
                ),
                Some(vm),
            );
            return;
        }
    }
    if let Some(validator) = &prop.validator {
        let passed = validator
            .call(Some(vm), std::slice::from_ref(value))
            .map(|v| v.truthy())
            .unwrap_or(false);
        if !passed {
            warn(
                &format!("Invalid prop: custom validator check failed for prop \"{key}\"."),
                Some(vm),
            );
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::Str(_) => "String",
        Value::Object(_) => "Object",
        Value::Array(_) => "Array",
        Value::Func(_) => "Function",
    }
}
