//! Component definitions and the class-scope API.
//!
//! A component definition is the record that replaces prototype-wired
//! constructors: an id, an optional super definition, the merged options,
//! plus the two snapshots (`sealed_options`, `extend_options`) that let
//! [`ComponentDef::resolve_options`] re-apply late changes to a super
//! definition (a global `mixin` after `extend`) onto existing subclasses.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::instance::options::{
    merge_options, option_value_same, AssetDef, OptionKey, OptionValue, Options, Registry,
};
use crate::types::{Str, Value};
use crate::util::{validate_component_name, warn};

thread_local! {
    static CID: Cell<u64> = const { Cell::new(1) };
    static BASE: RefCell<Option<ComponentDef>> = const { RefCell::new(None) };
}

struct ComponentDefData {
    cid: u64,
    name: RefCell<Option<Str>>,
    sup: Option<ComponentDef>,
    options: RefCell<Options>,
    /// The raw user input to `extend`.
    extend_options: Options,
    /// Snapshot of `options` at extend time, for diffing later mutations.
    sealed_options: RefCell<Options>,
    /// Snapshot of the super's options at extend time.
    super_options: RefCell<Options>,
    /// Subclass cache keyed by the identity of the options record. The
    /// record itself is retained so the key address stays unique.
    extend_cache: RefCell<FxHashMap<usize, (Rc<Options>, ComponentDef)>>,
    /// Installed plugins, by identity. Only used on the base definition.
    installed_plugins: RefCell<Vec<usize>>,
}

/// A component "constructor". Clone is handle-clone.
#[derive(Clone)]
pub struct ComponentDef {
    inner: Rc<ComponentDefData>,
}

fn next_cid() -> u64 {
    CID.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

fn base_options() -> Options {
    let mut options = Options::new();
    options.set(OptionKey::Components, OptionValue::Assets(Registry::new()));
    options.set(OptionKey::Directives, OptionValue::Assets(Registry::new()));
    options.set(OptionKey::Filters, OptionValue::Assets(Registry::new()));
    options.set(OptionKey::Base, OptionValue::Flag(true));
    options
}

impl ComponentDef {
    fn from_parts(
        cid: u64,
        name: Option<Str>,
        sup: Option<ComponentDef>,
        options: Options,
        extend_options: Options,
        super_options: Options,
    ) -> ComponentDef {
        ComponentDef {
            inner: Rc::new(ComponentDefData {
                cid,
                name: RefCell::new(name),
                sup,
                options: RefCell::new(options.clone()),
                extend_options,
                sealed_options: RefCell::new(options),
                super_options: RefCell::new(super_options),
                extend_cache: RefCell::new(FxHashMap::default()),
                installed_plugins: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The process-global root definition every instance ultimately derives
    /// from. Created on first use.
    pub fn base() -> ComponentDef {
        BASE.with(|b| {
            b.borrow_mut()
                .get_or_insert_with(|| {
                    ComponentDef::from_parts(
                        0,
                        None,
                        None,
                        base_options(),
                        Options::new(),
                        Options::new(),
                    )
                })
                .clone()
        })
    }

    /// Drop the global base definition (for testing).
    pub fn reset_base() {
        BASE.with(|b| *b.borrow_mut() = None);
    }

    pub fn cid(&self) -> u64 {
        self.inner.cid
    }

    pub fn name(&self) -> Option<Str> {
        self.inner.name.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &ComponentDef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a subclass definition with merged, sealed options. Cached per
    /// (this definition, options record) pair.
    pub fn extend(&self, extend_options: Rc<Options>) -> ComponentDef {
        let cache_key = Rc::as_ptr(&extend_options) as usize;
        if let Some((_, cached)) = self.inner.extend_cache.borrow().get(&cache_key) {
            return cached.clone();
        }

        let name = extend_options.option_name().or_else(|| self.name());
        if let Some(name) = &name {
            if let Err(msg) = validate_component_name(name) {
                warn(&msg, None);
            }
        }

        let super_options = self.resolve_options();
        let merged = merge_options(&super_options, &extend_options, None);
        let sub = ComponentDef::from_parts(
            next_cid(),
            name.clone(),
            Some(self.clone()),
            merged,
            (*extend_options).clone(),
            super_options,
        );

        // enable recursive self-lookup
        if let Some(name) = &name {
            if let Some(OptionValue::Assets(components)) =
                sub.inner.options.borrow().get(&OptionKey::Components)
            {
                components.insert(name, AssetDef::Component(sub.clone()));
            }
        }

        self.inner
            .extend_cache
            .borrow_mut()
            .insert(cache_key, (extend_options, sub.clone()));
        sub
    }

    /// Current options, with any later changes to super definitions folded
    /// in: the diff between the latest options and the sealed snapshot is
    /// re-applied over the freshly resolved super options.
    pub fn resolve_options(&self) -> Options {
        if let Some(sup) = &self.inner.sup {
            let super_options = sup.resolve_options();
            let super_changed = {
                let cached = self.inner.super_options.borrow();
                !options_same(&super_options, &cached)
            };
            if super_changed {
                *self.inner.super_options.borrow_mut() = super_options.clone();

                let modified = self.resolve_modified_options();
                let mut extend_options = self.inner.extend_options.clone();
                for (key, value) in modified {
                    extend_options.set(key, value);
                }

                let merged = merge_options(&super_options, &extend_options, None);
                if let Some(name) = self.name() {
                    if let Some(OptionValue::Assets(components)) =
                        merged.get(&OptionKey::Components)
                    {
                        components.insert(&name, AssetDef::Component(self.clone()));
                    }
                }
                *self.inner.options.borrow_mut() = merged;
            }
        }
        self.inner.options.borrow().clone()
    }

    /// Options mutated on this definition after sealing (e.g. by `mixin`).
    fn resolve_modified_options(&self) -> Vec<(OptionKey, OptionValue)> {
        let latest = self.inner.options.borrow();
        let sealed = self.inner.sealed_options.borrow();
        let mut modified = Vec::new();
        for key in latest.keys() {
            let latest_value = latest.get(&key).expect("key from keys()");
            let changed = match sealed.get(&key) {
                Some(sealed_value) => !option_value_same(latest_value, sealed_value),
                None => true,
            };
            if changed {
                modified.push((key, latest_value.clone()));
            }
        }
        modified
    }

    // -------------------------------------------------------------------------
    // Class-scope API
    // -------------------------------------------------------------------------

    /// Merge options into this definition globally. Affects every instance
    /// created afterwards, including existing subclasses via
    /// [`ComponentDef::resolve_options`].
    pub fn mixin(&self, mixin: Options) {
        let current = self.inner.options.borrow().clone();
        let merged = merge_options(&current, &mixin, None);
        *self.inner.options.borrow_mut() = merged;
    }

    /// Register a component, or fetch a registered one. Object-form
    /// definitions pass through `extend`.
    pub fn component(&self, id: &str, def: Option<AssetDef>) -> Option<AssetDef> {
        let registry = match self.inner.options.borrow().get(&OptionKey::Components) {
            Some(OptionValue::Assets(r)) => r.clone(),
            _ => return None,
        };
        let Some(def) = def else {
            return registry.get_own(id);
        };
        if let Err(msg) = validate_component_name(id) {
            warn(&msg, None);
        }
        let def = match def {
            AssetDef::ComponentOptions(options) => {
                let options = match options.option_name() {
                    Some(_) => options,
                    None => {
                        let named = (*options).clone().name(id);
                        Rc::new(named)
                    }
                };
                AssetDef::Component(self.extend(options))
            }
            other => other,
        };
        registry.insert(id, def.clone());
        Some(def)
    }

    /// Register a directive, or fetch a registered one.
    pub fn directive(&self, id: &str, def: Option<AssetDef>) -> Option<AssetDef> {
        let registry = match self.inner.options.borrow().get(&OptionKey::Directives) {
            Some(OptionValue::Assets(r)) => r.clone(),
            _ => return None,
        };
        match def {
            None => registry.get_own(id),
            Some(def) => {
                registry.insert(id, def.clone());
                Some(def)
            }
        }
    }

    /// Register a filter, or fetch a registered one.
    pub fn filter(&self, id: &str, def: Option<AssetDef>) -> Option<AssetDef> {
        let registry = match self.inner.options.borrow().get(&OptionKey::Filters) {
            Some(OptionValue::Assets(r)) => r.clone(),
            _ => return None,
        };
        match def {
            None => registry.get_own(id),
            Some(def) => {
                registry.insert(id, def.clone());
                Some(def)
            }
        }
    }

    /// Install a plugin. Idempotent per plugin identity.
    pub fn use_plugin(&self, plugin: Rc<dyn Plugin>, args: &[Value]) {
        let id = Rc::as_ptr(&plugin) as *const () as usize;
        {
            let mut installed = self.inner.installed_plugins.borrow_mut();
            if installed.contains(&id) {
                return;
            }
            installed.push(id);
        }
        plugin.install(self, args);
    }
}

/// A plugin installable on the base definition.
pub trait Plugin {
    fn install(&self, base: &ComponentDef, args: &[Value]);
}

impl<F: Fn(&ComponentDef, &[Value])> Plugin for F {
    fn install(&self, base: &ComponentDef, args: &[Value]) {
        self(base, args);
    }
}

fn options_same(a: &Options, b: &Options) -> bool {
    let a_keys = a.keys();
    if a_keys != b.keys() {
        return false;
    }
    a_keys.iter().all(|key| {
        match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => option_value_same(x, y),
            _ => false,
        }
    })
}
