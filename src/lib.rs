//! # vine
//!
//! A reactive component runtime core: fine-grained dependency tracking over
//! a dynamic value model, an options-to-instance pipeline with a
//! strategy-driven merge algebra, and a streaming HTML template compiler
//! front-end.
//!
//! ## Architecture
//!
//! State lives in observed objects and arrays; every reactive property has a
//! dep, every observed container has one more. Watchers evaluate with
//! themselves as the active target, collecting exactly the deps they touch,
//! and re-run (queued, sync, or lazily) when any of them notifies:
//!
//! ```text
//! Obj/Arr slots → Dep ⇄ Watcher → scheduler flush → callbacks / render slot
//! ```
//!
//! Instances are built from option records merged per-key against their
//! component definition's options; templates compile through a streaming
//! scanner into an attributed element tree with static subtrees marked for
//! hoisting.
//!
//! Everything is single-threaded: process-wide state (dep ids, the active
//! target stack, the scheduler queue, the base component definition) is
//! thread-local.
//!
//! ## Modules
//!
//! - [`types`] - the dynamic `Value` model (`Obj`, `Arr`, `FnValue`)
//! - [`reactive`] - deps, watchers, observers, the scheduler
//! - [`instance`] - option merging, component definitions, instances
//! - [`compiler`] - HTML scanner, text parser, tree builder, optimizer
//! - [`util`] - warn channel, tag tables, shared helpers

pub mod compiler;
pub mod instance;
pub mod reactive;
pub mod types;
pub mod util;

pub use types::{merge_data, same_value, Arr, FnValue, Obj, Str, Value};

pub use reactive::{
    del, flush, next_tick, observe, set, toggle_observing, Dep, WatchSource, Watcher,
    WatcherOptions,
};

pub use instance::error::{reset_error_handler, set_error_handler, RuntimeError};
pub use instance::extend::{ComponentDef, Plugin};
pub use instance::options::{
    merge_options, reset_merge_strategies, set_merge_strategy, AssetDef, ComputedDef, DataDef,
    DirectiveDef, Hook, InjectDef, OptionKey, OptionValue, Options, PropDefault, PropOptions,
    PropType, Registry, WatchDef, WatchHandler,
};
pub use instance::{Instance, WatchOptions, WeakInstance};

pub use compiler::{
    compile_to_ast, parse_filters, parse_html, parse_text, CompileResult, CompileWarning,
    CompilerOptions, HtmlAttr, HtmlParseOptions, ParseHandler, ParsedText, TextToken,
};

pub use util::{set_silent, set_warn_handler};

/// Observe a value in place and return it: the class-scope `observable`.
pub fn observable(value: Value) -> Value {
    reactive::observe(&value);
    value
}
