//! The reactivity engine.
//!
//! Dependency graph primitives (`dep`, `watcher`), container observation
//! (`observer`, `array`), the flush queue (`scheduler`), and deep traversal
//! for `deep` watchers (`traverse`).

pub mod array;
pub mod dep;
pub mod observer;
pub mod scheduler;
pub mod traverse;
pub mod watcher;

pub use dep::{current_target, has_target, pop_target, push_target, Dep};
pub use observer::{
    define_reactive, del, observe, observe_as_root, set, toggle_observing, Observer,
};
pub use scheduler::{flush, next_tick, queue_watcher, reset_scheduler_state, MAX_UPDATE_COUNT};
pub use traverse::traverse;
pub use watcher::{WatchCallback, WatchSource, Watcher, WatcherOptions};
