//! Dependency nodes and the active-target stack.
//!
//! A `Dep` is the pub half of the pub/sub primitive: one per reactive
//! property plus one per observed container. Watchers subscribe to deps by
//! being the active target while a reactive read happens.
//!
//! The target stack is thread-local; evaluation is single-threaded and
//! nested (a render read can trigger a computed evaluation), so the stack
//! restores the outer target on pop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::reactive::watcher::{Watcher, WeakWatcher};

thread_local! {
    static DEP_ID: Cell<u64> = const { Cell::new(0) };
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

struct DepData {
    id: u64,
    subs: Vec<(u64, WeakWatcher)>,
}

/// A dependency node. Clone is handle-clone; identity is stable for the
/// lifetime of the property that owns it.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<RefCell<DepData>>,
}

impl Dep {
    pub fn new() -> Dep {
        let id = DEP_ID.with(|c| {
            let id = c.get();
            c.set(id + 1);
            id
        });
        Dep {
            inner: Rc::new(RefCell::new(DepData {
                id,
                subs: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        self.inner
            .borrow_mut()
            .subs
            .push((watcher.id(), watcher.downgrade()));
    }

    pub(crate) fn remove_sub(&self, watcher_id: u64) {
        self.inner.borrow_mut().subs.retain(|(id, _)| *id != watcher_id);
    }

    /// Number of live subscribers. Test-facing.
    pub fn sub_count(&self) -> usize {
        self.inner
            .borrow()
            .subs
            .iter()
            .filter(|(_, w)| w.upgrade().is_some())
            .count()
    }

    /// Register this dep with the active target, if any.
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Notify subscribers, in watcher-id order (creation order: parents
    /// before children, user watchers before the render watcher).
    pub fn notify(&self) {
        let mut subs: Vec<Watcher> = {
            let mut data = self.inner.borrow_mut();
            data.subs.retain(|(_, w)| w.upgrade().is_some());
            data.subs
                .iter()
                .filter_map(|(_, w)| w.upgrade())
                .collect()
        };
        subs.sort_by_key(|w| w.id());
        for watcher in subs {
            watcher.update();
        }
    }
}

impl Default for Dep {
    fn default() -> Self {
        Dep::new()
    }
}

// =============================================================================
// Active-target stack
// =============================================================================

/// Push a watcher as the active target. `None` disables dependency
/// collection for the duration (used around data factories and hooks).
pub fn push_target(target: Option<Watcher>) {
    TARGET_STACK.with(|s| s.borrow_mut().push(target));
}

pub fn pop_target() {
    TARGET_STACK.with(|s| {
        s.borrow_mut().pop();
    });
}

pub fn current_target() -> Option<Watcher> {
    TARGET_STACK.with(|s| s.borrow().last().cloned().flatten())
}

pub fn has_target() -> bool {
    current_target().is_some()
}

/// Reset the target stack (for testing).
pub fn reset_target_stack() {
    TARGET_STACK.with(|s| s.borrow_mut().clear());
}
