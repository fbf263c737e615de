//! Watcher queue and flush.
//!
//! Non-sync watchers enqueue here on update and run when the host calls
//! [`flush`]. Within a flush, watchers run in ascending id order (parents
//! before children, user watchers before the render watcher of the same
//! instance), dedup'd by id; watchers queued mid-flush are spliced into id
//! position and run in the same pass. A watcher re-queueing itself more than
//! [`MAX_UPDATE_COUNT`] times in one flush is dropped with a warning.
//!
//! When the flush happens is the host event loop's decision; FIFO order and
//! id-dedup within a flush are the contract here. Next-tick callbacks run
//! after the queue drains.

use std::cell::{Cell, RefCell};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::reactive::watcher::Watcher;
use crate::util::warn;

pub const MAX_UPDATE_COUNT: usize = 100;

thread_local! {
    static QUEUE: RefCell<Vec<Watcher>> = const { RefCell::new(Vec::new()) };
    static HAS: RefCell<FxHashSet<u64>> = RefCell::new(FxHashSet::default());
    static CIRCULAR: RefCell<FxHashMap<u64, usize>> = RefCell::new(FxHashMap::default());
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
    static INDEX: Cell<usize> = const { Cell::new(0) };
    static CALLBACKS: RefCell<Vec<Box<dyn FnOnce()>>> = const { RefCell::new(Vec::new()) };
}

/// Enqueue a watcher, dedup'd by id. During a flush the watcher is spliced
/// into its id position so it still runs in this pass.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let already = HAS.with(|h| !h.borrow_mut().insert(id));
    if already {
        return;
    }
    if !FLUSHING.with(|f| f.get()) {
        QUEUE.with(|q| q.borrow_mut().push(watcher));
        return;
    }
    QUEUE.with(|q| {
        let mut queue = q.borrow_mut();
        let index = INDEX.with(|i| i.get());
        let mut at = queue.len();
        while at > index + 1 && queue[at - 1].id() > id {
            at -= 1;
        }
        queue.insert(at, watcher);
    });
}

/// True when watchers or next-tick callbacks are waiting for a flush.
pub fn has_pending() -> bool {
    QUEUE.with(|q| !q.borrow().is_empty()) || CALLBACKS.with(|c| !c.borrow().is_empty())
}

/// Register a callback to run after the next flush drains the queue.
pub fn next_tick(cb: impl FnOnce() + 'static) {
    CALLBACKS.with(|c| c.borrow_mut().push(Box::new(cb)));
}

/// Drain the watcher queue, then run next-tick callbacks.
pub fn flush() {
    FLUSHING.with(|f| f.set(true));
    QUEUE.with(|q| q.borrow_mut().sort_by_key(|w| w.id()));

    loop {
        let current = {
            let index = INDEX.with(|i| i.get());
            QUEUE.with(|q| q.borrow().get(index).cloned())
        };
        let Some(watcher) = current else { break };
        let id = watcher.id();

        watcher.call_before();
        HAS.with(|h| h.borrow_mut().remove(&id));
        watcher.run();

        // the watcher re-queued itself during its own run
        let requeued = HAS.with(|h| h.borrow().contains(&id));
        if requeued {
            let count = CIRCULAR.with(|c| {
                let mut circular = c.borrow_mut();
                let count = circular.entry(id).or_insert(0);
                *count += 1;
                *count
            });
            if count > MAX_UPDATE_COUNT {
                warn(
                    &format!(
                        "You may have an infinite update loop in watcher \
                         with expression \"{}\"",
                        watcher.expression()
                    ),
                    None,
                );
                HAS.with(|h| h.borrow_mut().remove(&id));
                let index = INDEX.with(|i| i.get());
                QUEUE.with(|q| {
                    let mut queue = q.borrow_mut();
                    let mut i = index + 1;
                    while i < queue.len() {
                        if queue[i].id() == id {
                            queue.remove(i);
                        } else {
                            i += 1;
                        }
                    }
                });
            }
        }

        INDEX.with(|i| i.set(i.get() + 1));
    }

    QUEUE.with(|q| q.borrow_mut().clear());
    HAS.with(|h| h.borrow_mut().clear());
    CIRCULAR.with(|c| c.borrow_mut().clear());
    INDEX.with(|i| i.set(0));
    FLUSHING.with(|f| f.set(false));

    let callbacks = CALLBACKS.with(|c| std::mem::take(&mut *c.borrow_mut()));
    for cb in callbacks {
        cb();
    }
}

/// Reset all scheduler state (for testing).
pub fn reset_scheduler_state() {
    QUEUE.with(|q| q.borrow_mut().clear());
    HAS.with(|h| h.borrow_mut().clear());
    CIRCULAR.with(|c| c.borrow_mut().clear());
    INDEX.with(|i| i.set(0));
    FLUSHING.with(|f| f.set(false));
    CALLBACKS.with(|c| c.borrow_mut().clear());
}
