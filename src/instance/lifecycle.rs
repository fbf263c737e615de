//! Lifecycle hook invocation and teardown.

use crate::instance::error::invoke_with_error_handling;
use crate::instance::options::Hook;
use crate::instance::Instance;
use crate::reactive::dep::{pop_target, push_target};
use crate::reactive::watcher::Watcher;

/// Invoke a lifecycle hook's handlers with dep collection disabled. When a
/// `hook:` event handler is registered, the matching event fires too.
pub(crate) fn call_hook(vm: &Instance, hook: Hook) {
    push_target(None);
    let info = format!("{} hook", hook.name());
    for handler in vm.hooks(hook) {
        invoke_with_error_handling(&handler, Some(vm), &[], &info);
    }
    if vm.inner.has_hook_event.get() {
        vm.emit(&format!("hook:{}", hook.name()), &[]);
    }
    pop_target();
}

impl Instance {
    /// Tear the instance down: fire `beforeDestroy`, detach from the parent,
    /// tear down all watchers, release the root-data observer, fire
    /// `destroyed`, drop event handlers.
    pub fn destroy(&self) {
        if self.inner.is_being_destroyed.get() {
            return;
        }
        call_hook(self, Hook::BeforeDestroy);
        self.inner.is_being_destroyed.set(true);

        if let Some(parent) = self.parent() {
            if !parent.inner.is_being_destroyed.get() {
                parent
                    .inner
                    .children
                    .borrow_mut()
                    .retain(|child| !child.ptr_eq(self));
            }
        }

        if let Some(watcher) = self.inner.render_watcher.borrow_mut().take() {
            watcher.teardown();
        }
        let watchers: Vec<Watcher> = self.inner.watchers.borrow().clone();
        for watcher in watchers {
            watcher.teardown();
        }
        if let Some(ob) = self.inner.data.borrow().observer() {
            ob.dec_vm_count();
        }

        self.inner.is_destroyed.set(true);
        call_hook(self, Hook::Destroyed);
        self.off_all();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed.get()
    }

    /// Install the render watcher slot. The renderer owns the watcher's
    /// getter; the instance owns its teardown.
    pub fn set_render_watcher(&self, watcher: Watcher) {
        *self.inner.render_watcher.borrow_mut() = Some(watcher);
    }

    /// Force the render watcher (if installed) to re-run.
    pub fn force_update(&self) {
        let watcher = self.inner.render_watcher.borrow().clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }
}
