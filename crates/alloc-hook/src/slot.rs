//! Hook registration.

use core::ptr;

use spin::RwLock;

/// Callback run when a backing allocator cannot satisfy a request.
pub trait AllocFailureHook: Sync {
    /// Called synchronously from within the failing allocation.
    ///
    /// Returning normally asks the allocator to retry the request.
    fn on_alloc_failure(&self);
}

/// A registered hook.
pub type Hook = &'static dyn AllocFailureHook;

/// Adapts a plain function into an [`AllocFailureHook`].
#[derive(Debug, Clone, Copy)]
pub struct FnHook(pub fn());

impl AllocFailureHook for FnHook {
    fn on_alloc_failure(&self) {
        (self.0)();
    }
}

/// A registration point holding at most one hook.
///
/// None of the methods allocate, so a hook may replace itself (or restore a
/// previous hook) while it runs.
pub struct HookSlot {
    current: RwLock<Option<Hook>>,
}

impl Default for HookSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl HookSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Installs `hook` and returns the one it replaced.
    pub fn replace(&self, hook: Option<Hook>) -> Option<Hook> {
        let mut current = self.current.write();
        core::mem::replace(&mut *current, hook)
    }

    #[must_use]
    pub fn get(&self) -> Option<Hook> {
        *self.current.read()
    }

    /// Returns `true` if `hook` is the hook currently installed.
    #[must_use]
    pub fn is_current(&self, hook: Hook) -> bool {
        self.get().is_some_and(|current| ptr::addr_eq(current, hook))
    }

    /// Runs the installed hook.
    ///
    /// Returns `false` if no hook is installed. The slot is not locked while
    /// the hook runs.
    pub fn invoke(&self) -> bool {
        let hook = self.get();
        match hook {
            Some(hook) => {
                hook.on_alloc_failure();
                true
            }
            None => false,
        }
    }
}

/// The process-wide slot used by [`RetryAlloc::new`](crate::RetryAlloc::new).
pub static GLOBAL_HOOK: HookSlot = HookSlot::new();

/// Installs a hook in [`GLOBAL_HOOK`], returning the previous one.
pub fn set_hook(hook: Option<Hook>) -> Option<Hook> {
    GLOBAL_HOOK.replace(hook)
}

/// Returns the hook installed in [`GLOBAL_HOOK`].
#[must_use]
pub fn hook() -> Option<Hook> {
    GLOBAL_HOOK.get()
}
