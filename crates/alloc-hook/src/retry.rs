//! A global allocator adapter that retries failed requests.

use core::alloc::{GlobalAlloc, Layout};

use crate::slot::{GLOBAL_HOOK, HookSlot};

/// Wraps a backing allocator and runs the hook of a [`HookSlot`] whenever the
/// backing allocator fails.
///
/// After the hook returns the request is retried. When the slot is empty the
/// null pointer is passed on, and Rust's usual allocation-error handling
/// takes over.
pub struct RetryAlloc<A>
where
    A: 'static,
{
    inner: &'static A,
    slot: &'static HookSlot,
}

impl<A> RetryAlloc<A>
where
    A: 'static,
{
    /// Creates an adapter bound to [`GLOBAL_HOOK`].
    #[must_use]
    pub const fn new(inner: &'static A) -> Self {
        Self::with_slot(inner, &GLOBAL_HOOK)
    }

    #[must_use]
    pub const fn with_slot(inner: &'static A, slot: &'static HookSlot) -> Self {
        Self { inner, slot }
    }

    #[must_use]
    pub fn inner(&self) -> &'static A {
        self.inner
    }

    #[must_use]
    pub fn slot(&self) -> &'static HookSlot {
        self.slot
    }

    fn retry<F>(&self, mut f: F) -> *mut u8
    where
        F: FnMut() -> *mut u8,
    {
        loop {
            let ptr = f();
            if !ptr.is_null() || !self.slot.invoke() {
                return ptr;
            }
        }
    }
}

unsafe impl<A> GlobalAlloc for RetryAlloc<A>
where
    A: GlobalAlloc + 'static,
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.retry(|| unsafe { self.inner.alloc(layout) })
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.retry(|| unsafe { self.inner.alloc_zeroed(layout) })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // A failed `realloc` leaves `ptr` untouched, so retrying is sound.
        self.retry(|| unsafe { self.inner.realloc(ptr, layout, new_size) })
    }
}
