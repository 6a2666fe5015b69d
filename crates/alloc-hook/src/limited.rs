//! A byte budget on top of another allocator.

use core::{
    alloc::{GlobalAlloc, Layout},
    sync::atomic::{AtomicUsize, Ordering},
};

/// Fails every request that would push the number of live bytes above a
/// limit.
///
/// Only the sizes requested through the adapter are counted; the inner
/// allocator's own overhead is not. The limit can be changed at any time,
/// lowering it below the current usage only makes further requests fail.
#[derive(Debug)]
pub struct LimitedAlloc<A> {
    inner: A,
    limit: AtomicUsize,
    used: AtomicUsize,
}

impl<A> LimitedAlloc<A> {
    #[must_use]
    pub const fn new(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit: AtomicUsize::new(limit),
            used: AtomicUsize::new(0),
        }
    }

    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Release);
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }

    /// Bytes currently handed out.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes that can still be requested.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.limit().saturating_sub(self.used())
    }

    fn charge(&self, size: usize) -> bool {
        let limit = self.limit();
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= limit)
            })
            .is_ok()
    }

    fn refund(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }
}

unsafe impl<A> GlobalAlloc for LimitedAlloc<A>
where
    A: GlobalAlloc,
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !self.charge(layout.size()) {
            return core::ptr::null_mut();
        }
        let ptr = unsafe { self.inner.alloc(layout) };
        if ptr.is_null() {
            self.refund(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if !self.charge(layout.size()) {
            return core::ptr::null_mut();
        }
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if ptr.is_null() {
            self.refund(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) };
        self.refund(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let old_size = layout.size();
        if new_size > old_size && !self.charge(new_size - old_size) {
            return core::ptr::null_mut();
        }
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        if new_ptr.is_null() {
            if new_size > old_size {
                self.refund(new_size - old_size);
            }
        } else if new_size < old_size {
            self.refund(old_size - new_size);
        }
        new_ptr
    }
}
