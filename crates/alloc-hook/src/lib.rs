//! Allocation-failure hooks for Rust global allocators.
//!
//! Rust's global allocator gives up as soon as `GlobalAlloc::alloc` returns
//! null. This crate adds the step in between that other runtimes call a "new
//! handler": a registered hook gets a chance to free memory, and the failed
//! request is retried when it returns.
//!
//! - [`HookSlot`] holds the currently registered [`AllocFailureHook`].
//! - [`RetryAlloc`] wraps a backing allocator and runs the hook of its slot on
//!   every failure before retrying.
//! - [`LimitedAlloc`] caps the number of bytes a backing allocator may hand
//!   out, which makes memory exhaustion reproducible.
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use std::alloc::System;
//!
//! use alloc_hook::{FnHook, RetryAlloc};
//!
//! #[global_allocator]
//! static GLOBAL: RetryAlloc<System> = RetryAlloc::new(&System);
//!
//! static ON_FAILURE: FnHook = FnHook(release_caches);
//!
//! fn release_caches() {
//!     // Free something, or terminate the process.
//! }
//!
//! fn main() {
//!     alloc_hook::set_hook(Some(&ON_FAILURE));
//! }
//! ```
//!
//! # Hook Contract
//!
//! A hook runs inside the failing allocation call. It must not allocate, and
//! it must either free memory, replace itself, or not return at all: a hook
//! that returns without changing anything makes the allocator retry forever.

#![cfg_attr(not(test), no_std)]

pub mod limited;
pub mod retry;
pub mod slot;

pub use self::{
    limited::LimitedAlloc,
    retry::RetryAlloc,
    slot::{AllocFailureHook, FnHook, GLOBAL_HOOK, Hook, HookSlot, hook, set_hook},
};
