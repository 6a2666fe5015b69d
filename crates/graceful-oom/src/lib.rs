//! Graceful degradation under memory exhaustion.
//!
//! At startup the application sets aside a number of reserve blocks and one
//! final block. When an allocation later fails, the [`Responder`] installed as
//! allocation-failure hook releases one reserve block at a time, optionally
//! raising a signal so that the application can start shedding load, and
//! lets the allocation retry. Once the reserve is used up it releases the
//! final block and either hands control to the previously installed hook or
//! halts the process.
//!
//! The hook only runs for allocations made through a [`RetryAlloc`], so the
//! application has to install one as its global allocator:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: graceful_oom::GlobalAllocator =
//!     graceful_oom::GlobalAllocator::new(&std::alloc::System);
//!
//! fn main() {
//!     // 1 KiB final block, 6 reserve blocks of 10 MiB, SIGUSR1 on release.
//!     graceful_oom::init(1024, 6, 10 << 20, libc::SIGUSR1, false);
//!     // ...
//!     graceful_oom::shutdown();
//! }
//! ```
//!
//! The free functions operate on [`RESPONDER`], which reserves memory from
//! [`System`] and registers itself in [`GLOBAL_HOOK`]. Applications that
//! allocate from a different backend build their own `static` [`Responder`].

use std::alloc::System;

pub use alloc_hook::{
    self, AllocFailureHook, FnHook, GLOBAL_HOOK, Hook, HookSlot, LimitedAlloc, RetryAlloc,
};

pub use self::{
    config::Config,
    responder::{InitError, Responder, TerminalAction},
    state::{FullState, State},
};

#[macro_use]
pub mod log;

mod config;
mod responder;
mod state;
mod sys;

/// Global allocator whose failures reach [`RESPONDER`].
pub type GlobalAllocator = RetryAlloc<System>;

/// The process-wide responder behind the free functions of this crate.
pub static RESPONDER: Responder<System> = Responder::new(&System, &GLOBAL_HOOK);

/// Initializes [`RESPONDER`]; see [`Responder::init`].
///
/// `signo` is the signal raised after each released reserve block, `0` for
/// none. Only the first call has an effect.
pub fn init(
    final_block_size: usize,
    reserved_block_count: usize,
    reserved_block_size: usize,
    signo: i32,
    allow_chain: bool,
) {
    let config = Config::new(final_block_size, reserved_block_count, reserved_block_size)
        .with_signal(signo)
        .with_chain(allow_chain);
    RESPONDER.init(&config);
}

#[must_use]
pub fn state() -> State {
    RESPONDER.state()
}

#[must_use]
pub fn full_state() -> FullState {
    RESPONDER.full_state()
}

/// Unregisters [`RESPONDER`] and releases its remaining reserve memory.
pub fn shutdown() {
    RESPONDER.shutdown();
}
