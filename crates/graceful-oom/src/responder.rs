//! The allocation-failure hook controller.
//!
//! A [`Responder`] moves through two states over the lifetime of a process:
//!
//! - **Degrading**: reserve blocks remain. Each allocation failure releases
//!   one block, raises the configured signal and lets the allocator retry.
//! - **Terminal**: the pool is empty. The final block is released, then
//!   control passes to the previously installed hook or the process halts.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};
use std::process;

use alloc_hook::{AllocFailureHook, Hook, HookSlot};
use reserve_pool::ReservePool;
use snafu::{Snafu, ensure};
use snafu_utils::Location;
use spin::Once;

use crate::{
    config::Config,
    state::{FullState, State},
    sys,
};

#[derive(Debug, Snafu)]
pub enum InitError {
    #[snafu(display("out-of-memory responder is already initialized"))]
    AlreadyInitialized {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("invalid signal number: {signo}"))]
    InvalidSignal {
        signo: i32,
        #[snafu(implicit)]
        location: Location,
    },
}

/// What the terminal step does once the reserve pool is exhausted.
#[derive(Clone, Copy, derive_more::IsVariant)]
pub enum TerminalAction {
    /// Call the configured halt function.
    Halt(fn() -> !),
    /// Reinstall the previous hook and hand the failure over to it.
    Delegate(Hook),
}

/// Written once by `init`, read-only afterwards.
struct Settings {
    config: Config,
    final_layout: Option<Layout>,
    final_block_allocated: bool,
    previous: Option<Hook>,
}

/// Frees reserve memory step by step when allocations start failing.
///
/// A responder is built in a `static` with [`new`](Self::new), filled and
/// registered with [`init`](Self::init), and stays registered until
/// [`shutdown`](Self::shutdown). Reserve and final blocks come from
/// `backend`, which has to be the allocator the failing requests are served
/// by, or releasing them gains nothing.
///
/// `init` and `shutdown` must run while the process is still (or again)
/// single-threaded. Everything else may be called from any thread.
pub struct Responder<A>
where
    A: GlobalAlloc + Sync + 'static,
{
    backend: &'static A,
    slot: &'static HookSlot,
    settings: Once<Settings>,
    pool: ReservePool<'static, A>,
    final_block: AtomicPtr<u8>,
}

impl<A> Responder<A>
where
    A: GlobalAlloc + Sync + 'static,
{
    #[must_use]
    pub const fn new(backend: &'static A, slot: &'static HookSlot) -> Self {
        Self {
            backend,
            slot,
            settings: Once::new(),
            pool: ReservePool::new(backend),
            final_block: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Allocates the final block and the reserve pool, then installs the
    /// responder in its hook slot.
    ///
    /// Allocation is best effort; see [`full_state`](Self::full_state) for
    /// what was actually obtained. With `allow_chain` the hook found in the
    /// slot is kept for the terminal step, otherwise it is discarded.
    ///
    /// Only the first call has an effect.
    pub fn init(&'static self, config: &Config) {
        if !self.init_once(config) {
            debug!("out-of-memory responder already initialized, ignoring {config:?}");
        }
    }

    /// Like [`init`](Self::init), but reports a repeated call and rejects a
    /// negative signal number before doing anything.
    pub fn try_init(&'static self, config: &Config) -> Result<(), InitError> {
        ensure!(config.signo >= 0, InvalidSignalSnafu { signo: config.signo });
        ensure!(self.init_once(config), AlreadyInitializedSnafu);
        Ok(())
    }

    fn init_once(&'static self, config: &Config) -> bool {
        let mut initialized = false;
        self.settings.call_once(|| {
            initialized = true;
            self.setup(config)
        });
        initialized
    }

    fn setup(&'static self, config: &Config) -> Settings {
        let final_layout = reserve_pool::block_layout(config.final_block_size);
        let final_block_allocated =
            final_layout.is_some_and(|layout| self.allocate_final_block(layout));
        if final_layout.is_some() && !final_block_allocated {
            warn!(
                "failed to allocate final block of {} bytes",
                config.final_block_size
            );
        }

        self.pool
            .initialize(config.reserved_block_size, config.reserved_block_count);
        let allocated = self.pool.allocated();
        if config.reserved_block_size > 0 && allocated < config.reserved_block_count {
            warn!(
                "reserved only {allocated} of {} blocks of {} bytes",
                config.reserved_block_count, config.reserved_block_size
            );
        }
        info!(
            "reserved {allocated} blocks of {} bytes, final block of {} bytes, signal {}",
            config.reserved_block_size, config.final_block_size, config.signo
        );

        let previous = self.slot.replace(Some(self as Hook));
        let previous = if config.allow_chain { previous } else { None };
        if previous.is_some() {
            debug!("chaining to the previously installed hook");
        }

        Settings {
            config: *config,
            final_layout,
            final_block_allocated,
            previous,
        }
    }

    fn allocate_final_block(&self, layout: Layout) -> bool {
        let block = unsafe { self.backend.alloc(layout) };
        if block.is_null() {
            return false;
        }
        #[expect(clippy::cast_ptr_alignment)]
        let header = block.cast::<usize>();
        unsafe { header.write(0) };
        self.final_block.store(block, Ordering::Release);
        true
    }

    /// Reacts to one allocation failure.
    ///
    /// Releases one reserve block and raises the configured signal, then
    /// returns so that the allocator can retry. Once the pool is empty it
    /// releases the final block and either delegates to the previous hook or
    /// halts.
    ///
    /// Up to the terminal action this performs no allocation, takes no
    /// blocking lock and does not log or panic.
    pub fn process(&self) {
        if self.pool.release_one() {
            let signo = self.settings.get().map_or(0, |settings| settings.config.signo);
            if signo != 0 {
                sys::raise(signo);
            }
            return;
        }

        match self.enter_terminal() {
            TerminalAction::Halt(halt) => halt(),
            TerminalAction::Delegate(previous) => previous.on_alloc_failure(),
        }
    }

    fn enter_terminal(&self) -> TerminalAction {
        self.release_final_block();
        let action = self.terminal_action();
        if let TerminalAction::Delegate(previous) = action {
            self.slot.replace(Some(previous));
        }
        action
    }

    /// Returns what the terminal step would do, without doing it.
    #[must_use]
    pub fn terminal_action(&self) -> TerminalAction {
        let Some(settings) = self.settings.get() else {
            return TerminalAction::Halt(process::abort);
        };
        match settings.previous {
            Some(previous) => TerminalAction::Delegate(previous),
            None => TerminalAction::Halt(settings.config.halt),
        }
    }

    fn release_final_block(&self) {
        let Some(layout) = self.settings.get().and_then(|settings| settings.final_layout) else {
            return;
        };
        let block = self.final_block.swap(ptr::null_mut(), Ordering::AcqRel);
        if !block.is_null() {
            unsafe { self.backend.dealloc(block, layout) };
        }
    }

    /// Unregisters the responder and hands all reserve memory back.
    ///
    /// The slot gets the chained hook back, or is cleared when there is none.
    /// If another hook has replaced the responder in the meantime, the slot
    /// is left alone. Configuration stays readable; the responder cannot be
    /// initialized again.
    pub fn shutdown(&'static self) {
        let Some(settings) = self.settings.get() else {
            return;
        };
        if self.slot.is_current(self) {
            self.slot.replace(settings.previous);
        }
        let released = self.pool.release_all();
        self.release_final_block();
        info!("out-of-memory responder shut down, released {released} reserve blocks");
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.settings.is_completed()
    }

    #[must_use]
    pub fn state(&self) -> State {
        State {
            allocated_block_count: self.pool.allocated(),
            available_block_count: self.pool.available(),
        }
    }

    #[must_use]
    pub fn full_state(&self) -> FullState {
        let Some(settings) = self.settings.get() else {
            return FullState::default();
        };
        let config = &settings.config;
        FullState {
            init_done: true,
            chained: settings.previous.is_some(),
            signo: config.signo,
            final_block_size: config.final_block_size,
            final_block_allocated: settings.final_block_allocated,
            reserved_block_size: config.reserved_block_size,
            reserved_block_count: config.reserved_block_count,
            state: self.state(),
        }
    }
}

impl<A> AllocFailureHook for Responder<A>
where
    A: GlobalAlloc + Sync + 'static,
{
    fn on_alloc_failure(&self) {
        self.process();
    }
}

impl<A> Drop for Responder<A>
where
    A: GlobalAlloc + Sync + 'static,
{
    fn drop(&mut self) {
        self.release_final_block();
    }
}
