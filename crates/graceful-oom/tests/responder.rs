use std::{
    alloc::{GlobalAlloc as _, Layout, System},
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use graceful_oom::{
    AllocFailureHook, Config, HookSlot, LimitedAlloc, Responder, RetryAlloc, State,
};

const MB: usize = 1 << 20;
const SLOT: usize = size_of::<usize>();

fn halt() -> ! {
    panic!("halted");
}

struct Fixture {
    backend: &'static LimitedAlloc<System>,
    slot: &'static HookSlot,
    responder: &'static Responder<LimitedAlloc<System>>,
    alloc: RetryAlloc<LimitedAlloc<System>>,
}

impl Fixture {
    fn new(limit: usize) -> Self {
        let backend: &'static LimitedAlloc<System> =
            Box::leak(Box::new(LimitedAlloc::new(System, limit)));
        let slot: &'static HookSlot = Box::leak(Box::new(HookSlot::new()));
        let responder = Box::leak(Box::new(Responder::new(backend, slot)));
        Self {
            backend,
            slot,
            responder,
            alloc: RetryAlloc::with_slot(backend, slot),
        }
    }

    fn available(&self) -> usize {
        self.responder.state().available_block_count
    }

    /// Allocates 1 MiB chunks until an allocation fails or the responder
    /// halts, for at most `max` chunks.
    fn exhaust(&self, max: usize) -> Run {
        let layout = Layout::from_size_align(MB, 8).unwrap();
        let mut run = Run::default();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            for _ in 0..max {
                let before = self.available();
                let ptr = unsafe { self.alloc.alloc(layout) };
                if ptr.is_null() {
                    break;
                }
                run.blocks.push(ptr as usize);
                if self.available() < before {
                    run.releases.push(run.blocks.len());
                }
            }
        }));
        run.halted = result.is_err();
        run
    }

    fn free(&self, run: Run) {
        let layout = Layout::from_size_align(MB, 8).unwrap();
        for ptr in run.blocks {
            unsafe { self.backend.dealloc(ptr as *mut u8, layout) };
        }
    }
}

#[derive(Default)]
struct Run {
    blocks: Vec<usize>,
    releases: Vec<usize>,
    halted: bool,
}

/// A previous hook that lifts the budget of its allocator.
struct Relief {
    backend: &'static LimitedAlloc<System>,
    calls: AtomicUsize,
}

impl Relief {
    fn install(fixture: &Fixture) -> &'static Self {
        let relief: &'static Self = Box::leak(Box::new(Self {
            backend: fixture.backend,
            calls: AtomicUsize::new(0),
        }));
        fixture.slot.replace(Some(relief));
        relief
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl AllocFailureHook for Relief {
    fn on_alloc_failure(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.backend.set_limit(usize::MAX);
    }
}

#[test]
fn test_degrades_then_halts() {
    let fixture = Fixture::new(100 * MB);
    fixture
        .responder
        .init(&Config::new(1024, 6, 10 * MB).with_halt(halt));

    let full = fixture.responder.full_state();
    assert!(full.init_done);
    assert!(full.final_block_allocated);
    assert!(!full.chained);
    assert_eq!(full.signo, 0);
    assert_eq!(
        full.state,
        State {
            allocated_block_count: 6,
            available_block_count: 6,
        }
    );
    assert_eq!(fixture.backend.used(), 1024 + 6 * SLOT + 60 * MB);

    let run = fixture.exhaust(200);
    assert!(run.halted);
    assert_eq!(run.releases, [40, 50, 60, 70, 80, 90]);
    assert_eq!(run.blocks.len(), 99);
    assert_eq!(
        fixture.responder.state(),
        State {
            allocated_block_count: 6,
            available_block_count: 0,
        }
    );
    // Reserve and final blocks are gone, only the pool's slots remain.
    assert_eq!(fixture.backend.used(), 99 * MB + 6 * SLOT);

    fixture.free(run);
}

#[test]
fn test_halts_at_once_without_reserve() {
    let fixture = Fixture::new(4 * MB);
    fixture.responder.init(&Config::new(0, 0, 0).with_halt(halt));

    let full = fixture.responder.full_state();
    assert!(full.init_done);
    assert!(!full.final_block_allocated);
    assert_eq!(full.state, State::default());

    let run = fixture.exhaust(10);
    assert!(run.halted);
    assert!(run.releases.is_empty());
    assert_eq!(run.blocks.len(), 4);
    fixture.free(run);
}

#[test]
fn test_chains_to_previous_hook() {
    let fixture = Fixture::new(100 * MB);
    let relief = Relief::install(&fixture);
    fixture
        .responder
        .init(&Config::new(1024, 0, 0).with_chain(true).with_halt(halt));

    let full = fixture.responder.full_state();
    assert!(full.chained);
    assert!(fixture.slot.is_current(fixture.responder));
    assert!(fixture.responder.terminal_action().is_delegate());

    let run = fixture.exhaust(99);
    assert!(!run.halted);
    assert_eq!(run.blocks.len(), 99);
    assert_eq!(relief.calls(), 0);

    // The 100th allocation fails, the responder steps aside and the previous
    // hook makes room.
    let run2 = fixture.exhaust(1);
    assert!(!run2.halted);
    assert_eq!(run2.blocks.len(), 1);
    assert_eq!(relief.calls(), 1);
    assert!(fixture.slot.is_current(relief));
    assert_eq!(fixture.backend.used(), 100 * MB);

    fixture.free(run);
    fixture.free(run2);
}

#[test]
fn test_chain_disabled_discards_previous_hook() {
    let fixture = Fixture::new(4 * MB);
    let relief = Relief::install(&fixture);
    fixture
        .responder
        .init(&Config::new(1024, 0, 0).with_halt(halt));

    assert!(!fixture.responder.full_state().chained);
    assert!(fixture.responder.terminal_action().is_halt());

    let run = fixture.exhaust(10);
    assert!(run.halted);
    assert_eq!(run.blocks.len(), 3);
    assert_eq!(relief.calls(), 0);
    assert!(fixture.slot.is_current(fixture.responder));
    fixture.free(run);
}

#[test]
fn test_repeated_init_is_ignored() {
    let fixture = Fixture::new(usize::MAX);
    fixture.responder.init(&Config::new(512, 3, 4096).with_signal(0));
    let used = fixture.backend.used();
    let first = fixture.responder.full_state();

    fixture
        .responder
        .init(&Config::new(2048, 10, 8192).with_chain(true));
    assert_eq!(fixture.responder.full_state(), first);
    assert_eq!(fixture.backend.used(), used);
    assert_eq!(first.reserved_block_count, 3);
    assert_eq!(first.reserved_block_size, 4096);
    assert_eq!(first.final_block_size, 512);
}

#[test]
fn test_shortfall_is_reported_in_state() {
    // Room for the final block, the slots and two and a half blocks.
    let fixture = Fixture::new(1024 + 4 * SLOT + 2 * MB + MB / 2);
    fixture.responder.init(&Config::new(1024, 4, MB));

    let full = fixture.responder.full_state();
    assert!(full.final_block_allocated);
    assert_eq!(full.reserved_block_count, 4);
    assert_eq!(
        full.state,
        State {
            allocated_block_count: 1,
            available_block_count: 1,
        }
    );
}

#[test]
fn test_process_releases_one_block_per_failure() {
    let fixture = Fixture::new(usize::MAX);
    fixture
        .responder
        .init(&Config::new(1024, 3, 4096).with_halt(halt));

    for expected in (0..3).rev() {
        let used = fixture.backend.used();
        fixture.responder.process();
        assert_eq!(fixture.available(), expected);
        assert_eq!(fixture.backend.used(), used - 4096);
    }

    let used = fixture.backend.used();
    let result = panic::catch_unwind(AssertUnwindSafe(|| fixture.responder.process()));
    assert!(result.is_err());
    assert_eq!(fixture.backend.used(), used - 1024);
}

#[test]
fn test_concurrent_failures() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 16;

    let fixture = Fixture::new(usize::MAX);
    let responder = fixture.responder;
    responder.init(&Config::new(1024, THREADS * PER_THREAD, 4096).with_halt(halt));

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..PER_THREAD {
                    responder.process();
                }
            });
        }
    });

    assert_eq!(
        responder.state(),
        State {
            allocated_block_count: THREADS * PER_THREAD,
            available_block_count: 0,
        }
    );
    assert_eq!(fixture.backend.used(), 1024 + THREADS * PER_THREAD * SLOT);
}

#[test]
fn test_shutdown_restores_previous_hook() {
    let fixture = Fixture::new(usize::MAX);
    let relief = Relief::install(&fixture);
    fixture
        .responder
        .init(&Config::new(1024, 2, 4096).with_chain(true));

    fixture.responder.shutdown();
    assert!(fixture.slot.is_current(relief));
    assert_eq!(fixture.available(), 0);
    assert_eq!(fixture.backend.used(), 2 * SLOT);
    assert!(fixture.responder.full_state().chained);
}

#[test]
fn test_shutdown_leaves_foreign_hook_alone() {
    let fixture = Fixture::new(usize::MAX);
    fixture.responder.init(&Config::new(1024, 2, 4096));
    let relief = Relief::install(&fixture);

    fixture.responder.shutdown();
    assert!(fixture.slot.is_current(relief));
    assert_eq!(fixture.available(), 0);
}

#[test]
fn test_shutdown_before_init() {
    let fixture = Fixture::new(usize::MAX);
    let relief = Relief::install(&fixture);

    fixture.responder.shutdown();
    assert!(fixture.slot.is_current(relief));
    assert!(!fixture.responder.is_initialized());
}
