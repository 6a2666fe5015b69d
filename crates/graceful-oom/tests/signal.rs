#![cfg(unix)]

use std::{
    alloc::System,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
};

use graceful_oom::{Config, HookSlot, LimitedAlloc, Responder};

static BACKEND: LimitedAlloc<System> = LimitedAlloc::new(System, usize::MAX);
static SLOT: HookSlot = HookSlot::new();
static RESPONDER: Responder<LimitedAlloc<System>> = Responder::new(&BACKEND, &SLOT);

static SIGNALS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_signal(_signo: libc::c_int) {
    SIGNALS.fetch_add(1, Ordering::Relaxed);
}

fn halt() -> ! {
    panic!("halted");
}

#[test]
fn test_signal_per_released_block() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGUSR1, handler as libc::sighandler_t);
    }

    RESPONDER.init(
        &Config::new(1024, 6, 4096)
            .with_signal(libc::SIGUSR1)
            .with_halt(halt),
    );
    assert_eq!(RESPONDER.full_state().signo, libc::SIGUSR1);

    for released in 1..=6 {
        RESPONDER.process();
        assert_eq!(SIGNALS.load(Ordering::Relaxed), released);
        assert_eq!(RESPONDER.state().available_block_count, 6 - released);
    }

    // No signal for the terminal step.
    let result = panic::catch_unwind(AssertUnwindSafe(|| RESPONDER.process()));
    assert!(result.is_err());
    assert_eq!(SIGNALS.load(Ordering::Relaxed), 6);
}
