//! Leaks memory in 1 MB steps and reports how the out-of-memory responder
//! degrades, then terminates or hands over to a chained hook.

use std::{
    alloc::System,
    io::{self, IsTerminal as _},
    mem, process,
    sync::atomic::{AtomicUsize, Ordering},
};

use argh::FromArgs;
use graceful_oom::{
    Config, FnHook, GLOBAL_HOOK, LimitedAlloc, Responder, RetryAlloc, alloc_hook,
    log::{self, LogLevel},
};
use snafu::{OptionExt as _, ResultExt as _, ensure_whatever};
use snafu_utils::{GenericError, Report};

mod sys;

const MB: usize = 1024 * 1024;
const RESERVED_BLOCK_SIZE: usize = 10 * MB;

static BUDGET: LimitedAlloc<System> = LimitedAlloc::new(System, usize::MAX);

#[global_allocator]
static GLOBAL: RetryAlloc<LimitedAlloc<System>> = RetryAlloc::new(&BUDGET);

static RESPONDER: Responder<LimitedAlloc<System>> = Responder::new(&BUDGET, &GLOBAL_HOOK);

static CHAINED: FnHook = FnHook(chained);

/// Megabytes leaked so far.
static LEAKED_MB: AtomicUsize = AtomicUsize::new(0);

/// Leak memory until the out-of-memory responder gives up.
#[derive(Debug, FromArgs)]
struct Args {
    /// memory limit in megabytes (default: 100)
    #[argh(option, default = "100")]
    limit_mb: usize,
    /// number of 10 MB reserve blocks (default: 6)
    #[argh(option, default = "6")]
    reserve_count: usize,
    /// size of the final block in bytes (default: 1024)
    #[argh(option, default = "1024")]
    final_block_size: usize,
    /// raise SIGUSR1 for every released reserve block
    #[argh(switch, short = 's')]
    signal: bool,
    /// install a hook before the responder and chain to it
    #[argh(switch, short = 'c')]
    chain: bool,
    /// enforce the limit with RLIMIT_AS instead of a byte budget
    #[argh(switch)]
    rlimit: bool,
    /// enable debug logging
    #[argh(switch, short = 'd')]
    debug: bool,
}

fn main() {
    let args: Args = argh::from_env();

    if let Err(err) = run(&args) {
        let report = Report::new(err).color(io::stderr().is_terminal());
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GenericError> {
    ensure_whatever!(args.limit_mb > 0, "memory limit must be positive");
    let limit = args
        .limit_mb
        .checked_mul(MB)
        .whatever_context("memory limit is too large")?;

    if args.debug {
        log::set_max_level(Some(LogLevel::Debug));
    }

    if args.rlimit {
        sys::limit_address_space(limit).whatever_context("failed to set RLIMIT_AS")?;
    } else {
        BUDGET.set_limit(limit);
    }

    let signo = if args.signal {
        sys::count_signals().whatever_context("failed to install signal handler")?
    } else {
        0
    };

    ensure_whatever!(
        !RESPONDER.full_state().init_done,
        "out-of-memory responder initialized too early"
    );

    if args.chain {
        alloc_hook::set_hook(Some(&CHAINED));
    }

    let config = Config::new(
        args.final_block_size,
        args.reserve_count,
        RESERVED_BLOCK_SIZE,
    )
    .with_signal(signo)
    .with_chain(args.chain)
    .with_halt(terminated);
    RESPONDER
        .try_init(&config)
        .whatever_context("failed to initialize out-of-memory responder")?;

    let full = RESPONDER.full_state();
    ensure_whatever!(
        full.init_done && full.chained == args.chain && full.signo == signo,
        "unexpected responder configuration: {full:?}"
    );
    ensure_whatever!(
        full.final_block_allocated || args.final_block_size == 0,
        "failed to allocate final block of {} bytes",
        args.final_block_size
    );
    ensure_whatever!(
        full.state.allocated_block_count == args.reserve_count,
        "reserved only {} of {} blocks",
        full.state.allocated_block_count,
        args.reserve_count
    );

    println!("Memory limit: {}MB", args.limit_mb);
    let mut available = full.state.available_block_count;
    println!("Available {available} blocks, 10MB each");

    loop {
        leak_megabyte();
        let leaked = LEAKED_MB.fetch_add(1, Ordering::Relaxed) + 1;
        println!("Allocated {leaked} MB");

        let state = RESPONDER.state();
        if state.available_block_count < available {
            println!(
                "Block {} released at {leaked} MB",
                state.allocated_block_count - state.available_block_count
            );
            available = state.available_block_count;
        }
    }
}

fn leak_megabyte() {
    mem::forget(Box::<[u8]>::new_uninit_slice(MB));
}

fn terminated() -> ! {
    println!("Terminated at {} MB", LEAKED_MB.load(Ordering::Relaxed) + 1);
    println!("Signals received: {}", sys::signals_received());
    process::exit(0);
}

fn chained() {
    println!(
        "Chained handler at {} MB",
        LEAKED_MB.load(Ordering::Relaxed) + 1
    );
    process::exit(0);
}
