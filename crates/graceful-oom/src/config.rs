use core::fmt;
use std::process;

/// Settings for [`Responder::init`](crate::Responder::init).
///
/// All sizes are in bytes. A zero `final_block_size` skips the final block;
/// a zero `reserved_block_count` or `reserved_block_size` leaves the reserve
/// pool empty, so the first allocation failure goes straight to the terminal
/// step.
#[derive(Clone, Copy)]
pub struct Config {
    /// Size of the block freed right before terminating or chaining.
    pub final_block_size: usize,
    /// Number of reserve blocks to request.
    pub reserved_block_count: usize,
    /// Size of each reserve block.
    pub reserved_block_size: usize,
    /// Signal raised after each released reserve block, `0` for none.
    pub signo: i32,
    /// Hand over to the previously installed hook instead of halting.
    pub allow_chain: bool,
    /// Called when reserves are exhausted and no previous hook takes over.
    pub halt: fn() -> !,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("final_block_size", &self.final_block_size)
            .field("reserved_block_count", &self.reserved_block_count)
            .field("reserved_block_size", &self.reserved_block_size)
            .field("signo", &self.signo)
            .field("allow_chain", &self.allow_chain)
            .finish_non_exhaustive()
    }
}

impl Config {
    #[must_use]
    pub const fn new(
        final_block_size: usize,
        reserved_block_count: usize,
        reserved_block_size: usize,
    ) -> Self {
        Self {
            final_block_size,
            reserved_block_count,
            reserved_block_size,
            signo: 0,
            allow_chain: false,
            halt: process::abort,
        }
    }

    #[must_use]
    pub const fn with_signal(self, signo: i32) -> Self {
        Self { signo, ..self }
    }

    #[must_use]
    pub const fn with_chain(self, allow_chain: bool) -> Self {
        Self {
            allow_chain,
            ..self
        }
    }

    #[must_use]
    pub const fn with_halt(self, halt: fn() -> !) -> Self {
        Self { halt, ..self }
    }
}
