//! Reserve memory blocks that are held unused until memory runs out.
//!
//! A [`ReservePool`] grabs a fixed number of equally sized blocks from a
//! backing allocator once, at startup, and later hands them back one at a
//! time. Releasing a block gives the backing allocator headroom at the moment
//! it is needed most: inside an allocation-failure hook.
//!
//! # Usage Example
//!
//! ```rust
//! use std::alloc::System;
//!
//! use reserve_pool::ReservePool;
//!
//! let pool = ReservePool::new(&System);
//! pool.initialize(4096, 3);
//!
//! assert_eq!(pool.allocated(), 3);
//! assert!(pool.release_one());
//! assert_eq!(pool.available(), 2);
//! ```
//!
//! # Sizing Policy
//!
//! - Block sizes are rounded up to [`BLOCK_GRANULE`] bytes.
//! - Allocation stops at the first failure; the pool keeps what it got.
//! - One block beyond the requested count is always attempted and returned
//!   to the allocator straight away. The reported block count is therefore
//!   one less than the number of successful allocations.
//! - At most [`MAX_BLOCK_COUNT`] blocks are ever requested, so a huge count
//!   reserves as much of the available memory as possible.
//! - The bookkeeping (one pointer per block) is allocated after the blocks
//!   and sized to the blocks actually obtained. If it does not fit, blocks
//!   are handed back until it does.
//!
//! # Hook Safety
//!
//! [`ReservePool::release_one`] never allocates, never blocks and never
//! panics. It only calls `dealloc` on the backing allocator, which must not
//! allocate in turn. The pool can therefore be drained from within an
//! allocation-failure hook without recursing into the failing allocation.
//!
//! # Thread Safety
//!
//! Initialization is one-shot and must finish before concurrent use starts.
//! After that, any number of threads may release blocks concurrently; each
//! block is handed back exactly once.

#![cfg_attr(not(test), no_std)]

pub mod pool;

pub use self::pool::{BLOCK_GRANULE, MAX_BLOCK_COUNT, ReservePool, block_layout};
