//! The reserve block pool.
//!
//! While the pool is being filled it is private to the initializing thread,
//! and the blocks are chained through their first word. Once filling stops,
//! a slot array just large enough for the blocks obtained is carved out of
//! the reserve, and the block pointers move there. From then on the reserve
//! memory itself is never read or written, so a released block is not
//! referenced again once it has been handed back.
//!
//! ```text
//! slots (available = 3)
//! ┌────────┬────────┬────────┬────────┐
//! │ blk #0 │ blk #1 │ blk #2 │  null  │   <- blk #3 already released
//! └────────┴────────┴────────┴────────┘
//!                       ^ next to release
//! ```
//!
//! The available-block counter doubles as the stack top. Releasing a block
//! claims an index by decrementing the counter, then takes the pointer out
//! of that slot, so concurrent releases never hand back the same block.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use spin::Once;

/// Granularity of block sizes, one machine word.
pub const BLOCK_GRANULE: usize = size_of::<usize>();

/// Upper bound on the number of blocks a pool requests.
pub const MAX_BLOCK_COUNT: usize = u32::MAX as usize - 1;

/// Returns the layout of a block holding at least `size` bytes.
///
/// The size is rounded up to [`BLOCK_GRANULE`] and the block is word aligned.
/// Returns `None` for a zero size or when the rounded size does not form a
/// valid layout.
#[must_use]
pub fn block_layout(size: usize) -> Option<Layout> {
    if size == 0 {
        return None;
    }
    let size = size.checked_next_multiple_of(BLOCK_GRANULE)?;
    Layout::from_size_align(size, align_of::<usize>()).ok()
}

/// Blocks linked through their first word, owned by the initializing thread.
struct Chain<'a, A>
where
    A: GlobalAlloc,
{
    backend: &'a A,
    layout: Layout,
    head: *mut u8,
    len: usize,
}

#[expect(clippy::cast_ptr_alignment)]
fn link_of(block: *mut u8) -> *mut *mut u8 {
    block.cast::<*mut u8>()
}

impl<'a, A> Chain<'a, A>
where
    A: GlobalAlloc,
{
    fn new(backend: &'a A, layout: Layout) -> Self {
        Self {
            backend,
            layout,
            head: ptr::null_mut(),
            len: 0,
        }
    }

    /// Allocates one more block; writing the link also maps its first page.
    fn grow(&mut self) -> bool {
        let block = unsafe { self.backend.alloc(self.layout) };
        if block.is_null() {
            return false;
        }
        unsafe { link_of(block).write(self.head) };
        self.head = block;
        self.len += 1;
        true
    }

    /// Unlinks the most recently allocated block.
    fn take(&mut self) -> Option<*mut u8> {
        if self.head.is_null() {
            return None;
        }
        let block = self.head;
        self.head = unsafe { link_of(block).read() };
        self.len -= 1;
        Some(block)
    }

    /// Hands the most recently allocated block back to the backend.
    fn shrink(&mut self) {
        if let Some(block) = self.take() {
            unsafe { self.backend.dealloc(block, self.layout) };
        }
    }

    /// Allocates a slot array for the chained blocks, handing blocks back
    /// until the array fits.
    fn allocate_slots(&mut self) -> Option<(NonNull<AtomicPtr<u8>>, Layout)> {
        while self.len > 0 {
            let layout = Layout::array::<AtomicPtr<u8>>(self.len).ok()?;
            if let Some(slots) = NonNull::new(unsafe { self.backend.alloc(layout) }) {
                return Some((slots.cast(), layout));
            }
            self.shrink();
        }
        None
    }

    /// Moves every block into `slots`, oldest first.
    fn drain_into(&mut self, slots: NonNull<AtomicPtr<u8>>) {
        while let Some(block) = self.take() {
            unsafe { slots.add(self.len).write(AtomicPtr::new(block)) };
        }
    }
}

impl<A> Drop for Chain<'_, A>
where
    A: GlobalAlloc,
{
    fn drop(&mut self) {
        while self.len > 0 {
            self.shrink();
        }
    }
}

/// Storage owned by an initialized, non-empty pool.
struct Blocks {
    slots: NonNull<AtomicPtr<u8>>,
    slots_layout: Layout,
    block_layout: Layout,
}

struct Reserve {
    blocks: Option<Blocks>,
    allocated: usize,
    available: AtomicUsize,
}

// Slot pointers are only dereferenced through atomics.
unsafe impl Send for Reserve {}
unsafe impl Sync for Reserve {}

impl Reserve {
    const fn empty() -> Self {
        Self {
            blocks: None,
            allocated: 0,
            available: AtomicUsize::new(0),
        }
    }

    /// Allocates as many blocks as the backend allows, up to `block_count`,
    /// and the slot array tracking them.
    fn allocate<A>(backend: &A, block_size: usize, block_count: usize) -> Self
    where
        A: GlobalAlloc,
    {
        let Some(block_layout) = block_layout(block_size) else {
            return Self::empty();
        };
        let capacity = block_count.min(MAX_BLOCK_COUNT);
        if capacity == 0 {
            return Self::empty();
        }

        // `capacity` blocks are kept; one more is attempted to prove that the
        // pool is not already at the edge of the available memory.
        let mut chain = Chain::new(backend, block_layout);
        while chain.len <= capacity && chain.grow() {}
        // Hand back the last block obtained.
        chain.shrink();

        let Some((slots, slots_layout)) = chain.allocate_slots() else {
            return Self::empty();
        };
        let allocated = chain.len;
        chain.drain_into(slots);

        Self {
            blocks: Some(Blocks {
                slots,
                slots_layout,
                block_layout,
            }),
            allocated,
            available: AtomicUsize::new(allocated),
        }
    }
}

/// A fixed set of reserve blocks obtained from a backing allocator.
///
/// The pool is created empty and filled once by
/// [`initialize`](Self::initialize). Blocks are handed back to the backend one
/// at a time by [`release_one`](Self::release_one) and are never reused.
/// Blocks still held when the pool is dropped are handed back as well.
pub struct ReservePool<'a, A>
where
    A: GlobalAlloc,
{
    backend: &'a A,
    reserve: Once<Reserve>,
}

impl<'a, A> ReservePool<'a, A>
where
    A: GlobalAlloc,
{
    /// Creates an empty, uninitialized pool over `backend`.
    #[must_use]
    pub const fn new(backend: &'a A) -> Self {
        Self {
            backend,
            reserve: Once::new(),
        }
    }

    /// Reserves up to `block_count` blocks of `block_size` bytes each.
    ///
    /// Only the first call has an effect; later calls are ignored and return
    /// `false`. A zero size or count leaves the pool initialized but empty.
    /// Running short of memory is not an error: check
    /// [`allocated`](Self::allocated) for the number of blocks actually held.
    pub fn initialize(&self, block_size: usize, block_count: usize) -> bool {
        let mut initialized = false;
        self.reserve.call_once(|| {
            initialized = true;
            Reserve::allocate(self.backend, block_size, block_count)
        });
        initialized
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.reserve.is_completed()
    }

    /// Hands one block back to the backend.
    ///
    /// Returns `false`, without doing anything, if no block is left.
    ///
    /// This performs no allocation and takes no lock; it is safe to call from
    /// an allocation-failure hook and from several threads at once.
    pub fn release_one(&self) -> bool {
        let Some(reserve) = self.reserve.get() else {
            return false;
        };
        let Ok(top) =
            reserve
                .available
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        else {
            return false;
        };
        let Some(blocks) = &reserve.blocks else {
            return false;
        };

        let slot = unsafe { blocks.slots.add(top - 1).as_ref() };
        let block = slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if !block.is_null() {
            unsafe { self.backend.dealloc(block, blocks.block_layout) };
        }
        true
    }

    /// Hands every remaining block back, returning how many were released.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        while self.release_one() {
            released += 1;
        }
        released
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Number of blocks the pool obtained at initialization.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.reserve.get().map_or(0, |reserve| reserve.allocated)
    }

    /// Number of blocks not released yet.
    #[must_use]
    pub fn available(&self) -> usize {
        self.reserve
            .get()
            .map_or(0, |reserve| reserve.available.load(Ordering::Acquire))
    }

    /// Layout of each reserve block, if any block was obtained.
    #[must_use]
    pub fn block_layout(&self) -> Option<Layout> {
        let reserve = self.reserve.get()?;
        reserve.blocks.as_ref().map(|blocks| blocks.block_layout)
    }
}

impl<A> Drop for ReservePool<'_, A>
where
    A: GlobalAlloc,
{
    fn drop(&mut self) {
        self.release_all();
        if let Some(Reserve {
            blocks: Some(blocks),
            ..
        }) = self.reserve.get_mut()
        {
            unsafe {
                self.backend
                    .dealloc(blocks.slots.as_ptr().cast(), blocks.slots_layout);
            }
        }
    }
}
