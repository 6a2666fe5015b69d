/// Occupancy of the reserve pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    /// Reserve blocks obtained at initialization.
    pub allocated_block_count: usize,
    /// Reserve blocks not released yet.
    pub available_block_count: usize,
}

/// Configuration of a responder together with its current [`State`].
///
/// Every field reads as zero or `false` until initialization has completed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullState {
    pub init_done: bool,
    /// A previous hook was captured and will be chained to.
    pub chained: bool,
    pub signo: i32,
    pub final_block_size: usize,
    /// The final block was obtained at initialization.
    pub final_block_allocated: bool,
    pub reserved_block_size: usize,
    /// Requested number of reserve blocks.
    pub reserved_block_count: usize,
    pub state: State,
}
