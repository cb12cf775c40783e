//! Util Module - Shared Utilities
//!
//! Word-size constants and alignment helpers used by frame walking.

pub mod alignment;
pub mod debug;

pub use alignment::Alignment;
pub use debug::format_address;

/// Constants for fgc-rt
pub mod constants {
    /// Size of a machine word in bytes
    pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

    /// Size of one compiler stack slot (oop map offsets are in these units)
    pub const STACK_SLOT_SIZE: usize = 4;

    /// Filler written into the unused half of a narrowed stack value
    pub const JUNK_WORD: u64 = 0xDEAD_DEAF_DEAD_DEAF;
}
