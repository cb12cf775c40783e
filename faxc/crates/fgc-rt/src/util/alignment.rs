//! Alignment Utilities
//!
//! Alignment checks applied to stack addresses before they are trusted.

use super::constants::{STACK_SLOT_SIZE, WORD_SIZE};

/// Alignment checks for stack addresses
pub struct Alignment;

impl Alignment {
    /// Whether `value` is a multiple of `alignment` (a power of two)
    #[inline]
    pub fn is_aligned(value: usize, alignment: usize) -> bool {
        debug_assert!(alignment.is_power_of_two(), "alignment {} not a power of two", alignment);
        value & (alignment - 1) == 0
    }

    /// Whether `address` can hold a saved word (sp, fp, return address)
    ///
    /// # Examples
    /// ```
    /// use fgc_rt::util::Alignment;
    /// assert!(Alignment::is_word_aligned(0x7fff_0010));
    /// assert!(!Alignment::is_word_aligned(0x7fff_0011));
    /// ```
    #[inline]
    pub fn is_word_aligned(address: usize) -> bool {
        Self::is_aligned(address, WORD_SIZE)
    }

    /// Whether a byte offset from an oop map names a whole stack slot
    #[inline]
    pub fn is_slot_aligned(offset: i32) -> bool {
        Self::is_aligned(offset.unsigned_abs() as usize, STACK_SLOT_SIZE)
    }
}
