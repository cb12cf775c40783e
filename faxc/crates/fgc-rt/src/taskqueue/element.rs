//! Queue Elements
//!
//! Ring buffer slots are single atomic words, so every element type must
//! round-trip through a `usize`.

use std::fmt;

/// A task that fits one machine word
pub trait QueueElement: Copy + Send + Sync + 'static {
    fn into_word(self) -> usize;
    fn from_word(word: usize) -> Self;
}

impl QueueElement for usize {
    #[inline]
    fn into_word(self) -> usize {
        self
    }

    #[inline]
    fn from_word(word: usize) -> Self {
        word
    }
}

/// Object reference
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Oop(pub usize);

impl Oop {
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Oop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oop({:#x})", self.0)
    }
}

impl QueueElement for Oop {
    #[inline]
    fn into_word(self) -> usize {
        self.0
    }

    #[inline]
    fn from_word(word: usize) -> Self {
        Oop(word)
    }
}

const NARROW_TAG: usize = 1;

/// Address of a slot holding either a full oop or a compressed one
///
/// Slots are at least 4-byte aligned; bit 0 tags compressed slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StarTask(usize);

impl StarTask {
    /// Slot holding a full-width oop
    pub fn wide(slot: usize) -> Self {
        assert!(slot & NARROW_TAG == 0, "misaligned oop slot {:#x}", slot);
        StarTask(slot)
    }

    /// Slot holding a 32-bit compressed oop
    pub fn narrow(slot: usize) -> Self {
        assert!(slot & NARROW_TAG == 0, "misaligned narrow oop slot {:#x}", slot);
        StarTask(slot | NARROW_TAG)
    }

    pub fn is_narrow(&self) -> bool {
        self.0 & NARROW_TAG != 0
    }

    /// The slot address with the tag stripped
    pub fn slot(&self) -> usize {
        self.0 & !NARROW_TAG
    }
}

impl fmt::Debug for StarTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_narrow() { "narrow" } else { "wide" };
        write!(f, "StarTask({} {:#x})", kind, self.slot())
    }
}

impl QueueElement for StarTask {
    #[inline]
    fn into_word(self) -> usize {
        self.0
    }

    #[inline]
    fn from_word(word: usize) -> Self {
        StarTask(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_task_tagging() {
        let wide = StarTask::wide(0x1000);
        let narrow = StarTask::narrow(0x1004);
        assert!(!wide.is_narrow());
        assert!(narrow.is_narrow());
        assert_eq!(narrow.slot(), 0x1004);
        assert_eq!(StarTask::from_word(narrow.into_word()), narrow);
    }

    #[test]
    #[should_panic(expected = "misaligned")]
    fn test_star_task_rejects_odd_slot() {
        let _ = StarTask::wide(0x1001);
    }

    #[test]
    fn test_oop_debug() {
        assert_eq!(format!("{:?}", Oop(0x40)), "Oop(0x40)");
        assert!(Oop::default().is_null());
    }
}
