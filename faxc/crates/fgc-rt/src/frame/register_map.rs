//! Register Map
//!
//! A `RegisterMap` records, for the frame currently being inspected, where
//! each callee-saved register was spilled. Sender resolution fills it in as
//! the walk moves from younger to older frames; GC root scanning and stack
//! value reconstruction read it back.

use super::layout::FrameLayout;
use super::thread::ThreadDescriptor;
use super::Address;
use crate::util::constants::STACK_SLOT_SIZE;

/// Abstract register slot identifier
///
/// 64-bit registers occupy two consecutive slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VMReg(u16);

impl VMReg {
    pub const fn new(slot: u16) -> Self {
        VMReg(slot)
    }

    /// The following slot (upper half of a 64-bit register)
    pub const fn next(self) -> Self {
        VMReg(self.0 + 1)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

const BITS: usize = u64::BITS as usize;

/// Per-walk table of callee-saved register locations
pub struct RegisterMap<'t> {
    locations: Box<[Address]>,
    location_valid: Box<[u64]>,
    /// Slots recorded since `update_for_id` was last advanced
    recorded_for_frame: Box<[u64]>,
    update_for_id: Option<Address>,
    include_argument_oops: bool,
    update_map: bool,
    walk_cont: bool,
    thread: &'t ThreadDescriptor,
    layout: &'t FrameLayout,
}

impl<'t> RegisterMap<'t> {
    /// Create an empty map for a walk of `thread`
    ///
    /// With `update_map` false, sender resolution skips all register
    /// bookkeeping (sufficient for walks that only need frame identities).
    pub fn new(thread: &'t ThreadDescriptor, layout: &'t FrameLayout, update_map: bool) -> Self {
        let words = layout.register_slots.div_ceil(BITS);
        Self {
            locations: vec![0; layout.register_slots].into_boxed_slice(),
            location_valid: vec![0; words].into_boxed_slice(),
            recorded_for_frame: vec![0; words].into_boxed_slice(),
            update_for_id: None,
            include_argument_oops: true,
            update_map,
            walk_cont: false,
            thread,
            layout,
        }
    }

    pub fn thread(&self) -> &'t ThreadDescriptor {
        self.thread
    }

    pub fn update_map(&self) -> bool {
        self.update_map
    }

    pub fn include_argument_oops(&self) -> bool {
        self.include_argument_oops
    }

    pub fn set_include_argument_oops(&mut self, include: bool) {
        self.include_argument_oops = include;
    }

    /// Whether this walk belongs to a continuation freeze/thaw
    pub fn walk_cont(&self) -> bool {
        self.walk_cont
    }

    pub fn set_walk_cont(&mut self, walk_cont: bool) {
        self.walk_cont = walk_cont;
    }

    fn check_range(&self, reg: VMReg) -> (usize, u64) {
        assert!(
            reg.index() < self.layout.register_slots,
            "register slot {} out of range ({} slots)",
            reg.index(),
            self.layout.register_slots
        );
        (reg.index() / BITS, 1u64 << (reg.index() % BITS))
    }

    /// Whether `reg` has a recorded location
    pub fn is_valid(&self, reg: VMReg) -> bool {
        let (word, bit) = self.check_range(reg);
        self.location_valid[word] & bit != 0
    }

    /// Spill address of `reg`, or the platform fallback
    pub fn location(&self, reg: VMReg) -> Option<Address> {
        if self.is_valid(reg) {
            Some(self.locations[reg.index()])
        } else {
            self.pd_location(reg)
        }
    }

    /// Upper slots of a float/vector register live next to its base slot.
    fn pd_location(&self, reg: VMReg) -> Option<Address> {
        let base = self.layout.float_register_base;
        let per_reg = self.layout.float_slots_per_register;
        let slot = reg.index() as u16;
        if per_reg <= 1 || slot < base {
            return None;
        }
        let base_reg = VMReg::new(base + ((slot - base) / per_reg) * per_reg);
        if base_reg == reg || !self.is_valid(base_reg) {
            return None;
        }
        let offset = (reg.index() - base_reg.index()) * STACK_SLOT_SIZE;
        Some(self.locations[base_reg.index()] + offset)
    }

    /// Record the spill address of `reg` for the current frame
    ///
    /// # Panics
    ///
    /// If the map does not update, or `reg` was already recorded for the
    /// frame currently being processed.
    pub fn set_location(&mut self, reg: VMReg, addr: Address) {
        assert!(self.update_map, "updating map that does not need updating");
        let (word, bit) = self.check_range(reg);
        assert!(
            self.recorded_for_frame[word] & bit == 0,
            "register slot {} recorded twice for frame {:?}",
            reg.index(),
            self.update_for_id
        );
        self.locations[reg.index()] = addr;
        self.location_valid[word] |= bit;
        self.recorded_for_frame[word] |= bit;
    }

    /// Correct an already recorded spill address
    ///
    /// # Panics
    ///
    /// If `reg` has no recorded location.
    pub fn update_location(&mut self, reg: VMReg, addr: Address) {
        assert!(
            self.is_valid(reg),
            "update_location on unrecorded register slot {}",
            reg.index()
        );
        self.locations[reg.index()] = addr;
    }

    /// Start recording locations for the frame identified by `id`
    ///
    /// # Panics
    ///
    /// If `id` is younger than the frame last recorded.
    pub fn set_update_for_id(&mut self, id: Address) {
        if let Some(previous) = self.update_for_id {
            assert!(
                id >= previous,
                "already updated this map for an older frame ({:#x} < {:#x})",
                id,
                previous
            );
            if id == previous {
                return;
            }
        }
        self.update_for_id = Some(id);
        self.recorded_for_frame.fill(0);
    }

    pub fn update_for_id(&self) -> Option<Address> {
        self.update_for_id
    }

    /// Forget every location; used when the walk crosses an entry frame
    pub fn clear(&mut self) {
        self.include_argument_oops = false;
        self.location_valid.fill(0);
        self.recorded_for_frame.fill(0);
        self.update_for_id = None;
    }

    /// Copy every location from `other`
    pub fn copy_from(&mut self, other: &RegisterMap<'_>) {
        assert_eq!(self.locations.len(), other.locations.len(), "layout mismatch");
        self.locations.copy_from_slice(&other.locations);
        self.location_valid.copy_from_slice(&other.location_valid);
        self.include_argument_oops = other.include_argument_oops;
        self.walk_cont = other.walk_cont;
    }

    /// Number of registers with a recorded location
    pub fn valid_count(&self) -> usize {
        self.location_valid.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl std::fmt::Debug for RegisterMap<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_map();
        for index in 0..self.locations.len() {
            let reg = VMReg::new(index as u16);
            if self.is_valid(reg) {
                list.entry(&index, &crate::util::format_address(self.locations[index]));
            }
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> ThreadDescriptor {
        ThreadDescriptor::new(1, "walker", 0x10_0000, 0x1_0000)
    }

    #[test]
    fn test_set_and_read_location() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        let rbp = FrameLayout::X86_64.fp_register;

        assert_eq!(map.location(rbp), None);
        map.set_update_for_id(0x1000);
        map.set_location(rbp, 0x2000);
        assert_eq!(map.location(rbp), Some(0x2000));
        assert_eq!(map.valid_count(), 1);
    }

    #[test]
    #[should_panic(expected = "recorded twice")]
    fn test_double_record_same_frame_panics() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        map.set_update_for_id(0x1000);
        map.set_location(VMReg::new(2), 0x2000);
        map.set_location(VMReg::new(2), 0x2008);
    }

    #[test]
    fn test_record_again_for_older_frame() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        map.set_update_for_id(0x1000);
        map.set_location(VMReg::new(2), 0x2000);
        map.set_update_for_id(0x1100);
        map.set_location(VMReg::new(2), 0x2100);
        assert_eq!(map.location(VMReg::new(2)), Some(0x2100));
    }

    #[test]
    #[should_panic(expected = "older frame")]
    fn test_update_for_id_cannot_move_backwards() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        map.set_update_for_id(0x1100);
        map.set_update_for_id(0x1000);
    }

    #[test]
    #[should_panic(expected = "unrecorded")]
    fn test_update_location_requires_valid() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        map.update_location(VMReg::new(4), 0x3000);
    }

    #[test]
    fn test_update_location_overwrites() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        map.set_location(VMReg::new(4), 0x3000);
        map.update_location(VMReg::new(4), 0x3008);
        assert_eq!(map.location(VMReg::new(4)), Some(0x3008));
    }

    #[test]
    #[should_panic(expected = "does not need updating")]
    fn test_non_updating_map_rejects_writes() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, false);
        map.set_location(VMReg::new(0), 0x3000);
    }

    #[test]
    fn test_clear_resets_everything() {
        let thread = thread();
        let mut map = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        assert!(map.include_argument_oops());
        map.set_update_for_id(0x1000);
        map.set_location(VMReg::new(0), 0x3000);
        map.clear();
        assert_eq!(map.valid_count(), 0);
        assert!(!map.include_argument_oops());
        assert_eq!(map.update_for_id(), None);
        // The same slot may be recorded again after crossing the boundary.
        map.set_location(VMReg::new(0), 0x3100);
    }

    #[test]
    fn test_float_register_fallback() {
        let thread = thread();
        let layout = &FrameLayout::X86_64;
        let mut map = RegisterMap::new(&thread, layout, true);
        let xmm1 = VMReg::new(layout.float_register_base + layout.float_slots_per_register);
        map.set_location(xmm1, 0x4000);

        let xmm1_slot3 = VMReg::new(xmm1.index() as u16 + 3);
        assert_eq!(map.location(xmm1_slot3), Some(0x4000 + 3 * STACK_SLOT_SIZE));

        // GPR slots have no fallback.
        assert_eq!(map.location(VMReg::new(3)), None);
    }

    #[test]
    fn test_copy_from() {
        let thread = thread();
        let mut a = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        a.set_location(VMReg::new(6), 0x5000);
        let mut b = RegisterMap::new(&thread, &FrameLayout::X86_64, true);
        b.copy_from(&a);
        assert_eq!(b.location(VMReg::new(6)), Some(0x5000));
    }
}
