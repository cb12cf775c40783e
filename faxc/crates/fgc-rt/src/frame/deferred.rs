//! Deferred Local Writes
//!
//! A debugger may set a local of a compiled frame. Compiled code cannot be
//! patched in place, so the frame is deoptimized and the write is parked in
//! a per-thread side table until the interpreter frames replacing it are
//! built. Every later read of that frame's locals overlays the parked
//! values on what the stack holds.

use super::stack_value::StackValueCollection;
use super::vframe::FrameIdentity;
use super::Address;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// A typed value parked for one local slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeferredValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(Address),
}

impl DeferredValue {
    fn same_type(&self, other: &DeferredValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Local slots the value covers; longs and doubles take a pair
    pub fn slots(&self) -> usize {
        match self {
            DeferredValue::Long(_) | DeferredValue::Double(_) => 2,
            _ => 1,
        }
    }
}

/// All parked writes of one compiled scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeferredLocalSet {
    locals: Vec<(usize, DeferredValue)>,
}

impl DeferredLocalSet {
    /// Park `value` for local `index`, replacing an earlier write
    ///
    /// # Panics
    ///
    /// If the slot was earlier written with a value of another type.
    pub fn set_local_at(&mut self, index: usize, value: DeferredValue) {
        if let Some((_, existing)) = self.locals.iter_mut().find(|(i, _)| *i == index) {
            assert!(
                existing.same_type(&value),
                "local {} changes type from {:?} to {:?}",
                index,
                existing,
                value
            );
            *existing = value;
        } else {
            self.locals.push((index, value));
        }
    }

    pub fn get(&self, index: usize) -> Option<DeferredValue> {
        self.locals.iter().find(|(i, _)| *i == index).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Overlay the parked values on reconstructed locals
    pub fn update_locals(&self, locals: &mut StackValueCollection) {
        for &(index, value) in &self.locals {
            if index + value.slots() > locals.len() {
                continue;
            }
            match value {
                DeferredValue::Int(v) => locals.set_int_at(index, v),
                DeferredValue::Long(v) => locals.set_long_at(index, v),
                DeferredValue::Float(v) => locals.set_float_at(index, v),
                DeferredValue::Double(v) => locals.set_double_at(index, v),
                DeferredValue::Object(oop) => locals.set_obj_at(index, oop),
            }
        }
    }
}

/// Per-thread table of parked writes, keyed by compiled scope
#[derive(Debug, Default)]
pub struct DeferredLocals {
    sets: Mutex<IndexMap<FrameIdentity, DeferredLocalSet>>,
}

impl DeferredLocals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, identity: FrameIdentity, index: usize, value: DeferredValue) {
        log::trace!("deferred write {:?} to local {} of {:?}", value, index, identity);
        self.sets.lock().entry(identity).or_default().set_local_at(index, value);
    }

    /// Apply the writes parked for `identity`, if any
    pub fn apply(&self, identity: &FrameIdentity, locals: &mut StackValueCollection) -> bool {
        match self.sets.lock().get(identity) {
            Some(set) => {
                set.update_locals(locals);
                true
            },
            None => false,
        }
    }

    pub fn get(&self, identity: &FrameIdentity) -> Option<DeferredLocalSet> {
        self.sets.lock().get(identity).cloned()
    }

    /// Drop the set of a scope whose interpreter frames have been built
    pub fn remove(&self, identity: &FrameIdentity) -> Option<DeferredLocalSet> {
        self.sets.lock().shift_remove(identity)
    }

    /// Drop every set belonging to the physical frame `frame_id`
    pub fn remove_frame(&self, frame_id: Address) -> usize {
        let mut sets = self.sets.lock();
        let before = sets.len();
        sets.retain(|identity, _| identity.frame_id != frame_id);
        before - sets.len()
    }

    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.lock().is_empty()
    }
}
