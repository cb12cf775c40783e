//! Stack Values - Reconstructing Locals of Compiled Frames
//!
//! Compiled code keeps a method's locals wherever the register allocator put
//! them. Debug info describes each one as a [`ScopeValue`];
//! [`create_stack_value`] reads it back out of the frame (or the register
//! map) into a uniform, word-sized [`StackValue`].
//!
//! # Narrowing
//!
//! A 32-bit value is always delivered in the low half of the word. The high
//! half carries the junk pattern `0xDEADDEAF` so that code which wrongly
//! treats a narrowed value as a full word fails loudly.

use super::register_map::{RegisterMap, VMReg};
use super::{load, Address, Frame};
use crate::util::constants::JUNK_WORD;

/// Type of the value a [`Location`] holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    /// 32-bit int or float in a 32-bit slot
    Normal,
    Oop,
    NarrowOop,
    /// int held in a 64-bit register
    IntInLong,
    /// long in a single 64-bit slot
    Lng,
    /// float held in a double register
    FloatInDbl,
    /// double in a single 64-bit slot
    Dbl,
    /// Dead or unrepresentable
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationPlace {
    /// Byte offset from the frame's unextended sp
    Stack(i32),
    Register(VMReg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub kind: LocationType,
    pub place: LocationPlace,
}

impl Location {
    pub fn stack(kind: LocationType, offset: i32) -> Self {
        Self {
            kind,
            place: LocationPlace::Stack(offset),
        }
    }

    pub fn register(kind: LocationType, reg: VMReg) -> Self {
        Self {
            kind,
            place: LocationPlace::Register(reg),
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self.place, LocationPlace::Register(_))
    }
}

/// Debug-info description of one local or expression stack entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScopeValue {
    Location(Location),
    ConstantInt(i32),
    ConstantLong(i64),
    ConstantDouble(f64),
    ConstantOop(Address),
    /// An object the compiler scalar-replaced; `materialized` is 0 until
    /// deoptimization reallocates it
    Object { id: u32, materialized: Address },
}

/// Compressed oop decoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NarrowOopEncoding {
    pub base: Address,
    pub shift: u32,
}

impl NarrowOopEncoding {
    pub fn new(base: Address, shift: u32) -> Self {
        Self { base, shift }
    }

    pub fn decode(&self, narrow: u32) -> Address {
        if narrow == 0 {
            0
        } else {
            self.base + ((narrow as Address) << self.shift)
        }
    }

    pub fn encode(&self, oop: Address) -> u32 {
        if oop == 0 {
            return 0;
        }
        assert!(oop > self.base, "oop {:#x} below heap base", oop);
        let narrow = (oop - self.base) >> self.shift;
        assert!(narrow <= u32::MAX as Address, "oop {:#x} out of narrow range", oop);
        narrow as u32
    }
}

/// A local or expression stack value read out of a frame
#[derive(Debug, Clone, Copy)]
pub enum StackValue {
    /// Raw word; 32-bit values sit in the low half
    Int(i64),
    Obj { oop: Address, scalar_replaced: bool },
    /// The value is dead or could not be located
    Conflict,
}

impl StackValue {
    /// A 32-bit value widened with a junk high half
    pub fn narrow(bits: u32) -> Self {
        StackValue::Int(with_junk_high_half(bits))
    }

    pub fn get_int(&self) -> i64 {
        match self {
            StackValue::Int(value) => *value,
            other => panic!("get_int on {:?}", other),
        }
    }

    pub fn get_obj(&self) -> Address {
        match self {
            StackValue::Obj { oop, .. } => *oop,
            other => panic!("get_obj on {:?}", other),
        }
    }

    pub fn is_scalar_replaced(&self) -> bool {
        matches!(self, StackValue::Obj { scalar_replaced: true, .. })
    }

    pub fn set_int(&mut self, value: i64) {
        assert!(matches!(self, StackValue::Int(_)), "set_int on {:?}", self);
        *self = StackValue::Int(value);
    }

    pub fn set_obj(&mut self, oop: Address) {
        assert!(matches!(self, StackValue::Obj { .. }), "set_obj on {:?}", self);
        *self = StackValue::Obj {
            oop,
            scalar_replaced: false,
        };
    }

    /// Payload equality
    ///
    /// # Panics
    ///
    /// If the two values have different tags.
    pub fn equal(&self, other: &StackValue) -> bool {
        match (self, other) {
            (StackValue::Int(a), StackValue::Int(b)) => a == b,
            (StackValue::Obj { oop: a, .. }, StackValue::Obj { oop: b, .. }) => a == b,
            (StackValue::Conflict, StackValue::Conflict) => true,
            _ => panic!("comparing {:?} with {:?}", self, other),
        }
    }
}

fn with_junk_high_half(bits: u32) -> i64 {
    ((JUNK_WORD & 0xFFFF_FFFF_0000_0000) | bits as u64) as i64
}

/// Read the value `sv` describes out of `frame`
pub fn create_stack_value(frame: &Frame<'_>, map: &RegisterMap<'_>, sv: &ScopeValue) -> StackValue {
    let loc = match sv {
        ScopeValue::Location(loc) => *loc,
        ScopeValue::ConstantInt(value) => return StackValue::narrow(*value as u32),
        ScopeValue::ConstantLong(value) => return StackValue::Int(*value),
        ScopeValue::ConstantDouble(value) => return StackValue::Int(value.to_bits() as i64),
        ScopeValue::ConstantOop(oop) => {
            return StackValue::Obj {
                oop: *oop,
                scalar_replaced: false,
            }
        },
        ScopeValue::Object { materialized, .. } => {
            return StackValue::Obj {
                oop: *materialized,
                scalar_replaced: *materialized == 0,
            }
        },
    };

    if loc.kind == LocationType::Invalid {
        return StackValue::Conflict;
    }
    let addr = match loc.place {
        LocationPlace::Stack(offset) => frame.unextended_sp().wrapping_add_signed(offset as isize),
        LocationPlace::Register(reg) => match map.location(reg) {
            Some(addr) => addr,
            None => {
                log::debug!("register {:?} not saved at {}", reg, frame);
                return StackValue::Conflict;
            },
        },
    };

    // SAFETY: debug info only names slots inside the frame or spill slots
    // recorded in the register map, all on the stopped thread's stack.
    unsafe {
        match loc.kind {
            LocationType::FloatInDbl => {
                assert!(loc.is_register(), "float-in-double must live in a register");
                // the float's bits sit in the low half of the saved register
                let word = (addr as *const u64).read_volatile();
                StackValue::narrow(word as u32)
            },
            LocationType::IntInLong => {
                assert!(loc.is_register(), "int-in-long must live in a register");
                let long = (addr as *const i64).read_volatile();
                StackValue::narrow(long as i32 as u32)
            },
            LocationType::Lng | LocationType::Dbl => {
                assert!(frame.context().layout.is_lp64(), "single-slot 64-bit values need an LP64 layout");
                StackValue::Int((addr as *const i64).read_volatile())
            },
            LocationType::NarrowOop => {
                let narrow = (addr as *const u32).read_volatile();
                StackValue::Obj {
                    oop: frame.context().narrow_oop.decode(narrow),
                    scalar_replaced: false,
                }
            },
            LocationType::Oop => StackValue::Obj {
                oop: load(addr),
                scalar_replaced: false,
            },
            LocationType::Normal => StackValue::narrow((addr as *const u32).read_volatile()),
            LocationType::Invalid => StackValue::Conflict,
        }
    }
}

/// Ordered values of one scope (locals or expression stack)
#[derive(Debug, Clone, Default)]
pub struct StackValueCollection {
    values: Vec<StackValue>,
    lp64: bool,
}

impl StackValueCollection {
    /// `lp64` selects whether a long occupies one slot (the second of its
    /// pair) or is split across two 32-bit halves
    pub fn new(lp64: bool) -> Self {
        Self {
            values: Vec::new(),
            lp64,
        }
    }

    pub fn with_capacity(lp64: bool, capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            lp64,
        }
    }

    pub fn push(&mut self, value: StackValue) {
        self.values.push(value);
    }

    pub fn at(&self, slot: usize) -> &StackValue {
        &self.values[slot]
    }

    pub fn at_mut(&mut self, slot: usize) -> &mut StackValue {
        &mut self.values[slot]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StackValue> {
        self.values.iter()
    }

    pub fn int_at(&self, slot: usize) -> i32 {
        self.at(slot).get_int() as i32
    }

    pub fn float_at(&self, slot: usize) -> f32 {
        f32::from_bits(self.at(slot).get_int() as u32)
    }

    pub fn obj_at(&self, slot: usize) -> Address {
        self.at(slot).get_obj()
    }

    fn wide_at(&self, slot: usize) -> u64 {
        if self.lp64 {
            self.at(slot + 1).get_int() as u64
        } else {
            let high = self.at(slot).get_int() as u32 as u64;
            let low = self.at(slot + 1).get_int() as u32 as u64;
            (high << 32) | low
        }
    }

    pub fn long_at(&self, slot: usize) -> i64 {
        self.wide_at(slot) as i64
    }

    pub fn double_at(&self, slot: usize) -> f64 {
        f64::from_bits(self.wide_at(slot))
    }

    pub fn set_int_at(&mut self, slot: usize, value: i32) {
        self.at_mut(slot).set_int(value as u32 as i64);
    }

    pub fn set_float_at(&mut self, slot: usize, value: f32) {
        self.at_mut(slot).set_int(value.to_bits() as i64);
    }

    pub fn set_obj_at(&mut self, slot: usize, oop: Address) {
        self.at_mut(slot).set_obj(oop);
    }

    fn set_wide_at(&mut self, slot: usize, bits: u64) {
        if self.lp64 {
            self.at_mut(slot + 1).set_int(bits as i64);
        } else {
            self.at_mut(slot).set_int((bits >> 32) as i64);
            self.at_mut(slot + 1).set_int(bits as u32 as i64);
        }
    }

    pub fn set_long_at(&mut self, slot: usize, value: i64) {
        self.set_wide_at(slot, value as u64);
    }

    pub fn set_double_at(&mut self, slot: usize, value: f64) {
        self.set_wide_at(slot, value.to_bits());
    }
}

impl<'c> IntoIterator for &'c StackValueCollection {
    type Item = &'c StackValue;
    type IntoIter = std::slice::Iter<'c, StackValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
