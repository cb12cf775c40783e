//! Test Utilities for the FGC-RT Test Suite
//!
//! Synthetic stacks laid out word by word, a small code cache with one
//! compiled method and a call stub, and helpers for running queue workers.

#![allow(dead_code)]

use fgc_rt::frame::{
    Address, CodeBlob, CodeBlobKind, CodeBlobRegistry, FrameLayout, JavaFrameAnchor, MapLocation,
    NmethodInfo, OopMap, OopMapSet, OopMapValue, ThreadDescriptor, VMReg,
};
use fgc_rt::util::constants::WORD_SIZE;
use std::time::Duration;

pub const W: usize = WORD_SIZE;

/// Maximum test duration before a concurrent test is considered hung
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const INTERP_BEGIN: Address = 0x8_0000;
pub const INTERP_PC: Address = 0x8_0100;
pub const NM_BEGIN: Address = 0x1_0000;
pub const NM_PC: Address = 0x1_0040;
pub const NM_DEOPT: Address = 0x1_00F0;
pub const STUB_BEGIN: Address = 0x2_0000;
pub const STUB_PC: Address = 0x2_0010;
pub const NATIVE_PC: Address = 0x5_0000;

/// Compiled method frame size in words
pub const NM_FRAME_WORDS: usize = 4;
/// Byte offset from sp of the oop slot in the compiled frame
pub const NM_OOP_OFFSET: usize = 16;
/// Register the compiled method saves at byte offset 8
pub const NM_SAVED_REG: u16 = 6;

/// ============================================================================
/// SYNTHETIC STACK
/// ============================================================================

/// Heap memory standing in for a thread stack; slot 0 is the lowest address
pub struct SyntheticStack {
    words: Vec<usize>,
    start: Address,
}

impl SyntheticStack {
    pub fn new(len: usize) -> Self {
        let mut words = vec![0usize; len];
        let start = words.as_mut_ptr() as Address;
        Self { words, start }
    }

    pub fn slot(&self, index: usize) -> Address {
        assert!(index <= self.words.len(), "slot {} past the stack", index);
        self.start + index * W
    }

    pub fn base(&self) -> Address {
        self.slot(self.words.len())
    }

    pub fn put(&self, addr: Address, value: usize) {
        assert!(addr >= self.start && addr < self.base(), "{:#x} outside stack", addr);
        unsafe { (addr as *mut usize).write_volatile(value) }
    }

    pub fn get(&self, addr: Address) -> usize {
        assert!(addr >= self.start && addr < self.base(), "{:#x} outside stack", addr);
        unsafe { (addr as *const usize).read_volatile() }
    }

    pub fn thread(&self, name: &str) -> ThreadDescriptor {
        ThreadDescriptor::new(1, name, self.base(), self.words.len() * W)
    }
}

/// Interpreter range, one compiled method and the call stub
pub fn registry() -> CodeBlobRegistry {
    let mut registry = CodeBlobRegistry::new();
    registry.set_interpreter_range(INTERP_BEGIN..INTERP_BEGIN + 0x1000);
    let maps = OopMapSet::new().with(
        OopMap::new(NM_PC - NM_BEGIN)
            .with(OopMapValue::callee_saved(MapLocation::Stack(8), VMReg::new(NM_SAVED_REG)))
            .with(OopMapValue::oop(MapLocation::Stack(NM_OOP_OFFSET as i32))),
    );
    registry
        .register(
            CodeBlob::new("Foo::bar", CodeBlobKind::Nmethod, NM_BEGIN, 0x100)
                .with_frame_size(NM_FRAME_WORDS)
                .with_oop_maps(maps)
                .with_nmethod(NmethodInfo {
                    deopt_handler: NM_DEOPT,
                    orig_pc_offset: 0,
                }),
        )
        .expect("compiled method registers");
    registry
        .register(CodeBlob::new("call_stub", CodeBlobKind::CallStub, STUB_BEGIN, 0x100).with_frame_size(10))
        .expect("call stub registers");
    registry
}

/// Addresses of a compiled -> interpreted -> entry stack
pub struct ThreeFrames {
    pub compiled_sp: Address,
    pub interp_sp: Address,
    pub interp_fp: Address,
    pub interp_unextended_sp: Address,
    pub entry_sp: Address,
    pub entry_fp: Address,
    pub wrapper: Address,
    pub oop: usize,
}

impl ThreeFrames {
    pub fn anchor(&self) -> JavaFrameAnchor {
        JavaFrameAnchor::new(self.compiled_sp, 0, NM_PC)
    }
}

/// Write interpreter fixed slots for a frame at `fp` whose expression stack
/// starts at `sp`
pub fn write_interpreted_frame(stack: &SyntheticStack, fp: Address, sender_sp: Address) {
    let i = &FrameLayout::host().interpreter;
    let at = |off: isize| fp.wrapping_add_signed(off * W as isize);
    stack.put(at(i.sender_sp_offset), sender_sp);
    stack.put(at(i.last_sp_offset), 0);
    stack.put(at(i.method_offset), 0xABC0);
    stack.put(at(i.mdp_offset), 0);
    stack.put(at(i.cache_offset), 0xABD0);
    stack.put(at(i.locals_offset), fp + 4 * W);
    stack.put(at(i.bcp_offset), 0xABC8);
    stack.put(at(i.initial_sp_offset), at(i.initial_sp_offset));
}

/// Lay out, youngest first:
///
/// ```text
/// slot 10..14   compiled frame   (saved fp at 12, return pc at 13)
/// slot 14..42   interpreted frame (fp at 40)
/// slot 42..     entry frame       (fp at 80, wrapper record at 100)
/// ```
///
/// The entry frame is the first frame of the thread. Needs 128 words.
pub fn three_frame_stack(stack: &SyntheticStack) -> ThreeFrames {
    let layout = FrameLayout::host();
    let compiled_sp = stack.slot(10);
    let interp_sp = stack.slot(10 + NM_FRAME_WORDS);
    let interp_fp = stack.slot(40);
    let entry_sp = interp_fp + 2 * W;
    let entry_fp = stack.slot(80);
    let wrapper = stack.slot(100);
    let oop = 0xCAFE_0000;

    // compiled frame
    stack.put(compiled_sp + NM_OOP_OFFSET, oop);
    stack.put(interp_sp - 2 * W, interp_fp);
    stack.put(interp_sp - W, INTERP_PC);

    // interpreted frame, not extended
    write_interpreted_frame(stack, interp_fp, entry_sp);
    stack.put(interp_fp, entry_fp);
    stack.put(interp_fp + W, STUB_PC);

    // entry frame; the wrapper's anchor is empty
    stack.put(
        entry_fp.wrapping_add_signed(layout.words(layout.entry_frame_call_wrapper_offset)),
        wrapper,
    );

    ThreeFrames {
        compiled_sp,
        interp_sp,
        interp_fp,
        interp_unextended_sp: entry_sp,
        entry_sp,
        entry_fp,
        wrapper,
        oop,
    }
}
