//! Frame Layout Tables
//!
//! Every architecture-specific fact the frame walker needs is a constant in
//! a [`FrameLayout`]. The walking logic in `frame/mod.rs` is written once
//! against this table.
//!
//! All offsets are in words relative to the frame pointer:
//!
//! ```text
//!   higher addresses
//!   ┌──────────────────────────┐
//!   │ caller's outgoing args   │ <- sender sp   (fp + sender_sp_offset)
//!   │ return pc                │    fp + return_addr_offset
//!   │ saved fp (link)          │ <- fp          (fp + link_offset)
//!   │ interpreter sender sp    │    fp - 1
//!   │ last sp                  │    fp - 2
//!   │ method                   │    fp - 3
//!   │ mdp                      │    fp - 4
//!   │ cp cache                 │    fp - 5
//!   │ locals                   │    fp - 6
//!   │ bcp                      │    fp - 7
//!   │ initial sp / monitors    │    fp - 8
//!   │ monitor block            │
//!   │ expression stack         │ <- sp
//!   └──────────────────────────┘
//!   lower addresses
//! ```

use super::register_map::VMReg;

/// Interpreter fixed-slot indices, in words from fp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterLayout {
    pub sender_sp_offset: isize,
    pub last_sp_offset: isize,
    pub method_offset: isize,
    pub mdp_offset: isize,
    pub cache_offset: isize,
    pub locals_offset: isize,
    pub bcp_offset: isize,
    pub initial_sp_offset: isize,
    pub monitor_block_top_offset: isize,
    pub monitor_block_bottom_offset: isize,
}

/// Per-architecture frame constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// Architecture name, for diagnostics
    pub name: &'static str,

    /// Bytes per stack word
    pub word_size: usize,

    /// Saved caller fp, words from fp
    pub link_offset: isize,

    /// Return pc, words from fp
    pub return_addr_offset: isize,

    /// Caller's sp, words from fp
    pub sender_sp_offset: isize,

    /// Interpreter fixed slots
    pub interpreter: InterpreterLayout,

    /// Slot of an entry frame that holds the `JavaCallWrapper` address
    pub entry_frame_call_wrapper_offset: isize,

    /// First register slot of the frame pointer register
    pub fp_register: VMReg,

    /// Number of register slots a `RegisterMap` tracks
    pub register_slots: usize,

    /// First register slot of the float/vector register file
    pub float_register_base: u16,

    /// Slots per float/vector register
    pub float_slots_per_register: u16,

    /// Interpreted frames larger than this are rejected as implausible
    pub max_interpreted_frame_words: usize,
}

const INTERPRETER_SLOTS: InterpreterLayout = InterpreterLayout {
    sender_sp_offset: -1,
    last_sp_offset: -2,
    method_offset: -3,
    mdp_offset: -4,
    cache_offset: -5,
    locals_offset: -6,
    bcp_offset: -7,
    initial_sp_offset: -8,
    monitor_block_top_offset: -8,
    monitor_block_bottom_offset: -8,
};

impl FrameLayout {
    /// x86_64 (rbp frames, 16 GPRs, 16 YMM registers)
    pub const X86_64: FrameLayout = FrameLayout {
        name: "x86_64",
        word_size: 8,
        link_offset: 0,
        return_addr_offset: 1,
        sender_sp_offset: 2,
        interpreter: INTERPRETER_SLOTS,
        entry_frame_call_wrapper_offset: -6,
        // rbp has encoding 5, two slots per GPR
        fp_register: VMReg::new(10),
        register_slots: 32 + 16 * 8,
        float_register_base: 32,
        float_slots_per_register: 8,
        max_interpreted_frame_words: 4096,
    };

    /// AArch64 (x29 frames, 32 GPRs, 32 V registers)
    pub const AARCH64: FrameLayout = FrameLayout {
        name: "aarch64",
        word_size: 8,
        link_offset: 0,
        return_addr_offset: 1,
        sender_sp_offset: 2,
        interpreter: INTERPRETER_SLOTS,
        entry_frame_call_wrapper_offset: -8,
        // x29 has encoding 29, two slots per GPR
        fp_register: VMReg::new(58),
        register_slots: 64 + 32 * 4,
        float_register_base: 64,
        float_slots_per_register: 4,
        max_interpreted_frame_words: 4096,
    };

    /// Layout of the architecture this crate was compiled for
    pub fn host() -> &'static FrameLayout {
        if cfg!(target_arch = "aarch64") {
            &Self::AARCH64
        } else {
            &Self::X86_64
        }
    }

    /// `true` when a 64-bit value fits one stack word
    pub fn is_lp64(&self) -> bool {
        self.word_size == 8
    }

    /// Byte distance of a word offset
    #[inline]
    pub fn words(&self, offset: isize) -> isize {
        offset * self.word_size as isize
    }
}
