//! Frame Module - Physical Stack Frames and Sender Resolution
//!
//! A [`Frame`] is a snapshot of one activation on a stopped thread's stack:
//! its stack pointer, frame pointer, program counter and the code blob the
//! pc belongs to. [`Frame::sender`] computes the caller's frame, recording
//! callee-saved register spill locations in a [`RegisterMap`] as it goes.
//!
//! # Frame Kinds
//!
//! ```text
//! pc in interpreter range          -> Interpreted
//! pc in a CallStub blob            -> Entry (native -> Java transition)
//! pc in any other blob             -> Compiled
//! pc unknown to the code cache     -> NativeLeaf
//! ```
//!
//! # Safety Model
//!
//! Frames are built from raw addresses. The constructors are `unsafe`: the
//! caller promises that the addresses belong to a thread that is parked at a
//! safepoint (or otherwise suspended) and whose stack stays mapped while the
//! frames are in use. All later reads go through that promise.
//! [`Frame::safe_for_sender`] is the exception: it validates bounds before
//! every read and is meant for stacks that may be torn.

pub mod code_blob;
pub mod deferred;
pub mod layout;
pub mod register_map;
pub mod stack_value;
pub mod thread;
pub mod vframe;
pub mod walker;

pub use code_blob::{
    CodeBlob, CodeBlobKind, CodeBlobRegistry, CodeCache, MapLocation, NmethodInfo, OopMap,
    OopMapSet, OopMapValue, OopMapValueKind,
};
pub use deferred::{DeferredLocalSet, DeferredLocals, DeferredValue};
pub use layout::{FrameLayout, InterpreterLayout};
pub use register_map::{RegisterMap, VMReg};
pub use stack_value::{
    create_stack_value, Location, LocationPlace, LocationType, NarrowOopEncoding, ScopeValue,
    StackValue, StackValueCollection,
};
pub use thread::{JavaCallWrapper, JavaFrameAnchor, ThreadDescriptor};
pub use vframe::{CompiledVFrame, FrameIdentity, MethodId, ScopeDesc};
pub use walker::StackFrameStream;

use crate::logging::{log_event, RtEvent};
use crate::taskqueue::StarTask;
use crate::util::{format_address, Alignment};
use std::fmt;

/// Raw machine address
pub type Address = usize;

#[inline]
pub(crate) unsafe fn load(addr: Address) -> usize {
    debug_assert!(Alignment::is_word_aligned(addr), "unaligned stack read at {:#x}", addr);
    (addr as *const usize).read_volatile()
}

#[inline]
pub(crate) unsafe fn store(addr: Address, value: usize) {
    debug_assert!(Alignment::is_word_aligned(addr), "unaligned stack write at {:#x}", addr);
    (addr as *mut usize).write_volatile(value)
}

/// Everything a frame needs to know about the VM it belongs to
#[derive(Clone, Copy)]
pub struct WalkContext<'a> {
    pub layout: &'a FrameLayout,
    pub code_cache: &'a dyn CodeCache,
    pub narrow_oop: NarrowOopEncoding,
    /// Whether compiled frames may have spilled the caller's fp
    pub has_optimizing_compiler: bool,
}

impl<'a> WalkContext<'a> {
    pub fn new(layout: &'a FrameLayout, code_cache: &'a dyn CodeCache) -> Self {
        debug_assert_eq!(
            layout.word_size,
            crate::util::constants::WORD_SIZE,
            "layout word size must match the host"
        );
        Self {
            layout,
            code_cache,
            narrow_oop: NarrowOopEncoding::default(),
            has_optimizing_compiler: true,
        }
    }

    pub fn with_narrow_oop_encoding(mut self, encoding: NarrowOopEncoding) -> Self {
        self.narrow_oop = encoding;
        self
    }

    pub fn with_optimizing_compiler(mut self, present: bool) -> Self {
        self.has_optimizing_compiler = present;
        self
    }
}

impl fmt::Debug for WalkContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkContext")
            .field("layout", &self.layout.name)
            .field("narrow_oop", &self.narrow_oop)
            .field("has_optimizing_compiler", &self.has_optimizing_compiler)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptState {
    NotDeoptimized,
    IsDeoptimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Native code calling into Java through the call stub
    Entry,
    Interpreted,
    /// Compiled method or stub with a code blob
    Compiled,
    /// Code the code cache does not know; fp-linked
    NativeLeaf,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameKind::Entry => "entry",
            FrameKind::Interpreted => "interpreted",
            FrameKind::Compiled => "compiled",
            FrameKind::NativeLeaf => "native",
        })
    }
}

/// A stack slot holding an oop, as reported by [`Frame::oops_do`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OopSlot {
    Wide(Address),
    Narrow(Address),
    /// Interior pointer at `derived` computed from the oop at `base`
    Derived { derived: Address, base: Address },
}

impl OopSlot {
    /// Queue entry for marking through this slot
    pub fn to_star_task(self) -> Option<StarTask> {
        match self {
            OopSlot::Wide(addr) => Some(StarTask::wide(addr)),
            OopSlot::Narrow(addr) => Some(StarTask::narrow(addr)),
            OopSlot::Derived { .. } => None,
        }
    }
}

/// One physical activation on a thread stack
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    sp: Address,
    unextended_sp: Address,
    fp: Address,
    pc: Address,
    cb: Option<&'a CodeBlob>,
    deopt_state: DeoptState,
    ctx: WalkContext<'a>,
}

impl<'a> Frame<'a> {
    /// # Safety
    ///
    /// `sp`, `fp` and everything reachable from them must be readable stack
    /// memory of a stopped thread for `'a`.
    pub unsafe fn new(ctx: WalkContext<'a>, sp: Address, fp: Address, pc: Address) -> Self {
        Self::with_unextended(ctx, sp, sp, fp, pc)
    }

    /// Frame whose unextended sp differs from sp (interpreted callers that
    /// extended their frame for outgoing arguments)
    ///
    /// # Safety
    ///
    /// Same as [`Frame::new`].
    pub unsafe fn with_unextended(
        ctx: WalkContext<'a>,
        sp: Address,
        unextended_sp: Address,
        fp: Address,
        pc: Address,
    ) -> Self {
        let mut frame = Frame {
            sp,
            unextended_sp,
            fp,
            pc,
            cb: ctx.code_cache.find_blob(pc),
            deopt_state: DeoptState::NotDeoptimized,
            ctx,
        };
        if let Some(original) = frame.deopt_original_pc() {
            frame.pc = original;
            frame.deopt_state = DeoptState::IsDeoptimized;
        }
        frame
    }

    /// Frame whose pc is the return address just below `sp`
    ///
    /// # Safety
    ///
    /// Same as [`Frame::new`]; `sp[-1]` must be readable.
    pub unsafe fn from_sp_fp(ctx: WalkContext<'a>, sp: Address, fp: Address) -> Self {
        let pc = load(sp - ctx.layout.word_size);
        Self::new(ctx, sp, fp, pc)
    }

    pub fn sp(&self) -> Address {
        self.sp
    }

    pub fn unextended_sp(&self) -> Address {
        self.unextended_sp
    }

    pub fn fp(&self) -> Address {
        self.fp
    }

    /// Logical pc; the original pc for deoptimized frames
    pub fn pc(&self) -> Address {
        self.pc
    }

    pub fn cb(&self) -> Option<&'a CodeBlob> {
        self.cb
    }

    pub fn context(&self) -> WalkContext<'a> {
        self.ctx
    }

    pub fn deopt_state(&self) -> DeoptState {
        self.deopt_state
    }

    pub fn is_deoptimized_frame(&self) -> bool {
        self.deopt_state == DeoptState::IsDeoptimized
    }

    /// Stable identity of this frame during one walk
    pub fn id(&self) -> Address {
        self.unextended_sp
    }

    /// Whether the frame with identity `id` is older (further up the stack)
    pub fn is_older(&self, id: Address) -> bool {
        id > self.id()
    }

    pub fn kind(&self) -> FrameKind {
        if self.ctx.code_cache.is_interpreter_code(self.pc) {
            return FrameKind::Interpreted;
        }
        match self.cb {
            Some(cb) if cb.is_call_stub() => FrameKind::Entry,
            Some(_) => FrameKind::Compiled,
            None => FrameKind::NativeLeaf,
        }
    }

    pub fn is_interpreted_frame(&self) -> bool {
        self.kind() == FrameKind::Interpreted
    }

    pub fn is_entry_frame(&self) -> bool {
        self.kind() == FrameKind::Entry
    }

    /// Frame of a compiled Java method
    pub fn is_compiled_frame(&self) -> bool {
        self.cb.is_some_and(CodeBlob::is_nmethod) && !self.is_interpreted_frame()
    }

    /// Whether no Java frame precedes this one on the stack
    pub fn is_first_frame(&self) -> bool {
        self.pc == 0 || (self.is_entry_frame() && self.entry_frame_is_first())
    }

    #[inline]
    fn word(&self) -> usize {
        self.ctx.layout.word_size
    }

    /// Address `offset` words from fp
    #[inline]
    pub fn addr_at(&self, offset: isize) -> Address {
        self.fp.wrapping_add_signed(self.ctx.layout.words(offset))
    }

    #[inline]
    fn at(&self, offset: isize) -> usize {
        // SAFETY: frame construction guarantees fp-relative slots are readable.
        unsafe { load(self.addr_at(offset)) }
    }

    /// Caller's sp as seen from an fp-linked frame
    pub fn sender_sp(&self) -> Address {
        self.addr_at(self.ctx.layout.sender_sp_offset)
    }

    /// Saved caller fp
    pub fn link(&self) -> Address {
        self.at(self.ctx.layout.link_offset)
    }

    /// Return address into the caller
    pub fn sender_pc(&self) -> Address {
        self.at(self.ctx.layout.return_addr_offset)
    }

    fn deopt_original_pc(&self) -> Option<Address> {
        let cb = self.cb?;
        let nm = cb.nmethod_info()?;
        if !cb.is_deopt_pc(self.pc) {
            return None;
        }
        // SAFETY: the orig-pc slot lies inside this compiled frame.
        Some(unsafe { load(self.unextended_sp + nm.orig_pc_offset) })
    }

    // ---------------------------------------------------------------------
    // Entry frames
    // ---------------------------------------------------------------------

    /// Address of the `JavaCallWrapper` this entry frame points at
    pub fn entry_frame_call_wrapper(&self) -> Address {
        self.at(self.ctx.layout.entry_frame_call_wrapper_offset)
    }

    /// Anchor saved when native code called into Java
    pub fn entry_frame_anchor(&self) -> JavaFrameAnchor {
        let wrapper = self.entry_frame_call_wrapper();
        // SAFETY: entry frames always point at a live wrapper on the same stack.
        unsafe { (wrapper as *const JavaCallWrapper).read_volatile().anchor }
    }

    pub fn entry_frame_is_first(&self) -> bool {
        !self.entry_frame_anchor().has_last_java_frame()
    }

    // ---------------------------------------------------------------------
    // Sender resolution
    // ---------------------------------------------------------------------

    /// The caller of this frame
    ///
    /// When `map` updates, it receives the spill locations of the caller's
    /// callee-saved registers.
    pub fn sender(&self, map: &mut RegisterMap<'_>) -> Frame<'a> {
        map.set_include_argument_oops(false);
        let kind = self.kind();
        if map.update_map() && kind != FrameKind::Entry {
            map.set_update_for_id(self.id());
        }
        match kind {
            FrameKind::Entry => self.sender_for_entry_frame(map),
            FrameKind::Interpreted => self.sender_for_interpreter_frame(map),
            FrameKind::Compiled => self.sender_for_compiled_frame(map),
            // SAFETY: fp-linked native frames keep link and return pc at fp.
            FrameKind::NativeLeaf => unsafe {
                Frame::new(self.ctx, self.sender_sp(), self.link(), self.sender_pc())
            },
        }
    }

    fn sender_for_entry_frame(&self, map: &mut RegisterMap<'_>) -> Frame<'a> {
        let anchor = self.entry_frame_anchor();
        assert!(!self.entry_frame_is_first(), "next Java frame must exist");
        assert!(
            anchor.last_java_sp > self.sp,
            "saved Java sp {:#x} must be above entry frame sp {:#x}",
            anchor.last_java_sp,
            self.sp
        );
        map.clear();
        // SAFETY: the anchor describes the Java frames this thread left.
        unsafe {
            if anchor.last_java_pc != 0 {
                Frame::new(self.ctx, anchor.last_java_sp, anchor.last_java_fp, anchor.last_java_pc)
            } else {
                Frame::from_sp_fp(self.ctx, anchor.last_java_sp, anchor.last_java_fp)
            }
        }
    }

    fn sender_for_interpreter_frame(&self, map: &mut RegisterMap<'_>) -> Frame<'a> {
        let layout = self.ctx.layout;
        let sender_sp = self.sender_sp();
        let unextended_sp = self.interpreter_frame_sender_sp();
        if self.ctx.has_optimizing_compiler && map.update_map() {
            self.update_map_with_saved_link(map, self.addr_at(layout.link_offset));
        }
        // SAFETY: interpreted frames keep link and return pc at fp.
        unsafe {
            Frame::with_unextended(self.ctx, sender_sp, unextended_sp, self.link(), self.sender_pc())
        }
    }

    fn sender_for_compiled_frame(&self, map: &mut RegisterMap<'_>) -> Frame<'a> {
        let layout = self.ctx.layout;
        let word = self.word();
        let cb = match self.cb {
            Some(cb) => cb,
            None => panic!("compiled frame without code blob at pc {:#x}", self.pc),
        };
        assert!(cb.frame_size() > 0, "blob '{}' has no frame", cb.name());

        let sender_sp = self.unextended_sp + cb.frame_size() * word;
        assert!(sender_sp != self.sp, "must have changed");
        let saved_fp_addr = sender_sp.wrapping_add_signed(-layout.words(layout.sender_sp_offset));
        // SAFETY: the return address and saved fp lie at the top of this frame.
        let (sender_pc, saved_fp) = unsafe { (load(sender_sp - word), load(saved_fp_addr)) };

        if map.update_map() {
            map.set_include_argument_oops(cb.caller_must_gc_arguments());
            if cb.oop_maps().is_some() {
                self.update_register_map(cb, map);
            }
            self.update_map_with_saved_link(map, saved_fp_addr);
        }

        // SAFETY: sender_sp is the top of this frame, inside the same stack.
        unsafe { Frame::with_unextended(self.ctx, sender_sp, sender_sp, saved_fp, sender_pc) }
    }

    /// Record spill locations of the callee-saved registers at this pc
    fn update_register_map(&self, cb: &CodeBlob, map: &mut RegisterMap<'_>) {
        let oop_map = match cb.oop_map_for_return_address(self.pc) {
            Some(oop_map) => oop_map,
            None => panic!("no oop map in '{}' for pc {:#x}", cb.name(), self.pc),
        };
        for (location, saved) in oop_map.callee_saved() {
            if let Some(addr) = self.oopmapreg_to_location(location, map) {
                map.set_location(saved, addr);
            }
        }
    }

    /// The caller's fp was saved at `link_addr`; it spans both slots of the
    /// fp register on 64-bit layouts.
    fn update_map_with_saved_link(&self, map: &mut RegisterMap<'_>, link_addr: Address) {
        let fp_reg = self.ctx.layout.fp_register;
        map.set_location(fp_reg, link_addr);
        if self.ctx.layout.is_lp64() {
            map.set_location(fp_reg.next(), link_addr);
        }
    }

    /// Resolve an oop map location for this frame
    pub fn oopmapreg_to_location(&self, location: MapLocation, map: &RegisterMap<'_>) -> Option<Address> {
        match location {
            MapLocation::Register(reg) => map.location(reg),
            MapLocation::Stack(offset) => Some(self.unextended_sp.wrapping_add_signed(offset as isize)),
        }
    }

    /// Visit the oop slots of a compiled frame at its current pc
    ///
    /// Returns the number of slots visited.
    pub fn oops_do(&self, map: &RegisterMap<'_>, f: &mut dyn FnMut(OopSlot)) -> usize {
        if self.kind() != FrameKind::Compiled {
            return 0;
        }
        let Some(oop_map) = self.cb.and_then(|cb| cb.oop_map_for_return_address(self.pc)) else {
            return 0;
        };
        let mut visited = 0;
        for value in oop_map.values() {
            let Some(loc) = self.oopmapreg_to_location(value.location, map) else {
                log::warn!("oop in unsaved register {:?} at pc {:#x}", value.location, self.pc);
                continue;
            };
            let slot = match value.kind {
                OopMapValueKind::Oop => OopSlot::Wide(loc),
                OopMapValueKind::NarrowOop => OopSlot::Narrow(loc),
                OopMapValueKind::DerivedOop { base } => match self.oopmapreg_to_location(base, map) {
                    Some(base) => OopSlot::Derived { derived: loc, base },
                    None => continue,
                },
                OopMapValueKind::CalleeSaved { .. } => continue,
            };
            f(slot);
            visited += 1;
        }
        visited
    }

    // ---------------------------------------------------------------------
    // Patching and deoptimization
    // ---------------------------------------------------------------------

    /// Replace the return address that resumes this frame
    pub fn patch_pc(&mut self, thread: &ThreadDescriptor, pc: Address) {
        let pc_addr = self.sp - self.word();
        // SAFETY: the return address into this frame sits just below sp.
        let current = unsafe { load(pc_addr) };
        assert!(
            current == self.pc || current == pc,
            "return address {:#x} matches neither frame pc {:#x} nor new pc {:#x}",
            current,
            self.pc,
            pc
        );
        log::trace!(
            "patch_pc on {} at {}: {} -> {}",
            thread.name(),
            format_address(pc_addr),
            format_address(current),
            format_address(pc)
        );
        // SAFETY: see above.
        unsafe { store(pc_addr, pc) };

        self.cb = self.ctx.code_cache.find_blob(pc);
        match self.cb.filter(|cb| cb.is_deopt_pc(pc)).and_then(CodeBlob::nmethod_info) {
            Some(nm) => {
                // SAFETY: the orig-pc slot lies inside this compiled frame.
                let original = unsafe { load(self.unextended_sp + nm.orig_pc_offset) };
                assert_eq!(original, self.pc, "original pc must be stored before patching");
                self.deopt_state = DeoptState::IsDeoptimized;
            },
            None => {
                self.deopt_state = DeoptState::NotDeoptimized;
                self.pc = pc;
            },
        }
    }

    /// Redirect this compiled frame to its method's deoptimization handler
    ///
    /// The current pc is saved in the nmethod's orig-pc slot first. A frame
    /// that is already deoptimized is left alone.
    pub fn deoptimize(&mut self, thread: &ThreadDescriptor) {
        if self.is_deoptimized_frame() {
            return;
        }
        let nm = match self.cb.filter(|cb| cb.is_nmethod()).and_then(CodeBlob::nmethod_info) {
            Some(nm) => *nm,
            None => panic!("frame at pc {:#x} is not a deoptimizable compiled frame", self.pc),
        };
        // SAFETY: the orig-pc slot lies inside this compiled frame.
        unsafe { store(self.unextended_sp + nm.orig_pc_offset, self.pc) };
        let original = self.pc;
        self.patch_pc(thread, nm.deopt_handler);
        debug_assert!(self.is_deoptimized_frame());

        log_event(RtEvent::FrameDeoptimized {
            thread: thread.name().to_string(),
            sp: self.sp,
            original_pc: original,
        });
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// Whether `sender()` can be computed without touching memory outside
    /// the thread's stack
    ///
    /// Every address is bounds-checked before it is read, so this may be
    /// called on frames of a thread that was interrupted at an arbitrary pc.
    pub fn safe_for_sender(&self, thread: &ThreadDescriptor) -> bool {
        let layout = self.ctx.layout;
        let word = self.word();
        let base = thread.stack_base();

        // sp must be within the usable part of the stack
        if !thread.is_in_stack(self.sp) || !Alignment::is_word_aligned(self.sp) {
            return false;
        }
        // unextended sp must be within the stack and above or equal sp
        if !thread.is_in_stack(self.unextended_sp) || self.unextended_sp < self.sp {
            return false;
        }
        // fp must be within the stack and above (but not equal) sp, and so
        // must the return address slot above it
        let fp_safe = thread.is_in_stack(self.fp)
            && self.fp > self.sp
            && Alignment::is_word_aligned(self.fp)
            && thread.is_in_stack(self.addr_at(layout.return_addr_offset));

        if self.pc == 0 {
            return false;
        }
        let kind = self.kind();
        if kind != FrameKind::Interpreted {
            if let Some(cb) = self.cb {
                if !cb.is_walkable_at(self.pc) {
                    return false;
                }
            }
        }

        let (sender_sp, sender_unextended_sp, sender_pc, saved_fp) = match kind {
            FrameKind::Entry => {
                return fp_safe && self.call_wrapper_safe(thread, self.fp);
            },
            FrameKind::NativeLeaf => {
                // the sender will use fp to find its linkage
                return fp_safe && self.at(layout.return_addr_offset) != 0;
            },
            FrameKind::Interpreted => {
                if !fp_safe {
                    return false;
                }
                (
                    self.sender_sp(),
                    self.at(layout.interpreter.sender_sp_offset),
                    self.at(layout.return_addr_offset),
                    self.at(layout.link_offset),
                )
            },
            FrameKind::Compiled => {
                let Some(cb) = self.cb else { return false };
                if cb.frame_size() == 0 {
                    return false;
                }
                let sender_sp = self.unextended_sp.wrapping_add(cb.frame_size() * word);
                if sender_sp > base || sender_sp <= self.sp {
                    return false;
                }
                let saved_fp_addr =
                    sender_sp.wrapping_add_signed(-layout.words(layout.sender_sp_offset));
                if !thread.is_in_stack(saved_fp_addr) {
                    return false;
                }
                // SAFETY: both slots were just checked to lie in the stack.
                let (sender_pc, saved_fp) =
                    unsafe { (load(sender_sp - word), load(saved_fp_addr)) };
                (sender_sp, sender_sp, sender_pc, saved_fp)
            },
        };

        // We must always be able to find a recognizable pc
        if sender_pc == 0 {
            return false;
        }
        let saved_fp_safe = saved_fp < base && saved_fp > sender_sp;

        if self.ctx.code_cache.is_interpreter_code(sender_pc) {
            // only interpreted senders are certain to keep a real fp there
            if !saved_fp_safe || !Alignment::is_word_aligned(saved_fp) {
                return false;
            }
            // SAFETY: the sender is only inspected through its own checks.
            let sender = unsafe {
                Frame::with_unextended(self.ctx, sender_sp, sender_unextended_sp, saved_fp, sender_pc)
            };
            return sender.is_interpreted_frame_valid(thread);
        }

        let Some(sender_blob) = self.ctx.code_cache.find_blob(sender_pc) else {
            return false;
        };
        if sender_blob.is_call_stub() {
            return saved_fp_safe
                && Alignment::is_word_aligned(saved_fp)
                && self.call_wrapper_safe(thread, saved_fp);
        }
        // a return into a deopt handler or a frameless blob cannot be trusted
        if sender_blob.is_deopt_pc(sender_pc) || sender_blob.frame_size() == 0 {
            return false;
        }
        // Anything else in the code cache that calls compiled code is an nmethod
        sender_blob.is_nmethod()
    }

    /// Check the call wrapper of an entry frame whose fp is `fp`
    fn call_wrapper_safe(&self, thread: &ThreadDescriptor, fp: Address) -> bool {
        let slot = fp.wrapping_add_signed(self.ctx.layout.words(self.ctx.layout.entry_frame_call_wrapper_offset));
        if !thread.is_in_stack(slot) {
            return false;
        }
        // SAFETY: bounds checked above.
        let jcw = unsafe { load(slot) };
        jcw > fp
            && Alignment::is_word_aligned(jcw)
            && jcw.saturating_add(std::mem::size_of::<JavaCallWrapper>()) <= thread.stack_base()
    }

    /// Heuristic sanity check of an interpreted frame that may be torn
    pub fn is_interpreted_frame_valid(&self, thread: &ThreadDescriptor) -> bool {
        assert!(self.is_interpreted_frame(), "not an interpreted frame");
        let layout = self.ctx.layout;
        let interp = &layout.interpreter;

        if self.fp == 0 || !Alignment::is_word_aligned(self.fp) {
            return false;
        }
        if self.sp == 0 || !Alignment::is_word_aligned(self.sp) {
            return false;
        }
        if self.fp.wrapping_add_signed(layout.words(interp.initial_sp_offset)) < self.sp {
            return false;
        }
        // catches unsigned wraparound of the check above
        if self.fp <= self.sp {
            return false;
        }
        if (self.fp - self.sp) / self.word() > layout.max_interpreted_frame_words {
            return false;
        }
        if !thread.is_in_stack(self.fp) || !thread.is_in_stack(self.addr_at(interp.initial_sp_offset)) {
            return false;
        }

        if self.at(interp.method_offset) == 0 {
            return false;
        }
        if self.at(interp.bcp_offset) == 0 {
            return false;
        }
        if self.at(interp.cache_offset) == 0 {
            return false;
        }
        let locals = self.at(interp.locals_offset);
        if locals > thread.stack_base() || locals < self.fp {
            return false;
        }
        true
    }

    // ---------------------------------------------------------------------
    // Interpreter frame slots
    // ---------------------------------------------------------------------

    fn interp_slot(&self, offset: isize) -> usize {
        debug_assert!(self.is_interpreted_frame(), "not an interpreted frame");
        self.at(offset)
    }

    /// sp of the caller before it extended its frame for our arguments
    pub fn interpreter_frame_sender_sp(&self) -> Address {
        self.interp_slot(self.ctx.layout.interpreter.sender_sp_offset)
    }

    /// Expression stack top saved across calls; 0 while executing
    pub fn interpreter_frame_last_sp(&self) -> Address {
        self.interp_slot(self.ctx.layout.interpreter.last_sp_offset)
    }

    pub fn interpreter_frame_method(&self) -> usize {
        self.interp_slot(self.ctx.layout.interpreter.method_offset)
    }

    pub fn interpreter_frame_mdp(&self) -> Address {
        self.interp_slot(self.ctx.layout.interpreter.mdp_offset)
    }

    pub fn interpreter_frame_cache(&self) -> Address {
        self.interp_slot(self.ctx.layout.interpreter.cache_offset)
    }

    /// Address of local 0; later locals are at lower addresses
    pub fn interpreter_frame_locals(&self) -> Address {
        self.interp_slot(self.ctx.layout.interpreter.locals_offset)
    }

    pub fn interpreter_frame_bcp(&self) -> Address {
        self.interp_slot(self.ctx.layout.interpreter.bcp_offset)
    }

    /// Bytecode index given the start of the method's bytecodes
    pub fn interpreter_frame_bci(&self, code_base: Address) -> usize {
        let bcp = self.interpreter_frame_bcp();
        assert!(bcp >= code_base, "bcp {:#x} before code base {:#x}", bcp, code_base);
        bcp - code_base
    }

    /// Address of local `index`
    pub fn interpreter_frame_local_at(&self, index: usize) -> Address {
        self.interpreter_frame_locals() - index * self.word()
    }

    /// Top of the expression stack
    pub fn interpreter_frame_tos_address(&self) -> Address {
        match self.interpreter_frame_last_sp() {
            0 => self.sp,
            last_sp => {
                debug_assert!(last_sp <= self.interpreter_frame_monitor_end(), "bad tos");
                last_sp
            },
        }
    }

    /// Oldest end of the monitor block
    pub fn interpreter_frame_monitor_begin(&self) -> Address {
        self.addr_at(self.ctx.layout.interpreter.monitor_block_bottom_offset)
    }

    /// Youngest end of the monitor block
    pub fn interpreter_frame_monitor_end(&self) -> Address {
        let end = self.interp_slot(self.ctx.layout.interpreter.monitor_block_top_offset);
        debug_assert!(end <= self.interpreter_frame_monitor_begin(), "monitor end above begin");
        end
    }

    /// Number of words on the expression stack
    pub fn interpreter_frame_expression_stack_size(&self) -> usize {
        let tos = self.interpreter_frame_tos_address();
        (self.interpreter_frame_monitor_end() - tos) / self.word()
    }

    /// Hex dump of the words between sp and the caller's sp
    pub fn dump(&self) -> String {
        let top = match self.kind() {
            FrameKind::Compiled => self.unextended_sp + self.cb.map_or(0, CodeBlob::frame_size) * self.word(),
            _ => self.sender_sp(),
        };
        let words = top.saturating_sub(self.sp) / self.word();
        // SAFETY: [sp, top) belongs to this frame.
        let body = unsafe { crate::util::debug::dump_words(self.sp, words) };
        format!("{}\n{}", self, body)
    }
}

impl PartialEq for Frame<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.sp == other.sp
            && self.unextended_sp == other.unextended_sp
            && self.fp == other.fp
            && self.pc == other.pc
            && self.deopt_state == other.deopt_state
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind())
            .field("sp", &format_address(self.sp))
            .field("unextended_sp", &format_address(self.unextended_sp))
            .field("fp", &format_address(self.fp))
            .field("pc", &format_address(self.pc))
            .field("cb", &self.cb.map(CodeBlob::name))
            .field("deopt_state", &self.deopt_state)
            .finish()
    }
}

impl fmt::Display for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frame sp={} fp={} pc={}",
            self.kind(),
            format_address(self.sp),
            format_address(self.fp),
            format_address(self.pc)
        )?;
        if self.unextended_sp != self.sp {
            write!(f, " unextended_sp={}", format_address(self.unextended_sp))?;
        }
        if let Some(cb) = self.cb {
            write!(f, " ({})", cb.name())?;
        }
        if self.is_deoptimized_frame() {
            f.write_str(" [deoptimized]")?;
        }
        Ok(())
    }
}
