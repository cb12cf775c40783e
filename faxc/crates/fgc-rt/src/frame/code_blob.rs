//! Code Blobs and the Code Cache
//!
//! A `CodeBlob` describes one region of generated machine code: what kind of
//! code it is, how large its frames are, and where its oops live at each
//! safepoint. The frame walker only ever sees blobs through the
//! [`CodeCache`] trait so that tests and embedders can provide their own
//! lookup.

use super::register_map::VMReg;
use super::Address;
use crate::error::{Result, RtError};
use crate::util::Alignment;
use std::collections::BTreeMap;
use std::ops::Range;

/// What a code blob contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeBlobKind {
    /// Compiled method
    Nmethod,
    /// Out-of-line runtime call stub
    RuntimeStub,
    /// Handler that saves all registers at a safepoint poll
    SafepointStub,
    /// Target of deoptimized returns
    DeoptimizationStub,
    /// Calling-convention adapter (i2c/c2i)
    Adapter,
    /// The stub native code uses to enter Java; frames in it are entry frames
    CallStub,
    /// Miscellaneous generated code
    BufferBlob,
}

/// Where an oop map entry lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapLocation {
    /// In a register whose spill slot the `RegisterMap` knows
    Register(VMReg),
    /// Byte offset from the frame's unextended sp
    Stack(i32),
}

/// What an oop map entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OopMapValueKind {
    Oop,
    NarrowOop,
    /// The caller's value of `saved` was spilled here
    CalleeSaved { saved: VMReg },
    /// Interior pointer derived from the oop at `base`
    DerivedOop { base: MapLocation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OopMapValue {
    pub location: MapLocation,
    pub kind: OopMapValueKind,
}

impl OopMapValue {
    pub fn oop(location: MapLocation) -> Self {
        Self {
            location,
            kind: OopMapValueKind::Oop,
        }
    }

    pub fn narrow_oop(location: MapLocation) -> Self {
        Self {
            location,
            kind: OopMapValueKind::NarrowOop,
        }
    }

    pub fn callee_saved(location: MapLocation, saved: VMReg) -> Self {
        Self {
            location,
            kind: OopMapValueKind::CalleeSaved { saved },
        }
    }

    pub fn derived_oop(location: MapLocation, base: MapLocation) -> Self {
        Self {
            location,
            kind: OopMapValueKind::DerivedOop { base },
        }
    }
}

/// Oop locations at one safepoint pc
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OopMap {
    pc_offset: usize,
    values: Vec<OopMapValue>,
}

impl OopMap {
    pub fn new(pc_offset: usize) -> Self {
        Self {
            pc_offset,
            values: Vec::new(),
        }
    }

    /// # Panics
    ///
    /// If a stack location is not a whole number of stack slots.
    pub fn with(mut self, value: OopMapValue) -> Self {
        if let MapLocation::Stack(offset) = value.location {
            assert!(Alignment::is_slot_aligned(offset), "oop map offset {} splits a stack slot", offset);
        }
        self.values.push(value);
        self
    }

    pub fn pc_offset(&self) -> usize {
        self.pc_offset
    }

    pub fn values(&self) -> &[OopMapValue] {
        &self.values
    }

    pub fn callee_saved(&self) -> impl Iterator<Item = (MapLocation, VMReg)> + '_ {
        self.values.iter().filter_map(|v| match v.kind {
            OopMapValueKind::CalleeSaved { saved } => Some((v.location, saved)),
            _ => None,
        })
    }
}

/// All oop maps of one blob, sorted by pc offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OopMapSet {
    maps: Vec<OopMap>,
}

impl OopMapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, map: OopMap) {
        let at = self.maps.partition_point(|m| m.pc_offset < map.pc_offset);
        assert!(
            self.maps.get(at).map_or(true, |m| m.pc_offset != map.pc_offset),
            "duplicate oop map at pc offset {}",
            map.pc_offset
        );
        self.maps.insert(at, map);
    }

    pub fn with(mut self, map: OopMap) -> Self {
        self.add(map);
        self
    }

    /// Map recorded for exactly `pc_offset`
    pub fn find_map_at_offset(&self, pc_offset: usize) -> Option<&OopMap> {
        self.maps
            .binary_search_by_key(&pc_offset, |m| m.pc_offset)
            .ok()
            .map(|i| &self.maps[i])
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Deoptimization data of a compiled method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmethodInfo {
    /// Address that deoptimized frames return to
    pub deopt_handler: Address,
    /// Byte offset from unextended sp of the slot saving the original pc
    pub orig_pc_offset: usize,
}

/// Descriptor of one region of generated code
#[derive(Debug, Clone)]
pub struct CodeBlob {
    name: String,
    kind: CodeBlobKind,
    code: Range<Address>,
    frame_complete_offset: Option<usize>,
    frame_size: usize,
    oop_maps: Option<OopMapSet>,
    nmethod: Option<NmethodInfo>,
    caller_must_gc_arguments: bool,
}

impl CodeBlob {
    /// Create a blob covering `[code_begin, code_begin + code_len)`
    ///
    /// The frame is considered complete from the first instruction until
    /// `with_frame_complete` says otherwise.
    pub fn new(name: impl Into<String>, kind: CodeBlobKind, code_begin: Address, code_len: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            code: code_begin..code_begin + code_len,
            frame_complete_offset: Some(0),
            frame_size: 0,
            oop_maps: None,
            nmethod: None,
            caller_must_gc_arguments: false,
        }
    }

    /// Frame size in words, including the return address
    pub fn with_frame_size(mut self, words: usize) -> Self {
        self.frame_size = words;
        self
    }

    /// Offset at which the prologue has finished; `None` if never walkable
    pub fn with_frame_complete(mut self, offset: Option<usize>) -> Self {
        self.frame_complete_offset = offset;
        self
    }

    pub fn with_oop_maps(mut self, maps: OopMapSet) -> Self {
        self.oop_maps = Some(maps);
        self
    }

    pub fn with_nmethod(mut self, info: NmethodInfo) -> Self {
        self.nmethod = Some(info);
        self
    }

    pub fn with_caller_must_gc_arguments(mut self, value: bool) -> Self {
        self.caller_must_gc_arguments = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CodeBlobKind {
        self.kind
    }

    pub fn code_begin(&self) -> Address {
        self.code.start
    }

    pub fn code_end(&self) -> Address {
        self.code.end
    }

    pub fn contains(&self, pc: Address) -> bool {
        self.code.contains(&pc)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn oop_maps(&self) -> Option<&OopMapSet> {
        self.oop_maps.as_ref()
    }

    pub fn nmethod_info(&self) -> Option<&NmethodInfo> {
        self.nmethod.as_ref()
    }

    pub fn caller_must_gc_arguments(&self) -> bool {
        self.caller_must_gc_arguments
    }

    pub fn is_nmethod(&self) -> bool {
        self.kind == CodeBlobKind::Nmethod
    }

    pub fn is_call_stub(&self) -> bool {
        self.kind == CodeBlobKind::CallStub
    }

    pub fn is_adapter(&self) -> bool {
        self.kind == CodeBlobKind::Adapter
    }

    /// Whether `pc` is past the prologue
    pub fn is_frame_complete_at(&self, pc: Address) -> bool {
        match self.frame_complete_offset {
            Some(offset) => self.contains(pc) && pc >= self.code.start + offset,
            None => false,
        }
    }

    /// Whether a frame stopped at `pc` can be walked by an async sampler
    ///
    /// Adapters never complete their frame. Nmethods and runtime stubs are
    /// only walkable once their prologue has run.
    pub fn is_walkable_at(&self, pc: Address) -> bool {
        if self.is_frame_complete_at(pc) && !self.is_adapter() {
            return true;
        }
        !matches!(
            self.kind,
            CodeBlobKind::Nmethod | CodeBlobKind::Adapter | CodeBlobKind::RuntimeStub
        )
    }

    /// Whether `pc` is this nmethod's deoptimization handler
    pub fn is_deopt_pc(&self, pc: Address) -> bool {
        self.nmethod.is_some_and(|nm| nm.deopt_handler == pc)
    }

    /// Oop map of the safepoint at return address `pc`
    pub fn oop_map_for_return_address(&self, pc: Address) -> Option<&OopMap> {
        if !self.contains(pc) {
            return None;
        }
        self.oop_maps.as_ref()?.find_map_at_offset(pc - self.code.start)
    }
}

/// Lookup of generated code by pc
pub trait CodeCache: Sync {
    /// Whether `pc` belongs to the bytecode interpreter
    fn is_interpreter_code(&self, pc: Address) -> bool;

    /// Blob containing `pc`, if any
    fn find_blob(&self, pc: Address) -> Option<&CodeBlob>;
}

/// In-process code cache keyed by code start address
#[derive(Debug, Default)]
pub struct CodeBlobRegistry {
    interpreter: Option<Range<Address>>,
    blobs: BTreeMap<Address, CodeBlob>,
}

impl CodeBlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address range of the template interpreter
    pub fn set_interpreter_range(&mut self, range: Range<Address>) {
        self.interpreter = Some(range);
    }

    /// Register a blob; its code range must not overlap an existing one
    pub fn register(&mut self, blob: CodeBlob) -> Result<()> {
        if blob.code.is_empty() {
            return Err(RtError::InvalidArgument(format!(
                "code blob '{}' has an empty code range",
                blob.name
            )));
        }
        if let Some(interp) = &self.interpreter {
            if blob.code.start < interp.end && interp.start < blob.code.end {
                return Err(RtError::InvalidArgument(format!(
                    "code blob '{}' overlaps the interpreter",
                    blob.name
                )));
            }
        }
        let before = self.blobs.range(..blob.code.end).next_back();
        if let Some((_, existing)) = before {
            if existing.code.end > blob.code.start {
                return Err(RtError::InvalidArgument(format!(
                    "code blob '{}' overlaps '{}'",
                    blob.name, existing.name
                )));
            }
        }
        log::trace!(
            "registered code blob '{}' [{:#x}, {:#x})",
            blob.name,
            blob.code.start,
            blob.code.end
        );
        self.blobs.insert(blob.code.start, blob);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl CodeCache for CodeBlobRegistry {
    fn is_interpreter_code(&self, pc: Address) -> bool {
        self.interpreter.as_ref().is_some_and(|r| r.contains(&pc))
    }

    fn find_blob(&self, pc: Address) -> Option<&CodeBlob> {
        self.blobs
            .range(..=pc)
            .next_back()
            .map(|(_, blob)| blob)
            .filter(|blob| blob.contains(pc))
    }
}
