//! Compiled Virtual Frames
//!
//! With inlining, one physical compiled frame holds several Java scopes.
//! A `CompiledVFrame` is the view of one of them: its method, bci and the
//! debug info that locates its locals and expression stack.

use super::deferred::DeferredValue;
use super::register_map::RegisterMap;
use super::stack_value::{create_stack_value, ScopeValue, StackValueCollection};
use super::thread::ThreadDescriptor;
use super::{Address, Frame};

/// Opaque method handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub usize);

/// Debug info of one scope at one safepoint
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeDesc {
    pub method: MethodId,
    pub bci: u32,
    pub locals: Vec<ScopeValue>,
    pub expressions: Vec<ScopeValue>,
}

/// Identifies one scope of one physical frame
///
/// A raw sp is only unique while the frame is live, so the method, bci and
/// inlining depth are part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameIdentity {
    pub method: MethodId,
    pub bci: u32,
    pub frame_id: Address,
    pub depth: u32,
}

/// One Java scope of a compiled frame
#[derive(Debug, Clone, Copy)]
pub struct CompiledVFrame<'a> {
    frame: Frame<'a>,
    scope: &'a ScopeDesc,
    depth: u32,
}

impl<'a> CompiledVFrame<'a> {
    /// `depth` counts inlined scopes, 0 being the outermost method
    pub fn new(frame: Frame<'a>, scope: &'a ScopeDesc, depth: u32) -> Self {
        Self { frame, scope, depth }
    }

    pub fn frame(&self) -> &Frame<'a> {
        &self.frame
    }

    pub fn method(&self) -> MethodId {
        self.scope.method
    }

    pub fn bci(&self) -> u32 {
        self.scope.bci
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn identity(&self) -> FrameIdentity {
        FrameIdentity {
            method: self.scope.method,
            bci: self.scope.bci,
            frame_id: self.frame.id(),
            depth: self.depth,
        }
    }

    fn create_values(&self, map: &RegisterMap<'_>, values: &[ScopeValue]) -> StackValueCollection {
        let mut result = StackValueCollection::with_capacity(self.frame.context().layout.is_lp64(), values.len());
        for sv in values {
            result.push(create_stack_value(&self.frame, map, sv));
        }
        result
    }

    /// Locals as the scope sees them, including deferred writes
    pub fn locals(&self, map: &RegisterMap<'_>) -> StackValueCollection {
        let mut locals = self.create_values(map, &self.scope.locals);
        map.thread().deferred_locals().apply(&self.identity(), &mut locals);
        locals
    }

    pub fn expressions(&self, map: &RegisterMap<'_>) -> StackValueCollection {
        self.create_values(map, &self.scope.expressions)
    }

    /// Park a write to local `index` until the frame is unpacked
    ///
    /// # Panics
    ///
    /// If the frame has not been deoptimized or the slots `value` covers
    /// from `index` are not all locals of this scope.
    pub fn update_local(&self, thread: &ThreadDescriptor, index: usize, value: DeferredValue) {
        assert!(
            self.frame.is_deoptimized_frame(),
            "frame must be deoptimized before its locals are written"
        );
        assert!(
            index + value.slots() <= self.scope.locals.len(),
            "local {} out of range for {:?} ({} locals)",
            index,
            value,
            self.scope.locals.len()
        );
        thread.deferred_locals().update(self.identity(), index, value);
    }
}
