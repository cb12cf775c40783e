//! Thread Descriptors
//!
//! The frame walker never inspects live threads directly. A parked thread is
//! described by a `ThreadDescriptor`: its stack bounds, the anchor recording
//! its last Java frame, and its pending deferred local writes.

use super::deferred::DeferredLocals;
use super::{Address, Frame, WalkContext};

/// Last Java frame of a thread that has left Java code
///
/// An all-zero anchor means the thread has no Java frames (or, when stored
/// in a `JavaCallWrapper`, that the entry frame is the first frame).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JavaFrameAnchor {
    pub last_java_sp: Address,
    pub last_java_fp: Address,
    pub last_java_pc: Address,
}

impl JavaFrameAnchor {
    pub fn new(last_java_sp: Address, last_java_fp: Address, last_java_pc: Address) -> Self {
        Self {
            last_java_sp,
            last_java_fp,
            last_java_pc,
        }
    }

    pub fn has_last_java_frame(&self) -> bool {
        self.last_java_sp != 0
    }
}

/// Record saved by the call stub when native code enters Java
///
/// An entry frame stores the address of its wrapper at
/// `fp + entry_frame_call_wrapper_offset`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JavaCallWrapper {
    /// Java state of the thread at the time it called into native code
    pub anchor: JavaFrameAnchor,
    /// Id of the thread that owns the wrapper
    pub thread_id: u64,
}

/// Stack description of one thread
#[derive(Debug)]
pub struct ThreadDescriptor {
    id: u64,
    name: String,
    stack_base: Address,
    stack_size: usize,
    anchor: JavaFrameAnchor,
    deferred_locals: DeferredLocals,
}

impl ThreadDescriptor {
    /// Describe a thread whose stack occupies `[stack_base - stack_size, stack_base)`
    pub fn new(id: u64, name: impl Into<String>, stack_base: Address, stack_size: usize) -> Self {
        assert!(stack_size <= stack_base, "stack wraps below address zero");
        Self {
            id,
            name: name.into(),
            stack_base,
            stack_size,
            anchor: JavaFrameAnchor::default(),
            deferred_locals: DeferredLocals::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Highest address of the stack (exclusive)
    pub fn stack_base(&self) -> Address {
        self.stack_base
    }

    /// Lowest address of the stack
    pub fn stack_end(&self) -> Address {
        self.stack_base - self.stack_size
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Whether `addr` lies inside the stack
    pub fn is_in_stack(&self, addr: Address) -> bool {
        addr < self.stack_base && addr >= self.stack_end()
    }

    pub fn anchor(&self) -> &JavaFrameAnchor {
        &self.anchor
    }

    pub fn set_last_java_frame(&mut self, anchor: JavaFrameAnchor) {
        self.anchor = anchor;
    }

    pub fn clear_last_java_frame(&mut self) {
        self.anchor = JavaFrameAnchor::default();
    }

    pub fn has_last_java_frame(&self) -> bool {
        self.anchor.has_last_java_frame()
    }

    pub fn deferred_locals(&self) -> &DeferredLocals {
        &self.deferred_locals
    }

    /// The youngest Java frame of this thread
    ///
    /// # Safety
    ///
    /// The thread must be stopped and its anchor must describe frames that
    /// stay readable for `'a`.
    pub unsafe fn last_frame<'a>(&self, ctx: WalkContext<'a>) -> Option<Frame<'a>> {
        if !self.anchor.has_last_java_frame() {
            return None;
        }
        let JavaFrameAnchor {
            last_java_sp,
            last_java_fp,
            last_java_pc,
        } = self.anchor;
        Some(if last_java_pc != 0 {
            Frame::new(ctx, last_java_sp, last_java_fp, last_java_pc)
        } else {
            Frame::from_sp_fp(ctx, last_java_sp, last_java_fp)
        })
    }
}

impl std::fmt::Display for ThreadDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "\"{}\" #{} stack [{}, {})",
            self.name,
            self.id,
            crate::util::format_address(self.stack_end()),
            crate::util::format_address(self.stack_base)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_bounds() {
        let thread = ThreadDescriptor::new(7, "main", 0x20_0000, 0x1_0000);
        assert_eq!(thread.stack_end(), 0x1F_0000);
        assert!(thread.is_in_stack(0x1F_0000));
        assert!(thread.is_in_stack(0x1F_FFF8));
        assert!(!thread.is_in_stack(0x20_0000));
        assert!(!thread.is_in_stack(0x1E_FFF8));
    }

    #[test]
    fn test_anchor() {
        let mut thread = ThreadDescriptor::new(7, "main", 0x20_0000, 0x1_0000);
        assert!(!thread.has_last_java_frame());
        thread.set_last_java_frame(JavaFrameAnchor::new(0x1F_8000, 0x1F_8040, 0x1234));
        assert!(thread.has_last_java_frame());
        thread.clear_last_java_frame();
        assert!(!thread.has_last_java_frame());
    }

    #[test]
    fn test_display() {
        let thread = ThreadDescriptor::new(7, "main", 0x20_0000, 0x1_0000);
        let text = thread.to_string();
        assert!(text.contains("\"main\" #7"));
        assert!(text.contains("0x00000000001F0000"));
    }
}
