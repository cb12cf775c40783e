//! Stack Frame Stream
//!
//! Iterates the frames of a stopped thread from youngest to oldest,
//! maintaining the register map along the way.
//!
//! ```rust,ignore
//! let mut frames = unsafe { StackFrameStream::new(&thread, ctx, true) };
//! while let Some(frame) = frames.next() {
//!     frame.oops_do(frames.register_map(), &mut |slot| roots.push(slot));
//! }
//! ```

use super::register_map::RegisterMap;
use super::thread::ThreadDescriptor;
use super::{Frame, WalkContext};
use crate::logging::{log_event, RtEvent};

pub struct StackFrameStream<'a> {
    current: Option<Frame<'a>>,
    map: RegisterMap<'a>,
    thread: &'a ThreadDescriptor,
    safe: bool,
    started: bool,
    aborted: bool,
    depth: usize,
}

impl<'a> StackFrameStream<'a> {
    /// Walk `thread`, trusting every frame
    ///
    /// # Safety
    ///
    /// The thread must be stopped with a consistent stack for `'a`.
    pub unsafe fn new(thread: &'a ThreadDescriptor, ctx: WalkContext<'a>, update_map: bool) -> Self {
        Self {
            current: thread.last_frame(ctx),
            map: RegisterMap::new(thread, ctx.layout, update_map),
            thread,
            safe: false,
            started: false,
            aborted: false,
            depth: 0,
        }
    }

    /// Walk `thread`, checking `safe_for_sender` before every step
    ///
    /// A frame that fails the check ends the walk.
    ///
    /// # Safety
    ///
    /// The thread's anchor must point into its stack; the frames themselves
    /// may be inconsistent.
    pub unsafe fn new_safe(thread: &'a ThreadDescriptor, ctx: WalkContext<'a>, update_map: bool) -> Self {
        let mut stream = Self::new(thread, ctx, update_map);
        stream.safe = true;
        stream
    }

    /// Register map valid for the frame last returned
    pub fn register_map(&self) -> &RegisterMap<'a> {
        &self.map
    }

    /// Whether a safe walk stopped before reaching the first frame
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Number of frames returned so far
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn abort(&mut self, frame: &Frame<'a>) {
        log::debug!("stack walk of {} stopped at {}", self.thread.name(), frame);
        log_event(RtEvent::StackWalkAborted {
            thread: self.thread.name().to_string(),
            depth: self.depth,
            sp: frame.sp(),
            pc: frame.pc(),
        });
        self.aborted = true;
        self.current = None;
    }
}

impl<'a> Iterator for StackFrameStream<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Frame<'a>> {
        if !self.started {
            self.started = true;
        } else {
            let frame = self.current?;
            // checked first: is_first_frame reads the entry frame's wrapper
            if self.safe && frame.pc() != 0 && !frame.safe_for_sender(self.thread) {
                self.abort(&frame);
                return None;
            }
            if frame.is_first_frame() {
                self.current = None;
                return None;
            }
            self.current = Some(frame.sender(&mut self.map));
        }
        if self.current.is_some() {
            self.depth += 1;
        }
        self.current
    }
}
