//! Frame Walking Tests - Sender Resolution on Synthetic Stacks
//!
//! Each test lays out a stack word by word and checks that the walker
//! reconstructs exactly the frames that were written.

mod common;

use common::*;
use fgc_rt::frame::{Frame, FrameKind, FrameLayout, OopSlot, RegisterMap, StackFrameStream, VMReg, WalkContext};
use fgc_rt::taskqueue::{StarTask, StarTaskQueue};

/// Sender of an interpreted frame comes straight from its fixed slots
///
/// **Invariant verified:** sp = fp + 2 words, unextended sp = fp[-1],
/// fp = fp[0], pc = fp[1]
#[test]
fn test_interpreted_sender_round_trip() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let thread = stack.thread("main");
    let frames = three_frame_stack(&stack);

    let interp = unsafe { Frame::new(ctx, frames.interp_sp, frames.interp_fp, INTERP_PC) };
    assert_eq!(interp.kind(), FrameKind::Interpreted);

    let mut map = RegisterMap::new(&thread, ctx.layout, true);
    let sender = interp.sender(&mut map);

    assert_eq!(sender.sp(), frames.interp_fp + 2 * W);
    assert_eq!(sender.unextended_sp(), stack.get(frames.interp_fp - W));
    assert_eq!(sender.fp(), stack.get(frames.interp_fp));
    assert_eq!(sender.pc(), stack.get(frames.interp_fp + W));
    assert_eq!(sender.kind(), FrameKind::Entry);
    assert!(sender.is_first_frame());
}

#[test]
fn test_compiled_sender_round_trip() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let thread = stack.thread("main");
    let frames = three_frame_stack(&stack);

    let compiled = unsafe { Frame::new(ctx, frames.compiled_sp, 0, NM_PC) };
    assert!(compiled.is_compiled_frame());

    let mut map = RegisterMap::new(&thread, ctx.layout, true);
    let sender = compiled.sender(&mut map);

    assert_eq!(sender.sp(), frames.interp_sp);
    assert_eq!(sender.fp(), frames.interp_fp);
    assert_eq!(sender.pc(), INTERP_PC);
    assert_eq!(map.location(VMReg::new(NM_SAVED_REG)), Some(frames.compiled_sp + 8));
    assert_eq!(map.location(ctx.layout.fp_register), Some(frames.interp_sp - 2 * W));
}

#[test]
fn test_stream_walks_whole_stack() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let mut thread = stack.thread("main");
    let frames = three_frame_stack(&stack);
    thread.set_last_java_frame(frames.anchor());

    let walked: Vec<_> = unsafe { StackFrameStream::new(&thread, ctx, true) }
        .map(|f| (f.kind(), f.sp()))
        .collect();

    assert_eq!(
        walked,
        vec![
            (FrameKind::Compiled, frames.compiled_sp),
            (FrameKind::Interpreted, frames.interp_sp),
            (FrameKind::Entry, frames.entry_sp),
        ]
    );
}

/// A consistent stack passes every safety check
#[test]
fn test_safe_stream_accepts_consistent_stack() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let mut thread = stack.thread("sampler-target");
    let frames = three_frame_stack(&stack);
    thread.set_last_java_frame(frames.anchor());

    let mut walk = unsafe { StackFrameStream::new_safe(&thread, ctx, false) };
    let mut count = 0;
    while walk.next().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
    assert_eq!(walk.depth(), 3);
    assert!(!walk.aborted());
}

/// **Bug this finds:** reading through a corrupted saved fp
#[test]
fn test_safe_stream_stops_at_torn_link() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let mut thread = stack.thread("sampler-target");
    let frames = three_frame_stack(&stack);
    // compiled frame's saved fp now points below its own sp
    stack.put(frames.interp_sp - 2 * W, stack.slot(2));
    thread.set_last_java_frame(frames.anchor());

    let mut walk = unsafe { StackFrameStream::new_safe(&thread, ctx, false) };
    assert_eq!(walk.next().map(|f| f.kind()), Some(FrameKind::Compiled));
    assert!(walk.next().is_none());
    assert!(walk.aborted());
    assert_eq!(walk.depth(), 1);
}

/// Roots found while walking feed the root-scanning queue
#[test]
fn test_oops_do_feeds_star_task_queue() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let mut thread = stack.thread("main");
    let frames = three_frame_stack(&stack);
    thread.set_last_java_frame(frames.anchor());

    let queue = StarTaskQueue::new(4);
    let mut walk = unsafe { StackFrameStream::new(&thread, ctx, true) };
    while let Some(frame) = walk.next() {
        if frame.is_compiled_frame() {
            frame.oops_do(walk.register_map(), &mut |slot: OopSlot| {
                if let Some(task) = slot.to_star_task() {
                    queue.push(task);
                }
            });
        }
    }

    let task = queue.pop_local().expect("one root");
    assert_eq!(task, StarTask::wide(frames.compiled_sp + NM_OOP_OFFSET));
    assert!(!task.is_narrow());
    assert_eq!(stack.get(task.slot()), frames.oop);
    assert!(queue.is_empty());
}

#[test]
fn test_deoptimized_frame_keeps_walking() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(128);
    let thread = stack.thread("main");
    let frames = three_frame_stack(&stack);
    // the native leaf below the compiled frame returned into it
    stack.put(frames.compiled_sp - W, NM_PC);

    let mut compiled = unsafe { Frame::from_sp_fp(ctx, frames.compiled_sp, 0) };
    compiled.deoptimize(&thread);
    assert_eq!(stack.get(frames.compiled_sp - W), NM_DEOPT);

    let reread = unsafe { Frame::from_sp_fp(ctx, frames.compiled_sp, 0) };
    assert!(reread.is_deoptimized_frame());
    assert_eq!(reread.pc(), NM_PC);

    let mut map = RegisterMap::new(&thread, ctx.layout, false);
    let sender = reread.sender(&mut map);
    assert_eq!(sender.kind(), FrameKind::Interpreted);
    assert_eq!(sender.fp(), frames.interp_fp);
}
