//! Stack Value Tests - Typed Values Recovered from Compiled Frames
//!
//! Debug info describes where each local lives; these tests write known bit
//! patterns into a synthetic compiled frame and read them back through
//! `create_stack_value` and `CompiledVFrame`.

mod common;

use common::*;
use fgc_rt::frame::{
    create_stack_value, CompiledVFrame, DeferredValue, Frame, FrameLayout, Location, LocationType,
    MethodId, NarrowOopEncoding, RegisterMap, ScopeDesc, ScopeValue, StackValue,
    StackValueCollection, VMReg, WalkContext,
};
use fgc_rt::util::constants::JUNK_WORD;

const LOCAL_INT_OFFSET: i32 = 24;

/// A float held in a double register comes back bit-exact, whatever the
/// register's upper half holds
///
/// **Bug this finds:** reading the whole register as a double and
/// converting it down, which turns the low-half float into garbage and
/// quiets signalling NaNs
#[test]
fn test_float_in_double_register_is_bit_exact() {
    let registry = registry();
    let layout = FrameLayout::host();
    let ctx = WalkContext::new(layout, &registry);
    let stack = SyntheticStack::new(64);
    let thread = stack.thread("main");
    let frame = unsafe { Frame::new(ctx, stack.slot(10), 0, NM_PC) };
    let xmm0 = VMReg::new(layout.float_register_base);
    let sv = ScopeValue::Location(Location::register(LocationType::FloatInDbl, xmm0));
    let spill = stack.slot(40);
    let junk_high = JUNK_WORD & !0xFFFF_FFFF;

    for bits in [1.5f32.to_bits(), 3.141_592_7_f32.to_bits(), 0x7FA0_0001, 0xFF80_0000] {
        stack.put(spill, (junk_high | bits as u64) as usize);
        let mut map = RegisterMap::new(&thread, layout, true);
        map.set_location(xmm0, spill);

        let result = create_stack_value(&frame, &map, &sv);

        let mut locals = StackValueCollection::new(layout.is_lp64());
        locals.push(result);
        assert_eq!(locals.float_at(0).to_bits(), bits, "stored {:#x}", bits);
        assert_eq!(result.get_int() as u64 >> 32, JUNK_WORD >> 32);
    }
}

#[test]
fn test_values_from_stack_slots() {
    let registry = registry();
    let layout = FrameLayout::host();
    let heap_base = 0x7_0000_0000usize;
    let ctx = WalkContext::new(layout, &registry).with_narrow_oop_encoding(NarrowOopEncoding::new(heap_base, 3));
    let stack = SyntheticStack::new(64);
    let thread = stack.thread("main");
    let sp = stack.slot(10);
    let frame = unsafe { Frame::new(ctx, sp, 0, NM_PC) };
    let map = RegisterMap::new(&thread, layout, false);

    stack.put(sp + 8, 0x10);
    stack.put(sp + 16, 0xBEEF_0000);
    stack.put(sp + 24, (-7i64) as usize);

    let narrow = create_stack_value(&frame, &map, &ScopeValue::Location(Location::stack(LocationType::NarrowOop, 8)));
    assert_eq!(narrow.get_obj(), heap_base + 0x80);

    let oop = create_stack_value(&frame, &map, &ScopeValue::Location(Location::stack(LocationType::Oop, 16)));
    assert_eq!(oop.get_obj(), 0xBEEF_0000);
    assert!(!oop.is_scalar_replaced());

    let long = create_stack_value(&frame, &map, &ScopeValue::Location(Location::stack(LocationType::Lng, 24)));
    assert_eq!(long.get_int(), -7);

    let dead = create_stack_value(&frame, &map, &ScopeValue::Location(Location::stack(LocationType::Invalid, 0)));
    assert!(matches!(dead, StackValue::Conflict));

    // a register no frame recorded
    let unsaved = ScopeValue::Location(Location::register(LocationType::Normal, VMReg::new(3)));
    assert!(matches!(create_stack_value(&frame, &map, &unsaved), StackValue::Conflict));
}

#[test]
fn test_scalar_replaced_object() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(32);
    let thread = stack.thread("main");
    let frame = unsafe { Frame::new(ctx, stack.slot(4), 0, NM_PC) };
    let map = RegisterMap::new(&thread, ctx.layout, false);

    let pending = create_stack_value(&frame, &map, &ScopeValue::Object { id: 1, materialized: 0 });
    assert!(pending.is_scalar_replaced());

    let done = create_stack_value(&frame, &map, &ScopeValue::Object { id: 1, materialized: 0x9000 });
    assert!(!done.is_scalar_replaced());
    assert_eq!(done.get_obj(), 0x9000);
}

fn scope() -> ScopeDesc {
    ScopeDesc {
        method: MethodId(0x4242),
        bci: 17,
        locals: vec![
            ScopeValue::Location(Location::stack(LocationType::Normal, LOCAL_INT_OFFSET)),
            ScopeValue::ConstantInt(5),
            ScopeValue::ConstantOop(0xA000),
        ],
        expressions: vec![ScopeValue::ConstantInt(-1)],
    }
}

/// A write parked on a deoptimized frame wins over the frame's own value
#[test]
fn test_deferred_write_overrides_reconstructed_local() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(64);
    let thread = stack.thread("main");
    let sp = stack.slot(10);
    stack.put(sp - W, NM_PC);
    stack.put(sp + LOCAL_INT_OFFSET as usize, 41);

    let mut frame = unsafe { Frame::from_sp_fp(ctx, sp, 0) };
    frame.deoptimize(&thread);

    let scope = scope();
    let vf = CompiledVFrame::new(frame, &scope, 0);
    let map = RegisterMap::new(&thread, ctx.layout, false);
    assert_eq!(vf.locals(&map).int_at(0), 41);

    vf.update_local(&thread, 0, DeferredValue::Int(99));
    vf.update_local(&thread, 2, DeferredValue::Object(0xB000));

    let locals = vf.locals(&map);
    assert_eq!(locals.int_at(0), 99);
    assert_eq!(locals.int_at(1), 5);
    assert_eq!(locals.obj_at(2), 0xB000);
    assert_eq!(vf.expressions(&map).int_at(0), -1);

    // the frame's memory is untouched
    assert_eq!(stack.get(sp + LOCAL_INT_OFFSET as usize), 41);

    // an inlined scope at another depth sees nothing
    let inner = CompiledVFrame::new(frame, &scope, 1);
    assert_eq!(inner.locals(&map).int_at(0), 41);

    // unpacking the frame drops its writes
    assert_eq!(thread.deferred_locals().remove_frame(frame.id()), 1);
    assert_eq!(vf.locals(&map).int_at(0), 41);
}

#[test]
#[should_panic(expected = "must be deoptimized")]
fn test_update_local_requires_deoptimization() {
    let registry = registry();
    let ctx = WalkContext::new(FrameLayout::host(), &registry);
    let stack = SyntheticStack::new(64);
    let thread = stack.thread("main");
    let frame = unsafe { Frame::new(ctx, stack.slot(10), 0, NM_PC) };

    let scope = scope();
    CompiledVFrame::new(frame, &scope, 0).update_local(&thread, 0, DeferredValue::Int(1));
}
