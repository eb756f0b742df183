//! Startup, frame, and input lifecycle of a small triangle module.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::tests_outside_test_module,
    reason = "Integration tests fail loudly on unexpected errors"
)]

mod common;

use common::{GameModule, TARGET_SIZE, headless_gpu, tri_library};
use std::time::{Duration, Instant};
use wasm_bridge::{Delivery, InputEvent, Session, readback_target};
use winit::dpi::PhysicalSize;
use winit::event::ElementState;
use winit::keyboard::KeyCode;

const SIZE_REGION: usize = 0x100;
const POINTER_REGION: usize = 0x108;
const SEEN_FLAGS: usize = 0x184;
const FRAME_COUNT: usize = 0x188;
const EVENT_COUNT: usize = 0x18C;
const LAST_RECORD: usize = 0x190;

fn triangle_module() -> GameModule<'static> {
    GameModule {
        items: r#"
  (global $uniform (mut i32) (i32.const 0))
  (global $vertices (mut i32) (i32.const 0))
  (global $pipeline (mut i32) (i32.const 0))
  (global $group (mut i32) (i32.const 0))
  (data (i32.const 0x110) "tri")
  (data (i32.const 0x120) "\00\00\00\00\00\00\00\00\01\00\00\00")"#,
        setup: "(call $link (i32.const 0) (i32.const 0x100))
                (call $link (i32.const 1) (i32.const 0x108))
                (call $link (i32.const 9) (i32.const 0x400))",
        init: "(global.set $uniform (call $buffer_create (i32.const 16) (i32.const 72)))
               (global.set $vertices (call $buffer_create (i32.const 36) (i32.const 40)))
               (global.set $pipeline (call $pipeline_create (i32.const 0x110) (i32.const 3)))
               (global.set $group (call $bind_group_create
                   (global.get $pipeline) (i32.const 0) (i32.const 0x120) (i32.const 1)))
               (call $buffer_write (global.get $uniform) (i32.const 0x140) (i32.const 16) (i32.const 0))",
        frame: "(i32.store (i32.const 0x184) (local.get $flags))
                (i32.store (i32.const 0x188) (i32.add (i32.load (i32.const 0x188)) (i32.const 1)))
                (call $bind_pipeline (global.get $pipeline))
                (call $bind_bind_group (i32.const 0) (global.get $group))
                (call $bind_vertex_buffer (global.get $vertices))
                (call $draw (i32.const 3) (i32.const 1) (i32.const 0) (i32.const 0))",
        event: "(i32.store (i32.const 0x190) (i32.load (local.get $record)))
                (i32.store (i32.const 0x194) (i32.load offset=4 (local.get $record)))
                (i32.store (i32.const 0x198) (i32.load offset=8 (local.get $record)))
                (i32.store (i32.const 0x18c) (i32.add (i32.load (i32.const 0x18c)) (i32.const 1)))",
    }
}

fn start_triangle() -> Option<Session> {
    let gpu = headless_gpu()?;
    Some(Session::start(triangle_module().wat().as_bytes(), gpu, tri_library()).unwrap())
}

fn read_u32(memory: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(memory[at..at + 4].try_into().unwrap())
}

fn key(code: KeyCode, state: ElementState, repeat: bool) -> InputEvent {
    InputEvent::Key { code, state, repeat }
}

#[test]
fn startup_settles_every_resource_and_writes_the_size() {
    let Some(session) = start_triangle() else {
        return;
    };
    let registry = &session.context().registry;
    assert_eq!(registry.pending_count(), 0);
    assert_eq!(registry.buffers().len(), 2);
    assert_eq!(registry.pipelines().len(), 1);
    assert_eq!(registry.bind_groups().len(), 1);

    let regions = session.context().regions;
    assert_eq!(regions.surface_size, Some(0x100));
    assert_eq!(regions.pointer_position, Some(0x108));
    assert_eq!(regions.scratch, Some(65_536));

    let memory = session.module_memory();
    assert_eq!(read_u32(memory, SIZE_REGION), TARGET_SIZE.width);
    assert_eq!(read_u32(memory, SIZE_REGION + 4), TARGET_SIZE.height);
    assert_eq!(session.pending_flags().bits(), 0);
}

#[test]
fn frames_clear_to_opaque_black() {
    let Some(mut session) = start_triangle() else {
        return;
    };
    let start = Instant::now();
    session.tick_at(start + Duration::from_millis(16)).unwrap();
    session.tick_at(start + Duration::from_millis(32)).unwrap();
    assert_eq!(session.frames(), 2);
    assert_eq!(read_u32(session.module_memory(), FRAME_COUNT), 2);
    assert_eq!(read_u32(session.module_memory(), SEEN_FLAGS), 0);

    let pixels = readback_target(&session.context().gpu).unwrap();
    assert_eq!(pixels.len(), (TARGET_SIZE.width * TARGET_SIZE.height * 4) as usize);
    assert!(pixels.chunks_exact(4).all(|pixel| pixel == [0, 0, 0, 255]));
}

#[test]
fn resize_writes_the_size_exactly_once() {
    let Some(mut session) = start_triangle() else {
        return;
    };
    session.resize(PhysicalSize::new(32, 24));
    assert_eq!(session.pending_flags().bits(), 1);

    session.tick().unwrap();
    let memory = session.module_memory();
    assert_eq!(read_u32(memory, SEEN_FLAGS), 1);
    assert_eq!(read_u32(memory, SIZE_REGION), 32);
    assert_eq!(read_u32(memory, SIZE_REGION + 4), 24);
    assert_eq!(session.pending_flags().bits(), 0);

    session.module_memory_mut()[SIZE_REGION..SIZE_REGION + 8].fill(0);
    session.tick().unwrap();
    let memory = session.module_memory();
    assert_eq!(read_u32(memory, SEEN_FLAGS), 0);
    assert_eq!(&memory[SIZE_REGION..SIZE_REGION + 8], &[0; 8]);

    let pixels = readback_target(&session.context().gpu).unwrap();
    assert_eq!(pixels.len(), 32 * 24 * 4);
}

#[test]
fn key_events_reach_the_module_without_repeats() {
    let Some(mut session) = start_triangle() else {
        return;
    };

    let delivery = session
        .handle_input(&key(KeyCode::KeyA, ElementState::Pressed, false))
        .unwrap();
    assert_eq!(delivery, Delivery::Dispatch(65_536));
    let memory = session.module_memory();
    assert_eq!(read_u32(memory, LAST_RECORD), 1);
    assert_eq!(read_u32(memory, LAST_RECORD + 4), u32::from(b'A'));
    assert_eq!(read_u32(memory, LAST_RECORD + 8), 1);

    for _ in 0..3 {
        let delivery = session
            .handle_input(&key(KeyCode::KeyA, ElementState::Pressed, true))
            .unwrap();
        assert_eq!(delivery, Delivery::Suppressed);
    }
    assert_eq!(read_u32(session.module_memory(), EVENT_COUNT), 1);

    session
        .handle_input(&key(KeyCode::ArrowUp, ElementState::Released, false))
        .unwrap();
    let memory = session.module_memory();
    assert_eq!(read_u32(memory, LAST_RECORD), 0);
    assert_eq!(read_u32(memory, LAST_RECORD + 4), 3);
    assert_eq!(read_u32(memory, EVENT_COUNT), 2);
    assert_eq!(session.events_delivered(), 2);
}

#[test]
fn pointer_moves_update_the_linked_region() {
    let Some(mut session) = start_triangle() else {
        return;
    };
    for (x, y) in [(5.0, 6.0), (12.9, 40.2)] {
        let delivery = session.handle_input(&InputEvent::PointerMoved { x, y }).unwrap();
        assert_eq!(delivery, Delivery::Written);
    }
    let memory = session.module_memory();
    assert_eq!(read_u32(memory, POINTER_REGION), 12);
    assert_eq!(read_u32(memory, POINTER_REGION + 4), 40);
    assert_eq!(read_u32(memory, EVENT_COUNT), 0);
}
