//! Input events delivered into module memory.

use crate::memory::{SharedRegions, write_bytes};
use anyhow::{Result as AnyResult, anyhow};
use bytemuck::{Pod, Zeroable};
use winit::event::ElementState;
use winit::keyboard::KeyCode;

/// Record kind for keyboard events.
pub const KIND_KEY: u32 = 1;

/// A decoded host input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerMoved { x: f64, y: f64 },
    Key {
        code: KeyCode,
        state: ElementState,
        repeat: bool,
    },
}

/// The record written to the scratch region for key events.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct KeyRecord {
    pub state: u32,
    pub code: u32,
    pub kind: u32,
}

impl KeyRecord {
    pub fn new(code: KeyCode, state: ElementState) -> Self {
        Self {
            state: u32::from(state.is_pressed()),
            code: key_code(code),
            kind: KIND_KEY,
        }
    }

    fn to_le_bytes(self) -> [u8; 12] {
        bytemuck::cast([self.state.to_le(), self.code.to_le(), self.kind.to_le()])
    }
}

/// Map a physical key to the code the module sees.
///
/// Letters map to their uppercase ASCII code; arrows and space to 1..=5;
/// every other key to 0.
pub const fn key_code(code: KeyCode) -> u32 {
    match code {
        KeyCode::ArrowLeft => 1,
        KeyCode::ArrowRight => 2,
        KeyCode::ArrowUp => 3,
        KeyCode::ArrowDown => 4,
        KeyCode::Space => 5,
        KeyCode::KeyA => b'A' as u32,
        KeyCode::KeyB => b'B' as u32,
        KeyCode::KeyC => b'C' as u32,
        KeyCode::KeyD => b'D' as u32,
        KeyCode::KeyE => b'E' as u32,
        KeyCode::KeyF => b'F' as u32,
        KeyCode::KeyG => b'G' as u32,
        KeyCode::KeyH => b'H' as u32,
        KeyCode::KeyI => b'I' as u32,
        KeyCode::KeyJ => b'J' as u32,
        KeyCode::KeyK => b'K' as u32,
        KeyCode::KeyL => b'L' as u32,
        KeyCode::KeyM => b'M' as u32,
        KeyCode::KeyN => b'N' as u32,
        KeyCode::KeyO => b'O' as u32,
        KeyCode::KeyP => b'P' as u32,
        KeyCode::KeyQ => b'Q' as u32,
        KeyCode::KeyR => b'R' as u32,
        KeyCode::KeyS => b'S' as u32,
        KeyCode::KeyT => b'T' as u32,
        KeyCode::KeyU => b'U' as u32,
        KeyCode::KeyV => b'V' as u32,
        KeyCode::KeyW => b'W' as u32,
        KeyCode::KeyX => b'X' as u32,
        KeyCode::KeyY => b'Y' as u32,
        KeyCode::KeyZ => b'Z' as u32,
        _ => 0,
    }
}

/// What the caller must do after an event was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Memory was updated; the module reads it on its own schedule.
    Written,
    /// The event was dropped.
    Suppressed,
    /// A record sits at this address; call the event entry point with it.
    Dispatch(u32),
}

/// Encode `event` into module memory.
///
/// Pointer moves overwrite the pointer region (coordinates truncated to whole
/// pixels). Key events write a [`KeyRecord`] to the scratch region, except
/// auto-repeated key-downs, which are suppressed.
///
/// # Errors
/// Returns an error if a key event arrives before the scratch region exists,
/// or a write leaves linear memory.
pub fn encode(event: &InputEvent, regions: &SharedRegions, memory: &mut [u8]) -> AnyResult<Delivery> {
    match *event {
        InputEvent::PointerMoved { x, y } => {
            let written = regions.write_pointer(memory, x.max(0.0) as u32, y.max(0.0) as u32)?;
            Ok(if written {
                Delivery::Written
            } else {
                Delivery::Suppressed
            })
        }
        InputEvent::Key { state, repeat, .. } if repeat && state.is_pressed() => Ok(Delivery::Suppressed),
        InputEvent::Key { code, state, .. } => {
            let scratch = regions
                .scratch
                .ok_or_else(|| anyhow!("key event before the scratch region was reserved"))?;
            write_bytes(memory, scratch, &KeyRecord::new(code, state).to_le_bytes())?;
            Ok(Delivery::Dispatch(scratch))
        }
    }
}
