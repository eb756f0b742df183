//! Frame state shared with the module: the flag word and elapsed time.

use crate::memory::SharedRegions;
use anyhow::Result as AnyResult;
use std::time::Instant;
use winit::dpi::PhysicalSize;

/// Bitmask passed to the frame entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u32);

impl FrameFlags {
    /// The surface was resized since the last frame.
    pub const RESIZED: Self = Self(1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Return the current flags and clear them.
    pub const fn take(&mut self) -> Self {
        let flags = *self;
        self.0 = 0;
        flags
    }
}

/// Measures seconds between successive ticks.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub const fn new(start: Instant) -> Self {
        Self { last: start }
    }

    /// Seconds since the previous call (or since `start`).
    pub fn advance(&mut self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        elapsed.as_secs_f32()
    }
}

/// Write the surface size into module memory if a resize is pending.
///
/// Returns whether a write happened.
///
/// # Errors
/// Returns an error if the size region lies outside linear memory.
pub fn sync_surface_size(
    flags: FrameFlags,
    regions: &SharedRegions,
    memory: &mut [u8],
    size: PhysicalSize<u32>,
) -> AnyResult<bool> {
    if !flags.contains(FrameFlags::RESIZED) {
        return Ok(false);
    }
    regions.write_surface_size(memory, size.width, size.height)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn take_clears_flags() {
        let mut flags = FrameFlags::empty();
        flags.insert(FrameFlags::RESIZED);
        flags.insert(FrameFlags::RESIZED);
        assert_eq!(flags.take().bits(), 1);
        assert_eq!(flags, FrameFlags::empty());
        assert!(!flags.contains(FrameFlags::RESIZED));
    }

    #[test]
    fn clock_reports_seconds_between_ticks() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let dt = clock.advance(start + Duration::from_millis(250));
        assert!((dt - 0.25).abs() < 1e-6);
        let dt = clock.advance(start + Duration::from_millis(250));
        assert!(dt.abs() < f32::EPSILON);
    }

    #[test]
    fn resize_flag_gates_the_size_write() {
        let mut memory = vec![0_u8; 16];
        let regions = SharedRegions {
            surface_size: Some(0),
            ..SharedRegions::default()
        };
        let size = PhysicalSize::new(800, 600);

        assert!(!sync_surface_size(FrameFlags::empty(), &regions, &mut memory, size).unwrap());
        assert_eq!(&memory[..8], &[0; 8]);

        assert!(sync_surface_size(FrameFlags::RESIZED, &regions, &mut memory, size).unwrap());
        assert_eq!(&memory[..4], &800_u32.to_le_bytes());
        assert_eq!(&memory[4..8], &600_u32.to_le_bytes());
    }
}
