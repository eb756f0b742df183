//! Bounds-checked access to the module's linear memory and the regions the
//! bridge shares with it.

use anyhow::{Result as AnyResult, anyhow};
use bytemuck::Pod;
use core::mem::size_of;
use core::ops::Range;
use log::{debug, warn};

fn range(memory_len: usize, ptr: u32, len: usize) -> AnyResult<Range<usize>> {
    let start = ptr as usize;
    start
        .checked_add(len)
        .filter(|end| *end <= memory_len)
        .map(|end| start..end)
        .ok_or_else(|| {
            anyhow!("memory access {ptr:#x}+{len} out of bounds (memory holds {memory_len} bytes)")
        })
}

/// Borrow `len` bytes at `ptr`.
///
/// # Errors
/// Returns an error if the range leaves linear memory.
pub fn read_bytes(memory: &[u8], ptr: u32, len: u32) -> AnyResult<&[u8]> {
    Ok(&memory[range(memory.len(), ptr, len as usize)?])
}

/// Read a UTF-8 string, replacing invalid sequences.
///
/// # Errors
/// Returns an error if the range leaves linear memory.
pub fn read_string(memory: &[u8], ptr: u32, len: u32) -> AnyResult<String> {
    Ok(String::from_utf8_lossy(read_bytes(memory, ptr, len)?).into_owned())
}

/// Read `count` consecutive records of `T`; no alignment is required.
///
/// # Errors
/// Returns an error if the records do not fit in linear memory.
pub fn read_records<T: Pod>(memory: &[u8], ptr: u32, count: u32) -> AnyResult<Vec<T>> {
    let len = (count as usize)
        .checked_mul(size_of::<T>())
        .ok_or_else(|| anyhow!("record count {count} overflows"))?;
    let bytes = &memory[range(memory.len(), ptr, len)?];
    Ok(bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// Copy `data` into linear memory at `ptr`.
///
/// # Errors
/// Returns an error if the range leaves linear memory.
pub fn write_bytes(memory: &mut [u8], ptr: u32, data: &[u8]) -> AnyResult<()> {
    let span = range(memory.len(), ptr, data.len())?;
    memory[span].copy_from_slice(data);
    Ok(())
}

/// Write two little-endian u32 values at `ptr`.
///
/// # Errors
/// Returns an error if the range leaves linear memory.
pub fn write_vec2_u32(memory: &mut [u8], ptr: u32, value: [u32; 2]) -> AnyResult<()> {
    write_bytes(memory, ptr, bytemuck::bytes_of(&value.map(u32::to_le)))
}

/// Region identifiers the module announces through `__link`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSlot {
    SurfaceSize,
    PointerPosition,
}

impl LinkSlot {
    pub const fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::SurfaceSize),
            1 => Some(Self::PointerPosition),
            _ => None,
        }
    }
}

/// Addresses of the regions written by the bridge and read by the module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedRegions {
    pub surface_size: Option<u32>,
    pub pointer_position: Option<u32>,
    /// Base of the host-grown page that receives event records.
    pub scratch: Option<u32>,
}

impl SharedRegions {
    /// Record a region announced by the module. Unknown indices are ignored.
    pub fn link(&mut self, index: u32, address: u32) {
        match LinkSlot::from_index(index) {
            Some(LinkSlot::SurfaceSize) => self.surface_size = Some(address),
            Some(LinkSlot::PointerPosition) => self.pointer_position = Some(address),
            None => {
                warn!(target: "wasm_bridge", "ignoring link of unknown region {index} at {address:#x}");
                return;
            }
        }
        debug!(target: "wasm_bridge", "linked region {index} at {address:#x}");
    }

    /// Write the surface size. Returns `false` if the module never linked the region.
    ///
    /// # Errors
    /// Returns an error if the region lies outside linear memory.
    pub fn write_surface_size(&self, memory: &mut [u8], width: u32, height: u32) -> AnyResult<bool> {
        let Some(ptr) = self.surface_size else {
            return Ok(false);
        };
        write_vec2_u32(memory, ptr, [width, height])?;
        Ok(true)
    }

    /// Write the pointer position. Returns `false` if the module never linked the region.
    ///
    /// # Errors
    /// Returns an error if the region lies outside linear memory.
    pub fn write_pointer(&self, memory: &mut [u8], x: u32, y: u32) -> AnyResult<bool> {
        let Some(ptr) = self.pointer_position else {
            return Ok(false);
        };
        write_vec2_u32(memory, ptr, [x, y])?;
        Ok(true)
    }
}
