//! Copying GPU buffers and the headless target back to the CPU.

use super::context::GpuContext;
use anyhow::{Result as AnyhowResult, anyhow};
use std::sync::mpsc::channel;
use wgpu::*;

/// Map a `MAP_READ` buffer after `encoder`'s copy and return its bytes.
fn submit_and_map(gpu: &GpuContext, encoder: CommandEncoder, staging: &Buffer) -> AnyhowResult<Vec<u8>> {
    gpu.queue().submit([encoder.finish()]);
    let slice = staging.slice(..);
    let (sender, receiver) = channel();
    slice.map_async(MapMode::Read, move |res| {
        drop(sender.send(res));
    });
    loop {
        drop(gpu.device().poll(PollType::Wait));
        if let Ok(res) = receiver.try_recv() {
            res?;
            break;
        }
    }
    let data = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(data)
}

/// Read the full contents of `buffer`, which must have `COPY_SRC` usage.
///
/// # Errors
/// Returns an error if the buffer cannot be copied or mapped.
pub fn readback_buffer(gpu: &GpuContext, buffer: &Buffer) -> AnyhowResult<Vec<u8>> {
    if !buffer.usage().contains(BufferUsages::COPY_SRC) {
        return Err(anyhow!("buffer lacks COPY_SRC usage, cannot read it back"));
    }
    let size = buffer.size();
    let staging = gpu.device().create_buffer(&BufferDescriptor {
        label: Some("buffer-readback"),
        size,
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = gpu
        .device()
        .create_command_encoder(&CommandEncoderDescriptor {
            label: Some("buffer-readback"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    submit_and_map(gpu, encoder, &staging)
}

/// Read the headless target as tightly packed RGBA8 rows.
///
/// # Errors
/// Returns an error if the context presents to a window, or mapping fails.
pub fn readback_target(gpu: &GpuContext) -> AnyhowResult<Vec<u8>> {
    let texture = gpu
        .offscreen_texture()
        .ok_or_else(|| anyhow!("only headless targets can be read back"))?;
    let size = gpu.size();
    let (width, height) = (size.width, size.height);
    let bytes_per_pixel: u32 = 4;
    let row_bytes: u32 = width * bytes_per_pixel;
    let align: u32 = COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bpr: u32 = row_bytes.div_ceil(align) * align;
    let staging = gpu.device().create_buffer(&BufferDescriptor {
        label: Some("target-readback"),
        size: u64::from(padded_bpr) * u64::from(height),
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = gpu
        .device()
        .create_command_encoder(&CommandEncoderDescriptor {
            label: Some("target-readback"),
        });
    encoder.copy_texture_to_buffer(
        TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        TexelCopyBufferInfo {
            buffer: &staging,
            layout: TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(height),
            },
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    let padded = submit_and_map(gpu, encoder, &staging)?;
    let mut data = Vec::with_capacity((row_bytes as usize) * (height as usize));
    for row in padded.chunks_exact(padded_bpr as usize) {
        data.extend_from_slice(&row[..row_bytes as usize]);
    }
    Ok(data)
}
