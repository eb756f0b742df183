//! Native resource creation for module requests.
//!
//! Buffers and bind groups against resolved pipelines are created on the
//! spot. Pipelines, and bind groups whose pipeline is still pending, are
//! returned as deferred creations for the handle registry.

use crate::error::{with_validation_scope, with_validation_scope_async};
use crate::reflection::{DEFAULT_FRAGMENT_ENTRY, DEFAULT_VERTEX_ENTRY};
use crate::registry::{CreationError, Deferred, defer};
use crate::shaders::ShaderAsset;
use anyhow::{Result as AnyResult, anyhow};
use log::debug;
use std::borrow::Cow;
use std::sync::Arc;
use wgpu::*;

/// A resolved bind-group entry: the binding slot and the buffer bound whole.
#[derive(Debug, Clone)]
pub struct BufferBinding {
    pub binding: u32,
    pub buffer: Arc<Buffer>,
}

/// Create a buffer of `size` bytes with raw wgpu usage bits.
///
/// # Errors
/// Returns an error for unknown usage bits or a rejected descriptor.
pub fn create_buffer(device: &Device, size: u64, usage_bits: u32) -> AnyResult<Arc<Buffer>> {
    let usage = BufferUsages::from_bits(usage_bits)
        .ok_or_else(|| anyhow!("invalid buffer usage flags {usage_bits:#x}"))?;
    let buffer = with_validation_scope(device, "buffer create", || {
        device.create_buffer(&BufferDescriptor {
            label: Some("module-buffer"),
            size,
            usage,
            mapped_at_creation: false,
        })
    })?;
    Ok(Arc::new(buffer))
}

/// Request a render pipeline for `asset`.
///
/// The vertex layout is compiled from the asset's reflection before anything
/// is deferred, so layout errors surface at the call site. The pipeline uses
/// automatic layout, triangle lists, and one color target in `format`.
///
/// # Errors
/// Returns an error if the vertex layout cannot be compiled.
pub fn defer_render_pipeline(
    device: Arc<Device>,
    format: TextureFormat,
    asset: Arc<ShaderAsset>,
) -> AnyResult<Deferred<Arc<RenderPipeline>>> {
    let layout = asset.reflection.vertex_layout()?;
    let attributes = layout.wgpu_attributes()?;
    let vertex_entry = asset
        .reflection
        .vertex_entry()
        .map_or(DEFAULT_VERTEX_ENTRY, |entry| entry.name.as_str())
        .to_owned();
    let fragment_entry = asset
        .reflection
        .fragment_entry()
        .map_or(DEFAULT_FRAGMENT_ENTRY, |entry| entry.name.as_str())
        .to_owned();

    Ok(defer(async move {
        let label = format!("pipeline:{}", asset.name);
        let pipeline = with_validation_scope_async(&device, &label, || {
            let module = device.create_shader_module(ShaderModuleDescriptor {
                label: Some(&label),
                source: ShaderSource::Wgsl(Cow::Borrowed(&asset.source)),
            });
            let buffers = if layout.is_empty() {
                Vec::new()
            } else {
                vec![VertexBufferLayout {
                    array_stride: layout.stride,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &attributes,
                }]
            };
            device.create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(&label),
                layout: None,
                vertex: VertexState {
                    module: &module,
                    entry_point: Some(&vertex_entry),
                    compilation_options: PipelineCompilationOptions::default(),
                    buffers: &buffers,
                },
                primitive: PrimitiveState {
                    topology: PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: MultisampleState::default(),
                fragment: Some(FragmentState {
                    module: &module,
                    entry_point: Some(&fragment_entry),
                    compilation_options: PipelineCompilationOptions::default(),
                    targets: &[Some(ColorTargetState {
                        format,
                        blend: None,
                        write_mask: ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })
        .await
        .map_err(Arc::new)?;
        debug!(target: "wasm_bridge", "{label} created");
        Ok::<_, CreationError>(Arc::new(pipeline))
    }))
}

fn build_bind_group(
    device: &Device,
    pipeline: &RenderPipeline,
    set: u32,
    entries: &[BufferBinding],
) -> BindGroup {
    let layout = pipeline.get_bind_group_layout(set);
    let entries: Vec<BindGroupEntry<'_>> = entries
        .iter()
        .map(|entry| BindGroupEntry {
            binding: entry.binding,
            resource: entry.buffer.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("module-bind-group"),
        layout: &layout,
        entries: &entries,
    })
}

/// Create a bind group against a resolved pipeline's layout for `set`.
///
/// # Errors
/// Returns an error if wgpu rejects the bind group.
pub fn create_bind_group(
    device: &Device,
    pipeline: &RenderPipeline,
    set: u32,
    entries: &[BufferBinding],
) -> AnyResult<Arc<BindGroup>> {
    let group = with_validation_scope(device, "bind group create", || {
        build_bind_group(device, pipeline, set, entries)
    })?;
    Ok(Arc::new(group))
}

/// Create a bind group once its pending pipeline resolves.
pub fn defer_bind_group(
    device: Arc<Device>,
    pipeline: Deferred<Arc<RenderPipeline>>,
    set: u32,
    entries: Vec<BufferBinding>,
) -> Deferred<Arc<BindGroup>> {
    defer(async move {
        let pipeline = pipeline.await?;
        with_validation_scope_async(&device, "bind group create", || {
            build_bind_group(&device, &pipeline, set, &entries)
        })
        .await
        .map(Arc::new)
        .map_err(Arc::new)
    })
}
