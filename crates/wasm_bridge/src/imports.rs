//! Host functions the module imports from `env`.
//!
//! Every import is synchronous from the module's side. Contract violations
//! (bad handles, out-of-bounds memory, draws outside a pass, unknown resource
//! types) are logged and returned as errors, which wasmtime turns into a trap.
//! All validation runs before anything is pushed into the registry.

use crate::context::BridgeContext;
use crate::error::with_validation_scope;
use crate::gpu::{
    BufferBinding, FrameEncoder, create_bind_group, create_buffer, defer_bind_group,
    defer_render_pipeline,
};
use crate::memory::{read_bytes, read_records, read_string, write_bytes};
use crate::registry::{HandleRegistry, Slot};
use anyhow::{Result as AnyResult, anyhow};
use bytemuck::{Pod, Zeroable};
use core::ops::Range;
use log::{debug, error, info, warn};
use rand::RngCore as _;
use rand::rngs::OsRng;
use std::sync::Arc;
use wasmtime::{Caller, Extern, Linker, Memory};
use wgpu::{IndexFormat, RenderPass};

/// Import namespace.
pub const MODULE: &str = "env";

/// One bind-group entry as laid out in module memory: three little-endian u32.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RawBindEntry {
    pub binding: u32,
    pub resource_index: u32,
    pub resource_type: u32,
}

/// Resource type codes in [`RawBindEntry::resource_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindResourceKind {
    Buffer,
    TextureView,
    Sampler,
}

impl TryFrom<u32> for BindResourceKind {
    type Error = anyhow::Error;

    fn try_from(code: u32) -> AnyResult<Self> {
        match code {
            1 => Ok(Self::Buffer),
            2 => Ok(Self::TextureView),
            3 => Ok(Self::Sampler),
            other => Err(anyhow!("unknown bind group resource type {other}")),
        }
    }
}

/// Resolve raw bind-group records into buffer bindings.
///
/// Texture views and samplers are recognized but not wired; they are reported
/// and left out of the bind group.
///
/// # Errors
/// Returns an error for an unknown resource type or buffer handle.
pub fn decode_bind_entries(
    registry: &mut HandleRegistry,
    records: &[RawBindEntry],
) -> AnyResult<Vec<BufferBinding>> {
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let binding = u32::from_le(record.binding);
        let index = u32::from_le(record.resource_index);
        match BindResourceKind::try_from(u32::from_le(record.resource_type))? {
            BindResourceKind::Buffer => {
                let buffer = Arc::clone(registry.buffers_mut().resolved(index)?);
                entries.push(BufferBinding { binding, buffer });
            }
            kind @ (BindResourceKind::TextureView | BindResourceKind::Sampler) => {
                warn!(target: "wasm_bridge", "binding {binding}: {kind:?} resources are not supported, skipping");
            }
        }
    }
    Ok(entries)
}

fn report<T>(name: &str, result: AnyResult<T>) -> AnyResult<T> {
    if let Err(err) = &result {
        error!(target: "wasm_bridge", "{name} failed: {err:#}");
    }
    result
}

fn memory(caller: &mut Caller<'_, BridgeContext>) -> AnyResult<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("module does not export its memory"))
}

/// The frame's render pass; bind and draw commands outside a tick are errors.
fn open_pass(frame: &mut Option<FrameEncoder>) -> AnyResult<&mut RenderPass<'static>> {
    frame
        .as_mut()
        .and_then(FrameEncoder::pass)
        .ok_or_else(|| anyhow!("no render pass is open"))
}

/// Run `f` against the open render pass.
fn with_pass<T, F>(caller: &mut Caller<'_, BridgeContext>, f: F) -> AnyResult<T>
where
    F: FnOnce(&mut RenderPass<'static>, &mut HandleRegistry) -> AnyResult<T>,
{
    let ctx = caller.data_mut();
    let pass = open_pass(&mut ctx.frame)?;
    f(pass, &mut ctx.registry)
}

fn span(first: u32, count: u32) -> AnyResult<Range<u32>> {
    first
        .checked_add(count)
        .map(|end| first..end)
        .ok_or_else(|| anyhow!("draw range {first}+{count} overflows"))
}

fn fill_random(mut caller: Caller<'_, BridgeContext>, ptr: u32, words: u32) -> AnyResult<()> {
    let memory = memory(&mut caller)?;
    let len = words
        .checked_mul(4)
        .ok_or_else(|| anyhow!("random fill of {words} words overflows"))?;
    let mut bytes = vec![0_u8; len as usize];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| anyhow!("secure random source failed: {err}"))?;
    write_bytes(memory.data_mut(&mut caller), ptr, &bytes)
}

fn buffer_create(mut caller: Caller<'_, BridgeContext>, size: u32, usage: u32) -> AnyResult<u32> {
    let ctx = caller.data_mut();
    let buffer = create_buffer(ctx.gpu.device(), u64::from(size), usage)?;
    let handle = ctx.registry.buffers_mut().push(buffer);
    debug!(target: "wasm_bridge", "buffer {handle}: {size} bytes, usage {usage:#x}");
    Ok(handle)
}

fn buffer_write_raw(
    mut caller: Caller<'_, BridgeContext>,
    buffer: u32,
    ptr: u32,
    len: u32,
    offset: u32,
) -> AnyResult<()> {
    let memory = memory(&mut caller)?;
    let (data, ctx) = memory.data_and_store_mut(&mut caller);
    let bytes = read_bytes(data, ptr, len)?;
    let target = ctx.registry.buffers_mut().resolved(buffer)?;
    let gpu = &ctx.gpu;
    with_validation_scope(gpu.device(), "buffer write", || {
        gpu.queue().write_buffer(target, u64::from(offset), bytes);
    })
}

fn pipeline_create(mut caller: Caller<'_, BridgeContext>, ptr: u32, len: u32) -> AnyResult<u32> {
    let memory = memory(&mut caller)?;
    let (data, ctx) = memory.data_and_store_mut(&mut caller);
    let name = read_string(data, ptr, len)?;
    let asset = ctx.shaders.get(&name)?;
    let deferred = defer_render_pipeline(Arc::clone(ctx.gpu.device()), ctx.gpu.format(), asset)?;
    let handle = ctx.registry.pipelines_mut().push_deferred(deferred);
    debug!(target: "wasm_bridge", "pipeline {handle} requested for shader `{name}`");
    Ok(handle)
}

fn bind_group_create(
    mut caller: Caller<'_, BridgeContext>,
    pipeline: u32,
    set: u32,
    ptr: u32,
    count: u32,
) -> AnyResult<u32> {
    let memory = memory(&mut caller)?;
    let (data, ctx) = memory.data_and_store_mut(&mut caller);
    let records: Vec<RawBindEntry> = read_records(data, ptr, count)?;
    let entries = decode_bind_entries(&mut ctx.registry, &records)?;
    let device = Arc::clone(ctx.gpu.device());
    let group = match ctx.registry.pipelines_mut().settled(pipeline)? {
        Slot::Resolved(pipeline) => Slot::Resolved(create_bind_group(&device, pipeline, set, &entries)?),
        Slot::Pending(deferred) => Slot::Pending(defer_bind_group(device, deferred.clone(), set, entries)),
    };
    let pending = group.is_pending();
    let handle = ctx.registry.bind_groups_mut().push_slot(group);
    debug!(target: "wasm_bridge", "bind group {handle} for pipeline {pipeline} set {set} (pending: {pending})");
    Ok(handle)
}

fn bind_pipeline(mut caller: Caller<'_, BridgeContext>, pipeline: u32) -> AnyResult<()> {
    with_pass(&mut caller, |pass, registry| {
        let pipeline = registry.pipelines_mut().resolved(pipeline)?;
        pass.set_pipeline(pipeline);
        Ok(())
    })
}

fn bind_bind_group(mut caller: Caller<'_, BridgeContext>, index: u32, group: u32) -> AnyResult<()> {
    with_pass(&mut caller, |pass, registry| {
        let group = registry.bind_groups_mut().resolved(group)?;
        pass.set_bind_group(index, group.as_ref(), &[]);
        Ok(())
    })
}

fn bind_vertex_buffer(mut caller: Caller<'_, BridgeContext>, buffer: u32) -> AnyResult<()> {
    with_pass(&mut caller, |pass, registry| {
        let buffer = registry.buffers_mut().resolved(buffer)?;
        pass.set_vertex_buffer(0, buffer.slice(..));
        Ok(())
    })
}

fn bind_index_buffer(mut caller: Caller<'_, BridgeContext>, buffer: u32) -> AnyResult<()> {
    with_pass(&mut caller, |pass, registry| {
        let buffer = registry.buffers_mut().resolved(buffer)?;
        pass.set_index_buffer(buffer.slice(..), IndexFormat::Uint32);
        Ok(())
    })
}

fn draw(
    mut caller: Caller<'_, BridgeContext>,
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
) -> AnyResult<()> {
    let vertices = span(first_vertex, vertex_count)?;
    let instances = span(first_instance, instance_count)?;
    with_pass(&mut caller, |pass, _| {
        pass.draw(vertices, instances);
        Ok(())
    })
}

fn draw_indexed(
    mut caller: Caller<'_, BridgeContext>,
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    base_vertex: i32,
    first_instance: u32,
) -> AnyResult<()> {
    let indices = span(first_index, index_count)?;
    let instances = span(first_instance, instance_count)?;
    with_pass(&mut caller, |pass, _| {
        pass.draw_indexed(indices, base_vertex, instances);
        Ok(())
    })
}

fn module_log(mut caller: Caller<'_, BridgeContext>, ptr: u32, len: u32) -> AnyResult<()> {
    let memory = memory(&mut caller)?;
    let message = read_string(memory.data(&caller), ptr, len)?;
    info!(target: "module", "{message}");
    Ok(())
}

/// Register a fallible import, logging its error before the trap.
macro_rules! bridge_import {
    ($linker:expr, $name:literal, $func:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        $linker.func_wrap(
            MODULE,
            $name,
            |caller: Caller<'_, BridgeContext>, $($arg: $ty),*| -> AnyResult<$ret> {
                report($name, $func(caller, $($arg),*))
            },
        )?
    };
}

/// Define every host import on `linker`.
///
/// # Errors
/// Returns an error if a definition clashes with an existing one.
pub fn link_imports(linker: &mut Linker<BridgeContext>) -> AnyResult<()> {
    linker.func_wrap(MODULE, "__link", |mut caller: Caller<'_, BridgeContext>, index: u32, address: u32| {
        caller.data_mut().regions.link(index, address);
    })?;
    bridge_import!(linker, "__rand", fill_random(ptr: u32, words: u32) -> ());
    bridge_import!(linker, "wgpu_buffer_create", buffer_create(size: u32, usage: u32) -> u32);
    bridge_import!(
        linker,
        "wgpu_buffer_write_raw",
        buffer_write_raw(buffer: u32, ptr: u32, len: u32, offset: u32) -> ()
    );
    bridge_import!(linker, "wgpu_pipeline_create", pipeline_create(ptr: u32, len: u32) -> u32);
    bridge_import!(
        linker,
        "wgpu_bind_group_create",
        bind_group_create(pipeline: u32, set: u32, ptr: u32, count: u32) -> u32
    );
    bridge_import!(linker, "wgpu_bind_pipeline", bind_pipeline(pipeline: u32) -> ());
    bridge_import!(linker, "wgpu_bind_bind_group", bind_bind_group(index: u32, group: u32) -> ());
    bridge_import!(linker, "wgpu_bind_vertex_buffer", bind_vertex_buffer(buffer: u32) -> ());
    bridge_import!(linker, "wgpu_bind_index_buffer", bind_index_buffer(buffer: u32) -> ());
    bridge_import!(
        linker,
        "wgpu_draw",
        draw(vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> ()
    );
    bridge_import!(
        linker,
        "wgpu_draw_indexed",
        draw_indexed(
            index_count: u32,
            instance_count: u32,
            first_index: u32,
            base_vertex: i32,
            first_instance: u32
        ) -> ()
    );
    bridge_import!(linker, "log", module_log(ptr: u32, len: u32) -> ());

    linker.func_wrap(MODULE, "cosf", |x: f32| x.cos())?;
    linker.func_wrap(MODULE, "sinf", |x: f32| x.sin())?;
    // Debug hooks are accepted and ignored.
    linker.func_wrap(MODULE, "debug1", |_: u32, _: u32, _: f32, _: i32| {})?;
    linker.func_wrap(MODULE, "debug2", |_: u32, _: u32, _: f32, _: f32, _: i32| {})?;
    linker.func_wrap(MODULE, "debug3", |_: u32, _: u32, _: f32, _: f32, _: f32, _: i32| {})?;
    linker.func_wrap(MODULE, "debug4", |_: u32, _: u32, _: f32, _: f32, _: f32, _: f32, _: i32| {})?;
    Ok(())
}
