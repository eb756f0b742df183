//! Module lifecycle: startup sequence, per-frame ticks, input delivery.

use crate::barrier;
use crate::context::BridgeContext;
use crate::events::{self, Delivery, InputEvent};
use crate::frame::{FrameClock, FrameFlags, sync_surface_size};
use crate::gpu::{FrameEncoder, GpuContext};
use crate::imports::link_imports;
use crate::shaders::ShaderLibrary;
use anyhow::{Context as _, Result as AnyResult, anyhow};
use log::{debug, info};
use std::time::Instant;
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};
use winit::dpi::PhysicalSize;

/// Size of one wasm page in bytes.
pub const WASM_PAGE_SIZE: u64 = 65_536;

/// Frames between statistics log lines.
const STATS_INTERVAL: u64 = 600;

/// Entry points the module must export.
struct ModuleExports {
    memory: Memory,
    setup: TypedFunc<(), ()>,
    init: TypedFunc<(), ()>,
    frame: TypedFunc<(f32, u32), ()>,
    handle_event: TypedFunc<u32, ()>,
}

impl ModuleExports {
    fn resolve(instance: &Instance, store: &mut Store<BridgeContext>) -> AnyResult<Self> {
        let memory = instance
            .get_memory(&mut *store, "memory")
            .ok_or_else(|| anyhow!("module does not export `memory`"))?;
        Ok(Self {
            memory,
            setup: instance
                .get_typed_func(&mut *store, "__engine_setup")
                .context("missing export `__engine_setup`")?,
            init: instance
                .get_typed_func(&mut *store, "game_init")
                .context("missing export `game_init`")?,
            frame: instance
                .get_typed_func(&mut *store, "game_loop")
                .context("missing export `game_loop`")?,
            handle_event: instance
                .get_typed_func(&mut *store, "game_handle_event")
                .context("missing export `game_handle_event`")?,
        })
    }
}

/// A running module bound to one GPU context.
pub struct Session {
    store: Store<BridgeContext>,
    exports: ModuleExports,
    clock: FrameClock,
    flags: FrameFlags,
    frames: u64,
    events_delivered: u64,
}

impl Session {
    /// Instantiate `wasm` and run it up to its first frame.
    ///
    /// Startup order: instantiate, reserve the event scratch page, run
    /// `__engine_setup`, write the surface size, run `game_init`, settle every
    /// deferred creation, clear frame flags.
    ///
    /// # Errors
    /// Returns an error if the module fails to compile or instantiate, lacks an
    /// export, traps during startup, or a deferred creation fails.
    pub fn start(wasm: &[u8], gpu: GpuContext, shaders: ShaderLibrary) -> AnyResult<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm).context("failed to compile module")?;
        let mut linker = Linker::new(&engine);
        link_imports(&mut linker)?;
        let mut store = Store::new(&engine, BridgeContext::new(gpu, shaders));
        let instance = linker
            .instantiate(&mut store, &module)
            .context("failed to instantiate module")?;
        let exports = ModuleExports::resolve(&instance, &mut store)?;

        let pages = exports
            .memory
            .grow(&mut store, 1)
            .context("failed to reserve the event scratch page")?;
        let scratch = u32::try_from(pages * WASM_PAGE_SIZE)
            .context("event scratch page lies beyond 32-bit memory")?;
        store.data_mut().regions.scratch = Some(scratch);
        debug!(target: "wasm_bridge", "event scratch page at {scratch:#x}");

        exports
            .setup
            .call(&mut store, ())
            .context("`__engine_setup` failed")?;
        let (data, ctx) = exports.memory.data_and_store_mut(&mut store);
        let size = ctx.gpu.size();
        ctx.regions.write_surface_size(data, size.width, size.height)?;
        exports.init.call(&mut store, ()).context("`game_init` failed")?;

        barrier::resolve_all(&mut store.data_mut().registry)?;
        info!(target: "wasm_bridge", "module started ({} pipelines, {} buffers)",
            store.data().registry.pipelines().len(),
            store.data().registry.buffers().len());

        Ok(Self {
            store,
            exports,
            clock: FrameClock::new(Instant::now()),
            flags: FrameFlags::empty(),
            frames: 0,
            events_delivered: 0,
        })
    }

    /// Run one frame timed against the wall clock.
    ///
    /// # Errors
    /// See [`Session::tick_at`].
    pub fn tick(&mut self) -> AnyResult<()> {
        self.tick_at(Instant::now())
    }

    /// Run one frame with `now` as the current time.
    ///
    /// Opens the frame's pass, writes the surface size if a resize is pending,
    /// calls `game_loop(dt, flags)`, then submits and presents. Flags are
    /// cleared once the module has seen them, even if it trapped.
    ///
    /// # Errors
    /// Returns an error if the frame target is unavailable, the module traps,
    /// or submission fails validation.
    pub fn tick_at(&mut self, now: Instant) -> AnyResult<()> {
        let frame = FrameEncoder::begin(&self.store.data().gpu, self.frames + 1)?;
        let dt = self.clock.advance(now);
        let flags = self.flags;

        let (data, ctx) = self.exports.memory.data_and_store_mut(&mut self.store);
        if sync_surface_size(flags, &ctx.regions, data, ctx.gpu.size())? {
            debug!(target: "wasm_bridge", "surface size written: {:?}", ctx.gpu.size());
        }
        ctx.frame = Some(frame);

        let result = self
            .exports
            .frame
            .call(&mut self.store, (dt, flags.bits()));
        let frame = self.store.data_mut().frame.take();
        self.flags.take();
        result.context("`game_loop` failed")?;

        if let Some(frame) = frame {
            frame.finish(&self.store.data().gpu)?;
        }
        self.frames += 1;
        if self.frames % STATS_INTERVAL == 0 {
            debug!(target: "wasm_bridge", "{} frames, {} events delivered", self.frames, self.events_delivered);
        }
        Ok(())
    }

    /// Resize the render target and flag the resize for the next frame.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.store.data_mut().gpu.resize(size);
        self.flags.insert(FrameFlags::RESIZED);
    }

    /// Deliver an input event to the module.
    ///
    /// # Errors
    /// Returns an error if the event cannot be written or the module traps.
    pub fn handle_input(&mut self, event: &InputEvent) -> AnyResult<Delivery> {
        let (data, ctx) = self.exports.memory.data_and_store_mut(&mut self.store);
        let delivery = events::encode(event, &ctx.regions, data)?;
        if let Delivery::Dispatch(record) = delivery {
            self.exports
                .handle_event
                .call(&mut self.store, record)
                .context("`game_handle_event` failed")?;
            self.events_delivered += 1;
        }
        Ok(delivery)
    }

    pub fn context(&self) -> &BridgeContext {
        self.store.data()
    }

    /// The module's linear memory.
    pub fn module_memory(&self) -> &[u8] {
        self.exports.memory.data(&self.store)
    }

    pub fn module_memory_mut(&mut self) -> &mut [u8] {
        self.exports.memory.data_mut(&mut self.store)
    }

    /// Flags the next frame will see.
    pub const fn pending_flags(&self) -> FrameFlags {
        self.flags
    }

    /// Frames completed so far.
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Key events dispatched to the module so far.
    pub const fn events_delivered(&self) -> u64 {
        self.events_delivered
    }
}
