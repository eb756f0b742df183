use crate::gpu::{FrameEncoder, GpuContext};
use crate::memory::SharedRegions;
use crate::registry::HandleRegistry;
use crate::shaders::ShaderLibrary;

/// Host state owned by the wasmtime `Store` and reached from every import.
pub struct BridgeContext {
    pub gpu: GpuContext,
    pub registry: HandleRegistry,
    pub shaders: ShaderLibrary,
    pub regions: SharedRegions,
    /// The frame being recorded; `None` outside a tick.
    pub frame: Option<FrameEncoder>,
}

impl BridgeContext {
    pub fn new(gpu: GpuContext, shaders: ShaderLibrary) -> Self {
        Self {
            gpu,
            registry: HandleRegistry::new(),
            shaders,
            regions: SharedRegions::default(),
            frame: None,
        }
    }
}
