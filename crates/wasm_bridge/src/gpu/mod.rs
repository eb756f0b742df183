//! wgpu side of the bridge: device and target, per-frame pass, resource creation.

pub mod context;
pub mod frame;
pub mod pipelines;
pub mod readback;

pub use context::{FrameTarget, GpuContext, OFFSCREEN_FORMAT};
pub use frame::FrameEncoder;
pub use pipelines::{BufferBinding, create_bind_group, create_buffer, defer_bind_group, defer_render_pipeline};
pub use readback::{readback_buffer, readback_target};
