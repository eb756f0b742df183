use super::context::{FrameTarget, GpuContext};
use crate::error::submit_with_validation;
use anyhow::Result as AnyResult;
use log::debug;
use wgpu::{
    Color, CommandEncoder, CommandEncoderDescriptor, LoadOp, Operations, RenderPass,
    RenderPassColorAttachment, RenderPassDescriptor, StoreOp,
};

/// Command encoder and render pass open for the duration of one frame.
///
/// The pass is detached from the encoder's borrow so it can live in the
/// bridge context while the module issues bind and draw calls.
pub struct FrameEncoder {
    pass: Option<RenderPass<'static>>,
    encoder: CommandEncoder,
    target: FrameTarget,
    index: u64,
}

impl FrameEncoder {
    /// Open an encoder and a render pass clearing the frame to opaque black.
    ///
    /// # Errors
    /// Returns an error if the frame target cannot be acquired.
    pub fn begin(gpu: &GpuContext, index: u64) -> AnyResult<Self> {
        let target = gpu.acquire_frame()?;
        let mut encoder = gpu
            .device()
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some(&format!("bridge-frame-{index}")),
            });
        let pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: Some("bridge-main-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        Ok(Self {
            pass: Some(pass),
            encoder,
            target,
            index,
        })
    }

    /// The open render pass.
    pub fn pass(&mut self) -> Option<&mut RenderPass<'static>> {
        self.pass.as_mut()
    }

    /// End the pass, submit the frame, and present it.
    ///
    /// # Errors
    /// Returns an error if validation fails on submit.
    pub fn finish(mut self, gpu: &GpuContext) -> AnyResult<()> {
        drop(self.pass.take());
        submit_with_validation(gpu.device(), gpu.queue(), [self.encoder.finish()])?;
        debug!(target: "wasm_bridge", "frame {} submitted", self.index);
        self.target.present();
        Ok(())
    }
}
