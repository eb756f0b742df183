//! GPU device, queue, and render target management.
//!
//! A context renders either to a window surface or to an offscreen texture of
//! fixed size. Both targets hand out one color view per frame through
//! [`GpuContext::acquire_frame`].

use crate::config::BridgeConfig;
use anyhow::{Context as _, Error as AnyhowError, Result as AnyResult, anyhow};
use log::{debug, error, warn};
use std::sync::Arc;
use wgpu::*;
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// Format of the headless target.
pub const OFFSCREEN_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Where frames are rendered.
enum RenderTarget {
    Surface {
        surface: Surface<'static>,
        config: SurfaceConfiguration,
        window: Arc<Window>,
    },
    Offscreen {
        texture: Texture,
    },
}

/// The color attachment for one frame.
pub struct FrameTarget {
    pub view: TextureView,
    surface_texture: Option<SurfaceTexture>,
}

impl FrameTarget {
    /// Present the frame if it came from a surface.
    pub fn present(self) {
        if let Some(texture) = self.surface_texture {
            texture.present();
        }
    }
}

/// GPU context encapsulating the device, queue, and render target.
pub struct GpuContext {
    /// Must outlive the surface.
    _instance: Instance,
    device: Arc<Device>,
    queue: Queue,
    size: PhysicalSize<u32>,
    format: TextureFormat,
    target: RenderTarget,
}

impl GpuContext {
    /// Create a context presenting to `window`.
    ///
    /// The surface uses the adapter's preferred format and premultiplied alpha
    /// when available, otherwise the first alpha mode the surface supports.
    ///
    /// # Errors
    /// Returns an error if no surface, adapter, or device can be created.
    pub async fn new(window: Arc<Window>, config: &BridgeConfig) -> Result<Self, AnyhowError> {
        let instance = Self::create_instance();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create a window surface")?;
        let (adapter, device, queue) =
            Self::initialize_device(&instance, config, Some(&surface)).await?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .first()
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let alpha_mode = if capabilities
            .alpha_modes
            .contains(&CompositeAlphaMode::PreMultiplied)
        {
            CompositeAlphaMode::PreMultiplied
        } else {
            capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(CompositeAlphaMode::Auto)
        };
        let size = clamp_size(window.inner_size());
        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: config.present_mode(),
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &surface_config);
        debug!(target: "wasm_bridge", "surface configured: {format:?} {alpha_mode:?} {}x{}", size.width, size.height);

        Ok(Self {
            _instance: instance,
            device,
            queue,
            size,
            format,
            target: RenderTarget::Surface {
                surface,
                config: surface_config,
                window,
            },
        })
    }

    /// Create a context rendering into an offscreen texture.
    ///
    /// # Errors
    /// Returns an error if no adapter or device is available.
    pub async fn headless(size: PhysicalSize<u32>, config: &BridgeConfig) -> Result<Self, AnyhowError> {
        let instance = Self::create_instance();
        let (_adapter, device, queue) = Self::initialize_device(&instance, config, None).await?;
        let size = clamp_size(size);
        let texture = create_offscreen_texture(&device, size);
        Ok(Self {
            _instance: instance,
            device,
            queue,
            size,
            format: OFFSCREEN_FORMAT,
            target: RenderTarget::Offscreen { texture },
        })
    }

    fn create_instance() -> Instance {
        Instance::new(&InstanceDescriptor {
            backends: Backends::DX12 | Backends::VULKAN | Backends::METAL | Backends::GL,
            flags: InstanceFlags::VALIDATION | InstanceFlags::DEBUG,
            ..Default::default()
        })
    }

    async fn initialize_device(
        instance: &Instance,
        config: &BridgeConfig,
        surface: Option<&Surface<'static>>,
    ) -> Result<(Adapter, Arc<Device>, Queue), AnyhowError> {
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: config.power_preference(),
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| anyhow!("Failed to find a suitable GPU adapter: {err}"))?;
        let device_descriptor = DeviceDescriptor {
            label: Some("wasm-bridge-device"),
            required_features: Features::empty(),
            required_limits: Limits::default(),
            memory_hints: MemoryHints::default(),
            trace: Trace::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| anyhow!("Failed to create GPU device: {err}"))?;
        device.on_uncaptured_error(Box::new(|error| {
            error!(target: "wasm_bridge", "Uncaptured WGPU error: {error}");
        }));
        debug!(target: "wasm_bridge", "using adapter {:?}", adapter.get_info().name);
        Ok((adapter, Arc::new(device), queue))
    }

    pub const fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Current target size in pixels.
    pub const fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Color format every pipeline renders into.
    pub const fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn window(&self) -> Option<&Window> {
        match &self.target {
            RenderTarget::Surface { window, .. } => Some(window),
            RenderTarget::Offscreen { .. } => None,
        }
    }

    /// The headless target texture, if this context renders offscreen.
    pub const fn offscreen_texture(&self) -> Option<&Texture> {
        match &self.target {
            RenderTarget::Offscreen { texture } => Some(texture),
            RenderTarget::Surface { .. } => None,
        }
    }

    /// Resize the render target. Zero dimensions are clamped to 1.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let size = clamp_size(new_size);
        self.size = size;
        match &mut self.target {
            RenderTarget::Surface { surface, config, .. } => {
                config.width = size.width;
                config.height = size.height;
                surface.configure(&self.device, config);
            }
            RenderTarget::Offscreen { texture } => {
                *texture = create_offscreen_texture(&self.device, size);
            }
        }
    }

    /// Acquire the color target for the next frame.
    ///
    /// An outdated or lost surface is reconfigured and reported as an error;
    /// the next call acquires from the fresh configuration.
    ///
    /// # Errors
    /// Returns an error if the surface texture cannot be acquired.
    pub fn acquire_frame(&self) -> AnyResult<FrameTarget> {
        match &self.target {
            RenderTarget::Surface { surface, config, .. } => {
                match surface.get_current_texture() {
                    Ok(frame) => {
                        let view = frame.texture.create_view(&TextureViewDescriptor::default());
                        Ok(FrameTarget {
                            view,
                            surface_texture: Some(frame),
                        })
                    }
                    Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                        warn!(target: "wasm_bridge", "surface {err}; reconfiguring");
                        surface.configure(&self.device, config);
                        Err(anyhow!("surface texture unavailable: {err}"))
                    }
                    Err(err) => Err(anyhow!("failed to acquire surface texture: {err}")),
                }
            }
            RenderTarget::Offscreen { texture } => Ok(FrameTarget {
                view: texture.create_view(&TextureViewDescriptor::default()),
                surface_texture: None,
            }),
        }
    }
}

fn clamp_size(size: PhysicalSize<u32>) -> PhysicalSize<u32> {
    PhysicalSize::new(size.width.max(1), size.height.max(1))
}

fn create_offscreen_texture(device: &Device, size: PhysicalSize<u32>) -> Texture {
    device.create_texture(&TextureDescriptor {
        label: Some("bridge-offscreen-target"),
        size: Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
