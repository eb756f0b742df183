use crate::state::PlayerState;
use anyhow::{Context as _, Error, anyhow};
use log::{error, info, warn};
use pollster::block_on;
use std::env;
use std::fs;
use std::sync::Arc;
use wasm_bridge::{BridgeConfig, GpuContext, InputEvent, Session, ShaderLibrary};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

mod state;

pub fn main() -> Result<(), Error> {
    env_logger::init();

    let config = BridgeConfig::from_env().with_args(env::args().skip(1));
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App {
        config,
        state: None,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}

struct App {
    config: BridgeConfig,
    state: Option<PlayerState>,
}

impl App {
    fn resume(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Error> {
        if self.state.is_some() {
            return Ok(());
        }
        let module_path = self
            .config
            .module_path
            .clone()
            .ok_or_else(|| anyhow!("no module given; pass a .wasm path or set BRIDGE_MODULE"))?;

        let attributes = Window::default_attributes()
            .with_title("wasm bridge player")
            .with_inner_size(self.config.size());
        let window = Arc::new(event_loop.create_window(attributes)?);

        let gpu = block_on(GpuContext::new(window, &self.config))?;
        let wasm = fs::read(&module_path)
            .with_context(|| format!("reading module {}", module_path.display()))?;
        let shaders = ShaderLibrary::load_dir(&self.config.shader_dir)?;
        info!("Loaded {} shaders from {}", shaders.len(), self.config.shader_dir.display());

        let session = Session::start(&wasm, gpu, shaders)?;
        let state = PlayerState { session };
        state.request_redraw();
        self.state = Some(state);
        Ok(())
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) -> Result<(), Error> {
        let state = self.state.as_mut().ok_or_else(|| anyhow!("Player state is not set."))?;
        match event {
            WindowEvent::CloseRequested => {
                info!("The close button was pressed; stopping after {} frames", state.session.frames());
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let result = state.session.tick();
                state.request_redraw();
                result?;
            }
            WindowEvent::Resized(size) => {
                state.session.resize(size);
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.session.handle_input(&InputEvent::PointerMoved {
                    x: position.x,
                    y: position.y,
                })?;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    state.session.handle_input(&InputEvent::Key {
                        code,
                        state: event.state,
                        repeat: event.repeat,
                    })?;
                }
            }
            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(error) = self.resume(event_loop) {
            error!("Failed to start: {error:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if let Err(error) = self.window_event(event_loop, id, event) {
            warn!("Failed to handle event: {error:#}");
        }
    }
}
