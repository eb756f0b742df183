use wasm_bridge::Session;

/// Everything the player keeps alive once the module has started.
pub struct PlayerState {
    pub session: Session,
}

impl PlayerState {
    /// Ask the session's window for another frame.
    pub fn request_redraw(&self) {
        if let Some(window) = self.session.context().gpu.window() {
            window.request_redraw();
        }
    }
}
