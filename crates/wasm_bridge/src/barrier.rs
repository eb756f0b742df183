use crate::registry::HandleRegistry;
use anyhow::{Context as _, Result as AnyResult};
use log::{debug, info};
use pollster::block_on;
use std::time::Instant;

/// Wait for every pending registry slot to settle and rewrite it in place.
///
/// Runs once between module init and the first frame. A registry with
/// nothing pending returns immediately, so running it again is a no-op.
///
/// # Errors
/// Returns the first creation failure, naming the handle.
pub fn resolve_all(registry: &mut HandleRegistry) -> AnyResult<usize> {
    let pending = registry.pending_count();
    if pending == 0 {
        debug!(target: "wasm_bridge", "resolution barrier: nothing pending");
        return Ok(0);
    }
    let started = Instant::now();
    let resolved = block_on(registry.resolve_pending()).context("resolution barrier failed")?;
    info!(
        target: "wasm_bridge",
        "resolution barrier settled {resolved} resources in {:.1} ms",
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(resolved)
}
