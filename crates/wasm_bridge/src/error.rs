use anyhow::{Result as BridgeResult, anyhow};
use log::{debug, error};
use pollster::block_on;
use wgpu::{CommandBuffer, Device, ErrorFilter, Queue};

/// Submit command buffers inside a validation scope and map any error into anyhow.
///
/// # Errors
/// Returns an error if wgpu validation fails during submission.
pub fn submit_with_validation<I>(device: &Device, queue: &Queue, submissions: I) -> BridgeResult<()>
where
    I: IntoIterator<Item = CommandBuffer>,
{
    device.push_error_scope(ErrorFilter::Validation);
    queue.submit(submissions);
    if let Some(err) = block_on(device.pop_error_scope()) {
        error!(target: "wasm_bridge", "wgpu error (scoped submit): {err}");
        return Err(anyhow!("wgpu validation failed on submit: {err}"));
    }
    debug!(target: "wasm_bridge", "scoped submit ok");
    Ok(())
}

/// Run a closure while a validation error scope is active.
///
/// # Errors
/// Returns an error if wgpu validation fails inside the closure.
pub fn with_validation_scope<F, T>(device: &Device, label: &str, f: F) -> BridgeResult<T>
where
    F: FnOnce() -> T,
{
    device.push_error_scope(ErrorFilter::Validation);
    let out = f();
    if let Some(err) = block_on(device.pop_error_scope()) {
        error!(target: "wasm_bridge", "wgpu error in scope '{label}': {err}");
        return Err(anyhow!("wgpu validation failed in {label}: {err}"));
    }
    Ok(out)
}

/// Like [`with_validation_scope`], but awaits the scope instead of blocking.
/// Used by deferred creations, which are polled by the resolution barrier.
///
/// # Errors
/// Returns an error if wgpu validation fails inside the closure.
pub async fn with_validation_scope_async<F, T>(device: &Device, label: &str, f: F) -> BridgeResult<T>
where
    F: FnOnce() -> T,
{
    device.push_error_scope(ErrorFilter::Validation);
    let out = f();
    if let Some(err) = device.pop_error_scope().await {
        error!(target: "wasm_bridge", "wgpu error in scope '{label}': {err}");
        return Err(anyhow!("wgpu validation failed in {label}: {err}"));
    }
    Ok(out)
}
