#![allow(dead_code, reason = "each test binary uses a different subset")]

use pollster::block_on;
use std::env;
use wasm_bridge::{BridgeConfig, GpuContext, ShaderLibrary};
use winit::dpi::PhysicalSize;

/// Triangle shader: one uniform color, a vec2 position and a scalar shade per vertex.
pub const TRI_WGSL: &str = r"
struct Uniforms {
    tint: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) shade: f32,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) shade: f32,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip = vec4<f32>(input.position, 0.0, 1.0);
    out.shade = input.shade;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return uniforms.tint * input.shade;
}
";

/// Reflection for [`TRI_WGSL`]: one struct input with two vertex attributes.
pub const TRI_REFLECTION: &str = r#"{
    "parameters": [
        {
            "name": "uniforms",
            "binding": { "kind": "descriptorTableSlot", "index": 0 },
            "type": { "kind": "constantBuffer" }
        }
    ],
    "entryPoints": [
        {
            "name": "vs_main",
            "stage": "vertex",
            "parameters": [
                {
                    "name": "input",
                    "binding": { "kind": "varyingInput", "index": 0, "count": 2 },
                    "type": {
                        "kind": "struct",
                        "name": "VertexInput",
                        "fields": [
                            {
                                "name": "position",
                                "binding": { "kind": "varyingInput", "index": 0 },
                                "type": {
                                    "kind": "vector",
                                    "elementCount": 2,
                                    "elementType": { "kind": "scalar", "scalarType": "float32" }
                                }
                            },
                            {
                                "name": "shade",
                                "binding": { "kind": "varyingInput", "index": 1 },
                                "type": { "kind": "scalar", "scalarType": "float32" }
                            }
                        ]
                    }
                }
            ]
        },
        { "name": "fs_main", "stage": "fragment", "parameters": [] }
    ]
}"#;

pub const TARGET_SIZE: PhysicalSize<u32> = PhysicalSize {
    width: 64,
    height: 48,
};

/// Set to `1` to skip GPU tests on machines without an adapter.
pub const SKIP_GPU_TESTS: &str = "BRIDGE_SKIP_GPU_TESTS";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A headless GPU context.
///
/// A missing adapter fails the test unless [`SKIP_GPU_TESTS`] is `1`, in
/// which case this returns `None` and the caller returns early.
pub fn headless_gpu() -> Option<GpuContext> {
    init_logger();
    let result = block_on(GpuContext::headless(TARGET_SIZE, &BridgeConfig::default()));
    if result.is_err() && env::var(SKIP_GPU_TESTS).is_ok_and(|value| value == "1") {
        log::warn!("{SKIP_GPU_TESTS}=1 and no adapter is available; skipping GPU test");
        return None;
    }
    Some(result.expect("headless GPU context (set BRIDGE_SKIP_GPU_TESTS=1 to skip GPU tests)"))
}

/// A library holding the triangle shader under the name `tri`.
pub fn tri_library() -> ShaderLibrary {
    let mut library = ShaderLibrary::new();
    library
        .insert("tri", TRI_WGSL, TRI_REFLECTION)
        .expect("fixture reflection parses");
    library
}

const IMPORTS: &str = r#"
  (import "env" "__link" (func $link (param i32 i32)))
  (import "env" "__rand" (func $rand (param i32 i32)))
  (import "env" "wgpu_buffer_create" (func $buffer_create (param i32 i32) (result i32)))
  (import "env" "wgpu_buffer_write_raw" (func $buffer_write (param i32 i32 i32 i32)))
  (import "env" "wgpu_pipeline_create" (func $pipeline_create (param i32 i32) (result i32)))
  (import "env" "wgpu_bind_group_create" (func $bind_group_create (param i32 i32 i32 i32) (result i32)))
  (import "env" "wgpu_bind_pipeline" (func $bind_pipeline (param i32)))
  (import "env" "wgpu_bind_bind_group" (func $bind_bind_group (param i32 i32)))
  (import "env" "wgpu_bind_vertex_buffer" (func $bind_vertex_buffer (param i32)))
  (import "env" "wgpu_bind_index_buffer" (func $bind_index_buffer (param i32)))
  (import "env" "wgpu_draw" (func $draw (param i32 i32 i32 i32)))
  (import "env" "wgpu_draw_indexed" (func $draw_indexed (param i32 i32 i32 i32 i32)))
  (import "env" "log" (func $log (param i32 i32)))
  (import "env" "cosf" (func $cosf (param f32) (result f32)))
  (import "env" "sinf" (func $sinf (param f32) (result f32)))
  (import "env" "debug1" (func $debug1 (param i32 i32 f32 i32)))
"#;

/// Bodies of a test module's exported entry points.
#[derive(Default)]
pub struct GameModule<'src> {
    /// Extra top-level items: globals and data segments.
    pub items: &'src str,
    pub setup: &'src str,
    pub init: &'src str,
    /// Runs with `(param $dt f32) (param $flags i32)`.
    pub frame: &'src str,
    /// Runs with `(param $record i32)`.
    pub event: &'src str,
}

impl GameModule<'_> {
    /// Assemble the module as WAT text. Memory is one exported page.
    pub fn wat(&self) -> String {
        format!(
            r#"(module
{IMPORTS}
  (memory (export "memory") 1)
  {items}
  (func (export "__engine_setup") {setup})
  (func (export "game_init") {init})
  (func (export "game_loop") (param $dt f32) (param $flags i32) {frame})
  (func (export "game_handle_event") (param $record i32) {event})
)"#,
            items = self.items,
            setup = self.setup,
            init = self.init,
            frame = self.frame,
            event = self.event,
        )
    }
}
