//! Host bridge between a sandboxed WebAssembly module and wgpu.
//!
//! The module drives rendering through integer handles and raw offsets into
//! its own linear memory. The bridge owns the native GPU objects behind those
//! handles, records the module's bind and draw calls into the frame's render
//! pass, and writes frame state and input events back into module memory.
#![allow(
    clippy::min_ident_chars,
    clippy::missing_docs_in_private_items,
    clippy::missing_inline_in_public_items,
    clippy::multiple_inherent_impl,
    clippy::absolute_paths,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::as_conversions,
    clippy::arithmetic_side_effects,
    clippy::integer_division_remainder_used,
    clippy::default_numeric_fallback,
    clippy::single_call_fn,
    clippy::implicit_return,
    clippy::question_mark_used,
    clippy::pub_use,
    clippy::mod_module_files,
    clippy::wildcard_imports,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::exhaustive_structs,
    clippy::exhaustive_enums,
    clippy::field_scoped_visibility_modifiers,
    clippy::indexing_slicing,
    clippy::shadow_unrelated,
    clippy::shadow_reuse,
    clippy::pattern_type_mismatch,
    clippy::items_after_statements,
    clippy::doc_markdown,
    clippy::exit,
    clippy::unused_trait_names,
    clippy::float_arithmetic,
    clippy::let_underscore_must_use,
    clippy::let_underscore_untyped,
    clippy::semicolon_outside_block,
    clippy::redundant_pub_crate,
    clippy::partial_pub_fields,
    clippy::separated_literal_suffix,
    clippy::allow_attributes_without_reason,
    reason = "Bridge code does raw offset arithmetic over module memory and numeric casts between wasm and wgpu integer types"
)]

pub mod barrier;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod frame;
pub mod gpu;
pub mod imports;
pub mod memory;
pub mod reflection;
pub mod registry;
pub mod session;
pub mod shaders;

pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use events::{Delivery, InputEvent};
pub use frame::FrameFlags;
pub use gpu::{GpuContext, readback_buffer, readback_target};
pub use registry::{HandleRegistry, ResourceTag, Slot};
pub use session::Session;
pub use shaders::ShaderLibrary;
