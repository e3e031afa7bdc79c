//! wgpu implementation of the program backend.
//!
//! - `context` owns the instance, device and surface and reconfigures the
//!   swapchain when the backing store changes size.
//! - `backend` compiles GLSL through naga, resolves bindings by reflection and
//!   draws the full-screen quad with the active pipeline.

mod backend;
mod context;

pub use backend::{WgpuBackend, WgpuProgram, WgpuShader};
