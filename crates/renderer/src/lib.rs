//! GPU side of the ribbon preview.
//!
//! ```text
//!   shadergen::generate ──▶ ProgramManager::hot_swap ──▶ ProgramBackend
//!                                   ▲                     (WgpuBackend)
//!   AnimationScheduler::tick ───────┘ draw_frame(phase)
//! ```
//!
//! [`ProgramManager`] owns exactly one active program and only replaces it
//! once a successor has fully built. [`backing_store_size`] maps a logical
//! surface to device pixels according to the performance settings.

mod gpu;
mod program;
mod surface;

pub use gpu::{WgpuBackend, WgpuProgram, WgpuShader};
pub use program::{
    AttributeLocation, BuildError, CompiledProgram, DrawError, ProgramBackend, ProgramBindings,
    ProgramManager, Stage, SurfaceSize, UniformLocation, POSITION_ATTRIBUTE, RESOLUTION_UNIFORM,
    TIME_UNIFORM,
};
pub use surface::backing_store_size;
