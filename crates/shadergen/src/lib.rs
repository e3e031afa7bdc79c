//! Deterministic GLSL generation for the ribbon banner effect.
//!
//! [`generate`] turns a [`ribbonconfig::ParameterSet`] into a fragment
//! program. The source is assembled as an [`ir::Module`], validated, and only
//! then rendered, so a malformed configuration surfaces as a
//! [`GenerateError`] rather than as a driver diagnostic.

pub mod format;
pub mod ir;

mod generate;

pub use generate::{
    center_expr, drift_expr, generate, thickness_expr, twist_angle_expr, GeneratedShader,
    MAX_BANDS, VERTEX_SHADER,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("literal in `{function}` is not a finite 32-bit float")]
    NonFiniteLiteral { function: String },
    #[error("identifier `{name}` used before declaration in `{function}`")]
    UndeclaredIdentifier { name: String, function: String },
    #[error("call to unknown function `{name}` in `{function}`")]
    UnknownFunction { name: String, function: String },
}
