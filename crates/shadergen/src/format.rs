/// Precision applied to every emitted float constant.
const LITERAL_SCALE: f64 = 1e6;

/// Magnitude above which rounding to six decimals is a no-op.
const ROUNDING_LIMIT: f64 = 1e15;

/// Rounds `value` to six decimals, folding `-0.0` into `0.0`.
pub fn round_literal(value: f64) -> f64 {
    let rounded = if value.abs() < ROUNDING_LIMIT {
        (value * LITERAL_SCALE).round() / LITERAL_SCALE
    } else {
        value
    };
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Renders a GLSL float literal that always carries a fractional part.
///
/// Callers must reject non-finite values beforehand; see
/// [`crate::ir::Module::validate`].
pub fn float_literal(value: f64) -> String {
    let mut text = format!("{}", round_literal(value));
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}
