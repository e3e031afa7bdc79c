use ribbonconfig::Performance;

use crate::program::SurfaceSize;

/// Device-pixel size of the drawing buffer for a surface of `css_width` x
/// `css_height` logical pixels.
///
/// The device pixel ratio is honoured only when `respect_dpr` is set, and the
/// supersampling factor is picked from the breakpoints by logical width.
pub fn backing_store_size(
    css_width: f64,
    css_height: f64,
    device_pixel_ratio: f64,
    performance: &Performance,
) -> SurfaceSize {
    let dpr = if performance.respect_dpr && device_pixel_ratio.is_finite() {
        device_pixel_ratio.max(0.0)
    } else {
        1.0
    };
    let supersample = performance.supersample_for(css_width);
    let supersample = if supersample.is_finite() && supersample > 0.0 {
        supersample
    } else {
        1.0
    };
    let scale = dpr * supersample;
    let dimension = |css: f64| {
        let pixels = (css.max(0.0) * scale).floor();
        if pixels.is_finite() {
            pixels.min(u32::MAX as f64) as u32
        } else {
            1
        }
    };
    SurfaceSize::new(dimension(css_width), dimension(css_height))
}
