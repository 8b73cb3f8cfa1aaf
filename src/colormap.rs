use plotters::prelude::ViridisRGB;
use plotters::style::RGBColor;

/// Used for every point when the attribute has no variance.
pub const NEUTRAL: RGBColor = RGBColor(128, 128, 128);

/// Viridis color for a normalized attribute `t` in `[0, 1]`.
///
/// Out-of-range values are clamped to the nearest end; NaN maps to the low end.
pub fn viridis(t: f64) -> RGBColor {
    ViridisRGB::get_color(if t.is_nan() { 0.0 } else { t })
}
