//! Blue -> green -> red heatmap.
//!
//! The lower half of the window fades blue into green, the upper half green
//! into red. Both halves reach full green at the midpoint and are not blended
//! beyond that.

use embedded_graphics::pixelcolor::Rgb888;

use crate::range::Range;

/// Colour of `value` within `range`. Values outside the window are clamped.
pub fn color_of(value: f32, range: Range) -> Rgb888 {
    let value = range.clamp(value);
    let rel = (value - range.low()) / range.span();

    // Float to u8 truncates: a quarter of the way up is 127, not 128.
    if rel < 0.5 {
        let local = rel * 2.0;
        Rgb888::new(0, (255.0 * local) as u8, (255.0 * (1.0 - local)) as u8)
    } else {
        let local = (rel - 0.5) * 2.0;
        Rgb888::new((255.0 * local) as u8, (255.0 * (1.0 - local)) as u8, 0)
    }
}
