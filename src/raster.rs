use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::colormap::color_of;
use crate::frame::Frame;
use crate::range::Range;
use crate::surface::DrawingSurface;
use crate::{COLS, FRAME_LEN, PIXEL_SCALE};

/// Paints a frame as a grid of `scale`-sized squares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rasterizer {
    scale: u32,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(PIXEL_SCALE)
    }
}

impl Rasterizer {
    pub const fn new(scale: u32) -> Self {
        Self { scale }
    }

    /// On-screen square for frame index `index`.
    pub fn screen_cell(&self, index: usize) -> Rectangle {
        let (row, col) = (index / COLS, index % COLS);
        let s = self.scale as i32;
        Rectangle::new(Point::new(col as i32 * s, row as i32 * s), Size::new(self.scale, self.scale))
    }

    /// One fill per cell, row by row. Must run inside an exclusive bus window.
    pub fn draw<S: DrawingSurface>(&self, frame: &Frame, range: Range, surface: &mut S) -> Result<(), S::Error> {
        for index in 0..FRAME_LEN {
            let cell = self.screen_cell(index);
            surface.fill_rect(
                cell.top_left.x,
                cell.top_left.y,
                cell.size.width,
                cell.size.height,
                color_of(frame[index], range),
            )?;
        }
        Ok(())
    }
}
