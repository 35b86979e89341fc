//! Text and crosshair drawn over the heatmap, plus the boot and fault screens.

use core::fmt::Write;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::Point;
use heapless::String;

use crate::frame::Frame;
use crate::range::Range;
use crate::surface::DrawingSurface;

/// Where the overlay pieces go on a 320x240 landscape panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OverlayLayout {
    /// Half the length of each crosshair arm.
    pub crosshair_half: i32,
    /// Centre readout position relative to the crosshair centre.
    pub center_text_offset: Point,
    pub min_position: Point,
    pub max_position: Point,
    pub foreground: Rgb888,
    pub background: Rgb888,
    /// Vertical advance between lines on the boot and fault screens.
    pub line_height: i32,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            crosshair_half: 10,
            center_text_offset: Point::new(5, 5),
            min_position: Point::new(5, 220),
            max_position: Point::new(240, 220),
            foreground: Rgb888::WHITE,
            background: Rgb888::BLACK,
            line_height: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlayRenderer {
    layout: OverlayLayout,
}

impl OverlayRenderer {
    /// Crosshair, centre reading and min/max. Call after the raster so it sits on top.
    pub fn draw<S: DrawingSurface>(&self, frame: &Frame, range: Range, surface: &mut S) -> Result<(), S::Error> {
        let l = &self.layout;
        let cx = (surface.width() / 2) as i32;
        let cy = (surface.height() / 2) as i32;
        let half = l.crosshair_half;

        surface.draw_line(cx - half, cy, cx + half - 1, cy, l.foreground)?;
        surface.draw_line(cx, cy - half, cx, cy + half - 1, l.foreground)?;

        let bg = Some(l.background);
        let origin = Point::new(cx, cy) + l.center_text_offset;
        surface.draw_text(origin.x, origin.y, &center_label(frame.center()), l.foreground, bg)?;
        surface.draw_text(l.min_position.x, l.min_position.y, &bound_label("Min", range.low()), l.foreground, bg)?;
        surface.draw_text(l.max_position.x, l.max_position.y, &bound_label("Max", range.high()), l.foreground, bg)?;
        Ok(())
    }

    /// Black screen with the start-up message.
    pub fn draw_boot<S: DrawingSurface>(&self, surface: &mut S) -> Result<(), S::Error> {
        let l = &self.layout;
        surface.fill_rect(0, 0, surface.width(), surface.height(), l.background)?;
        surface.draw_text(10, 10, "Initializing IR...", l.foreground, Some(l.background))
    }

    /// Red screen telling the user to check the sensor wiring.
    pub fn draw_sensor_error<S: DrawingSurface>(&self, surface: &mut S, sda: u8, scl: u8) -> Result<(), S::Error> {
        let l = &self.layout;
        surface.fill_rect(0, 0, surface.width(), surface.height(), Rgb888::RED)?;

        let mut sda_line: String<16> = String::new();
        let mut scl_line: String<16> = String::new();
        // "SCL -> 255" is the longest a u8 pin can get.
        let _ = write!(sda_line, "SDA -> {}", sda);
        let _ = write!(scl_line, "SCL -> {}", scl);

        let lines: [&str; 4] = ["Sensor Error!", "Check wiring:", &sda_line, &scl_line];
        for (i, line) in lines.iter().enumerate() {
            surface.draw_text(10, 10 + i as i32 * l.line_height, line, l.foreground, Some(Rgb888::RED))?;
        }
        Ok(())
    }
}

/// Room for `"-340282350000000000000000000000000000000.0C"`, the widest finite reading.
pub const LABEL_LEN: usize = 48;

/// `"25.0C"`
pub fn center_label(value: f32) -> String<LABEL_LEN> {
    let mut s = String::new();
    if write!(s, "{:.1}C", value).is_err() {
        warn!("centre label cut short");
    }
    s
}

/// `"Min: 20"`, rounded half away from zero. The cast saturates at the i32 limits.
pub fn bound_label(name: &str, value: f32) -> String<LABEL_LEN> {
    let mut s = String::new();
    if write!(s, "{}: {}", name, libm::roundf(value) as i32).is_err() {
        warn!("{} label cut short", name);
    }
    s
}
