use embedded_graphics::mono_font::{ascii::FONT_6X10, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};

/// Drawing operations the pipeline needs from a panel.
///
/// Colours are 24-bit; packing into the panel's native format is the
/// implementor's business. Origin is top-left, x grows right, y grows down.
pub trait DrawingSurface {
    type Error;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb888) -> Result<(), Self::Error>;

    /// Draw `text` with its top-left corner at `(x, y)`.
    ///
    /// With `bg` set the whole glyph cell is painted, so redrawing at the same
    /// spot overwrites the previous text without a separate clear.
    fn draw_text(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        fg: Rgb888,
        bg: Option<Rgb888>,
    ) -> Result<(), Self::Error>;

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb888) -> Result<(), Self::Error>;
}

impl<T: DrawingSurface + ?Sized> DrawingSurface for &mut T {
    type Error = T::Error;

    fn width(&self) -> u32 {
        T::width(self)
    }

    fn height(&self) -> u32 {
        T::height(self)
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb888) -> Result<(), Self::Error> {
        T::fill_rect(self, x, y, w, h, color)
    }

    fn draw_text(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        fg: Rgb888,
        bg: Option<Rgb888>,
    ) -> Result<(), Self::Error> {
        T::draw_text(self, x, y, text, fg, bg)
    }

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb888) -> Result<(), Self::Error> {
        T::draw_line(self, x0, y0, x1, y1, color)
    }
}

/// Adapts any `embedded-graphics` draw target into a [`DrawingSurface`].
/// Text is set in the 6x10 ASCII font.
pub struct GraphicsSurface<D> {
    target: D,
}

impl<D> GraphicsSurface<D>
where
    D: DrawTarget,
    D::Color: From<Rgb888>,
{
    pub fn new(target: D) -> Self {
        Self { target }
    }
}

impl<D> DrawingSurface for GraphicsSurface<D>
where
    D: DrawTarget,
    D::Color: From<Rgb888>,
{
    type Error = D::Error;

    fn width(&self) -> u32 {
        self.target.bounding_box().size.width
    }

    fn height(&self) -> u32 {
        self.target.bounding_box().size.height
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb888) -> Result<(), Self::Error> {
        let area = Rectangle::new(Point::new(x, y), Size::new(w, h));
        self.target.fill_solid(&area, color.into())
    }

    fn draw_text(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        fg: Rgb888,
        bg: Option<Rgb888>,
    ) -> Result<(), Self::Error> {
        let mut style = MonoTextStyleBuilder::new()
            .font(&FONT_6X10)
            .text_color(D::Color::from(fg));
        if let Some(bg) = bg {
            style = style.background_color(D::Color::from(bg));
        }
        Text::with_baseline(text, Point::new(x, y), style.build(), Baseline::Top).draw(&mut self.target)?;
        Ok(())
    }

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb888) -> Result<(), Self::Error> {
        Line::new(Point::new(x0, y0), Point::new(x1, y1))
            .into_styled(PrimitiveStyle::with_stroke(D::Color::from(color), 1))
            .draw(&mut self.target)
    }
}
