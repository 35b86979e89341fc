use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use embedded_hal_async::delay::DelayNs;
use display_interface::DisplayError;
use embedded_graphics::pixelcolor::{IntoStorage, Rgb565};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PointsIter, Rectangle};

const WIDTH: u32 = 240; // Native (portrait) width
const HEIGHT: u32 = 320; // Native (portrait) height
const CHUNK: usize = 64; // Bytes buffered per SPI write when streaming pixels

const SWRESET: u8 = 0x01;
const SLPOUT: u8 = 0x11;
const DISPON: u8 = 0x29;
const CASET: u8 = 0x2A;
const PASET: u8 = 0x2B;
const RAMWR: u8 = 0x2C;
const MADCTL: u8 = 0x36;

const MADCTL_MY: u8 = 0x80; // Row address order
const MADCTL_MX: u8 = 0x40; // Column address order
const MADCTL_MV: u8 = 0x20; // Row / column exchange
const MADCTL_BGR: u8 = 0x08; // Panel is wired BGR

// Power-on register setup. MADCTL is written separately from the orientation.
const INIT_SEQUENCE: &[(u8, &[u8])] = &[
    (0xEF, &[0x03, 0x80, 0x02]),
    (0xCF, &[0x00, 0xC1, 0x30]), // Power control B
    (0xED, &[0x64, 0x03, 0x12, 0x81]), // Power on sequence control
    (0xE8, &[0x85, 0x00, 0x78]), // Driver timing control A
    (0xCB, &[0x39, 0x2C, 0x00, 0x34, 0x02]), // Power control A
    (0xF7, &[0x20]), // Pump ratio control
    (0xEA, &[0x00, 0x00]), // Driver timing control B
    (0xC0, &[0x23]), // Power control 1 (VRH = 4.60 V)
    (0xC1, &[0x10]), // Power control 2 (step-up factor)
    (0xC5, &[0x3E, 0x28]), // VCOM control 1
    (0xC7, &[0x86]), // VCOM control 2
    (0x37, &[0x00]), // Vertical scroll start address
    (0x3A, &[0x55]), // Pixel format: 16 bits / pixel
    (0xB1, &[0x00, 0x18]), // Frame rate control: 79 Hz
    (0xB6, &[0x08, 0x82, 0x27]), // Display function control
    (0xF2, &[0x00]), // 3-gamma function disable
    (0x26, &[0x01]), // Gamma curve 1
    (0xE0, &[0x0F, 0x31, 0x2B, 0x0C, 0x0E, 0x08, 0x4E, 0xF1, 0x37, 0x07, 0x10, 0x03, 0x0E, 0x09, 0x00]), // Positive gamma
    (0xE1, &[0x00, 0x0E, 0x14, 0x03, 0x11, 0x07, 0x31, 0xC1, 0x48, 0x08, 0x0F, 0x0C, 0x31, 0x36, 0x0F]), // Negative gamma
];

/// Panel rotation, in 90 degree steps clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Orientation {
    Portrait,
    Landscape,
    PortraitFlipped,
    LandscapeFlipped,
}

impl Orientation {
    fn madctl(self) -> u8 {
        match self {
            Orientation::Portrait => MADCTL_MX | MADCTL_BGR,
            Orientation::Landscape => MADCTL_MV | MADCTL_BGR,
            Orientation::PortraitFlipped => MADCTL_MY | MADCTL_BGR,
            Orientation::LandscapeFlipped => MADCTL_MX | MADCTL_MY | MADCTL_MV | MADCTL_BGR,
        }
    }

    fn size(self) -> Size {
        match self {
            Orientation::Portrait | Orientation::PortraitFlipped => Size::new(WIDTH, HEIGHT),
            Orientation::Landscape | Orientation::LandscapeFlipped => Size::new(HEIGHT, WIDTH),
        }
    }
}

/// ILI9341 320x240 TFT on a raw SPI bus.
///
/// The driver never touches chip select: every call must happen while the
/// caller holds the bus (see [`crate::bus::ChipSelect`]).
pub struct Ili9341<SPI, DC, RST> {
    spi: SPI,
    dc: DC,
    rst: RST,
    orientation: Orientation,
}

impl<SPI, DC, RST> Ili9341<SPI, DC, RST>
where
    SPI: SpiBus,
    DC: OutputPin,
    RST: OutputPin,
{
    pub fn new(spi: SPI, dc: DC, rst: RST) -> Self {
        Self {
            spi,
            dc,
            rst,
            orientation: Orientation::Landscape,
        }
    }

    pub async fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), DisplayError> {
        self.reset(delay).await?;
        self.send_command(SWRESET, &[])?;
        delay.delay_ms(150).await;
        for (command, params) in INIT_SEQUENCE {
            self.send_command(*command, params)?;
        }
        self.set_orientation(self.orientation)?;
        self.send_command(SLPOUT, &[])?; // Exit sleep
        delay.delay_ms(150).await;
        self.send_command(DISPON, &[])?; // Display on
        delay.delay_ms(150).await;
        Ok(())
    }

    async fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(1).await;
        self.rst.set_low().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(10).await;
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        delay.delay_ms(120).await;
        Ok(())
    }

    pub fn set_orientation(&mut self, orientation: Orientation) -> Result<(), DisplayError> {
        self.send_command(MADCTL, &[orientation.madctl()])?;
        self.orientation = orientation;
        Ok(())
    }

    /// Address window for the next RAMWR, inclusive on both ends.
    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), DisplayError> {
        let size = self.orientation.size();
        if x0 > x1 || y0 > y1 || u32::from(x1) >= size.width || u32::from(y1) >= size.height {
            return Err(DisplayError::OutOfBoundsError);
        }
        let [x0h, x0l] = x0.to_be_bytes();
        let [x1h, x1l] = x1.to_be_bytes();
        let [y0h, y0l] = y0.to_be_bytes();
        let [y1h, y1l] = y1.to_be_bytes();
        self.send_command(CASET, &[x0h, x0l, x1h, x1l])?;
        self.send_command(PASET, &[y0h, y0l, y1h, y1l])?;
        self.send_command(RAMWR, &[])
    }

    fn set_window_for(&mut self, area: &Rectangle) -> Result<(), DisplayError> {
        let bottom_right = area.bottom_right().ok_or(DisplayError::OutOfBoundsError)?;
        self.set_window(
            area.top_left.x as u16,
            area.top_left.y as u16,
            bottom_right.x as u16,
            bottom_right.y as u16,
        )
    }

    fn send_command(&mut self, command: u8, params: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(|_| DisplayError::DCError)?;
        self.write(&[command])?;
        if !params.is_empty() {
            self.send_data(params)?;
        }
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;
        self.write(data)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.spi.write(bytes).map_err(|_| DisplayError::BusWriteError)?;
        // DC may only change once the bytes have left the shifter
        self.spi.flush().map_err(|_| DisplayError::BusWriteError)
    }

    /// Stream colours into the current window, `CHUNK` bytes at a time.
    fn write_pixels<I>(&mut self, colors: I) -> Result<(), DisplayError>
    where
        I: IntoIterator<Item = Rgb565>,
    {
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;
        let mut buffer = [0u8; CHUNK];
        let mut len = 0;
        for color in colors {
            let [hi, lo] = color.into_storage().to_be_bytes();
            buffer[len] = hi;
            buffer[len + 1] = lo;
            len += 2;
            if len == CHUNK {
                self.write(&buffer)?;
                len = 0;
            }
        }
        if len > 0 {
            self.write(&buffer[..len])?;
        }
        Ok(())
    }
}

impl<SPI, DC, RST> DrawTarget for Ili9341<SPI, DC, RST>
where
    SPI: SpiBus,
    DC: OutputPin,
    RST: OutputPin,
{
    type Color = Rgb565;
    type Error = DisplayError;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.bounding_box();
        for Pixel(point, colour) in pixels {
            if bounds.contains(point) {
                let (x, y) = (point.x as u16, point.y as u16);
                self.set_window(x, y, x, y)?;
                self.write_pixels([colour])?;
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        let visible = area.intersection(&self.bounding_box());
        if visible.is_zero_sized() {
            return Ok(());
        }
        if visible != *area {
            // Partly off screen: fall back to per-pixel clipping.
            return self.draw_iter(
                area.points()
                    .zip(colors)
                    .map(|(point, colour)| Pixel(point, colour)),
            );
        }
        self.set_window_for(area)?;
        self.write_pixels(colors.into_iter().take(area.size.width as usize * area.size.height as usize))
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let visible = area.intersection(&self.bounding_box());
        if visible.is_zero_sized() {
            return Ok(());
        }
        self.set_window_for(&visible)?;
        let count = visible.size.width as usize * visible.size.height as usize;
        self.write_pixels(core::iter::repeat(color).take(count))
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let area = self.bounding_box();
        self.fill_solid(&area, color)
    }
}

impl<SPI, DC, RST> OriginDimensions for Ili9341<SPI, DC, RST> {
    fn size(&self) -> Size {
        self.orientation.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use embedded_graphics::pixelcolor::Rgb565;
    use embedded_hal::digital;
    use embedded_hal::spi;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Wire {
        Dc(bool),
        Bytes(Vec<u8>),
    }

    type Log = Rc<RefCell<Vec<Wire>>>;

    struct Bus(Log);
    struct Dc(Log);
    struct Rst;
    struct NoDelay;

    impl spi::ErrorType for Bus {
        type Error = Infallible;
    }

    impl SpiBus for Bus {
        fn read(&mut self, _: &mut [u8]) -> Result<(), Infallible> {
            Ok(())
        }

        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Wire::Bytes(words.to_vec()));
            Ok(())
        }

        fn transfer(&mut self, _: &mut [u8], _: &[u8]) -> Result<(), Infallible> {
            Ok(())
        }

        fn transfer_in_place(&mut self, _: &mut [u8]) -> Result<(), Infallible> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    impl digital::ErrorType for Dc {
        type Error = Infallible;
    }

    impl OutputPin for Dc {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Wire::Dc(false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Wire::Dc(true));
            Ok(())
        }
    }

    impl digital::ErrorType for Rst {
        type Error = Infallible;
    }

    impl OutputPin for Rst {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    /// Folds the wire log into `(command, data)` pairs.
    fn transactions(log: &Log) -> Vec<(u8, Vec<u8>)> {
        let mut out: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut data_mode = false;
        for event in log.borrow().iter() {
            match event {
                Wire::Dc(level) => data_mode = *level,
                Wire::Bytes(bytes) if data_mode => out.last_mut().unwrap().1.extend_from_slice(bytes),
                Wire::Bytes(bytes) => out.extend(bytes.iter().map(|&c| (c, Vec::new()))),
            }
        }
        out
    }

    fn display() -> (Ili9341<Bus, Dc, Rst>, Log) {
        let log: Log = Rc::default();
        (Ili9341::new(Bus(log.clone()), Dc(log.clone()), Rst), log)
    }

    #[test]
    fn landscape_by_default() {
        let (display, _) = display();
        assert_eq!(display.size(), Size::new(320, 240));
    }

    #[test]
    fn init_sequence() {
        let (mut display, log) = display();
        embassy_futures::block_on(display.init(&mut NoDelay)).unwrap();
        let tx = transactions(&log);
        assert_eq!(tx.first(), Some(&(SWRESET, vec![])));
        assert!(tx.contains(&(0x3A, vec![0x55])));
        assert!(tx.contains(&(MADCTL, vec![MADCTL_MV | MADCTL_BGR])));
        assert_eq!(&tx[tx.len() - 2..], &[(SLPOUT, vec![]), (DISPON, vec![])]);
    }

    #[test]
    fn fill_solid_sets_window_and_streams() {
        let (mut display, log) = display();
        display
            .fill_solid(&Rectangle::new(Point::new(10, 20), Size::new(2, 3)), Rgb565::RED)
            .unwrap();
        assert_eq!(
            transactions(&log),
            vec![
                (CASET, vec![0, 10, 0, 11]),
                (PASET, vec![0, 20, 0, 22]),
                (RAMWR, [0xF8, 0x00].repeat(6)),
            ]
        );
    }

    #[test]
    fn large_fill_is_chunked() {
        let (mut display, log) = display();
        display
            .fill_solid(&Rectangle::new(Point::new(0, 0), Size::new(10, 10)), Rgb565::BLUE)
            .unwrap();
        let writes = log
            .borrow()
            .iter()
            .filter(|w| matches!(w, Wire::Bytes(b) if b.len() == CHUNK))
            .count();
        assert_eq!(writes, 200 / CHUNK);
        let tx = transactions(&log);
        assert_eq!(tx[2].1.len(), 200);
    }

    #[test]
    fn fill_solid_clips_to_screen() {
        let (mut display, log) = display();
        display
            .fill_solid(&Rectangle::new(Point::new(315, 235), Size::new(10, 10)), Rgb565::WHITE)
            .unwrap();
        let tx = transactions(&log);
        assert_eq!(tx[0], (CASET, vec![0x01, 0x3B, 0x01, 0x3F]));
        assert_eq!(tx[1], (PASET, vec![0, 235, 0, 239]));
        assert_eq!(tx[2].1.len(), 5 * 5 * 2);
    }

    #[test]
    fn off_screen_is_ignored() {
        let (mut display, log) = display();
        display
            .fill_solid(&Rectangle::new(Point::new(400, 0), Size::new(10, 10)), Rgb565::WHITE)
            .unwrap();
        display.draw_iter([Pixel(Point::new(-1, 5), Rgb565::WHITE)]).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn single_pixel() {
        let (mut display, log) = display();
        display.draw_iter([Pixel(Point::new(3, 4), Rgb565::GREEN)]).unwrap();
        assert_eq!(
            transactions(&log),
            vec![
                (CASET, vec![0, 3, 0, 3]),
                (PASET, vec![0, 4, 0, 4]),
                (RAMWR, vec![0x07, 0xE0]),
            ]
        );
    }

    #[test]
    fn orientation_changes_geometry() {
        let (mut display, log) = display();
        display.set_orientation(Orientation::Portrait).unwrap();
        assert_eq!(display.size(), Size::new(240, 320));
        assert_eq!(transactions(&log), vec![(MADCTL, vec![MADCTL_MX | MADCTL_BGR])]);
    }
}
