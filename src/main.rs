#![no_std]
#![no_main]

use defmt::*;

use embassy_executor::Spawner;
use embassy_time::{Delay, Timer};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::{I2C0, SPI1};
use embassy_rp::spi::{self, Phase, Polarity, Spi};

use display_interface::DisplayError;
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_hal::spi::{Phase as BusPhase, Polarity as BusPolarity};

use mlx9064x::{AccessPattern, FrameRate, Mlx90640Driver};

use {defmt_rtt as _, panic_probe as _};

use ir_camera_rs::ili9341::Ili9341;
use ir_camera_rs::sensor::{self, PolledSource, ReadPattern, RefreshRate, SensorConfig, ThermalArray};
use ir_camera_rs::{
    paint_exclusive, AcquireError, BusConfig, BusError, ChipSelect, DrawingSurface, Exclusive, GraphicsSurface,
    OverlayRenderer, PipelineDriver, PipelineError,
    I2C_FREQUENCY, MLX90640_ADDRESS, SPI_FREQUENCY,
};

const I2C_SDA: u8 = 16; // GP16, shown on the wiring hint screen
const I2C_SCL: u8 = 17; // GP17

type SensorBus = I2c<'static, I2C0, i2c::Blocking>;
type Display = Ili9341<Spi<'static, SPI1, spi::Blocking>, Output<'static>, Output<'static>>;

/// The MLX90640 behind the crate's polling frame source.
struct Camera(Mlx90640Driver<SensorBus>);

impl ThermalArray for Camera {
    type Error = ();

    fn read_if_ready(&mut self, destination: &mut [f32]) -> Result<bool, ()> {
        self.0.generate_image_if_ready(destination).map_err(|_| ())
    }
}

fn open_camera(bus: SensorBus, config: &SensorConfig) -> Result<Camera, AcquireError> {
    let mut driver = Mlx90640Driver::new(bus, MLX90640_ADDRESS).map_err(|_| AcquireError::SensorUnavailable)?;

    let rate = match config.refresh_rate {
        RefreshRate::Half => FrameRate::Half,
        RefreshRate::One => FrameRate::One,
        RefreshRate::Two => FrameRate::Two,
        RefreshRate::Four => FrameRate::Four,
        RefreshRate::Eight => FrameRate::Eight,
        RefreshRate::Sixteen => FrameRate::Sixteen,
        RefreshRate::ThirtyTwo => FrameRate::ThirtyTwo,
        RefreshRate::SixtyFour => FrameRate::SixtyFour,
    };
    let pattern = match config.pattern {
        ReadPattern::Chess => AccessPattern::Chess,
        ReadPattern::Interleaved => AccessPattern::Interleave,
    };
    driver.set_frame_rate(rate).map_err(|_| AcquireError::SensorUnavailable)?;
    driver.set_access_pattern(pattern).map_err(|_| AcquireError::SensorUnavailable)?;
    Ok(Camera(driver))
}

/// Log a failed screen update. Start-up screens are best effort.
fn report(result: Result<(), PipelineError<DisplayError, BusError>>) {
    match result {
        Ok(()) => {}
        Err(PipelineError::Bus(e)) => error!("display bus: {}", e),
        Err(PipelineError::Surface(_)) => error!("display write failed"),
        Err(PipelineError::Sensor(e)) => error!("{}", e),
    }
}

async fn halt() -> ! {
    loop {
        Timer::after_secs(60).await;
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Program start");
    let peripherals = embassy_rp::init(Default::default());
    let mut delay = Delay;

    // Display pins
    let dc = Output::new(peripherals.PIN_8, Level::Low);     // Data/Command
    let cs = Output::new(peripherals.PIN_9, Level::High);    // Chip Select
    let sclk = peripherals.PIN_10;                               // Serial Clock
    let mosi = peripherals.PIN_11;                               // Master Out Slave In
    let rst = Output::new(peripherals.PIN_12, Level::Low);   // Reset

    // Thermal array pins
    let sda = peripherals.PIN_16;
    let scl = peripherals.PIN_17;

    let bus_config = BusConfig::default();
    let mut spi_config = spi::Config::default();
    spi_config.frequency = bus_config.frequency;
    spi_config.phase = match bus_config.mode.phase {
        BusPhase::CaptureOnFirstTransition => Phase::CaptureOnFirstTransition,
        BusPhase::CaptureOnSecondTransition => Phase::CaptureOnSecondTransition,
    };
    spi_config.polarity = match bus_config.mode.polarity {
        BusPolarity::IdleLow => Polarity::IdleLow,
        BusPolarity::IdleHigh => Polarity::IdleHigh,
    };

    let spi = Spi::new_blocking_txonly(peripherals.SPI1, sclk, mosi, spi_config);
    let mut bus = unwrap!(ChipSelect::new(cs, SPI_FREQUENCY));
    let mut display = Ili9341::new(spi, dc, rst);

    match Exclusive::begin(&mut bus, &bus_config) {
        Ok(window) => {
            if display.init(&mut delay).await.is_err() {
                error!("display init failed");
            }
            if let Err(e) = window.release() {
                error!("failed to release display bus: {}", e);
            }
        }
        Err(e) => error!("display bus unavailable: {}", e),
    }

    let mut surface = GraphicsSurface::new(display);
    let overlay = OverlayRenderer::default();
    report(paint_exclusive(&mut bus, &bus_config, &mut surface, |s| overlay.draw_boot(s)));

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = I2C_FREQUENCY;
    let mut i2c = I2c::new_blocking(peripherals.I2C0, scl, sda, i2c_config);

    let sensor_config = SensorConfig::default();
    let camera = if sensor::scan_bus(&mut i2c).contains(&MLX90640_ADDRESS) {
        open_camera(i2c, &sensor_config)
    } else {
        Err(AcquireError::SensorUnavailable)
    };

    let camera = match camera {
        Ok(camera) => camera,
        Err(e) => {
            error!("MLX90640 not found: {}", e);
            report(paint_exclusive(&mut bus, &bus_config, &mut surface, |s| {
                overlay.draw_sensor_error(s, I2C_SDA, I2C_SCL)
            }));
            halt().await
        }
    };
    info!("MLX90640 found");

    report(paint_exclusive(&mut bus, &bus_config, &mut surface, |s| {
        let (w, h) = (s.width(), s.height());
        s.fill_rect(0, 0, w, h, Rgb888::BLACK)
    }));

    let source = PolledSource::new(camera, Delay, sensor_config);
    let mut pipeline = PipelineDriver::new(source, surface, bus)
        .with_bus_config(bus_config)
        .with_overlay(overlay);

    match pipeline.run().await {
        PipelineError::Sensor(e) => error!("sensor lost: {}", e),
        _ => error!("pipeline stopped"),
    }
    let stats = pipeline.stats();
    info!("rendered {} frames, skipped {}", stats.rendered, stats.skipped);
    report(pipeline.show_sensor_error(I2C_SDA, I2C_SCL));
    halt().await
}
