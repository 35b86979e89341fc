#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Thermal camera firmware core: pulls 32x24 frames from a thermal array,
//! auto-ranges them, colours them through a blue-green-red heatmap and
//! paints them ten-fold magnified on a 320x240 ILI9341 panel.
//!
//! The hardware sits behind three small seams so one cycle can be exercised
//! without a board: [`FrameSource`] for the sensor, [`DrawingSurface`] for the
//! panel and [`BusGuard`] for the shared SPI bus.

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bus;
pub mod colormap;
pub mod frame;
pub mod ili9341;
pub mod overlay;
pub mod pipeline;
pub mod range;
pub mod raster;
pub mod sensor;
pub mod surface;

pub use bus::{BitOrder, BusConfig, BusError, BusGuard, ChipSelect, Exclusive};
pub use colormap::color_of;
pub use frame::{AcquireError, Frame, FrameSource};
pub use overlay::OverlayRenderer;
pub use pipeline::{paint_exclusive, CycleOutcome, CycleStats, PipelineDriver, PipelineError, PipelineState};
pub use range::{estimate, Range};
pub use raster::Rasterizer;
pub use surface::{DrawingSurface, GraphicsSurface};

pub const ROWS: usize = 24; // Sensor rows
pub const COLS: usize = 32; // Sensor columns
pub const FRAME_LEN: usize = ROWS * COLS; // Samples per frame
pub const PIXEL_SCALE: u32 = 10; // 32x24 sensor -> 320x240 screen

pub const CENTER_ROW: usize = 12; // Row of the cell read out under the crosshair
pub const CENTER_COL: usize = 16; // Column of the cell read out under the crosshair
pub const MIN_SPAN: f32 = 1.0; // Smallest allowed max - min (deg C)

pub const MLX90640_ADDRESS: u8 = 0x33; // Default I2C address of the thermal array
pub const I2C_FREQUENCY: u32 = 400_000; // I2C clock for the thermal array (Hz)
pub const SPI_FREQUENCY: u32 = 40_000_000; // SPI clock for the display (Hz)
pub const READ_TIMEOUT_MS: u32 = 1_000; // Give up on a frame after this long (4 Hz refresh)
pub const POLL_INTERVAL_MS: u32 = 20; // Data-ready polling interval
