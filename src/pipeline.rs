//! The acquire -> range -> raster -> overlay loop.

use core::fmt::{self, Write};

use heapless::String;
use thiserror::Error;

use crate::bus::{BusConfig, BusGuard, Exclusive};
use crate::frame::{AcquireError, Frame, FrameSource};
use crate::overlay::OverlayRenderer;
use crate::range::{estimate, Range};
use crate::raster::Rasterizer;
use crate::surface::DrawingSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipelineState {
    Idle,
    Acquiring,
    Rendering,
}

/// What one call to [`PipelineDriver::run_once`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome {
    /// A new frame is on screen, normalised to this window.
    Rendered(Range),
    /// The source failed transiently; the previous frame stays up.
    Skipped(AcquireError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError<SE, BE> {
    /// Only fatal sensor errors get here; transient ones become [`CycleOutcome::Skipped`].
    #[error("{0}")]
    Sensor(AcquireError),
    #[error("surface write failed: {0:?}")]
    Surface(SE),
    #[error("bus window failed: {0:?}")]
    Bus(BE),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleStats {
    pub rendered: u32,
    pub skipped: u32,
}

/// Owns the sensor, the panel and the bus guard, and runs cycles over them.
///
/// No frame outlives the cycle that acquired it.
pub struct PipelineDriver<S, D, B> {
    source: S,
    surface: D,
    bus: B,
    bus_config: BusConfig,
    rasterizer: Rasterizer,
    overlay: OverlayRenderer,
    state: PipelineState,
    stats: CycleStats,
}

impl<S, D, B> PipelineDriver<S, D, B>
where
    S: FrameSource,
    D: DrawingSurface,
    B: BusGuard,
{
    pub fn new(source: S, surface: D, bus: B) -> Self {
        Self {
            source,
            surface,
            bus,
            bus_config: BusConfig::default(),
            rasterizer: Rasterizer::default(),
            overlay: OverlayRenderer::default(),
            state: PipelineState::Idle,
            stats: CycleStats::default(),
        }
    }

    pub fn with_bus_config(mut self, bus_config: BusConfig) -> Self {
        self.bus_config = bus_config;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// One full cycle. Transient sensor errors come back as
    /// [`CycleOutcome::Skipped`] without touching the bus or the panel.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, PipelineError<D::Error, B::Error>> {
        self.state = PipelineState::Acquiring;
        let frame = match self.source.acquire().await {
            Ok(frame) => frame,
            Err(e) if e.is_fatal() => {
                self.state = PipelineState::Idle;
                error!("sensor lost: {:?}", e);
                return Err(PipelineError::Sensor(e));
            }
            Err(e) => {
                self.state = PipelineState::Idle;
                self.stats.skipped = self.stats.skipped.wrapping_add(1);
                warn!("failed to read from sensor, skipping cycle: {:?}", e);
                return Ok(CycleOutcome::Skipped(e));
            }
        };

        let range = estimate(&frame);
        debug!("min {} max {}", range.low(), range.high());

        self.state = PipelineState::Rendering;
        let rendered = self.render(&frame, range);
        self.state = PipelineState::Idle;
        rendered?;

        self.stats.rendered = self.stats.rendered.wrapping_add(1);
        Ok(CycleOutcome::Rendered(range))
    }

    /// Cycle forever. Returns only when the sensor is gone for good.
    pub async fn run(&mut self) -> PipelineError<D::Error, B::Error>
    where
        D::Error: fmt::Debug,
        B::Error: fmt::Debug,
    {
        info!("pipeline running");
        loop {
            match self.run_once().await {
                Ok(_) => {}
                Err(PipelineError::Sensor(e)) => return PipelineError::Sensor(e),
                Err(PipelineError::Surface(e)) => {
                    warn!("surface write failed, frame dropped: {}", describe(&e).as_str())
                }
                Err(PipelineError::Bus(e)) => warn!("bus window failed, frame dropped: {}", describe(&e).as_str()),
            }
        }
    }

    /// Red wiring-hint screen shown when the sensor can't be found.
    pub fn show_sensor_error(&mut self, sda: u8, scl: u8) -> Result<(), PipelineError<D::Error, B::Error>> {
        let overlay = self.overlay;
        self.paint(|surface| overlay.draw_sensor_error(surface, sda, scl))
    }

    fn render(&mut self, frame: &Frame, range: Range) -> Result<(), PipelineError<D::Error, B::Error>> {
        let rasterizer = self.rasterizer;
        let overlay = self.overlay;
        self.paint(|surface| {
            rasterizer.draw(frame, range, surface)?;
            overlay.draw(frame, range, surface)
        })
    }

    fn paint<F>(&mut self, f: F) -> Result<(), PipelineError<D::Error, B::Error>>
    where
        F: FnOnce(&mut D) -> Result<(), D::Error>,
    {
        paint_exclusive(&mut self.bus, &self.bus_config, &mut self.surface, f)
    }
}

/// Run `f` against `surface` inside one exclusive window on `bus`.
///
/// The window is closed even when `f` fails; a draw error wins over a
/// release error.
pub fn paint_exclusive<D, B, F>(
    bus: &mut B,
    config: &BusConfig,
    surface: &mut D,
    f: F,
) -> Result<(), PipelineError<D::Error, B::Error>>
where
    D: DrawingSurface,
    B: BusGuard,
    F: FnOnce(&mut D) -> Result<(), D::Error>,
{
    let window = Exclusive::begin(bus, config).map_err(PipelineError::Bus)?;
    f(surface).map_err(PipelineError::Surface)?;
    window.release().map_err(PipelineError::Bus)
}

/// Debug text of `error` for a log line. Anything past 64 bytes is cut off.
fn describe<E: fmt::Debug>(error: &E) -> String<64> {
    let mut text = String::new();
    if write!(text, "{:?}", error).is_err() {
        // Keep what fit and mark the cut.
        while text.len() > 61 {
            text.pop();
        }
        let _ = text.push_str("...");
    }
    text
}
