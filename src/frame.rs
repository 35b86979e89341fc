use core::fmt;
use core::ops::Index;

use thiserror::Error;

use crate::{CENTER_COL, CENTER_ROW, COLS, FRAME_LEN, ROWS};

/// One complete reading of the thermal array, row-major, in deg C.
///
/// Frames are built whole by a [`FrameSource`] and never patched afterwards;
/// the pipeline hands them around by reference for a single cycle.
#[derive(Clone, PartialEq)]
pub struct Frame {
    samples: [f32; FRAME_LEN],
}

impl Frame {
    pub const fn from_samples(samples: [f32; FRAME_LEN]) -> Self {
        Self { samples }
    }

    /// Frame with every sample set to `value`.
    pub const fn filled(value: f32) -> Self {
        Self {
            samples: [value; FRAME_LEN],
        }
    }

    /// Build a frame from `f(row, col)`.
    pub fn from_fn<F: FnMut(usize, usize) -> f32>(mut f: F) -> Self {
        let mut samples = [0.0; FRAME_LEN];
        for (index, sample) in samples.iter_mut().enumerate() {
            *sample = f(index / COLS, index % COLS);
        }
        Self { samples }
    }

    pub fn samples(&self) -> &[f32; FRAME_LEN] {
        &self.samples
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < ROWS && col < COLS {
            Some(self.samples[row * COLS + col])
        } else {
            None
        }
    }

    /// The sample under the crosshair.
    pub fn center(&self) -> f32 {
        self.samples[CENTER_ROW * COLS + CENTER_COL]
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

impl Index<usize> for Frame {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.samples[index]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("rows", &ROWS)
            .field("cols", &COLS)
            .field("center", &self.center())
            .finish()
    }
}

/// Why a frame could not be produced.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquireError {
    /// Device not detected or failed to initialise. Nothing can be shown without it.
    #[error("thermal sensor unavailable")]
    SensorUnavailable,
    /// The sensor never signalled data-ready within the read timeout.
    #[error("timed out waiting for a frame")]
    ReadTimeout,
    /// The bus transfer itself failed.
    #[error("failed to read frame")]
    ReadFailure,
}

impl AcquireError {
    /// Fatal errors stop the pipeline, the rest only skip one cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AcquireError::SensorUnavailable)
    }
}

/// Anything that yields whole frames on demand.
///
/// The time `acquire` takes is the pipeline cadence; callers add no delay of
/// their own on top of it.
pub trait FrameSource {
    async fn acquire(&mut self) -> Result<Frame, AcquireError>;
}

impl<T: FrameSource + ?Sized> FrameSource for &mut T {
    async fn acquire(&mut self) -> Result<Frame, AcquireError> {
        T::acquire(self).await
    }
}
