//! Exclusive ownership of the shared SPI bus.
//!
//! Everything the pipeline writes in one cycle goes out between a single
//! `begin_exclusive` / `end_exclusive` pair. [`Exclusive`] is the scope for
//! that pair: the window is closed when the guard is released or dropped, so
//! an early `?` return inside the window still gives the bus back.

use core::ops::{Deref, DerefMut};

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{Mode, MODE_0};
use thiserror::Error;

use crate::SPI_FREQUENCY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Clock and framing for one exclusive window. Opaque to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub frequency: u32,
    pub bit_order: BitOrder,
    pub mode: Mode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frequency: SPI_FREQUENCY,
            bit_order: BitOrder::MsbFirst,
            mode: MODE_0,
        }
    }
}

/// Acquire/release of exclusive bus ownership.
pub trait BusGuard {
    type Error;

    fn begin_exclusive(&mut self, config: &BusConfig) -> Result<(), Self::Error>;

    fn end_exclusive(&mut self) -> Result<(), Self::Error>;
}

impl<T: BusGuard + ?Sized> BusGuard for &mut T {
    type Error = T::Error;

    fn begin_exclusive(&mut self, config: &BusConfig) -> Result<(), Self::Error> {
        T::begin_exclusive(self, config)
    }

    fn end_exclusive(&mut self) -> Result<(), Self::Error> {
        T::end_exclusive(self)
    }
}

/// An open exclusive window on `B`.
pub struct Exclusive<'a, B: BusGuard> {
    bus: &'a mut B,
    open: bool,
}

impl<'a, B: BusGuard> Exclusive<'a, B> {
    pub fn begin(bus: &'a mut B, config: &BusConfig) -> Result<Self, B::Error> {
        bus.begin_exclusive(config)?;
        Ok(Self { bus, open: true })
    }

    /// Close the window and report whether the release itself worked.
    pub fn release(mut self) -> Result<(), B::Error> {
        self.open = false;
        self.bus.end_exclusive()
    }
}

impl<B: BusGuard> Drop for Exclusive<'_, B> {
    fn drop(&mut self) {
        if self.open && self.bus.end_exclusive().is_err() {
            warn!("failed to release the bus after an aborted window");
        }
    }
}

impl<B: BusGuard> Deref for Exclusive<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.bus
    }
}

impl<B: BusGuard> DerefMut for Exclusive<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.bus
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// `begin_exclusive` while a window is already open.
    #[error("bus already held")]
    Busy,
    /// `end_exclusive` without an open window.
    #[error("bus not held")]
    NotHeld,
    /// Driving the chip-select line failed.
    #[error("chip select pin error")]
    Pin,
    /// The panel can't be clocked the way the config asks.
    #[error("unsupported bus configuration")]
    UnsupportedConfig,
}

/// Bus guard that owns the display's chip-select line.
///
/// The SPI peripheral is clocked once when it is built; the guard only checks
/// that each window asks for something the panel can take and keeps CS low
/// for the whole window.
pub struct ChipSelect<CS> {
    cs: CS,
    max_frequency: u32,
    active: Option<BusConfig>,
}

impl<CS: OutputPin> ChipSelect<CS> {
    pub fn new(mut cs: CS, max_frequency: u32) -> Result<Self, BusError> {
        cs.set_high().map_err(|_| BusError::Pin)?;
        Ok(Self {
            cs,
            max_frequency,
            active: None,
        })
    }

    pub fn is_held(&self) -> bool {
        self.active.is_some()
    }

    pub fn release(self) -> CS {
        self.cs
    }
}

impl<CS: OutputPin> BusGuard for ChipSelect<CS> {
    type Error = BusError;

    fn begin_exclusive(&mut self, config: &BusConfig) -> Result<(), BusError> {
        if self.active.is_some() {
            return Err(BusError::Busy);
        }
        if config.frequency == 0 || config.frequency > self.max_frequency || config.bit_order != BitOrder::MsbFirst {
            return Err(BusError::UnsupportedConfig);
        }
        self.cs.set_low().map_err(|_| BusError::Pin)?;
        self.active = Some(*config);
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), BusError> {
        if self.active.take().is_none() {
            return Err(BusError::NotHeld);
        }
        self.cs.set_high().map_err(|_| BusError::Pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Default)]
    struct Pin {
        levels: Vec<bool>,
    }

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.levels.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.levels.push(true);
            Ok(())
        }
    }

    fn guard() -> ChipSelect<Pin> {
        ChipSelect::new(Pin::default(), SPI_FREQUENCY).unwrap()
    }

    #[test]
    fn new_deselects() {
        assert_eq!(guard().release().levels, vec![true]);
    }

    #[test]
    fn window_drives_cs() {
        let mut cs = guard();
        let window = Exclusive::begin(&mut cs, &BusConfig::default()).unwrap();
        assert!(window.is_held());
        window.release().unwrap();
        assert!(!cs.is_held());
        assert_eq!(cs.release().levels, vec![true, false, true]);
    }

    #[test]
    fn dropped_window_still_releases() {
        let mut cs = guard();
        {
            let _window = Exclusive::begin(&mut cs, &BusConfig::default()).unwrap();
        }
        assert!(!cs.is_held());
        assert_eq!(cs.release().levels, vec![true, false, true]);
    }

    #[test]
    fn nested_begin_is_busy() {
        let mut cs = guard();
        cs.begin_exclusive(&BusConfig::default()).unwrap();
        assert_eq!(cs.begin_exclusive(&BusConfig::default()), Err(BusError::Busy));
    }

    #[test]
    fn end_without_begin() {
        assert_eq!(guard().end_exclusive(), Err(BusError::NotHeld));
    }

    #[test]
    fn rejects_overclock_and_lsb_first() {
        let mut cs = guard();
        let fast = BusConfig {
            frequency: SPI_FREQUENCY * 2,
            ..BusConfig::default()
        };
        assert_eq!(cs.begin_exclusive(&fast), Err(BusError::UnsupportedConfig));
        let lsb = BusConfig {
            bit_order: BitOrder::LsbFirst,
            ..BusConfig::default()
        };
        assert_eq!(cs.begin_exclusive(&lsb), Err(BusError::UnsupportedConfig));
        assert!(!cs.is_held());
    }

    #[test]
    fn slower_clock_is_accepted() {
        let mut cs = guard();
        let slow = BusConfig {
            frequency: 1_000_000,
            ..BusConfig::default()
        };
        cs.begin_exclusive(&slow).unwrap();
        assert!(cs.is_held());
    }

    #[test]
    fn error_messages() {
        assert_eq!(BusError::Busy.to_string(), "bus already held");
        assert_eq!(BusError::UnsupportedConfig.to_string(), "unsupported bus configuration");
    }
}
