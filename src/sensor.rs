use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::frame::{AcquireError, Frame, FrameSource};
use crate::{FRAME_LEN, POLL_INTERVAL_MS, READ_TIMEOUT_MS};

/// Refresh rate of the thermal array. Each tick delivers one subpage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefreshRate {
    Half,
    One,
    Two,
    Four,
    Eight,
    Sixteen,
    ThirtyTwo,
    SixtyFour,
}

/// How pixels are split between the two subpages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadPattern {
    Chess,
    Interleaved,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SensorConfig {
    pub refresh_rate: RefreshRate,
    pub pattern: ReadPattern,
    /// Subpages that together make one full frame.
    pub subpages: u8,
    pub read_timeout_ms: u32,
    pub poll_interval_ms: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            refresh_rate: RefreshRate::Four,
            pattern: ReadPattern::Interleaved,
            subpages: 2,
            read_timeout_ms: READ_TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
        }
    }
}

/// A thermal array that fills part of a frame each time new data is ready.
pub trait ThermalArray {
    type Error;

    /// Write the latest subpage into `destination` if one is waiting.
    /// Returns `Ok(false)` when nothing new has been measured yet.
    fn read_if_ready(&mut self, destination: &mut [f32]) -> Result<bool, Self::Error>;
}

/// [`FrameSource`] that polls a [`ThermalArray`] until a whole frame is in.
pub struct PolledSource<A, D> {
    array: A,
    delay: D,
    config: SensorConfig,
}

impl<A: ThermalArray, D: DelayNs> PolledSource<A, D> {
    pub fn new(array: A, delay: D, config: SensorConfig) -> Self {
        Self { array, delay, config }
    }
}

impl<A: ThermalArray, D: DelayNs> FrameSource for PolledSource<A, D> {
    async fn acquire(&mut self) -> Result<Frame, AcquireError> {
        // Fresh buffer every time; a pixel no subpage covered stays NaN.
        let mut samples = [f32::NAN; FRAME_LEN];
        let mut subpages = 0;
        let mut waited = 0;

        while subpages < self.config.subpages {
            match self.array.read_if_ready(&mut samples) {
                Ok(true) => {
                    subpages += 1;
                    waited = 0;
                }
                Ok(false) => {
                    if waited >= self.config.read_timeout_ms {
                        return Err(AcquireError::ReadTimeout);
                    }
                    self.delay.delay_ms(self.config.poll_interval_ms).await;
                    waited += self.config.poll_interval_ms;
                }
                Err(_) => return Err(AcquireError::ReadFailure),
            }
        }
        Ok(Frame::from_samples(samples))
    }
}

/// Probe every 7-bit address and collect the ones that answer.
///
/// Each probe is a one byte read since some controllers refuse zero length
/// transfers.
pub fn scan_bus<I2C: I2c>(i2c: &mut I2C) -> Vec<u8, 16> {
    let mut found = Vec::new();
    for address in 0x01..0x7F {
        match i2c.read(address, &mut [0u8]) {
            Ok(()) => {
                info!("I2C device found at address {:#x}", address);
                if found.push(address).is_err() {
                    warn!("too many I2C devices, ignoring {:#x}", address);
                }
            }
            Err(e) => match e.kind() {
                ErrorKind::NoAcknowledge(_) => {}
                _ => warn!("unknown error at address {:#x}", address),
            },
        }
    }
    if found.is_empty() {
        warn!("no I2C devices found, check wiring and pull-ups");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{self, NoAcknowledgeSource, Operation};

    struct Bus {
        present: &'static [u8],
        broken: &'static [u8],
    }

    #[derive(Debug)]
    enum BusFault {
        Nack,
        Arbitration,
    }

    impl i2c::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            match self {
                BusFault::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
                BusFault::Arbitration => ErrorKind::ArbitrationLoss,
            }
        }
    }

    impl i2c::ErrorType for Bus {
        type Error = BusFault;
    }

    impl I2c for Bus {
        fn transaction(&mut self, address: u8, _: &mut [Operation<'_>]) -> Result<(), BusFault> {
            if self.present.contains(&address) {
                Ok(())
            } else if self.broken.contains(&address) {
                Err(BusFault::Arbitration)
            } else {
                Err(BusFault::Nack)
            }
        }
    }

    #[test]
    fn scan_finds_thermal_array() {
        let mut bus = Bus {
            present: &[0x33],
            broken: &[],
        };
        assert_eq!(scan_bus(&mut bus).as_slice(), &[crate::MLX90640_ADDRESS]);
    }

    #[test]
    fn scan_skips_faulty_addresses() {
        let mut bus = Bus {
            present: &[0x10, 0x68],
            broken: &[0x20],
        };
        assert_eq!(scan_bus(&mut bus).as_slice(), &[0x10, 0x68]);
    }

    #[test]
    fn scan_empty_bus() {
        let mut bus = Bus {
            present: &[],
            broken: &[],
        };
        assert!(scan_bus(&mut bus).is_empty());
    }

    /// Answers with a scripted list of readiness results, filling even or odd
    /// rows depending on which subpage it is on.
    struct Script {
        steps: std::vec::Vec<Result<bool, ()>>,
        subpage: usize,
    }

    impl ThermalArray for Script {
        type Error = ();

        fn read_if_ready(&mut self, destination: &mut [f32]) -> Result<bool, ()> {
            let step = self.steps.remove(0);
            if step == Ok(true) {
                for (i, t) in destination.iter_mut().enumerate() {
                    if (i / crate::COLS) % 2 == self.subpage {
                        *t = 20.0 + self.subpage as f32;
                    }
                }
                self.subpage = 1 - self.subpage;
            }
            step
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_ms: u32,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_ms += ns / 1_000_000;
        }
    }

    fn source<'a>(steps: &[Result<bool, ()>], delay: &'a mut CountingDelay) -> PolledSource<Script, &'a mut CountingDelay> {
        let script = Script {
            steps: steps.to_vec(),
            subpage: 0,
        };
        PolledSource::new(script, delay, SensorConfig::default())
    }

    #[test]
    fn two_subpages_make_a_frame() {
        let mut delay = CountingDelay::default();
        let mut src = source(&[Ok(false), Ok(true), Ok(false), Ok(false), Ok(true)], &mut delay);
        let frame = embassy_futures::block_on(src.acquire()).unwrap();
        assert!(frame.iter().all(|t| t == 20.0 || t == 21.0));
        assert_eq!(frame.get(0, 0), Some(20.0));
        assert_eq!(frame.get(1, 0), Some(21.0));
        drop(src);
        assert_eq!(delay.total_ms, 3 * POLL_INTERVAL_MS);
    }

    #[test]
    fn gives_up_after_timeout() {
        let mut delay = CountingDelay::default();
        let polls = (READ_TIMEOUT_MS / POLL_INTERVAL_MS) as usize + 1;
        let steps = vec![Ok(false); polls];
        let mut src = source(&steps, &mut delay);
        assert_eq!(embassy_futures::block_on(src.acquire()), Err(AcquireError::ReadTimeout));
    }

    #[test]
    fn bus_error_is_read_failure() {
        let mut delay = CountingDelay::default();
        let mut src = source(&[Ok(true), Err(())], &mut delay);
        assert_eq!(embassy_futures::block_on(src.acquire()), Err(AcquireError::ReadFailure));
    }

    #[test]
    fn default_config_matches_4hz_interleaved() {
        let config = SensorConfig::default();
        assert_eq!(config.refresh_rate, RefreshRate::Four);
        assert_eq!(config.pattern, ReadPattern::Interleaved);
        assert_eq!(config.subpages, 2);
        // Two 250 ms subpages must fit inside the timeout.
        assert!(config.read_timeout_ms > 2 * 250);
    }
}
