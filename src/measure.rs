// measure.rs

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::*;

pub const MAX_SAMPLES: usize = 64;
pub const NUM_SAMPLES: usize = 25;
pub const SAMPLE_DELAY_MS: u32 = 10;

pub trait AnalogSource {
    fn read_raw(&mut self) -> anyhow::Result<u16>;
}

impl<T: AnalogSource + ?Sized> AnalogSource for &mut T {
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        (**self).read_raw()
    }
}

pub struct Sampler<A, D> {
    source: A,
    delay: D,
    samples: usize,
    settle_ms: u32,
}

impl<A: AnalogSource, D: DelayNs> Sampler<A, D> {
    pub fn new(source: A, delay: D) -> Self {
        Self::with_samples(source, delay, NUM_SAMPLES, SAMPLE_DELAY_MS)
    }

    pub fn with_samples(source: A, delay: D, samples: usize, settle_ms: u32) -> Self {
        Sampler {
            source,
            delay,
            samples: samples.clamp(1, MAX_SAMPLES),
            settle_ms,
        }
    }

    /// Mean raw count of one burst, or `NaN` if the ADC failed.
    pub fn sample(&mut self) -> f32 {
        let mut buf: Vec<u16, MAX_SAMPLES> = Vec::new();
        for _ in 0..self.samples {
            match self.source.read_raw() {
                Ok(v) => {
                    // capacity is checked in the constructor
                    let _ = buf.push(v);
                }
                Err(e) => {
                    error!("ADC read failed: {e:?}");
                    return f32::NAN;
                }
            }
            self.delay.delay_ms(self.settle_ms);
        }

        let sum: u32 = buf.iter().map(|&v| v as u32).sum();
        sum as f32 / buf.len() as f32
    }

    pub fn samples(&self) -> usize {
        self.samples
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspAdc;

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::Arc;

    use esp_idf_hal::{
        adc::oneshot::{AdcChannelDriver, AdcDriver},
        gpio::ADCPin,
    };

    use super::AnalogSource;

    pub struct EspAdc<'d, P: ADCPin> {
        adc: Arc<AdcDriver<'d, P::Adc>>,
        chan: AdcChannelDriver<'d, P, Arc<AdcDriver<'d, P::Adc>>>,
    }

    impl<'d, P: ADCPin> EspAdc<'d, P> {
        pub fn new(
            adc: Arc<AdcDriver<'d, P::Adc>>,
            chan: AdcChannelDriver<'d, P, Arc<AdcDriver<'d, P::Adc>>>,
        ) -> Self {
            Self { adc, chan }
        }
    }

    impl<'d, P: ADCPin> AnalogSource for EspAdc<'d, P> {
        fn read_raw(&mut self) -> anyhow::Result<u16> {
            // counts, not millivolts
            Ok(self.adc.read_raw(&mut self.chan)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingDelay, FakeAdc};

    #[test]
    fn averages_a_burst() {
        let adc = FakeAdc {
            values: vec![500, 510, 520, 530],
            pos: 0,
            fail_at: None,
        };
        let mut s = Sampler::with_samples(adc, CountingDelay::default(), 4, 10);
        assert_eq!(s.sample(), 515.0);
    }

    #[test]
    fn default_burst_of_constant_midpoint() {
        let mut s = Sampler::new(FakeAdc::constant(512), CountingDelay::default());
        assert_eq!(s.sample(), 512.0);
        assert_eq!(s.source.pos, NUM_SAMPLES);
    }

    #[test]
    fn settles_after_every_read() {
        let mut s = Sampler::new(FakeAdc::constant(100), CountingDelay::default());
        s.sample();
        assert_eq!(s.delay.total_ns, NUM_SAMPLES as u64 * 10_000_000);
    }

    #[test]
    fn failed_read_gives_nan() {
        let adc = FakeAdc {
            values: vec![512],
            pos: 0,
            fail_at: Some(3),
        };
        let mut s = Sampler::new(adc, CountingDelay::default());
        assert!(s.sample().is_nan());
    }

    #[test]
    fn zero_counts_are_not_filtered() {
        let mut s = Sampler::new(FakeAdc::constant(0), CountingDelay::default());
        assert_eq!(s.sample(), 0.0);
    }

    #[test]
    fn sample_count_is_bounded() {
        let s = Sampler::with_samples(FakeAdc::constant(1), CountingDelay::default(), 1000, 0);
        assert_eq!(s.samples(), MAX_SAMPLES);
        let s = Sampler::with_samples(FakeAdc::constant(1), CountingDelay::default(), 0, 0);
        assert_eq!(s.samples(), 1);
    }
}

// EOF
