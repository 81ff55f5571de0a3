// thermistor.rs

use serde::{Deserialize, Serialize};

pub const KELVIN_OFFSET: f32 = 273.15;

// Must match the width of `AdcDriver::read_raw` on the chip.
#[cfg(target_os = "espidf")]
pub const DEFAULT_ADC_BITS: u8 = 12;
#[cfg(not(target_os = "espidf"))]
pub const DEFAULT_ADC_BITS: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThermistorKind {
    SteinhartHart,
    BetaRinf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub model: ThermistorKind,
    pub adc_bits: u8,

    // Steinhart-Hart (beta form, single nominal point)
    pub series_resistor: f32,
    pub nominal_resistance: f32,
    pub nominal_temp: f32,
    pub beta: f32,

    // two-point beta/Rinf
    pub vin: f32,
    pub rt: f32,
    pub r0: f32,
    pub t0: f32,
    pub t1: f32,
    pub rt1: f32,
    pub t2: f32,
    pub rt2: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            model: ThermistorKind::SteinhartHart,
            adc_bits: DEFAULT_ADC_BITS,

            series_resistor: 10040.0,
            nominal_resistance: 10020.0,
            nominal_temp: 25.0,
            beta: 3950.0,

            vin: 3.3,
            rt: 10000.0,
            r0: 9630.0,
            t0: 25.0,
            t1: 0.0,
            rt1: 26000.0,
            t2: 100.0,
            rt2: 983.0,
        }
    }
}

impl CalibrationConfig {
    pub fn adc_fullscale(&self) -> f32 {
        (1u32 << self.adc_bits) as f32
    }

    pub fn adc_max(&self) -> f32 {
        self.adc_fullscale() - 1.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteinhartHart {
    adc_max: f32,
    series_resistor: f32,
    nominal_resistance: f32,
    nominal_temp_k: f32,
    beta: f32,
}

impl SteinhartHart {
    pub fn new(
        adc_max: f32,
        series_resistor: f32,
        nominal_resistance: f32,
        nominal_temp_c: f32,
        beta: f32,
    ) -> Self {
        Self {
            adc_max,
            series_resistor,
            nominal_resistance,
            nominal_temp_k: nominal_temp_c + KELVIN_OFFSET,
            beta,
        }
    }

    pub fn resistance(&self, raw: f32) -> f32 {
        self.series_resistor / (self.adc_max / raw - 1.0)
    }

    pub fn to_celsius(&self, raw: f32) -> f32 {
        if !raw.is_finite() || raw <= 0.0 || raw >= self.adc_max {
            return f32::NAN;
        }
        let ratio = self.resistance(raw) / self.nominal_resistance;
        let inv_t = ratio.ln() / self.beta + 1.0 / self.nominal_temp_k;
        finite_or_nan(1.0 / inv_t - KELVIN_OFFSET)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetaRinf {
    adc_fullscale: f32,
    vin: f32,
    rt: f32,
    beta: f32,
    rinf: f32,
}

impl BetaRinf {
    pub fn new(
        adc_fullscale: f32,
        vin: f32,
        rt: f32,
        r0: f32,
        t0_c: f32,
        (t1_c, rt1): (f32, f32),
        (t2_c, rt2): (f32, f32),
    ) -> Self {
        let t0 = t0_c + KELVIN_OFFSET;
        let t1 = t1_c + KELVIN_OFFSET;
        let t2 = t2_c + KELVIN_OFFSET;

        let beta = (rt1 / rt2).ln() / (1.0 / t1 - 1.0 / t2);
        let rinf = r0 * (-beta / t0).exp();
        Self {
            adc_fullscale,
            vin,
            rt,
            beta,
            rinf,
        }
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn rinf(&self) -> f32 {
        self.rinf
    }

    pub fn to_celsius(&self, raw: f32) -> f32 {
        if !raw.is_finite() || raw <= 0.0 || raw >= self.adc_fullscale {
            return f32::NAN;
        }
        let vout = self.vin * (raw / self.adc_fullscale);
        let rout = self.rt * vout / (self.vin - vout);
        let temp_k = self.beta / (rout / self.rinf).ln();
        finite_or_nan(temp_k - KELVIN_OFFSET)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ThermistorModel {
    SteinhartHart(SteinhartHart),
    BetaRinf(BetaRinf),
}

impl ThermistorModel {
    pub fn from_config(cal: &CalibrationConfig) -> Self {
        match cal.model {
            ThermistorKind::SteinhartHart => Self::SteinhartHart(SteinhartHart::new(
                cal.adc_max(),
                cal.series_resistor,
                cal.nominal_resistance,
                cal.nominal_temp,
                cal.beta,
            )),
            ThermistorKind::BetaRinf => Self::BetaRinf(BetaRinf::new(
                cal.adc_fullscale(),
                cal.vin,
                cal.rt,
                cal.r0,
                cal.t0,
                (cal.t1, cal.rt1),
                (cal.t2, cal.rt2),
            )),
        }
    }

    /// Temperature in Celsius for an averaged raw ADC count.
    ///
    /// Degenerate input (no reading, zero, full scale) gives `NaN`, never a panic.
    pub fn to_celsius(&self, raw_average: f32) -> f32 {
        match self {
            Self::SteinhartHart(m) => m.to_celsius(raw_average),
            Self::BetaRinf(m) => m.to_celsius(raw_average),
        }
    }
}

fn finite_or_nan(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        f32::NAN
    }
}


// EOF
