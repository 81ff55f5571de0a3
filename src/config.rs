// config.rs

use anyhow::bail;
use crc::{Crc, CRC_32_ISCSI};
use log::*;
use serde::{Deserialize, Serialize};

use crate::CalibrationConfig;

pub const NVS_BUF_SIZE: usize = 1024;

const DEFAULT_API_PORT: u16 = 80;
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_PUBLISH_INTERVAL: u64 = 5000;

pub const MIN_PUBLISH_INTERVAL: u64 = 1000;
pub const MAX_PUBLISH_INTERVAL: u64 = 24 * 3600 * 1000;
pub const MAX_ADJUSTMENT: f32 = 50.0;

pub const CONFIG_NAME: &str = "cfg";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MyConfig {
    pub port: u16,

    pub wifi_ssid: String,
    pub wifi_pass: String,

    pub mqtt_server: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_password: String,
    pub mqtt_topic: String,

    pub event_location: String,
    pub event_place: String,
    pub event_type: String,
    pub event_adjustment: f32,
    pub event_publish_interval: u64,

    pub calibration: CalibrationConfig,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            port: option_env!("API_PORT")
                .unwrap_or("-")
                .parse()
                .unwrap_or(DEFAULT_API_PORT),

            wifi_ssid: option_env!("WIFI_SSID").unwrap_or("internet").into(),
            wifi_pass: option_env!("WIFI_PASS").unwrap_or("password").into(),

            mqtt_server: "".into(),
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_user: "".into(),
            mqtt_password: "".into(),
            mqtt_topic: "home/livingroom/temperature".into(),

            event_location: "home".into(),
            event_place: "livingroom".into(),
            event_type: "temperature".into(),
            event_adjustment: 0.0,
            event_publish_interval: DEFAULT_PUBLISH_INTERVAL,

            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("event_adjustment must be between -{max} and {max}, got {0}", max = MAX_ADJUSTMENT)]
    Adjustment(f32),

    #[error(
        "event_publish_interval must be between {min} and {max} ms, got {0}",
        min = MIN_PUBLISH_INTERVAL,
        max = MAX_PUBLISH_INTERVAL
    )]
    PublishInterval(u64),

    #[error("{0} must be non-empty without spaces, commas or '='")]
    Label(&'static str),

    #[error("mqtt_topic must not be empty")]
    Topic,

    #[error("calibration: {0}")]
    Calibration(&'static str),
}

impl MyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_adjustment(self.event_adjustment)?;
        check_publish_interval(self.event_publish_interval)?;

        for (name, value) in [
            ("event_type", &self.event_type),
            ("event_location", &self.event_location),
            ("event_place", &self.event_place),
        ] {
            if value.is_empty() || value.contains([' ', ',', '=']) {
                return Err(ConfigError::Label(name));
            }
        }
        if self.mqtt_topic.is_empty() {
            return Err(ConfigError::Topic);
        }

        check_calibration(&self.calibration)
    }

    pub fn from_store(store: &mut dyn ConfigStore) -> Option<Self> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match store.get_raw(&mut nvsbuf) {
            Err(e) => {
                error!("Nvs read error {e:?}");
                return None;
            }
            Ok(Some(b)) => b,
            _ => {
                error!("Nvs key not found");
                return None;
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());

        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::from_bytes_crc32::<MyConfig>(b, digest) {
            Ok(c) => {
                info!("Successfully parsed config from nvs.");
                Some(c)
            }
            Err(e) => {
                error!("Cannot parse config from nvs: {e:?}");
                None
            }
        }
    }

    pub fn to_store(&self, store: &mut dyn ConfigStore) -> anyhow::Result<()> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        let nvsdata = match postcard::to_slice_crc32(self, &mut nvsbuf, digest) {
            Ok(d) => d,
            Err(e) => {
                bail!("Cannot encode config to buffer {e:?}");
            }
        };
        info!(
            "Encoded config to {sz} bytes. Saving to nvs...",
            sz = nvsdata.len()
        );

        match store.set_raw(nvsdata) {
            Ok(_) => {
                info!("Config saved.");
                Ok(())
            }
            Err(e) => {
                bail!("Cannot save to nvs: {e:?}");
            }
        }
    }
}

pub fn check_adjustment(adj: f32) -> Result<(), ConfigError> {
    if adj.is_finite() && adj.abs() <= MAX_ADJUSTMENT {
        Ok(())
    } else {
        Err(ConfigError::Adjustment(adj))
    }
}

pub fn check_publish_interval(ms: u64) -> Result<(), ConfigError> {
    if (MIN_PUBLISH_INTERVAL..=MAX_PUBLISH_INTERVAL).contains(&ms) {
        Ok(())
    } else {
        Err(ConfigError::PublishInterval(ms))
    }
}

fn check_calibration(cal: &CalibrationConfig) -> Result<(), ConfigError> {
    if !(8..=16).contains(&cal.adc_bits) {
        return Err(ConfigError::Calibration("adc_bits must be between 8 and 16"));
    }
    let positive = [
        cal.series_resistor,
        cal.nominal_resistance,
        cal.beta,
        cal.vin,
        cal.rt,
        cal.r0,
        cal.rt1,
        cal.rt2,
    ];
    if positive.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(ConfigError::Calibration(
            "resistances, beta and vin must be positive",
        ));
    }
    if cal.t1 == cal.t2 || cal.rt1 == cal.rt2 {
        return Err(ConfigError::Calibration(
            "calibration points must be distinct",
        ));
    }
    Ok(())
}

pub trait ConfigStore: Send {
    fn get_raw<'a>(&mut self, buf: &'a mut [u8]) -> anyhow::Result<Option<&'a [u8]>>;
    fn set_raw(&mut self, data: &[u8]) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemStore {
    data: Option<Vec<u8>>,
}

impl MemStore {
    pub fn raw(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn raw_mut(&mut self) -> Option<&mut Vec<u8>> {
        self.data.as_mut()
    }
}

impl ConfigStore for MemStore {
    fn get_raw<'a>(&mut self, buf: &'a mut [u8]) -> anyhow::Result<Option<&'a [u8]>> {
        match &self.data {
            None => Ok(None),
            Some(d) if d.len() > buf.len() => bail!("stored config too big: {} bytes", d.len()),
            Some(d) => {
                buf[..d.len()].copy_from_slice(d);
                Ok(Some(&buf[..d.len()]))
            }
        }
    }

    fn set_raw(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.data = Some(data.to_vec());
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub use nvs_store::NvsStore;

#[cfg(target_os = "espidf")]
mod nvs_store {
    use esp_idf_svc::nvs;

    use super::{ConfigStore, CONFIG_NAME};

    pub struct NvsStore(pub nvs::EspNvs<nvs::NvsDefault>);

    impl ConfigStore for NvsStore {
        fn get_raw<'a>(&mut self, buf: &'a mut [u8]) -> anyhow::Result<Option<&'a [u8]>> {
            Ok(self.0.get_raw(CONFIG_NAME, buf)?)
        }

        fn set_raw(&mut self, data: &[u8]) -> anyhow::Result<()> {
            self.0.set_raw(CONFIG_NAME, data)?;
            Ok(())
        }
    }
}


// EOF
